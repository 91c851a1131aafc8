//! Per-user, dual-window token-bucket rate limiter (spec.md §4.1).

pub mod bucket;
pub mod limiter;

pub use bucket::TokenBucket;
pub use limiter::{Decision, LimitType, RateLimiter, RateLimiterConfig, Stats, Window, WindowTimestamps};
