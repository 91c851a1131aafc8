use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use convocore_core::clock::{Clock, SystemClock};
use convocore_core::UserId;
use tokio::task::JoinHandle;

use crate::bucket::TokenBucket;

/// Which bucket caused a denial, or `Error` for a soft validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitType {
    Minute,
    Hour,
    Error,
}

/// Token counts for the two windows, in the shape the client-facing event
/// carries them (spec.md §6 `rate-limit-info`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub minute: u32,
    pub hour: u32,
}

/// Absolute reset timestamps (ms since epoch) for the two windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTimestamps {
    pub minute: u64,
    pub hour: u64,
}

/// Result of a `check_limit` call (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub retry_after_ms: u64,
    pub remaining: Window,
    pub limit: Window,
    pub reset_at: WindowTimestamps,
    pub limit_type: Option<LimitType>,
}

impl Decision {
    fn invalid_user_id() -> Self {
        Decision {
            allowed: false,
            retry_after_ms: 60_000,
            remaining: Window { minute: 0, hour: 0 },
            limit: Window { minute: 0, hour: 0 },
            reset_at: WindowTimestamps { minute: 0, hour: 0 },
            limit_type: Some(LimitType::Error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub per_minute: u32,
    pub per_hour: u32,
    pub max_tracked_users: usize,
    pub gc_interval: Duration,
    pub stale_after: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            per_minute: 60,
            per_hour: 500,
            max_tracked_users: 100_000,
            gc_interval: Duration::from_secs(2 * 3600),
            stale_after: Duration::from_secs(24 * 3600),
        }
    }
}

#[derive(Debug)]
struct UserLimitRecord {
    minute: TokenBucket,
    hour: TokenBucket,
    total_requests: u64,
    first_request: u64,
    last_request: u64,
}

impl UserLimitRecord {
    fn new(config: &RateLimiterConfig, now: u64) -> Self {
        Self {
            minute: TokenBucket::full(config.per_minute, 60_000, now),
            hour: TokenBucket::full(config.per_hour, 3_600_000, now),
            total_requests: 0,
            first_request: now,
            last_request: now,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub total_users: usize,
    pub per_minute_limit: u32,
    pub per_hour_limit: u32,
}

/// Per-user, dual-window token-bucket admission control.
///
/// The outer map is an `RwLock` taken briefly and only for insert, evict,
/// or GC; the invariant that makes refill+check+consume atomic under
/// concurrent callers for the *same* user is the per-user `Mutex` wrapping
/// each [`UserLimitRecord`] (spec.md §5).
pub struct RateLimiter {
    users: RwLock<HashMap<UserId, Mutex<UserLimitRecord>>>,
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    gc_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Arc<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            users: RwLock::new(HashMap::new()),
            config,
            clock,
            gc_handle: Mutex::new(None),
        })
    }

    /// Starts the periodic GC sweep (spec.md §4.1 step 6). Must be called
    /// from within a Tokio runtime; the server crate does this once at
    /// startup.
    pub fn spawn_gc(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let interval = self.config.gc_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(limiter) => limiter.run_gc(),
                    None => break,
                }
            }
        });
        *self.gc_handle.lock().unwrap() = Some(handle);
    }

    /// Removes records untouched for longer than `stale_after`.
    fn run_gc(&self) {
        let now = self.clock.now_millis();
        let stale_after_ms = self.config.stale_after.as_millis() as u64;
        let mut users = self.users.write().unwrap();
        let before = users.len();
        users.retain(|_, record| {
            let last_request = record.get_mut().unwrap().last_request;
            now.saturating_sub(last_request) <= stale_after_ms
        });
        let evicted = before - users.len();
        if evicted > 0 {
            tracing::info!(evicted, "rate limiter GC swept stale records");
        }
    }

    /// Evicts the record with the smallest `last_request`. Caller must
    /// already hold the write lock.
    fn evict_oldest(users: &mut HashMap<UserId, Mutex<UserLimitRecord>>) {
        let Some(oldest) = users
            .iter()
            .min_by_key(|(_, record)| record.lock().unwrap().last_request)
            .map(|(user_id, _)| user_id.clone())
        else {
            return;
        };
        users.remove(&oldest);
    }

    /// Ensures a record exists for `user_id`, applying GC then forced
    /// eviction under capacity pressure (spec.md §4.1 step 2).
    fn ensure_record(&self, user_id: &UserId, now: u64) {
        {
            let users = self.users.read().unwrap();
            if users.contains_key(user_id) {
                return;
            }
        }

        let mut users = self.users.write().unwrap();
        if users.contains_key(user_id) {
            return;
        }
        if users.len() >= self.config.max_tracked_users {
            drop(users);
            self.run_gc();
            users = self.users.write().unwrap();
            if users.len() >= self.config.max_tracked_users {
                Self::evict_oldest(&mut users);
            }
        }
        users.insert(user_id.clone(), Mutex::new(UserLimitRecord::new(&self.config, now)));
    }

    /// Admission check per spec.md §4.1. Validates `user_id`, then performs
    /// refill + check + consume atomically under that user's lock.
    pub fn check_limit(&self, user_id: &str) -> Decision {
        let Some(user_id) = UserId::parse(user_id) else {
            return Decision::invalid_user_id();
        };

        let now = self.clock.now_millis();
        self.ensure_record(&user_id, now);

        let users = self.users.read().unwrap();
        let Some(record_lock) = users.get(&user_id) else {
            // Evicted between ensure_record and here under extreme pressure;
            // treat as a fresh, not-yet-admitted record rather than panic.
            return Decision::invalid_user_id();
        };
        let mut record = record_lock.lock().unwrap();

        record.minute.refill(now);
        record.hour.refill(now);

        let can_proceed = record.minute.has_token() && record.hour.has_token();
        if can_proceed {
            record.minute.consume_one();
            record.hour.consume_one();
            record.total_requests += 1;
            record.last_request = now;
            Decision {
                allowed: true,
                retry_after_ms: 0,
                remaining: Window { minute: record.minute.remaining(), hour: record.hour.remaining() },
                limit: Window { minute: self.config.per_minute, hour: self.config.per_hour },
                reset_at: WindowTimestamps {
                    minute: record.minute.reset_at_millis(now),
                    hour: record.hour.reset_at_millis(now),
                },
                limit_type: None,
            }
        } else {
            let limit_type = if !record.minute.has_token() { LimitType::Minute } else { LimitType::Hour };
            let retry_after_ms = match limit_type {
                LimitType::Minute => record.minute.retry_after_millis(now),
                _ => record.hour.retry_after_millis(now),
            };
            Decision {
                allowed: false,
                retry_after_ms,
                remaining: Window { minute: record.minute.remaining(), hour: record.hour.remaining() },
                limit: Window { minute: self.config.per_minute, hour: self.config.per_hour },
                reset_at: WindowTimestamps {
                    minute: record.minute.reset_at_millis(now),
                    hour: record.hour.reset_at_millis(now),
                },
                limit_type: Some(limit_type),
            }
        }
    }

    /// A read-only snapshot equivalent to `check_limit` without consuming a
    /// token, for status-only queries.
    pub fn get_status(&self, user_id: &str) -> Decision {
        let Some(user_id) = UserId::parse(user_id) else {
            return Decision::invalid_user_id();
        };
        let now = self.clock.now_millis();
        self.ensure_record(&user_id, now);

        let users = self.users.read().unwrap();
        let Some(record_lock) = users.get(&user_id) else {
            return Decision::invalid_user_id();
        };
        let mut record = record_lock.lock().unwrap();
        record.minute.refill(now);
        record.hour.refill(now);

        Decision {
            allowed: record.minute.has_token() && record.hour.has_token(),
            retry_after_ms: 0,
            remaining: Window { minute: record.minute.remaining(), hour: record.hour.remaining() },
            limit: Window { minute: self.config.per_minute, hour: self.config.per_hour },
            reset_at: WindowTimestamps {
                minute: record.minute.reset_at_millis(now),
                hour: record.hour.reset_at_millis(now),
            },
            limit_type: None,
        }
    }

    pub fn stats(&self) -> Stats {
        Stats {
            total_users: self.users.read().unwrap().len(),
            per_minute_limit: self.config.per_minute,
            per_hour_limit: self.config.per_hour,
        }
    }

    /// Stops the GC sweep so the process can exit (spec.md §4.1 step 7).
    pub fn destroy(&self) {
        if let Some(handle) = self.gc_handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convocore_core::clock::test_support::ManualClock;

    fn limiter_with_clock(clock: Arc<ManualClock>) -> Arc<RateLimiter> {
        RateLimiter::with_clock(RateLimiterConfig::default(), clock)
    }

    #[test]
    fn invalid_user_id_is_soft_denied() {
        let limiter = limiter_with_clock(Arc::new(ManualClock::new(0)));
        let decision = limiter.check_limit("");
        assert!(!decision.allowed);
        assert_eq!(decision.limit_type, Some(LimitType::Error));
        assert_eq!(decision.retry_after_ms, 60_000);
    }

    #[test]
    fn burst_of_sixty_one_denies_the_last() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter_with_clock(clock);
        let mut last = None;
        for _ in 0..61 {
            last = Some(limiter.check_limit("u2"));
        }
        let decision = last.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.limit_type, Some(LimitType::Minute));
    }

    #[test]
    fn sixty_first_request_after_refill_succeeds() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter_with_clock(clock.clone());
        for _ in 0..60 {
            assert!(limiter.check_limit("u3").allowed);
        }
        assert!(!limiter.check_limit("u3").allowed);
        clock.advance(60_000);
        assert!(limiter.check_limit("u3").allowed);
    }

    #[test]
    fn stats_reports_tracked_users() {
        let limiter = limiter_with_clock(Arc::new(ManualClock::new(0)));
        limiter.check_limit("a");
        limiter.check_limit("b");
        let stats = limiter.stats();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.per_minute_limit, 60);
    }
}
