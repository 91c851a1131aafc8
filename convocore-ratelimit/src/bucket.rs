/// A single token bucket: `tokens` is real-valued so partial refills are
/// representable, but every externally observable read is whole tokens.
///
/// Invariant upheld by every method here: `0 <= tokens <= capacity`.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    pub tokens: f64,
    pub capacity: u32,
    pub refill_per_interval: u32,
    pub interval_ms: u64,
    pub last_refill_millis: u64,
}

impl TokenBucket {
    pub fn full(capacity: u32, interval_ms: u64, now_millis: u64) -> Self {
        Self {
            tokens: capacity as f64,
            capacity,
            refill_per_interval: capacity,
            interval_ms,
            last_refill_millis: now_millis,
        }
    }

    /// Refill per spec.md §4.1 step 3: clock-backward resets the refill
    /// anchor without granting tokens; forward jumps are capped at
    /// `2 * interval_ms` worth of elapsed time before computing intervals.
    pub fn refill(&mut self, now_millis: u64) {
        if now_millis < self.last_refill_millis {
            self.last_refill_millis = now_millis;
            return;
        }

        let mut elapsed = now_millis - self.last_refill_millis;
        let cap = 2 * self.interval_ms;
        if elapsed > cap {
            elapsed = cap;
        }

        let intervals = elapsed / self.interval_ms;
        if intervals >= 1 {
            let granted = (intervals as f64) * (self.refill_per_interval as f64);
            self.tokens = (self.tokens + granted).min(self.capacity as f64);
            self.last_refill_millis = now_millis;
        }
    }

    pub fn has_token(&self) -> bool {
        self.tokens >= 1.0
    }

    /// Decrements by one token, clamped to zero as a defensive floor.
    pub fn consume_one(&mut self) {
        self.tokens = (self.tokens - 1.0).max(0.0);
    }

    pub fn remaining(&self) -> u32 {
        self.tokens.floor().max(0.0) as u32
    }

    /// Milliseconds until at least one token will be available, assuming
    /// no further consumption.
    pub fn retry_after_millis(&self, now_millis: u64) -> u64 {
        if self.has_token() {
            return 0;
        }
        let elapsed_in_interval = (now_millis.saturating_sub(self.last_refill_millis)) % self.interval_ms;
        self.interval_ms.saturating_sub(elapsed_in_interval)
    }

    pub fn reset_at_millis(&self, now_millis: u64) -> u64 {
        now_millis + self.retry_after_millis(now_millis).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn full_bucket_is_at_capacity() {
        let bucket = TokenBucket::full(60, 60_000, 1_000);
        assert_eq!(bucket.tokens, 60.0);
    }

    #[test]
    fn backward_clock_grants_nothing() {
        let mut bucket = TokenBucket::full(60, 60_000, 100_000);
        bucket.tokens = 0.0;
        bucket.refill(50_000);
        assert_eq!(bucket.tokens, 0.0);
        assert_eq!(bucket.last_refill_millis, 50_000);
    }

    #[test]
    fn forward_jump_is_bounded_by_two_intervals() {
        let mut bucket = TokenBucket::full(60, 60_000, 0);
        bucket.tokens = 0.0;
        // 10 intervals' worth of elapsed time; only 2 intervals' refill grant.
        bucket.refill(600_000);
        assert_eq!(bucket.tokens, 120.0_f64.min(60.0));
    }

    #[test]
    fn consume_never_goes_negative() {
        let mut bucket = TokenBucket::full(1, 60_000, 0);
        bucket.consume_one();
        bucket.consume_one();
        assert_eq!(bucket.tokens, 0.0);
    }

    proptest! {
        #[test]
        fn tokens_always_within_bounds(
            capacity in 1u32..1000,
            interval_ms in 1u64..1_000_000,
            elapsed in 0u64..10_000_000,
            consumes in 0u32..2000,
        ) {
            let mut bucket = TokenBucket::full(capacity, interval_ms, 0);
            bucket.refill(elapsed);
            for _ in 0..consumes {
                bucket.consume_one();
            }
            prop_assert!(bucket.tokens >= 0.0);
            prop_assert!(bucket.tokens <= capacity as f64);
        }
    }
}
