use std::time::{SystemTime, UNIX_EPOCH};

/// Injectable source of the current time, so the rate limiter and
/// credential-validation TTL logic can be driven deterministically in
/// tests instead of racing the real clock.
///
/// Grounded on the teacher's pattern of injecting collaborators behind a
/// trait at the point they'd otherwise be a hidden global (see
/// `adk-runner`'s injected `SessionService`/`Llm`).
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// `Clock` backed by [`SystemTime::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_millis() as u64
    }
}

/// A clock whose value is set explicitly, for deterministic tests of
/// time-sensitive logic (token bucket refill, credential TTL) in this
/// crate and its dependents. Kept unconditionally `pub` rather than
/// `#[cfg(test)]`-gated: `cfg(test)` only applies when this crate itself
/// is under test, so a dependent crate's own test target would fail to
/// resolve it otherwise (the teacher's injected-clock pattern ships its
/// test double the same way).
pub mod test_support {
    use super::Clock;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Default)]
    pub struct ManualClock(AtomicU64);

    impl ManualClock {
        pub fn new(start_millis: u64) -> Self {
            Self(AtomicU64::new(start_millis))
        }

        pub fn advance(&self, millis: u64) {
            self.0.fetch_add(millis, Ordering::SeqCst);
        }

        pub fn set(&self, millis: u64) {
            self.0.store(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }
}
