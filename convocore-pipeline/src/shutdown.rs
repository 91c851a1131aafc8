use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use convocore_core::stores::ChatStore;
use convocore_ratelimit::RateLimiter;

const CONNECTION_QUIESCE_DEADLINE: Duration = Duration::from_secs(2);
const STORE_CLOSE_DEADLINE: Duration = Duration::from_secs(1);
const FORCE_EXIT_DEADLINE: Duration = Duration::from_secs(5);

/// A layer that can be asked to wind down within a deadline (spec.md
/// §4.8). Returns `true` for a clean finish, `false` if the deadline
/// forced it closed. The server crate implements this against the real
/// listener socket and live WebSocket connection set; this core only
/// defines the contract.
#[async_trait]
pub trait Quiesce: Send + Sync {
    async fn quiesce(&self, deadline: Duration) -> bool;
}

/// Orchestrates the ordered shutdown sequence (spec.md §4.8): stop
/// accepting new connections, drain existing ones, stop the rate
/// limiter's background sweep, close every store, then exit.
pub struct ShutdownController {
    listener: Arc<dyn Quiesce>,
    connections: Arc<dyn Quiesce>,
    rate_limiter: Arc<RateLimiter>,
    stores: Vec<Arc<dyn ChatStore>>,
    force_exit: Duration,
    started: AtomicBool,
}

impl ShutdownController {
    pub fn new(
        listener: Arc<dyn Quiesce>,
        connections: Arc<dyn Quiesce>,
        rate_limiter: Arc<RateLimiter>,
        stores: Vec<Arc<dyn ChatStore>>,
    ) -> Self {
        Self { listener, connections, rate_limiter, stores, force_exit: FORCE_EXIT_DEADLINE, started: AtomicBool::new(false) }
    }

    #[cfg(test)]
    fn with_force_exit(mut self, force_exit: Duration) -> Self {
        self.force_exit = force_exit;
        self
    }

    /// Runs the shutdown sequence once; a second call is a no-op that
    /// returns immediately (signals can arrive more than once).
    pub async fn shutdown(&self) -> i32 {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::info!("shutdown already in progress; ignoring duplicate signal");
            return 0;
        }

        match tokio::time::timeout(self.force_exit, self.run_sequence()).await {
            Ok(code) => code,
            Err(_) => {
                tracing::error!(deadline = ?self.force_exit, "shutdown sequence exceeded global deadline; forcing exit");
                1
            }
        }
    }

    async fn run_sequence(&self) -> i32 {
        tracing::info!("shutdown: closing listener");
        self.listener.quiesce(Duration::ZERO).await;

        tracing::info!(deadline = ?CONNECTION_QUIESCE_DEADLINE, "shutdown: draining live connections");
        if !self.connections.quiesce(CONNECTION_QUIESCE_DEADLINE).await {
            tracing::warn!("connection layer did not drain in time; forcing close");
        }

        tracing::info!("shutdown: stopping rate limiter GC");
        self.rate_limiter.destroy();

        for (index, store) in self.stores.iter().enumerate() {
            match tokio::time::timeout(STORE_CLOSE_DEADLINE, store.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!(store = index, error = %err, "store close returned an error; continuing"),
                Err(_) => tracing::warn!(store = index, "store close exceeded its deadline; continuing"),
            }
        }

        tracing::info!("shutdown complete");
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct ImmediateQuiesce;
    #[async_trait]
    impl Quiesce for ImmediateQuiesce {
        async fn quiesce(&self, _deadline: Duration) -> bool {
            true
        }
    }

    struct HangingQuiesce;
    #[async_trait]
    impl Quiesce for HangingQuiesce {
        async fn quiesce(&self, deadline: Duration) -> bool {
            tokio::time::sleep(deadline + Duration::from_secs(10)).await;
            false
        }
    }

    struct CountingStore {
        closes: Arc<AtomicUsize>,
    }
    #[async_trait]
    impl ChatStore for CountingStore {
        async fn add_message(&self, _chat_id: &str, _role: convocore_core::types::Role, _content: &str) -> convocore_core::Result<()> {
            Ok(())
        }
        async fn close(&self) -> convocore_core::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn clean_shutdown_closes_every_store_and_returns_zero() {
        let closes = Arc::new(AtomicUsize::new(0));
        let controller = ShutdownController::new(
            Arc::new(ImmediateQuiesce),
            Arc::new(ImmediateQuiesce),
            RateLimiter::new(Default::default()),
            vec![
                Arc::new(CountingStore { closes: closes.clone() }),
                Arc::new(CountingStore { closes: closes.clone() }),
            ],
        );
        assert_eq!(controller.shutdown().await, 0);
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_connection_layer_does_not_block_forever() {
        let controller = ShutdownController::new(
            Arc::new(ImmediateQuiesce),
            Arc::new(HangingQuiesce),
            RateLimiter::new(Default::default()),
            vec![],
        )
        .with_force_exit(Duration::from_secs(3));
        assert_eq!(controller.shutdown().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_call_is_a_no_op() {
        let controller = ShutdownController::new(
            Arc::new(ImmediateQuiesce),
            Arc::new(ImmediateQuiesce),
            RateLimiter::new(Default::default()),
            vec![],
        );
        assert_eq!(controller.shutdown().await, 0);
        assert_eq!(controller.shutdown().await, 0);
    }
}
