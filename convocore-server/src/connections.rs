use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use convocore_pipeline::Quiesce;
use tokio::sync::watch;

/// Tracks live WebSocket connections so shutdown can wait for them to
/// drain (spec.md §4.8 step 2) instead of cutting them off immediately.
pub struct ConnectionRegistry {
    count: AtomicUsize,
    shutdown_tx: watch::Sender<bool>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self { count: AtomicUsize::new(0), shutdown_tx })
    }

    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard { registry: self.clone(), shutdown_rx: self.shutdown_tx.subscribe() }
    }
}

#[async_trait]
impl Quiesce for ConnectionRegistry {
    async fn quiesce(&self, deadline: Duration) -> bool {
        let _ = self.shutdown_tx.send(true);
        tokio::time::timeout(deadline, async {
            while self.count.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        })
        .await
        .is_ok()
    }
}

/// Held for the lifetime of one WebSocket connection; decrements the
/// registry's count on drop and exposes a future that resolves once
/// shutdown has been requested.
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConnectionGuard {
    pub async fn closing(&mut self) {
        let _ = self.shutdown_rx.wait_for(|shutting_down| *shutting_down).await;
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn quiesce_returns_true_once_every_guard_drops() {
        let registry = ConnectionRegistry::new();
        let guard = registry.register();
        let handle = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.quiesce(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(guard);
        assert!(handle.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn quiesce_times_out_if_a_connection_never_closes() {
        let registry = ConnectionRegistry::new();
        let _guard = registry.register();
        assert!(!registry.quiesce(Duration::from_millis(100)).await);
    }
}
