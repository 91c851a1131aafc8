use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use convocore_pipeline::Quiesce;
use tokio::sync::Notify;

/// Bridges `axum::serve(...).with_graceful_shutdown(...)` into the
/// `Quiesce` contract: step 1 of spec.md §4.8 is "stop accepting new
/// connections", which is exactly what dropping the listener future does.
pub struct ListenerHandle {
    notify: Arc<Notify>,
}

impl ListenerHandle {
    /// Returns the handle plus the `Notify` the serve future should await.
    pub fn new() -> (Self, Arc<Notify>) {
        let notify = Arc::new(Notify::new());
        (Self { notify: notify.clone() }, notify)
    }
}

#[async_trait]
impl Quiesce for ListenerHandle {
    async fn quiesce(&self, _deadline: Duration) -> bool {
        self.notify.notify_waiters();
        true
    }
}
