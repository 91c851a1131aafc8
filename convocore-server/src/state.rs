use std::sync::Arc;

use convocore_pipeline::Pipeline;

use crate::connections::ConnectionRegistry;

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub connections: Arc<ConnectionRegistry>,
}
