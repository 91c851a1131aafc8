mod connections;
mod listener;
mod protocol;
mod state;
mod telemetry;
mod ws;

use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use convocore_attachments::{AttachmentPolicy, AttachmentProcessor, NullExtractor};
use convocore_core::{Config, NullChatStore};
use convocore_history::HistoryNormalizer;
use convocore_memory::{InMemoryVectorStore, VectorIndexer};
use convocore_pipeline::{Pipeline, ShutdownController};
use convocore_ratelimit::{RateLimiter, RateLimiterConfig};
use convocore_upstream::gemini::GeminiClient;
use convocore_upstream::{CredentialCache, UpstreamConnector};
use tower_http::trace::TraceLayer;

use crate::connections::ConnectionRegistry;
use crate::listener::ListenerHandle;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    telemetry::init();
    let config = Config::from_env();

    let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        tracing::warn!("GEMINI_API_KEY is not set; upstream requests will fail until one is configured");
        String::new()
    });
    let server_client = match GeminiClient::new(&api_key, config.gemini_model.clone()) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            tracing::error!(error = %err, "failed to construct the Gemini client; exiting");
            std::process::exit(1);
        }
    };

    let rate_limiter = RateLimiter::new(RateLimiterConfig {
        per_minute: config.rate_limit_per_minute,
        per_hour: config.rate_limit_per_hour,
        ..RateLimiterConfig::default()
    });
    rate_limiter.spawn_gc();

    let normalizer = Arc::new(HistoryNormalizer::new(AttachmentPolicy::default()));
    let processor = Arc::new(AttachmentProcessor::new(AttachmentPolicy::default(), Arc::new(NullExtractor)));
    let credentials = Arc::new(CredentialCache::new(server_client, config.gemini_model.clone()));
    let tools: Arc<HashMap<String, Arc<dyn convocore_core::ToolHandler>>> = Arc::new(HashMap::new());
    let connector = Arc::new(UpstreamConnector::new(credentials, tools));
    let vector_store = Arc::new(InMemoryVectorStore::new());
    let indexer = Arc::new(VectorIndexer::new(vector_store));

    let pipeline = Arc::new(Pipeline::new(
        rate_limiter.clone(),
        normalizer,
        processor,
        connector,
        indexer,
        Vec::new(),
    ));

    let connections = ConnectionRegistry::new();
    let (listener_handle, shutdown_notify) = ListenerHandle::new();

    let shutdown_controller = Arc::new(ShutdownController::new(
        Arc::new(listener_handle),
        connections.clone(),
        rate_limiter,
        vec![Arc::new(NullChatStore)],
    ));

    let state = AppState { pipeline, connections };
    let app = Router::new()
        .route("/ws", get(ws::upgrade))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(bind_addr = %config.bind_addr, error = %err, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(bind_addr = %config.bind_addr, "listening");

    let mut serve_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_notify.notified().await;
            })
            .await
    });

    // spec.md §4.8: shutdown triggers on a signal, an uncaught panic, or the
    // server task failing on its own, not only on SIGTERM/SIGINT.
    let server_task_died_first = tokio::select! {
        _ = wait_for_signal() => {
            tracing::info!("shutdown signal received, draining");
            false
        }
        result = &mut serve_handle => {
            match result {
                Ok(Ok(())) => tracing::error!("server task exited before a shutdown signal was received"),
                Ok(Err(err)) => tracing::error!(error = %err, "server task returned an error before a shutdown signal was received"),
                Err(err) => tracing::error!(error = %err, "server task panicked before a shutdown signal was received"),
            }
            true
        }
    };

    let exit_code = shutdown_controller.shutdown().await;

    if !server_task_died_first {
        if let Err(err) = serve_handle.await {
            tracing::error!(error = %err, "server task panicked during shutdown");
        }
    }

    std::process::exit(if server_task_died_first { 1 } else { exit_code });
}

/// Waits for `SIGTERM` or `SIGINT` (spec.md §4.8 "On signal").
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received ctrl-c");
    }
}
