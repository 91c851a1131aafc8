use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::connections::ConnectionGuard;
use crate::protocol::InboundMessage;
use crate::state::AppState;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One WebSocket connection's lifetime: parse each inbound text frame,
/// run it through the [`Pipeline`](convocore_pipeline::Pipeline), and
/// forward every emitted event back out as a JSON text frame, in order
/// (spec.md §5 "ordering guarantees"). Stops immediately once the
/// connection drops or shutdown is requested, cancelling whatever the
/// pipeline is mid-doing (spec.md §5 "cancellation").
async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut guard = state.connections.register();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = guard.closing() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !run_one_message(&state, text.as_str(), &mut sink, &mut guard).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "websocket receive error");
                        break;
                    }
                }
            }
        }
    }
}

/// Returns `false` if the outgoing sink has failed, or the connection is
/// closing mid-turn, and the connection should close.
///
/// Races every step of draining the pipeline's event channel against
/// `guard.closing()` so a dropped connection or a shutdown signal aborts
/// the in-flight upstream call immediately instead of waiting for it to
/// finish on its own (spec.md §5 "cancellation").
async fn run_one_message(
    state: &AppState,
    text: &str,
    sink: &mut (impl Sink<Message, Error = axum::Error> + Unpin),
    guard: &mut ConnectionGuard,
) -> bool {
    let inbound: InboundMessage = match serde_json::from_str(text) {
        Ok(inbound) => inbound,
        Err(err) => {
            tracing::warn!(error = %err, "dropping malformed inbound message");
            return true;
        }
    };

    let (tx, mut rx) = mpsc::channel(32);
    let pipeline = state.pipeline.clone();
    let request = inbound.into();
    let driver = tokio::spawn(async move { pipeline.process(&tx, request).await });

    loop {
        tokio::select! {
            _ = guard.closing() => {
                driver.abort();
                let _ = sink.send(Message::Close(None)).await;
                return false;
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::error!(error = %err, "failed to serialize outbound event");
                        continue;
                    }
                };
                if sink.send(Message::Text(payload.into())).await.is_err() {
                    driver.abort();
                    return false;
                }
            }
        }
    }

    let _ = driver.await;
    true
}
