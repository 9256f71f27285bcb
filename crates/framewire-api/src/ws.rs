//! WebSocket frame relay with backpressure support.
//!
//! Each inbound `frame` event is answered by exactly one `bboxes` or `error`
//! event. Frames on a connection are handled one at a time; decoding and
//! inference run on the blocking pool so other connections keep moving.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use framewire_models::{ClientEvent, DetectionBatch, ServerEvent};
use framewire_vision::{FrameProcessor, VisionError, VisionResult};

use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

/// Outbound queue depth per connection.
const WS_SEND_BUFFER_SIZE: usize = 32;

/// WebSocket endpoint for frame events.
pub async fn ws_frames(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let max_bytes = state.config.max_frame_bytes;

    ws.max_message_size(max_bytes)
        .max_frame_size(max_bytes)
        .on_upgrade(move |socket| {
            let span = info_span!("ws", conn_id = %Uuid::new_v4());
            async move {
                let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
                metrics::record_ws_connection();
                metrics::set_ws_active_connections(count);
                info!(active = count, "Client connected");

                handle_socket(socket, state).await;

                let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
                metrics::set_ws_active_connections(count);
                info!(active = count, "Client disconnected");
            }
            .instrument(span)
        })
}

/// Drive one connection until the client leaves.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sender, mut receiver) = socket.split();

    // Bounded channel so a slow client applies backpressure to its own frames
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(
        async move {
            let mut ws_sender = ws_sender;
            while let Some(msg) = rx.recv().await {
                if ws_sender.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        }
        .in_current_span(),
    );

    let heartbeat_interval = state.config.heartbeat_interval;
    let mut heartbeat = interval(heartbeat_interval);
    heartbeat.tick().await;
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            client_msg = receiver.next() => {
                last_activity = Instant::now();
                let event = match client_msg {
                    Some(Ok(Message::Text(text))) => handle_message(&state, &text).await,
                    Some(Ok(Message::Binary(bytes))) => handle_binary(&state, bytes).await,
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive failed");
                        break;
                    }
                };

                if !send_event(&tx, &event).await {
                    warn!("WebSocket send failed, client disconnected");
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if last_activity.elapsed() >= heartbeat_interval / 2
                    && tx.send(Message::Ping(Vec::new())).await.is_err()
                {
                    warn!("Heartbeat failed, client disconnected");
                    break;
                }
            }
        }
    }

    drop(tx);
    let _ = send_task.await;
}

/// Handle one text message and produce the reply event.
pub async fn handle_message(state: &AppState, text: &str) -> ServerEvent {
    match ClientEvent::from_json(text) {
        Ok(ClientEvent::Frame(payload)) => {
            metrics::record_frame_received();
            let Some(image) = payload.image() else {
                return frame_failed(state, VisionError::decode("No image data received"));
            };
            let image = image.to_string();
            run_frame(state, move |processor| processor.process_base64(&image)).await
        }
        Ok(ClientEvent::Ping) => ServerEvent::Pong,
        Err(e) => {
            warn!(error = %e, "Invalid client event");
            metrics::record_frame_failure("invalid_event");
            ServerEvent::error(e.to_string())
        }
    }
}

/// Handle a binary message holding raw encoded image bytes.
pub async fn handle_binary(state: &AppState, bytes: Vec<u8>) -> ServerEvent {
    metrics::record_frame_received();
    run_frame(state, move |processor| processor.process(&bytes)).await
}

async fn run_frame<F>(state: &AppState, job: F) -> ServerEvent
where
    F: FnOnce(&FrameProcessor) -> VisionResult<DetectionBatch> + Send + 'static,
{
    let processor = Arc::clone(&state.processor);
    let start = Instant::now();

    let result = tokio::task::spawn_blocking(move || job(&processor))
        .await
        .unwrap_or_else(|e| Err(VisionError::unexpected(format!("Frame task failed: {}", e))));

    match result {
        Ok(batch) => {
            metrics::record_frame_processed(batch.len(), start.elapsed().as_secs_f64());
            debug!(detections = batch.len(), "Frame processed");
            ServerEvent::bboxes(batch)
        }
        Err(e) => frame_failed(state, e),
    }
}

fn frame_failed(state: &AppState, err: VisionError) -> ServerEvent {
    error!(kind = err.kind(), error = ?err, "Frame processing failed");
    metrics::record_frame_failure(err.kind());
    ServerEvent::error(client_message(&err, state.config.is_production()))
}

/// Message shown to the client; internal details are hidden in production.
fn client_message(err: &VisionError, production: bool) -> String {
    match err {
        VisionError::Decode(_) | VisionError::Model(_) => err.to_string(),
        _ if production => "An internal error occurred".to_string(),
        _ => err.to_string(),
    }
}

/// Queue an event for the send task, waiting when the buffer is full.
async fn send_event(tx: &mpsc::Sender<Message>, event: &ServerEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            error!(error = %e, "Failed to serialize event");
            return false;
        }
    };
    metrics::record_ws_message_sent(event.name());

    match tx.try_send(Message::Text(json)) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(msg)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(msg).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_hides_internal_errors_in_production() {
        let err = VisionError::unexpected("thread panicked at inference.rs:42");
        assert_eq!(client_message(&err, true), "An internal error occurred");
        assert!(client_message(&err, false).contains("inference.rs"));

        let err = VisionError::decode("No image data received");
        assert_eq!(client_message(&err, true), "No image data received");
    }

    #[tokio::test]
    async fn test_send_event_serializes() {
        let (tx, mut rx) = mpsc::channel(1);
        assert!(send_event(&tx, &ServerEvent::Pong).await);
        match rx.recv().await {
            Some(Message::Text(text)) => assert_eq!(text, r#"{"event":"pong"}"#),
            other => panic!("Expected text message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_event_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(!send_event(&tx, &ServerEvent::Pong).await);
    }
}
