//! WebSocket transport adapter
//!
//! Maps socket lifecycle onto session transitions: upgrade → connect,
//! `chat_message` frame → submit, close or error → disconnect.

use crate::relay::{ClientFrame, ServerFrame};
use crate::server::handler::AppState;
use crate::server::runtime::shutdown_requested;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::{Instant, Interval};

/// Longest slice of an invalid frame echoed into logs
const LOG_PREVIEW_CHARS: usize = 200;

/// WebSocket upgrade handler
///
/// A connection slot is reserved before upgrading and held for the life of
/// the socket.
pub(crate) async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let slot = match state.connection_slots.clone().try_acquire_owned() {
        Ok(slot) => slot,
        Err(_) => {
            tracing::warn!(
                max = state.config.max_connections,
                "Refusing WebSocket connection: limit reached"
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, slot))
}

/// Drive one client connection until either side closes.
async fn handle_socket(socket: WebSocket, state: AppState, _slot: OwnedSemaphorePermit) {
    let (session, mut events) = state.coordinator.connect().await;
    let session_id = session.id.clone();
    tracing::info!(session_id = %session_id, "Client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Relay → client: chat events, keepalive pings, close on shutdown
    let ping_every = state.config.ws_ping_interval;
    let shutdown = state.shutdown.clone();
    let send_session_id = session_id.clone();
    let mut send_task = tokio::spawn(async move {
        let mut pings = ping_interval(ping_every);
        let stop = shutdown_requested(shutdown);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let json = match serde_json::to_string(&ServerFrame::ChatResponse(event)) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!(session_id = %send_session_id, "Failed to encode event: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        tracing::debug!(session_id = %send_session_id, "WebSocket send failed");
                        break;
                    }
                }
                _ = next_ping(&mut pings) => {
                    if ws_sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                _ = &mut stop => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Client → relay: chat submissions
    let coordinator = state.coordinator.clone();
    let recv_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(ClientFrame::ChatMessage(inbound)) => {
                        coordinator.submit(&recv_session, inbound);
                    }
                    Err(e) => {
                        let preview: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
                        tracing::warn!(
                            session_id = %recv_session.id,
                            "Invalid client frame: {} (raw: {})",
                            e,
                            preview
                        );
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.coordinator.disconnect(&session_id).await;

    tracing::info!(session_id = %session_id, "Client disconnected");
}

fn ping_interval(every_secs: u64) -> Option<Interval> {
    (every_secs > 0).then(|| {
        let period = Duration::from_secs(every_secs);
        tokio::time::interval_at(Instant::now() + period, period)
    })
}

async fn next_ping(pings: &mut Option<Interval>) {
    match pings {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
