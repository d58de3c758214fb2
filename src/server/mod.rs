//! Relay server
//!
//! Hosts the WebSocket relay endpoint and a small HTTP API.
//!
//! ```text
//! GET /ws        WebSocket: chat_message in, chat_response out
//! GET /health    liveness check
//! GET /status    agent name, session and pending counts
//! GET /sessions  live sessions
//! ```

mod handler;
mod runtime;
mod websocket;

pub use handler::{router, AppState};
pub use runtime::{Server, ServerBuilder, ServerState, ServerStatus};
