//! ChatRelay - real-time chat relay for a tool-using AI agent
//!
//! ChatRelay accepts chat turns from browser clients over a persistent
//! WebSocket, echoes each turn back immediately, hands it to an agent
//! backend, and streams the reply (or a safe error notice) to the same
//! client.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  chat_message   ┌──────────────────────────────────────┐
//! │ Web client   │ ──────────────▶ │ server (axum)                        │
//! │              │ ◀────────────── │   /ws  ─▶ Session (one per socket)   │
//! └──────────────┘  chat_response  │            │                         │
//!                                  │            ▼                         │
//!                                  │   RelayCoordinator                   │
//!                                  │     1. validate + echo `user` event  │
//!                                  │        (Session::submit_with_echo)   │
//!                                  │     2. spawn agent.invoke(text)      │
//!                                  │     3. `assistant` | `error` event   │
//!                                  │     4. complete (always)             │
//!                                  └────────────┬─────────────────────────┘
//!                                               ▼
//!                                  ┌──────────────────────────┐
//!                                  │ AgentGateway (opaque)    │
//!                                  │   OpenAiAgent │ EchoAgent │
//!                                  └──────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`relay`]: per-message protocol and wire types
//! - [`session`]: connection sessions and their state machine
//! - [`agent`]: agent gateway trait and backends
//! - [`server`]: WebSocket endpoint, HTTP API, server lifecycle
//! - [`config`]: configuration management

pub mod agent;
pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod session;

pub use config::RelayConfig;
pub use error::{Error, Result};
