//! Wire types exchanged with chat clients
//!
//! Every frame on the socket is a JSON envelope naming one of two events:
//!
//! ```text
//! client → relay   {"event":"chat_message",  "data":{"message":"hi","userId":"u1"}}
//! relay  → client  {"event":"chat_response", "data":{"type":"user","message":"hi",
//!                                                   "timestamp":"2025-01-01T00:00:00.000Z",
//!                                                   "userId":"u1"}}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender identity carried by `assistant` events
pub const ASSISTANT_SENDER: &str = "assistant";

/// Sender identity carried by `error` events
pub const SYSTEM_SENDER: &str = "system";

/// Kind of an outbound chat event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Echo of the user's own submission
    User,
    /// Agent reply
    Assistant,
    /// Agent failure, with a fixed client-safe message
    Error,
}

/// A typed, timestamped message delivered to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    #[serde(with = "iso8601_millis")]
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
}

impl ChatEvent {
    /// Echo of a user submission
    pub fn user(
        message: impl Into<String>,
        user_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EventKind::User,
            message: message.into(),
            timestamp,
            user_id: user_id.into(),
        }
    }

    /// Agent reply
    pub fn assistant(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Assistant,
            message: message.into(),
            timestamp,
            user_id: ASSISTANT_SENDER.to_string(),
        }
    }

    /// Failure notice
    pub fn error(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Error,
            message: message.into(),
            timestamp,
            user_id: SYSTEM_SENDER.to_string(),
        }
    }
}

/// A chat submission from a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message: String,
    /// Client-chosen identity, echoed back unverified. Missing and `null`
    /// both read as `None`.
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

impl InboundMessage {
    pub fn new(message: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_id: Some(user_id.into()),
        }
    }
}

/// Frames sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    ChatMessage(InboundMessage),
}

/// Frames sent by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    ChatResponse(ChatEvent),
}

/// ISO-8601 with millisecond precision and a `Z` suffix, as browsers emit it.
mod iso8601_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
