//! Real-time message relay between chat clients and the agent

mod coordinator;
pub mod types;

pub use coordinator::RelayCoordinator;
pub use types::{
    ChatEvent, ClientFrame, EventKind, InboundMessage, ServerFrame, ASSISTANT_SENDER,
    SYSTEM_SENDER,
};
