//! Connection sessions
//!
//! One [`Session`] per live client connection. State transitions are
//! explicit methods invoked by the transport adapter and the relay:
//!
//! ```text
//!            submit (accepted)
//!   Idle ─────────────────────▶ Pending
//!     ▲                           │
//!     └────────── complete ───────┘
//!
//!   Idle | Pending ── disconnect ──▶ Disconnected
//! ```

mod manager;

pub use manager::{PendingTurn, Session, SessionManager, SessionState};
