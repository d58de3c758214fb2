//! Relay coordinator
//!
//! Runs the per-message protocol for every session:
//!
//! ```text
//! submit ─▶ Session::submit_with_echo ─▶ spawn ─▶ agent.invoke ─▶ assistant | error
//!              │ rejected      (accept + user echo)                     │
//!              ▼                                                        ▼
//!           (no-op)                                            PendingTurn dropped
//! ```
//!
//! The echo is delivered before the agent task is spawned, so it always
//! precedes the reply on the session's outbound stream.

use crate::agent::AgentGateway;
use crate::config::RelaySettings;
use crate::error::{Error, Result};
use crate::relay::types::{ChatEvent, InboundMessage};
use crate::session::{PendingTurn, Session, SessionManager};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Hub between client sessions and the agent gateway
pub struct RelayCoordinator {
    agent: Arc<dyn AgentGateway>,
    sessions: Arc<SessionManager>,
    settings: RelaySettings,
}

impl RelayCoordinator {
    /// Create a coordinator around an agent backend
    pub fn new(agent: Arc<dyn AgentGateway>, settings: RelaySettings) -> Self {
        Self {
            agent,
            sessions: Arc::new(SessionManager::new()),
            settings,
        }
    }

    /// Session registry
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Agent backend
    pub fn agent(&self) -> &Arc<dyn AgentGateway> {
        &self.agent
    }

    /// Relay settings
    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Open a session for a new connection
    pub async fn connect(&self) -> (Arc<Session>, mpsc::UnboundedReceiver<ChatEvent>) {
        self.sessions.connect().await
    }

    /// Close a session. In-flight agent calls run on, but their results
    /// are discarded.
    pub async fn disconnect(&self, session_id: &str) {
        if let Some(session) = self.sessions.disconnect(session_id).await {
            if session.is_pending() {
                tracing::debug!(
                    session_id = %session_id,
                    "Session closed with an agent call in flight; its result will be dropped"
                );
            }
        }
    }

    /// Handle one inbound submission.
    ///
    /// Rejected submissions (blank text, disconnected or busy session) are
    /// dropped silently and return `None`. Otherwise the echo has been
    /// delivered by the time this returns, and the handle resolves once the
    /// reply or error has been emitted and the session is idle again.
    pub fn submit(
        &self,
        session: &Arc<Session>,
        message: InboundMessage,
    ) -> Option<JoinHandle<()>> {
        let sender = message
            .user_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| session.id.clone());

        let turn = match session.submit_with_echo(&message.message, &sender) {
            Ok(Some(turn)) => turn,
            Ok(None) => {
                tracing::debug!(
                    session_id = %session.id,
                    pending = session.is_pending(),
                    "Ignoring submission"
                );
                return None;
            }
            Err(e) => {
                tracing::debug!(session_id = %session.id, "Echo not delivered: {}", e);
                return None;
            }
        };

        tracing::info!(
            session_id = %session.id,
            user_id = %sender,
            len = message.message.len(),
            "Received message"
        );

        let agent = self.agent.clone();
        let timeout = self.settings.agent_timeout();
        let error_message = self.settings.error_message.clone();
        Some(tokio::spawn(dispatch(agent, turn, timeout, error_message)))
    }
}

/// Run the agent for an accepted turn and emit its outcome.
async fn dispatch(
    agent: Arc<dyn AgentGateway>,
    turn: PendingTurn,
    timeout: Option<Duration>,
    error_message: String,
) {
    let started = Instant::now();
    let outcome = AssertUnwindSafe(invoke_with_deadline(agent.as_ref(), turn.text(), timeout))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(Error::Internal("agent call panicked".to_string())));

    let session = turn.session();
    let event = match outcome {
        Ok(reply) => {
            tracing::info!(
                session_id = %session.id,
                agent = agent.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Agent replied"
            );
            ChatEvent::assistant(reply, session.stamp())
        }
        Err(e) => {
            tracing::warn!(
                session_id = %session.id,
                agent = agent.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Agent invocation failed: {}",
                e
            );
            ChatEvent::error(error_message, session.stamp())
        }
    };

    match session.deliver(event) {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(session_id = %session.id, "Discarding result for closed session");
        }
        Err(e) => {
            tracing::debug!(session_id = %session.id, "Result not delivered: {}", e);
        }
    }

    turn.complete();
}

async fn invoke_with_deadline(
    agent: &dyn AgentGateway,
    text: &str,
    timeout: Option<Duration>,
) -> Result<String> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, agent.invoke(text))
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => agent.invoke(text).await,
    }
}
