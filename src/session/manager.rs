//! Session management

use crate::error::{Error, Result};
use crate::relay::ChatEvent;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, ready to accept a submission
    Idle,
    /// Connected, one submission awaiting its reply or error
    Pending,
    /// Connection closed; nothing more is delivered
    Disconnected,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    last_timestamp: DateTime<Utc>,
    last_activity: i64,
    message_count: u64,
}

/// Server-side state for one live client connection.
///
/// State is guarded by a synchronous mutex that is never held across an
/// `.await`, so the accept/echo/deliver steps are atomic with respect to
/// disconnect.
#[derive(Debug)]
pub struct Session {
    /// Session ID
    pub id: String,
    /// Creation timestamp (ms)
    pub created_at: i64,
    inner: Mutex<SessionInner>,
    outbound: mpsc::UnboundedSender<ChatEvent>,
}

impl Session {
    /// Create a connected, idle session delivering into `outbound`
    pub fn new(outbound: mpsc::UnboundedSender<ChatEvent>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now.timestamp_millis(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                last_timestamp: now,
                last_activity: now.timestamp_millis(),
                message_count: 0,
            }),
            outbound,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Whether the connection is still live
    pub fn is_connected(&self) -> bool {
        self.state() != SessionState::Disconnected
    }

    /// Whether a submission is awaiting its reply
    pub fn is_pending(&self) -> bool {
        self.state() == SessionState::Pending
    }

    /// Last activity timestamp (ms)
    pub fn last_activity(&self) -> i64 {
        self.lock().last_activity
    }

    /// Number of accepted submissions
    pub fn message_count(&self) -> u64 {
        self.lock().message_count
    }

    /// Try to accept a submission.
    ///
    /// Returns `None` when the session is disconnected, already pending, or
    /// the text is blank. On acceptance the session is pending until the
    /// returned [`PendingTurn`] is completed or dropped.
    pub fn submit(self: &Arc<Self>, text: &str) -> Option<PendingTurn> {
        let trimmed = text.trim();
        let mut inner = self.lock();
        if !inner.accepts(trimmed) {
            return None;
        }
        Some(self.begin_turn(&mut inner, trimmed))
    }

    /// Accept a submission and deliver its `user` echo under one lock.
    ///
    /// Nothing is echoed for a rejected submission, and a disconnect cannot
    /// fall between acceptance and the echo. A closed outbound stream
    /// disconnects the session and leaves it unaccepted.
    pub fn submit_with_echo(
        self: &Arc<Self>,
        message: &str,
        sender: &str,
    ) -> Result<Option<PendingTurn>> {
        let trimmed = message.trim();
        let mut inner = self.lock();
        if !inner.accepts(trimmed) {
            return Ok(None);
        }

        let echo = ChatEvent::user(message, sender, inner.next_stamp());
        if self.outbound.send(echo).is_err() {
            inner.state = SessionState::Disconnected;
            return Err(self.closed_stream());
        }

        Ok(Some(self.begin_turn(&mut inner, trimmed)))
    }

    fn begin_turn(self: &Arc<Self>, inner: &mut SessionInner, text: &str) -> PendingTurn {
        inner.state = SessionState::Pending;
        inner.message_count += 1;
        inner.last_activity = Utc::now().timestamp_millis();

        PendingTurn {
            session: Arc::clone(self),
            text: text.to_string(),
        }
    }

    /// Clear the pending marker. No-op unless pending.
    pub fn complete(&self) {
        let mut inner = self.lock();
        if inner.state == SessionState::Pending {
            inner.state = SessionState::Idle;
        }
    }

    /// Mark the connection closed
    pub fn disconnect(&self) {
        self.lock().state = SessionState::Disconnected;
    }

    /// Deliver an event to the client if the session is still connected.
    ///
    /// Returns `Ok(false)` when the event was discarded because the session
    /// is disconnected. A closed outbound stream is a transport failure and
    /// disconnects the session.
    pub fn deliver(&self, event: ChatEvent) -> Result<bool> {
        let mut inner = self.lock();
        if inner.state == SessionState::Disconnected {
            return Ok(false);
        }
        if self.outbound.send(event).is_err() {
            inner.state = SessionState::Disconnected;
            return Err(self.closed_stream());
        }
        inner.last_activity = Utc::now().timestamp_millis();
        Ok(true)
    }

    /// Next event timestamp; never earlier than the previous one.
    pub fn stamp(&self) -> DateTime<Utc> {
        self.lock().next_stamp()
    }

    fn closed_stream(&self) -> Error {
        Error::Transport(format!("outbound stream for session {} is closed", self.id))
    }
}

impl SessionInner {
    fn accepts(&self, trimmed: &str) -> bool {
        self.state == SessionState::Idle && !trimmed.is_empty()
    }

    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now().max(self.last_timestamp);
        self.last_timestamp = now;
        now
    }
}

/// An accepted submission holding its session in the pending state.
///
/// Dropping the turn completes the session, so the pending marker is
/// cleared on every exit path.
#[derive(Debug)]
pub struct PendingTurn {
    session: Arc<Session>,
    text: String,
}

impl PendingTurn {
    /// Trimmed submission text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Session this turn belongs to
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Complete the turn
    pub fn complete(self) {
        drop(self);
    }
}

impl Drop for PendingTurn {
    fn drop(&mut self) {
        self.session.complete();
    }
}

/// Registry of live sessions
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new connection.
    ///
    /// Returns the session and the receiving end of its outbound stream.
    pub async fn connect(&self) -> (Arc<Session>, mpsc::UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(tx));
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());

        tracing::info!(session_id = %session.id, "Created session");

        (session, rx)
    }

    /// Disconnect and forget a session
    pub async fn disconnect(&self, session_id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.write().await.remove(session_id)?;
        session.disconnect();

        tracing::info!(
            session_id = %session_id,
            messages = session.message_count(),
            "Terminated session"
        );

        Some(session)
    }

    /// Get session by ID
    pub async fn get_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Get all live sessions
    pub async fn active_sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_connected())
            .cloned()
            .collect()
    }

    /// Get session count
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session() -> (Arc<Session>, mpsc::UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Session::new(tx)), rx)
    }

    #[test]
    fn test_session_creation() {
        let (session, _rx) = new_session();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.is_connected());
        assert!(!session.is_pending());
        assert_eq!(session.message_count(), 0);
    }

    #[test]
    fn test_session_ids_unique() {
        let (a, _ra) = new_session();
        let (b, _rb) = new_session();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_submit_accepts_and_trims() {
        let (session, _rx) = new_session();
        let turn = session.submit("  hello \n").unwrap();
        assert_eq!(turn.text(), "hello");
        assert!(session.is_pending());
        assert_eq!(session.message_count(), 1);
    }

    #[test]
    fn test_submit_rejects_blank() {
        let (session, _rx) = new_session();
        assert!(session.submit("").is_none());
        assert!(session.submit(" \t\n").is_none());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.message_count(), 0);
    }

    #[test]
    fn test_submit_rejects_while_pending() {
        let (session, _rx) = new_session();
        let turn = session.submit("a").unwrap();
        assert!(session.submit("b").is_none());

        turn.complete();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.submit("b").is_some());
    }

    #[test]
    fn test_dropping_turn_completes() {
        let (session, _rx) = new_session();
        {
            let _turn = session.submit("a").unwrap();
            assert!(session.is_pending());
        }
        assert!(!session.is_pending());
    }

    #[test]
    fn test_submit_rejects_after_disconnect() {
        let (session, _rx) = new_session();
        session.disconnect();
        assert!(session.submit("hello").is_none());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_complete_after_disconnect_stays_disconnected() {
        let (session, _rx) = new_session();
        let turn = session.submit("a").unwrap();
        session.disconnect();
        turn.complete();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_submit_with_echo() {
        let (session, mut rx) = new_session();
        let turn = session.submit_with_echo(" hi ", "user-1").unwrap().unwrap();
        assert_eq!(turn.text(), "hi");
        assert!(session.is_pending());

        let echo = rx.try_recv().unwrap();
        assert_eq!(echo.kind, crate::relay::EventKind::User);
        assert_eq!(echo.message, " hi ");
        assert_eq!(echo.user_id, "user-1");
    }

    #[test]
    fn test_submit_with_echo_rejected_sends_nothing() {
        let (session, mut rx) = new_session();
        assert!(session.submit_with_echo("   ", "u").unwrap().is_none());

        let _turn = session.submit("a").unwrap();
        assert!(session.submit_with_echo("b", "u").unwrap().is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(session.message_count(), 1);
    }

    #[test]
    fn test_submit_with_echo_after_disconnect_sends_nothing() {
        let (session, mut rx) = new_session();
        session.disconnect();
        assert!(session.submit_with_echo("hello", "u").unwrap().is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_submit_with_echo_to_closed_stream_disconnects() {
        let (session, rx) = new_session();
        drop(rx);
        let err = session.submit_with_echo("hello", "u").unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.message_count(), 0);
    }

    #[test]
    fn test_deliver() {
        let (session, mut rx) = new_session();
        let event = ChatEvent::assistant("hi", session.stamp());
        assert!(session.deliver(event.clone()).unwrap());
        assert_eq!(rx.try_recv().unwrap(), event);
    }

    #[test]
    fn test_deliver_after_disconnect_is_discarded() {
        let (session, mut rx) = new_session();
        session.disconnect();
        let delivered = session
            .deliver(ChatEvent::assistant("late", session.stamp()))
            .unwrap();
        assert!(!delivered);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_deliver_to_closed_stream_disconnects() {
        let (session, rx) = new_session();
        drop(rx);
        let err = session
            .deliver(ChatEvent::assistant("hi", session.stamp()))
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(!session.is_connected());
    }

    #[test]
    fn test_stamp_is_monotonic() {
        let (session, _rx) = new_session();
        let mut previous = session.stamp();
        for _ in 0..100 {
            let next = session.stamp();
            assert!(next >= previous);
            previous = next;
        }
    }

    #[tokio::test]
    async fn test_session_manager() {
        let manager = SessionManager::new();

        let (a, _ra) = manager.connect().await;
        let (b, _rb) = manager.connect().await;
        assert_eq!(manager.session_count().await, 2);
        assert_ne!(a.id, b.id);
        assert!(manager.get_session(&a.id).await.is_some());
        assert_eq!(manager.active_sessions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_session_manager_disconnect() {
        let manager = SessionManager::new();
        let (session, _rx) = manager.connect().await;

        let removed = manager.disconnect(&session.id).await.unwrap();
        assert!(!removed.is_connected());
        assert!(manager.get_session(&session.id).await.is_none());
        assert_eq!(manager.session_count().await, 0);

        assert!(manager.disconnect(&session.id).await.is_none());
    }
}
