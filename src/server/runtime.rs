//! Relay server lifecycle

use crate::agent::{build_agent, AgentGateway};
use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::relay::RelayCoordinator;
use crate::server::handler::{router, AppState};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

/// How long `stop()` waits for open connections before aborting them
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Server state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not started
    Stopped,
    /// Binding the listener
    Starting,
    /// Accepting connections
    Running,
    /// Shutting down
    ShuttingDown,
}

/// ChatRelay server: HTTP API plus the WebSocket relay endpoint
pub struct Server {
    config: RelayConfig,
    state: Arc<RwLock<ServerState>>,
    coordinator: Arc<RelayCoordinator>,
    local_addr: RwLock<Option<SocketAddr>>,
    shutdown_tx: RwLock<Option<watch::Sender<bool>>>,
    serve_task: RwLock<Option<JoinHandle<()>>>,
}

impl Server {
    /// Create a server relaying to the given agent
    pub fn new(config: RelayConfig, agent: Arc<dyn AgentGateway>) -> Self {
        let coordinator = Arc::new(RelayCoordinator::new(agent, config.relay.clone()));
        Self {
            config,
            state: Arc::new(RwLock::new(ServerState::Stopped)),
            coordinator,
            local_addr: RwLock::new(None),
            shutdown_tx: RwLock::new(None),
            serve_task: RwLock::new(None),
        }
    }

    /// Get current state
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    /// Get configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Get the relay coordinator
    pub fn coordinator(&self) -> &Arc<RelayCoordinator> {
        &self.coordinator
    }

    /// Address the listener is bound to, while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }

    /// Bind the listener and start serving in the background.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut state = self.state.write().await;
        if *state != ServerState::Stopped {
            return Err(Error::Server("Server already running".to_string()));
        }
        *state = ServerState::Starting;
        drop(state);

        let bind_addr = self.config.server.bind_address();
        let listener = match TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                *self.state.write().await = ServerState::Stopped;
                return Err(Error::Server(format!(
                    "Failed to bind to {}: {}",
                    bind_addr, e
                )));
            }
        };
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app = router(AppState::new(
            self.coordinator.clone(),
            self.config.server.clone(),
            shutdown_rx.clone(),
        ));

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_requested(shutdown_rx))
                .await
            {
                tracing::error!("Server error: {}", e);
            }
        });

        *self.shutdown_tx.write().await = Some(shutdown_tx);
        *self.serve_task.write().await = Some(task);
        *self.local_addr.write().await = Some(addr);
        *self.state.write().await = ServerState::Running;

        tracing::info!(
            address = %addr,
            agent = self.coordinator.agent().name(),
            "ChatRelay listening"
        );

        Ok(addr)
    }

    /// Stop accepting connections, close open sockets and wait for the
    /// listener to finish.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != ServerState::Running {
            return Ok(());
        }
        *state = ServerState::ShuttingDown;
        drop(state);

        tracing::info!("Stopping ChatRelay");

        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(true);
        }

        let sessions = self.coordinator.sessions().active_sessions().await;
        for session in sessions {
            self.coordinator.disconnect(&session.id).await;
        }

        if let Some(mut task) = self.serve_task.write().await.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                tracing::warn!("Connections still open after grace period; aborting");
                task.abort();
            }
        }

        *self.local_addr.write().await = None;
        *self.state.write().await = ServerState::Stopped;

        tracing::info!("ChatRelay stopped");

        Ok(())
    }

    /// Get server status information
    pub async fn status(&self) -> ServerStatus {
        ServerStatus {
            state: format!("{:?}", self.state().await),
            address: self.local_addr().await.map(|a| a.to_string()),
            agent: self.coordinator.agent().name().to_string(),
            session_count: self.coordinator.sessions().session_count().await,
        }
    }
}

/// Resolves once `rx` reads `true`. Never resolves if the sender is gone.
pub(crate) async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    let sender_gone = rx.wait_for(|stop| *stop).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}

/// Server status information
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    /// Current state
    pub state: String,
    /// Bound address while running
    pub address: Option<String>,
    /// Agent backend name
    pub agent: String,
    /// Number of live sessions
    pub session_count: usize,
}

/// Builder for Server
pub struct ServerBuilder {
    config: RelayConfig,
    agent: Option<Arc<dyn AgentGateway>>,
}

impl ServerBuilder {
    /// Create a new builder with default config
    pub fn new() -> Self {
        Self {
            config: RelayConfig::default(),
            agent: None,
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the listen host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    /// Set the listen port (0 picks a free port)
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Use this agent instead of the configured backend
    pub fn agent(mut self, agent: Arc<dyn AgentGateway>) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Build the server
    pub fn build(self) -> Result<Server> {
        let agent = match self.agent {
            Some(agent) => agent,
            None => build_agent(&self.config.agent)?,
        };
        Ok(Server::new(self.config, agent))
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::EchoAgent;

    fn echo_server() -> Server {
        ServerBuilder::new()
            .host("127.0.0.1")
            .port(0)
            .agent(Arc::new(EchoAgent::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = ServerBuilder::new()
            .port(18790)
            .agent(Arc::new(EchoAgent::new()))
            .build()
            .unwrap();

        assert_eq!(server.state().await, ServerState::Stopped);
        assert_eq!(server.config().server.port, 18790);
        assert!(server.local_addr().await.is_none());
    }

    #[tokio::test]
    async fn test_server_lifecycle() {
        let server = echo_server();

        let addr = server.start().await.unwrap();
        assert_eq!(server.state().await, ServerState::Running);
        assert_eq!(server.local_addr().await, Some(addr));
        assert_ne!(addr.port(), 0);

        let status = server.status().await;
        assert_eq!(status.state, "Running");
        assert_eq!(status.agent, "echo");

        server.stop().await.unwrap();
        assert_eq!(server.state().await, ServerState::Stopped);
        assert!(server.local_addr().await.is_none());
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let server = echo_server();
        server.start().await.unwrap();
        assert!(matches!(server.start().await, Err(Error::Server(_))));
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let server = echo_server();
        server.stop().await.unwrap();
        assert_eq!(server.state().await, ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_restart() {
        let server = echo_server();
        server.start().await.unwrap();
        server.stop().await.unwrap();
        server.start().await.unwrap();
        assert_eq!(server.state().await, ServerState::Running);
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_resets_state() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let server = ServerBuilder::new()
            .port(port)
            .agent(Arc::new(EchoAgent::new()))
            .build()
            .unwrap();

        assert!(matches!(server.start().await, Err(Error::Server(_))));
        assert_eq!(server.state().await, ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_builder_uses_configured_agent() {
        let mut config = RelayConfig::default();
        config.agent.provider = crate::config::AgentProvider::Echo;
        let server = ServerBuilder::new().config(config).build().unwrap();
        assert_eq!(server.coordinator().agent().name(), "echo");
    }
}
