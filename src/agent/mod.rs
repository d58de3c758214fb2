//! Agent gateway: the reasoning backend behind the relay
//!
//! The relay sees an agent only as `invoke(text) → text`. Whatever the
//! backend does internally (tool calls, multi-step reasoning) is opaque.
//!
//! ```text
//! RelayCoordinator ──invoke──▶ Arc<dyn AgentGateway>
//!                                 ├ OpenAiAgent (chat completions over HTTP)
//!                                 └ EchoAgent   (offline)
//! ```

mod echo;
mod openai;

pub use echo::EchoAgent;
pub use openai::{OpenAiAgent, SecretString};

use crate::config::{resolve_api_key, AgentConfig, AgentProvider};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A reasoning backend that turns one user message into one reply.
///
/// Implementations hold no per-session state and must tolerate concurrent
/// calls from different sessions.
#[async_trait]
pub trait AgentGateway: Send + Sync {
    /// Short backend name for logs and status output
    fn name(&self) -> &str;

    /// Produce the complete reply for `text`.
    async fn invoke(&self, text: &str) -> Result<String>;
}

/// Build the configured agent backend
pub fn build_agent(config: &AgentConfig) -> Result<Arc<dyn AgentGateway>> {
    match config.provider {
        AgentProvider::Openai => {
            let api_key = resolve_api_key(config).map(SecretString::from);
            if api_key.is_none() {
                tracing::warn!(
                    api_key_ref = %config.api_key_ref,
                    "No API key found in environment; requests will be sent unauthenticated"
                );
            }
            Ok(Arc::new(OpenAiAgent::new(config, api_key)?))
        }
        AgentProvider::Echo => Ok(Arc::new(EchoAgent::new())),
    }
}
