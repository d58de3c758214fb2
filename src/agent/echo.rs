//! Offline agent that answers with the input

use super::AgentGateway;
use crate::error::Result;
use async_trait::async_trait;

/// Agent that replies with a prefixed copy of every message.
///
/// Lets the relay run end to end without network access or credentials.
#[derive(Debug, Clone)]
pub struct EchoAgent {
    prefix: String,
}

impl EchoAgent {
    pub fn new() -> Self {
        Self::with_prefix("Echo: ")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for EchoAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentGateway for EchoAgent {
    fn name(&self) -> &str {
        "echo"
    }

    async fn invoke(&self, text: &str) -> Result<String> {
        Ok(format!("{}{}", self.prefix, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_custom_prefix() {
        let agent = EchoAgent::with_prefix("> ");
        assert_eq!(agent.invoke("hi").await.unwrap(), "> hi");
    }
}
