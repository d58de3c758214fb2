//! OpenAI-compatible chat completions backend

use super::AgentGateway;
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// A string wrapper that redacts its value in Debug and Display output.
/// Keeps API keys out of logs and error messages.
#[derive(Clone, Default)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Access the secret value (only for HTTP headers)
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Longest slice of an upstream error body kept in error messages
const MAX_ERROR_BODY: usize = 512;

/// Agent backed by an OpenAI-compatible `/v1/chat/completions` endpoint.
///
/// Every call is a fresh single-turn conversation.
#[derive(Debug, Clone)]
pub struct OpenAiAgent {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    system_prompt: Option<String>,
}

impl OpenAiAgent {
    /// Create a backend from configuration
    pub fn new(config: &AgentConfig, api_key: Option<SecretString>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            system_prompt: config.system_prompt.clone(),
        })
    }

    /// Model identifier sent with each request
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &self.system_prompt {
            messages.push(serde_json::json!({
                "role": "system",
                "content": system,
            }));
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": text,
        }));

        serde_json::json!({
            "model": self.model,
            "messages": messages,
        })
    }
}

#[async_trait]
impl AgentGateway for OpenAiAgent {
    fn name(&self) -> &str {
        "openai"
    }

    async fn invoke(&self, text: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let started = Instant::now();

        let mut request = self.client.post(&url).json(&self.request_body(text));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Agent(format!("Request to {} failed: {}", url, e)))?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let preview: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(Error::Agent(format!(
                "API error at {} ({}): {}",
                url, status, preview
            )));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Agent(format!("Failed to parse response: {}", e)))?;

        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| Error::Agent("Response contained no text".to_string()))?;

        tracing::debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            reply_len = reply.len(),
            "Agent call finished"
        );

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    /// Serve a fake completions endpoint; returns its base URL and captured requests.
    async fn fake_api(status: StatusCode, reply: serde_json::Value) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                let reply = reply.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    sink.lock().unwrap().push((auth, body));
                    (status, Json(reply))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), captured)
    }

    fn agent_for(base_url: &str, key: Option<&str>, system: Option<&str>) -> OpenAiAgent {
        let config = AgentConfig {
            base_url: format!("{}/", base_url),
            system_prompt: system.map(str::to_string),
            request_timeout_secs: 5,
            ..Default::default()
        };
        OpenAiAgent::new(&config, key.map(SecretString::from)).unwrap()
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
    }

    #[test]
    fn test_secret_string_redacts() {
        let secret = SecretString::new("sk-live-123");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(secret.expose(), "sk-live-123");
    }

    #[test]
    fn test_request_body() {
        let agent = agent_for("http://localhost", None, Some("Be brief."));
        let body = agent.request_body("hello");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let (base, captured) = fake_api(StatusCode::OK, completion("Hi there")).await;
        let agent = agent_for(&base, Some("sk-test"), None);

        let reply = agent.invoke("hello").await.unwrap();
        assert_eq!(reply, "Hi there");

        let requests = captured.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0.as_deref(), Some("Bearer sk-test"));
        assert_eq!(requests[0].1["messages"][0]["role"], "user");
        assert_eq!(requests[0].1["messages"][0]["content"], "hello");
    }

    #[tokio::test]
    async fn test_invoke_without_key_sends_no_auth() {
        let (base, captured) = fake_api(StatusCode::OK, completion("ok")).await;
        let agent = agent_for(&base, None, None);

        agent.invoke("hello").await.unwrap();
        assert!(captured.lock().unwrap()[0].0.is_none());
    }

    #[tokio::test]
    async fn test_invoke_upstream_error() {
        let (base, _captured) = fake_api(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({"error": {"message": "boom"}}),
        )
        .await;
        let agent = agent_for(&base, None, None);

        let err = agent.invoke("hello").await.unwrap_err();
        let Error::Agent(msg) = err else {
            panic!("expected agent error, got {err:?}");
        };
        assert!(msg.contains("500"));
        assert!(msg.contains("boom"));
    }

    #[tokio::test]
    async fn test_invoke_empty_choices() {
        let (base, _captured) =
            fake_api(StatusCode::OK, serde_json::json!({"choices": []})).await;
        let agent = agent_for(&base, None, None);

        assert!(matches!(agent.invoke("hello").await, Err(Error::Agent(_))));
    }

    #[tokio::test]
    async fn test_invoke_unreachable() {
        let agent = agent_for("http://127.0.0.1:9", None, None);
        assert!(matches!(agent.invoke("hello").await, Err(Error::Agent(_))));
    }
}
