//! Remote provider client
//!
//! Builds a chat-completion request (system prompt, rolling history, new user
//! turn), calls exactly one configured provider and returns the assistant
//! text. Any failure is reported as a `ProviderError`; the caller decides to
//! fall back. `FakeProvider` stands in for the network in tests.

use crate::config::{AgentConfig, ProviderKind};
use crate::conversation::{ConversationTurn, Role};
use crate::prompts;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Provider errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("no remote provider configured")]
    NotConfigured,

    #[error("missing API key for {0}")]
    MissingCredentials(ProviderKind),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {0}")]
    InvalidResponse(String),

    #[error("provider returned an empty reply")]
    EmptyResponse,

    #[error("request timeout after {0} seconds")]
    Timeout(u64),
}

/// A remote chat-completion backend
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /// Produce the assistant reply for `user_text` given prior turns
    async fn complete(
        &self,
        history: &[ConversationTurn],
        user_text: &str,
    ) -> Result<String, ProviderError>;
}

/// Run `complete` under a hard deadline
pub async fn complete_within(
    provider: &dyn ChatProvider,
    timeout: Duration,
    history: &[ConversationTurn],
    user_text: &str,
) -> Result<String, ProviderError> {
    match tokio::time::timeout(timeout, provider.complete(history, user_text)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(timeout.as_secs())),
    }
}

/// Build the configured provider, `None` in local-only mode
pub fn build_provider(config: &AgentConfig) -> Option<Arc<dyn ChatProvider>> {
    if !config.ai_configured() {
        return None;
    }
    match HttpProvider::from_config(config) {
        Ok(provider) => Some(Arc::new(provider)),
        Err(e) => {
            warn!("Remote provider unavailable, using local fallback: {}", e);
            None
        }
    }
}

/// OpenAI Chat Completions or Anthropic Messages over HTTPS
pub struct HttpProvider {
    kind: ProviderKind,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(
        kind: ProviderKind,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        if kind == ProviderKind::None {
            return Err(ProviderError::NotConfigured);
        }
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ProviderError::MissingCredentials(kind));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            kind,
            endpoint: endpoint.into(),
            api_key,
            model: model.into(),
            max_tokens,
            timeout,
            client,
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, ProviderError> {
        let endpoint = match config.provider {
            ProviderKind::None => return Err(ProviderError::NotConfigured),
            ProviderKind::OpenAi => &config.endpoints.openai,
            ProviderKind::Anthropic => &config.endpoints.anthropic,
        };
        let api_key = config
            .credential(config.provider)
            .ok_or(ProviderError::MissingCredentials(config.provider))?;
        Self::new(
            config.provider,
            endpoint.as_str(),
            api_key,
            config.model.as_str(),
            config.max_tokens,
            config.request_timeout,
        )
    }

    fn map_send_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(self.timeout.as_secs())
        } else {
            ProviderError::Http(format!("Request failed: {}", e))
        }
    }

    async fn post(&self, request: reqwest::RequestBuilder, body: &Value) -> Result<Value, ProviderError> {
        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl ChatProvider for HttpProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        history: &[ConversationTurn],
        user_text: &str,
    ) -> Result<String, ProviderError> {
        debug!(
            "Calling {} ({}) with {} history turns",
            self.kind,
            self.model,
            history.len()
        );

        let text = match self.kind {
            ProviderKind::None => return Err(ProviderError::NotConfigured),
            ProviderKind::OpenAi => {
                let body = openai_body(&self.model, self.max_tokens, history, user_text);
                let request = self.client.post(&self.endpoint).bearer_auth(&self.api_key);
                let reply = self.post(request, &body).await?;
                openai_content(&reply)?
            }
            ProviderKind::Anthropic => {
                let body = anthropic_body(&self.model, self.max_tokens, history, user_text);
                let request = self
                    .client
                    .post(&self.endpoint)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION);
                let reply = self.post(request, &body).await?;
                anthropic_content(&reply)?
            }
        };

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Chat Completions request: system, history, then the new user turn
pub fn openai_body(
    model: &str,
    max_tokens: u32,
    history: &[ConversationTurn],
    user_text: &str,
) -> Value {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(json!({"role": "system", "content": prompts::system_prompt()}));
    for turn in history {
        messages.push(json!({"role": turn.role.as_str(), "content": turn.content}));
    }
    messages.push(json!({"role": "user", "content": user_text}));

    json!({
        "model": model,
        "messages": messages,
        "max_tokens": max_tokens,
    })
}

/// Messages request: the system prompt is a top-level field and the
/// message list must open with a user turn
pub fn anthropic_body(
    model: &str,
    max_tokens: u32,
    history: &[ConversationTurn],
    user_text: &str,
) -> Value {
    let messages: Vec<Value> = history
        .iter()
        .filter(|turn| turn.role != Role::System)
        .skip_while(|turn| turn.role == Role::Assistant)
        .map(|turn| json!({"role": turn.role.as_str(), "content": turn.content}))
        .chain(std::iter::once(json!({"role": "user", "content": user_text})))
        .collect();

    json!({
        "model": model,
        "max_tokens": max_tokens,
        "system": prompts::system_prompt(),
        "messages": messages,
    })
}

fn openai_content(reply: &Value) -> Result<String, ProviderError> {
    reply
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .and_then(|v| v.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProviderError::InvalidResponse("missing choices[0].message.content".to_string()))
}

fn anthropic_content(reply: &Value) -> Result<String, ProviderError> {
    reply
        .get("content")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProviderError::InvalidResponse("missing content[0].text".to_string()))
}

/// Call recorded by `FakeProvider`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub history_len: usize,
    pub user_text: String,
}

/// Scripted provider for tests
pub struct FakeProvider {
    kind: ProviderKind,
    replies: Mutex<Vec<Result<String, ProviderError>>>,
    calls: AtomicUsize,
    recorded: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl FakeProvider {
    /// Replies are handed out in order; the last one repeats
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            replies: Mutex::new(replies),
            calls: AtomicUsize::new(0),
            recorded: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn always(reply: impl Into<String>) -> Self {
        Self::new(vec![Ok(reply.into())])
    }

    pub fn always_error(error: ProviderError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Sleep before answering, for timeout tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ChatProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        "fake"
    }

    async fn complete(
        &self,
        history: &[ConversationTurn],
        user_text: &str,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.recorded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                history_len: history.len(),
                user_text: user_text.to_string(),
            });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut replies = self.replies.lock().unwrap_or_else(|e| e.into_inner());
        match replies.len() {
            0 => Err(ProviderError::EmptyResponse),
            1 => replies[0].clone(),
            _ => replies.remove(0),
        }
    }
}
