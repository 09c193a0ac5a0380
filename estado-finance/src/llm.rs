//! Language-model access: the [`LanguageModel`] seam, retry with backoff, and
//! an HTTP client for the OpenAI and Anthropic chat APIs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model not available: {0}")]
    Unavailable(String),
    #[error("language model request failed: {0}")]
    Request(String),
    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("language model timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed language model response: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Transport failures, rate limits and server errors are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Request(_) | LlmError::Timeout(_) => true,
            LlmError::Status { status, .. } => *status == 429 || *status >= 500,
            LlmError::Unavailable(_) | LlmError::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Request(err.to_string())
    }
}

/// A chat model reachable with a system prompt and one user message.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn is_available(&self) -> bool;

    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Delay before the second attempt, doubled after each failure
    pub base_delay: Duration,
    /// Budget for all attempts together
    pub total_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
            total_timeout: Duration::from_secs(60),
        }
    }
}

/// Call the model, retrying retryable failures with exponential backoff
/// until the attempts or the total timeout run out.
pub async fn complete_with_retry(
    model: &dyn LanguageModel,
    system: &str,
    user: &str,
    policy: &RetryPolicy,
) -> Result<String, LlmError> {
    if !model.is_available() {
        return Err(LlmError::Unavailable("no model configured".to_string()));
    }
    let max_attempts = policy.attempts.max(1);

    let attempts = async {
        let mut attempt = 1;
        let mut delay = policy.base_delay;
        loop {
            match model.complete(system, user).await {
                Ok(text) => {
                    debug!(attempt, chars = text.len(), "language model answered");
                    return Ok(text);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(attempt, error = %e, "language model call failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    };

    match tokio::time::timeout(policy.total_timeout, attempts).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(policy.total_timeout)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAI => "openai",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-3-5-sonnet-latest",
            Provider::OpenAI => "gpt-4o-mini",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::OpenAI => "https://api.openai.com",
        }
    }
}

/// Chat completion over HTTP
#[derive(Debug, Clone)]
pub struct HttpLanguageModel {
    client: reqwest::Client,
    provider: Provider,
    model: String,
    api_key: Option<String>,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    request_timeout: Duration,
}

impl HttpLanguageModel {
    pub fn new(provider: Provider, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider,
            model: model.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: provider.default_base_url().to_string(),
            temperature: 0.1,
            max_tokens: 2048,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn key(&self) -> Result<&str, LlmError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| LlmError::Unavailable(format!("missing {} API key", self.provider.as_str())))
    }

    async fn send<B: Serialize>(&self, request: reqwest::RequestBuilder, body: &B) -> Result<reqwest::Response, LlmError> {
        let resp = request
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.request_timeout)
                } else {
                    LlmError::from(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                provider: self.provider.as_str(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn anthropic_complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            system: &'a str,
            messages: Vec<Msg<'a>>,
        }

        #[derive(Deserialize)]
        struct Resp {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            t: String,
            text: Option<String>,
        }

        let body = Req {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system,
            messages: vec![Msg { role: "user", content: user }],
        };
        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.key()?)
            .header("anthropic-version", "2023-06-01");

        let out: Resp = self
            .send(request, &body)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        let mut s = String::new();
        for b in out.content {
            if b.t == "text" {
                if let Some(t) = b.text {
                    s.push_str(&t);
                }
            }
        }
        Ok(s.trim().to_string())
    }

    async fn openai_complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MsgOut,
        }

        #[derive(Deserialize)]
        struct MsgOut {
            content: Option<String>,
        }

        let body = Req {
            model: &self.model,
            messages: vec![
                Msg { role: "system", content: system },
                Msg { role: "user", content: user },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.key()?));

        let out: Resp = self
            .send(request, &body)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        let content = out
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::Malformed("response has no choices".to_string()))?;
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        match self.provider {
            Provider::Anthropic => self.anthropic_complete(system, user).await,
            Provider::OpenAI => self.openai_complete(system, user).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Flaky {
        failures: Mutex<Vec<LlmError>>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl LanguageModel for Flaky {
        fn is_available(&self) -> bool {
            true
        }

        async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
            *self.calls.lock().unwrap() += 1;
            match self.failures.lock().unwrap().pop() {
                Some(e) => Err(e),
                None => Ok("{}".to_string()),
            }
        }
    }

    fn quick() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            total_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let model = Flaky {
            failures: Mutex::new(vec![LlmError::Request("reset".into()), LlmError::Timeout(Duration::from_secs(1))]),
            calls: Mutex::new(0),
        };
        let out = complete_with_retry(&model, "s", "u", &quick()).await.unwrap();
        assert_eq!(out, "{}");
        assert_eq!(*model.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let model = Flaky {
            failures: Mutex::new((0..5).map(|_| LlmError::Request("down".into())).collect()),
            calls: Mutex::new(0),
        };
        let err = complete_with_retry(&model, "s", "u", &quick()).await.unwrap_err();
        assert!(matches!(err, LlmError::Request(_)));
        assert_eq!(*model.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let model = Flaky {
            failures: Mutex::new(vec![LlmError::Status {
                provider: "openai",
                status: 401,
                body: String::new(),
            }]),
            calls: Mutex::new(0),
        };
        assert!(complete_with_retry(&model, "s", "u", &quick()).await.is_err());
        assert_eq!(*model.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let model = HttpLanguageModel::new(Provider::OpenAI, "gpt-4o-mini", Some("  ".into()));
        assert!(!model.is_available());
        let err = complete_with_retry(&model, "s", "u", &quick()).await.unwrap_err();
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[test]
    fn test_provider_serde_names() {
        assert_eq!(serde_json::to_string(&Provider::OpenAI).unwrap(), "\"openai\"");
        assert_eq!(serde_json::from_str::<Provider>("\"anthropic\"").unwrap(), Provider::Anthropic);
    }
}
