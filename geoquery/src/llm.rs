use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::prompt::Prompt;

// ---------- errors ----------

#[derive(Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Network failure, non-2xx, undecodable or empty response.
    Unavailable(String),
    Cancelled,
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Unavailable(msg) => write!(f, "LLM unavailable: {msg}"),
            LlmError::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::error::Error for LlmError {}

// ---------- trait ----------

/// Untrusted SQL generator. Output is only a candidate until validated.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &Prompt,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError>;
}

/// Strip optional code fences, trailing semicolons and surrounding whitespace.
pub fn clean_sql_output(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```SQL"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim().trim_end_matches(';').trim_end().to_string()
}

// ---------- OpenAI-compatible client ----------

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    cfg: LlmConfig,
}

impl ChatCompletionsClient {
    pub fn new(cfg: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| LlmError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'))
    }

    async fn request(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let payload = serde_json::json!({
            "model": self.cfg.model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user }
            ],
            "temperature": self.cfg.temperature,
            "max_tokens": self.cfg.max_tokens,
        });

        let mut req = self.http.post(self.endpoint()).json(&payload);
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(200).collect();
            return Err(LlmError::Unavailable(format!("HTTP {status}: {truncated}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| LlmError::Unavailable(format!("invalid JSON response: {e}")))?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Unavailable("response has no message content".into()))?;

        let sql = clean_sql_output(content);
        if sql.is_empty() {
            return Err(LlmError::Unavailable("empty response".into()));
        }
        Ok(sql)
    }
}

#[async_trait]
impl SqlGenerator for ChatCompletionsClient {
    async fn generate(
        &self,
        prompt: &Prompt,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let start = std::time::Instant::now();
        let result = tokio::select! {
            res = self.request(prompt) => res,
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
        };
        tracing::debug!(model = %self.cfg.model, elapsed = ?start.elapsed(), ok = result.is_ok(), "LLM call finished");
        result
    }
}
