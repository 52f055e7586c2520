//! Gemini `generateContent` over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use catcher_types::{CatcherError, Result};

use crate::{Completer, Completion, Finish, OutputFormat, Prompt, TokenUsage};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const SERVICE: &str = "google";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Wait used when a 429 carries no `retryDelay`.
const DEFAULT_RETRY_AFTER_MS: u64 = 2_000;

pub(crate) fn api_key_from_env() -> Option<String> {
    ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
        .into_iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
}

#[derive(Debug)]
pub struct GeminiAdapter {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GeminiAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self> {
        api_key_from_env()
            .map(Self::new)
            .ok_or_else(|| CatcherError::AuthError {
                provider: SERVICE.into(),
            })
    }

    fn unreachable(&self, e: reqwest::Error) -> CatcherError {
        if e.is_timeout() {
            CatcherError::RequestTimeout {
                provider: SERVICE.into(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            CatcherError::ProviderError {
                provider: SERVICE.into(),
                status: 0,
                message: e.to_string(),
                retryable: true,
            }
        }
    }
}

fn request_body(prompt: &Prompt) -> Value {
    let mut body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt.text }] }],
    });
    if let Some(instruction) = &prompt.instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }

    let mut config = serde_json::Map::new();
    if let Some(tokens) = prompt.max_output_tokens {
        config.insert("maxOutputTokens".into(), json!(tokens));
    }
    if let Some(temperature) = prompt.temperature {
        config.insert("temperature".into(), json!(temperature));
    }
    if prompt.format == OutputFormat::Json {
        config.insert("responseMimeType".into(), json!("application/json"));
    }
    if !config.is_empty() {
        body["generationConfig"] = Value::Object(config);
    }
    body
}

fn parse_completion(model: &str, reply: &Value) -> Result<Completion> {
    if let Some(reason) = reply["promptFeedback"]["blockReason"].as_str() {
        tracing::warn!(reason, "Prompt blocked");
        return Ok(Completion {
            id: uuid::Uuid::new_v4().to_string(),
            text: String::new(),
            model: model.to_string(),
            usage: usage(reply),
            finish: Finish::Blocked,
        });
    }

    let candidate = reply["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| CatcherError::ProviderError {
            provider: SERVICE.into(),
            status: 200,
            message: "reply carried no candidates".into(),
            retryable: false,
        })?;

    let finish = match candidate["finishReason"].as_str() {
        Some("MAX_TOKENS") => Finish::Truncated,
        Some("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT") => Finish::Blocked,
        _ => Finish::Stop,
    };
    let text = candidate["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    Ok(Completion {
        id: reply["responseId"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        text,
        model: reply["modelVersion"].as_str().unwrap_or(model).to_string(),
        usage: usage(reply),
        finish,
    })
}

fn usage(reply: &Value) -> TokenUsage {
    let meta = &reply["usageMetadata"];
    TokenUsage {
        prompt: meta["promptTokenCount"].as_u64().unwrap_or(0),
        output: meta["candidatesTokenCount"].as_u64().unwrap_or(0),
    }
}

fn status_error(status: reqwest::StatusCode, body: &str) -> CatcherError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().map(|v| &v["error"]);
    let message = error
        .and_then(|e| e["message"].as_str())
        .map(String::from)
        .unwrap_or_else(|| body.to_string());

    match status.as_u16() {
        429 => CatcherError::RateLimited {
            provider: SERVICE.into(),
            retry_after_ms: error.and_then(retry_delay_ms).unwrap_or(DEFAULT_RETRY_AFTER_MS),
        },
        401 | 403 => CatcherError::AuthError {
            provider: SERVICE.into(),
        },
        code => CatcherError::ProviderError {
            provider: SERVICE.into(),
            status: code,
            message,
            retryable: matches!(code, 500 | 502 | 503 | 504),
        },
    }
}

/// `retryDelay` from a `google.rpc.RetryInfo` detail, e.g. `"13s"` or `"1.5s"`.
fn retry_delay_ms(error: &Value) -> Option<u64> {
    error["details"]
        .as_array()?
        .iter()
        .filter_map(|d| d["retryDelay"].as_str())
        .find_map(|delay| delay.strip_suffix('s')?.parse::<f64>().ok())
        .map(|secs| (secs * 1000.0).round() as u64)
}

#[async_trait]
impl Completer for GeminiAdapter {
    async fn complete(&self, model: &str, prompt: &Prompt) -> Result<Completion> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&request_body(prompt))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.unreachable(e))?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let reply: Value = serde_json::from_str(&body).map_err(|e| CatcherError::ProviderError {
            provider: SERVICE.into(),
            status: status.as_u16(),
            message: format!("unreadable reply: {e}"),
            retryable: false,
        })?;
        parse_completion(model, &reply)
    }

    fn service(&self) -> &'static str {
        SERVICE
    }
}
