use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use catcher_types::{CatcherError, Result};

use crate::gemini::{api_key_from_env, GeminiAdapter, DEFAULT_MODEL};
use crate::{Completion, Prompt, RetryPolicy};

// ---------------------------------------------------------------------------
// Completer
// ---------------------------------------------------------------------------

/// A hosted model that turns one prompt into one completion.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, model: &str, prompt: &Prompt) -> Result<Completion>;

    /// Service name used in logs and errors.
    fn service(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// ServiceStatus
// ---------------------------------------------------------------------------

/// Whether the completion service can be used, without calling it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub key_configured: bool,
    pub model: String,
}

impl ServiceStatus {
    pub fn from_env() -> Self {
        Self {
            key_configured: api_key_from_env().is_some(),
            model: model_from_env(),
        }
    }
}

fn model_from_env() -> String {
    std::env::var("CATCHER_MODEL")
        .ok()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

// ---------------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct LlmClient {
    completer: Arc<dyn Completer>,
    model: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("service", &self.completer.service())
            .field("model", &self.model)
            .field("retry", &self.retry)
            .finish()
    }
}

impl LlmClient {
    pub fn new(completer: impl Completer + 'static) -> Self {
        Self {
            completer: Arc::new(completer),
            model: DEFAULT_MODEL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Gemini with the key from `GEMINI_API_KEY` (or `GOOGLE_API_KEY`) and
    /// the model from `CATCHER_MODEL`.
    pub fn from_env() -> Result<Self> {
        let adapter = GeminiAdapter::from_env()?;
        Ok(Self::new(adapter).with_model(model_from_env()))
    }

    pub async fn complete(&self, operation: &str, prompt: &Prompt) -> Result<Completion> {
        tracing::debug!(
            operation,
            service = self.completer.service(),
            model = %self.model,
            chars = prompt.len_chars(),
            format = ?prompt.format,
            "Completion request"
        );
        let completion = self
            .retry
            .run(operation, || self.completer.complete(&self.model, prompt))
            .await?;
        tracing::info!(
            operation,
            model = %completion.model,
            prompt_tokens = completion.usage.prompt,
            output_tokens = completion.usage.output,
            finish = ?completion.finish,
            "Completion received"
        );
        if !completion.is_complete() {
            tracing::warn!(operation, finish = ?completion.finish, "Completion cut short");
        }
        Ok(completion)
    }

    /// Like [`LlmClient::complete`] but a withheld answer is an error.
    pub async fn complete_text(&self, operation: &str, prompt: &Prompt) -> Result<String> {
        let completion = self.complete(operation, prompt).await?;
        if completion.finish == crate::Finish::Blocked {
            return Err(CatcherError::upstream(operation, "answer withheld by safety filter"));
        }
        Ok(completion.text)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Finish, TokenUsage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<(String, Prompt)>>>,
        failures: AtomicUsize,
        finish: Finish,
    }

    #[async_trait]
    impl Completer for Recorder {
        async fn complete(&self, model: &str, prompt: &Prompt) -> Result<Completion> {
            self.seen
                .lock()
                .unwrap()
                .push((model.to_string(), prompt.clone()));
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(CatcherError::RequestTimeout {
                    provider: "recorder".into(),
                    timeout_ms: 10,
                });
            }
            Ok(Completion {
                id: "r1".into(),
                text: format!("re: {}", prompt.text),
                model: model.to_string(),
                usage: TokenUsage {
                    prompt: 4,
                    output: 2,
                },
                finish: self.finish,
            })
        }

        fn service(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test]
    async fn complete_passes_model_and_prompt() {
        let recorder = Recorder::default();
        let seen = recorder.seen.clone();
        let client = LlmClient::new(recorder).with_model("gemini-2.5-pro");

        let completion = client.complete("chat", &Prompt::text("こんにちは")).await.unwrap();
        assert_eq!(completion.text, "re: こんにちは");
        assert_eq!(completion.model, "gemini-2.5-pro");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "gemini-2.5-pro");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let recorder = Recorder {
            failures: AtomicUsize::new(1),
            ..Recorder::default()
        };
        let seen = recorder.seen.clone();
        let client = LlmClient::new(recorder);

        let text = client
            .complete_text("generate", &Prompt::text("計画"))
            .await
            .unwrap();
        assert_eq!(text, "re: 計画");
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn retry_can_be_disabled() {
        let recorder = Recorder {
            failures: AtomicUsize::new(1),
            ..Recorder::default()
        };
        let client = LlmClient::new(recorder).with_retry(RetryPolicy::none());
        let err = client.complete("chat", &Prompt::text("x")).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn blocked_answer_is_an_upstream_error() {
        let recorder = Recorder {
            finish: Finish::Blocked,
            ..Recorder::default()
        };
        let client = LlmClient::new(recorder);
        let err = client
            .complete_text("critique", &Prompt::json("{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatcherError::Upstream { .. }));
        assert!(!err.is_transport());
    }

    #[test]
    fn default_model_and_debug() {
        let client = LlmClient::new(Recorder::default());
        assert_eq!(client.model(), DEFAULT_MODEL);
        let debug = format!("{client:?}");
        assert!(debug.contains("recorder"));
        assert!(debug.contains(DEFAULT_MODEL));
    }
}
