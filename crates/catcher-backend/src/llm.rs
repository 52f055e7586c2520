//! Backend that prompts a text-completion service.

use std::time::Duration;

use async_trait::async_trait;

use catcher_llm::{LlmClient, Prompt};
use catcher_types::{
    ActivitySummary, ArtifactKind, Artifacts, CatcherError, Critique, Result, SlotStore, Sourced,
};

use crate::extract::{extract_json, page_text};
use crate::{mock, prompts, ChatRequest, CritiqueRequest, IntakeBackend};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; MoyamoyaCatcher/1.0)";
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const EMPTY_PROFILE: &str = "（活動紹介の生成に失敗しました。再度お試しください）";

pub struct LlmBackend {
    client: LlmClient,
    http: reqwest::Client,
    fetch_timeout: Duration,
}

impl LlmBackend {
    pub fn new(client: LlmClient) -> Self {
        Self {
            client,
            http: reqwest::Client::new(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Build from environment credentials (see [`LlmClient::from_env`]).
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(LlmClient::from_env()?))
    }

    async fn ask(&self, operation: &str, prompt: String, json: bool) -> Result<String> {
        let prompt = if json {
            Prompt::json(prompt)
        } else {
            Prompt::text(prompt)
        };
        match self.client.complete_text(operation, &prompt).await {
            Ok(text) => Ok(text),
            Err(e) if e.is_transport() => Err(CatcherError::transport(operation, e.to_string())),
            Err(e @ CatcherError::Upstream { .. }) => Err(e),
            Err(e) => Err(CatcherError::upstream(operation, e.to_string())),
        }
    }

    async fn summarize(&self, operation: &str, prompt: String) -> Result<Sourced<ActivitySummary>> {
        let reply = self.ask(operation, prompt, true).await?;
        let summary: ActivitySummary = extract_json(operation, &reply)?;
        tracing::info!(operation, "Summary received");
        Ok(Sourced::upstream(summary))
    }

    /// Fetch the page text; a failed fetch becomes a note for the model.
    async fn fetch_page(&self, url: &str) -> String {
        let target = if url.starts_with("http") {
            url.to_string()
        } else {
            format!("https://{url}")
        };
        let fetched = async {
            self.http
                .get(&target)
                .header(reqwest::header::USER_AGENT, USER_AGENT)
                .timeout(self.fetch_timeout)
                .send()
                .await?
                .text()
                .await
        }
        .await;
        match fetched {
            Ok(html) => page_text(&html),
            Err(e) => {
                tracing::warn!(url = %target, error = %e, "Page fetch failed");
                format!("（URLの取得に失敗しました: {url}）")
            }
        }
    }

    async fn generate_one(&self, kind: ArtifactKind, slots: &SlotStore) -> Result<String> {
        self.ask("generate", prompts::generate(kind, slots), false)
            .await
    }
}

#[async_trait]
impl IntakeBackend for LlmBackend {
    async fn summarize_url(&self, url: &str) -> Result<Sourced<ActivitySummary>> {
        let page = self.fetch_page(url).await;
        self.summarize("summarize-url", prompts::summarize_url(url, &page))
            .await
    }

    async fn summarize_text(&self, text: &str) -> Result<Sourced<ActivitySummary>> {
        self.summarize("summarize-text", prompts::summarize_text(text))
            .await
    }

    async fn update_summary(
        &self,
        current: &ActivitySummary,
        correction: &str,
    ) -> Result<Sourced<ActivitySummary>> {
        self.summarize("update-summary", prompts::update_summary(current, correction))
            .await
    }

    async fn generate(&self, slots: &SlotStore) -> Result<Sourced<Artifacts>> {
        let outcome = tokio::try_join!(
            self.generate_one(ArtifactKind::Profile, slots),
            self.generate_one(ArtifactKind::Plan, slots),
            self.generate_one(ArtifactKind::Funding, slots),
            self.generate_one(ArtifactKind::Messages, slots),
        );
        match outcome {
            Ok((profile, plan, funding, messages)) => {
                let profile = if profile.trim().is_empty() {
                    EMPTY_PROFILE.to_string()
                } else {
                    profile
                };
                tracing::info!("Artifacts generated");
                Ok(Sourced::upstream(Artifacts {
                    profile,
                    plan,
                    funding,
                    messages,
                }))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Generation failed, using placeholder artifacts");
                Ok(Sourced::fallback(mock::artifacts()))
            }
        }
    }

    async fn critique(&self, request: &CritiqueRequest) -> Result<Sourced<Critique>> {
        let parsed = match self.ask("critique", prompts::critique(request), true).await {
            Ok(reply) => extract_json::<Critique>("critique", &reply),
            Err(e) => Err(e),
        };
        match parsed {
            Ok(critique) => {
                tracing::info!(
                    reviews = critique.reviews.len(),
                    suggestions = critique.suggestions.len(),
                    "Critique received"
                );
                Ok(Sourced::upstream(critique))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Critique failed, using placeholder critique");
                Ok(Sourced::fallback(mock::critique()))
            }
        }
    }

    async fn chat(&self, request: &ChatRequest) -> Result<Sourced<String>> {
        let reply = self.ask("chat", prompts::chat(request), false).await?;
        Ok(Sourced::upstream(reply.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catcher_llm::{Completer, Completion, RetryPolicy};
    use catcher_types::Provenance;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Answers each prompt through a closure over its text.
    struct ScriptedCompleter<F> {
        answer: F,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl<F> Completer for ScriptedCompleter<F>
    where
        F: Fn(&str) -> Result<String> + Send + Sync,
    {
        async fn complete(&self, model: &str, prompt: &Prompt) -> Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = (self.answer)(&prompt.text)?;
            Ok(Completion {
                id: "scripted".into(),
                text,
                model: model.to_string(),
                usage: Default::default(),
                finish: Default::default(),
            })
        }

        fn service(&self) -> &'static str {
            "scripted"
        }
    }

    fn scripted<F>(answer: F) -> (LlmBackend, Arc<AtomicUsize>)
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = LlmClient::new(ScriptedCompleter {
            answer,
            calls: calls.clone(),
        })
        .with_retry(RetryPolicy::none());
        (LlmBackend::new(client), calls)
    }

    fn unreachable() -> CatcherError {
        CatcherError::ProviderError {
            provider: "google".into(),
            status: 0,
            message: "connection refused".into(),
            retryable: true,
        }
    }

    fn server_error() -> CatcherError {
        CatcherError::ProviderError {
            provider: "google".into(),
            status: 500,
            message: "internal".into(),
            retryable: true,
        }
    }

    #[tokio::test]
    async fn summarize_text_parses_fenced_reply() {
        let (backend, _) = scripted(|_| {
            Ok("```json\n{\"activity\": \"こども食堂\", \"location\": \"鯖江市\"}\n```".into())
        });
        let s = backend.summarize_text("鯖江市でこども食堂").await.unwrap();
        assert_eq!(s.provenance, Provenance::Upstream);
        assert_eq!(s.value.activity, "こども食堂");
    }

    #[tokio::test]
    async fn summarize_failure_is_classified() {
        let (backend, _) = scripted(|_| Err(unreachable()));
        let err = backend.summarize_text("x").await.unwrap_err();
        assert!(err.is_transport());

        let (backend, _) = scripted(|_| Err(server_error()));
        let err = backend.summarize_text("x").await.unwrap_err();
        assert!(matches!(err, CatcherError::Upstream { .. }));

        let (backend, _) = scripted(|_| Ok("要約できませんでした".into()));
        let err = backend.summarize_text("x").await.unwrap_err();
        assert!(matches!(err, CatcherError::Upstream { .. }));
    }

    #[tokio::test]
    async fn unreachable_page_is_described_to_the_model() {
        let (backend, _) = scripted(|prompt| {
            assert!(prompt.contains("（URLの取得に失敗しました: 127.0.0.1:9/none）"));
            Ok("{\"activity\": \"推測した活動\"}".into())
        });
        let backend = backend.with_fetch_timeout(Duration::from_millis(500));
        let s = backend.summarize_url("127.0.0.1:9/none").await.unwrap();
        assert_eq!(s.value.activity, "推測した活動");
    }

    #[tokio::test]
    async fn generate_asks_for_four_artifacts() {
        let (backend, calls) = scripted(|prompt| {
            let text = if prompt.contains("「活動紹介」") {
                "## 活動紹介"
            } else if prompt.contains("「90日プラン」") {
                "## 90日プラン"
            } else if prompt.contains("「資金計画」") {
                "## 資金計画"
            } else {
                "## 文章パック"
            };
            Ok(text.into())
        });
        let g = backend.generate(&SlotStore::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(g.provenance, Provenance::Upstream);
        assert_eq!(g.value.profile, "## 活動紹介");
        assert_eq!(g.value.funding, "## 資金計画");
        assert_eq!(g.value.messages, "## 文章パック");
    }

    #[tokio::test]
    async fn empty_profile_gets_notice() {
        let (backend, _) = scripted(|prompt| {
            if prompt.contains("「活動紹介」") {
                Ok("  ".into())
            } else {
                Ok("本文".into())
            }
        });
        let g = backend.generate(&SlotStore::new()).await.unwrap();
        assert_eq!(g.value.profile, EMPTY_PROFILE);
    }

    #[tokio::test]
    async fn generate_failure_falls_back() {
        let (backend, _) = scripted(|prompt| {
            if prompt.contains("「資金計画」") {
                Err(server_error())
            } else {
                Ok("本文".into())
            }
        });
        let g = backend.generate(&SlotStore::new()).await.unwrap();
        assert_eq!(g.provenance, Provenance::MockFallback);
        assert_eq!(g.value, mock::artifacts());
    }

    fn critique_request() -> CritiqueRequest {
        CritiqueRequest {
            artifacts: mock::artifacts(),
            section_index: 0,
            section_title: "📄 自治体向け：継続提案メール".into(),
            section_text: "いつもお世話になっております。".into(),
        }
    }

    #[tokio::test]
    async fn critique_parses_reply() {
        let (backend, _) = scripted(|_| {
            Ok(r#"はい。{"reviews":[{"persona":"市の担当者","comments":["数字を"]}],"suggestions":[]}"#.into())
        });
        let c = backend.critique(&critique_request()).await.unwrap();
        assert_eq!(c.provenance, Provenance::Upstream);
        assert_eq!(c.value.reviews[0].persona, "市の担当者");
        assert_eq!(c.value.reviews[0].role_color, "#5BA4A4");
    }

    #[tokio::test]
    async fn critique_failure_falls_back() {
        let (backend, _) = scripted(|_| Ok("レビューできません".into()));
        let c = backend.critique(&critique_request()).await.unwrap();
        assert_eq!(c.provenance, Provenance::MockFallback);
        assert_eq!(c.value.suggestions.len(), 5);
    }

    #[tokio::test]
    async fn chat_failure_propagates() {
        let (backend, _) = scripted(|_| Err(server_error()));
        let request = ChatRequest {
            message: "こんにちは".into(),
            context: serde_json::Value::Null,
            excerpts: Vec::new(),
        };
        assert!(backend.chat(&request).await.is_err());
    }
}
