//! External services behind the intake wizard.
//!
//! [`IntakeBackend`] is the seam between the conversation engine and the
//! text-completion service. Two implementations ship here: [`MockBackend`]
//! with built-in placeholder content, and [`LlmBackend`] which prompts an
//! [`catcher_llm::LlmClient`] and falls back to the placeholders where the
//! product allows it.

pub mod extract;
pub mod llm;
pub mod mock;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use catcher_types::{ActivitySummary, ArtifactKind, Artifacts, Critique, Result, SlotStore, Sourced};

pub use llm::LlmBackend;
pub use mock::MockBackend;

/// What the critique service is asked to look at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CritiqueRequest {
    pub artifacts: Artifacts,
    pub section_index: usize,
    pub section_title: String,
    pub section_text: String,
}

/// A free-form question asked after generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Current slot values.
    pub context: serde_json::Value,
    /// Leading excerpts of generated artifacts.
    pub excerpts: Vec<(ArtifactKind, String)>,
}

#[async_trait]
pub trait IntakeBackend: Send + Sync {
    /// Fetch a public page and summarize the activity it describes.
    async fn summarize_url(&self, url: &str) -> Result<Sourced<ActivitySummary>>;

    /// Summarize pasted profile text (SNS bio, flyer copy).
    async fn summarize_text(&self, text: &str) -> Result<Sourced<ActivitySummary>>;

    /// Apply free-text corrections to a summary.
    async fn update_summary(
        &self,
        current: &ActivitySummary,
        correction: &str,
    ) -> Result<Sourced<ActivitySummary>>;

    /// Produce the four artifacts from the collected slots.
    async fn generate(&self, slots: &SlotStore) -> Result<Sourced<Artifacts>>;

    async fn critique(&self, request: &CritiqueRequest) -> Result<Sourced<Critique>>;

    async fn chat(&self, request: &ChatRequest) -> Result<Sourced<String>>;
}
