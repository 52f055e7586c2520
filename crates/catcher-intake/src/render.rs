//! Render commands and the renderer seam.
//!
//! The wizard never touches a view. It emits [`RenderCommand`]s and a
//! [`Renderer`] turns them into whatever the front end is: a terminal, a web
//! page, or a recording for tests.

use std::sync::{Arc, Mutex};

use catcher_review::{ReviewSummary, Section};
use catcher_types::{ArtifactKind, Persona, Suggestion};

use crate::scope::Scope;
use crate::script::Choice;
use crate::transcript::{Entry, EntryId};

/// Messages rotated through while artifacts are being generated.
pub const GENERATION_STAGES: [&str; 5] = [
    "📋 活動紹介を作成しています…",
    "📅 90日プランを組み立てています…",
    "💰 資金計画を計算しています…",
    "✉️ 文章パックをつくっています…",
    "✨ 最終チェックしています…",
];

/// One artifact as it should be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactView {
    pub kind: ArtifactKind,
    pub markdown: String,
    /// Track-change projection of `markdown`.
    pub html: String,
    pub pending_marks: usize,
}

/// Actions offered once the results have been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultAction {
    Reopen,
    Export,
    Chat,
}

impl ResultAction {
    pub fn label(self) -> &'static str {
        match self {
            ResultAction::Reopen => "📋 結果をもう一度見る",
            ResultAction::Export => "📄 まとめて出力",
            ResultAction::Chat => "💬 もっと聞く（雑談・質問）",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Progress {
        done: usize,
        total: usize,
    },
    /// The assistant is "typing"; the next system entry follows.
    Typing,
    Append(Entry),
    Remove(EntryId),
    /// Drop every rendered entry from `step` on.
    TruncateFrom(usize),
    Choices {
        choices: Vec<Choice>,
        can_go_back: bool,
    },
    ClearChoices,
    FreeInput {
        placeholder: &'static str,
        cancellable: bool,
    },
    HideFreeInput,
    GenerateButton,
    GenerationPending {
        stages: &'static [&'static str],
    },
    /// The grace period ran out; generation may now be cancelled.
    CancelAvailable,
    GenerationDone,
    Results {
        tabs: Vec<ArtifactView>,
        sections: Vec<Section>,
        notice: Option<String>,
    },
    ArtifactUpdated(ArtifactView),
    ResultActions(Vec<ResultAction>),
    EnterScope(Scope),
    ExitScope(Scope),
    ReviewLoading {
        section: usize,
        title: String,
    },
    Reviewer {
        persona: Option<Persona>,
        suggestions: usize,
    },
    Suggestion {
        position: usize,
        total: usize,
        suggestion: Suggestion,
    },
    ReviewComplete {
        summary: ReviewSummary,
        message: String,
    },
    ReviewClosed {
        section: usize,
        reviewed: Vec<usize>,
    },
    Toast(String),
    Notice(String),
}

pub trait Renderer: Send {
    fn render(&mut self, command: &RenderCommand);
}

/// Keeps every command it is given. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    log: Arc<Mutex<Vec<RenderCommand>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<RenderCommand> {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Number of recorded commands matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&RenderCommand) -> bool) -> usize {
        self.commands().iter().filter(|c| predicate(c)).count()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, command: &RenderCommand) {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(command.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_renderer_shares_log_between_clones() {
        let recorder = RecordingRenderer::new();
        let mut handle = recorder.clone();
        handle.render(&RenderCommand::Typing);
        handle.render(&RenderCommand::Progress { done: 1, total: 9 });

        assert_eq!(recorder.commands().len(), 2);
        assert_eq!(
            recorder.count(|c| matches!(c, RenderCommand::Progress { .. })),
            1
        );
        recorder.clear();
        assert!(recorder.commands().is_empty());
    }
}
