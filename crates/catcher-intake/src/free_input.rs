//! Free-text interception.
//!
//! While a free-input request is pending, the choice surface is replaced by
//! a text field. The submission is handed back to the caller tagged with the
//! purpose it was opened for; the caller decides how to continue and is
//! responsible for closing or reopening the field.

use catcher_types::SlotKey;

use crate::script::Choice;

/// Text that is treated as "go back one step" instead of an answer.
const BACK_WORDS: [&str; 2] = ["戻る", "ひとつ前に戻る"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// A website or blog URL to summarize.
    Url,
    /// Pasted profile text to summarize.
    ProfileText,
    /// Corrections to the current activity summary.
    Correction,
    /// A free-text answer for a slot whose step offered "other".
    Other { slot: SlotKey },
}

#[derive(Debug, Clone)]
struct Pending {
    purpose: Purpose,
    placeholder: &'static str,
    fallback: Option<&'static [Choice]>,
}

/// What a submission turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Empty input, or nothing was waiting for text.
    Ignored,
    /// The user asked to go back a step.
    Back,
    /// A question for the post-generation chat.
    Chat(String),
    Deliver { purpose: Purpose, text: String },
}

#[derive(Debug, Clone, Default)]
pub struct FreeInput {
    pending: Option<Pending>,
    chat_mode: bool,
}

impl FreeInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting text. Replaces any request already pending.
    pub fn open(
        &mut self,
        placeholder: &'static str,
        purpose: Purpose,
        fallback: Option<&'static [Choice]>,
    ) {
        if let Some(previous) = &self.pending {
            tracing::debug!(previous = ?previous.purpose, "Replacing pending free input");
        }
        self.pending = Some(Pending {
            purpose,
            placeholder,
            fallback: fallback.filter(|f| !f.is_empty()),
        });
    }

    pub fn is_open(&self) -> bool {
        self.pending.is_some() || self.chat_mode
    }

    pub fn purpose(&self) -> Option<Purpose> {
        self.pending.as_ref().map(|p| p.purpose)
    }

    pub fn placeholder(&self) -> Option<&'static str> {
        self.pending.as_ref().map(|p| p.placeholder)
    }

    /// Only requests with a fallback choice set can be cancelled.
    pub fn is_cancellable(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| p.fallback.is_some())
    }

    pub fn in_chat_mode(&self) -> bool {
        self.chat_mode
    }

    /// Route a submission. The pending request is consumed by `Deliver`.
    pub fn submit(&mut self, text: &str) -> Submission {
        let text = text.trim();
        if text.is_empty() {
            return Submission::Ignored;
        }
        if self.chat_mode {
            return Submission::Chat(text.to_string());
        }
        if BACK_WORDS.contains(&text) {
            return Submission::Back;
        }
        match self.pending.take() {
            Some(pending) => Submission::Deliver {
                purpose: pending.purpose,
                text: text.to_string(),
            },
            None => Submission::Ignored,
        }
    }

    /// Abandon the pending request. Returns the choices to show again.
    pub fn cancel(&mut self) -> Option<&'static [Choice]> {
        self.pending.take().and_then(|p| p.fallback)
    }

    pub fn close(&mut self) {
        self.pending = None;
    }

    /// Keep the field open for post-generation questions.
    pub fn enter_chat(&mut self) {
        self.pending = None;
        self.chat_mode = true;
    }

    pub fn leave_chat(&mut self) {
        self.chat_mode = false;
    }
}
