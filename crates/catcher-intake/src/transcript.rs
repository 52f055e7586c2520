//! Message history of a wizard session.
//!
//! Every entry is tagged with the step that was active when it was written,
//! so backtracking can cut the history at a step boundary.

use serde::{Deserialize, Serialize};

use catcher_review::escape_html;

pub type EntryId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    System,
    User,
}

/// A labelled list shown as one card (activity summary, answers so far).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub heading: String,
    pub rows: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum Content {
    Text(String),
    Card(Card),
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text(text.into())
    }

    /// Plain-text form, one row per line.
    pub fn to_plain(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Card(card) => {
                let mut out = card.heading.clone();
                if !out.is_empty() {
                    out.push_str("\n\n");
                }
                let rows: Vec<String> = card
                    .rows
                    .iter()
                    .map(|(label, value)| format!("{label}：{value}"))
                    .collect();
                out.push_str(&rows.join("\n"));
                out
            }
        }
    }

    /// HTML form. All text, including user input, is escaped.
    pub fn to_html(&self) -> String {
        match self {
            Content::Text(text) => escape_html(text).replace('\n', "<br>"),
            Content::Card(card) => {
                let items: String = card
                    .rows
                    .iter()
                    .map(|(label, value)| {
                        format!(
                            "<li><strong>{}：</strong>{}</li>",
                            escape_html(label),
                            escape_html(value)
                        )
                    })
                    .collect();
                let card_html = format!("<div class=\"summary-card\"><ul>{items}</ul></div>");
                if card.heading.is_empty() {
                    card_html
                } else {
                    format!("{}<br><br>{card_html}", escape_html(&card.heading))
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub step: usize,
    pub actor: Actor,
    pub content: Content,
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
    next_id: EntryId,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: usize, actor: Actor, content: Content) -> &Entry {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            step,
            actor,
            content,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Remove one transient entry (a loading message). Returns `false` if
    /// it is already gone.
    pub fn remove(&mut self, id: EntryId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Drop every entry tagged with `step` or later.
    pub fn truncate_from(&mut self, step: usize) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.step < step);
        let removed = before - self.entries.len();
        tracing::debug!(step, removed, "Transcript truncated");
        removed
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Entry> {
        self.entries.last()
    }
}
