//! The Slot Store: a flat record of the facts the wizard collects.
//!
//! Every key is known in advance. Enumerated slots only accept values from
//! their domain; free-text answers go through [`SlotStore::set_free_text`].

use serde::{Deserialize, Serialize};

use crate::{CatcherError, Result};

// ---------------------------------------------------------------------------
// SlotKey
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKey {
    SourceMode,
    ActivityType,
    ActivityPlace,
    ActivityFrequency,
    Topic,
    RiskType,
    DeadlineWindow,
    GapRange,
    Allies,
    Intent,
    DesiredOutput,
}

impl SlotKey {
    pub const ALL: [SlotKey; 11] = [
        SlotKey::SourceMode,
        SlotKey::ActivityType,
        SlotKey::ActivityPlace,
        SlotKey::ActivityFrequency,
        SlotKey::Topic,
        SlotKey::RiskType,
        SlotKey::DeadlineWindow,
        SlotKey::GapRange,
        SlotKey::Allies,
        SlotKey::Intent,
        SlotKey::DesiredOutput,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SlotKey::SourceMode => "source_mode",
            SlotKey::ActivityType => "activity_type",
            SlotKey::ActivityPlace => "activity_place",
            SlotKey::ActivityFrequency => "activity_frequency",
            SlotKey::Topic => "topic",
            SlotKey::RiskType => "risk_type",
            SlotKey::DeadlineWindow => "deadline_window",
            SlotKey::GapRange => "gap_range",
            SlotKey::Allies => "allies",
            SlotKey::Intent => "intent",
            SlotKey::DesiredOutput => "desired_output",
        }
    }

    /// The enumerated values this slot accepts through [`SlotStore::set`].
    pub fn domain(self) -> &'static [&'static str] {
        match self {
            SlotKey::SourceMode => &["url", "sns", "none"],
            SlotKey::ActivityType => &["kodomo", "ibasho", "event", "welfare", "other_local"],
            SlotKey::ActivityPlace => &["kominkan", "school", "online", "mixed", "other_place"],
            SlotKey::ActivityFrequency => {
                &["weekly", "biweekly", "monthly", "irregular", "starting"]
            }
            SlotKey::Topic => &["money", "people", "vague"],
            SlotKey::RiskType => &["next_year_uncertain", "cut_risk", "self_funded"],
            SlotKey::DeadlineWindow => &["2-3w", "1-2m", "3m+", "まだ決まっていない"],
            SlotKey::GapRange => &["3万", "5万", "10万", "15万+", "まだ分からない"],
            SlotKey::Allies => &["none", "small_support", "want_help", "other"],
            SlotKey::Intent => &["continue", "continue_light", "handover", "other"],
            SlotKey::DesiredOutput => &["A", "B", "C", "D"],
        }
    }

    pub fn accepts(self, value: &str) -> bool {
        self.domain().contains(&value)
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActivitySummary: the composite record produced by summarization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySummary {
    #[serde(default)]
    pub activity: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub schedule: String,
    #[serde(default)]
    pub participants: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub started: String,
    #[serde(default)]
    pub funding: String,
}

// ---------------------------------------------------------------------------
// SlotStore
// ---------------------------------------------------------------------------

/// The facts collected during one wizard session.
///
/// A slot is either unset or holds a value from its domain; the only
/// exceptions are the activity summary and free-text answers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStore {
    source_mode: Option<String>,
    activity_summary: Option<ActivitySummary>,
    activity_type: Option<String>,
    activity_place: Option<String>,
    activity_frequency: Option<String>,
    topic: Option<String>,
    risk_type: Option<String>,
    deadline_window: Option<String>,
    gap_range: Option<String>,
    allies: Option<String>,
    intent: Option<String>,
    desired_output: Option<String>,
}

impl SlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn field(&self, key: SlotKey) -> &Option<String> {
        match key {
            SlotKey::SourceMode => &self.source_mode,
            SlotKey::ActivityType => &self.activity_type,
            SlotKey::ActivityPlace => &self.activity_place,
            SlotKey::ActivityFrequency => &self.activity_frequency,
            SlotKey::Topic => &self.topic,
            SlotKey::RiskType => &self.risk_type,
            SlotKey::DeadlineWindow => &self.deadline_window,
            SlotKey::GapRange => &self.gap_range,
            SlotKey::Allies => &self.allies,
            SlotKey::Intent => &self.intent,
            SlotKey::DesiredOutput => &self.desired_output,
        }
    }

    fn field_mut(&mut self, key: SlotKey) -> &mut Option<String> {
        match key {
            SlotKey::SourceMode => &mut self.source_mode,
            SlotKey::ActivityType => &mut self.activity_type,
            SlotKey::ActivityPlace => &mut self.activity_place,
            SlotKey::ActivityFrequency => &mut self.activity_frequency,
            SlotKey::Topic => &mut self.topic,
            SlotKey::RiskType => &mut self.risk_type,
            SlotKey::DeadlineWindow => &mut self.deadline_window,
            SlotKey::GapRange => &mut self.gap_range,
            SlotKey::Allies => &mut self.allies,
            SlotKey::Intent => &mut self.intent,
            SlotKey::DesiredOutput => &mut self.desired_output,
        }
    }

    pub fn get(&self, key: SlotKey) -> Option<&str> {
        self.field(key).as_deref()
    }

    /// `true` when `key` currently holds exactly `value`.
    pub fn is(&self, key: SlotKey, value: &str) -> bool {
        self.get(key) == Some(value)
    }

    /// Store an enumerated value. Rejects anything outside the slot's domain.
    pub fn set(&mut self, key: SlotKey, value: &str) -> Result<()> {
        if !key.accepts(value) {
            return Err(CatcherError::InvalidSlotValue {
                slot: key.to_string(),
                value: value.to_string(),
            });
        }
        *self.field_mut(key) = Some(value.to_string());
        Ok(())
    }

    /// Store an unconstrained free-text answer (the "other" path).
    pub fn set_free_text(&mut self, key: SlotKey, text: impl Into<String>) {
        *self.field_mut(key) = Some(text.into());
    }

    pub fn clear(&mut self, key: SlotKey) {
        if self.field_mut(key).take().is_some() {
            tracing::debug!(slot = %key, "Slot cleared");
        }
    }

    pub fn activity_summary(&self) -> Option<&ActivitySummary> {
        self.activity_summary.as_ref()
    }

    pub fn set_activity_summary(&mut self, summary: ActivitySummary) {
        self.activity_summary = Some(summary);
    }

    pub fn clear_activity_summary(&mut self) {
        self.activity_summary = None;
    }

    /// JSON object with every key present (`null` when unset).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
