//! Reviewer personas and suggested edits returned by the critique service.

use serde::{Deserialize, Serialize};

use crate::ArtifactKind;

/// A fixed reviewer identity framing feedback from one stakeholder's viewpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub persona: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub role: String,
    #[serde(default = "default_role_color")]
    pub role_color: String,
    #[serde(default)]
    pub comments: Vec<String>,
}

fn default_role_color() -> String {
    "#5BA4A4".to_string()
}

/// One proposed edit: replace `before` with `after` inside artifact `tab`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub tab: ArtifactKind,
    pub reviewer_index: usize,
    #[serde(default)]
    pub reason: String,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    #[serde(default)]
    pub reviews: Vec<Persona>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}
