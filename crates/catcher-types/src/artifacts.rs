//! The four generated documents and their on-disk bundle.
//!
//! Markdown source is the single source of truth: every rendered view and
//! every export is derived from it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CatcherError, Provenance, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Profile,
    Plan,
    Funding,
    Messages,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Profile,
        ArtifactKind::Plan,
        ArtifactKind::Funding,
        ArtifactKind::Messages,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Profile => "profile",
            ArtifactKind::Plan => "plan",
            ArtifactKind::Funding => "funding",
            ArtifactKind::Messages => "messages",
        }
    }

    /// Tab label shown to the user.
    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::Profile => "活動紹介",
            ArtifactKind::Plan => "90日プラン",
            ArtifactKind::Funding => "資金計画",
            ArtifactKind::Messages => "文章パック",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = CatcherError;

    fn from_str(s: &str) -> Result<Self> {
        ArtifactKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CatcherError::ValidationError(format!("unknown artifact '{s}'")))
    }
}

/// The four markdown documents produced by generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    pub profile: String,
    pub plan: String,
    pub funding: String,
    pub messages: String,
}

impl Artifacts {
    pub fn get(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Profile => &self.profile,
            ArtifactKind::Plan => &self.plan,
            ArtifactKind::Funding => &self.funding,
            ArtifactKind::Messages => &self.messages,
        }
    }

    /// Full-value replace of one document.
    pub fn set(&mut self, kind: ArtifactKind, markdown: impl Into<String>) {
        let slot = match kind {
            ArtifactKind::Profile => &mut self.profile,
            ArtifactKind::Plan => &mut self.plan,
            ArtifactKind::Funding => &mut self.funding,
            ArtifactKind::Messages => &mut self.messages,
        };
        *slot = markdown.into();
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArtifactKind, &str)> + '_ {
        ArtifactKind::ALL.into_iter().map(move |k| (k, self.get(k)))
    }

    /// All four documents in one markdown file, separated by horizontal rules.
    pub fn to_combined_markdown(&self, generated_on: chrono::NaiveDate) -> String {
        let mut out = format!(
            "# 🎯 モヤモヤキャッチャー — 生成結果\n\n生成日：{} ／ この出力は提案のたたき台です。最終判断は利用者が行ってください。\n",
            generated_on.format("%Y/%m/%d")
        );
        for (_, body) in self.iter() {
            out.push_str("\n---\n\n");
            out.push_str(body.trim_end());
            out.push('\n');
        }
        out
    }
}

/// Serializable snapshot of a generation result, used by export and the
/// standalone review flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub provenance: Provenance,
    pub artifacts: Artifacts,
}

impl ArtifactBundle {
    pub fn new(artifacts: Artifacts, provenance: Provenance) -> Self {
        Self {
            generated_at: chrono::Utc::now(),
            provenance,
            artifacts,
        }
    }

    /// Serialize this bundle to JSON and write it to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::debug!(path = %path.display(), "Artifact bundle saved");
        Ok(())
    }

    /// Read a bundle from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let bundle: Self = serde_json::from_str(&data)?;
        Ok(bundle)
    }
}
