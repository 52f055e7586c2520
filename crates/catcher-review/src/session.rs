//! Review session state machine.
//!
//! ```text
//! Idle ──begin──▶ Loading ──load──▶ Reviewing(0) ─decide─▶ … ─▶ Complete ──finalize/skip──▶ Idle
//!                    │                                              ▲
//!                    └──fail──▶ Cancelled ──begin──▶ Loading        └── (no suggestions)
//! ```
//!
//! Decisions apply to the artifact source immediately. Skipping out of a
//! review keeps everything already applied.

use std::collections::BTreeSet;

use catcher_types::{Artifacts, CatcherError, Critique, Persona, Result, Suggestion};

use crate::fuzzy::{replace_once_flexible, Applied};
use crate::sections::Section;
use crate::view::TrackedView;

// ---------------------------------------------------------------------------
// Decision / ReviewPhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
    Alternative(String),
}

impl Decision {
    pub fn is_reject(&self) -> bool {
        matches!(self, Decision::Reject)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewPhase {
    Idle,
    Loading { section: usize },
    Reviewing { index: usize },
    Complete,
    Cancelled,
}

impl ReviewPhase {
    fn name(&self) -> &'static str {
        match self {
            ReviewPhase::Idle => "idle",
            ReviewPhase::Loading { .. } => "loading",
            ReviewPhase::Reviewing { .. } => "reviewing",
            ReviewPhase::Complete => "complete",
            ReviewPhase::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReviewSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub total: usize,
}

impl ReviewSummary {
    /// Closing message for the complete phase.
    pub fn message(&self) -> String {
        let mut out = String::new();
        if self.accepted > 0 {
            out.push_str(&format!("✅ {}件の改善を反映しました\n", self.accepted));
        }
        if self.rejected > 0 {
            out.push_str(&format!("❌ {}件は元のままにしました\n", self.rejected));
        }
        if self.total == 0 {
            out.push_str("今回は直したほうがよい点は見つかりませんでした。\n");
        }
        out.push_str(
            "\n📌 文書は見え消しの状態です。「確定して反映する」を押すとクリーンな文書に仕上がります。",
        );
        out
    }
}

// ---------------------------------------------------------------------------
// Persona matching
// ---------------------------------------------------------------------------

/// Pick the reviewer for a section: the first persona named in the title,
/// else the persona at the section's position, else the first one.
pub fn match_persona(reviews: &[Persona], title: &str, section_index: usize) -> usize {
    reviews
        .iter()
        .position(|p| !p.persona.is_empty() && title.contains(&p.persona))
        .unwrap_or(if section_index < reviews.len() {
            section_index
        } else {
            0
        })
}

// ---------------------------------------------------------------------------
// ReviewSession
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReviewSession {
    phase: ReviewPhase,
    section: Option<usize>,
    section_title: String,
    reviewer: Option<Persona>,
    suggestions: Vec<Suggestion>,
    decisions: Vec<Decision>,
    reviewed: BTreeSet<usize>,
}

impl Default for ReviewSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReviewSession {
    pub fn new() -> Self {
        Self {
            phase: ReviewPhase::Idle,
            section: None,
            section_title: String::new(),
            reviewer: None,
            suggestions: Vec::new(),
            decisions: Vec::new(),
            reviewed: BTreeSet::new(),
        }
    }

    pub fn phase(&self) -> &ReviewPhase {
        &self.phase
    }

    /// `true` while a review overlay is open (loading, reviewing, complete).
    pub fn is_open(&self) -> bool {
        matches!(
            self.phase,
            ReviewPhase::Loading { .. } | ReviewPhase::Reviewing { .. } | ReviewPhase::Complete
        )
    }

    pub fn reviewer(&self) -> Option<&Persona> {
        self.reviewer.as_ref()
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    pub fn is_reviewed(&self, section: usize) -> bool {
        self.reviewed.contains(&section)
    }

    pub fn reviewed_sections(&self) -> impl Iterator<Item = usize> + '_ {
        self.reviewed.iter().copied()
    }

    /// Start loading a critique for `section`.
    pub fn begin(&mut self, section: &Section) -> Result<()> {
        if !matches!(self.phase, ReviewPhase::Idle | ReviewPhase::Cancelled) {
            return Err(self.invalid("begin a review"));
        }
        self.section = Some(section.index);
        self.section_title = section.title.clone();
        self.reviewer = None;
        self.suggestions.clear();
        self.decisions.clear();
        self.phase = ReviewPhase::Loading {
            section: section.index,
        };
        tracing::info!(section = section.index, title = %section.title, "Review loading");
        Ok(())
    }

    /// Narrow the critique to the persona matching the section and start
    /// walking its suggestions.
    pub fn load(&mut self, critique: Critique) -> Result<&ReviewPhase> {
        let ReviewPhase::Loading { section } = self.phase else {
            return Err(self.invalid("load a critique"));
        };

        let matched = match_persona(&critique.reviews, &self.section_title, section);
        self.reviewer = critique.reviews.into_iter().nth(matched);
        self.suggestions = critique
            .suggestions
            .into_iter()
            .filter(|s| s.reviewer_index == matched)
            .map(|s| Suggestion {
                reviewer_index: 0,
                ..s
            })
            .collect();

        self.phase = if self.suggestions.is_empty() {
            ReviewPhase::Complete
        } else {
            ReviewPhase::Reviewing { index: 0 }
        };
        tracing::info!(
            section,
            persona = self.reviewer.as_ref().map(|p| p.persona.as_str()).unwrap_or(""),
            suggestions = self.suggestions.len(),
            "Review loaded"
        );
        Ok(&self.phase)
    }

    /// The critique request failed; nothing was changed.
    pub fn fail(&mut self) -> Result<()> {
        if !matches!(self.phase, ReviewPhase::Loading { .. }) {
            return Err(self.invalid("fail"));
        }
        tracing::warn!(title = %self.section_title, "Review cancelled after critique failure");
        self.phase = ReviewPhase::Cancelled;
        Ok(())
    }

    /// The suggestion awaiting a decision, with its 1-based position.
    pub fn current(&self) -> Option<(usize, &Suggestion)> {
        match self.phase {
            ReviewPhase::Reviewing { index } => {
                self.suggestions.get(index).map(|s| (index + 1, s))
            }
            _ => None,
        }
    }

    /// Record a decision for the current suggestion. Accept and alternative
    /// edit the artifact source and leave a mark on the view.
    pub fn decide(
        &mut self,
        decision: Decision,
        artifacts: &mut Artifacts,
        view: &mut TrackedView,
    ) -> Result<Option<Applied>> {
        let ReviewPhase::Reviewing { index } = self.phase else {
            return Err(self.invalid("decide"));
        };
        let suggestion = self
            .suggestions
            .get(index)
            .ok_or_else(|| self.invalid("decide"))?;

        let replacement = match &decision {
            Decision::Accept => Some(suggestion.after.clone()),
            Decision::Reject => None,
            Decision::Alternative(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(CatcherError::ValidationError(
                        "alternative text is empty".into(),
                    ));
                }
                Some(text.to_string())
            }
        };

        let applied = replacement.map(|after| {
            let mut source = artifacts.get(suggestion.tab).to_string();
            let splice = replace_once_flexible(&mut source, &suggestion.before, &after);
            if splice.applied.reached_source() {
                artifacts.set(suggestion.tab, source);
            }
            view.record(suggestion.tab, &suggestion.before, &after, splice);
            tracing::info!(
                tab = %suggestion.tab,
                applied = ?splice.applied,
                position = index + 1,
                "Suggestion applied"
            );
            splice.applied
        });

        self.decisions.push(decision);
        self.phase = if index + 1 < self.suggestions.len() {
            ReviewPhase::Reviewing { index: index + 1 }
        } else {
            ReviewPhase::Complete
        };
        Ok(applied)
    }

    pub fn summary(&self) -> ReviewSummary {
        let rejected = self.decisions.iter().filter(|d| d.is_reject()).count();
        ReviewSummary {
            accepted: self.decisions.len() - rejected,
            rejected,
            total: self.suggestions.len(),
        }
    }

    /// Accept the track changes and close. Returns the reviewed section.
    pub fn finalize(&mut self, view: &mut TrackedView) -> Result<usize> {
        if self.phase != ReviewPhase::Complete {
            return Err(self.invalid("finalize"));
        }
        view.finalize();
        self.close()
    }

    /// Leave the review early. Already-applied decisions stay in the source.
    pub fn skip(&mut self) -> Result<usize> {
        if !matches!(
            self.phase,
            ReviewPhase::Reviewing { .. } | ReviewPhase::Complete
        ) {
            return Err(self.invalid("skip"));
        }
        self.close()
    }

    fn close(&mut self) -> Result<usize> {
        let section = self.section.ok_or_else(|| self.invalid("close"))?;
        self.reviewed.insert(section);
        tracing::info!(section, summary = ?self.summary(), "Review closed");
        self.phase = ReviewPhase::Idle;
        Ok(section)
    }

    fn invalid(&self, action: &str) -> CatcherError {
        CatcherError::InvalidTransition {
            state: self.phase.name().to_string(),
            action: action.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catcher_types::ArtifactKind;

    fn persona(name: &str) -> Persona {
        Persona {
            persona: name.into(),
            avatar: "👤".into(),
            role: String::new(),
            role_color: "#5BA4A4".into(),
            comments: vec![],
        }
    }

    fn suggestion(tab: ArtifactKind, reviewer: usize, before: &str, after: &str) -> Suggestion {
        Suggestion {
            id: None,
            tab,
            reviewer_index: reviewer,
            reason: "わかりやすく".into(),
            before: before.into(),
            after: after.into(),
        }
    }

    fn section(index: usize, title: &str) -> Section {
        Section {
            index,
            title: title.into(),
            text: String::new(),
            markdown: String::new(),
        }
    }

    fn critique() -> Critique {
        Critique {
            reviews: vec![
                persona("市の担当者"),
                persona("地元企業の社長"),
                persona("地域の協力者"),
            ],
            suggestions: vec![
                suggestion(ArtifactKind::Plan, 2, "2人みつける", "2人みつける（できることからでOK）"),
                suggestion(ArtifactKind::Profile, 0, "約400名", "年間延べ約400名"),
                suggestion(ArtifactKind::Funding, 0, "報告する", "面談＋実績報告を行う"),
            ],
        }
    }

    fn artifacts() -> Artifacts {
        Artifacts {
            profile: "利用者は約400名です。".into(),
            plan: "- 手伝ってくれる人を2人みつける".into(),
            funding: "年度末に報告する。".into(),
            messages: String::new(),
        }
    }

    // --- persona matching ---

    #[test]
    fn persona_named_in_title_wins() {
        let reviews = critique().reviews;
        assert_eq!(match_persona(&reviews, "地域の協力者への声かけ", 0), 2);
    }

    #[test]
    fn persona_falls_back_to_section_index_then_zero() {
        let reviews = critique().reviews;
        assert_eq!(match_persona(&reviews, "お知らせ文", 1), 1);
        assert_eq!(match_persona(&reviews, "お知らせ文", 7), 0);
        assert_eq!(match_persona(&[], "お知らせ文", 0), 0);
    }

    // --- transitions ---

    #[test]
    fn load_narrows_to_matched_persona_and_reindexes() {
        let mut review = ReviewSession::new();
        review.begin(&section(0, "市の担当者への相談メール")).unwrap();
        let phase = review.load(critique()).unwrap();
        assert_eq!(*phase, ReviewPhase::Reviewing { index: 0 });

        assert_eq!(review.reviewer().unwrap().persona, "市の担当者");
        assert_eq!(review.suggestions().len(), 2);
        assert!(review.suggestions().iter().all(|s| s.reviewer_index == 0));
    }

    #[test]
    fn reindexed_persona_suggestions_start_at_zero() {
        let mut review = ReviewSession::new();
        review.begin(&section(2, "地域の協力者への声かけ")).unwrap();
        review.load(critique()).unwrap();
        assert_eq!(review.suggestions().len(), 1);
        assert_eq!(review.suggestions()[0].reviewer_index, 0);
        assert_eq!(review.current().unwrap().0, 1);
    }

    #[test]
    fn zero_suggestions_goes_straight_to_complete() {
        let mut review = ReviewSession::new();
        review.begin(&section(1, "地元企業の社長へのお願い")).unwrap();
        let phase = review.load(critique()).unwrap();
        assert_eq!(*phase, ReviewPhase::Complete);
        assert_eq!(
            review.summary(),
            ReviewSummary {
                accepted: 0,
                rejected: 0,
                total: 0
            }
        );
        assert!(review.current().is_none());
    }

    #[test]
    fn decisions_walk_to_complete_and_count() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        let mut review = ReviewSession::new();
        review.begin(&section(0, "市の担当者への相談メール")).unwrap();
        review.load(critique()).unwrap();

        let applied = review.decide(Decision::Accept, &mut a, &mut view).unwrap();
        assert_eq!(applied, Some(Applied::Exact));
        assert_eq!(a.profile, "利用者は年間延べ約400名です。");

        let applied = review.decide(Decision::Reject, &mut a, &mut view).unwrap();
        assert_eq!(applied, None);
        assert_eq!(a.funding, "年度末に報告する。");

        assert_eq!(*review.phase(), ReviewPhase::Complete);
        let summary = review.summary();
        assert_eq!((summary.accepted, summary.rejected, summary.total), (1, 1, 2));
        assert!(summary.message().contains("1件の改善を反映しました"));
    }

    #[test]
    fn alternative_applies_user_text() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        let mut review = ReviewSession::new();
        review.begin(&section(2, "地域の協力者への声かけ")).unwrap();
        review.load(critique()).unwrap();

        review
            .decide(Decision::Alternative("  2人みつける（週1回だけでも）  ".into()), &mut a, &mut view)
            .unwrap();
        assert_eq!(a.plan, "- 手伝ってくれる人を2人みつける（週1回だけでも）");
        assert_eq!(view.pending(ArtifactKind::Plan), 1);
        assert_eq!(review.summary().accepted, 1);
    }

    #[test]
    fn empty_alternative_is_rejected_without_advancing() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        let mut review = ReviewSession::new();
        review.begin(&section(2, "地域の協力者への声かけ")).unwrap();
        review.load(critique()).unwrap();

        let err = review
            .decide(Decision::Alternative("   ".into()), &mut a, &mut view)
            .unwrap_err();
        assert!(matches!(err, CatcherError::ValidationError(_)));
        assert_eq!(*review.phase(), ReviewPhase::Reviewing { index: 0 });
        assert!(review.decisions().is_empty());
    }

    #[test]
    fn missed_suggestion_is_not_fatal() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        let mut review = ReviewSession::new();
        review.begin(&section(0, "市の担当者")).unwrap();
        review
            .load(Critique {
                reviews: vec![persona("市の担当者")],
                suggestions: vec![suggestion(ArtifactKind::Plan, 0, "存在しない", "なにか")],
            })
            .unwrap();

        let applied = review.decide(Decision::Accept, &mut a, &mut view).unwrap();
        assert_eq!(applied, Some(Applied::Missed));
        assert_eq!(a.plan, artifacts().plan);
        assert_eq!(*review.phase(), ReviewPhase::Complete);
        assert_eq!(review.finalize(&mut view).unwrap(), 0);
    }

    #[test]
    fn finalize_clears_marks_and_marks_section_reviewed() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        let mut review = ReviewSession::new();
        review.begin(&section(2, "地域の協力者への声かけ")).unwrap();
        review.load(critique()).unwrap();
        review.decide(Decision::Accept, &mut a, &mut view).unwrap();

        assert_eq!(review.finalize(&mut view).unwrap(), 2);
        assert!(!view.has_marks());
        assert!(review.is_reviewed(2));
        assert_eq!(*review.phase(), ReviewPhase::Idle);
    }

    #[test]
    fn skip_keeps_applied_decisions() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        let mut review = ReviewSession::new();
        review.begin(&section(0, "市の担当者への相談メール")).unwrap();
        review.load(critique()).unwrap();
        review.decide(Decision::Accept, &mut a, &mut view).unwrap();

        assert_eq!(review.skip().unwrap(), 0);
        assert_eq!(a.profile, "利用者は年間延べ約400名です。");
        assert!(view.has_marks());
        assert!(review.is_reviewed(0));
        assert!(!review.is_open());
    }

    #[test]
    fn failure_cancels_and_is_retryable() {
        let mut review = ReviewSession::new();
        let s = section(0, "市の担当者への相談メール");
        review.begin(&s).unwrap();
        review.fail().unwrap();
        assert_eq!(*review.phase(), ReviewPhase::Cancelled);
        assert!(!review.is_reviewed(0));

        review.begin(&s).unwrap();
        assert!(review.is_open());
    }

    #[test]
    fn invalid_transitions_are_errors() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        let mut review = ReviewSession::new();

        let err = review.decide(Decision::Accept, &mut a, &mut view).unwrap_err();
        assert_eq!(err.to_string(), "Cannot decide while review is idle");
        assert!(review.load(Critique::default()).is_err());
        assert!(review.finalize(&mut view).is_err());
        assert!(review.skip().is_err());
        assert!(review.fail().is_err());

        review.begin(&section(0, "x")).unwrap();
        assert!(review.begin(&section(1, "y")).is_err());
    }
}
