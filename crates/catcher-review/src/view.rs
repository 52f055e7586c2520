//! Track-change projection of the artifacts.
//!
//! The view never stores HTML. Every render starts from the current markdown
//! source and overlays the pending marks, so the source and what the user
//! sees cannot drift apart.
//!
//! A change that reached the source is anchored by the byte span its
//! replacement occupies. Rendering brackets each span with private-use
//! sentinels, runs the markdown renderer, and swaps the sentinels for
//! redline markup, so the mark sits on the edited text even when the same
//! words occur elsewhere in the document.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use catcher_types::{ArtifactKind, Artifacts};

use crate::fuzzy::{Applied, Splice};
use crate::render::{escape_html, markdown_to_html};

const OPEN: char = '\u{E000}';
const CLOSE: char = '\u{E001}';

#[derive(Debug, Clone, PartialEq, Eq)]
struct Mark {
    kind: ArtifactKind,
    before: String,
    after: String,
    applied: Applied,
    /// Where `after` sits in the source. `None` once a later edit wrote
    /// over it.
    span: Option<Range<usize>>,
}

#[derive(Debug, Clone, Default)]
pub struct TrackedView {
    marks: Vec<Mark>,
}

impl TrackedView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a decided edit so it is shown as a track change. Spans of
    /// earlier marks on the same artifact follow the splice.
    pub fn record(&mut self, kind: ArtifactKind, before: &str, after: &str, splice: Splice) {
        if splice.applied.reached_source() {
            let old_end = splice.start + splice.removed;
            let shift = splice.inserted as isize - splice.removed as isize;
            for mark in self.marks.iter_mut().filter(|m| m.kind == kind) {
                mark.span = match mark.span.take() {
                    Some(span) if span.start >= old_end => shifted(&span, shift),
                    Some(span) if span.end <= splice.start => Some(span),
                    _ => None,
                };
            }
        }
        self.marks.push(Mark {
            kind,
            before: before.to_string(),
            after: after.to_string(),
            applied: splice.applied,
            span: splice.inserted_range(),
        });
    }

    pub fn has_marks(&self) -> bool {
        !self.marks.is_empty()
    }

    pub fn pending(&self, kind: ArtifactKind) -> usize {
        self.marks.iter().filter(|m| m.kind == kind).count()
    }

    /// Drop marks for one artifact (its source was replaced wholesale).
    pub fn discard(&mut self, kind: ArtifactKind) {
        self.marks.retain(|m| m.kind != kind);
    }

    /// Accept every pending change: only the inserted text remains, which
    /// is already what the source says.
    pub fn finalize(&mut self) {
        tracing::debug!(marks = self.marks.len(), "Track changes finalized");
        self.marks.clear();
    }

    /// HTML for one artifact: its source rendered, with pending marks laid
    /// over it.
    pub fn render(&self, artifacts: &Artifacts, kind: ArtifactKind) -> String {
        let source = artifacts.get(kind);
        let mut anchored: Vec<(&Mark, Range<usize>)> = Vec::new();
        let mut unanchored = Vec::new();
        let mut view_only = Vec::new();

        for mark in self.marks.iter().filter(|m| m.kind == kind) {
            if !mark.applied.reached_source() {
                view_only.push(mark);
                continue;
            }
            match mark.span.clone().filter(|s| fits(source, s)) {
                Some(span) => anchored.push((mark, span)),
                None => unanchored.push(mark),
            }
        }
        anchored.sort_by_key(|(_, span)| span.start);
        let mut end = 0;
        anchored.retain(|(mark, span)| {
            if span.start < end {
                unanchored.push(*mark);
                return false;
            }
            end = span.end;
            true
        });

        let mut html = markdown_to_html(&bracket(source, &anchored));

        // View-only redline over text the source edit could not reach.
        for mark in view_only {
            wrap_first(&mut html, &mark.before, |found| {
                format!("{} {}", deleted(found), inserted(&escape_html(&mark.after)))
            });
        }

        let mut notes: Vec<String> = unanchored.into_iter().map(note).collect();
        let html = substitute(&html, &anchored, &mut notes);
        if notes.is_empty() {
            html
        } else {
            notes.concat() + &html
        }
    }
}

fn shifted(span: &Range<usize>, by: isize) -> Option<Range<usize>> {
    Some(span.start.checked_add_signed(by)?..span.end.checked_add_signed(by)?)
}

fn fits(source: &str, span: &Range<usize>) -> bool {
    span.start <= span.end
        && span.end <= source.len()
        && source.is_char_boundary(span.start)
        && source.is_char_boundary(span.end)
}

/// Copy of `source` with each span wrapped in sentinels. The opening one
/// goes after any block syntax the span starts with and the closing one
/// before trailing whitespace, so block structure is left intact.
fn bracket(source: &str, anchored: &[(&Mark, Range<usize>)]) -> String {
    let mut out = String::with_capacity(source.len() + anchored.len() * 6);
    let mut at = 0;
    for (_, span) in anchored {
        let open = span.start + block_prefix_len(source, span);
        let close = open + source[open..span.end].trim_end().len();
        out.push_str(&source[at..open]);
        out.push(OPEN);
        out.push_str(&source[open..close]);
        out.push(CLOSE);
        at = close;
    }
    out.push_str(&source[at..]);
    out
}

fn block_prefix_len(source: &str, span: &Range<usize>) -> usize {
    static PREFIX: OnceLock<Option<Regex>> = OnceLock::new();
    let at_line_start = span.start == 0 || source[..span.start].ends_with('\n');
    if !at_line_start {
        return 0;
    }
    PREFIX
        .get_or_init(|| Regex::new(r"^[ \t]*(?:(?:#{1,6}|[-*+>]|\d{1,9}[.)])[ \t]+)*").ok())
        .as_ref()
        .and_then(|re| re.find(&source[span.clone()]))
        .map_or(0, |m| m.end())
}

/// Swap sentinel pairs for redline markup. A pair the renderer split across
/// blocks or moved into a tag becomes a leading note instead.
fn substitute(html: &str, anchored: &[(&Mark, Range<usize>)], notes: &mut Vec<String>) -> String {
    let sentinels: Vec<(usize, char)> = html
        .char_indices()
        .filter(|(_, c)| *c == OPEN || *c == CLOSE)
        .collect();
    let paired = sentinels.len() == anchored.len() * 2
        && sentinels
            .chunks(2)
            .all(|pair| pair[0].1 == OPEN && pair[1].1 == CLOSE);
    if !paired {
        tracing::debug!(marks = anchored.len(), "Track change anchors lost in rendering");
        notes.extend(anchored.iter().map(|(mark, _)| note(mark)));
        return html.chars().filter(|c| *c != OPEN && *c != CLOSE).collect();
    }

    let mut out = String::with_capacity(html.len() + anchored.len() * 96);
    let mut at = 0;
    for ((mark, _), pair) in anchored.iter().zip(sentinels.chunks(2)) {
        let (open, close) = (pair[0].0, pair[1].0);
        let inner = &html[open + OPEN.len_utf8()..close];
        out.push_str(&html[at..open]);
        if stays_inline(html, open, close) {
            out.push_str(&deleted(&escape_html(&mark.before)));
            if !mark.after.is_empty() {
                out.push(' ');
                out.push_str(&inserted(inner));
            }
        } else {
            notes.push(note(mark));
            out.push_str(inner);
        }
        at = close + CLOSE.len_utf8();
    }
    out.push_str(&html[at..]);
    out
}

fn stays_inline(html: &str, open: usize, close: usize) -> bool {
    static BLOCK_TAG: OnceLock<Option<Regex>> = OnceLock::new();
    let crosses_block = BLOCK_TAG
        .get_or_init(|| {
            Regex::new(r"</?(?:p|li|ul|ol|h[1-6]|blockquote|pre|table|thead|tbody|tr|td|th|hr)\b")
                .ok()
        })
        .as_ref()
        .is_some_and(|re| re.is_match(&html[open..close]));
    !crosses_block && !inside_tag(&html[..open]) && !inside_tag(&html[..close])
}

fn inside_tag(prefix: &str) -> bool {
    prefix.rfind('<') > prefix.rfind('>')
}

fn note(mark: &Mark) -> String {
    if mark.after.is_empty() {
        format!(
            "<p class=\"review-applied-note\">✍️ 削除: {}</p>\n",
            deleted(&escape_html(&mark.before))
        )
    } else {
        format!(
            "<p class=\"review-applied-note\">✍️ 反映: {}</p>\n",
            escape_html(&mark.after)
        )
    }
}

fn deleted(html: &str) -> String {
    format!("<span class=\"redline-deleted\">{html}</span>")
}

fn inserted(html: &str) -> String {
    format!("<span class=\"redline-inserted\">{html}</span>")
}

/// Wrap the first occurrence of `text` in `html`, trying it verbatim, then
/// escaped with and without quote entities.
fn wrap_first(html: &mut String, text: &str, wrap: impl Fn(&str) -> String) -> bool {
    if text.is_empty() {
        return false;
    }
    let escaped = escape_html(text);
    let unquoted = escaped.replace("&quot;", "\"");
    for needle in [text, escaped.as_str(), unquoted.as_str()] {
        if let Some(start) = html.find(needle) {
            let replacement = wrap(needle);
            html.replace_range(start..start + needle.len(), &replacement);
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzy::replace_once_flexible;

    fn artifacts() -> Artifacts {
        Artifacts {
            profile: "## 活動紹介\n\n毎週水曜に公民館でひらいています。".into(),
            plan: "## 90日プラン\n\n- 手伝ってくれる人を2人みつける\n- 市の担当課に電話する\n".into(),
            funding: "## 資金計画\n\n会場費 < 3万円".into(),
            messages: "### 市の担当者へ\n\nよろしくお願いします。".into(),
        }
    }

    fn apply(view: &mut TrackedView, a: &mut Artifacts, kind: ArtifactKind, before: &str, after: &str) {
        let mut text = a.get(kind).to_string();
        let splice = replace_once_flexible(&mut text, before, after);
        a.set(kind, text);
        view.record(kind, before, after, splice);
    }

    fn redline(before: &str, after: &str) -> String {
        format!("{} {}", deleted(before), inserted(after))
    }

    #[test]
    fn without_marks_view_is_plain_render() {
        let a = artifacts();
        let view = TrackedView::new();
        assert_eq!(
            view.render(&a, ArtifactKind::Plan),
            markdown_to_html(&a.plan)
        );
    }

    #[test]
    fn applied_edit_shows_redline() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        apply(&mut view, &mut a, ArtifactKind::Plan, "手伝ってくれる人を2人みつける", "協力者を2人みつける");

        let html = view.render(&a, ArtifactKind::Plan);
        assert!(html.contains(&redline("手伝ってくれる人を2人みつける", "協力者を2人みつける")));
        assert_eq!(view.pending(ArtifactKind::Plan), 1);
        assert_eq!(view.pending(ArtifactKind::Profile), 0);
    }

    #[test]
    fn redline_sits_on_the_edited_line_not_an_earlier_copy() {
        let mut a = artifacts();
        a.plan = "- 市に電話する\n- 協力者に声をかける\n".into();
        let mut view = TrackedView::new();
        apply(&mut view, &mut a, ArtifactKind::Plan, "協力者に声をかける", "市に電話する");

        let html = view.render(&a, ArtifactKind::Plan);
        assert!(html.contains("<li>市に電話する</li>"), "{html}");
        assert!(html.contains(&format!(
            "<li>{}</li>",
            redline("協力者に声をかける", "市に電話する")
        )));
        assert_eq!(html.matches("redline-deleted").count(), 1);
    }

    #[test]
    fn deletion_strikes_out_the_removed_text() {
        let mut a = artifacts();
        a.plan = "- 市に電話する（できれば今月中）\n- 仲間をさがす\n".into();
        let mut view = TrackedView::new();
        apply(&mut view, &mut a, ArtifactKind::Plan, "（できれば今月中）", "");

        let html = view.render(&a, ArtifactKind::Plan);
        assert!(html.contains(&format!(
            "<li>市に電話する{}</li>",
            deleted("（できれば今月中）")
        )));
        assert!(!html.contains("review-applied-note"));
        assert!(!html.contains("redline-inserted"));
    }

    #[test]
    fn earlier_marks_follow_later_edits() {
        let mut a = artifacts();
        a.plan = "- 市に電話する\n- 協力者に声をかける\n".into();
        let mut view = TrackedView::new();
        apply(&mut view, &mut a, ArtifactKind::Plan, "協力者に声をかける", "仲間を2人さがす");
        apply(&mut view, &mut a, ArtifactKind::Plan, "市に電話する", "市の担当課に電話で相談する");

        let html = view.render(&a, ArtifactKind::Plan);
        assert!(html.contains(&format!(
            "<li>{}</li>",
            redline("市に電話する", "市の担当課に電話で相談する")
        )));
        assert!(html.contains(&format!(
            "<li>{}</li>",
            redline("協力者に声をかける", "仲間を2人さがす")
        )));
    }

    #[test]
    fn overwritten_mark_becomes_a_note() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        apply(&mut view, &mut a, ArtifactKind::Plan, "手伝ってくれる人を2人みつける", "協力者を2人みつける");
        apply(&mut view, &mut a, ArtifactKind::Plan, "協力者を2人", "仲間を3人");

        let html = view.render(&a, ArtifactKind::Plan);
        assert!(html.starts_with("<p class=\"review-applied-note\">✍️ 反映: 協力者を2人みつける</p>"));
        assert!(html.contains(&redline("協力者を2人", "仲間を3人")));
        assert!(a.plan.contains("仲間を3人みつける"));
    }

    #[test]
    fn escaped_text_is_marked() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        apply(&mut view, &mut a, ArtifactKind::Funding, "会場費 < 3万円", "会場費 < 2万円");

        let html = view.render(&a, ArtifactKind::Funding);
        assert!(html.contains(&redline("会場費 &lt; 3万円", "会場費 &lt; 2万円")));
    }

    #[test]
    fn inline_markup_stays_inside_the_insert() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        apply(&mut view, &mut a, ArtifactKind::Profile, "毎週水曜に", "**毎週水曜**に");

        let html = view.render(&a, ArtifactKind::Profile);
        assert!(html.contains(&redline("毎週水曜に", "<strong>毎週水曜</strong>に")), "{html}");
        assert!(!html.contains("review-applied-note"));
    }

    #[test]
    fn heading_edit_keeps_the_heading() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        apply(&mut view, &mut a, ArtifactKind::Plan, "## 90日プラン", "## 3か月プラン");

        let html = view.render(&a, ArtifactKind::Plan);
        assert!(html.contains(&format!("<h2>{}</h2>", redline("## 90日プラン", "3か月プラン"))));
    }

    #[test]
    fn edit_spanning_blocks_becomes_a_note() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        apply(
            &mut view,
            &mut a,
            ArtifactKind::Profile,
            "公民館でひらいています。",
            "ひらいています。\n\n## 場所\n\n公民館",
        );

        let html = view.render(&a, ArtifactKind::Profile);
        assert!(html.starts_with("<p class=\"review-applied-note\">✍️ 反映: "));
        assert!(!html.contains("redline-"));
        assert!(!html.contains(OPEN) && !html.contains(CLOSE));
        assert!(html.contains("<h2>場所</h2>"));
    }

    #[test]
    fn missed_edit_is_view_only() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        let before_source = a.profile.clone();
        view.record(ArtifactKind::Profile, "公民館", "集会所", Splice::missed());

        let html = view.render(&a, ArtifactKind::Profile);
        assert!(html.contains("<span class=\"redline-deleted\">公民館</span>"));
        assert_eq!(a.profile, before_source);
        a.profile.push('!');
        assert!(!view.render(&a, ArtifactKind::Messages).contains("redline"));
    }

    #[test]
    fn view_only_redline_finds_quoted_text() {
        let mut a = artifacts();
        a.messages = "### 市の担当者へ\n\n\"よりみち食堂\"の件です。".into();
        let mut view = TrackedView::new();
        view.record(ArtifactKind::Messages, "\"よりみち食堂\"", "「よりみち食堂」", Splice::missed());

        let html = view.render(&a, ArtifactKind::Messages);
        assert!(html.contains("redline-deleted"), "{html}");
        assert!(html.contains(&inserted("「よりみち食堂」")));
    }

    #[test]
    fn invisible_miss_renders_nothing_extra() {
        let a = artifacts();
        let mut view = TrackedView::new();
        view.record(ArtifactKind::Plan, "存在しない文", "なにか", Splice::missed());
        assert_eq!(view.render(&a, ArtifactKind::Plan), markdown_to_html(&a.plan));
    }

    #[test]
    fn finalize_leaves_no_track_change_markup() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        apply(&mut view, &mut a, ArtifactKind::Plan, "手伝ってくれる人を2人みつける", "協力者を2人みつける");
        apply(&mut view, &mut a, ArtifactKind::Profile, "毎週水曜に", "**毎週水曜**に");
        view.record(ArtifactKind::Messages, "よろしく", "どうぞよろしく", Splice::missed());

        view.finalize();

        assert!(!view.has_marks());
        for kind in ArtifactKind::ALL {
            let html = view.render(&a, kind);
            assert!(!html.contains("redline"), "{kind} still marked");
            assert!(!html.contains("review-applied-note"));
            assert_eq!(html, markdown_to_html(a.get(kind)));
        }
        assert!(a.plan.contains("協力者を2人みつける"));
    }

    #[test]
    fn discard_drops_marks_for_one_artifact() {
        let mut a = artifacts();
        let mut view = TrackedView::new();
        apply(&mut view, &mut a, ArtifactKind::Plan, "市の担当課", "市役所");
        apply(&mut view, &mut a, ArtifactKind::Funding, "会場費", "会場代");
        view.discard(ArtifactKind::Plan);
        assert_eq!(view.pending(ArtifactKind::Plan), 0);
        assert_eq!(view.pending(ArtifactKind::Funding), 1);
    }
}
