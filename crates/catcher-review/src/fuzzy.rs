//! Whitespace-tolerant single replacement.
//!
//! Suggestions quote a fragment of the artifact as the reviewer saw it. The
//! reviewer's copy often differs from the source only in line breaks or
//! spacing, so matching falls back from an exact substring to a pattern that
//! ignores whitespace in `before` and allows optional whitespace between
//! every remaining character.

use std::ops::Range;

use regex::Regex;

/// How a replacement landed in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// `before` occurred verbatim.
    Exact,
    /// `before` matched only after relaxing whitespace.
    Flexible,
    /// No match; the source is unchanged.
    Missed,
}

impl Applied {
    pub fn reached_source(self) -> bool {
        !matches!(self, Applied::Missed)
    }
}

/// Where a replacement landed: `start..start + removed` of the old source
/// became `start..start + inserted` of the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Splice {
    pub applied: Applied,
    pub start: usize,
    pub removed: usize,
    pub inserted: usize,
}

impl Splice {
    pub fn missed() -> Self {
        Self {
            applied: Applied::Missed,
            start: 0,
            removed: 0,
            inserted: 0,
        }
    }

    /// Byte range of the replacement in the new source.
    pub fn inserted_range(&self) -> Option<Range<usize>> {
        self.applied
            .reached_source()
            .then(|| self.start..self.start + self.inserted)
    }
}

/// Replace the first occurrence of `before` in `source` with `after`.
///
/// `after` is inserted literally. A miss leaves `source` byte-identical.
pub fn replace_once_flexible(source: &mut String, before: &str, after: &str) -> Splice {
    if source.is_empty() || before.is_empty() {
        return Splice::missed();
    }

    let (applied, range) = if let Some(start) = source.find(before) {
        (Applied::Exact, start..start + before.len())
    } else {
        let found = flexible_pattern(before).and_then(|p| p.find(source).map(|m| m.range()));
        let Some(range) = found else {
            tracing::debug!(before_len = before.chars().count(), "Suggestion missed the source");
            return Splice::missed();
        };
        (Applied::Flexible, range)
    };

    let splice = Splice {
        applied,
        start: range.start,
        removed: range.len(),
        inserted: after.len(),
    };
    source.replace_range(range, after);
    tracing::debug!(?applied, at = splice.start, "Suggestion applied");
    splice
}

fn flexible_pattern(before: &str) -> Option<Regex> {
    let pieces: Vec<String> = before
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| regex::escape(c.encode_utf8(&mut [0u8; 4])))
        .collect();
    if pieces.is_empty() {
        return None;
    }
    Regex::new(&pieces.join(r"\s*")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_replaces_only_first_occurrence() {
        let mut src = String::from("A: 見守り\nB: 見守り\n");
        let splice = replace_once_flexible(&mut src, "見守り", "見守り・宿題サポート");
        assert_eq!(splice.applied, Applied::Exact);
        assert_eq!(src, "A: 見守り・宿題サポート\nB: 見守り\n");
    }

    #[test]
    fn exact_match_leaves_rest_byte_identical() {
        let prefix = "## 90日プラン\n\n1. 市の担当課に電話する\n";
        let suffix = "\n3. 振り返り会をひらく\n";
        let mut src = format!("{prefix}2. 手伝ってくれる人を2人みつける{suffix}");
        replace_once_flexible(&mut src, "手伝ってくれる人を2人みつける", "協力者を2人みつける");
        assert!(src.starts_with(prefix));
        assert!(src.ends_with(suffix));
        assert!(src.contains("2. 協力者を2人みつける"));
    }

    #[test]
    fn flexible_match_tolerates_inserted_newline() {
        let mut src = String::from("- 手伝ってくれる人を\n2人みつける\n- 次の項目");
        let splice = replace_once_flexible(
            &mut src,
            "手伝ってくれる人を2人みつける",
            "手伝ってくれる人を2人みつける（できることからでOK）",
        );
        assert_eq!(splice.applied, Applied::Flexible);
        assert_eq!(
            src,
            "- 手伝ってくれる人を2人みつける（できることからでOK）\n- 次の項目"
        );
    }

    #[test]
    fn flexible_match_tolerates_collapsed_spaces() {
        let mut src = String::from("月に 1回   開催");
        let splice = replace_once_flexible(&mut src, "月に1回 開催", "毎週開催");
        assert_eq!(splice.applied, Applied::Flexible);
        assert_eq!(src, "毎週開催");
    }

    #[test]
    fn splice_reports_where_the_replacement_landed() {
        let mut src = String::from("- 市に電話する\n- 協力者に声をかける\n");
        let splice = replace_once_flexible(&mut src, "協力者に声をかける", "市に電話する");
        let range = splice.inserted_range().unwrap();
        assert_eq!(&src[range.clone()], "市に電話する");
        assert_eq!(range.start, "- 市に電話する\n- ".len());
        assert_eq!(splice.removed, "協力者に声をかける".len());

        let mut src = String::from("月に 1回\n開催です");
        let splice = replace_once_flexible(&mut src, "1回開催", "");
        assert_eq!(splice.applied, Applied::Flexible);
        assert_eq!(splice.removed, "1回\n開催".len());
        assert_eq!(splice.inserted_range(), Some(7..7));
        assert_eq!(src, "月に です");
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let mut src = String::from("予算は(3万+α)円です");
        let splice = replace_once_flexible(&mut src, "(3万+α)", "5万");
        assert_eq!(splice.applied, Applied::Exact);
        assert_eq!(src, "予算は5万円です");

        let mut src = String::from("費用 [a.b]\n*要確認*");
        let splice = replace_once_flexible(&mut src, "[a.b] *要確認*", "済");
        assert_eq!(splice.applied, Applied::Flexible);
        assert_eq!(src, "費用 済");
    }

    #[test]
    fn replacement_text_is_literal() {
        let mut src = String::from("金額: 未定");
        replace_once_flexible(&mut src, "未  定", "$1 と $0");
        assert_eq!(src, "金額: $1 と $0");
    }

    #[test]
    fn miss_leaves_source_unchanged() {
        let original = "## 資金計画\n\n補助金を申請する";
        let mut src = original.to_string();
        let splice = replace_once_flexible(&mut src, "クラウドファンディング", "寄付");
        assert_eq!(splice.applied, Applied::Missed);
        assert!(!splice.applied.reached_source());
        assert_eq!(splice.inserted_range(), None);
        assert_eq!(src, original);
    }

    #[test]
    fn empty_inputs_miss() {
        let mut src = String::new();
        assert_eq!(replace_once_flexible(&mut src, "a", "b").applied, Applied::Missed);
        let mut src = String::from("text");
        assert_eq!(replace_once_flexible(&mut src, "", "b").applied, Applied::Missed);
        assert_eq!(replace_once_flexible(&mut src, " \n ", "b").applied, Applied::Missed);
        assert_eq!(src, "text");
    }
}
