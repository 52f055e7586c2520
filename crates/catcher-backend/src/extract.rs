//! Text cleanup around model calls: pulling JSON out of replies and
//! reducing fetched pages to their visible text.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use catcher_types::{CatcherError, Result};

/// Page text sent to the model is capped at this many characters.
pub const PAGE_TEXT_LIMIT: usize = 5000;

/// Parse a JSON object out of a model reply. Accepts bare JSON, fenced
/// blocks, and objects wrapped in prose.
pub fn extract_json<T: DeserializeOwned>(operation: &str, reply: &str) -> Result<T> {
    let trimmed = strip_fence(reply.trim());
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
        return Err(CatcherError::upstream(operation, "reply contained no JSON object"));
    };
    if end < start {
        return Err(CatcherError::upstream(operation, "reply contained no JSON object"));
    }
    serde_json::from_str(&trimmed[start..=end])
        .map_err(|e| CatcherError::upstream(operation, format!("unparseable JSON: {e}")))
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Visible text of an HTML page: scripts, styles and tags removed,
/// whitespace collapsed, capped at [`PAGE_TEXT_LIMIT`] characters.
pub fn page_text(html: &str) -> String {
    static PATTERNS: OnceLock<Option<[Regex; 4]>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        Some([
            Regex::new(r"(?is)<script[^>]*>.*?</script>").ok()?,
            Regex::new(r"(?is)<style[^>]*>.*?</style>").ok()?,
            Regex::new(r"<[^>]+>").ok()?,
            Regex::new(r"\s+").ok()?,
        ])
    });
    let Some([script, style, tag, space]) = patterns else {
        return truncate_chars(html.trim(), PAGE_TEXT_LIMIT).to_string();
    };

    let text = script.replace_all(html, "");
    let text = style.replace_all(&text, "");
    let text = tag.replace_all(&text, " ");
    let text = space.replace_all(&text, " ");
    truncate_chars(text.trim(), PAGE_TEXT_LIMIT).to_string()
}

/// The first `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
