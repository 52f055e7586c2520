//! Reviewable sections of the message pack.
//!
//! The messages artifact holds several drafts separated by thematic breaks,
//! each introduced by a level-3 heading naming its recipient. Each such part
//! becomes a section that can be sent for review on its own.

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};

use crate::render::{options, plain_text};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Position among reviewable sections (preamble parts are not counted).
    pub index: usize,
    pub title: String,
    /// Visible body text without the title.
    pub text: String,
    /// Markdown source of the whole part, title included.
    pub markdown: String,
}

/// Split `markdown` on thematic breaks and keep the parts that carry a
/// level-3 heading.
pub fn split_sections(markdown: &str) -> Vec<Section> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (event, range) in Parser::new_ext(markdown, options()).into_offset_iter() {
        if matches!(event, Event::Rule) {
            parts.push(&markdown[start..range.start]);
            start = range.end;
        }
    }
    parts.push(&markdown[start..]);

    let mut sections = Vec::new();
    for part in parts {
        let Some((title, heading_range)) = find_h3(part) else {
            continue;
        };
        let body = format!("{}{}", &part[..heading_range.start], &part[heading_range.end..]);
        sections.push(Section {
            index: sections.len(),
            title,
            text: plain_text(&body),
            markdown: part.trim().to_string(),
        });
    }
    tracing::debug!(count = sections.len(), "Message sections split");
    sections
}

fn find_h3(part: &str) -> Option<(String, std::ops::Range<usize>)> {
    let mut title: Option<(String, usize)> = None;
    for (event, range) in Parser::new_ext(part, options()).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H3,
                ..
            }) if title.is_none() => title = Some((String::new(), range.start)),
            Event::Text(text) | Event::Code(text) => {
                if let Some((ref mut t, _)) = title {
                    t.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(HeadingLevel::H3)) => {
                if let Some((t, begin)) = title.take() {
                    return Some((t.trim().to_string(), begin..range.end));
                }
            }
            _ => {}
        }
    }
    None
}
