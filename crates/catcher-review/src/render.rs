//! Markdown to HTML and plain text.

use pulldown_cmark::{html, Event, Options, Parser, TagEnd};

/// Render markdown to HTML. Tables and strikethrough are enabled since the
/// funding plan is usually a table.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, options());
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Escape text for insertion into HTML body content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Visible text of a markdown fragment, one line per block.
pub fn plain_text(markdown: &str) -> String {
    let mut out = String::new();
    for event in Parser::new_ext(markdown, options()) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::TableRow,
            ) => {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Event::End(TagEnd::TableCell) => out.push('\t'),
            _ => {}
        }
    }
    out.trim_end().to_string()
}

pub(crate) fn options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_headings_and_lists() {
        let html = markdown_to_html("## 90日プラン\n\n- 市に電話する\n- 仲間をさがす\n");
        assert!(html.contains("<h2>90日プラン</h2>"));
        assert!(html.contains("<li>市に電話する</li>"));
    }

    #[test]
    fn renders_tables() {
        let html = markdown_to_html("| 項目 | 金額 |\n|---|---|\n| 会場費 | 3万 |\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>会場費</td>"));
    }

    #[test]
    fn escape_html_covers_markup_characters() {
        assert_eq!(escape_html("a < b & c > d"), "a &lt; b &amp; c &gt; d");
        assert_eq!(escape_html("「そのまま」"), "「そのまま」");
        assert_eq!(escape_html("\"よりみち\"食堂"), "&quot;よりみち&quot;食堂");
    }

    #[test]
    fn rendered_text_is_escaped() {
        let html = markdown_to_html("費用 < 5万 & 人手");
        assert!(html.contains(&escape_html("費用 < 5万 & 人手")));
    }

    #[test]
    fn plain_text_drops_markup() {
        let text = plain_text("### 市の担当者へ\n\n**いつも**お世話に\nなっております。\n\n- 一点目\n");
        assert_eq!(text, "市の担当者へ\nいつもお世話に\nなっております。\n一点目");
    }
}
