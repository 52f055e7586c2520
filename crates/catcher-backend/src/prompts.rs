//! Prompt assembly for the text-completion service.
//!
//! Every prompt is a stack of prioritized sections: instructions first, then
//! the material to work on, then the output contract and rules.

use catcher_types::{ActivitySummary, ArtifactKind, SlotStore};

use crate::extract::truncate_chars;
use crate::{ChatRequest, CritiqueRequest};

/// Pasted text is capped at this many characters.
pub const PASTED_TEXT_LIMIT: usize = 5000;
/// Correction instructions are capped at this many characters.
pub const CORRECTION_LIMIT: usize = 2000;
/// Each artifact contributes at most this many characters to a critique.
pub const CRITIQUE_EXCERPT_LIMIT: usize = 800;

const SUMMARY_SHAPE: &str = r#"{
  "activity": "活動名 — 一言説明",
  "location": "活動場所",
  "schedule": "活動頻度・スケジュール",
  "participants": "参加者の規模",
  "operator": "運営体制",
  "started": "開始時期",
  "funding": "現在の資金状況"
}"#;

const JSON_ONLY: &str = "JSON以外のテキストは出力しないでください。";

/// Builds a prompt from prioritized sections.
#[derive(Debug, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

#[derive(Debug, Clone)]
struct PromptSection {
    heading: String,
    content: String,
    priority: u8, // 0 = highest
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The opening instruction (always first, no heading).
    pub fn with_base(mut self, prompt: &str) -> Self {
        self.push("", prompt, 0);
        self
    }

    /// Material delimited so the model can tell it apart from instructions.
    pub fn with_material(mut self, label: &str, content: &str) -> Self {
        self.push(
            "",
            &format!("--- {label} ---\n{content}\n--- ここまで ---"),
            1,
        );
        self
    }

    /// A named block of context (skipped when empty).
    pub fn with_section(mut self, heading: &str, content: &str) -> Self {
        if !content.trim().is_empty() {
            self.push(heading, content, 2);
        }
        self
    }

    /// The required output shape.
    pub fn with_output(mut self, intro: &str, shape: &str) -> Self {
        self.push("", &format!("{intro}\n{shape}"), 3);
        self
    }

    /// Bulleted rules, closing the prompt.
    pub fn with_rules(mut self, heading: &str, rules: &[&str]) -> Self {
        if !rules.is_empty() {
            let body = rules
                .iter()
                .map(|r| format!("- {r}"))
                .collect::<Vec<_>>()
                .join("\n");
            self.push("", &format!("{heading}\n{body}"), 4);
        }
        self
    }

    /// Trailing line after everything else.
    pub fn with_footer(mut self, footer: &str) -> Self {
        self.push("", footer, 5);
        self
    }

    fn push(&mut self, heading: &str, content: &str, priority: u8) {
        self.sections.push(PromptSection {
            heading: heading.to_string(),
            content: content.to_string(),
            priority,
        });
    }

    pub fn build(mut self) -> String {
        self.sections.sort_by_key(|s| s.priority);
        let parts: Vec<String> = self
            .sections
            .iter()
            .map(|s| {
                if s.heading.is_empty() {
                    s.content.clone()
                } else {
                    format!("【{}】\n{}", s.heading, s.content)
                }
            })
            .collect();
        parts.join("\n\n")
    }
}

fn summary_rules(source: &str) -> Vec<String> {
    vec![
        format!("{source}から明確に読み取れる情報はそのまま記載"),
        format!("{source}に書かれていないが、活動内容から合理的に推測できる情報は補完し、値の末尾に「（推測）」と付けてください"),
        "「不明」「unknown」とは絶対に書かないでください。必ず推測で埋めてください".into(),
        "すべて日本語で回答してください".into(),
    ]
}

fn rules_ref(rules: &[String]) -> Vec<&str> {
    rules.iter().map(String::as_str).collect()
}

/// Summarize a fetched page. `page_text` may describe a fetch failure.
pub fn summarize_url(url: &str, page_text: &str) -> String {
    let rules = summary_rules("ページ内容");
    PromptBuilder::new()
        .with_base(&format!(
            "以下はWebサイト（{url}）から取得した実際のテキスト内容です。\nこの内容をもとに、この団体・活動について要約してください。"
        ))
        .with_material("ページ内容", page_text)
        .with_output("以下のJSON形式で返してください（値はすべて日本語の短い文）:", SUMMARY_SHAPE)
        .with_rules("重要なルール:", &rules_ref(&rules))
        .with_footer(JSON_ONLY)
        .build()
}

/// Summarize pasted profile text.
pub fn summarize_text(text: &str) -> String {
    let rules = summary_rules("テキスト");
    PromptBuilder::new()
        .with_base("以下はSNSのプロフィール文や活動紹介のテキストです。\nこの内容をもとに、この団体・活動について要約してください。")
        .with_material("テキスト", truncate_chars(text, PASTED_TEXT_LIMIT))
        .with_output("以下のJSON形式で返してください（値はすべて日本語の短い文）:", SUMMARY_SHAPE)
        .with_rules("重要なルール:", &rules_ref(&rules))
        .with_footer(JSON_ONLY)
        .build()
}

/// Apply correction instructions to a summary.
pub fn update_summary(current: &ActivitySummary, correction: &str) -> String {
    let current = serde_json::to_string_pretty(current).unwrap_or_default();
    PromptBuilder::new()
        .with_base("以下はある地域活動の要約データと、ユーザーからの修正指示です。\n修正指示を反映して、要約データを更新してください。")
        .with_material("現在の要約", &current)
        .with_material("ユーザーの修正指示", truncate_chars(correction, CORRECTION_LIMIT))
        .with_output("修正を反映した上で、以下のJSON形式で返してください:", SUMMARY_SHAPE)
        .with_rules(
            "ルール:",
            &[
                "ユーザーの修正指示に該当する項目だけを更新し、それ以外はそのまま維持",
                "すべて日本語で回答",
            ],
        )
        .with_footer(JSON_ONLY)
        .build()
}

/// Generate one artifact from the collected slots.
pub fn generate(kind: ArtifactKind, slots: &SlotStore) -> String {
    let slots_json = serde_json::to_string_pretty(&slots.to_json()).unwrap_or_default();
    let (task, shape, rules): (&str, &str, &[&str]) = match kind {
        ArtifactKind::Profile => (
            "地域の小さな団体の「活動紹介」を書いてください。自治体・企業・地域の人が最初に読む紹介文です。",
            "## 活動紹介 から始まるマークダウン。活動内容、場所と頻度、参加者、運営体制、これからの一言を含める。",
            &["300〜500文字程度", "実績は数字で書く", "事実として分からないことは断定しない"],
        ),
        ArtifactKind::Plan => (
            "来年度も活動を続けるための「90日プラン」を作ってください。",
            "## 90日プラン から始まるマークダウン。今週やること、1か月目、2か月目、3か月目の見出しごとにチェックリストで書く。",
            &["一つひとつの行動は30分以内に始められる粒度", "締切とのずれがある場合は先に書く", "1人で運営していても回る量に抑える"],
        ),
        ArtifactKind::Funding => (
            "活動の「資金計画」を作ってください。",
            "## 資金計画 から始まるマークダウン。足りない金額、収入源の候補（自治体・企業協賛・寄付・助成金）を表で示し、それぞれの次の一手を書く。",
            &["金額は目安であることを明記", "ひとつの収入源に頼りきらない"],
        ),
        ArtifactKind::Messages => (
            "関係者ごとに送る「文章パック」を作ってください。",
            "## 文章パック（関係者別） のあと、--- で区切って自治体向けメール、企業向け協賛依頼メール、地域向けSNS投稿案を ### 見出し付きで書く。",
            &["そのまま送れる完成文にする", "相手にとってのメリットを一文入れる", "宛先ごとに長さを変える（SNSは200文字程度）"],
        ),
    };
    PromptBuilder::new()
        .with_base(&format!("あなたは地方の小さな団体を支援する伴走者です。{task}"))
        .with_material("ヒアリング結果（JSON）", &slots_json)
        .with_output("出力形式:", shape)
        .with_rules("ルール:", rules)
        .with_footer("前置きや説明文は不要です。マークダウン本文だけを出力してください。")
        .build()
}

const CRITIQUE_SHAPE: &str = r##"{
  "reviews": [
    { "persona": "市の担当者", "avatar": "👩‍💼", "role": "行政予算の視点", "roleColor": "#5BA4A4", "comments": ["指摘1", "指摘2"] },
    { "persona": "地元企業の社長", "avatar": "🏢", "role": "企業経営の視点", "roleColor": "#D4A853", "comments": ["指摘1", "指摘2"] },
    { "persona": "地域の協力者", "avatar": "🙋", "role": "手伝う側の視点", "roleColor": "#7B9E6B", "comments": ["指摘1", "指摘2"] }
  ],
  "suggestions": [
    { "id": "s1", "tab": "profile|plan|funding|messages", "reviewerIndex": 0, "reason": "改善理由（短く）", "before": "元のテキスト（完全一致で）", "after": "改善後のテキスト" }
  ]
}"##;

/// Ask three stakeholder personas to review the artifacts.
pub fn critique(request: &CritiqueRequest) -> String {
    let mut builder = PromptBuilder::new()
        .with_base("あなたは文書レビューの専門家です。以下の4つの出力を「受け取り手」の視点でレビューしてください。")
        .with_section(
            "レビュアー3名",
            "1. 市の担当者（行政予算の視点）：この書類で予算を通せるか？実績は具体的か？\n2. 地元企業の社長（企業経営の視点）：この協賛提案で社内で決められるか？メリットは明確か？\n3. 地域の協力者（手伝う側の視点）：ボランティアとして参加したくなるか？何をするか明確か？",
        )
        .with_section(
            &format!("レビュー対象：{}", request.section_title),
            &request.section_text,
        );
    for kind in ArtifactKind::ALL {
        builder = builder.with_section(
            kind.label(),
            truncate_chars(request.artifacts.get(kind), CRITIQUE_EXCERPT_LIMIT),
        );
    }
    builder
        .with_output("出力するJSON形式:", CRITIQUE_SHAPE)
        .with_rules(
            "注意:",
            &[
                "suggestionsは4〜6件",
                "beforeは元テキストから正確にコピーすること",
                "afterは具体的な改善案を書くこと",
                "tabは profile, plan, funding, messages のいずれか",
            ],
        )
        .with_footer("JSONのみ出力してください。")
        .build()
}

/// Advisor prompt for a free-form question.
pub fn chat(request: &ChatRequest) -> String {
    let context = serde_json::to_string_pretty(&request.context).unwrap_or_default();
    let mut builder = PromptBuilder::new()
        .with_base("あなたは地方の小さな団体を支援するアドバイザーです。\nすでに90日プランや資金計画を作成済みです。\nユーザーの質問に対して、具体的で実行可能なアドバイスを日本語で答えてください。")
        .with_section("ユーザーの活動", &context);
    for (kind, excerpt) in &request.excerpts {
        builder = builder.with_section(&format!("作成済み：{}", kind.label()), excerpt);
    }
    builder
        .with_rules(
            "重要なルール：",
            &[
                "回答は200〜400文字以内に収めてください",
                "箇条書き3〜5項目程度で簡潔に",
                "長い説明文は不要。すぐ行動に移せる情報だけ",
                "生成済みのプランや文章を繰り返し出力しないでください",
                "質問に直接関係のある情報だけ答えてください",
            ],
        )
        .with_footer(&format!("ユーザーの質問: {}", request.message))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use catcher_types::{Artifacts, SlotKey};

    #[test]
    fn sections_ordered_by_priority() {
        let prompt = PromptBuilder::new()
            .with_footer("おわり")
            .with_rules("ルール:", &["短く"])
            .with_base("はじめ")
            .with_material("資料", "本文")
            .build();

        assert!(prompt.starts_with("はじめ"));
        assert!(prompt.ends_with("おわり"));
        let material = prompt.find("--- 資料 ---").unwrap();
        let rules = prompt.find("- 短く").unwrap();
        assert!(material < rules);
    }

    #[test]
    fn empty_section_skipped() {
        let prompt = PromptBuilder::new()
            .with_base("はじめ")
            .with_section("空", "  ")
            .build();
        assert_eq!(prompt, "はじめ");
    }

    #[test]
    fn summarize_text_is_truncated() {
        let long = "あ".repeat(PASTED_TEXT_LIMIT + 100);
        let prompt = summarize_text(&long);
        assert!(prompt.contains(&"あ".repeat(PASTED_TEXT_LIMIT)));
        assert!(!prompt.contains(&"あ".repeat(PASTED_TEXT_LIMIT + 1)));
        assert!(prompt.contains("（推測）"));
        assert!(prompt.ends_with(JSON_ONLY));
    }

    #[test]
    fn summarize_url_names_the_page() {
        let prompt = summarize_url("example.org", "（URLの取得に失敗しました: example.org）");
        assert!(prompt.contains("Webサイト（example.org）"));
        assert!(prompt.contains("--- ページ内容 ---\n（URLの取得に失敗しました: example.org）"));
    }

    #[test]
    fn update_summary_includes_current_record() {
        let current = ActivitySummary {
            location: "越前市".into(),
            ..Default::default()
        };
        let prompt = update_summary(&current, "場所は鯖江市です");
        assert!(prompt.contains("\"location\": \"越前市\""));
        assert!(prompt.contains("場所は鯖江市です"));
    }

    #[test]
    fn generate_embeds_slots() {
        let mut slots = SlotStore::new();
        slots.set(SlotKey::Topic, "money").unwrap();
        let prompt = generate(ArtifactKind::Plan, &slots);
        assert!(prompt.contains("90日プラン"));
        assert!(prompt.contains("\"topic\": \"money\""));
    }

    #[test]
    fn critique_excerpts_are_capped() {
        let request = CritiqueRequest {
            artifacts: Artifacts {
                profile: "紹".repeat(CRITIQUE_EXCERPT_LIMIT + 10),
                ..Default::default()
            },
            section_index: 0,
            section_title: "自治体向け".into(),
            section_text: "本文".into(),
        };
        let prompt = critique(&request);
        assert!(prompt.contains(&"紹".repeat(CRITIQUE_EXCERPT_LIMIT)));
        assert!(!prompt.contains(&"紹".repeat(CRITIQUE_EXCERPT_LIMIT + 1)));
        assert!(prompt.contains("【レビュー対象：自治体向け】"));
        assert!(!prompt.contains("【資金計画】"), "empty artifacts are skipped");
    }

    #[test]
    fn chat_ends_with_question() {
        let request = ChatRequest {
            message: "助成金はどこで探せますか".into(),
            context: serde_json::json!({"topic": "money"}),
            excerpts: vec![(ArtifactKind::Plan, "## 90日プラン".into())],
        };
        let prompt = chat(&request);
        assert!(prompt.ends_with("ユーザーの質問: 助成金はどこで探せますか"));
        assert!(prompt.contains("【作成済み：90日プラン】"));
    }
}
