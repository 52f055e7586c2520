//! Built-in placeholder content, used when no text-completion service is
//! configured and as the fallback when one fails.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use catcher_types::{
    ActivitySummary, ArtifactKind, Artifacts, Critique, Persona, Result, SlotStore, Sourced,
    Suggestion,
};

use crate::{ChatRequest, CritiqueRequest, IntakeBackend};

/// Placeholder backend. Every answer is tagged [`catcher_types::Provenance::Mock`].
#[derive(Debug, Default)]
pub struct MockBackend {
    chat_turn: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn summary() -> ActivitySummary {
    ActivitySummary {
        activity: "「よりみちベース」— 子どもの放課後の居場所".into(),
        location: "福井県越前市".into(),
        schedule: "週2回、公民館で開催".into(),
        participants: "来ている子は5〜8人".into(),
        operator: "ほぼ1人で運営".into(),
        started: "2024年開始、2年目".into(),
        funding: "今年度は市の単年度支援で収支はトントン".into(),
    }
}

pub fn artifacts() -> Artifacts {
    Artifacts {
        profile: include_str!("../placeholder/profile.md").to_string(),
        plan: include_str!("../placeholder/plan.md").to_string(),
        funding: include_str!("../placeholder/funding.md").to_string(),
        messages: include_str!("../placeholder/messages.md").to_string(),
    }
}

fn persona(name: &str, avatar: &str, role: &str, color: &str, comments: [&str; 2]) -> Persona {
    Persona {
        persona: name.into(),
        avatar: avatar.into(),
        role: role.into(),
        role_color: color.into(),
        comments: comments.iter().map(|c| c.to_string()).collect(),
    }
}

fn suggestion(
    id: &str,
    tab: ArtifactKind,
    reviewer_index: usize,
    reason: &str,
    before: &str,
    after: &str,
) -> Suggestion {
    Suggestion {
        id: Some(id.into()),
        tab,
        reviewer_index,
        reason: reason.into(),
        before: before.into(),
        after: after.into(),
    }
}

pub fn critique() -> Critique {
    Critique {
        reviews: vec![
            persona(
                "市の担当者",
                "👩‍💼",
                "行政予算の視点",
                "#5BA4A4",
                [
                    "実績の数字にもう少し具体性がほしい（延べ人数・前年度比など）",
                    "予算額の根拠を示すと社内で決定しやすい",
                ],
            ),
            persona(
                "地元企業の社長",
                "🏢",
                "企業経営の視点",
                "#D4A853",
                [
                    "社内報・HP掲載のメリットをもう少し具体的に（掲載事例など）",
                    "月額より年額表示の方が社内検討しやすい",
                ],
            ),
            persona(
                "地域の協力者",
                "🙋",
                "手伝う側の視点",
                "#7B9E6B",
                [
                    "「月1回でいい」と書いてあると参加のハードルが下がって助かる",
                    "具体的に何をするかがもう少しわかるといいかも（見守り？遊び相手？）",
                ],
            ),
        ],
        suggestions: vec![
            suggestion(
                "s1",
                ArtifactKind::Profile,
                0,
                "実績の具体性向上",
                "年間延べ約400名が利用する見込み",
                "年間延べ432名が利用（出席簿ベース）。前年度比120%の増加",
            ),
            suggestion(
                "s2",
                ArtifactKind::Plan,
                0,
                "時限の明確化",
                "市の担当課に電話して面談の日取りを決める",
                "市の担当課に電話して面談の日取りを決める（今週中に。3月の予算編成に間に合わせるため）",
            ),
            suggestion(
                "s3",
                ArtifactKind::Funding,
                1,
                "予算根拠の追加",
                "来年度も補助を受けるため、面談＋実績報告を行います",
                "来年度も補助を受けるため、面談＋実績報告を行います。申請書類の提出期限は例年1月末です",
            ),
            suggestion(
                "s4",
                ArtifactKind::Messages,
                1,
                "企業メリットの具体化",
                "社内報や会社HPで「地域の子ども支援」として紹介可能",
                "社内報に掲載可能（実績：年間432名の子どもを支援）。会社HPの「地域貢献」特集にも素材をお渡しします",
            ),
            suggestion(
                "s5",
                ArtifactKind::Plan,
                2,
                "ボランティアの役割明確化",
                "手伝ってくれる人を2人みつける",
                "手伝ってくれる人を2人みつける（見守り・宿題サポートなど、できることからでOK）",
            ),
        ],
    }
}

fn chat_reply(turn: usize, message: &str) -> String {
    if turn % 2 == 0 {
        format!(
            "いい質問ですね！\n\n「{message}」について、いくつかポイントをお伝えします：\n\n\
             1. **助成金情報の探し方** — CANPAN（https://fields.canpan.info/grant/）や自治体のHP「補助金・助成金」ページが定番です\n\
             2. **似た事例** — 全国の子ども食堂ネットワーク（むすびえ）に類似事例が多数あります\n\
             3. **専門家への相談** — 地域のNPOセンターや社会福祉協議会で無料相談ができます\n\n\
             他にも気になることがあれば聞いてください 💬"
        )
    } else {
        format!(
            "なるほど、「{message}」ですね。\n\n地方で活動される方によくある悩みです。\n\n\
             おすすめのアクション：\n\
             - **まずは地域のNPO支援センター**に相談（無料）\n\
             - **むすびえ**（子ども食堂ネットワーク）のサイトで事例検索\n\
             - **自治体の市民活動支援課**に問い合わせ\n\n\
             具体的に深掘りしたい点があれば教えてください！"
        )
    }
}

#[async_trait]
impl IntakeBackend for MockBackend {
    async fn summarize_url(&self, url: &str) -> Result<Sourced<ActivitySummary>> {
        tracing::debug!(url, "Placeholder summary for URL");
        Ok(Sourced::mock(summary()))
    }

    async fn summarize_text(&self, _text: &str) -> Result<Sourced<ActivitySummary>> {
        Ok(Sourced::mock(summary()))
    }

    async fn update_summary(
        &self,
        current: &ActivitySummary,
        _correction: &str,
    ) -> Result<Sourced<ActivitySummary>> {
        Ok(Sourced::mock(current.clone()))
    }

    async fn generate(&self, _slots: &SlotStore) -> Result<Sourced<Artifacts>> {
        Ok(Sourced::mock(artifacts()))
    }

    async fn critique(&self, request: &CritiqueRequest) -> Result<Sourced<Critique>> {
        tracing::debug!(section = request.section_index, "Placeholder critique");
        Ok(Sourced::mock(critique()))
    }

    async fn chat(&self, request: &ChatRequest) -> Result<Sourced<String>> {
        let turn = self.chat_turn.fetch_add(1, Ordering::Relaxed);
        Ok(Sourced::mock(chat_reply(turn, &request.message)))
    }
}
