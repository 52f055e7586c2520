//! The fixed step script.
//!
//! Steps are immutable data: a prompt (static or computed from the slots),
//! choices, the slot a choice is written to, a skip predicate and an
//! optional post-selection hook. Only the session cursor moves.

use serde::Serialize;

use catcher_types::{SlotKey, SlotStore};

use crate::free_input::Purpose;
use crate::session::Session;
use crate::transcript::{Card, Content};

/// Choice value that switches the step to free text.
pub const OTHER: &str = "other";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub label: &'static str,
    pub value: &'static str,
    pub letter: char,
}

const fn choice(letter: char, label: &'static str, value: &'static str) -> Choice {
    Choice {
        label,
        value,
        letter,
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Prompt {
    None,
    Static(&'static str),
    Dynamic(fn(&SlotStore) -> Option<Content>),
}

/// What a post-selection hook asks the sequencer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Advance,
    /// The hook took over (opened free input); do not advance.
    Suspend,
}

pub type Hook = fn(&mut Session, &str) -> Directive;

#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub id: &'static str,
    pub prompt: Prompt,
    pub choices: &'static [Choice],
    pub slot: Option<SlotKey>,
    pub skip: Option<fn(&SlotStore) -> bool>,
    pub on_select: Option<Hook>,
    /// Shows the generate affordance instead of choices.
    pub generate: bool,
}

impl Step {
    const fn new(id: &'static str, prompt: Prompt, choices: &'static [Choice]) -> Self {
        Self {
            id,
            prompt,
            choices,
            slot: None,
            skip: None,
            on_select: None,
            generate: false,
        }
    }

    const fn slot(mut self, slot: SlotKey) -> Self {
        self.slot = Some(slot);
        self
    }

    const fn skip(mut self, predicate: fn(&SlotStore) -> bool) -> Self {
        self.skip = Some(predicate);
        self
    }

    const fn on_select(mut self, hook: Hook) -> Self {
        self.on_select = Some(hook);
        self
    }

    const fn generate(mut self) -> Self {
        self.generate = true;
        self
    }

    pub fn is_skipped(&self, slots: &SlotStore) -> bool {
        self.skip.is_some_and(|p| p(slots))
    }

    pub fn message(&self, slots: &SlotStore) -> Option<Content> {
        match self.prompt {
            Prompt::None => None,
            Prompt::Static(text) => Some(Content::text(text)),
            Prompt::Dynamic(build) => build(slots),
        }
    }

    pub fn offers_other(&self) -> bool {
        self.choices.iter().any(|c| c.value == OTHER)
    }

    pub fn choice(&self, value: &str) -> Option<&'static Choice> {
        self.choices.iter().find(|c| c.value == value)
    }
}

// ---------------------------------------------------------------------------
// Choice sets
// ---------------------------------------------------------------------------

const SOURCE_MODE: &[Choice] = &[
    choice('A', "🔗  活動のWebサイト・ブログのURLを入れる", "url"),
    choice('B', "📋  SNSプロフィール文をコピペする", "sns"),
    choice('C', "💬  どちらもない → 選択式で教える", "none"),
];

const SUMMARY_CONFIRM: &[Choice] = &[
    choice('A', "✅  だいたい合っている", "confirmed"),
    choice('B', "✏️  修正したいところがある", "edit"),
];

/// Offered again after a correction was applied.
pub const CORRECTION_CONFIRM: &[Choice] = &[
    choice('A', "✅  だいたい合っている", "confirmed"),
    choice('B', "✏️  もう一度修正する", "edit"),
];

/// Offered when a URL could not be summarized.
pub const URL_RETRY: &[Choice] = &[
    choice('A', "📋  SNSプロフィール文をコピペする", "sns"),
    choice('B', "💬  選択式で教える", "none"),
];

/// Offered when pasted text could not be summarized.
pub const TEXT_RETRY: &[Choice] = &[
    choice('A', "🔗  URLを入力する", "url"),
    choice('B', "💬  選択式で教える", "none"),
];

const ACTIVITY_TYPE: &[Choice] = &[
    choice('A', "👦  子ども・教育（居場所/学習支援）", "kodomo"),
    choice('B', "🏠  福祉・暮らし（高齢者/生活支援）", "ibasho"),
    choice('C', "🌱  地域活動（イベント/交流/その他）", "event"),
];

const ACTIVITY_PLACE: &[Choice] = &[
    choice('A', "🏢  対面（公民館・教育施設など）", "kominkan"),
    choice('B', "💻  オンライン中心", "online"),
    choice('C', "🔁  両方（オンライン＋対面）", "mixed"),
];

const ACTIVITY_FREQUENCY: &[Choice] = &[
    choice('A', "📅  週1回以上", "weekly"),
    choice('B', "🗓️  月1〜3回", "biweekly"),
    choice('C', "🌱  不定期・これから始める", "irregular"),
];

const ACTIVITY_CONFIRM: &[Choice] = &[choice('A', "✅  この内容で次へ進む", "ok")];

const TOPIC: &[Choice] = &[
    choice('A', "💰  お金のこと（活動費・資金）", "money"),
    choice('B', "🤝  人手のこと（一人で回してる）", "people"),
    choice('C', "☁️  この先続けられるか漠然と不安", "vague"),
];

const RISK_TYPE: &[Choice] = &[
    choice('A', "📅  今年度は大丈夫。でも来年が読めない", "next_year_uncertain"),
    choice('B', "⚠️  減額・打ち切りの話が出ている", "cut_risk"),
    choice('C', "💳  公的支援なしで自費でやっている", "self_funded"),
];

const DEADLINE_WINDOW: &[Choice] = &[
    choice('A', "⏰  1か月以内", "2-3w"),
    choice('B', "🗓️  1〜3か月", "1-2m"),
    choice('C', "❓  それ以上先 / まだ決まっていない", "3m+"),
];

const GAP_RANGE: &[Choice] = &[
    choice('A', "💴  月5万円くらいまで", "3万"),
    choice('B', "💰  月10万円以上", "10万"),
    choice('C', "❓  まだ分からない", "まだ分からない"),
];

const ALLIES: &[Choice] = &[
    choice('A', "😐  協力はあまりない", "none"),
    choice('B', "🎁  ちょこちょこ応援がある", "small_support"),
    choice('C', "🙋  頼みたい人はいるが巻き込めていない", "want_help"),
    choice('D', "✍️  その他（自由に書く）", OTHER),
];

const INTENT: &[Choice] = &[
    choice('A', "💪  続けたい", "continue"),
    choice('B', "🌿  無理しない範囲で", "continue_light"),
    choice('C', "🤝  引き継ぎも視野に", "handover"),
    choice('D', "✍️  その他（自由に書く）", OTHER),
];

const DESIRED_OUTPUT: &[Choice] = &[
    choice('A', "💰  お金の作り方（協賛・寄付）", "A"),
    choice('B', "🗣️  まわりへの頼み方・巻き込み方", "B"),
    choice('C', "📦  全部まとめて出してほしい", "C"),
];

// ---------------------------------------------------------------------------
// Predicates and hooks
// ---------------------------------------------------------------------------

fn without_summary(slots: &SlotStore) -> bool {
    slots.activity_summary().is_none()
}

fn not_manual(slots: &SlotStore) -> bool {
    !slots.is(SlotKey::SourceMode, "none")
}

fn on_source_mode(session: &mut Session, value: &str) -> Directive {
    match value {
        "url" => {
            session.open_free_input("URLを入力してください", Purpose::Url, None);
            Directive::Suspend
        }
        "sns" => {
            session.open_free_input(
                "プロフィール文をペーストしてください",
                Purpose::ProfileText,
                None,
            );
            Directive::Suspend
        }
        _ => {
            session.slots_mut().clear_activity_summary();
            Directive::Advance
        }
    }
}

fn on_summary_confirm(session: &mut Session, value: &str) -> Directive {
    if value == "edit" {
        session.open_free_input("修正点を教えてください", Purpose::Correction, None);
        Directive::Suspend
    } else {
        Directive::Advance
    }
}

// ---------------------------------------------------------------------------
// Dynamic messages
// ---------------------------------------------------------------------------

/// The activity summary as a card under `heading`.
pub fn summary_card(slots: &SlotStore, heading: &str) -> Option<Content> {
    let s = slots.activity_summary()?;
    Some(Content::Card(Card {
        heading: heading.to_string(),
        rows: vec![
            ("📌 活動".into(), s.activity.clone()),
            ("📍 場所".into(), s.location.clone()),
            ("📅 ペース".into(), s.schedule.clone()),
            ("👥 規模".into(), s.participants.clone()),
            ("🏠 運営".into(), s.operator.clone()),
            ("🕐 開始".into(), s.started.clone()),
            ("💰 お金".into(), s.funding.clone()),
        ],
    }))
}

fn summary_confirm_message(slots: &SlotStore) -> Option<Content> {
    let heading = if slots.is(SlotKey::SourceMode, "sns") {
        "プロフィールを読みました。こういう理解で合っていますか？"
    } else {
        "サイトを読みました。こういう理解で合っていますか？"
    };
    summary_card(slots, heading)
}

/// Display label for a stored slot value, falling back to the raw value.
fn label_for(slots: &SlotStore, key: SlotKey, labels: &[(&str, &'static str)]) -> String {
    match slots.get(key) {
        Some(value) => labels
            .iter()
            .find(|(v, _)| *v == value)
            .map(|(_, l)| l.to_string())
            .unwrap_or_else(|| value.to_string()),
        None => "未定".to_string(),
    }
}

fn manual_activity_message(slots: &SlotStore) -> Option<Content> {
    let kind = label_for(
        slots,
        SlotKey::ActivityType,
        &[
            ("kodomo", "子ども・教育（居場所/学習支援）"),
            ("ibasho", "福祉・暮らし（高齢者/生活支援）"),
            ("event", "地域活動（イベント/交流/その他）"),
            ("welfare", "福祉/生活支援"),
            ("other_local", "その他の地域活動"),
        ],
    );
    let place = label_for(
        slots,
        SlotKey::ActivityPlace,
        &[
            ("kominkan", "対面（公民館・教育施設など）"),
            ("school", "対面（公民館・教育施設など）"),
            ("online", "オンライン中心"),
            ("mixed", "両方（オンライン＋対面）"),
            ("other_place", "その他の場所"),
        ],
    );
    let frequency = label_for(
        slots,
        SlotKey::ActivityFrequency,
        &[
            ("weekly", "週1回以上"),
            ("biweekly", "月1〜3回"),
            ("monthly", "月1〜3回"),
            ("irregular", "不定期・これから始める"),
            ("starting", "不定期・これから始める"),
        ],
    );
    Some(Content::Card(Card {
        heading: "活動内容を確認しました。次に、いま気になっていることを聞かせてください。"
            .into(),
        rows: vec![
            ("📌 活動タイプ".into(), kind),
            ("📍 主な場所".into(), place),
            ("📅 開催頻度".into(), frequency),
        ],
    }))
}

fn risk_type_message(slots: &SlotStore) -> Option<Content> {
    let text = match slots.get(SlotKey::Topic) {
        Some("money") => "お金の不安、具体的に聞かせてください。\n今の状況に一番近いのはどれですか？",
        Some("people") => "人手の課題、大変ですよね。\nお金まわりの状況も聞かせてください。",
        Some("vague") => {
            "「漠然と不安」って、一番相談しにくいやつですよね。\n今の状況に一番近いのはどれですか？"
        }
        _ => "現在の状況に一番近いのはどれですか？",
    };
    Some(Content::text(text))
}

fn generate_message(slots: &SlotStore) -> Option<Content> {
    let topic = label_for(
        slots,
        SlotKey::Topic,
        &[
            ("money", "お金のこと"),
            ("people", "人手のこと"),
            ("vague", "漠然とした不安"),
        ],
    );
    let risk = label_for(
        slots,
        SlotKey::RiskType,
        &[
            ("next_year_uncertain", "来年度が未確定"),
            ("cut_risk", "減額・打ち切りリスク"),
            ("self_funded", "自費で運営"),
        ],
    );
    let schedule = label_for(
        slots,
        SlotKey::DeadlineWindow,
        &[
            ("2-3w", "1か月以内"),
            ("1-2m", "1か月以内"),
            ("3m+", "1〜3か月"),
            ("まだ決まっていない", "まだ決まっていない / それ以上先"),
        ],
    );
    let gap = label_for(
        slots,
        SlotKey::GapRange,
        &[
            ("3万", "月5万円くらいまで"),
            ("5万", "月5万円くらいまで"),
            ("10万", "月10万円以上"),
            ("15万+", "月10万円以上"),
            ("まだ分からない", "まだ分からない"),
        ],
    );
    let allies = label_for(
        slots,
        SlotKey::Allies,
        &[
            ("none", "具体的な協力なし"),
            ("small_support", "ちょこちょこ応援あり"),
            ("want_help", "協力者はいるが頼み方不明"),
        ],
    );
    Some(Content::Card(Card {
        heading: "ここまでの整理です 📋".into(),
        rows: vec![
            ("課題".into(), format!("{topic}（{risk}）")),
            ("スケジュール".into(), schedule),
            ("余裕資金の目安".into(), gap),
            ("味方".into(), allies),
            ("方向性".into(), "継続提案・資金複線化・体制づくり".into()),
        ],
    }))
}

// ---------------------------------------------------------------------------
// The script
// ---------------------------------------------------------------------------

pub static STEPS: [Step; 14] = [
    Step::new(
        "source_mode",
        Prompt::Static("こんにちは！😊\nまず、あなたの活動のことを少しだけ教えてください。\n私（AI）に伝えるのに、どの方法がやりやすいですか？"),
        SOURCE_MODE,
    )
    .slot(SlotKey::SourceMode)
    .on_select(on_source_mode),
    Step::new(
        "summary_confirm",
        Prompt::Dynamic(summary_confirm_message),
        SUMMARY_CONFIRM,
    )
    .skip(without_summary)
    .on_select(on_summary_confirm),
    Step::new(
        "activity_type",
        Prompt::Static("選択式で進める場合、最初に活動のことを教えてください。\nいちばん近いものはどれですか？"),
        ACTIVITY_TYPE,
    )
    .slot(SlotKey::ActivityType)
    .skip(not_manual),
    Step::new(
        "activity_place",
        Prompt::Static("活動場所はどこが近いですか？"),
        ACTIVITY_PLACE,
    )
    .slot(SlotKey::ActivityPlace)
    .skip(not_manual),
    Step::new(
        "activity_frequency",
        Prompt::Static("活動頻度はどれが近いですか？"),
        ACTIVITY_FREQUENCY,
    )
    .slot(SlotKey::ActivityFrequency)
    .skip(not_manual),
    Step::new(
        "activity_confirm",
        Prompt::Dynamic(manual_activity_message),
        ACTIVITY_CONFIRM,
    )
    .skip(not_manual),
    Step::new(
        "topic",
        Prompt::Static("ありがとうございます 🙏\n今日はどんなことが気になっていますか？"),
        TOPIC,
    )
    .slot(SlotKey::Topic),
    Step::new("risk_type", Prompt::Dynamic(risk_type_message), RISK_TYPE)
        .slot(SlotKey::RiskType),
    Step::new(
        "deadline_window",
        Prompt::Static("手続きや相談のスケジュールがあれば教えてください 📆\nざっくりでOKです"),
        DEADLINE_WINDOW,
    )
    .slot(SlotKey::DeadlineWindow),
    Step::new(
        "gap_range",
        Prompt::Static("これだけあったら活動にもう少し余裕が出るな、という金額感はどれに近いですか？\n仮置きでOKです 💡"),
        GAP_RANGE,
    )
    .slot(SlotKey::GapRange),
    Step::new(
        "allies",
        Prompt::Static("あなたの活動を応援してくれている人はいますか？ 🌱\n周りからのサポート状況で、次の打ち手が変わります。"),
        ALLIES,
    )
    .slot(SlotKey::Allies),
    Step::new(
        "intent",
        Prompt::Static("あと少しです！\nこの活動、これからどうしていきたいですか？"),
        INTENT,
    )
    .slot(SlotKey::Intent),
    Step::new(
        "desired_output",
        Prompt::Static("ありがとうございます ✨\nここまでの情報で、お渡しできるものがあります。\nまず一番ほしいのはどれですか？"),
        DESIRED_OUTPUT,
    )
    .slot(SlotKey::DesiredOutput),
    Step::new("summary_generate", Prompt::Dynamic(generate_message), &[]).generate(),
];

pub fn step_index(id: &str) -> Option<usize> {
    STEPS.iter().position(|s| s.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catcher_types::ActivitySummary;

    #[test]
    fn script_shape() {
        assert_eq!(STEPS.len(), 14);
        assert_eq!(STEPS[0].id, "source_mode");
        assert!(STEPS[13].generate);
        assert!(STEPS.iter().filter(|s| s.generate).count() == 1);
        let ids: std::collections::HashSet<_> = STEPS.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), STEPS.len());
    }

    #[test]
    fn every_choice_fits_its_slot() {
        for step in &STEPS {
            let Some(slot) = step.slot else { continue };
            for c in step.choices {
                assert!(
                    c.value == OTHER || slot.accepts(c.value),
                    "{} offers {} outside {}",
                    step.id,
                    c.value,
                    slot
                );
            }
        }
    }

    #[test]
    fn other_offered_on_allies_and_intent() {
        let with_other: Vec<_> = STEPS.iter().filter(|s| s.offers_other()).map(|s| s.id).collect();
        assert_eq!(with_other, vec!["allies", "intent"]);
    }

    #[test]
    fn manual_steps_skip_unless_none() {
        let mut slots = SlotStore::new();
        let manual = step_index("activity_type").unwrap();
        assert!(STEPS[manual].is_skipped(&slots));
        slots.set(SlotKey::SourceMode, "url").unwrap();
        assert!(STEPS[manual].is_skipped(&slots));
        slots.set(SlotKey::SourceMode, "none").unwrap();
        assert!(!STEPS[manual].is_skipped(&slots));
    }

    #[test]
    fn skip_evaluation_is_pure() {
        let mut slots = SlotStore::new();
        slots.set(SlotKey::SourceMode, "sns").unwrap();
        for step in &STEPS {
            assert_eq!(step.is_skipped(&slots), step.is_skipped(&slots), "{}", step.id);
        }
    }

    #[test]
    fn summary_confirm_depends_on_summary() {
        let mut slots = SlotStore::new();
        let confirm = &STEPS[step_index("summary_confirm").unwrap()];
        assert!(confirm.is_skipped(&slots));
        assert!(confirm.message(&slots).is_none());

        slots.set_activity_summary(ActivitySummary {
            location: "福井県越前市".into(),
            ..Default::default()
        });
        assert!(!confirm.is_skipped(&slots));
        let text = confirm.message(&slots).unwrap().to_plain();
        assert!(text.starts_with("サイトを読みました"));
        assert!(text.contains("📍 場所：福井県越前市"));
    }

    #[test]
    fn risk_prompt_follows_topic() {
        let step = &STEPS[step_index("risk_type").unwrap()];
        let mut slots = SlotStore::new();
        assert!(step.message(&slots).unwrap().to_plain().starts_with("現在の状況"));
        slots.set(SlotKey::Topic, "people").unwrap();
        assert!(step.message(&slots).unwrap().to_plain().starts_with("人手の課題"));
    }

    #[test]
    fn generate_card_uses_labels_and_free_text() {
        let mut slots = SlotStore::new();
        slots.set(SlotKey::Topic, "money").unwrap();
        slots.set(SlotKey::RiskType, "cut_risk").unwrap();
        slots.set_free_text(SlotKey::Allies, "町内会が少し");
        let text = STEPS[13].message(&slots).unwrap().to_plain();
        assert!(text.contains("課題：お金のこと（減額・打ち切りリスク）"));
        assert!(text.contains("味方：町内会が少し"));
        assert!(text.contains("スケジュール：未定"));
    }
}
