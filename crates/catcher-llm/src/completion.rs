use serde::{Deserialize, Serialize};

/// How the model is asked to shape its answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    /// A single JSON document and nothing else.
    Json,
}

/// One prompt for one answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub text: String,
    /// Sent as a separate system instruction when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn json(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: OutputFormat::Json,
            ..Self::default()
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Characters in the prompt body, for logging.
    pub fn len_chars(&self) -> usize {
        self.text.chars().count()
    }
}

/// Why the model stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finish {
    #[default]
    Stop,
    /// Hit the output token limit; the text is cut off.
    Truncated,
    /// Withheld by a safety or recitation filter.
    Blocked,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt + self.output
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub id: String,
    pub text: String,
    pub model: String,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default)]
    pub finish: Finish,
}

impl Completion {
    /// `true` when the model finished on its own.
    pub fn is_complete(&self) -> bool {
        self.finish == Finish::Stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_prompt_asks_for_json() {
        let prompt = Prompt::json("活動を要約してください")
            .with_instruction("あなたは地域活動の相談員です。")
            .with_temperature(0.4);
        assert_eq!(prompt.format, OutputFormat::Json);
        assert_eq!(prompt.temperature, Some(0.4));
        assert_eq!(prompt.len_chars(), 11);
        assert!(Prompt::text("x").instruction.is_none());
    }

    #[test]
    fn prompt_omits_unset_options_on_the_wire() {
        let json = serde_json::to_value(Prompt::text("やあ")).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "やあ", "format": "text" }));
    }

    #[test]
    fn usage_totals() {
        let usage = TokenUsage {
            prompt: 120,
            output: 30,
        };
        assert_eq!(usage.total(), 150);
        assert_eq!(TokenUsage::default().total(), 0);
    }

    #[test]
    fn truncated_completion_is_not_complete() {
        let completion = Completion {
            id: "c1".into(),
            text: "途中まで".into(),
            model: "gemini-2.5-flash".into(),
            usage: TokenUsage::default(),
            finish: Finish::Truncated,
        };
        assert!(!completion.is_complete());
        assert_eq!(
            serde_json::to_value(Finish::Blocked).unwrap(),
            serde_json::json!("blocked")
        );
    }
}
