//! Wizard tuning knobs.

use std::time::Duration;

use rand::Rng;

/// The simulated "thinking" pause before a scripted message appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingDelay {
    pub base: Duration,
    pub jitter: Duration,
}

impl ThinkingDelay {
    /// No pause at all (tests, scripted runs).
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// A pause in `base..=base + jitter`.
    pub fn sample(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.base;
        }
        self.base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

impl Default for ThinkingDelay {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(600),
            jitter: Duration::from_millis(400),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WizardConfig {
    pub thinking: ThinkingDelay,
    /// How long generation runs before a cancel affordance is offered.
    pub cancel_grace: Duration,
    /// Characters of each artifact sent along with a chat question.
    pub chat_excerpt_chars: usize,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            thinking: ThinkingDelay::default(),
            cancel_grace: Duration::from_secs(20),
            chat_excerpt_chars: 500,
        }
    }
}

impl WizardConfig {
    pub fn without_delay(mut self) -> Self {
        self.thinking = ThinkingDelay::none();
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }
}
