//! Step sequencing and backtracking.
//!
//! [`Session`] owns the cursor, the slots, the transcript and the free-input
//! state. It is synchronous and never touches a view: every visible effect
//! is queued as a [`RenderCommand`] and drained by the caller.

use catcher_types::{CatcherError, Result, SlotKey, SlotStore};

use crate::free_input::{FreeInput, Purpose, Submission};
use crate::render::RenderCommand;
use crate::script::{Choice, Directive, Step, OTHER, STEPS};
use crate::transcript::{Actor, Content, EntryId, Transcript};

/// Placeholder for "other" answers.
const OTHER_PLACEHOLDER: &str = "自由に入力してください…";
const OTHER_ACK: &str = "ありがとう、受け取りました 👍";

#[derive(Debug, Default)]
pub struct Session {
    /// `None` before the first step has been shown.
    cursor: Option<usize>,
    slots: SlotStore,
    transcript: Transcript,
    free_input: FreeInput,
    /// Choices currently on screen.
    offered: &'static [Choice],
    outbox: Vec<RenderCommand>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current_step(&self) -> Option<&'static Step> {
        self.cursor.and_then(|c| STEPS.get(c))
    }

    pub fn slots(&self) -> &SlotStore {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut SlotStore {
        &mut self.slots
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn free_input(&self) -> &FreeInput {
        &self.free_input
    }

    pub fn offered(&self) -> &'static [Choice] {
        self.offered
    }

    /// `true` once the cursor rests on the generation step.
    pub fn at_generation(&self) -> bool {
        self.current_step().is_some_and(|s| s.generate)
    }

    pub fn is_skipped(&self, index: usize) -> bool {
        let skipped = STEPS.get(index).is_some_and(|s| s.is_skipped(&self.slots));
        if skipped {
            tracing::debug!(step = STEPS[index].id, "Step skipped");
        }
        skipped
    }

    /// `(done, total)` counted over the steps that are currently not skipped.
    pub fn progress(&self) -> (usize, usize) {
        let visible: Vec<usize> = (0..STEPS.len()).filter(|&i| !self.is_skipped(i)).collect();
        let done = match self.cursor {
            Some(cursor) => visible.iter().filter(|&&i| i <= cursor).count(),
            None => 0,
        };
        (done, visible.len())
    }

    // -----------------------------------------------------------------------
    // Sequencing
    // -----------------------------------------------------------------------

    /// Move to the next step that is not skipped and show it. A no-op once
    /// the script is exhausted.
    pub fn advance(&mut self) {
        let mut next = self.cursor.map_or(0, |c| c + 1);
        while next < STEPS.len() && self.is_skipped(next) {
            next += 1;
        }
        let Some(step) = STEPS.get(next) else {
            tracing::debug!("Script exhausted");
            return;
        };

        self.cursor = Some(next);
        tracing::info!(step = step.id, index = next, "Step shown");
        let (done, total) = self.progress();
        self.outbox.push(RenderCommand::Progress { done, total });

        if let Some(content) = step.message(&self.slots) {
            self.outbox.push(RenderCommand::Typing);
            self.system(content);
        }
        if step.generate {
            self.offered = &[];
            self.outbox.push(RenderCommand::GenerateButton);
        } else if !step.choices.is_empty() {
            self.show_choices(step.choices);
        }
    }

    /// Answer the current step with one of the offered choices.
    pub fn select_choice(&mut self, value: &str) -> Result<Directive> {
        let step = self.current_step().ok_or(CatcherError::NoActiveStep)?;
        let choice = self
            .offered
            .iter()
            .find(|c| c.value == value)
            .copied()
            .ok_or_else(|| CatcherError::InvalidChoice {
                step: step.id.to_string(),
                value: value.to_string(),
            })?;

        self.clear_choices();
        self.user(Content::text(choice.label));

        if choice.value == OTHER {
            if let Some(slot) = step.slot {
                self.open_free_input(OTHER_PLACEHOLDER, Purpose::Other { slot }, None);
                return Ok(Directive::Suspend);
            }
        }
        if let Some(slot) = step.slot {
            self.slots.set(slot, choice.value)?;
        }

        let directive = match step.on_select {
            Some(hook) => hook(self, choice.value),
            None => Directive::Advance,
        };
        tracing::info!(step = step.id, value = choice.value, ?directive, "Choice selected");
        if directive == Directive::Advance {
            self.advance();
        }
        Ok(directive)
    }

    /// Rewind to the closest earlier step that is not skipped, forget every
    /// answer from there on and ask it again. Returns `false` before the
    /// first step.
    pub fn go_to_previous_step(&mut self) -> bool {
        let Some(cursor) = self.cursor else {
            return false;
        };
        let mut target = cursor.saturating_sub(1);
        while target > 0 && self.is_skipped(target) {
            target -= 1;
        }

        for step in &STEPS[target..] {
            if let Some(slot) = step.slot {
                self.slots.clear(slot);
            }
        }
        // The source step produced the summary.
        if target == 0 {
            self.slots.clear_activity_summary();
        }

        self.transcript.truncate_from(target);
        self.outbox.push(RenderCommand::TruncateFrom(target));
        self.leave_chat();
        self.close_free_input();
        self.clear_choices();

        tracing::info!(from = cursor, to = target, "Backtracking");
        self.cursor = target.checked_sub(1);
        self.advance();
        true
    }

    // -----------------------------------------------------------------------
    // Free input
    // -----------------------------------------------------------------------

    /// Replace the choices with a text field. Without an explicit fallback
    /// the current step's own choices are restored on cancel.
    pub fn open_free_input(
        &mut self,
        placeholder: &'static str,
        purpose: Purpose,
        fallback: Option<&'static [Choice]>,
    ) {
        let fallback = fallback.or_else(|| self.current_step().map(|s| s.choices));
        self.clear_choices();
        self.free_input.open(placeholder, purpose, fallback);
        self.outbox.push(RenderCommand::FreeInput {
            placeholder,
            cancellable: self.free_input.is_cancellable(),
        });
    }

    pub fn close_free_input(&mut self) {
        if self.free_input.is_open() && !self.free_input.in_chat_mode() {
            self.free_input.close();
            self.outbox.push(RenderCommand::HideFreeInput);
        }
    }

    /// Route submitted text. A back request is handled here.
    pub fn submit_text(&mut self, text: &str) -> Submission {
        let submission = self.free_input.submit(text);
        match &submission {
            Submission::Back => {
                self.go_to_previous_step();
            }
            Submission::Deliver { .. } => self.outbox.push(RenderCommand::HideFreeInput),
            Submission::Ignored | Submission::Chat(_) => {}
        }
        submission
    }

    /// Close the text field and bring back the choices it replaced. Leaves
    /// slots and transcript alone.
    pub fn cancel_free_input(&mut self) -> bool {
        if !self.free_input.is_cancellable() {
            return false;
        }
        let fallback = self.free_input.cancel();
        self.outbox.push(RenderCommand::HideFreeInput);
        if let Some(choices) = fallback {
            self.show_choices(choices);
        }
        true
    }

    /// Store an "other" answer and move on.
    pub fn complete_other(&mut self, slot: SlotKey, text: &str) {
        self.slots.set_free_text(slot, text);
        self.system(Content::text(OTHER_ACK));
        self.advance();
    }

    /// Close the chat field; the rewound step takes input again.
    fn leave_chat(&mut self) {
        if self.free_input.in_chat_mode() {
            self.free_input.leave_chat();
            self.outbox.push(RenderCommand::HideFreeInput);
        }
    }

    pub fn enter_chat(&mut self, placeholder: &'static str) {
        self.clear_choices();
        self.free_input.enter_chat();
        self.outbox.push(RenderCommand::FreeInput {
            placeholder,
            cancellable: false,
        });
    }

    // -----------------------------------------------------------------------
    // Transcript and surface
    // -----------------------------------------------------------------------

    pub fn system(&mut self, content: Content) -> EntryId {
        self.push(Actor::System, content)
    }

    pub fn user(&mut self, content: Content) -> EntryId {
        self.push(Actor::User, content)
    }

    fn push(&mut self, actor: Actor, content: Content) -> EntryId {
        let step = self.cursor.unwrap_or(0);
        let entry = self.transcript.push(step, actor, content).clone();
        let id = entry.id;
        self.outbox.push(RenderCommand::Append(entry));
        id
    }

    /// Remove a transient entry such as a loading message.
    pub fn remove_entry(&mut self, id: EntryId) {
        if self.transcript.remove(id) {
            self.outbox.push(RenderCommand::Remove(id));
        }
    }

    pub fn show_choices(&mut self, choices: &'static [Choice]) {
        self.offered = choices;
        self.outbox.push(RenderCommand::Choices {
            choices: choices.to_vec(),
            can_go_back: self.cursor.is_some_and(|c| c > 0),
        });
    }

    pub fn clear_choices(&mut self) {
        if !self.offered.is_empty() {
            self.offered = &[];
            self.outbox.push(RenderCommand::ClearChoices);
        }
    }

    pub fn emit(&mut self, command: RenderCommand) {
        self.outbox.push(command);
    }

    /// Take every queued command.
    pub fn drain(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.outbox)
    }
}
