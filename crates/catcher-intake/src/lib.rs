//! Conversation engine for the intake wizard.
//!
//! A fixed script of steps collects facts about a community activity into a
//! slot store. [`Session`] moves the cursor, handles free-text interception
//! and backtracking, and records a transcript. [`Wizard`] drives a session
//! against an [`catcher_backend::IntakeBackend`]: summarization, artifact
//! generation with cooperative cancel, the results surface, expert review
//! and free chat. Everything visible goes out as [`RenderCommand`]s.

pub mod config;
pub mod events;
pub mod free_input;
pub mod render;
pub mod scope;
pub mod script;
pub mod session;
pub mod transcript;
pub mod wizard;

pub use config::{ThinkingDelay, WizardConfig};
pub use events::{EventEmitter, SessionEvent};
pub use free_input::{FreeInput, Purpose, Submission};
pub use render::{ArtifactView, RecordingRenderer, RenderCommand, Renderer, ResultAction};
pub use scope::{ModalStack, Scope};
pub use script::{Choice, Directive, Prompt, Step, STEPS};
pub use session::Session;
pub use transcript::{Actor, Card, Content, Entry, EntryId, Transcript};
pub use wizard::{AbortHandle, GenerationOutcome, Wizard};
