//! Text-completion client used by the intake backend.
//!
//! Every call the wizard makes is a single prompt in, a single text out.
//! [`Completer`] is the seam to the hosted model, [`GeminiAdapter`] the one
//! real implementation, and [`LlmClient`] adds model selection, retry of
//! transient failures and request logging on top.

mod client;
mod completion;
mod gemini;
mod retry;

pub use client::{Completer, LlmClient, ServiceStatus};
pub use completion::{Completion, Finish, OutputFormat, Prompt, TokenUsage};
pub use gemini::{GeminiAdapter, DEFAULT_MODEL};
pub use retry::{Backoff, RetryPolicy};
