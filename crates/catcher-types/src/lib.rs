//! Shared types, errors, slot store, and artifact set for the intake wizard.
//!
//! This crate provides the foundational types used across all other catcher crates:
//! - `CatcherError`: unified error taxonomy
//! - `SlotStore`: the facts collected by the wizard
//! - `Artifacts`: the four generated markdown documents
//! - `Critique`: reviewer personas and suggested edits
//! - `Sourced`: a service result tagged with its provenance

pub mod artifacts;
pub mod critique;
pub mod slots;

pub use artifacts::{ArtifactBundle, ArtifactKind, Artifacts};
pub use critique::{Critique, Persona, Suggestion};
pub use slots::{ActivitySummary, SlotKey, SlotStore};

use serde::{Deserialize, Serialize};

/// Unified error type for all catcher subsystems.
#[derive(Debug, thiserror::Error)]
pub enum CatcherError {
    // === LLM Provider Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout { provider: String, timeout_ms: u64 },

    // === Service Errors ===
    #[error("{operation} failed upstream: {message}")]
    Upstream { operation: String, message: String },

    #[error("{operation} could not reach the service: {message}")]
    Transport { operation: String, message: String },

    #[error("Request cancelled by the user")]
    Cancelled,

    // === Conversation Errors ===
    #[error("Value '{value}' is not allowed for slot '{slot}'")]
    InvalidSlotValue { slot: String, value: String },

    #[error("No active step at the cursor")]
    NoActiveStep,

    #[error("Choice '{value}' is not offered at step '{step}'")]
    InvalidChoice { step: String, value: String },

    // === Review Errors ===
    #[error("Cannot {action} while review is {state}")]
    InvalidTransition { state: String, action: String },

    #[error("No artifacts have been generated yet")]
    ArtifactsMissing,

    #[error("Section {0} does not exist")]
    SectionNotFound(usize),

    // === Generic ===
    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl CatcherError {
    /// Returns `true` if the service could not be reached at all, as opposed
    /// to answering with a failure.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CatcherError::Transport { .. }
                | CatcherError::RequestTimeout { .. }
                | CatcherError::ProviderError { status: 0, .. }
        )
    }

    /// Returns `true` for a user-initiated abort.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CatcherError::Cancelled)
    }

    /// Returns `true` if the error is transient and a user re-trigger may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatcherError::RateLimited { .. }
                | CatcherError::RequestTimeout { .. }
                | CatcherError::Transport { .. }
                | CatcherError::ProviderError {
                    retryable: true,
                    ..
                }
        )
    }

    /// Build an upstream failure for `operation`.
    pub fn upstream(operation: impl Into<String>, message: impl Into<String>) -> Self {
        CatcherError::Upstream {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Build a transport failure for `operation`.
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        CatcherError::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// A convenience alias for `Result<T, CatcherError>`.
pub type Result<T> = std::result::Result<T, CatcherError>;

// ---------------------------------------------------------------------------
// Provenance: where a service result came from
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// A genuine answer from the text-completion service.
    #[serde(rename = "gemini")]
    Upstream,
    /// Built-in placeholder content (no service configured).
    Mock,
    /// Placeholder content substituted after an upstream failure.
    MockFallback,
}

impl Provenance {
    /// Placeholder results are surfaced to the user as a non-fatal notice.
    pub fn is_placeholder(self) -> bool {
        !matches!(self, Provenance::Upstream)
    }

    /// `true` when the result replaced a failed upstream call.
    pub fn is_degraded(self) -> bool {
        matches!(self, Provenance::MockFallback)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Upstream => "gemini",
            Provenance::Mock => "mock",
            Provenance::MockFallback => "mock-fallback",
        }
    }
}

/// A service result tagged with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sourced<T> {
    pub value: T,
    pub provenance: Provenance,
}

impl<T> Sourced<T> {
    pub fn upstream(value: T) -> Self {
        Self {
            value,
            provenance: Provenance::Upstream,
        }
    }

    pub fn mock(value: T) -> Self {
        Self {
            value,
            provenance: Provenance::Mock,
        }
    }

    pub fn fallback(value: T) -> Self {
        Self {
            value,
            provenance: Provenance::MockFallback,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced {
            value: f(self.value),
            provenance: self.provenance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_provider_error() {
        let err = CatcherError::ProviderError {
            provider: "google".into(),
            status: 500,
            message: "internal server error".into(),
            retryable: true,
        };
        assert_eq!(
            err.to_string(),
            "Provider google returned HTTP 500: internal server error"
        );
    }

    #[test]
    fn error_display_upstream() {
        let err = CatcherError::upstream("summarize-url", "bad json");
        assert_eq!(err.to_string(), "summarize-url failed upstream: bad json");
    }

    #[test]
    fn error_display_invalid_slot_value() {
        let err = CatcherError::InvalidSlotValue {
            slot: "topic".into(),
            value: "weather".into(),
        };
        assert_eq!(
            err.to_string(),
            "Value 'weather' is not allowed for slot 'topic'"
        );
    }

    #[test]
    fn error_display_invalid_transition() {
        let err = CatcherError::InvalidTransition {
            state: "idle".into(),
            action: "accept".into(),
        };
        assert_eq!(err.to_string(), "Cannot accept while review is idle");
    }

    // --- classification ---

    #[test]
    fn transport_covers_unreachable_provider() {
        let err = CatcherError::ProviderError {
            provider: "google".into(),
            status: 0,
            message: "connection refused".into(),
            retryable: true,
        };
        assert!(err.is_transport());
        assert!(CatcherError::transport("generate", "dns").is_transport());
        assert!(!CatcherError::upstream("generate", "502").is_transport());
    }

    #[test]
    fn cancelled_is_not_transport() {
        let err = CatcherError::Cancelled;
        assert!(err.is_cancelled());
        assert!(!err.is_transport());
        assert!(!err.is_retryable());
    }

    #[test]
    fn retryable_rate_limited() {
        let err = CatcherError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 1000,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn not_retryable_auth_error() {
        let err = CatcherError::AuthError {
            provider: "x".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: CatcherError = json_err.into();
        assert!(matches!(err, CatcherError::Json(_)));
    }

    // --- Provenance ---

    #[test]
    fn provenance_wire_names() {
        assert_eq!(
            serde_json::to_string(&Provenance::Upstream).unwrap(),
            "\"gemini\""
        );
        assert_eq!(serde_json::to_string(&Provenance::Mock).unwrap(), "\"mock\"");
        assert_eq!(
            serde_json::to_string(&Provenance::MockFallback).unwrap(),
            "\"mock-fallback\""
        );
        assert_eq!(Provenance::MockFallback.as_str(), "mock-fallback");
    }

    #[test]
    fn placeholder_provenance_flags() {
        assert!(!Provenance::Upstream.is_placeholder());
        assert!(Provenance::Mock.is_placeholder());
        assert!(Provenance::MockFallback.is_placeholder());
        assert!(Provenance::MockFallback.is_degraded());
        assert!(!Provenance::Mock.is_degraded());
    }

    #[test]
    fn sourced_map_keeps_provenance() {
        let s = Sourced::fallback(21).map(|n| n * 2);
        assert_eq!(s.value, 42);
        assert_eq!(s.provenance, Provenance::MockFallback);
    }
}
