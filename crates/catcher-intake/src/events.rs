//! Funnel events of a wizard session.
//!
//! The wizard reports milestones (start, answers, generation, review) on a
//! [`tokio::sync::broadcast`] channel. Analytics or a log sink subscribe;
//! nobody has to. The tag names are the ones the KPI report counts.

use serde::{Deserialize, Serialize};

/// Events emitted during a wizard session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted,
    StepAnswered {
        step_id: String,
        value: String,
    },
    GenerationStarted,
    GenerationSucceeded {
        /// `gemini`, `mock` or `mock-fallback`.
        source: String,
    },
    GenerationFailed {
        /// `cancelled`, `api_error` or `network_error`.
        reason: String,
    },
    ResultsReopened,
    ExpertReviewStarted {
        section: usize,
    },
    ExpertReviewFailed {
        error: String,
    },
    ExpertReviewCompleted {
        accepted: usize,
        rejected: usize,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted => "session_started",
            SessionEvent::StepAnswered { .. } => "step_answered",
            SessionEvent::GenerationStarted => "generation_started",
            SessionEvent::GenerationSucceeded { .. } => "generation_succeeded",
            SessionEvent::GenerationFailed { .. } => "generation_failed",
            SessionEvent::ResultsReopened => "results_reopened",
            SessionEvent::ExpertReviewStarted { .. } => "expert_review_started",
            SessionEvent::ExpertReviewFailed { .. } => "expert_review_failed",
            SessionEvent::ExpertReviewCompleted { .. } => "expert_review_completed",
        }
    }
}

#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<SessionEvent>,
}

impl EventEmitter {
    /// `capacity` events are buffered per slow subscriber before it lags.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Dropped when nobody is listening.
    pub fn emit(&self, event: SessionEvent) {
        tracing::debug!(event = event.name(), "Session event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_sees_answered_step() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(SessionEvent::StepAnswered {
            step_id: "topic".into(),
            value: "money".into(),
        });

        match rx.recv().await.unwrap() {
            SessionEvent::StepAnswered { step_id, value } => {
                assert_eq!(step_id, "topic");
                assert_eq!(value, "money");
            }
            other => panic!("got {other:?}"),
        }
    }

    #[tokio::test]
    async fn every_subscriber_sees_each_event() {
        let emitter = EventEmitter::new(16);
        let mut rx1 = emitter.subscribe();
        let mut rx2 = emitter.subscribe();

        emitter.emit(SessionEvent::ResultsReopened);

        assert_eq!(rx1.recv().await.unwrap(), SessionEvent::ResultsReopened);
        assert_eq!(rx2.recv().await.unwrap(), SessionEvent::ResultsReopened);
    }

    #[test]
    fn unobserved_events_are_dropped() {
        let emitter = EventEmitter::new(16);
        emitter.emit(SessionEvent::GenerationFailed {
            reason: "network_error".into(),
        });
    }

    #[test]
    fn serialized_tag_matches_event_name() {
        let event = SessionEvent::GenerationSucceeded {
            source: "mock-fallback".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["source"], "mock-fallback");

        let json = serde_json::to_value(SessionEvent::SessionStarted).unwrap();
        assert_eq!(json["event"], "session_started");
    }
}
