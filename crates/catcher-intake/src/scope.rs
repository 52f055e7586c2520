//! Nested modal scopes.
//!
//! Loading, results and review surfaces stack on top of the conversation.
//! Only the innermost scope takes input; leaving it hands control back to
//! its parent.

use serde::Serialize;

use catcher_types::{CatcherError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Generation in flight.
    Loading,
    /// The four artifacts on screen.
    Results,
    /// A section review on top of the results.
    Review,
}

#[derive(Debug, Clone, Default)]
pub struct ModalStack {
    scopes: Vec<Scope>,
}

impl ModalStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, scope: Scope) {
        tracing::debug!(?scope, depth = self.scopes.len() + 1, "Scope entered");
        self.scopes.push(scope);
    }

    /// Leave `scope`, which must be the innermost one.
    pub fn exit(&mut self, scope: Scope) -> Result<()> {
        match self.scopes.last() {
            Some(top) if *top == scope => {
                self.scopes.pop();
                tracing::debug!(?scope, depth = self.scopes.len(), "Scope exited");
                Ok(())
            }
            top => Err(CatcherError::InvalidTransition {
                state: top.map_or("conversation".into(), |s| format!("{s:?}")),
                action: format!("exit {scope:?}"),
            }),
        }
    }

    pub fn top(&self) -> Option<Scope> {
        self.scopes.last().copied()
    }

    /// `true` when `scope` is the one taking input (`None` is the
    /// conversation itself).
    pub fn accepts(&self, scope: Option<Scope>) -> bool {
        self.top() == scope
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
