//! # Transition Table
//!
//! Per-entity-type mapping from a "from" status to its allowed targets,
//! each optionally carrying a description template and an async effect that
//! runs after a successful transition, inside the same transaction.
//!
//! Two modes, chosen by the table's shape at construction time:
//!
//! - **strict** (non-empty): transitions not listed are rejected, and a
//!   "from" status with no outgoing edges is terminal;
//! - **lenient** (empty): any transition is accepted.

use crate::entity::Auditable;
use crate::error::{EngineError, Result};
use crate::store::Session;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Async side effect invoked with the updated entity and the active session
/// after a successful transition. Runs before the outer transaction
/// commits, so a failing effect aborts the whole transition.
pub type TransitionEffect<E> =
    Arc<dyn Fn(E, Session) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// One allowed edge out of a status.
#[derive(Clone)]
pub struct Transition<E> {
    pub to: String,
    pub description: Option<String>,
    pub effect: Option<TransitionEffect<E>>,
}

impl<E> Transition<E> {
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            to: target.into(),
            description: None,
            effect: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_effect<F, Fut>(mut self, effect: F) -> Self
    where
        F: Fn(E, Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.effect = Some(Arc::new(move |entity, session| {
            Box::pin(effect(entity, session))
        }));
        self
    }
}

impl<E> fmt::Debug for Transition<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("to", &self.to)
            .field("description", &self.description)
            .field("has_effect", &self.effect.is_some())
            .finish()
    }
}

/// Validation mode, derived from the table's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmMode {
    /// Non-empty table: only listed transitions are allowed.
    Strict,
    /// Empty table: any transition is accepted.
    Lenient,
}

/// Immutable transition table for one entity type.
#[derive(Debug, Clone)]
pub struct TransitionTable<E> {
    transitions: HashMap<String, Vec<Transition<E>>>,
}

impl<E> Default for TransitionTable<E> {
    fn default() -> Self {
        Self {
            transitions: HashMap::new(),
        }
    }
}

impl<E: Auditable> TransitionTable<E> {
    /// Empty table: lenient mode.
    pub fn new() -> Self {
        Self {
            transitions: HashMap::new(),
        }
    }

    /// Add an allowed edge out of `from`.
    pub fn allow(mut self, from: impl Into<String>, transition: Transition<E>) -> Self {
        self.transitions
            .entry(from.into())
            .or_default()
            .push(transition);
        self
    }

    /// Declare a status terminal explicitly: listed, but with no outgoing
    /// edges.
    pub fn terminal(mut self, status: impl Into<String>) -> Self {
        self.transitions.entry(status.into()).or_default();
        self
    }

    pub fn mode(&self) -> FsmMode {
        if self.transitions.is_empty() {
            FsmMode::Lenient
        } else {
            FsmMode::Strict
        }
    }

    /// A status is terminal when strict mode gives it no outgoing edges.
    pub fn is_terminal(&self, status: &str) -> bool {
        self.mode() == FsmMode::Strict
            && self
                .transitions
                .get(status)
                .map_or(true, |edges| edges.is_empty())
    }

    pub fn targets(&self, from: &str) -> Vec<&str> {
        self.transitions
            .get(from)
            .map(|edges| edges.iter().map(|t| t.to.as_str()).collect())
            .unwrap_or_default()
    }

    /// Validate a proposed transition.
    ///
    /// Lenient mode returns `Ok(None)`. Strict mode returns the selected
    /// entry (which carries the effect to run), or rejects with
    /// `FinalStateTransition` when `from` has no outgoing edges and
    /// `InvalidTransition` when `to` is not among them.
    pub fn validate(&self, from: &str, to: &str) -> Result<Option<&Transition<E>>> {
        if self.mode() == FsmMode::Lenient {
            return Ok(None);
        }

        let edges = self.transitions.get(from).filter(|edges| !edges.is_empty());
        let Some(edges) = edges else {
            return Err(EngineError::FinalStateTransition {
                current: from.to_string(),
                requested: to.to_string(),
            });
        };

        edges
            .iter()
            .find(|transition| transition.to == to)
            .map(Some)
            .ok_or_else(|| EngineError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
    }
}
