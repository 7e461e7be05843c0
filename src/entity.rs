//! # Entity Model
//!
//! The persistence surface shared by every auditable entity type: a unique
//! identifier, a monotonically increasing version counter used for
//! optimistic concurrency control, a `status` drawn from the type's state
//! set, and an append-only audit trail whose insertion order is the
//! chronological order of committed transitions.
//!
//! ## Invariants
//!
//! - `version` starts at 0 and advances by exactly 1 on every successful
//!   write that passes through the optimistic locking primitive.
//! - `status` always equals the status of the last [`AuditEntry`] once any
//!   transition has occurred.
//! - Audit entries are immutable once appended; they are never edited or
//!   removed.

use crate::constants::INITIAL_AUDIT_STEP;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a persisted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// One historical record in an entity's audit trail.
///
/// `step` and `iterations` are workflow-progress counters used by the FSM
/// job driver to detect stuck processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub status: String,
    pub step: String,
    pub iterations: u32,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied payload for a status transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub status: String,
    pub description: Option<String>,
    pub metadata: Option<Value>,
    pub user: Option<String>,
    pub step: Option<String>,
    pub iterations: Option<u32>,
}

impl StatusUpdate {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_progress(mut self, step: impl Into<String>, iterations: u32) -> Self {
        self.step = Some(step.into());
        self.iterations = Some(iterations);
        self
    }
}

impl AuditEntry {
    /// Build the immutable trail entry for a transition. Description
    /// precedence: caller's dto, then the transition table's template, then
    /// a generic fallback.
    pub(crate) fn from_update(update: &StatusUpdate, template: Option<&str>) -> Self {
        let description = update
            .description
            .clone()
            .or_else(|| template.map(str::to_owned))
            .unwrap_or_else(|| format!("Status changed to {}", update.status));

        Self {
            status: update.status.clone(),
            step: update
                .step
                .clone()
                .unwrap_or_else(|| INITIAL_AUDIT_STEP.to_string()),
            iterations: update.iterations.unwrap_or(0),
            description,
            metadata: update.metadata.clone(),
            user: update.user.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Accessor surface the engine requires from a domain entity.
///
/// Implementors expose the engine-managed fields; everything else on the
/// struct is arbitrary domain data the engine round-trips untouched. The
/// serialized form is expected to carry the managed fields under the names
/// `version`, `status` and `audit_trail` (relevant to raw-patch updates,
/// which refuse to touch engine-managed fields).
pub trait Auditable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Human-readable type name used in error identifiers and logs.
    const TYPE_NAME: &'static str;

    fn id(&self) -> EntityId;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
    fn status(&self) -> &str;
    fn set_status(&mut self, status: String);
    fn audit_trail(&self) -> &[AuditEntry];
    fn audit_trail_mut(&mut self) -> &mut Vec<AuditEntry>;

    /// The most recent audit entry, if any transition has been recorded.
    fn current_audit_state(&self) -> Option<&AuditEntry> {
        self.audit_trail().last()
    }
}
