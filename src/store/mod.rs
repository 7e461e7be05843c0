//! # Document Store Ports
//!
//! The engine never talks to a database directly. It goes through the
//! [`EntityStore`] port, which provides session-scoped atomic reads and
//! writes, and the [`SessionHandle`] port, an opaque transaction handle
//! owned by whichever call frame created it. Nested calls receive the
//! handle without taking ownership; only the owner commits, aborts or ends
//! it.
//!
//! Adapters raise the structured errors of [`crate::error`]; numeric server
//! codes are classified once at the adapter boundary via
//! [`crate::error::EngineError::from_store`].

pub mod memory;

use crate::entity::{AuditEntry, Auditable, EntityId};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;

/// Opaque handle to one store session.
///
/// Lifetime: created at the start of a top-level operation, ended exactly
/// once (committed, aborted or discarded for a retry) by the owner only.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    async fn start_transaction(&self) -> Result<()>;
    async fn commit_transaction(&self) -> Result<()>;
    async fn abort_transaction(&self) -> Result<()>;
    async fn end_session(&self) -> Result<()>;

    /// Adapter-internal downcast hook.
    fn as_any(&self) -> &dyn Any;
}

/// Shared, cheaply clonable session reference passed down nested calls.
pub type Session = Arc<dyn SessionHandle>;

/// Anything that can open fresh sessions. The transaction coordinator only
/// needs this slice of the store.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn start_session(&self) -> Result<Session>;
}

/// Filter matching an entity id and, when supplied, an exact version.
///
/// A filtered write that matches nothing while a version was supplied means
/// a concurrent writer got there first.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedFilter {
    pub id: EntityId,
    pub version: Option<i64>,
}

/// The write shapes the engine issues against a single document. All parts
/// apply atomically or not at all.
#[derive(Debug, Clone, Default)]
pub struct EntityUpdate {
    /// Set the entity's status field.
    pub set_status: Option<String>,
    /// Append one entry to the audit trail.
    pub push_audit: Option<AuditEntry>,
    /// Advance the version counter by exactly 1.
    pub bump_version: bool,
    /// Raw top-level field merge (force-update escape hatch). Engine-managed
    /// fields (`version`, `audit_trail`) are never patched this way.
    pub patch: Option<Value>,
}

impl EntityUpdate {
    pub fn set_status(status: impl Into<String>) -> Self {
        Self {
            set_status: Some(status.into()),
            ..Self::default()
        }
    }

    pub fn patch(patch: Value) -> Self {
        Self {
            patch: Some(patch),
            ..Self::default()
        }
    }

    pub fn with_audit(mut self, entry: AuditEntry) -> Self {
        self.push_audit = Some(entry);
        self
    }
}

/// Session-scoped document operations for one entity type.
#[async_trait]
pub trait EntityStore<E: Auditable>: SessionFactory {
    /// Fetch a document by id, observing the session's uncommitted writes.
    async fn find_one(&self, id: EntityId, session: &Session) -> Result<Option<E>>;

    /// Insert a new document. Duplicate ids raise `Conflict`.
    async fn insert(&self, entity: &E, session: &Session) -> Result<E>;

    /// Atomically update the single document matching `filter`, returning
    /// the updated document, or `None` when nothing matched.
    async fn find_one_and_update(
        &self,
        filter: &VersionedFilter,
        update: &EntityUpdate,
        session: &Session,
    ) -> Result<Option<E>>;

    /// Remove a document, reporting whether it existed.
    async fn delete_one(&self, id: EntityId, session: &Session) -> Result<bool>;
}
