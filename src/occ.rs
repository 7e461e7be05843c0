//! # Optimistic Locking Primitive
//!
//! Compare-and-swap on the entity's `version` counter. A guarded write
//! filters on the version read earlier and atomically advances it by 1, so
//! it either succeeds with no concurrent interference or matches nothing.
//! No locks, no blocking; the store's single-document atomicity does the
//! rest, which also makes the scheme safe across processes and replicas.

use crate::entity::{Auditable, EntityId};
use crate::error::{EngineError, Result};
use crate::store::{EntityUpdate, VersionedFilter};

/// Version to guard a write with. `skip_version_check` bypasses the guard;
/// reserved for system-level corrections.
pub fn extract_version<E: Auditable>(entity: &E, skip_version_check: bool) -> Option<i64> {
    if skip_version_check {
        None
    } else {
        Some(entity.version())
    }
}

/// Filter matching the id and, when a version is supplied, its exact value.
pub fn versioned_filter(id: EntityId, version: Option<i64>) -> VersionedFilter {
    VersionedFilter { id, version }
}

/// Fold the version bump into an update. A bump the caller already
/// requested is preserved either way.
pub fn versioned_update(mut update: EntityUpdate, version: Option<i64>) -> EntityUpdate {
    if version.is_some() {
        update.bump_version = true;
    }
    update
}

/// Interpret a guarded write's outcome. No match while a version was
/// supplied means a concurrent writer changed the document first: that is a
/// conflict. No match without a version means the document is absent, which
/// the caller surfaces as its own not-found condition.
pub fn assert_not_stale<T>(
    result: Option<T>,
    version: Option<i64>,
    type_name: &str,
) -> Result<Option<T>> {
    match (&result, version) {
        (None, Some(_)) => Err(EngineError::conflict(type_name)),
        _ => Ok(result),
    }
}

/// True when an empty write result is attributable to a version mismatch.
pub fn is_version_conflict<T>(result: &Option<T>, version: Option<i64>) -> bool {
    result.is_none() && version.is_some()
}
