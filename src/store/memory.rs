//! # In-Memory Store Adapter
//!
//! Reference implementation of the [`EntityStore`] port backed by a shared
//! map. Sessions buffer writes and record the committed version each touched
//! document had when first staged; commit re-validates those versions under
//! the store lock and fails with the transient write-conflict code when a
//! concurrent session committed first. That gives the same
//! conflict-then-retry behavior a replicated document store exhibits,
//! without a server, which is what the integration tests run against.

use crate::constants::store_error_code;
use crate::entity::{Auditable, EntityId};
use crate::error::{EngineError, Result, StoreError};
use crate::store::{EntityStore, EntityUpdate, Session, SessionFactory, SessionHandle, VersionedFilter};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type Committed<E> = Arc<RwLock<HashMap<EntityId, E>>>;

/// One buffered write: the document state this session wants (`None` for a
/// delete) and the committed version observed when the document was first
/// staged (`None` when it did not exist yet).
#[derive(Debug, Clone)]
struct Staged<E> {
    doc: Option<E>,
    base_version: Option<i64>,
}

#[derive(Debug)]
struct TxnState<E> {
    staged: HashMap<EntityId, Staged<E>>,
    active: bool,
}

impl<E> Default for TxnState<E> {
    fn default() -> Self {
        Self {
            staged: HashMap::new(),
            active: false,
        }
    }
}

/// Session over a [`MemoryStore`]. Writes stage locally until commit.
pub struct MemorySession<E: Auditable> {
    committed: Committed<E>,
    state: Mutex<TxnState<E>>,
}

#[async_trait]
impl<E: Auditable> SessionHandle for MemorySession<E> {
    async fn start_transaction(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.active {
            return Err(EngineError::internal("transaction already active on session"));
        }
        state.active = true;
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.active {
            return Err(EngineError::internal("commit without an active transaction"));
        }

        let mut committed = self.committed.write();

        // First-committer-wins: every staged document must still be at the
        // version this session observed.
        for (id, staged) in &state.staged {
            let current_version = committed.get(id).map(Auditable::version);
            if current_version != staged.base_version {
                return Err(EngineError::from_store(
                    StoreError::new(
                        store_error_code::WRITE_CONFLICT,
                        format!("write conflict on document {id}"),
                    ),
                    E::TYPE_NAME,
                ));
            }
        }

        for (id, staged) in state.staged.drain() {
            match staged.doc {
                Some(doc) => {
                    committed.insert(id, doc);
                }
                None => {
                    committed.remove(&id);
                }
            }
        }
        state.active = false;
        Ok(())
    }

    async fn abort_transaction(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.staged.clear();
        state.active = false;
        Ok(())
    }

    async fn end_session(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.staged.clear();
        state.active = false;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shared in-memory document store for one entity type.
#[derive(Clone)]
pub struct MemoryStore<E: Auditable> {
    committed: Committed<E>,
}

impl<E: Auditable> Default for MemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Auditable> MemoryStore<E> {
    pub fn new() -> Self {
        Self {
            committed: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Committed document count, for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.committed.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.read().is_empty()
    }

    fn session<'a>(&self, session: &'a Session) -> Result<&'a MemorySession<E>> {
        session
            .as_any()
            .downcast_ref::<MemorySession<E>>()
            .ok_or_else(|| EngineError::internal("session does not belong to this store"))
    }

    fn require_active(state: &TxnState<E>) -> Result<()> {
        if !state.active {
            return Err(EngineError::internal("writes require an active transaction"));
        }
        Ok(())
    }

    /// Current document as this session sees it: staged state shadows the
    /// committed map.
    fn resolve(&self, state: &TxnState<E>, id: EntityId) -> Option<E> {
        match state.staged.get(&id) {
            Some(staged) => staged.doc.clone(),
            None => self.committed.read().get(&id).cloned(),
        }
    }

    fn base_version(&self, state: &TxnState<E>, id: EntityId) -> Option<i64> {
        match state.staged.get(&id) {
            Some(staged) => staged.base_version,
            None => self.committed.read().get(&id).map(Auditable::version),
        }
    }
}

#[async_trait]
impl<E: Auditable> SessionFactory for MemoryStore<E> {
    async fn start_session(&self) -> Result<Session> {
        Ok(Arc::new(MemorySession::<E> {
            committed: Arc::clone(&self.committed),
            state: Mutex::new(TxnState::default()),
        }))
    }
}

#[async_trait]
impl<E: Auditable> EntityStore<E> for MemoryStore<E> {
    async fn find_one(&self, id: EntityId, session: &Session) -> Result<Option<E>> {
        let session = self.session(session)?;
        let state = session.state.lock();
        Ok(self.resolve(&state, id))
    }

    async fn insert(&self, entity: &E, session: &Session) -> Result<E> {
        let session = self.session(session)?;
        let mut state = session.state.lock();
        Self::require_active(&state)?;

        let id = entity.id();
        if self.resolve(&state, id).is_some() {
            return Err(EngineError::from_store(
                StoreError::new(
                    store_error_code::DUPLICATE_KEY,
                    format!("E11000 duplicate key: {id}"),
                ),
                E::TYPE_NAME,
            ));
        }

        let base_version = self.base_version(&state, id);
        state.staged.insert(
            id,
            Staged {
                doc: Some(entity.clone()),
                base_version,
            },
        );
        Ok(entity.clone())
    }

    async fn find_one_and_update(
        &self,
        filter: &VersionedFilter,
        update: &EntityUpdate,
        session: &Session,
    ) -> Result<Option<E>> {
        let session = self.session(session)?;
        let mut state = session.state.lock();
        Self::require_active(&state)?;

        let Some(current) = self.resolve(&state, filter.id) else {
            return Ok(None);
        };
        if let Some(version) = filter.version {
            if current.version() != version {
                return Ok(None);
            }
        }

        let next = apply_update(&current, update)?;
        let base_version = self.base_version(&state, filter.id);
        state.staged.insert(
            filter.id,
            Staged {
                doc: Some(next.clone()),
                base_version,
            },
        );
        Ok(Some(next))
    }

    async fn delete_one(&self, id: EntityId, session: &Session) -> Result<bool> {
        let session = self.session(session)?;
        let mut state = session.state.lock();
        Self::require_active(&state)?;

        let existed = self.resolve(&state, id).is_some();
        if existed {
            let base_version = self.base_version(&state, id);
            state.staged.insert(
                id,
                Staged {
                    doc: None,
                    base_version,
                },
            );
        }
        Ok(existed)
    }
}

/// Apply an [`EntityUpdate`] to a document copy. Raw patches merge into the
/// serialized form so arbitrary domain fields can change, while the
/// engine-managed fields stay under the engine's control.
fn apply_update<E: Auditable>(doc: &E, update: &EntityUpdate) -> Result<E> {
    let mut next = doc.clone();

    if let Some(patch) = &update.patch {
        let Value::Object(fields) = patch else {
            return Err(EngineError::validation("raw patch must be a JSON object"));
        };
        let mut value =
            serde_json::to_value(&next).map_err(|e| EngineError::internal(e.to_string()))?;
        let Value::Object(target) = &mut value else {
            return Err(EngineError::internal("entity does not serialize to an object"));
        };
        for (key, field) in fields {
            if key == "version" || key == "audit_trail" {
                continue;
            }
            target.insert(key.clone(), field.clone());
        }
        next = serde_json::from_value(value).map_err(|e| EngineError::from_store(
            StoreError::new(store_error_code::DOCUMENT_VALIDATION_FAILURE, e.to_string()),
            E::TYPE_NAME,
        ))?;
    }

    if let Some(status) = &update.set_status {
        next.set_status(status.clone());
    }
    if let Some(entry) = &update.push_audit {
        next.audit_trail_mut().push(entry.clone());
    }
    if update.bump_version {
        next.set_version(next.version() + 1);
    }
    Ok(next)
}
