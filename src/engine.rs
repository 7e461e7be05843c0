//! # Entity Engine
//!
//! The caller-facing surface of the persistence layer: create entities with
//! their first audit entry, drive validated status transitions, and apply
//! system-level raw updates, all inside coordinator-managed transactions
//! with optimistic-lock protection on every write.
//!
//! One engine instance serves one entity type. Collaborators arrive as
//! plain interface values (store, transition table, configuration); there
//! is no runtime wiring beyond construction.

use crate::config::EngineConfig;
use crate::entity::{AuditEntry, Auditable, EntityId, StatusUpdate};
use crate::error::{EngineError, Result};
use crate::occ;
use crate::state_machine::TransitionTable;
use crate::store::{EntityStore, EntityUpdate, Session, SessionFactory};
use crate::transaction::TransactionCoordinator;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct EntityEngine<E: Auditable> {
    store: Arc<dyn EntityStore<E>>,
    coordinator: TransactionCoordinator,
    transitions: TransitionTable<E>,
    config: EngineConfig,
}

impl<E: Auditable> EntityEngine<E> {
    pub fn new<S>(store: Arc<S>, transitions: TransitionTable<E>) -> Self
    where
        S: EntityStore<E> + 'static,
    {
        Self::with_config(store, transitions, EngineConfig::default())
    }

    pub fn with_config<S>(store: Arc<S>, transitions: TransitionTable<E>, config: EngineConfig) -> Self
    where
        S: EntityStore<E> + 'static,
    {
        let sessions: Arc<dyn SessionFactory> = Arc::clone(&store) as Arc<dyn SessionFactory>;
        let coordinator = TransactionCoordinator::with_policy(
            sessions,
            config.transaction_retries,
            Duration::from_millis(config.retry_delay_ms),
        );
        Self {
            store,
            coordinator,
            transitions,
            config,
        }
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    pub fn transitions(&self) -> &TransitionTable<E> {
        &self.transitions
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch an entity, failing with `NotFound` when absent.
    pub async fn find_one(&self, id: EntityId, session: Option<Session>) -> Result<E> {
        self.coordinator
            .with_transaction(session, move |session| async move {
                self.store
                    .find_one(id, &session)
                    .await?
                    .ok_or_else(|| EngineError::not_found(E::TYPE_NAME))
            })
            .await
    }

    /// Create an entity together with its first audit entry, atomically.
    ///
    /// The caller supplies the record at version 0 with an empty trail and
    /// its initial status set; the engine inserts it and immediately runs a
    /// status update to that same initial status, so a newly created entity
    /// always has at least one audit entry and its `status` field is never
    /// out of sync with the trail's last entry.
    pub async fn create(&self, entity: E, actor: Option<&str>, session: Option<Session>) -> Result<E> {
        if entity.version() != 0 || !entity.audit_trail().is_empty() {
            return Err(EngineError::validation(
                "new entities must start at version 0 with an empty audit trail",
            ));
        }

        let actor = actor.map(str::to_owned);
        let entity = &entity;
        let actor = &actor;
        self.coordinator
            .with_transaction(session, move |session| async move {
                let created = self.store.insert(entity, &session).await?;
                let initial = StatusUpdate {
                    status: created.status().to_string(),
                    description: Some(format!("{} created", E::TYPE_NAME)),
                    user: actor.clone(),
                    ..StatusUpdate::default()
                };
                // Seeding the trail is not a transition; the table does not
                // apply to it.
                self.apply_status_update(created.id(), &initial, session, false)
                    .await
            })
            .await
    }

    /// Apply a validated status transition and append its audit entry.
    ///
    /// Runs inside a coordinator-managed transaction (or the supplied
    /// session). The version read during validation must still hold at
    /// write time, or the write surfaces a `Conflict`; the coordinator only
    /// retries storage-transient failures, never that, and never the FSM's
    /// own business rejections.
    pub async fn update_status(
        &self,
        id: EntityId,
        update: StatusUpdate,
        session: Option<Session>,
    ) -> Result<E> {
        let update = &update;
        self.coordinator
            .with_transaction(session, move |session| async move {
                self.apply_status_update(id, update, session, true).await
            })
            .await
    }

    async fn apply_status_update(
        &self,
        id: EntityId,
        update: &StatusUpdate,
        session: Session,
        enforce_table: bool,
    ) -> Result<E> {
        let current = self
            .store
            .find_one(id, &session)
            .await?
            .ok_or_else(|| EngineError::not_found(E::TYPE_NAME))?;

        // Strict tables reject unlisted transitions; an empty table accepts
        // anything. The selected entry carries the effect to run.
        let selected = if enforce_table {
            self.transitions.validate(current.status(), &update.status)?
        } else {
            None
        };
        let entry = AuditEntry::from_update(update, selected.and_then(|t| t.description.as_deref()));

        let version = occ::extract_version(&current, false);
        let filter = occ::versioned_filter(id, version);
        let write = occ::versioned_update(
            EntityUpdate::set_status(update.status.clone()).with_audit(entry),
            version,
        );

        let result = self.store.find_one_and_update(&filter, &write, &session).await?;
        let updated = occ::assert_not_stale(result, version, E::TYPE_NAME)?
            .ok_or_else(|| EngineError::not_found(E::TYPE_NAME))?;

        // Effect failures abort the whole transition: the status write
        // above only becomes durable when the owning transaction commits.
        if let Some(effect) = selected.and_then(|t| t.effect.as_ref()) {
            effect(updated.clone(), Arc::clone(&session)).await?;
        }

        debug!(
            entity = E::TYPE_NAME,
            id = %id,
            from = %current.status(),
            to = %updated.status(),
            version = updated.version(),
            "status transition applied"
        );
        Ok(updated)
    }

    /// Raw field update guarded by the optimistic lock, for system-level
    /// corrections. `skip_version_check` bypasses the guard; use sparingly.
    pub async fn force_update(
        &self,
        id: EntityId,
        patch: Value,
        session: Option<Session>,
        skip_version_check: bool,
    ) -> Result<E> {
        let patch = &patch;
        self.coordinator
            .with_transaction(session, move |session| async move {
                let current = self
                    .store
                    .find_one(id, &session)
                    .await?
                    .ok_or_else(|| EngineError::not_found(E::TYPE_NAME))?;

                let version = occ::extract_version(&current, skip_version_check);
                let filter = occ::versioned_filter(id, version);
                let write = occ::versioned_update(EntityUpdate::patch(patch.clone()), version);

                let result = self.store.find_one_and_update(&filter, &write, &session).await?;
                occ::assert_not_stale(result, version, E::TYPE_NAME)?
                    .ok_or_else(|| EngineError::not_found(E::TYPE_NAME))
            })
            .await
    }

    /// The most recent audit entry for an already-loaded entity.
    pub fn current_audit_state<'e>(&self, entity: &'e E) -> Option<&'e AuditEntry> {
        entity.current_audit_state()
    }
}
