//! # FSM Job Driver
//!
//! Background worker logic that advances one entity through a long-running
//! workflow, one job dispatch at a time: load the entity, check whether it
//! is still processable, run the domain handler, feed the resulting status
//! through the engine, then decide between rescheduling with staggered
//! exponential backoff and stopping (terminal outcome or retry budget
//! exhausted).
//!
//! The driver is re-entrant-safe. Duplicate-job suppression is the queue's
//! guarantee; a late dispatch that lands after the entity reached a
//! terminal state is a safe no-op here (no writes, no reschedule).

use crate::config::EngineConfig;
use crate::constants::JOB_BACKOFF_STAGGER_WINDOW;
use crate::engine::EntityEngine;
use crate::entity::{Auditable, EntityId, StatusUpdate};
use crate::error::{EngineError, Result};
use crate::queue::JobQueue;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Where an entity stands in its workflow, as judged by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Not yet picked up; processable and worth requeueing.
    Initial,
    /// Mid-workflow; processable and worth requeueing.
    Processing,
    /// Processable one more time, but not requeued afterwards.
    Stuck,
    /// Terminal; dispatches are no-ops.
    Final,
}

/// What a handler wants done after examining an entity.
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    /// Status transition to apply through the engine.
    pub status_update: StatusUpdate,
    /// Override for the backoff base delay, in milliseconds.
    pub base_delay_ms: Option<u64>,
}

impl HandlerOutcome {
    pub fn transition(status_update: StatusUpdate) -> Self {
        Self {
            status_update,
            base_delay_ms: None,
        }
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = Some(base_delay_ms);
        self
    }
}

/// Domain logic for one workflow, supplied by the workflow owner.
#[async_trait]
pub trait WorkflowHandler<E: Auditable>: Send + Sync {
    /// Classify the entity's position in the workflow.
    fn job_phase(&self, entity: &E) -> JobPhase;

    /// Do one unit of work and say which status the entity moves to.
    async fn handle_job(&self, entity: &E) -> Result<HandlerOutcome>;
}

/// Drives entities of one type through their workflow via discrete job
/// dispatches.
pub struct FsmJobDriver<E: Auditable> {
    engine: Arc<EntityEngine<E>>,
    handler: Arc<dyn WorkflowHandler<E>>,
    queue: Arc<dyn JobQueue>,
    /// Payload key carrying the entity id.
    key: String,
    max_iterations: u32,
    base_delay_ms: u64,
    cap_delay_ms: u64,
}

impl<E: Auditable> FsmJobDriver<E> {
    pub fn new(
        engine: Arc<EntityEngine<E>>,
        handler: Arc<dyn WorkflowHandler<E>>,
        queue: Arc<dyn JobQueue>,
        key: impl Into<String>,
    ) -> Self {
        let config = engine.config().clone();
        Self::with_config(engine, handler, queue, key, &config)
    }

    pub fn with_config(
        engine: Arc<EntityEngine<E>>,
        handler: Arc<dyn WorkflowHandler<E>>,
        queue: Arc<dyn JobQueue>,
        key: impl Into<String>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            engine,
            handler,
            queue,
            key: key.into(),
            max_iterations: config.max_job_iterations,
            base_delay_ms: config.job_base_delay_ms,
            cap_delay_ms: config.job_cap_delay_ms,
        }
    }

    /// False only for terminal entities; a dispatch for those is a no-op.
    pub fn can_process(&self, entity: &E) -> bool {
        !matches!(self.handler.job_phase(entity), JobPhase::Final)
    }

    /// True while the entity's new phase still warrants another dispatch.
    pub fn should_requeue(&self, entity: &E) -> bool {
        matches!(
            self.handler.job_phase(entity),
            JobPhase::Initial | JobPhase::Processing
        )
    }

    /// Entry point for queue consumers: extract the entity id from the job
    /// payload and dispatch.
    pub async fn process(&self, payload: &Value) -> Result<()> {
        let raw = payload
            .get(&self.key)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngineError::validation(format!("job payload missing '{}'", self.key))
            })?;
        let entity_id: EntityId = raw
            .parse()
            .map_err(|_| EngineError::validation(format!("invalid entity id '{raw}'")))?;
        self.dispatch(entity_id).await
    }

    /// Run one dispatch for an entity.
    ///
    /// `NotFound` is fatal for the job and propagates; redelivery policy
    /// for failed jobs belongs to the queue, not the driver.
    pub async fn dispatch(&self, entity_id: EntityId) -> Result<()> {
        let entity = self.engine.find_one(entity_id, None).await?;

        if !self.can_process(&entity) {
            warn!(
                entity = E::TYPE_NAME,
                id = %entity_id,
                status = %entity.status(),
                "entity cannot be processed, skipping dispatch"
            );
            return Ok(());
        }

        let outcome = self.handler.handle_job(&entity).await?;
        let updated = self
            .engine
            .update_status(entity_id, outcome.status_update, None)
            .await?;

        self.finish_processing(&updated, outcome.base_delay_ms).await
    }

    async fn finish_processing(&self, entity: &E, base_delay_ms: Option<u64>) -> Result<()> {
        let id = entity.id();

        if !self.should_requeue(entity) {
            info!(
                entity = E::TYPE_NAME,
                id = %id,
                status = %entity.status(),
                "entity processed to a stable state"
            );
            return Ok(());
        }

        let iterations = entity
            .current_audit_state()
            .map_or(0, |state| state.iterations);

        // A stuck entity needs manual intervention, not another retry.
        if iterations >= self.max_iterations {
            error!(
                entity = E::TYPE_NAME,
                id = %id,
                iterations = iterations,
                max_iterations = self.max_iterations,
                "entity exceeded max iterations, manual intervention required"
            );
            return Ok(());
        }

        let delay = backoff_delay(
            base_delay_ms.unwrap_or(self.base_delay_ms),
            iterations,
            self.cap_delay_ms,
        );

        let mut payload = serde_json::Map::new();
        payload.insert(self.key.clone(), Value::String(id.to_string()));
        self.queue
            .enqueue(&id.to_string(), Value::Object(payload), delay)
            .await?;

        info!(
            entity = E::TYPE_NAME,
            id = %id,
            delay_ms = delay.as_millis() as u64,
            iteration = iterations + 1,
            max_iterations = self.max_iterations,
            "entity requeued for processing"
        );
        Ok(())
    }
}

/// Staggered exponential backoff: `min(base * 2^(iterations % 10), cap)`.
///
/// The modulo resets the exponent every ten iterations, so long-retried
/// entities periodically get a short interval again instead of asymptoting
/// upward forever.
pub fn backoff_delay(base_delay_ms: u64, iterations: u32, cap_delay_ms: u64) -> Duration {
    let exponent = iterations % JOB_BACKOFF_STAGGER_WINDOW;
    let delay_ms = base_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(cap_delay_ms);
    Duration::from_millis(delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_JOB_BASE_DELAY_MS, DEFAULT_JOB_CAP_DELAY_MS};
    use proptest::prelude::*;

    #[test]
    fn test_backoff_vector() {
        let base = DEFAULT_JOB_BASE_DELAY_MS;
        let cap = DEFAULT_JOB_CAP_DELAY_MS;

        assert_eq!(backoff_delay(base, 0, cap), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 1, cap), Duration::from_millis(400));
        assert_eq!(backoff_delay(base, 9, cap), Duration::from_millis(102_400));
        // The stagger window resets the exponent.
        assert_eq!(backoff_delay(base, 10, cap), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 19, cap), Duration::from_millis(102_400));
    }

    #[test]
    fn test_backoff_respects_cap() {
        assert_eq!(
            backoff_delay(60_000, 9, DEFAULT_JOB_CAP_DELAY_MS),
            Duration::from_millis(DEFAULT_JOB_CAP_DELAY_MS)
        );
    }

    proptest! {
        #[test]
        fn prop_backoff_bounded(base in 1u64..=60_000, iterations in 0u32..=1_000) {
            let cap = DEFAULT_JOB_CAP_DELAY_MS;
            let delay = backoff_delay(base, iterations, cap).as_millis() as u64;
            prop_assert!(delay <= cap);
            prop_assert!(delay >= base.min(cap));
        }

        #[test]
        fn prop_backoff_staggers(iterations in 0u32..=990) {
            let cap = DEFAULT_JOB_CAP_DELAY_MS;
            let a = backoff_delay(DEFAULT_JOB_BASE_DELAY_MS, iterations, cap);
            let b = backoff_delay(DEFAULT_JOB_BASE_DELAY_MS, iterations + 10, cap);
            prop_assert_eq!(a, b);
        }
    }
}
