//! # Job Queue Port
//!
//! The engine never owns a queue; it only decides when and how to use one.
//! The [`JobQueue`] port accepts `(job_id, payload, delay)` and guarantees
//! at most one active job per `job_id`. A recording in-memory adapter ships
//! for tests and examples.

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Lifecycle state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    /// States in which a job id is still occupied and a new enqueue for the
    /// same id must be deduplicated.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Waiting | Self::Delayed | Self::Active)
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Schedule a dispatch after `delay`. At most one active job exists per
    /// `job_id`; a duplicate enqueue while one is pending is a no-op.
    async fn enqueue(&self, job_id: &str, payload: Value, delay: Duration) -> Result<()>;

    /// Look up a job's current state, `None` when the id is unknown.
    async fn get_job(&self, job_id: &str) -> Result<Option<JobState>>;
}

/// One accepted enqueue call, as recorded by [`MemoryJobQueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueRecord {
    pub job_id: String,
    pub payload: Value,
    pub delay: Duration,
}

/// In-memory queue adapter that records accepted enqueues and enforces the
/// one-pending-job-per-id guarantee. Dispatch execution is up to the test.
#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<HashMap<String, JobState>>,
    records: Mutex<Vec<EnqueueRecord>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// All accepted enqueue calls, in order.
    pub fn records(&self) -> Vec<EnqueueRecord> {
        self.records.lock().clone()
    }

    /// Mark a job as finished so its id can be reused.
    pub fn complete(&self, job_id: &str) {
        self.jobs.lock().insert(job_id.to_string(), JobState::Completed);
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job_id: &str, payload: Value, delay: Duration) -> Result<()> {
        let mut jobs = self.jobs.lock();
        if jobs.get(job_id).is_some_and(JobState::is_pending) {
            return Ok(());
        }

        let state = if delay.is_zero() {
            JobState::Waiting
        } else {
            JobState::Delayed
        };
        jobs.insert(job_id.to_string(), state);
        self.records.lock().push(EnqueueRecord {
            job_id: job_id.to_string(),
            payload,
            delay,
        });
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<JobState>> {
        Ok(self.jobs.lock().get(job_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_enqueue_and_lookup() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue("job-1", json!({"entity": "x"}), Duration::from_millis(200))
            .await
            .unwrap();

        assert_eq!(
            queue.get_job("job-1").await.unwrap(),
            Some(JobState::Delayed)
        );
        assert_eq!(queue.get_job("job-2").await.unwrap(), None);
        assert_eq!(queue.records().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_pending_job_deduplicated() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue("job-1", json!({}), Duration::from_millis(200))
            .await
            .unwrap();
        queue
            .enqueue("job-1", json!({}), Duration::from_millis(400))
            .await
            .unwrap();

        assert_eq!(queue.records().len(), 1);

        // Once completed, the id is free again.
        queue.complete("job-1");
        queue
            .enqueue("job-1", json!({}), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(queue.records().len(), 2);
        assert_eq!(
            queue.get_job("job-1").await.unwrap(),
            Some(JobState::Waiting)
        );
    }
}
