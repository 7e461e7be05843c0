//! # Transaction Coordinator
//!
//! Runs a unit of work inside a store session, retrying transient failures
//! with linear backoff. When the caller supplies a session the coordinator
//! is not the owner: the work runs directly and the caller keeps control of
//! commit and abort, which is how multiple engine operations compose into
//! one caller-level transaction. Without a session the coordinator owns the
//! whole lifecycle: each attempt gets a fresh session and transaction, and
//! the session is ended exactly once per attempt on every exit path.
//!
//! The coordinator holds no shared mutable state; any number of operations
//! may run through it in parallel, each with its own session.

use crate::constants::{DEFAULT_RETRY_DELAY_MS, DEFAULT_TRANSACTION_RETRIES};
use crate::error::Result;
use crate::store::{Session, SessionFactory};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

#[derive(Clone)]
pub struct TransactionCoordinator {
    sessions: Arc<dyn SessionFactory>,
    retries: u32,
    retry_delay: Duration,
}

impl TransactionCoordinator {
    pub fn new(sessions: Arc<dyn SessionFactory>) -> Self {
        Self::with_policy(
            sessions,
            DEFAULT_TRANSACTION_RETRIES,
            Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        )
    }

    pub fn with_policy(
        sessions: Arc<dyn SessionFactory>,
        retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            sessions,
            retries,
            retry_delay,
        }
    }

    /// Open a session without a transaction, for callers that want to scope
    /// several reads themselves.
    pub async fn start_session(&self) -> Result<Session> {
        self.sessions.start_session().await
    }

    /// Execute `work` within a transaction.
    ///
    /// `work` may be invoked several times; each owned attempt receives a
    /// brand-new session (an aborted session is never reused). Transient
    /// failures are retried up to the configured budget, waiting
    /// `retry_delay * attempt` between attempts; everything else, including
    /// business-rule rejections raised inside the transaction, surfaces
    /// immediately.
    pub async fn with_transaction<R, F, Fut>(&self, session: Option<Session>, work: F) -> Result<R>
    where
        F: Fn(Session) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        if let Some(existing) = session {
            // Not the owner: success or failure propagates untouched, and
            // the outer frame keeps commit/abort authority.
            return work(existing).await;
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let session = self.sessions.start_session().await?;
            session.start_transaction().await?;

            let outcome = match work(Arc::clone(&session)).await {
                Ok(value) => session.commit_transaction().await.map(|()| value),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => {
                    session.end_session().await?;
                    return Ok(value);
                }
                Err(err) => {
                    if let Err(abort_err) = session.abort_transaction().await {
                        warn!(error = %abort_err, "failed to abort transaction cleanly");
                    }
                    if let Err(end_err) = session.end_session().await {
                        warn!(error = %end_err, "failed to end session cleanly");
                    }

                    if !err.is_transient() {
                        return Err(err);
                    }
                    if attempt > self.retries {
                        error!(
                            attempts = attempt,
                            error = %err,
                            "transaction failed after all retries"
                        );
                        return Err(err);
                    }

                    let delay = self.retry_delay * attempt;
                    warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient transaction failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
