//! # Engine Constants
//!
//! Operational defaults and document-store error codes that define the
//! boundaries of the transactional entity engine. Runtime-tunable values
//! have matching fields on [`crate::config::EngineConfig`].

/// Numeric error codes raised by the document store server.
///
/// These follow the MongoDB server error code space, which is what the
/// engine's error classification (`EngineError::from_store`) understands.
pub mod store_error_code {
    pub const DUPLICATE_KEY: i32 = 11000;
    pub const WRITE_CONFLICT: i32 = 112;
    pub const DOCUMENT_VALIDATION_FAILURE: i32 = 121;
    pub const EXCEEDED_TIME_LIMIT: i32 = 50;
    pub const NETWORK_TIMEOUT: i32 = 89;
    pub const CURSOR_NOT_FOUND: i32 = 43;
}

/// Number of times the transaction coordinator retries a transient failure
/// before surfacing it.
pub const DEFAULT_TRANSACTION_RETRIES: u32 = 3;

/// Base delay between transaction retry attempts. Attempt `n` waits
/// `n * DEFAULT_RETRY_DELAY_MS` milliseconds (linear backoff).
pub const DEFAULT_RETRY_DELAY_MS: u64 = 20;

/// Iterations after which a workflow entity is considered stuck and no
/// further dispatches are scheduled.
pub const DEFAULT_MAX_JOB_ITERATIONS: u32 = 50;

/// Base delay for the job driver's exponential backoff.
pub const DEFAULT_JOB_BASE_DELAY_MS: u64 = 200;

/// Upper bound on any single requeue delay (15 minutes).
pub const DEFAULT_JOB_CAP_DELAY_MS: u64 = 1000 * 60 * 15;

/// The backoff exponent resets every this many iterations so long-stuck
/// entities periodically get a short retry interval again.
pub const JOB_BACKOFF_STAGGER_WINDOW: u32 = 10;

/// Step recorded on audit entries before a workflow handler advances it.
pub const INITIAL_AUDIT_STEP: &str = "start";
