//! # Structured Error Handling
//!
//! Error taxonomy for the entity engine. The central distinction is
//! *transient* versus everything else: only transient failures (write
//! conflicts, transactions aborted by contention) are retried by the
//! transaction coordinator. Business-rule rejections from the status FSM
//! and optimistic-lock conflicts are surfaced immediately so callers can
//! decide whether re-reading and resubmitting makes sense.
//!
//! Raw store errors carry a numeric server code and are classified exactly
//! once, at the store adapter boundary, via [`EngineError::from_store`].

use crate::constants::store_error_code;
use thiserror::Error;

/// All failure modes the engine can surface to a caller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Duplicate unique key or optimistic-lock version mismatch. Never
    /// retried automatically: repeating the same stale write cannot succeed.
    #[error("{resource} already exists or was modified by another process")]
    Conflict { resource: String },

    /// Referenced entity is absent.
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Write conflict from concurrent contention inside a transaction.
    /// Transient: a fresh attempt is expected to succeed.
    #[error("write conflict occurred, please retry")]
    WriteConflict,

    /// Transaction aborted with a transient-transaction label. Transient.
    #[error("transaction aborted due to transient contention")]
    TransactionAborted,

    /// Malformed document fields.
    #[error("document validation failed: {reason}")]
    DocumentValidation { reason: String },

    /// Operation exceeded the store's time limit. Not retried by default:
    /// blindly repeating an expensive operation is undesirable.
    #[error("query exceeded time limit")]
    QueryTimeout,

    /// The requested status transition is not listed in the entity type's
    /// transition table.
    #[error("transition from {from} to {to} is not allowed")]
    InvalidTransition { from: String, to: String },

    /// The current status has no outgoing transitions in strict mode.
    #[error("item is already in a final state: {current}")]
    FinalStateTransition { current: String, requested: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unclassified storage or engine failure, wrapped after logging.
    #[error("internal engine error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Raw error surfaced by a document store adapter, before classification.
#[derive(Debug, Clone)]
pub struct StoreError {
    pub code: Option<i32>,
    pub message: String,
}

impl StoreError {
    pub fn new(code: impl Into<Option<i32>>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl EngineError {
    pub fn conflict(resource: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::DocumentValidation {
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True only for failures that are expected to succeed if the whole
    /// transaction is replayed unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::WriteConflict | Self::TransactionAborted)
    }

    /// Business-logic rejections: never retried, bypass transient
    /// classification even when raised inside a coordinator-managed
    /// transaction.
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::InvalidTransition { .. } | Self::FinalStateTransition { .. }
        )
    }

    /// Classify a raw store error. Duplicate keys become conflicts named
    /// after the entity type; unknown codes are logged and wrapped opaque.
    pub fn from_store(error: StoreError, resource: &str) -> Self {
        match error.code {
            Some(store_error_code::DUPLICATE_KEY) => Self::conflict(resource),
            Some(store_error_code::WRITE_CONFLICT) => Self::WriteConflict,
            Some(store_error_code::DOCUMENT_VALIDATION_FAILURE) => Self::DocumentValidation {
                reason: error.message,
            },
            Some(store_error_code::EXCEEDED_TIME_LIMIT) => Self::QueryTimeout,
            code => {
                tracing::error!(
                    code = ?code,
                    message = %error.message,
                    resource = %resource,
                    "unclassified store error"
                );
                Self::Internal(error.message)
            }
        }
    }
}
