//! Error types for the pii-responder library.
//!
//! Every failure is returned as a typed `Result`; the library never panics.
//! The classifier methods on [`ResponseError`] drive the retry policy:
//! validation errors are discarded, transient storage errors are retried
//! with backoff, permission and missing-object errors are fatal.

use crate::core::types::ObjectLocator;

use std::time::Duration;
use thiserror::Error;

/// Failure to turn a raw payload into a [`Finding`](crate::core::Finding).
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is absent.
    #[error("missing required field '{field}'")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// A field is present but malformed or out of range.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The payload is not valid JSON or has the wrong shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// An event envelope came from a source we do not handle.
    #[error("unsupported event source '{source_name}'")]
    UnsupportedSource {
        /// The `source` field of the envelope.
        source_name: String,
    },

    /// An event envelope named no object-store resources.
    #[error("event '{finding_id}' names no object-store resources")]
    NoObjects {
        /// Finding id carried by the envelope.
        finding_id: String,
    },
}

impl ValidationError {
    /// Creates an `InvalidField` error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Error returned by an [`ObjectStore`](crate::quarantine::ObjectStore).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The object does not exist.
    #[error("object not found: {locator}")]
    NotFound {
        /// Object that was not found.
        locator: ObjectLocator,
    },

    /// A conditional write was rejected because the target already exists.
    #[error("precondition failed for {locator}")]
    PreconditionFailed {
        /// Object whose precondition failed.
        locator: ObjectLocator,
    },

    /// The caller lacks rights for the operation.
    #[error("permission denied for {operation} on {locator}")]
    PermissionDenied {
        /// Operation that was refused.
        operation: &'static str,
        /// Object the operation targeted.
        locator: ObjectLocator,
    },

    /// The store is unreachable or returned a retryable failure.
    #[error("store unavailable during {operation}: {reason}")]
    Unavailable {
        /// Operation that failed.
        operation: &'static str,
        /// Failure description.
        reason: String,
    },
}

impl StoreError {
    /// Creates an `Unavailable` error.
    pub fn unavailable(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            operation,
            reason: reason.into(),
        }
    }

    /// Returns `true` if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// The main error type of the response pipeline.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// The finding payload was rejected.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A copy, delete or tag operation failed transiently.
    #[error("transient storage failure during {operation} on {locator}: {reason}")]
    TransientStorage {
        /// Operation that failed.
        operation: &'static str,
        /// Object being mutated.
        locator: ObjectLocator,
        /// Failure description.
        reason: String,
    },

    /// Source and quarantine copy integrity tokens differ.
    #[error("integrity mismatch for {locator}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// Quarantine copy that failed verification.
        locator: ObjectLocator,
        /// Token of the source object.
        expected: String,
        /// Token of the copy.
        actual: String,
    },

    /// Neither a live configuration nor a fallback could be produced.
    #[error("configuration unavailable: {reason}")]
    ConfigUnavailable {
        /// Failure description.
        reason: String,
    },

    /// An alert channel could not be reached.
    #[error("notification failed: {0}")]
    Notification(#[from] NotificationError),

    /// Insufficient rights to mutate an object or read configuration.
    #[error("permission denied for {operation} on {locator}")]
    Permission {
        /// Operation that was refused.
        operation: &'static str,
        /// Object the operation targeted.
        locator: ObjectLocator,
    },

    /// The object to quarantine exists neither at its origin nor in quarantine.
    #[error("object missing: {locator}")]
    ObjectMissing {
        /// Original location of the object.
        locator: ObjectLocator,
    },

    /// The invocation ran out of its execution budget.
    #[error("execution budget of {budget:?} exceeded")]
    BudgetExceeded {
        /// The budget that elapsed.
        budget: Duration,
    },

    /// The quarantine ledger could not be read or written.
    #[error("quarantine ledger error: {0}")]
    Ledger(#[from] QuarantineError),

    /// An internal invariant was violated.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl ResponseError {
    /// Returns `true` if the failed step may be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientStorage { .. }
                | Self::IntegrityMismatch { .. }
                | Self::BudgetExceeded { .. }
                | Self::Ledger(_)
        )
    }

    /// Returns `true` if the record must be dead-lettered immediately and escalated.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Permission { .. } | Self::ObjectMissing { .. })
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::TransientStorage { .. } | Self::IntegrityMismatch { .. } => "transient_storage",
            Self::ConfigUnavailable { .. } => "config_unavailable",
            Self::Notification(_) => "notification",
            Self::Permission { .. } => "permission",
            Self::ObjectMissing { .. } => "object_missing",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Ledger(_) => "ledger",
            Self::Internal { .. } => "internal",
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Maps a store error raised while mutating `locator`.
    pub fn from_store(err: StoreError, locator: &ObjectLocator) -> Self {
        match err {
            StoreError::NotFound { locator } => Self::ObjectMissing { locator },
            StoreError::PermissionDenied { operation, locator } => {
                Self::Permission { operation, locator }
            }
            StoreError::PreconditionFailed { locator } => Self::TransientStorage {
                operation: "conditional_write",
                locator,
                reason: "precondition failed".into(),
            },
            StoreError::Unavailable { operation, reason } => Self::TransientStorage {
                operation,
                locator: locator.clone(),
                reason,
            },
        }
    }
}

/// Error type for quarantine ledger operations.
#[derive(Debug, Error)]
pub enum QuarantineError {
    /// Failed to persist an entry.
    #[error("failed to store quarantine entry: {reason}")]
    StoreFailed {
        /// Reason for the failure.
        reason: String,
    },

    /// Quarantine entry not found.
    #[error("quarantine entry not found: {id}")]
    NotFound {
        /// The entry that was not found.
        id: String,
    },

    /// Failed to read entries.
    #[error("failed to read quarantine ledger: {reason}")]
    RetrieveFailed {
        /// Reason for the failure.
        reason: String,
    },

    /// The requested review transition is not allowed from the current status.
    #[error("invalid review transition for {id}: {from} -> {to}")]
    InvalidTransition {
        /// Entry id.
        id: String,
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration store could not be reached.
    #[error("configuration store unavailable: {reason}")]
    Unavailable {
        /// Failure description.
        reason: String,
    },

    /// A key holds a value that cannot be parsed.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Offending key, relative to the namespace.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates an `InvalidValue` error.
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised by an alert channel.
#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    /// The channel could not be reached.
    #[error("channel '{channel}' unreachable: {reason}")]
    ChannelUnreachable {
        /// Channel name.
        channel: String,
        /// Failure description.
        reason: String,
    },

    /// The channel answered with a rejection.
    #[error("channel '{channel}' rejected alert with status {status}")]
    Rejected {
        /// Channel name.
        channel: String,
        /// Status reported by the channel.
        status: u16,
    },

    /// No sink is registered under this channel name.
    #[error("unknown alert channel '{channel}'")]
    UnknownChannel {
        /// Channel name.
        channel: String,
    },
}

impl NotificationError {
    /// Creates a `ChannelUnreachable` error.
    pub fn unreachable(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ChannelUnreachable {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if another delivery attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ChannelUnreachable { .. })
    }
}

/// Error raised by an audit sink.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink refused or could not accept the record.
    #[error("audit sink unavailable: {reason}")]
    SinkUnavailable {
        /// Failure description.
        reason: String,
    },

    /// The record could not be serialized.
    #[error("failed to serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for pipeline operations.
pub type ResponseResult<T> = Result<T, ResponseError>;

/// A specialized `Result` type for object store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A specialized `Result` type for quarantine ledger operations.
pub type QuarantineResult<T> = Result<T, QuarantineError>;
