//! Core types and errors for the pii-responder library.
//!
//! - [`types`] - Object locators, severity tiers, idempotency keys
//! - [`finding`] - The validated `Finding`
//! - [`error`] - Structured error types
//! - [`hasher`] - BLAKE3 integrity tokens

pub mod error;
pub mod finding;
pub mod hasher;
pub mod types;

pub use error::{
    AuditError, ConfigError, NotificationError, QuarantineError, QuarantineResult, ResponseError,
    ResponseResult, StoreError, StoreResult, ValidationError,
};
pub use finding::Finding;
pub use hasher::{ContentHasher, IntegrityToken};
pub use types::{IdempotencyKey, ObjectLocator, SeverityTier};
