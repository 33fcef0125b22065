//! # pii-responder
//!
//! A finding-to-action response engine for sensitive data detected in
//! object stores.
//!
//! ## Overview
//!
//! An upstream classification service reports that an object contains
//! personally identifiable information. pii-responder takes those findings
//! and:
//!
//! - Validates and deduplicates them (delivery is at-least-once, unordered)
//! - Classifies each into a severity tier, never below the object's recent peak
//! - Executes the tier's action plan: quarantine, access restriction, tagging,
//!   alerting, logging
//! - Quarantines with a copy-verify-remove protocol that never loses data
//! - Writes an ordered audit trail of every decision
//! - Retries transient failures with backoff and dead-letters the rest
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pii_responder::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryObjectStore::new());
//!     let engine = ResponseEngine::builder()
//!         .with_object_store(store)
//!         .build()?;
//!
//!     let finding = Finding::new("f-1", ObjectLocator::new("media", "a.csv"), "ssn", 0.95);
//!     let outcome = engine.process_finding(finding).await?;
//!     println!("{:?}", outcome.status());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `webhook` - HTTP webhook alert channel via `reqwest`
//!
//! ## Architecture
//!
//! - **Core**: Locators, tiers, findings, errors, integrity hashing
//! - **Config**: Cached runtime policy with fail-closed fallback
//! - **Ingest**: Payload validation and the dedupe window
//! - **Classify**: Severity tiers with per-object history
//! - **Dispatch**: Action records and plan execution
//! - **Quarantine**: Object store abstraction, ledger, review sweep
//! - **Audit**: Structured audit records and sinks
//! - **Alert**: Notification channels with audit fallback
//! - **Engine**: Worker pool, execution budget, retry and dead letters

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod alert;
pub mod audit;
pub mod classify;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod engine;
pub mod ingest;
pub mod quarantine;

// Re-export commonly used types at the crate root
pub use crate::core::{
    Finding, IdempotencyKey, ObjectLocator, ResponseError, ResponseResult, SeverityTier,
};
pub use crate::config::{Config, ConfigProvider};
pub use crate::dispatch::{ActionKind, ActionRecord, ActionStatus};
pub use crate::engine::{EngineConfig, ResponseEngine};

/// Prelude module for convenient imports.
///
/// ```rust
/// use pii_responder::prelude::*;
/// ```
pub mod prelude {
    pub use crate::alert::{AlertEmitter, AlertMessage, AlertSink, LogAlertSink};
    pub use crate::audit::{AuditLogger, AuditOutcome, AuditRecord, AuditSink};
    pub use crate::config::{Config, ConfigProvider, ConfigStore, InMemoryConfigStore};
    pub use crate::core::{
        Finding, IdempotencyKey, ObjectLocator, ResponseError, ResponseResult, SeverityTier,
    };
    pub use crate::dispatch::{ActionKind, ActionRecord, ActionStatus, RetryConfig};
    pub use crate::engine::{EngineConfig, HandlerResponse, ResponseEngine};
    pub use crate::quarantine::{
        InMemoryLedger, InMemoryObjectStore, ObjectStore, QuarantineEntry, QuarantineLedger,
        ReviewDecision, ReviewStatus, StoredObject,
    };
}
