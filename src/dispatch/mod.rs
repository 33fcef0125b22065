//! Action planning and execution.
//!
//! - [`action`] - The action vocabulary and default tier plans
//! - [`record`] - Per-finding action records and their state machine
//! - [`store`] - Concurrent record store with atomic claims
//! - [`retry`] - Exponential backoff shared by every retrying component
//! - [`dispatcher`] - Executes plans against the store, alerts and audit log

pub mod action;
pub mod dispatcher;
pub mod record;
pub mod retry;
pub mod store;

pub use action::ActionKind;
pub use dispatcher::{
    ActionDispatcher, DispatchOutcome, PII_DETECTED_TAG, PII_DETECTION_DATE_TAG,
    PII_SEVERITY_TAG, SECURITY_STATUS_TAG,
};
pub use record::{ActionOutcome, ActionRecord, ActionStatus};
pub use retry::{retry_async, RetryConfig};
pub use store::{Claim, RecordStore};
