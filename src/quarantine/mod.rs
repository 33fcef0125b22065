//! Quarantine of objects containing PII.
//!
//! [`QuarantineManager`] moves objects into the quarantine namespace with a
//! copy-verify-remove protocol that is safe to retry at every step, and
//! records each move in a [`QuarantineLedger`]. [`ReviewSweeper`] expires
//! entries nobody reviewed in time.

mod entry;
mod ledger;
mod manager;
mod memory;
mod store;
mod sweep;

pub use entry::{QuarantineEntry, QuarantineFilter, ReviewStatus};
pub use ledger::{FilesystemLedger, InMemoryLedger, QuarantineLedger};
pub use manager::{
    QuarantineManager, QuarantineOutcome, ReviewDecision, FINDING_ID_TAG, MARKER_TAG,
    ORIGINAL_LOCATOR_TAG, QUARANTINED_AT_TAG, QUARANTINE_LOCATION_TAG, SEVERITY_TAG,
    TOMBSTONE_TAG,
};
pub use memory::{Fault, InMemoryObjectStore, StoreOp};
pub use store::{AccessControl, CopyOptions, ObjectHead, ObjectStore, StoredObject, Tags};
pub use sweep::{ReviewSweeper, SweepReport};
