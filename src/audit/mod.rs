//! Structured audit logging.
//!
//! Every decision the engine takes is written as an [`AuditRecord`] through
//! the [`AuditLogger`], which fans out to one or more [`AuditSink`]s: the
//! `tracing` sink (target `pii_responder::audit`), a durable JSON-lines
//! file, or memory.

mod logger;
mod record;
mod sinks;

pub use logger::AuditLogger;
pub use record::{AuditOutcome, AuditRecord};
pub use sinks::{AuditSink, JsonLinesAuditSink, MemoryAuditSink, TracingAuditSink, AUDIT_TARGET};
