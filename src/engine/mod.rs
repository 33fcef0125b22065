//! Engine orchestration.
//!
//! [`ResponseEngine`] wires the ingester, classifier, dispatcher, quarantine
//! manager, audit logger and alert emitter together. It bounds concurrency
//! with a worker semaphore, gives each dispatch attempt an execution budget,
//! and retries failed records until they complete or are dead-lettered.

mod config;
mod dead_letter;
mod responder;
mod response;

pub use config::EngineConfig;
pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use responder::{ResponseEngine, ResponseEngineBuilder};
pub use response::{HandlerBody, HandlerResponse, ProcessOutcome};
