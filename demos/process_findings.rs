//! Processing findings end to end against an in-memory object store.
//!
//! This example shows how to:
//! - Build a ResponseEngine with a configuration store and alert channel
//! - Process findings of different severities
//! - Inspect the quarantine ledger and run a review sweep
//!
//! Run with: cargo run --example process_findings

use pii_responder::alert::MemoryAlertSink;
use pii_responder::audit::MemoryAuditSink;
use pii_responder::config::namespace;
use pii_responder::prelude::*;

use chrono::{Duration, Utc};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pii_responder::audit=debug".into()),
        )
        .init();

    println!("=== pii-responder Example ===\n");

    let customers = ObjectLocator::new("media", "exports/customers.csv");
    let newsletter = ObjectLocator::new("media", "exports/newsletter.csv");
    let store = Arc::new(
        InMemoryObjectStore::new()
            .with_native_sha256()
            .with_object(customers.clone(), StoredObject::new("name,ssn\nann,123-45-6789"))
            .with_object(newsletter.clone(), StoredObject::new("email\nann@example.com")),
    );

    // Runtime policy lives in the configuration store under the namespace
    let ns = namespace("media-pipeline", "dev");
    let config_store = InMemoryConfigStore::new()
        .with_entry(format!("{}/quarantine/retention_days", ns), "30")
        .with_entry(format!("{}/alerts/channels", ns), "log,security");

    let audit = Arc::new(MemoryAuditSink::new());
    let security = Arc::new(MemoryAlertSink::new());
    let engine = ResponseEngine::builder()
        .with_config_provider(Arc::new(ConfigProvider::new(Arc::new(config_store), ns)))
        .with_object_store(store.clone())
        .add_audit_sink(audit.clone())
        .add_alert_channel("security", security.clone())
        .with_config(EngineConfig::new().with_max_concurrent(4))
        .build()?;

    let findings = vec![
        Finding::new("f-100", customers.clone(), "ssn", 0.97),
        Finding::new("f-101", newsletter.clone(), "email", 0.42),
    ];

    for result in engine.process_batch(findings).await {
        let outcome = result?;
        println!(
            "{} on {}: tier={} status={:?} actions={:?}",
            outcome.record.finding_id,
            outcome.record.object_locator,
            outcome.record.tier,
            outcome.status(),
            outcome.record.actions_completed
        );
    }

    println!("\n=== Quarantine ===");
    let ledger = engine.quarantine().ledger();
    if let Some(entry) = ledger.get(&customers).await? {
        println!("Quarantined at: {}", entry.quarantine_locator);
        println!("Review deadline: {}", entry.review_deadline);
        println!("Review status: {}", entry.review_status);
    }
    println!("Original still present: {}", store.contains(&customers));
    println!("Alerts sent to security: {}", security.sent().len());
    println!("Audit records written: {}", audit.records().len());

    // Simulate the review window passing without a decision
    println!("\n=== Review sweep ===");
    let report = engine.sweep(Utc::now() + Duration::days(31)).await?;
    println!("Expired: {:?}", report.expired);
    println!("Escalated: {}", report.escalated);

    Ok(())
}
