//! Validation of raw finding payloads.
//!
//! Two payload shapes are accepted: the flat finding event
//!
//! ```json
//! {"id": "f-1", "objectLocator": {"container": "media", "key": "a.csv"},
//!  "findingType": "ssn", "confidenceScore": 0.95, "occurrenceCount": 1,
//!  "detectedAt": "2026-01-05T10:00:00Z"}
//! ```
//!
//! and the event-bus envelope emitted by the classification service
//! (`source: "aws.macie2"`), which may name several objects.

use crate::core::{Finding, ObjectLocator, SeverityTier, ValidationError};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Event source accepted for envelope payloads.
pub const ENVELOPE_SOURCE: &str = "aws.macie2";

/// Confidence assumed for envelope findings that carry none.
const ENVELOPE_DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFinding {
    id: Option<String>,
    object_locator: Option<RawLocator>,
    finding_type: Option<String>,
    confidence_score: Option<f64>,
    occurrence_count: Option<i64>,
    detected_at: Option<String>,
    severity_hint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLocator {
    container: Option<String>,
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    source: Option<String>,
    time: Option<String>,
    detail: Option<EnvelopeDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeDetail {
    id: Option<String>,
    #[serde(rename = "type")]
    finding_type: Option<String>,
    severity: Option<EnvelopeSeverity>,
    #[serde(default)]
    resources: Vec<EnvelopeResource>,
    confidence: Option<f64>,
    count: Option<i64>,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeSeverity {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeResource {
    resource_type: Option<String>,
    s3_object: Option<EnvelopeObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeObject {
    bucket_name: Option<String>,
    key: Option<String>,
}

/// Validates a payload given as JSON text.
pub fn parse_payload(payload: &str) -> Result<Vec<Finding>, ValidationError> {
    let value: Value = serde_json::from_str(payload)?;
    validate_payload(&value)
}

/// Validates a JSON payload of either accepted shape.
///
/// Flat events produce exactly one finding; envelopes produce one per named object.
pub fn validate_payload(value: &Value) -> Result<Vec<Finding>, ValidationError> {
    if value.get("detail").is_some() || value.get("source").is_some() {
        let envelope: Envelope = serde_json::from_value(value.clone())?;
        return validate_envelope(envelope);
    }

    let raw: RawFinding = serde_json::from_value(value.clone())?;
    Ok(vec![validate_raw(raw)?])
}

fn validate_raw(raw: RawFinding) -> Result<Finding, ValidationError> {
    let id = required_string(raw.id, "id")?;

    let locator = raw
        .object_locator
        .ok_or(ValidationError::MissingField {
            field: "objectLocator",
        })?;
    let locator = ObjectLocator::new(
        required_string(locator.container, "objectLocator.container")?,
        required_string(locator.key, "objectLocator.key")?,
    );

    let finding_type = required_string(raw.finding_type, "findingType")?;
    let confidence = validate_confidence(raw.confidence_score.ok_or(
        ValidationError::MissingField {
            field: "confidenceScore",
        },
    )?)?;
    let occurrences = validate_occurrences(raw.occurrence_count.ok_or(
        ValidationError::MissingField {
            field: "occurrenceCount",
        },
    )?)?;
    let detected_at = parse_timestamp(raw.detected_at, "detectedAt")?;

    let severity_hint = raw
        .severity_hint
        .map(|hint| {
            hint.parse::<SeverityTier>()
                .map_err(|reason| ValidationError::invalid("severityHint", reason))
        })
        .transpose()?;

    Ok(Finding {
        id,
        object_locator: locator,
        finding_type,
        confidence_score: confidence,
        occurrence_count: occurrences,
        detected_at,
        severity_hint,
    })
}

fn validate_envelope(envelope: Envelope) -> Result<Vec<Finding>, ValidationError> {
    let source = envelope.source.unwrap_or_default();
    if source != ENVELOPE_SOURCE {
        return Err(ValidationError::UnsupportedSource {
            source_name: source,
        });
    }

    let detail = envelope
        .detail
        .ok_or(ValidationError::MissingField { field: "detail" })?;
    let id = required_string(detail.id, "detail.id")?;
    let finding_type = required_string(detail.finding_type, "detail.type")?;

    let confidence = validate_confidence(detail.confidence.unwrap_or(ENVELOPE_DEFAULT_CONFIDENCE))?;
    let occurrences = validate_occurrences(detail.count.unwrap_or(1))?;
    let detected_at = parse_timestamp(detail.created_at.or(envelope.time), "detail.createdAt")?;

    // unrecognised descriptions are left to the finding type
    let severity_hint = detail
        .severity
        .and_then(|s| s.description)
        .and_then(|d| d.parse::<SeverityTier>().ok());

    let findings: Vec<Finding> = detail
        .resources
        .into_iter()
        .filter(|r| r.resource_type.as_deref() == Some("S3Object"))
        .filter_map(|r| r.s3_object)
        .filter_map(|o| match (o.bucket_name, o.key) {
            (Some(bucket), Some(key)) if !bucket.is_empty() && !key.is_empty() => {
                Some(ObjectLocator::new(bucket, key))
            }
            _ => None,
        })
        .map(|locator| Finding {
            id: id.clone(),
            object_locator: locator,
            finding_type: finding_type.clone(),
            confidence_score: confidence,
            occurrence_count: occurrences,
            detected_at,
            severity_hint,
        })
        .collect();

    if findings.is_empty() {
        return Err(ValidationError::NoObjects { finding_id: id });
    }
    Ok(findings)
}

fn required_string(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s),
        Some(_) => Err(ValidationError::invalid(field, "must not be empty")),
        None => Err(ValidationError::MissingField { field }),
    }
}

fn validate_confidence(score: f64) -> Result<f64, ValidationError> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Err(ValidationError::invalid(
            "confidenceScore",
            format!("{} is outside [0, 1]", score),
        ))
    }
}

fn validate_occurrences(count: i64) -> Result<u32, ValidationError> {
    u32::try_from(count)
        .map_err(|_| ValidationError::invalid("occurrenceCount", format!("{} is out of range", count)))
}

fn parse_timestamp(
    value: Option<String>,
    field: &'static str,
) -> Result<DateTime<Utc>, ValidationError> {
    let raw = value.ok_or(ValidationError::MissingField { field })?;
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ValidationError::invalid(field, format!("'{}': {}", raw, e)))
}
