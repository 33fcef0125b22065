//! Severity classification.
//!
//! [`classify`] is a pure function of the finding, the configuration and
//! the number of occurrences seen for the object inside the repeat window.
//! [`SeverityClassifier`] tracks that per-object history and enforces the
//! monotonic-max rule: an object never dispatches below the highest tier it
//! reached within the window.

mod history;

pub use history::{Assessment, SeverityClassifier};

use crate::config::Config;
use crate::core::{Finding, SeverityTier};

/// Tier a finding deserves on its own: the type's tier, raised to the hint.
pub fn intrinsic_tier(finding: &Finding, config: &Config) -> SeverityTier {
    let by_type = config.tier_for_type(&finding.finding_type);
    match finding.severity_hint {
        Some(hint) => by_type.max(hint),
        None => by_type,
    }
}

/// Classifies a finding.
///
/// Starts from the intrinsic tier, escalates one tier for confidence above
/// the high-confidence threshold and one more for more occurrences than the
/// repeat-offender threshold. Never exceeds `Critical`.
///
/// # Examples
///
/// ```rust
/// use pii_responder::classify::classify;
/// use pii_responder::config::Config;
/// use pii_responder::core::{Finding, ObjectLocator, SeverityTier};
///
/// let finding = Finding::new("f-1", ObjectLocator::new("media", "a.csv"), "ssn", 0.95);
/// assert_eq!(classify(&finding, &Config::default(), 1), SeverityTier::High);
/// ```
pub fn classify(finding: &Finding, config: &Config, window_occurrences: u64) -> SeverityTier {
    let thresholds = &config.severity_thresholds;
    let mut tier = intrinsic_tier(finding, config);

    if finding.confidence_score > thresholds.high_confidence {
        tier = tier.escalate();
    }
    if window_occurrences > u64::from(thresholds.repeat_offender) {
        tier = tier.escalate();
    }
    tier
}
