//! The immutable configuration snapshot.

use crate::core::{ConfigError, SeverityTier};
use crate::dispatch::ActionKind;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;

/// Thresholds used by the severity classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityThresholds {
    /// Confidence above which a finding escalates one tier.
    pub high_confidence: f64,

    /// Occurrences within the window above which a finding escalates one tier.
    pub repeat_offender: u32,

    /// Sliding window for occurrence counting and per-object severity.
    #[serde(with = "duration_secs")]
    pub repeat_window: Duration,
}

/// What happens to the original object once its copy is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalPolicy {
    /// Delete the original.
    Delete,
    /// Replace the original with a small tombstone pointing at the quarantine copy.
    Tombstone,
}

impl FromStr for RemovalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "tombstone" => Ok(Self::Tombstone),
            other => Err(format!("unknown removal policy '{}'", other)),
        }
    }
}

/// Terminal action for a quarantine entry whose review deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpiryAction {
    /// Delete the quarantined copy.
    AutoDelete,
    /// Keep the copy and escalate to a human.
    Escalate,
}

impl FromStr for ExpiryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "auto-delete" => Ok(Self::AutoDelete),
            "escalate" => Ok(Self::Escalate),
            other => Err(format!("unknown expiry action '{}'", other)),
        }
    }
}

/// Immutable configuration snapshot handed to every component call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Classifier thresholds.
    pub severity_thresholds: SeverityThresholds,

    /// Intrinsic tier per (lowercased) finding type.
    pub finding_type_tiers: HashMap<String, SeverityTier>,

    /// Tier assumed for finding types absent from `finding_type_tiers`.
    pub unknown_type_tier: SeverityTier,

    /// Action plan per tier.
    pub action_policy: BTreeMap<SeverityTier, Vec<ActionKind>>,

    /// Namespace prefix quarantined objects are copied under.
    pub quarantine_prefix: String,

    /// Days a quarantine entry waits for review.
    pub retention_days: u32,

    /// What to do with the original after a verified copy.
    pub removal_policy: RemovalPolicy,

    /// What the review sweep does with expired entries.
    pub expiry_action: ExpiryAction,

    /// Names of the alert channels to notify.
    pub alert_channels: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            severity_thresholds: SeverityThresholds {
                high_confidence: 0.9,
                repeat_offender: 10,
                repeat_window: Duration::from_secs(24 * 60 * 60),
            },
            finding_type_tiers: default_type_tiers(),
            unknown_type_tier: SeverityTier::Medium,
            action_policy: SeverityTier::ALL
                .iter()
                .map(|tier| (*tier, ActionKind::default_plan(*tier)))
                .collect(),
            quarantine_prefix: "quarantine/".to_string(),
            retention_days: 90,
            removal_policy: RemovalPolicy::Delete,
            expiry_action: ExpiryAction::Escalate,
            alert_channels: vec!["log".to_string()],
        }
    }
}

impl Config {
    /// Fail-safe snapshot served when no configuration was ever loaded.
    ///
    /// Escalates as eagerly as possible, keeps originals as tombstones and
    /// never auto-deletes quarantined data.
    pub fn most_restrictive() -> Self {
        let mut config = Self::default();
        config.severity_thresholds.high_confidence = 0.5;
        config.severity_thresholds.repeat_offender = 1;
        config.unknown_type_tier = SeverityTier::High;
        config.removal_policy = RemovalPolicy::Tombstone;
        config.expiry_action = ExpiryAction::Escalate;
        config
    }

    /// Returns the action plan for a tier.
    pub fn actions_for(&self, tier: SeverityTier) -> Vec<ActionKind> {
        self.action_policy
            .get(&tier)
            .cloned()
            .unwrap_or_else(|| ActionKind::default_plan(tier))
    }

    /// Returns the intrinsic tier for a finding type.
    pub fn tier_for_type(&self, finding_type: &str) -> SeverityTier {
        let normalized = normalize_type(finding_type);
        self.finding_type_tiers
            .get(&normalized)
            .copied()
            .unwrap_or(self.unknown_type_tier)
    }

    /// Returns the review period of new quarantine entries.
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    /// Builds a snapshot from flat key-value entries, relative to the namespace.
    ///
    /// Missing keys keep their defaults; unknown keys are ignored.
    pub fn from_entries(entries: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (key, value) in entries {
            let key = key.trim_matches('/');
            match key {
                "severity/high_confidence_threshold" => {
                    let threshold: f64 = parse_value(key, value)?;
                    if !(0.0..=1.0).contains(&threshold) {
                        return Err(ConfigError::invalid(key, "must be within [0, 1]"));
                    }
                    config.severity_thresholds.high_confidence = threshold;
                }
                "severity/repeat_offender_threshold" => {
                    config.severity_thresholds.repeat_offender = parse_value(key, value)?;
                }
                "severity/repeat_window_secs" => {
                    let secs: u64 = parse_value(key, value)?;
                    config.severity_thresholds.repeat_window = Duration::from_secs(secs);
                }
                "quarantine/prefix" => {
                    let prefix = value.trim();
                    if prefix.is_empty() {
                        return Err(ConfigError::invalid(key, "prefix must not be empty"));
                    }
                    config.quarantine_prefix = if prefix.ends_with('/') {
                        prefix.to_string()
                    } else {
                        format!("{}/", prefix)
                    };
                }
                "quarantine/retention_days" => {
                    config.retention_days = parse_value(key, value)?;
                }
                "quarantine/removal_policy" => {
                    config.removal_policy = parse_value(key, value)?;
                }
                "quarantine/expiry_action" => {
                    config.expiry_action = parse_value(key, value)?;
                }
                "alerts/channels" => {
                    config.alert_channels = value
                        .split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(String::from)
                        .collect();
                }
                "finding_types/unknown" => {
                    config.unknown_type_tier = parse_value(key, value)?;
                }
                _ => {
                    if let Some(tier) = key.strip_prefix("actions/") {
                        let tier: SeverityTier = parse_value(key, tier)?;
                        let plan = ActionKind::parse_list(value)
                            .map_err(|reason| ConfigError::invalid(key, reason))?;
                        config.action_policy.insert(tier, plan);
                    } else if let Some(finding_type) = key.strip_prefix("finding_types/") {
                        config
                            .finding_type_tiers
                            .insert(normalize_type(finding_type), parse_value(key, value)?);
                    } else {
                        tracing::debug!(key = %key, "Ignoring unknown configuration key");
                    }
                }
            }
        }

        Ok(config)
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string()))
}

/// Lowercases a finding type and strips the `SensitiveData:S3Object/` style prefix.
fn normalize_type(finding_type: &str) -> String {
    let tail = finding_type
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(finding_type);
    tail.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

fn default_type_tiers() -> HashMap<String, SeverityTier> {
    use SeverityTier::*;

    [
        ("credentials", High),
        ("aws_credentials", High),
        ("private_key", High),
        ("multiple", High),
        ("ssn", Medium),
        ("usa_social_security_number", Medium),
        ("credit_card", Medium),
        ("credit_card_number", Medium),
        ("bank_account", Medium),
        ("bank_account_number", Medium),
        ("passport", Medium),
        ("drivers_license", Medium),
        ("tax_id", Medium),
        ("financial", Medium),
        ("personal", Medium),
        ("email", Low),
        ("email_address", Low),
        ("phone", Low),
        ("phone_number", Low),
        ("name", Low),
        ("address", Low),
        ("ip_address", Low),
        ("customidentifier", Low),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retention_days, 90);
        assert_eq!(config.quarantine_prefix, "quarantine/");
        assert_eq!(config.tier_for_type("ssn"), SeverityTier::Medium);
        assert_eq!(config.tier_for_type("email"), SeverityTier::Low);
        assert_eq!(config.tier_for_type("something-new"), SeverityTier::Medium);
    }

    #[test]
    fn test_normalize_event_bus_types() {
        let config = Config::default();
        assert_eq!(
            config.tier_for_type("SensitiveData:S3Object/Credentials"),
            SeverityTier::High
        );
        assert_eq!(
            config.tier_for_type("SensitiveData:S3Object/Financial"),
            SeverityTier::Medium
        );
    }

    #[test]
    fn test_from_entries_overrides() {
        let config = Config::from_entries(&entries(&[
            ("severity/high_confidence_threshold", "0.8"),
            ("quarantine/prefix", "restricted"),
            ("quarantine/retention_days", "30"),
            ("quarantine/expiry_action", "auto-delete"),
            ("alerts/channels", "log, security-webhook"),
            ("actions/medium", "tag,alert,log"),
            ("finding_types/email", "medium"),
        ]))
        .unwrap();

        assert_eq!(config.severity_thresholds.high_confidence, 0.8);
        assert_eq!(config.quarantine_prefix, "restricted/");
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.expiry_action, ExpiryAction::AutoDelete);
        assert_eq!(config.alert_channels, vec!["log", "security-webhook"]);
        assert_eq!(
            config.actions_for(SeverityTier::Medium),
            vec![ActionKind::Tag, ActionKind::Alert, ActionKind::Log]
        );
        assert_eq!(config.tier_for_type("email"), SeverityTier::Medium);
        // untouched keys keep their defaults
        assert_eq!(config.severity_thresholds.repeat_offender, 10);
    }

    #[test]
    fn test_from_entries_rejects_bad_values() {
        let err = Config::from_entries(&entries(&[("severity/high_confidence_threshold", "1.5")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = Config::from_entries(&entries(&[("quarantine/retention_days", "ninety")]))
            .unwrap_err();
        assert!(err.to_string().contains("quarantine/retention_days"));
    }

    #[test]
    fn test_most_restrictive_is_stricter() {
        let strict = Config::most_restrictive();
        let default = Config::default();
        assert!(strict.severity_thresholds.high_confidence < default.severity_thresholds.high_confidence);
        assert!(strict.severity_thresholds.repeat_offender < default.severity_thresholds.repeat_offender);
        assert_eq!(strict.expiry_action, ExpiryAction::Escalate);
    }
}
