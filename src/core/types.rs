//! Core types used throughout the pii-responder library.
//!
//! This module defines object locators, severity tiers and the
//! idempotency key that ties a finding to exactly one action record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Address of an object in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectLocator {
    /// Container (bucket) holding the object.
    pub container: String,
    /// Key of the object inside the container.
    pub key: String,
}

impl ObjectLocator {
    /// Creates a new locator.
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }

    /// Returns the locator of this object under the given namespace prefix,
    /// in the same container.
    pub fn under_prefix(&self, prefix: &str) -> Self {
        Self {
            container: self.container.clone(),
            key: format!("{}{}", prefix, self.key),
        }
    }

    /// Returns true if the key lives under the given namespace prefix.
    pub fn is_under(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.key.starts_with(prefix)
    }

    /// Parses the `container/key` form produced by `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        let (container, key) = s.split_once('/')?;
        if container.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self::new(container, key))
    }
}

impl fmt::Display for ObjectLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.key)
    }
}

/// Severity tier of a finding, totally ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeverityTier {
    /// Low sensitivity, e.g. a lone email address.
    Low,
    /// Medium sensitivity, e.g. a national identifier at moderate confidence.
    Medium,
    /// High sensitivity; triggers quarantine.
    High,
    /// Critical sensitivity; triggers quarantine.
    Critical,
}

impl SeverityTier {
    /// All tiers in ascending order.
    pub const ALL: [SeverityTier; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Returns the next tier up, saturating at `Critical`.
    pub fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }

    /// Returns true for tiers that require quarantine and alerting.
    pub fn is_high_or_above(self) -> bool {
        self >= Self::High
    }

    /// Returns the severity as a numeric score (0-100).
    pub fn score(&self) -> u8 {
        match self {
            Self::Low => 25,
            Self::Medium => 50,
            Self::High => 75,
            Self::Critical => 100,
        }
    }

    /// Lowercase name, as written into object tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeverityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "informational" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown severity tier '{}'", other)),
        }
    }
}

/// Idempotency key of a unit of work: one finding against one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    /// Finding identifier.
    pub finding_id: String,
    /// Object the finding targets.
    pub locator: ObjectLocator,
}

impl IdempotencyKey {
    /// Creates a new key.
    pub fn new(finding_id: impl Into<String>, locator: ObjectLocator) -> Self {
        Self {
            finding_id: finding_id.into(),
            locator,
        }
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.finding_id, self.locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(SeverityTier::Low < SeverityTier::Medium);
        assert!(SeverityTier::Medium < SeverityTier::High);
        assert!(SeverityTier::High < SeverityTier::Critical);
    }

    #[test]
    fn test_escalate_saturates() {
        assert_eq!(SeverityTier::Low.escalate(), SeverityTier::Medium);
        assert_eq!(SeverityTier::High.escalate(), SeverityTier::Critical);
        assert_eq!(SeverityTier::Critical.escalate(), SeverityTier::Critical);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("HIGH".parse::<SeverityTier>().unwrap(), SeverityTier::High);
        assert_eq!(" medium ".parse::<SeverityTier>().unwrap(), SeverityTier::Medium);
        assert!("severe".parse::<SeverityTier>().is_err());
    }

    #[test]
    fn test_locator_prefix() {
        let loc = ObjectLocator::new("media", "uploads/a.csv");
        let q = loc.under_prefix("quarantine/");
        assert_eq!(q.key, "quarantine/uploads/a.csv");
        assert!(q.is_under("quarantine/"));
        assert!(!loc.is_under("quarantine/"));
        assert_eq!(ObjectLocator::parse(&loc.to_string()), Some(loc));
    }
}
