//! Response actions and the default tier-to-action policy.

use crate::core::SeverityTier;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A response action executed against a finding's object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// Copy the object into the quarantine namespace and remove the original.
    Quarantine,
    /// Set the quarantine copy's access control to private.
    RestrictAccess,
    /// Write PII tags onto the object.
    Tag,
    /// Notify the configured alert channels.
    Alert,
    /// Write the decision summary to the audit log.
    Log,
}

impl ActionKind {
    /// Returns true if a failure of this action fails the whole record.
    ///
    /// Storage mutations are mandatory; alerting and logging are best-effort.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, Self::Quarantine | Self::RestrictAccess | Self::Tag)
    }

    /// Kebab-case name used in configuration and audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quarantine => "quarantine",
            Self::RestrictAccess => "restrict-access",
            Self::Tag => "tag",
            Self::Alert => "alert",
            Self::Log => "log",
        }
    }

    /// Default action plan for a tier.
    pub fn default_plan(tier: SeverityTier) -> Vec<ActionKind> {
        match tier {
            SeverityTier::Critical | SeverityTier::High => vec![
                Self::Quarantine,
                Self::RestrictAccess,
                Self::Tag,
                Self::Alert,
                Self::Log,
            ],
            SeverityTier::Medium => vec![Self::Tag, Self::Log],
            SeverityTier::Low => vec![Self::Log],
        }
    }

    /// Parses a comma-separated action list such as `"tag, log"`.
    pub fn parse_list(s: &str) -> Result<Vec<ActionKind>, String> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "quarantine" => Ok(Self::Quarantine),
            "restrict-access" => Ok(Self::RestrictAccess),
            "tag" => Ok(Self::Tag),
            "alert" => Ok(Self::Alert),
            "log" => Ok(Self::Log),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plans() {
        assert_eq!(
            ActionKind::default_plan(SeverityTier::High),
            vec![
                ActionKind::Quarantine,
                ActionKind::RestrictAccess,
                ActionKind::Tag,
                ActionKind::Alert,
                ActionKind::Log
            ]
        );
        assert_eq!(
            ActionKind::default_plan(SeverityTier::Critical),
            ActionKind::default_plan(SeverityTier::High)
        );
        assert_eq!(
            ActionKind::default_plan(SeverityTier::Medium),
            vec![ActionKind::Tag, ActionKind::Log]
        );
        assert_eq!(ActionKind::default_plan(SeverityTier::Low), vec![ActionKind::Log]);
    }

    #[test]
    fn test_mandatory_actions() {
        assert!(ActionKind::Quarantine.is_mandatory());
        assert!(ActionKind::RestrictAccess.is_mandatory());
        assert!(!ActionKind::Alert.is_mandatory());
        assert!(!ActionKind::Log.is_mandatory());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            ActionKind::parse_list("tag, restrict_access,log").unwrap(),
            vec![ActionKind::Tag, ActionKind::RestrictAccess, ActionKind::Log]
        );
        assert!(ActionKind::parse_list("tag,shred").is_err());
    }
}
