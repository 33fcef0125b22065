//! Per-object finding history for the repeat window.

use crate::classify::{classify, intrinsic_tier};
use crate::config::Config;
use crate::core::{Finding, ObjectLocator, SeverityTier};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Assessments between automatic prunes of idle objects.
const PRUNE_EVERY: u64 = 1024;

/// Classification of one finding in the context of its object's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    /// Tier from type and hint alone.
    pub intrinsic: SeverityTier,
    /// Tier after confidence and repeat escalation.
    pub classified: SeverityTier,
    /// Tier used for dispatch: `classified` raised to the object's window peak.
    pub effective: SeverityTier,
    /// Occurrences counted inside the window, this finding included.
    pub window_occurrences: u64,
}

#[derive(Debug, Clone)]
struct Observation {
    finding_id: String,
    at: DateTime<Utc>,
    occurrences: u32,
    tier: SeverityTier,
}

/// Severity classifier with a concurrent per-object history.
///
/// A finding id is counted once per object, so redeliveries do not inflate
/// the occurrence count. Objects with no observation inside the window are
/// dropped by [`prune`](Self::prune), which also runs every 1024 assessments.
#[derive(Debug, Clone, Default)]
pub struct SeverityClassifier {
    history: Arc<DashMap<ObjectLocator, Vec<Observation>>>,
    assessed: Arc<AtomicU64>,
}

fn repeat_window(config: &Config) -> chrono::Duration {
    chrono::Duration::from_std(config.severity_thresholds.repeat_window)
        .unwrap_or_else(|_| chrono::Duration::days(1))
}

impl SeverityClassifier {
    /// Creates a classifier with empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `finding` and classifies it against its object's window.
    pub fn assess(&self, finding: &Finding, config: &Config) -> Assessment {
        if self.assessed.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune(Utc::now(), config);
        }

        let window = repeat_window(config);
        let window_start = finding.detected_at - window;

        let mut observations = self
            .history
            .entry(finding.object_locator.clone())
            .or_default();

        let newest = observations
            .iter()
            .map(|o| o.at)
            .chain(std::iter::once(finding.detected_at))
            .max()
            .unwrap_or(finding.detected_at);
        observations.retain(|o| o.at >= newest - window);

        let in_window: Vec<&Observation> = observations
            .iter()
            .filter(|o| o.at >= window_start && o.finding_id != finding.id)
            .collect();

        let window_occurrences = in_window
            .iter()
            .map(|o| u64::from(o.occurrences))
            .sum::<u64>()
            + u64::from(finding.occurrence_count);
        let peak = in_window.iter().map(|o| o.tier).max();

        let intrinsic = intrinsic_tier(finding, config);
        let classified = classify(finding, config, window_occurrences);
        let effective = peak.map_or(classified, |p| p.max(classified));

        let observation = Observation {
            finding_id: finding.id.clone(),
            at: finding.detected_at,
            occurrences: finding.occurrence_count,
            tier: classified,
        };
        match observations.iter_mut().find(|o| o.finding_id == finding.id) {
            Some(existing) => {
                existing.tier = existing.tier.max(classified);
                existing.at = existing.at.max(finding.detected_at);
                existing.occurrences = finding.occurrence_count;
            }
            None => observations.push(observation),
        }

        tracing::debug!(
            finding_id = %finding.id,
            object = %finding.object_locator,
            intrinsic = %intrinsic,
            classified = %classified,
            effective = %effective,
            window_occurrences = window_occurrences,
            "Finding classified"
        );

        Assessment {
            intrinsic,
            classified,
            effective,
            window_occurrences,
        }
    }

    /// Highest tier recorded for `locator`, if any.
    pub fn peak(&self, locator: &ObjectLocator) -> Option<SeverityTier> {
        self.history
            .get(locator)
            .and_then(|obs| obs.iter().map(|o| o.tier).max())
    }

    /// Drops observations older than the window before `now`, and objects
    /// left with none. Returns the number of objects dropped.
    pub fn prune(&self, now: DateTime<Utc>, config: &Config) -> usize {
        let cutoff = now - repeat_window(config);
        let before = self.history.len();
        self.history.retain(|_, observations| {
            observations.retain(|o| o.at >= cutoff);
            !observations.is_empty()
        });
        let dropped = before.saturating_sub(self.history.len());
        if dropped > 0 {
            tracing::debug!(dropped = dropped, "Pruned idle object history");
        }
        dropped
    }

    /// Number of objects with recorded history.
    pub fn tracked_objects(&self) -> usize {
        self.history.len()
    }
}
