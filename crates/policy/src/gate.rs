//! Threshold policy gate.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::trace;

use threatmesh_config::{Config, PolicyConfig};
use threatmesh_types::{Action, Decision, ThreatEvidence};

/// Maps enhanced evidence to an enforcement action.
///
/// The action depends only on the evidence's credibility score, its origin
/// source and the gate's configuration:
///
/// | Condition                                  | Action    |
/// |--------------------------------------------|-----------|
/// | origin source excluded by policy           | `Ignore`  |
/// | `credibility_score >= credibility_threshold` | `Block`   |
/// | otherwise                                  | `Monitor` |
#[derive(Debug, Clone)]
pub struct PolicyGate {
    credibility_threshold: f64,
    excluded_sources: BTreeSet<String>,
}

impl Default for PolicyGate {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

impl PolicyGate {
    /// Create a gate excluding the configured ignored sources.
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            credibility_threshold: config.credibility_threshold,
            excluded_sources: config.ignored_sources.iter().cloned().collect(),
        }
    }

    /// Create a gate that also excludes every disabled source.
    pub fn from_config(config: &Config) -> Self {
        Self {
            credibility_threshold: config.policy.credibility_threshold,
            excluded_sources: config.policy_exclusions(),
        }
    }

    /// Block threshold
    pub fn threshold(&self) -> f64 {
        self.credibility_threshold
    }

    /// Whether evidence from `source` is excluded.
    pub fn is_excluded(&self, source: &str) -> bool {
        self.excluded_sources.contains(source)
    }

    /// Action for `evidence`.
    pub fn action_for(&self, evidence: &ThreatEvidence) -> Action {
        if self.is_excluded(&evidence.origin.source) {
            Action::Ignore
        } else if evidence.credibility_score >= self.credibility_threshold {
            Action::Block
        } else {
            Action::Monitor
        }
    }

    /// Decide what to do with `evidence`.
    pub fn decide(&self, evidence: &ThreatEvidence) -> Decision {
        let action = self.action_for(evidence);
        trace!(
            evidence = %evidence.id,
            source = %evidence.origin.source,
            score = evidence.credibility_score,
            %action,
            "Policy decision"
        );
        Decision {
            evidence_id: evidence.id.clone(),
            source_ip: evidence.source_ip.clone(),
            action,
            credibility_score: evidence.credibility_score,
            consensus_verified: evidence.consensus_verified,
            decided_at: Utc::now(),
        }
    }
}
