//! Policy decisions and the records exported to enforcement collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::threat::{ThreatLevel, ThreatType};

/// Recommended action for a piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Enforce (e.g. firewall drop)
    Block,
    /// Keep watching, do not enforce
    Monitor,
    /// Excluded by policy
    Ignore,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Block => write!(f, "block"),
            Action::Monitor => write!(f, "monitor"),
            Action::Ignore => write!(f, "ignore"),
        }
    }
}

/// PolicyGate output for one evidence item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Evidence the decision applies to
    pub evidence_id: String,
    /// Address to act on
    pub source_ip: String,
    /// Recommended action
    pub action: Action,
    /// Score the decision was based on
    pub credibility_score: f64,
    /// Consensus verdict at decision time
    pub consensus_verified: bool,
    /// Decision time
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    /// Whether the decision should reach enforcement collaborators.
    pub fn is_enforceable(&self) -> bool {
        self.action != Action::Ignore
    }
}

/// Immutable history entry written once a decision is exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// The exported decision
    pub decision: Decision,
    /// Threat severity at export
    pub threat_level: ThreatLevel,
    /// Threat category at export
    pub threat_type: ThreatType,
    /// Export time
    pub actioned_at: DateTime<Utc>,
}

/// The only shape the enforcement collaborator receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnforcementEntry {
    /// Address to enforce against
    pub ip: String,
    /// Score for the collaborator's own threshold
    pub credibility_score: f64,
}
