//! Consensus vote and record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A single peer's answer for one evidence item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerVote {
    /// Voting node
    pub node_id: String,
    /// `true` verifies the evidence, `false` disputes it
    pub verdict: bool,
    /// Voter's confidence in its verdict, in [0, 1]
    pub confidence: f64,
}

impl PeerVote {
    /// Create a vote.
    pub fn new(node_id: impl Into<String>, verdict: bool, confidence: f64) -> Self {
        Self {
            node_id: node_id.into(),
            verdict,
            confidence,
        }
    }

    /// Support this vote lends to the evidence being genuine.
    pub fn support(&self) -> f64 {
        if self.verdict {
            self.confidence
        } else {
            1.0 - self.confidence
        }
    }
}

/// Result class of a consensus round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusOutcome {
    /// Quorum met and threshold reached
    Verified,
    /// Quorum met, threshold not reached
    Disputed,
    /// Quorum not met
    Undetermined,
}

impl fmt::Display for ConsensusOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusOutcome::Verified => write!(f, "verified"),
            ConsensusOutcome::Disputed => write!(f, "disputed"),
            ConsensusOutcome::Undetermined => write!(f, "undetermined"),
        }
    }
}

/// `|verified| / (|verified| + |disputed|)`, 0 when nobody voted.
pub fn consensus_percentage(verified: usize, disputed: usize) -> f64 {
    let total = verified + disputed;
    if total == 0 {
        0.0
    } else {
        verified as f64 / total as f64
    }
}

/// Outcome of a quorum vote on one evidence item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusRecord {
    /// Evidence the vote was about
    pub evidence_id: String,
    /// Whether the evidence is considered verified
    pub verdict: bool,
    /// Mean support across votes, scaled down below quorum
    pub confidence_score: f64,
    /// Share of votes that verified
    pub consensus_percentage: f64,
    /// Nodes that verified
    pub verified_by: BTreeSet<String>,
    /// Nodes that disputed
    pub disputed_by: BTreeSet<String>,
    /// Result class
    pub outcome: ConsensusOutcome,
    /// Set when fewer than the quorum answered
    pub degraded: bool,
    /// Number of peers asked
    pub expected_participants: usize,
    /// Peers that missed the deadline or failed
    pub unresponsive: BTreeSet<String>,
    /// 0-based round that produced this record
    pub round: u32,
    /// When the round closed
    pub completed_at: DateTime<Utc>,
}

impl ConsensusRecord {
    /// Number of votes counted.
    pub fn total_votes(&self) -> usize {
        self.verified_by.len() + self.disputed_by.len()
    }

    /// Whether the record is final, i.e. quorum was met.
    pub fn is_final(&self) -> bool {
        !self.degraded
    }

    /// Whether the vote sets and derived fields agree with each other.
    pub fn is_consistent(&self) -> bool {
        let disjoint = self.verified_by.is_disjoint(&self.disputed_by);
        let expected = consensus_percentage(self.verified_by.len(), self.disputed_by.len());
        disjoint && (self.consensus_percentage - expected).abs() < 1e-9
    }
}
