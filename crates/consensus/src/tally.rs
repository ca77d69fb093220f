//! Vote collection and quorum detection for a single evidence item.
//!
//! A [`VoteTally`] belongs to exactly one (evidence id, round) pair and is
//! owned by the task running that round, so rounds for different evidence
//! never share tally state.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use tracing::{debug, trace};

use threatmesh_core::{ConsensusError, ConsensusResult};
use threatmesh_types::{
    consensus_percentage, ConsensusOutcome, ConsensusRecord, PeerVote,
};

/// Quorum rule applied when a tally is closed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuorumRule {
    /// Minimum share of verifying votes for a positive verdict
    pub threshold: f64,
    /// Minimum number of votes for a final result
    pub minimum_quorum: usize,
}

impl QuorumRule {
    /// Whether `percentage` over `votes` votes yields a positive verdict.
    ///
    /// Both comparisons are inclusive.
    pub fn verdict(&self, percentage: f64, votes: usize) -> bool {
        votes >= self.minimum_quorum && percentage >= self.threshold
    }
}

/// Votes collected for one evidence item in one round.
#[derive(Debug, Clone)]
pub struct VoteTally {
    evidence_id: String,
    round: u32,
    votes: HashMap<String, PeerVote>,
    verified_by: BTreeSet<String>,
    disputed_by: BTreeSet<String>,
    support_sum: f64,
}

impl VoteTally {
    /// Create an empty tally.
    pub fn new(evidence_id: impl Into<String>, round: u32) -> Self {
        Self {
            evidence_id: evidence_id.into(),
            round,
            votes: HashMap::new(),
            verified_by: BTreeSet::new(),
            disputed_by: BTreeSet::new(),
            support_sum: 0.0,
        }
    }

    /// Evidence this tally is for
    pub fn evidence_id(&self) -> &str {
        &self.evidence_id
    }

    /// Round number
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Add a vote.
    ///
    /// Returns `Ok(true)` if this vote completes the quorum, `Ok(false)` if
    /// it was counted without reaching it, or an error for a repeated voter
    /// or a confidence outside [0, 1].
    pub fn add_vote(&mut self, vote: PeerVote, minimum_quorum: usize) -> ConsensusResult<bool> {
        if self.votes.contains_key(&vote.node_id) {
            return Err(ConsensusError::DuplicateVote(vote.node_id));
        }
        if !vote.confidence.is_finite() || !(0.0..=1.0).contains(&vote.confidence) {
            return Err(ConsensusError::InvalidVote {
                node: vote.node_id,
                confidence: vote.confidence,
            });
        }

        trace!(
            evidence = %self.evidence_id,
            round = self.round,
            node = %vote.node_id,
            verdict = vote.verdict,
            confidence = vote.confidence,
            "Adding vote"
        );

        if vote.verdict {
            self.verified_by.insert(vote.node_id.clone());
        } else {
            self.disputed_by.insert(vote.node_id.clone());
        }
        self.support_sum += vote.support();
        self.votes.insert(vote.node_id.clone(), vote);

        let reached = self.vote_count() == minimum_quorum;
        if reached {
            debug!(
                evidence = %self.evidence_id,
                round = self.round,
                votes = self.vote_count(),
                "Quorum reached"
            );
        }
        Ok(reached)
    }

    /// Number of votes counted
    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    /// Whether `node_id` has voted
    pub fn has_voted(&self, node_id: &str) -> bool {
        self.votes.contains_key(node_id)
    }

    /// Vote cast by `node_id`
    pub fn get_vote(&self, node_id: &str) -> Option<&PeerVote> {
        self.votes.get(node_id)
    }

    /// Nodes that verified
    pub fn verified_by(&self) -> &BTreeSet<String> {
        &self.verified_by
    }

    /// Nodes that disputed
    pub fn disputed_by(&self) -> &BTreeSet<String> {
        &self.disputed_by
    }

    /// Share of votes that verified, 0 when empty.
    pub fn consensus_percentage(&self) -> f64 {
        consensus_percentage(self.verified_by.len(), self.disputed_by.len())
    }

    /// Mean support across votes, 0 when empty.
    pub fn mean_support(&self) -> f64 {
        if self.votes.is_empty() {
            0.0
        } else {
            self.support_sum / self.votes.len() as f64
        }
    }

    /// Whether at least `minimum_quorum` votes were counted.
    pub fn has_quorum(&self, minimum_quorum: usize) -> bool {
        self.vote_count() >= minimum_quorum
    }

    /// Close the tally and produce its record.
    ///
    /// Below quorum the verdict is negative, the outcome undetermined, and
    /// the confidence is scaled by `votes / minimum_quorum`.
    pub fn finalize(
        self,
        rule: QuorumRule,
        expected_participants: usize,
        unresponsive: BTreeSet<String>,
    ) -> ConsensusRecord {
        let votes = self.vote_count();
        let percentage = self.consensus_percentage();
        let mean = self.mean_support();
        let quorum = self.has_quorum(rule.minimum_quorum);

        let (verdict, outcome, confidence) = if quorum {
            let verdict = rule.verdict(percentage, votes);
            let outcome = if verdict {
                ConsensusOutcome::Verified
            } else {
                ConsensusOutcome::Disputed
            };
            (verdict, outcome, mean)
        } else {
            let scale = votes as f64 / rule.minimum_quorum.max(1) as f64;
            (false, ConsensusOutcome::Undetermined, mean * scale)
        };

        ConsensusRecord {
            evidence_id: self.evidence_id,
            verdict,
            confidence_score: confidence.clamp(0.0, 1.0),
            consensus_percentage: percentage,
            verified_by: self.verified_by,
            disputed_by: self.disputed_by,
            outcome,
            degraded: !quorum,
            expected_participants,
            unresponsive,
            round: self.round,
            completed_at: Utc::now(),
        }
    }
}
