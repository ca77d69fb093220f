//! Peer voting and consensus traits.

use async_trait::async_trait;
use thiserror::Error;
use threatmesh_types::{ConsensusRecord, PeerVote, ThreatEvidence};

/// Errors a peer verifier can return for a single vote request.
#[derive(Error, Debug, Clone)]
pub enum VerifierError {
    /// The peer could not be reached.
    #[error("peer {0} unreachable")]
    Unreachable(String),

    /// The peer declined to vote on this evidence.
    #[error("peer {node} declined: {reason}")]
    Declined {
        /// Peer node id.
        node: String,
        /// Reason given.
        reason: String,
    },
}

/// Result type for peer vote requests.
pub type VerifierResult<T> = Result<T, VerifierError>;

/// Errors that can occur while running a consensus round.
#[derive(Error, Debug)]
pub enum ConsensusError {
    /// The evidence id is not in the store.
    #[error("evidence not found: {0}")]
    EvidenceNotFound(String),

    /// A node voted twice in the same round.
    #[error("duplicate vote from {0}")]
    DuplicateVote(String),

    /// A vote carried a confidence outside [0, 1].
    #[error("invalid vote confidence from {node}: {confidence}")]
    InvalidVote {
        /// Voting node.
        node: String,
        /// Rejected confidence.
        confidence: f64,
    },

    /// Reading or writing the store failed.
    #[error("store error: {0}")]
    Store(String),
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// A peer node that can vote on evidence.
///
/// Transport to the peer is the implementation's concern; the engine only
/// sees the vote or an error.
#[async_trait]
pub trait PeerVerifier: Send + Sync {
    /// Identifier of the voting node.
    fn node_id(&self) -> &str;

    /// Ask the peer for its verdict on `evidence`.
    async fn vote(&self, evidence: &ThreatEvidence) -> VerifierResult<PeerVote>;
}

/// Runs quorum votes on stored evidence.
#[async_trait]
pub trait ConsensusEngine: Send + Sync {
    /// Run a consensus round for `evidence_id` and record the outcome.
    ///
    /// Falling short of quorum is not an error: the record comes back
    /// undetermined and flagged degraded.
    async fn check_consensus(&self, evidence_id: &str) -> ConsensusResult<ConsensusRecord>;
}
