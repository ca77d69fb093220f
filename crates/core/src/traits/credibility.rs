//! Credibility scoring traits.

use thiserror::Error;
use threatmesh_types::{ConsensusRecord, ThreatEvidence};

/// Errors that can occur while scoring evidence.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CredibilityError {
    /// A scoring input was outside [0, 1] or not a finite number.
    #[error("invalid input {field}: {value} is not within [0, 1]")]
    InvalidInput {
        /// Offending input.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },

    /// A weight branch does not sum to 1.0.
    #[error("invalid {branch} weights: sum is {sum}, expected 1.0")]
    InvalidWeights {
        /// Weight branch.
        branch: &'static str,
        /// Actual sum.
        sum: f64,
    },

    /// The consensus record belongs to different evidence.
    #[error("consensus record for {record} applied to evidence {evidence}")]
    RecordMismatch {
        /// Evidence id being enhanced.
        evidence: String,
        /// Evidence id on the record.
        record: String,
    },
}

/// Result type for credibility operations.
pub type CredibilityResult<T> = Result<T, CredibilityError>;

/// Blends detection, upstream and consensus confidence into one score.
///
/// Implementations are pure with respect to their inputs: neither method
/// mutates the evidence it is given.
pub trait CredibilityEngine: Send + Sync {
    /// Score `evidence` given the consensus confidence. Result is in [0, 1].
    fn calculate_credibility_score(
        &self,
        evidence: &ThreatEvidence,
        consensus_confidence: f64,
    ) -> CredibilityResult<f64>;

    /// Return a copy of `evidence` with `credibility_score` and
    /// `consensus_verified` populated from `consensus`.
    fn enhance_threat_evidence(
        &self,
        evidence: &ThreatEvidence,
        consensus: &ConsensusRecord,
    ) -> CredibilityResult<ThreatEvidence>;
}
