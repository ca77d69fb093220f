//! # ThreatMesh Types
//!
//! Core type definitions for the ThreatMesh threat-intelligence engine.
//!
//! This crate provides the data model every other crate exchanges:
//! - [`ThreatEvidence`] and [`EvidenceDraft`] - validated and raw evidence
//! - [`ThreatType`] and [`ThreatLevel`] - classification with total severity order
//! - [`ConsensusRecord`] - outcome of a quorum vote
//! - [`Decision`] and [`ActionRecord`] - policy output and exported history
//! - [`CanonicalRecord`] and [`PlatformRecord`] - the downstream wire schema
//!
//! ## Example
//!
//! ```rust
//! use threatmesh_types::{EvidenceOrigin, SourceKind, ThreatEvidence, ThreatLevel, ThreatType};
//!
//! let origin = EvidenceOrigin::new("netflow", SourceKind::LocalSensor);
//! let evidence = ThreatEvidence::new("203.0.113.42", ThreatType::DDoS, ThreatLevel::Critical, origin)
//!     .with_initial_score(0.6);
//!
//! assert!(evidence.validate().is_ok());
//! assert!(ThreatLevel::Critical > ThreatLevel::Warning);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod consensus;
pub mod decision;
pub mod evidence;
pub mod hash;
pub mod schema;
pub mod threat;

// Re-export main types at crate root
pub use consensus::{consensus_percentage, ConsensusOutcome, ConsensusRecord, PeerVote};
pub use decision::{Action, ActionRecord, Decision, EnforcementEntry};
pub use evidence::{
    check_unit, EvidenceDraft, EvidenceOrigin, EvidenceStatus, SourceKind, ThreatEvidence,
    UpstreamCorrelation, GLOBAL_TARGET,
};
pub use hash::EvidenceHash;
pub use schema::{CanonicalRecord, PlatformRecord};
pub use threat::{ThreatLevel, ThreatType};

/// Result type alias for ThreatMesh type operations
pub type Result<T> = std::result::Result<T, TypesError>;

/// Errors that can occur when building or parsing ThreatMesh types
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid hash format
    #[error("invalid hash format: {0}")]
    InvalidHash(String),

    /// Unrecognized threat type name
    #[error("unknown threat type: {0}")]
    UnknownThreatType(String),

    /// Unrecognized threat level name
    #[error("unknown threat level: {0}")]
    UnknownThreatLevel(String),

    /// A required evidence field was absent or blank
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Address did not parse as IPv4 or IPv6
    #[error("invalid ip address: {0}")]
    InvalidIp(String),

    /// Numeric field outside [0, 1] or not finite
    #[error("{field} out of range [0, 1]: {value}")]
    OutOfRange {
        /// Offending field
        field: &'static str,
        /// Rejected value
        value: f64,
    },
}
