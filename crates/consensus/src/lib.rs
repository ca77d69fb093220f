//! # ThreatMesh Consensus
//!
//! Quorum voting over peer verifiers for individual evidence items.
//!
//! A round asks every configured peer for a boolean verdict with a
//! confidence, waits until the round's vote window closes, and reduces the
//! answers to a [`ConsensusRecord`](threatmesh_types::ConsensusRecord).
//!
//! ## Features
//!
//! - **Bounded rounds**: peers that miss the window are abandoned and listed
//!   as unresponsive
//! - **Isolated tallies**: every round owns its [`VoteTally`]
//! - **Degraded mode**: below quorum the verdict is undetermined, never an error
//! - **Re-rounds**: an undetermined round may be retried with a wider window
//!
//! ## Verdict Rule
//!
//! ```text
//! percentage = |verified_by| / (|verified_by| + |disputed_by|)     (0 if no votes)
//! verdict    = percentage >= consensus_threshold
//!              AND |verified_by| + |disputed_by| >= minimum_quorum
//! confidence = mean(vote support)                                  (quorum met)
//!            = mean(vote support) * votes / minimum_quorum         (below quorum)
//! ```
//!
//! where a verifying vote supports the evidence with its confidence and a
//! disputing vote with `1 - confidence`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use threatmesh_consensus::{HeuristicVerifier, QuorumConsensus};
//!
//! let verifiers = config
//!     .consensus
//!     .enabled_peers()
//!     .map(|peer| Arc::new(HeuristicVerifier::from_peer(peer)) as Arc<dyn PeerVerifier>)
//!     .collect();
//! let engine = QuorumConsensus::new(&config.consensus, store.clone(), verifiers);
//!
//! let record = engine.check_consensus(&evidence.id).await?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod engine;
pub mod heuristic;
pub mod mock;
pub mod tally;
pub mod window;

pub use engine::QuorumConsensus;
pub use heuristic::{HeuristicVerifier, VERIFY_THRESHOLD};
pub use mock::{MockConsensusEngine, MockPeerVerifier};
pub use tally::{QuorumRule, VoteTally};
pub use window::VoteWindow;

pub use threatmesh_core::{
    ConsensusEngine, ConsensusError, ConsensusResult, PeerVerifier, VerifierError,
    VerifierResult,
};
