//! # ThreatMesh - Core Abstractions
//!
//! This crate provides the capability traits the ThreatMesh engine is wired
//! from. It defines interfaces for:
//!
//! - **Sources**: pulling raw alerts from feeds and normalizing them
//! - **Consensus**: collecting peer votes and reaching a quorum verdict
//! - **Credibility**: blending local, upstream and consensus confidence
//!
//! # Design Philosophy
//!
//! 1. **Trait-based abstractions**: every engine component is a trait with one
//!    production implementation and one deterministic mock, wired by explicit
//!    dependency injection.
//!
//! 2. **Minimal dependencies**: only the shared types and `async-trait`.
//!
//! 3. **Thread safety**: all traits require `Send + Sync` so implementations
//!    can sit behind an `Arc` shared by concurrent evidence rounds.
//!
//! # Swappable Components
//!
//! | Component | Trait | Default Impl | Test Double |
//! |-----------|-------|--------------|-------------|
//! | Aggregation | `SourceAggregator` | `FeedAggregator` | `MockSourceAggregator` |
//! | Feed transport | `ThreatFeed` | `FileFeed` | `MockFeed` |
//! | Peer vote | `PeerVerifier` | `HeuristicVerifier` | `MockPeerVerifier` |
//! | Consensus | `ConsensusEngine` | `QuorumConsensus` | `MockConsensusEngine` |
//! | Scoring | `CredibilityEngine` | `WeightedCredibility` | `MockCredibilityEngine` |
//!
//! # Example
//!
//! ```ignore
//! use threatmesh_core::traits::{ConsensusEngine, CredibilityEngine};
//!
//! async fn score<C, E>(consensus: &C, credibility: &E, evidence: &ThreatEvidence)
//! where
//!     C: ConsensusEngine,
//!     E: CredibilityEngine,
//! {
//!     let record = consensus.check_consensus(&evidence.id).await?;
//!     let enhanced = credibility.enhance_threat_evidence(evidence, &record)?;
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod traits;

// Re-export commonly used types
pub use traits::{
    // Consensus
    ConsensusEngine, ConsensusError, ConsensusResult, PeerVerifier, VerifierError,
    VerifierResult,
    // Credibility
    CredibilityEngine, CredibilityError, CredibilityResult,
    // Sources
    AggregationReport, SourceAggregator, SourceDescriptor, SourceError, SourceOutcome,
    SourceResult, SourceStatus, ThreatFeed,
};
