//! Core traits for the ThreatMesh engine.
//!
//! This module defines abstract traits that allow different implementations
//! to be swapped in for evidence sources, peer voting, and scoring.
//!
//! # Architecture
//!
//! The traits are organized into three categories:
//!
//! - **Sources**: feed transport and aggregation
//! - **Consensus**: peer verifiers and the quorum engine
//! - **Credibility**: score computation and evidence enhancement
//!
//! # Usage
//!
//! Other crates depend on these traits rather than concrete implementations,
//! enabling flexibility and testability.
//!
//! ```ignore
//! use threatmesh_core::traits::{SourceAggregator, ConsensusEngine};
//!
//! async fn cycle<A: SourceAggregator, C: ConsensusEngine>(sources: &A, consensus: &C) {
//!     let report = sources.fetch_all_sources().await;
//!     for evidence in &report.evidence {
//!         let _ = consensus.check_consensus(&evidence.id).await;
//!     }
//! }
//! ```

mod consensus;
mod credibility;
mod sources;

pub use consensus::*;
pub use credibility::*;
pub use sources::*;
