//! # ThreatMesh Credibility
//!
//! Blends three independent signals into one credibility score per
//! evidence item:
//!
//! - **Local detection**: the reporting source's initial confidence
//! - **Upstream correlation**: a hit from an independent trusted feed
//! - **Consensus**: the confidence of the peer quorum vote
//!
//! ## Scoring Formula
//!
//! ```text
//! correlated:    score = 0.2 × initial + 0.5 × upstream + 0.3 × consensus
//! uncorrelated:  score = 0.3 × initial + 0.7 × consensus
//! ```
//!
//! Weights are configurable; each branch must sum to 1.0. Inputs outside
//! [0, 1] are rejected rather than clamped.
//!
//! ## Example
//!
//! ```rust,ignore
//! use threatmesh_credibility::{correlate_upstream, CredibilityEngine, WeightedCredibility};
//!
//! let upstream: Vec<_> = report.evidence.iter().filter(|e| e.origin.is_upstream()).cloned().collect();
//! correlate_upstream(&mut report.evidence, &upstream);
//!
//! let engine = WeightedCredibility::new(&config.credibility)?;
//! let enhanced = engine.enhance_threat_evidence(&evidence, &record)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod correlate;
pub mod engine;
pub mod mock;

pub use correlate::{correlate_upstream, UpstreamIndex};
pub use engine::WeightedCredibility;
pub use mock::MockCredibilityEngine;

pub use threatmesh_core::{CredibilityEngine, CredibilityError, CredibilityResult};
