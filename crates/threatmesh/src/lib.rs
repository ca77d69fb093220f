//! # ThreatMesh
//!
//! ThreatMesh is a decentralized threat-intelligence engine: it pulls alerts
//! from local sensors and trusted feeds, has peer nodes vote on each one,
//! blends local, upstream and consensus confidence into a credibility score
//! and turns the score into an enforcement decision.
//!
//! This crate provides the node binary and the [`Pipeline`] that wires the
//! component crates together. It can also be used as a library to embed a
//! node or to drive cycles with custom components.
//!
//! ## Components
//!
//! - [`Pipeline`] - one cycle of aggregate, verify, score, decide and export
//! - [`DecisionSink`] - where decisions go: [`BlocklistSink`],
//!   [`EnforcementSink`] and [`PlatformSink`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use threatmesh::Pipeline;
//! use threatmesh_config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Path::new("threatmesh.toml"))?;
//!     let pipeline = Pipeline::from_config(&config)?;
//!
//!     let report = pipeline.run_cycle().await;
//!     println!("{} decisions", report.decisions.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod error;
pub mod pipeline;
pub mod sinks;

// Re-export main types at crate root
pub use error::{ItemError, NodeError, Result};
pub use pipeline::{CycleReport, Pipeline};
pub use sinks::{
    ActionedEvidence, BlocklistSink, DecisionSink, EnforcementSink, PlatformSink, SinkError,
    SinkResult,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "threatmesh.toml";

/// Prelude for embedding a node
pub mod prelude {
    pub use crate::{CycleReport, DecisionSink, Pipeline};
    pub use threatmesh_config::Config;
    pub use threatmesh_core::{ConsensusEngine, CredibilityEngine, SourceAggregator};
    pub use threatmesh_policy::PolicyGate;
    pub use threatmesh_store::EvidenceStore;
    pub use threatmesh_types::{Action, Decision, ThreatEvidence, ThreatLevel, ThreatType};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_config_file() {
        assert_eq!(DEFAULT_CONFIG_FILE, "threatmesh.toml");
    }
}
