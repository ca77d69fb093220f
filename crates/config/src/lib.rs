//! # ThreatMesh Configuration
//!
//! This crate provides configuration parsing and validation for the ThreatMesh engine.
//!
//! ThreatMesh uses a single-config philosophy: node identity, consensus
//! parameters, scoring weights, policy thresholds and the source list all live
//! in one `threatmesh.toml` file, validated as a whole on load.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use threatmesh_config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("threatmesh.toml"))?;
//!
//! println!("Node: {}", config.node.node_id);
//! println!("Quorum: {}", config.consensus.minimum_quorum);
//! ```
//!
//! ## Configuration Sections
//!
//! - `[node]` - Node identity (node_id, region, compliance tag)
//! - `[consensus]` - Quorum, threshold and vote window parameters
//! - `[[consensus.peers]]` - Peer verifier nodes
//! - `[credibility]` - Scoring weights and threat-level adjustment
//! - `[policy]` - Block threshold and excluded sources
//! - `[[sources]]` - Evidence sources (feeds and local sensors)
//! - `[store]` - Evidence store snapshot location
//! - `[export]` - Decision sink outputs
//! - `[pipeline]` - Cycle interval and parallelism
//! - `[logging]` - Logging settings (level, format)

mod config;
mod error;

pub use config::*;
pub use error::*;
