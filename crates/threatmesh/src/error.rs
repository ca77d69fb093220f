//! Node error types.

use thiserror::Error;

use threatmesh_config::ConfigError;
use threatmesh_core::{ConsensusError, CredibilityError};
use threatmesh_store::StoreError;

use crate::sinks::SinkError;

/// Errors raised while building or running a node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Invalid or unreadable configuration.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Opening or persisting the evidence store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Credibility weights were rejected.
    #[error("Credibility error: {0}")]
    Credibility(#[from] CredibilityError),

    /// A decision sink failed.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

/// Why a single evidence item did not make it through a cycle.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The consensus round failed.
    #[error("consensus: {0}")]
    Consensus(#[from] ConsensusError),

    /// A store transition was rejected.
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// Scoring rejected its inputs.
    #[error("credibility: {0}")]
    Credibility(#[from] CredibilityError),

    /// The entry lost its consensus record before it could be scored.
    #[error("no consensus recorded for {0}")]
    MissingConsensus(String),

    /// The evaluation task panicked or was cancelled.
    #[error("task aborted: {0}")]
    Aborted(String),
}
