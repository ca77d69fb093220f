//! ThreatMesh Evidence Store
//!
//! This crate provides the keyed registry every engine component reads and
//! writes evidence through:
//!
//! - **Upsert**: re-submission of an id merges instead of duplicating
//! - **Lifecycle**: Created → Pending → Verified/Disputed/Undetermined → Enhanced → Actioned
//! - **Single writer per key**: enhancement is serialized by a per-id async lock
//! - **Snapshots**: consistent sorted copies for exporters, and a JSON file
//!   for persistence across restarts
//!
//! The store is constructed explicitly and injected; there is no global
//! instance.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod snapshot;
pub mod store;

pub use snapshot::{StoreSnapshot, SNAPSHOT_VERSION};
pub use store::{EnhancementGuard, EvidenceStore, StoredEvidence, UpsertOutcome};

use std::path::PathBuf;
use thiserror::Error;
use threatmesh_types::{EvidenceStatus, TypesError};

/// Store error types
#[derive(Error, Debug)]
pub enum StoreError {
    /// Id not present
    #[error("Evidence not found: {0}")]
    NotFound(String),

    /// Evidence failed structural validation
    #[error("Invalid evidence: {0}")]
    InvalidEvidence(#[from] TypesError),

    /// Id or evidence hash does not match the payload
    #[error("Evidence hash mismatch for {0}")]
    HashMismatch(String),

    /// Committed record carries a different id than the guard
    #[error("Evidence id mismatch: guard holds {expected}, record is {actual}")]
    IdMismatch {
        /// Guarded id
        expected: String,
        /// Id on the committed record
        actual: String,
    },

    /// Lifecycle step not allowed from the current status
    #[error("Cannot move {id} from {from} to {to}")]
    InvalidTransition {
        /// Evidence id
        id: String,
        /// Current status
        from: EvidenceStatus,
        /// Requested status
        to: EvidenceStatus,
    },

    /// Entry changed outside the enhancement guard since it was read
    #[error("Evidence {0} changed while being enhanced")]
    StaleEntry(String),

    /// Snapshot file IO failed
    #[error("Snapshot IO error at {path}: {source}")]
    Io {
        /// Snapshot file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Snapshot (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot written by an incompatible version
    #[error("Unsupported snapshot version: {0}")]
    UnsupportedSnapshot(u32),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
