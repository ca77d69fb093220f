//! Store snapshot file
//!
//! The whole store is written as one JSON document. Writes go to a sibling
//! temporary file that is renamed over the target, so a crash mid-write
//! leaves the previous snapshot intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::store::StoredEvidence;
use crate::{Result, StoreError};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized form of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Format version
    pub version: u32,
    /// When the snapshot was taken
    pub saved_at: DateTime<Utc>,
    /// Entries sorted by id
    pub entries: Vec<StoredEvidence>,
}

impl StoreSnapshot {
    /// Create a snapshot of the given entries.
    pub fn new(entries: Vec<StoredEvidence>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            entries,
        }
    }

    /// Write the snapshot to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let data = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;

        info!(path = ?path, entries = self.entries.len(), "Store snapshot written");
        Ok(())
    }

    /// Read a snapshot from `path`.
    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: StoreSnapshot = serde_json::from_slice(&data)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::UnsupportedSnapshot(snapshot.version));
        }

        debug!(path = ?path, entries = snapshot.entries.len(), "Store snapshot read");
        Ok(snapshot)
    }
}
