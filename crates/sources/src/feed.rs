//! Feed transports.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::trace;

use threatmesh_core::{SourceError, SourceResult, ThreatFeed};

/// Reads a feed from a local file.
///
/// Collectors that drop feed snapshots on disk (cron'd downloads, sensor
/// exports) are consumed through this transport.
#[derive(Debug, Clone)]
pub struct FileFeed {
    name: String,
    path: PathBuf,
}

impl FileFeed {
    /// Create a file feed for source `name`.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// File the feed reads.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl ThreatFeed for FileFeed {
    async fn fetch(&self) -> SourceResult<String> {
        trace!(source = %self.name, path = ?self.path, "Reading feed file");
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|error| SourceError::Io {
                feed: self.name.clone(),
                error,
            })
    }
}
