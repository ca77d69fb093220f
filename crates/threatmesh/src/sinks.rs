//! Decision sinks.
//!
//! A sink hands the outcome of a cycle to a downstream collaborator. The
//! node ships three file sinks; anything that talks to a live platform is an
//! implementation of [`DecisionSink`] outside this crate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use threatmesh_policy::{enforcement_entries, render_blocklist};
use threatmesh_store::{EvidenceStore, StoredEvidence};
use threatmesh_types::{Action, Decision, EvidenceStatus, PlatformRecord, ThreatEvidence, ThreatLevel};

/// Errors a sink can report.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing the output failed.
    #[error("Sink IO error at {path}: {source}")]
    Io {
        /// Output path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Encoding the output failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// An evidence item that went through the policy gate this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionedEvidence {
    /// Gate output
    pub decision: Decision,
    /// Enhanced evidence the decision was made on
    pub evidence: ThreatEvidence,
}

/// Receives the actioned evidence of each cycle.
#[async_trait]
pub trait DecisionSink: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Publish one cycle's batch. Returns the number of records written.
    async fn publish(&self, batch: &[ActionedEvidence]) -> SinkResult<usize>;
}

/// Rewrites the plain-text blocklist from every blocked entry in the store.
pub struct BlocklistSink {
    path: PathBuf,
    min_level: ThreatLevel,
    store: Arc<EvidenceStore>,
}

impl BlocklistSink {
    /// Blocklist at `path` listing blocked evidence at or above `min_level`.
    pub fn new(path: impl Into<PathBuf>, min_level: ThreatLevel, store: Arc<EvidenceStore>) -> Self {
        Self {
            path: path.into(),
            min_level,
            store,
        }
    }
}

#[async_trait]
impl DecisionSink for BlocklistSink {
    fn name(&self) -> &str {
        "blocklist"
    }

    async fn publish(&self, _batch: &[ActionedEvidence]) -> SinkResult<usize> {
        let blocked: Vec<ThreatEvidence> = self
            .store
            .snapshot()
            .into_iter()
            .filter(|stored| last_action(stored) == Some(Action::Block))
            .map(|stored| stored.evidence)
            .collect();

        let text = render_blocklist(&blocked, self.min_level, Utc::now());
        let lines = text
            .lines()
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .count();
        write_file(&self.path, text.as_bytes()).await?;

        debug!(path = ?self.path, lines, "Blocklist written");
        Ok(lines)
    }
}

/// Appends `{ip, credibility_score}` lines for each cycle's enforceable decisions.
pub struct EnforcementSink {
    path: PathBuf,
}

impl EnforcementSink {
    /// JSON-lines log at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DecisionSink for EnforcementSink {
    fn name(&self) -> &str {
        "enforcement"
    }

    async fn publish(&self, batch: &[ActionedEvidence]) -> SinkResult<usize> {
        let decisions: Vec<Decision> = batch.iter().map(|item| item.decision.clone()).collect();
        let entries = enforcement_entries(&decisions);
        if entries.is_empty() {
            return Ok(0);
        }

        let mut buf = Vec::new();
        for entry in &entries {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }

        ensure_parent(&self.path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| io_error(&self.path, source))?;
        file.write_all(&buf)
            .await
            .map_err(|source| io_error(&self.path, source))?;
        file.flush()
            .await
            .map_err(|source| io_error(&self.path, source))?;

        debug!(path = ?self.path, entries = entries.len(), "Enforcement entries appended");
        Ok(entries.len())
    }
}

/// Rewrites a JSON array of platform records for every actioned entry.
pub struct PlatformSink {
    path: PathBuf,
    store: Arc<EvidenceStore>,
}

impl PlatformSink {
    /// Platform export at `path`.
    pub fn new(path: impl Into<PathBuf>, store: Arc<EvidenceStore>) -> Self {
        Self {
            path: path.into(),
            store,
        }
    }
}

#[async_trait]
impl DecisionSink for PlatformSink {
    fn name(&self) -> &str {
        "platform"
    }

    async fn publish(&self, _batch: &[ActionedEvidence]) -> SinkResult<usize> {
        let records: Vec<PlatformRecord> = self
            .store
            .snapshot()
            .iter()
            .filter(|stored| stored.status == EvidenceStatus::Actioned)
            .map(|stored| PlatformRecord::from(&stored.evidence))
            .collect();

        let json = serde_json::to_vec_pretty(&records)?;
        write_file(&self.path, &json).await?;

        debug!(path = ?self.path, records = records.len(), "Platform records written");
        Ok(records.len())
    }
}

fn last_action(stored: &StoredEvidence) -> Option<Action> {
    stored.history.last().map(|record| record.decision.action)
}

fn io_error(path: &Path, source: std::io::Error) -> SinkError {
    SinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

async fn ensure_parent(path: &Path) -> SinkResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| io_error(parent, source)),
        _ => Ok(()),
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> SinkResult<()> {
    ensure_parent(path).await?;
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| io_error(path, source))
}
