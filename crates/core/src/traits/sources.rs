//! Evidence source traits.
//!
//! A [`ThreatFeed`] moves raw bytes from one collaborator; a
//! [`SourceAggregator`] fans out over every configured feed, normalizes what
//! comes back and reports per-source health.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use threatmesh_types::{SourceKind, ThreatEvidence};

/// Errors that can occur while fetching or parsing a feed.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The fetch did not finish within the source's timeout.
    #[error("source {feed} timed out after {timeout_ms}ms")]
    Timeout {
        /// Source name.
        feed: String,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// Reading the feed failed.
    #[error("source {feed} io error: {error}")]
    Io {
        /// Source name.
        feed: String,
        /// Underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The payload did not match the declared format.
    #[error("source {feed} returned malformed payload: {message}")]
    Malformed {
        /// Source name.
        feed: String,
        /// Parse failure description.
        message: String,
    },

    /// No feed transport is registered for a configured source.
    #[error("no feed registered for source {0}")]
    NoFeed(String),

    /// The collaborator is not reachable.
    #[error("source {0} unavailable")]
    Unavailable(String),
}

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Transport for one evidence source.
///
/// Implementations only move bytes; interpreting them is the aggregator's job.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait ThreatFeed: Send + Sync {
    /// Fetch the current feed payload.
    async fn fetch(&self) -> SourceResult<String>;
}

/// Public view of one configured source, as returned by
/// [`SourceAggregator::get_sources_config`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
    /// Source name.
    pub name: String,
    /// Whether the source is fetched.
    pub enabled: bool,
    /// Kind of collaborator.
    pub kind: SourceKind,
    /// Fetch priority; lower first.
    pub priority: u32,
}

/// Health of one source for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    /// Skipped by configuration; no fetch was issued.
    Disabled,
    /// Fetched and parsed.
    Available {
        /// Entries accepted.
        fetched: usize,
        /// Entries dropped for missing or invalid fields.
        dropped: usize,
    },
    /// Fetch exceeded the source timeout.
    TimedOut,
    /// Fetch or parse failed.
    Failed {
        /// Failure description.
        reason: String,
    },
}

impl SourceStatus {
    /// Whether this status counts against the cycle (timeout or failure).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SourceStatus::TimedOut | SourceStatus::Failed { .. })
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceStatus::Disabled => write!(f, "disabled"),
            SourceStatus::Available { fetched, dropped } => {
                write!(f, "available ({fetched} fetched, {dropped} dropped)")
            }
            SourceStatus::TimedOut => write!(f, "timed out"),
            SourceStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Per-source result of an aggregation cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceOutcome {
    /// Source name.
    pub name: String,
    /// Health for this cycle.
    pub status: SourceStatus,
}

/// Result of one aggregation cycle across all sources.
#[derive(Debug, Clone, Default)]
pub struct AggregationReport {
    /// Normalized evidence from every available source, in source priority order.
    pub evidence: Vec<ThreatEvidence>,
    /// One outcome per configured source, in priority order.
    pub sources: Vec<SourceOutcome>,
    /// Total raw entries dropped.
    pub dropped: usize,
    /// Set when at least one enabled source timed out or failed.
    pub degraded: bool,
}

impl AggregationReport {
    /// Names of sources that were unavailable this cycle.
    pub fn unavailable_sources(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|o| o.status.is_unavailable())
            .map(|o| o.name.as_str())
            .collect()
    }
}

/// Pulls evidence from every configured source.
///
/// `fetch_all_sources` is infallible by contract: a failing source degrades
/// the report, it never aborts the cycle.
#[async_trait]
pub trait SourceAggregator: Send + Sync {
    /// Configured sources ordered by ascending priority, ties broken by name.
    fn get_sources_config(&self) -> Vec<SourceDescriptor>;

    /// Fetch and normalize every enabled source.
    async fn fetch_all_sources(&self) -> AggregationReport;
}
