//! Concurrent, degradation-tolerant source aggregation.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use threatmesh_config::{Config, NodeConfig, SourceConfig};
use threatmesh_core::{
    AggregationReport, SourceAggregator, SourceDescriptor, SourceError, SourceOutcome,
    SourceStatus, ThreatFeed,
};
use threatmesh_types::ThreatEvidence;

use crate::feed::FileFeed;
use crate::normalize::normalize;

struct RegisteredSource {
    config: SourceConfig,
    feed: Option<Arc<dyn ThreatFeed>>,
}

/// Production [`SourceAggregator`].
///
/// Every enabled source is fetched concurrently under its own timeout. A
/// source that times out, fails, or returns an unreadable payload is marked
/// unavailable for the cycle and the report is flagged degraded; the rest of
/// the sources are unaffected.
pub struct FeedAggregator {
    node: NodeConfig,
    sources: Vec<RegisteredSource>,
}

impl FeedAggregator {
    /// Create an aggregator with no sources.
    pub fn new(node: NodeConfig) -> Self {
        Self {
            node,
            sources: Vec::new(),
        }
    }

    /// Build an aggregator with a [`FileFeed`] for every configured source
    /// that has a path.
    pub fn from_config(config: &Config) -> Self {
        let mut aggregator = Self::new(config.node.clone());
        for source in &config.sources {
            let feed = source
                .path
                .as_ref()
                .map(|path| Arc::new(FileFeed::new(source.name.clone(), path.clone())) as Arc<dyn ThreatFeed>);
            aggregator.insert(source.clone(), feed);
        }
        aggregator
    }

    /// Register a source with its transport, replacing any source of the same name.
    pub fn register(&mut self, config: SourceConfig, feed: Arc<dyn ThreatFeed>) {
        self.insert(config, Some(feed));
    }

    /// Enable or disable a source by name. Returns false if no such source exists.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.sources.iter_mut().find(|s| s.config.name == name) {
            Some(source) => {
                source.config.enabled = enabled;
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, config: SourceConfig, feed: Option<Arc<dyn ThreatFeed>>) {
        self.sources.retain(|s| s.config.name != config.name);
        self.sources.push(RegisteredSource { config, feed });
        self.sources.sort_by(|a, b| {
            a.config
                .priority
                .cmp(&b.config.priority)
                .then_with(|| a.config.name.cmp(&b.config.name))
        });
    }

    async fn fetch_source(&self, source: &RegisteredSource) -> (SourceOutcome, Vec<ThreatEvidence>) {
        let config = &source.config;
        let outcome = |status| SourceOutcome {
            name: config.name.clone(),
            status,
        };

        if !config.enabled {
            debug!(source = %config.name, "Source disabled, skipping");
            return (outcome(SourceStatus::Disabled), Vec::new());
        }

        let Some(feed) = source.feed.as_ref() else {
            let error = SourceError::NoFeed(config.name.clone());
            warn!(source = %config.name, %error, "Source unavailable");
            return (
                outcome(SourceStatus::Failed {
                    reason: error.to_string(),
                }),
                Vec::new(),
            );
        };

        let timeout = Duration::from_millis(config.timeout_ms);
        let body = match tokio::time::timeout(timeout, feed.fetch()).await {
            Ok(Ok(body)) => body,
            Ok(Err(error)) => {
                warn!(source = %config.name, %error, "Source fetch failed");
                return (
                    outcome(SourceStatus::Failed {
                        reason: error.to_string(),
                    }),
                    Vec::new(),
                );
            }
            Err(_) => {
                let error = SourceError::Timeout {
                    feed: config.name.clone(),
                    timeout_ms: config.timeout_ms,
                };
                warn!(source = %config.name, %error, "Source timed out");
                return (outcome(SourceStatus::TimedOut), Vec::new());
            }
        };

        match normalize(&body, config, &self.node) {
            Ok(normalized) => (
                outcome(SourceStatus::Available {
                    fetched: normalized.evidence.len(),
                    dropped: normalized.dropped,
                }),
                normalized.evidence,
            ),
            Err(error) => {
                warn!(source = %config.name, %error, "Source payload rejected");
                (
                    outcome(SourceStatus::Failed {
                        reason: error.to_string(),
                    }),
                    Vec::new(),
                )
            }
        }
    }
}

#[async_trait]
impl SourceAggregator for FeedAggregator {
    fn get_sources_config(&self) -> Vec<SourceDescriptor> {
        self.sources
            .iter()
            .map(|s| SourceDescriptor {
                name: s.config.name.clone(),
                enabled: s.config.enabled,
                kind: s.config.kind,
                priority: s.config.priority,
            })
            .collect()
    }

    async fn fetch_all_sources(&self) -> AggregationReport {
        let results = join_all(self.sources.iter().map(|s| self.fetch_source(s))).await;

        let mut report = AggregationReport::default();
        for (outcome, evidence) in results {
            if let SourceStatus::Available { dropped, .. } = outcome.status {
                report.dropped += dropped;
            }
            report.degraded |= outcome.status.is_unavailable();
            report.evidence.extend(evidence);
            report.sources.push(outcome);
        }

        if report.degraded {
            warn!(
                unavailable = ?report.unavailable_sources(),
                fetched = report.evidence.len(),
                "Aggregation degraded"
            );
        } else {
            info!(
                fetched = report.evidence.len(),
                dropped = report.dropped,
                sources = report.sources.len(),
                "Aggregation complete"
            );
        }

        report
    }
}
