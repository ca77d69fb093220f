//! Deterministic source doubles for tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use threatmesh_core::{
    AggregationReport, SourceAggregator, SourceDescriptor, SourceError, SourceResult, ThreatFeed,
};

enum MockResponse {
    Payload(String),
    Fail(String),
}

/// Feed that returns a fixed payload, optionally after a delay.
pub struct MockFeed {
    response: RwLock<MockResponse>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl MockFeed {
    /// Create a feed that always returns `payload`.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            response: RwLock::new(MockResponse::Payload(payload.into())),
            delay: None,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Create a feed whose every fetch fails.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            response: RwLock::new(MockResponse::Fail(reason.into())),
            delay: None,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Sleep for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the payload returned by subsequent fetches.
    pub fn set_payload(&self, payload: impl Into<String>) {
        *self.response.write() = MockResponse::Payload(payload.into());
    }

    /// Number of fetches issued so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThreatFeed for MockFeed {
    async fn fetch(&self) -> SourceResult<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &*self.response.read() {
            MockResponse::Payload(payload) => Ok(payload.clone()),
            MockResponse::Fail(reason) => Err(SourceError::Unavailable(reason.clone())),
        }
    }
}

/// Aggregator that hands back a preset report.
#[derive(Default)]
pub struct MockSourceAggregator {
    descriptors: Vec<SourceDescriptor>,
    report: RwLock<AggregationReport>,
    calls: AtomicUsize,
}

impl MockSourceAggregator {
    /// Create a mock that returns `report` on every fetch.
    pub fn new(report: AggregationReport) -> Self {
        Self {
            descriptors: Vec::new(),
            report: RwLock::new(report),
            calls: AtomicUsize::new(0),
        }
    }

    /// Set the descriptors returned by `get_sources_config`.
    pub fn with_descriptors(mut self, descriptors: Vec<SourceDescriptor>) -> Self {
        self.descriptors = descriptors;
        self
    }

    /// Replace the report returned by subsequent fetches.
    pub fn set_report(&self, report: AggregationReport) {
        *self.report.write() = report;
    }

    /// Number of `fetch_all_sources` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAggregator for MockSourceAggregator {
    fn get_sources_config(&self) -> Vec<SourceDescriptor> {
        self.descriptors.clone()
    }

    async fn fetch_all_sources(&self) -> AggregationReport {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.report.read().clone()
    }
}
