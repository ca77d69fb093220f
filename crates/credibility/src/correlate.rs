//! Upstream feed correlation.
//!
//! A piece of evidence is corroborated by an upstream feed when an item from
//! a *different* upstream feed names the same source address or the same
//! network flow. The strongest matching indicator, by its initial score,
//! becomes the evidence's [`UpstreamCorrelation`].

use std::collections::HashMap;

use tracing::debug;

use threatmesh_types::{ThreatEvidence, UpstreamCorrelation};

/// Upstream items indexed by the keys evidence can match on.
#[derive(Debug, Default)]
pub struct UpstreamIndex<'a> {
    by_ip: HashMap<&'a str, Vec<&'a ThreatEvidence>>,
    by_flow: HashMap<&'a str, Vec<&'a ThreatEvidence>>,
}

impl<'a> UpstreamIndex<'a> {
    /// Index every upstream-origin item in `items`; other items are skipped.
    pub fn new(items: &'a [ThreatEvidence]) -> Self {
        let mut index = Self::default();
        for item in items.iter().filter(|e| e.origin.is_upstream()) {
            index.by_ip.entry(item.source_ip.as_str()).or_default().push(item);
            if !item.network_flow.is_empty() {
                index
                    .by_flow
                    .entry(item.network_flow.as_str())
                    .or_default()
                    .push(item);
            }
        }
        index
    }

    /// Number of indexed upstream items.
    pub fn len(&self) -> usize {
        self.by_ip.values().map(Vec::len).sum()
    }

    /// Whether no upstream items were indexed.
    pub fn is_empty(&self) -> bool {
        self.by_ip.is_empty()
    }

    /// Strongest upstream match for `evidence` from a feed other than its own.
    pub fn best_match(&self, evidence: &ThreatEvidence) -> Option<UpstreamCorrelation> {
        let by_flow = match evidence.network_flow.as_str() {
            "" => None,
            flow => self.by_flow.get(flow),
        };

        self.by_ip
            .get(evidence.source_ip.as_str())
            .into_iter()
            .chain(by_flow)
            .flatten()
            .filter(|candidate| candidate.origin.source != evidence.origin.source)
            .max_by(|a, b| {
                a.initial_score
                    .total_cmp(&b.initial_score)
                    .then_with(|| b.origin.source.cmp(&a.origin.source))
            })
            .map(|m| UpstreamCorrelation {
                feed: m.origin.source.clone(),
                indicator_id: m.id.clone(),
                confidence: m.initial_score,
            })
    }
}

/// Attach upstream correlations to `evidence` from the `upstream` items.
///
/// Existing correlations are replaced only by stronger ones. Returns the
/// number of items that gained or changed a correlation.
pub fn correlate_upstream(evidence: &mut [ThreatEvidence], upstream: &[ThreatEvidence]) -> usize {
    let index = UpstreamIndex::new(upstream);
    if index.is_empty() {
        return 0;
    }

    let mut correlated = 0;
    for item in evidence.iter_mut() {
        let Some(found) = index.best_match(item) else {
            continue;
        };
        let stronger = item
            .upstream
            .as_ref()
            .map_or(true, |current| found.confidence > current.confidence);
        if stronger {
            item.upstream = Some(found);
            correlated += 1;
        }
    }

    debug!(
        items = evidence.len(),
        upstream = index.len(),
        correlated,
        "Upstream correlation complete"
    );
    correlated
}
