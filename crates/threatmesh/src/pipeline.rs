//! Cycle orchestration.
//!
//! One cycle runs every stage in order:
//!
//! ```text
//! aggregate -> correlate -> upsert -> consensus -> enhance -> decide -> action -> sinks -> evict -> persist
//! ```
//!
//! Consensus and everything after it run per item, concurrently, bounded by
//! `max_concurrent_items`. Failures are counted and logged; a cycle always
//! completes with a best-effort [`CycleReport`].
//!
//! Sinks only receive decisions that differ from the last one recorded for
//! the item, so evidence retried every cycle does not repeat itself
//! downstream.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use threatmesh_config::{Config, PipelineConfig};
use threatmesh_consensus::{HeuristicVerifier, QuorumConsensus};
use threatmesh_core::{ConsensusEngine, CredibilityEngine, PeerVerifier, SourceAggregator};
use threatmesh_credibility::{correlate_upstream, WeightedCredibility};
use threatmesh_policy::PolicyGate;
use threatmesh_sources::FeedAggregator;
use threatmesh_store::{EvidenceStore, StoreError};
use threatmesh_types::{Action, ConsensusOutcome, Decision, EvidenceStatus, ThreatEvidence};

use crate::error::{ItemError, Result};
use crate::sinks::{ActionedEvidence, BlocklistSink, DecisionSink, EnforcementSink, PlatformSink};

/// Outcome of one pipeline cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Evidence items returned by the aggregator
    pub fetched: usize,
    /// Raw alerts the aggregator dropped as malformed
    pub dropped: usize,
    /// Items inserted or merged with new information
    pub upserted: usize,
    /// Decisions taken this cycle, sorted by evidence id
    pub decisions: Vec<Decision>,
    /// Decisions that changed and were handed to the sinks
    pub published: usize,
    /// Items whose consensus reached no quorum
    pub undetermined: usize,
    /// Items that failed somewhere between upsert and action
    pub failures: usize,
    /// Sinks that failed to publish
    pub sink_failures: usize,
    /// Entries evicted for going unreported past the retention period
    pub evicted: usize,
    /// Sources that failed or timed out
    pub degraded_sources: Vec<String>,
    /// Whether any part of the cycle ran degraded
    pub degraded: bool,
}

impl CycleReport {
    /// Number of decisions with `action`.
    pub fn count(&self, action: Action) -> usize {
        self.decisions.iter().filter(|d| d.action == action).count()
    }
}

/// Per-item stages, shared by the evaluation tasks.
struct Stages {
    store: Arc<EvidenceStore>,
    consensus: Arc<dyn ConsensusEngine>,
    credibility: Arc<dyn CredibilityEngine>,
    gate: PolicyGate,
}

struct Evaluated {
    item: ActionedEvidence,
    outcome: ConsensusOutcome,
    changed: bool,
}

impl Stages {
    async fn evaluate(&self, id: &str) -> std::result::Result<Evaluated, ItemError> {
        let checked = self.consensus.check_consensus(id).await?;

        // Engines that do not own the store leave the record to us.
        let stored = self
            .store
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if stored.consensus.as_ref() != Some(&checked) {
            self.store.record_consensus(&checked)?;
        }

        // Score, decision and history all come from the entry as read under
        // the guard, which is held until the decision is recorded.
        let mut guard = self.store.lock_for_enhancement(id).await?;
        let current = guard.current();
        let record = current
            .consensus
            .ok_or_else(|| ItemError::MissingConsensus(id.to_string()))?;
        let enhanced = self
            .credibility
            .enhance_threat_evidence(&current.evidence, &record)?;
        guard.commit(enhanced.clone())?;

        let decision = self.gate.decide(&enhanced);
        let appended = guard.mark_actioned(&decision)?;
        drop(guard);

        Ok(Evaluated {
            item: ActionedEvidence {
                decision,
                evidence: enhanced,
            },
            outcome: record.outcome,
            changed: appended.is_some(),
        })
    }
}

/// The node's processing loop.
pub struct Pipeline {
    aggregator: Arc<dyn SourceAggregator>,
    stages: Arc<Stages>,
    sinks: Vec<Arc<dyn DecisionSink>>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Wire a pipeline from explicit components.
    pub fn new(
        store: Arc<EvidenceStore>,
        aggregator: Arc<dyn SourceAggregator>,
        consensus: Arc<dyn ConsensusEngine>,
        credibility: Arc<dyn CredibilityEngine>,
        gate: PolicyGate,
        config: PipelineConfig,
    ) -> Self {
        Self {
            aggregator,
            stages: Arc::new(Stages {
                store,
                consensus,
                credibility,
                gate,
            }),
            sinks: Vec::new(),
            config,
        }
    }

    /// Wire the production components described by `config`.
    ///
    /// Opens the store snapshot, builds a file feed per configured source
    /// and a heuristic verifier per enabled peer, and attaches a sink per
    /// configured export path.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(EvidenceStore::open(&config.store)?);

        let verifiers: Vec<Arc<dyn PeerVerifier>> = config
            .consensus
            .enabled_peers()
            .map(|peer| Arc::new(HeuristicVerifier::from_peer(peer)) as Arc<dyn PeerVerifier>)
            .collect();
        let consensus = QuorumConsensus::new(&config.consensus, Arc::clone(&store), verifiers);
        let credibility = WeightedCredibility::new(&config.credibility)?;

        let mut pipeline = Self::new(
            Arc::clone(&store),
            Arc::new(FeedAggregator::from_config(config)),
            Arc::new(consensus),
            Arc::new(credibility),
            PolicyGate::from_config(config),
            config.pipeline.clone(),
        );

        let export = &config.export;
        if let Some(path) = &export.blocklist_file {
            pipeline = pipeline.with_sink(Arc::new(BlocklistSink::new(
                path,
                export.blocklist_min_level,
                Arc::clone(&store),
            )));
        }
        if let Some(path) = &export.enforcement_file {
            pipeline = pipeline.with_sink(Arc::new(EnforcementSink::new(path)));
        }
        if let Some(path) = &export.platform_file {
            pipeline = pipeline.with_sink(Arc::new(PlatformSink::new(path, Arc::clone(&store))));
        }

        info!(
            peers = config.consensus.enabled_peers().count(),
            sources = config.sources.len(),
            sinks = pipeline.sinks.len(),
            "Pipeline assembled"
        );
        Ok(pipeline)
    }

    /// Attach a decision sink.
    pub fn with_sink(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// The evidence store this pipeline writes to.
    pub fn store(&self) -> &Arc<EvidenceStore> {
        &self.stages.store
    }

    /// Run a single cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let aggregation = self.aggregator.fetch_all_sources().await;

        let mut report = CycleReport {
            fetched: aggregation.evidence.len(),
            dropped: aggregation.dropped,
            degraded_sources: aggregation
                .unavailable_sources()
                .into_iter()
                .map(str::to_string)
                .collect(),
            degraded: aggregation.degraded,
            ..CycleReport::default()
        };

        let upstream: Vec<ThreatEvidence> = aggregation
            .evidence
            .iter()
            .filter(|e| e.origin.is_upstream())
            .cloned()
            .collect();
        let mut evidence = aggregation.evidence;
        correlate_upstream(&mut evidence, &upstream);

        let pending = self.ingest(evidence, &mut report);
        let mut evaluated = self.evaluate(pending, &mut report).await;
        evaluated.sort_by(|a, b| {
            a.item
                .decision
                .evidence_id
                .cmp(&b.item.decision.evidence_id)
        });

        let changed: Vec<ActionedEvidence> = evaluated
            .iter()
            .filter(|e| e.changed)
            .map(|e| e.item.clone())
            .collect();
        report.published = changed.len();
        if !changed.is_empty() {
            self.publish(&changed, &mut report).await;
        }
        report.decisions = evaluated.into_iter().map(|e| e.item.decision).collect();

        report.evicted = self.stages.store.evict_expired(Utc::now());

        if self.config.persist_each_cycle {
            match self.stages.store.persist() {
                Ok(Some(entries)) => debug!(entries, "Store snapshot written"),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Failed to persist store snapshot");
                    report.degraded = true;
                }
            }
        }

        report.degraded |= report.failures > 0 || report.sink_failures > 0;

        let summary = format!(
            "fetched={} upserted={} published={} block={} monitor={} ignore={}",
            report.fetched,
            report.upserted,
            report.published,
            report.count(Action::Block),
            report.count(Action::Monitor),
            report.count(Action::Ignore)
        );
        if report.degraded {
            warn!(
                %summary,
                failures = report.failures,
                sink_failures = report.sink_failures,
                degraded_sources = ?report.degraded_sources,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Cycle completed degraded"
            );
        } else {
            info!(
                %summary,
                undetermined = report.undetermined,
                evicted = report.evicted,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Cycle completed"
            );
        }
        report
    }

    /// Run cycles every `cycle_interval_secs` until `shutdown` fires.
    ///
    /// The first cycle starts immediately. A cycle in flight finishes before
    /// the shutdown is observed. Returns the number of cycles run.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> usize {
        let period = Duration::from_secs(self.config.cycle_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = period.as_secs(), "Pipeline started");
        let mut cycles = 0;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                    cycles += 1;
                }
                _ = shutdown.recv() => {
                    info!(cycles, "Pipeline shutting down");
                    break;
                }
            }
        }
        cycles
    }

    /// Upsert the cycle's evidence and return the ids that need a verdict.
    ///
    /// New or changed reports are always re-evaluated. Unchanged reports
    /// are picked up again until they are actioned on a quorum verdict.
    fn ingest(&self, evidence: Vec<ThreatEvidence>, report: &mut CycleReport) -> BTreeSet<String> {
        let store = &self.stages.store;
        let mut pending = BTreeSet::new();

        for item in evidence {
            let id = item.id.clone();
            match store.upsert(item) {
                Ok(outcome) => {
                    if outcome.is_change() {
                        report.upserted += 1;
                    }
                    if outcome.is_change() || awaiting_verdict(store, &id) {
                        pending.insert(id);
                    }
                }
                Err(e) => {
                    warn!(evidence = %id, error = %e, "Evidence rejected by store");
                    report.failures += 1;
                }
            }
        }

        debug!(pending = pending.len(), "Evidence ingested");
        pending
    }

    async fn evaluate(&self, ids: BTreeSet<String>, report: &mut CycleReport) -> Vec<Evaluated> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_items.max(1)));
        let mut tasks = JoinSet::new();

        for id in ids {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let stages = Arc::clone(&self.stages);
            tasks.spawn(async move {
                let result = stages.evaluate(&id).await;
                drop(permit);
                (id, result)
            });
        }

        let mut evaluated = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (id, result) = match joined {
                Ok(done) => done,
                Err(e) => (String::new(), Err(ItemError::Aborted(e.to_string()))),
            };
            match result {
                Ok(done) => {
                    if done.outcome == ConsensusOutcome::Undetermined {
                        report.undetermined += 1;
                    }
                    evaluated.push(done);
                }
                Err(e) => {
                    warn!(evidence = %id, error = %e, "Evidence evaluation failed");
                    report.failures += 1;
                }
            }
        }
        evaluated
    }

    async fn publish(&self, batch: &[ActionedEvidence], report: &mut CycleReport) {
        for sink in &self.sinks {
            match sink.publish(batch).await {
                Ok(written) => debug!(sink = sink.name(), written, "Sink published"),
                Err(e) => {
                    warn!(sink = sink.name(), error = %e, "Sink publish failed");
                    report.sink_failures += 1;
                }
            }
        }
    }
}

fn awaiting_verdict(store: &EvidenceStore, id: &str) -> bool {
    store.get(id).map_or(false, |stored| {
        let undetermined = stored
            .consensus
            .as_ref()
            .map_or(false, |record| record.outcome == ConsensusOutcome::Undetermined);
        stored.status != EvidenceStatus::Actioned || undetermined
    })
}
