//! Integration tests for the node pipeline.
//!
//! These tests verify:
//! - A full cycle from aggregation to sinks
//! - Which evidence is re-evaluated on later cycles
//! - Failure accounting and degradation
//! - The run loop and shutdown
//! - Wiring from configuration

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use threatmesh::{
    ActionedEvidence, BlocklistSink, DecisionSink, EnforcementSink, Pipeline, PlatformSink,
    SinkError, SinkResult,
};
use threatmesh_config::{
    Config, ConsensusConfig, FeedFormat, PeerConfig, PipelineConfig, SourceConfig, StoreConfig,
};
use threatmesh_consensus::{MockConsensusEngine, MockPeerVerifier, PeerVerifier, QuorumConsensus};
use threatmesh_core::{AggregationReport, SourceOutcome, SourceStatus};
use threatmesh_credibility::WeightedCredibility;
use threatmesh_policy::PolicyGate;
use threatmesh_sources::MockSourceAggregator;
use threatmesh_store::EvidenceStore;
use threatmesh_types::{
    Action, ConsensusOutcome, EvidenceOrigin, EvidenceStatus, SourceKind, ThreatEvidence,
    ThreatLevel, ThreatType,
};

// =============================================================================
// Fixtures
// =============================================================================

fn local(ip: &str, initial: f64) -> ThreatEvidence {
    ThreatEvidence::new(
        ip,
        ThreatType::Malware,
        ThreatLevel::Critical,
        EvidenceOrigin::new("edr", SourceKind::LocalSensor),
    )
    .with_context("beacon to C2")
    .with_agent("edr-01")
    .with_initial_score(initial)
}

fn upstream(feed: &str, ip: &str, confidence: f64) -> ThreatEvidence {
    ThreatEvidence::new(
        ip,
        ThreatType::Malware,
        ThreatLevel::Warning,
        EvidenceOrigin::new(feed, SourceKind::UpstreamFeed),
    )
    .with_context("listed C2")
    .with_initial_score(confidence)
}

fn report(evidence: Vec<ThreatEvidence>) -> AggregationReport {
    AggregationReport {
        evidence,
        ..AggregationReport::default()
    }
}

fn new_store() -> Arc<EvidenceStore> {
    Arc::new(EvidenceStore::new(&StoreConfig::default()))
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        cycle_interval_secs: 3600,
        max_concurrent_items: 4,
        persist_each_cycle: false,
    }
}

fn quorum_config() -> ConsensusConfig {
    ConsensusConfig {
        consensus_threshold: 0.6,
        minimum_quorum: 3,
        vote_window_ms: 500,
        window_delta_ms: 0,
        window_max_ms: 5_000,
        max_rounds: 1,
        jitter_percent: 0,
        peers: Vec::new(),
    }
}

fn peers(verifiers: Vec<Arc<MockPeerVerifier>>) -> Vec<Arc<dyn PeerVerifier>> {
    verifiers
        .into_iter()
        .map(|v| v as Arc<dyn PeerVerifier>)
        .collect()
}

fn with_mock_consensus(
    store: Arc<EvidenceStore>,
    aggregator: Arc<MockSourceAggregator>,
    consensus: Arc<MockConsensusEngine>,
) -> Pipeline {
    Pipeline::new(
        store,
        aggregator,
        consensus,
        Arc::new(WeightedCredibility::default()),
        PolicyGate::default(),
        pipeline_config(),
    )
}

struct FailingSink;

#[async_trait]
impl DecisionSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn publish(&self, _batch: &[ActionedEvidence]) -> SinkResult<usize> {
        Err(SinkError::Io {
            path: PathBuf::from("/unwritable"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        })
    }
}

#[derive(Default)]
struct CountingSink {
    batches: AtomicUsize,
    items: AtomicUsize,
}

#[async_trait]
impl DecisionSink for CountingSink {
    fn name(&self) -> &str {
        "counting"
    }

    async fn publish(&self, batch: &[ActionedEvidence]) -> SinkResult<usize> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.items.fetch_add(batch.len(), Ordering::SeqCst);
        Ok(batch.len())
    }
}

// =============================================================================
// Full cycle
// =============================================================================

#[tokio::test]
async fn test_cycle_blocks_verified_evidence() {
    let store = new_store();
    let evidence = local("198.51.100.7", 0.6);
    let aggregator = Arc::new(MockSourceAggregator::new(report(vec![evidence.clone()])));
    let verifiers = vec![
        Arc::new(MockPeerVerifier::verifying("node-a", 0.9)),
        Arc::new(MockPeerVerifier::verifying("node-b", 0.9)),
        Arc::new(MockPeerVerifier::verifying("node-c", 0.9)),
    ];
    let consensus = QuorumConsensus::new(&quorum_config(), Arc::clone(&store), peers(verifiers));

    let pipeline = Pipeline::new(
        Arc::clone(&store),
        aggregator,
        Arc::new(consensus),
        Arc::new(WeightedCredibility::default()),
        PolicyGate::default(),
        pipeline_config(),
    );

    let report = pipeline.run_cycle().await;

    assert_eq!(report.fetched, 1);
    assert_eq!(report.upserted, 1);
    assert_eq!(report.failures, 0);
    assert!(!report.degraded);
    assert_eq!(report.decisions.len(), 1);

    // 0.3 * 0.6 + 0.7 * 0.9 = 0.81
    let decision = &report.decisions[0];
    assert_eq!(decision.action, Action::Block);
    assert!((decision.credibility_score - 0.81).abs() < 1e-9);
    assert!(decision.consensus_verified);

    let stored = store.get(&evidence.id).unwrap();
    assert_eq!(stored.status, EvidenceStatus::Actioned);
    assert_eq!(stored.history.len(), 1);
    assert_eq!(stored.history[0].decision.action, Action::Block);
    assert_eq!(
        stored.consensus.as_ref().map(|r| r.outcome),
        Some(ConsensusOutcome::Verified)
    );
    assert_eq!(stored.evidence.context, "beacon to C2 [CREDIBILITY: 0.81]");
    assert!(stored.evidence.verify_hash());
}

#[tokio::test]
async fn test_disputed_evidence_is_monitored() {
    let store = new_store();
    let evidence = local("198.51.100.7", 0.6);
    let aggregator = Arc::new(MockSourceAggregator::new(report(vec![evidence.clone()])));
    let consensus = Arc::new(MockConsensusEngine::new(false, 0.2));

    let pipeline = with_mock_consensus(Arc::clone(&store), aggregator, consensus);
    let report = pipeline.run_cycle().await;

    // 0.3 * 0.6 + 0.7 * 0.2 = 0.32
    assert_eq!(report.count(Action::Monitor), 1);
    let stored = store.get(&evidence.id).unwrap();
    assert_eq!(stored.status, EvidenceStatus::Actioned);
    assert!(!stored.evidence.consensus_verified);
    assert_eq!(
        stored.consensus.as_ref().map(|r| r.outcome),
        Some(ConsensusOutcome::Disputed)
    );
}

#[tokio::test]
async fn test_upstream_correlation_feeds_score() {
    let store = new_store();
    let item = local("203.0.113.5", 0.4);
    let feed = upstream("abuse-list", "203.0.113.5", 0.9);
    let aggregator = Arc::new(MockSourceAggregator::new(report(vec![
        item.clone(),
        feed.clone(),
    ])));
    let consensus = Arc::new(MockConsensusEngine::new(true, 0.8));

    let pipeline = with_mock_consensus(Arc::clone(&store), aggregator, consensus);
    let report = pipeline.run_cycle().await;

    assert_eq!(report.decisions.len(), 2);
    let local_decision = report
        .decisions
        .iter()
        .find(|d| d.evidence_id == item.id)
        .unwrap();
    // 0.2 * 0.4 + 0.5 * 0.9 + 0.3 * 0.8 = 0.77
    assert!((local_decision.credibility_score - 0.77).abs() < 1e-9);

    let stored = store.get(&item.id).unwrap();
    let correlation = stored.evidence.upstream.as_ref().unwrap();
    assert_eq!(correlation.feed, "abuse-list");
    assert_eq!(correlation.indicator_id, feed.id);

    // The only feed cannot corroborate itself.
    assert!(store.get(&feed.id).unwrap().evidence.upstream.is_none());
}

#[tokio::test]
async fn test_ignored_source_decision() {
    let store = new_store();
    let evidence = upstream("retired-feed", "203.0.113.9", 0.9);
    let aggregator = Arc::new(MockSourceAggregator::new(report(vec![evidence])));

    let mut config = Config::default();
    config.policy.ignored_sources = vec!["retired-feed".to_string()];

    let pipeline = Pipeline::new(
        store,
        aggregator,
        Arc::new(MockConsensusEngine::new(true, 1.0)),
        Arc::new(WeightedCredibility::default()),
        PolicyGate::from_config(&config),
        pipeline_config(),
    );
    let report = pipeline.run_cycle().await;

    assert_eq!(report.count(Action::Ignore), 1);
    assert_eq!(report.count(Action::Block), 0);
}

// =============================================================================
// Re-evaluation
// =============================================================================

#[tokio::test]
async fn test_unchanged_evidence_not_reevaluated() {
    let store = new_store();
    let aggregator = Arc::new(MockSourceAggregator::new(report(vec![local(
        "198.51.100.7",
        0.6,
    )])));
    let consensus = Arc::new(MockConsensusEngine::new(true, 0.9));

    let pipeline = with_mock_consensus(store, Arc::clone(&aggregator), Arc::clone(&consensus));
    let first = pipeline.run_cycle().await;
    let second = pipeline.run_cycle().await;

    assert_eq!(first.decisions.len(), 1);
    assert_eq!(second.fetched, 1);
    assert_eq!(second.upserted, 0);
    assert!(second.decisions.is_empty());
    assert_eq!(consensus.call_count(), 1);
    assert_eq!(aggregator.call_count(), 2);
}

#[tokio::test]
async fn test_changed_report_reevaluated() {
    let store = new_store();
    let evidence = local("198.51.100.7", 0.6);
    let aggregator = Arc::new(MockSourceAggregator::new(report(vec![evidence.clone()])));
    let consensus = Arc::new(MockConsensusEngine::new(true, 0.9));

    let pipeline = with_mock_consensus(
        Arc::clone(&store),
        Arc::clone(&aggregator),
        Arc::clone(&consensus),
    );
    pipeline.run_cycle().await;

    let mut escalated = evidence.clone();
    escalated.threat_level = ThreatLevel::Emergency;
    escalated.seal();
    aggregator.set_report(report(vec![escalated]));

    let second = pipeline.run_cycle().await;
    assert_eq!(second.upserted, 1);
    assert_eq!(second.decisions.len(), 1);
    assert_eq!(consensus.call_count(), 2);

    let stored = store.get(&evidence.id).unwrap();
    assert_eq!(stored.history.len(), 2);
    assert_eq!(stored.evidence.threat_level, ThreatLevel::Emergency);
}

#[tokio::test]
async fn test_undetermined_evidence_retried() {
    let store = new_store();
    let evidence = local("198.51.100.7", 0.6);
    let aggregator = Arc::new(MockSourceAggregator::new(report(vec![evidence.clone()])));
    let peer = Arc::new(MockPeerVerifier::verifying("node-a", 0.9));
    let consensus = QuorumConsensus::new(
        &quorum_config(),
        Arc::clone(&store),
        peers(vec![Arc::clone(&peer)]),
    );

    let pipeline = Pipeline::new(
        Arc::clone(&store),
        aggregator,
        Arc::new(consensus),
        Arc::new(WeightedCredibility::default()),
        PolicyGate::default(),
        pipeline_config(),
    );

    let first = pipeline.run_cycle().await;
    assert_eq!(first.undetermined, 1);
    assert_eq!(first.failures, 0);
    // Below quorum: 0.9 * 1/3 = 0.3, so 0.3 * 0.6 + 0.7 * 0.3 = 0.39
    assert_eq!(first.decisions[0].action, Action::Monitor);
    assert!((first.decisions[0].credibility_score - 0.39).abs() < 1e-9);

    let second = pipeline.run_cycle().await;
    assert_eq!(second.undetermined, 1);
    assert_eq!(peer.request_count(), 2);
    // Same score and action as before: nothing new to record.
    assert_eq!(second.decisions.len(), 1);
    assert_eq!(second.published, 0);
    assert_eq!(store.get(&evidence.id).unwrap().history.len(), 1);
}

#[tokio::test]
async fn test_retried_evidence_does_not_grow_history() {
    let store = new_store();
    let evidence = local("198.51.100.7", 0.6);
    let peer = Arc::new(MockPeerVerifier::verifying("node-a", 0.9));
    let consensus = QuorumConsensus::new(
        &quorum_config(),
        Arc::clone(&store),
        peers(vec![Arc::clone(&peer)]),
    );
    let counting = Arc::new(CountingSink::default());

    let pipeline = Pipeline::new(
        Arc::clone(&store),
        Arc::new(MockSourceAggregator::new(report(vec![evidence.clone()]))),
        Arc::new(consensus),
        Arc::new(WeightedCredibility::default()),
        PolicyGate::default(),
        pipeline_config(),
    )
    .with_sink(Arc::clone(&counting) as Arc<dyn DecisionSink>);

    for _ in 0..50 {
        let report = pipeline.run_cycle().await;
        assert_eq!(report.undetermined, 1);
    }

    assert_eq!(peer.request_count(), 50);
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(&evidence.id).unwrap().history.len(), 1);
    assert_eq!(counting.batches.load(Ordering::SeqCst), 1);
    assert_eq!(counting.items.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreported_evidence_evicted() {
    let store = Arc::new(EvidenceStore::new(&StoreConfig {
        retention_secs: 1,
        ..StoreConfig::default()
    }));
    let evidence = local("198.51.100.7", 0.6);
    let aggregator = Arc::new(MockSourceAggregator::new(report(vec![evidence.clone()])));

    let pipeline = with_mock_consensus(
        Arc::clone(&store),
        Arc::clone(&aggregator),
        Arc::new(MockConsensusEngine::new(true, 0.9)),
    );
    let first = pipeline.run_cycle().await;
    assert_eq!(first.evicted, 0);
    assert_eq!(store.len(), 1);

    aggregator.set_report(report(Vec::new()));
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let second = pipeline.run_cycle().await;
    assert_eq!(second.evicted, 1);
    assert!(store.is_empty());
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_item_failure_counted() {
    let store = new_store();
    let good = local("198.51.100.7", 0.6);
    let bad = local("198.51.100.8", 0.6);
    let aggregator = Arc::new(MockSourceAggregator::new(report(vec![
        good.clone(),
        bad.clone(),
    ])));
    let consensus = Arc::new(MockConsensusEngine::new(true, 0.9));
    consensus.set_missing(bad.id.clone());

    let pipeline = with_mock_consensus(Arc::clone(&store), aggregator, consensus);
    let report = pipeline.run_cycle().await;

    assert_eq!(report.failures, 1);
    assert!(report.degraded);
    assert_eq!(report.decisions.len(), 1);
    assert_eq!(report.decisions[0].evidence_id, good.id);
    assert_eq!(store.get(&bad.id).unwrap().status, EvidenceStatus::Created);
}

#[tokio::test]
async fn test_degraded_sources_reported() {
    let mut aggregation = report(vec![local("198.51.100.7", 0.6)]);
    aggregation.sources = vec![
        SourceOutcome {
            name: "edr".to_string(),
            status: SourceStatus::Available {
                fetched: 1,
                dropped: 2,
            },
        },
        SourceOutcome {
            name: "slow-feed".to_string(),
            status: SourceStatus::TimedOut,
        },
    ];
    aggregation.dropped = 2;
    aggregation.degraded = true;

    let pipeline = with_mock_consensus(
        new_store(),
        Arc::new(MockSourceAggregator::new(aggregation)),
        Arc::new(MockConsensusEngine::new(true, 0.9)),
    );
    let report = pipeline.run_cycle().await;

    assert!(report.degraded);
    assert_eq!(report.dropped, 2);
    assert_eq!(report.degraded_sources, vec!["slow-feed".to_string()]);
    assert_eq!(report.decisions.len(), 1);
}

#[tokio::test]
async fn test_sink_failure_counted() {
    let counting = Arc::new(CountingSink::default());
    let pipeline = with_mock_consensus(
        new_store(),
        Arc::new(MockSourceAggregator::new(report(vec![local("198.51.100.7", 0.6)]))),
        Arc::new(MockConsensusEngine::new(true, 0.9)),
    )
    .with_sink(Arc::new(FailingSink))
    .with_sink(Arc::clone(&counting) as Arc<dyn DecisionSink>);

    let report = pipeline.run_cycle().await;

    assert_eq!(report.sink_failures, 1);
    assert!(report.degraded);
    assert_eq!(report.decisions.len(), 1);
    assert_eq!(counting.batches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_cycle_skips_sinks() {
    let counting = Arc::new(CountingSink::default());
    let pipeline = with_mock_consensus(
        new_store(),
        Arc::new(MockSourceAggregator::new(report(Vec::new()))),
        Arc::new(MockConsensusEngine::new(true, 0.9)),
    )
    .with_sink(Arc::clone(&counting) as Arc<dyn DecisionSink>);

    let report = pipeline.run_cycle().await;

    assert_eq!(report.fetched, 0);
    assert!(!report.degraded);
    assert_eq!(counting.batches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_many_items_bounded_concurrency() {
    let store = new_store();
    let evidence: Vec<_> = (1..=20)
        .map(|i| local(&format!("198.51.100.{i}"), 0.6))
        .collect();
    let verifiers = vec![
        Arc::new(MockPeerVerifier::verifying("node-a", 0.9).with_delay(Duration::from_millis(10))),
        Arc::new(MockPeerVerifier::verifying("node-b", 0.9).with_delay(Duration::from_millis(10))),
        Arc::new(MockPeerVerifier::verifying("node-c", 0.9).with_delay(Duration::from_millis(10))),
    ];
    let consensus = QuorumConsensus::new(&quorum_config(), Arc::clone(&store), peers(verifiers));
    let counting = Arc::new(CountingSink::default());

    let pipeline = Pipeline::new(
        Arc::clone(&store),
        Arc::new(MockSourceAggregator::new(report(evidence))),
        Arc::new(consensus),
        Arc::new(WeightedCredibility::default()),
        PolicyGate::default(),
        pipeline_config(),
    )
    .with_sink(Arc::clone(&counting) as Arc<dyn DecisionSink>);

    let report = pipeline.run_cycle().await;

    assert_eq!(report.failures, 0);
    assert_eq!(report.count(Action::Block), 20);
    assert_eq!(store.count_status(EvidenceStatus::Actioned), 20);
    assert_eq!(counting.items.load(Ordering::SeqCst), 20);

    let ids: Vec<_> = report.decisions.iter().map(|d| d.evidence_id.clone()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

// =============================================================================
// Sinks
// =============================================================================

#[tokio::test]
async fn test_file_sinks() {
    let dir = tempfile::tempdir().unwrap();
    let blocklist = dir.path().join("out/blocklist.txt");
    let enforcement = dir.path().join("out/enforcement.jsonl");
    let platform = dir.path().join("out/platform.json");

    let store = new_store();
    let aggregator = Arc::new(MockSourceAggregator::new(report(vec![
        local("203.0.113.5", 0.4),
        upstream("abuse-list", "203.0.113.5", 0.9),
        local("198.51.100.1", 0.1),
    ])));
    let pipeline = with_mock_consensus(
        Arc::clone(&store),
        Arc::clone(&aggregator),
        Arc::new(MockConsensusEngine::new(true, 0.8)),
    )
    .with_sink(Arc::new(BlocklistSink::new(
        &blocklist,
        ThreatLevel::Warning,
        Arc::clone(&store),
    )))
    .with_sink(Arc::new(EnforcementSink::new(&enforcement)))
    .with_sink(Arc::new(PlatformSink::new(&platform, Arc::clone(&store))));

    let report = pipeline.run_cycle().await;
    assert_eq!(report.sink_failures, 0);
    // 0.3 * 0.1 + 0.7 * 0.8 = 0.59 stays below the block threshold.
    assert_eq!(report.count(Action::Block), 2);
    assert_eq!(report.count(Action::Monitor), 1);

    let text = std::fs::read_to_string(&blocklist).unwrap();
    assert!(text.starts_with("# ThreatMesh Blocklist\n"));
    let lines: Vec<_> = text
        .lines()
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();
    assert_eq!(
        lines,
        vec!["203.0.113.5 # CRITICAL - Malware - beacon to C2 - Agent: edr-01"]
    );

    let jsonl = std::fs::read_to_string(&enforcement).unwrap();
    let entries: Vec<serde_json::Value> = jsonl
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["ip"], "198.51.100.1");
    assert_eq!(entries[1]["ip"], "203.0.113.5");
    // Highest score for the address: the feed item, 0.3 * 0.9 + 0.7 * 0.8 = 0.83
    let best = entries[1]["credibility_score"].as_f64().unwrap();
    assert!((best - 0.83).abs() < 1e-9);

    let records: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(&platform).unwrap()).unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.get("SourceIP").is_some()));
    assert!(records.iter().all(|r| r.get("CredibilityScore").is_some()));

    // The enforcement log appends; the other two are rewritten.
    aggregator.set_report(report_with_new_item());
    pipeline.run_cycle().await;
    let jsonl = std::fs::read_to_string(&enforcement).unwrap();
    assert_eq!(jsonl.lines().count(), 3);
    let records: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(&platform).unwrap()).unwrap();
    assert_eq!(records.len(), 4);
}

fn report_with_new_item() -> AggregationReport {
    report(vec![local("192.0.2.44", 0.9)])
}

// =============================================================================
// Persistence and run loop
// =============================================================================

#[tokio::test]
async fn test_persist_each_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let store_config = StoreConfig {
        snapshot_path: Some(dir.path().join("evidence.json")),
        ..StoreConfig::default()
    };
    let store = Arc::new(EvidenceStore::new(&store_config));
    let evidence = local("198.51.100.7", 0.6);

    let mut config = pipeline_config();
    config.persist_each_cycle = true;
    let pipeline = Pipeline::new(
        Arc::clone(&store),
        Arc::new(MockSourceAggregator::new(report(vec![evidence.clone()]))),
        Arc::new(MockConsensusEngine::new(true, 0.9)),
        Arc::new(WeightedCredibility::default()),
        PolicyGate::default(),
        config,
    );
    let report = pipeline.run_cycle().await;
    assert!(!report.degraded);

    let restored = EvidenceStore::open(&store_config).unwrap();
    let stored = restored.get(&evidence.id).unwrap();
    assert_eq!(stored.status, EvidenceStatus::Actioned);
    assert_eq!(stored.history.len(), 1);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let aggregator = Arc::new(MockSourceAggregator::new(report(vec![local(
        "198.51.100.7",
        0.6,
    )])));
    let pipeline = Arc::new(with_mock_consensus(
        new_store(),
        Arc::clone(&aggregator),
        Arc::new(MockConsensusEngine::new(true, 0.9)),
    ));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let runner = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run(shutdown_rx).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(()).unwrap();

    let cycles = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cycles, 1);
    assert_eq!(aggregator.call_count(), 1);
}

// =============================================================================
// Wiring from configuration
// =============================================================================

#[tokio::test]
async fn test_from_config_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let feed_path = dir.path().join("local.json");
    std::fs::write(
        &feed_path,
        r#"[{"source_ip": "198.51.100.23", "threat_type": "Malware", "threat_level": "Critical",
             "context": "beacon to C2", "initial_score": 0.8}]"#,
    )
    .unwrap();

    let mut source = SourceConfig::new("edr", SourceKind::LocalSensor, FeedFormat::Canonical);
    source.path = Some(feed_path);

    let mut config = Config::default();
    config.sources = vec![source];
    config.consensus.peers = ["peer-a", "peer-b", "peer-c"]
        .into_iter()
        .map(PeerConfig::new)
        .collect();
    config.store.snapshot_path = Some(dir.path().join("data/evidence.json"));
    config.export.blocklist_file = Some(dir.path().join("out/blocklist.txt"));
    config.export.enforcement_file = Some(dir.path().join("out/enforcement.jsonl"));
    config.export.platform_file = Some(dir.path().join("out/platform.json"));

    let pipeline = Pipeline::from_config(&config).unwrap();
    let report = pipeline.run_cycle().await;

    assert_eq!(report.fetched, 1);
    assert_eq!(report.failures, 0);
    assert_eq!(report.sink_failures, 0);
    // Every heuristic peer scores critical malware at 0.9 and verifies;
    // 0.3 * 0.8 + 0.7 * 0.9 = 0.87
    assert_eq!(report.count(Action::Block), 1);
    assert!((report.decisions[0].credibility_score - 0.87).abs() < 1e-9);

    assert!(dir.path().join("data/evidence.json").exists());
    let blocklist = std::fs::read_to_string(dir.path().join("out/blocklist.txt")).unwrap();
    assert!(blocklist.contains("198.51.100.23 # CRITICAL - Malware - beacon to C2"));
}

#[test]
fn test_from_config_rejects_bad_weights() {
    let mut config = Config::default();
    config.credibility.weights.uncorrelated_local = 0.9;
    config.export.blocklist_file = None;
    config.export.enforcement_file = None;
    config.export.platform_file = None;

    assert!(Pipeline::from_config(&config).is_err());
}
