//! Tests for credibility scoring, enhancement and upstream correlation.

use std::collections::BTreeSet;

use chrono::Utc;
use threatmesh_config::CredibilityConfig;
use threatmesh_credibility::{
    correlate_upstream, CredibilityEngine, CredibilityError, MockCredibilityEngine,
    WeightedCredibility,
};
use threatmesh_types::{
    ConsensusOutcome, ConsensusRecord, EvidenceOrigin, SourceKind, ThreatEvidence, ThreatLevel,
    ThreatType, UpstreamCorrelation,
};

fn local(ip: &str, initial: f64) -> ThreatEvidence {
    ThreatEvidence::new(
        ip,
        ThreatType::Malware,
        ThreatLevel::Critical,
        EvidenceOrigin::new("edr", SourceKind::LocalSensor),
    )
    .with_context("beacon to C2")
    .with_initial_score(initial)
}

fn upstream(feed: &str, ip: &str, confidence: f64) -> ThreatEvidence {
    ThreatEvidence::new(
        ip,
        ThreatType::Malware,
        ThreatLevel::Warning,
        EvidenceOrigin::new(feed, SourceKind::UpstreamFeed),
    )
    .with_initial_score(confidence)
}

fn correlation(confidence: f64) -> UpstreamCorrelation {
    UpstreamCorrelation {
        feed: "abuse-list".to_string(),
        indicator_id: "ioc-1".to_string(),
        confidence,
    }
}

fn record(evidence: &ThreatEvidence, verdict: bool, confidence: f64) -> ConsensusRecord {
    ConsensusRecord {
        evidence_id: evidence.id.clone(),
        verdict,
        confidence_score: confidence,
        consensus_percentage: if verdict { 1.0 } else { 0.0 },
        verified_by: BTreeSet::new(),
        disputed_by: BTreeSet::new(),
        outcome: if verdict {
            ConsensusOutcome::Verified
        } else {
            ConsensusOutcome::Disputed
        },
        degraded: false,
        expected_participants: 3,
        unresponsive: BTreeSet::new(),
        round: 0,
        completed_at: Utc::now(),
    }
}

fn engine() -> WeightedCredibility {
    WeightedCredibility::new(&CredibilityConfig::default()).unwrap()
}

// =============================================================================
// Scoring
// =============================================================================

#[test]
fn test_upstream_match_score() {
    let evidence = local("198.51.100.1", 0.4).with_upstream(correlation(0.9));
    let score = engine().calculate_credibility_score(&evidence, 0.8).unwrap();
    assert!((score - 0.77).abs() < 1e-9);
}

#[test]
fn test_no_upstream_score() {
    let evidence = local("198.51.100.1", 0.6);
    let score = engine().calculate_credibility_score(&evidence, 0.75).unwrap();
    assert!((score - 0.705).abs() < 1e-9);
}

#[test]
fn test_score_bounds() {
    let engine = engine();
    for initial in [0.0, 0.25, 0.5, 1.0] {
        for consensus in [0.0, 0.33, 1.0] {
            for upstream in [None, Some(0.0), Some(1.0)] {
                let mut evidence = local("198.51.100.1", initial);
                evidence.upstream = upstream.map(correlation);
                let score = engine.calculate_credibility_score(&evidence, consensus).unwrap();
                assert!((0.0..=1.0).contains(&score));
            }
        }
    }
}

#[test]
fn test_invalid_inputs_rejected() {
    let engine = engine();
    let evidence = local("198.51.100.1", 0.5);

    for bad in [1.2, -0.1, f64::NAN, f64::INFINITY] {
        let err = engine.calculate_credibility_score(&evidence, bad).unwrap_err();
        assert!(matches!(
            err,
            CredibilityError::InvalidInput {
                field: "consensus_confidence",
                ..
            }
        ));
    }

    let mut bad_initial = evidence.clone();
    bad_initial.initial_score = 1.5;
    assert!(matches!(
        engine.calculate_credibility_score(&bad_initial, 0.5),
        Err(CredibilityError::InvalidInput {
            field: "initial_score",
            ..
        })
    ));

    let bad_upstream = evidence.with_upstream(correlation(2.0));
    assert!(matches!(
        engine.calculate_credibility_score(&bad_upstream, 0.5),
        Err(CredibilityError::InvalidInput {
            field: "upstream_confidence",
            ..
        })
    ));
}

#[test]
fn test_weights_must_sum_to_one() {
    let mut config = CredibilityConfig::default();
    config.weights.correlated_upstream = 0.6;

    let err = WeightedCredibility::new(&config).unwrap_err();
    match err {
        CredibilityError::InvalidWeights { branch, sum } => {
            assert_eq!(branch, "correlated");
            assert!((sum - 1.1).abs() < 1e-9);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_custom_weights() {
    let mut config = CredibilityConfig::default();
    config.weights.uncorrelated_local = 0.5;
    config.weights.uncorrelated_consensus = 0.5;

    let engine = WeightedCredibility::new(&config).unwrap();
    let score = engine
        .calculate_credibility_score(&local("198.51.100.1", 0.2), 0.8)
        .unwrap();
    assert!((score - 0.5).abs() < 1e-9);
}

// =============================================================================
// Enhancement
// =============================================================================

#[test]
fn test_enhance_populates_and_leaves_input() {
    let evidence = local("198.51.100.1", 0.6);
    let before = evidence.clone();

    let enhanced = engine()
        .enhance_threat_evidence(&evidence, &record(&evidence, true, 0.8))
        .unwrap();

    assert_eq!(evidence, before);
    assert!((enhanced.credibility_score - 0.74).abs() < 1e-9);
    assert!(enhanced.consensus_verified);
    assert_eq!(enhanced.id, evidence.id);
    assert_eq!(enhanced.context, "beacon to C2 [CREDIBILITY: 0.74]");
    assert_eq!(enhanced.threat_level, ThreatLevel::Critical);
    assert!(enhanced.verify_hash());
}

#[test]
fn test_enhance_replaces_prior_tag() {
    let evidence = local("198.51.100.1", 0.6);
    let engine = engine();

    let first = engine
        .enhance_threat_evidence(&evidence, &record(&evidence, true, 0.9))
        .unwrap();
    let second = engine
        .enhance_threat_evidence(&first, &record(&first, false, 0.1))
        .unwrap();

    assert_eq!(second.context.matches("[CREDIBILITY:").count(), 1);
    assert!(second.context.starts_with("beacon to C2 [CREDIBILITY: "));
    assert!(!second.consensus_verified);
}

#[test]
fn test_enhance_empty_context() {
    let evidence = ThreatEvidence::new(
        "198.51.100.9",
        ThreatType::DDoS,
        ThreatLevel::Warning,
        EvidenceOrigin::new("edr", SourceKind::LocalSensor),
    );
    let enhanced = engine()
        .enhance_threat_evidence(&evidence, &record(&evidence, true, 1.0))
        .unwrap();
    assert!(enhanced.context.starts_with("[CREDIBILITY: "));
}

#[test]
fn test_enhance_rejects_foreign_record() {
    let evidence = local("198.51.100.1", 0.6);
    let other = local("198.51.100.2", 0.6);

    let err = engine()
        .enhance_threat_evidence(&evidence, &record(&other, true, 0.9))
        .unwrap_err();
    assert!(matches!(err, CredibilityError::RecordMismatch { .. }));
}

#[test]
fn test_level_adjustment_when_enabled() {
    let mut config = CredibilityConfig::default();
    config.adjust_threat_level = true;
    let engine = WeightedCredibility::new(&config).unwrap();

    let evidence = local("198.51.100.1", 0.6);
    // 0.3 * 0.6 + 0.7 * 0.75 = 0.705 → medium band
    let enhanced = engine
        .enhance_threat_evidence(&evidence, &record(&evidence, true, 0.75))
        .unwrap();
    assert_eq!(enhanced.threat_level, ThreatLevel::Warning);

    // 0.3 * 0.6 + 0.7 * 0.1 = 0.25 → low band
    let enhanced = engine
        .enhance_threat_evidence(&evidence, &record(&evidence, false, 0.1))
        .unwrap();
    assert_eq!(enhanced.threat_level, ThreatLevel::Info);
}

// =============================================================================
// Correlation
// =============================================================================

#[test]
fn test_correlation_by_ip() {
    let feeds = vec![
        upstream("abuse-list", "203.0.113.5", 0.7),
        upstream("stix-feed", "203.0.113.5", 0.9),
    ];
    let mut items = vec![local("203.0.113.5", 0.4), local("203.0.113.6", 0.4)];

    let correlated = correlate_upstream(&mut items, &feeds);

    assert_eq!(correlated, 1);
    let found = items[0].upstream.as_ref().unwrap();
    assert_eq!(found.feed, "stix-feed");
    assert_eq!(found.confidence, 0.9);
    assert_eq!(found.indicator_id, feeds[1].id);
    assert!(items[1].upstream.is_none());
}

#[test]
fn test_correlation_by_network_flow() {
    let feed = upstream("stix-feed", "203.0.113.50", 0.8)
        .with_network_flow("[ipv4-addr:value = '203.0.113.50']");
    let item = local("10.0.0.1", 0.4).with_network_flow("[ipv4-addr:value = '203.0.113.50']");

    let mut items = vec![item];
    assert_eq!(correlate_upstream(&mut items, &[feed]), 1);
    assert_eq!(items[0].upstream.as_ref().unwrap().confidence, 0.8);
}

#[test]
fn test_feed_does_not_corroborate_itself() {
    let feeds = vec![
        upstream("abuse-list", "203.0.113.5", 0.7),
        upstream("stix-feed", "203.0.113.5", 0.9),
    ];
    let mut items = feeds.clone();

    assert_eq!(correlate_upstream(&mut items, &feeds), 2);
    assert_eq!(items[0].upstream.as_ref().unwrap().feed, "stix-feed");
    assert_eq!(items[1].upstream.as_ref().unwrap().feed, "abuse-list");
}

#[test]
fn test_local_items_never_correlate() {
    let locals = vec![local("203.0.113.5", 0.9)];
    let mut items = vec![local("203.0.113.5", 0.4)];
    assert_eq!(correlate_upstream(&mut items, &locals), 0);
    assert!(items[0].upstream.is_none());
}

#[test]
fn test_weaker_match_keeps_existing() {
    let feeds = vec![upstream("abuse-list", "203.0.113.5", 0.5)];
    let mut items = vec![local("203.0.113.5", 0.4).with_upstream(correlation(0.95))];

    assert_eq!(correlate_upstream(&mut items, &feeds), 0);
    assert_eq!(items[0].upstream.as_ref().unwrap().confidence, 0.95);
}

// =============================================================================
// Mock
// =============================================================================

#[test]
fn test_mock_engine() {
    let mock = MockCredibilityEngine::new(0.42);
    let evidence = local("198.51.100.1", 0.6);

    let enhanced = mock
        .enhance_threat_evidence(&evidence, &record(&evidence, true, 0.9))
        .unwrap();
    assert_eq!(enhanced.credibility_score, 0.42);
    assert!(enhanced.consensus_verified);

    mock.set_score(0.9);
    assert_eq!(mock.calculate_credibility_score(&evidence, 0.0).unwrap(), 0.9);
    assert_eq!(mock.enhance_count(), 1);
}
