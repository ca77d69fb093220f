//! Deterministic consensus doubles for tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use threatmesh_core::{
    ConsensusEngine, ConsensusError, ConsensusResult, PeerVerifier, VerifierError,
    VerifierResult,
};
use threatmesh_types::{ConsensusOutcome, ConsensusRecord, PeerVote, ThreatEvidence};

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Vote { verdict: bool, confidence: f64 },
    Fail,
}

/// Peer that always answers the same way.
#[derive(Debug)]
pub struct MockPeerVerifier {
    node_id: String,
    behavior: Behavior,
    delay: Option<Duration>,
    requests: AtomicUsize,
}

impl MockPeerVerifier {
    fn with_behavior(node_id: impl Into<String>, behavior: Behavior) -> Self {
        Self {
            node_id: node_id.into(),
            behavior,
            delay: None,
            requests: AtomicUsize::new(0),
        }
    }

    /// Peer that verifies with `confidence`.
    pub fn verifying(node_id: impl Into<String>, confidence: f64) -> Self {
        Self::with_behavior(
            node_id,
            Behavior::Vote {
                verdict: true,
                confidence,
            },
        )
    }

    /// Peer that disputes with `confidence`.
    pub fn disputing(node_id: impl Into<String>, confidence: f64) -> Self {
        Self::with_behavior(
            node_id,
            Behavior::Vote {
                verdict: false,
                confidence,
            },
        )
    }

    /// Peer that is never reachable.
    pub fn unreachable(node_id: impl Into<String>) -> Self {
        Self::with_behavior(node_id, Behavior::Fail)
    }

    /// Sleep for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of vote requests received.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerVerifier for MockPeerVerifier {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn vote(&self, _evidence: &ThreatEvidence) -> VerifierResult<PeerVote> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.behavior {
            Behavior::Vote {
                verdict,
                confidence,
            } => Ok(PeerVote::new(self.node_id.clone(), verdict, confidence)),
            Behavior::Fail => Err(VerifierError::Unreachable(self.node_id.clone())),
        }
    }
}

/// Consensus engine that returns preset results without touching a store.
pub struct MockConsensusEngine {
    verdict: bool,
    confidence: f64,
    overrides: RwLock<HashMap<String, ConsensusRecord>>,
    missing: RwLock<BTreeSet<String>>,
    calls: AtomicUsize,
}

impl MockConsensusEngine {
    /// Engine that answers every id with a final record of `verdict` at `confidence`.
    pub fn new(verdict: bool, confidence: f64) -> Self {
        Self {
            verdict,
            confidence,
            overrides: RwLock::new(HashMap::new()),
            missing: RwLock::new(BTreeSet::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Return `record` for its evidence id instead of the default.
    pub fn set_record(&self, record: ConsensusRecord) {
        self.overrides
            .write()
            .insert(record.evidence_id.clone(), record);
    }

    /// Answer `id` with [`ConsensusError::EvidenceNotFound`].
    pub fn set_missing(&self, id: impl Into<String>) {
        self.missing.write().insert(id.into());
    }

    /// Number of `check_consensus` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn default_record(&self, evidence_id: &str) -> ConsensusRecord {
        let node = "mock-peer".to_string();
        let (verified_by, disputed_by, outcome) = if self.verdict {
            (BTreeSet::from([node]), BTreeSet::new(), ConsensusOutcome::Verified)
        } else {
            (BTreeSet::new(), BTreeSet::from([node]), ConsensusOutcome::Disputed)
        };
        ConsensusRecord {
            evidence_id: evidence_id.to_string(),
            verdict: self.verdict,
            confidence_score: self.confidence,
            consensus_percentage: if self.verdict { 1.0 } else { 0.0 },
            verified_by,
            disputed_by,
            outcome,
            degraded: false,
            expected_participants: 1,
            unresponsive: BTreeSet::new(),
            round: 0,
            completed_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ConsensusEngine for MockConsensusEngine {
    async fn check_consensus(&self, evidence_id: &str) -> ConsensusResult<ConsensusRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing.read().contains(evidence_id) {
            return Err(ConsensusError::EvidenceNotFound(evidence_id.to_string()));
        }
        let record = self.overrides.read().get(evidence_id).cloned();
        Ok(record.unwrap_or_else(|| self.default_record(evidence_id)))
    }
}
