//! Deterministic credibility double for tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use threatmesh_core::{CredibilityEngine, CredibilityError, CredibilityResult};
use threatmesh_types::{ConsensusRecord, ThreatEvidence};

/// Credibility engine that assigns a fixed score to everything.
#[derive(Debug)]
pub struct MockCredibilityEngine {
    score: RwLock<f64>,
    calls: AtomicUsize,
}

impl MockCredibilityEngine {
    /// Engine that always scores `score`.
    pub fn new(score: f64) -> Self {
        Self {
            score: RwLock::new(score),
            calls: AtomicUsize::new(0),
        }
    }

    /// Change the score returned by subsequent calls.
    pub fn set_score(&self, score: f64) {
        *self.score.write() = score;
    }

    /// Number of `enhance_threat_evidence` calls so far.
    pub fn enhance_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CredibilityEngine for MockCredibilityEngine {
    fn calculate_credibility_score(
        &self,
        _evidence: &ThreatEvidence,
        _consensus_confidence: f64,
    ) -> CredibilityResult<f64> {
        Ok(*self.score.read())
    }

    fn enhance_threat_evidence(
        &self,
        evidence: &ThreatEvidence,
        consensus: &ConsensusRecord,
    ) -> CredibilityResult<ThreatEvidence> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if consensus.evidence_id != evidence.id {
            return Err(CredibilityError::RecordMismatch {
                evidence: evidence.id.clone(),
                record: consensus.evidence_id.clone(),
            });
        }

        let mut enhanced = evidence.clone();
        enhanced.credibility_score = *self.score.read();
        enhanced.consensus_verified = consensus.verdict;
        enhanced.seal();
        Ok(enhanced)
    }
}
