//! Local heuristic peer verifier.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::trace;

use threatmesh_config::PeerConfig;
use threatmesh_core::{PeerVerifier, VerifierResult};
use threatmesh_types::{PeerVote, SourceKind, ThreatEvidence, ThreatLevel, ThreatType};

/// Genuineness score above which the verifier votes to verify.
pub const VERIFY_THRESHOLD: f64 = 0.6;

/// Scores evidence locally against fixed heuristics and a list of known
/// threat addresses.
///
/// The genuineness score starts at 0.5 and is adjusted for origin, level,
/// known address and threat type. The vote verifies when the score exceeds
/// [`VERIFY_THRESHOLD`]; its confidence is reported so that the vote's
/// support equals the score in either direction.
#[derive(Debug, Clone)]
pub struct HeuristicVerifier {
    node_id: String,
    known_threat_ips: HashSet<String>,
}

impl HeuristicVerifier {
    /// Create a verifier with no known threat addresses.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            known_threat_ips: HashSet::new(),
        }
    }

    /// Create a verifier for a configured peer.
    pub fn from_peer(peer: &PeerConfig) -> Self {
        Self::new(peer.node_id.clone()).with_known_ips(peer.known_threat_ips.iter().cloned())
    }

    /// Add known threat addresses.
    pub fn with_known_ips(mut self, ips: impl IntoIterator<Item = String>) -> Self {
        self.known_threat_ips.extend(ips);
        self
    }

    /// Genuineness score for `evidence`, in [0, 1].
    pub fn score(&self, evidence: &ThreatEvidence) -> f64 {
        let mut score: f64 = 0.5;

        if evidence.origin.kind == SourceKind::UpstreamFeed {
            score += 0.2;
        }

        score += match evidence.threat_level {
            ThreatLevel::Info => -0.1,
            ThreatLevel::Warning => 0.1,
            ThreatLevel::Critical => 0.2,
            ThreatLevel::Emergency => 0.3,
        };

        if self.known_threat_ips.contains(&evidence.source_ip) {
            score += 0.3;
        }

        score += match evidence.threat_type {
            ThreatType::IoCMatch => 0.1,
            ThreatType::Malware => 0.2,
            ThreatType::DDoS => 0.15,
            _ => 0.05,
        };

        score.clamp(0.0, 1.0)
    }
}

#[async_trait]
impl PeerVerifier for HeuristicVerifier {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn vote(&self, evidence: &ThreatEvidence) -> VerifierResult<PeerVote> {
        let score = self.score(evidence);
        let verdict = score > VERIFY_THRESHOLD;
        let confidence = if verdict { score } else { 1.0 - score };

        trace!(node = %self.node_id, evidence = %evidence.id, score, verdict, "Heuristic vote");
        Ok(PeerVote::new(self.node_id.clone(), verdict, confidence))
    }
}
