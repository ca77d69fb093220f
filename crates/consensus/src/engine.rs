//! Quorum consensus engine.
//!
//! ## Round Flow
//!
//! ```text
//! check_consensus(id)
//!   │
//!   ├─ store.begin_round(id)            → Pending, evidence snapshot
//!   │
//!   ├─ round r:
//!   │    ask every peer concurrently, deadline = now + window(r)
//!   │    late or failing peers → unresponsive
//!   │    tally → ConsensusRecord
//!   │    undetermined and r + 1 < max_rounds → round r + 1
//!   │
//!   └─ store.record_consensus(record)   → Verified / Disputed / Undetermined
//! ```
//!
//! Every round builds its own [`VoteTally`]; the engine itself holds no
//! per-evidence state, so rounds for different ids run fully in parallel.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use threatmesh_config::ConsensusConfig;
use threatmesh_core::{ConsensusEngine, ConsensusError, ConsensusResult, PeerVerifier};
use threatmesh_store::{EvidenceStore, StoreError};
use threatmesh_types::{ConsensusOutcome, ConsensusRecord, PeerVote, ThreatEvidence};

use crate::tally::{QuorumRule, VoteTally};
use crate::window::VoteWindow;

fn store_error(id: &str, error: StoreError) -> ConsensusError {
    match error {
        StoreError::NotFound(_) => ConsensusError::EvidenceNotFound(id.to_string()),
        other => ConsensusError::Store(other.to_string()),
    }
}

/// Production [`ConsensusEngine`] voting over a fixed set of peers.
pub struct QuorumConsensus {
    store: Arc<EvidenceStore>,
    verifiers: Vec<Arc<dyn PeerVerifier>>,
    rule: QuorumRule,
    window: VoteWindow,
    max_rounds: u32,
}

impl QuorumConsensus {
    /// Create an engine from the `[consensus]` section.
    pub fn new(
        config: &ConsensusConfig,
        store: Arc<EvidenceStore>,
        verifiers: Vec<Arc<dyn PeerVerifier>>,
    ) -> Self {
        Self {
            store,
            verifiers,
            rule: QuorumRule {
                threshold: config.consensus_threshold,
                minimum_quorum: config.minimum_quorum,
            },
            window: VoteWindow::from_config(config),
            max_rounds: config.max_rounds.max(1),
        }
    }

    /// Replace the round window schedule.
    pub fn with_window(mut self, window: VoteWindow) -> Self {
        self.window = window;
        self
    }

    /// Quorum rule in effect
    pub fn rule(&self) -> QuorumRule {
        self.rule
    }

    /// Number of peers asked per round
    pub fn participant_count(&self) -> usize {
        self.verifiers.len()
    }

    /// Run one round on `evidence` and close its tally.
    pub async fn run_round(&self, evidence: &ThreatEvidence, round: u32) -> ConsensusRecord {
        let window = self.window.window(round);
        let deadline = Instant::now() + window;

        debug!(
            evidence = %evidence.id,
            round,
            peers = self.verifiers.len(),
            window_ms = window.as_millis() as u64,
            "Starting consensus round"
        );

        let requests = self.verifiers.iter().map(|verifier| async move {
            let answer = tokio::time::timeout_at(deadline, verifier.vote(evidence)).await;
            (verifier.node_id(), answer)
        });
        let answers = join_all(requests).await;

        let mut tally = VoteTally::new(evidence.id.clone(), round);
        let mut unresponsive = BTreeSet::new();

        for (node_id, answer) in answers {
            let vote = match answer {
                Ok(Ok(vote)) => vote,
                Ok(Err(error)) => {
                    warn!(evidence = %evidence.id, node = node_id, %error, "Peer failed to vote");
                    unresponsive.insert(node_id.to_string());
                    continue;
                }
                Err(_) => {
                    warn!(evidence = %evidence.id, node = node_id, round, "Peer missed vote deadline");
                    unresponsive.insert(node_id.to_string());
                    continue;
                }
            };

            // Votes are attributed to the verifier that was asked.
            let vote = PeerVote {
                node_id: node_id.to_string(),
                ..vote
            };
            if let Err(error) = tally.add_vote(vote, self.rule.minimum_quorum) {
                warn!(evidence = %evidence.id, node = node_id, %error, "Vote rejected");
                unresponsive.insert(node_id.to_string());
            }
        }

        tally.finalize(self.rule, self.verifiers.len(), unresponsive)
    }
}

#[async_trait]
impl ConsensusEngine for QuorumConsensus {
    async fn check_consensus(&self, evidence_id: &str) -> ConsensusResult<ConsensusRecord> {
        let evidence = self
            .store
            .begin_round(evidence_id)
            .map_err(|e| store_error(evidence_id, e))?;

        let mut round = 0;
        let record = loop {
            let record = self.run_round(&evidence, round).await;
            if record.outcome != ConsensusOutcome::Undetermined || round + 1 >= self.max_rounds {
                break record;
            }
            debug!(
                evidence = %evidence_id,
                round,
                votes = record.total_votes(),
                quorum = self.rule.minimum_quorum,
                "Round undetermined, widening window"
            );
            round += 1;
        };

        self.store
            .record_consensus(&record)
            .map_err(|e| store_error(evidence_id, e))?;

        if record.degraded {
            warn!(
                evidence = %evidence_id,
                votes = record.total_votes(),
                quorum = self.rule.minimum_quorum,
                unresponsive = ?record.unresponsive,
                "Consensus below quorum"
            );
        } else {
            info!(
                evidence = %evidence_id,
                outcome = %record.outcome,
                percentage = record.consensus_percentage,
                confidence = record.confidence_score,
                "Consensus reached"
            );
        }

        Ok(record)
    }
}
