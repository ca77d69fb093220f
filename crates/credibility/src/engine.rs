//! Weighted credibility engine.

use tracing::{debug, trace};

use threatmesh_config::{CredibilityConfig, CredibilityWeights};
use threatmesh_core::{CredibilityEngine, CredibilityError, CredibilityResult};
use threatmesh_types::{ConsensusRecord, ThreatEvidence, ThreatLevel};

const WEIGHT_TOLERANCE: f64 = 0.0001;

fn unit(field: &'static str, value: f64) -> CredibilityResult<f64> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(CredibilityError::InvalidInput { field, value })
    }
}

fn check_branch(branch: &'static str, weights: &[f64]) -> CredibilityResult<()> {
    let sum: f64 = weights.iter().sum();
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(CredibilityError::InvalidWeights { branch, sum });
    }
    Ok(())
}

/// Production [`CredibilityEngine`].
///
/// With an upstream correlation `u`:
///
/// ```text
/// score = w_local · initial + w_upstream · u + w_consensus · consensus
/// ```
///
/// otherwise:
///
/// ```text
/// score = w_local · initial + w_consensus · consensus
/// ```
///
/// Defaults are 0.2 / 0.5 / 0.3 and 0.3 / 0.7.
#[derive(Debug, Clone)]
pub struct WeightedCredibility {
    weights: CredibilityWeights,
    adjust_threat_level: bool,
    high_confidence: f64,
    medium_confidence: f64,
}

impl Default for WeightedCredibility {
    fn default() -> Self {
        let config = CredibilityConfig::default();
        Self {
            weights: config.weights,
            adjust_threat_level: config.adjust_threat_level,
            high_confidence: config.high_confidence,
            medium_confidence: config.medium_confidence,
        }
    }
}

impl WeightedCredibility {
    /// Create an engine, rejecting weight branches that do not sum to 1.0.
    pub fn new(config: &CredibilityConfig) -> CredibilityResult<Self> {
        let w = &config.weights;
        check_branch(
            "correlated",
            &[w.correlated_local, w.correlated_upstream, w.correlated_consensus],
        )?;
        check_branch("uncorrelated", &[w.uncorrelated_local, w.uncorrelated_consensus])?;

        Ok(Self {
            weights: w.clone(),
            adjust_threat_level: config.adjust_threat_level,
            high_confidence: unit("high_confidence", config.high_confidence)?,
            medium_confidence: unit("medium_confidence", config.medium_confidence)?,
        })
    }

    /// Weights in effect
    pub fn weights(&self) -> &CredibilityWeights {
        &self.weights
    }

    /// Level implied by `score` when level adjustment is enabled.
    ///
    /// At or above the high band the level is kept, at or above the medium
    /// band it drops one step, and below that it becomes `Info`.
    pub fn adjusted_level(&self, level: ThreatLevel, score: f64) -> ThreatLevel {
        if score >= self.high_confidence {
            level
        } else if score >= self.medium_confidence {
            level.step_down()
        } else {
            ThreatLevel::Info
        }
    }
}

impl CredibilityEngine for WeightedCredibility {
    fn calculate_credibility_score(
        &self,
        evidence: &ThreatEvidence,
        consensus_confidence: f64,
    ) -> CredibilityResult<f64> {
        let initial = unit("initial_score", evidence.initial_score)?;
        let consensus = unit("consensus_confidence", consensus_confidence)?;
        let w = &self.weights;

        let score = match &evidence.upstream {
            Some(correlation) => {
                let upstream = unit("upstream_confidence", correlation.confidence)?;
                w.correlated_local * initial
                    + w.correlated_upstream * upstream
                    + w.correlated_consensus * consensus
            }
            None => w.uncorrelated_local * initial + w.uncorrelated_consensus * consensus,
        };

        trace!(
            evidence = %evidence.id,
            initial,
            consensus,
            correlated = evidence.upstream.is_some(),
            score,
            "Credibility computed"
        );
        Ok(score.clamp(0.0, 1.0))
    }

    fn enhance_threat_evidence(
        &self,
        evidence: &ThreatEvidence,
        consensus: &ConsensusRecord,
    ) -> CredibilityResult<ThreatEvidence> {
        if consensus.evidence_id != evidence.id {
            return Err(CredibilityError::RecordMismatch {
                evidence: evidence.id.clone(),
                record: consensus.evidence_id.clone(),
            });
        }

        let score = self.calculate_credibility_score(evidence, consensus.confidence_score)?;

        let mut enhanced = evidence.clone();
        enhanced.credibility_score = score;
        enhanced.consensus_verified = consensus.verdict;

        let tag = format!("[CREDIBILITY: {score:.2}]");
        enhanced.context = match evidence.base_context() {
            "" => tag,
            base => format!("{base} {tag}"),
        };

        if self.adjust_threat_level {
            enhanced.threat_level = self.adjusted_level(evidence.threat_level, score);
        }
        enhanced.seal();

        debug!(
            evidence = %enhanced.id,
            score,
            verified = enhanced.consensus_verified,
            level = %enhanced.threat_level,
            "Evidence enhanced"
        );
        Ok(enhanced)
    }
}
