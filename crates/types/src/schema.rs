//! Downstream wire schema.
//!
//! [`CanonicalRecord`] is the lower-case contract every platform adapter
//! consumes. [`PlatformRecord`] is the capitalized naming used by
//! automation playbooks. Both carry exactly the nine required fields and
//! convert into each other without loss.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evidence::ThreatEvidence;
use crate::threat::{ThreatLevel, ThreatType};

/// Canonical export record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Evidence id
    pub id: String,
    /// Offending address
    pub source_ip: String,
    /// Targeted address
    pub target_ip: String,
    /// Threat category
    pub threat_type: ThreatType,
    /// Threat severity
    pub threat_level: ThreatLevel,
    /// Observation time
    pub timestamp: DateTime<Utc>,
    /// Final credibility
    pub credibility_score: f64,
    /// Consensus verdict
    pub consensus_verified: bool,
    /// Description
    pub context: String,
}

/// Platform export record with capitalized field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformRecord {
    /// Evidence id
    #[serde(rename = "ID")]
    pub id: String,
    /// Offending address
    #[serde(rename = "SourceIP")]
    pub source_ip: String,
    /// Targeted address
    #[serde(rename = "TargetIP")]
    pub target_ip: String,
    /// Threat category
    #[serde(rename = "ThreatType")]
    pub threat_type: ThreatType,
    /// Threat severity
    #[serde(rename = "ThreatLevel")]
    pub threat_level: ThreatLevel,
    /// Observation time
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Final credibility
    #[serde(rename = "CredibilityScore")]
    pub credibility_score: f64,
    /// Consensus verdict
    #[serde(rename = "ConsensusVerified")]
    pub consensus_verified: bool,
    /// Description
    #[serde(rename = "Context")]
    pub context: String,
}

impl From<&ThreatEvidence> for CanonicalRecord {
    fn from(evidence: &ThreatEvidence) -> Self {
        Self {
            id: evidence.id.clone(),
            source_ip: evidence.source_ip.clone(),
            target_ip: evidence.target_ip.clone(),
            threat_type: evidence.threat_type,
            threat_level: evidence.threat_level,
            timestamp: evidence.timestamp,
            credibility_score: evidence.credibility_score,
            consensus_verified: evidence.consensus_verified,
            context: evidence.context.clone(),
        }
    }
}

impl From<CanonicalRecord> for PlatformRecord {
    fn from(record: CanonicalRecord) -> Self {
        Self {
            id: record.id,
            source_ip: record.source_ip,
            target_ip: record.target_ip,
            threat_type: record.threat_type,
            threat_level: record.threat_level,
            timestamp: record.timestamp,
            credibility_score: record.credibility_score,
            consensus_verified: record.consensus_verified,
            context: record.context,
        }
    }
}

impl From<PlatformRecord> for CanonicalRecord {
    fn from(record: PlatformRecord) -> Self {
        Self {
            id: record.id,
            source_ip: record.source_ip,
            target_ip: record.target_ip,
            threat_type: record.threat_type,
            threat_level: record.threat_level,
            timestamp: record.timestamp,
            credibility_score: record.credibility_score,
            consensus_verified: record.consensus_verified,
            context: record.context,
        }
    }
}

impl From<&ThreatEvidence> for PlatformRecord {
    fn from(evidence: &ThreatEvidence) -> Self {
        CanonicalRecord::from(evidence).into()
    }
}
