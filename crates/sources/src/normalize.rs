//! Feed payload normalization.
//!
//! Every supported format is first mapped onto [`EvidenceDraft`]s and then
//! validated through the same draft conversion, so the required-field rules
//! live in exactly one place. Entries that fail conversion are dropped and
//! counted; a payload that cannot be read as its declared format at all
//! fails the whole source.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::net::IpAddr;
use tracing::{debug, trace};

use threatmesh_config::{FeedFormat, NodeConfig, SourceConfig};
use threatmesh_core::{SourceError, SourceResult};
use threatmesh_types::{
    EvidenceDraft, EvidenceOrigin, SourceKind, ThreatEvidence, ThreatLevel, ThreatType,
};

/// Evidence accepted from one payload plus the number of entries dropped.
#[derive(Debug, Default)]
pub struct Normalized {
    /// Valid evidence, in payload order
    pub evidence: Vec<ThreatEvidence>,
    /// Entries rejected for missing or invalid fields
    pub dropped: usize,
}

/// Parse `body` according to the source's format.
pub fn normalize(body: &str, source: &SourceConfig, node: &NodeConfig) -> SourceResult<Normalized> {
    let (drafts, mut dropped) = match source.format {
        FeedFormat::Canonical => canonical_drafts(body, source)?,
        FeedFormat::Indicators => indicator_drafts(body, source)?,
        FeedFormat::Stix => stix_drafts(body, source)?,
        FeedFormat::Lines => (line_drafts(body, source), 0),
    };

    let origin = EvidenceOrigin::new(source.name.clone(), source.kind);
    let mut evidence = Vec::with_capacity(drafts.len());

    for draft in drafts {
        let draft = apply_defaults(draft, source, node);
        match draft.into_evidence(origin.clone(), source.default_confidence) {
            Ok(item) => evidence.push(item),
            Err(e) => {
                trace!(source = %source.name, error = %e, "Dropping feed entry");
                dropped += 1;
            }
        }
    }

    debug!(
        source = %source.name,
        accepted = evidence.len(),
        dropped,
        "Feed normalized"
    );
    Ok(Normalized { evidence, dropped })
}

fn malformed(source: &SourceConfig, message: impl Into<String>) -> SourceError {
    SourceError::Malformed {
        feed: source.name.clone(),
        message: message.into(),
    }
}

fn apply_defaults(mut draft: EvidenceDraft, source: &SourceConfig, node: &NodeConfig) -> EvidenceDraft {
    match source.kind {
        SourceKind::UpstreamFeed => {
            draft.agent_id.get_or_insert_with(|| format!("upstream-{}", source.name));
            draft.compliance_tag.get_or_insert_with(|| "upstream".to_string());
        }
        SourceKind::LocalSensor => {
            draft.agent_id.get_or_insert_with(|| node.node_id.clone());
            draft.compliance_tag.get_or_insert_with(|| node.compliance_tag.clone());
            draft.region.get_or_insert_with(|| node.region.clone());
        }
        SourceKind::PeerNode => {}
    }
    draft
}

fn upstream_context(source: &SourceConfig, description: &str) -> String {
    match source.kind {
        SourceKind::UpstreamFeed => format!("Upstream source: {} - {}", source.name, description),
        _ => description.to_string(),
    }
}

// ===== Canonical =====

fn canonical_drafts(body: &str, source: &SourceConfig) -> SourceResult<(Vec<EvidenceDraft>, usize)> {
    let items: Vec<Value> =
        serde_json::from_str(body).map_err(|e| malformed(source, e.to_string()))?;

    let mut drafts = Vec::with_capacity(items.len());
    let mut dropped = 0;
    for item in items {
        match serde_json::from_value::<EvidenceDraft>(item) {
            Ok(draft) => drafts.push(draft),
            Err(e) => {
                trace!(source = %source.name, error = %e, "Unreadable canonical entry");
                dropped += 1;
            }
        }
    }
    Ok((drafts, dropped))
}

// ===== Generic indicators =====

fn indicator_drafts(body: &str, source: &SourceConfig) -> SourceResult<(Vec<EvidenceDraft>, usize)> {
    let value: Value = serde_json::from_str(body).map_err(|e| malformed(source, e.to_string()))?;
    let items = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        _ => return Err(malformed(source, "expected an indicator object or array")),
    };

    let mut drafts = Vec::with_capacity(items.len());
    let mut dropped = 0;
    for item in &items {
        match indicator_draft(item, source) {
            Some(draft) => drafts.push(draft),
            None => dropped += 1,
        }
    }
    Ok((drafts, dropped))
}

fn indicator_draft(item: &Value, source: &SourceConfig) -> Option<EvidenceDraft> {
    let obj = item.as_object()?;
    let text = |key: &str| obj.get(key).and_then(Value::as_str);

    let threat_type = text("type").map_or(ThreatType::IoCMatch, ThreatType::from_feed_label);
    let threat_level = text("level")
        .and_then(ThreatLevel::from_feed_label)
        .unwrap_or(ThreatLevel::Warning);
    let description = text("description").unwrap_or("Known malicious indicator");

    Some(EvidenceDraft {
        source_ip: text("ip").map(str::to_string),
        threat_type: Some(threat_type.to_string()),
        threat_level: Some(threat_level.to_string()),
        context: Some(upstream_context(source, description)),
        network_flow: text("id").map(|id| format!("indicator:{id}")),
        initial_score: obj.get("confidence").and_then(Value::as_f64).map(percent_or_unit),
        ..Default::default()
    })
}

/// Feeds report confidence either in [0, 1] or as a 0-100 percentage.
fn percent_or_unit(confidence: f64) -> f64 {
    if confidence > 1.0 {
        confidence / 100.0
    } else {
        confidence
    }
}

// ===== STIX =====

fn stix_drafts(body: &str, source: &SourceConfig) -> SourceResult<(Vec<EvidenceDraft>, usize)> {
    let value: Value = serde_json::from_str(body).map_err(|e| malformed(source, e.to_string()))?;
    let objects = match value {
        Value::Object(mut obj) if obj.get("type").and_then(Value::as_str) == Some("bundle") => {
            match obj.remove("objects") {
                Some(Value::Array(objects)) => objects,
                _ => Vec::new(),
            }
        }
        Value::Array(objects) => objects,
        obj @ Value::Object(_) => vec![obj],
        _ => return Err(malformed(source, "expected a STIX bundle, object or array")),
    };

    let mut drafts = Vec::new();
    let mut dropped = 0;
    for object in &objects {
        let kind = object.get("type").and_then(Value::as_str);
        if kind.is_some() && kind != Some("indicator") {
            continue;
        }
        match stix_draft(object, source) {
            Some(draft) => drafts.push(draft),
            None => dropped += 1,
        }
    }
    Ok((drafts, dropped))
}

fn stix_draft(object: &Value, source: &SourceConfig) -> Option<EvidenceDraft> {
    let obj = object.as_object()?;
    let pattern = obj.get("pattern").and_then(Value::as_str).unwrap_or_default();
    let description = obj
        .get("description")
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("STIX indicator");

    let labels = obj
        .get("indicator_types")
        .or_else(|| obj.get("labels"))
        .and_then(Value::as_array);
    let threat_type = labels
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(ThreatType::from_feed_label)
        .find(|t| *t != ThreatType::IoCMatch)
        .unwrap_or(ThreatType::IoCMatch);

    let confidence = obj.get("confidence").and_then(Value::as_u64);
    let threat_level = confidence.map_or(ThreatLevel::Warning, ThreatLevel::from_feed_confidence);

    let timestamp = ["valid_from", "modified", "created"]
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .find_map(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc));

    Some(EvidenceDraft {
        source_ip: extract_ip_from_pattern(pattern),
        threat_type: Some(threat_type.to_string()),
        threat_level: Some(threat_level.to_string()),
        timestamp,
        context: Some(upstream_context(source, description)),
        network_flow: Some(pattern.to_string()),
        initial_score: confidence.map(|c| c as f64 / 100.0),
        ..Default::default()
    })
}

/// First quoted literal in a STIX pattern that parses as an IP address,
/// e.g. `[ipv4-addr:value = '198.51.100.7']`.
pub fn extract_ip_from_pattern(pattern: &str) -> Option<String> {
    pattern
        .split('\'')
        .skip(1)
        .step_by(2)
        .map(str::trim)
        .find(|candidate| candidate.parse::<IpAddr>().is_ok())
        .map(str::to_string)
}

// ===== Line lists =====

fn line_drafts(body: &str, source: &SourceConfig) -> Vec<EvidenceDraft> {
    body.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(|ip| EvidenceDraft {
            source_ip: Some(ip.to_string()),
            threat_type: Some(ThreatType::IoCMatch.to_string()),
            threat_level: Some(ThreatLevel::Warning.to_string()),
            context: Some(upstream_context(source, "Known malicious IP")),
            ..Default::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_ip_from_pattern() {
        assert_eq!(
            extract_ip_from_pattern("[ipv4-addr:value = '192.168.1.100']").as_deref(),
            Some("192.168.1.100")
        );
        assert_eq!(
            extract_ip_from_pattern("[domain-name:value = 'evil.example'] OR [ipv6-addr:value = '2001:db8::7']")
                .as_deref(),
            Some("2001:db8::7")
        );
        assert_eq!(extract_ip_from_pattern("[file:hashes.MD5 = 'abc']"), None);
    }

    #[test]
    fn test_percent_or_unit() {
        assert_eq!(percent_or_unit(0.4), 0.4);
        assert_eq!(percent_or_unit(85.0), 0.85);
    }
}
