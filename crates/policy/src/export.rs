//! Rendering decisions for enforcement collaborators.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use threatmesh_types::{Decision, EnforcementEntry, ThreatEvidence, ThreatLevel};

/// `{ip, credibility_score}` pairs for the enforcement collaborator.
///
/// Ignored decisions are left out. When several decisions name the same
/// address the highest score is kept. Output is sorted by address.
pub fn enforcement_entries(decisions: &[Decision]) -> Vec<EnforcementEntry> {
    let mut best: BTreeMap<&str, f64> = BTreeMap::new();
    for decision in decisions.iter().filter(|d| d.is_enforceable()) {
        best.entry(decision.source_ip.as_str())
            .and_modify(|score| *score = score.max(decision.credibility_score))
            .or_insert(decision.credibility_score);
    }

    best.into_iter()
        .map(|(ip, credibility_score)| EnforcementEntry {
            ip: ip.to_string(),
            credibility_score,
        })
        .collect()
}

/// Plain-text blocklist for firewall agents.
///
/// ```text
/// # ThreatMesh Blocklist
/// # Generated: 2024-03-01T12:00:00+00:00
/// # Minimum threat level: Warning
///
/// 198.51.100.7 # CRITICAL - Malware - beacon to C2 - Agent: edr-01
/// ```
///
/// Evidence below `min_level` is skipped. One line per address, keeping the
/// most severe report; lines are sorted by address.
pub fn render_blocklist(
    evidence: &[ThreatEvidence],
    min_level: ThreatLevel,
    generated_at: DateTime<Utc>,
) -> String {
    let mut by_ip: BTreeMap<&str, &ThreatEvidence> = BTreeMap::new();
    for item in evidence.iter().filter(|e| e.threat_level >= min_level) {
        by_ip
            .entry(item.source_ip.as_str())
            .and_modify(|current| {
                if item.threat_level > current.threat_level {
                    *current = item;
                }
            })
            .or_insert(item);
    }

    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(out, "# ThreatMesh Blocklist");
    let _ = writeln!(out, "# Generated: {}", generated_at.to_rfc3339());
    let _ = writeln!(out, "# Minimum threat level: {min_level}");
    let _ = writeln!(out);

    for (ip, item) in by_ip {
        let _ = writeln!(
            out,
            "{ip} # {} - {} - {} - Agent: {}",
            item.threat_level.as_str().to_uppercase(),
            item.threat_type,
            single_line(item.base_context()),
            item.agent_id
        );
    }
    out
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
