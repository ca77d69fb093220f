//! Keyed evidence registry.
//!
//! Entries live in a sharded map of `Arc<Slot>`. Each slot holds the entry
//! behind a `parking_lot::RwLock` and a separate async mutex that serializes
//! enhancement for that id. No lock ever covers more than one id.
//!
//! Growth is bounded two ways: each entry keeps at most `max_history` action
//! records, and entries no source has reported for `retention_secs` are
//! evicted by [`EvidenceStore::evict_expired`].

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, trace, warn};

use threatmesh_config::StoreConfig;
use threatmesh_types::{
    ActionRecord, ConsensusOutcome, ConsensusRecord, Decision, EvidenceHash, EvidenceStatus,
    ThreatEvidence,
};

use crate::snapshot::StoreSnapshot;
use crate::{Result, StoreError};

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New id
    Inserted,
    /// Existing id, payload changed
    Merged,
    /// Existing id, identical payload
    Unchanged,
}

impl UpsertOutcome {
    /// Whether the report carried new information worth re-verifying.
    pub fn is_change(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

/// An evidence item together with its derived state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvidence {
    /// Current evidence record
    pub evidence: ThreatEvidence,
    /// Lifecycle status
    pub status: EvidenceStatus,
    /// Most recent consensus outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusRecord>,
    /// Exported decisions, oldest first; never rewritten
    #[serde(default)]
    pub history: Vec<ActionRecord>,
    /// Report digest of the last ingested report
    pub reported_digest: EvidenceHash,
    /// Incremented on every state change
    pub revision: u64,
    /// Time of the last state change
    pub updated_at: DateTime<Utc>,
    /// Time a source last reported this observation
    #[serde(default = "Utc::now")]
    pub last_seen: DateTime<Utc>,
}

impl StoredEvidence {
    fn new(evidence: ThreatEvidence) -> Self {
        Self {
            reported_digest: evidence.report_digest(),
            evidence,
            status: EvidenceStatus::Created,
            consensus: None,
            history: Vec::new(),
            revision: 0,
            updated_at: Utc::now(),
            last_seen: Utc::now(),
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }

    fn transition(&mut self, to: EvidenceStatus) {
        trace!(id = %self.evidence.id, from = %self.status, %to, "Status transition");
        self.status = to;
        self.touch();
    }

    /// Merge a re-submitted report of the same observation.
    ///
    /// A report that differs only in observation time refreshes the
    /// timestamp and counts as unchanged. Otherwise descriptive fields follow
    /// the newer report, severity only ever rises, and scoring state plus
    /// history are kept.
    fn merge(&mut self, incoming: ThreatEvidence) -> UpsertOutcome {
        self.last_seen = Utc::now();
        let digest = incoming.report_digest();
        let same_upstream =
            incoming.upstream.is_none() || incoming.upstream == self.evidence.upstream;

        if digest == self.reported_digest && same_upstream {
            if incoming.timestamp > self.evidence.timestamp {
                self.evidence.timestamp = incoming.timestamp;
                self.evidence.seal();
                self.touch();
            }
            return UpsertOutcome::Unchanged;
        }

        let current = &mut self.evidence;
        current.threat_level = current.threat_level.max(incoming.threat_level);
        current.timestamp = current.timestamp.max(incoming.timestamp);
        current.context = incoming.context;
        current.geolocation = incoming.geolocation;
        current.agent_id = incoming.agent_id;
        current.compliance_tag = incoming.compliance_tag;
        current.region = incoming.region;
        current.initial_score = incoming.initial_score;
        if incoming.upstream.is_some() {
            current.upstream = incoming.upstream;
        }
        current.seal();

        self.reported_digest = digest;
        self.touch();
        UpsertOutcome::Merged
    }

    /// Move an Enhanced entry to Actioned.
    ///
    /// A history record is appended only when the decision differs from the
    /// last one recorded; the oldest records are dropped beyond `max_history`.
    fn apply_decision(
        &mut self,
        decision: &Decision,
        max_history: usize,
    ) -> Result<Option<ActionRecord>> {
        if self.status != EvidenceStatus::Enhanced {
            return Err(StoreError::InvalidTransition {
                id: decision.evidence_id.clone(),
                from: self.status,
                to: EvidenceStatus::Actioned,
            });
        }

        let repeated = self
            .history
            .last()
            .map_or(false, |last| same_outcome(last, decision, &self.evidence));
        let appended = if repeated {
            trace!(id = %decision.evidence_id, action = %decision.action, "Decision unchanged");
            None
        } else {
            let record = ActionRecord {
                decision: decision.clone(),
                threat_level: self.evidence.threat_level,
                threat_type: self.evidence.threat_type,
                actioned_at: Utc::now(),
            };
            self.history.push(record.clone());
            if self.history.len() > max_history {
                let excess = self.history.len() - max_history;
                self.history.drain(..excess);
            }
            Some(record)
        };

        self.transition(EvidenceStatus::Actioned);
        Ok(appended)
    }
}

fn same_outcome(last: &ActionRecord, decision: &Decision, evidence: &ThreatEvidence) -> bool {
    last.decision.action == decision.action
        && last.decision.consensus_verified == decision.consensus_verified
        && (last.decision.credibility_score - decision.credibility_score).abs() < 1e-9
        && last.threat_level == evidence.threat_level
        && last.threat_type == evidence.threat_type
}

struct Slot {
    entry: RwLock<StoredEvidence>,
    enhancement: Arc<Mutex<()>>,
}

impl Slot {
    fn new(entry: StoredEvidence) -> Self {
        Self {
            entry: RwLock::new(entry),
            enhancement: Arc::new(Mutex::new(())),
        }
    }

    /// The single mutation path for an existing entry.
    fn write<R>(&self, f: impl FnOnce(&mut StoredEvidence) -> Result<R>) -> Result<R> {
        let mut entry = self.entry.write();
        f(&mut entry)
    }

    fn read(&self) -> StoredEvidence {
        self.entry.read().clone()
    }
}

/// Exclusive right to store an enhanced record for one id and action it.
///
/// Obtained from [`EvidenceStore::lock_for_enhancement`]. While a guard is
/// alive, every other enhancement attempt for the same id waits. The guard
/// remembers the entry revision it last observed; a write that lands
/// outside the guard in between makes `commit` and `mark_actioned` fail
/// with [`StoreError::StaleEntry`].
pub struct EnhancementGuard {
    id: String,
    slot: Arc<Slot>,
    revision: u64,
    max_history: usize,
    _permit: OwnedMutexGuard<()>,
}

impl EnhancementGuard {
    /// Id this guard covers.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current stored entry, read under the guard.
    pub fn current(&self) -> StoredEvidence {
        self.slot.read()
    }

    /// Store the enhanced record and move the entry to Enhanced.
    pub fn commit(&mut self, enhanced: ThreatEvidence) -> Result<()> {
        if enhanced.id != self.id {
            return Err(StoreError::IdMismatch {
                expected: self.id.clone(),
                actual: enhanced.id,
            });
        }
        enhanced.validate()?;

        let id = &self.id;
        let seen = self.revision;
        self.revision = self.slot.write(|stored| {
            if stored.revision != seen {
                return Err(StoreError::StaleEntry(id.clone()));
            }
            match stored.status {
                EvidenceStatus::Verified
                | EvidenceStatus::Disputed
                | EvidenceStatus::Undetermined
                | EvidenceStatus::Enhanced => {}
                from => {
                    return Err(StoreError::InvalidTransition {
                        id: id.clone(),
                        from,
                        to: EvidenceStatus::Enhanced,
                    })
                }
            }
            stored.evidence = enhanced;
            stored.transition(EvidenceStatus::Enhanced);
            Ok(stored.revision)
        })?;

        debug!(id = %self.id, "Enhanced evidence committed");
        Ok(())
    }

    /// Action the committed record without releasing the guard.
    ///
    /// Returns the appended history record, or `None` when the decision
    /// repeats the last one.
    pub fn mark_actioned(&mut self, decision: &Decision) -> Result<Option<ActionRecord>> {
        if decision.evidence_id != self.id {
            return Err(StoreError::IdMismatch {
                expected: self.id.clone(),
                actual: decision.evidence_id.clone(),
            });
        }

        let id = &self.id;
        let seen = self.revision;
        let max_history = self.max_history;
        let (appended, revision) = self.slot.write(|stored| {
            if stored.revision != seen {
                return Err(StoreError::StaleEntry(id.clone()));
            }
            let appended = stored.apply_decision(decision, max_history)?;
            Ok((appended, stored.revision))
        })?;
        self.revision = revision;
        Ok(appended)
    }
}

/// Process-wide evidence registry, constructed and injected explicitly.
pub struct EvidenceStore {
    entries: DashMap<String, Arc<Slot>>,
    snapshot_path: Option<PathBuf>,
    max_history: usize,
    retention: Option<Duration>,
}

impl EvidenceStore {
    /// Create an empty store.
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            entries: DashMap::new(),
            snapshot_path: config.snapshot_path.clone(),
            max_history: config.max_history.max(1),
            retention: (config.retention_secs > 0)
                .then(|| Duration::from_secs(config.retention_secs)),
        }
    }

    /// Create a store, loading the configured snapshot file if it exists.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let store = Self::new(config);

        let Some(path) = store.snapshot_path.as_deref() else {
            return Ok(store);
        };
        if !path.exists() {
            info!(path = ?path, "No store snapshot found, starting empty");
            return Ok(store);
        }

        let snapshot = StoreSnapshot::read(path)?;
        for stored in snapshot.entries {
            check_integrity(&stored.evidence)?;
            store
                .entries
                .insert(stored.evidence.id.clone(), Arc::new(Slot::new(stored)));
        }

        info!(path = ?path, entries = store.len(), "Store restored from snapshot");
        Ok(store)
    }

    /// Insert new evidence or merge it into the existing entry.
    pub fn upsert(&self, evidence: ThreatEvidence) -> Result<UpsertOutcome> {
        check_integrity(&evidence)?;

        let slot = match self.entries.entry(evidence.id.clone()) {
            Entry::Vacant(vacant) => {
                trace!(id = %evidence.id, "Evidence inserted");
                vacant.insert(Arc::new(Slot::new(StoredEvidence::new(evidence))));
                return Ok(UpsertOutcome::Inserted);
            }
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
        };

        let outcome = slot.write(|stored| Ok(stored.merge(evidence)))?;
        trace!(?outcome, "Evidence upserted");
        Ok(outcome)
    }

    /// Current entry for `id`.
    pub fn get(&self, id: &str) -> Option<StoredEvidence> {
        self.entries.get(id).map(|slot| slot.read())
    }

    /// Current evidence record for `id`.
    pub fn evidence(&self, id: &str) -> Option<ThreatEvidence> {
        self.entries
            .get(id)
            .map(|slot| slot.entry.read().evidence.clone())
    }

    /// Read-only copy of every entry, sorted by id.
    pub fn snapshot(&self) -> Vec<StoredEvidence> {
        let mut entries: Vec<StoredEvidence> =
            self.entries.iter().map(|slot| slot.value().read()).collect();
        entries.sort_by(|a, b| a.evidence.id.cmp(&b.evidence.id));
        entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries currently in `status`.
    pub fn count_status(&self, status: EvidenceStatus) -> usize {
        self.entries
            .iter()
            .filter(|slot| slot.value().entry.read().status == status)
            .count()
    }

    /// Move `id` to Pending ahead of a consensus round and return the
    /// evidence the round should vote on.
    pub fn begin_round(&self, id: &str) -> Result<ThreatEvidence> {
        self.slot(id)?.write(|stored| {
            if stored.status == EvidenceStatus::Enhanced || stored.status == EvidenceStatus::Actioned {
                debug!(id, from = %stored.status, "Re-verifying evidence");
            }
            stored.transition(EvidenceStatus::Pending);
            Ok(stored.evidence.clone())
        })
    }

    /// Store a consensus outcome and move the entry to the matching status.
    pub fn record_consensus(&self, record: &ConsensusRecord) -> Result<EvidenceStatus> {
        let status = match record.outcome {
            ConsensusOutcome::Verified => EvidenceStatus::Verified,
            ConsensusOutcome::Disputed => EvidenceStatus::Disputed,
            ConsensusOutcome::Undetermined => EvidenceStatus::Undetermined,
        };

        self.slot(&record.evidence_id)?.write(|stored| {
            stored.consensus = Some(record.clone());
            stored.transition(status);
            Ok(status)
        })
    }

    /// Wait for exclusive enhancement rights on `id`.
    pub async fn lock_for_enhancement(&self, id: &str) -> Result<EnhancementGuard> {
        let slot = self.slot(id)?;
        let permit = Arc::clone(&slot.enhancement).lock_owned().await;
        trace!(id, "Enhancement lock acquired");
        let revision = slot.entry.read().revision;
        Ok(EnhancementGuard {
            id: id.to_string(),
            slot,
            revision,
            max_history: self.max_history,
            _permit: permit,
        })
    }

    /// Mark the entry Actioned, recording the decision in its history when
    /// it differs from the last one. Returns the appended record, if any.
    pub fn mark_actioned(&self, decision: &Decision) -> Result<Option<ActionRecord>> {
        let max_history = self.max_history;
        self.slot(&decision.evidence_id)?
            .write(|stored| stored.apply_decision(decision, max_history))
    }

    /// Drop entries no source has reported within the retention period.
    ///
    /// Entries under an enhancement guard are kept. Returns the number of
    /// entries removed; always zero when retention is disabled.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let Some(retention) = self.retention else {
            return 0;
        };
        let Some(cutoff) = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        else {
            return 0;
        };

        let before = self.entries.len();
        self.entries.retain(|_, slot| {
            slot.entry.read().last_seen >= cutoff || slot.enhancement.try_lock().is_err()
        });
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            info!(evicted, remaining = self.entries.len(), "Expired evidence evicted");
        }
        evicted
    }

    /// Write the configured snapshot file. Returns `None` when no snapshot
    /// path is configured.
    pub fn persist(&self) -> Result<Option<usize>> {
        match self.snapshot_path.as_deref() {
            Some(path) => self.persist_to(path).map(Some),
            None => {
                debug!("No snapshot path configured, skipping persist");
                Ok(None)
            }
        }
    }

    /// Write a snapshot of the store to `path`.
    pub fn persist_to(&self, path: &Path) -> Result<usize> {
        let entries = self.snapshot();
        let count = entries.len();
        StoreSnapshot::new(entries).write(path)?;
        Ok(count)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let removed = self.entries.len();
        self.entries.clear();
        if removed > 0 {
            warn!(removed, "Evidence store cleared");
        }
    }

    fn slot(&self, id: &str) -> Result<Arc<Slot>> {
        self.entries
            .get(id)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

/// Reject evidence whose id or hash does not match its payload.
fn check_integrity(evidence: &ThreatEvidence) -> Result<()> {
    evidence.validate()?;
    if evidence.id != evidence.content_id().to_hex() || !evidence.verify_hash() {
        return Err(StoreError::HashMismatch(evidence.id.clone()));
    }
    Ok(())
}

impl Default for EvidenceStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}
