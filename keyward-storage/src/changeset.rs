//! Staged writes committed as one unit.
//!
//! A changeset doubles as the read overlay of an in-flight operation: the
//! `staged_*` accessors let later steps observe what earlier steps wrote
//! before anything reaches the backend. Dropping a changeset discards it.

use chrono::{DateTime, Utc};
use keyward_types::{AuditEntry, Identity, KeyId, KeyRecord, KeyState};

/// A staged write to the `keys` collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyWrite {
    /// A new key. Fails if the id already exists.
    Insert(KeyRecord),
    /// Replaces a key whose stored revision is still `expected_revision`.
    Update {
        expected_revision: u64,
        record: KeyRecord,
    },
}

impl KeyWrite {
    /// The record as it will be stored.
    #[must_use]
    pub fn record(&self) -> &KeyRecord {
        match self {
            Self::Insert(record) | Self::Update { record, .. } => record,
        }
    }

    fn record_mut(&mut self) -> &mut KeyRecord {
        match self {
            Self::Insert(record) | Self::Update { record, .. } => record,
        }
    }
}

/// A staged write to the `cooldowns` collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownWrite {
    pub identity: Identity,
    /// The value the entry must still hold at commit (`None`: no entry).
    pub previous: Option<DateTime<Utc>>,
    pub granted_at: DateTime<Utc>,
}

/// Writes to all four collections, applied atomically by a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    keys: Vec<KeyWrite>,
    index: Vec<(Identity, KeyId)>,
    cooldowns: Vec<CooldownWrite>,
    audit: Vec<AuditEntry>,
}

impl Changeset {
    /// Creates an empty changeset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if nothing has been staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
            && self.index.is_empty()
            && self.cooldowns.is_empty()
            && self.audit.is_empty()
    }

    // ── Keys ─────────────────────────────────────────────────────

    /// Stages a new key record.
    pub fn insert_key(&mut self, record: KeyRecord) {
        self.keys.push(KeyWrite::Insert(record));
    }

    /// Stages a state change for `current`, which must be the latest view of
    /// the key (staged or committed).
    pub fn update_key(&mut self, current: &KeyRecord, state: KeyState) {
        if let Some(write) = self.keys.iter_mut().find(|w| w.record().id == current.id) {
            write.record_mut().state = state;
            return;
        }
        self.keys.push(KeyWrite::Update {
            expected_revision: current.revision,
            record: KeyRecord {
                id: current.id.clone(),
                state,
                revision: current.revision + 1,
            },
        });
    }

    /// Returns the staged version of a key, if any.
    #[must_use]
    pub fn staged_key(&self, id: &KeyId) -> Option<&KeyRecord> {
        self.keys
            .iter()
            .map(KeyWrite::record)
            .find(|record| &record.id == id)
    }

    #[must_use]
    pub fn key_writes(&self) -> &[KeyWrite] {
        &self.keys
    }

    // ── Identity index ───────────────────────────────────────────

    /// Stages a new identity → key entry.
    pub fn assign_identity(&mut self, identity: Identity, key_id: KeyId) {
        self.index.push((identity, key_id));
    }

    #[must_use]
    pub fn staged_identity(&self, identity: &Identity) -> Option<&KeyId> {
        self.index
            .iter()
            .find(|(staged, _)| staged == identity)
            .map(|(_, key_id)| key_id)
    }

    #[must_use]
    pub fn index_inserts(&self) -> &[(Identity, KeyId)] {
        &self.index
    }

    // ── Cooldowns ────────────────────────────────────────────────

    /// Stages a rebind grant. `previous` is the committed value the grant
    /// was decided against.
    pub fn grant_cooldown(
        &mut self,
        identity: Identity,
        previous: Option<DateTime<Utc>>,
        granted_at: DateTime<Utc>,
    ) {
        if let Some(write) = self.cooldowns.iter_mut().find(|w| w.identity == identity) {
            write.granted_at = granted_at;
            return;
        }
        self.cooldowns.push(CooldownWrite {
            identity,
            previous,
            granted_at,
        });
    }

    #[must_use]
    pub fn staged_cooldown(&self, identity: &Identity) -> Option<DateTime<Utc>> {
        self.cooldowns
            .iter()
            .find(|w| &w.identity == identity)
            .map(|w| w.granted_at)
    }

    #[must_use]
    pub fn cooldown_writes(&self) -> &[CooldownWrite] {
        &self.cooldowns
    }

    // ── Audit log ────────────────────────────────────────────────

    /// Stages an audit append.
    pub fn record_audit(&mut self, entry: AuditEntry) {
        self.audit.push(entry);
    }

    #[must_use]
    pub fn is_audit_staged(&self, key_id: &KeyId) -> bool {
        self.audit.iter().any(|entry| &entry.key_id == key_id)
    }

    #[must_use]
    pub fn audit_entries(&self) -> &[AuditEntry] {
        &self.audit
    }
}
