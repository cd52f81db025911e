//! In-memory ledger backend.

use crate::backend::{Collection, LedgerBackend};
use crate::changeset::{Changeset, KeyWrite};
use crate::error::{StorageError, StorageResult};
use crate::snapshot::LedgerSnapshot;
use chrono::{DateTime, Utc};
use keyward_types::{AuditEntry, Identity, KeyId, KeyRecord};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    keys: HashMap<KeyId, KeyRecord>,
    index: HashMap<Identity, KeyId>,
    cooldowns: HashMap<Identity, DateTime<Utc>>,
    audit: Vec<AuditEntry>,
    audited: HashMap<KeyId, usize>,
}

impl Tables {
    /// Verifies every precondition of `changes` without mutating anything.
    fn check(&self, changes: &Changeset) -> StorageResult<()> {
        let mut seen = HashSet::new();
        for write in changes.key_writes() {
            let record = write.record();
            if !seen.insert(&record.id) {
                return Err(StorageError::Conflict(Collection::Keys));
            }
            let holds = match write {
                KeyWrite::Insert(_) => !self.keys.contains_key(&record.id),
                KeyWrite::Update {
                    expected_revision, ..
                } => self
                    .keys
                    .get(&record.id)
                    .is_some_and(|stored| stored.revision == *expected_revision),
            };
            if !holds {
                return Err(StorageError::Conflict(Collection::Keys));
            }
        }

        let mut identities = HashSet::new();
        let mut indexed_keys = HashSet::new();
        for (identity, key_id) in changes.index_inserts() {
            let taken = self.index.contains_key(identity)
                || self.index.values().any(|owned| owned == key_id);
            if taken || !identities.insert(identity) || !indexed_keys.insert(key_id) {
                return Err(StorageError::Conflict(Collection::IdentityIndex));
            }
        }

        for write in changes.cooldown_writes() {
            if self.cooldowns.get(&write.identity).copied() != write.previous {
                return Err(StorageError::Conflict(Collection::Cooldowns));
            }
        }

        let mut audited = HashSet::new();
        for entry in changes.audit_entries() {
            if self.audited.contains_key(&entry.key_id) || !audited.insert(&entry.key_id) {
                return Err(StorageError::Conflict(Collection::AuditLog));
            }
        }
        Ok(())
    }
}

/// Ledger held entirely in memory behind one `RwLock`.
///
/// Nothing survives the process; use it for tests or when the embedder
/// persists [`LedgerSnapshot`]s itself.
#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    /// Creates an empty in-memory ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StorageError::Poisoned)
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StorageError::Poisoned)
    }
}

impl LedgerBackend for MemoryBackend {
    fn get_key(&self, id: &KeyId) -> StorageResult<Option<KeyRecord>> {
        Ok(self.read()?.keys.get(id).cloned())
    }

    fn lookup_identity(&self, identity: &Identity) -> StorageResult<Option<KeyId>> {
        Ok(self.read()?.index.get(identity).cloned())
    }

    fn last_rebind(&self, identity: &Identity) -> StorageResult<Option<DateTime<Utc>>> {
        Ok(self.read()?.cooldowns.get(identity).copied())
    }

    fn audit_entry(&self, key_id: &KeyId) -> StorageResult<Option<AuditEntry>> {
        let tables = self.read()?;
        Ok(tables
            .audited
            .get(key_id)
            .and_then(|pos| tables.audit.get(*pos))
            .cloned())
    }

    fn apply(&self, changes: &Changeset) -> StorageResult<()> {
        let mut tables = self.write()?;
        tables.check(changes)?;

        for write in changes.key_writes() {
            let record = write.record().clone();
            tables.keys.insert(record.id.clone(), record);
        }
        for (identity, key_id) in changes.index_inserts() {
            tables.index.insert(identity.clone(), key_id.clone());
        }
        for write in changes.cooldown_writes() {
            tables
                .cooldowns
                .insert(write.identity.clone(), write.granted_at);
        }
        for entry in changes.audit_entries() {
            let pos = tables.audit.len();
            tables.audited.insert(entry.key_id.clone(), pos);
            tables.audit.push(entry.clone());
        }
        Ok(())
    }

    fn snapshot(&self) -> StorageResult<LedgerSnapshot> {
        let tables = self.read()?;
        Ok(LedgerSnapshot {
            keys: tables
                .keys
                .iter()
                .map(|(id, record)| (id.clone(), record.clone()))
                .collect(),
            identity_index: tables
                .index
                .iter()
                .map(|(identity, key_id)| (identity.clone(), key_id.clone()))
                .collect(),
            cooldowns: tables
                .cooldowns
                .iter()
                .map(|(identity, at)| (identity.clone(), *at))
                .collect(),
            audit_log: tables.audit.clone(),
        })
    }
}
