//! Serializable copy of a whole ledger.
//!
//! The four collections are kept under their persisted names so a snapshot
//! can be exported by one backend, inspected as JSON, and restored into
//! another. [`LedgerSnapshot::validate`] is the single place the cross
//! collection invariants are spelled out.

use crate::changeset::Changeset;
use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use keyward_types::{AuditEntry, Identity, KeyId, KeyRecord, KeyStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// All four ledger collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub keys: BTreeMap<KeyId, KeyRecord>,
    pub identity_index: BTreeMap<Identity, KeyId>,
    pub cooldowns: BTreeMap<Identity, DateTime<Utc>>,
    pub audit_log: Vec<AuditEntry>,
}

fn invalid(message: String) -> StorageError {
    StorageError::InvalidData(message)
}

impl LedgerSnapshot {
    /// Returns true if all four collections are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
            && self.identity_index.is_empty()
            && self.cooldowns.is_empty()
            && self.audit_log.is_empty()
    }

    /// Checks every invariant that ties the collections together.
    ///
    /// Every owner of a redeemed key must be indexed, though not necessarily
    /// to that key (see [`superseded_keys`](Self::superseded_keys)).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidData`] describing the first violation.
    pub fn validate(&self) -> StorageResult<()> {
        for (id, record) in &self.keys {
            if id != &record.id {
                return Err(invalid(format!("key entry {id} holds record {}", record.id)));
            }
        }

        for (identity, key_id) in &self.identity_index {
            let record = self
                .keys
                .get(key_id)
                .ok_or_else(|| invalid(format!("{identity} is indexed to unknown key {key_id}")))?;
            if record.owner() != Some(identity) {
                return Err(invalid(format!(
                    "{identity} is indexed to key {key_id} it does not own"
                )));
            }
        }

        let mut audited = HashSet::new();
        for entry in &self.audit_log {
            if !audited.insert(&entry.key_id) {
                return Err(invalid(format!("key {} is audited twice", entry.key_id)));
            }
            match self.keys.get(&entry.key_id).and_then(KeyRecord::owner) {
                Some(owner) if owner == &entry.identity => {}
                Some(_) => {
                    return Err(invalid(format!(
                        "audit entry for key {} names the wrong identity",
                        entry.key_id
                    )));
                }
                None => {
                    return Err(invalid(format!(
                        "audit entry for key {} that is not redeemed",
                        entry.key_id
                    )));
                }
            }
        }

        for record in self.keys.values() {
            let Some(owner) = record.owner() else {
                continue;
            };
            if !self.identity_index.contains_key(owner) {
                return Err(invalid(format!(
                    "redeemed key {} belongs to {owner}, who has no indexed key",
                    record.id
                )));
            }
            if !audited.contains(&record.id) {
                return Err(invalid(format!(
                    "redeemed key {} is missing from the audit log",
                    record.id
                )));
            }
        }

        for identity in self.cooldowns.keys() {
            if !self.identity_index.contains_key(identity) {
                return Err(invalid(format!(
                    "cooldown recorded for {identity}, who owns no key"
                )));
            }
        }
        Ok(())
    }

    /// Redeemed keys whose owner is indexed to a different key.
    ///
    /// The service never creates these; they come from ledgers where an
    /// identity redeemed more than once and only the latest key stayed active.
    pub fn superseded_keys(&self) -> impl Iterator<Item = &KeyRecord> + '_ {
        self.keys.values().filter(|record| {
            record
                .owner()
                .is_some_and(|owner| self.identity_index.get(owner) != Some(&record.id))
        })
    }

    /// Returns how many keys are in each status.
    #[must_use]
    pub fn count_by_status(&self, status: KeyStatus) -> usize {
        self.keys.values().filter(|r| r.status() == status).count()
    }

    /// Builds a changeset that inserts the whole snapshot.
    pub(crate) fn to_changeset(&self) -> Changeset {
        let mut changes = Changeset::new();
        for record in self.keys.values() {
            changes.insert_key(record.clone());
        }
        for (identity, key_id) in &self.identity_index {
            changes.assign_identity(identity.clone(), key_id.clone());
        }
        for (identity, at) in &self.cooldowns {
            changes.grant_cooldown(identity.clone(), None, *at);
        }
        for entry in &self.audit_log {
            changes.record_audit(entry.clone());
        }
        changes
    }
}
