//! The storage port the license service is built on.

use crate::changeset::Changeset;
use crate::error::{StorageError, StorageResult};
use crate::snapshot::LedgerSnapshot;
use chrono::{DateTime, Utc};
use keyward_types::{AuditEntry, Identity, KeyId, KeyRecord};
use std::fmt;

/// The four persisted collections of a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Keys,
    IdentityIndex,
    Cooldowns,
    AuditLog,
}

impl Collection {
    /// Returns the collection's persisted name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Keys => "keys",
            Self::IdentityIndex => "identity_index",
            Self::Cooldowns => "cooldowns",
            Self::AuditLog => "audit_log",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable home of the four ledger collections.
///
/// Reads are single-row and see only committed state. All writes go through
/// [`LedgerBackend::apply`], which must commit a whole [`Changeset`] or none
/// of it: every key update is checked against its expected revision, and
/// index, cooldown and audit writes are checked against the state they were
/// staged from. Any failed check aborts the commit with
/// [`StorageError::Conflict`].
pub trait LedgerBackend: Send + Sync {
    /// Loads a key record.
    fn get_key(&self, id: &KeyId) -> StorageResult<Option<KeyRecord>>;

    /// Returns the key owned by an identity.
    fn lookup_identity(&self, identity: &Identity) -> StorageResult<Option<KeyId>>;

    /// Returns when an identity was last granted a rebind.
    fn last_rebind(&self, identity: &Identity) -> StorageResult<Option<DateTime<Utc>>>;

    /// Returns the audit entry for a key, if it was ever redeemed.
    fn audit_entry(&self, key_id: &KeyId) -> StorageResult<Option<AuditEntry>>;

    /// Atomically commits a changeset.
    fn apply(&self, changes: &Changeset) -> StorageResult<()>;

    /// Exports a consistent copy of all four collections.
    fn snapshot(&self) -> StorageResult<LedgerSnapshot>;

    /// Flushes buffered state to durable storage.
    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Loads a validated snapshot into an empty backend in one commit.
    fn restore(&self, snapshot: &LedgerSnapshot) -> StorageResult<()> {
        snapshot.validate()?;
        if !self.snapshot()?.is_empty() {
            return Err(StorageError::InvalidData(
                "restore requires an empty ledger".to_string(),
            ));
        }
        self.apply(&snapshot.to_changeset())
    }
}
