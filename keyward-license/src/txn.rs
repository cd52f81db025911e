//! Unit of work shared by the ledger components.

use crate::audit_log::AuditLog;
use crate::cooldown::CooldownLedger;
use crate::key_store::KeyStore;
use crate::redemption_index::RedemptionIndex;
use keyward_storage::{Changeset, LedgerBackend, StorageResult};

/// Stages the effects of one service operation.
///
/// Components read through the staged writes first, then committed state.
/// Nothing reaches the backend until [`Txn::commit`]; dropping a `Txn`
/// discards everything staged in it.
pub(crate) struct Txn<'b> {
    backend: &'b dyn LedgerBackend,
    changes: Changeset,
}

impl<'b> Txn<'b> {
    pub(crate) fn begin(backend: &'b dyn LedgerBackend) -> Self {
        Self {
            backend,
            changes: Changeset::new(),
        }
    }

    pub(crate) fn keys(&mut self) -> KeyStore<'_> {
        KeyStore::new(self.backend, &mut self.changes)
    }

    pub(crate) fn index(&mut self) -> RedemptionIndex<'_> {
        RedemptionIndex::new(self.backend, &mut self.changes)
    }

    pub(crate) fn cooldowns(&mut self) -> CooldownLedger<'_> {
        CooldownLedger::new(self.backend, &mut self.changes)
    }

    pub(crate) fn audit(&mut self) -> AuditLog<'_> {
        AuditLog::new(self.backend, &mut self.changes)
    }

    /// Applies every staged write in one backend commit.
    pub(crate) fn commit(self) -> StorageResult<()> {
        self.backend.apply(&self.changes)
    }
}
