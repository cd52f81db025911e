//! Append-only record of redeemed keys.

use crate::error::{LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use keyward_storage::{Changeset, LedgerBackend};
use keyward_types::{AuditEntry, Identity, KeyId};

pub(crate) struct AuditLog<'t> {
    backend: &'t dyn LedgerBackend,
    changes: &'t mut Changeset,
}

impl<'t> AuditLog<'t> {
    pub(crate) fn new(backend: &'t dyn LedgerBackend, changes: &'t mut Changeset) -> Self {
        Self { backend, changes }
    }

    pub(crate) fn contains(&self, key_id: &KeyId) -> LedgerResult<bool> {
        Ok(self.changes.is_audit_staged(key_id) || self.backend.audit_entry(key_id)?.is_some())
    }

    pub(crate) fn record_once(
        &mut self,
        key_id: &KeyId,
        identity: &Identity,
        recorded_at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        if self.contains(key_id)? {
            return Err(LedgerError::AlreadyRecorded);
        }
        self.changes
            .record_audit(AuditEntry::new(key_id.clone(), identity.clone(), recorded_at));
        Ok(())
    }
}
