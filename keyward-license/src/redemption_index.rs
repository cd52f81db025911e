//! The identity → key index.

use crate::error::{LedgerError, LedgerResult};
use keyward_storage::{Changeset, LedgerBackend};
use keyward_types::{Identity, KeyId};

pub(crate) struct RedemptionIndex<'t> {
    backend: &'t dyn LedgerBackend,
    changes: &'t mut Changeset,
}

impl<'t> RedemptionIndex<'t> {
    pub(crate) fn new(backend: &'t dyn LedgerBackend, changes: &'t mut Changeset) -> Self {
        Self { backend, changes }
    }

    pub(crate) fn lookup(&self, identity: &Identity) -> LedgerResult<KeyId> {
        if let Some(staged) = self.changes.staged_identity(identity) {
            return Ok(staged.clone());
        }
        self.backend
            .lookup_identity(identity)?
            .ok_or(LedgerError::IdentityNotFound)
    }

    /// Stages `identity → key_id` unless the identity already owns a key.
    pub(crate) fn assign_if_absent(&mut self, identity: &Identity, key_id: &KeyId) -> LedgerResult<()> {
        match self.lookup(identity) {
            Ok(_) => Err(LedgerError::AlreadyOwnsKey),
            Err(LedgerError::IdentityNotFound) => {
                self.changes.assign_identity(identity.clone(), key_id.clone());
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_storage::MemoryBackend;

    #[test]
    fn assignment_is_first_wins() {
        let backend = MemoryBackend::new();
        let mut changes = Changeset::new();
        let mut index = RedemptionIndex::new(&backend, &mut changes);
        let alice = Identity::parse("alice").unwrap();
        let k1 = KeyId::parse("K1").unwrap();
        let k2 = KeyId::parse("K2").unwrap();

        assert!(matches!(index.lookup(&alice), Err(LedgerError::IdentityNotFound)));
        index.assign_if_absent(&alice, &k1).unwrap();
        assert!(matches!(
            index.assign_if_absent(&alice, &k2),
            Err(LedgerError::AlreadyOwnsKey)
        ));
        assert_eq!(index.lookup(&alice).unwrap(), k1);
    }
}
