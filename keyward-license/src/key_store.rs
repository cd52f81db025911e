//! The `keys` collection and its state machine.

use crate::config::KeyPolicy;
use crate::error::{LedgerError, LedgerResult};
use crate::keygen::KeyIdGenerator;
use keyward_storage::{Changeset, LedgerBackend};
use keyward_types::{Fingerprint, Identity, KeyId, KeyRecord, KeyState};

/// Consecutive id collisions tolerated before the key space is considered
/// exhausted.
pub(crate) const MAX_CONSECUTIVE_COLLISIONS: usize = 64;

pub(crate) struct KeyStore<'t> {
    backend: &'t dyn LedgerBackend,
    changes: &'t mut Changeset,
}

impl<'t> KeyStore<'t> {
    pub(crate) fn new(backend: &'t dyn LedgerBackend, changes: &'t mut Changeset) -> Self {
        Self { backend, changes }
    }

    /// Returns the latest view of a key.
    pub(crate) fn get(&self, id: &KeyId) -> LedgerResult<KeyRecord> {
        if let Some(staged) = self.changes.staged_key(id) {
            return Ok(staged.clone());
        }
        self.backend.get_key(id)?.ok_or(LedgerError::KeyNotFound)
    }

    fn exists(&self, id: &KeyId) -> LedgerResult<bool> {
        Ok(self.changes.staged_key(id).is_some() || self.backend.get_key(id)?.is_some())
    }

    /// Stages `count` fresh unredeemed keys and returns their ids.
    pub(crate) fn generate(
        &mut self,
        count: usize,
        max_batch: usize,
        policy: &KeyPolicy,
        ids: &dyn KeyIdGenerator,
    ) -> LedgerResult<Vec<KeyId>> {
        if count == 0 || count > max_batch {
            return Err(LedgerError::InvalidArgument(format!(
                "key count must be between 1 and {max_batch}, got {count}"
            )));
        }

        let mut fresh = Vec::with_capacity(count);
        while fresh.len() < count {
            let mut collisions = 0;
            let id = loop {
                let candidate = KeyId::parse(&ids.next_id(policy))
                    .map_err(|err| LedgerError::InvalidArgument(err.to_string()))?;
                if !self.exists(&candidate)? {
                    break candidate;
                }
                collisions += 1;
                if collisions >= MAX_CONSECUTIVE_COLLISIONS {
                    return Err(LedgerError::InvalidArgument(format!(
                        "key space exhausted after {collisions} consecutive collisions"
                    )));
                }
            };
            self.changes.insert_key(KeyRecord::new(id.clone()));
            fresh.push(id);
        }
        Ok(fresh)
    }

    pub(crate) fn transition_to_redeemed(&mut self, id: &KeyId, owner: &Identity) -> LedgerResult<()> {
        let current = self.get(id)?;
        match &current.state {
            KeyState::NotRedeemed => {
                let state = KeyState::Redeemed {
                    owner: owner.clone(),
                    fingerprint: None,
                };
                self.changes.update_key(&current, state);
                Ok(())
            }
            KeyState::Redeemed { .. } => Err(LedgerError::AlreadyRedeemed),
        }
    }

    pub(crate) fn bind_fingerprint(&mut self, id: &KeyId, fingerprint: &Fingerprint) -> LedgerResult<()> {
        let current = self.get(id)?;
        match &current.state {
            KeyState::NotRedeemed => Err(LedgerError::NotRedeemedYet),
            KeyState::Redeemed {
                fingerprint: Some(_),
                ..
            } => Err(LedgerError::AlreadyBound),
            KeyState::Redeemed {
                owner,
                fingerprint: None,
            } => {
                let state = KeyState::Redeemed {
                    owner: owner.clone(),
                    fingerprint: Some(fingerprint.clone()),
                };
                self.changes.update_key(&current, state);
                Ok(())
            }
        }
    }

    /// Unbinds a redeemed key. A key that is already unbound is left alone.
    pub(crate) fn clear_fingerprint(&mut self, id: &KeyId) -> LedgerResult<()> {
        let current = self.get(id)?;
        match &current.state {
            KeyState::NotRedeemed => Err(LedgerError::NotRedeemedYet),
            KeyState::Redeemed {
                fingerprint: None, ..
            } => Ok(()),
            KeyState::Redeemed { owner, .. } => {
                let state = KeyState::Redeemed {
                    owner: owner.clone(),
                    fingerprint: None,
                };
                self.changes.update_key(&current, state);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyPolicy;
    use crate::keygen::RandomKeyIds;
    use keyward_storage::MemoryBackend;
    use std::sync::Mutex;

    struct Fixed(Mutex<Vec<&'static str>>);

    impl KeyIdGenerator for Fixed {
        fn next_id(&self, _policy: &KeyPolicy) -> String {
            let mut ids = self.0.lock().unwrap();
            if ids.len() > 1 {
                ids.remove(0).to_string()
            } else {
                ids[0].to_string()
            }
        }
    }

    fn key(s: &str) -> KeyId {
        KeyId::parse(s).unwrap()
    }

    fn who(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    fn seeded(ids: &[&str]) -> MemoryBackend {
        let backend = MemoryBackend::new();
        let mut changes = Changeset::new();
        for id in ids {
            changes.insert_key(KeyRecord::new(key(id)));
        }
        backend.apply(&changes).unwrap();
        backend
    }

    #[test]
    fn generate_rejects_zero_and_oversized_batches() {
        let backend = MemoryBackend::new();
        let mut changes = Changeset::new();
        let mut store = KeyStore::new(&backend, &mut changes);
        let policy = KeyPolicy::default();
        assert!(matches!(
            store.generate(0, 10, &policy, &RandomKeyIds),
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.generate(11, 10, &policy, &RandomKeyIds),
            Err(LedgerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn generate_skips_existing_and_batch_ids() {
        let backend = seeded(&["A"]);
        let ids = Fixed(Mutex::new(vec!["A", "B", "B", "A", "C"]));
        let mut changes = Changeset::new();
        let fresh = KeyStore::new(&backend, &mut changes)
            .generate(2, 10, &KeyPolicy::default(), &ids)
            .unwrap();
        assert_eq!(fresh, vec![key("B"), key("C")]);
        assert_eq!(changes.key_writes().len(), 2);
    }

    #[test]
    fn generate_reports_exhausted_key_space() {
        let backend = seeded(&["A"]);
        let ids = Fixed(Mutex::new(vec!["A"]));
        let mut changes = Changeset::new();
        let err = KeyStore::new(&backend, &mut changes)
            .generate(1, 10, &KeyPolicy::default(), &ids)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(msg) if msg.contains("exhausted")));
    }

    #[test]
    fn redeem_transition_happens_once() {
        let backend = seeded(&["K1"]);
        let mut changes = Changeset::new();
        let mut store = KeyStore::new(&backend, &mut changes);
        store.transition_to_redeemed(&key("K1"), &who("alice")).unwrap();
        assert!(matches!(
            store.transition_to_redeemed(&key("K1"), &who("bob")),
            Err(LedgerError::AlreadyRedeemed)
        ));
        assert!(matches!(
            store.transition_to_redeemed(&key("K9"), &who("bob")),
            Err(LedgerError::KeyNotFound)
        ));
        assert_eq!(store.get(&key("K1")).unwrap().owner(), Some(&who("alice")));
    }

    #[test]
    fn bind_and_clear_follow_the_state_machine() {
        let backend = seeded(&["K1"]);
        let mut changes = Changeset::new();
        let mut store = KeyStore::new(&backend, &mut changes);
        let fp = Fingerprint::parse("FP-1").unwrap();

        assert!(matches!(
            store.bind_fingerprint(&key("K1"), &fp),
            Err(LedgerError::NotRedeemedYet)
        ));
        assert!(matches!(
            store.clear_fingerprint(&key("K1")),
            Err(LedgerError::NotRedeemedYet)
        ));

        store.transition_to_redeemed(&key("K1"), &who("alice")).unwrap();
        store.clear_fingerprint(&key("K1")).unwrap();
        store.bind_fingerprint(&key("K1"), &fp).unwrap();
        assert!(matches!(
            store.bind_fingerprint(&key("K1"), &fp),
            Err(LedgerError::AlreadyBound)
        ));
        store.clear_fingerprint(&key("K1")).unwrap();
        assert_eq!(store.get(&key("K1")).unwrap().fingerprint(), None);

        // All staged changes collapse into one revision bump.
        assert_eq!(changes.key_writes().len(), 1);
        backend.apply(&changes).unwrap();
        assert_eq!(backend.get_key(&key("K1")).unwrap().unwrap().revision, 1);
    }
}
