//! The license service: key lifecycle operations over an injected ledger.

use crate::config::LicenseConfig;
use crate::error::{LedgerError, LicenseError, LicenseResult};
use crate::keygen::{KeyIdGenerator, RandomKeyIds};
use crate::locks::{LockKey, LockTable};
use crate::txn::Txn;
use chrono::{DateTime, TimeDelta, Utc};
use keyward_storage::{Collection, LedgerBackend, LedgerSnapshot, StorageError};
use keyward_types::{ConfirmationEvent, Fingerprint, Identity, KeyId, KeyStatus};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How often key generation retries a batch that lost a commit race.
const GENERATE_ATTEMPTS: usize = 3;

/// What any caller may learn about a key.
///
/// The bound fingerprint itself is never exposed, only whether it equals
/// the candidate supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyInspection {
    pub exists: bool,
    pub status: Option<KeyStatus>,
    pub fingerprint_matches: bool,
}

/// The key and fingerprint an identity currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnBinding {
    pub key_id: KeyId,
    pub fingerprint: Fingerprint,
}

/// Maps a commit failure, giving conflicts an operation-specific meaning.
fn commit_error(err: StorageError, conflict: impl FnOnce(Collection) -> LicenseError) -> LicenseError {
    match err {
        StorageError::Conflict(collection) => {
            debug!(%collection, "commit lost a race with another writer");
            conflict(collection)
        }
        other => LicenseError::Storage(other),
    }
}

/// Owns the four ledger collections and enforces the key lifecycle.
///
/// Operations on different identities and keys run concurrently; operations
/// touching the same identity or key are serialized through a lock table.
/// Every operation commits all of its effects with one backend call, so a
/// failure at any step leaves the ledger as it was.
pub struct LicenseService {
    backend: Arc<dyn LedgerBackend>,
    locks: LockTable,
    config: LicenseConfig,
    cooldown: TimeDelta,
    key_ids: Box<dyn KeyIdGenerator>,
}

impl LicenseService {
    /// Creates a service generating random key ids.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidArgument`] if the config is invalid.
    pub fn new(backend: Arc<dyn LedgerBackend>, config: LicenseConfig) -> LicenseResult<Self> {
        Self::with_generator(backend, config, Box::new(RandomKeyIds))
    }

    /// Creates a service with a custom key id source.
    pub fn with_generator(
        backend: Arc<dyn LedgerBackend>,
        config: LicenseConfig,
        key_ids: Box<dyn KeyIdGenerator>,
    ) -> LicenseResult<Self> {
        config.validate()?;
        let cooldown = config.cooldown_period().ok_or_else(|| {
            LicenseError::InvalidArgument("cooldown_secs is out of range".to_string())
        })?;
        Ok(Self {
            backend,
            locks: LockTable::new(config.lock_timeout()),
            config,
            cooldown,
            key_ids,
        })
    }

    #[must_use]
    pub fn config(&self) -> &LicenseConfig {
        &self.config
    }

    fn txn(&self) -> Txn<'_> {
        Txn::begin(self.backend.as_ref())
    }

    // ── Keys ─────────────────────────────────────────────────────

    /// Creates `count` new unredeemed keys and returns their ids.
    pub fn generate_keys(&self, count: usize) -> LicenseResult<Vec<KeyId>> {
        for attempt in 1..=GENERATE_ATTEMPTS {
            let mut txn = self.txn();
            let ids = txn.keys().generate(
                count,
                self.config.max_batch,
                &self.config.key_policy,
                self.key_ids.as_ref(),
            )?;
            match txn.commit() {
                Ok(()) => {
                    info!(count, "generated keys");
                    return Ok(ids);
                }
                Err(StorageError::Conflict(_)) => {
                    debug!(attempt, "generated batch collided at commit, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        warn!(count, "giving up on key generation after repeated commit conflicts");
        Err(LicenseError::Busy)
    }

    /// Redeems `key_id` for `identity`.
    ///
    /// The key must never have been redeemed and the identity must not own a
    /// key yet. On success the key is owned, the identity is indexed to it,
    /// and the key is in the audit log, all in one commit.
    pub async fn redeem(&self, identity: &Identity, key_id: &KeyId) -> LicenseResult<()> {
        let _guard = self
            .locks
            .acquire(vec![
                LockKey::Identity(identity.clone()),
                LockKey::Key(key_id.clone()),
            ])
            .await?;

        let mut txn = self.txn();
        if txn.audit().contains(key_id)? {
            debug!(%identity, %key_id, "redeem rejected, key already audited");
            return Err(LicenseError::InvalidKey);
        }
        txn.keys()
            .transition_to_redeemed(key_id, identity)
            .inspect_err(|err| debug!(%identity, %key_id, %err, "redeem rejected"))?;
        // Returning here drops the staged transition with the txn.
        txn.index().assign_if_absent(identity, key_id)?;
        txn.audit().record_once(key_id, identity, Utc::now())?;

        txn.commit().map_err(|err| {
            commit_error(err, |collection| match collection {
                Collection::IdentityIndex => LicenseError::AlreadyOwnsKey,
                _ => LicenseError::InvalidKey,
            })
        })?;
        info!(%identity, %key_id, "key redeemed");
        Ok(())
    }

    // ── Bindings ─────────────────────────────────────────────────

    /// Binds a fingerprint to a redeemed, unbound key.
    pub async fn confirm_binding(&self, key_id: &KeyId, fingerprint: &Fingerprint) -> LicenseResult<()> {
        let _guard = self.locks.acquire(vec![LockKey::Key(key_id.clone())]).await?;

        let mut txn = self.txn();
        txn.keys().bind_fingerprint(key_id, fingerprint)?;
        txn.commit()
            .map_err(|err| commit_error(err, |_| LicenseError::AlreadyBound))?;
        info!(%key_id, "fingerprint bound");
        Ok(())
    }

    /// Applies a confirmation delivered by a relay.
    ///
    /// The event's identity is recorded in the log only; the binding is
    /// decided by the key alone.
    pub async fn confirm(&self, event: &ConfirmationEvent) -> LicenseResult<()> {
        debug!(identity = %event.identity, key_id = %event.key_id, "confirmation received");
        self.confirm_binding(&event.key_id, &event.fingerprint).await
    }

    /// Clears the fingerprint of the identity's key, rate limited to one
    /// grant per `period`. Returns the key that was reset.
    ///
    /// A rejected or failed reset leaves the cooldown untouched. A period
    /// that is not positive is rejected with
    /// [`LicenseError::InvalidArgument`].
    pub async fn reset_binding(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
        period: TimeDelta,
    ) -> LicenseResult<KeyId> {
        if period <= TimeDelta::zero() {
            return Err(LicenseError::InvalidArgument(
                "cooldown period must be positive".to_string(),
            ));
        }
        // Index entries are never removed, so the owned key can only go from
        // absent to present between this read and taking the locks.
        let mut owned = self.backend.lookup_identity(identity)?;
        let _guard = loop {
            let mut keys = vec![LockKey::Identity(identity.clone())];
            keys.extend(owned.clone().map(LockKey::Key));
            let guard = self.locks.acquire(keys).await?;
            let current = self.backend.lookup_identity(identity)?;
            if current == owned {
                break guard;
            }
            owned = current;
        };

        let mut txn = self.txn();
        txn.cooldowns()
            .try_consume(identity, now, period)
            .inspect_err(|_| debug!(%identity, "rebind rate limited"))?;
        let key_id = txn.index().lookup(identity)?;
        txn.keys()
            .clear_fingerprint(&key_id)
            .map_err(|err| match err {
                LedgerError::KeyNotFound => LicenseError::NoActiveKey,
                other => other.into(),
            })?;
        txn.commit()
            .map_err(|err| commit_error(err, |_| LicenseError::Busy))?;
        info!(%identity, %key_id, "fingerprint reset");
        Ok(key_id)
    }

    /// [`reset_binding`](Self::reset_binding) with the configured cooldown
    /// and the current time.
    pub async fn reset_binding_now(&self, identity: &Identity) -> LicenseResult<KeyId> {
        self.reset_binding(identity, Utc::now(), self.cooldown)
            .await
    }

    // ── Inspection ───────────────────────────────────────────────

    /// Returns the identity's own key and bound fingerprint.
    pub fn inspect_own_fingerprint(&self, identity: &Identity) -> LicenseResult<OwnBinding> {
        let mut txn = self.txn();
        let key_id = txn.index().lookup(identity)?;
        let record = txn.keys().get(&key_id).map_err(|err| match err {
            LedgerError::KeyNotFound => LicenseError::NoActiveKey,
            other => other.into(),
        })?;
        let fingerprint = record.fingerprint().cloned().ok_or(LicenseError::NotBoundYet)?;
        Ok(OwnBinding {
            key_id,
            fingerprint,
        })
    }

    /// Reports whether a key exists, its status, and whether its bound
    /// fingerprint equals `candidate`.
    pub fn inspect_key_status(
        &self,
        key_id: &KeyId,
        candidate: Option<&Fingerprint>,
    ) -> LicenseResult<KeyInspection> {
        let Some(record) = self.backend.get_key(key_id)? else {
            return Ok(KeyInspection {
                exists: false,
                status: None,
                fingerprint_matches: false,
            });
        };
        let fingerprint_matches = match (record.fingerprint(), candidate) {
            (Some(bound), Some(candidate)) => bound == candidate,
            _ => false,
        };
        Ok(KeyInspection {
            exists: true,
            status: Some(record.status()),
            fingerprint_matches,
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Exports a consistent copy of the whole ledger.
    pub fn snapshot(&self) -> LicenseResult<LedgerSnapshot> {
        Ok(self.backend.snapshot()?)
    }

    /// Loads a whole ledger into an empty backend in one commit.
    pub fn restore(&self, snapshot: &LedgerSnapshot) -> LicenseResult<()> {
        self.backend.restore(snapshot)?;
        info!(keys = snapshot.keys.len(), "ledger restored from snapshot");
        Ok(())
    }

    /// Flushes the backend to durable storage.
    pub fn flush(&self) -> LicenseResult<()> {
        Ok(self.backend.flush()?)
    }

    /// Flushes and drops the service.
    pub fn shutdown(self) -> LicenseResult<()> {
        self.flush()?;
        info!("license service stopped");
        Ok(())
    }
}
