//! Import of the JSON files written by the legacy key bot.
//!
//! The bot kept four independent files and rewrote each one without any
//! coordination, so real-world data can disagree with itself. Import builds a
//! [`LedgerSnapshot`] and refuses anything that would violate a ledger
//! invariant instead of guessing which file is right.
//!
//! Formats:
//! - `keys.json`: `{"<key>": {"status": "not redeemed"}}` or
//!   `{"<key>": {"status": "redeemed", "redeemed_by": "@<user>", "hwid": null}}`
//! - `users.json`: `{"<user>": "<key>"}`
//! - `cooldowns.json`: `{"<user>": <unix seconds, fractional>}`
//! - `usedkeys.json`: `["<key>", ...]`

use crate::error::{StorageError, StorageResult};
use crate::snapshot::LedgerSnapshot;
use chrono::{DateTime, Utc};
use keyward_types::{AuditEntry, Fingerprint, Identity, KeyId, KeyRecord, KeyState};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

/// Raw contents of the four legacy files. An empty string stands for a
/// missing file.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyFiles<'a> {
    pub keys: &'a str,
    pub users: &'a str,
    pub cooldowns: &'a str,
    pub used_keys: &'a str,
}

#[derive(Debug, Deserialize)]
struct LegacyKey {
    status: String,
    #[serde(default)]
    redeemed_by: Option<String>,
    #[serde(default)]
    hwid: Option<String>,
}

fn parse_or_default<T: DeserializeOwned + Default>(raw: &str) -> StorageResult<T> {
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(raw)?)
}

fn legacy_state(id: &KeyId, key: LegacyKey) -> StorageResult<KeyState> {
    match key.status.as_str() {
        "not redeemed" => {
            if key.hwid.is_some() {
                return Err(StorageError::InvalidData(format!(
                    "unredeemed key {id} carries a hwid"
                )));
            }
            Ok(KeyState::NotRedeemed)
        }
        "redeemed" => {
            let owner = key.redeemed_by.as_deref().ok_or_else(|| {
                StorageError::InvalidData(format!("redeemed key {id} has no redeemed_by"))
            })?;
            let owner = owner.strip_prefix('@').unwrap_or(owner);
            Ok(KeyState::Redeemed {
                owner: Identity::parse(owner)?,
                fingerprint: key.hwid.as_deref().map(Fingerprint::parse).transpose()?,
            })
        }
        other => Err(StorageError::InvalidData(format!(
            "key {id} has unknown status {other:?}"
        ))),
    }
}

/// Converts the legacy files into a validated snapshot.
///
/// Redeemed keys missing from `usedkeys.json` are appended to the audit log;
/// audit timestamps are unknown in the legacy data and are set to
/// `imported_at`. The bot let a user redeem again and overwrote their
/// `users.json` entry, so `users.json` names the active key and the user's
/// earlier keys are imported as redeemed but superseded.
///
/// # Errors
///
/// Returns an error if a file is malformed or the combined data breaks a
/// ledger invariant.
pub fn import(files: &LegacyFiles<'_>, imported_at: DateTime<Utc>) -> StorageResult<LedgerSnapshot> {
    let keys: BTreeMap<String, LegacyKey> = parse_or_default(files.keys)?;
    let users: BTreeMap<String, String> = parse_or_default(files.users)?;
    let cooldowns: BTreeMap<String, f64> = parse_or_default(files.cooldowns)?;
    let used_keys: Vec<String> = parse_or_default(files.used_keys)?;

    let mut snapshot = LedgerSnapshot::default();

    for (raw_id, legacy) in keys {
        let id = KeyId::parse(&raw_id)?;
        let state = legacy_state(&id, legacy)?;
        snapshot.keys.insert(
            id.clone(),
            KeyRecord {
                id,
                state,
                revision: 0,
            },
        );
    }

    for (user, raw_key) in users {
        snapshot
            .identity_index
            .insert(Identity::parse(&user)?, KeyId::parse(&raw_key)?);
    }

    for (user, secs) in cooldowns {
        let granted_at = DateTime::from_timestamp_millis((secs * 1000.0) as i64).ok_or_else(|| {
            StorageError::InvalidData(format!("cooldown for {user} is out of range"))
        })?;
        snapshot.cooldowns.insert(Identity::parse(&user)?, granted_at);
    }

    let mut audited = HashSet::new();
    let redeemed_in_order = used_keys
        .iter()
        .map(|raw| KeyId::parse(raw))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .chain(
            snapshot
                .keys
                .values()
                .filter(|record| record.owner().is_some())
                .map(|record| record.id.clone())
                .collect::<Vec<_>>(),
        );
    for key_id in redeemed_in_order {
        if !audited.insert(key_id.clone()) {
            continue;
        }
        let owner = snapshot
            .keys
            .get(&key_id)
            .and_then(KeyRecord::owner)
            .cloned()
            .ok_or_else(|| {
                StorageError::InvalidData(format!("used key {key_id} is not a redeemed key"))
            })?;
        snapshot
            .audit_log
            .push(AuditEntry::new(key_id, owner, imported_at));
    }

    snapshot.validate()?;
    for record in snapshot.superseded_keys() {
        if let Some(owner) = record.owner() {
            warn!(
                key_id = %record.id,
                %owner,
                "importing superseded key; owner's active key is the one in users.json"
            );
        }
    }
    info!(
        keys = snapshot.keys.len(),
        identities = snapshot.identity_index.len(),
        "converted legacy key files"
    );
    Ok(snapshot)
}
