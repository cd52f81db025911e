use chrono::{TimeZone, Utc};
use keyward_storage::{LedgerSnapshot, StorageError};
use keyward_types::{AuditEntry, Identity, KeyId, KeyRecord, KeyState, KeyStatus};

fn key(s: &str) -> KeyId {
    KeyId::parse(s).unwrap()
}

fn who(s: &str) -> Identity {
    Identity::parse(s).unwrap()
}

fn redeemed(id: &str, owner: &str) -> KeyRecord {
    KeyRecord {
        id: key(id),
        state: KeyState::Redeemed {
            owner: who(owner),
            fingerprint: None,
        },
        revision: 1,
    }
}

fn consistent() -> LedgerSnapshot {
    let mut snapshot = LedgerSnapshot::default();
    snapshot
        .keys
        .insert(key("k1"), redeemed("k1", "alice"));
    snapshot.keys.insert(key("k2"), KeyRecord::new(key("k2")));
    snapshot.identity_index.insert(who("alice"), key("k1"));
    snapshot.cooldowns.insert(
        who("alice"),
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    );
    snapshot.audit_log.push(AuditEntry::new(
        key("k1"),
        who("alice"),
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    ));
    snapshot
}

fn assert_invalid(snapshot: &LedgerSnapshot, needle: &str) {
    match snapshot.validate() {
        Err(StorageError::InvalidData(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected invalid data, got {other:?}"),
    }
}

#[test]
fn consistent_snapshot_validates() {
    consistent().validate().unwrap();
}

#[test]
fn counts_keys_by_status() {
    let snapshot = consistent();
    assert_eq!(snapshot.count_by_status(KeyStatus::Redeemed), 1);
    assert_eq!(snapshot.count_by_status(KeyStatus::NotRedeemed), 1);
}

#[test]
fn owner_of_redeemed_key_must_be_indexed() {
    let mut snapshot = consistent();
    snapshot.identity_index.clear();
    snapshot.cooldowns.clear();
    assert_invalid(&snapshot, "no indexed key");
}

#[test]
fn superseded_key_of_indexed_owner_validates() {
    let mut snapshot = consistent();
    snapshot.keys.insert(key("k0"), redeemed("k0", "alice"));
    snapshot.audit_log.push(AuditEntry::new(
        key("k0"),
        who("alice"),
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    ));
    snapshot.validate().unwrap();

    let superseded: Vec<_> = snapshot.superseded_keys().map(|r| r.id.clone()).collect();
    assert_eq!(superseded, vec![key("k0")]);
    assert_eq!(consistent().superseded_keys().count(), 0);
}

#[test]
fn redeemed_key_must_be_audited() {
    let mut snapshot = consistent();
    snapshot.audit_log.clear();
    assert_invalid(&snapshot, "missing from the audit log");
}

#[test]
fn index_must_point_at_owned_key() {
    let mut snapshot = consistent();
    snapshot.identity_index.insert(who("bob"), key("k2"));
    assert_invalid(&snapshot, "does not own");
}

#[test]
fn audit_entries_are_unique() {
    let mut snapshot = consistent();
    let duplicate = snapshot.audit_log[0].clone();
    snapshot.audit_log.push(duplicate);
    assert_invalid(&snapshot, "audited twice");
}

#[test]
fn cooldown_requires_an_owned_key() {
    let mut snapshot = consistent();
    snapshot
        .cooldowns
        .insert(who("carol"), Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    assert_invalid(&snapshot, "owns no key");
}

#[test]
fn snapshot_serializes_collections_by_name() {
    let json = serde_json::to_value(consistent()).unwrap();
    for name in ["keys", "identity_index", "cooldowns", "audit_log"] {
        assert!(json.get(name).is_some(), "missing {name}");
    }
    let back: LedgerSnapshot = serde_json::from_value(json).unwrap();
    assert_eq!(back, consistent());
}
