use chrono::{DateTime, Duration, TimeZone, Utc};
use keyward_storage::{
    Changeset, Collection, LedgerBackend, MemoryBackend, SqliteBackend, StorageError,
};
use keyward_types::{AuditEntry, Fingerprint, Identity, KeyId, KeyRecord, KeyState};
use pretty_assertions::assert_eq;

fn key(s: &str) -> KeyId {
    KeyId::parse(s).unwrap()
}

fn who(s: &str) -> Identity {
    Identity::parse(s).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn backends() -> Vec<(&'static str, Box<dyn LedgerBackend>)> {
    vec![
        ("memory", Box::new(MemoryBackend::new())),
        ("sqlite", Box::new(SqliteBackend::open_in_memory().unwrap())),
    ]
}

fn seed(backend: &dyn LedgerBackend, ids: &[&str]) {
    let mut changes = Changeset::new();
    for id in ids {
        changes.insert_key(KeyRecord::new(key(id)));
    }
    backend.apply(&changes).unwrap();
}

/// Stages a full redemption of `id` by `identity` against committed state.
fn redeem(backend: &dyn LedgerBackend, id: &str, identity: &str) -> Changeset {
    let current = backend.get_key(&key(id)).unwrap().unwrap();
    let mut changes = Changeset::new();
    changes.update_key(
        &current,
        KeyState::Redeemed {
            owner: who(identity),
            fingerprint: None,
        },
    );
    changes.assign_identity(who(identity), key(id));
    changes.record_audit(AuditEntry::new(key(id), who(identity), at(0)));
    changes
}

#[test]
fn inserted_keys_start_unredeemed() {
    for (name, backend) in backends() {
        seed(backend.as_ref(), &["11111111111"]);
        let record = backend.get_key(&key("11111111111")).unwrap().unwrap();
        assert_eq!(record, KeyRecord::new(key("11111111111")), "{name}");
        assert!(backend.get_key(&key("22222222222")).unwrap().is_none(), "{name}");
    }
}

#[test]
fn duplicate_insert_conflicts() {
    for (name, backend) in backends() {
        seed(backend.as_ref(), &["11111111111"]);
        let mut changes = Changeset::new();
        changes.insert_key(KeyRecord::new(key("11111111111")));
        let err = backend.apply(&changes).unwrap_err();
        assert!(
            matches!(err, StorageError::Conflict(Collection::Keys)),
            "{name}: {err}"
        );
    }
}

#[test]
fn duplicate_insert_within_one_changeset_conflicts() {
    for (name, backend) in backends() {
        let mut changes = Changeset::new();
        changes.insert_key(KeyRecord::new(key("11111111111")));
        changes.insert_key(KeyRecord::new(key("11111111111")));
        assert!(backend.apply(&changes).is_err(), "{name}");
        assert!(backend.snapshot().unwrap().is_empty(), "{name}");
    }
}

#[test]
fn redemption_commits_all_collections() {
    for (name, backend) in backends() {
        seed(backend.as_ref(), &["11111111111"]);
        backend
            .apply(&redeem(backend.as_ref(), "11111111111", "alice"))
            .unwrap();

        let record = backend.get_key(&key("11111111111")).unwrap().unwrap();
        assert_eq!(record.owner(), Some(&who("alice")), "{name}");
        assert_eq!(record.revision, 1, "{name}");
        assert_eq!(
            backend.lookup_identity(&who("alice")).unwrap(),
            Some(key("11111111111")),
            "{name}"
        );
        let entry = backend.audit_entry(&key("11111111111")).unwrap().unwrap();
        assert_eq!(entry.identity, who("alice"), "{name}");
        backend.snapshot().unwrap().validate().unwrap();
    }
}

#[test]
fn stale_revision_conflicts() {
    for (name, backend) in backends() {
        seed(backend.as_ref(), &["11111111111"]);
        let first = redeem(backend.as_ref(), "11111111111", "alice");
        let second = redeem(backend.as_ref(), "11111111111", "bob");

        backend.apply(&first).unwrap();
        let err = backend.apply(&second).unwrap_err();
        assert!(
            matches!(err, StorageError::Conflict(Collection::Keys)),
            "{name}: {err}"
        );
        assert_eq!(backend.lookup_identity(&who("bob")).unwrap(), None, "{name}");
    }
}

#[test]
fn conflict_late_in_changeset_rolls_back_earlier_writes() {
    for (name, backend) in backends() {
        seed(backend.as_ref(), &["11111111111", "22222222222"]);
        backend
            .apply(&redeem(backend.as_ref(), "11111111111", "alice"))
            .unwrap();

        // The key write is valid; the index write collides with alice's entry.
        let current = backend.get_key(&key("22222222222")).unwrap().unwrap();
        let mut changes = Changeset::new();
        changes.update_key(
            &current,
            KeyState::Redeemed {
                owner: who("alice"),
                fingerprint: None,
            },
        );
        changes.assign_identity(who("alice"), key("22222222222"));
        let err = backend.apply(&changes).unwrap_err();
        assert!(
            matches!(err, StorageError::Conflict(Collection::IdentityIndex)),
            "{name}: {err}"
        );

        let untouched = backend.get_key(&key("22222222222")).unwrap().unwrap();
        assert_eq!(untouched, current, "{name}");
    }
}

#[test]
fn audit_entry_is_write_once() {
    for (name, backend) in backends() {
        seed(backend.as_ref(), &["11111111111"]);
        backend
            .apply(&redeem(backend.as_ref(), "11111111111", "alice"))
            .unwrap();

        let mut changes = Changeset::new();
        changes.record_audit(AuditEntry::new(key("11111111111"), who("alice"), at(5)));
        let err = backend.apply(&changes).unwrap_err();
        assert!(
            matches!(err, StorageError::Conflict(Collection::AuditLog)),
            "{name}: {err}"
        );
        let entry = backend.audit_entry(&key("11111111111")).unwrap().unwrap();
        assert_eq!(entry.recorded_at, at(0), "{name}");
    }
}

#[test]
fn cooldown_grant_checks_previous_value() {
    for (name, backend) in backends() {
        let alice = who("alice");
        let mut first = Changeset::new();
        first.grant_cooldown(alice.clone(), None, at(0));
        backend.apply(&first).unwrap();
        assert_eq!(backend.last_rebind(&alice).unwrap(), Some(at(0)), "{name}");

        // A second "first grant" lost the race.
        let err = backend.apply(&first).unwrap_err();
        assert!(
            matches!(err, StorageError::Conflict(Collection::Cooldowns)),
            "{name}: {err}"
        );

        let mut next = Changeset::new();
        next.grant_cooldown(alice.clone(), Some(at(0)), at(90_000));
        backend.apply(&next).unwrap();
        assert_eq!(
            backend.last_rebind(&alice).unwrap(),
            Some(at(90_000)),
            "{name}"
        );

        // Stale previous value.
        let mut stale = Changeset::new();
        stale.grant_cooldown(alice.clone(), Some(at(0)), at(200_000));
        assert!(backend.apply(&stale).is_err(), "{name}");
    }
}

#[test]
fn fingerprint_binding_round_trips() {
    for (name, backend) in backends() {
        seed(backend.as_ref(), &["11111111111"]);
        backend
            .apply(&redeem(backend.as_ref(), "11111111111", "alice"))
            .unwrap();

        let current = backend.get_key(&key("11111111111")).unwrap().unwrap();
        let mut changes = Changeset::new();
        changes.update_key(
            &current,
            KeyState::Redeemed {
                owner: who("alice"),
                fingerprint: Some(Fingerprint::parse("HW-1").unwrap()),
            },
        );
        backend.apply(&changes).unwrap();

        let record = backend.get_key(&key("11111111111")).unwrap().unwrap();
        assert_eq!(record.fingerprint().map(Fingerprint::as_str), Some("HW-1"), "{name}");
        assert_eq!(record.revision, 2, "{name}");
    }
}

#[test]
fn empty_changeset_is_a_no_op() {
    for (name, backend) in backends() {
        backend.apply(&Changeset::new()).unwrap();
        assert!(backend.snapshot().unwrap().is_empty(), "{name}");
    }
}

#[test]
fn restore_copies_between_backends() {
    let source = MemoryBackend::new();
    seed(&source, &["11111111111", "22222222222"]);
    source.apply(&redeem(&source, "11111111111", "alice")).unwrap();
    let mut grant = Changeset::new();
    grant.grant_cooldown(who("alice"), None, at(10));
    source.apply(&grant).unwrap();
    let snapshot = source.snapshot().unwrap();

    let target = SqliteBackend::open_in_memory().unwrap();
    target.restore(&snapshot).unwrap();
    assert_eq!(target.snapshot().unwrap(), snapshot);

    // Restoring twice would overwrite live data.
    assert!(target.restore(&snapshot).is_err());
}

#[test]
fn sqlite_ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");

    {
        let backend = SqliteBackend::open(&path).unwrap();
        seed(&backend, &["11111111111"]);
        backend
            .apply(&redeem(&backend, "11111111111", "alice"))
            .unwrap();
        backend.flush().unwrap();
    }

    let backend = SqliteBackend::open(&path).unwrap();
    assert_eq!(
        backend.lookup_identity(&who("alice")).unwrap(),
        Some(key("11111111111"))
    );
    let snapshot = backend.snapshot().unwrap();
    snapshot.validate().unwrap();
    assert_eq!(snapshot.audit_log.len(), 1);
}

#[test]
fn sqlite_cooldowns_keep_millisecond_precision() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    let granted = at(0) + Duration::milliseconds(250);
    let mut changes = Changeset::new();
    changes.grant_cooldown(who("alice"), None, granted);
    backend.apply(&changes).unwrap();
    assert_eq!(backend.last_rebind(&who("alice")).unwrap(), Some(granted));
}
