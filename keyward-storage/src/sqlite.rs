//! SQLite ledger backend.
//!
//! All four collections live in one database file so a changeset commits as
//! a single SQLite transaction. The journal guarantees that a transaction
//! interrupted by a crash is rolled back when the file is next opened.

use crate::backend::{Collection, LedgerBackend};
use crate::changeset::{Changeset, KeyWrite};
use crate::error::{StorageError, StorageResult};
use crate::snapshot::LedgerSnapshot;
use chrono::{DateTime, Utc};
use keyward_types::{AuditEntry, Fingerprint, Identity, KeyId, KeyRecord, KeyState, KeyStatus};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Params, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// How long a connection waits for another process's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistent ledger backed by SQLite.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (or creates) a ledger database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        debug!(path = %path.display(), "opened ledger database");
        Self::from_connection(conn)
    }

    /// Opens an in-memory ledger database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA synchronous = FULL; PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

fn init_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS keys (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL CHECK (status IN ('not_redeemed', 'redeemed')),
            owner TEXT,
            fingerprint TEXT,
            revision INTEGER NOT NULL DEFAULT 0,
            CHECK ((status = 'redeemed') = (owner IS NOT NULL)),
            CHECK (fingerprint IS NULL OR status = 'redeemed')
        );

        CREATE TABLE IF NOT EXISTS identity_index (
            identity TEXT PRIMARY KEY,
            key_id TEXT NOT NULL UNIQUE REFERENCES keys(id)
        );

        CREATE TABLE IF NOT EXISTS cooldowns (
            identity TEXT PRIMARY KEY,
            granted_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            key_id TEXT NOT NULL UNIQUE REFERENCES keys(id),
            identity TEXT NOT NULL,
            recorded_at_ms INTEGER NOT NULL
        );
        ",
    )?;

    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<u32>>(0)
        })
        .optional()?
        .flatten();
    match version {
        None => {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(StorageError::InvalidData(format!(
                "unsupported ledger schema version {other} (expected {SCHEMA_VERSION})"
            )));
        }
    }
    Ok(())
}

// ── Row conversion ───────────────────────────────────────────────

fn millis_to_datetime(ms: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::InvalidData(format!("timestamp out of range: {ms}")))
}

struct KeyRow {
    id: String,
    status: String,
    owner: Option<String>,
    fingerprint: Option<String>,
    revision: i64,
}

impl KeyRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            status: row.get(1)?,
            owner: row.get(2)?,
            fingerprint: row.get(3)?,
            revision: row.get(4)?,
        })
    }

    fn into_record(self) -> StorageResult<KeyRecord> {
        let status: KeyStatus = self.status.parse().map_err(StorageError::InvalidData)?;
        let state = match (status, self.owner) {
            (KeyStatus::NotRedeemed, None) if self.fingerprint.is_none() => KeyState::NotRedeemed,
            (KeyStatus::Redeemed, Some(owner)) => KeyState::Redeemed {
                owner: Identity::parse(&owner)?,
                fingerprint: self.fingerprint.as_deref().map(Fingerprint::parse).transpose()?,
            },
            _ => {
                return Err(StorageError::InvalidData(format!(
                    "key {} has inconsistent owner/fingerprint columns",
                    self.id
                )));
            }
        };
        let revision = u64::try_from(self.revision)
            .map_err(|_| StorageError::InvalidData(format!("negative revision on {}", self.id)))?;
        Ok(KeyRecord {
            id: KeyId::parse(&self.id)?,
            state,
            revision,
        })
    }
}

/// Column values for a key record: (status, owner, fingerprint, revision).
fn key_columns(record: &KeyRecord) -> (&'static str, Option<&str>, Option<&str>, i64) {
    (
        record.status().as_str(),
        record.owner().map(Identity::as_str),
        record.fingerprint().map(Fingerprint::as_str),
        record.revision as i64,
    )
}

fn audit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn audit_entry(key_id: String, identity: String, ms: i64) -> StorageResult<AuditEntry> {
    Ok(AuditEntry::new(
        KeyId::parse(&key_id)?,
        Identity::parse(&identity)?,
        millis_to_datetime(ms)?,
    ))
}

fn conflict_unless_one(affected: usize, collection: Collection) -> StorageResult<()> {
    if affected == 1 {
        Ok(())
    } else {
        Err(StorageError::Conflict(collection))
    }
}

/// Runs a plain insert. A primary key or unique violation means the row is
/// already there and is reported as a conflict; any other constraint failure
/// is rejected as invalid data.
fn insert_row(
    tx: &Transaction<'_>,
    sql: &str,
    params: impl Params,
    collection: Collection,
) -> StorageResult<()> {
    match tx.execute(sql, params) {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(failure, message))
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    Err(StorageError::Conflict(collection))
                }
                _ => Err(StorageError::InvalidData(format!(
                    "{collection} row rejected: {}",
                    message.unwrap_or_else(|| failure.to_string())
                ))),
            }
        }
        Err(err) => Err(err.into()),
    }
}

impl LedgerBackend for SqliteBackend {
    fn get_key(&self, id: &KeyId) -> StorageResult<Option<KeyRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, status, owner, fingerprint, revision FROM keys WHERE id = ?1",
                [id.as_str()],
                KeyRow::from_row,
            )
            .optional()?;
        row.map(KeyRow::into_record).transpose()
    }

    fn lookup_identity(&self, identity: &Identity) -> StorageResult<Option<KeyId>> {
        let conn = self.lock()?;
        let key_id: Option<String> = conn
            .query_row(
                "SELECT key_id FROM identity_index WHERE identity = ?1",
                [identity.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(key_id.as_deref().map(KeyId::parse).transpose()?)
    }

    fn last_rebind(&self, identity: &Identity) -> StorageResult<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let ms: Option<i64> = conn
            .query_row(
                "SELECT granted_at_ms FROM cooldowns WHERE identity = ?1",
                [identity.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        ms.map(millis_to_datetime).transpose()
    }

    fn audit_entry(&self, key_id: &KeyId) -> StorageResult<Option<AuditEntry>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT key_id, identity, recorded_at_ms FROM audit_log WHERE key_id = ?1",
                [key_id.as_str()],
                audit_from_row,
            )
            .optional()?;
        row.map(|(key_id, identity, ms)| audit_entry(key_id, identity, ms))
            .transpose()
    }

    fn apply(&self, changes: &Changeset) -> StorageResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut conn = self.lock()?;
        // Returning early drops `tx`, which rolls the whole changeset back.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for write in changes.key_writes() {
            let record = write.record();
            let (status, owner, fingerprint, revision) = key_columns(record);
            match write {
                KeyWrite::Insert(_) => insert_row(
                    &tx,
                    "INSERT INTO keys (id, status, owner, fingerprint, revision)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![record.id.as_str(), status, owner, fingerprint, revision],
                    Collection::Keys,
                )?,
                KeyWrite::Update {
                    expected_revision, ..
                } => {
                    let affected = tx.execute(
                        "UPDATE keys SET status = ?2, owner = ?3, fingerprint = ?4, revision = ?5
                         WHERE id = ?1 AND revision = ?6",
                        params![
                            record.id.as_str(),
                            status,
                            owner,
                            fingerprint,
                            revision,
                            *expected_revision as i64
                        ],
                    )?;
                    conflict_unless_one(affected, Collection::Keys)?;
                }
            }
        }

        for (identity, key_id) in changes.index_inserts() {
            insert_row(
                &tx,
                "INSERT INTO identity_index (identity, key_id) VALUES (?1, ?2)",
                params![identity.as_str(), key_id.as_str()],
                Collection::IdentityIndex,
            )?;
        }

        for write in changes.cooldown_writes() {
            let granted_at = write.granted_at.timestamp_millis();
            match write.previous {
                None => insert_row(
                    &tx,
                    "INSERT INTO cooldowns (identity, granted_at_ms) VALUES (?1, ?2)",
                    params![write.identity.as_str(), granted_at],
                    Collection::Cooldowns,
                )?,
                Some(previous) => {
                    let affected = tx.execute(
                        "UPDATE cooldowns SET granted_at_ms = ?2
                         WHERE identity = ?1 AND granted_at_ms = ?3",
                        params![
                            write.identity.as_str(),
                            granted_at,
                            previous.timestamp_millis()
                        ],
                    )?;
                    conflict_unless_one(affected, Collection::Cooldowns)?;
                }
            }
        }

        for entry in changes.audit_entries() {
            insert_row(
                &tx,
                "INSERT INTO audit_log (key_id, identity, recorded_at_ms) VALUES (?1, ?2, ?3)",
                params![
                    entry.key_id.as_str(),
                    entry.identity.as_str(),
                    entry.recorded_at.timestamp_millis()
                ],
                Collection::AuditLog,
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn snapshot(&self) -> StorageResult<LedgerSnapshot> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut snapshot = LedgerSnapshot::default();

        {
            let mut stmt =
                tx.prepare("SELECT id, status, owner, fingerprint, revision FROM keys")?;
            let rows = stmt.query_map([], KeyRow::from_row)?;
            for row in rows {
                let record = row?.into_record()?;
                snapshot.keys.insert(record.id.clone(), record);
            }
        }

        {
            let mut stmt = tx.prepare("SELECT identity, key_id FROM identity_index")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (identity, key_id) = row?;
                snapshot
                    .identity_index
                    .insert(Identity::parse(&identity)?, KeyId::parse(&key_id)?);
            }
        }

        {
            let mut stmt = tx.prepare("SELECT identity, granted_at_ms FROM cooldowns")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (identity, ms) = row?;
                snapshot
                    .cooldowns
                    .insert(Identity::parse(&identity)?, millis_to_datetime(ms)?);
            }
        }

        {
            let mut stmt =
                tx.prepare("SELECT key_id, identity, recorded_at_ms FROM audit_log ORDER BY seq")?;
            let rows = stmt.query_map([], audit_from_row)?;
            for row in rows {
                let (key_id, identity, ms) = row?;
                snapshot.audit_log.push(audit_entry(key_id, identity, ms)?);
            }
        }

        tx.commit()?;
        Ok(snapshot)
    }

    fn flush(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        debug!("checkpointed ledger WAL");
        Ok(())
    }
}
