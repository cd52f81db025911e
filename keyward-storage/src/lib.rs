//! Ledger storage for Keyward.
//!
//! Persists the four collections behind the license service (`keys`,
//! `identity_index`, `cooldowns`, `audit_log`) and commits every change to
//! them as one atomic unit.
//!
//! # Architecture
//!
//! - [`LedgerBackend`] is the storage port: single-row reads plus an atomic
//!   [`LedgerBackend::apply`] of a [`Changeset`]
//! - [`SqliteBackend`] keeps all collections in one SQLite file and applies a
//!   changeset as one transaction
//! - [`MemoryBackend`] keeps them in memory behind one lock
//! - [`LedgerSnapshot`] exports, validates and restores whole ledgers
//! - [`legacy`] converts the legacy bot's JSON files into a snapshot

mod backend;
mod changeset;
mod error;
pub mod legacy;
mod memory;
mod snapshot;
mod sqlite;

pub use backend::{Collection, LedgerBackend};
pub use changeset::{Changeset, CooldownWrite, KeyWrite};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use snapshot::LedgerSnapshot;
pub use sqlite::{SqliteBackend, SCHEMA_VERSION};
