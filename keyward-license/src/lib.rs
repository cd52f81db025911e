//! Key lifecycle core for Keyward.
//!
//! [`LicenseService`] generates license keys, redeems them for an identity,
//! binds each redeemed key to one device fingerprint, and lets owners reset
//! that binding at most once per cooldown period.
//!
//! # Design Principles
//!
//! - **One commit per operation**: effects are staged and applied to all four
//!   ledger collections at once, or not at all
//! - **Scoped locking**: operations lock only the identities and keys they
//!   touch, in one canonical order, with a bounded wait
//! - **Opaque redemption**: unknown and already-redeemed keys are
//!   indistinguishable to `redeem`
//! - **Typed results**: the core returns [`LicenseError`] values and leaves
//!   user-facing text to the caller

mod audit_log;
mod config;
mod cooldown;
mod error;
mod key_store;
mod keygen;
mod locks;
mod redemption_index;
mod service;
mod txn;

pub use config::{
    KeyAlphabet, KeyPolicy, LicenseConfig, DEFAULT_COOLDOWN_SECS, DEFAULT_LOCK_TIMEOUT_MS,
    DEFAULT_MAX_BATCH,
};
pub use error::{LicenseError, LicenseResult};
pub use keygen::{KeyIdGenerator, RandomKeyIds};
pub use service::{KeyInspection, LicenseService, OwnBinding};
