//! Core type definitions for Keyward.
//!
//! This crate defines the plain data shared by the storage backends and the
//! license service:
//! - Opaque string identifiers for keys, identities and fingerprints
//! - The key lifecycle state and stored key record
//! - Confirmation events and audit log entries

mod event;
mod ids;
mod key;

pub use event::{AuditEntry, ConfirmationEvent};
pub use ids::{Fingerprint, Identity, KeyId, MAX_ID_LEN};
pub use key::{KeyRecord, KeyState, KeyStatus};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when constructing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },

    #[error("{kind} exceeds {max} bytes")]
    TooLong { kind: &'static str, max: usize },

    #[error("{kind} contains a control character")]
    ControlCharacter { kind: &'static str },
}
