//! The license key record and its lifecycle state.
//!
//! A key moves `NotRedeemed → Redeemed { fingerprint: None }` exactly once.
//! Afterwards only the fingerprint changes: it is bound once by a confirmation
//! and may be cleared again by a rebind. Owner and fingerprint live inside the
//! `Redeemed` variant, so a key can never carry them while unredeemed.

use crate::{Fingerprint, Identity, KeyId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse status of a key, as exposed to inspection queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// Generated and available for redemption.
    NotRedeemed,
    /// Redeemed by exactly one identity.
    Redeemed,
}

impl KeyStatus {
    /// Returns the stable storage name of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotRedeemed => "not_redeemed",
            Self::Redeemed => "redeemed",
        }
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_redeemed" => Ok(Self::NotRedeemed),
            "redeemed" => Ok(Self::Redeemed),
            other => Err(format!("unknown key status: {other}")),
        }
    }
}

/// Full lifecycle state of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KeyState {
    /// Not yet redeemed; no owner, no fingerprint.
    NotRedeemed,
    /// Redeemed by `owner`; `fingerprint` is set once a confirmation arrives.
    Redeemed {
        owner: Identity,
        fingerprint: Option<Fingerprint>,
    },
}

impl KeyState {
    #[must_use]
    pub fn status(&self) -> KeyStatus {
        match self {
            Self::NotRedeemed => KeyStatus::NotRedeemed,
            Self::Redeemed { .. } => KeyStatus::Redeemed,
        }
    }

    #[must_use]
    pub fn owner(&self) -> Option<&Identity> {
        match self {
            Self::NotRedeemed => None,
            Self::Redeemed { owner, .. } => Some(owner),
        }
    }

    #[must_use]
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        match self {
            Self::NotRedeemed => None,
            Self::Redeemed { fingerprint, .. } => fingerprint.as_ref(),
        }
    }
}

/// A stored key: id, lifecycle state and optimistic-concurrency revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub id: KeyId,
    #[serde(flatten)]
    pub state: KeyState,
    /// Incremented on every committed update; used for compare-and-commit.
    #[serde(default)]
    pub revision: u64,
}

impl KeyRecord {
    /// Creates a freshly generated, unredeemed key.
    #[must_use]
    pub fn new(id: KeyId) -> Self {
        Self {
            id,
            state: KeyState::NotRedeemed,
            revision: 0,
        }
    }

    #[must_use]
    pub fn status(&self) -> KeyStatus {
        self.state.status()
    }

    #[must_use]
    pub fn owner(&self) -> Option<&Identity> {
        self.state.owner()
    }

    #[must_use]
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.state.fingerprint()
    }
}
