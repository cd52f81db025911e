//! Service configuration.

use crate::error::{LicenseError, LicenseResult};
use chrono::TimeDelta;
use keyward_types::MAX_ID_LEN;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default rebind cooldown (24 hours).
pub const DEFAULT_COOLDOWN_SECS: u64 = 86_400;

/// Default bound on waiting for per-identity and per-key locks.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Default ceiling on keys generated by one call.
pub const DEFAULT_MAX_BATCH: usize = 1_000;

/// Characters a generated key id is drawn from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAlphabet {
    /// ASCII digits `0-9`.
    #[default]
    Digits,
    /// Uppercase ASCII letters and digits.
    Alphanumeric,
}

impl KeyAlphabet {
    #[must_use]
    pub const fn charset(&self) -> &'static [u8] {
        match self {
            Self::Digits => b"0123456789",
            Self::Alphanumeric => b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789",
        }
    }
}

/// Shape of generated key ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPolicy {
    pub length: usize,
    pub alphabet: KeyAlphabet,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            length: 11,
            alphabet: KeyAlphabet::Digits,
        }
    }
}

/// Tunables for [`LicenseService`](crate::LicenseService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Minimum time between two granted rebinds of one identity.
    pub cooldown_secs: u64,
    /// How long an operation waits for its locks before reporting `Busy`.
    pub lock_timeout_ms: u64,
    /// Largest batch accepted by `generate_keys`.
    pub max_batch: usize,
    pub key_policy: KeyPolicy,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            max_batch: DEFAULT_MAX_BATCH,
            key_policy: KeyPolicy::default(),
        }
    }
}

impl LicenseConfig {
    /// Checks that every field is usable.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidArgument`] naming the offending field.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.key_policy.length == 0 || self.key_policy.length > MAX_ID_LEN {
            return Err(LicenseError::InvalidArgument(format!(
                "key_policy.length must be between 1 and {MAX_ID_LEN}"
            )));
        }
        if self.max_batch == 0 {
            return Err(LicenseError::InvalidArgument(
                "max_batch must be positive".to_string(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(LicenseError::InvalidArgument(
                "lock_timeout_ms must be positive".to_string(),
            ));
        }
        if self.cooldown_secs == 0 {
            return Err(LicenseError::InvalidArgument(
                "cooldown_secs must be positive".to_string(),
            ));
        }
        if self.cooldown_period().is_none() {
            return Err(LicenseError::InvalidArgument(
                "cooldown_secs is out of range".to_string(),
            ));
        }
        Ok(())
    }

    /// The rebind cooldown as a signed duration, if representable.
    #[must_use]
    pub fn cooldown_period(&self) -> Option<TimeDelta> {
        i64::try_from(self.cooldown_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
