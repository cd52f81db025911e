//! User-facing replies for command outcomes.
//!
//! The core returns typed results only; every sentence a user reads is
//! produced here.

use keyward_license::{KeyInspection, LicenseError, LicenseResult, OwnBinding};
use keyward_types::{Identity, KeyId, KeyStatus};
use std::time::Duration;

pub const PERMISSION_DENIED: &str = "You do not have permission to use this command.";
pub const NO_KEY: &str = "You have not redeemed any key.";
pub const BUSY: &str = "The ledger is busy, please try again in a moment.";

#[must_use]
pub fn mention(identity: &Identity) -> String {
    format!("@{identity}")
}

/// Formats a wait as whole hours, minutes and seconds, rounding down.
#[must_use]
pub fn format_retry_after(wait: Duration) -> String {
    let total = wait.as_secs();
    let hours = total / 3600;
    let minutes = total % 3600 / 60;
    let seconds = total % 60;
    format!("{hours} hours, {minutes} minutes, and {seconds} seconds")
}

/// Reply for errors no command handles specially.
#[must_use]
pub fn fallback(err: &LicenseError) -> String {
    match err {
        LicenseError::Busy => BUSY.to_string(),
        LicenseError::NoActiveKey => NO_KEY.to_string(),
        other => format!("Request failed: {other}."),
    }
}

#[must_use]
pub fn generated(ids: &[KeyId]) -> String {
    let mut reply = format!("Generated {} new keys and added them to the ledger.", ids.len());
    for id in ids {
        reply.push('\n');
        reply.push_str(id.as_str());
    }
    reply
}

#[must_use]
pub fn redeemed(caller: &Identity, result: &LicenseResult<()>) -> String {
    let who = mention(caller);
    match result {
        Ok(()) => format!("{who}, you have redeemed the key successfully!"),
        Err(LicenseError::InvalidKey) => {
            format!("{who}, the key is invalid or has already been redeemed.")
        }
        Err(LicenseError::AlreadyOwnsKey) => format!("{who}, you have already redeemed a key."),
        Err(other) => fallback(other),
    }
}

#[must_use]
pub fn own_binding(result: &LicenseResult<OwnBinding>) -> String {
    match result {
        Ok(binding) => format!(
            "Your HWID for the redeemed key {} is: {}",
            binding.key_id, binding.fingerprint
        ),
        Err(LicenseError::NotBoundYet) => "No HWID found for your redeemed key.".to_string(),
        Err(other) => fallback(other),
    }
}

#[must_use]
pub fn reset(caller: &Identity, result: &LicenseResult<KeyId>) -> String {
    match result {
        Ok(key_id) => format!("The HWID for your redeemed key {key_id} has been reset."),
        Err(LicenseError::RateLimited { retry_after }) => format!(
            "{}, you need to wait {} before using this command again.",
            mention(caller),
            format_retry_after(*retry_after)
        ),
        Err(other) => fallback(other),
    }
}

#[must_use]
pub fn inspection(caller: &Identity, inspection: &KeyInspection) -> String {
    let who = mention(caller);
    match inspection.status {
        None => format!("{who}, the key is invalid or has already been redeemed."),
        Some(KeyStatus::NotRedeemed) => format!("{who}, this key is valid and not redeemed."),
        Some(KeyStatus::Redeemed) if inspection.fingerprint_matches => {
            format!("{who}, this key is already redeemed and your HWID matches.")
        }
        Some(KeyStatus::Redeemed) => format!("{who}, this key is already redeemed by another user."),
    }
}

#[must_use]
pub fn confirmation(key_id: &KeyId, result: &LicenseResult<()>) -> String {
    match result {
        Ok(()) => format!("HWID for key {key_id} has been updated."),
        Err(LicenseError::AlreadyBound | LicenseError::NotRedeemedYet) => {
            format!("Key {key_id} has not been redeemed yet or already has an HWID.")
        }
        Err(LicenseError::InvalidKey) => format!("Key {key_id} does not exist."),
        Err(other) => fallback(other),
    }
}
