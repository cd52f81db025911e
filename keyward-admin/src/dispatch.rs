//! Command definitions and their execution against the license service.

use crate::access::{AccessPolicy, Capability};
use crate::relay::parse_relay_message;
use crate::render;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use keyward_license::{LicenseError, LicenseResult, LicenseService};
use keyward_storage::legacy::{self, LegacyFiles};
use keyward_types::{ConfirmationEvent, Fingerprint, Identity, KeyId};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Generate new unredeemed keys (admins)
    Generate {
        #[arg(allow_negative_numbers = true)]
        count: i64,
    },
    /// Redeem a key for the caller (buyers)
    Redeem { key: KeyId },
    /// Bind a device fingerprint to a redeemed key (relays)
    Confirm(ConfirmArgs),
    /// Clear the caller's device binding, once per cooldown (buyers)
    ResetHwid,
    /// Show the caller's bound device fingerprint (buyers)
    Hwid,
    /// Check a key's status (buyers)
    Check {
        key: KeyId,
        /// Fingerprint to compare against the key's binding
        #[arg(long)]
        fingerprint: Option<Fingerprint>,
    },
    /// Export the whole ledger as JSON (admins)
    Export {
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Import keys.json, users.json, cooldowns.json and usedkeys.json into an
    /// empty ledger (admins)
    ImportLegacy { dir: PathBuf },
}

/// Ways a relay can deliver a confirmation.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfirmArgs {
    /// Confirmation event as JSON
    #[arg(long, conflicts_with_all = ["message", "identity", "fingerprint", "key"])]
    pub event: Option<String>,
    /// Relay message text with User, Client ID and Script Key fields
    #[arg(long, conflicts_with_all = ["identity", "fingerprint", "key"])]
    pub message: Option<String>,
    #[arg(long, requires_all = ["fingerprint", "key"])]
    pub identity: Option<Identity>,
    #[arg(long)]
    pub fingerprint: Option<Fingerprint>,
    #[arg(long)]
    pub key: Option<KeyId>,
}

impl ConfirmArgs {
    fn into_event(self) -> Result<ConfirmationEvent> {
        if let Some(json) = self.event {
            return serde_json::from_str(&json).context("Invalid confirmation event JSON");
        }
        if let Some(text) = self.message {
            return parse_relay_message(&text)
                .context("Relay message lacks User, Client ID or Script Key");
        }
        match (self.identity, self.fingerprint, self.key) {
            (Some(identity), Some(fingerprint), Some(key_id)) => Ok(ConfirmationEvent {
                identity,
                fingerprint,
                key_id,
            }),
            _ => bail!("Provide --event, --message, or --identity with --fingerprint and --key"),
        }
    }
}

impl Command {
    #[must_use]
    pub fn capability(&self) -> Capability {
        match self {
            Self::Generate { .. } => Capability::GenerateKeys,
            Self::Redeem { .. } => Capability::Redeem,
            Self::Confirm(_) => Capability::Confirm,
            Self::ResetHwid => Capability::ResetBinding,
            Self::Hwid | Self::Check { .. } => Capability::Inspect,
            Self::Export { .. } => Capability::Export,
            Self::ImportLegacy { .. } => Capability::Import,
        }
    }
}

/// Storage failures abort the command; every other outcome is rendered.
fn surface_storage<T>(result: LicenseResult<T>) -> Result<LicenseResult<T>> {
    match result {
        Err(LicenseError::Storage(err)) => Err(err).context("Ledger storage failed"),
        other => Ok(other),
    }
}

fn read_optional(dir: &Path, name: &str) -> Result<String> {
    let path = dir.join(name);
    match fs::read_to_string(&path) {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "legacy file missing, treating as empty");
            Ok(String::new())
        }
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Runs one command for `caller` and returns the reply text.
pub async fn dispatch(
    service: &LicenseService,
    policy: &AccessPolicy,
    caller: &Identity,
    command: Command,
) -> Result<String> {
    let capability = command.capability();
    if !policy.permits(caller, capability) {
        info!(%caller, ?capability, "command denied");
        return Ok(render::PERMISSION_DENIED.to_string());
    }

    let reply = match command {
        Command::Generate { count } => {
            let count = match usize::try_from(count) {
                Ok(count) if count > 0 => count,
                _ => return Ok("Please enter a positive number of keys to generate.".to_string()),
            };
            match surface_storage(service.generate_keys(count))? {
                Ok(ids) => render::generated(&ids),
                Err(LicenseError::InvalidArgument(msg)) => format!("Could not generate keys: {msg}."),
                Err(other) => render::fallback(&other),
            }
        }
        Command::Redeem { key } => {
            let result = surface_storage(service.redeem(caller, &key).await)?;
            render::redeemed(caller, &result)
        }
        Command::Confirm(args) => {
            let event = args.into_event()?;
            let result = surface_storage(service.confirm(&event).await)?;
            render::confirmation(&event.key_id, &result)
        }
        Command::ResetHwid => {
            let result = surface_storage(service.reset_binding_now(caller).await)?;
            render::reset(caller, &result)
        }
        Command::Hwid => {
            let result = surface_storage(service.inspect_own_fingerprint(caller))?;
            render::own_binding(&result)
        }
        Command::Check { key, fingerprint } => {
            match surface_storage(service.inspect_key_status(&key, fingerprint.as_ref()))? {
                Ok(inspection) => render::inspection(caller, &inspection),
                Err(other) => render::fallback(&other),
            }
        }
        Command::Export { output } => {
            let snapshot = service.snapshot().context("Failed to export ledger")?;
            let json = serde_json::to_string_pretty(&snapshot)?;
            match output {
                Some(path) => {
                    fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    format!("Exported {} keys to {}.", snapshot.keys.len(), path.display())
                }
                None => json,
            }
        }
        Command::ImportLegacy { dir } => {
            let keys = read_optional(&dir, "keys.json")?;
            let users = read_optional(&dir, "users.json")?;
            let cooldowns = read_optional(&dir, "cooldowns.json")?;
            let used_keys = read_optional(&dir, "usedkeys.json")?;
            let files = LegacyFiles {
                keys: &keys,
                users: &users,
                cooldowns: &cooldowns,
                used_keys: &used_keys,
            };
            let snapshot = legacy::import(&files, Utc::now())
                .with_context(|| format!("Failed to import legacy files from {}", dir.display()))?;
            service.restore(&snapshot).context("Failed to restore imported ledger")?;
            format!(
                "Imported {} keys and {} redeemed identities.",
                snapshot.keys.len(),
                snapshot.identity_index.len()
            )
        }
    };
    Ok(reply)
}
