//! Capability checks performed before the core is invoked.

use crate::config::AccessConfig;
use anyhow::{Context, Result};
use keyward_types::Identity;
use std::collections::HashSet;

/// What a command needs the caller to be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    GenerateKeys,
    Redeem,
    Inspect,
    ResetBinding,
    Confirm,
    Export,
    Import,
}

/// Role membership resolved from [`AccessConfig`].
///
/// Admins manage the ledger, buyers use their own key, and relays deliver
/// device confirmations. Roles do not imply one another.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    admins: HashSet<Identity>,
    buyers: HashSet<Identity>,
    relays: HashSet<Identity>,
}

fn parse_all(role: &str, entries: &[String]) -> Result<HashSet<Identity>> {
    entries
        .iter()
        .map(|raw| {
            Identity::parse(raw).with_context(|| format!("Invalid identity {raw:?} in access.{role}"))
        })
        .collect()
}

impl AccessPolicy {
    pub fn from_config(config: &AccessConfig) -> Result<Self> {
        Ok(Self {
            admins: parse_all("admins", &config.admins)?,
            buyers: parse_all("buyers", &config.buyers)?,
            relays: parse_all("relays", &config.relays)?,
        })
    }

    #[must_use]
    pub fn permits(&self, identity: &Identity, capability: Capability) -> bool {
        match capability {
            Capability::GenerateKeys | Capability::Export | Capability::Import => {
                self.admins.contains(identity)
            }
            Capability::Redeem | Capability::Inspect | Capability::ResetBinding => {
                self.buyers.contains(identity)
            }
            Capability::Confirm => self.relays.contains(identity),
        }
    }
}
