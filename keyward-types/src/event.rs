//! Records that cross the core boundary: confirmation events delivered by the
//! relay, and the audit entries written on every redemption.

use crate::{Fingerprint, Identity, KeyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized hardware confirmation, extracted by the relay from its own
/// trusted input. The core never sees the raw message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationEvent {
    pub identity: Identity,
    pub fingerprint: Fingerprint,
    pub key_id: KeyId,
}

/// One row of the append-only redemption audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub key_id: KeyId,
    /// Identity that redeemed the key.
    pub identity: Identity,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    #[must_use]
    pub fn new(key_id: KeyId, identity: Identity, recorded_at: DateTime<Utc>) -> Self {
        Self {
            key_id,
            identity,
            recorded_at,
        }
    }
}
