//! Rebind rate limiting.

use crate::error::{LedgerError, LedgerResult};
use chrono::{DateTime, TimeDelta, Utc};
use keyward_storage::{Changeset, LedgerBackend};
use keyward_types::Identity;
use std::time::Duration;

pub(crate) struct CooldownLedger<'t> {
    backend: &'t dyn LedgerBackend,
    changes: &'t mut Changeset,
}

impl<'t> CooldownLedger<'t> {
    pub(crate) fn new(backend: &'t dyn LedgerBackend, changes: &'t mut Changeset) -> Self {
        Self { backend, changes }
    }

    /// Grants a rebind at `now` unless the previous grant is younger than
    /// `period`. A rejected attempt stages nothing.
    ///
    /// A previous grant in the future (clock skew) counts as not yet
    /// elapsed; the wait is still measured from `last + period`.
    pub(crate) fn try_consume(
        &mut self,
        identity: &Identity,
        now: DateTime<Utc>,
        period: TimeDelta,
    ) -> LedgerResult<()> {
        let committed = self.backend.last_rebind(identity)?;
        let last = self.changes.staged_cooldown(identity).or(committed);

        if let Some(last) = last {
            let elapsed = now.signed_duration_since(last);
            if elapsed < period {
                // A future grant with a huge period can exceed TimeDelta's range.
                let retry_after = period
                    .checked_sub(&elapsed)
                    .and_then(|wait| wait.to_std().ok())
                    .unwrap_or(Duration::MAX);
                return Err(LedgerError::RateLimited { retry_after });
            }
        }
        self.changes.grant_cooldown(identity.clone(), committed, now);
        Ok(())
    }
}
