//! Error types for the license service.

use keyward_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`LicenseService`](crate::LicenseService) operations.
///
/// Every variant is recoverable. Unknown and already-redeemed keys are both
/// reported as [`LicenseError::InvalidKey`] so callers cannot probe which
/// keys exist through `redeem`.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// A caller-supplied argument is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The key does not exist or can no longer be redeemed.
    #[error("the key is invalid or has already been redeemed")]
    InvalidKey,

    /// The identity already owns a key.
    #[error("identity already owns a key")]
    AlreadyOwnsKey,

    /// The key is already bound to a device fingerprint.
    #[error("key is already bound to a device")]
    AlreadyBound,

    /// The key exists but nobody has redeemed it.
    #[error("key has not been redeemed yet")]
    NotRedeemedYet,

    /// A rebind was granted too recently.
    #[error("rebind rate limited, retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// The identity has not redeemed any key.
    #[error("identity has not redeemed any key")]
    NoActiveKey,

    /// The identity's key has no fingerprint bound yet.
    #[error("key is not bound to a device yet")]
    NotBoundYet,

    /// A lock or commit could not be obtained in time.
    #[error("ledger is busy, try again")]
    Busy,

    /// The storage backend failed; committed state is unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;

/// Failures of the individual ledger components, before the service maps
/// them onto the caller-facing taxonomy.
#[derive(Debug, Error)]
pub(crate) enum LedgerError {
    #[error("key not found")]
    KeyNotFound,
    #[error("key already redeemed")]
    AlreadyRedeemed,
    #[error("key not redeemed yet")]
    NotRedeemedYet,
    #[error("key already bound")]
    AlreadyBound,
    #[error("identity already owns a key")]
    AlreadyOwnsKey,
    #[error("identity has no key")]
    IdentityNotFound,
    #[error("key already recorded in the audit log")]
    AlreadyRecorded,
    #[error("rate limited for {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub(crate) type LedgerResult<T> = Result<T, LedgerError>;

impl From<LedgerError> for LicenseError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::KeyNotFound | LedgerError::AlreadyRedeemed | LedgerError::AlreadyRecorded => {
                Self::InvalidKey
            }
            LedgerError::NotRedeemedYet => Self::NotRedeemedYet,
            LedgerError::AlreadyBound => Self::AlreadyBound,
            LedgerError::AlreadyOwnsKey => Self::AlreadyOwnsKey,
            LedgerError::IdentityNotFound => Self::NoActiveKey,
            LedgerError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            LedgerError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            LedgerError::Storage(err) => Self::Storage(err),
        }
    }
}
