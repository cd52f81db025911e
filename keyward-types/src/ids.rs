//! Identifier types used throughout the Keyward core.
//!
//! All three identifiers are opaque strings. The core never interprets their
//! contents beyond basic hygiene: surrounding whitespace is trimmed, and empty
//! values, oversized values and control characters are rejected.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum accepted length of any identifier, in bytes.
pub const MAX_ID_LEN: usize = 128;

fn validate(kind: &'static str, raw: &str) -> Result<String, Error> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(Error::Empty { kind });
    }
    if value.len() > MAX_ID_LEN {
        return Err(Error::TooLong {
            kind,
            max: MAX_ID_LEN,
        });
    }
    if value.chars().any(char::is_control) {
        return Err(Error::ControlCharacter { kind });
    }
    Ok(value.to_string())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validates and wraps a raw string.
            pub fn parse(raw: &str) -> Result<Self, Error> {
                validate($kind, raw).map(Self)
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a license key (11 ASCII digits under the default policy).
    KeyId,
    "key id"
);

string_id!(
    /// The stable principal that redeems and owns at most one key.
    Identity,
    "identity"
);

string_id!(
    /// A hardware/installation identifier bound to a redeemed key.
    Fingerprint,
    "fingerprint"
);
