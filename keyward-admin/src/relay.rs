//! Parsing of confirmation messages posted by the relay bot.

use keyward_types::{ConfirmationEvent, Fingerprint, Identity, KeyId};

fn field<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let start = text.find(label)? + label.len();
    text[start..].split_whitespace().next()
}

/// Extracts a [`ConfirmationEvent`] from free text carrying
/// `User: <identity>`, `Client ID: <fingerprint>` and `Script Key: <key>`.
///
/// The client id ends at the first character outside `[A-Za-z0-9_-]`.
/// Returns `None` if any field is missing or invalid.
#[must_use]
pub fn parse_relay_message(text: &str) -> Option<ConfirmationEvent> {
    let identity = Identity::parse(field(text, "User:")?).ok()?;
    let client_id = field(text, "Client ID:")?
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .next()?;
    let fingerprint = Fingerprint::parse(client_id).ok()?;
    let key_id = KeyId::parse(field(text, "Script Key:")?).ok()?;
    Some(ConfirmationEvent {
        identity,
        fingerprint,
        key_id,
    })
}
