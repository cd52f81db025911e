use keyward_types::{Error, Fingerprint, Identity, KeyId, MAX_ID_LEN};
use proptest::prelude::*;
use std::collections::HashSet;
use std::str::FromStr;

// ── KeyId ─────────────────────────────────────────────────────────

#[test]
fn key_id_display_and_parse() {
    let id = KeyId::parse("01234567890").unwrap();
    assert_eq!(id.to_string(), "01234567890");
    assert_eq!(id.as_str(), "01234567890");
}

#[test]
fn key_id_trims_whitespace() {
    let id = KeyId::parse("  01234567890\n").unwrap();
    assert_eq!(id.as_str(), "01234567890");
}

#[test]
fn key_id_is_opaque() {
    // Non-digit ids are accepted; the digit format is only a generation policy.
    assert!(KeyId::parse("ABC-123").is_ok());
}

#[test]
fn key_id_rejects_empty() {
    assert_eq!(
        KeyId::parse("   ").unwrap_err(),
        Error::Empty { kind: "key id" }
    );
}

#[test]
fn key_id_rejects_oversized() {
    let raw = "7".repeat(MAX_ID_LEN + 1);
    assert!(matches!(KeyId::parse(&raw), Err(Error::TooLong { .. })));
}

#[test]
fn key_id_rejects_control_characters() {
    assert!(matches!(
        KeyId::parse("123\u{0}456"),
        Err(Error::ControlCharacter { .. })
    ));
}

#[test]
fn key_id_from_str() {
    let parsed = KeyId::from_str("42").unwrap();
    assert_eq!(parsed, KeyId::parse("42").unwrap());
}

#[test]
fn key_id_hash_and_eq() {
    let id = KeyId::parse("42").unwrap();
    let mut set = HashSet::new();
    set.insert(id.clone());
    set.insert(id);
    assert_eq!(set.len(), 1);
}

#[test]
fn key_id_serde_is_transparent() {
    let id = KeyId::parse("42").unwrap();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"42\"");
}

#[test]
fn key_id_deserialize_validates() {
    let result: Result<KeyId, _> = serde_json::from_str("\"\"");
    assert!(result.is_err());
}

// ── Identity / Fingerprint ────────────────────────────────────────

#[test]
fn identity_error_names_kind() {
    let err = Identity::parse("").unwrap_err();
    assert_eq!(err.to_string(), "identity must not be empty");
}

#[test]
fn fingerprint_error_names_kind() {
    let err = Fingerprint::parse("").unwrap_err();
    assert_eq!(err.to_string(), "fingerprint must not be empty");
}

#[test]
fn identities_order_lexically() {
    let a = Identity::parse("alice").unwrap();
    let b = Identity::parse("bob").unwrap();
    assert!(a < b);
}

proptest! {
    #[test]
    fn printable_ids_survive_string_conversion(raw in "[a-zA-Z0-9@_-]{1,64}") {
        let id = KeyId::parse(&raw).unwrap();
        let back: String = id.clone().into();
        prop_assert_eq!(KeyId::try_from(back).unwrap(), id);
    }
}
