//! Unit tests for the cursor module
//!
//! Run with: cargo test --test cursor_tests

use feedsync::cursor::{decode, encode, encode_key, PageBoundary};
use feedsync::item::FeedKey;
use feedsync::models::ChatMessage;

fn msg(id: &str, created_at: i64) -> ChatMessage {
    ChatMessage::new(id, "room-1", "user-1", "hello", created_at)
}

#[test]
fn test_encode_item_uses_key_and_hex_id() {
    let boundary = encode(&msg("abc", 1_700_000_000_000));
    assert_eq!(boundary.as_str(), "1700000000000:616263");
}

#[test]
fn test_decode_roundtrip() {
    let key = FeedKey::new(42i64, "msg:with:colons");
    let boundary = encode_key(&key);

    // Colons in the id are hidden by the hex encoding.
    assert_eq!(boundary.as_str().matches(':').count(), 1);
    assert_eq!(decode::<i64>(&boundary).unwrap(), key);
}

#[test]
fn test_decode_negative_key() {
    let key = FeedKey::new(-5i64, "x");
    assert_eq!(decode::<i64>(&encode_key(&key)).unwrap(), key);
}

#[test]
fn test_decode_unicode_id() {
    let key = FeedKey::new(1i64, "ünïcødé");
    assert_eq!(decode::<i64>(&encode_key(&key)).unwrap(), key);
}

#[test]
fn test_decode_wrong_part_count() {
    let err = decode::<i64>(&PageBoundary::from_raw("100")).unwrap_err();
    assert_eq!(err.to_string(), "cursor must have 2 colon-separated parts");

    let err = decode::<i64>(&PageBoundary::from_raw("1:2:3")).unwrap_err();
    assert_eq!(err.to_string(), "cursor must have 2 colon-separated parts");
}

#[test]
fn test_decode_invalid_key() {
    let err = decode::<i64>(&PageBoundary::from_raw("abc:6d31")).unwrap_err();
    assert_eq!(err.to_string(), "cursor orderingKey is not valid");
}

#[test]
fn test_decode_negative_key_rejected_for_unsigned() {
    let err = decode::<u64>(&PageBoundary::from_raw("-1:6d31")).unwrap_err();
    assert_eq!(err.to_string(), "cursor orderingKey is not valid");
}

#[test]
fn test_decode_invalid_hex() {
    let err = decode::<i64>(&PageBoundary::from_raw("100:zz")).unwrap_err();
    assert_eq!(err.to_string(), "cursor id must be valid hex");
}

#[test]
fn test_decode_invalid_utf8() {
    let err = decode::<i64>(&PageBoundary::from_raw("100:ff")).unwrap_err();
    assert_eq!(err.to_string(), "cursor id must be valid UTF-8");
}

#[test]
fn test_decode_rejects_non_canonical_forms() {
    // Leading zeros, plus sign and uppercase hex all parse but would make
    // equal positions compare unequal as tokens.
    for raw in ["0100:6d31", "+100:6d31", "100:6D31"] {
        let err = decode::<i64>(&PageBoundary::from_raw(raw)).unwrap_err();
        assert_eq!(err.to_string(), "cursor is not in canonical form", "{}", raw);
    }
}

#[test]
fn test_is_older_than_uses_id_tiebreak() {
    let older = encode(&msg("a", 100));
    let newer = encode(&msg("b", 100));
    let newest = encode(&msg("a", 101));

    assert!(older.is_older_than::<i64>(&newer).unwrap());
    assert!(newer.is_older_than::<i64>(&newest).unwrap());
    assert!(!newer.is_older_than::<i64>(&older).unwrap());
    assert!(!older.is_older_than::<i64>(&older).unwrap());
}

#[test]
fn test_is_older_than_propagates_decode_error() {
    let good = encode(&msg("a", 1));
    let bad = PageBoundary::from_raw("garbage");
    assert!(good.is_older_than::<i64>(&bad).is_err());
}

#[test]
fn test_boundary_serializes_as_plain_string() {
    let boundary = PageBoundary::from_raw("100:6d31");
    assert_eq!(serde_json::to_string(&boundary).unwrap(), "\"100:6d31\"");

    let parsed: PageBoundary = serde_json::from_str("\"7:61\"").unwrap();
    assert_eq!(parsed.as_str(), "7:61");
}
