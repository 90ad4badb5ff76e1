//! Unit tests for the models module
//!
//! Run with: cargo test --test models_tests

use feedsync::item::{FeedItem, FeedKey};
use feedsync::models::{ChatMessage, Follower};

#[test]
fn test_chat_message_feed_key() {
    let msg = ChatMessage::new("m1", "lobby", "alice", "hi", 1_700_000_000_123);
    assert_eq!(msg.id(), "m1");
    assert_eq!(msg.ordering_key(), 1_700_000_000_123);
    assert_eq!(msg.feed_key(), FeedKey::new(1_700_000_000_123i64, "m1"));
}

#[test]
fn test_chat_message_serialization() {
    let msg = ChatMessage::new("m1", "lobby", "alice", "hi", 9_007_199_254_740_993);
    let json = serde_json::to_value(&msg).unwrap();

    assert_eq!(json["id"], "m1");
    assert_eq!(json["roomId"], "lobby");
    assert_eq!(json["senderId"], "alice");
    assert_eq!(json["body"], "hi");
    // Larger than 2^53, so it must survive as a string.
    assert_eq!(json["createdAt"], "9007199254740993");
}

#[test]
fn test_follower_is_keyed_by_follower_id() {
    let follower = Follower::new("bob", "carol", 42);
    assert_eq!(follower.id(), "carol");
    assert_eq!(follower.ordering_key(), 42);

    let json = serde_json::to_value(&follower).unwrap();
    assert_eq!(json["userId"], "bob");
    assert_eq!(json["followerId"], "carol");
    assert_eq!(json["followedAt"], "42");
}

#[test]
fn test_feed_key_orders_by_key_then_id() {
    let a = ChatMessage::new("a", "r", "s", "", 10).feed_key();
    let b = ChatMessage::new("b", "r", "s", "", 10).feed_key();
    let c = ChatMessage::new("a", "r", "s", "", 11).feed_key();

    assert!(a < b);
    assert!(b < c);
}
