//! Concrete feed items served by the daemon.

use serde::{Serialize, Serializer};

use crate::item::FeedItem;

/// Serialize i64 as a decimal string for JavaScript compatibility
fn serialize_i64_as_string<S>(value: &i64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

/// A message in a chat room feed, ordered by creation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub body: String,
    /// Creation time (Unix milliseconds)
    #[serde(serialize_with = "serialize_i64_as_string")]
    pub created_at: i64,
}

impl ChatMessage {
    pub fn new(
        id: impl Into<String>,
        room_id: impl Into<String>,
        sender_id: impl Into<String>,
        body: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            room_id: room_id.into(),
            sender_id: sender_id.into(),
            body: body.into(),
            created_at,
        }
    }
}

impl FeedItem for ChatMessage {
    type Key = i64;

    fn id(&self) -> &str {
        &self.id
    }

    fn ordering_key(&self) -> i64 {
        self.created_at
    }
}

/// One follower of a user, ordered by when the follow happened.
///
/// The feed scope is the followed user; the item id is the follower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Follower {
    pub user_id: String,
    pub follower_id: String,
    /// Follow time (Unix milliseconds)
    #[serde(serialize_with = "serialize_i64_as_string")]
    pub followed_at: i64,
}

impl Follower {
    pub fn new(user_id: impl Into<String>, follower_id: impl Into<String>, followed_at: i64) -> Self {
        Self {
            user_id: user_id.into(),
            follower_id: follower_id.into(),
            followed_at,
        }
    }
}

impl FeedItem for Follower {
    type Key = i64;

    fn id(&self) -> &str {
        &self.follower_id
    }

    fn ordering_key(&self) -> i64 {
        self.followed_at
    }
}
