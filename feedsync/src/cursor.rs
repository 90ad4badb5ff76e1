//! Page boundary tokens.
//!
//! Token format: `"<orderingKey>:<hex(id)>"`. The key is written in its
//! canonical form and the id as lowercase hex of its UTF-8 bytes, so a token
//! never contains more than one `:` and two tokens are equal exactly when the
//! pairs they wrap are equal.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CursorError;
use crate::item::{FeedItem, FeedKey, OrderingKey};

/// Opaque "continue after this point" marker handed out by page loaders.
///
/// Consumers only store it, compare it and hand it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageBoundary(String);

impl PageBoundary {
    /// Wrap a token received from elsewhere (a client, a store's native cursor).
    /// No validation happens until a loader decodes it.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `self` sorts strictly before (is older than) `other`.
    pub fn is_older_than<K: OrderingKey>(&self, other: &PageBoundary) -> Result<bool, CursorError> {
        Ok(decode::<K>(self)? < decode::<K>(other)?)
    }
}

impl fmt::Display for PageBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Boundary positioned at `item`: the next page holds items strictly older.
pub fn encode<I: FeedItem>(item: &I) -> PageBoundary {
    PageBoundary(format!(
        "{}:{}",
        item.ordering_key().to_cursor_part(),
        hex::encode(item.id())
    ))
}

pub fn encode_key<K: OrderingKey>(key: &FeedKey<K>) -> PageBoundary {
    PageBoundary(format!(
        "{}:{}",
        key.key.to_cursor_part(),
        hex::encode(&key.id)
    ))
}

/// Decode a boundary back into its `(ordering_key, id)` pair.
pub fn decode<K: OrderingKey>(boundary: &PageBoundary) -> Result<FeedKey<K>, CursorError> {
    let raw = boundary.as_str();
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 2 {
        return Err(CursorError::new("cursor must have 2 colon-separated parts"));
    }

    let key = K::from_cursor_part(parts[0])
        .ok_or_else(|| CursorError::new("cursor orderingKey is not valid"))?;
    let id_bytes =
        hex::decode(parts[1]).map_err(|_| CursorError::new("cursor id must be valid hex"))?;
    let id = String::from_utf8(id_bytes)
        .map_err(|_| CursorError::new("cursor id must be valid UTF-8"))?;

    let decoded = FeedKey { key, id };
    if encode_key(&decoded).as_str() != raw {
        return Err(CursorError::new("cursor is not in canonical form"));
    }

    Ok(decoded)
}
