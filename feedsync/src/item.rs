//! Feed item abstraction shared by every feed kind.
//!
//! A feed is ordered by the pair `(ordering_key, id)`, newest first. The id
//! breaks ties between items created in the same millisecond, and the same
//! comparison is used for paging boundaries and live head insertion.

use std::cmp::Ordering;
use std::fmt;

/// Sort key of a feed item, typically a creation timestamp.
///
/// Implementations must round-trip through their cursor representation and
/// have exactly one canonical spelling per value.
pub trait OrderingKey: Ord + Clone + fmt::Debug + Send + Sync + 'static {
    /// Canonical text form used inside boundary tokens. Must not contain `:`.
    fn to_cursor_part(&self) -> String;

    /// Parse the text form back. Returns `None` for anything unparseable.
    fn from_cursor_part(raw: &str) -> Option<Self>;
}

impl OrderingKey for i64 {
    fn to_cursor_part(&self) -> String {
        self.to_string()
    }

    fn from_cursor_part(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl OrderingKey for u64 {
    fn to_cursor_part(&self) -> String {
        self.to_string()
    }

    fn from_cursor_part(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

/// A record that can live in a feed window.
pub trait FeedItem: Clone + Send + Sync + 'static {
    type Key: OrderingKey;

    /// Unique id within the feed scope.
    fn id(&self) -> &str;

    /// Immutable ordering key; never changes after creation.
    fn ordering_key(&self) -> Self::Key;

    fn feed_key(&self) -> FeedKey<Self::Key> {
        FeedKey::new(self.ordering_key(), self.id())
    }
}

/// Owned `(ordering_key, id)` pair with the feed's total order.
///
/// `Ord` is ascending (oldest first); windows hold items in the reverse of
/// this order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedKey<K> {
    pub key: K,
    pub id: String,
}

impl<K: OrderingKey> FeedKey<K> {
    pub fn new(key: K, id: impl Into<String>) -> Self {
        Self { key, id: id.into() }
    }
}

impl<K: Ord> PartialOrd for FeedKey<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> Ord for FeedKey<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Compare two items by `(ordering_key, id)` ascending without allocating.
pub fn compare_items<I: FeedItem>(a: &I, b: &I) -> Ordering {
    a.ordering_key()
        .cmp(&b.ordering_key())
        .then_with(|| a.id().cmp(b.id()))
}
