//! Boundary contracts implemented by remote store adapters.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cursor::{self, PageBoundary};
use crate::error::{LoadError, TailError};
use crate::item::FeedItem;

/// Opaque identifier partitioning one feed from another (room id, user id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedScope(String);

impl FeedScope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of history, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<I> {
    pub items: Vec<I>,
    /// `None` exactly when the page was short: there is nothing older.
    pub next_boundary: Option<PageBoundary>,
}

impl<I: FeedItem> Page<I> {
    /// Build a page applying the short-page rule: a full page continues after
    /// its last item, a short page ends the feed.
    pub fn from_items(items: Vec<I>, page_size: usize) -> Self {
        let next_boundary = if items.len() < page_size {
            None
        } else {
            items.last().map(cursor::encode)
        };
        Self {
            items,
            next_boundary,
        }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_boundary: None,
        }
    }
}

/// Pull-based history source.
///
/// Implementations return at most `page_size` items strictly older than
/// `boundary` (or the newest items when `boundary` is `None`), ordered by
/// `(ordering_key, id)` descending. Loading has no side effects, so repeated
/// calls with the same boundary return the same page.
#[async_trait]
pub trait PageLoader<I: FeedItem>: Send + Sync {
    async fn load(
        &self,
        scope: &FeedScope,
        boundary: Option<&PageBoundary>,
        page_size: usize,
    ) -> Result<Page<I>, LoadError>;
}

/// Stream of live items. An `Err` or the end of the stream ends the
/// subscription.
pub type LiveStream<I> = BoxStream<'static, Result<I, TailError>>;

/// Push-based source of newly created items.
///
/// Delivery is at-least-once and best-effort chronological; consumers
/// deduplicate. Dropping the stream cancels the subscription.
#[async_trait]
pub trait LiveTail<I: FeedItem>: Send + Sync {
    async fn subscribe(&self, scope: &FeedScope) -> Result<LiveStream<I>, TailError>;
}
