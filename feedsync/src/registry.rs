use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::FeedConfig;
use crate::feed::Feed;
use crate::item::FeedItem;
use crate::metrics;
use crate::source::{FeedScope, LiveTail, PageLoader};

struct OpenFeed<I: FeedItem> {
    feed: Arc<Feed<I>>,
    /// Milliseconds since the registry epoch
    last_access: AtomicU64,
}

/// Open feeds keyed by scope, all backed by the same store adapter.
///
/// Each scope gets its own independent feed instance; nothing is shared
/// between them except the adapter. Feeds nobody has touched for a while and
/// nobody is watching are closed by [`FeedRegistry::evict_idle`].
pub struct FeedRegistry<I: FeedItem> {
    loader: Arc<dyn PageLoader<I>>,
    tail: Arc<dyn LiveTail<I>>,
    config: FeedConfig,
    feeds: Arc<RwLock<HashMap<FeedScope, OpenFeed<I>>>>,
    epoch: Instant,
}

impl<I: FeedItem> Clone for FeedRegistry<I> {
    fn clone(&self) -> Self {
        Self {
            loader: Arc::clone(&self.loader),
            tail: Arc::clone(&self.tail),
            config: self.config.clone(),
            feeds: Arc::clone(&self.feeds),
            epoch: self.epoch,
        }
    }
}

impl<I: FeedItem> FeedRegistry<I> {
    pub fn new(
        loader: Arc<dyn PageLoader<I>>,
        tail: Arc<dyn LiveTail<I>>,
        config: FeedConfig,
    ) -> Self {
        Self {
            loader,
            tail,
            config,
            feeds: Arc::new(RwLock::new(HashMap::new())),
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn touch(&self, open: &OpenFeed<I>) -> Arc<Feed<I>> {
        open.last_access.store(self.now_ms(), Ordering::Relaxed);
        Arc::clone(&open.feed)
    }

    /// Return the open feed for `scope`, opening it first if needed
    pub async fn open(&self, scope: &FeedScope) -> Arc<Feed<I>> {
        if let Some(feed) = self.get(scope).await {
            return feed;
        }

        let mut feeds = self.feeds.write().await;
        // Another caller may have opened it while we waited for the lock.
        if let Some(open) = feeds.get(scope) {
            return self.touch(open);
        }

        let feed = Arc::new(Feed::open(
            scope.clone(),
            Arc::clone(&self.loader),
            Arc::clone(&self.tail),
            self.config.clone(),
        ));
        feeds.insert(
            scope.clone(),
            OpenFeed {
                feed: Arc::clone(&feed),
                last_access: AtomicU64::new(self.now_ms()),
            },
        );
        feed
    }

    pub async fn get(&self, scope: &FeedScope) -> Option<Arc<Feed<I>>> {
        self.feeds
            .read()
            .await
            .get(scope)
            .map(|open| self.touch(open))
    }

    /// Close and forget the feed for `scope`. Returns false if none was open.
    pub async fn close(&self, scope: &FeedScope) -> bool {
        let mut feeds = self.feeds.write().await;

        if let Some(open) = feeds.remove(scope) {
            open.feed.close();
            true
        } else {
            debug!(%scope, "No feed to close");
            false
        }
    }

    /// Close every feed (for graceful shutdown)
    pub async fn close_all(&self) {
        let mut feeds = self.feeds.write().await;
        let count = feeds.len();

        for (scope, open) in feeds.drain() {
            open.feed.close();
            debug!(%scope, "Feed closed during shutdown");
        }

        info!(count, "All feeds closed");
    }

    /// Close feeds not opened or looked up within `idle` that have no event
    /// subscribers. Returns how many were closed.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let now = self.now_ms();
        let idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);
        let mut feeds = self.feeds.write().await;

        let mut evicted = 0;
        feeds.retain(|scope, open| {
            let idle_for = now.saturating_sub(open.last_access.load(Ordering::Relaxed));
            if idle_for < idle_ms || open.feed.event_subscribers() > 0 {
                return true;
            }
            open.feed.close();
            debug!(%scope, idle_for_ms = idle_for, "Idle feed evicted");
            evicted += 1;
            false
        });

        if evicted > 0 {
            metrics::record_feeds_evicted(evicted);
            info!(evicted, remaining = feeds.len(), "Evicted idle feeds");
        }
        evicted
    }

    /// Run [`FeedRegistry::evict_idle`] every `interval` until aborted
    pub fn spawn_idle_eviction(&self, idle: Duration, interval: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                registry.evict_idle(idle).await;
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.feeds.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.feeds.read().await.is_empty()
    }
}
