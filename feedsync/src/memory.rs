//! In-memory store adapter.
//!
//! Implements both sides of the store contract over a per-scope `BTreeMap`
//! ordered by `(ordering_key, id)`: keyset page scans for history and a
//! broadcast channel for live delivery. Used by the demo daemon and tests.
//!
//! A live subscriber that falls behind the broadcast buffer is not cut off:
//! after reporting the lag its stream replays every stored item newer than
//! the last key it delivered, then resumes from the channel.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, warn};

use crate::cursor::{self, PageBoundary};
use crate::error::{LoadError, TailError};
use crate::item::{FeedItem, FeedKey};
use crate::source::{FeedScope, LiveStream, LiveTail, Page, PageLoader};

struct ScopeLog<I: FeedItem> {
    items: BTreeMap<FeedKey<I::Key>, I>,
    keys: HashMap<String, FeedKey<I::Key>>,
}

impl<I: FeedItem> Default for ScopeLog<I> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            keys: HashMap::new(),
        }
    }
}

impl<I: FeedItem> ScopeLog<I> {
    /// Returns false if the id was already stored; the stored record wins.
    fn insert(&mut self, item: I) -> bool {
        if self.keys.contains_key(item.id()) {
            return false;
        }
        let key = item.feed_key();
        self.keys.insert(key.id.clone(), key.clone());
        self.items.insert(key, item);
        true
    }

    fn get(&self, id: &str) -> Option<&I> {
        self.keys.get(id).and_then(|key| self.items.get(key))
    }

    fn newest_key(&self) -> Option<FeedKey<I::Key>> {
        self.items.keys().next_back().cloned()
    }

    /// Stored items strictly newer than `after`, oldest first
    fn newer_than(&self, after: Option<&FeedKey<I::Key>>) -> VecDeque<I> {
        let lower = match after {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Unbounded,
        };
        self.items
            .range((lower, Bound::Unbounded))
            .map(|(_, item)| item.clone())
            .collect()
    }
}

type ScopeLogs<I> = Arc<RwLock<HashMap<FeedScope, ScopeLog<I>>>>;

/// Lock order: `scopes` before `live`.
pub struct MemoryStore<I: FeedItem> {
    scopes: ScopeLogs<I>,
    /// Live channels exist only while a scope has subscribers; senders left
    /// without receivers are pruned on the next subscribe.
    live: RwLock<HashMap<FeedScope, broadcast::Sender<I>>>,
    live_buffer_size: usize,
}

impl<I: FeedItem> MemoryStore<I> {
    pub fn new(live_buffer_size: usize) -> Self {
        Self {
            scopes: Arc::new(RwLock::new(HashMap::new())),
            live: RwLock::new(HashMap::new()),
            live_buffer_size,
        }
    }

    /// Store `item` and deliver it to live subscribers of `scope`.
    ///
    /// Publishing an id that already exists redelivers the stored record
    /// (at-least-once delivery) and returns false.
    pub async fn publish(&self, scope: &FeedScope, item: I) -> bool {
        let mut scopes = self.scopes.write().await;
        let log = scopes.entry(scope.clone()).or_default();

        let id = item.id().to_owned();
        let inserted = log.insert(item);
        if let Some(delivered) = log.get(&id).cloned() {
            let receivers = self.send_live(scope, delivered).await;
            debug!(%scope, %id, inserted, receivers, "Item published");
        }
        inserted
    }

    /// Store history without live delivery (seeding an existing feed)
    pub async fn insert_history(
        &self,
        scope: &FeedScope,
        items: impl IntoIterator<Item = I>,
    ) -> usize {
        let mut scopes = self.scopes.write().await;
        let log = scopes.entry(scope.clone()).or_default();

        let mut inserted = 0;
        for item in items {
            if log.insert(item) {
                inserted += 1;
            }
        }
        inserted
    }

    /// Deliver an already stored item again. Returns false if unknown.
    pub async fn redeliver(&self, scope: &FeedScope, id: &str) -> bool {
        let scopes = self.scopes.read().await;
        match scopes.get(scope).and_then(|log| log.get(id)) {
            Some(item) => {
                self.send_live(scope, item.clone()).await;
                true
            }
            None => false,
        }
    }

    async fn send_live(&self, scope: &FeedScope, item: I) -> usize {
        match self.live.read().await.get(scope) {
            Some(live) => live.send(item).unwrap_or(0),
            None => 0,
        }
    }

    /// Number of live subscriptions currently open on `scope`
    pub async fn live_subscribers(&self, scope: &FeedScope) -> usize {
        self.live
            .read()
            .await
            .get(scope)
            .map_or(0, |live| live.receiver_count())
    }

    /// Number of scopes with at least one open live subscription
    pub async fn live_scopes(&self) -> usize {
        self.live
            .read()
            .await
            .values()
            .filter(|live| live.receiver_count() > 0)
            .count()
    }

    /// Number of scopes holding stored items
    pub async fn stored_scopes(&self) -> usize {
        self.scopes.read().await.len()
    }

    pub async fn len(&self, scope: &FeedScope) -> usize {
        self.scopes
            .read()
            .await
            .get(scope)
            .map_or(0, |log| log.items.len())
    }
}

#[async_trait]
impl<I: FeedItem> PageLoader<I> for MemoryStore<I> {
    async fn load(
        &self,
        scope: &FeedScope,
        boundary: Option<&PageBoundary>,
        page_size: usize,
    ) -> Result<Page<I>, LoadError> {
        let upper = match boundary {
            Some(boundary) => Some(cursor::decode::<I::Key>(boundary)?),
            None => None,
        };

        let scopes = self.scopes.read().await;
        let Some(log) = scopes.get(scope) else {
            return Ok(Page::empty());
        };

        let items: Vec<I> = match upper {
            Some(upper) => log
                .items
                .range(..upper)
                .rev()
                .take(page_size)
                .map(|(_, item)| item.clone())
                .collect(),
            None => log.items.values().rev().take(page_size).cloned().collect(),
        };

        Ok(Page::from_items(items, page_size))
    }
}

/// One live subscription: the channel receiver plus enough position to
/// catch up from the log after a lag.
struct LiveCursor<I: FeedItem> {
    scope: FeedScope,
    rx: BroadcastStream<I>,
    scopes: ScopeLogs<I>,
    /// Newest key delivered so far (or stored when the subscription began)
    last: Option<FeedKey<I::Key>>,
    replay: VecDeque<I>,
}

impl<I: FeedItem> LiveCursor<I> {
    async fn next(&mut self) -> Option<Result<I, TailError>> {
        if let Some(item) = self.replay.pop_front() {
            self.advance(&item);
            return Some(Ok(item));
        }

        match self.rx.next().await? {
            Ok(item) => {
                self.advance(&item);
                Some(Ok(item))
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                self.replay = self
                    .scopes
                    .read()
                    .await
                    .get(&self.scope)
                    .map(|log| log.newer_than(self.last.as_ref()))
                    .unwrap_or_default();
                warn!(
                    scope = %self.scope,
                    skipped,
                    replaying = self.replay.len(),
                    "Live subscriber lagged, replaying from log"
                );
                Some(Err(TailError::Lagged(skipped)))
            }
        }
    }

    fn advance(&mut self, item: &I) {
        let key = item.feed_key();
        if self.last.as_ref().map_or(true, |last| key > *last) {
            self.last = Some(key);
        }
    }
}

#[async_trait]
impl<I: FeedItem> LiveTail<I> for MemoryStore<I> {
    async fn subscribe(&self, scope: &FeedScope) -> Result<LiveStream<I>, TailError> {
        // Hold the log while joining the channel so every item is either
        // stored before `last` or delivered through `rx`.
        let scopes = self.scopes.read().await;
        let last = scopes.get(scope).and_then(ScopeLog::newest_key);

        let rx = {
            let mut live = self.live.write().await;
            live.retain(|_, sender| sender.receiver_count() > 0);
            live.entry(scope.clone())
                .or_insert_with(|| broadcast::channel(self.live_buffer_size.max(1)).0)
                .subscribe()
        };
        drop(scopes);

        let cursor = LiveCursor {
            scope: scope.clone(),
            rx: BroadcastStream::new(rx),
            scopes: Arc::clone(&self.scopes),
            last,
            replay: VecDeque::new(),
        };
        let stream = stream::unfold(cursor, |mut cursor| async move {
            let next = cursor.next().await?;
            Some((next, cursor))
        });
        Ok(stream.boxed())
    }
}
