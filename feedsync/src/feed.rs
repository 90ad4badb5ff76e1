//! Async handle for one open feed.
//!
//! A [`Feed`] owns the merge engine for a scope, a background task running
//! the live tail, and the page loader used for history. All mutations go
//! through one mutex; events are broadcast while the lock is held so
//! subscribers see them in the order they were applied.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::config::FeedConfig;
use crate::error::LoadError;
use crate::item::FeedItem;
use crate::merge::{LiveMerge, MergeEngine, PageMerge};
use crate::metrics::{self, Timer};
use crate::paging::{LoadState, LoadTicket, SkipReason};
use crate::source::{FeedScope, LiveTail, Page, PageLoader};
use crate::tail;
use crate::window::WindowSnapshot;

/// Change notifications for the presentation layer.
/// Uses adjacently tagged serde format: {"type": "...", "data": {...}}
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[serde(tag = "type", content = "data")]
pub enum FeedEvent<I> {
    /// A live item was inserted at the head
    Prepended(I),
    /// A page was merged at the tail
    PageMerged(PageMerge),
    LoadStateChanged(LoadState),
    /// The window was cleared and paging starts over
    Restarted,
    Closed,
}

/// What a call to [`Feed::request_next_page`] ended up doing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[serde(tag = "outcome", content = "detail")]
pub enum PageOutcome {
    Loaded(PageMerge),
    Skipped(SkipReason),
    Failed(LoadError),
    /// The feed was closed or restarted while the load was in flight
    Discarded,
}

pub(crate) struct FeedShared<I> {
    pub(crate) scope: FeedScope,
    engine: Mutex<MergeEngine<I>>,
    events: broadcast::Sender<FeedEvent<I>>,
    active: AtomicBool,
}

impl<I: FeedItem> FeedShared<I> {
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn emit(&self, event: FeedEvent<I>) {
        // No receivers is fine: nobody is watching this feed right now.
        let _ = self.events.send(event);
    }

    /// Apply one live item. Returns false once the feed is closed.
    pub(crate) async fn apply_live(&self, item: I) -> bool {
        let mut engine = self.engine.lock().await;
        if !self.is_active() {
            return false;
        }
        if engine.on_live_item(item.clone()) == LiveMerge::Inserted {
            self.emit(FeedEvent::Prepended(item));
        }
        true
    }

    async fn apply_result(
        &self,
        ticket: &LoadTicket,
        result: Result<Page<I>, LoadError>,
    ) -> PageOutcome {
        let mut engine = self.engine.lock().await;
        if !self.is_active() {
            debug!(scope = %self.scope, "Feed closed during page load, discarding result");
            return PageOutcome::Discarded;
        }

        match result {
            Ok(page) => match engine.on_page_loaded(ticket, page) {
                Ok(merge) => {
                    metrics::record_page_items(merge.appended, merge.backfilled, merge.duplicates);
                    self.emit(FeedEvent::PageMerged(merge));
                    self.emit(FeedEvent::LoadStateChanged(LoadState::Idle));
                    PageOutcome::Loaded(merge)
                }
                Err(_) => {
                    debug!(scope = %self.scope, "Stale page result discarded");
                    PageOutcome::Discarded
                }
            },
            Err(err) => match engine.on_page_failed(ticket, err.clone()) {
                Ok(()) => {
                    self.emit(FeedEvent::LoadStateChanged(LoadState::Error(err.clone())));
                    PageOutcome::Failed(err)
                }
                Err(_) => PageOutcome::Discarded,
            },
        }
    }
}

pub struct Feed<I: FeedItem> {
    shared: Arc<FeedShared<I>>,
    loader: Arc<dyn PageLoader<I>>,
    config: FeedConfig,
    tail_task: AbortHandle,
}

impl<I: FeedItem> Feed<I> {
    /// Open a feed for `scope` and start its live tail. Must be called from
    /// within a tokio runtime.
    pub fn open(
        scope: FeedScope,
        loader: Arc<dyn PageLoader<I>>,
        tail: Arc<dyn LiveTail<I>>,
        config: FeedConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer_size.max(1));
        let shared = Arc::new(FeedShared {
            scope: scope.clone(),
            engine: Mutex::new(MergeEngine::new(scope.clone(), config.page_size)),
            events,
            active: AtomicBool::new(true),
        });

        let task = tokio::spawn(tail::run_live_tail(
            Arc::clone(&shared),
            tail,
            config.resubscribe,
        ));

        metrics::feed_opened();
        info!(%scope, page_size = config.page_size, "Feed opened");

        Self {
            shared,
            loader,
            config,
            tail_task: task.abort_handle(),
        }
    }

    pub fn scope(&self) -> &FeedScope {
        &self.shared.scope
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<FeedEvent<I>> {
        self.shared.events.subscribe()
    }

    /// Number of open event subscriptions (SSE streams and the like)
    pub fn event_subscribers(&self) -> usize {
        self.shared.events.receiver_count()
    }

    pub async fn snapshot(&self) -> WindowSnapshot<I> {
        self.shared.engine.lock().await.snapshot()
    }

    /// Load the next older page and merge it.
    ///
    /// No-op while another load is in flight or once the feed is exhausted.
    /// The load itself runs on its own task, so dropping this future does not
    /// leave the feed stuck in `Loading`.
    #[instrument(skip(self), fields(scope = %self.shared.scope))]
    pub async fn request_next_page(&self) -> PageOutcome {
        if !self.is_active() {
            return PageOutcome::Skipped(SkipReason::Closed);
        }

        let ticket = {
            let mut engine = self.shared.engine.lock().await;
            match engine.request_next_page() {
                Ok(ticket) => {
                    self.shared
                        .emit(FeedEvent::LoadStateChanged(LoadState::Loading));
                    ticket
                }
                Err(reason) => return PageOutcome::Skipped(reason),
            }
        };

        let shared = Arc::clone(&self.shared);
        let loader = Arc::clone(&self.loader);
        let config = self.config.clone();
        let task_ticket = ticket.clone();
        let task = tokio::spawn(async move {
            let timer = Timer::start();
            let result = match timeout(
                config.load_timeout,
                loader.load(&shared.scope, task_ticket.boundary(), config.page_size),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(LoadError::network(format!(
                    "page load timed out after {}ms",
                    config.load_timeout.as_millis()
                ))),
            };

            let outcome = shared.apply_result(&task_ticket, result).await;
            let label = match &outcome {
                PageOutcome::Loaded(_) => "ok",
                PageOutcome::Failed(err) => err.kind(),
                _ => "discarded",
            };
            metrics::record_page_load(label, timer.elapsed());
            outcome
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                warn!(error = %join_err, "Page load task did not complete");
                let err = LoadError::unknown(format!("page load task failed: {}", join_err));
                self.shared.apply_result(&ticket, Err(err)).await
            }
        }
    }

    /// Clear the window and start paging again from the newest end, e.g.
    /// after an `InvalidCursor` failure. In-flight loads are discarded.
    pub async fn restart(&self) {
        let mut engine = self.shared.engine.lock().await;
        if !self.is_active() {
            return;
        }
        engine.restart();
        self.shared.emit(FeedEvent::Restarted);
        info!(scope = %self.shared.scope, "Feed restarted");
    }

    /// Stop the live tail and abandon in-flight loads. Idempotent.
    pub fn close(&self) {
        if self.shared.active.swap(false, Ordering::AcqRel) {
            self.tail_task.abort();
            self.shared.emit(FeedEvent::Closed);
            metrics::feed_closed();
            info!(scope = %self.shared.scope, "Feed closed");
        }
    }
}

impl<I: FeedItem> Drop for Feed<I> {
    fn drop(&mut self) {
        self.close();
    }
}
