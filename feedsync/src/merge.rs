//! Merge engine: the single writer for one feed window.
//!
//! History arrives as pages appended at the tail, live items arrive one at a
//! time at the head. Both paths deduplicate by id and keep the window ordered
//! by `(ordering_key, id)` descending. Nothing here blocks; the async
//! [`crate::feed::Feed`] handle serializes calls behind a mutex.

use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::item::{compare_items, FeedItem};
use crate::metrics;
use crate::paging::{LoadTicket, SkipReason, StaleTicket};
use crate::source::{FeedScope, Page};
use crate::window::{PagingWindow, WindowSnapshot};

/// Effect of one page on the window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMerge {
    /// New items placed at the tail
    pub appended: usize,
    /// New items that were newer than the tail and went in at their ordered
    /// position instead
    pub backfilled: usize,
    /// Items already present (delivered live or by an earlier page)
    pub duplicates: usize,
    pub exhausted: bool,
}

/// Effect of one live item on the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LiveMerge {
    Inserted,
    Duplicate,
    /// Older than the current head; dropped.
    OutOfOrder,
}

impl LiveMerge {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Duplicate => "duplicate",
            Self::OutOfOrder => "out_of_order",
        }
    }
}

#[derive(Debug)]
pub struct MergeEngine<I> {
    scope: FeedScope,
    page_size: usize,
    window: PagingWindow<I>,
}

impl<I: FeedItem> MergeEngine<I> {
    pub fn new(scope: FeedScope, page_size: usize) -> Self {
        Self {
            scope,
            page_size,
            window: PagingWindow::new(),
        }
    }

    pub fn scope(&self) -> &FeedScope {
        &self.scope
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn window(&self) -> &PagingWindow<I> {
        &self.window
    }

    pub fn snapshot(&self) -> WindowSnapshot<I> {
        self.window.snapshot()
    }

    /// Start a load for the next older page unless one is in flight or the
    /// feed is exhausted. The caller runs the loader with the ticket's
    /// boundary and reports back through `on_page_loaded` / `on_page_failed`.
    pub fn request_next_page(&mut self) -> Result<LoadTicket, SkipReason> {
        let ticket = self.window.paging.begin()?;
        debug!(
            scope = %self.scope,
            boundary = ?ticket.boundary().map(|b| b.as_str()),
            "Page load started"
        );
        Ok(ticket)
    }

    /// Merge a loaded page. Items already in the window are skipped, so
    /// applying the same page twice leaves the window unchanged.
    pub fn on_page_loaded(
        &mut self,
        ticket: &LoadTicket,
        page: Page<I>,
    ) -> Result<PageMerge, StaleTicket> {
        let short_page = page.items.len() < self.page_size;
        self.window
            .paging
            .complete(ticket, page.next_boundary, short_page)?;

        let mut merge = PageMerge::default();
        for item in page.items {
            if self.window.contains(item.id()) {
                merge.duplicates += 1;
                continue;
            }
            if self.window.insert_ordered(item) {
                merge.appended += 1;
            } else {
                merge.backfilled += 1;
            }
        }
        merge.exhausted = self.window.is_exhausted();

        if merge.backfilled > 0 {
            debug!(
                scope = %self.scope,
                backfilled = merge.backfilled,
                "Page contained items newer than the window tail"
            );
        }
        debug!(
            scope = %self.scope,
            appended = merge.appended,
            duplicates = merge.duplicates,
            exhausted = merge.exhausted,
            window_len = self.window.len(),
            "Page merged"
        );
        Ok(merge)
    }

    /// Record a failed load. The window keeps its content and the next
    /// request retries the same boundary.
    pub fn on_page_failed(&mut self, ticket: &LoadTicket, err: LoadError) -> Result<(), StaleTicket> {
        warn!(
            scope = %self.scope,
            error = %err,
            retryable = err.is_retryable(),
            "Page load failed"
        );
        self.window.paging.fail(ticket, err)
    }

    /// Merge one live item. Only items newer than the current head are
    /// accepted; the live channel never backfills history.
    pub fn on_live_item(&mut self, item: I) -> LiveMerge {
        let outcome = if self.window.contains(item.id()) {
            LiveMerge::Duplicate
        } else {
            match self.window.newest() {
                Some(newest) if compare_items(&item, newest) != Ordering::Greater => {
                    warn!(
                        scope = %self.scope,
                        id = %item.id(),
                        key = ?item.ordering_key(),
                        newest_id = %newest.id(),
                        newest_key = ?newest.ordering_key(),
                        "Live item older than window head, dropping"
                    );
                    metrics::record_ordering_anomaly("live_out_of_order");
                    LiveMerge::OutOfOrder
                }
                _ => {
                    self.window.push_newest(item);
                    LiveMerge::Inserted
                }
            }
        };

        metrics::record_live_item(outcome.as_str());
        outcome
    }

    /// Drop all items and paging progress; the next request loads from the
    /// newest end. Loads already in flight become stale.
    pub fn restart(&mut self) {
        self.window.clear();
        self.window.paging.reset();
        debug!(scope = %self.scope, generation = self.window.paging.generation(), "Feed restarted");
    }
}
