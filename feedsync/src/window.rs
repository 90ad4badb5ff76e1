//! Consumer-visible state of one feed instance.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

use crate::cursor::PageBoundary;
use crate::item::{compare_items, FeedItem};
use crate::paging::{LoadState, PagingState};

/// Items newest first plus the paging state that produced them.
///
/// Holds two invariants at all times: items are strictly descending by
/// `(ordering_key, id)`, and no id appears twice.
#[derive(Debug, Clone)]
pub struct PagingWindow<I> {
    items: VecDeque<I>,
    ids: HashSet<String>,
    pub(crate) paging: PagingState,
}

impl<I: FeedItem> Default for PagingWindow<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: FeedItem> PagingWindow<I> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
            ids: HashSet::new(),
            paging: PagingState::new(),
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &I> + '_ {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn newest(&self) -> Option<&I> {
        self.items.front()
    }

    pub fn oldest(&self) -> Option<&I> {
        self.items.back()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(FeedItem::id).collect()
    }

    pub fn next_boundary(&self) -> Option<&PageBoundary> {
        self.paging.next_boundary()
    }

    pub fn is_exhausted(&self) -> bool {
        self.paging.is_exhausted()
    }

    pub fn load_state(&self) -> &LoadState {
        self.paging.load_state()
    }

    pub fn paging(&self) -> &PagingState {
        &self.paging
    }

    /// Caller has checked the id is new and `item` is newer than the head.
    pub(crate) fn push_newest(&mut self, item: I) {
        self.ids.insert(item.id().to_owned());
        self.items.push_front(item);
    }

    /// Place a new item at its ordered position. Returns true when it landed
    /// at the tail, false when it had to go in front of older items.
    pub(crate) fn insert_ordered(&mut self, item: I) -> bool {
        self.ids.insert(item.id().to_owned());

        let at_tail = match self.items.back() {
            None => true,
            Some(oldest) => compare_items(&item, oldest) == Ordering::Less,
        };
        if at_tail {
            self.items.push_back(item);
            return true;
        }

        let pos = self
            .items
            .partition_point(|existing| compare_items(existing, &item) == Ordering::Greater);
        self.items.insert(pos, item);
        false
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
        self.ids.clear();
    }

    pub fn snapshot(&self) -> WindowSnapshot<I> {
        WindowSnapshot {
            items: self.items.iter().cloned().collect(),
            next_cursor: self.paging.next_boundary().cloned(),
            is_exhausted: self.paging.is_exhausted(),
            load_state: self.paging.load_state().clone(),
        }
    }
}

/// Point-in-time copy of a window for rendering.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSnapshot<I> {
    pub items: Vec<I>,
    pub next_cursor: Option<PageBoundary>,
    pub is_exhausted: bool,
    pub load_state: LoadState,
}

impl<I: FeedItem> WindowSnapshot<I> {
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(FeedItem::id).collect()
    }
}
