//! Property tests for the merge engine: ordering, dedup, retry and
//! completeness under arbitrary interleavings of pages and live items.
//!
//! Run with: cargo test --test merge_property_tests

use std::cmp::Ordering;
use std::collections::HashSet;

use feedsync::cursor::{decode, PageBoundary};
use feedsync::error::LoadError;
use feedsync::item::{compare_items, FeedItem};
use feedsync::merge::MergeEngine;
use feedsync::models::ChatMessage;
use feedsync::source::{FeedScope, Page};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

fn msg(id: u16, created_at: i64) -> ChatMessage {
    ChatMessage::new(format!("m{:03}", id), "room-1", "user-1", "hello", created_at)
}

/// Unique ids; keys from a small range so ties are common.
fn arb_history() -> impl Strategy<Value = Vec<ChatMessage>> {
    proptest::collection::btree_map(0u16..500, 0i64..20, 0..40)
        .prop_map(|entries| entries.into_iter().map(|(id, key)| msg(id, key)).collect())
}

#[derive(Debug, Clone)]
enum Op {
    Live(usize),
    Page,
    FailPage,
    Restart,
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            4 => (0usize..1000).prop_map(Op::Live),
            4 => Just(Op::Page),
            1 => Just(Op::FailPage),
            1 => Just(Op::Restart),
        ],
        0..60,
    )
}

/// Keyset scan over `history`, newest first, strictly older than `boundary`.
fn load_page(
    history: &[ChatMessage],
    boundary: Option<&PageBoundary>,
    page_size: usize,
) -> Page<ChatMessage> {
    let upper = boundary.map(|b| decode::<i64>(b).expect("engine only hands out valid boundaries"));
    let mut items: Vec<ChatMessage> = history
        .iter()
        .filter(|m| upper.as_ref().map_or(true, |upper| m.feed_key() < *upper))
        .cloned()
        .collect();
    items.sort_by(|a, b| compare_items(b, a));
    items.truncate(page_size);
    Page::from_items(items, page_size)
}

fn sorted_desc(history: &[ChatMessage]) -> Vec<String> {
    let mut items = history.to_vec();
    items.sort_by(|a, b| compare_items(b, a));
    items.into_iter().map(|m| m.id).collect()
}

fn window_ids(engine: &MergeEngine<ChatMessage>) -> Vec<String> {
    engine.window().items().map(|m| m.id.clone()).collect()
}

fn check_invariants(engine: &MergeEngine<ChatMessage>) -> Result<(), TestCaseError> {
    let items: Vec<&ChatMessage> = engine.window().items().collect();

    let ids: HashSet<&str> = items.iter().map(|m| m.id()).collect();
    prop_assert_eq!(ids.len(), items.len(), "duplicate id in window");

    for pair in items.windows(2) {
        prop_assert_eq!(
            compare_items(pair[0], pair[1]),
            Ordering::Greater,
            "window not strictly descending at {} / {}",
            pair[0].id,
            pair[1].id
        );
    }
    Ok(())
}

fn page_until_exhausted(
    engine: &mut MergeEngine<ChatMessage>,
    history: &[ChatMessage],
    page_size: usize,
) {
    // Each full page moves the boundary strictly older, so this terminates.
    while let Ok(ticket) = engine.request_next_page() {
        let page = load_page(history, ticket.boundary(), page_size);
        engine
            .on_page_loaded(&ticket, page)
            .expect("ticket is current");
    }
}

proptest! {
    #[test]
    fn prop_window_stays_ordered_and_unique(
        history in arb_history(),
        page_size in 1usize..6,
        ops in arb_ops(),
    ) {
        let mut engine = MergeEngine::new(FeedScope::new("room-1"), page_size);

        for op in ops {
            match op {
                Op::Live(index) if !history.is_empty() => {
                    engine.on_live_item(history[index % history.len()].clone());
                }
                Op::Live(_) => {}
                Op::Page => {
                    if let Ok(ticket) = engine.request_next_page() {
                        let page = load_page(&history, ticket.boundary(), page_size);
                        prop_assert!(engine.on_page_loaded(&ticket, page).is_ok());
                    }
                }
                Op::FailPage => {
                    if let Ok(ticket) = engine.request_next_page() {
                        prop_assert!(engine
                            .on_page_failed(&ticket, LoadError::network("flaky"))
                            .is_ok());
                    }
                }
                Op::Restart => engine.restart(),
            }
            check_invariants(&engine)?;
        }
    }

    #[test]
    fn prop_live_then_paging_yields_full_history(
        history in arb_history(),
        page_size in 1usize..6,
        live_count in 0usize..10,
    ) {
        let expected = sorted_desc(&history);
        let mut engine = MergeEngine::new(FeedScope::new("room-1"), page_size);

        // The newest items arrive live, oldest of them first, before any page.
        let mut newest: Vec<ChatMessage> = history.clone();
        newest.sort_by(|a, b| compare_items(a, b));
        let live: Vec<ChatMessage> = newest.into_iter().rev().take(live_count).collect();
        for item in live.into_iter().rev() {
            engine.on_live_item(item);
        }

        page_until_exhausted(&mut engine, &history, page_size);

        check_invariants(&engine)?;
        prop_assert!(engine.window().is_exhausted());
        prop_assert_eq!(window_ids(&engine), expected);
    }

    #[test]
    fn prop_retried_page_matches_single_load(
        history in arb_history(),
        page_size in 1usize..6,
        pages in 1usize..5,
    ) {
        let mut once = MergeEngine::new(FeedScope::new("room-1"), page_size);
        let mut retried = MergeEngine::new(FeedScope::new("room-1"), page_size);

        for _ in 0..pages {
            if let Ok(ticket) = once.request_next_page() {
                let page = load_page(&history, ticket.boundary(), page_size);
                prop_assert!(once.on_page_loaded(&ticket, page).is_ok());
            }

            if let Ok(ticket) = retried.request_next_page() {
                // First attempt fails, the retry asks for the same boundary.
                prop_assert!(retried
                    .on_page_failed(&ticket, LoadError::network("timeout"))
                    .is_ok());
                let retry = retried.request_next_page().expect("error state allows retry");
                prop_assert_eq!(retry.boundary(), ticket.boundary());

                let page = load_page(&history, retry.boundary(), page_size);
                prop_assert!(retried.on_page_loaded(&retry, page.clone()).is_ok());

                // The store answers a duplicate request with the same page.
                if let Ok(again) = retried.request_next_page() {
                    let merge = retried.on_page_loaded(&again, page.clone());
                    prop_assert!(merge.is_ok());
                    if let Ok(merge) = merge {
                        prop_assert_eq!(merge.appended + merge.backfilled, 0);
                        prop_assert_eq!(merge.duplicates, page.items.len());
                    }
                }
            }

            prop_assert_eq!(window_ids(&once), window_ids(&retried));
            prop_assert_eq!(once.window().next_boundary(), retried.window().next_boundary());
            prop_assert_eq!(once.window().is_exhausted(), retried.window().is_exhausted());
        }
    }
}
