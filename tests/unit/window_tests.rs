//! Unit tests for the merge engine and paging window
//!
//! Run with: cargo test --test window_tests

use feedsync::cursor::{encode, PageBoundary};
use feedsync::merge::{LiveMerge, MergeEngine, PageMerge};
use feedsync::models::ChatMessage;
use feedsync::paging::{LoadState, SkipReason};
use feedsync::source::{FeedScope, Page};

fn msg(id: &str, created_at: i64) -> ChatMessage {
    ChatMessage::new(id, "room-1", "user-1", "hello", created_at)
}

fn engine(page_size: usize) -> MergeEngine<ChatMessage> {
    MergeEngine::new(FeedScope::new("room-1"), page_size)
}

/// A full page whose boundary points at its last item
fn full_page(items: Vec<ChatMessage>) -> Page<ChatMessage> {
    let next_boundary = items.last().map(encode);
    Page {
        items,
        next_boundary,
    }
}

fn load(engine: &mut MergeEngine<ChatMessage>, page: Page<ChatMessage>) -> PageMerge {
    let ticket = engine.request_next_page().unwrap();
    engine.on_page_loaded(&ticket, page).unwrap()
}

#[test]
fn test_new_engine_is_empty_and_idle() {
    let engine = engine(2);
    let window = engine.window();

    assert!(window.is_empty());
    assert_eq!(window.load_state(), &LoadState::Idle);
    assert!(!window.is_exhausted());
    assert!(window.next_boundary().is_none());
}

#[test]
fn test_live_items_prepend_newest_first() {
    let mut engine = engine(2);

    assert_eq!(engine.on_live_item(msg("a", 1)), LiveMerge::Inserted);
    assert_eq!(engine.on_live_item(msg("b", 2)), LiveMerge::Inserted);
    assert_eq!(engine.on_live_item(msg("c", 2)), LiveMerge::Inserted);

    assert_eq!(engine.window().ids(), vec!["c", "b", "a"]);
    assert_eq!(engine.window().newest().unwrap().id, "c");
    assert_eq!(engine.window().oldest().unwrap().id, "a");
}

#[test]
fn test_live_redelivery_is_duplicate() {
    let mut engine = engine(2);
    engine.on_live_item(msg("a", 1));

    assert_eq!(engine.on_live_item(msg("a", 1)), LiveMerge::Duplicate);
    assert_eq!(engine.window().len(), 1);
}

#[test]
fn test_live_item_older_than_head_is_dropped() {
    let mut engine = engine(2);
    engine.on_live_item(msg("b", 10));

    assert_eq!(engine.on_live_item(msg("a", 5)), LiveMerge::OutOfOrder);
    // Same key, smaller id also sorts below the head.
    assert_eq!(engine.on_live_item(msg("a", 10)), LiveMerge::OutOfOrder);
    assert_eq!(engine.window().ids(), vec!["b"]);
}

#[test]
fn test_page_appends_at_tail() {
    let mut engine = engine(2);

    let merge = load(&mut engine, full_page(vec![msg("d", 40), msg("c", 30)]));
    assert_eq!(merge.appended, 2);
    assert_eq!(merge.duplicates, 0);
    assert!(!merge.exhausted);

    load(&mut engine, full_page(vec![msg("b", 20), msg("a", 10)]));
    assert_eq!(engine.window().ids(), vec!["d", "c", "b", "a"]);
    assert_eq!(
        engine.window().next_boundary(),
        Some(&PageBoundary::from_raw("10:61"))
    );
}

#[test]
fn test_page_skips_items_delivered_live() {
    let mut engine = engine(3);
    engine.on_live_item(msg("c", 30));

    let merge = load(
        &mut engine,
        full_page(vec![msg("c", 30), msg("b", 20), msg("a", 10)]),
    );

    assert_eq!(merge.appended, 2);
    assert_eq!(merge.duplicates, 1);
    assert_eq!(engine.window().ids(), vec!["c", "b", "a"]);
}

#[test]
fn test_page_item_newer_than_tail_is_backfilled_in_order() {
    let mut engine = engine(2);
    engine.on_live_item(msg("a", 10));
    engine.on_live_item(msg("c", 30));

    // "b" sits between the two live items.
    let merge = load(&mut engine, full_page(vec![msg("b", 20), msg("z", 5)]));

    assert_eq!(merge.backfilled, 1);
    assert_eq!(merge.appended, 1);
    assert_eq!(engine.window().ids(), vec!["c", "b", "a", "z"]);
}

#[test]
fn test_short_page_exhausts() {
    let mut engine = engine(3);

    let merge = load(&mut engine, Page::from_items(vec![msg("a", 1)], 3));
    assert!(merge.exhausted);
    assert!(engine.window().is_exhausted());
    assert_eq!(engine.request_next_page(), Err(SkipReason::Exhausted));
}

#[test]
fn test_empty_page_exhausts() {
    let mut engine = engine(3);
    let merge = load(&mut engine, Page::empty());

    assert!(merge.exhausted);
    assert!(engine.window().is_empty());
}

#[test]
fn test_request_while_loading_is_skipped() {
    let mut engine = engine(2);
    let _ticket = engine.request_next_page().unwrap();

    assert_eq!(engine.request_next_page(), Err(SkipReason::AlreadyLoading));
    assert!(engine.window().load_state().is_loading());
}

#[test]
fn test_failed_page_keeps_items_and_boundary() {
    let mut engine = engine(2);
    load(&mut engine, full_page(vec![msg("b", 2), msg("a", 1)]));
    let boundary = engine.window().next_boundary().cloned();

    let ticket = engine.request_next_page().unwrap();
    engine
        .on_page_failed(&ticket, feedsync::error::LoadError::network("reset"))
        .unwrap();

    assert_eq!(engine.window().ids(), vec!["b", "a"]);
    assert_eq!(engine.window().next_boundary().cloned(), boundary);
    assert!(matches!(
        engine.window().load_state(),
        LoadState::Error(feedsync::error::LoadError::Network(_))
    ));

    // Retry asks for the same boundary.
    let retry = engine.request_next_page().unwrap();
    assert_eq!(retry.boundary().cloned(), boundary);
}

#[test]
fn test_restart_clears_and_invalidates_in_flight_load() {
    let mut engine = engine(2);
    load(&mut engine, full_page(vec![msg("b", 2), msg("a", 1)]));
    let in_flight = engine.request_next_page().unwrap();

    engine.restart();

    assert!(engine.window().is_empty());
    assert!(engine.window().next_boundary().is_none());
    assert_eq!(engine.window().load_state(), &LoadState::Idle);
    assert!(engine
        .on_page_loaded(&in_flight, full_page(vec![msg("z", 0)]))
        .is_err());
    assert!(engine.window().is_empty());

    let fresh = engine.request_next_page().unwrap();
    assert!(fresh.boundary().is_none());
}

#[test]
fn test_snapshot_json_shape() {
    let mut engine = engine(2);
    engine.on_live_item(msg("m1", 100));

    let json = serde_json::to_value(engine.snapshot()).unwrap();
    assert_eq!(json["items"][0]["id"], "m1");
    assert_eq!(json["items"][0]["createdAt"], "100");
    assert_eq!(json["nextCursor"], serde_json::Value::Null);
    assert_eq!(json["isExhausted"], false);
    assert_eq!(json["loadState"]["status"], "idle");
}
