//! feedsync library
//!
//! Keyset-paginated, reverse-chronological feeds merged with an
//! at-least-once live tail. The `feedsyncd` binary in main.rs serves chat
//! room feeds over HTTP on top of this library.

pub mod config;
pub mod cursor;
pub mod error;
pub mod feed;
pub mod item;
pub mod memory;
pub mod merge;
pub mod metrics;
pub mod models;
pub mod paging;
pub mod registry;
pub mod routes;
pub mod source;
mod tail;
pub mod window;

pub use feed::{Feed, FeedEvent, PageOutcome};
pub use item::{FeedItem, FeedKey, OrderingKey};
pub use registry::FeedRegistry;
pub use source::{FeedScope, LiveStream, LiveTail, Page, PageLoader};
