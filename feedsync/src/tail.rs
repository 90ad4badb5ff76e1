//! Live tail driver.
//!
//! Keeps one subscription open per feed and feeds every delivered item into
//! the merge engine. When a subscription fails or ends it resubscribes with a
//! doubling delay; the engine only ever sees a pause in live items. A lag
//! report does not end the subscription.

use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Backoff;
use crate::error::TailError;
use crate::feed::FeedShared;
use crate::item::FeedItem;
use crate::metrics;
use crate::source::LiveTail;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    SubscribeFailed,
    StreamError,
    StreamEnded,
    Closed,
}

impl SessionEnd {
    fn as_str(self) -> &'static str {
        match self {
            Self::SubscribeFailed => "subscribe_failed",
            Self::StreamError => "stream_error",
            Self::StreamEnded => "stream_ended",
            Self::Closed => "closed",
        }
    }
}

/// Run until the feed is closed (or the task is aborted).
pub(crate) async fn run_live_tail<I: FeedItem>(
    shared: Arc<FeedShared<I>>,
    tail: Arc<dyn LiveTail<I>>,
    backoff: Backoff,
) {
    let mut delay = backoff.base;

    loop {
        if !shared.is_active() {
            break;
        }

        let (end, delivered) = run_session(&shared, tail.as_ref()).await;
        if end == SessionEnd::Closed || !shared.is_active() {
            break;
        }

        // A session that made progress starts the backoff over.
        if delivered > 0 {
            delay = backoff.base;
        }

        metrics::record_tail_resubscribe(end.as_str());
        warn!(
            scope = %shared.scope,
            reason = end.as_str(),
            delivered,
            reconnect_delay_ms = delay.as_millis() as u64,
            "Live tail ended, resubscribing"
        );
        tokio::time::sleep(delay).await;
        delay = backoff.next(delay);
    }

    debug!(scope = %shared.scope, "Live tail stopped");
}

async fn run_session<I: FeedItem>(
    shared: &FeedShared<I>,
    tail: &dyn LiveTail<I>,
) -> (SessionEnd, u64) {
    let mut stream = match tail.subscribe(&shared.scope).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(scope = %shared.scope, error = %e, "Live tail subscribe failed");
            return (SessionEnd::SubscribeFailed, 0);
        }
    };
    info!(scope = %shared.scope, "Live tail subscribed");

    let mut delivered = 0u64;
    while let Some(next) = stream.next().await {
        match next {
            Ok(item) => {
                if !shared.apply_live(item).await {
                    return (SessionEnd::Closed, delivered);
                }
                delivered += 1;
            }
            // The store replays what was skipped; the subscription stays.
            Err(TailError::Lagged(skipped)) => {
                metrics::record_tail_lag(skipped);
                warn!(scope = %shared.scope, skipped, "Live tail lagged, continuing");
            }
            Err(e) => {
                warn!(scope = %shared.scope, error = %e, "Live tail stream error");
                return (SessionEnd::StreamError, delivered);
            }
        }
    }

    (SessionEnd::StreamEnded, delivered)
}
