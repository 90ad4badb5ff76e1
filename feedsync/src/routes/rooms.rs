//! Chat room feed endpoints
//!
//! Each room id is a feed scope. Feeds are opened on first access and kept in
//! the registry until deleted, evicted as idle, or the server shuts down. An
//! open SSE stream keeps its feed from being evicted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use std::convert::Infallible;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};

use crate::error::AppError;
use crate::feed::{Feed, FeedEvent, PageOutcome};
use crate::memory::MemoryStore;
use crate::models::ChatMessage;
use crate::registry::FeedRegistry;
use crate::source::FeedScope;
use crate::window::WindowSnapshot;

const CHANNEL_BUFFER_SIZE: usize = 32;
const MAX_ID_LEN: usize = 128;

/// State for room routes (extracted from AppState)
#[derive(Clone)]
pub struct RoomsState {
    pub registry: FeedRegistry<ChatMessage>,
    pub store: Arc<MemoryStore<ChatMessage>>,
    /// SSE keep-alive interval
    pub sse_keepalive: Duration,
    /// Max time to wait on a slow SSE client before dropping it
    pub sse_send_timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextPageResponse {
    pub outcome: PageOutcome,
    pub feed: WindowSnapshot<ChatMessage>,
}

/// Body for POST /v1/rooms/:room_id/messages
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    pub id: String,
    pub sender_id: String,
    pub body: String,
    /// Creation time in Unix milliseconds (defaults to now)
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageResponse {
    pub message: ChatMessage,
    /// False if a message with this id already existed
    pub inserted: bool,
}

fn parse_room_id(room_id: String) -> Result<FeedScope, AppError> {
    if room_id.is_empty() || room_id.len() > MAX_ID_LEN {
        return Err(AppError::bad_request(format!(
            "room_id must be 1 to {} bytes",
            MAX_ID_LEN
        )));
    }
    Ok(FeedScope::new(room_id))
}

/// Whole milliseconds, saturating at `i64::MAX`
fn as_millis_i64(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(as_millis_i64)
        .unwrap_or_else(|e| {
            warn!(error = %e, "System clock before Unix epoch, using 0");
            0
        })
}

/// GET /v1/rooms/:room_id/feed
#[instrument(skip(state))]
pub async fn get_room_feed(
    State(state): State<RoomsState>,
    Path(room_id): Path<String>,
) -> Result<Json<WindowSnapshot<ChatMessage>>, AppError> {
    let scope = parse_room_id(room_id)?;
    let feed = state.registry.open(&scope).await;
    Ok(Json(feed.snapshot().await))
}

/// POST /v1/rooms/:room_id/feed/next-page
///
/// Load failures are returned as errors; the feed keeps the error in its load
/// state until the next request retries it.
#[instrument(skip(state))]
pub async fn next_page(
    State(state): State<RoomsState>,
    Path(room_id): Path<String>,
) -> Result<Json<NextPageResponse>, AppError> {
    let scope = parse_room_id(room_id)?;
    let feed = state.registry.open(&scope).await;

    let outcome = feed.request_next_page().await;
    if let PageOutcome::Failed(err) = &outcome {
        return Err(err.clone().into());
    }

    info!(%scope, outcome = ?outcome, "Next page requested");
    Ok(Json(NextPageResponse {
        outcome,
        feed: feed.snapshot().await,
    }))
}

/// POST /v1/rooms/:room_id/feed/restart
#[instrument(skip(state))]
pub async fn restart_feed(
    State(state): State<RoomsState>,
    Path(room_id): Path<String>,
) -> Result<Json<WindowSnapshot<ChatMessage>>, AppError> {
    let scope = parse_room_id(room_id)?;
    let feed = state
        .registry
        .get(&scope)
        .await
        .ok_or_else(|| AppError::not_found(format!("no open feed for room {}", scope)))?;

    feed.restart().await;
    Ok(Json(feed.snapshot().await))
}

/// DELETE /v1/rooms/:room_id/feed
#[instrument(skip(state))]
pub async fn close_feed(
    State(state): State<RoomsState>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let scope = parse_room_id(room_id)?;
    if state.registry.close(&scope).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("no open feed for room {}", scope)))
    }
}

/// POST /v1/rooms/:room_id/messages
#[instrument(skip(state, request), fields(message_id = %request.id))]
pub async fn post_message(
    State(state): State<RoomsState>,
    Path(room_id): Path<String>,
    Json(request): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<PostMessageResponse>), AppError> {
    let scope = parse_room_id(room_id)?;
    if request.id.is_empty() || request.id.len() > MAX_ID_LEN {
        return Err(AppError::bad_request(format!(
            "id must be 1 to {} bytes",
            MAX_ID_LEN
        )));
    }
    if request.sender_id.is_empty() {
        return Err(AppError::bad_request("senderId must not be empty"));
    }

    let message = ChatMessage::new(
        request.id,
        scope.as_str(),
        request.sender_id,
        request.body,
        request.created_at.unwrap_or_else(now_millis),
    );

    let inserted = state.store.publish(&scope, message.clone()).await;
    let status = if inserted {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(PostMessageResponse { message, inserted })))
}

/// GET /v1/rooms/:room_id/feed/subscribe
///
/// Sends a `snapshot` event first, then one event per feed change. A
/// subscriber that falls behind gets a fresh `snapshot` instead of the
/// events it missed.
pub async fn subscribe_room_feed(
    State(state): State<RoomsState>,
    Path(room_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let scope = parse_room_id(room_id)?;
    let feed = state.registry.open(&scope).await;

    let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    tokio::spawn(run_event_stream(feed, tx, state.sse_send_timeout));

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::new().interval(state.sse_keepalive)))
}

fn event_name<I>(event: &FeedEvent<I>) -> &'static str {
    match event {
        FeedEvent::Prepended(_) => "prepended",
        FeedEvent::PageMerged(_) => "pageMerged",
        FeedEvent::LoadStateChanged(_) => "loadState",
        FeedEvent::Restarted => "restarted",
        FeedEvent::Closed => "closed",
    }
}

async fn run_event_stream(
    feed: Arc<Feed<ChatMessage>>,
    tx: mpsc::Sender<Result<Event, Infallible>>,
    send_timeout: Duration,
) {
    // Subscribe before the snapshot so no change falls between the two.
    let mut events = feed.subscribe_events();
    if !feed.is_active() {
        let _ = send_event(&tx, "closed", &FeedEvent::<ChatMessage>::Closed, send_timeout).await;
        return;
    }
    if send_event(&tx, "snapshot", &feed.snapshot().await, send_timeout)
        .await
        .is_err()
    {
        return;
    }

    loop {
        let next = tokio::select! {
            next = events.recv() => next,
            _ = tx.closed() => {
                debug!(scope = %feed.scope(), "SSE client disconnected");
                return;
            }
        };

        match next {
            Ok(event) => {
                let closed = matches!(event, FeedEvent::Closed);
                if send_event(&tx, event_name(&event), &event, send_timeout)
                    .await
                    .is_err()
                    || closed
                {
                    return;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(scope = %feed.scope(), skipped, "SSE subscriber lagged, resending snapshot");
                if send_event(&tx, "snapshot", &feed.snapshot().await, send_timeout)
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(RecvError::Closed) => return,
        }
    }
}

async fn send_event<T: Serialize>(
    tx: &mpsc::Sender<Result<Event, Infallible>>,
    event_type: &str,
    data: &T,
    timeout: Duration,
) -> Result<(), ()> {
    let json = serde_json::to_string(data).map_err(|_| ())?;
    let event = Event::default().event(event_type).data(json);

    match tokio::time::timeout(timeout, tx.send(Ok(event))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => {
            warn!("Failed to send SSE event, client disconnected");
            Err(())
        }
        Err(_) => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "SSE send timeout, dropping slow client"
            );
            Err(())
        }
    }
}

pub fn room_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    RoomsState: axum::extract::FromRef<S>,
{
    Router::new()
        .route("/:room_id/feed", get(get_room_feed).delete(close_feed))
        .route("/:room_id/feed/next-page", post(next_page))
        .route("/:room_id/feed/restart", post(restart_feed))
        .route("/:room_id/feed/subscribe", get(subscribe_room_feed))
        .route("/:room_id/messages", post(post_message))
}
