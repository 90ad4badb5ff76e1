use axum::{
    extract::State,
    http::{HeaderName, Request},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, info_span, warn, Span};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use feedsync::config::Config;
use feedsync::memory::MemoryStore;
use feedsync::metrics;
use feedsync::models::ChatMessage;
use feedsync::registry::FeedRegistry;
use feedsync::routes::{room_routes, RoomsState};

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const SSE_SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: FeedRegistry<ChatMessage>,
    pub store: Arc<MemoryStore<ChatMessage>>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

// Allow extracting RoomsState from AppState
impl axum::extract::FromRef<AppState> for RoomsState {
    fn from_ref(app_state: &AppState) -> Self {
        RoomsState {
            registry: app_state.registry.clone(),
            store: app_state.store.clone(),
            sse_keepalive: app_state.config.sse_keepalive(),
            sse_send_timeout: SSE_SEND_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    open_feeds: usize,
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        open_feeds: state.registry.len().await,
    })
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}

fn init_logging() {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in ["hyper=warn", "tower_http=debug"] {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive {}: {}", directive, e),
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .json(),
        )
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_logging();

    let config = Config::from_env()?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    let addr = config.socket_addr()?;

    info!("Initializing metrics...");
    let metrics_handle = metrics::init_metrics()?;
    info!("Metrics initialized");

    info!("Starting feedsyncd");
    info!(host = %config.server_host, port = %config.server_port, "Server configuration");
    info!(
        page_size = config.page_size,
        load_timeout_ms = config.load_timeout_ms,
        resubscribe_base_delay_ms = config.resubscribe_base_delay_ms,
        resubscribe_max_delay_ms = config.resubscribe_max_delay_ms,
        feed_idle_timeout_secs = config.feed_idle_timeout_secs,
        "Feed configuration"
    );

    let store = Arc::new(MemoryStore::<ChatMessage>::new(config.live_buffer_size));
    let registry = FeedRegistry::new(store.clone(), store.clone(), config.feed_config());
    let eviction =
        registry.spawn_idle_eviction(config.feed_idle_timeout(), config.idle_sweep_interval());

    let state = AppState {
        config: Arc::new(config),
        registry: registry.clone(),
        store,
        metrics_handle,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .nest("/v1/rooms", room_routes())
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let request_id = request
                        .headers()
                        .get(&X_REQUEST_ID)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");

                    info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                })
                .on_response(|response: &axum::http::Response<_>, latency: Duration, _span: &Span| {
                    tracing::info!(
                        status = %response.status().as_u16(),
                        latency_ms = %latency.as_millis(),
                        "response"
                    );
                })
                .on_failure(|error: tower_http::classify::ServerErrorsFailureClass, latency: Duration, _span: &Span| {
                    tracing::error!(
                        error = %error,
                        latency_ms = %latency.as_millis(),
                        "request failed"
                    );
                }),
        )
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Closing open feeds...");
    eviction.abort();
    registry.close_all().await;

    info!("Shutdown complete");
    Ok(())
}
