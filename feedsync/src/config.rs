use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

/// Recommended page size: large enough to fill a phone screen of chat rows.
pub const DEFAULT_PAGE_SIZE: usize = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub server_host: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    /// Items requested per page load
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Timeout for a single page load in milliseconds; expiry counts as a
    /// network error
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// First delay before resubscribing a dropped live tail
    #[serde(default = "default_resubscribe_base_delay_ms")]
    pub resubscribe_base_delay_ms: u64,

    /// Upper bound for the doubling resubscribe delay
    #[serde(default = "default_resubscribe_max_delay_ms")]
    pub resubscribe_max_delay_ms: u64,

    /// Capacity of each feed's event broadcast channel
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// Capacity of each in-memory scope's live broadcast channel
    #[serde(default = "default_live_buffer_size")]
    pub live_buffer_size: usize,

    /// SSE keep-alive interval in seconds
    #[serde(default = "default_sse_keepalive_secs")]
    pub sse_keepalive_secs: u64,

    /// Close feeds untouched for this long that have no SSE subscribers
    #[serde(default = "default_feed_idle_timeout_secs")]
    pub feed_idle_timeout_secs: u64,

    /// How often to look for idle feeds
    #[serde(default = "default_idle_sweep_interval_secs")]
    pub idle_sweep_interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_load_timeout_ms() -> u64 {
    10_000
}

fn default_resubscribe_base_delay_ms() -> u64 {
    500
}

fn default_resubscribe_max_delay_ms() -> u64 {
    30_000
}

fn default_event_buffer_size() -> usize {
    256
}

fn default_live_buffer_size() -> usize {
    1024
}

fn default_sse_keepalive_secs() -> u64 {
    15
}

fn default_feed_idle_timeout_secs() -> u64 {
    300
}

fn default_idle_sweep_interval_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: default_host(),
            server_port: default_port(),
            page_size: default_page_size(),
            load_timeout_ms: default_load_timeout_ms(),
            resubscribe_base_delay_ms: default_resubscribe_base_delay_ms(),
            resubscribe_max_delay_ms: default_resubscribe_max_delay_ms(),
            event_buffer_size: default_event_buffer_size(),
            live_buffer_size: default_live_buffer_size(),
            sse_keepalive_secs: default_sse_keepalive_secs(),
            feed_idle_timeout_secs: default_feed_idle_timeout_secs(),
            idle_sweep_interval_secs: default_idle_sweep_interval_secs(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            // FEEDSYNC_PAGE_SIZE maps to page_size; `__` is reserved for nesting.
            .add_source(
                config::Environment::with_prefix("FEEDSYNC")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        cfg.try_deserialize()
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("PAGE_SIZE must be at least 1".to_string());
        }
        if self.event_buffer_size == 0 || self.live_buffer_size == 0 {
            return Err("buffer sizes must be at least 1".to_string());
        }
        if self.feed_idle_timeout_secs == 0 || self.idle_sweep_interval_secs == 0 {
            return Err(
                "FEED_IDLE_TIMEOUT_SECS and IDLE_SWEEP_INTERVAL_SECS must be at least 1".to_string(),
            );
        }
        if self.resubscribe_base_delay_ms > self.resubscribe_max_delay_ms {
            return Err(format!(
                "RESUBSCRIBE_BASE_DELAY_MS ({}) must not exceed RESUBSCRIBE_MAX_DELAY_MS ({})",
                self.resubscribe_base_delay_ms, self.resubscribe_max_delay_ms
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server_host, self.server_port).parse()
    }

    /// Get page load timeout as Duration
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Get SSE keep-alive interval as Duration
    pub fn sse_keepalive(&self) -> Duration {
        Duration::from_secs(self.sse_keepalive_secs)
    }

    pub fn feed_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_idle_timeout_secs)
    }

    pub fn idle_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.idle_sweep_interval_secs)
    }

    /// Runtime options handed to each feed instance
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            page_size: self.page_size,
            load_timeout: self.load_timeout(),
            resubscribe: Backoff::new(
                Duration::from_millis(self.resubscribe_base_delay_ms),
                Duration::from_millis(self.resubscribe_max_delay_ms),
            ),
            event_buffer_size: self.event_buffer_size,
        }
    }
}

/// Per-feed runtime options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub page_size: usize,
    pub load_timeout: Duration,
    pub resubscribe: Backoff,
    pub event_buffer_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Config::default().feed_config()
    }
}

impl FeedConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_load_timeout(mut self, load_timeout: Duration) -> Self {
        self.load_timeout = load_timeout;
        self
    }

    pub fn with_resubscribe(mut self, resubscribe: Backoff) -> Self {
        self.resubscribe = resubscribe;
        self
    }
}

/// Doubling delay between `base` and `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay to use after `current`
    pub fn next(&self, current: Duration) -> Duration {
        std::cmp::min(current * 2, self.max)
    }
}
