//! Service configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Unparseable values fall back to their
//! defaults, except the bind address and the hold policy, which fail
//! startup.

use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::EventId;
use crate::error::InventoryError;
use crate::service::LeaseManager;

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-field lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Demo inventory created at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedConfig {
    /// Event the demo seats belong to.
    pub event_id: EventId,
    /// Number of rows.
    pub rows: i32,
    /// Seats in each row.
    pub seats_per_row: i32,
}

/// Top-level service configuration.
///
/// Loaded once at startup via [`InventoryConfig::from_env`].
#[derive(Debug, Clone)]
pub struct InventoryConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8080`).
    pub listen_addr: SocketAddr,

    /// Hold duration and limit policy.
    pub leases: LeaseManager,

    /// Period of the background expiry sweep.
    pub sweep_interval: Duration,

    /// Notifications buffered per subscriber before it is disconnected.
    pub subscriber_queue_depth: usize,

    /// Capacity of the store's commit broadcast channel.
    pub commit_feed_capacity: usize,

    /// Extra compare-and-swap attempts after a version race.
    pub cas_max_retries: u32,

    /// Timeout applied to non-streaming requests.
    pub request_timeout: Duration,

    /// Period of SSE keep-alive comments.
    pub sse_keepalive: Duration,

    /// Demo inventory, if seeding is enabled.
    pub seed: Option<SeedConfig>,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            leases: LeaseManager::default(),
            sweep_interval: Duration::from_millis(1000),
            subscriber_queue_depth: 64,
            commit_feed_capacity: 10_000,
            cas_max_retries: 8,
            request_timeout: Duration::from_secs(10),
            sse_keepalive: Duration::from_secs(15),
            seed: Some(SeedConfig {
                event_id: EventId::new(1),
                rows: 1,
                seats_per_row: 5,
            }),
            log_format: LogFormat::Pretty,
        }
    }
}

impl InventoryConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InvalidArgument`] if `LISTEN_ADDR` is set
    /// but cannot be parsed, or if the hold durations are zero or the
    /// default exceeds the maximum.
    pub fn from_env() -> Result<Self, InventoryError> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| InventoryError::InvalidArgument(format!("LISTEN_ADDR: {e}")))?;

        let leases = LeaseManager::new(
            Duration::from_secs(parse_env("HOLD_DEFAULT_SECS", 300)),
            Duration::from_secs(parse_env("HOLD_MAX_SECS", 900)),
        )?;

        let seed = parse_env_bool("SEED_DEMO", true).then(|| SeedConfig {
            event_id: EventId::new(parse_env("SEED_EVENT_ID", 1)),
            rows: parse_env("SEED_ROWS", 1),
            seats_per_row: parse_env("SEED_SEATS_PER_ROW", 5),
        });

        let log_format = match std::env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            listen_addr,
            leases,
            sweep_interval: Duration::from_millis(parse_env("SWEEP_INTERVAL_MS", 1000)),
            subscriber_queue_depth: parse_env("SUBSCRIBER_QUEUE_DEPTH", 64),
            commit_feed_capacity: parse_env("COMMIT_FEED_CAPACITY", 10_000),
            cas_max_retries: parse_env("CAS_MAX_RETRIES", 8),
            request_timeout: Duration::from_secs(parse_env("REQUEST_TIMEOUT_SECS", 10)),
            sse_keepalive: Duration::from_secs(parse_env("SSE_KEEPALIVE_SECS", 15)),
            seed,
            log_format,
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("TRUE") | Some("1") => true,
        Some("false") | Some("FALSE") | Some("0") => false,
        _ => default,
    }
}
