//! Venue endpoint configuration.
//!
//! Defaults point at the production venues. Every field can be overridden
//! from environment variables, which is also how tests aim adapters at local
//! mock servers.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use spotlink_domain::{ExchangeError, ExchangeResult};

/// Gate.io REST API base URL
pub const GATE_REST_URL: &str = "https://api.gateio.ws";

/// Gate.io WebSocket v4 URL
pub const GATE_WS_URL: &str = "wss://api.gateio.ws/ws/v4/";

/// KuCoin REST API base URL
pub const KUCOIN_REST_URL: &str = "https://api.kucoin.com";

/// KuCoin WebSocket endpoint, used when the bullet response names none
pub const KUCOIN_WS_URL: &str = "wss://ws-api.kucoin.com/endpoint";

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Keep-alive ping interval in seconds
const PING_INTERVAL_SECS: u64 = 20;

/// Endpoints and timings for one venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueConfig {
    /// REST base URL (no trailing slash)
    pub rest_url: String,
    /// WebSocket URL
    pub ws_url: String,
    /// Timeout applied to each REST request
    pub request_timeout: Duration,
    /// Interval between application-level pings, for venues that need them
    pub ping_interval: Duration,
}

impl VenueConfig {
    /// Production Gate.io endpoints.
    pub fn gate() -> Self {
        Self::new(GATE_REST_URL, GATE_WS_URL)
    }

    /// Production KuCoin endpoints.
    pub fn kucoin() -> Self {
        Self::new(KUCOIN_REST_URL, KUCOIN_WS_URL)
    }

    /// Custom endpoints with default timings.
    pub fn new(rest_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            rest_url: rest_url.into().trim_end_matches('/').to_string(),
            ws_url: ws_url.into(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            ping_interval: Duration::from_secs(PING_INTERVAL_SECS),
        }
    }

    /// Override the keep-alive interval.
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Override the REST request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Apply overrides from `{prefix}_REST_URL`, `{prefix}_WS_URL`,
    /// `{prefix}_TIMEOUT_SECS` and `{prefix}_PING_INTERVAL_SECS` on top of
    /// `defaults`.
    ///
    /// A `.env` file is loaded first if present.
    pub fn from_env(prefix: &str, defaults: Self) -> ExchangeResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let mut config = defaults;

        if let Ok(url) = env::var(format!("{}_REST_URL", prefix)) {
            config.rest_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = env::var(format!("{}_WS_URL", prefix)) {
            config.ws_url = url;
        }
        if let Some(secs) = Self::load_env::<u64>(&format!("{}_TIMEOUT_SECS", prefix))? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = Self::load_env::<u64>(&format!("{}_PING_INTERVAL_SECS", prefix))? {
            config.ping_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }

    fn load_env<T: FromStr>(key: &str) -> ExchangeResult<Option<T>> {
        match env::var(key) {
            Ok(val) => val
                .parse::<T>()
                .map(Some)
                .map_err(|_| ExchangeError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(None),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
