#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use backoff::ExponentialBackoffBuilder;
use bon::Builder;
use serde::Deserialize;
use url::Url;

use crate::Result;
use crate::error::Error;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_HEARTBEAT_TIMEOUT_DURATION: Duration = Duration::from_millis(2500);
const DEFAULT_RECEIVE_TIMEOUT_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_DELAY_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Path appended to `base_path` to reach the event stream.
const WEBSOCKET_PATH: &str = "/websocket";

/// Where the server lives. Immutable once built.
///
/// ```
/// use mattermost_websocket::ws::config::ConnectionOptions;
///
/// let options = ConnectionOptions::builder()
///     .host("chat.example.com")
///     .port(443)
///     .base_path("/api/v4")
///     .build();
///
/// assert_eq!(
///     options.url().unwrap(),
///     "wss://chat.example.com:443/api/v4/websocket"
/// );
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Builder, Deserialize)]
pub struct ConnectionOptions {
    /// Server host name, without scheme
    #[builder(into)]
    pub host: String,
    /// Server port
    pub port: u16,
    /// Path prefix of the API, e.g. `/api/v4`. May be empty.
    #[builder(into, default)]
    #[serde(default)]
    pub base_path: String,
    /// Whether the server's TLS certificate is verified
    #[builder(default = true)]
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

const fn default_verify_tls() -> bool {
    true
}

impl ConnectionOptions {
    /// Builds `wss://{host}:{port}{base_path}/websocket`.
    ///
    /// The string is validated with [`Url`] but returned as built: [`Url`] would drop an
    /// explicit default port such as `:443`.
    pub fn url(&self) -> Result<String> {
        if self.host.is_empty() {
            return Err(Error::validation("host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::validation("port must not be zero"));
        }
        if !self.base_path.is_empty() && !self.base_path.starts_with('/') {
            return Err(Error::validation(format!(
                "base path must start with '/', got {:?}",
                self.base_path
            )));
        }

        let raw = format!(
            "wss://{}:{}{}{WEBSOCKET_PATH}",
            self.host, self.port, self.base_path
        );
        Url::parse(&raw)?;
        Ok(raw)
    }
}

/// Configuration for WebSocket client behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval for sending PING frames to keep the connection alive
    pub heartbeat_interval: Duration,
    /// Maximum time to wait for a PONG before considering the connection dead
    pub heartbeat_timeout: Duration,
    /// Maximum time to wait for any inbound frame before considering the connection dead
    pub receive_timeout: Duration,
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL_DURATION,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT_DURATION,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT_DURATION,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive failed attempts before giving up.
    /// `None` means infinite retries; `Some(0)` is rejected when the supervisor is built.
    pub max_attempts: Option<u32>,
    /// How long to wait between attempts
    pub strategy: RetryStrategy,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            strategy: RetryStrategy::default(),
        }
    }
}

/// Delay policy applied after every failed or ended connection.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Same delay every time
    Fixed(Duration),
    /// Growing delay, reset once a connection delivers a message
    Exponential {
        /// Delay after the first failure
        initial: Duration,
        /// Upper bound for the delay
        max: Duration,
        /// Growth factor between consecutive delays
        multiplier: f64,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_RETRY_DELAY_DURATION)
    }
}

impl RetryStrategy {
    /// Exponential strategy with the crate's default bounds.
    #[must_use]
    pub fn exponential() -> Self {
        Self::Exponential {
            initial: DEFAULT_INITIAL_BACKOFF_DURATION,
            max: DEFAULT_MAX_BACKOFF_DURATION,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    pub(crate) fn backoff(&self) -> Box<dyn Backoff + Send> {
        match *self {
            Self::Fixed(delay) => Box::new(Constant::new(delay)),
            Self::Exponential {
                initial,
                max,
                multiplier,
            } => Box::new(
                ExponentialBackoffBuilder::default()
                    .with_initial_interval(initial)
                    .with_max_interval(max)
                    .with_multiplier(multiplier)
                    .with_max_elapsed_time(None) // Max attempts are handled by the supervisor
                    .build(),
            ),
        }
    }
}

/// Per-connection parameters handed to a [`crate::ws::Transport`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub receive_timeout: Duration,
    pub verify_tls: bool,
}

impl TransportSettings {
    #[must_use]
    pub fn new(config: &Config, verify_tls: bool) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval,
            heartbeat_timeout: config.heartbeat_timeout,
            receive_timeout: config.receive_timeout,
            verify_tls,
        }
    }
}
