//! Mirror Configuration Settings
//!
//! Configuration types for the market mirror, loaded from environment
//! variables.

use std::time::Duration;

use crate::infrastructure::exchange::{kalshi, polymarket, predictfun};

/// Exchange feed to mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Exchange {
    /// Kalshi event contracts (orderbook_delta channel).
    #[default]
    Kalshi,
    /// Polymarket outcome tokens (CLOB market channel).
    Polymarket,
    /// Predict.fun prediction markets (predictOrderbook topics).
    PredictFun,
}

impl Exchange {
    /// Parse exchange from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().replace(['-', '_', '.'], "").as_str() {
            "polymarket" => Self::Polymarket,
            "predictfun" => Self::PredictFun,
            _ => Self::Kalshi,
        }
    }

    /// Get the exchange name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Kalshi => "kalshi",
            Self::Polymarket => "polymarket",
            Self::PredictFun => "predictfun",
        }
    }
}

/// Target environment (production vs demo/testnet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Production endpoints.
    #[default]
    Production,
    /// Demo (Kalshi) or testnet (Predict.fun) endpoints.
    Demo,
}

impl Environment {
    /// Parse environment from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "demo" | "testnet" | "sandbox" => Self::Demo,
            _ => Self::Production,
        }
    }

    /// Check if this is the production environment.
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Demo => "demo",
        }
    }
}

/// API token for authenticated feeds, carried as a connection header.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String) -> Self {
        Self { api_key }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout before considering the connection dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(20),
            reconnect_delay_initial: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// Complete mirror configuration.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Exchange to mirror.
    pub exchange: Exchange,
    /// Target environment.
    pub environment: Environment,
    /// API credentials, for feeds that require them.
    pub credentials: Option<Credentials>,
    /// Instruments to subscribe to at startup.
    pub instruments: Vec<String>,
    /// Explicit WebSocket URL, overriding the per-exchange default.
    pub url_override: Option<String>,
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Quote update channel capacity.
    pub update_channel_capacity: usize,
}

impl MirrorConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a set variable is empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let exchange = std::env::var("MIRROR_EXCHANGE")
            .map(|s| Exchange::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let environment = std::env::var("MIRROR_ENV")
            .map(|s| Environment::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let credentials = non_empty_env("MIRROR_API_KEY")?.map(Credentials::new);

        let instruments = std::env::var("MIRROR_INSTRUMENTS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let url_override = non_empty_env("MIRROR_WS_URL")?;

        let websocket = WebSocketSettings {
            heartbeat_interval: parse_env_duration_secs(
                "MIRROR_HEARTBEAT_INTERVAL_SECS",
                WebSocketSettings::default().heartbeat_interval,
            ),
            heartbeat_timeout: parse_env_duration_secs(
                "MIRROR_HEARTBEAT_TIMEOUT_SECS",
                WebSocketSettings::default().heartbeat_timeout,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                "MIRROR_RECONNECT_DELAY_INITIAL_MS",
                WebSocketSettings::default().reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "MIRROR_RECONNECT_DELAY_MAX_SECS",
                WebSocketSettings::default().reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                "MIRROR_RECONNECT_DELAY_MULTIPLIER",
                WebSocketSettings::default().reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: parse_env_u32(
                "MIRROR_MAX_RECONNECT_ATTEMPTS",
                WebSocketSettings::default().max_reconnect_attempts,
            ),
        };

        let update_channel_capacity = parse_env_usize("MIRROR_UPDATE_CHANNEL_CAPACITY", 4_096);

        Ok(Self {
            exchange,
            environment,
            credentials,
            instruments,
            url_override,
            websocket,
            update_channel_capacity,
        })
    }

    /// The WebSocket URL to connect to.
    #[must_use]
    pub fn stream_url(&self) -> String {
        if let Some(url) = &self.url_override {
            return url.clone();
        }

        let production = self.environment.is_production();
        match self.exchange {
            Exchange::Kalshi if production => kalshi::WS_URL.to_string(),
            Exchange::Kalshi => kalshi::WS_URL_DEMO.to_string(),
            // Polymarket's market channel has no demo endpoint.
            Exchange::Polymarket => polymarket::WS_URL.to_string(),
            Exchange::PredictFun if production => predictfun::WS_URL.to_string(),
            Exchange::PredictFun => predictfun::WS_URL_TESTNET.to_string(),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn non_empty_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Ok(value) => Ok(Some(value)),
        Err(_) => Ok(None),
    }
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
