use crate::error::ConfigError;
use crate::schedule::RefreshTiming;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:8000/api/v1/ws";
pub const DEFAULT_FAN_COUNT: u32 = 3;
pub const MAX_FAN_COUNT: u32 = 64;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How the client paces reconnect attempts after the channel drops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Retry at once, every time, forever.
    Immediate,
    /// First retry at once, then capped growing delays until a connect succeeds.
    #[default]
    Backoff,
}

impl FromStr for ReconnectPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(ReconnectPolicy::Immediate),
            "backoff" => Ok(ReconnectPolicy::Backoff),
            other => Err(ConfigError::UnknownReconnectPolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    /// Initial position of the auto-refresh switch.
    pub auto_refresh: bool,
    pub refresh: RefreshTiming,
    /// Number of fan slots on the dashboard.
    pub fan_count: u32,
    pub reconnect: ReconnectPolicy,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            auto_refresh: true,
            refresh: RefreshTiming::default(),
            fan_count: DEFAULT_FAN_COUNT,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(self.url.trim())?;
        // The websocket stack is built without TLS, so `wss` could never connect.
        if url.scheme() != "ws" {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
        }
        if self.refresh.slow.is_zero() {
            return Err(ConfigError::Zero("slow refresh period"));
        }
        if self.refresh.fast.is_zero() {
            return Err(ConfigError::Zero("fast refresh period"));
        }
        if self.fan_count == 0 {
            return Err(ConfigError::Zero("fan count"));
        }
        if self.fan_count > MAX_FAN_COUNT {
            return Err(ConfigError::TooManyFans(self.fan_count));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Zero("connect timeout"));
        }
        Ok(url)
    }
}
