use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported url scheme {0:?} (expected ws)")]
    UnsupportedScheme(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("fan count {0} exceeds the maximum of {max}", max = crate::config::MAX_FAN_COUNT)]
    TooManyFans(u32),
    #[error("unknown reconnect policy {0:?} (expected immediate or backoff)")]
    UnknownReconnectPolicy(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("sync actor unavailable")]
    ActorUnavailable,
    #[error("invalid duty cycle {0} (expected 0..=100)")]
    InvalidDutyCycle(u8),
    #[error("fan {fan_id} not found ({fan_count} configured)")]
    UnknownFan { fan_id: u32, fan_count: u32 },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
