//! Telemetry sync client for the BMC dashboard: one websocket channel, periodic
//! refresh, reconnect, and the derived view state.

pub mod client;
pub mod config;
pub mod console;
pub mod dashboard;
pub mod error;
pub mod link;
pub mod render;
pub mod schedule;
mod ws_actor;

pub use client::{Snapshot, SyncClient};
pub use config::{ClientConfig, ReconnectPolicy};
pub use dashboard::{format_uptime, Dashboard, RpmZone};
pub use error::{ClientError, ConfigError};
pub use link::{Banner, ConnectionState, Link};
pub use schedule::{RefreshSchedule, RefreshTiming};
