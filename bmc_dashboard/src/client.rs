use crate::config::ClientConfig;
use crate::dashboard::Dashboard;
use crate::error::ClientError;
use crate::link::{Banner, ConnectionState, Link};
use crate::ws_actor::{self, Actor, UiCommand};
use bmc_protocol::{ClientCommand, DUTY_CYCLE_MAX};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const COMMAND_CAP: usize = 64;

/// Everything a view needs to draw the dashboard.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub connection: ConnectionState,
    pub banner: Option<Banner>,
    /// Position of the user switch.
    pub auto_refresh: bool,
    /// Whether refresh triggers are currently armed.
    pub refreshing: bool,
    pub dashboard: Dashboard,
}

impl Snapshot {
    pub(crate) fn capture(link: &Link, dashboard: &Dashboard) -> Self {
        Self {
            connection: link.state(),
            banner: link.banner(),
            auto_refresh: link.auto_refresh(),
            refreshing: link.is_refreshing(),
            dashboard: dashboard.clone(),
        }
    }
}

/// Handle to the telemetry sync actor. One per dashboard session.
///
/// Sends are fire-and-forget: the actor drops them unless the channel is open.
/// Errors only report invalid arguments or an actor that is gone.
pub struct SyncClient {
    tx: mpsc::Sender<UiCommand>,
    snapshot: watch::Receiver<Snapshot>,
    fan_count: u32,
    task: JoinHandle<()>,
}

impl SyncClient {
    /// Validates `config` and starts connecting. Must be called inside a tokio runtime.
    pub fn spawn(config: ClientConfig) -> Result<Self, ClientError> {
        let url = config.validate()?;

        let mut link = Link::new(config.auto_refresh, config.refresh);
        link.on_connecting();
        let dashboard = Dashboard::new(config.fan_count);

        let (status_tx, status_rx) = watch::channel(Snapshot::capture(&link, &dashboard));
        let (tx, rx) = mpsc::channel(COMMAND_CAP);

        let actor = Actor::new(&config, url, link, dashboard, rx, status_tx);
        let task = tokio::spawn(ws_actor::run(actor));

        Ok(Self {
            tx,
            snapshot: status_rx,
            fan_count: config.fan_count,
            task,
        })
    }

    pub fn fan_count(&self) -> u32 {
        self.fan_count
    }

    pub async fn connect(&self) -> Result<(), ClientError> {
        self.dispatch(UiCommand::Connect).await
    }

    /// Closes the channel and keeps it closed until [`SyncClient::connect`].
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.dispatch(UiCommand::Disconnect).await
    }

    pub async fn set_auto_refresh(&self, enabled: bool) -> Result<(), ClientError> {
        self.dispatch(UiCommand::SetAutoRefresh(enabled)).await
    }

    pub async fn send(&self, cmd: ClientCommand) -> Result<(), ClientError> {
        self.dispatch(UiCommand::Send(cmd)).await
    }

    pub async fn request_bmc_info(&self) -> Result<(), ClientError> {
        self.send(ClientCommand::GetBmcInfo).await
    }

    pub async fn request_bmc_stats(&self) -> Result<(), ClientError> {
        self.send(ClientCommand::GetBmcStats).await
    }

    pub async fn request_system_state(&self) -> Result<(), ClientError> {
        self.send(ClientCommand::GetSystemState).await
    }

    pub async fn set_power_state(&self, on: bool) -> Result<(), ClientError> {
        self.send(ClientCommand::SetPsuPowerState { on }).await
    }

    /// Requests the opposite of the last reported PSU state (off when unknown).
    pub async fn toggle_power(&self) -> Result<(), ClientError> {
        self.dispatch(UiCommand::TogglePower).await
    }

    pub async fn set_fan_duty_cycle(&self, fan_id: u32, duty_cycle: u8) -> Result<(), ClientError> {
        self.check_duty_cycle(&[fan_id], duty_cycle)?;
        self.send(ClientCommand::SetFanDutyCycle {
            fan_id,
            duty_cycle,
        })
        .await
    }

    pub async fn set_fans_duty_cycle(
        &self,
        fan_ids: Vec<u32>,
        duty_cycle: u8,
    ) -> Result<(), ClientError> {
        self.check_duty_cycle(&fan_ids, duty_cycle)?;
        self.send(ClientCommand::SetFansDutyCycle {
            fan_ids,
            duty_cycle,
        })
        .await
    }

    pub async fn set_all_fans_duty_cycle(&self, duty_cycle: u8) -> Result<(), ClientError> {
        self.set_fans_duty_cycle((0..self.fan_count).collect(), duty_cycle)
            .await
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Stops the actor, waits for it and returns the final snapshot.
    pub async fn dispose(self) -> Snapshot {
        let Self { tx, snapshot, task, .. } = self;
        drop(tx);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "sync actor ended abnormally");
        }
        let last = snapshot.borrow();
        last.clone()
    }

    fn check_duty_cycle(&self, fan_ids: &[u32], duty_cycle: u8) -> Result<(), ClientError> {
        if duty_cycle > DUTY_CYCLE_MAX {
            return Err(ClientError::InvalidDutyCycle(duty_cycle));
        }
        if let Some(&fan_id) = fan_ids.iter().find(|&&id| id >= self.fan_count) {
            return Err(ClientError::UnknownFan {
                fan_id,
                fan_count: self.fan_count,
            });
        }
        Ok(())
    }

    async fn dispatch(&self, cmd: UiCommand) -> Result<(), ClientError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| ClientError::ActorUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use std::time::Duration;

    fn offline_config() -> ClientConfig {
        // Nothing listens on port 9 locally; the actor keeps retrying in the background.
        let mut config = ClientConfig::with_url("ws://127.0.0.1:9/api/v1/ws");
        config.connect_timeout = Duration::from_millis(200);
        config.fan_count = 2;
        config
    }

    #[tokio::test]
    async fn rejects_bad_arguments_locally() {
        let client = SyncClient::spawn(offline_config()).unwrap();

        assert!(matches!(
            client.set_fan_duty_cycle(0, 101).await,
            Err(ClientError::InvalidDutyCycle(101))
        ));
        assert!(matches!(
            client.set_fans_duty_cycle(vec![0, 2], 50).await,
            Err(ClientError::UnknownFan { fan_id: 2, fan_count: 2 })
        ));
        // Valid but undeliverable commands are accepted and dropped.
        client.set_fan_duty_cycle(1, 30).await.unwrap();
        client.toggle_power().await.unwrap();

        let last = client.dispose().await;
        assert_eq!(last.connection, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn invalid_config_is_reported() {
        let err = SyncClient::spawn(ClientConfig::with_url("not a url")).err().unwrap();
        assert!(matches!(err, ClientError::Config(ConfigError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn starts_in_connecting_state() {
        let client = SyncClient::spawn(offline_config()).unwrap();
        let snap = client.snapshot();
        assert_eq!(snap.connection, ConnectionState::Connecting);
        assert_eq!(snap.dashboard.fans.len(), 2);
        assert!(snap.auto_refresh);
        client.dispose().await;
    }
}
