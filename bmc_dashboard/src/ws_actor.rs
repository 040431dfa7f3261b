use crate::client::Snapshot;
use crate::config::{ClientConfig, ReconnectPolicy};
use crate::dashboard::Dashboard;
use crate::link::Link;
use bmc_protocol::{decode_server_frame, ClientCommand, Inbound};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub(crate) enum UiCommand {
    Connect,
    Disconnect,
    SetAutoRefresh(bool),
    Send(ClientCommand),
    /// Resolved against the last reported PSU state at send time.
    TogglePower,
}

enum ConnExit {
    Lost,
    UserDisconnect,
    HandleDropped,
}

pub(crate) struct Actor {
    url: Url,
    connect_timeout: Duration,
    link: Link,
    dashboard: Dashboard,
    backoff: Backoff,
    rx: mpsc::Receiver<UiCommand>,
    status: watch::Sender<Snapshot>,
    desired_connected: bool,
    handle_dropped: bool,
}

impl Actor {
    pub(crate) fn new(
        config: &ClientConfig,
        url: Url,
        link: Link,
        dashboard: Dashboard,
        rx: mpsc::Receiver<UiCommand>,
        status: watch::Sender<Snapshot>,
    ) -> Self {
        Self {
            url,
            connect_timeout: config.connect_timeout,
            link,
            dashboard,
            backoff: Backoff::new(config.reconnect),
            rx,
            status,
            desired_connected: true,
            handle_dropped: false,
        }
    }
}

pub(crate) async fn run(mut actor: Actor) {
    loop {
        if actor.handle_dropped {
            break;
        }

        if !actor.desired_connected {
            actor.publish();
            match actor.rx.recv().await {
                Some(UiCommand::Connect) => actor.desired_connected = true,
                Some(cmd) => actor.handle_offline(cmd),
                None => break,
            }
            continue;
        }

        actor.link.on_connecting();
        actor.publish();
        info!(url = %actor.url, "connecting");

        let attempt = tokio::time::timeout(
            actor.connect_timeout,
            tokio_tungstenite::connect_async(actor.url.to_string()),
        );
        let socket = match actor.wait_offline(attempt).await {
            None => continue,
            Some(Ok(Ok((socket, _)))) => socket,
            Some(Ok(Err(e))) => {
                warn!(error = %e, "connect failed");
                actor.connect_failed().await;
                continue;
            }
            Some(Err(_)) => {
                warn!(timeout_ms = actor.connect_timeout.as_millis() as u64, "connect timed out");
                actor.connect_failed().await;
                continue;
            }
        };

        actor.backoff.reset();
        actor.link.on_open(Instant::now());
        actor.publish();
        info!(refreshing = actor.link.is_refreshing(), "connected");

        let (mut write, mut read) = socket.split();

        let exit = 'conn: loop {
            let deadline = actor.link.next_deadline();
            tokio::select! {
                next = actor.rx.recv() => {
                    let Some(cmd) = next else { break 'conn ConnExit::HandleDropped };
                    match cmd {
                        UiCommand::Connect => {}
                        UiCommand::Disconnect => break 'conn ConnExit::UserDisconnect,
                        UiCommand::SetAutoRefresh(enabled) => {
                            actor.link.set_auto_refresh(enabled, Instant::now());
                            actor.publish();
                        }
                        UiCommand::Send(cmd) => {
                            if send_command(&mut write, &cmd).await.is_err() {
                                break 'conn ConnExit::Lost;
                            }
                        }
                        UiCommand::TogglePower => {
                            let cmd = ClientCommand::SetPsuPowerState { on: !actor.dashboard.power_on() };
                            if send_command(&mut write, &cmd).await.is_err() {
                                break 'conn ConnExit::Lost;
                            }
                        }
                    }
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => actor.on_frame(text.as_str()),
                        Some(Ok(Message::Close(_))) | None => break 'conn ConnExit::Lost,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            // The banner comes first; a failed read leaves nothing to keep open.
                            warn!(error = %e, "websocket error");
                            actor.link.on_error();
                            actor.publish();
                            break 'conn ConnExit::Lost;
                        }
                    }
                }
                _ = sleep_until_deadline(deadline) => {
                    for cmd in actor.link.poll(Instant::now()) {
                        if send_command(&mut write, &cmd).await.is_err() {
                            break 'conn ConnExit::Lost;
                        }
                    }
                    actor.publish();
                }
            }
        };

        match exit {
            ConnExit::Lost => {
                actor.link.on_close();
                actor.publish();
                warn!("connection lost");
                actor.retry_pause().await;
            }
            ConnExit::UserDisconnect => {
                let _ = write.close().await;
                actor.desired_connected = false;
                actor.link.on_disconnect();
                info!("disconnected by user");
            }
            ConnExit::HandleDropped => {
                let _ = write.close().await;
                break;
            }
        }
    }

    actor.link.on_disconnect();
    actor.publish();
    debug!("sync actor stopped");
}

impl Actor {
    fn publish(&self) {
        let next = Snapshot::capture(&self.link, &self.dashboard);
        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn on_frame(&mut self, text: &str) {
        match decode_server_frame(text) {
            Ok(Inbound::Message(msg)) => {
                self.dashboard.apply(&msg);
                self.publish();
            }
            Ok(Inbound::Unrecognized { request }) => {
                debug!(%request, "dropping response with unrecognized tag");
            }
            Err(e) => debug!(error = %e, "dropping malformed frame"),
        }
    }

    // Commands that arrive while there is no open channel.
    fn handle_offline(&mut self, cmd: UiCommand) {
        match cmd {
            UiCommand::Connect | UiCommand::Disconnect => {}
            UiCommand::SetAutoRefresh(enabled) => {
                self.link.set_auto_refresh(enabled, Instant::now());
                self.publish();
            }
            UiCommand::Send(cmd) => {
                debug!(command = cmd.name(), "not connected, dropping command");
            }
            UiCommand::TogglePower => debug!("not connected, dropping power toggle"),
        }
    }

    /// Drives `fut` while still serving commands. `None` means the wait was
    /// abandoned because the user disconnected or the handle went away.
    async fn wait_offline<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return Some(out),
                next = self.rx.recv() => match next {
                    None => {
                        self.handle_dropped = true;
                        return None;
                    }
                    Some(UiCommand::Disconnect) => {
                        self.desired_connected = false;
                        self.link.on_disconnect();
                        info!("disconnected by user");
                        return None;
                    }
                    Some(cmd) => self.handle_offline(cmd),
                },
            }
        }
    }

    async fn connect_failed(&mut self) {
        self.link.on_error();
        self.link.on_close();
        self.publish();
        self.retry_pause().await;
    }

    async fn retry_pause(&mut self) {
        let delay = self.backoff.next_delay();
        if delay.is_zero() {
            tokio::task::yield_now().await;
            return;
        }
        debug!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");
        let _ = self.wait_offline(tokio::time::sleep(delay)).await;
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn send_command(write: &mut WsWrite, cmd: &ClientCommand) -> Result<(), ()> {
    let payload = serde_json::to_string(cmd).map_err(|_| ())?;
    write
        .send(Message::Text(payload.into()))
        .await
        .map_err(|e| warn!(command = cmd.name(), error = %e, "send failed"))
}

// Milliseconds; the last entry repeats.
const BACKOFF_MS: [u64; 7] = [0, 250, 500, 1_000, 2_000, 4_000, 5_000];

#[derive(Debug)]
pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    idx: usize,
}

impl Backoff {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, idx: 0 }
    }

    pub(crate) fn reset(&mut self) {
        self.idx = 0;
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        if self.policy == ReconnectPolicy::Immediate {
            return Duration::ZERO;
        }
        let ms = BACKOFF_MS
            .get(self.idx)
            .copied()
            .unwrap_or(BACKOFF_MS[BACKOFF_MS.len() - 1]);
        self.idx = (self.idx + 1).min(BACKOFF_MS.len());
        Duration::from_millis(ms)
    }
}
