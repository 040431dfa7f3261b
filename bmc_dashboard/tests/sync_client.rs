use bmc_dashboard::{ClientConfig, ConnectionState, RefreshTiming, Snapshot, SyncClient};
use bmc_protocol::{
    ClientCommand, FanReading, PsuReading, ServerMessage, SystemState, TempReading,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

type Seen = mpsc::UnboundedReceiver<(usize, ClientCommand)>;

fn canned_state() -> String {
    serde_json::to_string(&ServerMessage::GetSystemState(SystemState {
        case_fans: vec![FanReading {
            id: Some(0),
            name: None,
            rpm: 1500.0,
            duty_cycle: 40,
        }],
        temp_sensor: TempReading {
            id: None,
            name: None,
            temperature_c: 22.0,
            humidity: 41.0,
        },
        psu: PsuReading {
            power_state: true,
            power_ok: true,
        },
    }))
    .unwrap()
}

/// Test backend: records every command per connection and answers `getSystemState`.
/// With `drop_first`, connection 1 opens with junk frames and is dropped right after
/// its first state reply.
async fn start_server(drop_first: bool) -> (SocketAddr, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut idx = 0;
        while let Ok((stream, _)) = listener.accept().await {
            idx += 1;
            let hang_up = drop_first && idx == 1;
            tokio::spawn(serve_conn(idx, stream, hang_up, seen_tx.clone()));
        }
    });
    (addr, seen_rx)
}

async fn serve_conn(
    idx: usize,
    stream: TcpStream,
    hang_up: bool,
    seen: mpsc::UnboundedSender<(usize, ClientCommand)>,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    if hang_up {
        let unknown = r#"{"request":"getFirmware","response":{}}"#.to_string();
        let _ = write.send(Message::Text(unknown.into())).await;
        let _ = write.send(Message::Text("not json".to_string().into())).await;
    }

    while let Some(Ok(msg)) = read.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(cmd) = serde_json::from_str::<ClientCommand>(text.as_str()) else {
            continue;
        };
        let is_state = cmd == ClientCommand::GetSystemState;
        let _ = seen.send((idx, cmd));
        if is_state {
            if write.send(Message::Text(canned_state().into())).await.is_err() {
                return;
            }
            if hang_up {
                return;
            }
        }
    }
}

fn config_for(addr: SocketAddr) -> ClientConfig {
    let mut config = ClientConfig::with_url(format!("ws://{addr}/api/v1/ws"));
    config.fan_count = 2;
    config.refresh = RefreshTiming {
        slow: Duration::from_millis(100),
        fast: Duration::from_millis(50),
        startup_delay: Duration::from_millis(50),
    };
    config
}

async fn wait_for(
    updates: &mut watch::Receiver<Snapshot>,
    what: &str,
    pred: impl FnMut(&Snapshot) -> bool,
) -> Snapshot {
    let snap = tokio::time::timeout(WAIT, updates.wait_for(pred))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .expect("sync actor alive");
    snap.clone()
}

/// Drains recorded commands until `pred` matches; returns everything drained.
async fn wait_for_command(
    seen: &mut Seen,
    what: &str,
    mut pred: impl FnMut(usize, &ClientCommand) -> bool,
) -> Vec<(usize, ClientCommand)> {
    let mut drained = Vec::new();
    loop {
        let next = tokio::time::timeout(WAIT, seen.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
            .expect("server alive");
        let hit = pred(next.0, &next.1);
        drained.push(next);
        if hit {
            return drained;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnects_resumes_refresh_and_survives_offline_commands() {
    let (addr, mut seen) = start_server(true).await;
    let client = SyncClient::spawn(config_for(addr)).unwrap();
    let mut updates = client.subscribe();

    let snap = wait_for(&mut updates, "first fan reading", |s| s.dashboard.fans[0].is_some()).await;
    let fan = snap.dashboard.fans[0].unwrap();
    assert_eq!(fan.rpm, 1500.0);
    assert_eq!(fan.duty_cycle, 40);
    assert_eq!(snap.dashboard.fans[1], None);
    assert!(snap.dashboard.power_on());

    // The first connection is dropped; the second gets a fresh startup round.
    let drained = wait_for_command(&mut seen, "refresh on the second connection", |idx, cmd| {
        idx == 2 && *cmd == ClientCommand::GetBmcInfo
    })
    .await;
    assert!(drained.contains(&(1, ClientCommand::GetBmcInfo)));

    let snap = wait_for(&mut updates, "refreshing again", |s| {
        s.connection == ConnectionState::Connected && s.refreshing
    })
    .await;
    assert_eq!(snap.banner, None);

    client.disconnect().await.unwrap();
    let snap = wait_for(&mut updates, "user disconnect", |s| {
        s.connection == ConnectionState::Disconnected
    })
    .await;
    assert!(!snap.refreshing);
    assert_eq!(snap.banner, None);

    // Dropped while offline, with no error for the caller.
    client.set_fan_duty_cycle(0, 55).await.unwrap();

    client.connect().await.unwrap();
    wait_for(&mut updates, "reconnect after connect()", |s| {
        s.connection == ConnectionState::Connected
    })
    .await;
    client.set_fan_duty_cycle(0, 60).await.unwrap();

    let sixty = ClientCommand::SetFanDutyCycle {
        fan_id: 0,
        duty_cycle: 60,
    };
    let drained = wait_for_command(&mut seen, "duty cycle after reconnect", |idx, cmd| {
        idx >= 3 && *cmd == sixty
    })
    .await;
    assert!(!drained.iter().any(|(_, cmd)| matches!(
        cmd,
        ClientCommand::SetFanDutyCycle { duty_cycle: 55, .. }
    )));

    let last = client.dispose().await;
    assert_eq!(last.connection, ConnectionState::Disconnected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_waits_for_the_switch() {
    let (addr, mut seen) = start_server(false).await;
    let mut config = config_for(addr);
    config.auto_refresh = false;
    let client = SyncClient::spawn(config).unwrap();
    let mut updates = client.subscribe();

    wait_for(&mut updates, "connected", |s| s.connection == ConnectionState::Connected).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(seen.try_recv().is_err(), "nothing is polled with the switch off");

    client.set_auto_refresh(true).await.unwrap();
    let drained = wait_for_command(&mut seen, "stats after enabling", |_, cmd| {
        *cmd == ClientCommand::GetBmcStats
    })
    .await;
    assert_eq!(drained[0].1, ClientCommand::GetBmcInfo);

    client.set_auto_refresh(false).await.unwrap();
    wait_for(&mut updates, "refresh stopped", |s| !s.refreshing).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    while seen.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(seen.try_recv().is_err(), "polling stops with the switch");

    client.dispose().await;
}
