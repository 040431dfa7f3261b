use bmc_protocol::{decode_server_frame, ClientCommand, Inbound, ServerMessage, SystemState};
use bmc_sim::{MainLoop, NetworkThread, SimulatedBmc};
use crossbeam_channel::bounded;
use std::net::TcpStream;
use std::time::{Duration, Instant};
use tungstenite::Message;

type Client = tungstenite::WebSocket<TcpStream>;

struct Harness {
    net: NetworkThread,
    api: SimulatedBmc,
    main_loop: MainLoop,
}

impl Harness {
    fn start(fan_count: u32) -> Self {
        let (in_tx, in_rx) = bounded(bmc_sim::INBOUND_CAP);
        let (out_tx, out_rx) = bounded(bmc_sim::OUTBOUND_CAP);
        let net = NetworkThread::spawn_with_addr("127.0.0.1:0", in_tx, out_rx).expect("spawn net");
        Self {
            net,
            api: SimulatedBmc::new(fan_count).with_throttled(0x40001),
            main_loop: MainLoop::new(in_rx, out_tx),
        }
    }

    fn connect(&self) -> Client {
        let addr = self.net.listen_addr();
        let stream = TcpStream::connect(addr).expect("tcp connect");
        let _ = stream.set_read_timeout(Some(Duration::from_millis(50)));
        let _ = stream.set_write_timeout(Some(Duration::from_millis(200)));
        let (ws, _) =
            tungstenite::client(format!("ws://{addr}/api/v1/ws"), stream).expect("ws connect");
        ws
    }

    fn request(&mut self, ws: &mut Client, cmd: &ClientCommand) -> ServerMessage {
        send(ws, cmd);
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            self.main_loop.tick(&self.api);
            match ws.read() {
                Ok(Message::Text(s)) => match decode_server_frame(&s).expect("valid server json") {
                    Inbound::Message(msg) => return msg,
                    other => panic!("unexpected frame: {other:?}"),
                },
                Ok(_) => {}
                Err(tungstenite::Error::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => panic!("ws read failed: {e:?}"),
            }
            if Instant::now() >= deadline {
                panic!("timeout waiting for {}", cmd.name());
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn system_state(&mut self, ws: &mut Client) -> SystemState {
        match self.request(ws, &ClientCommand::GetSystemState) {
            ServerMessage::GetSystemState(state) => state,
            other => panic!("expected system state, got: {other:?}"),
        }
    }

    // Setters have no response; ticking until the server has seen them keeps ordering simple.
    fn command(&mut self, ws: &mut Client, cmd: &ClientCommand) {
        send(ws, cmd);
        for _ in 0..10 {
            self.main_loop.tick(&self.api);
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

fn send(ws: &mut Client, cmd: &ClientCommand) {
    ws.send(Message::Text(serde_json::to_string(cmd).unwrap()))
        .unwrap();
}

#[test]
fn ws_queries_setters_and_bad_frames() {
    let mut h = Harness::start(3);
    let mut ws = h.connect();

    match h.request(&mut ws, &ClientCommand::GetBmcInfo) {
        ServerMessage::GetBmcInfo(info) => assert_eq!(info.system_info.total_mem, 4096),
        other => panic!("expected bmc info, got: {other:?}"),
    }

    match h.request(&mut ws, &ClientCommand::GetBmcStats) {
        ServerMessage::GetBmcStats(stats) => {
            assert_eq!(stats.system_stats.throttled.0, 0x40001);
            assert!(stats.system_stats.uptime > 0.0);
        }
        other => panic!("expected bmc stats, got: {other:?}"),
    }

    let state = h.system_state(&mut ws);
    assert_eq!(state.case_fans.len(), 3);
    assert!(!state.psu.power_state);

    h.command(
        &mut ws,
        &ClientCommand::SetFanDutyCycle {
            fan_id: 1,
            duty_cycle: 40,
        },
    );
    h.command(&mut ws, &ClientCommand::SetPsuPowerState { on: true });

    let state = h.system_state(&mut ws);
    assert_eq!(state.case_fans[1].duty_cycle, 40);
    assert_eq!(state.case_fans[0].duty_cycle, 100);
    assert!(state.psu.power_state);

    // Out-of-range duty cycle and garbage frames are dropped without closing the socket.
    h.command(
        &mut ws,
        &ClientCommand::SetFanDutyCycle {
            fan_id: 1,
            duty_cycle: 150,
        },
    );
    ws.send(Message::Text("{\"command\":\"selfDestruct\"}".to_string()))
        .unwrap();

    let state = h.system_state(&mut ws);
    assert_eq!(state.case_fans[1].duty_cycle, 40);

    h.net.shutdown();
}

#[test]
fn newest_connection_replaces_the_previous_one() {
    let mut h = Harness::start(2);
    let mut first = h.connect();
    let _ = h.system_state(&mut first);
    let first_peer = h.main_loop.client();

    let mut second = h.connect();
    let state = h.system_state(&mut second);
    assert_eq!(state.case_fans.len(), 2);
    assert_ne!(h.main_loop.client(), first_peer);

    h.net.shutdown();
}
