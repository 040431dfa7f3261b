use crate::protocol::{ClientCommand, InboundMsg, OutboundMsg, ServerMessage};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message;

pub const WS_ADDR: &str = "127.0.0.1:8000";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);
const READ_TIMEOUT: Duration = Duration::from_millis(30);
const WRITE_TIMEOUT: Duration = Duration::from_millis(200);

struct ActiveClient {
    ws: tungstenite::WebSocket<TcpStream>,
    socket_addr: SocketAddr,
}

pub struct NetworkThread {
    listen_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkThread {
    pub fn spawn(in_tx: Sender<InboundMsg>, out_rx: Receiver<OutboundMsg>) -> Result<Self, String> {
        Self::spawn_with_addr(WS_ADDR, in_tx, out_rx)
    }

    pub fn spawn_with_addr(
        addr: &str,
        in_tx: Sender<InboundMsg>,
        out_rx: Receiver<OutboundMsg>,
    ) -> Result<Self, String> {
        let listener =
            TcpListener::bind(addr).map_err(|e| format!("ws bind failed on {addr}: {e}"))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| format!("ws listener setup failed: {e}"))?;
        let listen_addr = listener
            .local_addr()
            .map_err(|e| format!("ws listener has no local addr: {e}"))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);

        let join_handle =
            thread::spawn(move || run_server(listener, in_tx, out_rx, shutdown_for_thread));

        Ok(Self {
            listen_addr,
            shutdown,
            join_handle: Mutex::new(Some(join_handle)),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut h) = self.join_handle.lock() {
            if let Some(h) = h.take() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for NetworkThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_server(
    listener: TcpListener,
    in_tx: Sender<InboundMsg>,
    out_rx: Receiver<OutboundMsg>,
    shutdown: Arc<AtomicBool>,
) {
    let mut active: Option<ActiveClient> = None;

    while !shutdown.load(Ordering::Relaxed) {
        // Single-client policy: the newest dashboard replaces the previous one.
        loop {
            match listener.accept() {
                Ok((stream, socket_addr)) => {
                    let Some(ws) = accept_client(stream) else { continue };

                    if let Some(mut prev) = active.take() {
                        info!(peer = %prev.socket_addr, "replacing dashboard connection");
                        let _ = prev.ws.close(None);
                        let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                    }

                    if in_tx
                        .try_send(InboundMsg::ClientConnected { socket_addr })
                        .is_err()
                    {
                        warn!(peer = %socket_addr, "main loop busy, refusing connection");
                        let mut ws = ws;
                        let _ = ws.close(None);
                        continue;
                    }

                    info!(peer = %socket_addr, "dashboard connected");
                    active = Some(ActiveClient { ws, socket_addr });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("ws accept failed: {e}");
                    break;
                }
            }
        }

        // Outbound: drain queued responses.
        if let Some(client) = active.as_mut() {
            loop {
                match out_rx.try_recv() {
                    Ok(OutboundMsg::Send { msg }) => {
                        if send_server_message(&mut client.ws, &msg).is_err() {
                            let _ = client.ws.close(None);
                            drop_client(&mut active, &in_tx);
                            break;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return,
                }
            }
        } else {
            // Responses for a client that already left go nowhere.
            while out_rx.try_recv().is_ok() {}
        }

        // Inbound: read at most one frame per loop (timeouts keep the loop moving).
        if let Some(client) = active.as_mut() {
            match client.ws.read() {
                Ok(msg) => {
                    if handle_inbound(&in_tx, client, msg).is_err() {
                        let _ = client.ws.close(None);
                        drop_client(&mut active, &in_tx);
                    }
                }
                Err(tungstenite::Error::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(tungstenite::Error::ConnectionClosed) => drop_client(&mut active, &in_tx),
                Err(e) => {
                    debug!("ws read failed: {e}");
                    drop_client(&mut active, &in_tx);
                }
            }
        } else {
            // If no active client, avoid busy-looping.
            thread::sleep(Duration::from_millis(25));
        }
    }

    if let Some(mut client) = active {
        let _ = client.ws.close(None);
    }
}

fn accept_client(stream: TcpStream) -> Option<tungstenite::WebSocket<TcpStream>> {
    // Accepted sockets may inherit the listener's non-blocking flag.
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_nodelay(true);
    let _ = stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT));
    let _ = stream.set_write_timeout(Some(WRITE_TIMEOUT));

    let ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            warn!("ws handshake failed: {e}");
            return None;
        }
    };
    let _ = ws.get_ref().set_read_timeout(Some(READ_TIMEOUT));
    Some(ws)
}

fn drop_client(active: &mut Option<ActiveClient>, in_tx: &Sender<InboundMsg>) {
    if let Some(client) = active.take() {
        info!(peer = %client.socket_addr, "dashboard disconnected");
    }
    let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
}

fn handle_inbound(
    in_tx: &Sender<InboundMsg>,
    client: &mut ActiveClient,
    msg: Message,
) -> Result<(), ()> {
    let text = match msg {
        Message::Text(s) => s,
        Message::Binary(_) => return Ok(()),
        Message::Ping(payload) => {
            let _ = client.ws.send(Message::Pong(payload));
            return Ok(());
        }
        Message::Pong(_) => return Ok(()),
        Message::Close(_) => return Err(()),
        Message::Frame(_) => return Ok(()),
    };

    // The protocol has no error response; bad frames are dropped.
    let cmd: ClientCommand = match serde_json::from_str(&text) {
        Ok(c) => c,
        Err(e) => {
            debug!(peer = %client.socket_addr, "dropping undecodable frame: {e}");
            return Ok(());
        }
    };

    if in_tx.try_send(InboundMsg::Command { cmd: cmd.clone() }).is_err() {
        // Queries are re-issued by the next refresh tick anyway.
        if !cmd.is_query() {
            warn!(command = cmd.name(), "main loop busy, dropping command");
        }
    }

    Ok(())
}

fn send_server_message(
    ws: &mut tungstenite::WebSocket<TcpStream>,
    msg: &ServerMessage,
) -> Result<(), ()> {
    let payload = serde_json::to_string(msg).map_err(|_| ())?;
    ws.send(Message::Text(payload)).map_err(|_| ())
}
