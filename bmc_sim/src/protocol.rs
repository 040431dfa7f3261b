use std::net::SocketAddr;

pub const INBOUND_CAP: usize = 256;
pub const OUTBOUND_CAP: usize = 256;

pub enum InboundMsg {
    ClientConnected { socket_addr: SocketAddr },
    ClientDisconnected,
    Command { cmd: ClientCommand },
}

pub enum OutboundMsg {
    Send { msg: ServerMessage },
}

pub use bmc_protocol::{
    BmcInfo, BmcStats, ClientCommand, FanReading, PsuReading, ServerMessage, SystemInfo,
    SystemState, SystemStats, TempReading, ThrottleFlags, DUTY_CYCLE_MAX,
};
