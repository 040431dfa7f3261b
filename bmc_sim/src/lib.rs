mod bmc_api;
mod main_loop;
mod net;
mod protocol;
mod sim;

pub use crate::bmc_api::BmcApi;
pub use crate::main_loop::{system_state, MainLoop};
pub use crate::net::{NetworkThread, WS_ADDR};
pub use crate::protocol::{InboundMsg, OutboundMsg, INBOUND_CAP, OUTBOUND_CAP};
pub use crate::sim::{SimulatedBmc, MAX_RPM};
