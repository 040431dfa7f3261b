use crate::bmc_api::BmcApi;
use crate::protocol::{
    BmcInfo, BmcStats, ClientCommand, InboundMsg, OutboundMsg, ServerMessage, SystemState,
    DUTY_CYCLE_MAX,
};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::net::SocketAddr;
use tracing::{info, warn};

pub struct MainLoop {
    inbound_rx: Receiver<InboundMsg>,
    outbound_tx: Sender<OutboundMsg>,
    client: Option<SocketAddr>,
}

impl MainLoop {
    pub fn new(inbound_rx: Receiver<InboundMsg>, outbound_tx: Sender<OutboundMsg>) -> Self {
        Self {
            inbound_rx,
            outbound_tx,
            client: None,
        }
    }

    pub fn client(&self) -> Option<SocketAddr> {
        self.client
    }

    pub fn tick(&mut self, api: &dyn BmcApi) {
        loop {
            match self.inbound_rx.try_recv() {
                Ok(msg) => match msg {
                    InboundMsg::ClientConnected { socket_addr } => {
                        self.client = Some(socket_addr);
                    }
                    InboundMsg::ClientDisconnected => {
                        self.client = None;
                    }
                    InboundMsg::Command { cmd } => self.handle_command(api, cmd),
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn handle_command(&mut self, api: &dyn BmcApi, cmd: ClientCommand) {
        match cmd {
            ClientCommand::GetBmcInfo => self.send(ServerMessage::GetBmcInfo(BmcInfo {
                system_info: api.system_info(),
            })),
            ClientCommand::GetBmcStats => self.send(ServerMessage::GetBmcStats(BmcStats {
                system_stats: api.system_stats(),
            })),
            ClientCommand::GetSystemState => {
                api.update_state();
                self.send(ServerMessage::GetSystemState(system_state(api)));
            }
            ClientCommand::SetPsuPowerState { on } => match api.set_power_state(on) {
                Ok(()) => info!(on, "psu power state set"),
                Err(e) => warn!("set power state failed: {e}"),
            },
            ClientCommand::SetFanDutyCycle {
                fan_id,
                duty_cycle,
            } => apply_duty_cycle(api, &[fan_id], duty_cycle),
            ClientCommand::SetFansDutyCycle {
                fan_ids,
                duty_cycle,
            } => apply_duty_cycle(api, &fan_ids, duty_cycle),
        }
    }

    fn send(&mut self, msg: ServerMessage) {
        // Non-blocking best-effort; a dropped response is re-requested by the next poll.
        let _ = self.outbound_tx.try_send(OutboundMsg::Send { msg });
    }
}

pub fn system_state(api: &dyn BmcApi) -> SystemState {
    SystemState {
        case_fans: (0..api.fan_count()).filter_map(|id| api.fan(id)).collect(),
        temp_sensor: api.temp_sensor(),
        psu: api.psu(),
    }
}

fn apply_duty_cycle(api: &dyn BmcApi, fan_ids: &[u32], duty_cycle: u8) {
    if let Err(msg) = validate_duty_cycle(api, fan_ids, duty_cycle) {
        warn!("rejecting duty cycle change: {msg}");
        return;
    }
    for &id in fan_ids {
        match api.set_fan_duty_cycle(id, duty_cycle) {
            Ok(()) => info!(fan = id, duty_cycle, "fan duty cycle set"),
            Err(e) => {
                warn!(fan = id, "set duty cycle failed: {e}");
                return;
            }
        }
    }
}

// All-or-nothing: one bad id rejects the whole batch.
fn validate_duty_cycle(api: &dyn BmcApi, fan_ids: &[u32], duty_cycle: u8) -> Result<(), String> {
    if duty_cycle > DUTY_CYCLE_MAX {
        return Err(format!("invalid duty cycle: {duty_cycle}"));
    }
    let fan_count = api.fan_count();
    if let Some(id) = fan_ids.iter().find(|&&id| id >= fan_count) {
        return Err(format!("fan not found: {id}"));
    }
    Ok(())
}
