mod throttle;

use serde::de::DeserializeOwned;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use throttle::{ThrottleCondition, ThrottleFlags, ThrottleStatus};

/// Upper bound (inclusive) for any fan duty cycle, in percent.
pub const DUTY_CYCLE_MAX: u8 = 100;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("{command}: expected {expected} argument(s), found {found}")]
    Arity {
        command: String,
        expected: usize,
        found: usize,
    },
    #[error("{command}: bad argument: {reason}")]
    BadArgument { command: String, reason: String },
}

/// Requests sent from the dashboard to the BMC.
///
/// On the wire every command is `{"command": <name>, "args"?: [...]}` with
/// positional arguments; the getters carry no `args` at all.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(into = "RawCommand", try_from = "RawCommand")]
pub enum ClientCommand {
    GetBmcInfo,
    GetBmcStats,
    GetSystemState,
    SetPsuPowerState { on: bool },
    SetFanDutyCycle { fan_id: u32, duty_cycle: u8 },
    SetFansDutyCycle { fan_ids: Vec<u32>, duty_cycle: u8 },
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::GetBmcInfo => "getBmcInfo",
            ClientCommand::GetBmcStats => "getBmcStats",
            ClientCommand::GetSystemState => "getSystemState",
            ClientCommand::SetPsuPowerState { .. } => "setPsuPowerState",
            ClientCommand::SetFanDutyCycle { .. } => "setFanDutyCycle",
            ClientCommand::SetFansDutyCycle { .. } => "setFansDutyCycle",
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(
            self,
            ClientCommand::GetBmcInfo | ClientCommand::GetBmcStats | ClientCommand::GetSystemState
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct RawCommand {
    command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    args: Vec<Value>,
}

impl From<ClientCommand> for RawCommand {
    fn from(cmd: ClientCommand) -> Self {
        let command = cmd.name().to_string();
        let args = match cmd {
            ClientCommand::GetBmcInfo | ClientCommand::GetBmcStats | ClientCommand::GetSystemState => {
                Vec::new()
            }
            ClientCommand::SetPsuPowerState { on } => vec![Value::from(on)],
            ClientCommand::SetFanDutyCycle { fan_id, duty_cycle } => {
                vec![Value::from(fan_id), Value::from(duty_cycle)]
            }
            ClientCommand::SetFansDutyCycle {
                fan_ids,
                duty_cycle,
            } => vec![Value::from(fan_ids), Value::from(duty_cycle)],
        };
        RawCommand { command, args }
    }
}

impl TryFrom<RawCommand> for ClientCommand {
    type Error = ProtocolError;

    fn try_from(raw: RawCommand) -> Result<Self, Self::Error> {
        let RawCommand { command, args } = raw;
        match command.as_str() {
            "getBmcInfo" => Ok(ClientCommand::GetBmcInfo),
            "getBmcStats" => Ok(ClientCommand::GetBmcStats),
            "getSystemState" => Ok(ClientCommand::GetSystemState),
            "setPsuPowerState" => {
                let [state] = positional(&command, args)?;
                Ok(ClientCommand::SetPsuPowerState {
                    on: power_arg(&command, &state)?,
                })
            }
            "setFanDutyCycle" => {
                let [fan_id, duty_cycle] = positional(&command, args)?;
                Ok(ClientCommand::SetFanDutyCycle {
                    fan_id: arg(&command, fan_id)?,
                    duty_cycle: arg(&command, duty_cycle)?,
                })
            }
            "setFansDutyCycle" => {
                let [fan_ids, duty_cycle] = positional(&command, args)?;
                Ok(ClientCommand::SetFansDutyCycle {
                    fan_ids: arg(&command, fan_ids)?,
                    duty_cycle: arg(&command, duty_cycle)?,
                })
            }
            _ => Err(ProtocolError::UnknownCommand(command)),
        }
    }
}

fn positional<const N: usize>(command: &str, args: Vec<Value>) -> Result<[Value; N], ProtocolError> {
    let found = args.len();
    <[Value; N]>::try_from(args).map_err(|_| ProtocolError::Arity {
        command: command.to_string(),
        expected: N,
        found,
    })
}

fn arg<T: DeserializeOwned>(command: &str, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|e| ProtocolError::BadArgument {
        command: command.to_string(),
        reason: e.to_string(),
    })
}

// Older backends accepted 1/0 and "on"/"off" next to booleans.
fn power_arg(command: &str, value: &Value) -> Result<bool, ProtocolError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
        Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
        Value::String(s) if s.eq_ignore_ascii_case("on") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("off") => Ok(false),
        other => Err(ProtocolError::BadArgument {
            command: command.to_string(),
            reason: format!("invalid power state {other}"),
        }),
    }
}

/// Responses pushed by the BMC, tagged with the request they answer.
///
/// There is no correlation id: the tag is the only link back to a request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", tag = "request", content = "response")]
pub enum ServerMessage {
    GetBmcInfo(BmcInfo),
    GetBmcStats(BmcStats),
    GetSystemState(SystemState),
}

impl ServerMessage {
    pub fn request(&self) -> &'static str {
        match self {
            ServerMessage::GetBmcInfo(_) => "getBmcInfo",
            ServerMessage::GetBmcStats(_) => "getBmcStats",
            ServerMessage::GetSystemState(_) => "getSystemState",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BmcInfo {
    pub system_info: SystemInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub model: String,
    /// Total memory in MB.
    pub total_mem: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_mem: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_mem: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BmcStats {
    pub system_stats: SystemStats,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    /// Celsius.
    pub cpu_temp: f64,
    pub throttled: ThrottleFlags,
    /// Seconds since boot.
    #[serde(deserialize_with = "loose_number")]
    pub uptime: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volts: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemState {
    #[serde(alias = "fans")]
    pub case_fans: Vec<FanReading>,
    pub temp_sensor: TempReading,
    pub psu: PsuReading,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FanReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub rpm: f64,
    pub duty_cycle: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TempReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub temperature_c: f64,
    pub humidity: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PsuReading {
    #[serde(deserialize_with = "pin_level")]
    pub power_state: bool,
    #[serde(deserialize_with = "pin_level")]
    pub power_ok: bool,
}

// GPIO-backed PSUs report raw pin levels (0/1) instead of booleans.
fn pin_level<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Level {
        Bool(bool),
        Int(i64),
    }

    Ok(match Level::deserialize(deserializer)? {
        Level::Bool(b) => b,
        Level::Int(n) => n != 0,
    })
}

// Some backends forward `/proc/uptime` text as-is.
fn loose_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Number(f64),
        Text(String),
    }

    match Loose::deserialize(deserializer)? {
        Loose::Number(n) => Ok(n),
        Loose::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("expected a number, got {s:?}"))),
    }
}

/// A decoded inbound frame. Tags this client does not know are surfaced
/// rather than treated as errors so the caller can log and move on.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(ServerMessage),
    Unrecognized { request: String },
}

#[derive(Deserialize)]
struct Envelope {
    request: String,
    #[serde(default)]
    response: Value,
}

pub fn decode_server_frame(text: &str) -> Result<Inbound, ProtocolError> {
    let Envelope { request, response } = serde_json::from_str(text)?;
    let msg = match request.as_str() {
        "getBmcInfo" => ServerMessage::GetBmcInfo(serde_json::from_value(response)?),
        "getBmcStats" => ServerMessage::GetBmcStats(serde_json::from_value(response)?),
        "getSystemState" => ServerMessage::GetSystemState(serde_json::from_value(response)?),
        _ => return Ok(Inbound::Unrecognized { request }),
    };
    Ok(Inbound::Message(msg))
}
