//! Derived UI state, recomputed section by section from the latest response of each kind.

use bmc_protocol::{
    FanReading, ServerMessage, SystemInfo, SystemState, SystemStats, ThrottleCondition,
    ThrottleStatus,
};
use serde::Serialize;
use std::time::Duration;

/// Full scale of the fan gauges.
pub const GAUGE_MAX_RPM: f64 = 3000.0;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RpmZone {
    Stalled,
    Low,
    Normal,
    High,
    Critical,
}

impl RpmZone {
    /// Gauge bands: red below 200, yellow to 500, green to 2100, yellow to 2800, red above.
    pub fn of(rpm: f64) -> Self {
        match rpm {
            r if r < 200.0 => RpmZone::Stalled,
            r if r < 500.0 => RpmZone::Low,
            r if r < 2100.0 => RpmZone::Normal,
            r if r < 2800.0 => RpmZone::High,
            _ => RpmZone::Critical,
        }
    }
}

/// A temperature shown in both units, rounded to one decimal.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Temperature {
    pub celsius: f64,
    pub fahrenheit: f64,
}

impl Temperature {
    pub fn from_celsius(celsius: f64) -> Self {
        Self {
            celsius: round1(celsius),
            fahrenheit: round1(32.0 + celsius * 9.0 / 5.0),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct InfoView {
    pub model: String,
    pub total_mem_mb: u32,
    pub cpu_mem_mb: Option<u32>,
    pub gpu_mem_mb: Option<u32>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StatsView {
    pub cpu_temp: Temperature,
    pub throttling: Vec<(ThrottleCondition, ThrottleStatus)>,
    pub uptime: String,
    pub volts: Option<f64>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct FanView {
    pub rpm: f64,
    pub duty_cycle: u8,
    pub zone: RpmZone,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ClimateView {
    pub temperature: Temperature,
    pub humidity: f64,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerView {
    pub on: bool,
    pub ok: bool,
}

impl PowerView {
    pub fn state_label(self) -> &'static str {
        if self.on {
            "On"
        } else {
            "Off"
        }
    }

    pub fn ok_label(self) -> &'static str {
        match (self.on, self.ok) {
            (true, true) => "Yes",
            (true, false) => "No",
            (false, _) => "Off",
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub info: Option<InfoView>,
    pub stats: Option<StatsView>,
    /// One slot per configured fan; `None` until a response covers it.
    pub fans: Vec<Option<FanView>>,
    pub climate: Option<ClimateView>,
    pub power: Option<PowerView>,
}

impl Dashboard {
    pub fn new(fan_count: u32) -> Self {
        Self {
            info: None,
            stats: None,
            fans: vec![None; fan_count as usize],
            climate: None,
            power: None,
        }
    }

    pub fn apply(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::GetBmcInfo(info) => self.info = Some(info_view(&info.system_info)),
            ServerMessage::GetBmcStats(stats) => {
                self.stats = Some(stats_view(&stats.system_stats))
            }
            ServerMessage::GetSystemState(state) => self.apply_state(state),
        }
    }

    /// Last reported PSU state; unknown counts as off.
    pub fn power_on(&self) -> bool {
        self.power.is_some_and(|p| p.on)
    }

    fn apply_state(&mut self, state: &SystemState) {
        // Readings beyond the configured slots have nowhere to go.
        for (slot, reading) in self.fans.iter_mut().zip(&state.case_fans) {
            *slot = Some(fan_view(reading));
        }
        self.climate = Some(ClimateView {
            temperature: Temperature::from_celsius(state.temp_sensor.temperature_c),
            humidity: round1(state.temp_sensor.humidity),
        });
        self.power = Some(PowerView {
            on: state.psu.power_state,
            ok: state.psu.power_ok,
        });
    }
}

fn info_view(info: &SystemInfo) -> InfoView {
    InfoView {
        model: info.model.clone(),
        total_mem_mb: info.total_mem,
        cpu_mem_mb: info.cpu_mem,
        gpu_mem_mb: info.gpu_mem,
    }
}

fn stats_view(stats: &SystemStats) -> StatsView {
    let uptime = Duration::try_from_secs_f64(stats.uptime).unwrap_or_default();
    StatsView {
        cpu_temp: Temperature::from_celsius(stats.cpu_temp),
        throttling: ThrottleCondition::ALL
            .iter()
            .map(|&c| (c, stats.throttled.status(c)))
            .collect(),
        uptime: format_uptime(uptime),
        volts: stats.volts,
    }
}

fn fan_view(reading: &FanReading) -> FanView {
    FanView {
        rpm: reading.rpm,
        duty_cycle: reading.duty_cycle,
        zone: RpmZone::of(reading.rpm),
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// "2 days, 1 hour, 5 seconds". Sub-second remainders are dropped and zero renders empty.
pub fn format_uptime(uptime: Duration) -> String {
    const UNITS: [(u64, &str); 4] = [(86_400, "day"), (3_600, "hour"), (60, "minute"), (1, "second")];

    let mut secs = uptime.as_secs();
    let mut parts = Vec::new();
    for (size, noun) in UNITS {
        let n = secs / size;
        secs %= size;
        match n {
            0 => {}
            1 => parts.push(format!("1 {noun}")),
            n => parts.push(format!("{n} {noun}s")),
        }
    }
    parts.join(", ")
}
