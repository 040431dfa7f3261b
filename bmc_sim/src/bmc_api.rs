use crate::protocol::{FanReading, PsuReading, SystemInfo, SystemStats, TempReading};

/// Hardware surface the main loop talks to. Implementations use interior
/// mutability so one instance can be shared with the tick driver.
pub trait BmcApi {
    fn system_info(&self) -> SystemInfo;
    fn system_stats(&self) -> SystemStats;

    /// Samples sensors; called before a system state snapshot is taken.
    fn update_state(&self);

    fn fan_count(&self) -> u32;
    fn fan(&self, id: u32) -> Option<FanReading>;
    fn temp_sensor(&self) -> TempReading;
    fn psu(&self) -> PsuReading;

    fn set_fan_duty_cycle(&self, id: u32, duty_cycle: u8) -> Result<(), String>;
    fn set_power_state(&self, on: bool) -> Result<(), String>;
}
