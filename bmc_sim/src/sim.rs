use crate::bmc_api::BmcApi;
use crate::protocol::{
    FanReading, PsuReading, SystemInfo, SystemStats, TempReading, ThrottleFlags, DUTY_CYCLE_MAX,
};
use rand::{thread_rng, Rng};
use std::sync::Mutex;
use std::time::Instant;

/// Full-duty speed of the simulated case fans.
pub const MAX_RPM: f64 = 2000.0;

// Fraction of the gap to the target speed closed per second.
const SPIN_RATE: f64 = 4.0;
const BOOT_UPTIME_SECS: f64 = 42.0;

struct SimFan {
    duty_cycle: u8,
    rpm: f64,
}

struct SimState {
    fans: Vec<SimFan>,
    power_on: bool,
    temperature_c: f64,
    humidity: f64,
    last_update: Instant,
}

/// In-memory stand-in for the GPIO-backed fans, DHT22 probe and ATX PSU.
pub struct SimulatedBmc {
    started: Instant,
    throttled: ThrottleFlags,
    state: Mutex<SimState>,
}

impl SimulatedBmc {
    pub fn new(fan_count: u32) -> Self {
        let fans = (0..fan_count)
            .map(|_| SimFan {
                duty_cycle: DUTY_CYCLE_MAX,
                rpm: 0.0,
            })
            .collect();
        Self {
            started: Instant::now(),
            throttled: ThrottleFlags::default(),
            state: Mutex::new(SimState {
                fans,
                power_on: false,
                temperature_c: 24.0,
                humidity: 45.0,
                last_update: Instant::now(),
            }),
        }
    }

    pub fn with_throttled(mut self, throttled: u32) -> Self {
        self.throttled = ThrottleFlags(throttled);
        self
    }
}

impl BmcApi for SimulatedBmc {
    fn system_info(&self) -> SystemInfo {
        SystemInfo {
            model: "Raspberry Pi 4 Model B Rev 1.4 (simulated)".to_string(),
            total_mem: 4096,
            cpu_mem: Some(3968),
            gpu_mem: Some(128),
        }
    }

    fn system_stats(&self) -> SystemStats {
        let mut rng = thread_rng();
        SystemStats {
            cpu_temp: 47.0 + rng.gen_range(-1.5..1.5),
            throttled: self.throttled,
            uptime: BOOT_UPTIME_SECS + self.started.elapsed().as_secs_f64(),
            volts: Some(0.85),
        }
    }

    fn update_state(&self) {
        let Ok(mut state) = self.state.lock() else { return };
        let now = Instant::now();
        let dt = now.duration_since(state.last_update).as_secs_f64();
        state.last_update = now;

        let mut rng = thread_rng();
        let power_on = state.power_on;
        let approach = (dt * SPIN_RATE).min(1.0);
        for fan in &mut state.fans {
            // Tach readings are meaningless without power; start from rest.
            if !power_on {
                fan.rpm = 0.0;
                continue;
            }
            let target = MAX_RPM * f64::from(fan.duty_cycle) / f64::from(DUTY_CYCLE_MAX);
            fan.rpm += (target - fan.rpm) * approach;
            if target > 0.0 {
                fan.rpm = (fan.rpm + rng.gen_range(-5.0..5.0)).max(0.0);
            }
        }

        state.temperature_c = (state.temperature_c + rng.gen_range(-0.05..0.05)).clamp(15.0, 45.0);
        state.humidity = (state.humidity + rng.gen_range(-0.1..0.1)).clamp(20.0, 80.0);
    }

    fn fan_count(&self) -> u32 {
        self.state
            .lock()
            .map(|s| s.fans.len() as u32)
            .unwrap_or(0)
    }

    fn fan(&self, id: u32) -> Option<FanReading> {
        let state = self.state.lock().ok()?;
        let fan = state.fans.get(id as usize)?;
        Some(FanReading {
            id: Some(id),
            name: Some(format!("fan{id}")),
            rpm: fan.rpm,
            duty_cycle: fan.duty_cycle,
        })
    }

    fn temp_sensor(&self) -> TempReading {
        let (temperature_c, humidity) = self
            .state
            .lock()
            .map(|s| (s.temperature_c, s.humidity))
            .unwrap_or_default();
        TempReading {
            id: Some(0),
            name: Some("temp0".to_string()),
            temperature_c,
            humidity,
        }
    }

    fn psu(&self) -> PsuReading {
        let power_on = self.state.lock().map(|s| s.power_on).unwrap_or(false);
        PsuReading {
            power_state: power_on,
            power_ok: power_on,
        }
    }

    fn set_fan_duty_cycle(&self, id: u32, duty_cycle: u8) -> Result<(), String> {
        let Ok(mut state) = self.state.lock() else {
            return Err("sim lock poisoned".to_string());
        };
        let fan = state
            .fans
            .get_mut(id as usize)
            .ok_or_else(|| format!("fan {id} not found"))?;
        fan.duty_cycle = duty_cycle.min(DUTY_CYCLE_MAX);
        Ok(())
    }

    fn set_power_state(&self, on: bool) -> Result<(), String> {
        let Ok(mut state) = self.state.lock() else {
            return Err("sim lock poisoned".to_string());
        };
        state.power_on = on;
        Ok(())
    }
}
