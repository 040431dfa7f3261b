use serde::{Deserialize, Serialize};

/// The firmware throttling word (`vcgencmd get_throttled` layout).
///
/// The low half reports conditions active right now, the high half latches
/// conditions that occurred at any point since boot.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ThrottleFlags(pub u32);

impl ThrottleFlags {
    pub const UNDER_VOLTAGE: u32 = 0x1;
    pub const FREQUENCY_CAPPED: u32 = 0x2;
    pub const THROTTLED: u32 = 0x4;
    pub const SOFT_TEMP_LIMITED: u32 = 0x8;
    pub const UNDER_VOLTAGE_OCCURRED: u32 = 0x1_0000;
    pub const FREQUENCY_CAP_OCCURRED: u32 = 0x2_0000;
    pub const THROTTLING_OCCURRED: u32 = 0x4_0000;
    pub const SOFT_TEMP_LIMIT_OCCURRED: u32 = 0x8_0000;

    pub fn is_active(self, condition: ThrottleCondition) -> bool {
        self.0 & condition.active_bit() != 0
    }

    pub fn has_occurred(self, condition: ThrottleCondition) -> bool {
        self.0 & condition.occurred_bit() != 0
    }

    pub fn status(self, condition: ThrottleCondition) -> ThrottleStatus {
        if self.is_active(condition) {
            ThrottleStatus::Active
        } else if self.has_occurred(condition) {
            ThrottleStatus::Occurred
        } else {
            ThrottleStatus::Clear
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleCondition {
    UnderVoltage,
    FrequencyCapped,
    Throttled,
    SoftTempLimited,
}

impl ThrottleCondition {
    pub const ALL: [ThrottleCondition; 4] = [
        ThrottleCondition::UnderVoltage,
        ThrottleCondition::FrequencyCapped,
        ThrottleCondition::Throttled,
        ThrottleCondition::SoftTempLimited,
    ];

    fn active_bit(self) -> u32 {
        match self {
            ThrottleCondition::UnderVoltage => ThrottleFlags::UNDER_VOLTAGE,
            ThrottleCondition::FrequencyCapped => ThrottleFlags::FREQUENCY_CAPPED,
            ThrottleCondition::Throttled => ThrottleFlags::THROTTLED,
            ThrottleCondition::SoftTempLimited => ThrottleFlags::SOFT_TEMP_LIMITED,
        }
    }

    fn occurred_bit(self) -> u32 {
        self.active_bit() << 16
    }

    pub fn label(self) -> &'static str {
        match self {
            ThrottleCondition::UnderVoltage => "under-voltage",
            ThrottleCondition::FrequencyCapped => "frequency capped",
            ThrottleCondition::Throttled => "throttled",
            ThrottleCondition::SoftTempLimited => "soft temp limit",
        }
    }
}

/// Tri-state indicator: `Active` wins over `Occurred`.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleStatus {
    Clear,
    Occurred,
    Active,
}
