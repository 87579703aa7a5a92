use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ports::{ProbeError, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetMode {
    High,
    Low,
}

impl TargetMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Low => "LOW",
        }
    }

    pub fn from_high_flag(high: bool) -> Self {
        if high {
            Self::High
        } else {
            Self::Low
        }
    }

    pub fn is_high(self) -> bool {
        self == Self::High
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::High => Self::Low,
            Self::Low => Self::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThermostatState {
    Disabled,
    Heating,
    Satisfied,
    SensorFault,
}

impl ThermostatState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::Heating => "HEATING",
            Self::Satisfied => "SATISFIED",
            Self::SensorFault => "SENSOR_FAULT",
        }
    }
}

/// Latest temperature known to the acquisition loop, in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemperatureReading {
    Valid(f32),
    Invalid,
}

impl TemperatureReading {
    pub fn value(self) -> Option<f32> {
        match self {
            Self::Valid(value) => Some(value),
            Self::Invalid => None,
        }
    }

    pub fn is_valid(self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorPhase {
    Idle,
    AwaitingConversion,
}

impl SensorPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::AwaitingConversion => "AWAITING_CONVERSION",
        }
    }
}

/// Button gestures understood by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    ShortPress,
    LongPress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
}

/// Things that happened during a tick, in the order they happened.
///
/// The control core never logs; front-ends drain these and hand them to
/// whatever logger the target uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    ConversionRequested,
    ConversionRequestFailed(ProbeError),
    ReadingCompleted(f32),
    ReadingInvalid(ProbeError),
    HeatOn,
    HeatOff,
    EnabledChanged(bool),
    ModeChanged(TargetMode),
    PersistFailed { address: u16, error: StoreError },
}

impl ControlEvent {
    pub fn severity(&self) -> Severity {
        match self {
            Self::ConversionRequested => Severity::Debug,
            Self::ReadingCompleted(_)
            | Self::HeatOn
            | Self::HeatOff
            | Self::EnabledChanged(_)
            | Self::ModeChanged(_) => Severity::Info,
            Self::ConversionRequestFailed(_)
            | Self::ReadingInvalid(_)
            | Self::PersistFailed { .. } => Severity::Warn,
        }
    }
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConversionRequested => f.write_str("temperature conversion requested"),
            Self::ConversionRequestFailed(err) => {
                write!(f, "temperature request failed: {err}; is the sensor disconnected?")
            }
            Self::ReadingCompleted(value) => write!(f, "temperature is {value:.2}"),
            Self::ReadingInvalid(err) => write!(f, "temperature is unavailable: {err}"),
            Self::HeatOn => f.write_str("heating is ON"),
            Self::HeatOff => f.write_str("heating is OFF"),
            Self::EnabledChanged(true) => f.write_str("thermostat is ENABLED"),
            Self::EnabledChanged(false) => f.write_str("thermostat is DISABLED"),
            Self::ModeChanged(mode) => write!(f, "temperature mode is {}", mode.as_str()),
            Self::PersistFailed { address, error } => {
                write!(f, "failed to persist settings byte {address}: {error}")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThermostatStatus {
    #[serde(rename = "currentTemp")]
    pub current_temp: Option<f32>,
    #[serde(rename = "sensorValid")]
    pub sensor_valid: bool,
    #[serde(rename = "sensorPhase")]
    pub sensor_phase: &'static str,
    #[serde(rename = "lastRequestAgeMs")]
    pub last_request_age_ms: Option<u32>,
    pub enabled: bool,
    pub mode: &'static str,
    #[serde(rename = "targetTemp")]
    pub target_temp: f32,
    pub hysteresis: f32,
    #[serde(rename = "relayOn")]
    pub relay_on: bool,
    pub state: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_toggles_between_set_points() {
        assert_eq!(TargetMode::High.toggled(), TargetMode::Low);
        assert_eq!(TargetMode::Low.toggled(), TargetMode::High);
        assert_eq!(TargetMode::from_high_flag(true), TargetMode::High);
        assert!(!TargetMode::from_high_flag(false).is_high());
    }

    #[test]
    fn faults_are_reported_as_warnings() {
        assert_eq!(
            ControlEvent::ReadingInvalid(ProbeError::Disconnected).severity(),
            Severity::Warn
        );
        assert_eq!(
            ControlEvent::PersistFailed {
                address: 2,
                error: StoreError::WriteRejected,
            }
            .severity(),
            Severity::Warn
        );
        assert_eq!(ControlEvent::HeatOn.severity(), Severity::Info);
        assert_eq!(ControlEvent::ConversionRequested.severity(), Severity::Debug);
    }

    #[test]
    fn event_messages_name_the_new_state() {
        assert_eq!(ControlEvent::EnabledChanged(false).to_string(), "thermostat is DISABLED");
        assert_eq!(
            ControlEvent::ModeChanged(TargetMode::Low).to_string(),
            "temperature mode is LOW"
        );
    }
}
