use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TargetMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid runtime config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("hysteresis margin must be positive, got {0}")]
    NonPositiveMargin(f32),
    #[error("low target {low} must be below high target {high}")]
    TargetsInverted { low: f32, high: f32 },
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("read delay {read_delay_ms}ms must be shorter than request interval {request_interval_ms}ms")]
    ReadDelayTooLong {
        read_delay_ms: u32,
        request_interval_ms: u32,
    },
    #[error("enabled and mode flags cannot share store address {0}")]
    SharedAddress(u16),
    #[error("long press ({long_press_ms}ms) must be longer than debounce ({debounce_ms}ms)")]
    LongPressTooShort { long_press_ms: u32, debounce_ms: u32 },
}

/// Control policy: set-points, deadband and probe timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermostatConfig {
    pub high_target_c: f32,
    pub low_target_c: f32,
    pub hysteresis_c: f32,
    /// Spacing between conversion requests. Kept long so the probe does not
    /// self-heat.
    pub request_interval_ms: u32,
    /// Worst-case conversion time of the probe.
    pub read_delay_ms: u32,
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            high_target_c: 22.0,
            low_target_c: 10.0,
            hysteresis_c: 0.5,
            request_interval_ms: 10_000,
            read_delay_ms: 750,
        }
    }
}

impl ThermostatConfig {
    pub fn target_for(&self, mode: TargetMode) -> f32 {
        match mode {
            TargetMode::High => self.high_target_c,
            TargetMode::Low => self.low_target_c,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("high_target_c", self.high_target_c),
            ("low_target_c", self.low_target_c),
            ("hysteresis_c", self.hysteresis_c),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { field });
            }
        }

        if self.hysteresis_c <= 0.0 {
            return Err(ConfigError::NonPositiveMargin(self.hysteresis_c));
        }
        if self.low_target_c >= self.high_target_c {
            return Err(ConfigError::TargetsInverted {
                low: self.low_target_c,
                high: self.high_target_c,
            });
        }
        if self.request_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "request_interval_ms",
            });
        }
        if self.read_delay_ms >= self.request_interval_ms {
            return Err(ConfigError::ReadDelayTooLong {
                read_delay_ms: self.read_delay_ms,
                request_interval_ms: self.request_interval_ms,
            });
        }
        Ok(())
    }
}

/// The two flags that survive a power cycle.
///
/// The default is what an erased or unreadable store restores to: disabled,
/// low set-point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSettings {
    pub enabled: bool,
    pub mode: TargetMode,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: TargetMode::Low,
        }
    }
}

/// Where each persisted flag lives in the byte store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreLayout {
    pub enabled_address: u16,
    pub mode_address: u16,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            enabled_address: 0,
            mode_address: 2,
        }
    }
}

impl StoreLayout {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled_address == self.mode_address {
            return Err(ConfigError::SharedAddress(self.enabled_address));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    pub relay: i32,
    pub button: i32,
    pub button_active_low: bool,
    pub led: i32,
    pub probe: i32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            relay: 26,
            button: 14,
            button_active_low: true,
            led: 2,
            probe: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    pub debounce_ms: u32,
    pub long_press_ms: u32,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            long_press_ms: 800,
        }
    }
}

impl ButtonConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.long_press_ms <= self.debounce_ms {
            return Err(ConfigError::LongPressTooShort {
                long_press_ms: self.long_press_ms,
                debounce_ms: self.debounce_ms,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Steady level while enabled; blinks run at twice this.
    pub brightness: u8,
    pub cycle_ms: u32,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            brightness: 1,
            cycle_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub thermostat: ThermostatConfig,
    pub layout: StoreLayout,
    pub pins: PinConfig,
    pub button: ButtonConfig,
    pub indicator: IndicatorConfig,
    pub tick_interval_ms: u32,
    pub status_interval_ms: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            thermostat: ThermostatConfig::default(),
            layout: StoreLayout::default(),
            pins: PinConfig::default(),
            button: ButtonConfig::default(),
            indicator: IndicatorConfig::default(),
            tick_interval_ms: 10,
            status_interval_ms: 30_000,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let runtime: Self = serde_json::from_str(json)?;
        runtime.validate()?;
        Ok(runtime)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thermostat.validate()?;
        self.layout.validate()?;
        self.button.validate()?;
        if self.indicator.cycle_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "indicator.cycle_ms",
            });
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "tick_interval_ms",
            });
        }
        Ok(())
    }
}
