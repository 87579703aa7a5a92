pub mod acquisition;
pub mod button;
pub mod config;
pub mod indicator;
pub mod ports;
pub mod runtime;
pub mod store;
pub mod thermostat;
pub mod time;
pub mod types;

#[cfg(test)]
mod testing;

pub use acquisition::SensorAcquisition;
pub use button::GestureDetector;
pub use config::{
    ButtonConfig, ConfigError, IndicatorConfig, PersistedSettings, PinConfig, RuntimeConfig,
    StoreLayout, ThermostatConfig,
};
pub use indicator::BlinkIndicator;
pub use ports::{
    ByteStore, Clock, Indicator, InputSource, LedOutput, ProbeError, RelayOutput, StoreError,
    TemperatureProbe,
};
pub use runtime::{Hardware, Thermostat};
pub use store::{MemoryStore, SettingsStore};
pub use thermostat::HysteresisController;
pub use time::MonotonicClock;
pub use types::{
    ControlEvent, InputEvent, SensorPhase, Severity, TargetMode, TemperatureReading,
    ThermostatState, ThermostatStatus,
};
