//! Hardware seams of the control core.
//!
//! Every collaborator the thermostat talks to is reached through one of these
//! traits, so the same core runs against ESP-IDF drivers, the host simulation
//! and the test fakes.

use thiserror::Error;

use crate::types::{InputEvent, TargetMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("no probe found on the bus")]
    NotFound,
    #[error("probe did not accept the command")]
    Busy,
    #[error("probe disconnected")]
    Disconnected,
    #[error("probe returned corrupt data")]
    Corrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("address {0} is outside the store")]
    OutOfRange(u16),
    #[error("store rejected the write")]
    WriteRejected,
    #[error("store is unavailable")]
    Unavailable,
}

/// Monotonic millisecond counter. Allowed to wrap.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Debounced button, polled once per tick.
pub trait InputSource {
    /// Returns at most one gesture completed since the previous poll.
    fn poll_once(&mut self, now_ms: u32) -> Option<InputEvent>;
}

/// Temperature probe with a split request/read cycle.
///
/// Neither call may wait for the conversion to finish.
pub trait TemperatureProbe {
    fn begin_conversion(&mut self) -> Result<(), ProbeError>;

    fn fetch_result(&mut self) -> Result<f32, ProbeError>;
}

/// Byte-addressed persistent storage (EEPROM, NVS, a file).
pub trait ByteStore {
    fn read_byte(&mut self, address: u16) -> Result<u8, StoreError>;

    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), StoreError>;
}

pub trait RelayOutput {
    fn set_relay(&mut self, on: bool);
}

/// Visual feedback for the enabled flag and the target mode.
pub trait Indicator {
    /// The mode was restored or changed.
    fn show_mode(&mut self, mode: TargetMode, now_ms: u32);

    /// Called once at the end of every tick.
    fn refresh(&mut self, enabled: bool, now_ms: u32);
}

/// A single LED with a brightness level; 0 is off.
pub trait LedOutput {
    fn set_level(&mut self, level: u8);
}
