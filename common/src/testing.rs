//! Fakes for the hardware ports, shared by the unit tests.

use std::collections::VecDeque;

use crate::{
    ports::{
        ByteStore, Indicator, InputSource, LedOutput, ProbeError, RelayOutput, StoreError,
        TemperatureProbe,
    },
    store::MemoryStore,
    types::{InputEvent, TargetMode},
};

#[derive(Debug)]
pub struct ScriptedProbe {
    /// Consumed first; `begin_default` answers once it is empty.
    pub begin_results: VecDeque<Result<(), ProbeError>>,
    pub begin_default: Result<(), ProbeError>,
    pub fetch_result: Result<f32, ProbeError>,
    pub begin_calls: u32,
    pub fetch_calls: u32,
}

impl ScriptedProbe {
    pub fn reading(value: f32) -> Self {
        Self {
            begin_results: VecDeque::new(),
            begin_default: Ok(()),
            fetch_result: Ok(value),
            begin_calls: 0,
            fetch_calls: 0,
        }
    }

    pub fn unplugged() -> Self {
        Self {
            begin_default: Err(ProbeError::NotFound),
            fetch_result: Err(ProbeError::Disconnected),
            ..Self::reading(0.0)
        }
    }
}

impl TemperatureProbe for ScriptedProbe {
    fn begin_conversion(&mut self) -> Result<(), ProbeError> {
        self.begin_calls += 1;
        self.begin_results
            .pop_front()
            .unwrap_or(self.begin_default)
    }

    fn fetch_result(&mut self) -> Result<f32, ProbeError> {
        self.fetch_calls += 1;
        self.fetch_result
    }
}

#[derive(Debug, Default)]
pub struct RecordingRelay {
    pub writes: Vec<bool>,
}

impl RecordingRelay {
    pub fn is_on(&self) -> bool {
        self.writes.last().copied().unwrap_or(false)
    }
}

impl RelayOutput for RecordingRelay {
    fn set_relay(&mut self, on: bool) {
        self.writes.push(on);
    }
}

#[derive(Debug)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_writes: bool,
    pub writes: u32,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_writes: false,
            writes: 0,
        }
    }
}

impl ByteStore for FlakyStore {
    fn read_byte(&mut self, address: u16) -> Result<u8, StoreError> {
        self.inner.read_byte(address)
    }

    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), StoreError> {
        self.writes += 1;
        if self.fail_writes {
            return Err(StoreError::WriteRejected);
        }
        self.inner.write_byte(address, value)
    }
}

#[derive(Debug, Default)]
pub struct ScriptedInput {
    pub queue: VecDeque<InputEvent>,
}

impl InputSource for ScriptedInput {
    fn poll_once(&mut self, _now_ms: u32) -> Option<InputEvent> {
        self.queue.pop_front()
    }
}

#[derive(Debug, Default)]
pub struct RecordingIndicator {
    pub shown: Vec<(TargetMode, u32)>,
    pub refreshed: Vec<bool>,
}

impl Indicator for RecordingIndicator {
    fn show_mode(&mut self, mode: TargetMode, now_ms: u32) {
        self.shown.push((mode, now_ms));
    }

    fn refresh(&mut self, enabled: bool, _now_ms: u32) {
        self.refreshed.push(enabled);
    }
}

#[derive(Debug, Default)]
pub struct RecordingLed {
    pub levels: Vec<u8>,
}

impl LedOutput for RecordingLed {
    fn set_level(&mut self, level: u8) {
        self.levels.push(level);
    }
}
