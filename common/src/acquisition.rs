use crate::{
    config::ThermostatConfig,
    ports::{ProbeError, TemperatureProbe},
    time::{elapsed_ms, has_elapsed},
    types::{ControlEvent, SensorPhase, TemperatureReading},
};

/// Non-blocking request/read cycle against a single temperature probe.
///
/// A conversion is requested every `request_interval_ms` and its result is
/// fetched no sooner than `read_delay_ms` later, so the probe's conversion
/// time overlaps with the rest of the loop instead of stalling it. Probe
/// failures only ever turn the cached reading into
/// [`TemperatureReading::Invalid`].
#[derive(Debug, Clone)]
pub struct SensorAcquisition {
    request_interval_ms: u32,
    read_delay_ms: u32,
    phase: SensorPhase,
    last_requested_at: Option<u32>,
    reading: TemperatureReading,
    fetch_failures: u32,
}

impl SensorAcquisition {
    pub fn new(config: &ThermostatConfig) -> Self {
        Self {
            request_interval_ms: config.request_interval_ms,
            read_delay_ms: config.read_delay_ms,
            phase: SensorPhase::Idle,
            last_requested_at: None,
            reading: TemperatureReading::Invalid,
            fetch_failures: 0,
        }
    }

    pub fn phase(&self) -> SensorPhase {
        self.phase
    }

    pub fn reading(&self) -> TemperatureReading {
        self.reading
    }

    pub fn last_requested_at(&self) -> Option<u32> {
        self.last_requested_at
    }

    pub fn request_age_ms(&self, now_ms: u32) -> Option<u32> {
        self.last_requested_at
            .map(|requested_at| elapsed_ms(now_ms, requested_at))
    }

    /// Issues the first conversion request right away.
    pub fn start<P: TemperatureProbe>(
        &mut self,
        probe: &mut P,
        now_ms: u32,
        events: &mut Vec<ControlEvent>,
    ) {
        self.request(probe, now_ms, events);
    }

    /// Advances the cycle by at most one transition and returns the cached
    /// reading.
    pub fn step<P: TemperatureProbe>(
        &mut self,
        probe: &mut P,
        now_ms: u32,
        events: &mut Vec<ControlEvent>,
    ) -> TemperatureReading {
        if self.request_due(now_ms) {
            // Also replaces a conversion that never produced a result.
            self.request(probe, now_ms, events);
        } else if self.read_due(now_ms) {
            self.read(probe, events);
        }
        self.reading
    }

    fn request_due(&self, now_ms: u32) -> bool {
        match self.last_requested_at {
            Some(requested_at) => has_elapsed(now_ms, requested_at, self.request_interval_ms),
            None => true,
        }
    }

    fn read_due(&self, now_ms: u32) -> bool {
        if self.phase != SensorPhase::AwaitingConversion {
            return false;
        }
        self.last_requested_at
            .map(|requested_at| has_elapsed(now_ms, requested_at, self.read_delay_ms))
            .unwrap_or(false)
    }

    fn request<P: TemperatureProbe>(
        &mut self,
        probe: &mut P,
        now_ms: u32,
        events: &mut Vec<ControlEvent>,
    ) {
        // Failed attempts also count, so an absent probe is retried once per
        // interval rather than every tick.
        self.last_requested_at = Some(now_ms);
        self.fetch_failures = 0;

        match probe.begin_conversion() {
            Ok(()) => {
                self.phase = SensorPhase::AwaitingConversion;
                events.push(ControlEvent::ConversionRequested);
            }
            Err(err) => {
                self.phase = SensorPhase::Idle;
                self.reading = TemperatureReading::Invalid;
                events.push(ControlEvent::ConversionRequestFailed(err));
            }
        }
    }

    fn read<P: TemperatureProbe>(&mut self, probe: &mut P, events: &mut Vec<ControlEvent>) {
        let result = probe.fetch_result().and_then(|value| {
            if value.is_finite() {
                Ok(value)
            } else {
                Err(ProbeError::Corrupt)
            }
        });

        match result {
            Ok(value) => {
                self.phase = SensorPhase::Idle;
                self.reading = TemperatureReading::Valid(value);
                events.push(ControlEvent::ReadingCompleted(value));
            }
            Err(err) => {
                // Stay in AwaitingConversion: the fetch is retried every step
                // until it succeeds or the next request replaces it.
                self.reading = TemperatureReading::Invalid;
                self.fetch_failures = self.fetch_failures.saturating_add(1);
                if self.fetch_failures == 1 {
                    events.push(ControlEvent::ReadingInvalid(err));
                }
            }
        }
    }
}
