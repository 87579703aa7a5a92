use crate::{
    acquisition::SensorAcquisition,
    config::{ConfigError, StoreLayout, ThermostatConfig},
    ports::{ByteStore, Indicator, InputSource, RelayOutput, TemperatureProbe},
    store::SettingsStore,
    thermostat::HysteresisController,
    types::{ControlEvent, ThermostatStatus},
};

/// The physical collaborators handed to [`Thermostat::start`].
#[derive(Debug)]
pub struct Hardware<I, P, R, S, D> {
    pub input: I,
    pub probe: P,
    pub relay: R,
    pub store: S,
    pub indicator: D,
}

/// Fixed-topology tick driver.
///
/// Owns every component, so each output has exactly one writer. One
/// [`tick`](Self::tick) is: input poll, sensor step, hysteresis decision,
/// indicator refresh. Nothing in it blocks.
#[derive(Debug)]
pub struct Thermostat<I, P, R, S, D> {
    input: I,
    probe: P,
    indicator: D,
    acquisition: SensorAcquisition,
    controller: HysteresisController<R, S>,
}

impl<I, P, R, S, D> Thermostat<I, P, R, S, D>
where
    I: InputSource,
    P: TemperatureProbe,
    R: RelayOutput,
    S: ByteStore,
    D: Indicator,
{
    /// Restores persisted settings, forces the relay off and issues the first
    /// conversion request.
    ///
    /// Rejects a config the acquisition cycle cannot run with, such as a read
    /// delay that never fits inside the request interval.
    pub fn start(
        config: ThermostatConfig,
        layout: StoreLayout,
        hardware: Hardware<I, P, R, S, D>,
        now_ms: u32,
    ) -> Result<(Self, Vec<ControlEvent>), ConfigError> {
        config.validate()?;
        layout.validate()?;

        let Hardware {
            input,
            mut probe,
            relay,
            store,
            mut indicator,
        } = hardware;

        let mut events = Vec::new();
        let mut acquisition = SensorAcquisition::new(&config);
        let controller =
            HysteresisController::restore(config, relay, SettingsStore::new(store, layout));

        indicator.show_mode(controller.mode(), now_ms);
        acquisition.start(&mut probe, now_ms, &mut events);

        let thermostat = Self {
            input,
            probe,
            indicator,
            acquisition,
            controller,
        };
        Ok((thermostat, events))
    }

    pub fn tick(&mut self, now_ms: u32) -> Vec<ControlEvent> {
        let mut events = Vec::new();

        // Input first, so a toggle takes effect in this tick's evaluation.
        if let Some(input) = self.input.poll_once(now_ms) {
            let mode_before = self.controller.mode();
            self.controller.handle_input(input, &mut events);
            if self.controller.mode() != mode_before {
                self.indicator.show_mode(self.controller.mode(), now_ms);
            }
        }

        // Keeps polling while disabled so a dead probe still shows up.
        let reading = self
            .acquisition
            .step(&mut self.probe, now_ms, &mut events);
        self.controller.evaluate(reading, &mut events);
        self.indicator
            .refresh(self.controller.is_enabled(), now_ms);

        events
    }

    pub fn controller(&self) -> &HysteresisController<R, S> {
        &self.controller
    }

    pub fn acquisition(&self) -> &SensorAcquisition {
        &self.acquisition
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }

    pub fn indicator(&self) -> &D {
        &self.indicator
    }

    pub fn status(&self, now_ms: u32) -> ThermostatStatus {
        let reading = self.acquisition.reading();
        ThermostatStatus {
            current_temp: reading.value(),
            sensor_valid: reading.is_valid(),
            sensor_phase: self.acquisition.phase().as_str(),
            last_request_age_ms: self.acquisition.request_age_ms(now_ms),
            enabled: self.controller.is_enabled(),
            mode: self.controller.mode().as_str(),
            target_temp: self.controller.target_temp_c(),
            hysteresis: self.controller.config().hysteresis_c,
            relay_on: self.controller.is_relay_on(),
            state: self.controller.state().as_str(),
        }
    }
}
