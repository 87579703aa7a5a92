use crate::{
    config::{PersistedSettings, ThermostatConfig},
    ports::{ByteStore, RelayOutput},
    store::SettingsStore,
    types::{ControlEvent, InputEvent, TargetMode, TemperatureReading, ThermostatState},
};

/// Bang-bang heating control with a symmetric deadband.
///
/// Sole owner of the relay output and of the persisted settings: the relay is
/// only switched from [`evaluate`](Self::evaluate) and from the disable
/// fail-safe in [`toggle_enabled`](Self::toggle_enabled), and every settings
/// change is written straight through to the store.
#[derive(Debug)]
pub struct HysteresisController<R, S> {
    config: ThermostatConfig,
    settings: PersistedSettings,
    relay: R,
    store: SettingsStore<S>,
    relay_on: bool,
    state: ThermostatState,
}

impl<R: RelayOutput, S: ByteStore> HysteresisController<R, S> {
    /// Restores the persisted flags and forces the relay off until the first
    /// evaluation.
    pub fn restore(config: ThermostatConfig, mut relay: R, mut store: SettingsStore<S>) -> Self {
        let settings = store.load();
        relay.set_relay(false);
        Self {
            config,
            settings,
            relay,
            store,
            relay_on: false,
            state: if settings.enabled {
                ThermostatState::Satisfied
            } else {
                ThermostatState::Disabled
            },
        }
    }

    pub fn config(&self) -> &ThermostatConfig {
        &self.config
    }

    pub fn settings(&self) -> PersistedSettings {
        self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn mode(&self) -> TargetMode {
        self.settings.mode
    }

    pub fn target_temp_c(&self) -> f32 {
        self.config.target_for(self.settings.mode)
    }

    pub fn is_relay_on(&self) -> bool {
        self.relay_on
    }

    pub fn state(&self) -> ThermostatState {
        self.state
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn store(&self) -> &SettingsStore<S> {
        &self.store
    }

    pub fn handle_input(&mut self, input: InputEvent, events: &mut Vec<ControlEvent>) {
        match input {
            InputEvent::ShortPress => self.toggle_enabled(events),
            InputEvent::LongPress => self.toggle_mode(events),
        }
    }

    pub fn toggle_enabled(&mut self, events: &mut Vec<ControlEvent>) {
        self.settings.enabled = !self.settings.enabled;
        events.push(ControlEvent::EnabledChanged(self.settings.enabled));

        if !self.settings.enabled {
            self.turn_relay_off(events);
            self.state = ThermostatState::Disabled;
        }

        if let Err(error) = self.store.save_enabled(self.settings.enabled) {
            events.push(ControlEvent::PersistFailed {
                address: self.store.layout().enabled_address,
                error,
            });
        }
    }

    pub fn toggle_mode(&mut self, events: &mut Vec<ControlEvent>) {
        self.settings.mode = self.settings.mode.toggled();
        events.push(ControlEvent::ModeChanged(self.settings.mode));

        if let Err(error) = self.store.save_mode(self.settings.mode) {
            events.push(ControlEvent::PersistFailed {
                address: self.store.layout().mode_address,
                error,
            });
        }
    }

    /// One hysteresis decision. Does nothing while disabled.
    pub fn evaluate(&mut self, reading: TemperatureReading, events: &mut Vec<ControlEvent>) {
        if !self.settings.enabled {
            self.state = ThermostatState::Disabled;
            return;
        }

        let TemperatureReading::Valid(temp_c) = reading else {
            // Never heat on an unknown temperature.
            self.turn_relay_off(events);
            self.state = ThermostatState::SensorFault;
            return;
        };

        let target = self.target_temp_c();
        let upper_bound = target + self.config.hysteresis_c;
        let lower_bound = target - self.config.hysteresis_c;

        if self.relay_on {
            if temp_c > upper_bound {
                self.turn_relay_off(events);
            }
        } else if temp_c < lower_bound {
            self.turn_relay_on(events);
        }

        self.state = if self.relay_on {
            ThermostatState::Heating
        } else {
            ThermostatState::Satisfied
        };
    }

    fn turn_relay_on(&mut self, events: &mut Vec<ControlEvent>) {
        if self.relay_on {
            return;
        }
        self.relay.set_relay(true);
        self.relay_on = true;
        events.push(ControlEvent::HeatOn);
    }

    fn turn_relay_off(&mut self, events: &mut Vec<ControlEvent>) {
        if !self.relay_on {
            return;
        }
        self.relay.set_relay(false);
        self.relay_on = false;
        events.push(ControlEvent::HeatOff);
    }
}
