use std::{
    cell::Cell,
    fs,
    io::{BufRead, ErrorKind},
    path::{Path, PathBuf},
    rc::Rc,
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use relay_thermostat_common::{
    store::ERASED_BYTE, time::has_elapsed, BlinkIndicator, ByteStore, Clock, ControlEvent,
    GestureDetector, Hardware, InputEvent, InputSource, LedOutput, MonotonicClock, ProbeError,
    RelayOutput, RuntimeConfig, Severity, StoreError, TemperatureProbe, Thermostat,
};

const DEFAULT_EEPROM_PATH: &str = "thermostat.eeprom";
const EEPROM_SIZE: usize = 1024;

const SHORT_PRESS_HOLD_MS: u32 = 150;
const LONG_PRESS_EXTRA_HOLD_MS: u32 = 400;

const START_TEMP_C: f32 = 14.0;
const AMBIENT_TEMP_C: f32 = 8.0;
const HEATING_RATE_C_PER_S: f32 = 0.2;
const HEAT_LOSS_PER_S: f32 = 0.002;
const PROBE_RESOLUTION_C: f32 = 0.0625;

#[derive(Debug, PartialEq, Eq)]
enum ConsoleCommand {
    ToggleProbe,
    Quit,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut runtime = load_runtime_config()?;
    if let Some(tick_ms) = env_u32("THERMOSTAT_TICK_MS") {
        runtime.tick_interval_ms = tick_ms;
    }
    if let Some(status_ms) = env_u32("THERMOSTAT_STATUS_INTERVAL_MS") {
        runtime.status_interval_ms = status_ms;
    }
    runtime.validate().context("invalid runtime config")?;

    let eeprom_path = std::env::var("THERMOSTAT_EEPROM")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_EEPROM_PATH));
    let store = EepromFile::open(&eeprom_path, EEPROM_SIZE)?;

    let room = Rc::new(Room::new(START_TEMP_C));
    let (press_tx, press_rx) = mpsc::unbounded_channel();
    let (command_tx, mut command_rx) = mpsc::unbounded_channel();
    let long_press_ms = runtime.button.long_press_ms;
    // Blocking stdin lives on its own thread so shutdown never waits on a read.
    thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            info!("console: s = short press, l = long press, u = unplug/replug probe, q = quit");
            read_console(
                std::io::stdin().lock(),
                &press_tx,
                &command_tx,
                long_press_ms,
            );
        })
        .context("failed to spawn console thread")?;

    let clock = MonotonicClock::new();
    let hardware = Hardware {
        input: SimulatedButton::new(press_rx, GestureDetector::new(runtime.button)),
        probe: SimulatedProbe { room: room.clone() },
        relay: SimulatedRelay { room: room.clone() },
        store,
        indicator: BlinkIndicator::new(LogLed, runtime.indicator),
    };
    let (mut thermostat, events) = Thermostat::start(
        runtime.thermostat.clone(),
        runtime.layout,
        hardware,
        clock.now_ms(),
    )
    .context("invalid thermostat config")?;
    log_events(&events);

    let settings = thermostat.controller().settings();
    info!(
        "thermostat started: enabled={}, mode={}, target={:.1}, hysteresis={:.1}, eeprom={}",
        settings.enabled,
        settings.mode.as_str(),
        thermostat.controller().target_temp_c(),
        runtime.thermostat.hysteresis_c,
        eeprom_path.display()
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut interval =
        tokio::time::interval(Duration::from_millis(u64::from(runtime.tick_interval_ms)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_status_ms = clock.now_ms();

    'control: loop {
        tokio::select! {
            _ = interval.tick() => {}
            result = &mut shutdown => {
                if let Err(err) = result {
                    warn!("failed to listen for ctrl-c: {err}");
                }
                break 'control;
            }
        }

        while let Ok(command) = command_rx.try_recv() {
            match command {
                ConsoleCommand::ToggleProbe => {
                    let plugged = !room.plugged.get();
                    room.plugged.set(plugged);
                    info!(
                        "simulated probe {}",
                        if plugged { "plugged in" } else { "unplugged" }
                    );
                }
                ConsoleCommand::Quit => break 'control,
            }
        }

        let now_ms = clock.now_ms();
        log_events(&thermostat.tick(now_ms));

        if has_elapsed(now_ms, last_status_ms, runtime.status_interval_ms) {
            last_status_ms = now_ms;
            match serde_json::to_string(&thermostat.status(now_ms)) {
                Ok(body) => info!("status {body}"),
                Err(err) => warn!("status serialization failed: {err}"),
            }
        }
    }

    info!("shutting down");
    Ok(())
}

fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let Ok(path) = std::env::var("THERMOSTAT_CONFIG") else {
        info!("THERMOSTAT_CONFIG not set; using default runtime config");
        return Ok(RuntimeConfig::default());
    };

    match fs::read_to_string(&path) {
        Ok(json) => RuntimeConfig::from_json(&json)
            .with_context(|| format!("failed to load runtime config from {path}")),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("runtime config {path} not found; using defaults");
            Ok(RuntimeConfig::default())
        }
        Err(err) => Err(err).with_context(|| format!("failed to read runtime config {path}")),
    }
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
}

fn log_events(events: &[ControlEvent]) {
    for event in events {
        match event.severity() {
            Severity::Debug => debug!("{event}"),
            Severity::Info => info!("{event}"),
            Severity::Warn => warn!("{event}"),
        }
    }
}

/// Reads console lines until `q`, end of input, or the control loop is gone.
fn read_console(
    input: impl BufRead,
    presses: &UnboundedSender<u32>,
    commands: &UnboundedSender<ConsoleCommand>,
    long_press_ms: u32,
) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("console read error: {err}");
                break;
            }
        };

        let delivered = match line.trim() {
            "s" => presses.send(SHORT_PRESS_HOLD_MS).is_ok(),
            "l" => presses
                .send(long_press_ms.saturating_add(LONG_PRESS_EXTRA_HOLD_MS))
                .is_ok(),
            "u" => commands.send(ConsoleCommand::ToggleProbe).is_ok(),
            "q" => {
                let _ = commands.send(ConsoleCommand::Quit);
                break;
            }
            "" => true,
            other => {
                warn!("unknown console command `{other}`");
                true
            }
        };
        if !delivered {
            break;
        }
    }
}

/// Byte image of the EEPROM kept in a file; every write is flushed.
struct EepromFile {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl EepromFile {
    fn open(path: &Path, size: usize) -> anyhow::Result<Self> {
        let mut bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("no eeprom image at {}; starting blank", path.display());
                Vec::new()
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read eeprom image {}", path.display()))
            }
        };
        if bytes.len() < size {
            bytes.resize(size, ERASED_BYTE);
        }

        Ok(Self {
            path: path.to_path_buf(),
            bytes,
        })
    }
}

impl ByteStore for EepromFile {
    fn read_byte(&mut self, address: u16) -> Result<u8, StoreError> {
        self.bytes
            .get(usize::from(address))
            .copied()
            .ok_or(StoreError::OutOfRange(address))
    }

    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), StoreError> {
        let cell = self
            .bytes
            .get_mut(usize::from(address))
            .ok_or(StoreError::OutOfRange(address))?;
        let previous = std::mem::replace(cell, value);

        if let Err(err) = fs::write(&self.path, &self.bytes) {
            warn!("failed to write eeprom image {}: {err}", self.path.display());
            self.bytes[usize::from(address)] = previous;
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }
}

/// Lumped thermal model of the heated space.
struct Room {
    temp_c: Cell<f32>,
    heater_on: Cell<bool>,
    plugged: Cell<bool>,
    updated_at: Cell<Instant>,
}

impl Room {
    fn new(temp_c: f32) -> Self {
        Self {
            temp_c: Cell::new(temp_c),
            heater_on: Cell::new(false),
            plugged: Cell::new(true),
            updated_at: Cell::new(Instant::now()),
        }
    }

    fn advance(&self) -> f32 {
        let now = Instant::now();
        let dt = now.duration_since(self.updated_at.get()).as_secs_f32();
        self.updated_at.set(now);

        let mut temp_c = self.temp_c.get();
        if self.heater_on.get() {
            temp_c += HEATING_RATE_C_PER_S * dt;
        }
        temp_c += (AMBIENT_TEMP_C - temp_c) * (HEAT_LOSS_PER_S * dt).min(1.0);
        self.temp_c.set(temp_c);
        temp_c
    }
}

struct SimulatedProbe {
    room: Rc<Room>,
}

impl TemperatureProbe for SimulatedProbe {
    fn begin_conversion(&mut self) -> Result<(), ProbeError> {
        if !self.room.plugged.get() {
            return Err(ProbeError::NotFound);
        }
        Ok(())
    }

    fn fetch_result(&mut self) -> Result<f32, ProbeError> {
        if !self.room.plugged.get() {
            return Err(ProbeError::Disconnected);
        }
        let temp_c = self.room.advance();
        Ok((temp_c / PROBE_RESOLUTION_C).round() * PROBE_RESOLUTION_C)
    }
}

struct SimulatedRelay {
    room: Rc<Room>,
}

impl RelayOutput for SimulatedRelay {
    fn set_relay(&mut self, on: bool) {
        self.room.advance();
        self.room.heater_on.set(on);
        debug!("relay output {}", if on { "HIGH" } else { "LOW" });
    }
}

/// Replays console presses as raw button levels through the gesture detector.
struct SimulatedButton {
    presses: UnboundedReceiver<u32>,
    detector: GestureDetector,
    held: Option<(u32, u32)>,
}

impl SimulatedButton {
    fn new(presses: UnboundedReceiver<u32>, detector: GestureDetector) -> Self {
        Self {
            presses,
            detector,
            held: None,
        }
    }
}

impl InputSource for SimulatedButton {
    fn poll_once(&mut self, now_ms: u32) -> Option<InputEvent> {
        if self.held.is_none() {
            if let Ok(hold_ms) = self.presses.try_recv() {
                self.held = Some((now_ms, hold_ms));
            }
        }

        let pressed = self
            .held
            .is_some_and(|(since, hold_ms)| !has_elapsed(now_ms, since, hold_ms));
        let event = self.detector.update(pressed, now_ms);

        // Next press waits until this release has been debounced.
        if !pressed && !self.detector.is_pressed() {
            self.held = None;
        }
        event
    }
}

struct LogLed;

impl LedOutput for LogLed {
    fn set_level(&mut self, level: u8) {
        debug!("indicator level {level}");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::*;

    fn drain<T>(rx: &mut UnboundedReceiver<T>) -> Vec<T> {
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    #[test]
    fn console_stops_reading_after_quit() {
        let (press_tx, mut press_rx) = mpsc::unbounded_channel();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();

        read_console(
            Cursor::new("s\nl\n\nu\nq\ns\n"),
            &press_tx,
            &command_tx,
            800,
        );

        assert_eq!(drain(&mut press_rx), vec![SHORT_PRESS_HOLD_MS, 1_200]);
        assert_eq!(
            drain(&mut command_rx),
            vec![ConsoleCommand::ToggleProbe, ConsoleCommand::Quit]
        );
    }

    #[test]
    fn console_returns_once_the_loop_is_gone() {
        let (press_tx, press_rx) = mpsc::unbounded_channel();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        drop(press_rx);

        read_console(Cursor::new("s\nu\n"), &press_tx, &command_tx, 800);

        assert!(drain(&mut command_rx).is_empty());
    }

    #[test]
    fn console_returns_at_end_of_input() {
        let (press_tx, mut press_rx) = mpsc::unbounded_channel();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();

        read_console(Cursor::new("bogus\nl"), &press_tx, &command_tx, 800);

        assert_eq!(drain(&mut press_rx), vec![1_200]);
        assert!(drain(&mut command_rx).is_empty());
    }
}
