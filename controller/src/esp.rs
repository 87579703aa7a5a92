use anyhow::{anyhow, Context};
use ds18b20::Ds18b20;
use esp_idf_hal::{
    delay::{Ets, FreeRtos},
    gpio::{AnyIOPin, AnyInputPin, AnyOutputPin, Input, InputOutput, Output, PinDriver, Pull},
};
use esp_idf_svc::{
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault},
};
use log::{debug, info, warn};
use one_wire_bus::{Address, OneWire, OneWireError};

use relay_thermostat_common::{
    store::ERASED_BYTE, time::has_elapsed, BlinkIndicator, ByteStore, Clock, ControlEvent,
    GestureDetector, Hardware, InputEvent, InputSource, LedOutput, MonotonicClock, PinConfig,
    ProbeError, RelayOutput, RuntimeConfig, Severity, StoreError, TemperatureProbe, Thermostat,
};

const NVS_NAMESPACE: &str = "thermostat";
const NVS_RUNTIME_KEY: &str = "runtime_json";
const STORE_SIZE: u16 = 1024;
const WATCHDOG_TIMEOUT_SEC: u32 = 10;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs = EspNvs::new(nvs_partition, NVS_NAMESPACE, true)?;

    let runtime = load_runtime_config(&nvs).unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    info!(
        "runtime config loaded: relay=GPIO{}, button=GPIO{}, led=GPIO{}, probe=GPIO{}",
        runtime.pins.relay, runtime.pins.button, runtime.pins.led, runtime.pins.probe
    );

    let hardware = Hardware {
        input: EspButton::new(&runtime.pins, GestureDetector::new(runtime.button))?,
        probe: Ds18b20Probe::new(runtime.pins.probe)?,
        relay: EspRelay::new(runtime.pins.relay)?,
        store: NvsByteStore { nvs },
        indicator: BlinkIndicator::new(EspLed::new(runtime.pins.led)?, runtime.indicator),
    };

    let clock = MonotonicClock::new();
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
        "thermostat started: enabled={}, mode={}, target={:.1}",
        settings.enabled,
        settings.mode.as_str(),
        thermostat.controller().target_temp_c()
    );

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    if let Err(err) = add_current_task_to_watchdog() {
        warn!("failed to register control loop with watchdog: {err:#}");
    }

    let mut last_status_ms = clock.now_ms();
    loop {
        feed_watchdog();

        let now_ms = clock.now_ms();
        log_events(&thermostat.tick(now_ms));

        if has_elapsed(now_ms, last_status_ms, runtime.status_interval_ms) {
            last_status_ms = now_ms;
            match serde_json::to_string(&thermostat.status(now_ms)) {
                Ok(body) => info!("status {body}"),
                Err(err) => warn!("status serialization failed: {err}"),
            }
        }

        FreeRtos::delay_ms(runtime.tick_interval_ms);
    }
}

fn load_runtime_config(nvs: &EspNvs<NvsDefault>) -> anyhow::Result<RuntimeConfig> {
    let mut buffer = vec![0_u8; 4096];

    match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
        Some(value) => Ok(RuntimeConfig::from_json(value)?),
        None => Ok(RuntimeConfig::default()),
    }
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

/// DS18B20 driven in two halves: start a conversion, fetch it on a later tick.
struct Ds18b20Probe {
    pin: i32,
    one_wire: OneWire<PinDriver<'static, AnyIOPin, InputOutput>>,
    address: Option<Address>,
    delay: Ets,
}

impl Ds18b20Probe {
    fn new(pin: i32) -> anyhow::Result<Self> {
        let mut one_wire_pin = PinDriver::input_output_od(unsafe { AnyIOPin::new(pin) })?;
        one_wire_pin.set_pull(Pull::Up)?;
        one_wire_pin.set_high()?;

        let one_wire = OneWire::new(one_wire_pin)
            .map_err(|err| anyhow!("failed to initialize one-wire bus: {err:?}"))?;

        let mut probe = Self {
            pin,
            one_wire,
            address: None,
            delay: Ets,
        };
        probe.refresh_address();
        Ok(probe)
    }

    fn refresh_address(&mut self) {
        let mut found: Option<Address> = None;
        let mut device_count = 0_u32;

        for addr in self.one_wire.devices(false, &mut self.delay) {
            match addr {
                Ok(address) => {
                    device_count = device_count.saturating_add(1);
                    if found.is_none() && address.family_code() == ds18b20::FAMILY_CODE {
                        found = Some(address);
                    }
                }
                Err(err) => {
                    warn!("one-wire device scan failed: {err:?}");
                    break;
                }
            }
        }

        self.address = found;
        match self.address {
            Some(address) => info!(
                "DS18B20 ready on GPIO{} ({} one-wire device(s), using {:?})",
                self.pin, device_count, address
            ),
            None => debug!(
                "no DS18B20 on GPIO{} ({} one-wire device(s) detected)",
                self.pin, device_count
            ),
        }
    }

    /// Never scans the bus; a lost address is only rediscovered by the next
    /// `begin_conversion`.
    fn sensor(&mut self, missing: ProbeError) -> Result<Ds18b20, ProbeError> {
        let address = self.address.ok_or(missing)?;

        Ds18b20::new::<core::convert::Infallible>(address).map_err(|err| {
            warn!("invalid DS18B20 address {address:?}: {err:?}");
            self.address = None;
            missing
        })
    }
}

fn probe_error<E>(err: &OneWireError<E>) -> ProbeError {
    match err {
        OneWireError::CrcMismatch => ProbeError::Corrupt,
        _ => ProbeError::Disconnected,
    }
}

impl TemperatureProbe for Ds18b20Probe {
    fn begin_conversion(&mut self) -> Result<(), ProbeError> {
        if self.address.is_none() {
            self.refresh_address();
        }
        let sensor = self.sensor(ProbeError::NotFound)?;

        sensor
            .start_temp_measurement(&mut self.one_wire, &mut self.delay)
            .map_err(|err| {
                debug!("failed to start DS18B20 conversion: {err:?}");
                self.address = None;
                ProbeError::NotFound
            })
    }

    fn fetch_result(&mut self) -> Result<f32, ProbeError> {
        let sensor = self.sensor(ProbeError::Disconnected)?;

        match sensor.read_data(&mut self.one_wire, &mut self.delay) {
            Ok(data) => Ok(data.temperature),
            Err(err) => {
                debug!("failed to read DS18B20 data: {err:?}");
                self.address = None;
                Err(probe_error(&err))
            }
        }
    }
}

/// One NVS `u8` entry per byte address; an absent key reads as erased.
struct NvsByteStore {
    nvs: EspNvs<NvsDefault>,
}

fn flag_key(address: u16) -> String {
    format!("flag_{address}")
}

impl ByteStore for NvsByteStore {
    fn read_byte(&mut self, address: u16) -> Result<u8, StoreError> {
        if address >= STORE_SIZE {
            return Err(StoreError::OutOfRange(address));
        }
        match self.nvs.get_u8(&flag_key(address)) {
            Ok(value) => Ok(value.unwrap_or(ERASED_BYTE)),
            Err(err) => {
                warn!("NVS read of byte {address} failed: {err}");
                Err(StoreError::Unavailable)
            }
        }
    }

    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), StoreError> {
        if address >= STORE_SIZE {
            return Err(StoreError::OutOfRange(address));
        }
        self.nvs.set_u8(&flag_key(address), value).map_err(|err| {
            warn!("NVS write of byte {address} failed: {err}");
            StoreError::WriteRejected
        })
    }
}

struct EspRelay {
    pin: PinDriver<'static, AnyOutputPin, Output>,
}

impl EspRelay {
    fn new(pin: i32) -> anyhow::Result<Self> {
        let mut pin = unsafe { PinDriver::output(AnyOutputPin::new(pin)) }?;
        pin.set_low()?;
        Ok(Self { pin })
    }
}

impl RelayOutput for EspRelay {
    fn set_relay(&mut self, on: bool) {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(err) = result {
            warn!("failed to drive relay: {err}");
        }
    }
}

/// On/off LED; any non-zero level lights it.
struct EspLed {
    pin: PinDriver<'static, AnyOutputPin, Output>,
}

impl EspLed {
    fn new(pin: i32) -> anyhow::Result<Self> {
        let mut pin = unsafe { PinDriver::output(AnyOutputPin::new(pin)) }?;
        pin.set_low()?;
        Ok(Self { pin })
    }
}

impl LedOutput for EspLed {
    fn set_level(&mut self, level: u8) {
        let result = if level > 0 {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(err) = result {
            warn!("failed to drive indicator LED: {err}");
        }
    }
}

struct EspButton {
    pin: PinDriver<'static, AnyInputPin, Input>,
    active_low: bool,
    detector: GestureDetector,
}

impl EspButton {
    fn new(pins: &PinConfig, detector: GestureDetector) -> anyhow::Result<Self> {
        let mut pin = unsafe { PinDriver::input(AnyInputPin::new(pins.button)) }?;
        pin.set_pull(if pins.button_active_low {
            Pull::Up
        } else {
            Pull::Down
        })?;

        Ok(Self {
            pin,
            active_low: pins.button_active_low,
            detector,
        })
    }
}

impl InputSource for EspButton {
    fn poll_once(&mut self, now_ms: u32) -> Option<InputEvent> {
        let pressed = self.pin.is_high() != self.active_low;
        self.detector.update(pressed, now_ms)
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}
