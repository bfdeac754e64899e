use std::{
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use dht_sensor::dht22;
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    delay::{Ets, FreeRtos},
    gpio::{AnyIOPin, AnyOutputPin, Gpio34, IOPin, InputOutput, Output, OutputPin, PinDriver, Pull},
    i2c::{I2cConfig, I2cDriver},
    ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver},
    units::FromValueType,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::prelude::Peripherals,
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    timer::{EspTaskTimerService, EspTimer},
    wifi::EspWifi,
};
use log::{debug, info, warn};
use ssd1306::{
    mode::{TerminalMode, TerminalModeError},
    prelude::*,
    I2CDisplayInterface, Ssd1306,
};

use vayu_common::{
    BuzzerCommand, Climate, Frame, Hardware, Indicators, LedState, LinkError, NetworkConfig, Node,
    PinConfig, RuntimeConfig, SensorError, SensorSource, Transport, TransportError, WifiLink,
};

const NVS_NAMESPACE: &str = "vayu";
const NVS_RUNTIME_KEY: &str = "runtime_json";

const WATCHDOG_TIMEOUT_SEC: u32 = 90;
const LOOP_PERIOD: Duration = Duration::from_millis(50);
const HTTP_REPLY_PREVIEW: usize = 256;

type TextDisplay = Ssd1306<I2CInterface<I2cDriver<'static>>, DisplaySize128x64, TerminalMode>;

struct EspSensors {
    dht_pin: PinDriver<'static, AnyIOPin, InputOutput>,
    air_quality: AdcChannelDriver<'static, Gpio34, AdcDriver<'static, ADC1>>,
    delay: Ets,
}

struct Buzzer {
    channel: Arc<Mutex<LedcDriver<'static>>>,
    stop: EspTimer<'static>,
}

struct EspIndicators {
    green: PinDriver<'static, AnyOutputPin, Output>,
    red: PinDriver<'static, AnyOutputPin, Output>,
    buzzer: Buzzer,
    display: Option<TextDisplay>,
}

struct EspLink {
    wifi: EspWifi<'static>,
    network: NetworkConfig,
    started: bool,
}

struct EspTransport;

struct NvsStore {
    partition: EspDefaultNvsPartition,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
    };

    let runtime = load_runtime_config(&nvs_store);
    if runtime.pins != PinConfig::default() {
        warn!(
            "runtime pin map {:?} ignored; firmware is wired for {:?}",
            runtime.pins,
            PinConfig::default()
        );
    }

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    let sensors = EspSensors::new(pins.gpio4.downgrade(), peripherals.adc1, pins.gpio34)
        .context("failed to initialize sensors")?;

    let timers = EspTaskTimerService::new().context("failed to start esp timer service")?;
    let ledc_timer = LedcTimerDriver::new(
        peripherals.ledc.timer0,
        &TimerConfig::default().frequency(runtime.node.beep_frequency_hz.Hz().into()),
    )
    .context("failed to configure buzzer timer")?;
    let ledc_channel = LedcDriver::new(peripherals.ledc.channel0, ledc_timer, pins.gpio27)
        .context("failed to configure buzzer channel")?;
    let buzzer = Buzzer::new(ledc_channel, &timers)?;

    let i2c = I2cDriver::new(
        peripherals.i2c0,
        pins.gpio21,
        pins.gpio22,
        &I2cConfig::new().baudrate(400.kHz().into()),
    )
    .context("failed to initialize i2c bus")?;

    let indicators = EspIndicators {
        green: PinDriver::output(pins.gpio25.downgrade_output())?,
        red: PinDriver::output(pins.gpio26.downgrade_output())?,
        buzzer,
        display: init_display(i2c),
    };

    let wifi = EspWifi::new(peripherals.modem, sys_loop, Some(nvs_partition))
        .context("failed to create wifi driver")?;
    let link = EspLink {
        wifi,
        network: runtime.network.clone(),
        started: false,
    };

    let hardware = Hardware {
        sensors,
        indicators,
        link,
        transport: EspTransport,
        delay: FreeRtos,
    };
    let mut node = Node::new(&runtime, hardware).context("invalid runtime config")?;

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    add_current_task_to_watchdog()?;

    let started = Instant::now();
    node.boot(0);

    loop {
        feed_watchdog();
        node.poll(started.elapsed().as_millis() as u64);
        thread::sleep(LOOP_PERIOD);
    }
}

fn load_runtime_config(nvs_store: &NvsStore) -> RuntimeConfig {
    let mut runtime = match nvs_store.load_runtime_config() {
        Ok(Some(runtime)) => runtime,
        Ok(None) => {
            info!("no runtime config in NVS; storing defaults");
            let runtime = RuntimeConfig::default();
            if let Err(err) = nvs_store.save_runtime_config(&runtime) {
                warn!("failed to store default runtime config: {err:#}");
            }
            runtime
        }
        Err(err) => {
            warn!("failed to load runtime config from NVS: {err:#}");
            RuntimeConfig::default()
        }
    };

    ensure_network_defaults(&mut runtime);
    runtime.sanitize();
    runtime
}

fn ensure_network_defaults(runtime: &mut RuntimeConfig) {
    let network = &mut runtime.network;

    if network.wifi_ssid.is_empty() {
        network.wifi_ssid = option_env!("WIFI_SSID").unwrap_or("CHANGE_ME").to_string();
    }

    if network.wifi_pass.is_empty() {
        network.wifi_pass = option_env!("WIFI_PASS").unwrap_or_default().to_string();
    }

    let builtin_url = NetworkConfig::default().server_url;
    if network.server_url.trim().is_empty() || network.server_url == builtin_url {
        if let Some(url) = option_env!("SERVER_URL") {
            network.server_url = url.to_string();
        } else if network.server_url.trim().is_empty() {
            network.server_url = builtin_url;
        }
    }
}

impl EspSensors {
    fn new(dht_pin: AnyIOPin, adc: ADC1, air_quality_pin: Gpio34) -> anyhow::Result<Self> {
        let mut dht_pin = PinDriver::input_output_od(dht_pin)?;
        dht_pin.set_pull(Pull::Up)?;
        dht_pin.set_high()?;

        let adc = AdcDriver::new(adc)?;
        let config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        let air_quality = AdcChannelDriver::new(adc, air_quality_pin, &config)?;

        Ok(Self {
            dht_pin,
            air_quality,
            delay: Ets,
        })
    }
}

impl SensorSource for EspSensors {
    fn read_climate(&mut self) -> Result<Climate, SensorError> {
        self.dht_pin
            .set_high()
            .map_err(|err| SensorError::Climate(format!("line not released: {err:?}")))?;

        let reading = dht22::blocking::read(&mut self.delay, &mut self.dht_pin)
            .map_err(|err| SensorError::Climate(format!("{err:?}")))?;

        Ok(Climate {
            temperature_c: reading.temperature,
            humidity: reading.relative_humidity,
        })
    }

    fn read_air_quality_raw(&mut self) -> Result<u16, SensorError> {
        self.air_quality
            .read_raw()
            .map_err(|err| SensorError::Adc(err.to_string()))
    }
}

impl Buzzer {
    /// The tone is cut by a one-shot esp timer so the main loop never waits
    /// for it. Frequency is fixed by the LEDC timer at start-up.
    fn new(channel: LedcDriver<'static>, timers: &EspTaskTimerService) -> anyhow::Result<Self> {
        let channel = Arc::new(Mutex::new(channel));
        let stop = {
            let channel = channel.clone();
            timers
                .timer(move || {
                    if let Ok(mut channel) = channel.lock() {
                        if let Err(err) = channel.set_duty(0) {
                            warn!("failed to stop buzzer: {err:?}");
                        }
                    }
                })
                .context("failed to create buzzer timer")?
        };

        Ok(Self { channel, stop })
    }

    fn tone(&mut self, duration_ms: u64) -> anyhow::Result<()> {
        {
            let mut channel = self
                .channel
                .lock()
                .map_err(|_| anyhow!("buzzer channel poisoned"))?;
            let duty = channel.get_max_duty() / 2;
            channel.set_duty(duty)?;
        }
        self.stop.after(Duration::from_millis(duration_ms))?;
        Ok(())
    }

    fn silence(&mut self) -> anyhow::Result<()> {
        let mut channel = self
            .channel
            .lock()
            .map_err(|_| anyhow!("buzzer channel poisoned"))?;
        if channel.get_duty() != 0 {
            self.stop.cancel()?;
            channel.set_duty(0)?;
        }
        Ok(())
    }
}

impl Indicators for EspIndicators {
    fn set_leds(&mut self, leds: LedState) {
        drive_led(&mut self.green, leds.green, "green");
        drive_led(&mut self.red, leds.red, "red");
    }

    fn buzzer(&mut self, command: BuzzerCommand) {
        let result = match command {
            BuzzerCommand::Tone { duration_ms, .. } => self.buzzer.tone(duration_ms),
            BuzzerCommand::Silence => self.buzzer.silence(),
            BuzzerCommand::Hold => Ok(()),
        };
        if let Err(err) = result {
            warn!("buzzer command {command:?} failed: {err:#}");
        }
    }

    fn render(&mut self, frame: &Frame) {
        let Some(display) = self.display.as_mut() else {
            return;
        };
        if let Err(err) = draw_frame(display, frame) {
            warn!("display write failed: {err:?}");
        }
    }
}

fn drive_led(pin: &mut PinDriver<'static, AnyOutputPin, Output>, on: bool, name: &str) {
    let result = if on { pin.set_high() } else { pin.set_low() };
    if let Err(err) = result {
        warn!("failed to drive {name} led: {err:?}");
    }
}

fn init_display(i2c: I2cDriver<'static>) -> Option<TextDisplay> {
    let mut display = Ssd1306::new(
        I2CDisplayInterface::new(i2c),
        DisplaySize128x64,
        DisplayRotation::Rotate0,
    )
    .into_terminal_mode();

    match display.init().and_then(|()| display.clear()) {
        Ok(()) => {
            info!("ssd1306 display ready");
            Some(display)
        }
        Err(err) => {
            warn!("ssd1306 display unavailable: {err:?}");
            None
        }
    }
}

/// Each frame line is exactly one 16-column terminal row, so writing it in
/// place overwrites the previous contents.
fn draw_frame(display: &mut TextDisplay, frame: &Frame) -> Result<(), TerminalModeError> {
    for (row, line) in frame.lines().iter().enumerate() {
        display.set_position(0, row as u8)?;
        for c in line.chars() {
            display.print_char(c)?;
        }
    }
    Ok(())
}

impl EspLink {
    fn start(&mut self) -> anyhow::Result<()> {
        let auth_method = if self.network.wifi_pass.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: self
                    .network
                    .wifi_ssid
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("wifi ssid too long"))?,
                password: self
                    .network
                    .wifi_pass
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("wifi password too long"))?,
                auth_method,
                ..Default::default()
            }))?;

        self.wifi.start()?;
        disable_wifi_power_save();
        self.started = true;
        info!("wifi started");
        Ok(())
    }
}

impl WifiLink for EspLink {
    fn begin_association(&mut self) -> Result<(), LinkError> {
        if !self.network.has_station_credentials() {
            return Err(LinkError::MissingCredentials);
        }

        if !self.started {
            self.start()
                .map_err(|err| LinkError::Driver(format!("{err:#}")))?;
        }

        self.wifi
            .connect()
            .map_err(|err| LinkError::Driver(err.to_string()))
    }

    fn is_connected(&mut self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }
}

fn http_client(timeout: Duration) -> Result<HttpClient<EspHttpConnection>, TransportError> {
    let http_conf = HttpClientConfiguration {
        timeout: Some(timeout),
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        ..Default::default()
    };
    EspHttpConnection::new(&http_conf)
        .map(HttpClient::wrap)
        .map_err(|err| TransportError::Connect(err.to_string()))
}

impl Transport for EspTransport {
    fn post_json(
        &mut self,
        url: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        let mut client = http_client(timeout)?;
        let content_length = body.len().to_string();
        let headers = [
            ("Content-Type", "application/json"),
            ("Content-Length", content_length.as_str()),
        ];

        let mut request = client
            .request(Method::Post, url, &headers)
            .map_err(|err| TransportError::Connect(format!("{err:?}")))?;
        request
            .write_all(body)
            .map_err(|err| TransportError::Request(format!("{err:?}")))?;
        request
            .flush()
            .map_err(|err| TransportError::Request(format!("{err:?}")))?;

        let mut response = request
            .submit()
            .map_err(|err| TransportError::Request(format!("{err:?}")))?;
        let status = response.status();

        let mut reply = [0_u8; HTTP_REPLY_PREVIEW];
        let read = response.read(&mut reply).unwrap_or(0);
        debug!(
            "backend replied HTTP {status}: {}",
            String::from_utf8_lossy(&reply[..read])
        );

        Ok(status)
    }

    fn get(&mut self, url: &str, timeout: Duration) -> Result<u16, TransportError> {
        let mut client = http_client(timeout)?;
        let request = client
            .get(url)
            .map_err(|err| TransportError::Connect(format!("{err:?}")))?;
        let response = request
            .submit()
            .map_err(|err| TransportError::Request(format!("{err:?}")))?;
        Ok(response.status())
    }
}

impl NvsStore {
    fn load_runtime_config(&self) -> anyhow::Result<Option<RuntimeConfig>> {
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 4096];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => Ok(Some(serde_json::from_str::<RuntimeConfig>(value)?)),
            None => Ok(None),
        }
    }

    fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let mut nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let payload = serde_json::to_string(runtime)?;
        nvs.set_str(NVS_RUNTIME_KEY, &payload)?;
        Ok(())
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

fn disable_wifi_power_save() {
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_set_ps(0) };
    if rc == esp_idf_svc::sys::ESP_OK {
        info!("wifi power save disabled");
    } else {
        warn!("failed to disable wifi power save: esp_err_t={rc}");
    }
}
