use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use embedded_hal::delay::DelayNs;
use tokio::runtime::Handle;
use tracing::{debug, info};

use vayu_common::{
    BuzzerCommand, Climate, Frame, Hardware, Indicators, LedState, LinkError, Node, RuntimeConfig,
    SensorError, SensorSource, Transport, TransportError, WifiLink,
};

const DEFAULT_CONFIG_PATH: &str = "./.vayu/runtime.json";
const LOOP_PERIOD: Duration = Duration::from_millis(50);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let runtime = load_runtime_config().await?;

    let hardware = Hardware {
        sensors: SimulatedSensors::default(),
        indicators: LogIndicators::default(),
        link: SimulatedLink::new(&runtime.network.wifi_ssid),
        transport: ReqwestTransport::new(Handle::current()),
        delay: StdDelay,
    };
    let mut node = Node::new(&runtime, hardware).context("invalid runtime config")?;

    let running = Arc::new(AtomicBool::new(true));
    let mut worker = {
        let running = running.clone();
        tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            node.boot(0);
            while running.load(Ordering::Relaxed) {
                node.poll(started.elapsed().as_millis() as u64);
                thread::sleep(LOOP_PERIOD);
            }
        })
    };

    tokio::select! {
        result = &mut worker => {
            result.context("node loop panicked")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("shutting down");
            running.store(false, Ordering::Relaxed);
            worker.await.context("node loop panicked")?;
        }
    }

    Ok(())
}

async fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let path = std::env::var("VAYU_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut runtime = match tokio::fs::read(&path).await {
        Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("no runtime config at {}; using defaults", path.display());
            RuntimeConfig::default()
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    if let Ok(url) = std::env::var("VAYU_SERVER_URL") {
        runtime.network.server_url = url;
    }
    if let Ok(ssid) = std::env::var("VAYU_WIFI_SSID") {
        runtime.network.wifi_ssid = ssid;
    }

    runtime.sanitize();
    Ok(runtime)
}

#[derive(Default)]
struct SimulatedSensors {
    tick: u64,
}

impl SensorSource for SimulatedSensors {
    fn read_climate(&mut self) -> Result<Climate, SensorError> {
        self.tick = self.tick.saturating_add(1);

        // Every 23rd read fails the way a DHT22 checksum error would.
        if self.tick % 23 == 0 {
            return Err(SensorError::Climate("checksum mismatch".to_string()));
        }

        Ok(Climate {
            temperature_c: 24.0 + (self.tick % 8) as f32 * 0.2,
            humidity: 55.0 + (self.tick % 6) as f32 * 0.5,
        })
    }

    fn read_air_quality_raw(&mut self) -> Result<u16, SensorError> {
        Ok((self.tick.wrapping_mul(311) % 4096) as u16)
    }
}

#[derive(Default)]
struct LogIndicators {
    leds: Option<LedState>,
    frame: Option<Frame>,
    sounding: bool,
}

impl Indicators for LogIndicators {
    fn set_leds(&mut self, leds: LedState) {
        if self.leds != Some(leds) {
            info!(green = leds.green, red = leds.red, "leds changed");
            self.leds = Some(leds);
        }
    }

    fn buzzer(&mut self, command: BuzzerCommand) {
        match command {
            BuzzerCommand::Tone {
                frequency_hz,
                duration_ms,
            } => {
                info!("buzzer: {frequency_hz} Hz for {duration_ms} ms");
                self.sounding = true;
            }
            BuzzerCommand::Silence if self.sounding => {
                debug!("buzzer silenced");
                self.sounding = false;
            }
            BuzzerCommand::Silence | BuzzerCommand::Hold => {}
        }
    }

    fn render(&mut self, frame: &Frame) {
        if self.frame.as_ref() != Some(frame) {
            debug!("display |{}|{}|", frame.line(0), frame.line(1));
            self.frame = Some(frame.clone());
        }
    }
}

/// Stands in for the radio; associates on the first request.
struct SimulatedLink {
    ssid: String,
    associated: bool,
}

impl SimulatedLink {
    fn new(ssid: &str) -> Self {
        Self {
            ssid: ssid.to_string(),
            associated: false,
        }
    }
}

impl WifiLink for SimulatedLink {
    fn begin_association(&mut self) -> Result<(), LinkError> {
        debug!("simulated association with '{}'", self.ssid);
        self.associated = true;
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.associated
    }
}

struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

/// Blocking facade over an async reqwest client. Must be driven from a
/// blocking thread of the tokio runtime behind `handle`.
struct ReqwestTransport {
    client: reqwest::Client,
    handle: Handle,
}

impl ReqwestTransport {
    fn new(handle: Handle) -> Self {
        Self {
            client: reqwest::Client::new(),
            handle,
        }
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

impl Transport for ReqwestTransport {
    fn post_json(
        &mut self,
        url: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .timeout(timeout);

        self.handle.block_on(async move {
            let response = request.send().await.map_err(transport_error)?;
            let status = response.status().as_u16();
            match response.text().await {
                Ok(reply) => debug!(status, "backend replied: {reply}"),
                Err(err) => debug!(status, "backend reply unreadable: {err}"),
            }
            Ok(status)
        })
    }

    fn get(&mut self, url: &str, timeout: Duration) -> Result<u16, TransportError> {
        let request = self.client.get(url).timeout(timeout);

        self.handle.block_on(async move {
            let response = request.send().await.map_err(transport_error)?;
            Ok(response.status().as_u16())
        })
    }
}
