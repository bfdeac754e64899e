use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::{
    config::{AdcScale, AirQualityThresholds, NodeConfig, RuntimeConfig},
    connectivity::{associate, ConnectivityState, WifiLink},
    delivery::{DeliveryClient, Transport},
    error::ConfigError,
    indicators::{led_state, BuzzerGate, ConnectivityGlyph, DisplayCycle, Frame, Indicators},
    sensors::{acquire, SensorSource},
    types::{BuzzerCommand, DisplayPage, Reading},
};

const STATUS_LOG_INTERVAL_MS: u64 = 30_000;

/// The peripherals a shell hands to the scheduler.
pub struct Hardware<S, I, L, T, D> {
    pub sensors: S,
    pub indicators: I,
    pub link: L,
    pub transport: T,
    pub delay: D,
}

/// Everything the scheduler remembers between iterations.
#[derive(Debug, Clone)]
struct NodeContext {
    reading: Reading,
    connectivity: ConnectivityState,
    display: DisplayCycle,
    buzzer: BuzzerGate,
    last_sense_ms: Option<u64>,
    last_status_ms: Option<u64>,
    probed: bool,
}

impl NodeContext {
    fn new(now_ms: u64) -> Self {
        Self {
            reading: Reading::default(),
            connectivity: ConnectivityState::default(),
            display: DisplayCycle::new(now_ms),
            buzzer: BuzzerGate::default(),
            last_sense_ms: None,
            last_status_ms: None,
            probed: false,
        }
    }
}

pub struct Node<S, I, L, T, D> {
    config: NodeConfig,
    thresholds: AirQualityThresholds,
    adc: AdcScale,
    ssid: String,
    client: DeliveryClient,
    hw: Hardware<S, I, L, T, D>,
    ctx: NodeContext,
}

impl<S, I, L, T, D> Node<S, I, L, T, D>
where
    S: SensorSource,
    I: Indicators,
    L: WifiLink,
    T: Transport,
    D: DelayNs,
{
    pub fn new(
        runtime: &RuntimeConfig,
        hardware: Hardware<S, I, L, T, D>,
    ) -> Result<Self, ConfigError> {
        runtime.network.validate()?;
        let client = DeliveryClient::new(&runtime.network.server_url, &runtime.node)?;

        Ok(Self {
            config: runtime.node.clone(),
            thresholds: runtime.thresholds,
            adc: runtime.adc,
            ssid: runtime.network.wifi_ssid.clone(),
            client,
            hw: hardware,
            ctx: NodeContext::new(0),
        })
    }

    pub fn reading(&self) -> &Reading {
        &self.ctx.reading
    }

    pub fn connectivity(&self) -> &ConnectivityState {
        &self.ctx.connectivity
    }

    pub fn page(&self) -> DisplayPage {
        self.ctx.display.page()
    }

    pub fn hardware(&self) -> &Hardware<S, I, L, T, D> {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut Hardware<S, I, L, T, D> {
        &mut self.hw
    }

    pub fn boot(&mut self, now_ms: u64) {
        info!(
            "node starting; posting to {} every {} ms",
            self.client.endpoint(),
            self.config.sensor_interval_ms
        );
        self.connect();
        self.ctx.display = DisplayCycle::new(now_ms);
    }

    /// One pass of the main loop. Never sleeps on its own; the only waits are
    /// the association poll and the bounded HTTP calls.
    pub fn poll(&mut self, now_ms: u64) {
        let due = self
            .ctx
            .last_sense_ms
            .map(|last| now_ms.saturating_sub(last) >= self.config.sensor_interval_ms)
            .unwrap_or(true);
        if due {
            self.sense(now_ms);
        }

        let level = self.ctx.reading.air_quality_level;
        let command = self.ctx.buzzer.tick(now_ms, level, &self.config);
        if command != BuzzerCommand::Hold {
            self.hw.indicators.buzzer(command);
        }

        if self.ctx.display.tick(now_ms, self.config.display_switch_interval_ms) {
            self.render_page();
        }

        let link_up = self.hw.link.is_connected();
        if link_up && !self.ctx.connectivity.wifi_connected() {
            info!("wifi link came up after the association window");
            self.associated();
        } else if !link_up {
            if self.ctx.connectivity.wifi_connected() {
                warn!("wifi link lost");
            }
            self.ctx.connectivity.mark_disconnected();
            self.connect();
        }

        self.log_status(now_ms);
    }

    /// Delivers the current reading. Without a link this only schedules a
    /// reconnect and the attempt does not count as a delivery failure.
    pub fn send(&mut self) -> bool {
        if !self.ctx.connectivity.wifi_connected() {
            warn!("skipping delivery: wifi not connected");
            self.connect();
            return false;
        }

        self.client.deliver(
            &mut self.hw.transport,
            &self.ctx.reading,
            &mut self.ctx.connectivity,
        )
    }

    fn sense(&mut self, now_ms: u64) {
        let reading = acquire(&mut self.hw.sensors, &self.adc, &self.thresholds);
        self.ctx.reading = reading;
        self.ctx.last_sense_ms = Some(now_ms);

        self.hw.indicators.set_leds(led_state(reading.air_quality_level));
        self.render_page();

        debug!(
            "reading: {:.1}C {:.1}% {:.2}V {}",
            reading.temperature_c,
            reading.humidity,
            reading.air_quality_voltage,
            reading.air_quality_level.as_str()
        );

        if self.ctx.connectivity.wifi_connected() {
            self.send();
        }
    }

    fn render_page(&mut self) {
        let frame = Frame::for_page(self.ctx.display.page(), &self.ctx.reading)
            .with_glyph(ConnectivityGlyph::from_state(&self.ctx.connectivity));
        self.hw.indicators.render(&frame);
    }

    fn connect(&mut self) {
        self.ctx.connectivity.begin_connecting();
        self.hw.indicators.render(&Frame::connecting(&self.ssid));
        info!("connecting to wifi network '{}'", self.ssid);

        let connected = associate(
            &mut self.hw.link,
            &mut self.hw.delay,
            self.config.wifi_connect_attempts,
            self.config.wifi_poll_interval_ms,
        );

        if !connected {
            self.ctx.connectivity.mark_disconnected();
            self.hw.indicators.render(&Frame::wifi_failed());
            warn!("wifi connection failed; retrying next iteration");
            return;
        }

        self.associated();
    }

    fn associated(&mut self) {
        self.ctx.connectivity.mark_connected();
        self.hw.indicators.render(&Frame::wifi_connected());

        if !self.ctx.probed {
            self.ctx.probed = true;
            self.client.probe(&mut self.hw.transport, &mut self.ctx.connectivity);
        }
    }

    fn log_status(&mut self, now_ms: u64) {
        let due = self
            .ctx
            .last_status_ms
            .map(|last| now_ms.saturating_sub(last) >= STATUS_LOG_INTERVAL_MS)
            .unwrap_or(true);
        if !due {
            return;
        }
        self.ctx.last_status_ms = Some(now_ms);

        let state = &self.ctx.connectivity;
        info!(
            "status: wifi={} backend={} failures={} delivered={} failed={}",
            state.link().as_str(),
            if state.backend_reachable() { "up" } else { "down" },
            state.consecutive_failures(),
            state.delivered(),
            state.failed()
        );
    }
}
