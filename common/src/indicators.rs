use crate::{
    config::NodeConfig,
    connectivity::ConnectivityState,
    types::{AirQualityLevel, BuzzerCommand, DisplayPage, LedState, Reading},
};

pub const DISPLAY_COLUMNS: usize = 16;
pub const DISPLAY_ROWS: usize = 2;
pub const GLYPH_COLUMN: usize = DISPLAY_COLUMNS - 1;
pub const GLYPH_ROW: usize = 0;

/// Output side of the node: two LEDs, a buzzer and a 16x2 text display.
pub trait Indicators {
    fn set_leds(&mut self, leds: LedState);

    fn buzzer(&mut self, command: BuzzerCommand);

    fn render(&mut self, frame: &Frame);
}

pub fn led_state(level: AirQualityLevel) -> LedState {
    match level {
        AirQualityLevel::Good => LedState {
            green: true,
            red: false,
        },
        AirQualityLevel::Poor => LedState {
            green: false,
            red: true,
        },
        AirQualityLevel::Moderate | AirQualityLevel::Unknown => LedState::default(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuzzerGate {
    last_tone_ms: Option<u64>,
}

impl BuzzerGate {
    pub fn tick(
        &mut self,
        now_ms: u64,
        level: AirQualityLevel,
        config: &NodeConfig,
    ) -> BuzzerCommand {
        if level != AirQualityLevel::Poor {
            return BuzzerCommand::Silence;
        }

        let due = self
            .last_tone_ms
            .map(|last| now_ms.saturating_sub(last) >= config.beep_interval_ms)
            .unwrap_or(true);

        if !due {
            return BuzzerCommand::Hold;
        }

        self.last_tone_ms = Some(now_ms);
        BuzzerCommand::Tone {
            frequency_hz: config.beep_frequency_hz,
            duration_ms: config.beep_duration_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DisplayCycle {
    page: DisplayPage,
    last_switch_ms: u64,
}

impl DisplayCycle {
    pub fn new(now_ms: u64) -> Self {
        Self {
            page: DisplayPage::TempHumidity,
            last_switch_ms: now_ms,
        }
    }

    pub fn page(&self) -> DisplayPage {
        self.page
    }

    /// Flips the page once `interval_ms` has passed since the last flip.
    /// Returns whether the page changed.
    pub fn tick(&mut self, now_ms: u64, interval_ms: u64) -> bool {
        if now_ms.saturating_sub(self.last_switch_ms) < interval_ms {
            return false;
        }
        self.page = self.page.next();
        self.last_switch_ms = now_ms;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityGlyph {
    None,
    Warning,
    Error,
}

impl ConnectivityGlyph {
    pub fn from_state(state: &ConnectivityState) -> Self {
        if !state.backend_reachable() {
            Self::Error
        } else if state.consecutive_failures() > 0 {
            Self::Warning
        } else {
            Self::None
        }
    }

    pub fn symbol(self) -> Option<char> {
        match self {
            Self::None => None,
            Self::Warning => Some('!'),
            Self::Error => Some('X'),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    lines: [String; DISPLAY_ROWS],
}

impl Frame {
    pub fn new(top: &str, bottom: &str) -> Self {
        Self {
            lines: [fit_line(top), fit_line(bottom)],
        }
    }

    pub fn for_page(page: DisplayPage, reading: &Reading) -> Self {
        match page {
            DisplayPage::TempHumidity => Self::new(
                &format!("Temp: {:.1}C", reading.temperature_c),
                &format!("Hum:  {:.1}%", reading.humidity),
            ),
            DisplayPage::AirQuality => Self::new(
                &format!("AQ: {:.2}V", reading.air_quality_voltage),
                &format!("Level: {}", reading.air_quality_level.as_str()),
            ),
        }
    }

    pub fn connecting(ssid: &str) -> Self {
        Self::new("Connecting WiFi", ssid)
    }

    pub fn wifi_connected() -> Self {
        Self::new("WiFi connected", "")
    }

    pub fn wifi_failed() -> Self {
        Self::new("WiFi failed", "Retrying...")
    }

    pub fn with_glyph(mut self, glyph: ConnectivityGlyph) -> Self {
        if let Some(symbol) = glyph.symbol() {
            let line = &mut self.lines[GLYPH_ROW];
            let mut chars: Vec<char> = line.chars().collect();
            chars[GLYPH_COLUMN] = symbol;
            *line = chars.into_iter().collect();
        }
        self
    }

    pub fn lines(&self) -> &[String; DISPLAY_ROWS] {
        &self.lines
    }

    pub fn line(&self, row: usize) -> &str {
        self.lines[row].as_str()
    }
}

fn fit_line(text: &str) -> String {
    let mut line: String = text.chars().take(DISPLAY_COLUMNS).collect();
    let width = line.chars().count();
    line.extend(std::iter::repeat(' ').take(DISPLAY_COLUMNS - width));
    line
}
