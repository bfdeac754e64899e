use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AirQualityLevel {
    Good,
    Moderate,
    Poor,
    #[default]
    Unknown,
}

impl AirQualityLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::Poor => "Poor",
            Self::Unknown => "Unknown",
        }
    }
}

/// One sample of the node's sensors plus the derived category.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    pub temperature_c: f32,
    pub humidity: f32,
    pub air_quality_voltage: f32,
    pub air_quality_level: AirQualityLevel,
}

impl Reading {
    pub fn payload(&self) -> ReadingPayload {
        ReadingPayload {
            temperature: self.temperature_c,
            humidity: self.humidity,
            air_quality_voltage: self.air_quality_voltage,
            air_quality_level: self.air_quality_level,
        }
    }
}

/// Body of `POST /api/sensor-data`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadingPayload {
    pub temperature: f32,
    pub humidity: f32,
    #[serde(rename = "airQualityVoltage")]
    pub air_quality_voltage: f32,
    #[serde(rename = "airQualityLevel")]
    pub air_quality_level: AirQualityLevel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    pub temperature_c: f32,
    pub humidity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedState {
    pub green: bool,
    pub red: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuzzerCommand {
    Tone { frequency_hz: u32, duration_ms: u64 },
    Hold,
    Silence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayPage {
    #[default]
    TempHumidity,
    AirQuality,
}

impl DisplayPage {
    pub fn next(self) -> Self {
        match self {
            Self::TempHumidity => Self::AirQuality,
            Self::AirQuality => Self::TempHumidity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
        }
    }
}
