use serde::{Deserialize, Serialize};

use crate::{endpoints::SENSOR_DATA_PATH, error::ConfigError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub sensor_interval_ms: u64,
    pub beep_interval_ms: u64,
    pub beep_duration_ms: u64,
    pub beep_frequency_hz: u32,
    pub display_switch_interval_ms: u64,
    pub max_consecutive_failures: u32,
    pub http_timeout_ms: u64,
    pub wifi_connect_attempts: u32,
    pub wifi_poll_interval_ms: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            sensor_interval_ms: 2_000,
            beep_interval_ms: 2_000,
            beep_duration_ms: 400,
            beep_frequency_hz: 2_000,
            display_switch_interval_ms: 4_000,
            max_consecutive_failures: 5,
            http_timeout_ms: 5_000,
            wifi_connect_attempts: 20,
            wifi_poll_interval_ms: 500,
        }
    }
}

/// Upper voltage bounds (inclusive) of the `Good` and `Moderate` bands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AirQualityThresholds {
    pub good_max_v: f32,
    pub moderate_max_v: f32,
}

impl Default for AirQualityThresholds {
    fn default() -> Self {
        Self {
            good_max_v: 1.0,
            moderate_max_v: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AdcScale {
    pub vref: f32,
    pub max_raw: u16,
}

impl Default for AdcScale {
    fn default() -> Self {
        Self {
            vref: 3.3,
            max_raw: 4095,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub server_url: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            server_url: format!("http://192.168.1.100:8000{SENSOR_DATA_PATH}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinConfig {
    pub dht_pin: i32,
    pub air_quality_adc_pin: i32,
    pub green_led_pin: i32,
    pub red_led_pin: i32,
    pub buzzer_pin: i32,
    pub i2c_sda_pin: i32,
    pub i2c_scl_pin: i32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            dht_pin: 4,
            air_quality_adc_pin: 34,
            green_led_pin: 25,
            red_led_pin: 26,
            buzzer_pin: 27,
            i2c_sda_pin: 21,
            i2c_scl_pin: 22,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub thresholds: AirQualityThresholds,
    #[serde(default)]
    pub adc: AdcScale,
    pub network: NetworkConfig,
    #[serde(default)]
    pub pins: PinConfig,
}

impl NodeConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        if self.sensor_interval_ms == 0 {
            self.sensor_interval_ms = defaults.sensor_interval_ms;
        }
        if self.beep_interval_ms == 0 {
            self.beep_interval_ms = defaults.beep_interval_ms;
        }
        if self.display_switch_interval_ms == 0 {
            self.display_switch_interval_ms = defaults.display_switch_interval_ms;
        }
        if self.http_timeout_ms == 0 {
            self.http_timeout_ms = defaults.http_timeout_ms;
        }
        if self.wifi_poll_interval_ms == 0 {
            self.wifi_poll_interval_ms = defaults.wifi_poll_interval_ms;
        }
        self.beep_frequency_hz = self.beep_frequency_hz.clamp(100, 10_000);
        self.max_consecutive_failures = self.max_consecutive_failures.max(1);
        self.wifi_connect_attempts = self.wifi_connect_attempts.max(1);
    }
}

impl AirQualityThresholds {
    pub fn sanitize(&mut self) {
        if !self.good_max_v.is_finite() || self.good_max_v <= 0.0 {
            self.good_max_v = Self::default().good_max_v;
        }
        if !self.moderate_max_v.is_finite() || self.moderate_max_v < self.good_max_v {
            self.moderate_max_v = self.good_max_v.max(Self::default().moderate_max_v);
        }
    }
}

impl AdcScale {
    pub fn sanitize(&mut self) {
        if !self.vref.is_finite() || self.vref <= 0.0 {
            self.vref = Self::default().vref;
        }
        if self.max_raw == 0 {
            self.max_raw = Self::default().max_raw;
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.server_url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingServerUrl);
        }
        crate::delivery::health_url(url).map(|_| ())
    }

    pub fn has_station_credentials(&self) -> bool {
        let ssid = self.wifi_ssid.trim();
        !ssid.is_empty() && ssid != "CHANGE_ME"
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.node.sanitize();
        self.thresholds.sanitize();
        self.adc.sanitize();
        self.network.server_url = self.network.server_url.trim().to_string();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_partial_runtime_json() {
        let raw = r#"{
            "network": {
                "wifi_ssid": "lab",
                "wifi_pass": "secret",
                "server_url": "http://10.0.0.5:8000/api/sensor-data"
            },
            "thresholds": { "good_max_v": 0.8, "moderate_max_v": 1.6 }
        }"#;

        let runtime: RuntimeConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(runtime.node, NodeConfig::default());
        assert_eq!(runtime.thresholds.good_max_v, 0.8);
        assert_eq!(runtime.network.wifi_ssid, "lab");
        assert_eq!(runtime.pins, PinConfig::default());
    }

    #[test]
    fn sanitize_repairs_zero_intervals_and_inverted_thresholds() {
        let mut runtime = RuntimeConfig::default();
        runtime.node.sensor_interval_ms = 0;
        runtime.node.wifi_poll_interval_ms = 0;
        runtime.node.max_consecutive_failures = 0;
        runtime.thresholds = AirQualityThresholds {
            good_max_v: 1.5,
            moderate_max_v: 0.5,
        };

        runtime.sanitize();

        assert_eq!(runtime.node.sensor_interval_ms, 2_000);
        assert_eq!(runtime.node.wifi_poll_interval_ms, 500);
        assert_eq!(runtime.node.max_consecutive_failures, 1);
        assert_eq!(runtime.thresholds.good_max_v, 1.5);
        assert_eq!(runtime.thresholds.moderate_max_v, 2.0);
    }

    #[test]
    fn validate_rejects_bad_server_urls() {
        let mut network = NetworkConfig::default();
        assert!(network.validate().is_ok());

        network.server_url = "192.168.1.100:8000/api/sensor-data".to_string();
        assert_eq!(network.validate(), Err(ConfigError::UnsupportedScheme));

        network.server_url = "  ".to_string();
        assert_eq!(network.validate(), Err(ConfigError::MissingServerUrl));
    }

    #[test]
    fn placeholder_ssid_is_not_a_credential() {
        let mut network = NetworkConfig::default();
        assert!(!network.has_station_credentials());

        network.wifi_ssid = "CHANGE_ME".to_string();
        assert!(!network.has_station_credentials());

        network.wifi_ssid = "lab".to_string();
        assert!(network.has_station_credentials());
    }
}
