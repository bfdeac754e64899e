use std::time::Duration;

use log::{debug, info, warn};

use crate::{
    config::NodeConfig,
    connectivity::ConnectivityState,
    endpoints::HEALTH_PATH,
    error::{ConfigError, TransportError},
    types::Reading,
};

/// Blocking HTTP seam. Implementations must honour `timeout` and report the
/// response status; a missing status is a `TransportError`.
pub trait Transport {
    fn post_json(
        &mut self,
        url: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<u16, TransportError>;

    fn get(&mut self, url: &str, timeout: Duration) -> Result<u16, TransportError>;
}

/// Derives the backend health URL from the sensor-data endpoint. The health
/// surface lives at the server root, so only scheme and authority are kept.
pub fn health_url(server_url: &str) -> Result<String, ConfigError> {
    let url = server_url.trim();
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or(ConfigError::UnsupportedScheme)?;

    let scheme = &url[..url.len() - rest.len()];
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if authority.is_empty() {
        return Err(ConfigError::MissingHost);
    }

    Ok(format!("{scheme}{authority}{HEALTH_PATH}"))
}

#[derive(Debug, Clone)]
pub struct DeliveryClient {
    endpoint: String,
    health_url: String,
    timeout: Duration,
    max_failures: u32,
}

impl DeliveryClient {
    pub fn new(server_url: &str, config: &NodeConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: server_url.trim().to_string(),
            health_url: health_url(server_url)?,
            timeout: Duration::from_millis(config.http_timeout_ms),
            max_failures: config.max_consecutive_failures,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts one reading and updates the failure bookkeeping. Only HTTP 200
    /// counts as delivered. Never retries and never returns an error.
    pub fn deliver<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        reading: &Reading,
        state: &mut ConnectivityState,
    ) -> bool {
        let body = match serde_json::to_vec(&reading.payload()) {
            Ok(body) => body,
            Err(err) => {
                warn!("reading serialization failed: {err}");
                return false;
            }
        };

        let failure = match transport.post_json(&self.endpoint, &body, self.timeout) {
            Ok(200) => {
                state.record_success();
                debug!("reading delivered to {}", self.endpoint);
                return true;
            }
            Ok(status) => format!("HTTP {status}"),
            Err(err) => err.to_string(),
        };

        let dropped = state.record_failure(self.max_failures);
        warn!(
            "delivery failed ({failure}); {} consecutive failure(s)",
            state.consecutive_failures()
        );
        if dropped {
            warn!(
                "backend marked unreachable after {} consecutive failures",
                state.consecutive_failures()
            );
        }
        false
    }

    /// One-off reachability check. Any HTTP status means the backend answered;
    /// only a transport failure marks it unreachable.
    pub fn probe<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        state: &mut ConnectivityState,
    ) -> bool {
        let reachable = match transport.get(&self.health_url, self.timeout) {
            Ok(status) => {
                info!("backend health probe answered HTTP {status}");
                true
            }
            Err(err) => {
                warn!("backend health probe failed: {err}");
                false
            }
        };
        state.record_probe(reachable);
        reachable
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{testing::ScriptedTransport, types::AirQualityLevel};

    fn client() -> DeliveryClient {
        DeliveryClient::new(
            "http://192.168.1.100:8000/api/sensor-data",
            &NodeConfig::default(),
        )
        .unwrap()
    }

    fn reading() -> Reading {
        Reading {
            temperature_c: 22.5,
            humidity: 48.0,
            air_quality_voltage: 1.5,
            air_quality_level: AirQualityLevel::Moderate,
        }
    }

    #[test]
    fn derives_health_url_from_endpoint() {
        assert_eq!(
            health_url("http://192.168.1.100:8000/api/sensor-data").unwrap(),
            "http://192.168.1.100:8000/health"
        );
        assert_eq!(
            health_url("https://vayu.example.com").unwrap(),
            "https://vayu.example.com/health"
        );
        assert_eq!(health_url("http://host?x=1").unwrap(), "http://host/health");
        assert_eq!(health_url("ftp://host/"), Err(ConfigError::UnsupportedScheme));
        assert_eq!(health_url("http:///api"), Err(ConfigError::MissingHost));
    }

    #[test]
    fn posts_fixed_json_shape() {
        let mut transport = ScriptedTransport::new();
        transport.push_post(Ok(200));
        let mut state = ConnectivityState::default();

        assert!(client().deliver(&mut transport, &reading(), &mut state));

        let (url, body, timeout) = transport.posts[0].clone();
        assert_eq!(url, "http://192.168.1.100:8000/api/sensor-data");
        assert_eq!(timeout, Duration::from_secs(5));

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "temperature": 22.5,
                "humidity": 48.0,
                "airQualityVoltage": 1.5,
                "airQualityLevel": "Moderate",
            })
        );
    }

    #[test]
    fn success_resets_counter_and_marks_reachable() {
        let mut transport = ScriptedTransport::new();
        transport.push_post(Ok(500));
        transport.push_post(Ok(200));
        let mut state = ConnectivityState::default();
        let client = client();

        assert!(!client.deliver(&mut transport, &reading(), &mut state));
        assert_eq!(state.consecutive_failures(), 1);

        assert!(client.deliver(&mut transport, &reading(), &mut state));
        assert_eq!(state.consecutive_failures(), 0);
        assert!(state.backend_reachable());
    }

    #[test]
    fn non_200_success_codes_count_as_failures() {
        let mut transport = ScriptedTransport::new();
        transport.push_post(Ok(201));
        transport.push_post(Ok(204));
        let mut state = ConnectivityState::default();
        let client = client();

        assert!(!client.deliver(&mut transport, &reading(), &mut state));
        assert!(!client.deliver(&mut transport, &reading(), &mut state));
        assert_eq!(state.consecutive_failures(), 2);
    }

    #[test]
    fn five_transport_errors_drop_reachability() {
        let mut transport = ScriptedTransport::new();
        transport.push_post(Ok(200));
        for _ in 0..6 {
            transport.push_post(Err(TransportError::Timeout));
        }
        let mut state = ConnectivityState::default();
        let client = client();

        assert!(client.deliver(&mut transport, &reading(), &mut state));
        for attempt in 1..=4 {
            assert!(!client.deliver(&mut transport, &reading(), &mut state));
            assert!(state.backend_reachable(), "attempt {attempt}");
        }
        assert!(!client.deliver(&mut transport, &reading(), &mut state));
        assert!(!state.backend_reachable());

        assert!(!client.deliver(&mut transport, &reading(), &mut state));
        assert!(!state.backend_reachable());
        assert_eq!(state.consecutive_failures(), 6);
    }

    #[test]
    fn probe_treats_any_status_as_reachable() {
        let mut transport = ScriptedTransport::new();
        transport.push_get(Ok(503));
        let mut state = ConnectivityState::default();

        assert!(client().probe(&mut transport, &mut state));
        assert!(state.backend_reachable());
        assert_eq!(transport.gets[0].0, "http://192.168.1.100:8000/health");
    }

    #[test]
    fn probe_transport_error_is_unreachable() {
        let mut transport = ScriptedTransport::new();
        transport.push_get(Err(TransportError::Connect("refused".to_string())));
        let mut state = ConnectivityState::default();
        state.record_probe(true);

        assert!(!client().probe(&mut transport, &mut state));
        assert!(!state.backend_reachable());
        assert_eq!(state.consecutive_failures(), 0);
    }
}
