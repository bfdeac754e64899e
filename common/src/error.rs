use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("server url is empty")]
    MissingServerUrl,
    #[error("server url must start with http:// or https://")]
    UnsupportedScheme,
    #[error("server url has no host")]
    MissingHost,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("climate sensor read failed: {0}")]
    Climate(String),
    #[error("climate sensor returned a non-finite value")]
    InvalidClimate,
    #[error("air quality adc read failed: {0}")]
    Adc(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("wifi credentials missing")]
    MissingCredentials,
    #[error("wifi driver error: {0}")]
    Driver(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Request(String),
}
