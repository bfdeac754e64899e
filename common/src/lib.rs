pub mod classify;
pub mod config;
pub mod connectivity;
pub mod delivery;
pub mod endpoints;
pub mod error;
pub mod indicators;
pub mod node;
pub mod sensors;
pub mod types;

#[cfg(test)]
mod testing;

pub use classify::classify;
pub use config::{
    AdcScale, AirQualityThresholds, NetworkConfig, NodeConfig, PinConfig, RuntimeConfig,
};
pub use connectivity::{associate, ConnectivityState, WifiLink};
pub use delivery::{health_url, DeliveryClient, Transport};
pub use endpoints::*;
pub use error::{ConfigError, LinkError, SensorError, TransportError};
pub use indicators::{
    led_state, BuzzerGate, ConnectivityGlyph, DisplayCycle, Frame, Indicators, DISPLAY_COLUMNS,
    DISPLAY_ROWS,
};
pub use node::{Hardware, Node};
pub use sensors::{acquire, SensorSource};
pub use types::{
    AirQualityLevel, BuzzerCommand, Climate, DisplayPage, LedState, LinkState, Reading,
    ReadingPayload,
};
