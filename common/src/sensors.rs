use log::warn;

use crate::{
    classify::classify,
    config::{AdcScale, AirQualityThresholds},
    error::SensorError,
    types::{Climate, Reading},
};

pub trait SensorSource {
    fn read_climate(&mut self) -> Result<Climate, SensorError>;

    fn read_air_quality_raw(&mut self) -> Result<u16, SensorError>;
}

/// Samples every sensor once. Faults never escape: a bad climate read zeroes
/// both temperature and humidity and a failed ADC conversion counts as raw 0.
pub fn acquire<S: SensorSource + ?Sized>(
    sensors: &mut S,
    scale: &AdcScale,
    thresholds: &AirQualityThresholds,
) -> Reading {
    let climate = sensors.read_climate().and_then(|climate| {
        if climate.temperature_c.is_finite() && climate.humidity.is_finite() {
            Ok(climate)
        } else {
            Err(SensorError::InvalidClimate)
        }
    });

    let climate = climate.unwrap_or_else(|err| {
        warn!("{err}; using 0.0 for temperature and humidity");
        Climate {
            temperature_c: 0.0,
            humidity: 0.0,
        }
    });

    let raw = sensors.read_air_quality_raw().unwrap_or_else(|err| {
        warn!("{err}; using raw 0");
        0
    });

    let voltage = scale.to_voltage(raw);

    Reading {
        temperature_c: climate.temperature_c,
        humidity: climate.humidity,
        air_quality_voltage: voltage,
        air_quality_level: classify(voltage, thresholds),
    }
}
