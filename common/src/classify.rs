use crate::{
    config::{AdcScale, AirQualityThresholds},
    types::AirQualityLevel,
};

impl AdcScale {
    pub fn to_voltage(&self, raw: u16) -> f32 {
        f32::from(raw) * (self.vref / f32::from(self.max_raw))
    }
}

/// Maps an air-quality voltage onto its band. Each band's upper bound is
/// inclusive, so a value sitting exactly on a threshold lands in the lower
/// category. There is no hysteresis.
pub fn classify(voltage: f32, thresholds: &AirQualityThresholds) -> AirQualityLevel {
    if !voltage.is_finite() {
        return AirQualityLevel::Unknown;
    }

    if voltage <= thresholds.good_max_v {
        AirQualityLevel::Good
    } else if voltage <= thresholds.moderate_max_v {
        AirQualityLevel::Moderate
    } else {
        AirQualityLevel::Poor
    }
}
