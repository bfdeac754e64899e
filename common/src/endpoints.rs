pub const SENSOR_DATA_PATH: &str = "/api/sensor-data";
pub const HEALTH_PATH: &str = "/health";
