use serde::{Deserialize, Serialize};

pub mod envelope;

/// One point-in-time set of hardware telemetry readings.
///
/// Field names follow the producer's JSON payload and must round-trip
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareSnapshot {
    pub cpu_temp_tctl: f64,
    pub cpu_temp_ccd1: f64,
    pub cpu_power: f64,
    pub gpu_temp: f64,
    pub gpu_power: f64,
    pub pc_name: String,
    /// Unix epoch seconds, assigned by the producer.
    pub timestamp: i64,
}
