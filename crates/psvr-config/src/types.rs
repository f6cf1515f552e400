use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sampling and compensation tunables.
    pub tracking: TrackingConfig,
    /// Drift compensation carried across runs.
    pub velocity: VelocityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Upper bound on one blocking HID read. Must be positive; it bounds
    /// how long closing the device can take.
    pub read_timeout_ms: u64,
    /// Pause between reads, in microseconds.
    pub poll_interval_us: u64,
    /// How often to retry opening the headset while it is not connected.
    pub reopen_interval_ms: u64,
    /// Resets closer together than this do not update the bias.
    pub min_compensation_interval_ms: u64,
    /// Weight of each per-reset drift estimate (0.0-1.0). Lower = slower, steadier convergence.
    pub compensation_smoothing: f64,
    /// Length of an exclusive calibration capture.
    pub calibration_window_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 20,
            poll_interval_us: 500,
            reopen_interval_ms: 2000,
            min_compensation_interval_ms: 1000,
            compensation_smoothing: 0.3,
            calibration_window_ms: 20_000,
        }
    }
}

/// Per-axis velocity bias in degrees per millisecond.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}
