use glam::DVec3;
use std::time::Duration;

/// Cumulative rotation per axis since the last view reset, in degrees.
pub type Angles = DVec3;

/// Drift compensation rate subtracted from every sample, in degrees per millisecond.
pub type VelocityBias = DVec3;

/// Accelerometer reading decoded from one sensor report.
///
/// Each axis is the sum of the two redundant sub-sensors the headset reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// HID device as seen by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    /// USB interface number, or -1 when the platform does not report one.
    pub interface_number: i32,
    pub product: Option<String>,
}

/// Phase of the exclusive calibration session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CalibrationState {
    #[default]
    Idle,
    Running,
    Completed,
}

/// What a view reset did to the drift compensation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResetOutcome {
    /// First reset: only the baseline timestamp was recorded.
    Baseline,
    /// Angles zeroed, bias untouched.
    Zeroed { elapsed_ms: f64 },
    /// Angles zeroed after blending the observed drift into the bias.
    Compensated {
        elapsed_ms: f64,
        velocity: VelocityBias,
    },
}

/// Duration as fractional milliseconds, at microsecond resolution.
pub(crate) fn millis(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}
