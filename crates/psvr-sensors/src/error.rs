use thiserror::Error;

/// Failures opening or driving the sensor session.
///
/// Per-report read failures never surface here; the acquisition loop drops
/// them silently.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("HID API error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("No PSVR sensor interface found")]
    NotFound,

    #[error("Read timeout must be between 1ms and {max_ms}ms, got {actual_ms}ms")]
    InvalidTimeout { max_ms: u128, actual_ms: u128 },

    #[error("Invalid drift compensation settings: {0}")]
    InvalidCompensation(&'static str),

    #[error("Failed to spawn acquisition thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Misuse of the exclusive calibration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CalibrationError {
    #[error("A calibration session is already running")]
    AlreadyRunning,

    #[error("No calibration session to cancel")]
    NotRunning,
}
