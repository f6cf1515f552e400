pub mod acquisition;
pub mod calibration;
pub mod error;
pub mod hid;
pub mod locator;
pub mod matrix;
pub mod protocol;
pub mod tracking;
pub mod types;

pub use error::{CalibrationError, SensorError};
pub use hid::{HidApiBackend, HidBackend, ReportSource};
pub use tracking::CompensationSettings;
pub use types::*;

use acquisition::LoopTiming;
use glam::Mat4;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracking::{lock, SharedState, TrackingState};

/// Longest allowed blocking read. Bounds shutdown latency.
pub const MAX_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Tunables for one tracking session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingSettings {
    pub read_timeout: Duration,
    pub poll_interval: Duration,
    pub compensation: CompensationSettings,
    /// Bias restored from the previous run.
    pub initial_velocity: VelocityBias,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(20),
            poll_interval: Duration::from_micros(500),
            compensation: CompensationSettings::default(),
            initial_velocity: VelocityBias::ZERO,
        }
    }
}

impl TrackingSettings {
    fn validate(&self) -> Result<(), SensorError> {
        if self.read_timeout.is_zero() || self.read_timeout > MAX_READ_TIMEOUT {
            return Err(SensorError::InvalidTimeout {
                max_ms: MAX_READ_TIMEOUT.as_millis(),
                actual_ms: self.read_timeout.as_millis(),
            });
        }
        let compensation = &self.compensation;
        if compensation.min_interval.is_zero() {
            return Err(SensorError::InvalidCompensation(
                "minimum reset interval must be positive",
            ));
        }
        if !(compensation.smoothing > 0.0 && compensation.smoothing < 1.0) {
            return Err(SensorError::InvalidCompensation(
                "smoothing factor must be between 0 and 1 exclusive",
            ));
        }
        Ok(())
    }
}

/// Running acquisition thread and its stop flag.
struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Box<dyn ReportSource>>,
}

/// Head tracking session for the PSVR sensor interface.
///
/// Owns the HID connection and the acquisition thread, and is the entry
/// point for the renderer (matrix snapshots) and the UI (resets, bias
/// persistence, calibration). Orientation state outlives individual
/// connections; the bias carries over a reopen.
pub struct PsvrSensors {
    backend: Box<dyn HidBackend>,
    settings: TrackingSettings,
    state: SharedState,
    changed: Arc<watch::Sender<()>>,
    worker: Option<Worker>,
}

impl PsvrSensors {
    pub fn new(backend: Box<dyn HidBackend>, settings: TrackingSettings) -> Self {
        let (changed, _) = watch::channel(());
        Self {
            backend,
            state: TrackingState::shared(settings.initial_velocity, settings.compensation),
            settings,
            changed: Arc::new(changed),
            worker: None,
        }
    }

    /// Every attached PSVR interface, for a device picker.
    pub fn list_devices(&mut self) -> Result<Vec<DeviceEntry>, SensorError> {
        locator::list_devices(self.backend.as_mut())
    }

    /// Locate the sensor interface, open it and start sampling.
    ///
    /// Any previous session is closed first. [`SensorError::NotFound`] is
    /// the normal result while the headset is unplugged; callers retry.
    pub fn open_device(&mut self) -> Result<(), SensorError> {
        self.close_device();
        let path = locator::locate_sensor(self.backend.as_mut())?.ok_or(SensorError::NotFound)?;
        self.open_path(&path)
    }

    /// Open a specific HID path and start sampling.
    pub fn open_path(&mut self, path: &str) -> Result<(), SensorError> {
        self.close_device();
        self.settings.validate()?;

        let source = self.backend.open_path(path)?;
        tracing::info!(%path, "Opened PSVR sensor interface");

        let stop = Arc::new(AtomicBool::new(false));
        let timing = LoopTiming {
            read_timeout: self.settings.read_timeout,
            poll_interval: self.settings.poll_interval,
        };
        let handle = {
            let state = Arc::clone(&self.state);
            let stop = Arc::clone(&stop);
            let changed = Arc::clone(&self.changed);
            std::thread::Builder::new()
                .name("psvr-acquisition".into())
                .spawn(move || acquisition::run(source, state, stop, changed, timing))
                .map_err(SensorError::Spawn)?
        };

        self.worker = Some(Worker { stop, handle });
        Ok(())
    }

    /// Stop the acquisition thread, join it, then close the device.
    /// Does nothing when already closed.
    pub fn close_device(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.stop.store(true, Ordering::Release);
        match worker.handle.join() {
            Ok(source) => drop(source),
            Err(_) => tracing::error!("Acquisition thread panicked"),
        }
        tracing::info!("Closed PSVR sensor interface");
    }

    pub fn is_open(&self) -> bool {
        self.worker.is_some()
    }

    /// Receiver pinged after every integrated sample.
    pub fn subscribe(&self) -> watch::Receiver<()> {
        self.changed.subscribe()
    }

    /// Rotation for the renderer from the current angle snapshot.
    pub fn model_view_matrix(&self) -> Mat4 {
        let angles = self.angles();
        matrix::model_view_matrix(angles)
    }

    pub fn angles(&self) -> Angles {
        lock(&self.state).angles()
    }

    /// Most recent decoded accelerometer reading.
    pub fn last_sample(&self) -> Option<RawSample> {
        lock(&self.state).last_sample()
    }

    /// Zero the view at the current head pose, optionally refining the bias
    /// from the drift accumulated since the previous reset.
    pub fn reset_view(&self, apply_compensation: bool) -> ResetOutcome {
        let outcome = lock(&self.state).reset_view(apply_compensation, Instant::now());
        match outcome {
            ResetOutcome::Compensated {
                elapsed_ms,
                velocity,
            } => tracing::info!(
                elapsed_ms,
                x = velocity.x,
                y = velocity.y,
                z = velocity.z,
                "View reset with drift compensation"
            ),
            _ => tracing::info!(?outcome, "View reset"),
        }
        outcome
    }

    pub fn velocity(&self) -> VelocityBias {
        lock(&self.state).velocity()
    }

    pub fn set_velocity(&self, velocity: VelocityBias) {
        lock(&self.state).set_velocity(velocity);
        tracing::debug!(?velocity, "Velocity bias set");
    }

    /// Begin an exclusive calibration. The headset should lie still for the
    /// whole window.
    pub fn start_calibration(&self) -> Result<(), CalibrationError> {
        lock(&self.state).start_calibration(Instant::now())?;
        tracing::info!(
            window_ms = self.settings.compensation.calibration_window.as_millis() as u64,
            "Calibration started"
        );
        Ok(())
    }

    /// Discard a running calibration and restore the previous bias.
    pub fn cancel_calibration(&self) -> Result<(), CalibrationError> {
        lock(&self.state).cancel_calibration()?;
        tracing::info!("Calibration cancelled");
        Ok(())
    }

    pub fn calibration_state(&self) -> CalibrationState {
        lock(&self.state).poll_calibration(Instant::now())
    }

    pub fn is_calibration_completed(&self) -> bool {
        self.calibration_state() == CalibrationState::Completed
    }

    /// Bias from a calibration that completed since the last call, if any.
    /// Each completion is handed out once.
    pub fn take_completed_calibration(&self) -> Option<VelocityBias> {
        lock(&self.state).take_completed_calibration(Instant::now())
    }

    /// Fraction of the calibration window elapsed, while one is running.
    pub fn calibration_progress(&self) -> Option<f64> {
        lock(&self.state).calibration_progress(Instant::now())
    }
}

impl Drop for PsvrSensors {
    fn drop(&mut self) {
        self.close_device();
    }
}
