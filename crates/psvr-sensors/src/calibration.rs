use crate::error::CalibrationError;
use crate::types::{millis, CalibrationState, VelocityBias};
use glam::DVec3;
use std::time::{Duration, Instant};

/// Exclusive, timed observation of raw drift.
///
/// While running, the unbiased rotation of every sample is summed per axis,
/// counting only the part of each sample interval that falls inside the
/// window. Once the window has elapsed the total is divided by the window
/// length and the result replaces the velocity bias outright. A window that
/// saw no samples at all (device closed or unplugged) ends without touching
/// the bias.
#[derive(Debug)]
pub struct CalibrationSession {
    phase: Phase,
    window: Duration,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Running {
        started: Instant,
        drift: DVec3,
        /// Sample time inside the window, in ms.
        observed_ms: f64,
        /// Bias in effect when the session started, restored on cancel or
        /// when the window closes without samples.
        previous_velocity: VelocityBias,
    },
    Completed,
}

impl CalibrationSession {
    pub fn new(window: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            window: window.max(Duration::from_millis(1)),
        }
    }

    pub fn state(&self) -> CalibrationState {
        match self.phase {
            Phase::Idle => CalibrationState::Idle,
            Phase::Running { .. } => CalibrationState::Running,
            Phase::Completed => CalibrationState::Completed,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Drift accumulated so far by a running session.
    pub fn drift(&self) -> Option<DVec3> {
        match self.phase {
            Phase::Running { drift, .. } => Some(drift),
            _ => None,
        }
    }

    pub fn start(&mut self, now: Instant, velocity: VelocityBias) -> Result<(), CalibrationError> {
        if let Phase::Running { .. } = self.phase {
            return Err(CalibrationError::AlreadyRunning);
        }
        self.phase = Phase::Running {
            started: now,
            drift: DVec3::ZERO,
            observed_ms: 0.0,
            previous_velocity: velocity,
        };
        Ok(())
    }

    /// Abandon the session.
    ///
    /// Returns the bias to restore when a running session was discarded, or
    /// `None` when acknowledging an already completed one.
    pub fn cancel(&mut self) -> Result<Option<VelocityBias>, CalibrationError> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Running {
                previous_velocity, ..
            } => Ok(Some(previous_velocity)),
            Phase::Completed => Ok(None),
            Phase::Idle => Err(CalibrationError::NotRunning),
        }
    }

    /// Add one sample: unbiased `rate` held for the `elapsed_ms` ending at
    /// `now`. Returns the bias to install if this sample closed the window.
    pub fn observe(&mut self, rate: DVec3, elapsed_ms: f64, now: Instant) -> Option<VelocityBias> {
        let window_ms = millis(self.window);
        if let Phase::Running {
            started,
            drift,
            observed_ms,
            ..
        } = &mut self.phase
        {
            let end = millis(now.saturating_duration_since(*started));
            let begin = end - elapsed_ms;
            let inside = end.min(window_ms) - begin.max(0.0);
            if inside > 0.0 {
                *drift += rate * inside;
                *observed_ms += inside;
            }
        }
        self.poll(now)
    }

    /// End the session if its window has elapsed.
    ///
    /// Returns the bias to install: the calibrated one, or the bias from
    /// before the session when no sample was observed.
    pub fn poll(&mut self, now: Instant) -> Option<VelocityBias> {
        let Phase::Running {
            started,
            drift,
            observed_ms,
            previous_velocity,
        } = self.phase
        else {
            return None;
        };
        if now.saturating_duration_since(started) < self.window {
            return None;
        }
        let window_ms = self.window.as_millis() as u64;

        if observed_ms <= 0.0 {
            self.phase = Phase::Idle;
            tracing::warn!(window_ms, "Calibration window saw no samples, bias unchanged");
            return Some(previous_velocity);
        }

        let velocity = drift / millis(self.window);
        self.phase = Phase::Completed;
        tracing::info!(
            x = velocity.x,
            y = velocity.y,
            z = velocity.z,
            window_ms,
            observed_ms,
            "Calibration complete"
        );
        Some(velocity)
    }

    /// Fraction of the window elapsed, while running.
    pub fn progress(&self, now: Instant) -> Option<f64> {
        match self.phase {
            Phase::Running { started, .. } => {
                let elapsed = millis(now.saturating_duration_since(started));
                Some((elapsed / millis(self.window)).min(1.0))
            }
            _ => None,
        }
    }
}
