//! Shared orientation state and drift compensation.
//!
//! A single [`TrackingState`] behind one mutex holds the angle triple, the
//! velocity bias, the reset timestamp and the calibration session. The
//! acquisition thread and every consumer go through the same lock, so a view
//! reset can never lose an integration step that races it.

use crate::calibration::CalibrationSession;
use crate::error::CalibrationError;
use crate::types::{millis, Angles, CalibrationState, RawSample, ResetOutcome, VelocityBias};
use glam::DVec3;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Minimum time between resets before drift is blended into the bias.
pub const MIN_COMPENSATION_INTERVAL: Duration = Duration::from_millis(1000);

/// Weight of each new drift estimate in the blended bias.
pub const COMPENSATION_SMOOTHING: f64 = 0.3;

/// Observation window of an exclusive calibration session.
pub const CALIBRATION_WINDOW: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompensationSettings {
    /// Resets closer together than this leave the bias alone.
    pub min_interval: Duration,
    /// Fraction of the per-reset drift estimate added to the bias.
    pub smoothing: f64,
    pub calibration_window: Duration,
}

impl Default for CompensationSettings {
    fn default() -> Self {
        Self {
            min_interval: MIN_COMPENSATION_INTERVAL,
            smoothing: COMPENSATION_SMOOTHING,
            calibration_window: CALIBRATION_WINDOW,
        }
    }
}

pub type SharedState = Arc<Mutex<TrackingState>>;

/// Lock the shared state. The guarded values are plain numbers that are
/// valid after any partial update, so a poisoned lock is recovered.
pub fn lock(state: &Mutex<TrackingState>) -> MutexGuard<'_, TrackingState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct TrackingState {
    angles: Angles,
    velocity: VelocityBias,
    last_reset: Option<Instant>,
    last_sample: Option<RawSample>,
    min_interval: Duration,
    smoothing: f64,
    calibration: CalibrationSession,
}

impl TrackingState {
    pub fn new(velocity: VelocityBias, settings: CompensationSettings) -> Self {
        Self {
            angles: Angles::ZERO,
            velocity,
            last_reset: None,
            last_sample: None,
            min_interval: settings.min_interval,
            smoothing: settings.smoothing,
            calibration: CalibrationSession::new(settings.calibration_window),
        }
    }

    pub fn shared(velocity: VelocityBias, settings: CompensationSettings) -> SharedState {
        Arc::new(Mutex::new(Self::new(velocity, settings)))
    }

    pub fn angles(&self) -> Angles {
        self.angles
    }

    pub fn velocity(&self) -> VelocityBias {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: VelocityBias) {
        self.velocity = velocity;
    }

    pub fn last_sample(&self) -> Option<RawSample> {
        self.last_sample
    }

    /// First sample after the loop (re)started: no interval to integrate
    /// over yet, so only zero the view.
    pub fn seed(&mut self, sample: RawSample, now: Instant) -> ResetOutcome {
        self.last_sample = Some(sample);
        self.reset_view(false, now)
    }

    /// Integrate one sample's rate over `elapsed_ms`.
    ///
    /// `rate` is the unbiased angular rate; the current bias is subtracted
    /// here. A running calibration sees the unbiased rate. Returns the bias
    /// installed when this sample closed a calibration window.
    pub fn accumulate(
        &mut self,
        sample: RawSample,
        rate: DVec3,
        elapsed_ms: f64,
        now: Instant,
    ) -> Option<VelocityBias> {
        self.last_sample = Some(sample);
        self.angles += (rate - self.velocity) * elapsed_ms;

        let completed = self.calibration.observe(rate, elapsed_ms, now);
        if let Some(velocity) = completed {
            self.velocity = velocity;
        }
        completed
    }

    /// Zero the view, optionally blending the drift seen since the previous
    /// reset into the bias.
    pub fn reset_view(&mut self, apply_compensation: bool, now: Instant) -> ResetOutcome {
        let Some(last_reset) = self.last_reset.replace(now) else {
            self.angles = Angles::ZERO;
            return ResetOutcome::Baseline;
        };

        let elapsed = now.saturating_duration_since(last_reset);
        let elapsed_ms = millis(elapsed);

        // Blending is suspended while a calibration owns the bias.
        let blend = apply_compensation
            && elapsed >= self.min_interval
            && elapsed_ms > 0.0
            && self.calibration.state() != CalibrationState::Running;

        let outcome = if blend {
            let extra_velocity = self.angles / elapsed_ms;
            self.velocity += extra_velocity * self.smoothing;
            ResetOutcome::Compensated {
                elapsed_ms,
                velocity: self.velocity,
            }
        } else {
            ResetOutcome::Zeroed { elapsed_ms }
        };

        self.angles = Angles::ZERO;
        outcome
    }

    pub fn start_calibration(&mut self, now: Instant) -> Result<(), CalibrationError> {
        self.calibration.start(now, self.velocity)
    }

    pub fn cancel_calibration(&mut self) -> Result<(), CalibrationError> {
        if let Some(previous) = self.calibration.cancel()? {
            self.velocity = previous;
        }
        Ok(())
    }

    /// Current calibration phase, completing the session first if its
    /// window has run out.
    pub fn poll_calibration(&mut self, now: Instant) -> CalibrationState {
        if let Some(velocity) = self.calibration.poll(now) {
            self.velocity = velocity;
        }
        self.calibration.state()
    }

    /// Hand out the bias of a completed calibration once, returning the
    /// session to idle.
    pub fn take_completed_calibration(&mut self, now: Instant) -> Option<VelocityBias> {
        if self.poll_calibration(now) != CalibrationState::Completed {
            return None;
        }
        // Completed sessions acknowledge without touching the bias.
        self.calibration.cancel().ok()?;
        Some(self.velocity)
    }

    pub fn calibration_progress(&self, now: Instant) -> Option<f64> {
        self.calibration.progress(now)
    }

    pub fn calibration_drift(&self) -> Option<DVec3> {
        self.calibration.drift()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::model_view_matrix;
    use std::thread;

    const EPS: f64 = 1e-9;

    fn assert_close(a: DVec3, b: DVec3) {
        assert!((a - b).abs().max_element() < EPS, "{a:?} != {b:?}");
    }

    fn state_with(velocity: DVec3) -> TrackingState {
        TrackingState::new(velocity, CompensationSettings::default())
    }

    /// Put the state past its baseline reset, holding `angles`.
    fn primed(velocity: DVec3, angles: DVec3, t0: Instant) -> TrackingState {
        let mut state = state_with(velocity);
        assert_eq!(state.reset_view(true, t0), ResetOutcome::Baseline);
        state.angles = angles;
        state
    }

    #[test]
    fn accumulate_subtracts_bias() {
        let t0 = Instant::now();
        let mut state = state_with(DVec3::new(0.01, 0.0, -0.01));
        state.accumulate(RawSample::default(), DVec3::new(0.02, 0.03, 0.0), 10.0, t0);
        assert_close(state.angles(), DVec3::new(0.1, 0.3, 0.1));
    }

    #[test]
    fn zero_rate_zero_bias_stays_put() {
        let t0 = Instant::now();
        let mut state = state_with(DVec3::ZERO);
        state.accumulate(RawSample::default(), DVec3::ZERO, 1000.0, t0);
        assert_eq!(state.angles(), DVec3::ZERO);
    }

    #[test]
    fn first_reset_records_baseline_only() {
        let velocity = DVec3::new(0.001, 0.002, 0.003);
        let mut state = state_with(velocity);
        state.angles = DVec3::splat(45.0);
        assert_eq!(state.reset_view(true, Instant::now()), ResetOutcome::Baseline);
        assert_eq!(state.angles(), DVec3::ZERO);
        assert_eq!(state.velocity(), velocity);
    }

    #[test]
    fn reset_without_compensation_keeps_bias() {
        let t0 = Instant::now();
        let velocity = DVec3::new(0.001, -0.002, 0.0);
        for elapsed in [Duration::ZERO, Duration::from_millis(10), Duration::from_secs(60)] {
            let mut state = primed(velocity, DVec3::new(12.0, -3.0, 7.5), t0);
            assert!(matches!(
                state.reset_view(false, t0 + elapsed),
                ResetOutcome::Zeroed { .. }
            ));
            assert_eq!(state.angles(), DVec3::ZERO);
            assert_eq!(state.velocity(), velocity);
        }
    }

    #[test]
    fn reset_below_threshold_keeps_bias() {
        let t0 = Instant::now();
        let velocity = DVec3::new(0.001, -0.002, 0.0);
        let mut state = primed(velocity, DVec3::new(12.0, -3.0, 7.5), t0);
        let outcome = state.reset_view(true, t0 + MIN_COMPENSATION_INTERVAL - Duration::from_millis(1));
        assert_eq!(outcome, ResetOutcome::Zeroed { elapsed_ms: 999.0 });
        assert_eq!(state.angles(), DVec3::ZERO);
        assert_eq!(state.velocity(), velocity);
    }

    #[test]
    fn reset_blends_drift_into_bias() {
        let t0 = Instant::now();
        let velocity = DVec3::new(0.001, -0.002, 0.0);
        let angles = DVec3::new(12.0, -3.0, 7.5);
        let mut state = primed(velocity, angles, t0);

        let outcome = state.reset_view(true, t0 + Duration::from_millis(4000));

        let expected = velocity + (angles / 4000.0) * COMPENSATION_SMOOTHING;
        assert_eq!(
            outcome,
            ResetOutcome::Compensated {
                elapsed_ms: 4000.0,
                velocity: expected
            }
        );
        assert_eq!(state.velocity(), expected);
        assert_eq!(state.angles(), DVec3::ZERO);
    }

    #[test]
    fn reset_exactly_at_threshold_blends() {
        let t0 = Instant::now();
        let mut state = primed(DVec3::ZERO, DVec3::new(1.0, 0.0, 0.0), t0);
        let outcome = state.reset_view(true, t0 + MIN_COMPENSATION_INTERVAL);
        assert!(matches!(outcome, ResetOutcome::Compensated { .. }));
        assert_close(state.velocity(), DVec3::new(0.0003, 0.0, 0.0));
    }

    #[test]
    fn repeated_resets_converge_gradually() {
        let t0 = Instant::now();
        let true_drift = 0.002;
        let mut state = primed(DVec3::ZERO, DVec3::ZERO, t0);
        let mut previous_error = true_drift;
        for i in 1..=10u32 {
            // Ten seconds of residual drift after the current bias.
            state.angles = DVec3::splat((true_drift - state.velocity().x) * 10_000.0);
            state.reset_view(true, t0 + Duration::from_secs(10) * i);
            let error = (true_drift - state.velocity().x).abs();
            assert!(error < previous_error);
            assert!(state.velocity().x <= true_drift);
            previous_error = error;
        }
    }

    #[test]
    fn calibration_replaces_bias() {
        let t0 = Instant::now();
        let mut state = state_with(DVec3::splat(0.5));
        state.start_calibration(t0).unwrap();

        let rate = DVec3::new(0.001, -0.002, 0.004);
        let mut now = t0;
        for _ in 0..20 {
            now += Duration::from_secs(1);
            state.accumulate(RawSample::default(), rate, 1000.0, now);
        }

        assert_eq!(state.poll_calibration(now), CalibrationState::Completed);
        // 20 seconds of raw drift over a 20 second window.
        assert_close(state.velocity(), rate);
    }

    #[test]
    fn zero_interval_reset_never_divides_by_zero() {
        let t0 = Instant::now();
        let mut state = TrackingState::new(
            DVec3::ZERO,
            CompensationSettings {
                min_interval: Duration::ZERO,
                ..CompensationSettings::default()
            },
        );
        state.reset_view(true, t0);
        state.angles = DVec3::new(1.0, 0.0, -1.0);

        assert_eq!(state.reset_view(true, t0), ResetOutcome::Zeroed { elapsed_ms: 0.0 });
        assert!(state.velocity().is_finite());
        assert_eq!(state.velocity(), DVec3::ZERO);
        assert_eq!(state.angles(), DVec3::ZERO);
    }

    #[test]
    fn calibration_without_samples_keeps_bias() {
        let t0 = Instant::now();
        let velocity = DVec3::splat(0.002);
        let mut state = state_with(velocity);
        state.start_calibration(t0).unwrap();

        assert_eq!(state.poll_calibration(t0 + CALIBRATION_WINDOW), CalibrationState::Idle);
        assert_eq!(state.velocity(), velocity);
        assert_eq!(state.take_completed_calibration(t0 + CALIBRATION_WINDOW), None);
    }

    #[test]
    fn completed_calibration_is_taken_once() {
        let t0 = Instant::now();
        let rate = DVec3::new(0.001, 0.0, -0.001);
        let mut state = primed(DVec3::ZERO, DVec3::ZERO, t0);
        state.start_calibration(t0).unwrap();
        let done = t0 + CALIBRATION_WINDOW;
        state.accumulate(RawSample::default(), rate, millis(CALIBRATION_WINDOW), done);

        let taken = state.take_completed_calibration(done).expect("calibration completed");
        assert_close(taken, rate);
        assert_eq!(state.poll_calibration(done), CalibrationState::Idle);

        // Later compensated resets are not mistaken for a new calibration.
        state.angles = DVec3::splat(3.0);
        state.reset_view(true, done + Duration::from_secs(5));
        assert_eq!(state.take_completed_calibration(done + Duration::from_secs(5)), None);
        assert_ne!(state.velocity(), taken);
    }

    #[test]
    fn calibration_start_while_running_keeps_accumulation() {
        let t0 = Instant::now();
        let mut state = state_with(DVec3::ZERO);
        state.start_calibration(t0).unwrap();
        state.accumulate(RawSample::default(), DVec3::ONE, 5.0, t0 + Duration::from_secs(1));

        assert_eq!(
            state.start_calibration(t0 + Duration::from_secs(2)),
            Err(CalibrationError::AlreadyRunning)
        );
        assert_eq!(state.calibration_drift(), Some(DVec3::splat(5.0)));
    }

    #[test]
    fn calibration_cancel_restores_bias() {
        let t0 = Instant::now();
        let velocity = DVec3::new(0.0001, 0.0002, -0.0003);
        let mut state = state_with(velocity);
        state.start_calibration(t0).unwrap();
        state.set_velocity(DVec3::splat(9.0));
        state.accumulate(RawSample::default(), DVec3::ONE, 5.0, t0 + Duration::from_secs(1));

        state.cancel_calibration().unwrap();
        assert_eq!(state.velocity(), velocity);
        assert_eq!(state.poll_calibration(t0 + Duration::from_secs(60)), CalibrationState::Idle);
    }

    #[test]
    fn reset_during_calibration_does_not_blend() {
        let t0 = Instant::now();
        let mut state = primed(DVec3::ZERO, DVec3::splat(10.0), t0);
        state.start_calibration(t0).unwrap();
        let outcome = state.reset_view(true, t0 + Duration::from_secs(5));
        assert!(matches!(outcome, ResetOutcome::Zeroed { .. }));
        assert_eq!(state.velocity(), DVec3::ZERO);
    }

    #[test]
    fn concurrent_reads_never_see_torn_angles() {
        let shared = TrackingState::shared(DVec3::ZERO, CompensationSettings::default());
        const STEPS: usize = 20_000;
        const READS: usize = 20_000;

        let writer = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let t0 = Instant::now();
                for i in 0..STEPS {
                    let mut state = lock(&shared);
                    state.accumulate(RawSample::default(), DVec3::ONE, 1.0, t0);
                    if i % 1000 == 999 {
                        state.reset_view(true, t0 + Duration::from_secs(i as u64));
                    }
                }
            })
        };

        for _ in 0..READS {
            let angles = lock(&shared).angles();
            assert_eq!(angles.x, angles.y);
            assert_eq!(angles.y, angles.z);
            let matrix = model_view_matrix(angles);
            assert!(matrix.is_finite());
        }

        writer.join().unwrap();
    }
}
