//! Background sampling of the sensor interface.
//!
//! One thread per open session reads reports with a bounded timeout,
//! integrates them into the shared [`TrackingState`](crate::tracking::TrackingState)
//! and pings subscribers. Bad reads are dropped without logging above trace.

use crate::hid::ReportSource;
use crate::protocol::{self, REPORT_SIZE};
use crate::tracking::{lock, SharedState, TrackingState};
use crate::types::millis;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Samples between debug heartbeats.
const HEARTBEAT_SAMPLES: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// Waiting for the first valid report.
    Starting,
    Sampling,
    Stopping,
}

/// Result of feeding one read into the integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Not a valid report; nothing changed.
    Rejected,
    /// First valid report: view zeroed, clock started.
    Seeded,
    Integrated,
}

/// Per-loop sample clock.
///
/// Owned by the acquisition thread, so every (re)start begins unseeded.
#[derive(Debug, Default)]
pub struct SampleIntegrator {
    last_reading: Option<Instant>,
}

impl SampleIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `report` read at `now` and fold it into `shared`.
    ///
    /// Decoding and scaling happen before the lock is taken; the critical
    /// section is only the accumulate.
    pub fn ingest(&mut self, report: &[u8], now: Instant, shared: &Mutex<TrackingState>) -> Ingest {
        let Ok(sample) = protocol::decode_report(report) else {
            tracing::trace!(len = report.len(), "Skipping malformed report");
            return Ingest::Rejected;
        };

        let Some(last_reading) = self.last_reading.replace(now) else {
            lock(shared).seed(sample, now);
            return Ingest::Seeded;
        };

        let elapsed_ms = millis(now.saturating_duration_since(last_reading));
        let rate = sample.angular_rate();

        let completed = lock(shared).accumulate(sample, rate, elapsed_ms, now);
        if let Some(velocity) = completed {
            tracing::debug!(?velocity, "Calibration window closed");
        }
        Ingest::Integrated
    }
}

/// Timing for one acquisition thread.
#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    /// Upper bound on one blocking read.
    pub read_timeout: Duration,
    /// Pause after every iteration.
    pub poll_interval: Duration,
}

/// Thread body. Runs until `stop` is set, then hands the source back so the
/// caller can close it after joining.
pub fn run(
    mut source: Box<dyn ReportSource>,
    shared: SharedState,
    stop: Arc<AtomicBool>,
    changed: Arc<watch::Sender<()>>,
    timing: LoopTiming,
) -> Box<dyn ReportSource> {
    let mut phase = LoopPhase::Starting;
    let mut integrator = SampleIntegrator::new();
    let mut buf = [0u8; REPORT_SIZE];
    let mut sample_count: u64 = 0;

    tracing::debug!(?phase, ?timing, "Acquisition loop started");

    while !stop.load(Ordering::Acquire) {
        let read = source.read_report(&mut buf, timing.read_timeout);
        let now = Instant::now();

        match read {
            Ok(len) => match integrator.ingest(&buf[..len.min(REPORT_SIZE)], now, &shared) {
                Ingest::Seeded => {
                    if phase == LoopPhase::Starting {
                        phase = LoopPhase::Sampling;
                        tracing::info!(?phase, "First sensor report received");
                    }
                    changed.send_replace(());
                }
                Ingest::Integrated => {
                    sample_count += 1;
                    if sample_count % HEARTBEAT_SAMPLES == 0 {
                        tracing::debug!(sample_count, "Sensor samples integrated");
                    }
                    changed.send_replace(());
                }
                Ingest::Rejected => {}
            },
            Err(e) => tracing::trace!(?e, "Sensor read failed"),
        }

        std::thread::sleep(timing.poll_interval);
    }

    phase = LoopPhase::Stopping;
    tracing::debug!(?phase, sample_count, "Acquisition loop exiting");
    source
}
