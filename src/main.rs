use anyhow::Result;
use glam::DVec3;
use psvr_config::{AppConfig, TrackingConfig, VelocityConfig};
use psvr_sensors::{
    CompensationSettings, HidApiBackend, PsvrSensors, SensorError, TrackingSettings,
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// Matrix updates between debug log lines.
const MATRIX_LOG_EVERY: u64 = 2000;

/// Console commands standing in for the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Reset,
    Compensate,
    Calibrate,
    Cancel,
    Status,
    Devices,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "r" | "reset" => Some(Self::Reset),
            "c" | "compensate" => Some(Self::Compensate),
            "cal" | "calibrate" => Some(Self::Calibrate),
            "x" | "cancel" => Some(Self::Cancel),
            "s" | "status" => Some(Self::Status),
            "d" | "devices" => Some(Self::Devices),
            "q" | "quit" => Some(Self::Quit),
            _ => None,
        }
    }
}

fn tracking_settings(config: &AppConfig) -> TrackingSettings {
    let TrackingConfig {
        read_timeout_ms,
        poll_interval_us,
        min_compensation_interval_ms,
        compensation_smoothing,
        calibration_window_ms,
        ..
    } = config.tracking;
    let VelocityConfig { x, y, z } = config.velocity;

    TrackingSettings {
        read_timeout: Duration::from_millis(read_timeout_ms),
        poll_interval: Duration::from_micros(poll_interval_us),
        compensation: CompensationSettings {
            min_interval: Duration::from_millis(min_compensation_interval_ms),
            smoothing: compensation_smoothing,
            calibration_window: Duration::from_millis(calibration_window_ms),
        },
        initial_velocity: DVec3::new(x, y, z),
    }
}

fn velocity_config(velocity: DVec3) -> VelocityConfig {
    VelocityConfig {
        x: velocity.x,
        y: velocity.y,
        z: velocity.z,
    }
}

fn try_open(sensors: &mut PsvrSensors) {
    match sensors.open_device() {
        Ok(()) => info!("Head tracking active"),
        Err(SensorError::NotFound) => debug!("PSVR not connected, will retry"),
        Err(e) => warn!(?e, "Failed to open PSVR sensor interface"),
    }
}

/// Returns `false` when the host should shut down.
fn handle_command(sensors: &mut PsvrSensors, config: &mut AppConfig, command: Command) -> bool {
    match command {
        Command::Reset => {
            sensors.reset_view(false);
        }
        Command::Compensate => {
            sensors.reset_view(true);
        }
        Command::Calibrate => {
            if let Err(e) = sensors.start_calibration() {
                warn!(%e, "Calibration not started");
            }
        }
        Command::Cancel => {
            if let Err(e) = sensors.cancel_calibration() {
                warn!(%e, "Nothing to cancel");
            }
        }
        Command::Status => {
            let angles = sensors.angles();
            let velocity = sensors.velocity();
            info!(
                open = sensors.is_open(),
                angles = ?angles,
                velocity = ?velocity,
                sample = ?sensors.last_sample(),
                calibration = ?sensors.calibration_state(),
                progress = ?sensors.calibration_progress(),
                "Status"
            );
        }
        Command::Devices => match sensors.list_devices() {
            Ok(devices) => {
                for device in devices {
                    info!(
                        path = %device.path,
                        interface = device.interface_number,
                        product = ?device.product,
                        "PSVR interface"
                    );
                }
            }
            Err(e) => warn!(?e, "Failed to enumerate HID devices"),
        },
        Command::Quit => return false,
    }
    persist_calibration(sensors, config);
    true
}

/// Save a freshly completed calibration right away rather than at exit.
/// Each completion is saved once; later compensated resets wait for exit.
fn persist_calibration(sensors: &PsvrSensors, config: &mut AppConfig) {
    let Some(velocity) = sensors.take_completed_calibration() else {
        return;
    };
    config.velocity = velocity_config(velocity);
    match psvr_config::save_config(config) {
        Ok(()) => info!(velocity = ?config.velocity, "Calibrated velocity saved"),
        Err(e) => warn!(?e, "Failed to save calibrated velocity"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "psvr_tracker=info,psvr_sensors=info,psvr_config=info".into()
            }),
        )
        .init();

    info!("PSVR head tracker starting");

    let mut config = psvr_config::load_config().unwrap_or_else(|e| {
        warn!(?e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    info!(velocity = ?config.velocity, "Config loaded");

    let backend = HidApiBackend::new()?;
    let mut sensors = PsvrSensors::new(Box::new(backend), tracking_settings(&config));
    let mut changed = sensors.subscribe();

    let mut reopen = tokio::time::interval(Duration::from_millis(
        config.tracking.reopen_interval_ms.max(1),
    ));
    reopen.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut updates: u64 = 0;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Commands: r(eset) c(ompensate) cal(ibrate) x/cancel s(tatus) d(evices) q(uit)");

    loop {
        tokio::select! {
            _ = reopen.tick() => {
                if !sensors.is_open() {
                    try_open(&mut sensors);
                }
                persist_calibration(&sensors, &mut config);
            }
            Ok(()) = changed.changed() => {
                updates += 1;
                if updates % MATRIX_LOG_EVERY == 0 {
                    let matrix = sensors.model_view_matrix();
                    debug!(updates, ?matrix, "Model-view matrix");
                }
            }
            line = commands.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match Command::parse(&line) {
                    Some(command) => {
                        if !handle_command(&mut sensors, &mut config, command) {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!(%line, "Unknown command"),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(?e, "Failed to read console input");
                    stdin_open = false;
                }
            },
            _ = &mut shutdown => {
                info!("Interrupted");
                break;
            }
        }
    }

    sensors.close_device();

    // Save bias on exit.
    config.velocity = velocity_config(sensors.velocity());
    psvr_config::save_config(&config)?;
    info!(velocity = ?config.velocity, "Shut down");

    Ok(())
}
