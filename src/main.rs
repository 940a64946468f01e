//! # Fortius Control
//!
//! Polls a Fortius trainer at a fixed rate, relays telemetry, and acts on head
//! unit buttons.
//!
//! Without a USB driver attached the trainer is simulated in-process, so the
//! full session loop can be exercised from the command line.

use anyhow::{bail, Context, Result};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use fortius_control::config::{Config, LoggingConfig, SessionConfig};
use fortius_control::controller::calibration::CalibrationState;
use fortius_control::controller::fortius::FortiusController;
use fortius_control::controller::{RideMode, TrainerController};
use fortius_control::device::simulated::SimulatedTrainer;
use fortius_control::session::{ConsoleHost, HostAction, SessionHost, Severity, StopReason};
use fortius_control::telemetry::logger::TelemetryLogger;
use fortius_control::telemetry::{processor_from_config, TelemetryRecord};

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Number of ticks between status log messages
const LOG_INTERVAL_TICKS: u64 = 100;

/// Direction of a head unit load adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adjust {
    Up,
    Down,
}

/// Main entry point for Fortius Control
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, or `config/default.toml`)
///    - Set up logging with tracing subscriber
///    - Start the trainer and apply initial weight and setpoints
///
/// 2. **Main Loop**
///    - While calibrating, advance the calibration once per tick
///    - Otherwise relay telemetry and log it to JSONL
///    - Apply queued head unit actions
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Shutdown**
///    - Cancel a calibration still in progress
///    - Stop the trainer and flush the telemetry log
///
/// # Errors
///
/// Returns error if the configuration is invalid, no trainer is found, or the
/// session ends because the trainer stopped responding.
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);
    info!("Fortius Control v{} starting...", env!("CARGO_PKG_VERSION"));

    let poll_interval = Duration::from_millis(config.session.poll_interval_ms);
    let trainer = SimulatedTrainer::new(&config.simulator, poll_interval);
    let mut controller = FortiusController::new(trainer, config.calibration.timeout_ticks)
        .with_processor(processor_from_config(config.telemetry.virtual_power));

    if !controller.find() {
        bail!("No Fortius trainer found");
    }
    let status = controller.start();
    debug!("Trainer start status {}", status);
    controller.set_weight(config.device.weight_kg);
    controller.set_load(config.device.initial_load_watts);
    controller.set_gradient(config.device.initial_gradient, 0.0);

    let mut host = ConsoleHost::new();
    let mut logger = if config.telemetry.enabled {
        Some(TelemetryLogger::new(
            &config.telemetry.log_dir,
            config.telemetry.max_records_per_file,
            config.telemetry.max_files_to_keep,
        )?)
    } else {
        None
    };

    if config.session.calibrate_on_start {
        host.set_calibrating(true);
        controller.begin_calibration();
    } else {
        controller.set_mode(config.session.mode);
    }

    info!(
        "Polling trainer every {}ms in {:?} mode",
        config.session.poll_interval_ms, config.session.mode
    );
    info!("Press Ctrl+C to exit");

    let mut poll = interval(poll_interval);
    let mut record = TelemetryRecord::default();
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = poll.tick() => {
                ticks += 1;

                if host.is_calibrating() {
                    drive_calibration(&mut controller, &mut host, config.session.mode);
                } else if let Err(e) = controller.update_telemetry(&mut host, &mut record) {
                    warn!("Telemetry update failed: {}", e);
                } else if let Some(logger) = logger.as_mut() {
                    if let Err(e) = logger.log(&record) {
                        warn!("Failed to log telemetry: {}", e);
                    }
                }

                for action in host.drain_actions() {
                    apply_action(&mut controller, action, &record, &config.session);
                }

                if host.stop_reason().is_some() {
                    break;
                }

                if ticks % LOG_INTERVAL_TICKS == 0 {
                    info!(
                        "{:.0}W {:.1}km/h {:.0}rpm {}bpm load {:.0}W slope {:.1}%",
                        record.watts, record.speed, record.cadence, record.hr,
                        record.load, record.slope
                    );
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    end_session(&mut controller, &mut host);
    if let Some(logger) = logger.as_mut() {
        logger.flush()?;
    }
    info!("Session ended after {} ticks, {} laps", ticks, host.laps());

    if host.stop_reason() == Some(StopReason::Error) {
        bail!("Session stopped: trainer connection lost");
    }
    Ok(())
}

/// Installs the tracing subscriber, writing to a daily rolling file if configured.
///
/// `RUST_LOG` overrides the configured level.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "fortius-control.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// Advances a running calibration and ends it on success or failure.
fn drive_calibration<C: TrainerController>(
    controller: &mut C,
    host: &mut ConsoleHost,
    mode: RideMode,
) {
    match controller.calibration_zero_offset() {
        Ok(_) if controller.calibration_state() == CalibrationState::Success => {
            host.notify("Calibration complete", Severity::Info);
        }
        Ok(_) => return,
        Err(e) => {
            host.notify(&format!("Calibration failed: {}", e), Severity::Error);
        }
    }

    controller.reset_calibration_state();
    host.set_calibrating(false);
    controller.set_mode(mode);
}

/// Releases the trainer at the end of a session. Returns the driver status code.
///
/// A calibration still running is cancelled first so the brake is not left
/// driving the roller.
fn end_session<C: TrainerController>(controller: &mut C, host: &mut ConsoleHost) -> i32 {
    if host.is_calibrating() {
        controller.cancel_calibration();
        host.set_calibrating(false);
    }
    controller.stop()
}

/// Applies a queued head unit action to the trainer.
fn apply_action<C: TrainerController>(
    controller: &mut C,
    action: HostAction,
    record: &TelemetryRecord,
    session: &SessionConfig,
) {
    let adjust = match action {
        HostAction::Higher => Adjust::Up,
        HostAction::Lower => Adjust::Down,
        HostAction::NewLap | HostAction::Stop(_) => return,
    };

    match session.mode {
        RideMode::Slope => {
            let slope = stepped(record.slope, session.slope_step_percent, adjust);
            controller.set_gradient(slope, 0.0);
        }
        _ => {
            let load = stepped(record.load, session.load_step_watts, adjust);
            controller.set_load(load);
        }
    }
}

/// Next setpoint one step away from the effective one.
fn stepped(current: f64, step: f64, adjust: Adjust) -> f64 {
    match adjust {
        Adjust::Up => current + step,
        Adjust::Down => current - step,
    }
}
