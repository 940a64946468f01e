//! # Telemetry Module
//!
//! The record shown to the rider and the post-processing applied to it.
//!
//! This module handles:
//! - The UI-facing [`TelemetryRecord`] filled in once per poll
//! - Pluggable post-processing of the record ([`RecordProcessor`])
//! - Writing records to rotating JSONL files ([`logger`])

pub mod logger;

use serde::Serialize;

/// UI-facing telemetry, refreshed once per poll.
///
/// Distance and steering are read from the trainer but have no field here yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TelemetryRecord {
    /// Power in watts.
    pub watts: f64,
    /// Heart rate in bpm.
    pub hr: u16,
    /// Cadence in rpm.
    pub cadence: f64,
    /// Speed in km/h.
    pub speed: f64,
    /// Effective load setpoint in watts.
    pub load: f64,
    /// Effective gradient setpoint in percent.
    pub slope: f64,
}

/// Post-processing step run on every record after the trainer values are mapped.
pub trait RecordProcessor {
    fn process(&self, record: &mut TelemetryRecord);
}

/// Leaves the record untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProcessing;

impl RecordProcessor for NoProcessing {
    fn process(&self, _record: &mut TelemetryRecord) {}
}

/// Replaces power with a value derived from speed.
///
/// Formula: `watts = c0 + c1·v + c2·v² + c3·v³`, with `v` in km/h, floored at 0.
///
/// # Examples
///
/// ```
/// use fortius_control::telemetry::{RecordProcessor, TelemetryRecord, VirtualPower};
///
/// let curve = VirtualPower::new([0.0, 2.0, 0.0, 0.0]);
/// let mut record = TelemetryRecord { speed: 30.0, ..Default::default() };
/// curve.process(&mut record);
/// assert_eq!(record.watts, 60.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct VirtualPower {
    coefficients: [f64; 4],
}

impl VirtualPower {
    #[must_use]
    pub fn new(coefficients: [f64; 4]) -> Self {
        Self { coefficients }
    }

    /// Power in watts at `speed` km/h.
    #[must_use]
    pub fn power_at(&self, speed: f64) -> f64 {
        let [c0, c1, c2, c3] = self.coefficients;
        (c0 + speed * (c1 + speed * (c2 + speed * c3))).max(0.0)
    }
}

impl RecordProcessor for VirtualPower {
    fn process(&self, record: &mut TelemetryRecord) {
        record.watts = self.power_at(record.speed);
    }
}

/// Builds the processor selected by the telemetry configuration.
#[must_use]
pub fn processor_from_config(virtual_power: Option<[f64; 4]>) -> Box<dyn RecordProcessor> {
    match virtual_power {
        Some(coefficients) => Box::new(VirtualPower::new(coefficients)),
        None => Box::new(NoProcessing),
    }
}
