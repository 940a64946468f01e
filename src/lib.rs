//! # Fortius Control Library
//!
//! Telemetry relay and zero-offset calibration for Tacx Fortius class trainers.
//!
//! This library sits between a trainer driver and the ride session: it polls
//! the trainer, fills in the telemetry shown to the rider, turns head unit
//! button presses into session actions, and runs the calibration procedure.

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod session;
pub mod telemetry;
