//! # Error Types
//!
//! Custom error types for Fortius Control using `thiserror`.

use thiserror::Error;

/// Main error type for Fortius Control
#[derive(Debug, Error)]
pub enum TrainerError {
    /// Trainer stopped reporting as running; the session cannot continue
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Calibration did not converge within the configured tick budget
    #[error("Calibration timed out after {ticks} ticks")]
    CalibrationTimeout { ticks: u32 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Telemetry record serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Fortius Control
pub type Result<T> = std::result::Result<T, TrainerError>;
