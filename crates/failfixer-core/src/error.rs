//! Error types for the FailFixer core library

use thiserror::Error;

/// Main error type for FailFixer operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error while reading the source or writing the resume file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The G-code contained no detectable layers
    #[error("No layers detected in the G-code file. Cannot generate a resume file.")]
    NoLayers,

    /// Requested layer number does not exist
    #[error("Layer {number} not found. Valid range: {min}-{max}")]
    LayerNotFound {
        /// Requested layer number
        number: i64,
        /// Smallest layer number in the file
        min: i64,
        /// Largest layer number in the file
        max: i64,
    },

    /// Measured Z height is further than the tolerance from every layer
    #[error(
        "Measured Z {z:.3} mm is {distance:.3} mm away from the nearest layer \
         (layer {nearest_layer} @ Z {nearest_z:.3} mm). This exceeds the tolerance of ±{tolerance} mm."
    )]
    ZOutOfTolerance {
        /// Requested Z height
        z: f64,
        /// Absolute distance to the nearest layer
        distance: f64,
        /// Number of the nearest layer
        nearest_layer: i64,
        /// Z height of the nearest layer
        nearest_z: f64,
        /// Tolerance in effect
        tolerance: f64,
    },

    /// Generated output failed safety validation
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Printer profile could not be read or parsed
    #[error("Profile error for {path}: {message}")]
    Profile {
        /// Profile file path
        path: String,
        /// What went wrong
        message: String,
    },

    /// Invalid configuration or argument
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias using the FailFixer error type
pub type Result<T> = std::result::Result<T, Error>;
