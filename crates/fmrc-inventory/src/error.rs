//! Error types for the inventory crate.

use thiserror::Error;

/// Errors raised while building or querying a collection.
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Run has no reference time attribute: {0}")]
    MissingRunTime(String),

    #[error("Invalid reference time '{value}': {message}")]
    InvalidRunTime { value: String, message: String },

    #[error("Non-finite value in {0} coordinate")]
    NonFiniteCoordinate(&'static str),

    #[error("Failed to read coordinate axis for '{variable}': {message}")]
    AxisRead { variable: String, message: String },

    #[error("Malformed inventory XML at {path}: {message}")]
    XmlParse { path: String, message: String },

    #[error("Failed to write inventory cache {path}: {message}")]
    CacheWrite { path: String, message: String },

    #[error("Run time not in collection: {0}")]
    RunNotFound(String),

    #[error("Forecast time not in collection: {0}")]
    ForecastNotFound(String),

    #[error("Offset hour not in collection: {0}")]
    OffsetNotFound(f64),

    #[error("Variable not in collection: {0}")]
    VariableNotFound(String),

    #[error("Read range {start}..{end} exceeds view length {len}")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("Failed to read grid data: {0}")]
    DataRead(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
