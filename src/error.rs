//! Error types for the drone-georef library
//!
//! This module provides the main error and result types used throughout the library.
//! All errors use the `thiserror` crate for automatic trait implementations.

use crate::{io::IoError, smoother::SmootherError};
use std::io::Error;
use thiserror::Error;

/// Main result type used throughout the drone-georef library
pub type GeorefResult<T> = Result<T, GeorefError>;

/// Main error type for the drone-georef library
#[derive(Debug, Clone, Error)]
pub enum GeorefError {
    /// IO related errors (table loading, writing, missing columns)
    #[error("IO error: {0}")]
    Io(String),

    /// Invalid input parameters or records
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Projection geometry that cannot yield a valid footprint
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Trajectory filter failures
    #[error("Smoothing error: {0}")]
    Smoothing(String),

    /// Source image could not be opened or read
    #[error("Image error: {0}")]
    Image(String),

    /// Raster rectifier collaborator failures
    #[error("Rectifier error: {0}")]
    Rectifier(String),
}

// Conversions from standard library errors

impl From<Error> for GeorefError {
    fn from(err: Error) -> Self {
        GeorefError::Io(err.to_string())
    }
}

// Convert module-specific errors to GeorefError

impl From<IoError> for GeorefError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::Image { .. } => GeorefError::Image(err.to_string()),
            _ => GeorefError::Io(err.to_string()),
        }
    }
}

impl From<SmootherError> for GeorefError {
    fn from(err: SmootherError) -> Self {
        match err {
            SmootherError::NonMonotonicTime { .. } => GeorefError::InvalidInput(err.to_string()),
            _ => GeorefError::Smoothing(err.to_string()),
        }
    }
}
