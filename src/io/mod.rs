//! Table ingestion, table output and the raster collaborator seams.
//!
//! - [`trajectory`]: typed loading of the per-image pose table
//! - [`tables`]: CSV writers (and the corner-table reader) for every report
//! - [`raster`]: image layout source and rectifier traits with default impls

use std::path::Path;
use thiserror::Error;

pub mod raster;
pub mod tables;
pub mod trajectory;

pub use raster::{
    ImageDirectory, ImageSource, NullRectifier, RasterInfo, RasterRectifier, RectifierConfig,
    RectifyRequest, Resampling, SampleType, VrtRectifier,
};
pub use tables::CornerTableLoader;
pub use trajectory::{RejectedRow, TrajectoryLoader, TrajectoryTable};

/// Errors that can occur while reading or writing tables and rasters
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column: {column}")]
    MissingColumn { column: String },

    #[error("Invalid number at line {line}, column {column}: {value:?}")]
    InvalidNumber {
        line: u64,
        column: String,
        value: String,
    },

    #[error("Invalid record at line {line}: {message}")]
    InvalidRecord { line: u64, message: String },

    #[error("Image error for {path}: {message}")]
    Image { path: String, message: String },
}

/// Trait for table loaders
pub trait TableLoader {
    type Output;

    /// Load a table from a file
    fn load<P: AsRef<Path>>(path: P) -> Result<Self::Output, IoError>;
}

/// Parse one numeric cell, reporting where it came from on failure.
pub(crate) fn parse_number(line: u64, column: &str, value: &str) -> Result<f64, IoError> {
    let invalid = || IoError::InvalidNumber {
        line,
        column: column.to_string(),
        value: value.to_string(),
    };
    let parsed = value.trim().parse::<f64>().map_err(|_| invalid())?;
    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() -> Result<(), IoError> {
        assert_eq!(parse_number(2, "GPS_Altitude", " 101.5 ")?, 101.5);
        Ok(())
    }

    #[test]
    fn test_parse_number_rejects_text_and_nan() {
        assert!(matches!(
            parse_number(7, "GPS_Altitude", "abc"),
            Err(IoError::InvalidNumber { line: 7, .. })
        ));
        assert!(parse_number(7, "GPS_Altitude", "NaN").is_err());
        assert!(parse_number(7, "GPS_Altitude", "").is_err());
    }

    #[test]
    fn test_io_error_display() {
        let err = IoError::MissingColumn {
            column: "GPS_Altitude".to_string(),
        };
        assert_eq!(err.to_string(), "Missing required column: GPS_Altitude");
    }
}
