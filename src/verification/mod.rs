//! Quality reporting over projected footprints and the smoothed trajectory.
//!
//! - [`geometry`]: footprint size, area, ground sampling distance and the
//!   platform-to-center offset per image, with run-level means
//! - [`trajectory`]: speed between consecutive captures and the shift the
//!   smoother applied to each position

pub mod geometry;
pub mod trajectory;

pub use geometry::{
    GeometricQuality, GeometricVerifier, QualityReport, QualityStatus, QualitySummary,
    VerifierConfig, ground_sampling_distance_cm,
};
pub use trajectory::{PositionalShift, VelocitySample, positional_shifts, velocity_profile};

/// Arithmetic mean, `None` for an empty input.
pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}
