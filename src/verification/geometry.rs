//! Physical footprint metrics for quality reporting.
//!
//! Distances are great-circle (haversine) distances between footprint
//! corners. Area is the planar product of width and height, not a spherical
//! polygon area. Reported values are rounded to two decimals.

use super::mean;
use crate::geodesy::{haversine_m, round2};
use crate::projection::GroundFootprint;
use std::fmt;
use tracing::{info, warn};

/// Whether a footprint's resolution is plausible for survey output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityStatus {
    Valid,
    Distorted,
}

impl fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityStatus::Valid => write!(f, "Valid"),
            QualityStatus::Distorted => write!(f, "Distorted"),
        }
    }
}

/// Per-image geometric quality row.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometricQuality {
    pub image_id: String,
    pub footprint_width_m: f64,
    pub footprint_height_m: f64,
    pub area_m2: f64,
    pub gsd_cm_per_px: f64,
    pub mrk_to_center_offset_m: f64,
    pub status: QualityStatus,
}

/// Run-level quality indicators.
#[derive(Debug, Clone, PartialEq)]
pub struct QualitySummary {
    pub image_count: usize,
    pub mean_gsd_cm_per_px: f64,
    pub mean_offset_m: f64,
    pub valid_count: usize,
    pub distorted_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub rows: Vec<GeometricQuality>,
    pub summary: QualitySummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifierConfig {
    /// GSD at or above which a footprint is flagged as distorted (cm/px).
    pub gsd_threshold_cm: f64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            gsd_threshold_cm: 20.0,
        }
    }
}

impl VerifierConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gsd_threshold_cm(mut self, gsd_threshold_cm: f64) -> Self {
        self.gsd_threshold_cm = gsd_threshold_cm;
        self
    }
}

/// Ground sampling distance in centimeters per pixel.
pub fn ground_sampling_distance_cm(width_m: f64, width_px: u32) -> f64 {
    width_m / width_px as f64 * 100.0
}

#[derive(Debug, Clone, Default)]
pub struct GeometricVerifier {
    config: VerifierConfig,
}

impl GeometricVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: VerifierConfig) -> Self {
        Self { config }
    }

    /// Quality metrics of a single footprint.
    pub fn assess(&self, footprint: &GroundFootprint) -> GeometricQuality {
        let tl = footprint.top_left;
        let width_m = haversine_m(
            tl.latitude_deg,
            tl.longitude_deg,
            footprint.top_right.latitude_deg,
            footprint.top_right.longitude_deg,
        );
        let height_m = haversine_m(
            tl.latitude_deg,
            tl.longitude_deg,
            footprint.bottom_left.latitude_deg,
            footprint.bottom_left.longitude_deg,
        );
        let offset_m = haversine_m(
            footprint.platform.latitude_deg,
            footprint.platform.longitude_deg,
            footprint.center.latitude_deg,
            footprint.center.longitude_deg,
        );
        let gsd_cm = ground_sampling_distance_cm(width_m, footprint.image_width_px);

        let status = if gsd_cm < self.config.gsd_threshold_cm {
            QualityStatus::Valid
        } else {
            QualityStatus::Distorted
        };

        GeometricQuality {
            image_id: footprint.image_id.clone(),
            footprint_width_m: round2(width_m),
            footprint_height_m: round2(height_m),
            area_m2: round2(width_m * height_m),
            gsd_cm_per_px: round2(gsd_cm),
            mrk_to_center_offset_m: round2(offset_m),
            status,
        }
    }

    /// Quality rows for every footprint plus run-level means.
    ///
    /// Returns `None` (with a warning) when there is nothing to verify.
    pub fn verify(&self, footprints: &[GroundFootprint]) -> Option<QualityReport> {
        if footprints.is_empty() {
            warn!("No footprints to verify, skipping geometric quality report");
            return None;
        }

        let rows: Vec<GeometricQuality> = footprints.iter().map(|fp| self.assess(fp)).collect();
        let mean_gsd = mean(rows.iter().map(|r| r.gsd_cm_per_px))?;
        let mean_offset = mean(rows.iter().map(|r| r.mrk_to_center_offset_m))?;
        let valid_count = rows
            .iter()
            .filter(|r| r.status == QualityStatus::Valid)
            .count();

        let summary = QualitySummary {
            image_count: rows.len(),
            mean_gsd_cm_per_px: round2(mean_gsd),
            mean_offset_m: round2(mean_offset),
            valid_count,
            distorted_count: rows.len() - valid_count,
        };

        info!(
            "Geometric verification: {} images, mean GSD {:.2} cm/px, mean offset {:.2} m, {} distorted",
            summary.image_count,
            summary.mean_gsd_cm_per_px,
            summary.mean_offset_m,
            summary.distorted_count
        );

        Some(QualityReport { rows, summary })
    }
}
