//! CSV output tables.
//!
//! Column names follow the survey report layout (`filename`, `TL_Lon`,
//! `GSD_cm_px`, ...), so the tables can be opened next to the input metadata.

use super::{IoError, TableLoader};
use crate::pose::Pose;
use crate::projection::{ControlPoint, GroundFootprint, GroundPoint};
use crate::verification::{GeometricQuality, PositionalShift, QualitySummary, VelocitySample};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const VERIFICATION_CORNERS_FILE: &str = "verification_corners.csv";
pub const GEOMETRIC_QUALITY_FILE: &str = "geometric_quality.csv";
pub const QUALITY_SUMMARY_FILE: &str = "geometric_quality_summary.csv";
pub const CONTROL_POINTS_FILE: &str = "control_points.csv";
pub const SMOOTHED_TRAJECTORY_FILE: &str = "smoothed_trajectory.csv";
pub const VELOCITY_FILE: &str = "velocity.csv";
pub const POSITIONAL_SHIFT_FILE: &str = "positional_shift.csv";

/// Serialize rows to a CSV file with a header line. Returns the row count.
fn write_rows<P, T, I>(path: P, rows: I) -> Result<usize, IoError>
where
    P: AsRef<Path>,
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)?;
    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    debug!("Wrote {count} rows to {}", path.display());
    Ok(count)
}

/// One footprint of the verification table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerRow {
    pub filename: String,
    #[serde(rename = "Platform_Lon")]
    pub platform_lon: f64,
    #[serde(rename = "Platform_Lat")]
    pub platform_lat: f64,
    #[serde(rename = "Center_Lon")]
    pub center_lon: f64,
    #[serde(rename = "Center_Lat")]
    pub center_lat: f64,
    #[serde(rename = "TL_Lon")]
    pub tl_lon: f64,
    #[serde(rename = "TL_Lat")]
    pub tl_lat: f64,
    #[serde(rename = "TR_Lon")]
    pub tr_lon: f64,
    #[serde(rename = "TR_Lat")]
    pub tr_lat: f64,
    #[serde(rename = "BL_Lon")]
    pub bl_lon: f64,
    #[serde(rename = "BL_Lat")]
    pub bl_lat: f64,
    #[serde(rename = "BR_Lon")]
    pub br_lon: f64,
    #[serde(rename = "BR_Lat")]
    pub br_lat: f64,
    #[serde(rename = "Width_px")]
    pub width_px: u32,
    #[serde(rename = "Height_px")]
    pub height_px: u32,
}

impl From<&GroundFootprint> for CornerRow {
    fn from(fp: &GroundFootprint) -> Self {
        Self {
            filename: fp.image_id.clone(),
            platform_lon: fp.platform.longitude_deg,
            platform_lat: fp.platform.latitude_deg,
            center_lon: fp.center.longitude_deg,
            center_lat: fp.center.latitude_deg,
            tl_lon: fp.top_left.longitude_deg,
            tl_lat: fp.top_left.latitude_deg,
            tr_lon: fp.top_right.longitude_deg,
            tr_lat: fp.top_right.latitude_deg,
            bl_lon: fp.bottom_left.longitude_deg,
            bl_lat: fp.bottom_left.latitude_deg,
            br_lon: fp.bottom_right.longitude_deg,
            br_lat: fp.bottom_right.latitude_deg,
            width_px: fp.image_width_px,
            height_px: fp.image_height_px,
        }
    }
}

impl From<CornerRow> for GroundFootprint {
    fn from(row: CornerRow) -> Self {
        Self {
            image_id: row.filename,
            platform: GroundPoint::new(row.platform_lat, row.platform_lon),
            center: GroundPoint::new(row.center_lat, row.center_lon),
            top_left: GroundPoint::new(row.tl_lat, row.tl_lon),
            top_right: GroundPoint::new(row.tr_lat, row.tr_lon),
            bottom_left: GroundPoint::new(row.bl_lat, row.bl_lon),
            bottom_right: GroundPoint::new(row.br_lat, row.br_lon),
            image_width_px: row.width_px,
            image_height_px: row.height_px,
        }
    }
}

#[derive(Serialize)]
struct QualityRow<'a> {
    filename: &'a str,
    #[serde(rename = "Footprint_Width_m")]
    width_m: f64,
    #[serde(rename = "Footprint_Height_m")]
    height_m: f64,
    #[serde(rename = "Coverage_Area_m2")]
    area_m2: f64,
    #[serde(rename = "GSD_cm_px")]
    gsd_cm: f64,
    #[serde(rename = "MRK_To_Center_Offset_m")]
    offset_m: f64,
    #[serde(rename = "Status")]
    status: String,
}

#[derive(Serialize)]
struct SummaryRow {
    metric: &'static str,
    value: f64,
}

#[derive(Serialize)]
struct ControlPointRow<'a> {
    filename: &'a str,
    corner: &'static str,
    pixel_x: f64,
    pixel_y: f64,
    ground_lon: f64,
    ground_lat: f64,
    ground_elev: f64,
}

#[derive(Serialize)]
struct SmoothedRow<'a> {
    filename: &'a str,
    #[serde(rename = "GPS_Latitude")]
    latitude: f64,
    #[serde(rename = "GPS_Longitude")]
    longitude: f64,
    #[serde(rename = "GPS_Altitude")]
    altitude: f64,
    #[serde(rename = "ATT_Pitch")]
    pitch: f64,
    #[serde(rename = "ATT_Roll")]
    roll: f64,
    #[serde(rename = "ATT_Yaw")]
    yaw: f64,
    #[serde(rename = "droneTime_MS")]
    time_ms: f64,
    #[serde(rename = "GPS_Latitude_Raw")]
    raw_latitude: f64,
    #[serde(rename = "GPS_Longitude_Raw")]
    raw_longitude: f64,
}

#[derive(Serialize)]
struct VelocityRow<'a> {
    filename: &'a str,
    #[serde(rename = "Time_s")]
    time_s: f64,
    dt: f64,
    #[serde(rename = "Distance_m")]
    distance_m: f64,
    #[serde(rename = "Velocity_ms")]
    velocity: Option<f64>,
}

#[derive(Serialize)]
struct ShiftRow<'a> {
    filename: &'a str,
    #[serde(rename = "Positional_Shift_m")]
    shift_m: f64,
}

pub fn write_verification_corners<P: AsRef<Path>>(
    path: P,
    footprints: &[GroundFootprint],
) -> Result<usize, IoError> {
    write_rows(path, footprints.iter().map(CornerRow::from))
}

pub fn write_geometric_quality<P: AsRef<Path>>(
    path: P,
    rows: &[GeometricQuality],
) -> Result<usize, IoError> {
    write_rows(
        path,
        rows.iter().map(|q| QualityRow {
            filename: &q.image_id,
            width_m: q.footprint_width_m,
            height_m: q.footprint_height_m,
            area_m2: q.area_m2,
            gsd_cm: q.gsd_cm_per_px,
            offset_m: q.mrk_to_center_offset_m,
            status: q.status.to_string(),
        }),
    )
}

pub fn write_quality_summary<P: AsRef<Path>>(
    path: P,
    summary: &QualitySummary,
) -> Result<usize, IoError> {
    let rows = [
        SummaryRow {
            metric: "image_count",
            value: summary.image_count as f64,
        },
        SummaryRow {
            metric: "mean_gsd_cm_per_px",
            value: summary.mean_gsd_cm_per_px,
        },
        SummaryRow {
            metric: "mean_offset_m",
            value: summary.mean_offset_m,
        },
        SummaryRow {
            metric: "valid_count",
            value: summary.valid_count as f64,
        },
        SummaryRow {
            metric: "distorted_count",
            value: summary.distorted_count as f64,
        },
    ];
    write_rows(path, rows)
}

pub fn write_control_points<P: AsRef<Path>>(
    path: P,
    sets: &[(String, [ControlPoint; 4])],
) -> Result<usize, IoError> {
    const CORNERS: [&str; 4] = ["TL", "TR", "BL", "BR"];
    write_rows(
        path,
        sets.iter().flat_map(|(image_id, gcps)| {
            gcps.iter().zip(CORNERS).map(move |(gcp, corner)| ControlPointRow {
                filename: image_id,
                corner,
                pixel_x: gcp.pixel_x,
                pixel_y: gcp.pixel_y,
                ground_lon: gcp.ground_lon,
                ground_lat: gcp.ground_lat,
                ground_elev: gcp.ground_elev,
            })
        }),
    )
}

pub fn write_smoothed_trajectory<P: AsRef<Path>>(path: P, poses: &[Pose]) -> Result<usize, IoError> {
    write_rows(
        path,
        poses.iter().map(|p| SmoothedRow {
            filename: &p.image_id,
            latitude: p.latitude_deg,
            longitude: p.longitude_deg,
            altitude: p.altitude_m,
            pitch: p.platform_pitch_deg,
            roll: p.platform_roll_deg,
            yaw: p.platform_yaw_deg,
            time_ms: p.timestamp_ms,
            raw_latitude: p.raw_latitude_deg,
            raw_longitude: p.raw_longitude_deg,
        }),
    )
}

pub fn write_velocity<P: AsRef<Path>>(path: P, samples: &[VelocitySample]) -> Result<usize, IoError> {
    write_rows(
        path,
        samples.iter().map(|s| VelocityRow {
            filename: &s.image_id,
            time_s: s.time_s,
            dt: s.dt_s,
            distance_m: s.distance_m,
            velocity: s.speed_mps,
        }),
    )
}

pub fn write_positional_shift<P: AsRef<Path>>(
    path: P,
    shifts: &[PositionalShift],
) -> Result<usize, IoError> {
    write_rows(
        path,
        shifts.iter().map(|s| ShiftRow {
            filename: &s.image_id,
            shift_m: s.shift_m,
        }),
    )
}

/// Reader for a previously written verification table, so footprints can be
/// re-verified without re-projecting.
pub struct CornerTableLoader;

impl TableLoader for CornerTableLoader {
    type Output = Vec<GroundFootprint>;

    fn load<P: AsRef<Path>>(path: P) -> Result<Vec<GroundFootprint>, IoError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut footprints = Vec::new();
        for row in reader.deserialize::<CornerRow>() {
            footprints.push(GroundFootprint::from(row?));
        }
        Ok(footprints)
    }
}
