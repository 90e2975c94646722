use super::{IoError, TableLoader, parse_number};
use crate::pose::Pose;
use memmap2::Mmap;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Columns every trajectory table must provide.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "filename",
    "GPS_Latitude",
    "GPS_Longitude",
    "GPS_Altitude",
    "ATT_Pitch",
    "ATT_Roll",
    "ATT_Yaw",
    "droneTime_MS",
];

/// Row as it appears in the file, before any validation.
#[derive(Debug, Deserialize)]
struct RawPoseRecord {
    filename: String,
    #[serde(rename = "GPS_Latitude")]
    latitude: String,
    #[serde(rename = "GPS_Longitude")]
    longitude: String,
    #[serde(rename = "GPS_Altitude")]
    altitude: String,
    #[serde(rename = "ATT_Pitch")]
    pitch: String,
    #[serde(rename = "ATT_Roll")]
    roll: String,
    #[serde(rename = "ATT_Yaw")]
    yaw: String,
    #[serde(rename = "droneTime_MS")]
    time_ms: String,
}

impl RawPoseRecord {
    fn into_pose(self, line: u64) -> Result<Pose, IoError> {
        let latitude = parse_number(line, "GPS_Latitude", &self.latitude)?;
        let longitude = parse_number(line, "GPS_Longitude", &self.longitude)?;
        let altitude = parse_number(line, "GPS_Altitude", &self.altitude)?;
        let pitch = parse_number(line, "ATT_Pitch", &self.pitch)?;
        let roll = parse_number(line, "ATT_Roll", &self.roll)?;
        let yaw = parse_number(line, "ATT_Yaw", &self.yaw)?;
        let time_ms = parse_number(line, "droneTime_MS", &self.time_ms)?;

        Pose::new(
            self.filename.trim(),
            latitude,
            longitude,
            altitude,
            roll,
            pitch,
            yaw,
            time_ms,
        )
        .map_err(|e| IoError::InvalidRecord {
            line,
            message: e.to_string(),
        })
    }
}

/// A row excluded at ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    pub line: u64,
    /// Filename cell, when the row got far enough to have one.
    pub image_id: Option<String>,
    pub reason: String,
}

/// Validated poses in time order, plus the rows that failed validation.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryTable {
    pub poses: Vec<Pose>,
    pub rejected: Vec<RejectedRow>,
}

impl TrajectoryTable {
    /// Build a table from already validated poses, sorting them by time.
    pub fn from_poses(mut poses: Vec<Pose>) -> Self {
        sort_by_time(&mut poses);
        Self {
            poses,
            rejected: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}

fn sort_by_time(poses: &mut [Pose]) {
    poses.sort_by(|a, b| a.timestamp_ms.total_cmp(&b.timestamp_ms));
}

/// Loader for the fused per-image metadata table.
///
/// Missing required columns or an unreadable file abort the load. A malformed
/// row only excludes that row.
pub struct TrajectoryLoader;

impl TableLoader for TrajectoryLoader {
    type Output = TrajectoryTable;

    fn load<P: AsRef<Path>>(path: P) -> Result<TrajectoryTable, IoError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let table = if file.metadata()?.len() == 0 {
            Self::parse_reader(std::io::empty())?
        } else {
            let mmap = unsafe { Mmap::map(&file)? };
            Self::parse_reader(&mmap[..])?
        };

        info!(
            "Loaded {} poses from {} ({} rows rejected)",
            table.poses.len(),
            path.display(),
            table.rejected.len()
        );
        Ok(table)
    }
}

impl TrajectoryLoader {
    /// Parse CSV content with a header row.
    pub fn parse_reader<R: Read>(reader: R) -> Result<TrajectoryTable, IoError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(IoError::MissingColumn {
                    column: column.to_string(),
                });
            }
        }

        let filename_idx = headers.iter().position(|h| h == "filename");

        let mut table = TrajectoryTable::default();
        for result in reader.records() {
            let record = match result {
                Ok(record) => record,
                Err(err) => {
                    let line = err.position().map_or(0, |p| p.line());
                    warn!("Skipping unreadable row {line}: {err}");
                    table.rejected.push(RejectedRow {
                        line,
                        image_id: None,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let line = record.position().map_or(0, |p| p.line());
            let image_id = filename_idx
                .and_then(|i| record.get(i))
                .map(|s| s.trim().to_string());

            let parsed = record
                .deserialize::<RawPoseRecord>(Some(&headers))
                .map_err(IoError::from)
                .and_then(|raw| raw.into_pose(line));

            match parsed {
                Ok(pose) => table.poses.push(pose),
                Err(err) => {
                    warn!(
                        "Skipping row {line} ({}): {err}",
                        image_id.as_deref().unwrap_or("?")
                    );
                    table.rejected.push(RejectedRow {
                        line,
                        image_id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        sort_by_time(&mut table.poses);
        Ok(table)
    }
}
