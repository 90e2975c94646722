//! Per-image platform pose records.

use crate::error::{GeorefError, GeorefResult};
use std::fmt;

/// Platform position and attitude at the moment one image was captured.
///
/// `latitude_deg` / `longitude_deg` hold the working position. The trajectory
/// smoother overwrites them in place; the measured values stay available in
/// `raw_latitude_deg` / `raw_longitude_deg`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub image_id: String,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f64,
    pub platform_roll_deg: f64,
    pub platform_pitch_deg: f64,
    pub platform_yaw_deg: f64,
    pub timestamp_ms: f64,
    pub raw_latitude_deg: f64,
    pub raw_longitude_deg: f64,
}

impl Pose {
    /// Create a validated pose.
    ///
    /// Every numeric field must be finite and the position must be a valid
    /// geographic coordinate. The raw position is initialised to the given one.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        image_id: impl Into<String>,
        latitude_deg: f64,
        longitude_deg: f64,
        altitude_m: f64,
        platform_roll_deg: f64,
        platform_pitch_deg: f64,
        platform_yaw_deg: f64,
        timestamp_ms: f64,
    ) -> GeorefResult<Self> {
        let image_id = image_id.into();
        if image_id.trim().is_empty() {
            return Err(GeorefError::InvalidInput(
                "pose has an empty image id".to_string(),
            ));
        }

        let fields = [
            ("latitude", latitude_deg),
            ("longitude", longitude_deg),
            ("altitude", altitude_m),
            ("roll", platform_roll_deg),
            ("pitch", platform_pitch_deg),
            ("yaw", platform_yaw_deg),
            ("timestamp", timestamp_ms),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(GeorefError::InvalidInput(format!(
                "{image_id}: {name} is not finite ({value})"
            )));
        }

        if !(-90.0..=90.0).contains(&latitude_deg) {
            return Err(GeorefError::InvalidInput(format!(
                "{image_id}: latitude {latitude_deg} out of range"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude_deg) {
            return Err(GeorefError::InvalidInput(format!(
                "{image_id}: longitude {longitude_deg} out of range"
            )));
        }

        Ok(Self {
            image_id,
            latitude_deg,
            longitude_deg,
            altitude_m,
            platform_roll_deg,
            platform_pitch_deg,
            platform_yaw_deg,
            timestamp_ms,
            raw_latitude_deg: latitude_deg,
            raw_longitude_deg: longitude_deg,
        })
    }

    /// Nadir-pointing pose with level attitude, mostly for tests and benches.
    pub fn level(
        image_id: impl Into<String>,
        latitude_deg: f64,
        longitude_deg: f64,
        altitude_m: f64,
        platform_yaw_deg: f64,
    ) -> GeorefResult<Self> {
        Self::new(
            image_id,
            latitude_deg,
            longitude_deg,
            altitude_m,
            0.0,
            0.0,
            platform_yaw_deg,
            0.0,
        )
    }

    /// Builder-style timestamp override.
    pub fn with_timestamp_ms(mut self, timestamp_ms: f64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose [ id: {}, lat: {:.7}, lon: {:.7}, alt: {:.2}, yaw: {:.2}, t: {} ]",
            self.image_id,
            self.latitude_deg,
            self.longitude_deg,
            self.altitude_m,
            self.platform_yaw_deg,
            self.timestamp_ms
        )
    }
}
