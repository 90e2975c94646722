//! Trajectory diagnostics: capture-to-capture speed and smoothing shift.

use crate::geodesy::haversine_m;
use crate::pose::Pose;

/// Motion between one capture and the previous one (time order).
#[derive(Debug, Clone, PartialEq)]
pub struct VelocitySample {
    pub image_id: String,
    pub time_s: f64,
    pub dt_s: f64,
    pub distance_m: f64,
    /// `None` for the first capture and for repeated timestamps.
    pub speed_mps: Option<f64>,
}

/// Distance between the measured and the smoothed position of one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionalShift {
    pub image_id: String,
    pub shift_m: f64,
}

/// Speed profile over the working (smoothed) positions.
///
/// `poses` must be in time order.
pub fn velocity_profile(poses: &[Pose]) -> Vec<VelocitySample> {
    let mut samples = Vec::with_capacity(poses.len());
    let mut previous: Option<&Pose> = None;

    for pose in poses {
        let time_s = pose.timestamp_ms / 1000.0;
        let (dt_s, distance_m) = match previous {
            Some(prev) => (
                time_s - prev.timestamp_ms / 1000.0,
                haversine_m(
                    prev.latitude_deg,
                    prev.longitude_deg,
                    pose.latitude_deg,
                    pose.longitude_deg,
                ),
            ),
            None => (0.0, 0.0),
        };
        let speed_mps = (previous.is_some() && dt_s > 0.0).then(|| distance_m / dt_s);

        samples.push(VelocitySample {
            image_id: pose.image_id.clone(),
            time_s,
            dt_s,
            distance_m,
            speed_mps,
        });
        previous = Some(pose);
    }

    samples
}

/// How far the smoother moved each position, in meters.
pub fn positional_shifts(poses: &[Pose]) -> Vec<PositionalShift> {
    poses
        .iter()
        .map(|pose| PositionalShift {
            image_id: pose.image_id.clone(),
            shift_m: haversine_m(
                pose.raw_latitude_deg,
                pose.raw_longitude_deg,
                pose.latitude_deg,
                pose.longitude_deg,
            ),
        })
        .collect()
}
