//! GPS trajectory smoothing with a constant-velocity Kalman filter.
//!
//! Latitude and longitude are treated as two locally Cartesian axes (a
//! small-angle approximation that holds at survey scale). A single 4-state
//! vector `[lat, lat_vel, lon, lon_vel]` is carried across the whole sequence,
//! so one predict/update cycle consumes the elapsed time since the previous
//! sample as its time step.
//!
//! # Model
//!
//! ```text
//! F(dt) = | 1 dt 0  0 |      H = | 1 0 0 0 |
//!         | 0  1 0  0 |          | 0 0 1 0 |
//!         | 0  0 1 dt |
//!         | 0  0 0  1 |
//!
//! Q_axis(dt) = q * | dt^4/4  dt^3/2 |      R = r * I2
//!                  | dt^3/2  dt^2   |
//! ```
//!
//! Time steps are taken in seconds. The first sample only seeds the state.

use crate::pose::Pose;
use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};
use thiserror::Error;
use tracing::debug;

/// Errors raised while filtering a trajectory
#[derive(Debug, Clone, Error)]
pub enum SmootherError {
    #[error("Timestamps decrease at sample {index} (dt = {dt_ms} ms)")]
    NonMonotonicTime { index: usize, dt_ms: f64 },

    #[error("Sample {index} has a non-finite time or position")]
    NonFinite { index: usize },

    #[error("Innovation covariance is singular at sample {index}")]
    SingularInnovation { index: usize },

    #[error("Invalid smoother configuration: {0}")]
    InvalidConfig(String),
}

/// One raw trajectory measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySample {
    pub time_ms: f64,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

impl TrajectorySample {
    pub fn new(time_ms: f64, latitude_deg: f64, longitude_deg: f64) -> Self {
        Self {
            time_ms,
            latitude_deg,
            longitude_deg,
        }
    }
}

/// Filtered position with the measurement it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedSample {
    pub time_ms: f64,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub raw_latitude_deg: f64,
    pub raw_longitude_deg: f64,
}

/// Noise parameters of the constant-velocity model.
#[derive(Debug, Clone, PartialEq)]
pub struct SmootherConfig {
    /// Diagonal of the initial state covariance. Kept well above the
    /// measurement noise so the first samples pull the state quickly.
    pub initial_variance: f64,
    /// Per-axis measurement variance (deg²).
    pub measurement_variance: f64,
    /// White-noise intensity of the process model.
    pub process_variance: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            initial_variance: 10.0,
            measurement_variance: 1e-5,
            process_variance: 1e-6,
        }
    }
}

impl SmootherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_variance(mut self, initial_variance: f64) -> Self {
        self.initial_variance = initial_variance;
        self
    }

    pub fn with_measurement_variance(mut self, measurement_variance: f64) -> Self {
        self.measurement_variance = measurement_variance;
        self
    }

    pub fn with_process_variance(mut self, process_variance: f64) -> Self {
        self.process_variance = process_variance;
        self
    }

    /// Check that every variance is finite and usable.
    pub fn validate(&self) -> Result<(), SmootherError> {
        if !(self.initial_variance.is_finite() && self.initial_variance > 0.0) {
            return Err(SmootherError::InvalidConfig(format!(
                "initial variance must be positive, got {}",
                self.initial_variance
            )));
        }
        if !(self.measurement_variance.is_finite() && self.measurement_variance > 0.0) {
            return Err(SmootherError::InvalidConfig(format!(
                "measurement variance must be positive, got {}",
                self.measurement_variance
            )));
        }
        if !(self.process_variance.is_finite() && self.process_variance >= 0.0) {
            return Err(SmootherError::InvalidConfig(format!(
                "process variance must be non-negative, got {}",
                self.process_variance
            )));
        }
        Ok(())
    }
}

/// Sequential trajectory smoother. Each state update depends on the previous
/// one, so the sequence cannot be split across threads.
#[derive(Debug, Clone, Default)]
pub struct TrajectorySmoother {
    config: SmootherConfig,
}

impl TrajectorySmoother {
    /// Create a smoother with the default noise model.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SmootherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SmootherConfig {
        &self.config
    }

    /// Filter a time-ordered sequence of measurements.
    ///
    /// Returns one smoothed sample per input, in the same order. An empty
    /// input yields an empty output and a single sample is returned as-is.
    pub fn smooth(&self, samples: &[TrajectorySample]) -> Result<Vec<SmoothedSample>, SmootherError> {
        self.config.validate()?;

        if let Some(index) = samples.iter().position(|s| {
            !(s.time_ms.is_finite() && s.latitude_deg.is_finite() && s.longitude_deg.is_finite())
        }) {
            return Err(SmootherError::NonFinite { index });
        }

        let Some(first) = samples.first() else {
            return Ok(Vec::new());
        };

        let mut filter = ConstantVelocityFilter::seed(first, &self.config);
        let mut output = Vec::with_capacity(samples.len());
        output.push(SmoothedSample {
            time_ms: first.time_ms,
            latitude_deg: first.latitude_deg,
            longitude_deg: first.longitude_deg,
            raw_latitude_deg: first.latitude_deg,
            raw_longitude_deg: first.longitude_deg,
        });

        for (index, pair) in samples.windows(2).enumerate() {
            let (prev, sample) = (&pair[0], &pair[1]);
            let dt_ms = sample.time_ms - prev.time_ms;
            if dt_ms < 0.0 {
                return Err(SmootherError::NonMonotonicTime {
                    index: index + 1,
                    dt_ms,
                });
            }

            filter.predict(dt_ms / 1000.0);
            filter.update(
                Vector2::new(sample.latitude_deg, sample.longitude_deg),
                index + 1,
            )?;

            output.push(SmoothedSample {
                time_ms: sample.time_ms,
                latitude_deg: filter.state[0],
                longitude_deg: filter.state[2],
                raw_latitude_deg: sample.latitude_deg,
                raw_longitude_deg: sample.longitude_deg,
            });
        }

        debug!(
            "Smoothed {} samples, final velocity [{:.3e}, {:.3e}] deg/s",
            output.len(),
            filter.state[1],
            filter.state[3]
        );

        Ok(output)
    }

    /// Smooth poses in place.
    ///
    /// The raw position fields are the measurements; the primary position
    /// fields receive the filtered estimate. Poses must already be ordered by
    /// timestamp. Running this twice gives the same result as running it once.
    pub fn smooth_poses(&self, poses: &mut [Pose]) -> Result<(), SmootherError> {
        let samples: Vec<TrajectorySample> = poses
            .iter()
            .map(|p| TrajectorySample::new(p.timestamp_ms, p.raw_latitude_deg, p.raw_longitude_deg))
            .collect();

        let smoothed = self.smooth(&samples)?;
        for (pose, s) in poses.iter_mut().zip(smoothed) {
            pose.latitude_deg = s.latitude_deg;
            pose.longitude_deg = s.longitude_deg;
        }
        Ok(())
    }
}

/// State and covariance of the 4-state filter.
struct ConstantVelocityFilter {
    state: Vector4<f64>,
    covariance: Matrix4<f64>,
    measurement_noise: Matrix2<f64>,
    observation: Matrix2x4<f64>,
    process_variance: f64,
}

impl ConstantVelocityFilter {
    fn seed(first: &TrajectorySample, config: &SmootherConfig) -> Self {
        Self {
            state: Vector4::new(first.latitude_deg, 0.0, first.longitude_deg, 0.0),
            covariance: Matrix4::identity() * config.initial_variance,
            measurement_noise: Matrix2::identity() * config.measurement_variance,
            observation: Matrix2x4::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0),
            process_variance: config.process_variance,
        }
    }

    /// Propagate by `dt` seconds. `dt == 0` leaves state and covariance untouched.
    fn predict(&mut self, dt: f64) {
        let f = transition(dt);
        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + process_noise(dt, self.process_variance);
    }

    fn update(&mut self, z: Vector2<f64>, index: usize) -> Result<(), SmootherError> {
        let h = &self.observation;
        let innovation = z - h * self.state;
        let s = h * self.covariance * h.transpose() + self.measurement_noise;
        let s_inv = s
            .try_inverse()
            .ok_or(SmootherError::SingularInnovation { index })?;
        let gain = self.covariance * h.transpose() * s_inv;

        self.state += gain * innovation;
        self.covariance = (Matrix4::identity() - gain * h) * self.covariance;
        Ok(())
    }
}

fn transition(dt: f64) -> Matrix4<f64> {
    let mut f = Matrix4::identity();
    f[(0, 1)] = dt;
    f[(2, 3)] = dt;
    f
}

/// Discrete white-noise acceleration model, one 2x2 block per axis.
fn process_noise(dt: f64, variance: f64) -> Matrix4<f64> {
    let dt2 = dt * dt;
    let dt3 = dt2 * dt;
    let dt4 = dt3 * dt;

    let mut q = Matrix4::zeros();
    for base in [0, 2] {
        q[(base, base)] = dt4 / 4.0;
        q[(base, base + 1)] = dt3 / 2.0;
        q[(base + 1, base)] = dt3 / 2.0;
        q[(base + 1, base + 1)] = dt2;
    }
    q * variance
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const TOLERANCE: f64 = 1e-12;

    fn samples_at(times: &[f64], lat: f64, lon: f64) -> Vec<TrajectorySample> {
        times
            .iter()
            .map(|&t| TrajectorySample::new(t, lat, lon))
            .collect()
    }

    #[test]
    fn test_empty_input() -> Result<(), SmootherError> {
        let out = TrajectorySmoother::new().smooth(&[])?;
        assert!(out.is_empty());
        Ok(())
    }

    #[test]
    fn test_single_sample_is_unchanged() -> Result<(), SmootherError> {
        let input = [TrajectorySample::new(500.0, 10.0, 20.0)];
        let out = TrajectorySmoother::new().smooth(&input)?;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].latitude_deg, 10.0);
        assert_eq!(out[0].longitude_deg, 20.0);
        assert_eq!(out[0].raw_latitude_deg, 10.0);
        Ok(())
    }

    #[test]
    fn test_constant_input_has_no_drift() -> Result<(), SmootherError> {
        let times: Vec<f64> = (0..50).map(|i| i as f64 * 1000.0 + (i % 3) as f64 * 170.0).collect();
        let input = samples_at(&times, 47.123456, 8.654321);
        let out = TrajectorySmoother::new().smooth(&input)?;

        assert_eq!(out.len(), input.len());
        for s in &out {
            assert!((s.latitude_deg - 47.123456).abs() < TOLERANCE);
            assert!((s.longitude_deg - 8.654321).abs() < TOLERANCE);
        }
        Ok(())
    }

    #[test]
    fn test_duplicate_timestamps_stay_finite() -> Result<(), SmootherError> {
        let input = vec![
            TrajectorySample::new(0.0, 10.0, 20.0),
            TrajectorySample::new(1000.0, 10.00001, 20.00001),
            TrajectorySample::new(1000.0, 10.00002, 20.00002),
            TrajectorySample::new(2000.0, 10.00003, 20.00003),
        ];
        let out = TrajectorySmoother::new().smooth(&input)?;
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|s| s.latitude_deg.is_finite() && s.longitude_deg.is_finite()));
        Ok(())
    }

    #[test]
    fn test_zero_dt_predict_is_identity() {
        assert_eq!(transition(0.0), Matrix4::identity());
        assert_eq!(process_noise(0.0, 1e-6), Matrix4::zeros());
    }

    #[test]
    fn test_process_noise_grows_with_gap() {
        let short = process_noise(0.5, 1e-6);
        let long = process_noise(2.0, 1e-6);
        assert!(long[(0, 0)] > short[(0, 0)]);
        assert!(long[(1, 1)] > short[(1, 1)]);
        assert_eq!(long[(0, 2)], 0.0);
    }

    #[test]
    fn test_decreasing_time_is_rejected() {
        let input = vec![
            TrajectorySample::new(1000.0, 10.0, 20.0),
            TrajectorySample::new(900.0, 10.0, 20.0),
        ];
        let result = TrajectorySmoother::new().smooth(&input);
        assert!(matches!(
            result,
            Err(SmootherError::NonMonotonicTime { index: 1, .. })
        ));
    }

    #[test]
    fn test_non_finite_sample_is_rejected() {
        let input = vec![
            TrajectorySample::new(0.0, 10.0, 20.0),
            TrajectorySample::new(1000.0, f64::NAN, 20.0),
        ];
        assert!(matches!(
            TrajectorySmoother::new().smooth(&input),
            Err(SmootherError::NonFinite { index: 1 })
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let smoother =
            TrajectorySmoother::with_config(SmootherConfig::new().with_measurement_variance(0.0));
        let input = [TrajectorySample::new(0.0, 10.0, 20.0)];
        assert!(matches!(
            smoother.smooth(&input),
            Err(SmootherError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_smoothing_reduces_noise_on_straight_flight() -> Result<(), SmootherError> {
        let mut rng = StdRng::seed_from_u64(7);
        let velocity = 1e-5; // deg/s, roughly 1 m/s
        let noise = 2e-5;

        let truth: Vec<(f64, f64, f64)> = (0..300)
            .map(|i| {
                let t = i as f64;
                (t * 1000.0, 10.0 + velocity * t, 20.0 + 0.5 * velocity * t)
            })
            .collect();
        let input: Vec<TrajectorySample> = truth
            .iter()
            .map(|&(t, lat, lon)| {
                TrajectorySample::new(
                    t,
                    lat + rng.random_range(-noise..noise),
                    lon + rng.random_range(-noise..noise),
                )
            })
            .collect();

        let out = TrajectorySmoother::new().smooth(&input)?;

        let (mut raw_err, mut smooth_err) = (0.0, 0.0);
        for ((truth, raw), smoothed) in truth.iter().zip(&input).zip(&out).skip(20) {
            raw_err += (raw.latitude_deg - truth.1).powi(2) + (raw.longitude_deg - truth.2).powi(2);
            smooth_err += (smoothed.latitude_deg - truth.1).powi(2)
                + (smoothed.longitude_deg - truth.2).powi(2);
            assert_eq!(smoothed.raw_latitude_deg, raw.latitude_deg);
        }
        assert!(
            smooth_err < raw_err,
            "smoothed error {smooth_err:e} should be below raw error {raw_err:e}"
        );
        Ok(())
    }

    #[test]
    fn test_smooth_poses_is_repeatable() -> Result<(), Box<dyn std::error::Error>> {
        let mut poses = vec![
            Pose::level("a.jpg", 10.0, 20.0, 100.0, 0.0)?.with_timestamp_ms(0.0),
            Pose::level("b.jpg", 10.0001, 20.0001, 100.0, 0.0)?.with_timestamp_ms(1000.0),
            Pose::level("c.jpg", 10.0003, 20.0001, 100.0, 0.0)?.with_timestamp_ms(2000.0),
        ];
        let smoother = TrajectorySmoother::new();
        smoother.smooth_poses(&mut poses)?;
        let once: Vec<(f64, f64)> = poses.iter().map(|p| (p.latitude_deg, p.longitude_deg)).collect();
        smoother.smooth_poses(&mut poses)?;

        for (pose, (lat, lon)) in poses.iter().zip(once) {
            assert_eq!(pose.latitude_deg, lat);
            assert_eq!(pose.longitude_deg, lon);
        }
        assert_eq!(poses[2].raw_latitude_deg, 10.0003);
        Ok(())
    }
}
