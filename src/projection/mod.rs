//! Flat-ground projection of image pixels onto geographic coordinates.
//!
//! # Geometry
//!
//! Every pixel is assigned a horizontal angle `h` (linear across the columns,
//! `-hfov/2 ..= +hfov/2`) and a vertical angle `v` (linear across the rows,
//! `+vfov/2 ..= -vfov/2`, row 0 at the top). With the gimbal holding the
//! camera at a fixed pitch, the pixel's angle from nadir along the boresight
//! axis and its ground offsets are:
//!
//! ```text
//! tilt  = pitch + 90                      (pitch -90 = straight down)
//! theta = clamp(tilt + v, ±nadir_clamp)
//! along = alt * tan(theta)
//! perp  = alt * tan(h) / cos(theta)       (slant range widens off-nadir rows)
//! ```
//!
//! The offsets are rotated by the heading `yaw = (platform_yaw + mount_yaw) mod 360`
//! (clockwise from north; image top points along the heading, image right is
//! 90° clockwise of it):
//!
//! ```text
//! east  = perp * cos(yaw) + along * sin(yaw)
//! north = along * cos(yaw) - perp * sin(yaw)
//! ```
//!
//! and converted to degrees with [`crate::geodesy::offset_to_degrees`].
//!
//! Platform roll and pitch are not used: the gimbal holds the camera attitude
//! constant.

pub mod control_points;

pub use control_points::{ControlPoint, build_control_points};

use crate::error::{GeorefError, GeorefResult};
use crate::geodesy::offset_to_degrees;
use crate::pose::Pose;
use nalgebra::{DMatrix, DVector};
use std::fmt;
use tracing::debug;

/// Camera mounting and optics, constant for a whole run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMount {
    /// Gimbal pitch in degrees: -90 looks straight down, 0 at the horizon.
    pub pitch_offset_deg: f64,
    /// Camera yaw relative to the platform heading, clockwise.
    pub yaw_offset_deg: f64,
    pub horizontal_fov_deg: f64,
    /// Physical aspect ratio (width / height) overriding the pixel aspect.
    pub forced_aspect_ratio: Option<f64>,
}

impl Default for CameraMount {
    fn default() -> Self {
        Self {
            pitch_offset_deg: -90.0,
            yaw_offset_deg: 0.0,
            horizontal_fov_deg: 82.0,
            forced_aspect_ratio: None,
        }
    }
}

impl CameraMount {
    /// Create a validated mount.
    ///
    /// The boresight must stay strictly within 90° of nadir and the field of
    /// view strictly between 0° and 180°. Out-of-range values are rejected,
    /// never clipped.
    pub fn new(
        pitch_offset_deg: f64,
        yaw_offset_deg: f64,
        horizontal_fov_deg: f64,
        forced_aspect_ratio: Option<f64>,
    ) -> GeorefResult<Self> {
        let mount = Self {
            pitch_offset_deg,
            yaw_offset_deg,
            horizontal_fov_deg,
            forced_aspect_ratio,
        };
        mount.validate()?;
        Ok(mount)
    }

    pub fn validate(&self) -> GeorefResult<()> {
        if !(self.pitch_offset_deg.is_finite() && self.yaw_offset_deg.is_finite()) {
            return Err(GeorefError::InvalidInput(
                "camera pitch and yaw must be finite".to_string(),
            ));
        }

        let tilt = self.tilt_from_nadir_deg();
        if tilt <= -90.0 || tilt >= 90.0 {
            return Err(GeorefError::InvalidInput(format!(
                "camera pitch {} puts the boresight {tilt}° from nadir (must be within ±90°)",
                self.pitch_offset_deg
            )));
        }

        if !(self.horizontal_fov_deg > 0.0 && self.horizontal_fov_deg < 180.0) {
            return Err(GeorefError::InvalidInput(format!(
                "horizontal field of view must be in (0, 180), got {}",
                self.horizontal_fov_deg
            )));
        }

        if let Some(aspect) = self.forced_aspect_ratio
            && !(aspect.is_finite() && aspect > 0.0)
        {
            return Err(GeorefError::InvalidInput(format!(
                "forced aspect ratio must be positive, got {aspect}"
            )));
        }

        Ok(())
    }

    /// Angle between the boresight and nadir, positive toward the image top.
    pub fn tilt_from_nadir_deg(&self) -> f64 {
        self.pitch_offset_deg + 90.0
    }

    /// Aspect ratio used to derive the vertical field of view.
    pub fn aspect_ratio(&self, width_px: u32, height_px: u32) -> f64 {
        self.forced_aspect_ratio
            .unwrap_or(width_px as f64 / height_px as f64)
    }

    pub fn vertical_fov_deg(&self, width_px: u32, height_px: u32) -> f64 {
        self.horizontal_fov_deg / self.aspect_ratio(width_px, height_px)
    }
}

impl fmt::Display for CameraMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CameraMount [ pitch: {}, yaw: {}, hfov: {}, aspect: {} ]",
            self.pitch_offset_deg,
            self.yaw_offset_deg,
            self.horizontal_fov_deg,
            self.forced_aspect_ratio
                .map_or_else(|| "pixel".to_string(), |a| format!("{a:.4}"))
        )
    }
}

/// Projector tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectorConfig {
    /// Largest angle from nadir a ray may take before it is clamped.
    pub nadir_clamp_deg: f64,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            nadir_clamp_deg: 89.4,
        }
    }
}

impl ProjectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nadir_clamp_deg(mut self, nadir_clamp_deg: f64) -> Self {
        self.nadir_clamp_deg = nadir_clamp_deg;
        self
    }

    pub fn validate(&self) -> GeorefResult<()> {
        if !(self.nadir_clamp_deg > 0.0 && self.nadir_clamp_deg < 90.0) {
            return Err(GeorefError::InvalidInput(format!(
                "nadir clamp must be in (0, 90), got {}",
                self.nadir_clamp_deg
            )));
        }
        Ok(())
    }
}

/// Per-axis pixel angles of one image size (degrees).
#[derive(Debug, Clone)]
pub struct AngularField {
    /// One entry per column, left to right.
    pub horizontal_deg: DVector<f64>,
    /// One entry per row, top to bottom.
    pub vertical_deg: DVector<f64>,
}

impl AngularField {
    pub fn new(mount: &CameraMount, width_px: u32, height_px: u32) -> Self {
        let hfov = mount.horizontal_fov_deg;
        let vfov = mount.vertical_fov_deg(width_px, height_px);
        Self {
            horizontal_deg: linspace(-hfov / 2.0, hfov / 2.0, width_px as usize),
            vertical_deg: linspace(vfov / 2.0, -vfov / 2.0, height_px as usize),
        }
    }

    pub fn width(&self) -> usize {
        self.horizontal_deg.len()
    }

    pub fn height(&self) -> usize {
        self.vertical_deg.len()
    }
}

/// Evenly spaced values from `start` to `end` inclusive. One sample yields `start`.
fn linspace(start: f64, end: f64, n: usize) -> DVector<f64> {
    if n < 2 {
        return DVector::from_element(n, start);
    }
    let step = (end - start) / (n - 1) as f64;
    DVector::from_fn(n, |i, _| if i == n - 1 { end } else { start + step * i as f64 })
}

/// Geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundPoint {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

impl GroundPoint {
    pub fn new(latitude_deg: f64, longitude_deg: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
        }
    }

    fn is_finite(&self) -> bool {
        self.latitude_deg.is_finite() && self.longitude_deg.is_finite()
    }
}

/// Ground coordinates of every pixel of one image (`height x width`).
#[derive(Debug, Clone)]
pub struct GroundField {
    pub latitude_deg: DMatrix<f64>,
    pub longitude_deg: DMatrix<f64>,
    /// Pixels whose angle from nadir hit the clamp.
    pub clamped_pixels: usize,
}

impl GroundField {
    pub fn at(&self, row: usize, col: usize) -> GroundPoint {
        GroundPoint::new(self.latitude_deg[(row, col)], self.longitude_deg[(row, col)])
    }
}

/// Ground outline of one image. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundFootprint {
    pub image_id: String,
    /// Platform position the footprint was projected from.
    pub platform: GroundPoint,
    pub center: GroundPoint,
    pub top_left: GroundPoint,
    pub top_right: GroundPoint,
    pub bottom_left: GroundPoint,
    pub bottom_right: GroundPoint,
    pub image_width_px: u32,
    pub image_height_px: u32,
}

impl GroundFootprint {
    /// Corners in TL, TR, BL, BR order.
    pub fn corners(&self) -> [GroundPoint; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_left,
            self.bottom_right,
        ]
    }
}

impl fmt::Display for GroundFootprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GroundFootprint [ id: {}, center: ({:.7}, {:.7}), TL: ({:.7}, {:.7}), BR: ({:.7}, {:.7}) ]",
            self.image_id,
            self.center.latitude_deg,
            self.center.longitude_deg,
            self.top_left.latitude_deg,
            self.top_left.longitude_deg,
            self.bottom_right.latitude_deg,
            self.bottom_right.longitude_deg
        )
    }
}

/// Pose-dependent terms shared by every pixel of one image.
struct ViewGeometry {
    altitude_m: f64,
    origin: GroundPoint,
    tilt_deg: f64,
    clamp_deg: f64,
    sin_yaw: f64,
    cos_yaw: f64,
}

impl ViewGeometry {
    /// Ground point of one ray, and whether its nadir angle was clamped.
    fn project(&self, h_deg: f64, v_deg: f64) -> (GroundPoint, bool) {
        let raw = self.tilt_deg + v_deg;
        let theta_deg = raw.clamp(-self.clamp_deg, self.clamp_deg);
        let theta = theta_deg.to_radians();

        let along = self.altitude_m * theta.tan();
        let perp = self.altitude_m * h_deg.to_radians().tan() / theta.cos();

        let east = perp * self.cos_yaw + along * self.sin_yaw;
        let north = along * self.cos_yaw - perp * self.sin_yaw;

        let (dlat, dlon) = offset_to_degrees(east, north, self.origin.latitude_deg);
        let point = GroundPoint::new(
            self.origin.latitude_deg + dlat,
            self.origin.longitude_deg + dlon,
        );
        (point, theta_deg != raw)
    }
}

/// Projects poses onto the ground plane with one fixed camera mount.
#[derive(Debug, Clone)]
pub struct GeometricProjector {
    mount: CameraMount,
    config: ProjectorConfig,
}

impl GeometricProjector {
    /// Create a projector, validating both the mount and the config.
    pub fn new(mount: CameraMount) -> GeorefResult<Self> {
        Self::with_config(mount, ProjectorConfig::default())
    }

    pub fn with_config(mount: CameraMount, config: ProjectorConfig) -> GeorefResult<Self> {
        mount.validate()?;
        config.validate()?;
        Ok(Self { mount, config })
    }

    pub fn mount(&self) -> &CameraMount {
        &self.mount
    }

    pub fn config(&self) -> &ProjectorConfig {
        &self.config
    }

    /// Heading of the image top, degrees clockwise from north in `[0, 360)`.
    pub fn effective_yaw_deg(&self, pose: &Pose) -> f64 {
        (pose.platform_yaw_deg + self.mount.yaw_offset_deg).rem_euclid(360.0)
    }

    fn view(&self, pose: &Pose, width_px: u32, height_px: u32) -> GeorefResult<ViewGeometry> {
        if width_px < 2 || height_px < 2 {
            return Err(GeorefError::DegenerateGeometry(format!(
                "{}: image {width_px}x{height_px} has coincident corners",
                pose.image_id
            )));
        }
        if !(pose.altitude_m.is_finite() && pose.altitude_m > 0.0) {
            return Err(GeorefError::DegenerateGeometry(format!(
                "{}: altitude {} m leaves no ground footprint",
                pose.image_id, pose.altitude_m
            )));
        }

        let yaw = self.effective_yaw_deg(pose).to_radians();
        Ok(ViewGeometry {
            altitude_m: pose.altitude_m,
            origin: GroundPoint::new(pose.latitude_deg, pose.longitude_deg),
            tilt_deg: self.mount.tilt_from_nadir_deg(),
            clamp_deg: self.config.nadir_clamp_deg,
            sin_yaw: yaw.sin(),
            cos_yaw: yaw.cos(),
        })
    }

    /// Ground point of a single pixel.
    pub fn project_pixel(
        &self,
        pose: &Pose,
        field: &AngularField,
        row: usize,
        col: usize,
    ) -> GeorefResult<GroundPoint> {
        if row >= field.height() || col >= field.width() {
            return Err(GeorefError::InvalidInput(format!(
                "pixel ({row}, {col}) outside {}x{} field",
                field.width(),
                field.height()
            )));
        }
        let view = self.view(pose, field.width() as u32, field.height() as u32)?;
        let (point, _) = view.project(field.horizontal_deg[col], field.vertical_deg[row]);
        Ok(point)
    }

    /// Ground coordinates of every pixel.
    pub fn project_field(
        &self,
        pose: &Pose,
        width_px: u32,
        height_px: u32,
    ) -> GeorefResult<GroundField> {
        let view = self.view(pose, width_px, height_px)?;
        let angles = AngularField::new(&self.mount, width_px, height_px);
        let (rows, cols) = (angles.height(), angles.width());

        let mut latitude_deg = DMatrix::zeros(rows, cols);
        let mut longitude_deg = DMatrix::zeros(rows, cols);
        let mut clamped_pixels = 0;
        for row in 0..rows {
            let v = angles.vertical_deg[row];
            for col in 0..cols {
                let (point, clamped) = view.project(angles.horizontal_deg[col], v);
                latitude_deg[(row, col)] = point.latitude_deg;
                longitude_deg[(row, col)] = point.longitude_deg;
                clamped_pixels += usize::from(clamped);
            }
        }

        Ok(GroundField {
            latitude_deg,
            longitude_deg,
            clamped_pixels,
        })
    }

    /// Four corners and center of one image.
    ///
    /// Evaluates only the five pixels it needs; the values equal those of
    /// [`Self::project_field`] at the same indices.
    pub fn project(&self, pose: &Pose, width_px: u32, height_px: u32) -> GeorefResult<GroundFootprint> {
        let view = self.view(pose, width_px, height_px)?;
        let angles = AngularField::new(&self.mount, width_px, height_px);
        let (last_row, last_col) = (angles.height() - 1, angles.width() - 1);
        let (center_row, center_col) = (angles.height() / 2, angles.width() / 2);

        let mut clamped = 0;
        let mut at = |row: usize, col: usize| {
            let (point, was_clamped) =
                view.project(angles.horizontal_deg[col], angles.vertical_deg[row]);
            clamped += usize::from(was_clamped);
            point
        };

        let footprint = GroundFootprint {
            image_id: pose.image_id.clone(),
            platform: view.origin,
            center: at(center_row, center_col),
            top_left: at(0, 0),
            top_right: at(0, last_col),
            bottom_left: at(last_row, 0),
            bottom_right: at(last_row, last_col),
            image_width_px: width_px,
            image_height_px: height_px,
        };

        if clamped > 0 {
            debug!(
                "{}: {clamped} footprint rays clamped at ±{}° from nadir",
                pose.image_id, self.config.nadir_clamp_deg
            );
        }

        check_footprint(&footprint)?;
        Ok(footprint)
    }
}

/// Reject footprints with non-finite or coincident corners.
fn check_footprint(footprint: &GroundFootprint) -> GeorefResult<()> {
    let corners = footprint.corners();
    if !(footprint.center.is_finite() && corners.iter().all(GroundPoint::is_finite)) {
        return Err(GeorefError::DegenerateGeometry(format!(
            "{}: projection produced non-finite coordinates",
            footprint.image_id
        )));
    }
    for i in 0..corners.len() {
        for j in (i + 1)..corners.len() {
            if corners[i] == corners[j] {
                return Err(GeorefError::DegenerateGeometry(format!(
                    "{}: footprint corners {i} and {j} coincide",
                    footprint.image_id
                )));
            }
        }
    }
    Ok(())
}
