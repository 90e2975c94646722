//! End-to-end georeferencing run over one trajectory table.
//!
//! Smoothing is sequential over the whole trajectory. Projection and control
//! point construction are independent per image and run on the rayon pool.
//! Output paths are then claimed in filename order, and rectification runs on
//! the pool again. Results are collected in filename order.

use crate::error::GeorefResult;
use crate::io::raster::{
    ImageSource, RasterInfo, RasterRectifier, RectifierConfig, RectifyRequest,
};
use crate::io::tables::{self, CONTROL_POINTS_FILE, GEOMETRIC_QUALITY_FILE};
use crate::io::{RejectedRow, TrajectoryTable};
use crate::pose::Pose;
use crate::projection::{
    CameraMount, ControlPoint, GeometricProjector, GroundFootprint, ProjectorConfig,
    build_control_points,
};
use crate::smoother::{SmootherConfig, TrajectorySmoother};
use crate::verification::{
    GeometricVerifier, PositionalShift, QualityReport, VelocitySample, VerifierConfig,
    positional_shifts, velocity_profile,
};
use rayon::prelude::*;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Configuration for a pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub mount: CameraMount,
    pub projector: ProjectorConfig,
    pub smoother: SmootherConfig,
    pub verifier: VerifierConfig,
    pub rectifier: RectifierConfig,
    /// Directory receiving rectified rasters.
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mount: CameraMount::default(),
            projector: ProjectorConfig::default(),
            smoother: SmootherConfig::default(),
            verifier: VerifierConfig::default(),
            rectifier: RectifierConfig::default(),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mount(mut self, mount: CameraMount) -> Self {
        self.mount = mount;
        self
    }

    pub fn with_projector(mut self, projector: ProjectorConfig) -> Self {
        self.projector = projector;
        self
    }

    pub fn with_smoother(mut self, smoother: SmootherConfig) -> Self {
        self.smoother = smoother;
        self
    }

    pub fn with_verifier(mut self, verifier: VerifierConfig) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_rectifier(mut self, rectifier: RectifierConfig) -> Self {
        self.rectifier = rectifier;
        self
    }

    pub fn with_output_dir<P: AsRef<Path>>(mut self, output_dir: P) -> Self {
        self.output_dir = output_dir.as_ref().to_path_buf();
        self
    }
}

/// An image left out of a stage, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedImage {
    pub image_id: String,
    pub reason: String,
}

/// Everything one run produced.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Smoothed poses in time order.
    pub poses: Vec<Pose>,
    /// Footprints in filename order.
    pub footprints: Vec<GroundFootprint>,
    pub control_points: Vec<(String, [ControlPoint; 4])>,
    /// Artifacts written by the rectifier, per image.
    pub rasters: Vec<(String, PathBuf)>,
    pub quality: Option<QualityReport>,
    pub velocity: Vec<VelocitySample>,
    pub shifts: Vec<PositionalShift>,
    /// Images left out of every downstream table.
    pub skipped: Vec<SkippedImage>,
    /// Images that kept their footprint but got no raster.
    pub rectify_failures: Vec<SkippedImage>,
    pub rejected: Vec<RejectedRow>,
}

impl PipelineReport {
    /// Write every report table into `dir`, returning the written paths.
    ///
    /// The quality tables are only written when there was something to verify.
    pub fn write_tables<P: AsRef<Path>>(&self, dir: P) -> GeorefResult<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();

        let path = dir.join(tables::SMOOTHED_TRAJECTORY_FILE);
        tables::write_smoothed_trajectory(&path, &self.poses)?;
        written.push(path);

        let path = dir.join(tables::VELOCITY_FILE);
        tables::write_velocity(&path, &self.velocity)?;
        written.push(path);

        let path = dir.join(tables::POSITIONAL_SHIFT_FILE);
        tables::write_positional_shift(&path, &self.shifts)?;
        written.push(path);

        let path = dir.join(tables::VERIFICATION_CORNERS_FILE);
        tables::write_verification_corners(&path, &self.footprints)?;
        written.push(path);

        let path = dir.join(CONTROL_POINTS_FILE);
        tables::write_control_points(&path, &self.control_points)?;
        written.push(path);

        if let Some(quality) = &self.quality {
            let path = dir.join(GEOMETRIC_QUALITY_FILE);
            tables::write_geometric_quality(&path, &quality.rows)?;
            written.push(path);

            let path = dir.join(tables::QUALITY_SUMMARY_FILE);
            tables::write_quality_summary(&path, &quality.summary)?;
            written.push(path);
        }

        info!("Wrote {} tables to {}", written.len(), dir.display());
        Ok(written)
    }
}

struct ProjectedImage {
    footprint: GroundFootprint,
    control_points: [ControlPoint; 4],
    raster: RasterInfo,
}

pub struct GeoreferencePipeline<S: ImageSource, R: RasterRectifier> {
    config: PipelineConfig,
    projector: GeometricProjector,
    smoother: TrajectorySmoother,
    verifier: GeometricVerifier,
    source: S,
    rectifier: R,
}

impl<S: ImageSource, R: RasterRectifier> GeoreferencePipeline<S, R> {
    /// Build a pipeline, validating every stage configuration up front.
    pub fn new(config: PipelineConfig, source: S, rectifier: R) -> GeorefResult<Self> {
        let projector = GeometricProjector::with_config(config.mount, config.projector.clone())?;
        config.smoother.validate()?;
        let smoother = TrajectorySmoother::with_config(config.smoother.clone());
        let verifier = GeometricVerifier::with_config(config.verifier.clone());

        Ok(Self {
            config,
            projector,
            smoother,
            verifier,
            source,
            rectifier,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, table: TrajectoryTable) -> GeorefResult<PipelineReport> {
        let TrajectoryTable {
            mut poses,
            rejected,
        } = table;

        if !rejected.is_empty() {
            warn!("{} metadata rows excluded at load", rejected.len());
        }
        info!(
            "Georeferencing {} images with {}",
            poses.len(),
            self.projector.mount()
        );

        self.smoother.smooth_poses(&mut poses)?;
        let velocity = velocity_profile(&poses);
        let shifts = positional_shifts(&poses);

        let mut by_name: Vec<&Pose> = poses.iter().collect();
        by_name.sort_by(|a, b| a.image_id.cmp(&b.image_id));

        let outcomes: Vec<Result<ProjectedImage, SkippedImage>> = by_name
            .par_iter()
            .map(|pose| self.project_image(pose))
            .collect();

        let mut report = PipelineReport {
            velocity,
            shifts,
            rejected,
            ..PipelineReport::default()
        };
        let mut projected = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(image) => projected.push(image),
                Err(skipped) => report.skipped.push(skipped),
            }
        }

        // first image in filename order owns an output path
        let results: Vec<(String, GeorefResult<Option<PathBuf>>)> = {
            let mut claimed: HashMap<PathBuf, &str> = HashMap::new();
            let mut jobs = Vec::with_capacity(projected.len());
            for image in &projected {
                let image_id = image.footprint.image_id.as_str();
                let output = self
                    .config
                    .rectifier
                    .output_path(&self.config.output_dir, image_id);
                match claimed.entry(output) {
                    Entry::Occupied(owner) => {
                        let reason = format!(
                            "output {} already claimed by {}",
                            owner.key().display(),
                            owner.get()
                        );
                        warn!("Not rectifying {image_id}: {reason}");
                        report.rectify_failures.push(SkippedImage {
                            image_id: image_id.to_string(),
                            reason,
                        });
                    }
                    Entry::Vacant(slot) => {
                        jobs.push((image, slot.key().clone()));
                        slot.insert(image_id);
                    }
                }
            }

            jobs.par_iter()
                .map(|(image, output)| {
                    (
                        image.footprint.image_id.clone(),
                        self.rectify_image(image, output.clone()),
                    )
                })
                .collect()
        };
        for (image_id, result) in results {
            match result {
                Ok(Some(path)) => report.rasters.push((image_id, path)),
                Ok(None) => {}
                Err(e) => {
                    warn!("Rectification failed for {image_id}: {e}");
                    report.rectify_failures.push(SkippedImage {
                        image_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        for image in projected {
            report
                .control_points
                .push((image.footprint.image_id.clone(), image.control_points));
            report.footprints.push(image.footprint);
        }

        report.quality = self.verifier.verify(&report.footprints);
        report.poses = poses;

        info!(
            "Projected {} images, skipped {}, rectified {}",
            report.footprints.len(),
            report.skipped.len(),
            report.rasters.len()
        );
        Ok(report)
    }

    fn project_image(&self, pose: &Pose) -> Result<ProjectedImage, SkippedImage> {
        let skip = |reason: String| {
            warn!("Skipping {}: {reason}", pose.image_id);
            SkippedImage {
                image_id: pose.image_id.clone(),
                reason,
            }
        };

        let raster = self
            .source
            .describe(&pose.image_id)
            .map_err(|e| skip(e.to_string()))?;
        let footprint = self
            .projector
            .project(pose, raster.width_px, raster.height_px)
            .map_err(|e| skip(e.to_string()))?;
        debug!("{footprint}");

        Ok(ProjectedImage {
            control_points: build_control_points(&footprint),
            footprint,
            raster,
        })
    }

    fn rectify_image(
        &self,
        image: &ProjectedImage,
        output_path: PathBuf,
    ) -> GeorefResult<Option<PathBuf>> {
        let image_id = image.footprint.image_id.as_str();
        let source_path = self.source.path(image_id);
        self.rectifier.rectify(&RectifyRequest {
            image_id,
            source_path: &source_path,
            output_path,
            raster: image.raster,
            control_points: &image.control_points,
            config: &self.config.rectifier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeorefError;
    use crate::io::IoError;
    use crate::io::raster::NullRectifier;
    use tempfile::TempDir;

    struct FixedSizes(HashMap<String, RasterInfo>);

    impl FixedSizes {
        fn new(ids: &[&str]) -> Self {
            Self(
                ids.iter()
                    .map(|id| (id.to_string(), RasterInfo::rgb8(1600, 1300)))
                    .collect(),
            )
        }
    }

    impl ImageSource for FixedSizes {
        fn describe(&self, image_id: &str) -> Result<RasterInfo, IoError> {
            self.0.get(image_id).copied().ok_or_else(|| IoError::Image {
                path: image_id.to_string(),
                message: "file not found".to_string(),
            })
        }

        fn path(&self, image_id: &str) -> PathBuf {
            PathBuf::from(image_id)
        }
    }

    struct FailingRectifier;

    impl RasterRectifier for FailingRectifier {
        fn rectify(&self, _request: &RectifyRequest<'_>) -> GeorefResult<Option<PathBuf>> {
            Err(GeorefError::Rectifier("warp unavailable".to_string()))
        }
    }

    /// Reports the requested output without touching the disk.
    struct EchoRectifier;

    impl RasterRectifier for EchoRectifier {
        fn rectify(&self, request: &RectifyRequest<'_>) -> GeorefResult<Option<PathBuf>> {
            Ok(Some(request.output_path.clone()))
        }
    }

    fn table() -> GeorefResult<TrajectoryTable> {
        let poses = vec![
            Pose::new("c.jpg", 10.0, 20.0, 100.0, 0.0, 0.0, 0.0, 0.0)?,
            Pose::new("a.jpg", 10.0001, 20.0, 100.0, 0.0, 0.0, 0.0, 2000.0)?,
            Pose::new("b.jpg", 10.0002, 20.0, 100.0, 0.0, 0.0, 0.0, 4000.0)?,
        ];
        Ok(TrajectoryTable::from_poses(poses))
    }

    #[test]
    fn test_run_orders_by_filename() -> GeorefResult<()> {
        let pipeline = GeoreferencePipeline::new(
            PipelineConfig::new(),
            FixedSizes::new(&["a.jpg", "b.jpg", "c.jpg"]),
            NullRectifier,
        )?;
        let report = pipeline.run(table()?)?;

        let ids: Vec<&str> = report.footprints.iter().map(|f| f.image_id.as_str()).collect();
        assert_eq!(ids, ["a.jpg", "b.jpg", "c.jpg"]);
        assert_eq!(report.poses[0].image_id, "c.jpg");
        assert_eq!(report.control_points.len(), 3);
        assert!(report.rasters.is_empty());
        assert!(report.rectify_failures.is_empty());
        assert_eq!(report.velocity.len(), 3);
        assert_eq!(report.shifts.len(), 3);
        assert_eq!(report.quality.map(|q| q.rows.len()), Some(3));
        Ok(())
    }

    #[test]
    fn test_missing_image_is_skipped() -> GeorefResult<()> {
        let pipeline = GeoreferencePipeline::new(
            PipelineConfig::new(),
            FixedSizes::new(&["a.jpg", "c.jpg"]),
            NullRectifier,
        )?;
        let report = pipeline.run(table()?)?;

        assert_eq!(report.footprints.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].image_id, "b.jpg");
        assert!(report.control_points.iter().all(|(id, _)| id != "b.jpg"));
        let rows = report.quality.map(|q| q.rows).unwrap_or_default();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.image_id != "b.jpg"));
        // trajectory diagnostics still cover every pose
        assert_eq!(report.velocity.len(), 3);
        Ok(())
    }

    #[test]
    fn test_rectifier_failure_keeps_footprint() -> GeorefResult<()> {
        let pipeline = GeoreferencePipeline::new(
            PipelineConfig::new(),
            FixedSizes::new(&["a.jpg", "b.jpg", "c.jpg"]),
            FailingRectifier,
        )?;
        let report = pipeline.run(table()?)?;
        assert_eq!(report.footprints.len(), 3);
        assert!(report.skipped.is_empty());
        assert!(report.rasters.is_empty());

        let failed: Vec<&str> = report
            .rectify_failures
            .iter()
            .map(|f| f.image_id.as_str())
            .collect();
        assert_eq!(failed, ["a.jpg", "b.jpg", "c.jpg"]);
        assert!(report.rectify_failures[0].reason.contains("warp unavailable"));
        Ok(())
    }

    #[test]
    fn test_colliding_output_paths_rectify_once() -> GeorefResult<()> {
        let poses = vec![
            Pose::new("DJI_0001.tif", 10.0, 20.0, 100.0, 0.0, 0.0, 0.0, 0.0)?,
            Pose::new("DJI_0001.JPG", 10.0001, 20.0, 100.0, 0.0, 0.0, 0.0, 2000.0)?,
        ];
        let pipeline = GeoreferencePipeline::new(
            PipelineConfig::new().with_output_dir("out"),
            FixedSizes::new(&["DJI_0001.JPG", "DJI_0001.tif"]),
            EchoRectifier,
        )?;
        let report = pipeline.run(TrajectoryTable::from_poses(poses))?;

        assert_eq!(report.footprints.len(), 2);
        assert_eq!(
            report.rasters,
            [(
                "DJI_0001.JPG".to_string(),
                PathBuf::from("out/DJI_0001_final.tif")
            )]
        );
        assert_eq!(report.rectify_failures.len(), 1);
        assert_eq!(report.rectify_failures[0].image_id, "DJI_0001.tif");
        assert!(report.rectify_failures[0].reason.contains("DJI_0001.JPG"));
        Ok(())
    }

    #[test]
    fn test_rejected_rows_carried_into_report() -> GeorefResult<()> {
        let mut table = table()?;
        table.rejected.push(RejectedRow {
            line: 5,
            image_id: Some("d.jpg".to_string()),
            reason: "invalid number 'abc' in GPS_Altitude".to_string(),
        });
        let pipeline = GeoreferencePipeline::new(
            PipelineConfig::new(),
            FixedSizes::new(&["a.jpg", "b.jpg", "c.jpg"]),
            NullRectifier,
        )?;
        let report = pipeline.run(table)?;

        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].line, 5);
        assert!(report.footprints.iter().all(|f| f.image_id != "d.jpg"));
        Ok(())
    }

    #[test]
    fn test_empty_table() -> GeorefResult<()> {
        let dir = TempDir::new()?;
        let pipeline =
            GeoreferencePipeline::new(PipelineConfig::new(), FixedSizes::new(&[]), NullRectifier)?;
        let report = pipeline.run(TrajectoryTable::default())?;
        assert!(report.footprints.is_empty());
        assert!(report.quality.is_none());

        let written = report.write_tables(dir.path())?;
        assert_eq!(written.len(), 5);
        assert!(!dir.path().join(GEOMETRIC_QUALITY_FILE).exists());
        assert!(!dir.path().join(tables::QUALITY_SUMMARY_FILE).exists());
        assert!(dir.path().join(tables::VERIFICATION_CORNERS_FILE).is_file());
        Ok(())
    }

    #[test]
    fn test_invalid_mount_rejected_at_construction() {
        let mut config = PipelineConfig::new();
        config.mount.horizontal_fov_deg = 0.0;
        assert!(GeoreferencePipeline::new(config, FixedSizes::new(&[]), NullRectifier).is_err());
    }

    #[test]
    fn test_write_tables() -> GeorefResult<()> {
        let dir = TempDir::new()?;
        let pipeline = GeoreferencePipeline::new(
            PipelineConfig::new().with_output_dir(dir.path()),
            FixedSizes::new(&["a.jpg", "b.jpg", "c.jpg"]),
            NullRectifier,
        )?;
        let report = pipeline.run(table()?)?;
        let written = report.write_tables(dir.path().join("tables"))?;

        assert_eq!(written.len(), 7);
        assert!(written.iter().all(|p| p.is_file()));

        let reloaded =
            <tables::CornerTableLoader as crate::io::TableLoader>::load(&written[3])?;
        assert_eq!(reloaded, report.footprints);
        Ok(())
    }
}
