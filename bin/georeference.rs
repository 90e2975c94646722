//! Georeference a survey flight
//!
//! Reads the per-image metadata table, smooths the trajectory, projects every
//! image footprint onto the ground and writes the verification tables plus one
//! rectification sidecar per image.
//!
//! # Usage
//! ```bash
//! cargo run --release --bin georeference -- metadata.csv --images images --output output
//!
//! # Forward-looking camera, report tables only:
//! cargo run --release --bin georeference -- metadata.csv --camera-pitch -60 --no-rectify
//! ```

use clap::Parser;
use drone_georef::io::raster::{
    ImageDirectory, NullRectifier, RasterRectifier, RectifierConfig, Resampling, VrtRectifier,
};
use drone_georef::io::{TableLoader, TrajectoryLoader, TrajectoryTable};
use drone_georef::{
    CameraMount, GeoreferencePipeline, PipelineConfig, PipelineReport, init_logger_with_level,
};
use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{Level, info};

/// Drone image georeferencing
#[derive(Parser)]
#[command(name = "georeference")]
#[command(about = "Project drone images onto the ground and write georeferencing tables")]
struct Args {
    /// Per-image metadata CSV (required, positional)
    #[arg(value_name = "METADATA")]
    metadata: PathBuf,

    /// Directory holding the images named in the metadata table
    #[arg(long, default_value = "images")]
    images: PathBuf,

    /// Directory receiving tables and rectification sidecars
    #[arg(long, default_value = "output")]
    output: PathBuf,

    /// Camera pitch in degrees (-90 looks straight down)
    #[arg(long, default_value = "-90", allow_hyphen_values = true)]
    camera_pitch: f64,

    /// Camera yaw offset from the platform heading in degrees
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    camera_yaw: f64,

    /// Horizontal field of view in degrees
    #[arg(long, default_value = "82")]
    hfov: f64,

    /// Sensor aspect ratio (width / height), overrides the pixel aspect
    #[arg(long)]
    aspect: Option<f64>,

    /// Resampling kernel for rectification: "bilinear" or "cubic"
    #[arg(long, default_value = "bilinear")]
    resampling: Resampling,

    /// Skip rectification and only write the tables
    #[arg(long)]
    no_rectify: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    init_logger_with_level(if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    });

    info!("DRONE GEOREFERENCING");
    info!("");

    if !args.metadata.exists() {
        return Err(format!("File not found: {}", args.metadata.display()).into());
    }

    let start = Instant::now();
    let table = TrajectoryLoader::load(&args.metadata)?;

    let mount = CameraMount::new(args.camera_pitch, args.camera_yaw, args.hfov, args.aspect)?;
    let config = PipelineConfig::new()
        .with_mount(mount)
        .with_rectifier(RectifierConfig::new().with_resampling(args.resampling))
        .with_output_dir(&args.output);
    let source = ImageDirectory::new(&args.images);

    let report = if args.no_rectify {
        run(config, source, NullRectifier, table)?
    } else {
        run(config, source, VrtRectifier::new(), table)?
    };
    report.write_tables(&args.output)?;

    info!("");
    info!("Run summary:");
    info!("  Poses: {}", report.poses.len());
    info!("  Rejected rows: {}", report.rejected.len());
    info!("  Footprints: {}", report.footprints.len());
    info!("  Skipped images: {}", report.skipped.len());
    info!("  Rasters: {}", report.rasters.len());
    if !report.rectify_failures.is_empty() {
        info!("  Rectification failures: {}", report.rectify_failures.len());
    }
    if let Some(quality) = &report.quality {
        info!("  Mean GSD: {:.2} cm/px", quality.summary.mean_gsd_cm_per_px);
        info!("  Mean MRK offset: {:.2} m", quality.summary.mean_offset_m);
        info!(
            "  Valid / distorted: {} / {}",
            quality.summary.valid_count, quality.summary.distorted_count
        );
    }
    info!("  Total time: {:?}", start.elapsed());
    Ok(())
}

fn run<R: RasterRectifier>(
    config: PipelineConfig,
    source: ImageDirectory,
    rectifier: R,
    table: TrajectoryTable,
) -> Result<PipelineReport, Box<dyn Error>> {
    let pipeline = GeoreferencePipeline::new(config, source, rectifier)?;
    Ok(pipeline.run(table)?)
}
