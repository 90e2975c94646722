pub mod error;
pub mod geodesy;
pub mod io;
pub mod logger;
pub mod pipeline;
pub mod pose;
pub mod projection;
pub mod smoother;
pub mod verification;

pub use error::{GeorefError, GeorefResult};
pub use io::{IoError, TableLoader};
pub use logger::{init_logger, init_logger_with_level};
pub use pipeline::{GeoreferencePipeline, PipelineConfig, PipelineReport, SkippedImage};
pub use pose::Pose;
pub use projection::{
    CameraMount, ControlPoint, GeometricProjector, GroundFootprint, GroundPoint, ProjectorConfig,
    build_control_points,
};
pub use smoother::{SmootherConfig, TrajectorySmoother};
pub use verification::{GeometricVerifier, QualityReport, QualityStatus, VerifierConfig};
