//! Raster collaborators: where image geometry comes from and how a
//! georeferenced image is produced from its control points.

use super::IoError;
use crate::error::{GeorefError, GeorefResult};
use crate::projection::ControlPoint;
use image::{ColorType, ImageDecoder, ImageReader};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Per-band sample encoding, named as GDAL names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleType {
    #[default]
    Byte,
    UInt16,
    Float32,
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleType::Byte => write!(f, "Byte"),
            SampleType::UInt16 => write!(f, "UInt16"),
            SampleType::Float32 => write!(f, "Float32"),
        }
    }
}

/// Pixel grid and band layout of a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterInfo {
    pub width_px: u32,
    pub height_px: u32,
    pub bands: u8,
    pub sample_type: SampleType,
}

impl RasterInfo {
    /// Eight-bit RGB, the usual drone JPEG layout.
    pub fn rgb8(width_px: u32, height_px: u32) -> Self {
        Self {
            width_px,
            height_px,
            bands: 3,
            sample_type: SampleType::Byte,
        }
    }

    fn from_color(width_px: u32, height_px: u32, color: ColorType) -> Result<Self, String> {
        let bands = color.channel_count();
        let sample_type = match color.bytes_per_pixel() / bands {
            1 => SampleType::Byte,
            2 => SampleType::UInt16,
            4 => SampleType::Float32,
            _ => return Err(format!("unsupported pixel layout {color:?}")),
        };
        Ok(Self {
            width_px,
            height_px,
            bands,
            sample_type,
        })
    }
}

/// Supplies the pixel grid and band layout for an image identifier.
pub trait ImageSource: Send + Sync {
    fn describe(&self, image_id: &str) -> Result<RasterInfo, IoError>;

    /// Location of the image on disk.
    fn path(&self, image_id: &str) -> PathBuf;
}

/// Images stored as files under one directory, named by their identifier.
#[derive(Debug, Clone)]
pub struct ImageDirectory {
    root: PathBuf,
}

impl ImageDirectory {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ImageSource for ImageDirectory {
    fn describe(&self, image_id: &str) -> Result<RasterInfo, IoError> {
        let path = self.path(image_id);
        let image_error = |message: String| IoError::Image {
            path: path.display().to_string(),
            message,
        };
        if !path.is_file() {
            return Err(image_error("file not found".to_string()));
        }

        // only the header is decoded
        let decoder = ImageReader::open(&path)?
            .with_guessed_format()?
            .into_decoder()
            .map_err(|e| image_error(e.to_string()))?;
        let (width_px, height_px) = decoder.dimensions();
        RasterInfo::from_color(width_px, height_px, decoder.color_type()).map_err(image_error)
    }

    fn path(&self, image_id: &str) -> PathBuf {
        self.root.join(image_id)
    }
}

/// Resampling kernel for the warp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resampling {
    #[default]
    Bilinear,
    Cubic,
}

impl fmt::Display for Resampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resampling::Bilinear => write!(f, "bilinear"),
            Resampling::Cubic => write!(f, "cubic"),
        }
    }
}

impl FromStr for Resampling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bilinear" => Ok(Resampling::Bilinear),
            "cubic" => Ok(Resampling::Cubic),
            other => Err(format!("unknown resampling kernel '{other}' (bilinear|cubic)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RectifierConfig {
    pub resampling: Resampling,
    pub target_srs: String,
    /// Emit an alpha band so areas outside the footprint are transparent.
    pub add_alpha: bool,
    /// Source value treated as no-data.
    pub src_nodata: Option<f64>,
    /// Appended to the image stem to name the rectified output.
    pub output_suffix: String,
}

impl Default for RectifierConfig {
    fn default() -> Self {
        Self {
            resampling: Resampling::default(),
            target_srs: "EPSG:4326".to_string(),
            add_alpha: true,
            src_nodata: Some(0.0),
            output_suffix: "_final".to_string(),
        }
    }
}

impl RectifierConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn with_target_srs(mut self, srs: impl Into<String>) -> Self {
        self.target_srs = srs.into();
        self
    }

    pub fn with_alpha(mut self, add_alpha: bool) -> Self {
        self.add_alpha = add_alpha;
        self
    }

    pub fn with_src_nodata(mut self, src_nodata: Option<f64>) -> Self {
        self.src_nodata = src_nodata;
        self
    }

    /// `<stem><suffix>.tif` inside `output_dir`.
    ///
    /// Identifiers differing only in extension map to the same path.
    pub fn output_path(&self, output_dir: &Path, image_id: &str) -> PathBuf {
        let stem = Path::new(image_id)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| image_id.to_string());
        output_dir.join(format!("{stem}{}.tif", self.output_suffix))
    }
}

/// Everything a rectifier needs for one image.
#[derive(Debug, Clone)]
pub struct RectifyRequest<'a> {
    pub image_id: &'a str,
    pub source_path: &'a Path,
    pub output_path: PathBuf,
    pub raster: RasterInfo,
    pub control_points: &'a [ControlPoint; 4],
    pub config: &'a RectifierConfig,
}

/// Produces a map-aligned raster from an image and its control points.
pub trait RasterRectifier: Send + Sync {
    /// Returns the written artifact, or `None` when nothing was produced.
    fn rectify(&self, request: &RectifyRequest<'_>) -> GeorefResult<Option<PathBuf>>;
}

/// Rectifier that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRectifier;

impl RasterRectifier for NullRectifier {
    fn rectify(&self, _request: &RectifyRequest<'_>) -> GeorefResult<Option<PathBuf>> {
        Ok(None)
    }
}

/// Writes a GDAL virtual raster that references the source image, carries
/// the GCP list in the target SRS and records the warp options in a `warp`
/// metadata domain. `gdalwarp` on the sidecar yields the final raster.
#[derive(Debug, Clone, Copy, Default)]
pub struct VrtRectifier;

impl VrtRectifier {
    pub fn new() -> Self {
        Self
    }

    pub fn sidecar_path(output_path: &Path) -> PathBuf {
        output_path.with_extension("vrt")
    }

    /// VRT document for one request.
    pub fn render(request: &RectifyRequest<'_>) -> String {
        let config = request.config;
        let raster = request.raster;
        let source = xml_escape(&request.source_path.display().to_string());
        let mut xml = String::new();

        xml.push_str(&format!(
            "<VRTDataset rasterXSize=\"{}\" rasterYSize=\"{}\">\n",
            raster.width_px, raster.height_px
        ));
        xml.push_str(&format!(
            "  <GCPList Projection=\"{}\">\n",
            xml_escape(&config.target_srs)
        ));
        for (i, gcp) in request.control_points.iter().enumerate() {
            xml.push_str(&format!(
                "    <GCP Id=\"{}\" Pixel=\"{}\" Line=\"{}\" X=\"{}\" Y=\"{}\" Z=\"{}\" />\n",
                i + 1,
                gcp.pixel_x,
                gcp.pixel_y,
                gcp.ground_lon,
                gcp.ground_lat,
                gcp.ground_elev
            ));
        }
        xml.push_str("  </GCPList>\n");

        xml.push_str("  <Metadata domain=\"warp\">\n");
        let mut hint = |key: &str, value: &str| {
            xml.push_str(&format!(
                "    <MDI key=\"{key}\">{}</MDI>\n",
                xml_escape(value)
            ));
        };
        hint("DST_SRS", &config.target_srs);
        hint("RESAMPLING", &config.resampling.to_string());
        hint("DST_ALPHA", if config.add_alpha { "YES" } else { "NO" });
        if let Some(nodata) = config.src_nodata {
            hint("SRC_NODATA", &nodata.to_string());
        }
        hint("OUTPUT", &request.output_path.display().to_string());
        xml.push_str("  </Metadata>\n");

        for band in 1..=raster.bands {
            xml.push_str(&format!(
                "  <VRTRasterBand dataType=\"{}\" band=\"{band}\">\n",
                raster.sample_type
            ));
            if let Some(nodata) = config.src_nodata {
                xml.push_str(&format!("    <NoDataValue>{nodata}</NoDataValue>\n"));
            }
            xml.push_str("    <SimpleSource>\n");
            xml.push_str(&format!(
                "      <SourceFilename relativeToVRT=\"0\">{source}</SourceFilename>\n"
            ));
            xml.push_str(&format!("      <SourceBand>{band}</SourceBand>\n"));
            xml.push_str("    </SimpleSource>\n");
            xml.push_str("  </VRTRasterBand>\n");
        }
        xml.push_str("</VRTDataset>\n");
        xml
    }
}

impl RasterRectifier for VrtRectifier {
    fn rectify(&self, request: &RectifyRequest<'_>) -> GeorefResult<Option<PathBuf>> {
        let sidecar = Self::sidecar_path(&request.output_path);
        let write_error =
            |e: std::io::Error| GeorefError::Rectifier(format!("{}: {e}", sidecar.display()));
        if let Some(parent) = sidecar.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        fs::write(&sidecar, Self::render(request)).map_err(write_error)?;
        debug!("{}: wrote {}", request.image_id, sidecar.display());
        Ok(Some(sidecar))
    }
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use tempfile::TempDir;

    fn control_points() -> [ControlPoint; 4] {
        let at = |lon: f64, lat: f64, x: f64, y: f64| ControlPoint {
            ground_lon: lon,
            ground_lat: lat,
            ground_elev: 0.0,
            pixel_x: x,
            pixel_y: y,
        };
        [
            at(20.0, 10.001, 0.5, 0.5),
            at(20.001, 10.001, 99.5, 0.5),
            at(20.0, 10.0, 0.5, 79.5),
            at(20.001, 10.0, 99.5, 79.5),
        ]
    }

    #[test]
    fn test_resampling_parse() {
        assert_eq!("cubic".parse::<Resampling>(), Ok(Resampling::Cubic));
        assert_eq!("Bilinear".parse::<Resampling>(), Ok(Resampling::Bilinear));
        assert!("lanczos".parse::<Resampling>().is_err());
        assert_eq!(Resampling::default().to_string(), "bilinear");
    }

    #[test]
    fn test_output_path_uses_stem() {
        let config = RectifierConfig::new();
        assert_eq!(
            config.output_path(Path::new("out"), "DJI_0001.JPG"),
            PathBuf::from("out/DJI_0001_final.tif")
        );
    }

    #[test]
    fn test_missing_image_is_an_error() -> Result<(), std::io::Error> {
        let dir = TempDir::new()?;
        let source = ImageDirectory::new(dir.path());
        assert!(matches!(
            source.describe("missing.jpg"),
            Err(IoError::Image { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_describe_rgb_from_header() -> Result<(), Box<dyn Error>> {
        let dir = TempDir::new()?;
        image::RgbImage::new(64, 48).save(dir.path().join("frame.png"))?;

        let source = ImageDirectory::new(dir.path());
        assert_eq!(source.describe("frame.png")?, RasterInfo::rgb8(64, 48));
        Ok(())
    }

    #[test]
    fn test_describe_grayscale_and_sixteen_bit() -> Result<(), Box<dyn Error>> {
        let dir = TempDir::new()?;
        image::GrayImage::new(64, 48).save(dir.path().join("g.png"))?;
        image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::new(32, 24)
            .save(dir.path().join("g16.png"))?;
        image::RgbaImage::new(8, 8).save(dir.path().join("rgba.png"))?;

        let source = ImageDirectory::new(dir.path());
        let gray = source.describe("g.png")?;
        assert_eq!((gray.width_px, gray.height_px), (64, 48));
        assert_eq!(gray.bands, 1);
        assert_eq!(gray.sample_type, SampleType::Byte);

        let deep = source.describe("g16.png")?;
        assert_eq!(deep.bands, 1);
        assert_eq!(deep.sample_type, SampleType::UInt16);

        assert_eq!(source.describe("rgba.png")?.bands, 4);
        Ok(())
    }

    #[test]
    fn test_vrt_sidecar() -> Result<(), Box<dyn Error>> {
        let dir = TempDir::new()?;
        let config = RectifierConfig::new().with_resampling(Resampling::Cubic);
        let gcps = control_points();
        let source = dir.path().join("a&b.jpg");
        let request = RectifyRequest {
            image_id: "a&b.jpg",
            source_path: &source,
            output_path: config.output_path(dir.path(), "a&b.jpg"),
            raster: RasterInfo::rgb8(100, 80),
            control_points: &gcps,
            config: &config,
        };

        let written = VrtRectifier::new().rectify(&request)?.ok_or("no sidecar")?;
        assert_eq!(written, dir.path().join("a&b_final.vrt"));

        let xml = std::fs::read_to_string(&written)?;
        assert!(xml.contains("rasterXSize=\"100\" rasterYSize=\"80\""));
        assert!(xml.contains("<GCPList Projection=\"EPSG:4326\">"));
        assert_eq!(xml.matches("<GCP ").count(), 4);
        assert!(xml.contains("Pixel=\"99.5\" Line=\"79.5\" X=\"20.001\" Y=\"10\""));
        assert!(xml.contains("<MDI key=\"RESAMPLING\">cubic</MDI>"));
        assert!(xml.contains("<MDI key=\"DST_ALPHA\">YES</MDI>"));
        assert!(xml.contains("a&amp;b.jpg"));
        assert_eq!(xml.matches("<VRTRasterBand dataType=\"Byte\"").count(), 3);
        Ok(())
    }

    #[test]
    fn test_vrt_bands_follow_grayscale_source() -> Result<(), Box<dyn Error>> {
        let dir = TempDir::new()?;
        image::GrayImage::new(64, 48).save(dir.path().join("g.png"))?;
        let images = ImageDirectory::new(dir.path());
        let config = RectifierConfig::new();
        let gcps = control_points();
        let source = images.path("g.png");
        let request = RectifyRequest {
            image_id: "g.png",
            source_path: &source,
            output_path: config.output_path(dir.path(), "g.png"),
            raster: images.describe("g.png")?,
            control_points: &gcps,
            config: &config,
        };

        let xml = VrtRectifier::render(&request);
        assert!(xml.contains("rasterXSize=\"64\" rasterYSize=\"48\""));
        assert_eq!(xml.matches("<VRTRasterBand").count(), 1);
        assert!(xml.contains("<VRTRasterBand dataType=\"Byte\" band=\"1\">"));
        assert!(!xml.contains("<SourceBand>2</SourceBand>"));
        Ok(())
    }

    #[test]
    fn test_unwritable_output_is_a_rectifier_error() -> Result<(), Box<dyn Error>> {
        let dir = TempDir::new()?;
        // a plain file where the output directory should be
        let blocker = dir.path().join("out");
        std::fs::write(&blocker, "")?;
        let config = RectifierConfig::new();
        let gcps = control_points();
        let request = RectifyRequest {
            image_id: "a.jpg",
            source_path: Path::new("a.jpg"),
            output_path: config.output_path(&blocker.join("nested"), "a.jpg"),
            raster: RasterInfo::rgb8(100, 80),
            control_points: &gcps,
            config: &config,
        };
        assert!(matches!(
            VrtRectifier::new().rectify(&request),
            Err(GeorefError::Rectifier(_))
        ));
        Ok(())
    }

    #[test]
    fn test_null_rectifier_writes_nothing() -> GeorefResult<()> {
        let config = RectifierConfig::new();
        let gcps = control_points();
        let request = RectifyRequest {
            image_id: "a.jpg",
            source_path: Path::new("a.jpg"),
            output_path: PathBuf::from("a_final.tif"),
            raster: RasterInfo::rgb8(100, 80),
            control_points: &gcps,
            config: &config,
        };
        assert_eq!(NullRectifier.rectify(&request)?, None);
        Ok(())
    }
}
