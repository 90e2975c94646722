//! Ground control points tying footprint corners to pixel centers.

use super::{GroundFootprint, GroundPoint};

/// Pixel ↔ ground correspondence consumed by the raster rectifier.
///
/// Pixel coordinates follow the raster convention: `(0, 0)` is the outer
/// corner of the top-left pixel, so `(0.5, 0.5)` is its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlPoint {
    pub ground_lon: f64,
    pub ground_lat: f64,
    pub ground_elev: f64,
    pub pixel_x: f64,
    pub pixel_y: f64,
}

impl ControlPoint {
    fn anchored(point: GroundPoint, pixel_x: f64, pixel_y: f64) -> Self {
        Self {
            ground_lon: point.longitude_deg,
            ground_lat: point.latitude_deg,
            ground_elev: 0.0,
            pixel_x,
            pixel_y,
        }
    }
}

/// Four control points (TL, TR, BL, BR) anchored at the corner pixel centers.
pub fn build_control_points(footprint: &GroundFootprint) -> [ControlPoint; 4] {
    let w = footprint.image_width_px as f64;
    let h = footprint.image_height_px as f64;
    [
        ControlPoint::anchored(footprint.top_left, 0.5, 0.5),
        ControlPoint::anchored(footprint.top_right, w - 0.5, 0.5),
        ControlPoint::anchored(footprint.bottom_left, 0.5, h - 0.5),
        ControlPoint::anchored(footprint.bottom_right, w - 0.5, h - 0.5),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn footprint() -> GroundFootprint {
        GroundFootprint {
            image_id: "DJI_0042.JPG".to_string(),
            platform: GroundPoint::new(10.0, 20.0),
            center: GroundPoint::new(10.0, 20.0),
            top_left: GroundPoint::new(10.001, 19.999),
            top_right: GroundPoint::new(10.001, 20.001),
            bottom_left: GroundPoint::new(9.999, 19.999),
            bottom_right: GroundPoint::new(9.999, 20.001),
            image_width_px: 1600,
            image_height_px: 1300,
        }
    }

    #[test]
    fn test_anchors_sit_on_pixel_centers() {
        let gcps = build_control_points(&footprint());
        let anchors: Vec<(f64, f64)> = gcps.iter().map(|g| (g.pixel_x, g.pixel_y)).collect();
        assert_eq!(
            anchors,
            vec![(0.5, 0.5), (1599.5, 0.5), (0.5, 1299.5), (1599.5, 1299.5)]
        );
    }

    #[test]
    fn test_ground_side_follows_corner_order() {
        let fp = footprint();
        let gcps = build_control_points(&fp);
        for (gcp, corner) in gcps.iter().zip(fp.corners()) {
            assert_eq!(gcp.ground_lat, corner.latitude_deg);
            assert_eq!(gcp.ground_lon, corner.longitude_deg);
            assert_eq!(gcp.ground_elev, 0.0);
        }
    }
}
