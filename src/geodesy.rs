//! Earth constants and small-extent geodesy helpers.
//!
//! Every trigonometric or earth-model constant used by the projector, the
//! smoother analyses and the verifier lives here. The local conversions use an
//! equirectangular approximation that holds over a single image footprint; it
//! is not valid for extents of many kilometers or near the poles.

/// Mean Earth radius used for great-circle distances (meters).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Length of one degree of latitude (meters).
pub const METERS_PER_DEGREE_LAT: f64 = 111_132.0;

/// Great-circle distance between two points in decimal degrees (meters).
///
/// Uses the haversine formula on a sphere of radius [`EARTH_RADIUS_M`].
pub fn haversine_m(lat1_deg: f64, lon1_deg: f64, lat2_deg: f64, lon2_deg: f64) -> f64 {
    let lat1 = lat1_deg.to_radians();
    let lat2 = lat2_deg.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (lon2_deg - lon1_deg).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // clamp guards asin against a > 1 from rounding on antipodal inputs
    let c = 2.0 * a.sqrt().min(1.0).asin();
    c * EARTH_RADIUS_M
}

/// Convert a local (east, north) offset in meters to (Δlat, Δlon) in degrees
/// at the given reference latitude.
pub fn offset_to_degrees(east_m: f64, north_m: f64, ref_lat_deg: f64) -> (f64, f64) {
    let dlat = north_m / METERS_PER_DEGREE_LAT;
    let dlon = east_m / (METERS_PER_DEGREE_LAT * ref_lat_deg.to_radians().cos());
    (dlat, dlon)
}

/// Round to two decimal places for reporting.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
