// Geodesy module - distance and bearing calculations on lat/lon pairs
//
// Provides:
// - great-circle (haversine) distance between two points
// - initial bearing and destination point for a given bearing/distance
// - distance from a point to a route segment
//
// Uses a spherical Earth. Runs are short, so the ~0.3% ellipsoid error is irrelevant.

use std::f64::consts::PI;

/// Degrees to radians conversion factor
const DTOR: f64 = PI / 180.0;

/// Radians to degrees conversion factor
const RTOD: f64 = 180.0 / PI;

/// Average radius for spherical Earth approximation in meters
pub const SPHERICAL_R: f64 = 6371e3;

/// Returns great-circle distance in meters between two lat/lon points
///
/// Uses the haversine form, which stays well-conditioned for the few-meter
/// spacing between consecutive GPS fixes (the arccos form loses precision there).
///
/// # Arguments
/// * `lat0`, `lon0` - First point (latitude, longitude) in degrees
/// * `lat1`, `lon1` - Second point (latitude, longitude) in degrees
///
/// # Returns
/// Distance in meters
///
/// # Example
/// ```
/// let distance = stride::geodesy::greatcircle(51.5, -0.1, 48.8, 2.3); // London to Paris
/// ```
pub fn greatcircle(lat0: f64, lon0: f64, lat1: f64, lon1: f64) -> f64 {
    let dlat = (lat1 - lat0) * DTOR;
    let dlon = (lon1 - lon0) * DTOR;

    let a = (dlat / 2.0).sin().powi(2)
        + (lat0 * DTOR).cos() * (lat1 * DTOR).cos() * (dlon / 2.0).sin().powi(2);

    2.0 * SPHERICAL_R * a.sqrt().min(1.0).asin()
}

/// Initial bearing in degrees (0 = north, clockwise) from the first point towards the second
pub fn bearing(lat0: f64, lon0: f64, lat1: f64, lon1: f64) -> f64 {
    let lat0_rad = lat0 * DTOR;
    let lat1_rad = lat1 * DTOR;
    let dlon = (lon1 - lon0) * DTOR;

    let y = dlon.sin() * lat1_rad.cos();
    let x = lat0_rad.cos() * lat1_rad.sin() - lat0_rad.sin() * lat1_rad.cos() * dlon.cos();

    (y.atan2(x) * RTOD + 360.0) % 360.0
}

/// Point reached by travelling `distance` meters from (lat, lon) on the given initial bearing
///
/// # Returns
/// (latitude, longitude) in degrees
pub fn destination(lat: f64, lon: f64, bearing_deg: f64, distance: f64) -> (f64, f64) {
    let lat_rad = lat * DTOR;
    let lon_rad = lon * DTOR;
    let brg = bearing_deg * DTOR;
    let delta = distance / SPHERICAL_R;

    let lat2 = (lat_rad.sin() * delta.cos() + lat_rad.cos() * delta.sin() * brg.cos()).asin();
    let lon2 = lon_rad
        + (brg.sin() * delta.sin() * lat_rad.cos()).atan2(delta.cos() - lat_rad.sin() * lat2.sin());

    // Normalise longitude to [-180, 180)
    let lon2 = ((lon2 * RTOD + 540.0) % 360.0) - 180.0;
    (lat2 * RTOD, lon2)
}

/// Distance in meters from point P to the segment A-B
///
/// Works in a local equirectangular frame centred on P, which is accurate to
/// well under a meter for segments a few kilometers long. Falls back to the
/// distance to A when the segment is degenerate.
pub fn segment_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let scale_x = (p.0 * DTOR).cos() * DTOR * SPHERICAL_R;
    let scale_y = DTOR * SPHERICAL_R;

    // Local planar coordinates with P at the origin
    let ax = (a.1 - p.1) * scale_x;
    let ay = (a.0 - p.0) * scale_y;
    let bx = (b.1 - p.1) * scale_x;
    let by = (b.0 - p.0) * scale_y;

    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    if len_sq < f64::EPSILON {
        return greatcircle(p.0, p.1, a.0, a.1);
    }

    let t = (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0);
    let cx = ax + t * dx;
    let cy = ay + t * dy;
    (cx * cx + cy * cy).sqrt()
}

/// Total length in meters of a polyline given as (lat, lon) pairs
pub fn path_length(points: &[(f64, f64)]) -> f64 {
    points
        .windows(2)
        .map(|w| greatcircle(w[0].0, w[0].1, w[1].0, w[1].1))
        .sum()
}
