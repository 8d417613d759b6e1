//! # Geographic Utilities
//!
//! Core geodesic computation helpers shared by the route pipeline.
//!
//! Every distance and bearing in this crate is computed on the WGS84 ellipsoid
//! (Karney's algorithm via [`geo::Geodesic`]), not on a sphere and not on a
//! flat projection.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`geodesic_distance`] | Ellipsoidal distance between two GPS points |
//! | [`geodesic_bearing`] | Forward azimuth in [0, 360) |
//! | [`geodesic_interpolate`] | Point at a fraction of the geodesic arc |
//! | [`polyline_length`] | Total length of a GPS track in meters |
//! | [`to_signed_bearing`] / [`to_bearing_360`] | Bearing range conversions |
//! | [`normalize_angle`] | Fold an angle difference into [-180, 180] |
//! | [`compute_bounds`] | Bounding box of a GPS track |
//!
//! ## Example
//!
//! ```rust
//! use route_model::{GpsPoint, geo_utils};
//!
//! let a = GpsPoint::new(43.81857948416717, -79.40101625627213);
//! let b = GpsPoint::new(43.82045746557804, -79.3901457521166);
//!
//! let d = geo_utils::geodesic_distance(&a, &b);
//! assert!((d - 899.069).abs() < 0.01);
//!
//! let bearing = geo_utils::geodesic_bearing(&a, &b);
//! assert!((bearing - 76.5764).abs() < 0.001);
//! ```

use geo::{Bearing, Distance, Geodesic, InterpolatePoint, Point};
use crate::{GpsPoint, Bounds};

#[inline]
fn to_point(p: &GpsPoint) -> Point<f64> {
    Point::new(p.longitude, p.latitude)
}

// =============================================================================
// Distance / Bearing
// =============================================================================

/// Geodesic distance in meters between two GPS points on the WGS84 ellipsoid.
///
/// # Example
///
/// ```rust
/// use route_model::{GpsPoint, geo_utils};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::geodesic_distance(&london, &paris);
/// assert!((distance - 343_900.0).abs() < 2000.0);
/// ```
#[inline]
pub fn geodesic_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    Geodesic::distance(to_point(p1), to_point(p2))
}

/// Forward azimuth from `from` toward `to`, in degrees within [0, 360).
#[inline]
pub fn geodesic_bearing(from: &GpsPoint, to: &GpsPoint) -> f64 {
    to_bearing_360(Geodesic::bearing(to_point(from), to_point(to)))
}

/// Point located at `ratio` (0.0 = `start`, 1.0 = `end`) of the geodesic arc
/// between two points.
#[inline]
pub fn geodesic_interpolate(start: &GpsPoint, end: &GpsPoint, ratio: f64) -> GpsPoint {
    let p = Geodesic::point_at_ratio_between(to_point(start), to_point(end), ratio);
    GpsPoint::new(p.y(), p.x())
}

/// Total geodesic length of a polyline in meters. Tracks with fewer than two
/// points have zero length.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| geodesic_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Angle Conversions
// =============================================================================

/// Convert any bearing to the [0, 360) range.
#[inline]
pub fn to_bearing_360(bearing: f64) -> f64 {
    let b = bearing.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if b >= 360.0 { 0.0 } else { b }
}

/// Convert any bearing to the signed (-180, 180] range.
#[inline]
pub fn to_signed_bearing(bearing: f64) -> f64 {
    let b = to_bearing_360(bearing);
    if b > 180.0 { b - 360.0 } else { b }
}

/// Fold an angle difference into [-180, 180].
///
/// Differences of two bearings in (-180, 180] lie in (-360, 360), so a single
/// wrap is enough. Exactly ±180 is kept as is, so the sign of a U-turn
/// follows the order of the subtraction.
///
/// ```rust
/// use route_model::geo_utils::normalize_angle;
///
/// assert_eq!(normalize_angle(350.0), -10.0);
/// assert_eq!(normalize_angle(-350.0), 10.0);
/// assert_eq!(normalize_angle(180.0), 180.0);
/// assert_eq!(normalize_angle(-180.0), -180.0);
/// ```
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    if angle > 180.0 {
        angle - 360.0
    } else if angle < -180.0 {
        angle + 360.0
    } else {
        angle
    }
}

// =============================================================================
// Bounding Box
// =============================================================================

/// Compute the bounding box of a GPS track.
///
/// Returns `None` for empty input.
pub fn compute_bounds(points: &[GpsPoint]) -> Option<Bounds> {
    if points.is_empty() {
        return None;
    }

    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Some(Bounds { min_lat, max_lat, min_lng, max_lng })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_geodesic_distance_same_point() {
        let p = GpsPoint::new(43.4678, -80.5663);
        assert_eq!(geodesic_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_geodesic_distance_known_value() {
        let a = GpsPoint::new(43.82045746557804, -79.3901457521166);
        let b = GpsPoint::new(43.81990512423598, -79.38545051088512);
        assert!(approx_eq(geodesic_distance(&a, &b), 382.676, 0.01));
    }

    #[test]
    fn test_one_degree_of_longitude_at_equator() {
        let a = GpsPoint::new(0.0, 0.0);
        let b = GpsPoint::new(0.0, 1.0);
        // WGS84 equatorial circumference / 360
        assert!(approx_eq(geodesic_distance(&a, &b), 111_319.49, 0.1));
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = GpsPoint::new(10.0, 10.0);
        assert!(approx_eq(geodesic_bearing(&origin, &GpsPoint::new(10.1, 10.0)), 0.0, 1e-6)
            || approx_eq(geodesic_bearing(&origin, &GpsPoint::new(10.1, 10.0)), 360.0, 1e-6));
        assert!(approx_eq(geodesic_bearing(&origin, &GpsPoint::new(9.9, 10.0)), 180.0, 1e-6));
        assert!(approx_eq(geodesic_bearing(&GpsPoint::new(0.0, 0.0), &GpsPoint::new(0.0, -1.0)), 270.0, 1e-6));
    }

    #[test]
    fn test_interpolate_midpoint_is_equidistant() {
        let a = GpsPoint::new(43.4678, -80.5663);
        let b = GpsPoint::new(43.4817, -80.5263);
        let mid = geodesic_interpolate(&a, &b, 0.5);
        let d1 = geodesic_distance(&a, &mid);
        let d2 = geodesic_distance(&mid, &b);
        assert!(approx_eq(d1, d2, 1e-3));
        assert!(approx_eq(d1 + d2, geodesic_distance(&a, &b), 1e-3));
    }

    #[test]
    fn test_interpolate_endpoints() {
        let a = GpsPoint::new(43.4678, -80.5663);
        let b = GpsPoint::new(43.4817, -80.5263);
        let start = geodesic_interpolate(&a, &b, 0.0);
        let end = geodesic_interpolate(&a, &b, 1.0);
        assert!(geodesic_distance(&a, &start) < 1e-6);
        assert!(geodesic_distance(&b, &end) < 1e-6);
    }

    #[test]
    fn test_polyline_length() {
        let empty: Vec<GpsPoint> = vec![];
        assert_eq!(polyline_length(&empty), 0.0);
        assert_eq!(polyline_length(&[GpsPoint::new(1.0, 1.0)]), 0.0);

        let track = vec![
            GpsPoint::new(43.81857948416717, -79.40101625627213),
            GpsPoint::new(43.82045746557804, -79.3901457521166),
            GpsPoint::new(43.81990512423598, -79.38545051088512),
        ];
        assert!(approx_eq(polyline_length(&track), 1281.745, 0.01));
    }

    #[test]
    fn test_bearing_conversions() {
        assert_eq!(to_bearing_360(-90.0), 270.0);
        assert_eq!(to_bearing_360(360.0), 0.0);
        assert_eq!(to_bearing_360(-1e-20), 0.0);
        assert_eq!(to_signed_bearing(270.0), -90.0);
        assert_eq!(to_signed_bearing(180.0), 180.0);
        assert_eq!(to_signed_bearing(90.0), 90.0);
    }

    #[test]
    fn test_normalize_angle() {
        assert_eq!(normalize_angle(190.0), -170.0);
        assert_eq!(normalize_angle(-190.0), 170.0);
        assert_eq!(normalize_angle(-180.0), -180.0);
        assert_eq!(normalize_angle(180.0), 180.0);
        assert_eq!(normalize_angle(22.5), 22.5);
    }

    #[test]
    fn test_compute_bounds() {
        assert!(compute_bounds(&[]).is_none());
        let track = vec![
            GpsPoint::new(51.50, -0.13),
            GpsPoint::new(51.51, -0.12),
            GpsPoint::new(51.505, -0.125),
        ];
        let bounds = compute_bounds(&track).unwrap();
        assert_eq!(bounds.min_lat, 51.50);
        assert_eq!(bounds.max_lat, 51.51);
        assert_eq!(bounds.min_lng, -0.13);
        assert_eq!(bounds.max_lng, -0.12);
    }
}
