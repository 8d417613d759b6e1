//! Geodesic densification of a waypoint polyline.
//!
//! Each waypoint-to-waypoint segment is split into equal geodesic arcs no
//! longer than the configured interval bound. Intermediate points are solved
//! on the WGS84 ellipsoid, so a long segment follows the true geodesic rather
//! than a straight line in lat/lon space.
//!
//! ```rust
//! use route_model::{GpsPoint, GeodesicSegmenter};
//!
//! let segmenter = GeodesicSegmenter::new(500.0).unwrap();
//! let a = GpsPoint::new(0.0, 0.0);
//! let b = GpsPoint::new(0.0, 0.06336); // ~7053 m along the equator
//! assert_eq!(segmenter.segment(&a, &b).len(), 16);
//! ```

use log::{debug, warn};

use crate::geo_utils::{geodesic_distance, geodesic_interpolate};
use crate::{GpsPoint, Result, RouteError};

/// Hard cap on the number of samples (endpoints included) in one segment.
/// Past this, spacing becomes `segment_distance / (MAX_SEGMENT_SAMPLES - 1)`.
pub const MAX_SEGMENT_SAMPLES: usize = 1024;

/// Smallest interval bound accepted.
pub const MIN_INTERVAL_BOUND_M: f64 = 10.0;

/// Interval bounds below this value are accepted with a warning.
pub const RECOMMENDED_INTERVAL_BOUND_M: f64 = 50.0;

/// Minimum number of waypoints defining a route.
pub const MIN_WAYPOINTS: usize = 3;

/// Dense coordinate sequence plus the position of every original waypoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseRoute {
    /// All sampled points, waypoints included, in travel order.
    pub points: Vec<GpsPoint>,
    /// `waypoint_indices[i]` is the index in `points` of waypoint `i`.
    /// Strictly increasing.
    pub waypoint_indices: Vec<usize>,
}

impl DenseRoute {
    /// Waypoint index stored at a dense position, `None` for interpolated points.
    pub fn segment_index(&self, point_index: usize) -> Option<usize> {
        self.waypoint_indices.binary_search(&point_index).ok()
    }

    /// Sparse segment-index column, one entry per dense point.
    pub fn segment_indices(&self) -> Vec<Option<usize>> {
        let mut column = vec![None; self.points.len()];
        for (waypoint, &idx) in self.waypoint_indices.iter().enumerate() {
            column[idx] = Some(waypoint);
        }
        column
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Splits waypoint segments into sub-points no further apart than a bound.
#[derive(Debug, Clone, Copy)]
pub struct GeodesicSegmenter {
    interval_upper_bound_m: f64,
}

impl GeodesicSegmenter {
    /// Create a segmenter with the given spacing bound in meters.
    ///
    /// Fails with [`RouteError::Configuration`] when the bound is not finite
    /// or below [`MIN_INTERVAL_BOUND_M`]. Bounds under
    /// [`RECOMMENDED_INTERVAL_BOUND_M`] are accepted, but turn and elevation
    /// data become noisy at such short spacings, so a warning is logged.
    pub fn new(interval_upper_bound_m: f64) -> Result<Self> {
        if !interval_upper_bound_m.is_finite() || interval_upper_bound_m < MIN_INTERVAL_BOUND_M {
            return Err(RouteError::Configuration(format!(
                "interval upper bound must be at least {}m, got {}",
                MIN_INTERVAL_BOUND_M, interval_upper_bound_m
            )));
        }
        if interval_upper_bound_m < RECOMMENDED_INTERVAL_BOUND_M {
            warn!(
                "interval upper bound of {}m is below the recommended {}m; geodesic turn and elevation data degrade at short spacings",
                interval_upper_bound_m, RECOMMENDED_INTERVAL_BOUND_M
            );
        }
        Ok(Self { interval_upper_bound_m })
    }

    pub fn interval_upper_bound(&self) -> f64 {
        self.interval_upper_bound_m
    }

    /// Number of samples (both endpoints included) for a segment of the given
    /// length.
    pub fn sample_count(&self, distance_m: f64) -> usize {
        if distance_m.is_nan() || distance_m <= 0.0 {
            return 2;
        }
        let intervals = (distance_m / self.interval_upper_bound_m).ceil().max(1.0);
        // Saturating float-to-int cast, then the per-segment cap
        (intervals as usize).saturating_add(1).min(MAX_SEGMENT_SAMPLES)
    }

    /// Sample one segment, both endpoints included, at equal geodesic spacing.
    pub fn segment(&self, start: &GpsPoint, end: &GpsPoint) -> Vec<GpsPoint> {
        let distance = geodesic_distance(start, end);
        let intervals = self.sample_count(distance) - 1;

        let mut points = Vec::with_capacity(intervals + 1);
        points.push(*start);
        for k in 1..intervals {
            let ratio = k as f64 / intervals as f64;
            points.push(geodesic_interpolate(start, end, ratio));
        }
        points.push(*end);
        points
    }

    /// Densify a full waypoint list.
    ///
    /// Adjacent segments share their boundary point, which appears once in
    /// the output.
    pub fn densify(&self, waypoints: &[GpsPoint]) -> Result<DenseRoute> {
        if waypoints.len() < MIN_WAYPOINTS {
            return Err(RouteError::InsufficientWaypoints {
                found: waypoints.len(),
                required: MIN_WAYPOINTS,
            });
        }
        if let Some((i, p)) = waypoints.iter().enumerate().find(|(_, p)| !p.is_valid()) {
            return Err(RouteError::Configuration(format!(
                "waypoint {} has invalid coordinates ({}, {})",
                i, p.latitude, p.longitude
            )));
        }

        let mut points = vec![waypoints[0]];
        let mut waypoint_indices = vec![0];

        for pair in waypoints.windows(2) {
            let samples = self.segment(&pair[0], &pair[1]);
            if samples.len() == MAX_SEGMENT_SAMPLES {
                debug!(
                    "segment {:?} -> {:?} hit the {}-sample cap",
                    pair[0], pair[1], MAX_SEGMENT_SAMPLES
                );
            }
            points.extend_from_slice(&samples[1..]);
            waypoint_indices.push(points.len() - 1);
        }

        debug!(
            "densified {} waypoints into {} points (bound {}m)",
            waypoints.len(),
            points.len(),
            self.interval_upper_bound_m
        );

        Ok(DenseRoute { points, waypoint_indices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures;

    #[test]
    fn test_rejects_small_interval() {
        assert!(matches!(GeodesicSegmenter::new(9.99), Err(RouteError::Configuration(_))));
        assert!(matches!(GeodesicSegmenter::new(f64::NAN), Err(RouteError::Configuration(_))));
        // Below the recommended bound is only a warning
        assert!(GeodesicSegmenter::new(10.0).is_ok());
        assert!(GeodesicSegmenter::new(25.0).is_ok());
    }

    #[test]
    fn test_rejects_too_few_waypoints() {
        let segmenter = GeodesicSegmenter::new(100.0).unwrap();
        let two = &test_fixtures::richmond_hill()[..2];
        match segmenter.densify(two) {
            Err(RouteError::InsufficientWaypoints { found, required }) => {
                assert_eq!(found, 2);
                assert_eq!(required, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_invalid_waypoint() {
        let segmenter = GeodesicSegmenter::new(100.0).unwrap();
        let mut waypoints = test_fixtures::richmond_hill();
        waypoints[1] = GpsPoint::new(95.0, 0.0);
        assert!(matches!(segmenter.densify(&waypoints), Err(RouteError::Configuration(_))));
    }

    #[test]
    fn test_sample_count() {
        let segmenter = GeodesicSegmenter::new(500.0).unwrap();
        assert_eq!(segmenter.sample_count(0.0), 2);
        assert_eq!(segmenter.sample_count(499.0), 2);
        assert_eq!(segmenter.sample_count(500.0), 2);
        assert_eq!(segmenter.sample_count(500.1), 3);
        assert_eq!(segmenter.sample_count(7053.0), 16);
        assert_eq!(segmenter.sample_count(1.0e9), MAX_SEGMENT_SAMPLES);
    }

    #[test]
    fn test_segment_spacing_within_bound() {
        let segmenter = GeodesicSegmenter::new(500.0).unwrap();
        let a = GpsPoint::new(0.0, 0.0);
        let b = GpsPoint::new(0.0, 0.06336);
        let samples = segmenter.segment(&a, &b);
        assert_eq!(samples.len(), 16);

        let total = geodesic_distance(&a, &b);
        for w in samples.windows(2) {
            let d = geodesic_distance(&w[0], &w[1]);
            assert!(d <= 500.0);
            assert!((d - total / 15.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_segment_cap_spacing() {
        let segmenter = GeodesicSegmenter::new(10.0).unwrap();
        let a = GpsPoint::new(0.0, 0.0);
        let b = GpsPoint::new(0.0, 1.0);
        let samples = segmenter.segment(&a, &b);
        assert_eq!(samples.len(), MAX_SEGMENT_SAMPLES);

        let expected = geodesic_distance(&a, &b) / 1023.0;
        let d = geodesic_distance(&samples[0], &samples[1]);
        assert!((d - expected).abs() < 1e-3);
    }

    #[test]
    fn test_zero_length_segment() {
        let segmenter = GeodesicSegmenter::new(100.0).unwrap();
        let a = GpsPoint::new(43.5, -80.5);
        assert_eq!(segmenter.segment(&a, &a), vec![a, a]);
    }

    #[test]
    fn test_densify_keeps_sparse_route_when_within_bound() {
        let segmenter = GeodesicSegmenter::new(1000.0).unwrap();
        let waypoints = test_fixtures::richmond_hill();
        let dense = segmenter.densify(&waypoints).unwrap();
        assert_eq!(dense.points, waypoints);
        assert_eq!(dense.waypoint_indices, vec![0, 1, 2]);
        assert_eq!(dense.segment_indices(), vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_densify_boundary_bookkeeping() {
        let segmenter = GeodesicSegmenter::new(100.0).unwrap();
        let waypoints = test_fixtures::richmond_hill();
        let dense = segmenter.densify(&waypoints).unwrap();

        // 899m -> 9 intervals, 383m -> 4 intervals, shared boundary once
        assert_eq!(dense.len(), 1 + 9 + 4);
        assert_eq!(dense.waypoint_indices, vec![0, 9, 13]);
        for (waypoint, &idx) in dense.waypoint_indices.iter().enumerate() {
            assert_eq!(dense.points[idx], waypoints[waypoint]);
            assert_eq!(dense.segment_index(idx), Some(waypoint));
        }
        assert_eq!(dense.segment_index(1), None);
        assert_eq!(dense.segment_indices().iter().filter(|s| s.is_some()).count(), 3);
    }
}
