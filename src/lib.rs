//! # Route Model
//!
//! Geodesic route interpolation and navigation features for solar-car race
//! strategy.
//!
//! This library provides:
//! - Densification of a sparse race-route polyline on the WGS84 ellipsoid
//! - Per-point distance, bearing, travel direction and turn classification
//! - Fixed-distance checkpoints for weather sampling
//! - Checkpoint ETA estimation from a live position
//! - Route-book alignment and elevation profiles through injected sources
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel processing with rayon
//! - **`http`** - Enable Open-Meteo weather and elevation sources
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use route_model::{GpsPoint, RouteModel, RouteConfig, CheckpointIndex, EtaEngine, EtaConfig};
//!
//! let waypoints = vec![
//!     GpsPoint::new(43.81857948416717, -79.40101625627213),
//!     GpsPoint::new(43.82045746557804, -79.3901457521166),
//!     GpsPoint::new(43.81990512423598, -79.38545051088512),
//! ];
//!
//! let route = RouteModel::new(&waypoints, RouteConfig::with_interval(100.0)).unwrap();
//! println!("{} points, {:.0}m", route.len(), route.total_distance());
//!
//! let checkpoints = CheckpointIndex::build(&route, 500.0).unwrap();
//! let engine = EtaEngine::new(&route, &checkpoints, EtaConfig::default()).unwrap();
//!
//! let report = engine.estimate(&waypoints[0]);
//! assert_eq!(report.etas.len(), checkpoints.len());
//! ```

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Result, RouteError, SourceError};

pub mod geo_utils;

// Dense sampling of the waypoint polyline
pub mod segmenter;
pub use segmenter::{DenseRoute, GeodesicSegmenter, MAX_SEGMENT_SAMPLES};

// Distance, bearing and turn annotation
pub mod features;
pub use features::{RouteFeatureBuilder, RoutePoint, TurnDirection, TurnSeverity, TurnThresholds, TurnType};

// Immutable route dataset
pub mod route;
pub use route::{RouteConfig, RouteModel};

// Checkpoints and weather rows
pub mod checkpoints;
pub use checkpoints::{Checkpoint, CheckpointConfig, CheckpointIndex, CheckpointRecord, CheckpointStore};

// Arrival time estimation
pub mod eta;
pub use eta::{EtaConfig, EtaEngine, EtaReport, EtaSession, NearestPoint, TimeUnit, UNREACHABLE_ETA};

// External collaborators
pub mod sources;
pub use sources::{ElevationSource, FileLocationSource, LocationSource, WeatherReading, WeatherSource};

pub mod elevation;
pub use elevation::{ElevationPoint, ElevationProfile, DEFAULT_ELEVATION_CHUNK};

pub mod routebook;
pub use routebook::{MappedRoutebook, RoutebookConfig, RoutebookEntry};

// HTTP sources
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::OpenMeteoClient;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude in degrees (WGS84).
///
/// # Example
/// ```
/// use route_model::GpsPoint;
/// let point = GpsPoint::new(43.4723, -80.5449); // Waterloo
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

impl From<(f64, f64)> for GpsPoint {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self::new(latitude, longitude)
    }
}

/// Bounding box for a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(43.4723, -80.5449).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_gps_point_from_tuple() {
        let p: GpsPoint = (43.5, -80.5).into();
        assert_eq!(p, GpsPoint::new(43.5, -80.5));
    }

    #[test]
    fn test_bounds_center() {
        let b = Bounds { min_lat: 51.50, max_lat: 51.52, min_lng: -0.12, max_lng: -0.10 };
        let c = b.center();
        assert!((c.latitude - 51.51).abs() < 1e-9);
        assert!((c.longitude + 0.11).abs() < 1e-9);
    }

    #[test]
    fn test_full_pipeline() {
        let waypoints = test_fixtures::waterloo();
        let route = RouteModel::new(&waypoints, RouteConfig::with_interval(25.0)).unwrap();
        let checkpoints = CheckpointIndex::build(&route, 1000.0).unwrap();
        let engine = EtaEngine::new(&route, &checkpoints, EtaConfig::default()).unwrap();

        let report = engine.estimate(&waypoints[0]);
        assert_eq!(report.current_checkpoint, 0);
        assert_eq!(report.etas.len(), 7);
        assert_eq!(report.etas[0], UNREACHABLE_ETA);
        assert!(report.etas[1..].iter().all(|eta| *eta > 0.0));
    }
}
