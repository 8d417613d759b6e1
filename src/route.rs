//! The route model: one immutable dataset describing the whole race route.
//!
//! [`RouteModel::new`] validates its input, densifies the waypoint polyline
//! with [`GeodesicSegmenter`] and annotates every point with
//! [`RouteFeatureBuilder`]. Nothing mutates the model afterwards; a changed
//! route means building a new model.

use std::io;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::features::{RouteFeatureBuilder, RoutePoint, TurnThresholds};
use crate::geo_utils::compute_bounds;
use crate::segmenter::GeodesicSegmenter;
use crate::{Bounds, GpsPoint, Result, RouteError};

/// Configuration for building a [`RouteModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Upper bound for the distance between consecutive dense points, in
    /// meters. Must be at least 10; values under 50 log a warning.
    /// Default: 100.0
    pub interval_upper_bound_m: f64,
    /// Turn classification thresholds.
    pub turn_thresholds: TurnThresholds,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            interval_upper_bound_m: 100.0,
            turn_thresholds: TurnThresholds::default(),
        }
    }
}

impl RouteConfig {
    /// Default configuration with a custom interval bound.
    pub fn with_interval(interval_upper_bound_m: f64) -> Self {
        Self {
            interval_upper_bound_m,
            ..Self::default()
        }
    }
}

/// Densified, feature-annotated race route.
#[derive(Debug, Clone)]
pub struct RouteModel {
    waypoints: Vec<GpsPoint>,
    config: RouteConfig,
    points: Vec<RoutePoint>,
    waypoint_indices: Vec<usize>,
    bounds: Bounds,
}

impl RouteModel {
    /// Build a route model from at least three waypoints.
    ///
    /// # Errors
    ///
    /// - [`RouteError::Configuration`] for an interval bound under 10m,
    ///   invalid turn thresholds or invalid coordinates
    /// - [`RouteError::InsufficientWaypoints`] for fewer than 3 waypoints
    ///
    /// # Example
    /// ```
    /// use route_model::{GpsPoint, RouteModel, RouteConfig};
    ///
    /// let waypoints = vec![
    ///     GpsPoint::new(43.81857948416717, -79.40101625627213),
    ///     GpsPoint::new(43.82045746557804, -79.3901457521166),
    ///     GpsPoint::new(43.81990512423598, -79.38545051088512),
    /// ];
    /// let route = RouteModel::new(&waypoints, RouteConfig::with_interval(1000.0)).unwrap();
    /// assert_eq!(route.len(), 3);
    /// assert!((route.total_distance() - 1281.745).abs() < 0.01);
    /// ```
    pub fn new(waypoints: &[GpsPoint], config: RouteConfig) -> Result<Self> {
        config.turn_thresholds.validate()?;
        let segmenter = GeodesicSegmenter::new(config.interval_upper_bound_m)?;
        let dense = segmenter.densify(waypoints)?;

        let builder = RouteFeatureBuilder::new(config.turn_thresholds);
        let points = builder.build(&dense);

        let bounds = compute_bounds(&dense.points)
            .ok_or_else(|| RouteError::Configuration("route has no points".to_string()))?;

        let model = Self {
            waypoints: waypoints.to_vec(),
            config,
            points,
            waypoint_indices: dense.waypoint_indices,
            bounds,
        };

        info!(
            "built route model: {} waypoints -> {} points, {:.0}m",
            model.waypoints.len(),
            model.points.len(),
            model.total_distance()
        );

        Ok(model)
    }

    /// Full feature table, one row per dense point.
    pub fn points(&self) -> &[RoutePoint] {
        &self.points
    }

    pub fn point(&self, index: usize) -> Option<&RoutePoint> {
        self.points.get(index)
    }

    /// Coordinates of every dense point, in order.
    pub fn coordinates(&self) -> Vec<GpsPoint> {
        self.points.iter().map(RoutePoint::coordinate).collect()
    }

    /// Cumulative trip distance column.
    pub fn trip_distances(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.trip_distance_m).collect()
    }

    /// The waypoints this model was built from.
    pub fn waypoints(&self) -> &[GpsPoint] {
        &self.waypoints
    }

    /// Dense index of every original waypoint.
    pub fn waypoint_indices(&self) -> &[usize] {
        &self.waypoint_indices
    }

    pub fn config(&self) -> &RouteConfig {
        &self.config
    }

    pub fn interval_upper_bound(&self) -> f64 {
        self.config.interval_upper_bound_m
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Total route length in meters.
    pub fn total_distance(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.trip_distance_m)
    }

    /// Write the feature table as CSV.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        write_route_csv(&self.points, writer, &[], |_| Vec::new())
    }

    /// Save the feature table to a CSV file, appending `.csv` when missing.
    /// Returns the path actually written.
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let path = csv_path(path.as_ref());
        let file = std::fs::File::create(&path)?;
        self.write_csv(file)?;
        info!("saved route model to {}", path.display());
        Ok(path)
    }
}

/// Write route rows followed by `extra_header` columns produced per row.
pub(crate) fn write_route_csv<W, F>(
    points: &[RoutePoint],
    writer: W,
    extra_header: &[&str],
    extra: F,
) -> Result<()>
where
    W: io::Write,
    F: Fn(usize) -> Vec<String>,
{
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(RoutePoint::CSV_HEADER.iter().chain(extra_header.iter()))?;
    for (i, point) in points.iter().enumerate() {
        let mut record = point.csv_record();
        record.extend(extra(i));
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

/// Append a `.csv` extension unless the path already has one.
pub(crate) fn csv_path(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => path.to_path_buf(),
        _ => {
            let mut name = path.as_os_str().to_os_string();
            name.push(".csv");
            PathBuf::from(name)
        }
    }
}
