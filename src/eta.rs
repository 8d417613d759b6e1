//! Checkpoint arrival-time estimation from a live position.
//!
//! The vehicle is snapped to the nearest route point by a full geodesic scan.
//! The last checkpoint at or before that point is the current checkpoint; the ETA to the next
//! one is the straight geodesic distance divided by the assumed speed, and
//! every later checkpoint adds the along-route trip distance beyond it.
//!
//! ```rust
//! use route_model::{CheckpointIndex, EtaConfig, EtaEngine, GpsPoint, RouteConfig, RouteModel, UNREACHABLE_ETA};
//!
//! let waypoints = vec![
//!     GpsPoint::new(43.81857948416717, -79.40101625627213),
//!     GpsPoint::new(43.82045746557804, -79.3901457521166),
//!     GpsPoint::new(43.81990512423598, -79.38545051088512),
//! ];
//! let route = RouteModel::new(&waypoints, RouteConfig::with_interval(50.0)).unwrap();
//! let checkpoints = CheckpointIndex::build(&route, 500.0).unwrap();
//! let engine = EtaEngine::new(&route, &checkpoints, EtaConfig::default()).unwrap();
//!
//! let report = engine.estimate(&waypoints[0]);
//! assert_eq!(report.current_checkpoint, 0);
//! assert_eq!(report.etas[0], UNREACHABLE_ETA);
//! assert!(report.etas[1] > 0.0 && report.etas[2] > report.etas[1]);
//! ```

use std::cmp::Ordering;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::checkpoints::CheckpointIndex;
use crate::geo_utils::geodesic_distance;
use crate::route::RouteModel;
use crate::sources::LocationSource;
use crate::{GpsPoint, Result, RouteError, SourceError};

/// ETA value of a checkpoint that is behind the vehicle or past the end of
/// the route.
pub const UNREACHABLE_ETA: f64 = -1.0;

/// Unit of reported ETA values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    #[default]
    Minutes,
    Hours,
}

impl TimeUnit {
    /// Number of this unit in one hour.
    pub fn per_hour(self) -> f64 {
        match self {
            TimeUnit::Seconds => 3600.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 1.0,
        }
    }
}

/// ETA configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtaConfig {
    /// Assumed constant travel speed in km/h.
    /// Default: 5.0
    pub speed_kmh: f64,
    /// Unit of the reported ETAs.
    /// Default: minutes
    pub unit: TimeUnit,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            speed_kmh: 5.0,
            unit: TimeUnit::Minutes,
        }
    }
}

impl EtaConfig {
    pub fn with_speed(speed_kmh: f64) -> Self {
        Self {
            speed_kmh,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.speed_kmh.is_finite() && self.speed_kmh > 0.0 {
            Ok(())
        } else {
            Err(RouteError::Configuration(format!(
                "speed must be a positive number of km/h, got {}",
                self.speed_kmh
            )))
        }
    }
}

/// Route point closest to a position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NearestPoint {
    pub index: usize,
    pub distance_m: f64,
}

/// Lower distance wins; equal distances keep the lower index.
fn closer(a: NearestPoint, b: NearestPoint) -> NearestPoint {
    match a
        .distance_m
        .total_cmp(&b.distance_m)
        .then(a.index.cmp(&b.index))
    {
        Ordering::Greater => b,
        _ => a,
    }
}

/// Result of one ETA estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtaReport {
    pub position: GpsPoint,
    pub nearest: NearestPoint,
    /// Index into the checkpoint list of the last checkpoint at or before
    /// the nearest route point.
    pub current_checkpoint: usize,
    /// `None` once the vehicle is in the last checkpoint's section.
    pub next_checkpoint: Option<usize>,
    /// One entry per checkpoint, [`UNREACHABLE_ETA`] where not ahead.
    pub etas: Vec<f64>,
}

impl EtaReport {
    /// ETA to checkpoint `k`, `None` when unreachable.
    pub fn eta_to(&self, k: usize) -> Option<f64> {
        self.etas.get(k).copied().filter(|eta| *eta != UNREACHABLE_ETA)
    }
}

/// Computes checkpoint ETAs against a built route and its checkpoints.
#[derive(Debug, Clone)]
pub struct EtaEngine<'a> {
    route: &'a RouteModel,
    checkpoints: &'a CheckpointIndex,
    config: EtaConfig,
}

impl<'a> EtaEngine<'a> {
    /// Fails on an invalid speed or when `checkpoints` was not built from
    /// `route`.
    pub fn new(route: &'a RouteModel, checkpoints: &'a CheckpointIndex, config: EtaConfig) -> Result<Self> {
        config.validate()?;
        if checkpoints.point_checkpoints().len() != route.len() {
            return Err(RouteError::Configuration(format!(
                "checkpoint index covers {} points but the route has {}",
                checkpoints.point_checkpoints().len(),
                route.len()
            )));
        }
        Ok(Self {
            route,
            checkpoints,
            config,
        })
    }

    pub fn config(&self) -> &EtaConfig {
        &self.config
    }

    /// Nearest route point by geodesic distance, scanning every point.
    pub fn locate(&self, position: &GpsPoint) -> NearestPoint {
        let fallback = NearestPoint {
            index: 0,
            distance_m: f64::INFINITY,
        };
        self.scan(position).unwrap_or(fallback)
    }

    #[cfg(not(feature = "parallel"))]
    fn scan(&self, position: &GpsPoint) -> Option<NearestPoint> {
        self.route
            .points()
            .iter()
            .enumerate()
            .map(|(index, p)| NearestPoint {
                index,
                distance_m: geodesic_distance(position, &p.coordinate()),
            })
            .reduce(closer)
    }

    #[cfg(feature = "parallel")]
    fn scan(&self, position: &GpsPoint) -> Option<NearestPoint> {
        use rayon::prelude::*;

        self.route
            .points()
            .par_iter()
            .enumerate()
            .map(|(index, p)| NearestPoint {
                index,
                distance_m: geodesic_distance(position, &p.coordinate()),
            })
            .reduce_with(closer)
    }

    /// Locate the position and estimate the ETA to every checkpoint.
    pub fn estimate(&self, position: &GpsPoint) -> EtaReport {
        let nearest = self.locate(position);
        let current_checkpoint = self.checkpoints.section_of(nearest.index).unwrap_or(0);
        let etas = self.estimate_from_checkpoint(current_checkpoint, position);
        let next = current_checkpoint + 1;

        debug!(
            "position {:?} snapped to point {} ({:.1}m away), checkpoint {}",
            position, nearest.index, nearest.distance_m, current_checkpoint
        );

        EtaReport {
            position: *position,
            nearest,
            current_checkpoint,
            next_checkpoint: (next < self.checkpoints.len()).then_some(next),
            etas,
        }
    }

    /// ETAs when the current checkpoint is already known.
    pub fn estimate_from_checkpoint(&self, current_checkpoint: usize, position: &GpsPoint) -> Vec<f64> {
        let checkpoints = self.checkpoints.checkpoints();
        let mut etas = vec![UNREACHABLE_ETA; checkpoints.len()];

        let next = current_checkpoint.saturating_add(1);
        let Some(next_cp) = checkpoints.get(next) else {
            return etas;
        };

        let points = self.route.points();
        let base_trip = points[next_cp.route_model_index].trip_distance_m;
        let eta_next = self.travel_time(geodesic_distance(position, &next_cp.coordinate()));
        etas[next] = eta_next;

        for (k, cp) in checkpoints.iter().enumerate().skip(next + 1) {
            let ahead = points[cp.route_model_index].trip_distance_m - base_trip;
            etas[k] = eta_next + self.travel_time(ahead);
        }
        etas
    }

    /// Time to cover `distance_m` at the configured speed, in the configured unit.
    pub fn travel_time(&self, distance_m: f64) -> f64 {
        distance_m / 1000.0 / self.config.speed_kmh * self.config.unit.per_hour()
    }
}

/// Caller-owned tracking state: last known position, current checkpoint and
/// the most recent ETAs.
///
/// A failed refresh leaves all three untouched.
#[derive(Debug, Clone, Default)]
pub struct EtaSession {
    last_report: Option<EtaReport>,
}

impl EtaSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Option<GpsPoint> {
        self.last_report.as_ref().map(|r| r.position)
    }

    /// Checkpoint of the last accepted position, 0 before the first update.
    pub fn current_checkpoint(&self) -> usize {
        self.last_report.as_ref().map_or(0, |r| r.current_checkpoint)
    }

    /// Last ETA vector, empty before the first update.
    pub fn etas(&self) -> &[f64] {
        self.last_report.as_ref().map(|r| r.etas.as_slice()).unwrap_or_default()
    }

    pub fn last_report(&self) -> Option<&EtaReport> {
        self.last_report.as_ref()
    }

    /// Accept a position fix and recompute ETAs.
    pub fn update_position(&mut self, engine: &EtaEngine<'_>, position: GpsPoint) -> Result<&EtaReport> {
        if !position.is_valid() {
            return Err(RouteError::Configuration(format!(
                "invalid position ({}, {})",
                position.latitude, position.longitude
            )));
        }
        let report = engine.estimate(&position);
        Ok(&*self.last_report.insert(report))
    }

    /// Read the position from `source` and recompute ETAs.
    ///
    /// Source failures and unusable fixes surface as
    /// [`RouteError::LocationUnavailable`]; callers may retry.
    pub fn refresh(&mut self, engine: &EtaEngine<'_>, source: &dyn LocationSource) -> Result<&EtaReport> {
        let position = source
            .read_location()
            .map_err(RouteError::LocationUnavailable)?;
        if !position.is_valid() {
            return Err(RouteError::LocationUnavailable(SourceError::Parse(format!(
                "invalid position ({}, {})",
                position.latitude, position.longitude
            ))));
        }
        self.update_position(engine, position)
    }
}
