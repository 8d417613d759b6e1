//! Elevation profile of a route, fetched through an [`ElevationSource`].

use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::route::{csv_path, RouteModel};
use crate::sources::ElevationSource;
use crate::{GpsPoint, Result, RouteError, SourceError};

/// Points per elevation request.
pub const DEFAULT_ELEVATION_CHUNK: usize = 100;

/// One row of the elevation profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "elevation(m)")]
    pub elevation_m: f64,
    /// Elevation change to the next point, `None` on the last point.
    #[serde(rename = "elevation_gains_to_next(m)")]
    pub gain_to_next_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElevationProfile {
    points: Vec<ElevationPoint>,
}

impl ElevationProfile {
    /// Query elevations for every route point, `chunk_size` points per request.
    pub fn fetch(route: &RouteModel, source: &dyn ElevationSource, chunk_size: usize) -> Result<Self> {
        Self::fetch_points(&route.coordinates(), source, chunk_size)
    }

    pub fn fetch_points(points: &[GpsPoint], source: &dyn ElevationSource, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RouteError::Configuration("elevation chunk size must be positive".to_string()));
        }

        let mut elevations = Vec::with_capacity(points.len());
        for (i, chunk) in points.chunks(chunk_size).enumerate() {
            let batch = source.fetch_elevations(chunk)?;
            if batch.len() != chunk.len() {
                return Err(SourceError::Parse(format!(
                    "elevation request {} returned {} values for {} points",
                    i,
                    batch.len(),
                    chunk.len()
                ))
                .into());
            }
            debug!("elevation request {}: {} points", i, chunk.len());
            elevations.extend(batch);
        }

        let profile = Self::from_elevations(points, &elevations)?;
        info!(
            "fetched elevation profile: {} points, +{:.0}m / -{:.0}m",
            profile.len(),
            profile.total_ascent(),
            profile.total_descent()
        );
        Ok(profile)
    }

    /// Pair coordinates with known elevations.
    pub fn from_elevations(points: &[GpsPoint], elevations: &[f64]) -> Result<Self> {
        if points.len() != elevations.len() {
            return Err(RouteError::Configuration(format!(
                "{} points but {} elevations",
                points.len(),
                elevations.len()
            )));
        }

        let points = points
            .iter()
            .zip(elevations)
            .enumerate()
            .map(|(i, (p, &elevation_m))| ElevationPoint {
                latitude: p.latitude,
                longitude: p.longitude,
                elevation_m,
                gain_to_next_m: elevations.get(i + 1).map(|next| next - elevation_m),
            })
            .collect();

        Ok(Self { points })
    }

    pub fn points(&self) -> &[ElevationPoint] {
        &self.points
    }

    pub fn elevations(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.elevation_m).collect()
    }

    /// Rows `start..end`, clamped to the profile.
    pub fn range(&self, start: usize, end: usize) -> &[ElevationPoint] {
        let end = end.min(self.points.len());
        &self.points[start.min(end)..end]
    }

    /// Sum of positive elevation changes.
    pub fn total_ascent(&self) -> f64 {
        self.points.iter().filter_map(|p| p.gain_to_next_m).filter(|g| *g > 0.0).sum()
    }

    /// Sum of negative elevation changes, as a positive number.
    pub fn total_descent(&self) -> f64 {
        -self.points.iter().filter_map(|p| p.gain_to_next_m).filter(|g| *g < 0.0).sum::<f64>()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        for point in &self.points {
            csv.serialize(point)?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let path = csv_path(path.as_ref());
        self.write_csv(std::fs::File::create(&path)?)?;
        Ok(path)
    }
}
