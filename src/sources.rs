//! Collaborator interfaces for live location, weather and elevation data.
//!
//! The pipeline never performs I/O on its own. Anything that talks to a
//! device, a file or a web service implements one of these traits and is
//! passed in by the caller. Plain closures implement every trait, which keeps
//! tests and one-off integrations short:
//!
//! ```rust
//! use route_model::{GpsPoint, LocationSource, SourceError};
//!
//! let fixed = || -> Result<GpsPoint, SourceError> { Ok(GpsPoint::new(43.47, -80.54)) };
//! assert_eq!(fixed.read_location().unwrap().latitude, 43.47);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{GpsPoint, SourceError};

/// Weather measurements at one location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    /// Forecast timestamp as reported by the provider.
    pub forecast_time: Option<String>,
    /// Measurement name to value, e.g. `"temperature_2m" -> 21.4`.
    pub fields: BTreeMap<String, f64>,
}

/// Provides the vehicle's current position.
pub trait LocationSource {
    fn read_location(&self) -> Result<GpsPoint, SourceError>;
}

/// Provides current weather at a point.
pub trait WeatherSource {
    fn fetch_weather(&self, point: GpsPoint) -> Result<WeatherReading, SourceError>;
}

/// Provides ground elevation (meters) for a batch of points.
///
/// Implementations must return exactly one value per input point, in order.
pub trait ElevationSource {
    fn fetch_elevations(&self, points: &[GpsPoint]) -> Result<Vec<f64>, SourceError>;
}

impl<F> LocationSource for F
where
    F: Fn() -> Result<GpsPoint, SourceError>,
{
    fn read_location(&self) -> Result<GpsPoint, SourceError> {
        self()
    }
}

impl<F> WeatherSource for F
where
    F: Fn(GpsPoint) -> Result<WeatherReading, SourceError>,
{
    fn fetch_weather(&self, point: GpsPoint) -> Result<WeatherReading, SourceError> {
        self(point)
    }
}

impl<F> ElevationSource for F
where
    F: Fn(&[GpsPoint]) -> Result<Vec<f64>, SourceError>,
{
    fn fetch_elevations(&self, points: &[GpsPoint]) -> Result<Vec<f64>, SourceError> {
        self(points)
    }
}

/// Reads the live position from a text file whose first line is
/// `"lat, lon"`. The file is re-read on every call, so an external process
/// can keep overwriting it.
#[derive(Debug, Clone)]
pub struct FileLocationSource {
    path: PathBuf,
}

impl FileLocationSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocationSource for FileLocationSource {
    fn read_location(&self) -> Result<GpsPoint, SourceError> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        let point = parse_location_line(text.lines().next().unwrap_or_default())?;
        debug!("read location {:?} from {}", point, self.path.display());
        Ok(point)
    }
}

/// Parse a `"lat, lon"` line.
pub fn parse_location_line(line: &str) -> Result<GpsPoint, SourceError> {
    let (lat, lon) = line
        .split_once(',')
        .ok_or_else(|| SourceError::Parse(format!("expected 'lat, lon', got '{}'", line.trim())))?;

    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|e| SourceError::Parse(format!("bad coordinate '{}': {}", s.trim(), e)))
    };
    let point = GpsPoint::new(parse(lat)?, parse(lon)?);

    if !point.is_valid() {
        return Err(SourceError::Parse(format!(
            "coordinates out of range: ({}, {})",
            point.latitude, point.longitude
        )));
    }
    Ok(point)
}
