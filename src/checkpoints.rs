//! Fixed-distance checkpoints along a route.
//!
//! The route is cut into buckets of `frequency_m` meters of trip distance.
//! The first point entering each bucket becomes a checkpoint; weather is
//! sampled and ETAs are reported per checkpoint.
//!
//! [`CheckpointIndex`] is derived once from a [`RouteModel`] and never
//! changes. Mutable per-checkpoint data (weather, timestamps) lives in a
//! separate [`CheckpointStore`].

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::route::{csv_path, write_route_csv, RouteModel};
use crate::sources::WeatherSource;
use crate::{GpsPoint, Result, RouteError};

/// A route point selected as a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Index of the checkpoint's point in the route model.
    pub route_model_index: usize,
}

impl Checkpoint {
    pub fn coordinate(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// Configuration for checkpoint generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Trip distance between checkpoints, in meters.
    /// Default: 1000.0
    pub frequency_m: f64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { frequency_m: 1000.0 }
    }
}

/// Checkpoints of a route plus the bucket tag of every route point.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointIndex {
    frequency_m: f64,
    checkpoints: Vec<Checkpoint>,
    point_checkpoints: Vec<usize>,
}

impl CheckpointIndex {
    /// Tag every route point with `floor(trip / frequency_m)` and emit a
    /// checkpoint wherever that value changes.
    ///
    /// # Example
    /// ```
    /// use route_model::{CheckpointIndex, GpsPoint, RouteConfig, RouteModel};
    ///
    /// let waypoints = vec![
    ///     GpsPoint::new(43.81857948416717, -79.40101625627213),
    ///     GpsPoint::new(43.82045746557804, -79.3901457521166),
    ///     GpsPoint::new(43.81990512423598, -79.38545051088512),
    /// ];
    /// let route = RouteModel::new(&waypoints, RouteConfig::with_interval(100.0)).unwrap();
    /// let index = CheckpointIndex::build(&route, 500.0).unwrap();
    ///
    /// // 1281m of route -> buckets 0, 1 and 2
    /// assert_eq!(index.len(), 3);
    /// assert_eq!(index.checkpoints()[0].route_model_index, 0);
    /// ```
    pub fn build(route: &RouteModel, frequency_m: f64) -> Result<Self> {
        if !frequency_m.is_finite() || frequency_m <= 0.0 {
            return Err(RouteError::Configuration(format!(
                "checkpoint frequency must be a positive distance, got {}",
                frequency_m
            )));
        }

        let mut checkpoints = Vec::new();
        let mut point_checkpoints = Vec::with_capacity(route.len());
        let mut last_bucket: Option<usize> = None;

        for (i, point) in route.points().iter().enumerate() {
            // Trip distance is non-negative, so the cast only floors
            let bucket = (point.trip_distance_m / frequency_m).floor() as usize;

            if last_bucket != Some(bucket) {
                if let Some(prev) = last_bucket {
                    if bucket > prev + 1 {
                        warn!(
                            "route point {} jumps from checkpoint bucket {} to {}; interval bound is coarser than the {}m frequency",
                            i, prev, bucket, frequency_m
                        );
                    }
                }
                checkpoints.push(Checkpoint {
                    latitude: point.latitude,
                    longitude: point.longitude,
                    route_model_index: i,
                });
                last_bucket = Some(bucket);
            }
            point_checkpoints.push(bucket);
        }

        info!(
            "generated {} checkpoints every {}m over {} route points",
            checkpoints.len(),
            frequency_m,
            route.len()
        );

        Ok(Self {
            frequency_m,
            checkpoints,
            point_checkpoints,
        })
    }

    pub fn from_config(route: &RouteModel, config: &CheckpointConfig) -> Result<Self> {
        Self::build(route, config.frequency_m)
    }

    pub fn frequency(&self) -> f64 {
        self.frequency_m
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn get(&self, index: usize) -> Option<&Checkpoint> {
        self.checkpoints.get(index)
    }

    /// Bucket tag of every route point, parallel to [`RouteModel::points`].
    pub fn point_checkpoints(&self) -> &[usize] {
        &self.point_checkpoints
    }

    /// Bucket tag of one route point.
    pub fn checkpoint_of(&self, point_index: usize) -> Option<usize> {
        self.point_checkpoints.get(point_index).copied()
    }

    /// Position in [`checkpoints`](Self::checkpoints) of the last checkpoint
    /// at or before a route point.
    ///
    /// Matches [`checkpoint_of`](Self::checkpoint_of) unless a segment longer
    /// than the frequency skipped buckets; then the tag runs ahead of the
    /// checkpoint list and this is the usable index.
    pub fn section_of(&self, point_index: usize) -> Option<usize> {
        if point_index >= self.point_checkpoints.len() {
            return None;
        }
        self.checkpoints
            .partition_point(|cp| cp.route_model_index <= point_index)
            .checked_sub(1)
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Write the checkpoint dataset with empty `last_updated` and
    /// `forecast_time` columns.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(CHECKPOINT_HEADER)?;
        for cp in &self.checkpoints {
            csv.write_record([
                cp.latitude.to_string(),
                cp.longitude.to_string(),
                cp.route_model_index.to_string(),
                String::new(),
                String::new(),
            ])?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let path = csv_path(path.as_ref());
        self.write_csv(std::fs::File::create(&path)?)?;
        info!("saved {} checkpoints to {}", self.len(), path.display());
        Ok(path)
    }

    /// Write the route model extended with a `checkpoint` column.
    ///
    /// `route` must be the model this index was built from.
    pub fn write_route_csv<W: io::Write>(&self, route: &RouteModel, writer: W) -> Result<()> {
        if route.len() != self.point_checkpoints.len() {
            return Err(RouteError::Configuration(format!(
                "checkpoint index covers {} points but the route has {}",
                self.point_checkpoints.len(),
                route.len()
            )));
        }
        write_route_csv(route.points(), writer, &["checkpoint"], |i| {
            vec![self.point_checkpoints[i].to_string()]
        })
    }

    pub fn save_route_csv<P: AsRef<Path>>(&self, route: &RouteModel, path: P) -> Result<PathBuf> {
        let path = csv_path(path.as_ref());
        self.write_route_csv(route, std::fs::File::create(&path)?)?;
        Ok(path)
    }
}

const CHECKPOINT_HEADER: [&str; 5] = [
    "latitude",
    "longitude",
    "route_model_index",
    "last_updated",
    "forecast_time",
];

// ============================================================================
// Weather store
// ============================================================================

/// One checkpoint row with the data attached to it by weather updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub route_model_index: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub forecast_time: Option<String>,
    /// Weather measurements keyed by field name.
    pub weather: BTreeMap<String, f64>,
}

impl From<&Checkpoint> for CheckpointRecord {
    fn from(cp: &Checkpoint) -> Self {
        Self {
            latitude: cp.latitude,
            longitude: cp.longitude,
            route_model_index: cp.route_model_index,
            last_updated: None,
            forecast_time: None,
            weather: BTreeMap::new(),
        }
    }
}

impl CheckpointRecord {
    pub fn coordinate(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// Shared, concurrently readable checkpoint rows.
///
/// Rows are replaced whole: a reader holding an `Arc` from [`get`](Self::get)
/// or [`snapshot`](Self::snapshot) keeps seeing the row as it was, and never
/// a mix of old and new fields.
#[derive(Debug, Default)]
pub struct CheckpointStore {
    records: RwLock<Vec<Arc<CheckpointRecord>>>,
}

impl CheckpointStore {
    pub fn new(index: &CheckpointIndex) -> Self {
        let records = index
            .checkpoints()
            .iter()
            .map(|cp| Arc::new(CheckpointRecord::from(cp)))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Arc<CheckpointRecord>> {
        self.read().get(index).cloned()
    }

    /// All rows as of now.
    pub fn snapshot(&self) -> Vec<Arc<CheckpointRecord>> {
        self.read().clone()
    }

    /// Swap in a new row, returning the old one.
    pub fn replace(&self, index: usize, record: CheckpointRecord) -> Result<Arc<CheckpointRecord>> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let len = records.len();
        let slot = records
            .get_mut(index)
            .ok_or(RouteError::CheckpointOutOfRange { index, len })?;
        Ok(std::mem::replace(slot, Arc::new(record)))
    }

    /// Fetch weather at a checkpoint and replace its row.
    ///
    /// The source is queried without holding the lock. On failure the row is
    /// left untouched.
    pub fn refresh_weather(&self, index: usize, source: &dyn WeatherSource) -> Result<Arc<CheckpointRecord>> {
        let out_of_range = || RouteError::CheckpointOutOfRange {
            index,
            len: self.len(),
        };
        let current = self.get(index).ok_or_else(out_of_range)?;

        let reading = source.fetch_weather(current.coordinate())?;

        let updated = CheckpointRecord {
            last_updated: Some(Utc::now()),
            forecast_time: reading.forecast_time,
            weather: reading.fields,
            ..(*current).clone()
        };
        self.replace(index, updated)?;
        self.get(index).ok_or_else(out_of_range)
    }

    /// Refresh every checkpoint, returning how many rows were updated.
    /// Failed checkpoints keep their previous data.
    pub fn refresh_all(&self, source: &dyn WeatherSource) -> usize {
        let total = self.len();
        let mut updated = 0;
        for i in 0..total {
            match self.refresh_weather(i, source) {
                Ok(_) => updated += 1,
                Err(e) => warn!("weather refresh failed for checkpoint {}: {}", i, e),
            }
        }
        info!("refreshed weather for {}/{} checkpoints", updated, total);
        updated
    }

    /// Write all rows. Weather columns are the sorted union of every row's
    /// fields; missing values are empty.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let rows = self.snapshot();
        let fields: BTreeSet<&str> = rows
            .iter()
            .flat_map(|r| r.weather.keys().map(String::as_str))
            .collect();

        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(CHECKPOINT_HEADER.iter().copied().chain(fields.iter().copied()))?;
        for row in &rows {
            let mut record = vec![
                row.latitude.to_string(),
                row.longitude.to_string(),
                row.route_model_index.to_string(),
                row.last_updated.map(|t| t.to_rfc3339()).unwrap_or_default(),
                row.forecast_time.clone().unwrap_or_default(),
            ];
            record.extend(
                fields
                    .iter()
                    .map(|f| row.weather.get(*f).map(f64::to_string).unwrap_or_default()),
            );
            csv.write_record(&record)?;
        }
        csv.flush()?;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<CheckpointRecord>>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::WeatherReading;
    use crate::test_fixtures;
    use crate::{RouteConfig, SourceError};

    fn waterloo_route() -> RouteModel {
        RouteModel::new(&test_fixtures::waterloo(), RouteConfig::with_interval(25.0)).unwrap()
    }

    #[test]
    fn test_waterloo_checkpoints() {
        let route = waterloo_route();
        let index = CheckpointIndex::build(&route, 1000.0).unwrap();

        assert_eq!(index.len(), 7);
        assert_eq!(index.point_checkpoints().len(), route.len());
        assert_eq!(index.checkpoints()[0].route_model_index, 0);

        let points = route.points();
        for (k, cp) in index.checkpoints().iter().enumerate() {
            let i = cp.route_model_index;
            assert!(points[i].trip_distance_m >= k as f64 * 1000.0);
            if i > 0 {
                assert!(points[i - 1].trip_distance_m < k as f64 * 1000.0);
            }
            assert_eq!(cp.coordinate(), points[i].coordinate());
            assert_eq!(index.checkpoint_of(i), Some(k));
            assert_eq!(index.section_of(i), Some(k));
        }
    }

    #[test]
    fn test_tags_non_decreasing() {
        let index = CheckpointIndex::build(&waterloo_route(), 500.0).unwrap();
        let tags = index.point_checkpoints();
        assert_eq!(tags[0], 0);
        assert!(tags.windows(2).all(|w| w[1] >= w[0] && w[1] - w[0] <= 1));
        assert_eq!(*tags.last().unwrap(), 12);
    }

    #[test]
    fn test_deterministic() {
        // Two separately built, identical route models
        let first = waterloo_route();
        let second = waterloo_route();
        assert_eq!(first.points(), second.points());

        let a = CheckpointIndex::build(&first, 750.0).unwrap();
        let b = CheckpointIndex::build(&second, 750.0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.point_checkpoints(), b.point_checkpoints());
    }

    #[test]
    fn test_skipped_buckets() {
        // Sparse route: one 899m leg spans several 100m buckets
        let route = RouteModel::new(&test_fixtures::richmond_hill(), RouteConfig::with_interval(1000.0)).unwrap();
        let index = CheckpointIndex::build(&route, 100.0).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.point_checkpoints(), &[0, 8, 12]);
        assert_eq!(index.checkpoint_of(1), Some(8));
        assert_eq!(index.section_of(0), Some(0));
        assert_eq!(index.section_of(1), Some(1));
        assert_eq!(index.section_of(2), Some(2));
        assert_eq!(index.section_of(3), None);
    }

    #[test]
    fn test_invalid_frequency() {
        let route = waterloo_route();
        for freq in [0.0, -5.0, f64::INFINITY, f64::NAN] {
            assert!(matches!(CheckpointIndex::build(&route, freq), Err(RouteError::Configuration(_))));
        }
        assert_eq!(
            CheckpointIndex::from_config(&route, &CheckpointConfig::default()).unwrap().frequency(),
            1000.0
        );
    }

    #[test]
    fn test_checkpoint_csv() {
        let route = waterloo_route();
        let index = CheckpointIndex::build(&route, 1000.0).unwrap();

        let mut buffer = Vec::new();
        index.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "latitude,longitude,route_model_index,last_updated,forecast_time");
        let first = lines.next().unwrap();
        assert!(first.ends_with(",0,,"));
        assert_eq!(lines.count(), 6);

        let mut buffer = Vec::new();
        index.write_route_csv(&route, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.lines().next().unwrap().ends_with("relative_turn_angle,checkpoint"));
        assert!(text.lines().last().unwrap().ends_with(",6"));
        assert_eq!(text.lines().count(), route.len() + 1);
    }

    #[test]
    fn test_route_csv_rejects_other_route() {
        let index = CheckpointIndex::build(&waterloo_route(), 1000.0).unwrap();
        let other = RouteModel::new(&test_fixtures::richmond_hill(), RouteConfig::default()).unwrap();
        assert!(index.write_route_csv(&other, Vec::new()).is_err());
    }

    fn reading(temp: f64) -> WeatherReading {
        let mut fields = BTreeMap::new();
        fields.insert("temperature".to_string(), temp);
        WeatherReading {
            forecast_time: Some("2024-07-01T12:00".to_string()),
            fields,
        }
    }

    #[test]
    fn test_store_refresh() {
        let index = CheckpointIndex::build(&waterloo_route(), 1000.0).unwrap();
        let store = CheckpointStore::new(&index);
        assert_eq!(store.len(), 7);
        assert!(store.get(0).unwrap().last_updated.is_none());

        let before = store.get(2).unwrap();
        let source = |p: GpsPoint| -> std::result::Result<WeatherReading, SourceError> { Ok(reading(p.latitude)) };
        let updated = store.refresh_weather(2, &source).unwrap();

        assert!(updated.last_updated.is_some());
        assert_eq!(updated.weather["temperature"], updated.latitude);
        assert_eq!(updated.route_model_index, before.route_model_index);
        // An old handle still sees the old row
        assert!(before.weather.is_empty());
    }

    #[test]
    fn test_store_refresh_failure_keeps_row() {
        let index = CheckpointIndex::build(&waterloo_route(), 1000.0).unwrap();
        let store = CheckpointStore::new(&index);
        store.replace(1, CheckpointRecord { forecast_time: Some("t0".into()), ..(*store.get(1).unwrap()).clone() }).unwrap();

        let failing = |_: GpsPoint| -> std::result::Result<WeatherReading, SourceError> {
            Err(SourceError::Unavailable("offline".into()))
        };
        assert!(matches!(store.refresh_weather(1, &failing), Err(RouteError::Source(_))));
        assert_eq!(store.get(1).unwrap().forecast_time.as_deref(), Some("t0"));

        assert!(matches!(
            store.refresh_weather(99, &failing),
            Err(RouteError::CheckpointOutOfRange { index: 99, len: 7 })
        ));
        assert_eq!(store.refresh_all(&failing), 0);
    }

    #[test]
    fn test_store_refresh_all_and_csv() {
        let index = CheckpointIndex::build(&waterloo_route(), 1000.0).unwrap();
        let store = CheckpointStore::new(&index);

        let source = |p: GpsPoint| -> std::result::Result<WeatherReading, SourceError> {
            if p.latitude > 43.49 {
                Err(SourceError::Unavailable("out of coverage".into()))
            } else {
                Ok(reading(21.5))
            }
        };
        let updated = store.refresh_all(&source);
        assert!(updated > 0 && updated <= 7);

        let mut buffer = Vec::new();
        store.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text.lines().next().unwrap(),
            "latitude,longitude,route_model_index,last_updated,forecast_time,temperature"
        );
        assert!(text.lines().nth(1).unwrap().ends_with(",2024-07-01T12:00,21.5"));
    }

    #[test]
    fn test_store_concurrent_readers() {
        let index = CheckpointIndex::build(&waterloo_route(), 1000.0).unwrap();
        let store = Arc::new(CheckpointStore::new(&index));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for t in 0..50 {
                    let source = move |_: GpsPoint| -> std::result::Result<WeatherReading, SourceError> {
                        Ok(reading(t as f64))
                    };
                    store.refresh_weather(3, &source).unwrap();
                }
            })
        };

        for _ in 0..50 {
            let row = store.get(3).unwrap();
            // Either untouched or a complete update
            assert_eq!(row.last_updated.is_some(), row.forecast_time.is_some());
            assert_eq!(row.last_updated.is_some(), row.weather.contains_key("temperature"));
        }
        writer.join().unwrap();
    }
}
