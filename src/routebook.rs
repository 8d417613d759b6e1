//! Alignment of the race organizers' route-book with a built route.
//!
//! The route-book is a turn-by-turn table keyed by cumulative trip miles.
//! Each row is placed on the route point whose trip distance is closest to
//! the row's, keeping the route-book order: rows land on distinct, strictly
//! increasing route indices.
//!
//! ```rust
//! use route_model::{GpsPoint, MappedRoutebook, RoutebookConfig, RoutebookEntry, RouteConfig, RouteModel};
//!
//! let waypoints = vec![
//!     GpsPoint::new(43.81857948416717, -79.40101625627213),
//!     GpsPoint::new(43.82045746557804, -79.3901457521166),
//!     GpsPoint::new(43.81990512423598, -79.38545051088512),
//! ];
//! let route = RouteModel::new(&waypoints, RouteConfig::with_interval(100.0)).unwrap();
//!
//! let csv = "Step,Trip,Int,Major Turns/Instructions,Landmarks/Notes,Ln,Spd,Shoulder,Services\n\
//!            1,0.0,0.0,Start on Elgin Mills,,2,50,Y,\n\
//!            2,0.5,0.5,Continue east,Gas station,2,50,Y,Fuel\n";
//! let entries = RoutebookEntry::read_csv(csv.as_bytes()).unwrap();
//! let mapped = MappedRoutebook::map(&route, entries, &RoutebookConfig::default()).unwrap();
//! assert_eq!(mapped.route_indices(), &[0, 8]);
//! ```

use std::io;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::route::{write_route_csv, RouteModel};
use crate::{Result, RouteError};

pub const METERS_PER_MILE: f64 = 1609.344;
pub const MPS_PER_MPH: f64 = 0.44704;

/// Route-book mapping configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutebookConfig {
    /// Largest acceptable gap (meters) between a row's trip distance and
    /// its mapped point before a warning is logged.
    /// Default: `None`, meaning half the route's interval bound.
    pub tolerance_m: Option<f64>,
}

/// One route-book row in SI units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutebookEntry {
    pub step: Option<String>,
    #[serde(rename = "routebook_trip(m)")]
    pub trip_m: f64,
    pub instructions: Option<String>,
    pub landmarks_notes: Option<String>,
    pub lanes: Option<String>,
    #[serde(rename = "speed_limit(m/s)")]
    pub speed_limit_mps: Option<f64>,
    pub shoulder: Option<String>,
    pub services: Option<String>,
}

/// Row as printed in the route-book, imperial units.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Step")]
    step: Option<String>,
    #[serde(rename = "Trip")]
    trip_mi: f64,
    #[serde(rename = "Major Turns/Instructions")]
    instructions: Option<String>,
    #[serde(rename = "Landmarks/Notes")]
    landmarks_notes: Option<String>,
    #[serde(rename = "Ln")]
    lanes: Option<String>,
    #[serde(rename = "Spd", deserialize_with = "csv::invalid_option")]
    speed_mph: Option<f64>,
    #[serde(rename = "Shoulder")]
    shoulder: Option<String>,
    #[serde(rename = "Services")]
    services: Option<String>,
}

impl From<RawRow> for RoutebookEntry {
    fn from(row: RawRow) -> Self {
        Self {
            step: row.step,
            trip_m: row.trip_mi * METERS_PER_MILE,
            instructions: row.instructions,
            landmarks_notes: row.landmarks_notes,
            lanes: row.lanes,
            speed_limit_mps: row.speed_mph.map(|mph| mph * MPS_PER_MPH),
            shoulder: row.shoulder,
            services: row.services,
        }
    }
}

impl RoutebookEntry {
    const CSV_HEADER: [&'static str; 8] = [
        "step",
        "routebook_trip(m)",
        "instructions",
        "landmarks_notes",
        "lanes",
        "speed_limit(m/s)",
        "shoulder",
        "services",
    ];

    /// Parse a route-book CSV. Blank and whitespace-only cells are treated as
    /// missing; the `Int` column is ignored.
    pub fn read_csv<R: io::Read>(reader: R) -> Result<Vec<Self>> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut entries = Vec::new();
        for row in csv.deserialize::<RawRow>() {
            entries.push(row?.into());
        }
        Ok(entries)
    }

    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        Self::read_csv(std::fs::File::open(path)?)
    }

    fn csv_record(&self) -> Vec<String> {
        vec![
            self.step.clone().unwrap_or_default(),
            self.trip_m.to_string(),
            self.instructions.clone().unwrap_or_default(),
            self.landmarks_notes.clone().unwrap_or_default(),
            self.lanes.clone().unwrap_or_default(),
            self.speed_limit_mps.map(|v| v.to_string()).unwrap_or_default(),
            self.shoulder.clone().unwrap_or_default(),
            self.services.clone().unwrap_or_default(),
        ]
    }
}

/// Route-book rows together with the route index each row maps to.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRoutebook {
    entries: Vec<RoutebookEntry>,
    route_indices: Vec<usize>,
}

impl MappedRoutebook {
    /// Map each row, in order, to the closest route point after the previous
    /// row's point.
    ///
    /// Gaps larger than the tolerance and a route shorter than the
    /// route-book are logged. Running out of route points fails with
    /// [`RouteError::RouteMapping`].
    pub fn map(route: &RouteModel, entries: Vec<RoutebookEntry>, config: &RoutebookConfig) -> Result<Self> {
        let tolerance = config
            .tolerance_m
            .unwrap_or(route.interval_upper_bound() / 2.0);
        let trips = route.trip_distances();

        if let Some(last) = entries.last() {
            if route.total_distance() < last.trip_m {
                warn!(
                    "route ({:.0}m) is shorter than the route-book ({:.0}m)",
                    route.total_distance(),
                    last.trip_m
                );
            }
        }

        let mut route_indices = Vec::with_capacity(entries.len());
        let mut start = 0;

        for (row, entry) in entries.iter().enumerate() {
            let candidates = trips.get(start..).filter(|c| !c.is_empty()).ok_or_else(|| {
                RouteError::RouteMapping(format!(
                    "route-book row {} (step {}) has no route point left to map to; {} rows for {} points",
                    row,
                    entry.step.as_deref().unwrap_or("?"),
                    entries.len(),
                    trips.len()
                ))
            })?;

            // Trip distances are sorted: the closest is next to the insertion point
            let upper = candidates.partition_point(|t| *t < entry.trip_m);
            let offset = match upper {
                0 => 0,
                u if u == candidates.len() => u - 1,
                u if (candidates[u] - entry.trip_m) < (entry.trip_m - candidates[u - 1]) => u,
                u => u - 1,
            };
            let index = start + offset;

            let gap = (trips[index] - entry.trip_m).abs();
            if gap > tolerance {
                warn!(
                    "route-book row {} at {:.0}m mapped to point {} at {:.0}m ({:.0}m apart)",
                    row, entry.trip_m, index, trips[index], gap
                );
            }

            route_indices.push(index);
            start = index + 1;
        }

        info!("mapped {} route-book rows onto {} route points", entries.len(), trips.len());

        Ok(Self {
            entries,
            route_indices,
        })
    }

    /// Parse and map a route-book CSV in one step.
    pub fn from_csv<R: io::Read>(route: &RouteModel, reader: R, config: &RoutebookConfig) -> Result<Self> {
        Self::map(route, RoutebookEntry::read_csv(reader)?, config)
    }

    pub fn entries(&self) -> &[RoutebookEntry] {
        &self.entries
    }

    /// Route index of every entry, strictly increasing.
    pub fn route_indices(&self) -> &[usize] {
        &self.route_indices
    }

    /// Entry mapped onto a route point, if any.
    pub fn entry_at(&self, route_index: usize) -> Option<&RoutebookEntry> {
        self.route_indices
            .binary_search(&route_index)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// `(route_index, entry)` pairs in route order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &RoutebookEntry)> {
        self.route_indices.iter().copied().zip(&self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the route model with route-book columns appended; points without
    /// an entry get empty cells.
    pub fn write_route_csv<W: io::Write>(&self, route: &RouteModel, writer: W) -> Result<()> {
        write_route_csv(route.points(), writer, &RoutebookEntry::CSV_HEADER, |i| match self.entry_at(i) {
            Some(entry) => entry.csv_record(),
            None => vec![String::new(); RoutebookEntry::CSV_HEADER.len()],
        })
    }
}
