//! Navigation features for a dense route.
//!
//! For every dense point this derives the geodesic distance and azimuths to its
//! neighbours, the cumulative trip distance, a compass travel-direction label
//! and, for interior points, the relative turn and its classification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::geo_utils::{geodesic_bearing, geodesic_distance, normalize_angle, to_signed_bearing};
use crate::segmenter::DenseRoute;
use crate::{GpsPoint, Result, RouteError};

/// One row of the route model.
///
/// Serde names match the CSV column names consumed by the dashboard and
/// weather tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    /// Original waypoint index, set only on waypoint positions.
    #[serde(rename = "polyline_point_index")]
    pub segment_index: Option<usize>,
    pub latitude: f64,
    pub longitude: f64,
    /// Cumulative geodesic distance from the first point, in meters.
    #[serde(rename = "trip(m)")]
    pub trip_distance_m: f64,
    /// Geodesic distance to the next point, `None` on the last point.
    #[serde(rename = "dist_to_next_coordinate(m)")]
    pub dist_to_next_m: Option<f64>,
    /// Forward azimuth in (-180, 180].
    pub true_bearing_to_next: Option<f64>,
    pub bearing_to_next_360: Option<f64>,
    /// Azimuth back toward the previous point in (-180, 180].
    pub true_bearing_to_prev: Option<f64>,
    pub bearing_to_prev_360: Option<f64>,
    #[serde(rename = "general_travel_direction")]
    pub travel_direction: Option<String>,
    /// Signed turn in [-180, 180]; negative turns left.
    pub turn_bearing: Option<f64>,
    pub turn_type: Option<TurnType>,
    /// `|turn_bearing|` whenever a turn is present.
    pub relative_turn_angle: Option<f64>,
}

impl RoutePoint {
    /// CSV header, in column order.
    pub const CSV_HEADER: [&'static str; 13] = [
        "polyline_point_index",
        "latitude",
        "longitude",
        "trip(m)",
        "dist_to_next_coordinate(m)",
        "true_bearing_to_next",
        "bearing_to_next_360",
        "true_bearing_to_prev",
        "bearing_to_prev_360",
        "general_travel_direction",
        "turn_bearing",
        "turn_type",
        "relative_turn_angle",
    ];

    pub fn coordinate(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }

    /// Row values in [`Self::CSV_HEADER`] order; undefined values are empty.
    pub fn csv_record(&self) -> Vec<String> {
        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(ToString::to_string).unwrap_or_default()
        }

        vec![
            opt(&self.segment_index),
            self.latitude.to_string(),
            self.longitude.to_string(),
            self.trip_distance_m.to_string(),
            opt(&self.dist_to_next_m),
            opt(&self.true_bearing_to_next),
            opt(&self.bearing_to_next_360),
            opt(&self.true_bearing_to_prev),
            opt(&self.bearing_to_prev_360),
            opt(&self.travel_direction),
            opt(&self.turn_bearing),
            opt(&self.turn_type),
            opt(&self.relative_turn_angle),
        ]
    }
}

// ============================================================================
// Turn classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnSeverity {
    Slight,
    Standard,
    Hook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnDirection {
    Left,
    Right,
}

/// Categorical turn, rendered as e.g. `"Slight Right"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnType {
    pub severity: TurnSeverity,
    pub direction: TurnDirection,
}

impl fmt::Display for TurnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            TurnSeverity::Slight => "Slight",
            TurnSeverity::Standard => "Standard",
            TurnSeverity::Hook => "Hook",
        };
        let direction = match self.direction {
            TurnDirection::Left => "Left",
            TurnDirection::Right => "Right",
        };
        write!(f, "{} {}", severity, direction)
    }
}

impl FromStr for TurnType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (severity, direction) = s
            .split_once(' ')
            .ok_or_else(|| format!("unknown turn type '{}'", s))?;
        let severity = match severity {
            "Slight" => TurnSeverity::Slight,
            "Standard" => TurnSeverity::Standard,
            "Hook" => TurnSeverity::Hook,
            _ => return Err(format!("unknown turn severity '{}'", severity)),
        };
        let direction = match direction {
            "Left" => TurnDirection::Left,
            "Right" => TurnDirection::Right,
            _ => return Err(format!("unknown turn direction '{}'", direction)),
        };
        Ok(Self { severity, direction })
    }
}

impl Serialize for TurnType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TurnType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Angle thresholds (degrees) used to classify turns.
///
/// These are empirical tuning values, not derived quantities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnThresholds {
    /// Turns smaller than this are ignored. Default: 1.0
    pub min_turn_deg: f64,
    /// Upper bound (inclusive) of a slight turn. Default: 60.0
    pub slight_max_deg: f64,
    /// Upper bound (inclusive) of a standard turn; anything sharper is a
    /// hook turn. Default: 120.0
    pub standard_max_deg: f64,
}

impl Default for TurnThresholds {
    fn default() -> Self {
        Self {
            min_turn_deg: 1.0,
            slight_max_deg: 60.0,
            standard_max_deg: 120.0,
        }
    }
}

impl TurnThresholds {
    /// Thresholds must be ordered within [0, 180].
    pub fn validate(&self) -> Result<()> {
        let ordered = 0.0 <= self.min_turn_deg
            && self.min_turn_deg <= self.slight_max_deg
            && self.slight_max_deg <= self.standard_max_deg
            && self.standard_max_deg <= 180.0;
        if ordered {
            Ok(())
        } else {
            Err(RouteError::Configuration(format!(
                "turn thresholds must satisfy 0 <= min <= slight <= standard <= 180, got {:?}",
                self
            )))
        }
    }

    /// Classify a signed turn angle.
    pub fn classify(&self, turn_bearing: f64) -> Option<TurnType> {
        let magnitude = turn_bearing.abs();
        if magnitude.is_nan() || magnitude < self.min_turn_deg {
            return None;
        }
        let severity = if magnitude <= self.slight_max_deg {
            TurnSeverity::Slight
        } else if magnitude <= self.standard_max_deg {
            TurnSeverity::Standard
        } else {
            TurnSeverity::Hook
        };
        let direction = if turn_bearing < 0.0 {
            TurnDirection::Left
        } else {
            TurnDirection::Right
        };
        Some(TurnType { severity, direction })
    }
}

/// Compass label for a bearing in [0, 360].
///
/// Exact cardinal bearings map to `N`, `E`, `S`, `W`. Anything else is a
/// quadrant label whose offset is measured from the quadrant's starting axis:
///
/// ```rust
/// use route_model::features::travel_direction;
///
/// assert_eq!(travel_direction(0.0), "N");
/// assert_eq!(travel_direction(76.58), "N77°E");
/// assert_eq!(travel_direction(169.0), "S79°E");
/// assert_eq!(travel_direction(200.0), "S20°W");
/// assert_eq!(travel_direction(300.0), "N30°W");
/// ```
pub fn travel_direction(bearing_360: f64) -> String {
    match bearing_360 {
        b if b == 0.0 || b == 360.0 => "N".to_string(),
        b if b == 90.0 => "E".to_string(),
        b if b == 180.0 => "S".to_string(),
        b if b == 270.0 => "W".to_string(),
        b if b < 90.0 => format!("N{:.0}°E", b),
        b if b < 180.0 => format!("S{:.0}°E", b - 90.0),
        b if b < 270.0 => format!("S{:.0}°W", b - 180.0),
        b => format!("N{:.0}°W", b - 270.0),
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Geodesic inverse solution between two consecutive dense points.
#[derive(Debug, Clone, Copy)]
struct Leg {
    distance: f64,
    bearing_next_360: f64,
    bearing_prev_360: f64,
}

fn solve_leg(from: &GpsPoint, to: &GpsPoint) -> Leg {
    Leg {
        distance: geodesic_distance(from, to),
        bearing_next_360: geodesic_bearing(from, to),
        bearing_prev_360: geodesic_bearing(to, from),
    }
}

#[cfg(feature = "parallel")]
fn solve_legs(points: &[GpsPoint]) -> Vec<Leg> {
    use rayon::prelude::*;
    points.par_windows(2).map(|w| solve_leg(&w[0], &w[1])).collect()
}

#[cfg(not(feature = "parallel"))]
fn solve_legs(points: &[GpsPoint]) -> Vec<Leg> {
    points.windows(2).map(|w| solve_leg(&w[0], &w[1])).collect()
}

/// Derives [`RoutePoint`] rows from dense coordinates.
#[derive(Debug, Clone, Default)]
pub struct RouteFeatureBuilder {
    thresholds: TurnThresholds,
}

impl RouteFeatureBuilder {
    pub fn new(thresholds: TurnThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &TurnThresholds {
        &self.thresholds
    }

    /// Annotate a densified route.
    pub fn build(&self, dense: &DenseRoute) -> Vec<RoutePoint> {
        self.build_points(&dense.points, &dense.segment_indices())
    }

    /// Annotate raw coordinates with an explicit segment-index column.
    ///
    /// `segment_indices` shorter than `points` leaves the missing tail unset.
    ///
    /// Turns are signed differences of `true_bearing_to_next`, so a U-turn
    /// from south to north is -180 (left). Zero-length legs (repeated
    /// coordinates) have no heading: a point leaving on one gets no turn, and
    /// the turn after it is measured from the last leg that moved.
    pub fn build_points(&self, points: &[GpsPoint], segment_indices: &[Option<usize>]) -> Vec<RoutePoint> {
        let legs = solve_legs(points);

        let mut rows = Vec::with_capacity(points.len());
        let mut trip = 0.0;
        // Signed bearing of the last leg with non-zero length
        let mut heading: Option<f64> = None;

        for (i, p) in points.iter().enumerate() {
            let next = legs.get(i);
            let prev = if i > 0 { legs.get(i - 1) } else { None };

            let bearing_to_next_360 = next.map(|l| l.bearing_next_360);
            let bearing_to_prev_360 = prev.map(|l| l.bearing_prev_360);

            let leaving = next
                .filter(|l| l.distance > 0.0)
                .map(|l| to_signed_bearing(l.bearing_next_360));
            let turn_bearing = match (heading, leaving) {
                (Some(arriving), Some(leaving)) => Some(normalize_angle(leaving - arriving)),
                _ => None,
            };
            if leaving.is_some() {
                heading = leaving;
            }
            let turn_type = turn_bearing.and_then(|t| self.thresholds.classify(t));
            // Turns below the minimum are reported as no turn at all
            let turn_bearing = turn_bearing.filter(|_| turn_type.is_some());

            rows.push(RoutePoint {
                segment_index: segment_indices.get(i).copied().flatten(),
                latitude: p.latitude,
                longitude: p.longitude,
                trip_distance_m: trip,
                dist_to_next_m: next.map(|l| l.distance),
                true_bearing_to_next: bearing_to_next_360.map(to_signed_bearing),
                bearing_to_next_360,
                true_bearing_to_prev: bearing_to_prev_360.map(to_signed_bearing),
                bearing_to_prev_360,
                travel_direction: bearing_to_next_360.map(travel_direction),
                turn_bearing,
                turn_type,
                relative_turn_angle: turn_bearing.map(f64::abs),
            });

            if let Some(leg) = next {
                trip += leg.distance;
            }
        }

        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::GeodesicSegmenter;
    use crate::test_fixtures;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn richmond_hill_rows() -> Vec<RoutePoint> {
        let dense = GeodesicSegmenter::new(1000.0)
            .unwrap()
            .densify(&test_fixtures::richmond_hill())
            .unwrap();
        RouteFeatureBuilder::default().build(&dense)
    }

    #[test]
    fn test_distances_and_trip() {
        let rows = richmond_hill_rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].trip_distance_m, 0.0);
        assert!(approx_eq(rows[1].trip_distance_m, 899.06892, 1e-3));
        assert!(approx_eq(rows[2].trip_distance_m, 1281.74487, 1e-3));
        assert!(approx_eq(rows[0].dist_to_next_m.unwrap(), 899.06892, 1e-3));
        assert!(approx_eq(rows[1].dist_to_next_m.unwrap(), 382.67595, 1e-3));
        assert_eq!(rows[2].dist_to_next_m, None);
    }

    #[test]
    fn test_bearings() {
        let rows = richmond_hill_rows();
        assert!(approx_eq(rows[0].true_bearing_to_next.unwrap(), 76.576401, 1e-4));
        assert!(approx_eq(rows[1].true_bearing_to_next.unwrap(), 99.226778, 1e-4));
        assert_eq!(rows[2].true_bearing_to_next, None);
        assert!(approx_eq(rows[0].bearing_to_next_360.unwrap(), 76.576401, 1e-4));

        assert_eq!(rows[0].true_bearing_to_prev, None);
        assert!(approx_eq(rows[1].true_bearing_to_prev.unwrap(), -103.416072, 1e-4));
        assert!(approx_eq(rows[2].true_bearing_to_prev.unwrap(), -80.769971, 1e-4));
        assert!(approx_eq(rows[1].bearing_to_prev_360.unwrap(), 256.583928, 1e-4));
        assert!(approx_eq(rows[2].bearing_to_prev_360.unwrap(), 279.230029, 1e-4));
    }

    #[test]
    fn test_travel_direction_column() {
        let rows = richmond_hill_rows();
        let directions: Vec<Option<&str>> = rows.iter().map(|r| r.travel_direction.as_deref()).collect();
        assert_eq!(directions, vec![Some("N77°E"), Some("S9°E"), None]);
    }

    #[test]
    fn test_turns() {
        let rows = richmond_hill_rows();
        assert_eq!(rows[0].turn_bearing, None);
        assert_eq!(rows[2].turn_bearing, None);
        assert!(approx_eq(rows[1].turn_bearing.unwrap(), 22.65037, 1e-4));
        assert!(approx_eq(rows[1].relative_turn_angle.unwrap(), 22.65037, 1e-4));
        assert_eq!(rows[1].turn_type.unwrap().to_string(), "Slight Right");
    }

    #[test]
    fn test_straight_interpolated_points_have_no_turn() {
        let dense = GeodesicSegmenter::new(100.0)
            .unwrap()
            .densify(&test_fixtures::richmond_hill())
            .unwrap();
        let rows = RouteFeatureBuilder::default().build(&dense);
        // Interior points of a geodesic segment continue straight
        for row in &rows[1..9] {
            assert_eq!(row.turn_type, None);
            assert_eq!(row.turn_bearing, None);
        }
        assert_eq!(rows[9].turn_type.unwrap().to_string(), "Slight Right");
    }

    #[test]
    fn test_u_turn_on_meridian_is_left() {
        // South then straight back north
        let points = [GpsPoint::new(43.0, -80.0), GpsPoint::new(42.99, -80.0), GpsPoint::new(43.0, -80.0)];
        let rows = RouteFeatureBuilder::default().build_points(&points, &[Some(0), Some(1), Some(2)]);

        assert!(approx_eq(rows[0].true_bearing_to_next.unwrap(), 180.0, 1e-9));
        assert!(approx_eq(rows[1].true_bearing_to_next.unwrap(), 0.0, 1e-9));
        assert!(approx_eq(rows[1].turn_bearing.unwrap(), -180.0, 1e-9));
        assert!(approx_eq(rows[1].relative_turn_angle.unwrap(), 180.0, 1e-9));
        assert_eq!(rows[1].turn_type.unwrap().to_string(), "Hook Left");
    }

    #[test]
    fn test_repeated_point_on_straight_road() {
        let points = [
            GpsPoint::new(43.0, -80.0),
            GpsPoint::new(43.0, -79.99),
            GpsPoint::new(43.0, -79.99),
            GpsPoint::new(43.0, -79.98),
        ];
        let rows = RouteFeatureBuilder::default().build_points(&points, &[]);
        assert_eq!(rows[1].dist_to_next_m, Some(0.0));
        assert!(rows.iter().all(|r| r.turn_type.is_none() && r.turn_bearing.is_none()));
    }

    #[test]
    fn test_turn_after_repeated_point() {
        // The left turn onto the northbound leg sits after the duplicate
        let points = [
            GpsPoint::new(43.0, -80.0),
            GpsPoint::new(43.0, -79.99),
            GpsPoint::new(43.0, -79.99),
            GpsPoint::new(43.01, -79.99),
        ];
        let rows = RouteFeatureBuilder::default().build_points(&points, &[]);
        assert_eq!(rows[1].turn_type, None);
        assert_eq!(rows[2].turn_type.unwrap().to_string(), "Standard Left");
        assert!(approx_eq(rows[2].turn_bearing.unwrap(), -90.0, 0.1));
    }

    #[test]
    fn test_classify_thresholds() {
        let t = TurnThresholds::default();
        assert_eq!(t.classify(0.5), None);
        assert_eq!(t.classify(-0.99), None);
        assert_eq!(t.classify(1.0).unwrap().to_string(), "Slight Right");
        assert_eq!(t.classify(-60.0).unwrap().to_string(), "Slight Left");
        assert_eq!(t.classify(60.5).unwrap().to_string(), "Standard Right");
        assert_eq!(t.classify(-120.0).unwrap().to_string(), "Standard Left");
        assert_eq!(t.classify(150.0).unwrap().to_string(), "Hook Right");
        assert_eq!(t.classify(-179.0).unwrap().to_string(), "Hook Left");
    }

    #[test]
    fn test_custom_thresholds() {
        let t = TurnThresholds { min_turn_deg: 5.0, slight_max_deg: 30.0, standard_max_deg: 90.0 };
        assert!(t.validate().is_ok());
        assert_eq!(t.classify(4.0), None);
        assert_eq!(t.classify(45.0).unwrap().severity, TurnSeverity::Standard);
        assert_eq!(t.classify(-100.0).unwrap().severity, TurnSeverity::Hook);

        let bad = TurnThresholds { min_turn_deg: 10.0, slight_max_deg: 5.0, standard_max_deg: 90.0 };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_turn_type_parse() {
        for label in ["Slight Left", "Standard Right", "Hook Left"] {
            let parsed: TurnType = label.parse().unwrap();
            assert_eq!(parsed.to_string(), label);
        }
        assert!("Sharp Left".parse::<TurnType>().is_err());
        assert!("Slight".parse::<TurnType>().is_err());
    }

    #[test]
    fn test_travel_direction_cardinals() {
        assert_eq!(travel_direction(90.0), "E");
        assert_eq!(travel_direction(180.0), "S");
        assert_eq!(travel_direction(270.0), "W");
        assert_eq!(travel_direction(360.0), "N");
        assert_eq!(travel_direction(99.226778), "S9°E");
    }

    #[test]
    fn test_csv_record_blanks_undefined() {
        let rows = richmond_hill_rows();
        let last = rows[2].csv_record();
        assert_eq!(last.len(), RoutePoint::CSV_HEADER.len());
        assert_eq!(last[0], "2");
        assert_eq!(last[4], "");
        assert_eq!(last[9], "");
        assert_eq!(rows[1].csv_record()[11], "Slight Right");
    }

    #[test]
    fn test_short_input() {
        let builder = RouteFeatureBuilder::default();
        assert!(builder.build_points(&[], &[]).is_empty());

        let single = builder.build_points(&[GpsPoint::new(43.0, -80.0)], &[Some(0)]);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].trip_distance_m, 0.0);
        assert_eq!(single[0].dist_to_next_m, None);
        assert_eq!(single[0].travel_direction, None);
    }
}
