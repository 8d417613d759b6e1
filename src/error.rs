//! Error types for route construction, queries and collaborator sources.

use thiserror::Error;

/// Failure reported by an external collaborator (location, weather or
/// elevation source).
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source could not produce a value right now (device offline,
    /// file missing, service down). Callers may retry.
    #[error("source unavailable: {0}")]
    Unavailable(String),
    /// The source answered but the payload could not be interpreted.
    #[error("failed to parse source data: {0}")]
    Parse(String),
    #[cfg(feature = "http")]
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors raised by the route pipeline.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Invalid interval bound, frequency, speed or coordinate input.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// A route needs at least three waypoints.
    #[error("a route needs at least {required} waypoints, got {found}")]
    InsufficientWaypoints { found: usize, required: usize },
    /// Route-book rows could not be uniquely aligned with route-model indices.
    #[error("unable to map routebook onto route: {0}")]
    RouteMapping(String),
    /// The live-location collaborator failed; previous ETA state is retained.
    #[error("live location unavailable: {0}")]
    LocationUnavailable(#[source] SourceError),
    /// A weather or elevation collaborator failed.
    #[error("data source failed: {0}")]
    Source(#[from] SourceError),
    #[error("checkpoint {index} out of range (have {len})")]
    CheckpointOutOfRange { index: usize, len: usize },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RouteError>;
