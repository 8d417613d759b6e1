//! Open-Meteo weather and elevation sources.
//!
//! [`OpenMeteoClient`] implements [`WeatherSource`] and [`ElevationSource`]
//! over HTTP with:
//! - Dispatch rate limiting (spaces out request starts)
//! - Automatic retry with exponential backoff on 429 and transport errors
//! - Concurrent elevation batches with order preserved
//!
//! The trait methods are synchronous and block on a runtime owned by the
//! client, so they must not be called from inside another tokio runtime. Use
//! the `async` methods there instead.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::Mutex;

use crate::sources::{ElevationSource, WeatherReading, WeatherSource};
use crate::{GpsPoint, SourceError};

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/v1";

/// Current-conditions fields requested by default.
pub const DEFAULT_WEATHER_FIELDS: [&str; 8] = [
    "temperature_2m",
    "relative_humidity_2m",
    "precipitation",
    "cloud_cover",
    "surface_pressure",
    "wind_speed_10m",
    "wind_direction_10m",
    "shortwave_radiation",
];

// Free tier allows 600 calls/min; stay at 10/s
const DISPATCH_INTERVAL_MS: u64 = 100;
const MAX_CONCURRENCY: usize = 4;
const MAX_RETRIES: u32 = 3;
/// Coordinates per elevation request (API limit).
pub const ELEVATION_BATCH: usize = 100;

/// Dispatch rate limiter: spaces out when requests START, so bursts of
/// concurrent calls are released one slot at a time.
struct DispatchRateLimiter {
    next_dispatch: Mutex<Instant>,
    dispatched_count: AtomicU32,
    consecutive_429s: AtomicU32,
}

impl DispatchRateLimiter {
    fn new() -> Self {
        Self {
            next_dispatch: Mutex::new(Instant::now()),
            dispatched_count: AtomicU32::new(0),
            consecutive_429s: AtomicU32::new(0),
        }
    }

    /// Wait for our dispatch slot. Each caller gets a unique slot
    /// spaced DISPATCH_INTERVAL_MS apart.
    async fn wait_for_dispatch_slot(&self) -> u32 {
        let (wait_duration, dispatch_num) = {
            let mut next = self.next_dispatch.lock().await;
            let now = Instant::now();

            let dispatch_at = if *next > now { *next } else { now };
            *next = dispatch_at + Duration::from_millis(DISPATCH_INTERVAL_MS);

            let num = self.dispatched_count.fetch_add(1, Ordering::Relaxed) + 1;
            (dispatch_at.saturating_duration_since(now), num)
        };

        // Wait outside the lock
        if wait_duration > Duration::from_millis(5) {
            debug!("[Dispatch #{}] Waiting {:?} for slot", dispatch_num, wait_duration);
            tokio::time::sleep(wait_duration).await;
        }

        dispatch_num
    }

    fn record_success(&self) {
        self.consecutive_429s.store(0, Ordering::Relaxed);
    }

    fn record_429(&self) -> Duration {
        let count = self.consecutive_429s.fetch_add(1, Ordering::Relaxed) + 1;
        // Exponential backoff: 1s, 2s, 4s, 8s max
        let backoff = Duration::from_millis(500 * (1 << count.min(4)));
        warn!("[DispatchRateLimiter] Got 429! Consecutive: {}, backing off {:?}", count, backoff);
        backoff
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    elevation: Vec<f64>,
}

/// Parse a `/forecast?current=...` body. Numeric fields become weather
/// values; `time` becomes the forecast time.
fn parse_weather(body: &[u8]) -> Result<WeatherReading, SourceError> {
    let data: ForecastResponse =
        serde_json::from_slice(body).map_err(|e| SourceError::Parse(format!("forecast response: {}", e)))?;

    let mut reading = WeatherReading::default();
    for (name, value) in data.current {
        if name == "time" {
            reading.forecast_time = value.as_str().map(str::to_string);
        } else if name != "interval" {
            // `interval` is the update cadence in seconds, not a measurement
            if let Some(v) = value.as_f64() {
                reading.fields.insert(name, v);
            }
        }
    }
    Ok(reading)
}

fn parse_elevations(body: &[u8], expected: usize) -> Result<Vec<f64>, SourceError> {
    let data: ElevationResponse =
        serde_json::from_slice(body).map_err(|e| SourceError::Parse(format!("elevation response: {}", e)))?;
    if data.elevation.len() != expected {
        return Err(SourceError::Parse(format!(
            "requested {} elevations, got {}",
            expected,
            data.elevation.len()
        )));
    }
    Ok(data.elevation)
}

fn join_coordinates(points: &[GpsPoint], f: impl Fn(&GpsPoint) -> f64) -> String {
    points.iter().map(|p| f(p).to_string()).collect::<Vec<_>>().join(",")
}

/// Weather and elevation client for the Open-Meteo API.
pub struct OpenMeteoClient {
    client: Client,
    runtime: Runtime,
    rate_limiter: Arc<DispatchRateLimiter>,
    base_url: String,
    weather_fields: Vec<String>,
}

impl OpenMeteoClient {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Client against a different deployment (self-hosted or mirror).
    pub fn with_base_url(base_url: &str) -> Result<Self, SourceError> {
        let client = Client::builder()
            .pool_max_idle_per_host(MAX_CONCURRENCY * 2)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(30))
            .build()?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| SourceError::Unavailable(format!("failed to create tokio runtime: {}", e)))?;

        Ok(Self {
            client,
            runtime,
            rate_limiter: Arc::new(DispatchRateLimiter::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            weather_fields: DEFAULT_WEATHER_FIELDS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the requested current-conditions fields.
    pub fn with_weather_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.weather_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Current conditions at a point.
    pub async fn weather_at(&self, point: GpsPoint) -> Result<WeatherReading, SourceError> {
        let url = format!("{}/forecast", self.base_url);
        let query = [
            ("latitude", point.latitude.to_string()),
            ("longitude", point.longitude.to_string()),
            ("current", self.weather_fields.join(",")),
            ("timezone", "UTC".to_string()),
        ];
        let body = self.get(&url, &query).await?;
        parse_weather(&body)
    }

    /// Elevations for any number of points, [`ELEVATION_BATCH`] per request.
    pub async fn elevations(&self, points: &[GpsPoint]) -> Result<Vec<f64>, SourceError> {
        use futures::stream::{self, StreamExt, TryStreamExt};

        let start = Instant::now();
        let batches: Vec<Vec<f64>> = stream::iter(points.chunks(ELEVATION_BATCH))
            .map(|chunk| self.elevation_batch(chunk))
            .buffered(MAX_CONCURRENCY)
            .try_collect()
            .await?;

        info!(
            "[OpenMeteo] fetched {} elevations in {} requests ({:.2}s)",
            points.len(),
            batches.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(batches.into_iter().flatten().collect())
    }

    async fn elevation_batch(&self, chunk: &[GpsPoint]) -> Result<Vec<f64>, SourceError> {
        let url = format!("{}/elevation", self.base_url);
        let query = [
            ("latitude", join_coordinates(chunk, |p| p.latitude)),
            ("longitude", join_coordinates(chunk, |p| p.longitude)),
        ];
        let body = self.get(&url, &query).await?;
        parse_elevations(&body, chunk.len())
    }

    /// GET with dispatch spacing and retries, returning the raw body.
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>, SourceError> {
        let mut retries = 0;

        loop {
            let dispatch_num = self.rate_limiter.wait_for_dispatch_slot().await;
            let req_start = Instant::now();

            match self.client.get(url).query(query).send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > MAX_RETRIES {
                            return Err(SourceError::Unavailable(format!(
                                "{}: max retries exceeded (429)",
                                url
                            )));
                        }
                        let wait = self.rate_limiter.record_429();
                        warn!("[Fetch #{}] 429 from {}, retry {} with {:?} backoff", dispatch_num, url, retries, wait);
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    self.rate_limiter.record_success();

                    if !status.is_success() {
                        return Err(SourceError::Unavailable(format!("HTTP {} from {}", status, url)));
                    }

                    let body = resp.bytes().await?;
                    debug!(
                        "[Fetch #{}] {} -> {:.1}KB in {:?}",
                        dispatch_num,
                        url,
                        body.len() as f64 / 1024.0,
                        req_start.elapsed()
                    );
                    return Ok(body.to_vec());
                }
                Err(e) => {
                    retries += 1;
                    if retries > MAX_RETRIES {
                        return Err(e.into());
                    }
                    let wait = Duration::from_millis(200 * (1 << retries));
                    warn!("[Fetch #{}] Error: {}, retry {} after {:?}", dispatch_num, e, retries, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

impl WeatherSource for OpenMeteoClient {
    fn fetch_weather(&self, point: GpsPoint) -> Result<WeatherReading, SourceError> {
        self.runtime.block_on(self.weather_at(point))
    }
}

impl ElevationSource for OpenMeteoClient {
    fn fetch_elevations(&self, points: &[GpsPoint]) -> Result<Vec<f64>, SourceError> {
        self.runtime.block_on(self.elevations(points))
    }
}
