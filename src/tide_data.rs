//! # Hydrographic Data Fetching
//!
//! This module handles every network operation: requesting tide predictions and
//! raw water-level observations from the hydrographic service, splitting long
//! ranges into requests the service will accept, and parsing its JSON payload.
//!
//! ## Data Source
//!
//! ### Integrated Water Level System (IWLS) style REST API
//! - **Endpoint**: `{base_url}/stations/{station}/data?time-series-code=..&from=..&to=..`
//! - **Series**: `wlp-hilo` (high/low predictions) and `wlo` (raw observations)
//! - **Format**: JSON array of `{ "eventDate": "2024-06-16T12:00:00Z", "value": 0.8 }`
//! - **Limit**: one request may not span more than 7 days
//!
//! ### Windowed Fetching
//! 1. **Plan**: split `[start, end]` into consecutive chunks of at most `span`
//! 2. **Fetch**: issue one request per chunk, strictly one after another
//! 3. **Concatenate**: append each chunk's points in request order
//! 4. **Abort**: the first failing chunk fails the whole fetch, partial data is dropped
//!
//! ## Cancellation
//! Every fetch carries a [`CycleToken`]. When a newer cycle begins, the older
//! fetch stops before its next chunk and returns [`TideError::Superseded`].

use crate::config::Config;
use crate::{RawObservation, TideError};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Deserialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which upstream time series to query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeriesKind {
    /// High/low prediction points (turning points only)
    Predictions,
    /// Raw water-level observations at the gauge
    Observations,
}

/// Anything that can answer a single bounded time-series request.
///
/// Callers are responsible for keeping `[from, to]` within the upstream's
/// maximum window; see [`fetch_windowed`].
pub trait TideSource {
    fn fetch_series(
        &self,
        kind: SeriesKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<RawObservation>, TideError>> + Send;
}

/// Monotonic counter of fetch cycles shared by everything that can supersede a fetch.
#[derive(Clone, Debug, Default)]
pub struct Generation(Arc<AtomicU64>);

/// Identity of one fetch cycle; stale once a newer cycle begins.
#[derive(Clone, Debug)]
pub struct CycleToken {
    id: u64,
    latest: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new cycle, making every previously issued token stale.
    pub fn begin(&self) -> CycleToken {
        let id = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        CycleToken {
            id,
            latest: Arc::clone(&self.0),
        }
    }
}

impl CycleToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.id
    }
}

/// One request-sized piece of a longer range.
///
/// Chunks are half-open `[from, to)` except the last, which also owns `to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub last: bool,
}

impl Chunk {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.from && (t < self.to || (self.last && t == self.to))
    }
}

/// Split `[start, end]` into consecutive chunks no longer than `span`.
///
/// An empty range still yields one chunk so that a zero-day forecast covers
/// its lookback.
pub fn plan_chunks(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    span: Duration,
) -> Result<Vec<Chunk>, TideError> {
    if span <= Duration::zero() {
        return Err(TideError::Configuration(format!(
            "chunk span must be positive, got {span}"
        )));
    }
    if end < start {
        return Err(TideError::Configuration(format!(
            "range end {end} precedes start {start}"
        )));
    }

    let mut chunks = Vec::new();
    let mut from = start;
    loop {
        let to = (from + span).min(end);
        let last = to >= end;
        chunks.push(Chunk { from, to, last });
        if last {
            return Ok(chunks);
        }
        from = to;
    }
}

/// Fetch `[start, end]` in sequential chunks and concatenate the results.
///
/// All-or-nothing: any chunk failure returns that error and no data. Points a
/// chunk returns outside its own sub-range are dropped, so a boundary point
/// reported by two neighbouring requests appears once.
pub async fn fetch_windowed<S: TideSource>(
    source: &S,
    kind: SeriesKind,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    span: Duration,
    token: &CycleToken,
) -> Result<Vec<RawObservation>, TideError> {
    let chunks = plan_chunks(start, end, span)?;
    let mut points = Vec::new();

    for (index, chunk) in chunks.iter().enumerate() {
        if !token.is_current() {
            debug!(cycle = token.id(), "fetch superseded before chunk {}", index + 1);
            return Err(TideError::Superseded);
        }

        debug!(
            ?kind,
            from = %chunk.from,
            to = %chunk.to,
            "requesting chunk {}/{}",
            index + 1,
            chunks.len()
        );

        let batch = source
            .fetch_series(kind, chunk.from, chunk.to)
            .await
            .map_err(|err| {
                warn!(?kind, "chunk {}/{} failed: {}", index + 1, chunks.len(), err);
                err
            })?;

        points.extend(batch.into_iter().filter(|p| chunk.contains(p.timestamp)));
    }

    Ok(points)
}

// -- Upstream client --

/// HTTP client for the hydrographic service.
#[derive(Clone, Debug)]
pub struct IwlsClient {
    http: reqwest::Client,
    base_url: String,
    station_id: String,
    prediction_code: String,
    observation_code: String,
}

#[derive(Debug, Deserialize)]
struct UpstreamRecord {
    #[serde(rename = "eventDate", alias = "eventInstant")]
    event_date: DateTime<Utc>,
    value: LevelValue,
}

/// Levels arrive as JSON numbers from some endpoints and decimal strings from others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LevelValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct StationRecord {
    id: String,
    code: Option<String>,
    #[serde(rename = "officialName")]
    official_name: Option<String>,
}

impl IwlsClient {
    /// Build a client and resolve the configured station.
    ///
    /// A purely numeric station id (e.g. `07735`) is a public station code and
    /// is looked up once to find the service's internal id.
    pub async fn connect(config: &Config) -> Result<Self, TideError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.upstream.timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut client = IwlsClient {
            http,
            base_url: config.upstream.base_url.trim_end_matches('/').to_string(),
            station_id: config.station.id.clone(),
            prediction_code: config.upstream.prediction_series.clone(),
            observation_code: config.upstream.observation_series.clone(),
        };

        if is_station_code(&client.station_id) {
            client.station_id = client.resolve_station_code(&config.station.id).await?;
        }

        Ok(client)
    }

    async fn resolve_station_code(&self, code: &str) -> Result<String, TideError> {
        let url = format!("{}/stations", self.base_url);
        let stations: Vec<StationRecord> = self
            .http
            .get(&url)
            .query(&[("code", code)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let station = stations
            .into_iter()
            .find(|s| s.code.as_deref().map_or(true, |c| c == code))
            .ok_or_else(|| TideError::Upstream(format!("no station with code {code}")))?;

        info!(
            "Resolved station {} ({}) to {}",
            code,
            station.official_name.as_deref().unwrap_or("unnamed"),
            station.id
        );
        Ok(station.id)
    }

    fn series_code(&self, kind: SeriesKind) -> &str {
        match kind {
            SeriesKind::Predictions => &self.prediction_code,
            SeriesKind::Observations => &self.observation_code,
        }
    }
}

impl TideSource for IwlsClient {
    fn fetch_series(
        &self,
        kind: SeriesKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<RawObservation>, TideError>> + Send {
        let url = format!("{}/stations/{}/data", self.base_url, self.station_id);
        let code = self.series_code(kind).to_string();
        let from = from.to_rfc3339_opts(SecondsFormat::Secs, true);
        let to = to.to_rfc3339_opts(SecondsFormat::Secs, true);

        async move {
            let body = self
                .http
                .get(&url)
                .query(&[
                    ("time-series-code", code.as_str()),
                    ("from", from.as_str()),
                    ("to", to.as_str()),
                ])
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;

            parse_payload(&body)
        }
    }
}

fn is_station_code(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())
}

/// Parse an upstream time-series payload into chronologically sorted observations.
pub fn parse_payload(body: &[u8]) -> Result<Vec<RawObservation>, TideError> {
    let records: Vec<UpstreamRecord> = serde_json::from_slice(body)
        .map_err(|e| TideError::Upstream(format!("malformed time series: {e}")))?;

    let mut points = records
        .into_iter()
        .map(|record| {
            let level_meters = match record.value {
                LevelValue::Number(v) => v,
                LevelValue::Text(s) => s.trim().parse().map_err(|_| {
                    TideError::Upstream(format!(
                        "non-numeric level '{}' at {}",
                        s, record.event_date
                    ))
                })?,
            };
            Ok(RawObservation {
                timestamp: record.event_date,
                level_meters,
            })
        })
        .collect::<Result<Vec<_>, TideError>>()?;

    points.sort_by_key(|p| p.timestamp);
    Ok(points)
}
