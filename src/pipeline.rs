//! # Forecast Pipeline
//!
//! Runs one forecast cycle per trigger (startup, or a submitted filter):
//! windowed fetch, classification, filtering. The result replaces the previous
//! [`ForecastSnapshot`] whole.
//!
//! A cycle moves `Idle -> Fetching -> Success | Failure -> Idle`. Only the most
//! recently started cycle may publish; an older one that finishes late is
//! dropped. Switching units rescales the held events and never refetches.

use crate::classify::classify;
use crate::config::{FilterConfig, UpstreamConfig};
use crate::filter;
use crate::tide_data::{fetch_windowed, CycleToken, Generation, SeriesKind, TideSource};
use crate::{ForecastEvent, TideError, Unit};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// How the forecast range is requested from upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchSettings {
    /// Widest single request the upstream accepts
    pub chunk_span: Duration,
    /// How far before "now" the range starts
    pub lookback: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            chunk_span: Duration::days(7),
            lookback: Duration::hours(1),
        }
    }
}

impl From<&UpstreamConfig> for FetchSettings {
    fn from(upstream: &UpstreamConfig) -> Self {
        FetchSettings {
            chunk_span: upstream.chunk_span(),
            lookback: upstream.lookback(),
        }
    }
}

/// `[now - lookback, now + window_days]`
pub fn forecast_range(
    now: DateTime<Utc>,
    window_days: i64,
    lookback: Duration,
) -> Result<(DateTime<Utc>, DateTime<Utc>), TideError> {
    let out_of_range =
        || TideError::Configuration(format!("forecast range of {window_days} days is out of range"));
    let start = now.checked_sub_signed(lookback).ok_or_else(out_of_range)?;
    let end = Duration::try_days(window_days)
        .and_then(|horizon| now.checked_add_signed(horizon))
        .ok_or_else(out_of_range)?;
    Ok((start, end))
}

/// What the presentation layer should show, derived from a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayState {
    Loading,
    Failed(String),
    NoResults,
    Results(usize),
}

impl DisplayState {
    /// Pure function of the three published facts; exactly one state applies.
    pub fn derive(fetching: bool, error: Option<&str>, result_count: usize) -> Self {
        match (fetching, error, result_count) {
            (true, _, _) => DisplayState::Loading,
            (false, Some(msg), _) => DisplayState::Failed(msg.to_string()),
            (false, None, 0) => DisplayState::NoResults,
            (false, None, n) => DisplayState::Results(n),
        }
    }
}

/// Published forecast state. Replaced whole on every publication.
#[derive(Clone, Debug, PartialEq)]
pub struct ForecastSnapshot {
    /// Filter the events were produced with, in the current display unit
    pub config: FilterConfig,
    pub fetching: bool,
    pub error: Option<String>,
    pub events: Vec<ForecastEvent>,
}

impl ForecastSnapshot {
    pub fn display_state(&self) -> DisplayState {
        DisplayState::derive(self.fetching, self.error.as_deref(), self.events.len())
    }
}

/// Fetches, classifies and filters predictions, publishing [`ForecastSnapshot`]s.
pub struct ForecastPipeline<S, Tz: TimeZone> {
    source: S,
    tz: Tz,
    settings: FetchSettings,
    generation: Generation,
    tx: watch::Sender<ForecastSnapshot>,
}

impl<S: TideSource, Tz: TimeZone> ForecastPipeline<S, Tz> {
    pub fn new(source: S, tz: Tz, settings: FetchSettings, config: FilterConfig) -> Self {
        let (tx, _) = watch::channel(ForecastSnapshot {
            config,
            fetching: false,
            error: None,
            events: Vec::new(),
        });
        ForecastPipeline {
            source,
            tz,
            settings,
            generation: Generation::new(),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ForecastSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ForecastSnapshot {
        self.tx.borrow().clone()
    }

    pub fn generation(&self) -> Generation {
        self.generation.clone()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Adopt a newly submitted filter and run a cycle with it.
    ///
    /// The filter is held even when the cycle fails, so the next refresh
    /// retries with what the user asked for.
    pub async fn submit(
        &self,
        config: FilterConfig,
        now: DateTime<Utc>,
    ) -> Result<usize, TideError> {
        let token = self.generation.begin();
        self.switch_unit(config.unit);
        self.tx.send_modify(|snap| snap.config = config);
        self.run(token, config, now).await
    }

    /// Run a cycle with the held filter.
    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<usize, TideError> {
        let token = self.generation.begin();
        let config = self.tx.borrow().config;
        self.run(token, config, now).await
    }

    /// Rescale held events and the depth ceiling to `unit` without refetching.
    pub fn switch_unit(&self, unit: Unit) {
        self.tx.send_if_modified(|snap| {
            if snap.config.unit == unit {
                return false;
            }
            let factor = snap.config.unit.scale_to(unit);
            snap.config = snap.config.with_unit(unit);
            for event in &mut snap.events {
                event.level *= factor;
            }
            true
        });
    }

    async fn run(
        &self,
        token: CycleToken,
        config: FilterConfig,
        now: DateTime<Utc>,
    ) -> Result<usize, TideError> {
        self.publish_if_current(&token, |snap| snap.fetching = true);

        match self.cycle(&token, &config, now).await {
            Ok(events) => {
                let count = events.len();
                let applied = self.publish_if_current(&token, |snap| {
                    // A unit switch may have landed while this cycle was fetching
                    let factor = config.unit.scale_to(snap.config.unit);
                    snap.events = events
                        .into_iter()
                        .map(|mut event| {
                            event.level *= factor;
                            event
                        })
                        .collect();
                    snap.fetching = false;
                    snap.error = None;
                });
                if !applied {
                    debug!(cycle = token.id(), "forecast result superseded");
                    return Err(TideError::Superseded);
                }
                info!(
                    "Forecast cycle {}: {} low tides within {} days",
                    token.id(),
                    count,
                    config.window_days
                );
                Ok(count)
            }
            Err(TideError::Superseded) => {
                debug!(cycle = token.id(), "forecast fetch superseded");
                Err(TideError::Superseded)
            }
            Err(err) => {
                warn!("Forecast cycle {} failed: {}", token.id(), err);
                let message = err.to_string();
                self.publish_if_current(&token, |snap| {
                    snap.events.clear();
                    snap.fetching = false;
                    snap.error = Some(message);
                });
                Err(err)
            }
        }
    }

    async fn cycle(
        &self,
        token: &CycleToken,
        config: &FilterConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<ForecastEvent>, TideError> {
        config.validate()?;
        let (start, end) = forecast_range(now, config.window_days, self.settings.lookback)?;

        let predictions = fetch_windowed(
            &self.source,
            SeriesKind::Predictions,
            start,
            end,
            self.settings.chunk_span,
            token,
        )
        .await?;

        // No turning points in range is an answer, not a shortage
        if predictions.is_empty() {
            return Ok(Vec::new());
        }

        let extrema = classify(&predictions)?;
        filter::apply(&extrema, config, &self.tz)
    }

    fn publish_if_current(
        &self,
        token: &CycleToken,
        update: impl FnOnce(&mut ForecastSnapshot),
    ) -> bool {
        self.tx.send_if_modified(|snap| {
            if !token.is_current() {
                return false;
            }
            update(snap);
            true
        })
    }
}
