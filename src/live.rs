//! # Live Conditions
//!
//! Estimates the water level at the current instant from raw gauge
//! observations, and keeps the latest estimate available to the display.
//!
//! ## Interpolation Algorithm
//! With `(t1, l1)` the earlier and `(t2, l2)` the later observation:
//! ```text
//! rate  = (l2 - l1) / (t2 - t1)
//! depth = l1 + rate * (now - t1)
//! ```
//! Gauge data always lags real time, so when nothing has been observed after
//! `now` the two most recent points are extended forward along the same line.
//!
//! ## Staleness
//! A failed refresh records its error but keeps the previous estimate, so the
//! readout goes stale rather than blank.

use crate::tide_data::{CycleToken, Generation, SeriesKind, TideSource};
use crate::{Direction, LiveConditions, RawObservation, TideError, Unit};
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Pick the two observations that bracket `now`.
///
/// Observations must be chronological. Falls back to the first or last two
/// when `now` lies outside the observed span.
pub fn bracket(
    observations: &[RawObservation],
    now: DateTime<Utc>,
) -> Result<(RawObservation, RawObservation), TideError> {
    let n = observations.len();
    if n < 2 {
        return Err(TideError::InsufficientData { needed: 2, got: n });
    }

    let pair = match observations.iter().position(|o| o.timestamp > now) {
        Some(0) => (observations[0], observations[1]),
        Some(i) => (observations[i - 1], observations[i]),
        None => (observations[n - 2], observations[n - 1]),
    };
    Ok(pair)
}

/// Linearly interpolate depth and rate of change at `now`.
pub fn interpolate(
    earlier: RawObservation,
    later: RawObservation,
    now: DateTime<Utc>,
    unit: Unit,
) -> Result<LiveConditions, TideError> {
    let span_ms = (later.timestamp - earlier.timestamp).num_milliseconds();
    if span_ms <= 0 {
        // Two readings at one instant give no slope
        return Err(TideError::InsufficientData { needed: 2, got: 1 });
    }
    let span_ms = span_ms as f64;
    let delta = later.level_meters - earlier.level_meters;

    let rate_per_ms = delta / span_ms;
    let elapsed_ms = (now - earlier.timestamp).num_milliseconds() as f64;
    let depth_meters = earlier.level_meters + rate_per_ms * elapsed_ms;
    let rate_per_minute_meters = delta.abs() * 60_000.0 / span_ms;

    Ok(LiveConditions {
        depth: unit.express_meters(depth_meters),
        rate_per_minute: unit.express_meters(rate_per_minute_meters),
        direction: if delta < 0.0 {
            Direction::Falling
        } else {
            Direction::Rising
        },
        as_of: now,
        unit,
    })
}

/// Estimate conditions at `now` from a narrow window of observations.
pub fn estimate(
    observations: &[RawObservation],
    now: DateTime<Utc>,
    unit: Unit,
) -> Result<LiveConditions, TideError> {
    let (earlier, later) = bracket(observations, now)?;
    interpolate(earlier, later, now, unit)
}

impl LiveConditions {
    /// The same reading expressed in `unit`.
    pub fn in_unit(self, unit: Unit) -> Self {
        let factor = self.unit.scale_to(unit);
        LiveConditions {
            depth: self.depth * factor,
            rate_per_minute: self.rate_per_minute * factor,
            unit,
            ..self
        }
    }
}

/// What the live readout shows. Replaced whole on every publication.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveSnapshot {
    pub unit: Unit,
    /// Last good estimate, kept across failures
    pub conditions: Option<LiveConditions>,
    /// Error from the most recent refresh, cleared by the next success
    pub error: Option<String>,
}

/// Refreshes live conditions and publishes [`LiveSnapshot`]s.
///
/// Refreshes may overlap when upstream answers slower than the refresh period.
/// Each one publishes unless a refresh that started later has already been
/// applied, so a slow upstream delays the readout but never blanks it.
pub struct LiveMonitor<S> {
    source: S,
    window: Duration,
    generation: Generation,
    /// Id of the newest refresh whose outcome reached the snapshot
    applied: AtomicU64,
    tx: watch::Sender<LiveSnapshot>,
}

impl<S: TideSource> LiveMonitor<S> {
    /// `window` is the half-width of the observation window around "now".
    pub fn new(source: S, window: Duration, unit: Unit) -> Self {
        let (tx, _) = watch::channel(LiveSnapshot {
            unit,
            conditions: None,
            error: None,
        });
        LiveMonitor {
            source,
            window,
            generation: Generation::new(),
            applied: AtomicU64::new(0),
            tx,
        }
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        self.tx.borrow().clone()
    }

    /// Fetch the observations around `now` and publish a new estimate.
    ///
    /// Returns [`TideError::Superseded`] without publishing when a refresh that
    /// started later has already published.
    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<LiveConditions, TideError> {
        let token = self.generation.begin();
        let unit = self.tx.borrow().unit;

        let outcome = self
            .source
            .fetch_series(SeriesKind::Observations, now - self.window, now + self.window)
            .await
            .and_then(|observations| estimate(&observations, now, unit));

        match outcome {
            Ok(conditions) => {
                let mut published = conditions;
                let applied = self.publish_if_newest(&token, |snap| {
                    published = conditions.in_unit(snap.unit);
                    snap.conditions = Some(published);
                    snap.error = None;
                });
                if !applied {
                    debug!(cycle = token.id(), "live refresh superseded");
                    return Err(TideError::Superseded);
                }
                Ok(published)
            }
            Err(err) => {
                warn!("Live conditions refresh failed: {}", err);
                let message = err.to_string();
                self.publish_if_newest(&token, |snap| snap.error = Some(message));
                Err(err)
            }
        }
    }

    /// Apply `update` unless a later refresh already has. The check and the
    /// update both run under the channel's write lock.
    fn publish_if_newest(
        &self,
        token: &CycleToken,
        update: impl FnOnce(&mut LiveSnapshot),
    ) -> bool {
        self.tx.send_if_modified(|snap| {
            if self.applied.load(Ordering::SeqCst) >= token.id() {
                return false;
            }
            self.applied.store(token.id(), Ordering::SeqCst);
            update(snap);
            true
        })
    }

    /// Rescale the held estimate to `unit` without refetching.
    pub fn switch_unit(&self, unit: Unit) {
        self.tx.send_if_modified(|snap| {
            if snap.unit == unit {
                return false;
            }
            snap.unit = unit;
            snap.conditions = snap.conditions.map(|c| c.in_unit(unit));
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ScriptedSource;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 16, 12, 0, 0).unwrap()
    }

    fn obs(minutes: i64, level_meters: f64) -> RawObservation {
        RawObservation {
            timestamp: t0() + Duration::minutes(minutes),
            level_meters,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_interpolation_midpoint() {
        let now = t0() + Duration::seconds(150);
        let c = estimate(&[obs(0, 1.0), obs(5, 1.5)], now, Unit::Meters).unwrap();
        assert!(close(c.depth, 1.25));
        assert!(close(c.rate_per_minute, 0.1));
        assert_eq!(c.direction, Direction::Rising);
        assert_eq!(c.as_of, now);
    }

    #[test]
    fn test_falling_rate_is_positive() {
        let c = estimate(&[obs(0, 2.0), obs(10, 1.0)], t0() + Duration::minutes(5), Unit::Meters)
            .unwrap();
        assert_eq!(c.direction, Direction::Falling);
        assert!(close(c.depth, 1.5));
        assert!(close(c.rate_per_minute, 0.1));
    }

    #[test]
    fn test_extrapolates_past_last_observation() {
        let observations = [obs(-15, 0.7), obs(-10, 0.8), obs(-5, 0.9)];
        let c = estimate(&observations, t0(), Unit::Meters).unwrap();
        assert!(close(c.depth, 1.0));
    }

    #[test]
    fn test_bracketing_pair_chosen_around_now() {
        let observations = [obs(-10, 1.0), obs(-2, 1.1), obs(3, 1.6), obs(8, 2.0)];
        let (a, b) = bracket(&observations, t0()).unwrap();
        assert_eq!(a, observations[1]);
        assert_eq!(b, observations[2]);
    }

    #[test]
    fn test_feet_conversion() {
        let c = estimate(&[obs(0, 1.0), obs(5, 1.5)], t0() + Duration::seconds(150), Unit::Feet)
            .unwrap();
        assert!(close(c.depth, 1.25 * crate::units::FEET_PER_METER));
        assert_eq!(c.unit, Unit::Feet);
    }

    #[test]
    fn test_needs_two_distinct_points() {
        assert!(matches!(
            estimate(&[obs(0, 1.0)], t0(), Unit::Meters),
            Err(TideError::InsufficientData { needed: 2, got: 1 })
        ));
        assert!(matches!(
            estimate(&[obs(0, 1.0), obs(0, 1.2)], t0(), Unit::Meters),
            Err(TideError::InsufficientData { .. })
        ));
    }

    #[tokio::test]
    async fn test_monitor_keeps_stale_value_on_failure() {
        let source = ScriptedSource::new(Vec::new(), vec![obs(-10, 1.0), obs(-5, 1.2)])
            .failing_on_call(2);
        let monitor = LiveMonitor::new(source, Duration::minutes(16), Unit::Meters);

        let first = monitor.refresh(t0()).await.unwrap();
        assert!(close(first.depth, 1.4));

        let err = monitor.refresh(t0() + Duration::seconds(5)).await.unwrap_err();
        assert!(err.is_upstream());

        let snap = monitor.snapshot();
        assert_eq!(snap.conditions, Some(first));
        assert!(snap.error.is_some());
    }

    #[tokio::test]
    async fn test_monitor_reports_gap_as_insufficient_data() {
        let source = ScriptedSource::new(Vec::new(), vec![obs(-5, 1.0)]);
        let monitor = LiveMonitor::new(source, Duration::minutes(16), Unit::Meters);

        let err = monitor.refresh(t0()).await.unwrap_err();
        assert!(matches!(err, TideError::InsufficientData { got: 1, .. }));
        assert!(monitor.snapshot().conditions.is_none());
    }

    #[tokio::test]
    async fn test_monitor_unit_switch_rescales_once() {
        let source = ScriptedSource::new(Vec::new(), vec![obs(-10, 1.0), obs(-5, 1.2)]);
        let monitor = LiveMonitor::new(source, Duration::minutes(16), Unit::Meters);
        let first = monitor.refresh(t0()).await.unwrap();

        monitor.switch_unit(Unit::Feet);
        monitor.switch_unit(Unit::Feet);
        let in_feet = monitor.snapshot().conditions.unwrap();
        assert!(close(in_feet.depth, first.depth * crate::units::FEET_PER_METER));

        monitor.switch_unit(Unit::Meters);
        let back = monitor.snapshot().conditions.unwrap();
        assert!(close(back.depth, first.depth));
        assert!(close(back.rate_per_minute, first.rate_per_minute));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_publishes_when_upstream_is_slower_than_refresh_period() {
        // Every answer takes 6s while a refresh starts every 5s
        let source = ScriptedSource::new(Vec::new(), vec![obs(-10, 1.0), obs(-5, 1.2)])
            .with_delays(vec![tokio::time::Duration::from_secs(6); 3]);
        let monitor = LiveMonitor::new(source, Duration::minutes(16), Unit::Meters);

        let started_later = |secs: u64, now: DateTime<Utc>| {
            let monitor = &monitor;
            async move {
                tokio::time::sleep(tokio::time::Duration::from_secs(secs)).await;
                monitor.refresh(now).await
            }
        };
        let (a, b, c) = tokio::join!(
            started_later(0, t0()),
            started_later(5, t0() + Duration::seconds(5)),
            started_later(10, t0() + Duration::seconds(10)),
        );

        assert!(a.is_ok() && b.is_ok());
        let last = c.unwrap();
        assert_eq!(last.as_of, t0() + Duration::seconds(10));
        assert_eq!(monitor.snapshot().conditions, Some(last));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_refresh_does_not_overwrite_newer_one() {
        let source = ScriptedSource::new(Vec::new(), vec![obs(-10, 1.0), obs(-5, 1.2)])
            .with_delays(vec![
                tokio::time::Duration::from_secs(8),
                tokio::time::Duration::from_secs(1),
            ]);
        let monitor = LiveMonitor::new(source, Duration::minutes(16), Unit::Meters);

        let (older, newer) = tokio::join!(monitor.refresh(t0()), async {
            tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            monitor.refresh(t0() + Duration::minutes(5)).await
        });

        assert!(matches!(older, Err(TideError::Superseded)));
        let newer = newer.unwrap();
        assert!(close(newer.depth, 1.6));
        assert_eq!(monitor.snapshot().conditions, Some(newer));
        assert!(monitor.snapshot().error.is_none());
    }
}
