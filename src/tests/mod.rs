//! Shared fixtures and cross-module test suites.
//!
//! [`ScriptedSource`] stands in for the hydrographic service: it answers from
//! fixed series, records every request, and can be told to fail, to run a
//! hook on a given call, or to answer slowly.


use crate::tide_data::{SeriesKind, TideSource};
use crate::{RawObservation, TideError};
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Mutex;
use tokio::time::sleep;

type Hook = Box<dyn Fn(usize) + Send + Sync>;

pub(crate) struct ScriptedSource {
    predictions: Vec<RawObservation>,
    observations: Vec<RawObservation>,
    fail_on_call: Option<usize>,
    hook: Option<Hook>,
    delays: Vec<std::time::Duration>,
    calls: Mutex<Vec<(SeriesKind, DateTime<Utc>, DateTime<Utc>)>>,
}

impl ScriptedSource {
    pub(crate) fn new(predictions: Vec<RawObservation>, observations: Vec<RawObservation>) -> Self {
        ScriptedSource {
            predictions,
            observations,
            fail_on_call: None,
            hook: None,
            delays: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail the `n`th request (1-based) with an upstream error.
    pub(crate) fn failing_on_call(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    /// Run `hook` with the 1-based call number before answering each request.
    pub(crate) fn with_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Delay the `n`th answer by `delays[n - 1]`; later calls answer at once.
    pub(crate) fn with_delays(mut self, delays: Vec<std::time::Duration>) -> Self {
        self.delays = delays;
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls(&self) -> Vec<(SeriesKind, DateTime<Utc>, DateTime<Utc>)> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(
        &self,
        kind: SeriesKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> (Option<std::time::Duration>, Result<Vec<RawObservation>, TideError>) {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((kind, from, to));
            calls.len()
        };
        if let Some(hook) = &self.hook {
            hook(call);
        }
        let delay = self.delays.get(call - 1).copied();
        if self.fail_on_call == Some(call) {
            let err = TideError::Upstream(format!("scripted failure on call {call}"));
            return (delay, Err(err));
        }

        let series = match kind {
            SeriesKind::Predictions => &self.predictions,
            SeriesKind::Observations => &self.observations,
        };
        let points = series
            .iter()
            .filter(|o| o.timestamp >= from && o.timestamp <= to)
            .copied()
            .collect();
        (delay, Ok(points))
    }
}

impl TideSource for ScriptedSource {
    fn fetch_series(
        &self,
        kind: SeriesKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<RawObservation>, TideError>> + Send {
        let (delay, result) = self.answer(kind, from, to);
        async move {
            if let Some(delay) = delay {
                sleep(delay).await;
            }
            result
        }
    }
}

/// `count` points one hour apart starting at `start`, alternating 0.5 m and 3.0 m.
pub(crate) fn hourly_series(start: DateTime<Utc>, count: usize) -> Vec<RawObservation> {
    (0..count)
        .map(|i| RawObservation {
            timestamp: start + Duration::hours(i as i64),
            level_meters: if i % 2 == 0 { 0.5 } else { 3.0 },
        })
        .collect()
}
