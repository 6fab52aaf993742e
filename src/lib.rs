//! # Low Tide Finder Core Library
//!
//! This library turns tide predictions and live water-level observations from a
//! hydrographic data service into two small, immutable snapshots: a list of
//! upcoming low tides worth walking the shore for, and a "right now" readout of
//! depth and trend.
//!
//! ## Data Flow
//!
//! ### Forecast
//! 1. **Fetch**: high/low prediction points are requested in chunks no wider than
//!    the upstream's maximum window ([`tide_data::fetch_windowed`])
//! 2. **Classify**: each point is labelled high or low by comparing it with its
//!    neighbour ([`classify::classify`])
//! 3. **Filter**: lows inside the local-hour window and under the depth ceiling
//!    become [`ForecastEvent`]s ([`filter::apply`])
//! 4. **Publish**: the whole list replaces the previous one
//!    ([`pipeline::ForecastPipeline`])
//!
//! ### Live Conditions
//! A narrow window of raw observations around "now" is fetched and the depth at
//! the current instant is linearly interpolated ([`live::estimate`]).
//!
//! ## Units
//! Every level coming from upstream is in meters and every timestamp is UTC.
//! Levels are compared in meters; conversion to the user's [`Unit`] happens once,
//! when a display value is produced.

use chrono::{DateTime, FixedOffset, Utc, Weekday};
use serde::{Deserialize, Serialize};

pub mod classify;
pub mod config;
pub mod error;
pub mod filter;
pub mod live;
pub mod pipeline;
pub mod renderer;
pub mod tide_data;
pub mod units;

#[cfg(test)]
mod tests;

pub use error::TideError;
pub use units::Unit;

/// A single water level as received from upstream.
///
/// Always in meters and UTC; never modified after parsing.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use low_tide_lib::RawObservation;
///
/// let obs = RawObservation {
///     timestamp: Utc.with_ymd_and_hms(2024, 6, 16, 12, 0, 0).unwrap(),
///     level_meters: 0.8,
/// };
/// assert_eq!(obs.level_meters, 0.8);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub timestamp: DateTime<Utc>,
    pub level_meters: f64,
}

/// Whether a prediction point is a local maximum or minimum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TideKind {
    High,
    Low,
}

/// A prediction point labelled by [`classify::classify`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedExtremum {
    pub observation: RawObservation,
    pub kind: TideKind,
}

/// Highlight for events that fall on or next to a weekend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekendFlag {
    None,
    /// Saturday or Sunday
    Weekend,
    /// Friday or Monday
    LongWeekend,
}

impl WeekendFlag {
    pub fn for_weekday(day: Weekday) -> Self {
        match day {
            Weekday::Sat | Weekday::Sun => WeekendFlag::Weekend,
            Weekday::Fri | Weekday::Mon => WeekendFlag::LongWeekend,
            _ => WeekendFlag::None,
        }
    }
}

/// A low tide that passed the filter, ready for display.
///
/// `level` is in the unit of the snapshot that holds the event; the pipeline
/// rescales it in place of a refetch when the unit changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastEvent {
    /// Event time in the filter's local time zone
    pub local_time: DateTime<FixedOffset>,
    pub level: f64,
    pub kind: TideKind,
    pub weekday: Weekday,
    pub weekend: WeekendFlag,
}

/// Direction the water is moving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Rising,
    Falling,
}

/// Interpolated water level at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiveConditions {
    pub depth: f64,
    /// Absolute rate of change per minute, always non-negative
    pub rate_per_minute: f64,
    pub direction: Direction,
    pub as_of: DateTime<Utc>,
    pub unit: Unit,
}
