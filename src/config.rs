//! # Configuration Management
//!
//! Two layers of configuration live here:
//!
//! - [`Config`]: the tide-config.toml file with station, upstream, default
//!   filter and refresh settings. Missing or invalid files fall back to defaults.
//! - [`FilterConfig`]: the validated filter a forecast cycle runs with, built
//!   from a [`FilterIntake`] (the optional `days`, `depth`, `startHour`,
//!   `endHour` and `unit` parameters a user supplies as a query string).

use crate::{TideError, Unit};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Longest forecast horizon the intake accepts
pub const MAX_DAYS: i64 = 365;
/// Hours are on a 24-hour clock; 24 means "end of day"
pub const MAX_HOUR: u32 = 24;
/// Upper bound for the live window and timer periods
const MAX_LIVE_WINDOW_MINUTES: i64 = 24 * 60;
const MAX_REFRESH_SECS: u64 = 3600;

/// Application configuration loaded from tide-config.toml
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub station: StationConfig,
    pub upstream: UpstreamConfig,
    /// Filter values used when the user does not supply one
    pub forecast: ForecastDefaults,
    pub refresh: RefreshConfig,
}

/// Tide station configuration
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StationConfig {
    /// Station code (e.g. "07735") or the service's internal station id
    pub id: String,
    /// Human-readable station name for reference
    pub name: String,
    /// Zone the station's local times are read in, shown next to the name
    pub timezone_label: String,
}

/// Hydrographic service configuration
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Time-series code for high/low predictions
    pub prediction_series: String,
    /// Time-series code for raw observations
    pub observation_series: String,
    /// Widest range the service answers in one request
    pub chunk_days: i64,
    /// How far before "now" the forecast range starts
    pub lookback_hours: i64,
    /// Half-width of the window fetched around "now" for live conditions
    pub live_window_minutes: i64,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ForecastDefaults {
    pub days: i64,
    pub depth: f64,
    pub start_hour: u32,
    pub end_hour: u32,
    pub unit: Unit,
}

/// Timer periods for the interactive display
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub live_secs: u64,
    pub clock_secs: u64,
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            id: "07735".to_string(),
            name: "Vancouver, BC".to_string(),
            timezone_label: "America/Vancouver".to_string(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            base_url: "https://api-iwls.dfo-mpo.gc.ca/api/v1".to_string(),
            prediction_series: "wlp-hilo".to_string(),
            observation_series: "wlo".to_string(),
            chunk_days: 7,
            lookback_hours: 1,
            live_window_minutes: 16,
            timeout_secs: 30,
        }
    }
}

impl Default for ForecastDefaults {
    fn default() -> Self {
        ForecastDefaults {
            days: 30,
            depth: 1.5,
            start_hour: 9,
            end_hour: 16,
            unit: Unit::Meters,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            live_secs: 5,
            clock_secs: 1,
        }
    }
}

// File values are clamped before they become durations; chrono panics on
// out-of-range constructors.
impl UpstreamConfig {
    pub fn chunk_span(&self) -> Duration {
        Duration::days(self.chunk_days.clamp(1, MAX_DAYS))
    }

    pub fn lookback(&self) -> Duration {
        Duration::hours(self.lookback_hours.clamp(0, 24 * MAX_DAYS))
    }

    pub fn live_window(&self) -> Duration {
        Duration::minutes(self.live_window_minutes.clamp(1, MAX_LIVE_WINDOW_MINUTES))
    }
}

impl RefreshConfig {
    pub fn live_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.live_secs.clamp(1, MAX_REFRESH_SECS))
    }

    pub fn clock_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.clock_secs.clamp(1, MAX_REFRESH_SECS))
    }
}

impl ForecastDefaults {
    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            window_days: self.days,
            depth_ceiling: self.depth,
            hour_start: self.start_hour,
            hour_end: self.end_hour,
            unit: self.unit,
        }
    }
}

impl Config {
    /// Load configuration from tide-config.toml file
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path("tide-config.toml")
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!("Loaded configuration for station: {}", config.station.name);
                    config
                }
                Err(e) => {
                    warn!("Invalid config file format: {}", e);
                    warn!("Using default configuration ({})", StationConfig::default().name);
                    Self::default()
                }
            },
            Err(_) => {
                info!(
                    "No config file at {}, using default configuration ({})",
                    path.as_ref().display(),
                    StationConfig::default().name
                );
                Self::default()
            }
        }
    }

    /// Save current configuration to the given path
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }
}

/// The filter a forecast cycle runs with. Replaced whole, never edited in place.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Forecast horizon in days from now
    pub window_days: i64,
    /// Deepest low tide worth reporting, in `unit`
    pub depth_ceiling: f64,
    /// First admitted local hour (inclusive)
    pub hour_start: u32,
    /// First rejected local hour (exclusive)
    pub hour_end: u32,
    pub unit: Unit,
}

impl Default for FilterConfig {
    fn default() -> Self {
        ForecastDefaults::default().filter_config()
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), TideError> {
        if !(0..=MAX_DAYS).contains(&self.window_days) {
            return Err(TideError::Configuration(format!(
                "window days must be within 0..={MAX_DAYS}, got {}",
                self.window_days
            )));
        }
        if self.hour_start > MAX_HOUR || self.hour_end > MAX_HOUR {
            return Err(TideError::Configuration(format!(
                "hours must be within 0..={MAX_HOUR}, got {}..{}",
                self.hour_start, self.hour_end
            )));
        }
        if self.hour_start > self.hour_end {
            return Err(TideError::Configuration(format!(
                "start hour {} is after end hour {}",
                self.hour_start, self.hour_end
            )));
        }
        if !self.depth_ceiling.is_finite() {
            return Err(TideError::Configuration(
                "depth ceiling must be a finite number".to_string(),
            ));
        }
        Ok(())
    }

    /// The same filter expressed in `unit`; the depth ceiling is converted once.
    pub fn with_unit(self, unit: Unit) -> Self {
        FilterConfig {
            depth_ceiling: self.depth_ceiling * self.unit.scale_to(unit),
            unit,
            ..self
        }
    }
}

/// User-supplied filter parameters, each optional.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterIntake {
    pub days: Option<i64>,
    pub depth: Option<f64>,
    pub start_hour: Option<u32>,
    pub end_hour: Option<u32>,
    pub unit: Option<Unit>,
}

impl FilterIntake {
    /// Parse `days=30&depth=1.2&startHour=9&endHour=16&unit=feet`.
    ///
    /// A leading `?` is ignored, as are unknown keys and empty values.
    pub fn parse_query(query: &str) -> Result<Self, TideError> {
        let mut intake = FilterIntake::default();

        for pair in query.trim().trim_start_matches('?').split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "days" => intake.days = Some(parse_field(key, value)?),
                "depth" => intake.depth = Some(parse_field(key, value)?),
                "startHour" => intake.start_hour = Some(parse_field(key, value)?),
                "endHour" => intake.end_hour = Some(parse_field(key, value)?),
                "unit" | "units" => {
                    intake.unit = Some(value.parse().map_err(TideError::Configuration)?)
                }
                other => warn!("Ignoring unknown parameter '{}'", other),
            }
        }

        Ok(intake)
    }

    pub fn is_empty(&self) -> bool {
        *self == FilterIntake::default()
    }

    /// Overlay the supplied fields on `base`, clamping them to accepted ranges.
    ///
    /// A depth given together with a unit is read in that unit; a depth alone is
    /// read in `base`'s unit. Switching unit without a depth converts `base`'s
    /// ceiling.
    pub fn apply_to(&self, base: &FilterConfig) -> Result<FilterConfig, TideError> {
        let unit = self.unit.unwrap_or(base.unit);
        let mut config = base.with_unit(unit);

        if let Some(days) = self.days {
            config.window_days = days.clamp(0, MAX_DAYS);
        }
        if let Some(depth) = self.depth {
            if !depth.is_finite() {
                return Err(TideError::Configuration(format!(
                    "depth must be a number, got {depth}"
                )));
            }
            config.depth_ceiling = depth.max(0.0);
        }
        if let Some(hour) = self.start_hour {
            config.hour_start = hour.min(MAX_HOUR);
        }
        if let Some(hour) = self.end_hour {
            config.hour_end = hour.min(MAX_HOUR);
        }

        config.validate()?;
        Ok(config)
    }

    /// Resolve against the configured defaults.
    pub fn resolve(&self, defaults: &ForecastDefaults) -> Result<FilterConfig, TideError> {
        self.apply_to(&defaults.filter_config())
    }
}

fn parse_field<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, TideError> {
    value
        .parse()
        .map_err(|_| TideError::Configuration(format!("invalid value '{value}' for {key}")))
}
