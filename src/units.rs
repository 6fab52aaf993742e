//! # Meters and Feet
//!
//! Upstream levels are always meters. These helpers convert at the display
//! boundary and back when a depth ceiling typed in feet has to be compared
//! against raw data.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Feet per meter
pub const FEET_PER_METER: f64 = 3.28084;

/// Display unit chosen by the user. Never affects upstream requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    Meters,
    Feet,
}

pub fn to_feet(meters: f64) -> f64 {
    meters * FEET_PER_METER
}

pub fn to_meters(feet: f64) -> f64 {
    feet / FEET_PER_METER
}

/// Express `value` (given in `unit`) in meters.
pub fn resolve_in_meters(value: f64, unit: Unit) -> f64 {
    match unit {
        Unit::Meters => value,
        Unit::Feet => to_meters(value),
    }
}

impl Unit {
    /// Convert a meter value into this unit.
    pub fn express_meters(self, meters: f64) -> f64 {
        match self {
            Unit::Meters => meters,
            Unit::Feet => to_feet(meters),
        }
    }

    /// Factor that turns a value held in `self` into `target`.
    pub fn scale_to(self, target: Unit) -> f64 {
        match (self, target) {
            (Unit::Meters, Unit::Feet) => FEET_PER_METER,
            (Unit::Feet, Unit::Meters) => 1.0 / FEET_PER_METER,
            _ => 1.0,
        }
    }

    pub fn other(self) -> Unit {
        match self {
            Unit::Meters => Unit::Feet,
            Unit::Feet => Unit::Meters,
        }
    }

    pub fn short_label(self) -> &'static str {
        match self {
            Unit::Meters => "m",
            Unit::Feet => "ft",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Meters => write!(f, "meters"),
            Unit::Feet => write!(f, "feet"),
        }
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "meter" | "meters" | "metres" => Ok(Unit::Meters),
            "ft" | "foot" | "feet" => Ok(Unit::Feet),
            other => Err(format!("unknown unit '{other}'")),
        }
    }
}
