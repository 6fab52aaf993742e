//! # Low Tide Filter
//!
//! Turns classified extrema into the events a user asked for:
//!
//! 1. Convert each UTC timestamp to the local time zone
//! 2. Keep local hours in `hour_start <= hour < hour_end`
//! 3. Keep lows only
//! 4. Keep levels at or below the depth ceiling (compared in meters)
//! 5. Convert the level to the display unit and tag weekends
//!
//! Input order is preserved, and an empty result is a normal answer.

use crate::config::FilterConfig;
use crate::units::resolve_in_meters;
use crate::{ClassifiedExtremum, ForecastEvent, TideError, TideKind, WeekendFlag};
use chrono::{Datelike, TimeZone, Timelike};

pub fn apply<Tz: TimeZone>(
    extrema: &[ClassifiedExtremum],
    config: &FilterConfig,
    tz: &Tz,
) -> Result<Vec<ForecastEvent>, TideError> {
    config.validate()?;
    let ceiling_meters = resolve_in_meters(config.depth_ceiling, config.unit);

    let events = extrema
        .iter()
        .filter_map(|extremum| {
            let local = extremum.observation.timestamp.with_timezone(tz);
            let hour = local.hour();
            if hour < config.hour_start || hour >= config.hour_end {
                return None;
            }
            if extremum.kind != TideKind::Low {
                return None;
            }
            if extremum.observation.level_meters > ceiling_meters {
                return None;
            }

            let weekday = local.weekday();
            Some(ForecastEvent {
                local_time: local.fixed_offset(),
                level: config.unit.express_meters(extremum.observation.level_meters),
                kind: extremum.kind,
                weekday,
                weekend: WeekendFlag::for_weekday(weekday),
            })
        })
        .collect();

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RawObservation, Unit};
    use chrono::{DateTime, FixedOffset, Utc, Weekday};

    fn low_at(ts: DateTime<Utc>, level_meters: f64) -> ClassifiedExtremum {
        ClassifiedExtremum {
            observation: RawObservation {
                timestamp: ts,
                level_meters,
            },
            kind: TideKind::Low,
        }
    }

    fn window_9_to_16() -> FilterConfig {
        FilterConfig {
            window_days: 30,
            depth_ceiling: 1.5,
            hour_start: 9,
            hour_end: 16,
            unit: Unit::Meters,
        }
    }

    #[test]
    fn test_hour_window_is_half_open() {
        // Wednesday 2024-06-12
        let inside = Utc.with_ymd_and_hms(2024, 6, 12, 15, 59, 0).unwrap();
        let boundary = Utc.with_ymd_and_hms(2024, 6, 12, 16, 0, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 6, 12, 9, 0, 0).unwrap();

        let events = apply(
            &[low_at(start, 0.5), low_at(inside, 0.5), low_at(boundary, 0.5)],
            &window_9_to_16(),
            &Utc,
        )
        .unwrap();

        let hours: Vec<_> = events.iter().map(|e| e.local_time.hour()).collect();
        assert_eq!(hours, vec![9, 15]);
    }

    #[test]
    fn test_depth_ceiling_is_inclusive() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap();
        let events = apply(
            &[low_at(ts, 1.5), low_at(ts, 1.500_001)],
            &window_9_to_16(),
            &Utc,
        )
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, 1.5);
    }

    #[test]
    fn test_highs_are_dropped() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap();
        let mut high = low_at(ts, 0.2);
        high.kind = TideKind::High;
        assert!(apply(&[high], &window_9_to_16(), &Utc).unwrap().is_empty());
    }

    #[test]
    fn test_local_zone_decides_the_hour() {
        // 19:30 UTC is 12:30 in UTC-7
        let ts = Utc.with_ymd_and_hms(2024, 6, 12, 19, 30, 0).unwrap();
        let pacific = FixedOffset::west_opt(7 * 3600).unwrap();

        assert!(apply(&[low_at(ts, 0.5)], &window_9_to_16(), &Utc).unwrap().is_empty());
        let events = apply(&[low_at(ts, 0.5)], &window_9_to_16(), &pacific).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].local_time.hour(), 12);
        assert_eq!(events[0].local_time.offset().local_minus_utc(), -7 * 3600);
    }

    #[test]
    fn test_feet_ceiling_compared_in_meters() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap();
        let config = FilterConfig {
            depth_ceiling: 3.0,
            unit: Unit::Feet,
            ..window_9_to_16()
        };
        // 3 ft is about 0.914 m
        let events = apply(&[low_at(ts, 0.9), low_at(ts, 0.95)], &config, &Utc).unwrap();
        assert_eq!(events.len(), 1);
        assert!((events[0].level - 0.9 * crate::units::FEET_PER_METER).abs() < 1e-9);
    }

    #[test]
    fn test_weekend_tagging() {
        // 2024-06-14 is a Friday
        let tag = |day: u32| {
            let ts = Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap();
            let events = apply(&[low_at(ts, 0.1)], &window_9_to_16(), &Utc).unwrap();
            (events[0].weekday, events[0].weekend)
        };
        assert_eq!(tag(13), (Weekday::Thu, WeekendFlag::None));
        assert_eq!(tag(14), (Weekday::Fri, WeekendFlag::LongWeekend));
        assert_eq!(tag(15), (Weekday::Sat, WeekendFlag::Weekend));
        assert_eq!(tag(16), (Weekday::Sun, WeekendFlag::Weekend));
        assert_eq!(tag(17), (Weekday::Mon, WeekendFlag::LongWeekend));
    }

    #[test]
    fn test_order_preserved_and_empty_is_ok() {
        let base = Utc.with_ymd_and_hms(2024, 6, 12, 10, 0, 0).unwrap();
        let extrema: Vec<_> = (0..4)
            .map(|d| low_at(base + chrono::Duration::days(d), 0.3))
            .collect();
        let events = apply(&extrema, &window_9_to_16(), &Utc).unwrap();
        assert!(events.windows(2).all(|w| w[0].local_time < w[1].local_time));

        let strict = FilterConfig {
            depth_ceiling: 0.0,
            ..window_9_to_16()
        };
        assert_eq!(apply(&extrema, &strict, &Utc).unwrap(), Vec::new());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = FilterConfig {
            hour_start: 17,
            hour_end: 9,
            ..window_9_to_16()
        };
        assert!(matches!(apply(&[], &config, &Utc), Err(TideError::Configuration(_))));
    }
}
