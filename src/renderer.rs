//! # Text Rendering
//!
//! Renders forecast and live snapshots as plain text for the terminal. All
//! values arrive already in the display unit; nothing here converts levels.

use crate::live::LiveSnapshot;
use crate::pipeline::{DisplayState, ForecastSnapshot};
use crate::{Direction, ForecastEvent, LiveConditions, Unit, WeekendFlag};
use chrono::{DateTime, Datelike, Days, TimeZone};
use std::fmt::Write;

/// English ordinal for a day of the month ("1st", "22nd", "13th").
pub fn ordinal(day: u32) -> String {
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{day}{suffix}")
}

/// e.g. "Saturday, June 15th, 2024 @ 10:42am"
pub fn format_event_time<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}, {} {}, {} @ {}",
        time.format("%A"),
        time.format("%B"),
        ordinal(time.day()),
        time.year(),
        time.format("%-I:%M%P")
    )
}

fn format_event(event: &ForecastEvent, unit: Unit) -> String {
    let marker = match event.weekend {
        WeekendFlag::Weekend => "  [weekend]",
        WeekendFlag::LongWeekend => "  [long weekend]",
        WeekendFlag::None => "",
    };
    format!(
        "{:<40} {:>6.1} {}{}",
        format_event_time(&event.local_time),
        event.level,
        unit.short_label(),
        marker
    )
}

/// "today to 2024-7-10" for a horizon of `days` from `today`.
pub fn format_horizon<Tz: TimeZone>(today: &DateTime<Tz>, days: i64) -> String {
    let end = u64::try_from(days)
        .ok()
        .and_then(|days| today.date_naive().checked_add_days(Days::new(days)));
    match end {
        Some(end) => format!("today to {}", end.format("%Y-%-m-%-d")),
        None => format!("within {days} days"),
    }
}

/// The forecast table, or the message for the current display state.
pub fn format_forecast<Tz: TimeZone>(
    snapshot: &ForecastSnapshot,
    today: &DateTime<Tz>,
) -> String {
    let config = &snapshot.config;
    let unit = config.unit;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Low tides under {:.2} {} between {}:00 and {}:00, {}",
        config.depth_ceiling,
        unit.short_label(),
        config.hour_start,
        config.hour_end,
        format_horizon(today, config.window_days)
    );

    match snapshot.display_state() {
        DisplayState::Loading => {
            let _ = writeln!(out, "Fetching...");
        }
        DisplayState::Failed(message) => {
            let _ = writeln!(out, "An error occurred: {message}");
        }
        DisplayState::NoResults => {
            let _ = writeln!(out, "No results...");
        }
        DisplayState::Results(_) => {
            let _ = writeln!(out, "{:<40} {:>9}", "When", "Low Tide Level");
            for event in &snapshot.events {
                let _ = writeln!(out, "{}", format_event(event, unit));
            }
        }
    }

    out
}

/// Rate of change in the small unit people read it in.
pub fn format_rate(conditions: &LiveConditions) -> String {
    match conditions.unit {
        Unit::Meters => format!("{:.1} cm/min", conditions.rate_per_minute * 100.0),
        Unit::Feet => format!("{:.1} inches/min", conditions.rate_per_minute * 12.0),
    }
}

/// One-line live readout prefixed with the local clock.
pub fn format_live<Tz: TimeZone>(snapshot: &LiveSnapshot, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let clock = now.format("%a %b %-d %-I:%M:%S%P");
    let reading = match &snapshot.conditions {
        Some(c) => {
            let direction = match c.direction {
                Direction::Rising => "rising",
                Direction::Falling => "falling",
            };
            format!(
                "Current depth is {:.2} {} ({} at {})",
                c.depth,
                c.unit.short_label(),
                direction,
                format_rate(c)
            )
        }
        None => "Current depth unavailable".to_string(),
    };

    match &snapshot.error {
        Some(err) if snapshot.conditions.is_some() => format!("{clock} | {reading} [stale: {err}]"),
        Some(err) => format!("{clock} | {reading}: {err}"),
        None => format!("{clock} | {reading}"),
    }
}

/// Print the forecast table to stdout.
pub fn draw_forecast<Tz: TimeZone>(snapshot: &ForecastSnapshot, today: &DateTime<Tz>) {
    println!();
    print!("{}", format_forecast(snapshot, today));
}
