//! Formatting helpers shared across CLI commands.

use chrono::{DateTime, Local};
use slymaps::clock::EpochMillis;
use slymaps::model::{Place, TransitStop};

/// Local wall-clock time, `HH:MM`.
pub fn format_time(ms: EpochMillis) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

/// Seconds as `1h 05m`, `12 min` or `45 s`.
pub fn format_duration(secs: f64) -> String {
    let secs = secs.max(0.0).round() as u64;
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{} min", secs / 60)
    } else {
        format!("{} s", secs)
    }
}

/// Metres as `850 m` or `12.3 km`.
pub fn format_distance(metres: f64) -> String {
    if metres >= 1000.0 {
        format!("{:.1} km", metres / 1000.0)
    } else {
        format!("{:.0} m", metres.max(0.0))
    }
}

/// Minutes until `at`, as `now`, `3 min` or `3 min ago`.
pub fn format_relative(at: EpochMillis, now: EpochMillis) -> String {
    let minutes = (at - now) / 60_000;
    match minutes {
        0 => "now".to_string(),
        m if m > 0 => format!("{} min", m),
        m => format!("{} min ago", -m),
    }
}

pub fn print_stop(stop: &TransitStop) {
    let code = stop.code.as_deref().unwrap_or("-");
    let direction = stop.direction.as_deref().unwrap_or("");
    println!(
        "  {:<14} {:<6} {:<2} {}  ({} routes)",
        stop.id,
        code,
        direction,
        stop.name,
        stop.route_ids.len()
    );
}

pub fn print_place(place: &Place) {
    println!(
        "  {:<24} {:<16} {}",
        place.id,
        place.category,
        place.name
    );
    if let Some(address) = &place.address {
        println!("  {:<24} {:<16} {}", "", "", address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42.4), "42 s");
        assert_eq!(format_duration(61.0), "1 min");
        assert_eq!(format_duration(3900.0), "1h 05m");
        assert_eq!(format_duration(-5.0), "0 s");
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(850.2), "850 m");
        assert_eq!(format_distance(12_340.0), "12.3 km");
    }

    #[test]
    fn test_format_relative() {
        let now = 1_700_000_000_000;
        assert_eq!(format_relative(now + 30_000, now), "now");
        assert_eq!(format_relative(now + 180_000, now), "3 min");
        assert_eq!(format_relative(now - 120_000, now), "2 min ago");
    }

    #[test]
    fn test_format_time_out_of_range() {
        assert_eq!(format_time(i64::MAX), "--:--");
        assert_eq!(format_time(0).len(), 5);
    }
}
