use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::models::Metric;

/// Format a reading with thousands separators and fixed decimals.
///
/// ```
/// use citypulse_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5, 1), "1,234.5");
/// assert_eq!(format_number(-0.04, 1), "0.0");
/// assert_eq!(format_number(12.0, 0), "12");
/// ```
pub fn format_number(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    let text = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let mut out = String::with_capacity(text.len() + int_part.len() / 3 + 1);
    // "-0.0" reads badly; only keep the sign when something non-zero survives.
    if value < 0.0 && text.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        out.push('-');
    }
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Unit suffix for a metric, empty for the dimensionless AQI.
pub fn metric_unit(metric: Metric) -> &'static str {
    match metric {
        Metric::Pm25 | Metric::Pm10 | Metric::No2 | Metric::O3 => "µg/m³",
        Metric::Aqi => "",
        Metric::DistanceKm => "km",
        Metric::DurationMinutes => "min",
    }
}

/// `"42.0 µg/m³"`, `"87"` for AQI.
pub fn format_metric(metric: Metric, value: f64) -> String {
    let decimals = if metric == Metric::Aqi { 0 } else { 1 };
    let number = format_number(value, decimals);
    match metric_unit(metric) {
        "" => number,
        unit => format!("{} {}", number, unit),
    }
}

/// Travel time as `"45m"` or `"1h 5m"`.
pub fn format_duration_minutes(minutes: f64) -> String {
    let total = minutes.max(0.0).round() as i64;
    match (total / 60, total % 60) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

/// Render an instant in the display timezone, e.g. `"2024-11-20 19:30 IST"`.
pub fn format_timestamp(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string()
}
