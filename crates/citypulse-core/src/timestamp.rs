use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::error::Rejection;
use crate::models::CellValue;

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

/// Resolve a timezone setting (`"auto"` or an IANA name) to a [`Tz`].
///
/// Unknown names fall back to UTC with a warning.
pub fn resolve_timezone(name: &str) -> Tz {
    let name = if name.eq_ignore_ascii_case("auto") {
        get_system_timezone()
    } else {
        name.to_string()
    };
    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!("unrecognised timezone \"{}\", falling back to UTC", name);
        Tz::UTC
    })
}

// ── TimestampParser ───────────────────────────────────────────────────────────

/// Naive patterns tried after RFC 3339 / RFC 2822, interpreted in the
/// parser's default timezone.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];

/// Smallest number read as epoch milliseconds (1973-03-03T09:46:40Z).
///
/// Below it, epoch seconds and compact `YYYYMMDD` dates would otherwise land
/// in early 1970.
pub const MIN_EPOCH_MILLIS: f64 = 100_000_000_000.0;

/// Parses the `timestamp` column of a row.
///
/// Strings carrying an offset (RFC 3339, RFC 2822) are absolute. Strings
/// without one are read in `default_tz`. Numbers from [`MIN_EPOCH_MILLIS`]
/// up are epoch milliseconds; smaller integers are tried as compact
/// `YYYYMMDD` dates and rejected otherwise.
#[derive(Debug, Clone, Copy)]
pub struct TimestampParser {
    default_tz: Tz,
}

impl Default for TimestampParser {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl TimestampParser {
    pub fn new(default_tz: Tz) -> Self {
        Self { default_tz }
    }

    pub fn default_tz(&self) -> Tz {
        self.default_tz
    }

    /// Parse a cell into an absolute UTC instant.
    pub fn parse(&self, value: &CellValue) -> Result<DateTime<Utc>, Rejection> {
        match value {
            CellValue::Number(n) => self
                .parse_number(*n)
                .ok_or_else(|| Rejection::InvalidTimestamp(value.to_text())),
            CellValue::Text(s) => self
                .parse_str(s)
                .ok_or_else(|| Rejection::InvalidTimestamp(s.clone())),
        }
    }

    /// Parse a string timestamp; `None` when no known format matches.
    pub fn parse_str(&self, s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        // RFC 3339 wants an explicit offset; accept a trailing 'Z' too.
        let normalised = match s.strip_suffix('Z') {
            Some(stripped) => format!("{}+00:00", stripped),
            None => s.to_string(),
        };
        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return Some(dt.with_timezone(&Utc));
        }

        for fmt in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return self.localize(naive);
            }
        }
        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
                return self.localize(date.and_hms_opt(0, 0, 0)?);
            }
        }

        None
    }

    /// Interpret a naive wall-clock time in the default timezone.
    ///
    /// Times skipped by a DST transition do not exist and yield `None`;
    /// ambiguous ones resolve to the earlier instant.
    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.default_tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn parse_number(&self, n: f64) -> Option<DateTime<Utc>> {
        if n >= MIN_EPOCH_MILLIS {
            return Self::from_epoch_millis(n);
        }
        if n.fract() == 0.0 && (10_000_000.0..100_000_000.0).contains(&n) {
            return self.parse_str(&format!("{}", n as i64));
        }
        None
    }

    fn from_epoch_millis(ms: f64) -> Option<DateTime<Utc>> {
        if !ms.is_finite() {
            return None;
        }
        DateTime::from_timestamp_millis(ms.trunc() as i64)
    }
}
