use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── CellValue ─────────────────────────────────────────────────────────────────

/// One decoded CSV cell after dynamic typing.
///
/// Numeric-looking cells become [`CellValue::Number`]; everything else stays
/// text. Empty cells are never represented, they are simply absent from the
/// row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Build a cell from a raw field, trimming whitespace.
    ///
    /// Returns `None` for empty (or whitespace-only) fields.
    pub fn from_field(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match parse_finite(trimmed) {
            Some(n) => Some(CellValue::Number(n)),
            None => Some(CellValue::Text(trimmed.to_string())),
        }
    }

    /// Numeric reading of the cell, re-parsing text defensively.
    ///
    /// Non-finite values (`NaN`, `inf`) count as unparseable.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Number(_) => None,
            CellValue::Text(s) => parse_finite(s.trim()),
        }
    }

    /// Text rendering of the cell, as it would appear in the file.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }
}

fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

// ── Column ────────────────────────────────────────────────────────────────────

/// The columns citypulse understands in the merged air-quality/traffic CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Timestamp,
    Pm25,
    Pm10,
    No2,
    O3,
    Aqi,
    DistanceKm,
    DurationInTrafficMin,
}

impl Column {
    /// Every column the input file is expected to carry.
    pub const REQUIRED: [Column; 8] = [
        Column::Timestamp,
        Column::Pm25,
        Column::Pm10,
        Column::No2,
        Column::O3,
        Column::Aqi,
        Column::DistanceKm,
        Column::DurationInTrafficMin,
    ];

    /// Header spelling of the column.
    pub fn header(self) -> &'static str {
        match self {
            Column::Timestamp => "timestamp",
            Column::Pm25 => "pm2_5",
            Column::Pm10 => "pm10",
            Column::No2 => "no2",
            Column::O3 => "o3",
            Column::Aqi => "aqi",
            Column::DistanceKm => "distance_km",
            Column::DurationInTrafficMin => "duration_in_traffic_min",
        }
    }

    /// Resolve an (already trimmed) header name.
    pub fn from_header(name: &str) -> Option<Self> {
        Self::REQUIRED.into_iter().find(|c| c.header() == name)
    }
}

// ── RawRow ────────────────────────────────────────────────────────────────────

/// One CSV data line with explicit optional fields for the known columns.
///
/// Unknown columns are kept in `extra` so nothing in the line is lost before
/// normalisation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    /// 1-based line number in the source text.
    pub line: u64,
    pub timestamp: Option<CellValue>,
    pub pm2_5: Option<CellValue>,
    pub pm10: Option<CellValue>,
    pub no2: Option<CellValue>,
    pub o3: Option<CellValue>,
    pub aqi: Option<CellValue>,
    pub distance_km: Option<CellValue>,
    pub duration_in_traffic_min: Option<CellValue>,
    pub extra: BTreeMap<String, CellValue>,
}

impl RawRow {
    pub fn new(line: u64) -> Self {
        Self {
            line,
            ..Default::default()
        }
    }

    /// Store `value` under the header `name`; a repeated header overwrites.
    pub fn set(&mut self, name: &str, value: CellValue) {
        match Column::from_header(name) {
            Some(column) => *self.slot_mut(column) = Some(value),
            None => {
                self.extra.insert(name.to_string(), value);
            }
        }
    }

    /// Builder-style variant of [`RawRow::set`].
    pub fn with(mut self, name: &str, value: CellValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, column: Column) -> Option<&CellValue> {
        match column {
            Column::Timestamp => self.timestamp.as_ref(),
            Column::Pm25 => self.pm2_5.as_ref(),
            Column::Pm10 => self.pm10.as_ref(),
            Column::No2 => self.no2.as_ref(),
            Column::O3 => self.o3.as_ref(),
            Column::Aqi => self.aqi.as_ref(),
            Column::DistanceKm => self.distance_km.as_ref(),
            Column::DurationInTrafficMin => self.duration_in_traffic_min.as_ref(),
        }
    }

    fn slot_mut(&mut self, column: Column) -> &mut Option<CellValue> {
        match column {
            Column::Timestamp => &mut self.timestamp,
            Column::Pm25 => &mut self.pm2_5,
            Column::Pm10 => &mut self.pm10,
            Column::No2 => &mut self.no2,
            Column::O3 => &mut self.o3,
            Column::Aqi => &mut self.aqi,
            Column::DistanceKm => &mut self.distance_km,
            Column::DurationInTrafficMin => &mut self.duration_in_traffic_min,
        }
    }
}

// ── Metric ────────────────────────────────────────────────────────────────────

/// The numeric fields of a [`Measurement`] that statistics are tracked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Pm25,
    Pm10,
    No2,
    O3,
    Aqi,
    DistanceKm,
    DurationMinutes,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Pm25,
        Metric::Pm10,
        Metric::No2,
        Metric::O3,
        Metric::Aqi,
        Metric::DistanceKm,
        Metric::DurationMinutes,
    ];

    /// Pollutants correlated against traffic in the insights report.
    pub const POLLUTANTS: [Metric; 4] = [Metric::Pm25, Metric::Pm10, Metric::No2, Metric::O3];

    /// Display label.
    pub fn label(self) -> &'static str {
        match self {
            Metric::Pm25 => "PM2.5",
            Metric::Pm10 => "PM10",
            Metric::No2 => "NO2",
            Metric::O3 => "O3",
            Metric::Aqi => "AQI",
            Metric::DistanceKm => "Distance (km)",
            Metric::DurationMinutes => "Duration (min)",
        }
    }
}

// ── Measurement ───────────────────────────────────────────────────────────────

/// A normalised, validated reading. The timestamp is always valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Serialised as epoch milliseconds.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub pm2_5: f64,
    pub pm10: f64,
    pub no2: f64,
    pub o3: f64,
    pub aqi: f64,
    #[serde(rename = "distanceKm")]
    pub distance_km: f64,
    #[serde(rename = "durationMinutes")]
    pub duration_minutes: f64,
}

impl Measurement {
    /// A reading at `timestamp` with every metric at zero.
    pub fn zeroed(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            pm2_5: 0.0,
            pm10: 0.0,
            no2: 0.0,
            o3: 0.0,
            aqi: 0.0,
            distance_km: 0.0,
            duration_minutes: 0.0,
        }
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Pm25 => self.pm2_5,
            Metric::Pm10 => self.pm10,
            Metric::No2 => self.no2,
            Metric::O3 => self.o3,
            Metric::Aqi => self.aqi,
            Metric::DistanceKm => self.distance_km,
            Metric::DurationMinutes => self.duration_minutes,
        }
    }
}

// ── MeasurementSet ────────────────────────────────────────────────────────────

/// Measurements of one session, ascending by timestamp.
///
/// Readings sharing a timestamp keep their arrival order. The set is frozen
/// once built: there is no way to push into it afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MeasurementSet {
    measurements: Vec<Measurement>,
}

impl MeasurementSet {
    /// Freeze `measurements` into a set, sorting them by timestamp.
    pub fn from_unsorted(mut measurements: Vec<Measurement>) -> Self {
        // sort_by_key is stable, so ties keep arrival order.
        measurements.sort_by_key(|m| m.timestamp);
        Self { measurements }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn as_slice(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Measurement> {
        self.measurements.iter()
    }

    /// The most recent measurement.
    pub fn latest(&self) -> Option<&Measurement> {
        self.measurements.last()
    }

    /// The oldest measurement.
    pub fn earliest(&self) -> Option<&Measurement> {
        self.measurements.first()
    }

    /// Every value of `metric`, in set order.
    pub fn values(&self, metric: Metric) -> impl Iterator<Item = f64> + '_ {
        self.measurements.iter().map(move |m| m.value(metric))
    }
}

impl<'a> IntoIterator for &'a MeasurementSet {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.measurements.iter()
    }
}

// ── AqiCategory ───────────────────────────────────────────────────────────────

/// Qualitative band for an AQI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AqiCategory {
    Good,
    Moderate,
    Poor,
    VeryPoor,
    Severe,
}

impl AqiCategory {
    pub fn from_aqi(aqi: f64) -> Self {
        if aqi <= 50.0 {
            AqiCategory::Good
        } else if aqi <= 100.0 {
            AqiCategory::Moderate
        } else if aqi <= 200.0 {
            AqiCategory::Poor
        } else if aqi <= 300.0 {
            AqiCategory::VeryPoor
        } else {
            AqiCategory::Severe
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::Poor => "Poor",
            AqiCategory::VeryPoor => "Very Poor",
            AqiCategory::Severe => "Severe",
        }
    }
}
