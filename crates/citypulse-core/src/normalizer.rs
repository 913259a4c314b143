//! Turns [`RawRow`]s into [`Measurement`]s.
//!
//! The timestamp is mandatory. Every numeric field falls back to `0.0` when
//! it is missing, empty, unparseable, non-finite or negative. That fallback
//! hides data-quality problems, so each substitution is counted and logged at
//! debug level.

use tracing::debug;

use crate::error::Rejection;
use crate::models::{CellValue, Column, Measurement, RawRow};
use crate::timestamp::TimestampParser;

/// Normalises rows with a fixed timestamp policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowNormalizer {
    timestamps: TimestampParser,
}

/// Outcome of normalising a single row.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub measurement: Measurement,
    /// Number of numeric fields that were replaced by `0.0`.
    pub defaulted_fields: u32,
}

impl RowNormalizer {
    pub fn new(timestamps: TimestampParser) -> Self {
        Self { timestamps }
    }

    /// Normalise `row`, or say why it was rejected.
    ///
    /// Total: every row yields exactly one of the two outcomes.
    pub fn normalize(&self, row: &RawRow) -> Result<Normalized, Rejection> {
        let ts_cell = row.timestamp.as_ref().ok_or(Rejection::MissingTimestamp)?;
        let timestamp = self.timestamps.parse(ts_cell)?;

        let mut defaulted_fields = 0u32;
        let mut read = |column: Column| -> f64 {
            match lenient_number(row.get(column)) {
                Some(v) => v,
                None => {
                    defaulted_fields += 1;
                    0.0
                }
            }
        };

        let measurement = Measurement {
            timestamp,
            pm2_5: read(Column::Pm25),
            pm10: read(Column::Pm10),
            no2: read(Column::No2),
            o3: read(Column::O3),
            aqi: read(Column::Aqi),
            distance_km: read(Column::DistanceKm),
            duration_minutes: read(Column::DurationInTrafficMin),
        };

        if defaulted_fields > 0 {
            debug!(
                line = row.line,
                defaulted_fields, "numeric fields defaulted to 0.0"
            );
        }

        Ok(Normalized {
            measurement,
            defaulted_fields,
        })
    }
}

/// Read a non-negative finite number, or `None` when the cell cannot supply one.
fn lenient_number(cell: Option<&CellValue>) -> Option<f64> {
    cell.and_then(CellValue::as_f64).filter(|v| *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn full_row() -> RawRow {
        RawRow::new(2)
            .with("timestamp", CellValue::Text("2024-11-20 14:00:00".to_string()))
            .with("pm2_5", CellValue::Number(40.0))
            .with("pm10", CellValue::Number(10.0))
            .with("no2", CellValue::Number(10.0))
            .with("o3", CellValue::Number(10.0))
            .with("aqi", CellValue::Number(60.0))
            .with("distance_km", CellValue::Number(5.0))
            .with("duration_in_traffic_min", CellValue::Number(10.0))
    }

    #[test]
    fn test_normalize_full_row() {
        let n = RowNormalizer::default().normalize(&full_row()).unwrap();
        assert_eq!(n.defaulted_fields, 0);
        assert_eq!(
            n.measurement.timestamp,
            DateTime::parse_from_rfc3339("2024-11-20T14:00:00Z")
                .unwrap()
                .with_timezone(&Utc)
        );
        assert_eq!(n.measurement.pm2_5, 40.0);
        assert_eq!(n.measurement.distance_km, 5.0);
        assert_eq!(n.measurement.duration_minutes, 10.0);
    }

    #[test]
    fn test_invalid_timestamp_is_rejected() {
        let mut row = full_row();
        row.timestamp = Some(CellValue::Text("not-a-date".to_string()));
        let err = RowNormalizer::default().normalize(&row).unwrap_err();
        assert_eq!(err, Rejection::InvalidTimestamp("not-a-date".to_string()));
    }

    #[test]
    fn test_missing_timestamp_is_rejected() {
        let mut row = full_row();
        row.timestamp = None;
        assert_eq!(
            RowNormalizer::default().normalize(&row).unwrap_err(),
            Rejection::MissingTimestamp
        );
    }

    #[test]
    fn test_missing_pm25_defaults_to_zero() {
        let mut row = full_row();
        row.pm2_5 = None;
        let n = RowNormalizer::default().normalize(&row).unwrap();
        assert_eq!(n.measurement.pm2_5, 0.0);
        assert_eq!(n.defaulted_fields, 1);
    }

    #[test]
    fn test_text_numbers_are_reparsed() {
        let mut row = full_row();
        row.aqi = Some(CellValue::Text(" 88.5 ".to_string()));
        let n = RowNormalizer::default().normalize(&row).unwrap();
        assert_eq!(n.measurement.aqi, 88.5);
    }

    #[test]
    fn test_garbage_and_negative_values_default_to_zero() {
        let mut row = full_row();
        row.no2 = Some(CellValue::Text("N/A".to_string()));
        row.o3 = Some(CellValue::Number(-4.0));
        let n = RowNormalizer::default().normalize(&row).unwrap();
        assert_eq!(n.measurement.no2, 0.0);
        assert_eq!(n.measurement.o3, 0.0);
        assert_eq!(n.defaulted_fields, 2);
    }

    #[test]
    fn test_normalization_is_total() {
        let rows = vec![
            full_row(),
            RawRow::new(3),
            RawRow::new(4).with("timestamp", CellValue::Text("garbage".to_string())),
            RawRow::new(5).with("timestamp", CellValue::Number(1_700_000_000_000.0)),
        ];
        let normalizer = RowNormalizer::default();
        let accepted = rows
            .iter()
            .filter(|r| normalizer.normalize(r).is_ok())
            .count();
        let rejected = rows
            .iter()
            .filter(|r| normalizer.normalize(r).is_err())
            .count();
        assert_eq!(accepted + rejected, rows.len());
        assert_eq!(accepted, 2);
    }
}
