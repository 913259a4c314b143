use citypulse_core::models::{Measurement, MeasurementSet, RawRow};
use citypulse_core::normalizer::RowNormalizer;
use citypulse_core::window::DateWindow;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Counters describing one load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub chunks: u64,
    pub rows_seen: u64,
    pub accepted: u64,
    pub rejected: u64,
    /// Numeric cells replaced by `0.0` across all accepted rows.
    pub defaulted_fields: u64,
    /// Accepted rows dropped by the date window.
    pub outside_window: u64,
}

/// Collects normalised measurements chunk by chunk.
///
/// Single owner: fed only by the consumer of one parse.
#[derive(Debug, Default)]
pub struct MeasurementAccumulator {
    normalizer: RowNormalizer,
    measurements: Vec<Measurement>,
    report: IngestReport,
}

impl MeasurementAccumulator {
    pub fn new(normalizer: RowNormalizer) -> Self {
        Self {
            normalizer,
            measurements: Vec::new(),
            report: IngestReport::default(),
        }
    }

    /// Normalise and keep the valid rows of one chunk, in order.
    pub fn ingest_chunk(&mut self, rows: &[RawRow]) {
        self.report.chunks += 1;
        for row in rows {
            self.report.rows_seen += 1;
            match self.normalizer.normalize(row) {
                Ok(n) => {
                    self.report.accepted += 1;
                    self.report.defaulted_fields += u64::from(n.defaulted_fields);
                    self.measurements.push(n.measurement);
                }
                Err(reason) => {
                    self.report.rejected += 1;
                    debug!(line = row.line, "row rejected: {}", reason);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn report(&self) -> &IngestReport {
        &self.report
    }

    /// Sort, apply `window`, and freeze.
    pub fn finish(self, window: &DateWindow) -> (MeasurementSet, IngestReport) {
        let mut report = self.report;
        let all = MeasurementSet::from_unsorted(self.measurements);
        let before = all.len();
        let set = window.apply(all);
        report.outside_window = (before - set.len()) as u64;

        info!(
            accepted = report.accepted,
            rejected = report.rejected,
            defaulted_fields = report.defaulted_fields,
            kept = set.len(),
            "measurements loaded"
        );
        (set, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citypulse_core::models::CellValue;

    fn row(line: u64, ts: &str, aqi: f64) -> RawRow {
        RawRow::new(line)
            .with("timestamp", CellValue::Text(ts.to_string()))
            .with("aqi", CellValue::Number(aqi))
    }

    #[test]
    fn test_accumulates_across_chunks_and_sorts() {
        let mut acc = MeasurementAccumulator::default();
        acc.ingest_chunk(&[row(2, "2024-01-03 00:00:00", 3.0)]);
        acc.ingest_chunk(&[
            row(3, "2024-01-01 00:00:00", 1.0),
            row(4, "garbage", 9.0),
            row(5, "2024-01-02 00:00:00", 2.0),
        ]);

        let (set, report) = acc.finish(&DateWindow::All);
        let aqi: Vec<f64> = set.iter().map(|m| m.aqi).collect();
        assert_eq!(aqi, vec![1.0, 2.0, 3.0]);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.rows_seen, 4);
        assert_eq!(report.accepted, 3);
        assert_eq!(report.rejected, 1);
        // Six numeric columns absent on each accepted row.
        assert_eq!(report.defaulted_fields, 18);
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let mut acc = MeasurementAccumulator::default();
        acc.ingest_chunk(&[
            row(2, "2024-01-01 00:00:00", 10.0),
            row(3, "2024-01-01 00:00:00", 20.0),
        ]);
        let (set, _) = acc.finish(&DateWindow::All);
        assert_eq!(set.latest().unwrap().aqi, 20.0);
    }

    #[test]
    fn test_window_counts_dropped_rows() {
        let mut acc = MeasurementAccumulator::default();
        acc.ingest_chunk(&[
            row(2, "2024-01-01 00:00:00", 1.0),
            row(3, "2024-01-09 00:00:00", 2.0),
            row(4, "2024-01-10 00:00:00", 3.0),
        ]);
        let (set, report) = acc.finish(&DateWindow::TrailingFromLatest { days: 7 });
        assert_eq!(set.len(), 2);
        assert_eq!(report.outside_window, 1);
    }
}
