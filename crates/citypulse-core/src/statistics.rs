use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Measurement, MeasurementSet, Metric};

// ── FieldStats ────────────────────────────────────────────────────────────────

/// Mean, maximum and minimum of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub average: f64,
    pub max: f64,
    pub min: f64,
}

impl FieldStats {
    /// Fold `values` into a summary. `None` for an empty input.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;

        for v in values {
            count += 1;
            sum += v;
            max = max.max(v);
            min = min.min(v);
        }

        // min > max only survives when every value was NaN.
        if count == 0 || min > max {
            return None;
        }

        // Summation rounding can leave the mean an ulp outside [min, max].
        let average = (sum / count as f64).clamp(min, max);
        Some(Self { average, max, min })
    }
}

// ── Statistics ────────────────────────────────────────────────────────────────

/// Summary of a non-empty run of measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub count: usize,
    pub first_timestamp: DateTime<Utc>,
    pub last_timestamp: DateTime<Utc>,
    pub pm2_5: FieldStats,
    pub pm10: FieldStats,
    pub no2: FieldStats,
    pub o3: FieldStats,
    pub aqi: FieldStats,
    pub distance_km: FieldStats,
    pub duration_minutes: FieldStats,
}

impl Statistics {
    /// Summarise `measurements`, which need not be sorted.
    ///
    /// Returns `None` (the "no data" condition) for an empty slice.
    pub fn compute(measurements: &[Measurement]) -> Option<Self> {
        let first_timestamp = measurements.iter().map(|m| m.timestamp).min()?;
        let last_timestamp = measurements.iter().map(|m| m.timestamp).max()?;
        let field =
            |metric: Metric| FieldStats::from_values(measurements.iter().map(|m| m.value(metric)));

        Some(Self {
            count: measurements.len(),
            first_timestamp,
            last_timestamp,
            pm2_5: field(Metric::Pm25)?,
            pm10: field(Metric::Pm10)?,
            no2: field(Metric::No2)?,
            o3: field(Metric::O3)?,
            aqi: field(Metric::Aqi)?,
            distance_km: field(Metric::DistanceKm)?,
            duration_minutes: field(Metric::DurationMinutes)?,
        })
    }

    pub fn field(&self, metric: Metric) -> &FieldStats {
        match metric {
            Metric::Pm25 => &self.pm2_5,
            Metric::Pm10 => &self.pm10,
            Metric::No2 => &self.no2,
            Metric::O3 => &self.o3,
            Metric::Aqi => &self.aqi,
            Metric::DistanceKm => &self.distance_km,
            Metric::DurationMinutes => &self.duration_minutes,
        }
    }
}

/// Full recomputation over a set; `None` when the set is empty.
pub fn get_statistics(set: &MeasurementSet) -> Option<Statistics> {
    Statistics::compute(set.as_slice())
}

// ── Correlation ───────────────────────────────────────────────────────────────

/// Pearson correlation coefficient of two equally long series.
///
/// Returns `None` when fewer than two pairs exist or either series is
/// constant (the coefficient is undefined there).
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}
