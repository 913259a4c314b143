//! Cross-analysis of pollution against traffic.
//!
//! Pearson correlation of each pollutant with travel time, plus the hours of
//! day where mean AQI and mean travel time peak.

use std::collections::BTreeMap;

use chrono::Timelike;
use chrono_tz::Tz;
use citypulse_core::models::{MeasurementSet, Metric};
use citypulse_core::statistics::pearson;
use serde::{Deserialize, Serialize};

/// How many hours of day count as "peak".
pub const PEAK_HOURS: usize = 3;

const STRONG: f64 = 0.7;
const MODERATE: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationStrength {
    Strong,
    Moderate,
    Weak,
}

impl CorrelationStrength {
    pub fn classify(r: f64) -> Self {
        let magnitude = r.abs();
        if magnitude > STRONG {
            CorrelationStrength::Strong
        } else if magnitude > MODERATE {
            CorrelationStrength::Moderate
        } else {
            CorrelationStrength::Weak
        }
    }
}

/// Correlation of one pollutant with traffic duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub metric: Metric,
    /// Absent when undefined (fewer than two readings or a constant series).
    pub coefficient: Option<f64>,
    pub strength: Option<CorrelationStrength>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    pub correlations: Vec<Correlation>,
    /// Hours of day (0-23) with the highest mean AQI, highest first.
    pub peak_aqi_hours: Vec<u32>,
    /// Hours of day with the longest mean travel time, longest first.
    pub peak_traffic_hours: Vec<u32>,
    /// Hours in both peak lists, ascending.
    pub critical_hours: Vec<u32>,
}

impl Insights {
    /// Human-readable findings; only notable correlations are mentioned.
    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::new();
        for c in &self.correlations {
            let (Some(r), Some(strength)) = (c.coefficient, c.strength) else {
                continue;
            };
            let word = match strength {
                CorrelationStrength::Strong => "Strong",
                CorrelationStrength::Moderate => "Moderate",
                CorrelationStrength::Weak => continue,
            };
            out.push(format!(
                "{} correlation ({:.2}) found between {} and traffic congestion",
                word,
                r,
                c.metric.label()
            ));
        }
        if !self.critical_hours.is_empty() {
            let hours: Vec<String> = self
                .critical_hours
                .iter()
                .map(|h| format!("{:02}:00", h))
                .collect();
            out.push(format!(
                "Critical hours with both high pollution and traffic: {}",
                hours.join(", ")
            ));
        }
        out
    }
}

/// Compute insights over `set`, bucketing hours of day in `tz`.
pub fn generate_insights(set: &MeasurementSet, tz: Tz) -> Insights {
    let traffic: Vec<f64> = set.values(Metric::DurationMinutes).collect();
    let correlations = Metric::POLLUTANTS
        .into_iter()
        .map(|metric| {
            let values: Vec<f64> = set.values(metric).collect();
            let coefficient = pearson(&values, &traffic);
            Correlation {
                metric,
                coefficient,
                strength: coefficient.map(CorrelationStrength::classify),
            }
        })
        .collect();

    let peak_aqi_hours = peak_hours(set, tz, Metric::Aqi);
    let peak_traffic_hours = peak_hours(set, tz, Metric::DurationMinutes);
    let mut critical_hours: Vec<u32> = peak_aqi_hours
        .iter()
        .copied()
        .filter(|h| peak_traffic_hours.contains(h))
        .collect();
    critical_hours.sort_unstable();

    Insights {
        correlations,
        peak_aqi_hours,
        peak_traffic_hours,
        critical_hours,
    }
}

/// Top [`PEAK_HOURS`] hours of day by mean `metric`. Ties go to the earlier hour.
fn peak_hours(set: &MeasurementSet, tz: Tz, metric: Metric) -> Vec<u32> {
    let mut sums: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for m in set {
        let hour = m.timestamp.with_timezone(&tz).hour();
        let slot = sums.entry(hour).or_insert((0.0, 0));
        slot.0 += m.value(metric);
        slot.1 += 1;
    }

    let mut means: Vec<(u32, f64)> = sums
        .into_iter()
        .map(|(hour, (sum, n))| (hour, sum / n as f64))
        .collect();
    // Stable sort over ascending hours keeps the earlier hour on ties.
    means.sort_by(|a, b| b.1.total_cmp(&a.1));
    means.into_iter().take(PEAK_HOURS).map(|(h, _)| h).collect()
}
