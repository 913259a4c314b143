//! Per-day and per-hour summaries of a measurement set.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use citypulse_core::models::{AqiCategory, Measurement, MeasurementSet};
use citypulse_core::statistics::Statistics;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Hourly,
}

impl Granularity {
    fn key_format(self) -> &'static str {
        match self {
            Granularity::Daily => "%Y-%m-%d",
            Granularity::Hourly => "%Y-%m-%d %H:00",
        }
    }
}

/// Statistics for one calendar period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    /// e.g. `"2024-01-15"` (daily) or `"2024-01-15 08:00"` (hourly).
    pub period_key: String,
    pub statistics: Statistics,
    /// Category of the period's mean AQI.
    pub aqi_category: AqiCategory,
}

/// Groups measurements into calendar periods of a display timezone.
#[derive(Debug, Clone, Copy)]
pub struct PeriodAggregator {
    tz: Tz,
}

impl Default for PeriodAggregator {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl PeriodAggregator {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn aggregate_daily(&self, set: &MeasurementSet) -> Vec<PeriodSummary> {
        self.aggregate(set, Granularity::Daily)
    }

    pub fn aggregate_hourly(&self, set: &MeasurementSet) -> Vec<PeriodSummary> {
        self.aggregate(set, Granularity::Hourly)
    }

    /// Summaries ascending by period key.
    pub fn aggregate(&self, set: &MeasurementSet, granularity: Granularity) -> Vec<PeriodSummary> {
        let fmt = granularity.key_format();
        self.group_by(set, |ts| ts.with_timezone(&self.tz).format(fmt).to_string())
            .into_iter()
            .filter_map(|(period_key, members)| {
                let statistics = Statistics::compute(&members)?;
                Some(PeriodSummary {
                    aqi_category: AqiCategory::from_aqi(statistics.aqi.average),
                    period_key,
                    statistics,
                })
            })
            .collect()
    }

    fn group_by(
        &self,
        set: &MeasurementSet,
        key_fn: impl Fn(DateTime<Utc>) -> String,
    ) -> BTreeMap<String, Vec<Measurement>> {
        let mut map: BTreeMap<String, Vec<Measurement>> = BTreeMap::new();
        for m in set {
            map.entry(key_fn(m.timestamp)).or_default().push(m.clone());
        }
        map
    }
}
