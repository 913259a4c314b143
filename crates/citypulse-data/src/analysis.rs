//! One-shot analysis pipeline.
//!
//! Fetch, parse, normalise, window, then derive statistics, alerts, period
//! summaries and insights into a single serialisable [`AnalysisResult`].

use chrono::Utc;
use chrono_tz::Tz;
use citypulse_core::alerts::{Alert, AlertEngine, RuleBreach, Thresholds};
use citypulse_core::error::{LoadError, ParseError};
use citypulse_core::models::MeasurementSet;
use citypulse_core::normalizer::RowNormalizer;
use citypulse_core::statistics::{get_statistics, Statistics};
use citypulse_core::timestamp::TimestampParser;
use citypulse_core::window::DateWindow;
use serde::Serialize;
use tracing::info;

use crate::accumulator::{IngestReport, MeasurementAccumulator};
use crate::fetcher::{Fetcher, Source};
use crate::insights::{generate_insights, Insights};
use crate::parser::{ChunkedCsvParser, ParseEvent, DEFAULT_CHUNK_ROWS};
use crate::periods::{PeriodAggregator, PeriodSummary};

// ── Public types ──────────────────────────────────────────────────────────────

/// Everything that shapes one analysis run.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisOptions {
    pub timestamps: TimestampParser,
    pub window: DateWindow,
    pub thresholds: Thresholds,
    /// Timezone for period keys and hour-of-day buckets.
    pub display_tz: Tz,
    pub chunk_rows: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            timestamps: TimestampParser::default(),
            window: DateWindow::All,
            thresholds: Thresholds::default(),
            display_tz: Tz::UTC,
            chunk_rows: DEFAULT_CHUNK_ROWS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMetadata {
    /// RFC 3339 time the result was produced.
    pub generated_at: String,
    pub source: String,
    pub window: String,
    pub load_time_seconds: f64,
}

/// The complete output of one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub metadata: AnalysisMetadata,
    pub ingest: IngestReport,
    /// `None` when the window kept no data.
    pub statistics: Option<Statistics>,
    pub alerts: Vec<Alert>,
    pub breaches: Vec<RuleBreach>,
    pub daily: Vec<PeriodSummary>,
    pub hourly: Vec<PeriodSummary>,
    pub insights: Insights,
    #[serde(skip)]
    pub measurements: MeasurementSet,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Parse one in-memory CSV document into `acc`.
///
/// A parse error is returned as-is; the caller decides what to do with the
/// rows already ingested.
pub fn ingest_bytes(
    body: &[u8],
    chunk_rows: usize,
    acc: &mut MeasurementAccumulator,
) -> Result<(), ParseError> {
    for event in ChunkedCsvParser::from_bytes(body).with_chunk_size(chunk_rows) {
        match event {
            ParseEvent::Chunk(rows) => acc.ingest_chunk(&rows),
            ParseEvent::Complete => break,
            ParseEvent::Error(e) => return Err(e),
        }
    }
    Ok(())
}

/// Derive every view from a frozen set.
pub fn analyze_measurements(
    measurements: MeasurementSet,
    ingest: IngestReport,
    metadata: AnalysisMetadata,
    options: &AnalysisOptions,
) -> AnalysisResult {
    let engine = AlertEngine::new(options.thresholds);
    let periods = PeriodAggregator::new(options.display_tz);

    AnalysisResult {
        metadata,
        ingest,
        statistics: get_statistics(&measurements),
        alerts: engine.evaluate_alerts(&measurements),
        breaches: engine.breach_summary(&measurements),
        daily: periods.aggregate_daily(&measurements),
        hourly: periods.aggregate_hourly(&measurements),
        insights: generate_insights(&measurements, options.display_tz),
        measurements,
    }
}

/// Analyse a CSV document already in memory.
pub fn analyze_text(
    body: &[u8],
    source_label: &str,
    options: &AnalysisOptions,
) -> Result<AnalysisResult, ParseError> {
    let started = std::time::Instant::now();
    let mut acc = MeasurementAccumulator::new(RowNormalizer::new(options.timestamps));
    ingest_bytes(body, options.chunk_rows, &mut acc)?;
    let (set, report) = acc.finish(&options.window);
    Ok(analyze_measurements(
        set,
        report,
        metadata(source_label, options, started),
        options,
    ))
}

/// Fetch and analyse `source`. Directories contribute every CSV they hold,
/// in path order, to one set.
pub async fn analyze_source(
    source: &Source,
    fetcher: &Fetcher,
    options: &AnalysisOptions,
) -> Result<AnalysisResult, LoadError> {
    let started = std::time::Instant::now();
    let mut acc = MeasurementAccumulator::new(RowNormalizer::new(options.timestamps));

    for part in source.expand()? {
        let fetched = fetcher.fetch(&part).await?;
        ingest_bytes(&fetched.body, options.chunk_rows, &mut acc)?;
    }

    let (set, report) = acc.finish(&options.window);
    let result = analyze_measurements(
        set,
        report,
        metadata(&source.to_string(), options, started),
        options,
    );
    info!(
        "Analysed {} measurements from {} in {:.3}s",
        result.measurements.len(),
        source,
        result.metadata.load_time_seconds
    );
    Ok(result)
}

fn metadata(source: &str, options: &AnalysisOptions, started: std::time::Instant) -> AnalysisMetadata {
    AnalysisMetadata {
        generated_at: Utc::now().to_rfc3339(),
        source: source.to_string(),
        window: options.window.describe(),
        load_time_seconds: started.elapsed().as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citypulse_core::alerts::{Rule, Severity};

    const CSV: &str = "\
timestamp,pm2_5,pm10,no2,o3,aqi,distance_km,duration_in_traffic_min
2024-11-20 08:00:00,12,30,20,25,45,8,12
2024-11-20 09:00:00,40,10,10,10,60,5,10
";

    #[test]
    fn test_analyze_text_end_to_end() {
        let result = analyze_text(CSV.as_bytes(), "inline", &AnalysisOptions::default()).unwrap();
        assert_eq!(result.ingest.accepted, 2);
        let stats = result.statistics.as_ref().unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.pm2_5.max, 40.0);

        let rules: Vec<Rule> = result.alerts.iter().map(|a| a.rule).collect();
        assert_eq!(rules, vec![Rule::Pm25, Rule::SystemRollup]);
        assert_eq!(result.alerts[1].severity, Severity::Warning);
        assert_eq!(result.daily.len(), 1);
        assert_eq!(result.hourly.len(), 2);
    }

    #[test]
    fn test_analyze_text_parse_error() {
        let bad = format!("{}2024-11-20 10:00:00,1\n", CSV);
        let err = analyze_text(bad.as_bytes(), "inline", &AnalysisOptions::default()).unwrap_err();
        assert_eq!(err.line, Some(4));
    }

    #[test]
    fn test_window_that_keeps_nothing_yields_no_alerts() {
        let options = AnalysisOptions {
            window: DateWindow::TrailingFromNow {
                days: 1,
                now: chrono::TimeZone::with_ymd_and_hms(&Utc, 2030, 1, 1, 0, 0, 0).unwrap(),
            },
            ..AnalysisOptions::default()
        };
        let result = analyze_text(CSV.as_bytes(), "inline", &options).unwrap();
        assert!(result.statistics.is_none());
        assert!(result.alerts.is_empty());
        assert_eq!(result.ingest.outside_window, 2);
    }

    #[test]
    fn test_result_serialises_to_json() {
        let result = analyze_text(CSV.as_bytes(), "inline", &AnalysisOptions::default()).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["metadata"]["source"], "inline");
        assert_eq!(json["alerts"][0]["severity"], "warning");
        assert!(json.get("measurements").is_none());
    }
}
