//! Text and JSON rendering of an analysis.

use std::fmt::{self, Write};

use chrono_tz::Tz;
use citypulse_core::actuator::{ActuationOutcome, ActuationRecord};
use citypulse_core::alerts::{ActuationCommand, Alert, Severity};
use citypulse_core::formatting::{
    format_duration_minutes, format_metric, format_number, format_timestamp,
};
use citypulse_core::models::{AqiCategory, Metric};
use citypulse_data::analysis::AnalysisResult;
use citypulse_data::periods::PeriodSummary;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Summary,
    Alerts,
    Daily,
    Hourly,
    Insights,
    All,
}

impl View {
    /// Unknown names fall back to the summary.
    pub fn parse(name: &str) -> Self {
        match name {
            "alerts" => View::Alerts,
            "daily" => View::Daily,
            "hourly" => View::Hourly,
            "insights" => View::Insights,
            "all" => View::All,
            _ => View::Summary,
        }
    }

    fn shows(self, section: View) -> bool {
        self == View::All || self == section
    }
}

pub struct Renderer {
    pub view: View,
    pub tz: Tz,
}

impl Renderer {
    pub fn new(view: View, tz: Tz) -> Self {
        Self { view, tz }
    }

    // ── Text ──────────────────────────────────────────────────────────────────

    pub fn render_text(&self, result: &AnalysisResult, actuations: &[ActuationRecord]) -> String {
        let mut out = String::new();
        // fmt::Write for String never fails.
        let _ = self.write_text(&mut out, result, actuations);
        out
    }

    /// Write the text report for the selected view into `out`.
    pub fn write_text<W: Write>(
        &self,
        out: &mut W,
        result: &AnalysisResult,
        actuations: &[ActuationRecord],
    ) -> fmt::Result {
        writeln!(out, "CityPulse | {}", result.metadata.source)?;
        writeln!(
            out,
            "Window: {} | {} readings ({} rejected, {} outside window)",
            result.metadata.window,
            result.measurements.len(),
            result.ingest.rejected,
            result.ingest.outside_window
        )?;
        if result.ingest.defaulted_fields > 0 {
            writeln!(
                out,
                "Note: {} missing or invalid values were counted as 0",
                result.ingest.defaulted_fields
            )?;
        }

        if self.view.shows(View::Summary) {
            self.summary_text(out, result)?;
        }
        if self.view.shows(View::Alerts) {
            alerts_text(out, &result.alerts)?;
            if !actuations.is_empty() {
                actuations_text(out, actuations)?;
            }
        }
        if self.view.shows(View::Daily) {
            periods_text(out, "Daily", &result.daily)?;
        }
        if self.view.shows(View::Hourly) {
            periods_text(out, "Hourly", &result.hourly)?;
        }
        if self.view.shows(View::Insights) {
            insights_text(out, result)?;
        }
        Ok(())
    }

    fn summary_text<W: Write>(&self, out: &mut W, result: &AnalysisResult) -> fmt::Result {
        writeln!(out, "\n== Summary ==")?;
        let Some(stats) = &result.statistics else {
            writeln!(out, "No data available")?;
            return Ok(());
        };
        writeln!(
            out,
            "From {} to {}",
            format_timestamp(stats.first_timestamp, self.tz),
            format_timestamp(stats.last_timestamp, self.tz)
        )?;
        writeln!(
            out,
            "{:<16} {:>14} {:>14} {:>14}",
            "Metric", "Average", "Max", "Min"
        )?;
        for metric in Metric::ALL {
            let f = stats.field(metric);
            writeln!(
                out,
                "{:<16} {:>14} {:>14} {:>14}",
                metric.label(),
                format_metric(metric, f.average),
                format_metric(metric, f.max),
                format_metric(metric, f.min)
            )?;
        }

        if let Some(latest) = result.measurements.latest() {
            writeln!(
                out,
                "Latest ({}): AQI {} ({}), PM2.5 {}, travel time {}",
                format_timestamp(latest.timestamp, self.tz),
                format_number(latest.aqi, 0),
                AqiCategory::from_aqi(latest.aqi).label(),
                format_metric(Metric::Pm25, latest.pm2_5),
                format_duration_minutes(latest.duration_minutes)
            )?;
        }
        Ok(())
    }

    // ── JSON ──────────────────────────────────────────────────────────────────

    pub fn render_json(
        &self,
        result: &AnalysisResult,
        actuations: &[ActuationRecord],
    ) -> serde_json::Result<String> {
        let mut map = Map::new();
        map.insert("metadata".into(), serde_json::to_value(&result.metadata)?);
        map.insert("ingest".into(), serde_json::to_value(&result.ingest)?);

        if self.view.shows(View::Summary) {
            map.insert("statistics".into(), serde_json::to_value(&result.statistics)?);
            map.insert(
                "latest".into(),
                serde_json::to_value(result.measurements.latest())?,
            );
        }
        if self.view.shows(View::Alerts) {
            map.insert("alerts".into(), serde_json::to_value(&result.alerts)?);
            map.insert("breaches".into(), serde_json::to_value(&result.breaches)?);
            if !actuations.is_empty() {
                map.insert("actuations".into(), serde_json::to_value(actuations)?);
            }
        }
        if self.view.shows(View::Daily) {
            map.insert("daily".into(), serde_json::to_value(&result.daily)?);
        }
        if self.view.shows(View::Hourly) {
            map.insert("hourly".into(), serde_json::to_value(&result.hourly)?);
        }
        if self.view.shows(View::Insights) {
            map.insert("insights".into(), serde_json::to_value(&result.insights)?);
        }

        serde_json::to_string_pretty(&Value::Object(map))
    }
}

// ── Text sections ─────────────────────────────────────────────────────────────

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "INFO",
        Severity::Warning => "WARN",
        Severity::Error => "ERROR",
        Severity::Success => "OK",
    }
}

fn command_text(cmd: &ActuationCommand) -> String {
    let params: Vec<String> = cmd
        .parameters
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    format!("{} {} ({})", cmd.target_device, cmd.action, params.join(", "))
}

fn alerts_text<W: Write>(out: &mut W, alerts: &[Alert]) -> fmt::Result {
    writeln!(out, "\n== Alerts ==")?;
    if alerts.is_empty() {
        writeln!(out, "No data available")?;
        return Ok(());
    }
    for alert in alerts {
        writeln!(
            out,
            "[{:<5}] {}: {}",
            severity_tag(alert.severity),
            alert.title,
            alert.message
        )?;
        for cmd in &alert.suggested_actions {
            writeln!(out, "        suggest: {}", command_text(cmd))?;
        }
    }
    Ok(())
}

fn actuations_text<W: Write>(out: &mut W, records: &[ActuationRecord]) -> fmt::Result {
    writeln!(out, "\n== Simulated actuation ==")?;
    for record in records {
        let outcome = match &record.outcome {
            ActuationOutcome::Applied { device, state } => format!("{} -> {}", device, state),
            ActuationOutcome::Unchanged { device, state } => {
                format!("{} already {}", device, state)
            }
            ActuationOutcome::Rejected { reason } => format!("rejected: {}", reason),
        };
        writeln!(out, "{}", outcome)?;
    }
    Ok(())
}

fn periods_text<W: Write>(out: &mut W, title: &str, periods: &[PeriodSummary]) -> fmt::Result {
    writeln!(out, "\n== {} ==", title)?;
    if periods.is_empty() {
        writeln!(out, "No data available")?;
        return Ok(());
    }
    writeln!(
        out,
        "{:<17} {:>8} {:>8} {:>8} {:>12} {:>10}  {}",
        "Period", "Readings", "Avg AQI", "Max AQI", "Avg PM2.5", "Avg delay", "Category"
    )?;
    for p in periods {
        let s = &p.statistics;
        writeln!(
            out,
            "{:<17} {:>8} {:>8} {:>8} {:>12} {:>10}  {}",
            p.period_key,
            s.count,
            format_number(s.aqi.average, 0),
            format_number(s.aqi.max, 0),
            format_number(s.pm2_5.average, 1),
            format_duration_minutes(s.duration_minutes.average),
            p.aqi_category.label()
        )?;
    }
    Ok(())
}

fn insights_text<W: Write>(out: &mut W, result: &AnalysisResult) -> fmt::Result {
    writeln!(out, "\n== Insights ==")?;
    let insights = &result.insights;
    let messages = insights.messages();
    if messages.is_empty() {
        writeln!(out, "No notable correlations")?;
    }
    for m in messages {
        writeln!(out, "- {}", m)?;
    }
    let hours = |hs: &[u32]| -> String {
        hs.iter()
            .map(|h| format!("{:02}:00", h))
            .collect::<Vec<_>>()
            .join(", ")
    };
    if !insights.peak_aqi_hours.is_empty() {
        writeln!(out, "Peak AQI hours: {}", hours(&insights.peak_aqi_hours))?;
        writeln!(
            out,
            "Peak traffic hours: {}",
            hours(&insights.peak_traffic_hours)
        )?;
    }
    Ok(())
}
