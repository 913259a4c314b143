use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CityPulseError, Result};
use crate::timestamp::{resolve_timezone, TimestampParser};
use crate::window::DateWindow;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Air quality and traffic dashboard for city sensor exports
#[derive(Parser, Debug, Clone)]
#[command(
    name = "citypulse",
    about = "Air quality and traffic dashboard for city sensor exports",
    version
)]
pub struct Settings {
    /// CSV file, directory of CSV files, or http(s) URL
    #[arg(long)]
    pub source: Option<String>,

    /// Timezone for timestamps without an offset (IANA name or "auto")
    #[arg(long, default_value = "UTC")]
    pub timezone: String,

    /// Keep only the last N days of data
    #[arg(long)]
    pub window_days: Option<u32>,

    /// Where a --window-days window ends
    #[arg(long, default_value = "latest", value_parser = ["latest", "now"])]
    pub window_anchor: String,

    /// Keep data at or after this time
    #[arg(long)]
    pub from: Option<String>,

    /// Keep data at or before this time (a bare date includes the whole day)
    #[arg(long)]
    pub to: Option<String>,

    /// Report section(s) to show
    #[arg(long, default_value = "summary", value_parser = ["summary", "alerts", "daily", "hourly", "insights", "all"])]
    pub view: String,

    /// Output format
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

    /// Reload the source periodically until interrupted
    #[arg(long)]
    pub watch: bool,

    /// Refresh interval in seconds for --watch (1-3600)
    #[arg(long, default_value = "300", value_parser = clap::value_parser!(u32).range(1..=3600))]
    pub refresh_secs: u32,

    /// Run suggested actuation commands through the device simulator
    #[arg(long)]
    pub simulate_actuation: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.citypulse/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_anchor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl LastUsedParams {
    /// `~/.citypulse/last_used.json`
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".citypulse").join("last_used.json")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Returns `Default` when the file is absent or unreadable.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Atomically write params to `path`, creating parent directories.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    pub fn clear() -> Result<()> {
        Self::clear_at(&Self::config_path())
    }

    pub fn clear_at(path: &std::path::Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, fill unset values from the last run, resolve
    /// `"auto"`, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Testable core of [`Settings::load_with_last_used`].
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!("could not clear {}: {}", config_path.display(), e);
            }
            return settings.resolve_auto_values();
        }

        let last = LastUsedParams::load_from(config_path);

        // Arg ids are field names (underscores), not flag spellings.
        if !is_arg_explicitly_set(&matches, "source") && settings.source.is_none() {
            settings.source = last.source;
        }
        if !is_arg_explicitly_set(&matches, "timezone") {
            if let Some(v) = last.timezone {
                settings.timezone = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "window_days") && settings.window_days.is_none() {
            settings.window_days = last.window_days;
        }
        if !is_arg_explicitly_set(&matches, "window_anchor") {
            if let Some(v) = last.window_anchor {
                settings.window_anchor = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "view") {
            if let Some(v) = last.view {
                settings.view = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "format") {
            if let Some(v) = last.format {
                settings.format = v;
            }
        }

        settings = settings.resolve_auto_values();

        if let Err(e) = LastUsedParams::from(&settings).save_to(config_path) {
            tracing::warn!("could not persist settings to {}: {}", config_path.display(), e);
        }

        settings
    }

    fn resolve_auto_values(mut self) -> Self {
        if self.timezone.eq_ignore_ascii_case("auto") {
            self.timezone = crate::timestamp::get_system_timezone();
        }
        if self.debug {
            self.log_level = "DEBUG".to_string();
        }
        self
    }

    /// Parser for timestamps without an offset, in `--timezone`.
    pub fn timestamp_parser(&self) -> TimestampParser {
        TimestampParser::new(resolve_timezone(&self.timezone))
    }

    /// Build the date window from `--from`/`--to` (which take precedence) or
    /// `--window-days`/`--window-anchor`.
    pub fn date_window(&self, now: DateTime<Utc>) -> Result<DateWindow> {
        if self.from.is_some() || self.to.is_some() {
            let parser = self.timestamp_parser();
            let start = match &self.from {
                Some(s) => parse_bound(&parser, s, false)?,
                None => DateTime::<Utc>::MIN_UTC,
            };
            let end = match &self.to {
                Some(s) => parse_bound(&parser, s, true)?,
                None => DateTime::<Utc>::MAX_UTC,
            };
            if start > end {
                return Err(CityPulseError::Config(format!(
                    "--from ({}) is after --to ({})",
                    start, end
                )));
            }
            return Ok(DateWindow::Between { start, end });
        }

        Ok(match (self.window_days, self.window_anchor.as_str()) {
            (None, _) => DateWindow::All,
            (Some(days), "now") => DateWindow::TrailingFromNow { days, now },
            (Some(days), _) => DateWindow::TrailingFromLatest { days },
        })
    }

    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.refresh_secs))
    }
}

/// A bare date as an upper bound covers the whole day.
fn parse_bound(parser: &TimestampParser, s: &str, upper: bool) -> Result<DateTime<Utc>> {
    let ts = parser
        .parse_str(s)
        .ok_or_else(|| CityPulseError::Config(format!("unrecognised date/time: {}", s)))?;
    let date_only = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").is_ok();
    if upper && date_only {
        return Ok(ts + Duration::days(1) - Duration::milliseconds(1));
    }
    Ok(ts)
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            source: s.source.clone(),
            timezone: Some(s.timezone.clone()),
            window_days: s.window_days,
            window_anchor: Some(s.window_anchor.clone()),
            view: Some(s.view.clone()),
            format: Some(s.format.clone()),
        }
    }
}

/// `true` when `name` was supplied on the command line (not a default).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn tmp_config_path(tmp: &TempDir) -> PathBuf {
        LastUsedParams::config_path_in(tmp.path())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    // ── LastUsedParams ────────────────────────────────────────────────────────

    #[test]
    fn test_last_used_params_save_load() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        let params = LastUsedParams {
            source: Some("data/merged.csv".to_string()),
            timezone: Some("Asia/Kolkata".to_string()),
            window_days: Some(7),
            window_anchor: Some("latest".to_string()),
            view: Some("alerts".to_string()),
            format: Some("json".to_string()),
        };
        params.save_to(&path).expect("save");
        assert_eq!(LastUsedParams::load_from(&path), params);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_last_used_params_corrupt_file_is_default() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(LastUsedParams::load_from(&path), LastUsedParams::default());
    }

    #[test]
    fn test_last_used_params_clear() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&path).expect("save");
        LastUsedParams::clear_at(&path).expect("clear");
        assert!(!path.exists());
        // Clearing twice is fine.
        LastUsedParams::clear_at(&path).expect("clear again");
    }

    // ── CLI parsing ───────────────────────────────────────────────────────────

    #[test]
    fn test_settings_default_values() {
        let s = Settings::parse_from(["citypulse"]);
        assert!(s.source.is_none());
        assert_eq!(s.timezone, "UTC");
        assert!(s.window_days.is_none());
        assert_eq!(s.window_anchor, "latest");
        assert_eq!(s.view, "summary");
        assert_eq!(s.format, "text");
        assert!(!s.watch);
        assert_eq!(s.refresh_secs, 300);
        assert!(!s.simulate_actuation);
        assert_eq!(s.log_level, "INFO");
        assert!(!s.debug);
        assert!(!s.clear);
    }

    #[test]
    fn test_settings_rejects_out_of_range_refresh() {
        assert!(Settings::try_parse_from(["citypulse", "--refresh-secs", "0"]).is_err());
        assert!(Settings::try_parse_from(["citypulse", "--refresh-secs", "3601"]).is_err());
        assert!(Settings::try_parse_from(["citypulse", "--view", "weekly"]).is_err());
    }

    // ── load_with_last_used ───────────────────────────────────────────────────

    #[test]
    fn test_load_with_last_used_merges_persisted_values() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams {
            source: Some("saved.csv".to_string()),
            view: Some("daily".to_string()),
            window_days: Some(7),
            ..Default::default()
        }
        .save_to(&path)
        .expect("save");

        let s = Settings::load_with_last_used_impl(vec!["citypulse".into()], &path);
        assert_eq!(s.source.as_deref(), Some("saved.csv"));
        assert_eq!(s.view, "daily");
        assert_eq!(s.window_days, Some(7));
    }

    #[test]
    fn test_load_with_last_used_cli_overrides_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams {
            view: Some("daily".to_string()),
            ..Default::default()
        }
        .save_to(&path)
        .expect("save");

        let s = Settings::load_with_last_used_impl(
            vec!["citypulse".into(), "--view".into(), "alerts".into()],
            &path,
        );
        assert_eq!(s.view, "alerts");
        assert_eq!(LastUsedParams::load_from(&path).view.as_deref(), Some("alerts"));
    }

    #[test]
    fn test_load_with_last_used_clear_removes_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&path).expect("save");

        Settings::load_with_last_used_impl(vec!["citypulse".into(), "--clear".into()], &path);
        assert!(!path.exists());
    }

    #[test]
    fn test_load_with_last_used_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let s = Settings::load_with_last_used_impl(
            vec!["citypulse".into(), "--debug".into()],
            &tmp_config_path(&tmp),
        );
        assert_eq!(s.log_level, "DEBUG");
    }

    // ── date_window ───────────────────────────────────────────────────────────

    #[test]
    fn test_date_window_default_is_all() {
        let s = Settings::parse_from(["citypulse"]);
        assert_eq!(s.date_window(now()).unwrap(), DateWindow::All);
    }

    #[test]
    fn test_date_window_trailing_variants() {
        let s = Settings::parse_from(["citypulse", "--window-days", "7"]);
        assert_eq!(
            s.date_window(now()).unwrap(),
            DateWindow::TrailingFromLatest { days: 7 }
        );

        let s = Settings::parse_from(["citypulse", "--window-days", "3", "--window-anchor", "now"]);
        assert_eq!(
            s.date_window(now()).unwrap(),
            DateWindow::TrailingFromNow { days: 3, now: now() }
        );
    }

    #[test]
    fn test_date_window_between_with_bare_dates() {
        let s = Settings::parse_from(["citypulse", "--from", "2024-03-01", "--to", "2024-03-02"]);
        let DateWindow::Between { start, end } = s.date_window(now()).unwrap() else {
            panic!("expected Between");
        };
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2024, 3, 2, 23, 59, 59).unwrap() + Duration::milliseconds(999)
        );
    }

    #[test]
    fn test_date_window_rejects_bad_input() {
        let s = Settings::parse_from(["citypulse", "--from", "yesterday"]);
        assert!(matches!(s.date_window(now()), Err(CityPulseError::Config(_))));

        let s = Settings::parse_from(["citypulse", "--from", "2024-03-05", "--to", "2024-03-01"]);
        assert!(s.date_window(now()).is_err());
    }
}
