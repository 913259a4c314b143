//! Threshold rules over the latest measurement.
//!
//! The battery is evaluated in [`Rule::ALL`] order. The system rollup comes
//! last and is derived from the alerts produced earlier in the same pass.
//! Suggested actuation commands are descriptive only; see
//! [`crate::actuator`] for the (simulated) dispatch side.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AqiCategory, Measurement, MeasurementSet};

// ── Device vocabulary ─────────────────────────────────────────────────────────

pub const DEVICE_TRAFFIC_LIGHT: &str = "traffic_light";
pub const DEVICE_DIGITAL_SIGN: &str = "digital_sign";
pub const DEVICE_VENTILATION: &str = "ventilation";

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Success,
}

/// Subsystem an alert concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSystem {
    Air,
    Traffic,
    Combined,
    System,
}

/// A suggested (never automatically dispatched) device command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActuationCommand {
    pub target_device: String,
    pub action: String,
    pub parameters: BTreeMap<String, String>,
}

impl ActuationCommand {
    pub fn new(target_device: &str, action: &str) -> Self {
        Self {
            target_device: target_device.to_string(),
            action: action.to_string(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn traffic_light(location: &str, action: &str) -> Self {
        Self::new(DEVICE_TRAFFIC_LIGHT, action).with_param("location", location)
    }

    pub fn ventilation(area: &str, action: &str) -> Self {
        Self::new(DEVICE_VENTILATION, action).with_param("area", area)
    }

    pub fn sign(location: &str, message: &str) -> Self {
        Self::new(DEVICE_DIGITAL_SIGN, "display")
            .with_param("location", location)
            .with_param("message", message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub rule: Rule,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub system: AlertSystem,
    pub suggested_actions: Vec<ActuationCommand>,
}

// ── Thresholds ────────────────────────────────────────────────────────────────

/// Trigger levels for the rule battery. All comparisons are strict (`>`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub pm2_5: f64,
    pub pm10: f64,
    pub no2: f64,
    pub o3: f64,
    pub aqi: f64,
    pub traffic_delay_minutes: f64,
    pub combined_aqi: f64,
    pub combined_delay_minutes: f64,
    pub long_route_km: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pm2_5: 35.0,
            pm10: 150.0,
            no2: 100.0,
            o3: 70.0,
            aqi: 150.0,
            traffic_delay_minutes: 45.0,
            combined_aqi: 100.0,
            combined_delay_minutes: 30.0,
            long_route_km: 20.0,
        }
    }
}

// ── Rule ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Pm25,
    Pm10,
    No2,
    O3,
    Aqi,
    TrafficDelay,
    Combined,
    LongRoute,
    SystemRollup,
}

impl Rule {
    /// Threshold rules in evaluation order. The rollup is not listed: it is
    /// derived from the output of these.
    pub const ALL: [Rule; 8] = [
        Rule::Pm25,
        Rule::Pm10,
        Rule::No2,
        Rule::O3,
        Rule::Aqi,
        Rule::TrafficDelay,
        Rule::Combined,
        Rule::LongRoute,
    ];

    pub fn severity(self) -> Severity {
        match self {
            Rule::Pm25 | Rule::No2 | Rule::O3 | Rule::TrafficDelay => Severity::Warning,
            Rule::Pm10 | Rule::Aqi | Rule::Combined => Severity::Error,
            Rule::LongRoute => Severity::Info,
            // Depends on the pass; Error is the worst case.
            Rule::SystemRollup => Severity::Error,
        }
    }

    pub fn system(self) -> AlertSystem {
        match self {
            Rule::Pm25 | Rule::Pm10 | Rule::No2 | Rule::O3 | Rule::Aqi => AlertSystem::Air,
            Rule::TrafficDelay | Rule::LongRoute => AlertSystem::Traffic,
            Rule::Combined => AlertSystem::Combined,
            Rule::SystemRollup => AlertSystem::System,
        }
    }

    /// Whether the rule fires for `m`. The rollup never fires on its own.
    pub fn fires(self, t: &Thresholds, m: &Measurement) -> bool {
        match self {
            Rule::Pm25 => m.pm2_5 > t.pm2_5,
            Rule::Pm10 => m.pm10 > t.pm10,
            Rule::No2 => m.no2 > t.no2,
            Rule::O3 => m.o3 > t.o3,
            Rule::Aqi => m.aqi > t.aqi,
            Rule::TrafficDelay => m.duration_minutes > t.traffic_delay_minutes,
            Rule::Combined => m.aqi > t.combined_aqi && m.duration_minutes > t.combined_delay_minutes,
            Rule::LongRoute => m.distance_km > t.long_route_km,
            Rule::SystemRollup => false,
        }
    }

    fn alert(self, t: &Thresholds, m: &Measurement) -> Option<Alert> {
        let (title, message, suggested_actions) = match self {
            Rule::Pm25 => (
                "High PM2.5",
                format!("PM2.5 at {:.1} µg/m³ exceeds {:.0} µg/m³", m.pm2_5, t.pm2_5),
                vec![ActuationCommand::ventilation("city_center", "increase")],
            ),
            Rule::Pm10 => (
                "Hazardous PM10",
                format!("PM10 at {:.1} µg/m³ exceeds {:.0} µg/m³", m.pm10, t.pm10),
                vec![
                    ActuationCommand::ventilation("city_center", "increase"),
                    ActuationCommand::sign("main_street", "POOR AIR QUALITY - USE ALTERNATE ROUTES"),
                ],
            ),
            Rule::No2 => (
                "Elevated NO2",
                format!("NO2 at {:.1} exceeds {:.0}", m.no2, t.no2),
                vec![ActuationCommand::traffic_light("main_intersection", "reduce_cycle")],
            ),
            Rule::O3 => (
                "Elevated ozone",
                format!("O3 at {:.1} exceeds {:.0}", m.o3, t.o3),
                vec![ActuationCommand::sign("main_road", "HIGH OZONE - LIMIT OUTDOOR ACTIVITY")],
            ),
            Rule::Aqi => (
                "Unhealthy air quality",
                format!(
                    "AQI at {:.0} ({}) exceeds {:.0}",
                    m.aqi,
                    AqiCategory::from_aqi(m.aqi).label(),
                    t.aqi
                ),
                vec![
                    ActuationCommand::ventilation("city_center", "increase"),
                    ActuationCommand::sign("main_street", "POOR AIR QUALITY - USE ALTERNATE ROUTES"),
                ],
            ),
            Rule::TrafficDelay => (
                "Heavy traffic delay",
                format!(
                    "Travel time of {:.0} min exceeds {:.0} min",
                    m.duration_minutes, t.traffic_delay_minutes
                ),
                vec![
                    ActuationCommand::traffic_light("congested_intersection", "extend_green"),
                    ActuationCommand::sign("highway_entrance", "HEAVY TRAFFIC - USE ALTERNATE ROUTES"),
                ],
            ),
            Rule::Combined => (
                "High pollution and traffic",
                format!(
                    "AQI {:.0} with {:.0} min travel time; consider public transport",
                    m.aqi, m.duration_minutes
                ),
                vec![ActuationCommand::sign(
                    "city_entrance",
                    "HIGH POLLUTION & TRAFFIC - CONSIDER PUBLIC TRANSPORT",
                )],
            ),
            Rule::LongRoute => (
                "Long route",
                format!(
                    "Route of {:.1} km exceeds {:.0} km",
                    m.distance_km, t.long_route_km
                ),
                vec![ActuationCommand::sign("main_road", "DRIVE SAFELY")],
            ),
            // Built by AlertEngine::rollup from the other alerts.
            Rule::SystemRollup => return None,
        };

        Some(Alert {
            rule: self,
            severity: self.severity(),
            title: title.to_string(),
            message,
            system: self.system(),
            suggested_actions,
        })
    }
}

// ── RuleBreach ────────────────────────────────────────────────────────────────

/// How often one rule fired across a whole set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleBreach {
    pub rule: Rule,
    pub count: usize,
    pub last_seen: Option<DateTime<Utc>>,
}

// ── AlertEngine ───────────────────────────────────────────────────────────────

/// Deterministic rule battery built from a [`Thresholds`] value.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertEngine {
    thresholds: Thresholds,
}

impl AlertEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Evaluate the battery against the latest measurement of `set`.
    ///
    /// An empty set yields no alerts at all, not even the rollup.
    pub fn evaluate_alerts(&self, set: &MeasurementSet) -> Vec<Alert> {
        match set.latest() {
            Some(latest) => self.evaluate_measurement(latest),
            None => Vec::new(),
        }
    }

    /// Evaluate the battery, rollup included, against a single measurement.
    pub fn evaluate_measurement(&self, m: &Measurement) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = Rule::ALL
            .into_iter()
            .filter(|rule| rule.fires(&self.thresholds, m))
            .filter_map(|rule| rule.alert(&self.thresholds, m))
            .collect();
        let rollup = Self::rollup(&alerts);
        alerts.push(rollup);
        alerts
    }

    /// Count every rule breach across the whole set, in rule order.
    pub fn breach_summary(&self, set: &MeasurementSet) -> Vec<RuleBreach> {
        Rule::ALL
            .into_iter()
            .map(|rule| {
                let mut count = 0usize;
                let mut last_seen = None;
                for m in set.iter().filter(|m| rule.fires(&self.thresholds, m)) {
                    count += 1;
                    last_seen = Some(m.timestamp);
                }
                RuleBreach {
                    rule,
                    count,
                    last_seen,
                }
            })
            .collect()
    }

    fn rollup(alerts: &[Alert]) -> Alert {
        let errors = count_severity(alerts, Severity::Error);
        let warnings = count_severity(alerts, Severity::Warning);

        let (severity, title, message) = if errors > 0 {
            let noun = if errors == 1 { "issue" } else { "issues" };
            (
                Severity::Error,
                "System status: critical",
                format!("{} critical {}", errors, noun),
            )
        } else if warnings > 0 {
            (
                Severity::Warning,
                "System status: degraded",
                format!("{} warnings active", warnings),
            )
        } else {
            (
                Severity::Success,
                "System status: normal",
                "All systems operating normally".to_string(),
            )
        };

        Alert {
            rule: Rule::SystemRollup,
            severity,
            title: title.to_string(),
            message,
            system: AlertSystem::System,
            suggested_actions: Vec::new(),
        }
    }
}

fn count_severity(alerts: &[Alert], severity: Severity) -> usize {
    alerts.iter().filter(|a| a.severity == severity).count()
}

/// Evaluate the default rule battery against the latest measurement.
pub fn evaluate_alerts(set: &MeasurementSet) -> Vec<Alert> {
    AlertEngine::default().evaluate_alerts(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn calm(hour: u32) -> Measurement {
        Measurement {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap(),
            pm2_5: 10.0,
            pm10: 10.0,
            no2: 10.0,
            o3: 10.0,
            aqi: 40.0,
            distance_km: 5.0,
            duration_minutes: 10.0,
        }
    }

    fn rules(alerts: &[Alert]) -> Vec<Rule> {
        alerts.iter().map(|a| a.rule).collect()
    }

    #[test]
    fn test_only_pm25_fires_plus_warning_rollup() {
        let mut m = calm(0);
        m.pm2_5 = 40.0;
        m.aqi = 60.0;

        let alerts = AlertEngine::default().evaluate_measurement(&m);
        assert_eq!(rules(&alerts), vec![Rule::Pm25, Rule::SystemRollup]);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].system, AlertSystem::Air);
        assert_eq!(alerts[1].severity, Severity::Warning);
        assert_eq!(alerts[1].message, "1 warnings active");
    }

    #[test]
    fn test_combined_fires_without_traffic_delay() {
        let mut m = calm(0);
        m.aqi = 120.0;
        m.duration_minutes = 35.0;

        let alerts = AlertEngine::default().evaluate_measurement(&m);
        assert_eq!(rules(&alerts), vec![Rule::Combined, Rule::SystemRollup]);
        assert_eq!(alerts[0].severity, Severity::Error);
        assert_eq!(alerts[0].system, AlertSystem::Combined);
        assert_eq!(alerts[1].severity, Severity::Error);
        assert_eq!(alerts[1].message, "1 critical issue");
    }

    #[test]
    fn test_all_clear_rollup_is_success() {
        let alerts = AlertEngine::default().evaluate_measurement(&calm(0));
        assert_eq!(rules(&alerts), vec![Rule::SystemRollup]);
        assert_eq!(alerts[0].severity, Severity::Success);
        assert_eq!(alerts[0].system, AlertSystem::System);
    }

    #[test]
    fn test_info_only_rollup_is_success() {
        let mut m = calm(0);
        m.distance_km = 25.0;
        let alerts = AlertEngine::default().evaluate_measurement(&m);
        assert_eq!(rules(&alerts), vec![Rule::LongRoute, Rule::SystemRollup]);
        assert_eq!(alerts[0].severity, Severity::Info);
        assert_eq!(alerts[1].severity, Severity::Success);
    }

    #[test]
    fn test_everything_fires_in_table_order() {
        let m = Measurement {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            pm2_5: 200.0,
            pm10: 200.0,
            no2: 200.0,
            o3: 200.0,
            aqi: 300.0,
            distance_km: 30.0,
            duration_minutes: 60.0,
        };
        let alerts = AlertEngine::default().evaluate_measurement(&m);
        assert_eq!(
            rules(&alerts),
            vec![
                Rule::Pm25,
                Rule::Pm10,
                Rule::No2,
                Rule::O3,
                Rule::Aqi,
                Rule::TrafficDelay,
                Rule::Combined,
                Rule::LongRoute,
                Rule::SystemRollup,
            ]
        );
        // PM10, AQI and Combined are errors.
        assert_eq!(alerts.last().unwrap().message, "3 critical issues");
    }

    #[test]
    fn test_thresholds_are_strict() {
        let mut m = calm(0);
        m.pm2_5 = 35.0;
        m.duration_minutes = 45.0;
        let alerts = AlertEngine::default().evaluate_measurement(&m);
        assert_eq!(rules(&alerts), vec![Rule::SystemRollup]);
    }

    #[test]
    fn test_empty_set_yields_no_alerts() {
        assert!(evaluate_alerts(&MeasurementSet::empty()).is_empty());
    }

    #[test]
    fn test_set_uses_latest_measurement() {
        let mut old = calm(1);
        old.pm10 = 500.0;
        let recent = calm(5);
        // Inserted out of order: the calm 05:00 reading is the latest.
        let set = MeasurementSet::from_unsorted(vec![recent, old]);
        let alerts = evaluate_alerts(&set);
        assert_eq!(rules(&alerts), vec![Rule::SystemRollup]);
        assert_eq!(alerts[0].severity, Severity::Success);
    }

    #[test]
    fn test_custom_thresholds() {
        let engine = AlertEngine::new(Thresholds {
            pm2_5: 5.0,
            ..Thresholds::default()
        });
        let alerts = engine.evaluate_measurement(&calm(0));
        assert_eq!(rules(&alerts), vec![Rule::Pm25, Rule::SystemRollup]);
    }

    #[test]
    fn test_traffic_delay_suggests_extend_green() {
        let mut m = calm(0);
        m.duration_minutes = 50.0;
        let alerts = AlertEngine::default().evaluate_measurement(&m);
        let actions = &alerts[0].suggested_actions;
        assert_eq!(actions[0].target_device, DEVICE_TRAFFIC_LIGHT);
        assert_eq!(actions[0].action, "extend_green");
        assert_eq!(
            actions[0].parameters.get("location").map(String::as_str),
            Some("congested_intersection")
        );
        assert_eq!(actions[1].target_device, DEVICE_DIGITAL_SIGN);
    }

    #[test]
    fn test_breach_summary_counts_every_measurement() {
        let mut a = calm(1);
        a.pm2_5 = 50.0;
        let mut b = calm(2);
        b.pm2_5 = 60.0;
        let c = calm(3);
        let set = MeasurementSet::from_unsorted(vec![a, b, c]);

        let summary = AlertEngine::default().breach_summary(&set);
        assert_eq!(summary.len(), Rule::ALL.len());
        let pm25 = &summary[0];
        assert_eq!(pm25.rule, Rule::Pm25);
        assert_eq!(pm25.count, 2);
        assert_eq!(
            pm25.last_seen,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap())
        );
        assert!(summary[1..].iter().all(|b| b.count == 0));
    }

    #[test]
    fn test_alert_serialises_camel_case() {
        let mut m = calm(0);
        m.pm2_5 = 40.0;
        let alerts = AlertEngine::default().evaluate_measurement(&m);
        let json = serde_json::to_value(&alerts[0]).unwrap();
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["system"], "air");
        assert_eq!(json["suggestedActions"][0]["targetDevice"], "ventilation");
    }
}
