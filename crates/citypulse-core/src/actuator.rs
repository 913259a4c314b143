//! Simulated dispatch of suggested actuation commands.
//!
//! Alerts only *suggest* commands. Nothing here is called by the rule engine;
//! a caller must opt in (the `--simulate-actuation` flag) to feed suggestions
//! through an [`Actuator`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::alerts::{ActuationCommand, DEVICE_DIGITAL_SIGN, DEVICE_TRAFFIC_LIGHT, DEVICE_VENTILATION};

/// Modes a traffic light accepts.
pub const TRAFFIC_LIGHT_ACTIONS: &[&str] = &["extend_green", "reduce_cycle", "normal"];
/// Levels a ventilation system accepts.
pub const VENTILATION_ACTIONS: &[&str] = &["increase", "decrease", "normal"];
/// Actions a digital sign accepts.
pub const SIGN_ACTIONS: &[&str] = &["display", "clear"];

// ── ActuationOutcome ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ActuationOutcome {
    /// The device state changed.
    Applied { device: String, state: String },
    /// The device was already in the requested state.
    Unchanged { device: String, state: String },
    Rejected { reason: String },
}

impl ActuationOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, ActuationOutcome::Rejected { .. })
    }
}

/// Something that can carry out an [`ActuationCommand`].
pub trait Actuator {
    fn apply(&mut self, command: &ActuationCommand) -> ActuationOutcome;

    /// Apply commands in order, collecting one outcome per command.
    fn apply_all(&mut self, commands: &[ActuationCommand]) -> Vec<ActuationOutcome> {
        commands.iter().map(|c| self.apply(c)).collect()
    }
}

// ── SimulatedActuator ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuationRecord {
    pub at: DateTime<Utc>,
    pub command: ActuationCommand,
    pub outcome: ActuationOutcome,
}

/// In-memory device model keyed by location / area.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatedActuator {
    traffic_lights: BTreeMap<String, String>,
    signs: BTreeMap<String, String>,
    ventilation: BTreeMap<String, String>,
    history: Vec<ActuationRecord>,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mode of the traffic light at `location`, `"normal"` if untouched.
    pub fn traffic_light(&self, location: &str) -> &str {
        self.traffic_lights
            .get(location)
            .map(String::as_str)
            .unwrap_or("normal")
    }

    pub fn sign(&self, location: &str) -> Option<&str> {
        self.signs.get(location).map(String::as_str)
    }

    /// Current ventilation level for `area`, `"normal"` if untouched.
    pub fn ventilation(&self, area: &str) -> &str {
        self.ventilation
            .get(area)
            .map(String::as_str)
            .unwrap_or("normal")
    }

    pub fn history(&self) -> &[ActuationRecord] {
        &self.history
    }

    fn dispatch(&mut self, command: &ActuationCommand) -> ActuationOutcome {
        let param = |key: &str| command.parameters.get(key).map(String::as_str);

        match command.target_device.as_str() {
            DEVICE_TRAFFIC_LIGHT => {
                let Some(location) = param("location") else {
                    return rejected("traffic_light command needs a location");
                };
                if !TRAFFIC_LIGHT_ACTIONS.contains(&command.action.as_str()) {
                    return rejected(format!("unknown traffic_light action {}", command.action));
                }
                set_state(
                    &mut self.traffic_lights,
                    format!("traffic_light:{}", location),
                    location,
                    &command.action,
                )
            }
            DEVICE_VENTILATION => {
                let Some(area) = param("area") else {
                    return rejected("ventilation command needs an area");
                };
                if !VENTILATION_ACTIONS.contains(&command.action.as_str()) {
                    return rejected(format!("unknown ventilation action {}", command.action));
                }
                set_state(
                    &mut self.ventilation,
                    format!("ventilation:{}", area),
                    area,
                    &command.action,
                )
            }
            DEVICE_DIGITAL_SIGN => {
                let Some(location) = param("location") else {
                    return rejected("digital_sign command needs a location");
                };
                let device = format!("digital_sign:{}", location);
                match command.action.as_str() {
                    "display" => {
                        let Some(message) = param("message") else {
                            return rejected("display needs a message");
                        };
                        set_state(&mut self.signs, device, location, message)
                    }
                    "clear" => match self.signs.remove(location) {
                        Some(_) => ActuationOutcome::Applied {
                            device,
                            state: String::new(),
                        },
                        None => ActuationOutcome::Unchanged {
                            device,
                            state: String::new(),
                        },
                    },
                    other => rejected(format!("unknown digital_sign action {}", other)),
                }
            }
            other => rejected(format!("unknown device {}", other)),
        }
    }
}

impl Actuator for SimulatedActuator {
    fn apply(&mut self, command: &ActuationCommand) -> ActuationOutcome {
        let outcome = self.dispatch(command);
        match &outcome {
            ActuationOutcome::Applied { device, state } => {
                info!(device = %device, state = %state, "simulated actuation applied")
            }
            ActuationOutcome::Unchanged { .. } => {}
            ActuationOutcome::Rejected { reason } => {
                warn!(reason = %reason, "simulated actuation rejected")
            }
        }
        self.history.push(ActuationRecord {
            at: Utc::now(),
            command: command.clone(),
            outcome: outcome.clone(),
        });
        outcome
    }
}

fn set_state(
    states: &mut BTreeMap<String, String>,
    device: String,
    key: &str,
    value: &str,
) -> ActuationOutcome {
    let state = value.to_string();
    match states.insert(key.to_string(), state.clone()) {
        Some(prev) if prev == state => ActuationOutcome::Unchanged { device, state },
        _ => ActuationOutcome::Applied { device, state },
    }
}

fn rejected(reason: impl Into<String>) -> ActuationOutcome {
    ActuationOutcome::Rejected {
        reason: reason.into(),
    }
}
