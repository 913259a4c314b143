//! Domain layer for the citypulse dashboard.
//!
//! Models, timestamp handling, row normalisation, statistics, the alert rule
//! engine and configuration. Nothing in this crate performs I/O beyond the
//! last-used settings file.

pub mod actuator;
pub mod alerts;
pub mod error;
pub mod formatting;
pub mod models;
pub mod normalizer;
pub mod settings;
pub mod statistics;
pub mod timestamp;
pub mod window;

pub use alerts::{evaluate_alerts, Alert, AlertEngine, Severity, Thresholds};
pub use error::{CityPulseError, Result};
pub use models::{Measurement, MeasurementSet};
pub use statistics::{get_statistics, Statistics};
pub use window::DateWindow;
