//! Runtime layer for citypulse.
//!
//! Background parse worker, cancellable dashboard sessions, and the periodic
//! refresh loop used by watch mode.

pub mod orchestrator;
pub mod session;
pub mod worker;

pub use citypulse_core as core;
pub use citypulse_data as data;
