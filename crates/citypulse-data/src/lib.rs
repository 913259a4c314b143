//! Data ingestion layer for citypulse.
//!
//! Fetches CSV exports from disk or HTTP, parses them in chunks, normalises
//! rows into measurements, and runs the analysis pipeline over the result.

pub mod accumulator;
pub mod analysis;
pub mod fetcher;
pub mod insights;
pub mod parser;
pub mod periods;

pub use citypulse_core as core;
