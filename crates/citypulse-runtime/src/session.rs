//! One dashboard load: worker messages in, a frozen measurement set out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use citypulse_core::alerts::{Alert, AlertEngine, RuleBreach};
use citypulse_core::error::{CityPulseError, Result};
use citypulse_core::models::MeasurementSet;
use citypulse_core::normalizer::RowNormalizer;
use citypulse_core::statistics::{get_statistics, Statistics};
use citypulse_data::accumulator::{IngestReport, MeasurementAccumulator};
use citypulse_data::analysis::{analyze_measurements, AnalysisMetadata, AnalysisOptions, AnalysisResult};
use citypulse_data::fetcher::{Fetcher, Source};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::worker::{spawn_parse_worker, WorkerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Loading,
    Ready,
    Failed,
    Cancelled,
}

/// Cancels the in-flight load of a [`DashboardSession`] from another task.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Owns one load of one source.
///
/// A failed or cancelled load leaves no measurements behind: partial chunks
/// are discarded, never exposed.
pub struct DashboardSession {
    source: Source,
    fetcher: Fetcher,
    options: AnalysisOptions,
    cancel_tx: Arc<watch::Sender<bool>>,
    state: SessionState,
    measurements: Option<MeasurementSet>,
    report: Option<IngestReport>,
    load_time: Option<Duration>,
}

impl DashboardSession {
    pub fn new(source: Source, fetcher: Fetcher, options: AnalysisOptions) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            source,
            fetcher,
            options,
            cancel_tx: Arc::new(cancel_tx),
            state: SessionState::Idle,
            measurements: None,
            report: None,
            load_time: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Handle that cancels whichever load is running when it fires.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Drop any loaded data and mark the session cancelled.
    pub fn cancel(&mut self) {
        self.cancel_tx.send_replace(true);
        self.discard(SessionState::Cancelled);
    }

    /// Run one load to completion.
    ///
    /// Chunks are folded in arrival order; the set is frozen on `Complete`.
    pub async fn load(&mut self) -> Result<&MeasurementSet> {
        let mut cancelled = self.cancel_tx.subscribe();
        self.cancel_tx.send_replace(false);
        cancelled.borrow_and_update();

        self.discard(SessionState::Loading);
        let started = Instant::now();
        let (mut rx, worker) = spawn_parse_worker(
            self.source.clone(),
            self.fetcher.clone(),
            self.options.chunk_rows,
        );
        let mut acc = MeasurementAccumulator::new(RowNormalizer::new(self.options.timestamps));

        loop {
            tokio::select! {
                changed = cancelled.changed() => {
                    if changed.is_ok() && *cancelled.borrow_and_update() {
                        worker.abort();
                        info!("Load of {} cancelled", self.source);
                        self.discard(SessionState::Cancelled);
                        return Err(CityPulseError::Cancelled);
                    }
                }
                msg = rx.recv() => match msg {
                    Some(WorkerMessage::Chunk { rows }) => {
                        debug!(rows = rows.len(), "chunk received");
                        acc.ingest_chunk(&rows);
                    }
                    Some(WorkerMessage::Complete) => {
                        let (set, report) = acc.finish(&self.options.window);
                        self.state = SessionState::Ready;
                        self.report = Some(report);
                        self.load_time = Some(started.elapsed());
                        return Ok(self.measurements.insert(set));
                    }
                    Some(WorkerMessage::Error { reason }) => {
                        warn!("Load of {} failed: {}", self.source, reason);
                        self.discard(SessionState::Failed);
                        return Err(reason.into());
                    }
                    None => {
                        self.discard(SessionState::Failed);
                        return Err(CityPulseError::WorkerStopped);
                    }
                },
            }
        }
    }

    fn discard(&mut self, state: SessionState) {
        self.state = state;
        self.measurements = None;
        self.report = None;
        self.load_time = None;
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Loaded measurements; `None` until a load has completed.
    pub fn measurements(&self) -> Option<&MeasurementSet> {
        self.measurements.as_ref()
    }

    pub fn report(&self) -> Option<&IngestReport> {
        self.report.as_ref()
    }

    /// Wall time of the last completed load, fetch included.
    pub fn load_time(&self) -> Option<Duration> {
        self.load_time
    }

    /// `None` when nothing is loaded or the loaded set is empty.
    pub fn statistics(&self) -> Option<Statistics> {
        self.measurements.as_ref().and_then(get_statistics)
    }

    /// Alerts for the latest measurement; empty when nothing is loaded.
    pub fn alerts(&self) -> Vec<Alert> {
        match &self.measurements {
            Some(set) => self.engine().evaluate_alerts(set),
            None => Vec::new(),
        }
    }

    pub fn breach_summary(&self) -> Vec<RuleBreach> {
        match &self.measurements {
            Some(set) => self.engine().breach_summary(set),
            None => Vec::new(),
        }
    }

    /// Full analysis of the loaded data.
    pub fn analysis(&self) -> Option<AnalysisResult> {
        let set = self.measurements.clone()?;
        let report = self.report.clone().unwrap_or_default();
        let metadata = AnalysisMetadata {
            generated_at: Utc::now().to_rfc3339(),
            source: self.source.to_string(),
            window: self.options.window.describe(),
            load_time_seconds: self.load_time.map_or(0.0, |d| d.as_secs_f64()),
        };
        Some(analyze_measurements(set, report, metadata, &self.options))
    }

    fn engine(&self) -> AlertEngine {
        AlertEngine::new(self.options.thresholds)
    }
}
