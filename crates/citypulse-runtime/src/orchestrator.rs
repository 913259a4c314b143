//! Periodic refresh for `--watch`.
//!
//! Runs a fresh [`DashboardSession`] on every tick in a tokio task and sends
//! a [`DashboardSnapshot`] through an `mpsc` channel. Sessions never share
//! state: each refresh starts from an empty accumulator.

use std::time::Duration;

use chrono::{DateTime, Utc};
use citypulse_core::window::DateWindow;
use citypulse_data::analysis::{AnalysisOptions, AnalysisResult};
use citypulse_data::fetcher::{Fetcher, Source};
use tokio::sync::mpsc;
use tokio::time;

use crate::session::DashboardSession;

// ── Public types ──────────────────────────────────────────────────────────────

/// Outcome of one refresh.
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    /// 1 for the initial load, then increasing.
    pub sequence: u64,
    pub refreshed_at: DateTime<Utc>,
    /// The load error's message on failure.
    pub result: std::result::Result<AnalysisResult, String>,
}

// ── RefreshOrchestrator ───────────────────────────────────────────────────────

pub struct RefreshOrchestrator {
    source: Source,
    fetcher: Fetcher,
    options: AnalysisOptions,
    interval: Duration,
}

impl RefreshOrchestrator {
    pub fn new(source: Source, fetcher: Fetcher, options: AnalysisOptions, interval: Duration) -> Self {
        Self {
            source,
            fetcher,
            options,
            interval,
        }
    }

    /// Spawn the refresh loop. The first snapshot is produced immediately.
    pub fn start(self) -> (mpsc::Receiver<DashboardSnapshot>, RefreshHandle) {
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(async move {
            self.refresh_loop(tx).await;
        });

        (rx, RefreshHandle { handle })
    }

    // ── Private implementation ────────────────────────────────────────────

    /// Exits when the receiver is dropped.
    async fn refresh_loop(self, tx: mpsc::Sender<DashboardSnapshot>) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let mut sequence = 0u64;

        loop {
            interval.tick().await;
            if tx.is_closed() {
                tracing::debug!("refresh channel closed; exiting loop");
                break;
            }

            sequence += 1;
            let snapshot = self.refresh(sequence).await;
            if tx.send(snapshot).await.is_err() {
                tracing::debug!("refresh receiver dropped; exiting loop");
                break;
            }
        }
    }

    async fn refresh(&self, sequence: u64) -> DashboardSnapshot {
        let refreshed_at = Utc::now();
        let mut options = self.options;
        // A window anchored at "now" moves with every refresh.
        if let DateWindow::TrailingFromNow { days, .. } = options.window {
            options.window = DateWindow::TrailingFromNow {
                days,
                now: refreshed_at,
            };
        }

        let mut session = DashboardSession::new(self.source.clone(), self.fetcher.clone(), options);
        let result = match session.load().await {
            Ok(_) => session
                .analysis()
                .ok_or_else(|| "load finished without data".to_string()),
            Err(e) => {
                tracing::warn!(sequence, "refresh failed: {}", e);
                Err(e.to_string())
            }
        };

        DashboardSnapshot {
            sequence,
            refreshed_at,
            result,
        }
    }
}

// ── RefreshHandle ─────────────────────────────────────────────────────────────

/// Drop the receiver or call [`RefreshHandle::abort`] to stop the loop.
pub struct RefreshHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl RefreshHandle {
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "timestamp,pm2_5,pm10,no2,o3,aqi,distance_km,duration_in_traffic_min";

    async fn next(rx: &mut mpsc::Receiver<DashboardSnapshot>) -> DashboardSnapshot {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("channel closed before receiving snapshot")
    }

    #[tokio::test]
    async fn test_sends_initial_snapshot_then_picks_up_changes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.csv");
        std::fs::write(&path, format!("{}\n2024-01-01 00:00:00,1,1,1,1,1,1,1\n", HEADER)).unwrap();

        let orch = RefreshOrchestrator::new(
            Source::File(path.clone()),
            Fetcher::new(),
            AnalysisOptions::default(),
            Duration::from_millis(50),
        );
        let (mut rx, handle) = orch.start();

        let first = next(&mut rx).await;
        assert_eq!(first.sequence, 1);
        assert_eq!(first.result.as_ref().unwrap().measurements.len(), 1);

        std::fs::write(
            &path,
            format!(
                "{}\n2024-01-01 00:00:00,1,1,1,1,1,1,1\n2024-01-01 01:00:00,1,1,1,1,1,1,1\n",
                HEADER
            ),
        )
        .unwrap();

        let mut latest = next(&mut rx).await;
        while latest.result.as_ref().map(|r| r.measurements.len()).unwrap_or(0) < 2 {
            latest = next(&mut rx).await;
        }
        assert!(latest.sequence >= 2);

        handle.abort();
    }

    #[tokio::test]
    async fn test_failed_refresh_is_reported_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let orch = RefreshOrchestrator::new(
            Source::File(tmp.path().join("missing.csv")),
            Fetcher::new(),
            AnalysisOptions::default(),
            Duration::from_millis(20),
        );
        let (mut rx, handle) = orch.start();

        let first = next(&mut rx).await;
        assert!(first.result.unwrap_err().contains("not found"));
        let second = next(&mut rx).await;
        assert_eq!(second.sequence, 2);

        handle.abort();
    }

    #[tokio::test]
    async fn test_loop_exits_when_receiver_dropped() {
        let tmp = TempDir::new().unwrap();
        let orch = RefreshOrchestrator::new(
            Source::File(tmp.path().join("missing.csv")),
            Fetcher::new(),
            AnalysisOptions::default(),
            Duration::from_millis(10),
        );
        let (rx, handle) = orch.start();
        drop(rx);

        for _ in 0..100 {
            if handle.is_finished() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("refresh loop kept running without a receiver");
    }
}
