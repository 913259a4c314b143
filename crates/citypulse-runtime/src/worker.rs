//! Background parse worker.
//!
//! The worker fetches a [`Source`], parses it on the blocking pool, and
//! reports over a bounded channel: any number of `Chunk`s, then exactly one
//! `Complete` or `Error`. Dropping the receiver stops the worker at its next
//! send.

use citypulse_core::error::LoadError;
use citypulse_core::models::RawRow;
use citypulse_data::fetcher::{Fetcher, Source};
use citypulse_data::parser::{ChunkedCsvParser, ParseEvent};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Messages in flight at once between worker and consumer.
pub const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug)]
pub enum WorkerMessage {
    Chunk { rows: Vec<RawRow> },
    Complete,
    Error { reason: LoadError },
}

/// Handle to a running worker. Aborts the task when dropped.
#[derive(Debug)]
pub struct WorkerHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start a worker for `source`.
pub fn spawn_parse_worker(
    source: Source,
    fetcher: Fetcher,
    chunk_rows: usize,
) -> (mpsc::Receiver<WorkerMessage>, WorkerHandle) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let handle = tokio::spawn(async move {
        run(source, fetcher, chunk_rows, tx).await;
    });
    (rx, WorkerHandle { handle })
}

enum StreamOutcome {
    Finished,
    ReceiverGone,
    Failed(LoadError),
}

async fn run(source: Source, fetcher: Fetcher, chunk_rows: usize, tx: mpsc::Sender<WorkerMessage>) {
    let parts = match source.expand() {
        Ok(parts) => parts,
        Err(e) => {
            send_error(&tx, e.into()).await;
            return;
        }
    };

    for part in parts {
        let fetched = match fetcher.fetch(&part).await {
            Ok(f) => f,
            Err(e) => {
                warn!("Failed to fetch {}: {}", part, e);
                send_error(&tx, e.into()).await;
                return;
            }
        };

        let chunk_tx = tx.clone();
        let joined = tokio::task::spawn_blocking(move || {
            stream_chunks(&fetched.body, chunk_rows, &chunk_tx)
        })
        .await;

        match joined {
            Ok(StreamOutcome::Finished) => debug!("Finished parsing {}", part),
            Ok(StreamOutcome::ReceiverGone) => {
                debug!("Worker receiver dropped; stopping");
                return;
            }
            Ok(StreamOutcome::Failed(e)) => {
                send_error(&tx, e).await;
                return;
            }
            // The consumer sees the channel close and reports a stopped worker.
            Err(e) => {
                warn!("Parse task failed: {}", e);
                return;
            }
        }
    }

    let _ = tx.send(WorkerMessage::Complete).await;
}

/// Runs on the blocking pool; `blocking_send` provides the backpressure.
fn stream_chunks(body: &[u8], chunk_rows: usize, tx: &mpsc::Sender<WorkerMessage>) -> StreamOutcome {
    for event in ChunkedCsvParser::from_bytes(body).with_chunk_size(chunk_rows) {
        match event {
            ParseEvent::Chunk(rows) => {
                if tx.blocking_send(WorkerMessage::Chunk { rows }).is_err() {
                    return StreamOutcome::ReceiverGone;
                }
            }
            ParseEvent::Complete => return StreamOutcome::Finished,
            ParseEvent::Error(e) => return StreamOutcome::Failed(e.into()),
        }
    }
    StreamOutcome::Finished
}

async fn send_error(tx: &mpsc::Sender<WorkerMessage>, reason: LoadError) {
    let _ = tx.send(WorkerMessage::Error { reason }).await;
}
