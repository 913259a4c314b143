//! Incremental CSV parsing into batches of [`RawRow`]s.
//!
//! [`ChunkedCsvParser`] is an iterator of [`ParseEvent`]s: zero or more
//! `Chunk`s followed by exactly one terminal `Complete` or `Error`, after
//! which it yields `None`. Rows across all chunks appear in file order, so
//! concatenating the chunks gives the same rows as [`parse_all`].

use std::io::Read;

use citypulse_core::error::ParseError;
use citypulse_core::models::{CellValue, Column, RawRow};
use tracing::{debug, warn};

/// Rows per chunk unless overridden. Tunable, not a contract.
pub const DEFAULT_CHUNK_ROWS: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    Chunk(Vec<RawRow>),
    Complete,
    Error(ParseError),
}

// ── ChunkedCsvParser ──────────────────────────────────────────────────────────

pub struct ChunkedCsvParser<R> {
    reader: csv::Reader<R>,
    record: csv::StringRecord,
    headers: Option<Vec<String>>,
    chunk_rows: usize,
    /// Error found while a chunk was being filled; emitted after that chunk.
    pending_error: Option<ParseError>,
    finished: bool,
    rows_emitted: u64,
    chunks_emitted: u64,
}

impl<'a> ChunkedCsvParser<&'a [u8]> {
    /// Parse an in-memory CSV document.
    pub fn from_bytes(body: &'a [u8]) -> Self {
        Self::new(body)
    }
}

impl<R: Read> ChunkedCsvParser<R> {
    pub fn new(input: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            // Field-count checks are done here so they carry our line numbers.
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(input);

        Self {
            reader,
            record: csv::StringRecord::new(),
            headers: None,
            chunk_rows: DEFAULT_CHUNK_ROWS,
            pending_error: None,
            finished: false,
            rows_emitted: 0,
            chunks_emitted: 0,
        }
    }

    /// Override the batch size. Zero is treated as one.
    pub fn with_chunk_size(mut self, rows: usize) -> Self {
        self.chunk_rows = rows.max(1);
        self
    }

    /// Header names, once the first event has been pulled.
    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    /// Known columns absent from the header, once the header has been read.
    pub fn missing_columns(&self) -> Vec<Column> {
        match &self.headers {
            Some(headers) => missing_columns(headers),
            None => Vec::new(),
        }
    }

    fn read_headers(&mut self) -> Result<(), ParseError> {
        let headers: Vec<String> = self
            .reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let missing = missing_columns(&headers);
        if !headers.is_empty() && !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|c| c.header()).collect();
            warn!("CSV header is missing columns: {}", names.join(", "));
        }

        self.headers = Some(headers);
        Ok(())
    }

    /// Fill one chunk. Returns the rows read so far and, if reading stopped
    /// on a failure, the error.
    fn fill_chunk(&mut self) -> (Vec<RawRow>, Option<ParseError>) {
        let mut rows = Vec::new();
        let headers = match &self.headers {
            Some(h) => h.clone(),
            None => return (rows, None),
        };

        while rows.len() < self.chunk_rows {
            match self.reader.read_record(&mut self.record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => return (rows, Some(csv_error(e))),
            }

            let line = self.record.position().map(|p| p.line()).unwrap_or(0);
            if self.record.iter().all(str::is_empty) {
                continue;
            }
            if self.record.len() != headers.len() {
                let err = ParseError::new(
                    Some(line),
                    format!(
                        "expected {} fields, found {}",
                        headers.len(),
                        self.record.len()
                    ),
                );
                return (rows, Some(err));
            }

            let mut row = RawRow::new(line);
            for (name, field) in headers.iter().zip(self.record.iter()) {
                if name.is_empty() {
                    continue;
                }
                if let Some(value) = CellValue::from_field(field) {
                    row.set(name, value);
                }
            }
            rows.push(row);
        }

        (rows, None)
    }

    fn finish(&mut self, event: ParseEvent) -> Option<ParseEvent> {
        self.finished = true;
        match &event {
            ParseEvent::Complete => debug!(
                rows = self.rows_emitted,
                chunks = self.chunks_emitted,
                "CSV parse complete"
            ),
            ParseEvent::Error(e) => debug!(rows = self.rows_emitted, "CSV parse failed: {}", e),
            ParseEvent::Chunk(_) => {}
        }
        Some(event)
    }
}

impl<R: Read> Iterator for ChunkedCsvParser<R> {
    type Item = ParseEvent;

    fn next(&mut self) -> Option<ParseEvent> {
        if self.finished {
            return None;
        }
        if let Some(err) = self.pending_error.take() {
            return self.finish(ParseEvent::Error(err));
        }
        if self.headers.is_none() {
            if let Err(err) = self.read_headers() {
                return self.finish(ParseEvent::Error(err));
            }
        }

        let (rows, error) = self.fill_chunk();
        if rows.is_empty() {
            return match error {
                Some(err) => self.finish(ParseEvent::Error(err)),
                None => self.finish(ParseEvent::Complete),
            };
        }

        self.pending_error = error;
        self.rows_emitted += rows.len() as u64;
        self.chunks_emitted += 1;
        debug!(rows = rows.len(), chunk = self.chunks_emitted, "CSV chunk parsed");
        Some(ParseEvent::Chunk(rows))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Parse a whole document in one pass, without chunking.
pub fn parse_all<R: Read>(input: R) -> Result<Vec<RawRow>, ParseError> {
    let mut rows = Vec::new();
    for event in ChunkedCsvParser::new(input).with_chunk_size(usize::MAX) {
        match event {
            ParseEvent::Chunk(chunk) => rows.extend(chunk),
            ParseEvent::Complete => break,
            ParseEvent::Error(e) => return Err(e),
        }
    }
    Ok(rows)
}

/// Known columns not present in `headers`, in canonical order.
pub fn missing_columns(headers: &[String]) -> Vec<Column> {
    Column::REQUIRED
        .into_iter()
        .filter(|c| !headers.iter().any(|h| h == c.header()))
        .collect()
}

fn csv_error(err: csv::Error) -> ParseError {
    let line = err.position().map(|p| p.line());
    let message = match err.kind() {
        csv::ErrorKind::Utf8 { err, .. } => format!("invalid UTF-8: {}", err),
        _ => err.to_string(),
    };
    ParseError::new(line, message)
}
