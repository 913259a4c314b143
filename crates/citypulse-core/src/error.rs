use std::path::PathBuf;
use thiserror::Error;

/// A CSV resource could not be retrieved.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The local path does not exist.
    #[error("Data source not found: {0}")]
    NotFound(PathBuf),

    /// A local file could not be opened or read.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The server answered with a non-success status.
    #[error("Failed to fetch CSV from {url}: {status} {reason}")]
    HttpStatus {
        url: String,
        status: u16,
        reason: String,
    },

    /// The request never produced a response (DNS, TLS, connection reset...).
    #[error("Failed to fetch CSV from {url}: {message}")]
    Transport { url: String, message: String },
}

/// Malformed CSV input. Terminal for the current parse operation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to parse CSV data{}: {message}", line_suffix(.line))]
pub struct ParseError {
    /// 1-based line number of the offending record, when known.
    pub line: Option<u64>,
    /// Human-readable diagnostic.
    pub message: String,
}

impl ParseError {
    pub fn new(line: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

fn line_suffix(line: &Option<u64>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}

/// Why a structurally valid row was dropped during normalisation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("row has no timestamp")]
    MissingTimestamp,

    #[error("unparseable timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Terminal failure of one load operation (fetch or parse stage).
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// All errors produced by citypulse.
#[derive(Error, Debug)]
pub enum CityPulseError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The background parse worker went away without a terminal message.
    #[error("Parse worker stopped before completion")]
    WorkerStopped,

    /// The load was cancelled before it finished.
    #[error("Load cancelled")]
    Cancelled,

    /// A JSON document could not be produced or parsed.
    #[error("Failed to process JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<LoadError> for CityPulseError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Fetch(e) => CityPulseError::Fetch(e),
            LoadError::Parse(e) => CityPulseError::Parse(e),
        }
    }
}

/// Convenience alias used throughout the citypulse crates.
pub type Result<T> = std::result::Result<T, CityPulseError>;
