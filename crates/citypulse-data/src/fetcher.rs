//! Retrieval of CSV resources from disk or over HTTP.
//!
//! A fetch is a single attempt: there are no retries and no timeout. Errors
//! are terminal for the load that asked for them.

use std::fmt;
use std::path::{Path, PathBuf};

use citypulse_core::error::FetchError;
use tracing::{debug, warn};

// ── Source ────────────────────────────────────────────────────────────────────

/// Where a CSV comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A file, or a directory scanned recursively for `*.csv`.
    File(PathBuf),
    Http(String),
}

impl Source {
    /// `http://` and `https://` locators are URLs; anything else is a path.
    pub fn parse(locator: &str) -> Self {
        let trimmed = locator.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Source::Http(trimmed.to_string())
        } else {
            Source::File(PathBuf::from(trimmed))
        }
    }

    /// Expand a directory into its CSV files, sorted by path.
    ///
    /// Files and URLs expand to themselves. A missing path is
    /// [`FetchError::NotFound`].
    pub fn expand(&self) -> Result<Vec<Source>, FetchError> {
        match self {
            Source::Http(_) => Ok(vec![self.clone()]),
            Source::File(path) if path.is_dir() => {
                let files = find_csv_files(path);
                if files.is_empty() {
                    warn!("No CSV files found in {}", path.display());
                }
                Ok(files.into_iter().map(Source::File).collect())
            }
            Source::File(path) if path.exists() => Ok(vec![self.clone()]),
            Source::File(path) => Err(FetchError::NotFound(path.clone())),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Http(url) => f.write_str(url),
        }
    }
}

/// Find all `.csv` files recursively under `dir`, sorted by path.
pub fn find_csv_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

// ── Fetcher ───────────────────────────────────────────────────────────────────

/// Raw bytes of one CSV resource. Decoding happens in the parser so that
/// invalid UTF-8 is reported with a line number.
#[derive(Debug, Clone)]
pub struct FetchedCsv {
    pub source: Source,
    pub body: Vec<u8>,
}

/// Retrieves the full content of a [`Source`].
#[derive(Debug, Clone, Default)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch a single file or URL. Directories must be expanded first.
    pub async fn fetch(&self, source: &Source) -> Result<FetchedCsv, FetchError> {
        let body = match source {
            Source::File(path) => self.fetch_file(path).await?,
            Source::Http(url) => self.fetch_url(url).await?,
        };
        debug!("Fetched {} bytes from {}", body.len(), source);
        Ok(FetchedCsv {
            source: source.clone(),
            body,
        })
    }

    async fn fetch_file(&self, path: &Path) -> Result<Vec<u8>, FetchError> {
        tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(path.to_path_buf())
            } else {
                FetchError::FileRead {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ── Source ────────────────────────────────────────────────────────────────

    #[test]
    fn test_source_parse() {
        assert_eq!(
            Source::parse("https://example.org/data.csv"),
            Source::Http("https://example.org/data.csv".to_string())
        );
        assert_eq!(
            Source::parse(" HTTP://example.org/x.csv "),
            Source::Http("HTTP://example.org/x.csv".to_string())
        );
        assert_eq!(
            Source::parse("data/merged.csv"),
            Source::File(PathBuf::from("data/merged.csv"))
        );
    }

    #[test]
    fn test_expand_directory_sorted_csv_only() {
        let tmp = TempDir::new().expect("tempdir");
        let nested = tmp.path().join("2024");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(tmp.path().join("b.csv"), "timestamp\n").unwrap();
        std::fs::write(nested.join("a.CSV"), "timestamp\n").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();

        let expanded = Source::File(tmp.path().to_path_buf()).expand().unwrap();
        assert_eq!(
            expanded,
            vec![
                Source::File(nested.join("a.CSV")),
                Source::File(tmp.path().join("b.csv")),
            ]
        );
    }

    #[test]
    fn test_expand_missing_path_is_not_found() {
        let tmp = TempDir::new().expect("tempdir");
        let missing = tmp.path().join("nope.csv");
        assert!(matches!(
            Source::File(missing).expand(),
            Err(FetchError::NotFound(_))
        ));
    }

    // ── Fetcher ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_fetch_file_returns_bytes() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("x.csv");
        std::fs::write(&path, "timestamp,aqi\n2024-01-01,10\n").unwrap();

        let fetched = Fetcher::new().fetch(&Source::File(path)).await.unwrap();
        assert_eq!(fetched.body, b"timestamp,aqi\n2024-01-01,10\n");
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let tmp = TempDir::new().expect("tempdir");
        let err = Fetcher::new()
            .fetch(&Source::File(tmp.path().join("absent.csv")))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    /// Serve one canned HTTP response on an ephemeral port.
    async fn serve_once(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}/data.csv", addr)
    }

    #[tokio::test]
    async fn test_fetch_http_success() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\ntimestamp\n",
        )
        .await;
        let fetched = Fetcher::new().fetch(&Source::Http(url)).await.unwrap();
        assert_eq!(fetched.body, b"timestamp\n");
    }

    #[tokio::test]
    async fn test_fetch_http_non_success_status() {
        let url =
            serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        let err = Fetcher::new().fetch(&Source::Http(url)).await.unwrap_err();
        match err {
            FetchError::HttpStatus { status, reason, .. } => {
                assert_eq!(status, 404);
                assert_eq!(reason, "Not Found");
            }
            other => panic!("expected HttpStatus, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_unreachable_url_is_transport_error() {
        // Port 9 on localhost is the discard service; nothing listens there.
        let err = Fetcher::new()
            .fetch(&Source::Http("http://127.0.0.1:9/data.csv".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }
}
