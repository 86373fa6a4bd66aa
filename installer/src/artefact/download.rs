//! Archive download over HTTP.
//!
//! Provides a trait-based abstraction for fetching release archives so the
//! pipeline can be exercised without network access. Every download is a
//! single attempt; retry policy belongs to the caller.

use log::debug;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

/// Size of the buffer used when streaming a response body to disk.
const CHUNK_SIZE: usize = 8192;

/// Trait for downloading release archives.
///
/// Abstractions allow tests to mock HTTP behaviour without network access.
///
/// # Examples
///
/// ```
/// use ga_installer::artefact::download::HttpDownloader;
/// use std::time::Duration;
///
/// let downloader = HttpDownloader::new(Duration::from_secs(30));
/// // Use downloader.download(url, dest) in production
/// # let _ = downloader;
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArtefactDownloader {
    /// Download `url` into the file at `dest`, creating or truncating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server answers with an
    /// error status, the transfer times out, or the file cannot be written.
    fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError>;
}

/// Errors arising from archive downloads.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request failed or the connection broke mid-transfer.
    #[error("download failed for {url}: {reason}")]
    HttpError {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested archive was not found (HTTP 404).
    #[error("archive not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// The transfer did not complete within the configured timeout.
    #[error("download of {url} timed out")]
    Timeout {
        /// The URL that was requested.
        url: String,
    },

    /// I/O error writing the downloaded file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP-based downloader using `ureq`.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl HttpDownloader {
    /// Build a downloader whose requests are bounded by `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl ArtefactDownloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        debug!("GET {url}");
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        let mut file = std::fs::File::create(dest)?;
        let written = copy_body(url, &mut response.into_body().as_reader(), &mut file)?;
        file.flush()?;
        debug!("downloaded {written} bytes from {url}");
        Ok(())
    }
}

/// Stream `body` into `sink`, keeping transport failures apart from local
/// write failures.
fn copy_body(url: &str, body: &mut dyn Read, sink: &mut dyn Write) -> Result<u64, DownloadError> {
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let read = match body.read(&mut buffer) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(map_body_error(url, &e)),
        };
        let Some(chunk) = buffer.get(..read).filter(|chunk| !chunk.is_empty()) else {
            return Ok(total);
        };
        sink.write_all(chunk)?;
        total += chunk.len() as u64;
    }
}

/// Map a ureq error to a [`DownloadError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        ureq::Error::Timeout(_) => DownloadError::Timeout {
            url: url.to_owned(),
        },
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            DownloadError::Timeout {
                url: url.to_owned(),
            }
        }
        other => DownloadError::HttpError {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

/// Map an error raised while reading the response body.
fn map_body_error(url: &str, err: &std::io::Error) -> DownloadError {
    if err.kind() == std::io::ErrorKind::TimedOut {
        DownloadError::Timeout {
            url: url.to_owned(),
        }
    } else {
        DownloadError::HttpError {
            url: url.to_owned(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const URL: &str = "https://example.test/ga-linux-amd64.tar.gz";

    #[test]
    fn map_ureq_error_maps_404_to_not_found() {
        let err = ureq::Error::StatusCode(404);
        let mapped = map_ureq_error(URL, &err);
        assert!(matches!(mapped, DownloadError::NotFound { .. }));
    }

    #[rstest]
    #[case::server_error(500)]
    #[case::forbidden(403)]
    fn map_ureq_error_maps_other_status_to_http_error(#[case] status: u16) {
        let err = ureq::Error::StatusCode(status);
        let mapped = map_ureq_error(URL, &err);
        assert!(matches!(mapped, DownloadError::HttpError { .. }));
    }

    #[test]
    fn map_ureq_error_maps_timed_out_io_to_timeout() {
        let err = ureq::Error::Io(std::io::Error::from(std::io::ErrorKind::TimedOut));
        let mapped = map_ureq_error(URL, &err);
        assert!(matches!(mapped, DownloadError::Timeout { .. }));
    }

    #[test]
    fn copy_body_streams_every_chunk() {
        let payload = vec![7u8; CHUNK_SIZE * 2 + 5];
        let mut sink = Vec::new();
        let written = copy_body(URL, &mut payload.as_slice(), &mut sink).expect("copy");
        assert_eq!(written, payload.len() as u64);
        assert_eq!(sink, payload);
    }

    struct BrokenBody(std::io::ErrorKind);

    impl Read for BrokenBody {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(self.0))
        }
    }

    #[rstest]
    #[case::reset(std::io::ErrorKind::ConnectionReset, false)]
    #[case::stalled(std::io::ErrorKind::TimedOut, true)]
    fn body_read_failures_are_transport_errors(
        #[case] kind: std::io::ErrorKind,
        #[case] is_timeout: bool,
    ) {
        let mut sink = Vec::new();
        let err = copy_body(URL, &mut BrokenBody(kind), &mut sink).expect_err("read fails");
        assert_eq!(matches!(err, DownloadError::Timeout { .. }), is_timeout);
        assert!(!matches!(err, DownloadError::Io(_)));
    }

    /// Interrupts once before each chunk of `data`.
    struct InterruptedBody {
        data: Vec<u8>,
        interrupt_next: bool,
    }

    impl Read for InterruptedBody {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if std::mem::replace(&mut self.interrupt_next, false) {
                return Err(std::io::Error::from(std::io::ErrorKind::Interrupted));
            }
            self.interrupt_next = true;
            let n = buf.len().min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data.drain(..n);
            Ok(n)
        }
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let payload = vec![3u8; CHUNK_SIZE + 9];
        let mut body = InterruptedBody {
            data: payload.clone(),
            interrupt_next: true,
        };
        let mut sink = Vec::new();
        let written = copy_body(URL, &mut body, &mut sink).expect("interrupts are retried");
        assert_eq!(written, payload.len() as u64);
        assert_eq!(sink, payload);
    }
}
