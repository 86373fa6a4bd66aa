//! Error types for the `ga` installer.
//!
//! Every pipeline stage has its own typed failure; this module rolls them
//! into [`InstallError`] without flattening them into strings. Only
//! [`ProbeError`](crate::probe::ProbeError) stays outside this taxonomy,
//! because a failed probe never aborts an install.

use crate::artefact::download::DownloadError;
use crate::artefact::extraction::ExtractionError;
use crate::artefact::verification::FetchError;
use crate::config::ConfigError;
use crate::pipeline::Stage;
use crate::platform::PlatformError;
use crate::release::sha256_digest::Sha256Digest;
use crate::release::table::{LocateError, TableError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Exit code for failures worth retrying (`EX_TEMPFAIL` from `sysexits.h`).
pub const EXIT_TEMPFAIL: i32 = 75;

/// Exit code for every other failure.
pub const EXIT_FAILURE: i32 = 1;

/// Errors that abort an installation.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The host or requested platform is not one of the published ones.
    #[error(transparent)]
    UnsupportedPlatform(#[from] PlatformError),

    /// No installable artifact exists for the requested key.
    #[error(transparent)]
    ArtifactNotFound(#[from] LocateError),

    /// The download failed at the HTTP or connection level.
    #[error("network failure fetching {url}: {reason}")]
    NetworkFailure {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// A stage ran past the time budget.
    #[error("{stage} stage exceeded the {}s time limit", limit.as_secs())]
    Timeout {
        /// Stage that was running or about to run.
        stage: Stage,
        /// The configured overall limit.
        limit: Duration,
    },

    /// The caller cancelled the installation.
    #[error("installation cancelled before the {stage} stage")]
    Cancelled {
        /// Stage that would have run next.
        stage: Stage,
    },

    /// The downloaded bytes do not match the declared digest.
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    VerificationFailure {
        /// Location the bytes came from.
        url: String,
        /// Digest declared by the release table.
        expected: Sha256Digest,
        /// Digest of the bytes actually received.
        actual: Sha256Digest,
    },

    /// The verified archive does not contain exactly one usable binary.
    #[error("malformed archive: {0}")]
    MalformedArchive(#[from] ExtractionError),

    /// A filesystem operation failed.
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The release table could not be loaded.
    #[error(transparent)]
    ReleaseTable(#[from] TableError),

    /// The installer configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Another installer holds the install directory lock.
    #[error("another installation into {} is in progress", path.display())]
    Locked {
        /// The contested install directory.
        path: PathBuf,
    },

    /// Failed to write command output.
    #[error("failed to write output: {source}")]
    WriteFailed {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl InstallError {
    /// Map a fetch-stage failure onto the taxonomy.
    ///
    /// `limit` is the configured time budget, reported when the transfer
    /// timed out.
    #[must_use]
    pub fn from_fetch(err: FetchError, limit: Duration) -> Self {
        match err {
            FetchError::Download(DownloadError::HttpError { url, reason }) => {
                Self::NetworkFailure { url, reason }
            }
            FetchError::Download(DownloadError::NotFound { url }) => Self::NetworkFailure {
                url,
                reason: "HTTP 404 Not Found".to_owned(),
            },
            FetchError::Download(DownloadError::Timeout { .. }) => Self::Timeout {
                stage: Stage::Fetch,
                limit,
            },
            FetchError::Download(DownloadError::Io(source)) => Self::Filesystem {
                path: std::env::temp_dir(),
                source,
            },
            FetchError::Mismatch {
                url,
                expected,
                actual,
            } => Self::VerificationFailure {
                url,
                expected,
                actual,
            },
            FetchError::Io { path, source } => Self::Filesystem { path, source },
        }
    }

    /// Whether a caller may reasonably retry the same request.
    ///
    /// Only transient transport problems qualify; a digest mismatch or a
    /// malformed archive will fail the same way every time.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. } | Self::Timeout { .. })
    }

    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_retryable() {
            EXIT_TEMPFAIL
        } else {
            EXIT_FAILURE
        }
    }
}

/// Result type alias for installer operations.
pub type Result<T> = std::result::Result<T, InstallError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Architecture, OsFamily, Platform};
    use rstest::rstest;
    use semver::Version;

    fn network() -> InstallError {
        InstallError::NetworkFailure {
            url: "https://example.test/ga.tar.gz".to_owned(),
            reason: "connection refused".to_owned(),
        }
    }

    fn verification() -> InstallError {
        InstallError::VerificationFailure {
            url: "https://example.test/ga.tar.gz".to_owned(),
            expected: Sha256Digest::of(b"expected"),
            actual: Sha256Digest::of(b"actual"),
        }
    }

    fn timeout() -> InstallError {
        InstallError::Timeout {
            stage: Stage::Fetch,
            limit: Duration::from_secs(30),
        }
    }

    fn not_found() -> InstallError {
        InstallError::ArtifactNotFound(LocateError::NotFound {
            version: Version::new(0, 1, 0),
            platform: Platform::new(OsFamily::Linux, Architecture::Arm64),
        })
    }

    #[rstest]
    #[case::network(network(), true, EXIT_TEMPFAIL)]
    #[case::timeout(timeout(), true, EXIT_TEMPFAIL)]
    #[case::verification(verification(), false, EXIT_FAILURE)]
    #[case::not_found(not_found(), false, EXIT_FAILURE)]
    #[case::cancelled(InstallError::Cancelled { stage: Stage::Install }, false, EXIT_FAILURE)]
    fn retryability_drives_exit_code(
        #[case] err: InstallError,
        #[case] retryable: bool,
        #[case] code: i32,
    ) {
        assert_eq!(err.is_retryable(), retryable);
        assert_eq!(err.exit_code(), code);
    }

    #[test]
    fn not_found_download_is_a_network_failure() {
        let err = InstallError::from_fetch(
            FetchError::Download(DownloadError::NotFound {
                url: "https://example.test/missing".to_owned(),
            }),
            Duration::from_secs(30),
        );
        assert!(matches!(err, InstallError::NetworkFailure { ref reason, .. } if reason.contains("404")));
    }

    #[test]
    fn download_timeout_keeps_the_limit() {
        let err = InstallError::from_fetch(
            FetchError::Download(DownloadError::Timeout {
                url: "https://example.test/slow".to_owned(),
            }),
            Duration::from_secs(7),
        );
        assert!(matches!(
            err,
            InstallError::Timeout { stage: Stage::Fetch, limit } if limit == Duration::from_secs(7)
        ));
    }

    #[test]
    fn mismatch_stays_distinct_from_network_errors() {
        let err = InstallError::from_fetch(
            FetchError::Mismatch {
                url: "https://example.test/ga.tar.gz".to_owned(),
                expected: Sha256Digest::of(b"a"),
                actual: Sha256Digest::of(b"b"),
            },
            Duration::from_secs(30),
        );
        assert!(matches!(err, InstallError::VerificationFailure { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn timeout_message_names_stage() {
        assert_eq!(
            timeout().to_string(),
            "fetch stage exceeded the 30s time limit"
        );
    }
}
