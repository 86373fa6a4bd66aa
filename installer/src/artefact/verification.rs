//! Fetch-and-verify for release archives.
//!
//! An archive is downloaded into a private temporary directory, hashed in a
//! single streaming pass, and compared against the digest declared in the
//! release table. Only a [`VerifiedArchive`] can reach the install stage, and
//! the only way to obtain one is [`verify`].

use crate::artefact::download::{ArtefactDownloader, DownloadError};
use crate::release::sha256_digest::Sha256Digest;
use crate::release::table::ReleaseArtifact;
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

/// File name of the download inside its temporary directory.
const DOWNLOAD_FILE_NAME: &str = "archive.download";

/// Errors raised while fetching or verifying an archive.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The download itself failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The downloaded bytes do not hash to the declared digest.
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    Mismatch {
        /// Location the bytes came from.
        url: String,
        /// Digest declared by the release table.
        expected: Sha256Digest,
        /// Digest of the bytes actually received.
        actual: Sha256Digest,
    },

    /// The temporary download location could not be created or read.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path that could not be accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of verifying a fetched archive.
pub type VerificationResult = Result<VerifiedArchive, FetchError>;

/// A downloaded, not yet trusted archive.
///
/// The backing temporary directory is removed when this value is dropped.
#[derive(Debug)]
pub struct FetchedArchive {
    dir: TempDir,
    path: PathBuf,
    url: String,
}

impl FetchedArchive {
    /// Location of the downloaded file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the private directory holding the download.
    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        self.dir.path()
    }

    /// URL the archive was fetched from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Archive bytes whose digest matched the release table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArchive {
    bytes: Vec<u8>,
    digest: Sha256Digest,
}

impl VerifiedArchive {
    /// The verified archive bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The digest the bytes were verified against.
    #[must_use]
    pub fn digest(&self) -> Sha256Digest {
        self.digest
    }
}

/// Download `artifact` into a fresh temporary directory.
///
/// # Errors
///
/// Returns [`FetchError::Io`] if the temporary directory cannot be created
/// and [`FetchError::Download`] if the transfer fails. In both cases nothing
/// is left on disk.
pub fn fetch(
    downloader: &dyn ArtefactDownloader,
    artifact: &ReleaseArtifact,
) -> Result<FetchedArchive, FetchError> {
    let dir = tempfile::Builder::new()
        .prefix("ga-installer-")
        .tempdir()
        .map_err(|source| FetchError::Io {
            path: std::env::temp_dir(),
            source,
        })?;
    let path = dir.path().join(DOWNLOAD_FILE_NAME);
    debug!("fetching {} into {}", artifact.url, path.display());
    downloader.download(&artifact.url, &path)?;
    Ok(FetchedArchive {
        dir,
        path,
        url: artifact.url.clone(),
    })
}

/// Hash the fetched bytes and compare them with the declared digest.
///
/// The fetched archive is consumed, so its temporary directory is removed
/// whether or not verification succeeds.
///
/// # Errors
///
/// Returns [`FetchError::Mismatch`] when the digests differ and
/// [`FetchError::Io`] when the download cannot be read back.
pub fn verify(fetched: FetchedArchive, artifact: &ReleaseArtifact) -> VerificationResult {
    let (bytes, actual) = read_and_digest(&fetched.path).map_err(|source| FetchError::Io {
        path: fetched.path.clone(),
        source,
    })?;
    if !actual.matches(&artifact.digest) {
        warn!(
            "checksum mismatch for {}: expected {}, got {actual}",
            fetched.url, artifact.digest
        );
        return Err(FetchError::Mismatch {
            url: fetched.url,
            expected: artifact.digest,
            actual,
        });
    }
    debug!("verified {} ({} bytes)", fetched.url, bytes.len());
    Ok(VerifiedArchive {
        bytes,
        digest: actual,
    })
}

/// Fetch `artifact` and verify it in one step.
///
/// # Errors
///
/// Returns any error from [`fetch`] or [`verify`].
pub fn fetch_and_verify(
    downloader: &dyn ArtefactDownloader,
    artifact: &ReleaseArtifact,
) -> VerificationResult {
    let fetched = fetch(downloader, artifact)?;
    verify(fetched, artifact)
}

/// Read a file fully while computing its SHA-256 digest.
fn read_and_digest(path: &Path) -> std::io::Result<(Vec<u8>, Sha256Digest)> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut bytes = Vec::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        let Some(chunk) = buffer.get(..bytes_read).filter(|chunk| !chunk.is_empty()) else {
            break;
        };
        hasher.update(chunk);
        bytes.extend_from_slice(chunk);
    }
    Ok((bytes, Sha256Digest::from_hasher(hasher)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artefact::download::MockArtefactDownloader;
    use crate::platform::{Architecture, OsFamily, Platform};
    use semver::Version;

    const PAYLOAD: &[u8] = b"ga archive bytes";
    const URL: &str = "https://example.test/ga-darwin-arm64.tar.gz";

    fn artifact_for(bytes: &[u8]) -> ReleaseArtifact {
        ReleaseArtifact {
            version: Version::new(0, 1, 0),
            platform: Platform::new(OsFamily::Macos, Architecture::Arm64),
            url: URL.to_owned(),
            digest: Sha256Digest::of(bytes),
        }
    }

    fn serving(bytes: &'static [u8]) -> MockArtefactDownloader {
        let mut downloader = MockArtefactDownloader::new();
        downloader
            .expect_download()
            .times(1)
            .returning(move |url, dest| {
                assert_eq!(url, URL);
                std::fs::write(dest, bytes).map_err(DownloadError::Io)
            });
        downloader
    }

    #[test]
    fn matching_bytes_are_verified() {
        let verified =
            fetch_and_verify(&serving(PAYLOAD), &artifact_for(PAYLOAD)).expect("digest matches");
        assert_eq!(verified.bytes(), PAYLOAD);
        assert_eq!(verified.digest(), Sha256Digest::of(PAYLOAD));
    }

    #[test]
    fn mismatch_reports_both_digests() {
        let artifact = artifact_for(b"what the table promised");
        let err = fetch_and_verify(&serving(PAYLOAD), &artifact).expect_err("tampered");
        match err {
            FetchError::Mismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, artifact.digest);
                assert_eq!(actual, Sha256Digest::of(PAYLOAD));
            }
            other => panic!("expected Mismatch, got {other:?}"),
        }
    }

    #[test]
    fn temporary_download_is_removed_after_verification() {
        let fetched = fetch(&serving(PAYLOAD), &artifact_for(b"other")).expect("fetched");
        let dir = fetched.temp_dir().to_path_buf();
        assert!(fetched.path().exists());
        let _ = verify(fetched, &artifact_for(b"other"));
        assert!(!dir.exists());
    }

    #[test]
    fn download_failures_are_passed_through() {
        let mut downloader = MockArtefactDownloader::new();
        downloader.expect_download().times(1).returning(|url, _| {
            Err(DownloadError::NotFound {
                url: url.to_owned(),
            })
        });
        let err = fetch(&downloader, &artifact_for(PAYLOAD)).expect_err("404");
        assert!(matches!(
            err,
            FetchError::Download(DownloadError::NotFound { .. })
        ));
    }

    #[test]
    fn read_and_digest_spans_multiple_chunks() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("big");
        let content = vec![42u8; 8192 * 3 + 17];
        std::fs::write(&path, &content).expect("write");
        let (bytes, digest) = read_and_digest(&path).expect("read");
        assert_eq!(bytes, content);
        assert_eq!(digest, Sha256Digest::of(&content));
    }
}
