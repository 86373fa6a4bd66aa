//! Versioned release table and the artifact locator.
//!
//! One TOML document describes every published archive, keyed by
//! (version, os, arch):
//!
//! ```toml
//! [package]
//! name = "ga"
//!
//! [[artifact]]
//! version = "0.1.0"
//! os = "macos"
//! arch = "arm64"
//! url = "https://example.com/ga-darwin-arm64.tar.gz"
//! sha256 = "..."
//! ```
//!
//! Lookups are exact. An arm64 request never falls back to an amd64 row, and
//! a row without a usable digest is reported as not found.

use super::sha256_digest::{DeclaredDigest, Sha256Digest};
use crate::platform::{Architecture, OsFamily, Platform};
use crate::probe::ProbeSpec;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use semver::Version;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The release table compiled into the installer.
const BUNDLED_TABLE: &str = include_str!("../../releases.toml");

/// Descriptive metadata about the packaged tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageInfo {
    /// Executable name, also used as the default install file name.
    pub name: String,
    /// One-line description.
    #[serde(default)]
    pub description: Option<String>,
    /// Project home page.
    #[serde(default)]
    pub homepage: Option<String>,
    /// SPDX licence identifier.
    #[serde(default)]
    pub license: Option<String>,
    /// Text shown to the operator after a successful install.
    #[serde(default)]
    pub caveats: Option<String>,
}

/// A located, installable release artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseArtifact {
    /// Semantic version of the release.
    pub version: Version,
    /// Platform the archive was built for.
    pub platform: Platform,
    /// Download location of the archive.
    pub url: String,
    /// Digest the downloaded bytes must match.
    pub digest: Sha256Digest,
}

impl fmt::Display for ReleaseArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for {} ({})", self.version, self.platform, self.url)
    }
}

/// A borrowed view of one table row, installable or not.
#[derive(Debug, Clone, Copy)]
pub struct TableEntry<'a> {
    /// Release version.
    pub version: &'a Version,
    /// Platform the row describes.
    pub platform: Platform,
    /// Declared download location.
    pub url: &'a str,
    /// Declared digest, possibly a placeholder.
    pub digest: &'a DeclaredDigest,
}

/// Errors raised while loading a release table.
#[derive(Debug, Error)]
pub enum TableError {
    /// The table file could not be read.
    #[error("failed to read release table {path}: {source}")]
    Read {
        /// Path of the table file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML or does not match the table schema.
    #[error("invalid release table: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two rows share the same (version, os, arch) key.
    #[error("duplicate artifact for {version} on {platform}")]
    DuplicateArtifact {
        /// Version of the duplicated row.
        version: Version,
        /// Platform of the duplicated row.
        platform: Platform,
    },

    /// A row's URL is not an `http` or `https` URL.
    #[error("artifact {version} on {platform} has unsupported URL \"{url}\"")]
    InvalidUrl {
        /// Version of the offending row.
        version: Version,
        /// Platform of the offending row.
        platform: Platform,
        /// The rejected URL.
        url: String,
    },
}

/// Reasons the locator could not produce an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    /// The table has no rows at all.
    #[error("the release table lists no releases")]
    NoReleases,

    /// No row exists for the exact (version, os, arch) key.
    #[error("no artifact for version {version} on {platform}")]
    NotFound {
        /// Requested version.
        version: Version,
        /// Requested platform.
        platform: Platform,
    },

    /// The row exists but its digest has not been published yet.
    #[error("artifact for version {version} on {platform} has no published digest ({placeholder})")]
    DigestPending {
        /// Requested version.
        version: Version,
        /// Requested platform.
        platform: Platform,
        /// The placeholder text found in the table.
        placeholder: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTable {
    package: PackageInfo,
    #[serde(default)]
    probe: ProbeSpec,
    #[serde(default, rename = "artifact")]
    artifacts: Vec<RawArtifact>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawArtifact {
    version: Version,
    os: OsFamily,
    arch: Architecture,
    url: String,
    #[serde(default)]
    sha256: Option<String>,
}

#[derive(Debug, Clone)]
struct ArtifactRow {
    url: String,
    digest: DeclaredDigest,
}

/// All published artifacts of one tool, loaded once per invocation.
#[derive(Debug, Clone)]
pub struct ReleaseTable {
    package: PackageInfo,
    probe: ProbeSpec,
    rows: BTreeMap<(Version, Platform), ArtifactRow>,
}

impl ReleaseTable {
    /// Load the table compiled into the installer.
    ///
    /// # Errors
    ///
    /// Returns [`TableError`] if the bundled document is invalid.
    pub fn bundled() -> Result<Self, TableError> {
        Self::from_toml_str(BUNDLED_TABLE)
    }

    /// Load a table from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Read`] if the file cannot be read, or a parse or
    /// validation error for malformed content.
    pub fn load(path: &Utf8Path) -> Result<Self, TableError> {
        let content = std::fs::read_to_string(path).map_err(|source| TableError::Read {
            path: path.to_owned(),
            source,
        })?;
        debug!("loaded release table from {path}");
        Self::from_toml_str(&content)
    }

    /// Parse and validate a table from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`TableError`] for invalid TOML, duplicate keys, or
    /// non-HTTP URLs.
    ///
    /// # Examples
    ///
    /// ```
    /// use ga_installer::release::table::ReleaseTable;
    ///
    /// let table = ReleaseTable::from_toml_str(r#"
    ///     [package]
    ///     name = "ga"
    /// "#).expect("valid table");
    /// assert_eq!(table.package().name, "ga");
    /// assert!(table.latest_version().is_none());
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self, TableError> {
        let raw: RawTable = toml::from_str(content)?;
        let mut rows = BTreeMap::new();
        for artifact in raw.artifacts {
            let platform = Platform::new(artifact.os, artifact.arch);
            if !is_http_url(&artifact.url) {
                return Err(TableError::InvalidUrl {
                    version: artifact.version,
                    platform,
                    url: artifact.url,
                });
            }
            let row = ArtifactRow {
                url: artifact.url,
                digest: DeclaredDigest::parse(artifact.sha256.as_deref()),
            };
            let key = (artifact.version, platform);
            if rows.contains_key(&key) {
                let (version, platform) = key;
                return Err(TableError::DuplicateArtifact { version, platform });
            }
            rows.insert(key, row);
        }
        Ok(Self {
            package: raw.package,
            probe: raw.probe,
            rows,
        })
    }

    /// Metadata about the packaged tool.
    #[must_use]
    pub fn package(&self) -> &PackageInfo {
        &self.package
    }

    /// How to smoke-test the installed binary.
    #[must_use]
    pub fn probe(&self) -> &ProbeSpec {
        &self.probe
    }

    /// The highest version listed for any platform.
    #[must_use]
    pub fn latest_version(&self) -> Option<&Version> {
        self.rows.keys().map(|(version, _)| version).max()
    }

    /// Every row in (version, platform) order.
    pub fn entries(&self) -> impl Iterator<Item = TableEntry<'_>> {
        self.rows.iter().map(|((version, platform), row)| TableEntry {
            version,
            platform: *platform,
            url: &row.url,
            digest: &row.digest,
        })
    }

    /// Number of rows in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find the artifact for exactly `platform` and `version`.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::NotFound`] when no row matches and
    /// [`LocateError::DigestPending`] when the row has no usable digest.
    pub fn locate(
        &self,
        platform: Platform,
        version: &Version,
    ) -> Result<ReleaseArtifact, LocateError> {
        let key = (version.clone(), platform);
        let Some(row) = self.rows.get(&key) else {
            return Err(LocateError::NotFound {
                version: version.clone(),
                platform,
            });
        };
        match &row.digest {
            DeclaredDigest::Known(digest) => Ok(ReleaseArtifact {
                version: version.clone(),
                platform,
                url: row.url.clone(),
                digest: *digest,
            }),
            DeclaredDigest::Pending(placeholder) => Err(LocateError::DigestPending {
                version: version.clone(),
                platform,
                placeholder: placeholder.clone(),
            }),
        }
    }

    /// Find the artifact for `platform`, using `version` when given and the
    /// table's latest version otherwise.
    ///
    /// The latest version is chosen across all platforms, so a platform that
    /// lags behind yields [`LocateError::NotFound`] instead of an older build.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::NoReleases`] for an empty table, otherwise as
    /// [`Self::locate`].
    pub fn locate_requested(
        &self,
        platform: Platform,
        version: Option<&Version>,
    ) -> Result<ReleaseArtifact, LocateError> {
        let version = match version {
            Some(version) => version,
            None => self.latest_version().ok_or(LocateError::NoReleases)?,
        };
        self.locate(platform, version)
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
