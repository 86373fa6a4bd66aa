//! Shared test utilities for the installer crate.

use crate::artefact::download::{ArtefactDownloader, DownloadError};
use crate::artefact::verification::{VerifiedArchive, fetch_and_verify};
use crate::platform::{Architecture, OsFamily, Platform};
use crate::probe::{ProbeError, ProbeOutput, ProbeRunner};
use crate::release::sha256_digest::Sha256Digest;
use crate::release::table::ReleaseArtifact;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256Digest::of(bytes).to_string()
}

/// One regular file to place in a test archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path inside the archive, written verbatim (`..` included).
    pub path: String,
    /// File contents.
    pub contents: Vec<u8>,
    /// Unix permission bits.
    pub mode: u32,
}

impl ArchiveEntry {
    /// A regular file entry.
    pub fn file(path: &str, contents: &[u8], mode: u32) -> Self {
        Self {
            path: path.to_owned(),
            contents: contents.to_vec(),
            mode,
        }
    }
}

fn append_entries<W: Write>(builder: &mut tar::Builder<W>, entries: &[ArchiveEntry]) {
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        // Bypass `set_path` so traversal entries can be written for tests.
        let name = &mut header.as_old_mut().name;
        for (slot, byte) in name.iter_mut().zip(entry.path.as_bytes()) {
            *slot = *byte;
        }
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(entry.contents.len() as u64);
        header.set_mode(entry.mode);
        header.set_mtime(0);
        header.set_cksum();
        builder
            .append(&header, entry.contents.as_slice())
            .expect("append tar entry");
    }
}

/// Build an uncompressed tar archive.
pub fn tar_archive(entries: &[ArchiveEntry]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    append_entries(&mut builder, entries);
    builder.into_inner().expect("finish tar")
}

/// Build a gzip-compressed tar archive, the release format.
pub fn tar_gz_archive(entries: &[ArchiveEntry]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    append_entries(&mut builder, entries);
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

/// Build a zstd-compressed tar archive.
pub fn tar_zst_archive(entries: &[ArchiveEntry]) -> Vec<u8> {
    let encoder = zstd::Encoder::new(Vec::new(), 0).expect("zstd encoder");
    let mut builder = tar::Builder::new(encoder);
    append_entries(&mut builder, entries);
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish zstd")
}

/// The usual release layout: one executable `ga` plus a README.
pub fn ga_release_archive(binary: &[u8]) -> Vec<u8> {
    tar_gz_archive(&[
        ArchiveEntry::file("ga", binary, 0o755),
        ArchiveEntry::file("README.md", b"# ga\n", 0o644),
    ])
}

/// A shell script that behaves like `ga --help`.
pub const FAKE_GA_SCRIPT: &[u8] =
    b"#!/bin/sh\necho 'Git Assistant - Smart Git workflow optimizer for large repositories'\n";

/// Write an executable shell script into `dir` and return its path.
#[cfg(unix)]
pub fn write_executable_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");
    path
}

/// Render a release table with one row per `(platform, url, sha256)`.
pub fn release_table_toml(version: &str, rows: &[(Platform, &str, &str)]) -> String {
    let mut doc = String::from(concat!(
        "[package]\n",
        "name = \"ga\"\n",
        "caveats = \"Quick Start: ga --help\"\n\n",
    ));
    for (platform, url, sha256) in rows {
        doc.push_str(&format!(
            concat!(
                "[[artifact]]\n",
                "version = \"{}\"\n",
                "os = \"{}\"\n",
                "arch = \"{}\"\n",
                "url = \"{}\"\n",
                "sha256 = \"{}\"\n\n"
            ),
            version,
            platform.os.as_str(),
            platform.arch.as_str(),
            url,
            sha256
        ));
    }
    doc
}

/// Canonical download URL used by tests for `platform`.
pub fn artifact_url(platform: Platform) -> String {
    format!(
        "https://example.test/releases/v0.1.0/ga-{}-{}.tar.gz",
        platform.os.as_str(),
        platform.arch.as_str()
    )
}

/// How [`StubDownloader`] answers.
#[derive(Debug, Clone)]
pub enum StubResponse {
    /// Write these bytes to the destination.
    Bytes(Vec<u8>),
    /// Fail with an HTTP-level error.
    HttpError(String),
    /// Fail with a 404.
    NotFound,
    /// Fail with a timeout.
    Timeout,
}

/// A scripted [`ArtefactDownloader`] that never touches the network.
#[derive(Debug)]
pub struct StubDownloader {
    response: StubResponse,
    calls: AtomicUsize,
    destinations: Mutex<Vec<PathBuf>>,
}

impl StubDownloader {
    /// Answer every download with `response`.
    pub fn new(response: StubResponse) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
            destinations: Mutex::new(Vec::new()),
        }
    }

    /// Serve `bytes` for every request.
    pub fn serving(bytes: &[u8]) -> Self {
        Self::new(StubResponse::Bytes(bytes.to_vec()))
    }

    /// Number of download calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Destination paths passed to each call.
    pub fn destinations(&self) -> Vec<PathBuf> {
        self.destinations.lock().expect("lock").clone()
    }
}

impl ArtefactDownloader for StubDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.destinations
            .lock()
            .expect("lock")
            .push(dest.to_path_buf());
        let url = url.to_owned();
        match &self.response {
            StubResponse::Bytes(bytes) => std::fs::write(dest, bytes).map_err(DownloadError::Io),
            StubResponse::HttpError(reason) => Err(DownloadError::HttpError {
                url,
                reason: reason.clone(),
            }),
            StubResponse::NotFound => Err(DownloadError::NotFound { url }),
            StubResponse::Timeout => Err(DownloadError::Timeout { url }),
        }
    }
}

/// Verify `bytes` against their own digest, producing a [`VerifiedArchive`].
pub fn verified_archive(bytes: &[u8]) -> VerifiedArchive {
    let artifact = ReleaseArtifact {
        version: semver::Version::new(0, 1, 0),
        platform: Platform::new(OsFamily::Linux, Architecture::Amd64),
        url: "https://example.test/ga.tar.gz".to_owned(),
        digest: Sha256Digest::of(bytes),
    };
    fetch_and_verify(&StubDownloader::serving(bytes), &artifact).expect("self-digest verifies")
}

/// A [`ProbeRunner`] that returns a fixed exit code and output.
#[derive(Debug)]
pub struct ScriptedProbeRunner {
    code: i32,
    output: String,
    calls: AtomicUsize,
}

impl ScriptedProbeRunner {
    /// Always exit with `code`, printing `output`.
    pub fn new(code: i32, output: &str) -> Self {
        Self {
            code,
            output: output.to_owned(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of probe runs so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProbeRunner for ScriptedProbeRunner {
    fn run(
        &self,
        _program: &Path,
        _args: &[String],
        _timeout: Duration,
    ) -> Result<ProbeOutput, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProbeOutput {
            status: exit_status(self.code),
            combined: self.output.clone(),
        })
    }
}
