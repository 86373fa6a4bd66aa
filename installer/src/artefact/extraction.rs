//! Single-binary extraction from verified release archives.
//!
//! Release archives are tarballs, gzip-compressed for published releases
//! and zstd-compressed or uncompressed in some pipelines. The format is
//! picked from the leading magic bytes. Entry paths are validated against
//! path traversal before anything else is considered.

use log::debug;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const USTAR_MAGIC: &[u8] = b"ustar";
const USTAR_OFFSET: usize = 257;

/// Compression wrapped around the tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.tar.gz`
    TarGzip,
    /// `.tar.zst`
    TarZstd,
    /// Uncompressed `.tar`
    Tar,
}

impl ArchiveFormat {
    /// Detect the format from the first bytes of an archive.
    ///
    /// # Examples
    ///
    /// ```
    /// use ga_installer::artefact::extraction::ArchiveFormat;
    ///
    /// assert_eq!(
    ///     ArchiveFormat::detect(&[0x1f, 0x8b, 0x08]),
    ///     Some(ArchiveFormat::TarGzip)
    /// );
    /// assert_eq!(ArchiveFormat::detect(b"plain text"), None);
    /// ```
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&GZIP_MAGIC) {
            Some(Self::TarGzip)
        } else if bytes.starts_with(&ZSTD_MAGIC) {
            Some(Self::TarZstd)
        } else if bytes
            .get(USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len())
            .is_some_and(|magic| magic == USTAR_MAGIC)
        {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The bytes are not a recognised archive format.
    #[error("unrecognised archive format")]
    UnknownFormat,

    /// The archive stream could not be decoded.
    #[error("corrupt archive: {0}")]
    Corrupt(#[from] std::io::Error),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// No top-level regular file carries an executable bit.
    #[error("archive contains no executable")]
    NoExecutable,

    /// More than one top-level regular file carries an executable bit.
    #[error("archive contains several executables: {}", names.join(", "))]
    AmbiguousExecutable {
        /// Names of the candidate executables.
        names: Vec<String>,
    },
}

/// The executable pulled out of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBinary {
    /// File name of the entry inside the archive (after stripping any
    /// wrapper directory).
    pub entry_name: String,
    /// File contents.
    pub contents: Vec<u8>,
}

#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    contents: Vec<u8>,
}

/// Extract the single executable contained in `bytes`.
///
/// If every entry lives under one common top-level directory, that directory
/// is stripped first. Among the remaining top-level regular files exactly one
/// must be executable; anything else (README, LICENSE, nested files, links)
/// is ignored.
///
/// # Errors
///
/// Returns [`ExtractionError`] when the format is unknown, the stream is
/// corrupt, an entry path escapes the archive root, or the archive does not
/// hold exactly one top-level executable.
pub fn extract_single_binary(bytes: &[u8]) -> Result<ExtractedBinary, ExtractionError> {
    let format = ArchiveFormat::detect(bytes).ok_or(ExtractionError::UnknownFormat)?;
    debug!("extracting {format:?} archive ({} bytes)", bytes.len());
    let reader: Box<dyn Read + '_> = match format {
        ArchiveFormat::TarGzip => Box::new(flate2::read::GzDecoder::new(bytes)),
        ArchiveFormat::TarZstd => Box::new(zstd::Decoder::new(bytes)?),
        ArchiveFormat::Tar => Box::new(bytes),
    };
    let mut archive = tar::Archive::new(reader);

    let mut roots: BTreeSet<OsString> = BTreeSet::new();
    let mut top_level_file = false;
    let mut candidates = Vec::new();

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let raw_path = entry.path()?.into_owned();
        validate_entry_path(&raw_path)?;
        let path = normalise(&raw_path);
        let Some(Component::Normal(root)) = path.components().next() else {
            continue;
        };
        roots.insert(root.to_os_string());

        let is_regular = entry.header().entry_type().is_file();
        let depth = path.components().count();
        if is_regular && depth == 1 {
            top_level_file = true;
        }
        let executable = entry.header().mode()? & 0o111 != 0;
        if is_regular && executable && depth <= 2 {
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            candidates.push(Candidate { path, contents });
        }
    }

    let wrapper = match (roots.len(), top_level_file) {
        (1, false) => roots.into_iter().next(),
        _ => None,
    };
    let top_depth = if wrapper.is_some() { 2 } else { 1 };
    if let Some(dir) = &wrapper {
        debug!("stripping wrapper directory {}", dir.to_string_lossy());
    }

    let mut executables: Vec<Candidate> = candidates
        .into_iter()
        .filter(|candidate| candidate.path.components().count() == top_depth)
        .collect();
    match executables.len() {
        0 => Err(ExtractionError::NoExecutable),
        1 => {
            let Some(chosen) = executables.pop() else {
                return Err(ExtractionError::NoExecutable);
            };
            let entry_name = chosen
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(ExtractedBinary {
                entry_name,
                contents: chosen.contents,
            })
        }
        _ => Err(ExtractionError::AmbiguousExecutable {
            names: executables
                .iter()
                .map(|candidate| candidate.path.display().to_string())
                .collect(),
        }),
    }
}

/// Validate that a tar entry path does not escape the archive root via `..`
/// components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Drop `.` components so `./ga` and `ga` are treated alike.
fn normalise(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}
