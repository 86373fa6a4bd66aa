//! Atomic placement of the extracted binary.
//!
//! The binary is written to a temporary file inside the install directory,
//! flushed to disk, marked executable, and renamed over the final path. A
//! rename within one directory is atomic, so the final path always holds
//! either the previous binary or the complete new one. A [`StagedBinary`]
//! that is dropped before [`StagedBinary::commit`] removes its temporary file.

use crate::artefact::extraction::{ExtractedBinary, extract_single_binary};
use crate::artefact::verification::VerifiedArchive;
use crate::error::{InstallError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Permission bits given to every installed binary.
pub const INSTALLED_MODE: u32 = 0o755;

/// Where the binary ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    /// File name of the installed executable.
    pub binary_name: String,
    /// Directory the executable is placed in.
    pub install_dir: Utf8PathBuf,
}

impl InstallTarget {
    /// Create a target, rejecting names that are not a single path component.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Filesystem`] with
    /// [`std::io::ErrorKind::InvalidInput`] if `binary_name` is empty or
    /// contains a path separator.
    ///
    /// # Examples
    ///
    /// ```
    /// use ga_installer::install::InstallTarget;
    ///
    /// let target = InstallTarget::new("ga", "/usr/local/bin").expect("valid name");
    /// assert_eq!(target.final_path(), "/usr/local/bin/ga");
    /// assert!(InstallTarget::new("../ga", "/usr/local/bin").is_err());
    /// ```
    pub fn new(binary_name: impl Into<String>, install_dir: impl Into<Utf8PathBuf>) -> Result<Self> {
        let binary_name = binary_name.into();
        let install_dir = install_dir.into();
        let valid = !binary_name.is_empty()
            && binary_name != "."
            && binary_name != ".."
            && !binary_name.contains(['/', '\\']);
        if !valid {
            return Err(InstallError::Filesystem {
                path: install_dir.join(&binary_name).into_std_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid binary name \"{binary_name}\""),
                ),
            });
        }
        Ok(Self {
            binary_name,
            install_dir,
        })
    }

    /// Full path of the installed executable.
    #[must_use]
    pub fn final_path(&self) -> Utf8PathBuf {
        self.install_dir.join(&self.binary_name)
    }
}

/// A binary that has been placed at its final path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledBinary {
    /// Location of the executable.
    pub path: Utf8PathBuf,
    /// Size of the executable in bytes.
    pub size: u64,
}

/// A fully written binary waiting to be renamed into place.
#[derive(Debug)]
pub struct StagedBinary {
    temp: NamedTempFile,
    final_path: Utf8PathBuf,
    size: u64,
}

impl StagedBinary {
    /// Location of the temporary file.
    #[must_use]
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Atomically replace the final path with the staged binary.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Filesystem`] if the rename fails; the
    /// temporary file is removed in that case.
    pub fn commit(self) -> Result<InstalledBinary> {
        let Self {
            temp,
            final_path,
            size,
        } = self;
        temp.persist(final_path.as_std_path())
            .map_err(|err| fs_error(&final_path, err.error))?;
        sync_parent(&final_path);
        debug!("installed {final_path} ({size} bytes)");
        Ok(InstalledBinary {
            path: final_path,
            size,
        })
    }
}

/// Write `binary` next to its final path without making it visible.
///
/// Creates the install directory if it is missing.
///
/// # Errors
///
/// Returns [`InstallError::Filesystem`] if the directory or temporary file
/// cannot be created, written, synced, or given its permissions.
pub fn stage(binary: &ExtractedBinary, target: &InstallTarget) -> Result<StagedBinary> {
    let dir = &target.install_dir;
    std::fs::create_dir_all(dir).map_err(|e| fs_error(dir, e))?;

    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", target.binary_name))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| fs_error(dir, e))?;
    let temp_path = temp.path().to_path_buf();
    let io_error = |source| InstallError::Filesystem {
        path: temp_path.clone(),
        source,
    };

    temp.write_all(&binary.contents).map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;
    set_executable(temp.as_file()).map_err(io_error)?;

    if binary.entry_name != target.binary_name {
        debug!(
            "installing archive entry {} as {}",
            binary.entry_name, target.binary_name
        );
    }
    Ok(StagedBinary {
        temp,
        final_path: target.final_path(),
        size: binary.contents.len() as u64,
    })
}

/// Extract the binary from a verified archive and place it atomically.
///
/// # Errors
///
/// Returns [`InstallError::MalformedArchive`] if the archive does not hold
/// exactly one executable, or [`InstallError::Filesystem`] on write failure.
/// In both cases the final path is untouched.
pub fn install(verified: &VerifiedArchive, target: &InstallTarget) -> Result<InstalledBinary> {
    let binary = extract_single_binary(verified.bytes())?;
    stage(&binary, target)?.commit()
}

#[cfg(unix)]
fn set_executable(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(std::fs::Permissions::from_mode(INSTALLED_MODE))
}

#[cfg(not(unix))]
fn set_executable(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

/// Flush the directory entry so the rename survives a crash.
#[cfg(unix)]
fn sync_parent(path: &Utf8Path) {
    let Some(parent) = path.parent() else {
        return;
    };
    if let Err(err) = std::fs::File::open(parent).and_then(|dir| dir.sync_all()) {
        debug!("could not sync {parent}: {err}");
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Utf8Path) {}

fn fs_error(path: &Utf8Path, source: std::io::Error) -> InstallError {
    InstallError::Filesystem {
        path: path.as_std_path().to_path_buf(),
        source,
    }
}
