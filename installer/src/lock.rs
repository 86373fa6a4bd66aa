//! Advisory lock serialising installers that target the same directory.
//!
//! On Unix the lock is taken on the install directory itself, so nothing
//! besides the binary is ever left in it. Other platforms fall back to a
//! lock file inside the directory.

use crate::error::{InstallError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use log::debug;
use std::fs::File;

/// Lock file used where directories cannot be opened as files.
#[cfg(not(unix))]
pub const LOCK_FILE_NAME: &str = ".ga-installer.lock";

/// Held exclusive lock on an install directory. Released on drop.
#[derive(Debug)]
pub struct InstallLock {
    file: File,
    path: Utf8PathBuf,
}

impl InstallLock {
    /// Try to take the lock for `install_dir` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Locked`] when another process holds it and
    /// [`InstallError::Filesystem`] when the directory cannot be opened.
    pub fn acquire(install_dir: &Utf8Path) -> Result<Self> {
        let (file, path) = open_lock_target(install_dir)?;
        if let Err(source) = FileExt::try_lock_exclusive(&file) {
            if source.kind() == fs2::lock_contended_error().kind() {
                return Err(InstallError::Locked {
                    path: install_dir.to_path_buf().into_std_path_buf(),
                });
            }
            return Err(InstallError::Filesystem {
                path: path.into_std_path_buf(),
                source,
            });
        }
        debug!("locked {path}");
        Ok(Self { file, path })
    }

    /// Path the lock is held on.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!("failed to unlock {}: {err}", self.path);
        }
    }
}

#[cfg(unix)]
fn open_lock_target(install_dir: &Utf8Path) -> Result<(File, Utf8PathBuf)> {
    let file = File::open(install_dir).map_err(|source| InstallError::Filesystem {
        path: install_dir.to_path_buf().into_std_path_buf(),
        source,
    })?;
    Ok((file, install_dir.to_path_buf()))
}

#[cfg(not(unix))]
fn open_lock_target(install_dir: &Utf8Path) -> Result<(File, Utf8PathBuf)> {
    let path = install_dir.join(LOCK_FILE_NAME);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .map_err(|source| InstallError::Filesystem {
            path: path.clone().into_std_path_buf(),
            source,
        })?;
    Ok((file, path))
}
