//! Directory resolution abstraction for platform-specific paths.
//!
//! Wraps `directories-next` behind a trait so configuration defaults can be
//! tested without depending on the real home directory.

use std::path::PathBuf;

/// Name of the installer's configuration subdirectory.
const APP_DIR: &str = "ga-installer";

/// Base directories consulted for defaults.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// Directory for user executables (`$XDG_BIN_HOME` or `~/.local/bin`).
    fn bin_dir(&self) -> Option<PathBuf>;

    /// Directory holding this installer's configuration.
    fn installer_config_dir(&self) -> Option<PathBuf>;
}

/// Production directories backed by `directories-next`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBaseDirs;

impl BaseDirs for SystemBaseDirs {
    fn bin_dir(&self) -> Option<PathBuf> {
        let dirs = directories_next::BaseDirs::new()?;
        // `executable_dir` is only defined on Linux; elsewhere use the same
        // `~/.local/bin` convention.
        Some(
            dirs.executable_dir()
                .map_or_else(|| dirs.home_dir().join(".local").join("bin"), PathBuf::from),
        )
    }

    fn installer_config_dir(&self) -> Option<PathBuf> {
        directories_next::BaseDirs::new().map(|dirs| dirs.config_dir().join(APP_DIR))
    }
}
