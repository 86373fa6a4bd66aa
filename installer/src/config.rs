//! Installer configuration: an optional TOML file layered under CLI flags.
//!
//! The file is looked up in this order:
//!
//! 1. `--config <FILE>` on the command line (must exist);
//! 2. `$GA_INSTALLER_CONFIG` (must exist);
//! 3. `<config dir>/ga-installer/config.toml` (optional).
//!
//! ```toml
//! install_dir = "/opt/tools/bin"
//! release_table = "releases.toml"   # relative to this file
//! timeout_secs = 60
//! binary_name = "ga"
//! ```
//!
//! Command-line flags override file values, which override built-in
//! defaults.

use crate::cli::InstallArgs;
use crate::dirs::BaseDirs;
use crate::pipeline::DEFAULT_TIMEOUT;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "GA_INSTALLER_CONFIG";

/// File name looked up in the user configuration directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors raised while loading or applying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or has unknown keys.
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// Underlying parse error.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// A timeout of zero seconds was requested.
    #[error("timeout must be at least one second")]
    ZeroTimeout,

    /// No install directory was given and none could be derived.
    #[error("could not determine an install directory; pass --install-dir")]
    NoInstallDir,

    /// A derived path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
}

/// Values read from the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Directory to install into.
    pub install_dir: Option<Utf8PathBuf>,
    /// Release table to read instead of the bundled one.
    pub release_table: Option<Utf8PathBuf>,
    /// Overall time limit in seconds.
    pub timeout_secs: Option<u64>,
    /// File name of the installed executable.
    pub binary_name: Option<String>,
}

impl FileConfig {
    /// Read a configuration file.
    ///
    /// A relative `release_table` is resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let mut config = Self::from_toml_str(path, &content)?;
        if let (Some(table), Some(base)) = (&config.release_table, path.parent()) {
            if table.is_relative() {
                config.release_table = Some(base.join(table));
            }
        }
        debug!("loaded config from {path}");
        Ok(config)
    }

    fn from_toml_str(path: &Utf8Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source: Box::new(source),
        })
    }
}

/// Load configuration from the first applicable location.
///
/// # Errors
///
/// Returns an error if an explicitly named file (flag or environment) is
/// missing or invalid, or if the default file exists but is invalid.
pub fn load_config(
    explicit: Option<&Utf8Path>,
    dirs: &dyn BaseDirs,
) -> Result<FileConfig, ConfigError> {
    if let Some(path) = explicit {
        return FileConfig::load(path);
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|value| !value.is_empty()) {
        let path = utf8(PathBuf::from(path))?;
        return FileConfig::load(&path);
    }
    let Some(dir) = dirs.installer_config_dir() else {
        return Ok(FileConfig::default());
    };
    let path = utf8(dir.join(CONFIG_FILE_NAME))?;
    if !path.exists() {
        debug!("no config file at {path}");
        return Ok(FileConfig::default());
    }
    FileConfig::load(&path)
}

/// Effective install settings after layering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory to install into.
    pub install_dir: Utf8PathBuf,
    /// Release table override, if any.
    pub release_table: Option<Utf8PathBuf>,
    /// Overall time limit.
    pub timeout: Duration,
    /// Installed file name override; the package name otherwise.
    pub binary_name: Option<String>,
}

impl Settings {
    /// Layer CLI arguments over file values over defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroTimeout`] for a zero timeout and
    /// [`ConfigError::NoInstallDir`] when no install directory can be found.
    pub fn resolve(
        args: &InstallArgs,
        file: &FileConfig,
        dirs: &dyn BaseDirs,
    ) -> Result<Self, ConfigError> {
        let timeout = match args.timeout.or(file.timeout_secs) {
            Some(0) => return Err(ConfigError::ZeroTimeout),
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_TIMEOUT,
        };
        let install_dir = match args.install_dir.as_ref().or(file.install_dir.as_ref()) {
            Some(dir) => dir.clone(),
            None => default_install_dir(dirs)?,
        };
        Ok(Self {
            install_dir,
            release_table: release_table(args.release_table.as_deref(), file),
            timeout,
            binary_name: file.binary_name.clone(),
        })
    }
}

/// The release table path in effect, if any.
#[must_use]
pub fn release_table(cli: Option<&Utf8Path>, file: &FileConfig) -> Option<Utf8PathBuf> {
    cli.map(Utf8Path::to_path_buf)
        .or_else(|| file.release_table.clone())
}

/// `$XDG_BIN_HOME` or `~/.local/bin`.
///
/// # Errors
///
/// Returns [`ConfigError::NoInstallDir`] when no home directory is known.
pub fn default_install_dir(dirs: &dyn BaseDirs) -> Result<Utf8PathBuf, ConfigError> {
    let dir = dirs.bin_dir().ok_or(ConfigError::NoInstallDir)?;
    utf8(dir)
}

fn utf8(path: PathBuf) -> Result<Utf8PathBuf, ConfigError> {
    Utf8PathBuf::from_path_buf(path).map_err(ConfigError::NonUtf8Path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirs::MockBaseDirs;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct ConfigDir {
        dir: TempDir,
    }

    impl ConfigDir {
        fn path(&self) -> Utf8PathBuf {
            Utf8PathBuf::try_from(self.dir.path().to_path_buf()).expect("UTF-8 temp path")
        }

        fn write(&self, content: &str) -> Utf8PathBuf {
            let path = self.path().join(CONFIG_FILE_NAME);
            std::fs::write(&path, content).expect("write config");
            path
        }

        fn dirs(&self) -> MockBaseDirs {
            let config_dir = self.dir.path().to_path_buf();
            let bin_dir = self.dir.path().join("bin");
            let mut dirs = MockBaseDirs::new();
            dirs.expect_installer_config_dir()
                .returning(move || Some(config_dir.clone()));
            dirs.expect_bin_dir().returning(move || Some(bin_dir.clone()));
            dirs
        }
    }

    #[fixture]
    fn config_dir() -> ConfigDir {
        ConfigDir {
            dir: tempfile::tempdir().expect("temp dir"),
        }
    }

    #[rstest]
    fn missing_default_file_yields_defaults(config_dir: ConfigDir) {
        let config = temp_env::with_var_unset(CONFIG_ENV, || {
            load_config(None, &config_dir.dirs()).expect("defaults")
        });
        assert_eq!(config, FileConfig::default());
    }

    #[rstest]
    fn default_file_is_read(config_dir: ConfigDir) {
        config_dir.write("timeout_secs = 12\nbinary_name = \"git-assistant\"\n");
        let config = temp_env::with_var_unset(CONFIG_ENV, || {
            load_config(None, &config_dir.dirs()).expect("valid config")
        });
        assert_eq!(config.timeout_secs, Some(12));
        assert_eq!(config.binary_name.as_deref(), Some("git-assistant"));
    }

    #[rstest]
    fn environment_variable_names_the_file(config_dir: ConfigDir) {
        let path = config_dir.path().join("elsewhere.toml");
        std::fs::write(&path, "install_dir = \"/opt/bin\"\n").expect("write");
        let config = temp_env::with_var(CONFIG_ENV, Some(path.as_str()), || {
            load_config(None, &MockBaseDirs::new()).expect("valid config")
        });
        assert_eq!(config.install_dir, Some(Utf8PathBuf::from("/opt/bin")));
    }

    #[rstest]
    fn explicit_missing_file_is_an_error(config_dir: ConfigDir) {
        let path = config_dir.path().join("absent.toml");
        let err = load_config(Some(&path), &MockBaseDirs::new()).expect_err("missing file");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[rstest]
    fn unknown_keys_are_rejected(config_dir: ConfigDir) {
        let path = config_dir.write("install_directory = \"/opt/bin\"\n");
        let err = FileConfig::load(&path).expect_err("unknown key");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[rstest]
    fn relative_release_table_is_anchored_to_config_file(config_dir: ConfigDir) {
        let path = config_dir.write("release_table = \"releases.toml\"\n");
        let config = FileConfig::load(&path).expect("valid config");
        assert_eq!(
            config.release_table,
            Some(config_dir.path().join("releases.toml"))
        );
    }

    #[rstest]
    fn cli_overrides_file_overrides_defaults(config_dir: ConfigDir) {
        let file = FileConfig {
            install_dir: Some(Utf8PathBuf::from("/from/file")),
            release_table: Some(Utf8PathBuf::from("/from/file/releases.toml")),
            timeout_secs: Some(45),
            binary_name: Some("ga".to_owned()),
        };
        let args = InstallArgs {
            install_dir: Some(Utf8PathBuf::from("/from/cli")),
            ..InstallArgs::default()
        };
        let settings = Settings::resolve(&args, &file, &config_dir.dirs()).expect("settings");
        assert_eq!(settings.install_dir, Utf8PathBuf::from("/from/cli"));
        assert_eq!(settings.timeout, Duration::from_secs(45));
        assert_eq!(
            settings.release_table,
            Some(Utf8PathBuf::from("/from/file/releases.toml"))
        );
    }

    #[rstest]
    fn defaults_apply_when_nothing_is_set(config_dir: ConfigDir) {
        let settings = Settings::resolve(
            &InstallArgs::default(),
            &FileConfig::default(),
            &config_dir.dirs(),
        )
        .expect("settings");
        assert_eq!(settings.install_dir, config_dir.path().join("bin"));
        assert_eq!(settings.timeout, DEFAULT_TIMEOUT);
        assert!(settings.release_table.is_none());
        assert!(settings.binary_name.is_none());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let args = InstallArgs {
            timeout: Some(0),
            ..InstallArgs::default()
        };
        let err = Settings::resolve(&args, &FileConfig::default(), &MockBaseDirs::new())
            .expect_err("zero timeout");
        assert!(matches!(err, ConfigError::ZeroTimeout));
    }

    #[test]
    fn missing_home_means_no_install_dir() {
        let mut dirs = MockBaseDirs::new();
        dirs.expect_bin_dir().returning(|| None);
        let err = default_install_dir(&dirs).expect_err("no home");
        assert!(matches!(err, ConfigError::NoInstallDir));
    }
}
