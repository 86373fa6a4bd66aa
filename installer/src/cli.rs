//! CLI argument definitions for the `ga` installer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::platform::{Architecture, OsFamily};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use semver::Version;

/// Install the `ga` Git Assistant CLI.
#[derive(Parser, Debug)]
#[command(name = "ga-installer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Install the ga (Git Assistant) command-line tool.\n\n",
    "The installer detects the running platform, looks up the matching release ",
    "archive, downloads it, and refuses to install anything whose SHA-256 digest ",
    "does not match the release table. The binary is placed atomically and then ",
    "run once with --help to confirm it works.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Install the latest release into ~/.local/bin:\n",
    "    $ ga-installer\n\n",
    "  Install a specific version into /usr/local/bin:\n",
    "    $ ga-installer --release 0.1.0 --install-dir /usr/local/bin\n\n",
    "  Install the amd64 build on an arm64 Mac:\n",
    "    $ ga-installer --arch amd64\n\n",
    "  Show what would be installed:\n",
    "    $ ga-installer --dry-run\n\n",
    "  List published releases:\n",
    "    $ ga-installer list\n\n",
    "EXIT STATUS:\n",
    "  0   installed (possibly with a self-check warning)\n",
    "  75  network failure or timeout; retrying may help\n",
    "  1   any other failure",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Install arguments (used when no subcommand is given).
    #[command(flatten)]
    pub install: InstallArgs,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Install ga (default when no subcommand given).
    Install(InstallArgs),

    /// List releases in the release table.
    List(ListArgs),
}

/// Arguments for the install command.
#[derive(Parser, Debug, Clone, Default)]
pub struct InstallArgs {
    /// Release to install [default: latest in the release table].
    #[arg(long, value_name = "VERSION")]
    pub release: Option<Version>,

    /// Directory to install into [default: $XDG_BIN_HOME or ~/.local/bin].
    #[arg(short = 'd', long, value_name = "DIR")]
    pub install_dir: Option<Utf8PathBuf>,

    /// Release table to read instead of the bundled one.
    #[arg(long, value_name = "FILE")]
    pub release_table: Option<Utf8PathBuf>,

    /// Install the build for this OS instead of the detected one.
    #[arg(long, value_name = "OS")]
    pub os: Option<OsFamily>,

    /// Install the build for this architecture instead of the detected one.
    #[arg(long, value_name = "ARCH")]
    pub arch: Option<Architecture>,

    /// Overall time limit in seconds [default: 30].
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Configuration file [default: $GA_INSTALLER_CONFIG or the user config dir].
    #[arg(long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Show the artifact that would be installed and exit.
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the post-install self-check.
    #[arg(long)]
    pub no_probe: bool,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, conflicts_with = "verbosity")]
    pub quiet: bool,
}

/// Arguments for the list command.
#[derive(Parser, Debug, Clone, Default)]
pub struct ListArgs {
    /// Output in JSON format for scripting.
    #[arg(long)]
    pub json: bool,

    /// Release table to read instead of the bundled one.
    #[arg(long, value_name = "FILE")]
    pub release_table: Option<Utf8PathBuf>,

    /// Configuration file [default: $GA_INSTALLER_CONFIG or the user config dir].
    #[arg(long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,
}

impl Cli {
    /// The install arguments in effect, whether given at top level or after
    /// an explicit `install` subcommand.
    #[must_use]
    pub fn install_args(&self) -> &InstallArgs {
        match &self.command {
            Some(Command::Install(args)) => args,
            _ => &self.install,
        }
    }

    /// The log verbosity requested on the command line.
    #[must_use]
    pub fn verbosity(&self) -> u8 {
        match &self.command {
            Some(Command::List(_)) => self.install.verbosity,
            _ => self.install_args().verbosity,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
