//! Human-facing messages for the installer CLI.
//!
//! Progress and diagnostics go to stderr; only `list` output goes to stdout.

use crate::install::InstalledBinary;
use crate::probe::ProbeError;
use crate::release::table::{PackageInfo, ReleaseArtifact};
use camino::Utf8Path;
use std::io::Write;

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

/// Format the success line printed after an install.
///
/// # Examples
///
/// ```
/// use camino::Utf8PathBuf;
/// use ga_installer::install::InstalledBinary;
/// use ga_installer::output::success_message;
///
/// let binary = InstalledBinary {
///     path: Utf8PathBuf::from("/home/user/.local/bin/ga"),
///     size: 1024,
/// };
/// let message = success_message("ga", &semver::Version::new(0, 1, 0), &binary);
/// assert_eq!(message, "Installed ga 0.1.0 to /home/user/.local/bin/ga");
/// ```
#[must_use]
pub fn success_message(name: &str, version: &semver::Version, binary: &InstalledBinary) -> String {
    format!("Installed {name} {version} to {}", binary.path)
}

/// Format the warning printed when the post-install probe fails.
#[must_use]
pub fn probe_warning_message(binary: &InstalledBinary, warning: &ProbeError) -> String {
    format!(
        "Warning: {} was installed but did not pass its self-check: {warning}",
        binary.path
    )
}

/// Format the dry-run report for a located artifact.
#[must_use]
pub fn dry_run_message(artifact: &ReleaseArtifact, final_path: &Utf8Path) -> String {
    format!(
        concat!(
            "Dry run: no changes made.\n",
            "  Version:     {}\n",
            "  Platform:    {}\n",
            "  URL:         {}\n",
            "  SHA-256:     {}\n",
            "  Install to:  {}"
        ),
        artifact.version, artifact.platform, artifact.url, artifact.digest, final_path
    )
}

/// Format post-install caveats, if the package declares any.
#[must_use]
pub fn caveats_message(package: &PackageInfo) -> Option<String> {
    let caveats = package.caveats.as_deref()?.trim();
    if caveats.is_empty() {
        return None;
    }
    Some(format!("\n{caveats}"))
}

/// Returns true when `dir` appears on `PATH`.
#[must_use]
pub fn is_directory_in_path(dir: &Utf8Path) -> bool {
    std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).any(|p| p == dir.as_std_path()))
        .unwrap_or(false)
}

/// Returns instructions for adding a directory to `PATH`.
#[must_use]
pub fn path_instructions(dir: &Utf8Path) -> String {
    format!(
        concat!(
            "{dir} is not on your PATH. ",
            "Add the following to your shell profile (~/.bashrc or ~/.zshrc):\n",
            "  export PATH=\"{dir}:$PATH\""
        ),
        dir = dir
    )
}
