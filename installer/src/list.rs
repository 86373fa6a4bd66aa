//! List command implementation.
//!
//! Prints every row of the release table, marking the host platform and
//! whether each artifact can be installed yet.

use crate::cli::ListArgs;
use crate::config::{load_config, release_table};
use crate::dirs::BaseDirs;
use crate::error::{InstallError, Result};
use crate::platform::{Platform, resolve};
use crate::release::table::{ReleaseTable, TableEntry};
use serde::Serialize;
use std::io::Write;

/// Lists the releases in the effective release table.
///
/// Output is written to `stdout`, human-readable by default and JSON with
/// `--json`.
///
/// # Errors
///
/// Returns an error if the configuration or release table cannot be loaded,
/// or writing to `stdout` fails.
pub fn run_list(args: &ListArgs, dirs: &dyn BaseDirs, stdout: &mut dyn Write) -> Result<()> {
    let config = load_config(args.config.as_deref(), dirs)?;
    let table = match release_table(args.release_table.as_deref(), &config) {
        Some(path) => ReleaseTable::load(&path)?,
        None => ReleaseTable::bundled()?,
    };
    write_list(&table, resolve().ok(), args.json, stdout)
}

fn write_list(
    table: &ReleaseTable,
    host: Option<Platform>,
    json: bool,
    stdout: &mut dyn Write,
) -> Result<()> {
    let output = if json {
        format_json(table, host)
    } else {
        format_human(table, host)
    };
    writeln!(stdout, "{output}").map_err(|source| InstallError::WriteFailed { source })
}

fn status(entry: &TableEntry<'_>) -> &'static str {
    if entry.digest.is_known() {
        "ready"
    } else {
        "pending"
    }
}

/// Format the table for human-readable output.
///
/// # Examples
///
/// ```
/// use ga_installer::list::format_human;
/// use ga_installer::release::table::ReleaseTable;
///
/// let table = ReleaseTable::from_toml_str("[package]\nname = \"ga\"\n").expect("valid");
/// assert!(format_human(&table, None).contains("No releases"));
/// ```
#[must_use]
pub fn format_human(table: &ReleaseTable, host: Option<Platform>) -> String {
    let package = table.package();
    let name = &package.name;
    if table.is_empty() {
        return format!("No releases of {name} are listed.");
    }

    let mut output = match &package.description {
        Some(description) => format!("Releases of {name} ({description}):\n"),
        None => format!("Releases of {name}:\n"),
    };
    if let Some(homepage) = &package.homepage {
        output.push_str(&format!("  homepage: {homepage}\n"));
    }
    if let Some(license) = &package.license {
        output.push_str(&format!("  license:  {license}\n"));
    }
    let mut current = None;
    for entry in table.entries() {
        if current != Some(entry.version) {
            output.push('\n');
            output.push_str(&format!("{}\n", entry.version));
            current = Some(entry.version);
        }
        let marker = if host == Some(entry.platform) {
            " (this host)"
        } else {
            ""
        };
        output.push_str(&format!(
            "  {:<14} {:<8} {}{marker}\n",
            entry.platform.to_string(),
            status(&entry),
            entry.url
        ));
    }
    output
}

/// Format the table as JSON.
#[must_use]
pub fn format_json(table: &ReleaseTable, host: Option<Platform>) -> String {
    let json_data = ReleaseListJson::from_table(table, host);
    serde_json::to_string_pretty(&json_data).unwrap_or_else(|_| "{}".to_owned())
}

/// JSON-serializable view of the release table.
#[derive(Debug, Serialize)]
pub struct ReleaseListJson {
    /// Packaged tool name.
    pub package: String,
    /// One-line description of the tool.
    pub description: Option<String>,
    /// Project home page.
    pub homepage: Option<String>,
    /// Licence identifier.
    pub license: Option<String>,
    /// Latest listed version.
    pub latest: Option<String>,
    /// One entry per table row.
    pub artifacts: Vec<ArtifactEntry>,
}

impl ReleaseListJson {
    fn from_table(table: &ReleaseTable, host: Option<Platform>) -> Self {
        let artifacts = table
            .entries()
            .map(|entry| ArtifactEntry {
                version: entry.version.to_string(),
                os: entry.platform.os.as_str(),
                arch: entry.platform.arch.as_str(),
                url: entry.url.to_owned(),
                sha256: entry.digest.to_string(),
                installable: entry.digest.is_known(),
                host: host == Some(entry.platform),
            })
            .collect();
        let package = table.package();
        Self {
            package: package.name.clone(),
            description: package.description.clone(),
            homepage: package.homepage.clone(),
            license: package.license.clone(),
            latest: table.latest_version().map(ToString::to_string),
            artifacts,
        }
    }
}

/// JSON entry for one artifact.
#[derive(Debug, Serialize)]
pub struct ArtifactEntry {
    /// Release version.
    pub version: String,
    /// Operating system family.
    pub os: &'static str,
    /// CPU architecture.
    pub arch: &'static str,
    /// Download location.
    pub url: String,
    /// Declared digest or placeholder.
    pub sha256: String,
    /// Whether the row has a usable digest.
    pub installable: bool,
    /// Whether the row matches the running host.
    pub host: bool,
}
