//! Host platform resolution.
//!
//! Maps the running operating system and processor architecture onto the
//! small matrix of platforms that `ga` releases are published for:
//! {macOS, Linux} x {arm64, amd64}. Anything outside that matrix is rejected
//! rather than mapped onto a "closest" artifact.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Operating system families with published release artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// Apple macOS (Darwin).
    #[serde(alias = "darwin")]
    Macos,
    /// Linux with a glibc or musl userland.
    Linux,
}

impl OsFamily {
    /// Return the canonical lowercase name used in release tables.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Macos => "macos",
            Self::Linux => "linux",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "macos" | "darwin" => Some(Self::Macos),
            "linux" => Some(Self::Linux),
            _ => None,
        }
    }
}

/// Processor architectures with published release artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// 64-bit ARM (`aarch64`).
    #[serde(alias = "aarch64")]
    Arm64,
    /// 64-bit x86 (`x86_64`).
    #[serde(alias = "x86_64")]
    Amd64,
}

impl Architecture {
    /// Return the canonical lowercase name used in release tables.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::Amd64 => "amd64",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "arm64" | "aarch64" => Some(Self::Arm64),
            "amd64" | "x86_64" | "x86-64" => Some(Self::Amd64),
            _ => None,
        }
    }
}

/// A supported (operating system, architecture) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system family.
    pub os: OsFamily,
    /// Processor architecture.
    pub arch: Architecture,
}

impl Platform {
    /// Construct a platform from its parts.
    #[must_use]
    pub const fn new(os: OsFamily, arch: Architecture) -> Self {
        Self { os, arch }
    }

    /// Every platform that releases are published for.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [
            Self::new(OsFamily::Macos, Architecture::Arm64),
            Self::new(OsFamily::Macos, Architecture::Amd64),
            Self::new(OsFamily::Linux, Architecture::Arm64),
            Self::new(OsFamily::Linux, Architecture::Amd64),
        ]
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Errors raised when a host or override does not name a supported platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The host operating system and architecture pair has no artifacts.
    #[error("unsupported platform {os}/{arch}; supported: macos or linux on arm64 or amd64")]
    Unsupported {
        /// Operating system reported by the host or override.
        os: String,
        /// Architecture reported by the host or override.
        arch: String,
    },

    /// An `--os` override value is not a known operating system.
    #[error("unknown operating system \"{0}\"; expected macos or linux")]
    UnknownOs(String),

    /// An `--arch` override value is not a known architecture.
    #[error("unknown architecture \"{0}\"; expected arm64 or amd64")]
    UnknownArch(String),
}

impl FromStr for OsFamily {
    type Err = PlatformError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| PlatformError::UnknownOs(value.to_owned()))
    }
}

impl FromStr for Architecture {
    type Err = PlatformError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| PlatformError::UnknownArch(value.to_owned()))
    }
}

/// Resolve the platform of the running process.
///
/// # Errors
///
/// Returns [`PlatformError::Unsupported`] when the host is not one of the
/// four published platforms.
///
/// # Examples
///
/// ```
/// use ga_installer::platform::resolve;
///
/// // Succeeds on macOS and Linux hosts running arm64 or amd64.
/// let _ = resolve();
/// ```
pub fn resolve() -> Result<Platform, PlatformError> {
    resolve_from(std::env::consts::OS, std::env::consts::ARCH)
}

/// Map raw host strings (as reported by `std::env::consts`) onto a platform.
///
/// # Errors
///
/// Returns [`PlatformError::Unsupported`] when either half is unknown.
///
/// # Examples
///
/// ```
/// use ga_installer::platform::{Architecture, OsFamily, resolve_from};
///
/// let platform = resolve_from("macos", "aarch64").expect("supported");
/// assert_eq!(platform.os, OsFamily::Macos);
/// assert_eq!(platform.arch, Architecture::Arm64);
///
/// assert!(resolve_from("windows", "x86_64").is_err());
/// ```
pub fn resolve_from(os: &str, arch: &str) -> Result<Platform, PlatformError> {
    match (OsFamily::parse(os), Architecture::parse(arch)) {
        (Some(os), Some(arch)) => Ok(Platform::new(os, arch)),
        _ => Err(PlatformError::Unsupported {
            os: os.to_owned(),
            arch: arch.to_owned(),
        }),
    }
}

/// Resolve the platform, letting explicit overrides replace either half of
/// the detected host.
///
/// With both overrides present the host is not consulted at all, so an
/// operator on an unsupported host can still name a platform explicitly.
/// Otherwise the host itself must be supported before any half is replaced.
///
/// # Errors
///
/// Returns [`PlatformError::Unsupported`] when the host is unsupported and
/// not fully overridden.
pub fn resolve_with_overrides(
    host_os: &str,
    host_arch: &str,
    os: Option<OsFamily>,
    arch: Option<Architecture>,
) -> Result<Platform, PlatformError> {
    if let (Some(os), Some(arch)) = (os, arch) {
        return Ok(Platform::new(os, arch));
    }
    let host = resolve_from(host_os, host_arch)?;
    Ok(Platform::new(os.unwrap_or(host.os), arch.unwrap_or(host.arch)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::macos_arm("macos", "aarch64", OsFamily::Macos, Architecture::Arm64)]
    #[case::macos_intel("macos", "x86_64", OsFamily::Macos, Architecture::Amd64)]
    #[case::linux_arm("linux", "aarch64", OsFamily::Linux, Architecture::Arm64)]
    #[case::linux_intel("linux", "x86_64", OsFamily::Linux, Architecture::Amd64)]
    #[case::darwin_alias("darwin", "arm64", OsFamily::Macos, Architecture::Arm64)]
    #[case::amd64_alias("Linux", "AMD64", OsFamily::Linux, Architecture::Amd64)]
    fn resolves_supported_hosts(
        #[case] os: &str,
        #[case] arch: &str,
        #[case] expected_os: OsFamily,
        #[case] expected_arch: Architecture,
    ) {
        let platform = resolve_from(os, arch).expect("supported host");
        assert_eq!(platform, Platform::new(expected_os, expected_arch));
    }

    #[rstest]
    #[case::windows("windows", "x86_64")]
    #[case::freebsd("freebsd", "x86_64")]
    #[case::linux_32bit("linux", "x86")]
    #[case::macos_powerpc("macos", "powerpc64")]
    fn rejects_unsupported_hosts(#[case] os: &str, #[case] arch: &str) {
        let err = resolve_from(os, arch).expect_err("unsupported host");
        assert_eq!(
            err,
            PlatformError::Unsupported {
                os: os.to_owned(),
                arch: arch.to_owned(),
            }
        );
        assert!(err.to_string().contains("unsupported platform"));
    }

    #[test]
    fn overrides_replace_host_halves() {
        let platform =
            resolve_with_overrides("macos", "aarch64", None, Some(Architecture::Amd64))
                .expect("override applies");
        assert_eq!(platform, Platform::new(OsFamily::Macos, Architecture::Amd64));
    }

    #[test]
    fn full_override_ignores_unsupported_host() {
        let platform = resolve_with_overrides(
            "windows",
            "x86_64",
            Some(OsFamily::Linux),
            Some(Architecture::Amd64),
        )
        .expect("explicit platform");
        assert_eq!(platform, Platform::new(OsFamily::Linux, Architecture::Amd64));
    }

    #[test]
    fn partial_override_still_rejects_unsupported_host() {
        let result = resolve_with_overrides("windows", "x86_64", Some(OsFamily::Linux), None);
        assert!(matches!(result, Err(PlatformError::Unsupported { .. })));
    }

    #[rstest]
    #[case::os_only("linux", "riscv64", None, Some(Architecture::Arm64))]
    #[case::arch_only("freebsd", "aarch64", Some(OsFamily::Macos), None)]
    fn partial_override_of_unknown_half_is_still_rejected(
        #[case] host_os: &str,
        #[case] host_arch: &str,
        #[case] os: Option<OsFamily>,
        #[case] arch: Option<Architecture>,
    ) {
        let err = resolve_with_overrides(host_os, host_arch, os, arch).expect_err("host checked");
        assert_eq!(
            err,
            PlatformError::Unsupported {
                os: host_os.to_owned(),
                arch: host_arch.to_owned(),
            }
        );
    }

    #[test]
    fn from_str_rejects_unknown_values() {
        assert!(matches!(
            "solaris".parse::<OsFamily>(),
            Err(PlatformError::UnknownOs(_))
        ));
        assert!(matches!(
            "riscv64".parse::<Architecture>(),
            Err(PlatformError::UnknownArch(_))
        ));
    }

    #[test]
    fn display_uses_table_names() {
        let platform = Platform::new(OsFamily::Macos, Architecture::Arm64);
        assert_eq!(platform.to_string(), "macos/arm64");
    }

    #[test]
    fn all_lists_each_platform_once() {
        let all = Platform::all();
        let unique: std::collections::BTreeSet<_> = all.iter().collect();
        assert_eq!(unique.len(), 4);
    }
}
