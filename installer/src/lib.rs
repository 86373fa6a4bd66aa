//! Verified installer for the `ga` (Git Assistant) command-line tool.
//!
//! This crate turns "put `ga` on this machine" into a short, checked
//! pipeline: resolve the platform, locate the matching release archive,
//! download it, verify its SHA-256 digest, place the binary atomically, and
//! smoke-test it. It backs the `ga-installer` binary and can be driven
//! programmatically with injected downloaders and probe runners.
//!
//! # Modules
//!
//! - [`artefact`] - Download, digest verification, and archive extraction
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Configuration file loading and settings layering
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`error`] - Error taxonomy and exit codes
//! - [`install`] - Atomic placement of the extracted binary
//! - [`list`] - The `list` subcommand
//! - [`lock`] - Install directory locking
//! - [`output`] - Human-facing messages
//! - [`pipeline`] - Stage sequencing, cancellation, and deadlines
//! - [`platform`] - Host platform detection and normalisation
//! - [`probe`] - Post-install smoke test
//! - [`release`] - Release table and artifact locator

pub mod artefact;
pub mod cli;
pub mod config;
pub mod dirs;
pub mod error;
pub mod install;
pub mod list;
pub mod lock;
pub mod output;
pub mod pipeline;
pub mod platform;
pub mod probe;
pub mod release;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
