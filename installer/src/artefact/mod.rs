//! Release archive retrieval, verification, and extraction.
//!
//! # Sub-modules
//!
//! - [`download`] - Archive download trait and HTTP implementation.
//! - [`verification`] - Fetch into a temporary directory and SHA-256 check.
//! - [`extraction`] - Format detection and single-binary extraction with
//!   path traversal protection.

pub mod download;
pub mod extraction;
pub mod verification;
