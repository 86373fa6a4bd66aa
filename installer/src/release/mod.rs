//! Release metadata: the versioned artifact table and digest types.
//!
//! # Sub-modules
//!
//! - [`sha256_digest`] - SHA-256 digest newtype and declared-digest states.
//! - [`table`] - Release table loading and the exact-match artifact locator.

pub mod sha256_digest;
pub mod table;
