//! SHA-256 digest newtype for artifact verification.
//!
//! Release tables carry digests as 64 hexadecimal characters. Parsing is
//! case-insensitive via `hex`; the digest is stored as raw bytes and always rendered in
//! lowercase.

use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Expected length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Errors arising from malformed digest strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    /// The string does not have exactly 64 characters.
    #[error("expected {DIGEST_HEX_LEN} hex characters, got {0}")]
    Length(usize),

    /// The string contains a character outside `[0-9a-fA-F]`.
    #[error("non-hex character '{0}'")]
    NonHex(char),
}

/// A 256-bit SHA-256 digest.
///
/// # Examples
///
/// ```
/// use ga_installer::release::sha256_digest::Sha256Digest;
///
/// let upper = "AB".repeat(32);
/// let digest: Sha256Digest = upper.as_str().try_into().expect("valid digest");
/// assert_eq!(digest.to_string(), "ab".repeat(32));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    /// Compute the digest of `bytes`.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Wrap an already-finalised hasher.
    #[must_use]
    pub fn from_hasher(hasher: Sha256) -> Self {
        Self(hasher.finalize().into())
    }

    /// Return the raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Compare two digests without short-circuiting on the first difference.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = DigestError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        decode_hex(value.trim()).map(Self)
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// The digest a release table declares for one artifact.
///
/// Release tooling writes a placeholder (for example `PENDING_ARM64_SHA256`)
/// until the archive is uploaded. Such rows are kept so they can be listed,
/// but they are never installable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredDigest {
    /// A well-formed digest the downloaded bytes must match.
    Known(Sha256Digest),
    /// No usable digest; holds the raw placeholder text (empty when absent).
    Pending(String),
}

impl DeclaredDigest {
    /// Interpret the raw `sha256` value of a release-table row.
    ///
    /// # Examples
    ///
    /// ```
    /// use ga_installer::release::sha256_digest::DeclaredDigest;
    ///
    /// let pending = DeclaredDigest::parse(Some("PENDING_ARM64_SHA256"));
    /// assert!(!pending.is_known());
    ///
    /// let known = DeclaredDigest::parse(Some(&"0".repeat(64)));
    /// assert!(known.is_known());
    /// ```
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(value) => match Sha256Digest::try_from(value) {
                Ok(digest) => Self::Known(digest),
                Err(_) => Self::Pending(value.to_owned()),
            },
            None => Self::Pending(String::new()),
        }
    }

    /// Whether the row carries a usable digest.
    #[must_use]
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl fmt::Display for DeclaredDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(digest) => write!(f, "{digest}"),
            Self::Pending(raw) if raw.is_empty() => f.write_str("<missing>"),
            Self::Pending(raw) => f.write_str(raw),
        }
    }
}

fn decode_hex(value: &str) -> Result<[u8; 32], DigestError> {
    if value.len() != DIGEST_HEX_LEN {
        return Err(DigestError::Length(value.chars().count()));
    }
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(value, &mut bytes).map_err(|err| match err {
        hex::FromHexError::InvalidHexCharacter { c, .. } => DigestError::NonHex(c),
        hex::FromHexError::OddLength | hex::FromHexError::InvalidStringLength => {
            DigestError::Length(value.len())
        }
    })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // sha256("hello world")
    const HELLO_DIGEST: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn of_matches_known_vector() {
        let digest = Sha256Digest::of(b"hello world");
        assert_eq!(digest.to_string(), HELLO_DIGEST);
    }

    #[test]
    fn parsing_is_case_insensitive() {
        let lower = Sha256Digest::try_from(HELLO_DIGEST).expect("lowercase");
        let upper = Sha256Digest::try_from(HELLO_DIGEST.to_ascii_uppercase()).expect("uppercase");
        assert_eq!(lower, upper);
        assert!(lower.matches(&upper));
    }

    #[test]
    fn matches_detects_single_bit_difference() {
        let a = Sha256Digest::of(b"artifact");
        let mut flipped = *a.as_bytes();
        if let Some(last) = flipped.last_mut() {
            *last ^= 1;
        }
        let b = Sha256Digest(flipped);
        assert!(!a.matches(&b));
    }

    #[rstest]
    #[case::too_short("abcdef".to_owned(), DigestError::Length(6))]
    #[case::too_long("a".repeat(65), DigestError::Length(65))]
    #[case::non_hex(format!("{}g", "a".repeat(63)), DigestError::NonHex('g'))]
    fn rejects_malformed_digests(#[case] value: String, #[case] expected: DigestError) {
        assert_eq!(Sha256Digest::try_from(value), Err(expected));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let padded = format!("  {HELLO_DIGEST}\n");
        assert!(Sha256Digest::try_from(padded.as_str()).is_ok());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let digest = Sha256Digest::of(b"ga release");
        let rendered = digest.to_string();
        assert_eq!(rendered.len(), DIGEST_HEX_LEN);
        assert!(rendered.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_eq!(Sha256Digest::try_from(rendered), Ok(digest));
    }

    #[rstest]
    #[case::placeholder(Some("PENDING_LINUX_AMD64_SHA256"), "PENDING_LINUX_AMD64_SHA256")]
    #[case::missing(None, "<missing>")]
    fn placeholder_digests_are_pending(#[case] raw: Option<&str>, #[case] shown: &str) {
        let declared = DeclaredDigest::parse(raw);
        assert!(!declared.is_known());
        assert_eq!(declared.to_string(), shown);
    }
}
