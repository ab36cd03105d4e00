//! Digest newtypes.
//!
//! Two kinds of digest flow through the system: the plain SHA-256 of a
//! downloaded file (compared against published checksum files) and the
//! content-address of an unpacked artifact as produced by the
//! content-addressing helper (used as the storage key downstream).

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

/// Alphabet of the base-32 encoding used by the content-addressing helper.
const NIX_BASE32: &str = "0123456789abcdfghijklmnpqrsvwxyz";

/// Errors produced while validating digest strings.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    /// The string is not 64 hexadecimal characters.
    #[error("Invalid SHA256 digest: expected 64 hex characters, got '{0}'")]
    InvalidSha256(String),

    /// The string is not a recognised content-address encoding.
    #[error("Invalid content hash '{0}': expected base-32 (52 chars), hex (64 chars) or SRI form")]
    InvalidContentHash(String),
}

/// A validated SHA256 digest (64 hex characters)
///
/// Always stored lowercase. Used for the raw bytes of a download, e.g. when
/// comparing against a published `.sha256` checksum file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Create a new `Sha256Digest`, validating the input.
    ///
    /// Accepts strings with or without a `sha256:` prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the hex portion is not exactly 64 ASCII hex characters.
    pub fn new(s: impl Into<String>) -> Result<Self, DigestError> {
        let s = s.into();
        let hex = s.strip_prefix("sha256:").unwrap_or(&s);

        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DigestError::InvalidSha256(s));
        }

        Ok(Self(hex.to_lowercase()))
    }

    /// Compute the SHA256 digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(data)))
    }

    /// Get the digest as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Content-address of a verified artifact.
///
/// This is the digest of the artifact's normalised (unpacked) contents, so
/// two archives with identical contents but different container metadata
/// share one address. Stored exactly as the helper printed it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Create a new `ContentHash`, validating the encoding.
    ///
    /// Accepted forms are the helper's 52 character base-32 encoding, 64
    /// character hex, and SRI strings (`sha256-<base64>`).
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::InvalidContentHash`] for any other input.
    pub fn new(s: impl Into<String>) -> Result<Self, DigestError> {
        let s = s.into();
        let valid = match s.len() {
            52 => s.chars().all(|c| NIX_BASE32.contains(c)),
            64 => s.chars().all(|c| c.is_ascii_hexdigit()),
            _ => s
                .strip_prefix("sha256-")
                .is_some_and(|b64| b64.len() == 44 && b64.ends_with('=')),
        };

        if valid {
            Ok(Self(s))
        } else {
            Err(DigestError::InvalidContentHash(s))
        }
    }

    /// Return the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NIX: &str = "0v1ggqw8zhv8am3gwy8bsrq3qxv1xc3icxqk7ij9rnpqmwq3g5d1";

    #[test]
    fn sha256_compute_matches_known_vector() {
        let digest = Sha256Digest::compute(b"hello world");
        assert_eq!(
            digest.as_str(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn sha256_accepts_prefix_and_lowercases() {
        let upper = "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9";
        let digest = Sha256Digest::new(format!("sha256:{upper}")).unwrap();
        assert_eq!(digest, Sha256Digest::compute(b"hello world"));
    }

    #[test]
    fn sha256_rejects_short_input() {
        assert!(Sha256Digest::new("abc").is_err());
    }

    #[test]
    fn content_hash_accepts_known_encodings() {
        assert!(ContentHash::new(NIX).is_ok());
        assert!(ContentHash::new("a".repeat(64)).is_ok());
        assert!(ContentHash::new(format!("sha256-{}=", "A".repeat(43))).is_ok());
    }

    #[test]
    fn content_hash_rejects_foreign_alphabet() {
        // 'e', 'o', 'u' and 't' are not part of the base-32 alphabet
        let bad = format!("{}e", &NIX[..51]);
        assert!(ContentHash::new(bad).is_err());
        assert!(ContentHash::new("").is_err());
    }

    #[test]
    fn content_hash_deserialize_validates() {
        let ok: Result<ContentHash, _> = serde_json::from_str(&format!("\"{NIX}\""));
        assert!(ok.is_ok());
        let bad: Result<ContentHash, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
