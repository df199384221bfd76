//! # Digest Selector
//!
//! Maps a configured algorithm name to a hash function and renders digests
//! as lowercase hexadecimal, the format the referential files are written in.
//!
//! ## Fail-Soft Dispatch
//!
//! Masking only works when the builder side and the matching side use the
//! same algorithm; which one is chosen does not matter. An unknown or empty
//! name therefore resolves to SHA-256 instead of failing.
//!
//! | Name (any case, dash or underscore optional) | Algorithm | Hex length |
//! |--------------------------------|-----------|------------|
//! | `SHA1`                         | SHA-1     | 40         |
//! | `SHA256`                       | SHA-256   | 64         |
//! | `SHA512`                       | SHA-512   | 128        |
//! | `MD5`                          | MD5       | 32         |
//! | anything else                  | SHA-256   | 64         |
//!
//! ## Example
//!
//! ```rust
//! use dlp_core::{digest, HashAlgorithm};
//!
//! let algo = HashAlgorithm::from_name("SHA256");
//! assert_eq!(algo.digest("secret"), digest("FOO", "secret"));
//! ```

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use tracing::debug;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HashAlgorithm {
    /// SHA-1 (160-bit).
    Sha1,
    /// SHA-256 (256-bit). The default.
    #[default]
    Sha256,
    /// SHA-512 (512-bit).
    Sha512,
    /// MD5 (128-bit).
    Md5,
}

impl HashAlgorithm {
    /// Resolves a configured algorithm name.
    ///
    /// Matching ignores case, dashes and underscores, so `sha-512`,
    /// `sha_512` and `SHA512` are the same. Unrecognised names fall back to [`HashAlgorithm::Sha256`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match normalized.as_str() {
            "SHA1" => Self::Sha1,
            "SHA256" => Self::Sha256,
            "SHA512" => Self::Sha512,
            "MD5" => Self::Md5,
            _ => {
                debug!("Unknown hashing algorithm '{}', using SHA256", name);
                Self::Sha256
            }
        }
    }

    /// Canonical configuration name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
            Self::Md5 => "MD5",
        }
    }

    /// Length of the hex digest this algorithm produces.
    #[must_use]
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha512 => 128,
            Self::Md5 => 32,
        }
    }

    /// Hashes the UTF-8 bytes of `input` and returns lowercase hex.
    #[must_use]
    pub fn digest(self, input: &str) -> String {
        let bytes = input.as_bytes();
        match self {
            Self::Sha1 => hex::encode(Sha1::digest(bytes)),
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
            Self::Sha512 => hex::encode(Sha512::digest(bytes)),
            Self::Md5 => hex::encode(Md5::digest(bytes)),
        }
    }
}

impl From<String> for HashAlgorithm {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<&str> for HashAlgorithm {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

impl From<HashAlgorithm> for String {
    fn from(algo: HashAlgorithm) -> Self {
        algo.name().to_string()
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Digests `input` with the algorithm named `algorithm`.
///
/// Shorthand for `HashAlgorithm::from_name(algorithm).digest(input)`.
#[must_use]
pub fn digest(algorithm: &str, input: &str) -> String {
    HashAlgorithm::from_name(algorithm).digest(input)
}
