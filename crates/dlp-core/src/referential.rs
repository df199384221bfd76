//! # Referential Files
//!
//! On-disk form of a denylist: one hex digest per line, no header. Files
//! live at `<hash_path><application_code>.data` (plain concatenation, so
//! `hash_path` is expected to end with a separator).
//!
//! Lines may repeat or come unsorted on disk, since the builder only ever
//! appends. The in-memory [`DigestSet`] always deduplicates.
//!
//! ## Encoding
//!
//! Files are decoded one byte per character (ISO-8859-1), so an arbitrary
//! byte never causes a transcoding error. Digests are plain ASCII, which
//! this decoding leaves untouched.

use crate::{error::DlpError, Result};
use std::collections::hash_set;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Extension appended to the application code.
pub const REFERENTIAL_EXTENSION: &str = ".data";

/// Initial capacity reserved for a freshly loaded set.
const EXPECTED_ENTRIES: usize = 1 << 16;

/// Resolves the referential file for `application_code` under `hash_path`.
///
/// ```rust
/// use dlp_core::referential::referential_path;
///
/// let path = referential_path("/pdata/DLP/", "app1");
/// assert_eq!(path.to_str(), Some("/pdata/DLP/app1.data"));
/// ```
#[must_use]
pub fn referential_path(hash_path: &str, application_code: &str) -> PathBuf {
    PathBuf::from(format!(
        "{}{}{}",
        hash_path, application_code, REFERENTIAL_EXTENSION
    ))
}

/// Deduplicated set of digest strings for one application code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestSet {
    digests: HashSet<String>,
}

impl DigestSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `digest` is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, digest: &str) -> bool {
        self.digests.contains(digest)
    }

    /// Adds a digest, returning `false` if it was already present.
    pub fn insert(&mut self, digest: impl Into<String>) -> bool {
        self.digests.insert(digest.into())
    }

    /// Number of distinct digests.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    /// Returns `true` if the set holds no digests.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Iterates the digests in arbitrary order.
    pub fn iter(&self) -> hash_set::Iter<'_, String> {
        self.digests.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for DigestSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            digests: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a DigestSet {
    type Item = &'a String;
    type IntoIter = hash_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.digests.iter()
    }
}

/// Reads a referential file into a [`DigestSet`].
///
/// Blank lines are ignored and a trailing `\r` is stripped so files written
/// on other platforms still match.
///
/// # Errors
///
/// Returns [`DlpError::Io`] if the file cannot be opened or read.
pub fn read_digest_set(path: &Path) -> Result<DigestSet> {
    let file = File::open(path).map_err(|e| DlpError::io(path, e))?;
    let mut reader = BufReader::new(file);

    let mut digests = HashSet::with_capacity(EXPECTED_ENTRIES);
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| DlpError::io(path, e))?;
        if read == 0 {
            break;
        }

        let entry = decode_latin1(trim_line_ending(&line));
        if !entry.is_empty() {
            digests.insert(entry);
        }
    }

    digests.shrink_to_fit();
    Ok(DigestSet { digests })
}

fn trim_line_ending(mut line: &[u8]) -> &[u8] {
    if let [rest @ .., b'\n'] = line {
        line = rest;
    }
    if let [rest @ .., b'\r'] = line {
        line = rest;
    }
    line
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
