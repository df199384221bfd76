//! # Tokenizer / Classifier
//!
//! Splits a field on the space character, classifies each token by digest
//! membership and rejoins the result with single spaces.
//!
//! ## Token Boundaries
//!
//! Boundaries are whitespace only and each token is matched on its own.
//! A multi-word sensitive phrase is never matched as a unit; denylist
//! entries are expected to be single tokens.
//!
//! Pieces are trimmed of surrounding whitespace (tabs, newlines) but empty
//! pieces are kept, so `"a  b"` rejoins as `"a  b"`.
//!
//! ## Example
//!
//! ```rust
//! use dlp_core::tokenize::redact_tokens;
//!
//! let redaction = redact_tokens("the secret code", '#', |token| token == "secret");
//! assert_eq!(redaction.text, "the ###### code");
//! assert_eq!(redaction.masked, 1);
//! ```

use crate::cache::Referential;
use crate::digest::HashAlgorithm;
use crate::mask::mask_with;

/// Token separator used for both splitting and rejoining.
pub const SEPARATOR: char = ' ';

/// Result of redacting one field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction {
    /// The rejoined field value.
    pub text: String,
    /// Number of tokens that were masked.
    pub masked: usize,
}

/// Iterates the trimmed tokens of `value` in order.
pub fn tokens(value: &str) -> impl Iterator<Item = &str> {
    value.split(SEPARATOR).map(str::trim)
}

/// Masks every token for which `is_sensitive` returns `true`.
pub fn redact_tokens<F>(value: &str, placeholder: char, mut is_sensitive: F) -> Redaction
where
    F: FnMut(&str) -> bool,
{
    let mut text = String::with_capacity(value.len());
    let mut masked = 0;

    for (i, token) in tokens(value).enumerate() {
        if i > 0 {
            text.push(SEPARATOR);
        }
        if !token.is_empty() && is_sensitive(token) {
            text.push_str(&mask_with(token, placeholder));
            masked += 1;
        } else {
            text.push_str(token);
        }
    }

    Redaction { text, masked }
}

/// Masks tokens whose `algorithm` digest is in `referential`.
#[must_use]
pub fn redact(
    value: &str,
    referential: &Referential,
    algorithm: HashAlgorithm,
    placeholder: char,
) -> Redaction {
    redact_tokens(value, placeholder, |token| {
        referential.contains(&algorithm.digest(token))
    })
}

/// Masks every token, used when the referential is unavailable and the
/// policy is fail-closed.
#[must_use]
pub fn redact_all(value: &str, placeholder: char) -> Redaction {
    redact_tokens(value, placeholder, |_| true)
}
