//! Same-length placeholder masking.
//!
//! Every character of a matched token is replaced by the placeholder,
//! regardless of class. Output length (in chars) always equals input length.

/// Default placeholder character.
pub const DEFAULT_PLACEHOLDER: char = '#';

/// Masks `token` with [`DEFAULT_PLACEHOLDER`].
///
/// ```rust
/// assert_eq!(dlp_core::mask("secret"), "######");
/// ```
#[must_use]
pub fn mask(token: &str) -> String {
    mask_with(token, DEFAULT_PLACEHOLDER)
}

/// Masks `token` with an explicit placeholder character.
#[must_use]
pub fn mask_with(token: &str, placeholder: char) -> String {
    token.chars().map(|_| placeholder).collect()
}
