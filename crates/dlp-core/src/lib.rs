//! # DLP Core
//!
//! Masks sensitive tokens inside free-text event fields. A token is
//! sensitive when its digest appears in the denylist (the "referential")
//! of the event's application code.
//!
//! ## Components
//!
//! | Component | Module | Purpose |
//! |-----------|--------|---------|
//! | Digest Selector | [`digest`] | Algorithm name → hex digest, SHA-256 fallback |
//! | Referential File | [`referential`] | `<hash_path><code>.data` reader |
//! | Referential Cache | [`cache`] | Load-once, per-code single-flight cache |
//! | Masker | [`mask`] | Same-length placeholder |
//! | Tokenizer | [`tokenize`] | Split, classify, rejoin |
//! | Filters | [`DlpProcessor`], [`HashFilter`] | Pipeline integration |
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        DlpProcessor                        │
//! │                                                            │
//! │  field ─▶ Tokenizer ─▶ Digest ─▶ ReferentialCache ─▶ Mask  │
//! │                                        │                   │
//! │                                        ▼                   │
//! │                          <hash_path><code>.data            │
//! │                          (written by dlp-denylist)         │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dlp_core::{DlpConfig, DlpProcessor, Filter, JsonEvent, NoopListener};
//!
//! let config = DlpConfig::load("config/dlp.toml")?;
//! let processor = DlpProcessor::with_own_cache(config.processor);
//!
//! let mut events = vec![JsonEvent::from_json(r#"{"elk":"app1","message":"the secret code"}"#)?];
//! processor.filter(&mut events, &NoopListener);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Security Notes
//!
//! - Matching is per whitespace-delimited token; phrases are never matched
//!   as a unit.
//! - Missing referential files are fail-open by default: the field is left
//!   unmasked. Set `on_load_failure = "fail_closed"` to mask whole fields
//!   instead.
//! - Referentials are loaded once per process; a rebuilt file is only
//!   picked up after [`ReferentialCache::invalidate`] or a restart.

pub mod cache;
pub mod config;
pub mod digest;
mod error;
pub mod event;
mod hash_filter;
pub mod mask;
mod processor;
pub mod referential;
pub mod tokenize;

pub use cache::{LoadStatus, Referential, ReferentialCache};
pub use config::{
    DenylistConfig, DlpConfig, DrainMode, HashFilterConfig, LoadFailurePolicy, ProcessorConfig,
    StreamConfig,
};
pub use digest::{digest, HashAlgorithm};
pub use error::DlpError;
pub use event::{CountingListener, Event, Filter, JsonEvent, MatchListener, NoopListener};
pub use hash_filter::HashFilter;
pub use mask::mask;
pub use processor::DlpProcessor;
pub use referential::{read_digest_set, referential_path, DigestSet};
pub use tokenize::Redaction;

/// Core result type for DLP operations.
pub type Result<T> = std::result::Result<T, DlpError>;
