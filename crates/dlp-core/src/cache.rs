//! # Referential Cache
//!
//! Process-lifetime cache of [`DigestSet`]s keyed by application code.
//! Referential files are designed for sets on the order of a million
//! digests, so each file is parsed at most once per cache lifetime.
//!
//! ## Concurrency
//!
//! Each application code owns a once-cell stored in a concurrent map. The
//! first lookup for a code runs the load while concurrent lookups for the
//! same code block on that cell and then observe the same `Arc`. Lookups for
//! other codes are not held up.
//!
//! ```text
//!  lookup("app1") ──┐
//!  lookup("app1") ──┼──▶ DashMap<code, Arc<OnceCell<Arc<Referential>>>>
//!  lookup("app2") ──┘          │
//!                              └─▶ get_or_init: one read_digest_set per code
//! ```
//!
//! ## Load Failures
//!
//! A missing or unreadable file is logged and cached as an empty,
//! [`LoadStatus::Unavailable`] referential. Nothing is re-read until the
//! entry is explicitly [invalidated](ReferentialCache::invalidate) or the
//! process restarts. Whether that means "mask nothing" or "mask
//! everything" is decided by the caller's load-failure policy.

use crate::referential::{read_digest_set, referential_path, DigestSet};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of loading a referential file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// The file was read successfully (it may still be empty).
    Loaded,
    /// The file could not be read; the digest set is empty.
    Unavailable,
}

/// A cached denylist for one application code.
#[derive(Debug)]
pub struct Referential {
    application_code: String,
    path: PathBuf,
    digests: DigestSet,
    status: LoadStatus,
}

impl Referential {
    /// The application code this referential belongs to.
    #[must_use]
    pub fn application_code(&self) -> &str {
        &self.application_code
    }

    /// The file the referential was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The loaded digests.
    #[must_use]
    pub fn digests(&self) -> &DigestSet {
        &self.digests
    }

    /// Whether the load succeeded.
    #[must_use]
    pub const fn status(&self) -> LoadStatus {
        self.status
    }

    /// Returns `true` if the file was read.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == LoadStatus::Loaded
    }

    /// Returns `true` if `digest` is in the denylist.
    #[inline]
    #[must_use]
    pub fn contains(&self, digest: &str) -> bool {
        self.digests.contains(digest)
    }
}

type Slot = Arc<OnceCell<Arc<Referential>>>;

/// Lazily loading, load-once cache of referential files.
///
/// `ReferentialCache` is `Send + Sync`; share it behind an `Arc` between
/// pipeline workers.
///
/// # Example
///
/// ```rust,no_run
/// use dlp_core::ReferentialCache;
///
/// let cache = ReferentialCache::new("/pdata/DLP/");
/// let referential = cache.lookup("app1");
/// if referential.contains("2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b") {
///     println!("denylisted");
/// }
/// ```
#[derive(Debug)]
pub struct ReferentialCache {
    hash_path: String,
    entries: DashMap<String, Slot>,
    loads: AtomicUsize,
}

impl ReferentialCache {
    /// Creates an empty cache reading files under `hash_path`.
    #[must_use]
    pub fn new(hash_path: impl Into<String>) -> Self {
        Self {
            hash_path: hash_path.into(),
            entries: DashMap::new(),
            loads: AtomicUsize::new(0),
        }
    }

    /// Directory prefix the referential files are resolved against.
    #[must_use]
    pub fn hash_path(&self) -> &str {
        &self.hash_path
    }

    /// Returns the referential for `application_code`, loading it on first use.
    ///
    /// Never fails: an unreadable file yields an empty, unavailable
    /// referential that stays cached.
    pub fn lookup(&self, application_code: &str) -> Arc<Referential> {
        let slot = match self.entries.get(application_code) {
            Some(entry) => Arc::clone(entry.value()),
            None => Arc::clone(&self.entries.entry(application_code.to_owned()).or_default()),
        };

        Arc::clone(slot.get_or_init(|| Arc::new(self.load(application_code))))
    }

    /// Drops the cached referential for `application_code`.
    ///
    /// The next lookup re-reads the file. Returns `true` if an entry existed.
    pub fn invalidate(&self, application_code: &str) -> bool {
        let removed = self.entries.remove(application_code).is_some();
        if removed {
            info!("Invalidated referential cache entry: {}", application_code);
        }
        removed
    }

    /// Number of file reads performed so far.
    #[must_use]
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Acquire)
    }

    /// Application codes with a cached referential, sorted.
    #[must_use]
    pub fn cached_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .map(|entry| entry.key().clone())
            .collect();
        codes.sort();
        codes
    }

    fn load(&self, application_code: &str) -> Referential {
        let path = referential_path(&self.hash_path, application_code);
        let started = Instant::now();
        info!(
            "Started to load referential for '{}' from {}",
            application_code,
            path.display()
        );

        self.loads.fetch_add(1, Ordering::AcqRel);
        let (digests, status) = match read_digest_set(&path) {
            Ok(digests) => {
                info!(
                    "Finished loading referential for '{}': {} entries in {:?}",
                    application_code,
                    digests.len(),
                    started.elapsed()
                );
                (digests, LoadStatus::Loaded)
            }
            Err(e) => {
                warn!(
                    "Referential for '{}' unavailable, caching empty set: {}",
                    application_code, e
                );
                (DigestSet::new(), LoadStatus::Unavailable)
            }
        };

        Referential {
            application_code: application_code.to_owned(),
            path,
            digests,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::HashAlgorithm;
    use std::fs;
    use tempfile::TempDir;

    fn hash_path(dir: &TempDir) -> String {
        format!("{}/", dir.path().display())
    }

    #[test]
    fn test_lookup_loads_file() {
        let dir = TempDir::new().unwrap();
        let secret = HashAlgorithm::Sha256.digest("secret");
        fs::write(dir.path().join("app1.data"), format!("{}\n", secret)).unwrap();

        let cache = ReferentialCache::new(hash_path(&dir));
        let referential = cache.lookup("app1");

        assert!(referential.is_available());
        assert!(referential.contains(&secret));
        assert_eq!(referential.application_code(), "app1");
        assert_eq!(cache.loads(), 1);
    }

    #[test]
    fn test_repeated_lookups_read_once() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app1.data"), "aa\n").unwrap();

        let cache = ReferentialCache::new(hash_path(&dir));
        let first = cache.lookup("app1");
        for _ in 0..100 {
            let again = cache.lookup("app1");
            assert!(Arc::ptr_eq(&first, &again));
        }
        assert_eq!(cache.loads(), 1);
    }

    #[test]
    fn test_missing_file_cached_as_unavailable() {
        let dir = TempDir::new().unwrap();
        let cache = ReferentialCache::new(hash_path(&dir));

        let referential = cache.lookup("ghost");
        assert_eq!(referential.status(), LoadStatus::Unavailable);
        assert!(referential.digests().is_empty());

        // Creating the file afterwards does not trigger a reload.
        fs::write(dir.path().join("ghost.data"), "aa\n").unwrap();
        let again = cache.lookup("ghost");
        assert!(!again.contains("aa"));
        assert_eq!(cache.loads(), 1);
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app1.data"), "aa\n").unwrap();

        let cache = ReferentialCache::new(hash_path(&dir));
        assert!(cache.lookup("app1").contains("aa"));

        fs::write(dir.path().join("app1.data"), "bb\n").unwrap();
        assert!(cache.invalidate("app1"));
        assert!(!cache.invalidate("app1"));

        let reloaded = cache.lookup("app1");
        assert!(reloaded.contains("bb"));
        assert!(!reloaded.contains("aa"));
        assert_eq!(cache.loads(), 2);
    }

    #[test]
    fn test_codes_are_isolated() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.data"), "aa\n").unwrap();
        fs::write(dir.path().join("b.data"), "bb\n").unwrap();

        let cache = ReferentialCache::new(hash_path(&dir));
        assert!(cache.lookup("a").contains("aa"));
        assert!(!cache.lookup("a").contains("bb"));
        assert!(cache.lookup("b").contains("bb"));
        assert_eq!(cache.cached_codes(), vec!["a".to_string(), "b".to_string()]);
    }
}
