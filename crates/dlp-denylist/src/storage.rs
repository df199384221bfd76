//! # Referential File Writer
//!
//! Writes digest lines to referential files so that a concurrent reader
//! never observes a partially written file.
//!
//! ## Write Modes
//!
//! | Mode | Strategy | On failure |
//! |------|----------|------------|
//! | create | temp file in the same directory, then atomic rename | temp file removed, target untouched |
//! | append | single buffered write + `fsync` | file truncated back to its original length |
//!
//! ## Concurrency
//!
//! Writers to the same path are serialized by a per-path lock held by the
//! caller for the whole read-decide-write sequence (see
//! [`ReferentialWriter::lock_for`]). Different paths never contend.
//!
//! Locks only serialize callers of the same writer. Builders use the
//! process-wide [`ReferentialWriter::shared`] unless given another one.

use crate::error::{DenylistError, Result};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

static SHARED: Lazy<Arc<ReferentialWriter>> = Lazy::new(|| Arc::new(ReferentialWriter::new()));

/// Serializes and performs referential file writes.
#[derive(Debug, Default)]
pub struct ReferentialWriter {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl ReferentialWriter {
    /// Creates a writer with no locks held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide writer.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED)
    }

    /// The lock guarding `path`. Hold it across any decision that depends on
    /// the file's current contents.
    #[must_use]
    pub fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        Arc::clone(&self.locks.entry(path.to_path_buf()).or_default())
    }

    /// Creates `path` holding exactly `entries`.
    ///
    /// Fails if `path` already exists.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the temp file cannot be written or renamed.
    pub fn create(&self, path: &Path, entries: &[String]) -> Result<usize> {
        let dir = parent_dir(path);
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| DenylistError::io(dir, e))?;

        tmp.write_all(render(entries).as_bytes())
            .map_err(|e| DenylistError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| DenylistError::io(tmp.path(), e))?;

        tmp.persist_noclobber(path)
            .map_err(|e| DenylistError::io(path, e.error))?;

        debug!("Created {} with {} entries", path.display(), entries.len());
        Ok(entries.len())
    }

    /// Appends `entries` to the existing file at `path`.
    ///
    /// A newline is inserted first when the file does not end with one.
    ///
    /// # Errors
    ///
    /// Returns an I/O error; the file is restored to its original length.
    pub fn append(&self, path: &Path, entries: &[String]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| DenylistError::io(path, e))?;
        let original = file
            .metadata()
            .map_err(|e| DenylistError::io(path, e))?
            .len();

        let mut body = String::new();
        let needs_newline = original > 0
            && !ends_with_newline(&mut file, original).map_err(|e| DenylistError::io(path, e))?;
        if needs_newline {
            body.push('\n');
        }
        body.push_str(&render(entries));

        if let Err(e) = write_at_end(&mut file, body.as_bytes()) {
            if let Err(rollback) = file.set_len(original) {
                warn!(
                    "Rollback of {} to {} bytes failed: {}",
                    path.display(),
                    original,
                    rollback
                );
            }
            return Err(DenylistError::io(path, e));
        }

        debug!("Appended {} entries to {}", entries.len(), path.display());
        Ok(entries.len())
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn render(entries: &[String]) -> String {
    let mut out = String::with_capacity(entries.iter().map(|e| e.len() + 1).sum());
    for entry in entries {
        out.push_str(entry);
        out.push('\n');
    }
    out
}

fn ends_with_newline(file: &mut File, len: u64) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn write_at_end(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::End(0))?;
    file.write_all(bytes)?;
    file.sync_data()
}
