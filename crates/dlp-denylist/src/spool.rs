//! # File Spool Topic
//!
//! A JSON-lines file standing in for a broker topic. Each line is one
//! record payload; a line's zero-based index is its offset.
//!
//! Committed offsets live next to the spool, one file per consumer group:
//!
//! ```text
//! /var/spool/dlp/hashes.jsonl               <- payloads, one per line
//! /var/spool/dlp/hashes.jsonl.logstash-1.offset  <- "42\n"
//! ```
//!
//! Blank lines still consume an offset but are not decoded. A trailing
//! line without its `\n` is still being written: it has no offset yet and
//! is neither counted nor consumed.

use crate::error::{DenylistError, Result};
use crate::source::{Batch, OffsetReset, RecordSource, SourceFactory, DEFAULT_MAX_BATCH};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// A spool file and the consumer groups reading it.
#[derive(Debug, Clone)]
pub struct FileTopic {
    path: PathBuf,
    group_id: String,
    max_batch: usize,
}

impl FileTopic {
    /// Opens the spool at `path` for `group_id`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>, group_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            group_id: group_id.into(),
            max_batch: DEFAULT_MAX_BATCH,
        }
    }

    /// Caps the records returned per poll.
    #[must_use]
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    /// Spool file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset file of this topic's consumer group.
    #[must_use]
    pub fn offset_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".");
        name.push(&self.group_id);
        name.push(".offset");
        PathBuf::from(name)
    }

    /// Appends payloads to the spool, one line each.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the spool cannot be written.
    pub fn append<I, S>(&self, payloads: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DenylistError::io(&self.path, e))?;

        let mut buf = String::new();
        for payload in payloads {
            buf.push_str(payload.as_ref().trim_end_matches(['\r', '\n']));
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())
            .map_err(|e| DenylistError::io(&self.path, e))
    }

    /// Committed offset of this topic's group, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset file exists but is unreadable or corrupt.
    pub fn committed(&self) -> Result<Option<usize>> {
        let path = self.offset_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DenylistError::io(path, e)),
        };
        text.trim().parse().map(Some).map_err(|e| {
            DenylistError::Source(format!("corrupt offset file {}: {}", path.display(), e))
        })
    }

    fn line_count(&self) -> Result<usize> {
        match File::open(&self.path) {
            Ok(file) => {
                let mut reader = BufReader::new(file);
                let mut line = Vec::new();
                let mut count = 0;
                while read_complete_line(&mut reader, &mut line)
                    .map_err(|e| DenylistError::io(&self.path, e))?
                {
                    count += 1;
                }
                Ok(count)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(DenylistError::io(&self.path, e)),
        }
    }
}

impl SourceFactory for FileTopic {
    type Source = FileConsumer;

    fn connect(&self, reset: OffsetReset) -> Result<FileConsumer> {
        let position = match self.committed()? {
            Some(offset) => offset,
            None => match reset {
                OffsetReset::Earliest => 0,
                OffsetReset::Latest => self.line_count()?,
            },
        };
        debug!(
            "Spool consumer '{}' starts at offset {} of {}",
            self.group_id,
            position,
            self.path.display()
        );

        Ok(FileConsumer {
            topic: self.clone(),
            position,
        })
    }
}

/// Consumer over a [`FileTopic`].
#[derive(Debug)]
pub struct FileConsumer {
    topic: FileTopic,
    position: usize,
}

impl FileConsumer {
    /// Offset of the next line to read.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }
}

impl RecordSource for FileConsumer {
    fn poll(&mut self, _timeout: Duration) -> Result<Batch> {
        let path = &self.topic.path;
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Batch::default()),
            Err(e) => return Err(DenylistError::io(path, e)),
        };

        let mut reader = BufReader::new(file);
        let mut line = Vec::new();
        let mut next_line = |line: &mut Vec<u8>| {
            read_complete_line(&mut reader, line).map_err(|e| DenylistError::io(path, e))
        };

        for _ in 0..self.position {
            if !next_line(&mut line)? {
                return Ok(Batch::default());
            }
        }

        let mut batch = Batch::default();
        let mut fetched = 0;
        while fetched < self.topic.max_batch && next_line(&mut line)? {
            fetched += 1;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            batch.push_payload(&line);
        }
        self.position += fetched;
        Ok(batch)
    }

    fn commit(&mut self) -> Result<()> {
        let path = self.topic.offset_path();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| DenylistError::io(&path, e))?;
        writeln!(tmp, "{}", self.position).map_err(|e| DenylistError::io(&path, e))?;
        tmp.persist(&path)
            .map_err(|e| DenylistError::io(&path, e.error))?;
        debug!("Committed offset {} to {}", self.position, path.display());
        Ok(())
    }
}

/// Reads the next `\n`-terminated line into `buf`, without the terminator.
/// Returns `false` at end of file or when the last line is unterminated.
fn read_complete_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    reader.read_until(b'\n', buf)?;
    if buf.last() != Some(&b'\n') {
        return Ok(false);
    }
    buf.pop();
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_millis(10);

    fn topic(dir: &TempDir) -> FileTopic {
        FileTopic::new(dir.path().join("hashes.jsonl"), "logstash-1")
    }

    #[test]
    fn test_offset_path() {
        let topic = FileTopic::new("/spool/hashes.jsonl", "g1");
        assert_eq!(topic.offset_path(), PathBuf::from("/spool/hashes.jsonl.g1.offset"));
    }

    #[test]
    fn test_missing_spool_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut consumer = topic(&dir).connect(OffsetReset::Latest).unwrap();
        assert!(consumer.poll(TIMEOUT).unwrap().is_empty());
    }

    #[test]
    fn test_poll_and_commit() {
        let dir = TempDir::new().unwrap();
        let topic = topic(&dir);
        topic.append([r#"{"v":"a"}"#, r#"{"v":"b"}"#]).unwrap();

        let mut consumer = topic.connect(OffsetReset::Earliest).unwrap();
        assert_eq!(consumer.poll(TIMEOUT).unwrap().records.len(), 2);
        consumer.commit().unwrap();
        assert_eq!(topic.committed().unwrap(), Some(2));

        topic.append([r#"{"v":"c"}"#]).unwrap();
        let mut next = topic.connect(OffsetReset::Earliest).unwrap();
        let batch = next.poll(TIMEOUT).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].get("v"), Some("c"));
    }

    #[test]
    fn test_latest_without_commit_skips_existing_lines() {
        let dir = TempDir::new().unwrap();
        let topic = topic(&dir);
        topic.append([r#"{"v":"a"}"#]).unwrap();

        let mut consumer = topic.connect(OffsetReset::Latest).unwrap();
        assert_eq!(consumer.position(), 1);
        assert!(consumer.poll(TIMEOUT).unwrap().is_empty());
    }

    #[test]
    fn test_blank_and_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let topic = topic(&dir);
        fs::write(topic.path(), "{\"v\":\"a\"}\n\nnot json\n{\"v\":\"b\"}\n").unwrap();

        let mut consumer = topic.connect(OffsetReset::Earliest).unwrap();
        let batch = consumer.poll(TIMEOUT).unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.skipped, 1);
        assert_eq!(consumer.position(), 4);
    }

    #[test]
    fn test_unterminated_line_waits_for_its_newline() {
        let dir = TempDir::new().unwrap();
        let topic = topic(&dir);
        fs::write(topic.path(), "{\"v\":\"a\"}\n{\"v\":\"b").unwrap();

        let mut consumer = topic.connect(OffsetReset::Earliest).unwrap();
        let batch = consumer.poll(TIMEOUT).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.skipped, 0);
        assert_eq!(consumer.position(), 1);
        consumer.commit().unwrap();

        let mut file = OpenOptions::new().append(true).open(topic.path()).unwrap();
        file.write_all(b"\"}\n").unwrap();

        let mut next = topic.connect(OffsetReset::Earliest).unwrap();
        let batch = next.poll(TIMEOUT).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].get("v"), Some("b"));
        assert_eq!(next.position(), 2);
    }

    #[test]
    fn test_latest_ignores_unterminated_line() {
        let dir = TempDir::new().unwrap();
        let topic = topic(&dir);
        fs::write(topic.path(), "{\"v\":\"a\"}\n{\"v\"").unwrap();

        let consumer = topic.connect(OffsetReset::Latest).unwrap();
        assert_eq!(consumer.position(), 1);
    }

    #[test]
    fn test_max_batch() {
        let dir = TempDir::new().unwrap();
        let topic = topic(&dir).with_max_batch(2);
        topic
            .append((0..5).map(|i| format!(r#"{{"v":"{}"}}"#, i)))
            .unwrap();

        let mut consumer = topic.connect(OffsetReset::Earliest).unwrap();
        assert_eq!(consumer.poll(TIMEOUT).unwrap().records.len(), 2);
        assert_eq!(consumer.poll(TIMEOUT).unwrap().records.len(), 2);
        assert_eq!(consumer.poll(TIMEOUT).unwrap().records.len(), 1);
        assert!(consumer.poll(TIMEOUT).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_offset_file() {
        let dir = TempDir::new().unwrap();
        let topic = topic(&dir);
        fs::write(topic.offset_path(), "forty-two").unwrap();
        assert!(matches!(
            topic.connect(OffsetReset::Earliest),
            Err(DenylistError::Source(_))
        ));
    }
}
