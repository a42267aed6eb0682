//! File Tail Reader
//!
//! Incremental, restart-safe reading of a growing log file. Each poll:
//!
//! 1. loads the previous `(header, offset)` from the stat record,
//! 2. resets it when the file disappeared,
//! 3. reads the live header (first line); an empty file is left alone,
//! 4. treats a changed header or an offset past EOF as rotation and
//!    restarts from 0,
//! 5. hands at most [`MAX_LINES_PER_POLL`] complete lines to the caller,
//! 6. persists the new position when it changed.

use crate::stat::{FileData, StatError, StatStore};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Upper bound of lines consumed by a single poll
pub const MAX_LINES_PER_POLL: usize = 100;

/// Tail errors
#[derive(Debug, Error)]
pub enum TailError {
    #[error(transparent)]
    Stat(#[from] StatError),

    #[error("can not open {0:?}: {1}")]
    Open(PathBuf, io::Error),

    #[error("can not read {0:?}: {1}")]
    Read(PathBuf, io::Error),

    #[error("can not seek {0:?}: {1}")]
    Seek(PathBuf, io::Error),
}

/// Returned by the line handler to continue or end the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFlow {
    Continue,
    Stop,
}

/// What a poll observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// File does not exist; the position was reset
    Missing,
    /// File has no complete first line yet
    Empty,
    /// Lines were (possibly zero) read
    Read,
}

/// Summary of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub status: PollStatus,
    /// Non-empty lines handed to the handler
    pub lines: usize,
    /// Position after the poll
    pub position: FileData,
    /// Rotation or truncation was detected
    pub truncated: bool,
    /// The stat record was rewritten
    pub persisted: bool,
}

impl PollOutcome {
    fn idle(status: PollStatus, position: FileData, persisted: bool) -> Self {
        Self {
            status,
            lines: 0,
            position,
            truncated: false,
            persisted,
        }
    }
}

/// Tailing state machine for one file
#[derive(Debug, Clone)]
pub struct FileTail {
    path: PathBuf,
    stat: StatStore,
    max_lines: usize,
}

impl FileTail {
    pub fn new(path: impl Into<PathBuf>, stat_dir: impl AsRef<Path>) -> Self {
        let path = path.into();
        let stat = StatStore::new(stat_dir, path.to_string_lossy().into_owned());
        Self {
            path,
            stat,
            max_lines: MAX_LINES_PER_POLL,
        }
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stat(&self) -> &StatStore {
        &self.stat
    }

    /// Read the next batch, calling `on_line` for each non-empty line.
    pub fn poll<F>(&self, mut on_line: F) -> Result<PollOutcome, TailError>
    where
        F: FnMut(&str) -> LineFlow,
    {
        let previous = self.stat.load()?;

        match std::fs::metadata(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let reset = FileData::default();
                let persisted = previous != reset;
                if persisted {
                    self.stat.save(&reset)?;
                }
                return Ok(PollOutcome::idle(PollStatus::Missing, reset, persisted));
            }
            _ => {}
        }

        let file = File::open(&self.path).map_err(|e| TailError::Open(self.path.clone(), e))?;
        let size = file
            .metadata()
            .map_err(|e| TailError::Read(self.path.clone(), e))?
            .len();
        let mut reader = BufReader::with_capacity(4096, file);

        let mut buf = Vec::with_capacity(256);
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| TailError::Read(self.path.clone(), e))?;
        if n == 0 || buf.last() != Some(&b'\n') {
            return Ok(PollOutcome::idle(PollStatus::Empty, previous, false));
        }
        let header = String::from_utf8_lossy(trim_newlines(&buf)).into_owned();

        let mut offset = previous.offset;
        let truncated = header != previous.header || offset > size;
        if truncated {
            info!(path = %self.path.display(), "File was truncated or rotated");
            offset = 0;
        }

        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| TailError::Seek(self.path.clone(), e))?;

        let mut lines = 0;
        for _ in 0..self.max_lines {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| TailError::Read(self.path.clone(), e))?;
            // EOF, or a line still being written
            if n == 0 || buf.last() != Some(&b'\n') {
                break;
            }
            offset += n as u64;

            let line = String::from_utf8_lossy(trim_newlines(&buf));
            if line.is_empty() {
                continue;
            }
            lines += 1;
            if on_line(&line) == LineFlow::Stop {
                break;
            }
        }

        let position = FileData::new(header, offset);
        let persisted = position != previous;
        if persisted {
            self.stat.save(&position)?;
        }

        debug!(
            path = %self.path.display(),
            lines,
            offset = position.offset,
            "Poll complete"
        );

        Ok(PollOutcome {
            status: PollStatus::Read,
            lines,
            position,
            truncated,
            persisted,
        })
    }
}

fn trim_newlines(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != b'\n').unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| *b != b'\n').map_or(start, |i| i + 1);
    &bytes[start..end.max(start)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;

    fn collect(tail: &FileTail) -> (PollOutcome, Vec<String>) {
        let mut seen = Vec::new();
        let outcome = tail
            .poll(|line| {
                seen.push(line.to_string());
                LineFlow::Continue
            })
            .unwrap();
        (outcome, seen)
    }

    fn append(path: &Path, text: &str) {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_reads_batch_and_persists_offset() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        std::fs::write(&log, "A\nB\n").unwrap();

        let tail = FileTail::new(&log, dir.path().join("stat"));
        let (outcome, lines) = collect(&tail);

        assert_eq!(lines, vec!["A", "B"]);
        assert_eq!(outcome.position, FileData::new("A", 4));
        assert!(outcome.persisted);
        assert_eq!(tail.stat().load().unwrap(), FileData::new("A", 4));
    }

    #[test]
    fn test_resumes_and_skips_redundant_write() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        std::fs::write(&log, "A\nB\n").unwrap();
        let tail = FileTail::new(&log, dir.path());
        collect(&tail);

        let (outcome, lines) = collect(&tail);
        assert!(lines.is_empty());
        assert!(!outcome.persisted);

        append(&log, "C\n");
        let (outcome, lines) = collect(&tail);
        assert_eq!(lines, vec!["C"]);
        assert_eq!(outcome.position.offset, 6);
    }

    #[test]
    fn test_truncation_with_new_header_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        std::fs::write(&log, "first\nsecond\nthird\n").unwrap();
        let tail = FileTail::new(&log, dir.path());
        collect(&tail);

        std::fs::write(&log, "new\n").unwrap();
        let (outcome, lines) = collect(&tail);
        assert!(outcome.truncated);
        assert_eq!(lines, vec!["new"]);
        assert_eq!(outcome.position, FileData::new("new", 4));
    }

    #[test]
    fn test_offset_past_eof_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        std::fs::write(&log, "same\nmore lines here\n").unwrap();
        let tail = FileTail::new(&log, dir.path());
        collect(&tail);

        std::fs::write(&log, "same\n").unwrap();
        let (outcome, lines) = collect(&tail);
        assert!(outcome.truncated);
        assert_eq!(lines, vec!["same"]);
    }

    #[test]
    fn test_missing_file_resets_position() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        std::fs::write(&log, "A\n").unwrap();
        let tail = FileTail::new(&log, dir.path());
        collect(&tail);

        std::fs::remove_file(&log).unwrap();
        let (outcome, _) = collect(&tail);
        assert_eq!(outcome.status, PollStatus::Missing);
        assert_eq!(tail.stat().load().unwrap(), FileData::default());
    }

    #[test]
    fn test_empty_and_partial_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        std::fs::write(&log, "").unwrap();
        let tail = FileTail::new(&log, dir.path());
        assert_eq!(collect(&tail).0.status, PollStatus::Empty);

        append(&log, "head\n\nbody");
        let (outcome, lines) = collect(&tail);
        assert_eq!(lines, vec!["head"]);
        assert_eq!(outcome.position.offset, 6);

        append(&log, " done\n");
        let (_, lines) = collect(&tail);
        assert_eq!(lines, vec!["body done"]);
    }

    #[test]
    fn test_batch_limit_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        let body: String = (0..250).map(|i| format!("line {}\n", i)).collect();
        std::fs::write(&log, body).unwrap();

        let tail = FileTail::new(&log, dir.path());
        let (outcome, lines) = collect(&tail);
        assert_eq!(outcome.lines, MAX_LINES_PER_POLL);
        assert_eq!(lines.last().map(String::as_str), Some("line 99"));

        let mut seen = 0;
        let outcome = tail
            .poll(|_| {
                seen += 1;
                if seen == 3 {
                    LineFlow::Stop
                } else {
                    LineFlow::Continue
                }
            })
            .unwrap();
        assert_eq!(outcome.lines, 3);

        let (_, lines) = collect(&tail);
        assert_eq!(lines.first().map(String::as_str), Some("line 103"));
    }
}
