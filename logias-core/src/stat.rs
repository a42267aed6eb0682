//! Stat records
//!
//! One plain-text record per tailed target, remembering the first line of
//! the file (to detect rotation) and the byte offset already consumed:
//!
//! ```text
//! <target path>      diagnostic only
//! <header line>
//! <decimal offset>
//! ```

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Longest basename suffix kept in a persistence key
const MAX_SUFFIX_LEN: usize = 64;

/// Stat record errors
#[derive(Debug, Error)]
pub enum StatError {
    #[error("stat file {0:?} must be a file, not a directory")]
    IsDirectory(PathBuf),

    #[error("failed to read the stat file {0:?}: {1}")]
    Read(PathBuf, io::Error),

    #[error("failed to write the stat file {0:?}: {1}")]
    Write(PathBuf, io::Error),
}

/// Persisted tail position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileData {
    /// First line of the file when it was last read
    pub header: String,
    /// Byte offset already consumed
    pub offset: u64,
}

impl FileData {
    pub fn new(header: impl Into<String>, offset: u64) -> Self {
        Self {
            header: header.into(),
            offset,
        }
    }
}

/// Stable file name for a target's stat record: hex SHA-256 of the
/// identifier followed by a readable, filesystem-safe basename.
pub fn persistence_key(target_id: &str) -> String {
    let digest = hex::encode(Sha256::digest(target_id.as_bytes()));

    let base = Path::new(target_id)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SUFFIX_LEN)
        .collect();

    format!("{}_{}.txt", digest, suffix)
}

/// Serialize a record
pub fn encode(target_id: &str, data: &FileData) -> String {
    format!("{}\n{}\n{}", target_id, data.header, data.offset)
}

/// Parse a record. A missing header line yields `None`; an unparsable
/// offset reads as 0.
pub fn decode(text: &str) -> Option<FileData> {
    let mut lines = text.split('\n');
    let _target = lines.next()?;
    let header = lines.next()?;
    let offset = lines
        .next()
        .and_then(|l| l.trim().parse::<u64>().ok())
        .unwrap_or(0);
    Some(FileData::new(header, offset))
}

/// Stat record of a single target
#[derive(Debug, Clone)]
pub struct StatStore {
    target_id: String,
    path: PathBuf,
}

impl StatStore {
    pub fn new(stat_dir: impl AsRef<Path>, target_id: impl Into<String>) -> Self {
        let target_id = target_id.into();
        let path = stat_dir.as_ref().join(persistence_key(&target_id));
        Self { target_id, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record; absent records read as an empty header at offset 0.
    pub fn load(&self) -> Result<FileData, StatError> {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.is_dir() => return Err(StatError::IsDirectory(self.path.clone())),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileData::default()),
            Err(e) => return Err(StatError::Read(self.path.clone(), e)),
        }

        let text =
            fs::read_to_string(&self.path).map_err(|e| StatError::Read(self.path.clone(), e))?;

        Ok(decode(&text).unwrap_or_else(|| {
            warn!(path = %self.path.display(), "Malformed stat file, starting from the beginning");
            FileData::default()
        }))
    }

    /// Overwrite the record. The parent directory is created when missing.
    pub fn save(&self, data: &FileData) -> Result<(), StatError> {
        let write_err = |e| StatError::Write(self.path.clone(), e);

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(write_err)?;
            }
        }

        let tmp = self.path.with_extension("txt.tmp");
        fs::write(&tmp, encode(&self.target_id, data)).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)
    }
}
