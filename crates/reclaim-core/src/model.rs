use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

/// A regular file as observed during one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64, modified: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            size_bytes,
            modified,
        }
    }

    pub fn from_metadata(path: &Path, metadata: &Metadata) -> io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
        })
    }
}

/// Files the grouping backend reports as byte-identical, after live
/// re-resolution. Always holds at least two members, ordered by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub fingerprint: String,
    pub members: Vec<FileRecord>,
}

impl DuplicateGroup {
    /// Returns `None` when fewer than two members remain.
    pub fn new(fingerprint: impl Into<String>, mut members: Vec<FileRecord>) -> Option<Self> {
        members.sort_by(|a, b| a.path.as_os_str().cmp(b.path.as_os_str()));
        members.dedup_by(|a, b| a.path == b.path);
        if members.len() < 2 {
            return None;
        }
        Some(Self {
            fingerprint: fingerprint.into(),
            members,
        })
    }

    /// Bytes freed if every member but one is removed.
    pub fn wasted_bytes(&self) -> u64 {
        self.members
            .iter()
            .map(|m| m.size_bytes)
            .sum::<u64>()
            .saturating_sub(self.members.iter().map(|m| m.size_bytes).max().unwrap_or(0))
    }
}
