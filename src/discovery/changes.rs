//! Change detection between two runs
//!
//! Every class file seen by a run is fingerprinted; the next incremental
//! run compares the current files against the fingerprints stored with the
//! graph snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// File metadata for change detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    /// File modification time (as seconds since UNIX epoch)
    pub mtime: u64,
    /// File size in bytes
    pub size: u64,
    /// Content hash of the file bytes
    pub content_hash: String,
}

impl FileMetadata {
    /// Create metadata from a file path
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let content = fs::read(path)?;
        Self::from_contents(path, &content)
    }

    /// Create metadata for a file whose bytes were already read
    pub fn from_contents(path: &Path, content: &[u8]) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let mtime = metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Ok(Self {
            mtime,
            size: metadata.len(),
            content_hash: content_hash(content),
        })
    }

    /// Full check with content hash
    pub fn content_changed(&self, path: &Path) -> bool {
        match fs::read(path) {
            Ok(content) => content_hash(&content) != self.content_hash,
            Err(_) => true,
        }
    }
}

/// Hex digest used for change detection
pub fn content_hash(content: &[u8]) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Fingerprints of every input file of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputFingerprints {
    pub program: BTreeMap<PathBuf, FileMetadata>,
    pub libraries: BTreeMap<PathBuf, FileMetadata>,
    /// Digest of the keep rules and options the graph was built with
    #[serde(default)]
    pub configuration: String,
}

/// Per-file change status reported to incremental runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Added,
    Removed,
    Changed,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Added => write!(f, "added"),
            FileStatus::Removed => write!(f, "removed"),
            FileStatus::Changed => write!(f, "changed"),
        }
    }
}

/// Compare the current files against stored fingerprints
pub fn detect_changes(
    previous: &BTreeMap<PathBuf, FileMetadata>,
    current: &[PathBuf],
) -> BTreeMap<PathBuf, FileStatus> {
    let mut changes = BTreeMap::new();
    for file in current {
        match previous.get(file) {
            None => {
                changes.insert(file.clone(), FileStatus::Added);
            }
            Some(metadata) => {
                // mtime has one-second resolution, so always compare contents
                if metadata.content_changed(file) {
                    changes.insert(file.clone(), FileStatus::Changed);
                }
            }
        }
    }
    for file in previous.keys() {
        if !current.contains(file) {
            changes.insert(file.clone(), FileStatus::Removed);
        }
    }
    changes
}
