mod changes;
mod file_finder;

pub use changes::{content_hash, detect_changes, FileMetadata, FileStatus, InputFingerprints};
pub use file_finder::{glob_to_regex, ClassDirectory, ClassFileFinder};
