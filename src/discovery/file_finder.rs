// Class-file discovery for program and library directories

use crate::shrinker::ShrinkerError;
use rayon::prelude::*;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// A directory of class files, with the files found in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDirectory {
    /// Root the output layout is relative to
    pub root: PathBuf,
    /// Paths of the `.class` files, joined onto `root`, sorted
    pub class_files: Vec<PathBuf>,
}

impl ClassDirectory {
    /// Path of `file` relative to this directory's root
    pub fn relative_path<'a>(&self, file: &'a Path) -> Option<&'a Path> {
        file.strip_prefix(&self.root).ok()
    }

    pub fn contains(&self, file: &Path) -> bool {
        file.starts_with(&self.root)
    }
}

/// File finder for discovering class files
pub struct ClassFileFinder {
    exclude: Vec<Regex>,
}

impl ClassFileFinder {
    pub fn new() -> Self {
        Self {
            exclude: Vec::new(),
        }
    }

    /// Exclude files whose relative path matches one of the glob patterns
    pub fn with_excludes(mut self, patterns: &[String]) -> Result<Self, regex::Error> {
        self.exclude = patterns
            .iter()
            .map(|p| glob_to_regex(p))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    /// Scan every root in parallel; the first unreadable root fails the scan
    pub fn find_all(&self, roots: &[PathBuf]) -> Result<Vec<ClassDirectory>, ShrinkerError> {
        roots.par_iter().map(|root| self.scan_directory(root)).collect()
    }

    /// Scan a single directory for class files
    pub fn scan_directory(&self, root: &Path) -> Result<ClassDirectory, ShrinkerError> {
        debug!("Scanning for class files in: {}", root.display());
        let metadata = fs::metadata(root).map_err(|e| ShrinkerError::io(root, e))?;
        if !metadata.is_dir() {
            return Err(ShrinkerError::io(
                root,
                io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let mut class_files = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                ShrinkerError::io(path, e.into())
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().map_or(true, |e| e != "class") {
                continue;
            }
            let relative = path.strip_prefix(root).unwrap_or(path);
            if self.should_exclude(relative) {
                trace!("Excluding: {}", path.display());
                continue;
            }
            class_files.push(path.to_path_buf());
        }
        class_files.sort();

        debug!("Found {} class files in {}", class_files.len(), root.display());
        Ok(ClassDirectory {
            root: root.to_path_buf(),
            class_files,
        })
    }

    fn should_exclude(&self, relative: &Path) -> bool {
        let path = relative.to_string_lossy().replace('\\', "/");
        self.exclude.iter().any(|p| p.is_match(&path))
    }
}

impl Default for ClassFileFinder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a path glob (`*`, `?`, `**`) into an anchored regex
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut regex = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    regex.push_str("(.*/)?");
                    i += 3;
                } else {
                    regex.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    regex.push('$');
    Regex::new(&regex)
}
