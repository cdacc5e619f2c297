use crate::classfile::ClassFileError;
use crate::graph::{ClassLookupError, GraphError, SnapshotError};
use crate::proguard::KeepRuleError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a shrinker run
///
/// `IncrementalRunImpossible` is the one expected failure: the caller is
/// meant to catch it and run a full build instead.
#[derive(Error, Debug)]
pub enum ShrinkerError {
    #[error("incremental run impossible: {0}")]
    IncrementalRunImpossible(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    ClassLookup(#[from] ClassLookupError),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: ClassFileError,
    },

    #[error("output directory {output} overlaps input directory {input}")]
    OutputOverlapsInput { output: PathBuf, input: PathBuf },

    #[error("malformed class file: {0}")]
    ClassFile(#[from] ClassFileError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    KeepRules(#[from] KeepRuleError),
}

impl ShrinkerError {
    pub fn impossible(message: impl Into<String>) -> Self {
        ShrinkerError::IncrementalRunImpossible(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ShrinkerError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_incremental_run_impossible(&self) -> bool {
        matches!(self, ShrinkerError::IncrementalRunImpossible(_))
    }
}

pub type Result<T> = std::result::Result<T, ShrinkerError>;
