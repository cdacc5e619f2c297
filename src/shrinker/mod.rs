//! Shrinking runs
//!
//! A full run builds the graph from scratch, seeds the roots from the keep
//! rules and writes every reachable class. An incremental run loads the
//! previous graph, applies code-only changes and rewrites the classes whose
//! reachable members changed. `ShrinkSession` ties both together and falls
//! back to a full run when an incremental one is impossible.

mod builder;
mod dependency_finder;
mod error;
mod full_run;
mod incremental;
mod logger;
mod propagator;
mod rewriter;
mod session;
mod structure;

pub use builder::{
    read_class_file, read_program_class, read_program_classes, is_bridge, BuildOutput, GraphBuilder,
    ProgramClass,
};
pub use dependency_finder::{ClassDependencies, DependencyFilter, MemberKey, NodeRef};
pub use error::{Result, ShrinkerError};
pub use full_run::{apply_keep_rules, fingerprint_inputs, FullRun};
pub use incremental::{IncrementalRun, ReachableState};
pub use logger::{ShrinkerLogger, KNOWN_UNRESOLVABLE_PREFIXES};
pub use propagator::{decrement_counter, increment_counter, set_counters};
pub use rewriter::{check_output_dir, clear_output_dir, relative_output_path, OutputRewriter};
pub use session::{RunMode, SessionOutcome, ShrinkOptions, ShrinkSession};
pub use structure::{ClassDeclaration, MemberDeclaration};

use crate::discovery::ClassDirectory;
use crate::graph::CounterSet;
use crate::proguard::KeepRules;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Program and library class directories of one run
#[derive(Debug, Clone, Default)]
pub struct ShrinkInputs {
    pub program: Vec<ClassDirectory>,
    pub libraries: Vec<ClassDirectory>,
}

impl ShrinkInputs {
    pub fn new(program: Vec<ClassDirectory>, libraries: Vec<ClassDirectory>) -> Self {
        Self { program, libraries }
    }

    pub fn program_files(&self) -> Vec<PathBuf> {
        self.program.iter().flat_map(|d| d.class_files.iter().cloned()).collect()
    }

    pub fn library_files(&self) -> Vec<PathBuf> {
        self.libraries.iter().flat_map(|d| d.class_files.iter().cloned()).collect()
    }
}

/// Keep rules per counter set; `Shrink` is expected to be present
pub type KeepRuleSets<'a> = BTreeMap<CounterSet, &'a dyn KeepRules>;

/// What a run did to the output directory
#[derive(Debug)]
pub struct RunResult {
    pub graph: crate::graph::ShrinkerGraph,
    pub written: usize,
    pub deleted: usize,
}
