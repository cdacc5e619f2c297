//! classshrink - Incremental dead-code shrinker for JVM class files
//!
//! This library removes unreachable classes, methods and fields from a set
//! of program class files, keeping whatever the ProGuard-style keep rules
//! ask for.
//!
//! # Architecture
//!
//! The shrinking pipeline consists of:
//! 1. **Discovery** - Find program and library `.class` files
//! 2. **Decoding** - Parse class files into declarations and dependencies
//! 3. **Graph Building** - Register classes, resolve references, add
//!    override and multiple-inheritance edges
//! 4. **Keep Rules** - Seed the roots of every counter set
//! 5. **Propagation** - Count incoming dependencies until a fixpoint
//! 6. **Rewriting** - Write reachable classes with only reachable members
//!
//! Incremental runs reload the graph of the previous run and redo steps 2,
//! 5 and 6 for classes whose method bodies changed.

pub mod classfile;
pub mod config;
pub mod discovery;
pub mod graph;
pub mod proguard;
pub mod report;
pub mod shrinker;

pub use config::Config;
pub use discovery::{ClassDirectory, ClassFileFinder};
pub use graph::{CounterSet, DependencyType, ShrinkerGraph};
pub use proguard::{KeepRules, ProguardKeepRules};
pub use report::{ReportFormat, Reporter, ShrinkSummary};
pub use shrinker::{ShrinkInputs, ShrinkOptions, ShrinkSession, ShrinkerError, ShrinkerLogger};
