//! One shrinker invocation: incremental if possible, full otherwise

use super::full_run::FullRun;
use super::incremental::IncrementalRun;
use super::{KeepRuleSets, Result, RunResult, ShrinkInputs, ShrinkerLogger};
use crate::discovery::content_hash;
use crate::graph::{CounterSet, JsonSnapshotStore, ShrinkerGraph, SnapshotStore};
use crate::proguard::KeepRules;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Full,
    Incremental,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Full => write!(f, "full"),
            RunMode::Incremental => write!(f, "incremental"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShrinkOptions {
    pub output: PathBuf,
    /// Where the graph snapshot lives; no snapshot is kept without one
    pub state_dir: Option<PathBuf>,
    pub incremental: bool,
    pub ignore_sdk_packages: bool,
}

impl ShrinkOptions {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            state_dir: None,
            incremental: false,
            ignore_sdk_packages: true,
        }
    }
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub mode: RunMode,
    /// Why a requested incremental run became a full one
    pub fallback_reason: Option<String>,
    pub graph: ShrinkerGraph,
    pub written: usize,
    pub deleted: usize,
}

pub struct ShrinkSession<'a> {
    logger: &'a ShrinkerLogger,
    options: ShrinkOptions,
    keep_rules: KeepRuleSets<'a>,
    configuration: String,
}

impl<'a> ShrinkSession<'a> {
    pub fn new(logger: &'a ShrinkerLogger, options: ShrinkOptions) -> Self {
        Self {
            logger,
            options,
            keep_rules: KeepRuleSets::new(),
            configuration: String::new(),
        }
    }

    pub fn with_keep_rules(mut self, set: CounterSet, rules: &'a dyn KeepRules) -> Self {
        self.keep_rules.insert(set, rules);
        self
    }

    /// Texts the roots were derived from; a change forces a full run
    pub fn with_configuration<S: AsRef<str>>(mut self, parts: &[S]) -> Self {
        let mut joined = Vec::new();
        for part in parts {
            joined.extend_from_slice(part.as_ref().as_bytes());
            joined.push(0);
        }
        joined.extend_from_slice(if self.options.ignore_sdk_packages { b"sdk" } else { b"all" });
        self.configuration = content_hash(&joined);
        self
    }

    pub fn options(&self) -> &ShrinkOptions {
        &self.options
    }

    pub fn run(&self, inputs: &ShrinkInputs) -> Result<SessionOutcome> {
        let store = self.options.state_dir.as_deref().map(JsonSnapshotStore::new);

        let mut fallback_reason = None;
        if self.options.incremental {
            match store.as_ref().map(|s| s.load()) {
                Some(Ok(graph)) => match self.incremental(graph, inputs) {
                    Ok(result) => return self.finish(store.as_ref(), RunMode::Incremental, None, result),
                    Err(e) if e.is_incremental_run_impossible() => {
                        fallback_reason = Some(e.to_string());
                    }
                    Err(e) => return Err(e),
                },
                Some(Err(e)) => fallback_reason = Some(e.to_string()),
                None => fallback_reason = Some("no state directory configured".to_string()),
            }
            if let Some(reason) = &fallback_reason {
                info!("Running a full build: {}", reason);
            }
        }

        let result = FullRun::new(self.logger)
            .with_sdk_filter(self.options.ignore_sdk_packages)
            .with_configuration(self.configuration.clone())
            .run(inputs, &self.keep_rules, &self.options.output)?;
        self.finish(store.as_ref(), RunMode::Full, fallback_reason, result)
    }

    fn incremental(&self, graph: ShrinkerGraph, inputs: &ShrinkInputs) -> Result<RunResult> {
        IncrementalRun::new(self.logger)
            .with_sdk_filter(self.options.ignore_sdk_packages)
            .with_configuration(self.configuration.clone())
            .run(graph, inputs, &self.options.output)
    }

    fn finish(
        &self,
        store: Option<&JsonSnapshotStore>,
        mode: RunMode,
        fallback_reason: Option<String>,
        result: RunResult,
    ) -> Result<SessionOutcome> {
        if let Some(store) = store {
            store.save(&result.graph)?;
            debug!("Snapshot written to {}", store.path().display());
        }
        Ok(SessionOutcome {
            mode,
            fallback_reason,
            graph: result.graph,
            written: result.written,
            deleted: result.deleted,
        })
    }
}
