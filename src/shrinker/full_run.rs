//! Non-incremental shrinking: build, seed, propagate, write

use super::builder::GraphBuilder;
use super::propagator::set_counters;
use super::rewriter::{check_output_dir, clear_output_dir, OutputRewriter};
use super::{KeepRuleSets, Result, RunResult, ShrinkInputs, ShrinkerError, ShrinkerLogger};
use crate::discovery::{FileMetadata, InputFingerprints};
use crate::graph::{CounterSet, ShrinkerGraph};
use crate::proguard::{KeepDecision, KeepRules};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

pub struct FullRun<'a> {
    logger: &'a ShrinkerLogger,
    sdk_filter: bool,
    configuration: String,
}

impl<'a> FullRun<'a> {
    pub fn new(logger: &'a ShrinkerLogger) -> Self {
        Self {
            logger,
            sdk_filter: true,
            configuration: String::new(),
        }
    }

    pub fn with_sdk_filter(mut self, enabled: bool) -> Self {
        self.sdk_filter = enabled;
        self
    }

    /// Digest of the keep rules, stored with the graph
    pub fn with_configuration(mut self, digest: impl Into<String>) -> Self {
        self.configuration = digest.into();
        self
    }

    pub fn run(&self, inputs: &ShrinkInputs, keep_rules: &KeepRuleSets<'_>, output: &Path) -> Result<RunResult> {
        let start = Instant::now();
        check_output_dir(output, inputs)?;
        clear_output_dir(output)?;

        let built = GraphBuilder::new(self.logger)
            .with_sdk_filter(self.sdk_filter)
            .build(&inputs.program, &inputs.libraries)?;
        let mut graph = built.graph;

        for (set, rules) in keep_rules {
            let roots = apply_keep_rules(&mut graph, *set, *rules);
            info!("Counter set {}: {} roots", set, roots);
        }
        for set in graph.root_sets() {
            set_counters(&graph, set);
        }

        let kept: Vec<_> = built
            .classes
            .iter()
            .filter(|class| {
                graph.find_class(&class.name).is_some_and(|node| {
                    graph.source_file(node) == Some(class.path.as_path())
                        && graph.is_reachable(node, CounterSet::Shrink)
                })
            })
            .collect();
        debug!("{} of {} program classes are reachable", kept.len(), built.classes.len());

        let written = OutputRewriter::new(&graph, output).write_all(&kept)?;
        graph.set_inputs(fingerprint_inputs(inputs, &self.configuration)?);

        info!("Full run finished in {:.2?}", start.elapsed());
        Ok(RunResult {
            graph,
            written,
            deleted: 0,
        })
    }
}

/// Query the keep rules for every program class and record the roots and
/// edges they ask for; returns the number of roots of `set`
pub fn apply_keep_rules(graph: &mut ShrinkerGraph, set: CounterSet, rules: &dyn KeepRules) -> usize {
    let classes = graph.program_classes();
    let decisions: Vec<KeepDecision> = {
        let graph = &*graph;
        classes
            .par_iter()
            .map(|class| rules.keep_decision(*class, graph))
            .filter(|decision| !decision.is_empty())
            .collect()
    };

    for decision in decisions {
        for (source, target, kind) in decision.edges {
            graph.add_dependency(source, target, kind);
        }
        for (node, kind) in decision.roots {
            graph.add_root(set, node, kind);
        }
    }
    graph.roots(set).len()
}

/// Fingerprints of every input file plus the configuration digest
pub fn fingerprint_inputs(inputs: &ShrinkInputs, configuration: &str) -> Result<InputFingerprints> {
    Ok(InputFingerprints {
        program: fingerprint_files(&inputs.program_files())?,
        libraries: fingerprint_files(&inputs.library_files())?,
        configuration: configuration.to_string(),
    })
}

fn fingerprint_files(files: &[PathBuf]) -> Result<BTreeMap<PathBuf, FileMetadata>> {
    files
        .par_iter()
        .map(|file| {
            FileMetadata::from_path(file)
                .map(|metadata| (file.clone(), metadata))
                .map_err(|e| ShrinkerError::io(file, e))
        })
        .collect()
}
