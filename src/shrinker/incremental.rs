//! Incremental updates of a previously built graph
//!
//! Only changes confined to method bodies are applied. Anything that could
//! alter the class structure (hierarchy, members, modifiers, annotations,
//! added or removed files, library changes) aborts with
//! `IncrementalRunImpossible` and the caller runs a full build instead.
//!
//! Counters of every set are cleared and recomputed from the roots, so a
//! dependency cycle that lost its last root never stays reachable.

use super::builder::{intern_unresolved, is_bridge, read_program_class, resolve_references, ProgramClass};
use super::dependency_finder::{ClassDependencies, DependencyFilter};
use super::full_run::fingerprint_inputs;
use super::propagator::set_counters;
use super::rewriter::{check_output_dir, relative_output_path, OutputRewriter};
use super::structure::ClassDeclaration;
use super::{Result, RunResult, ShrinkInputs, ShrinkerError, ShrinkerLogger};
use crate::discovery::{detect_changes, ClassDirectory, FileStatus};
use crate::graph::{CounterSet, Dependency, ShrinkerGraph};
use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Reachable program classes and their reachable member ids. A class
/// without reachable members maps to an empty set.
pub type ReachableState = BTreeMap<String, BTreeSet<String>>;

pub fn reachable_state(graph: &ShrinkerGraph, set: CounterSet) -> ReachableState {
    graph
        .reachable_classes(set)
        .into_iter()
        .map(|class| (graph.name(class).to_string(), graph.reachable_members(class, set)))
        .collect()
}

pub struct IncrementalRun<'a> {
    logger: &'a ShrinkerLogger,
    sdk_filter: bool,
    configuration: String,
}

impl<'a> IncrementalRun<'a> {
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

    pub fn with_configuration(mut self, digest: impl Into<String>) -> Self {
        self.configuration = digest.into();
        self
    }

    /// Update `graph`, loaded from the previous run, to the current inputs
    pub fn run(&self, mut graph: ShrinkerGraph, inputs: &ShrinkInputs, output: &Path) -> Result<RunResult> {
        let start = Instant::now();
        check_output_dir(output, inputs)?;
        let changed = self.changed_files(&graph, inputs)?;
        info!("{} program class files changed", changed.len());

        let old_state = reachable_state(&graph, CounterSet::Shrink);
        let sets = graph.root_sets();
        for set in CounterSet::ALL {
            graph.clear_counters(set);
        }

        let classes: Vec<ProgramClass> = changed
            .par_iter()
            .map(|path| {
                let class = read_program_class(directory_of(inputs, path)?, path)?;
                check_structure(&graph, &class)?;
                Ok(class)
            })
            .collect::<Result<_>>()?;

        self.update_code_references(&mut graph, &classes)?;
        for set in &sets {
            set_counters(&graph, *set);
        }

        let new_state = reachable_state(&graph, CounterSet::Shrink);
        let (rewrite, delete) = plan_output(&graph, &old_state, &new_state, &classes);
        debug!("{} classes to rewrite, {} to delete", rewrite.len(), delete.len());

        let changed_names: HashSet<&str> = classes.iter().map(|c| c.name.as_str()).collect();
        let unchanged: Vec<ProgramClass> = rewrite
            .iter()
            .filter(|name| !changed_names.contains(name.as_str()))
            .map(|name| read_unchanged(&graph, inputs, name))
            .collect::<Result<_>>()?;
        let to_write: Vec<&ProgramClass> = classes
            .iter()
            .chain(&unchanged)
            .filter(|class| rewrite.contains(&class.name))
            .collect();

        let to_delete: Vec<PathBuf> = delete
            .iter()
            .filter_map(|name| graph.find_class(name))
            .filter_map(|class| {
                graph
                    .source_file(class)
                    .map(|source| relative_output_path(&inputs.program, source, graph.name(class)))
            })
            .collect();

        let rewriter = OutputRewriter::new(&graph, output);
        let written = rewriter.write_all(&to_write)?;
        let deleted = rewriter.delete_all(&to_delete)?;
        graph.set_inputs(fingerprint_inputs(inputs, &self.configuration)?);

        info!("Incremental run finished in {:.2?}", start.elapsed());
        Ok(RunResult {
            graph,
            written,
            deleted,
        })
    }

    /// Changed program files, or the reason an incremental run is impossible
    fn changed_files(&self, graph: &ShrinkerGraph, inputs: &ShrinkInputs) -> Result<Vec<PathBuf>> {
        let previous = graph.inputs();
        if previous.configuration != self.configuration {
            return Err(ShrinkerError::impossible("Keep rules changed."));
        }
        if graph.sdk_filter_enabled() != self.sdk_filter {
            return Err(ShrinkerError::impossible("SDK package filter changed."));
        }
        if let Some((path, status)) = detect_changes(&previous.libraries, &inputs.library_files()).into_iter().next() {
            return Err(ShrinkerError::impossible(format!(
                "Library file {} {}.",
                path.display(),
                status
            )));
        }

        let mut changed = Vec::new();
        for (path, status) in detect_changes(&previous.program, &inputs.program_files()) {
            match status {
                FileStatus::Changed => changed.push(path),
                FileStatus::Added | FileStatus::Removed => {
                    return Err(ShrinkerError::impossible(format!("File {} {}.", path.display(), status)));
                }
            }
        }
        Ok(changed)
    }

    /// Replace the code-reference edges of every changed class
    fn update_code_references(&self, graph: &mut ShrinkerGraph, classes: &[ProgramClass]) -> Result<()> {
        let sdk_filter = graph.sdk_filter_enabled();
        let found: Vec<ClassDependencies> = classes
            .par_iter()
            .map(|class| ClassDependencies::find(&class.file, DependencyFilter::CodeReferencesOnly, sdk_filter))
            .collect::<Result<_>>()?;

        let mut wanted: HashMap<NodeIndex, HashSet<Dependency>> = HashMap::new();
        let mut pending = Vec::new();
        for dependencies in &found {
            for edge in &dependencies.edges {
                let source = edge.source.intern(graph);
                let target = edge.target.intern(graph);
                wanted.entry(source).or_default().insert(Dependency::new(target, edge.kind));
            }
            pending.extend(intern_unresolved(graph, &dependencies.unresolved));
        }
        for (source, target, kind) in resolve_references(graph, self.logger, &pending) {
            wanted.entry(source).or_default().insert(Dependency::new(target, kind));
        }

        let mut added = 0;
        let mut removed = 0;
        for class in classes {
            let Some(node) = graph.find_class(&class.name) else {
                continue;
            };
            let mut sources = vec![node];
            sources.extend(graph.members(node).into_iter().filter(|m| !is_bridge(graph, *m)));
            for source in sources {
                let current: HashSet<Dependency> = graph.code_dependencies(source).into_iter().collect();
                let next = wanted.remove(&source).unwrap_or_default();
                for dependency in current.difference(&next) {
                    if graph.remove_dependency(source, *dependency) {
                        removed += 1;
                    }
                }
                for dependency in next.difference(&current) {
                    if graph.add_dependency(source, dependency.target, dependency.kind) {
                        added += 1;
                    }
                }
            }
        }
        graph.check_dependencies(self.logger);
        info!("Code references: {} added, {} removed", added, removed);
        Ok(())
    }
}

fn directory_of<'i>(inputs: &'i ShrinkInputs, path: &Path) -> Result<&'i ClassDirectory> {
    inputs
        .program
        .iter()
        .find(|dir| dir.contains(path))
        .ok_or_else(|| ShrinkerError::impossible(format!("File {} is outside the program inputs.", path.display())))
}

fn read_unchanged(graph: &ShrinkerGraph, inputs: &ShrinkInputs, name: &str) -> Result<ProgramClass> {
    let source = graph
        .find_class(name)
        .and_then(|class| graph.source_file(class))
        .ok_or_else(|| ShrinkerError::impossible(format!("Can't find info for class {}.", name)))?;
    read_program_class(directory_of(inputs, source)?, source)
}

/// Classes to rewrite and classes to delete, by name
fn plan_output(
    graph: &ShrinkerGraph,
    old_state: &ReachableState,
    new_state: &ReachableState,
    changed: &[ProgramClass],
) -> (BTreeSet<String>, BTreeSet<String>) {
    let changed: HashSet<&str> = changed.iter().map(|c| c.name.as_str()).collect();
    let flipped: HashSet<&str> = old_state
        .keys()
        .filter(|name| !new_state.contains_key(*name))
        .chain(new_state.keys().filter(|name| !old_state.contains_key(*name)))
        .map(String::as_str)
        .collect();

    let mut rewrite = BTreeSet::new();
    for (name, members) in new_state {
        let dirty = changed.contains(name.as_str())
            || old_state.get(name) != Some(members)
            || implements_any(graph, name, &flipped);
        if dirty {
            rewrite.insert(name.clone());
        }
    }
    let delete = old_state
        .keys()
        .filter(|name| !new_state.contains_key(*name))
        .cloned()
        .collect();
    (rewrite, delete)
}

/// Interface lists are filtered by reachability too
fn implements_any(graph: &ShrinkerGraph, class: &str, names: &HashSet<&str>) -> bool {
    if names.is_empty() {
        return false;
    }
    graph
        .find_class(class)
        .and_then(|node| graph.interfaces(node).ok())
        .is_some_and(|interfaces| interfaces.iter().any(|i| names.contains(graph.name(*i))))
}

/// Fail unless the re-read class has the structure recorded in the graph
pub fn check_structure(graph: &ShrinkerGraph, class: &ProgramClass) -> Result<()> {
    let declaration = ClassDeclaration::read(&class.file).map_err(|source| ShrinkerError::Decode {
        path: class.path.clone(),
        source,
    })?;
    let name = &declaration.name;
    let node = graph
        .find_class(name)
        .filter(|node| graph.source_file(*node) == Some(class.path.as_path()))
        .ok_or_else(|| ShrinkerError::impossible(format!("Can't find info for class {}.", name)))?;
    let info = graph
        .class_info(node)
        .ok_or_else(|| ShrinkerError::impossible(format!("Can't find info for class {}.", name)))?;

    let super_name = info.super_class.map(|s| graph.name(s));
    if super_name != declaration.super_name.as_deref() {
        return Err(ShrinkerError::impossible(format!("{} superclass changed.", name)));
    }
    let interfaces: Vec<&str> = info.interfaces.iter().map(|i| graph.name(*i)).collect();
    if interfaces != declaration.interfaces.iter().map(String::as_str).collect::<Vec<_>>() {
        return Err(ShrinkerError::impossible(format!("{} interfaces changed.", name)));
    }
    if graph.modifiers(node) != declaration.access {
        return Err(ShrinkerError::impossible(format!("{} modifiers changed.", name)));
    }
    check_annotations(graph, node, &declaration.annotations)?;

    let mut old_members: HashMap<String, NodeIndex> = graph
        .members(node)
        .into_iter()
        .filter(|m| !is_bridge(graph, *m))
        .map(|m| (graph.member_id(m), m))
        .collect();
    for member in &declaration.members {
        let id = format!("{}:{}", member.name, member.descriptor);
        let label = member_label(&member.descriptor);
        let Some(existing) = old_members.remove(&id) else {
            return Err(ShrinkerError::impossible(format!("{} {}.{} added.", label, name, id)));
        };
        if graph.modifiers(existing) != member.access {
            return Err(ShrinkerError::impossible(format!("{}.{} modifiers changed.", name, id)));
        }
        check_annotations(graph, existing, &member.annotations)?;
    }
    if let Some(id) = old_members.keys().min() {
        let descriptor = id.split_once(':').map_or("", |(_, d)| d);
        return Err(ShrinkerError::impossible(format!(
            "{} {}.{} removed.",
            member_label(descriptor),
            name,
            id
        )));
    }
    Ok(())
}

fn member_label(descriptor: &str) -> &'static str {
    if descriptor.starts_with('(') {
        "Method"
    } else {
        "Field"
    }
}

fn check_annotations(graph: &ShrinkerGraph, node: NodeIndex, annotations: &[String]) -> Result<()> {
    let old = graph.annotations(node);
    let new: BTreeSet<String> = annotations.iter().cloned().collect();
    if let Some(added) = new.difference(old).next() {
        return Err(ShrinkerError::impossible(format!(
            "Annotation {} on {} added.",
            added,
            graph.key(node)
        )));
    }
    if let Some(removed) = old.difference(&new).next() {
        return Err(ShrinkerError::impossible(format!(
            "Annotation {} on {} removed.",
            removed,
            graph.key(node)
        )));
    }
    Ok(())
}
