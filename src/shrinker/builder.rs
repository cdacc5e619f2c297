//! Multi-pass graph construction
//!
//! Every pass runs its per-class (or per-reference) work on the rayon pool
//! against a read-only graph and returns plain facts; the facts are then
//! committed on the calling thread. The class registration barrier closes
//! between the structural pass and everything that follows.

use super::dependency_finder::{ClassDependencies, DependencyFilter, UnresolvedFact};
use super::structure::ClassDeclaration;
use super::{Result, ShrinkerError, ShrinkerLogger};
use crate::classfile::{access, ClassFile};
use crate::discovery::ClassDirectory;
use crate::graph::{DependencyType, ShrinkerGraph, TypeHierarchy, BRIDGE_SUFFIX};
use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const OBJECT: &str = "java/lang/Object";

/// Methods every kept class keeps, called or not
const ALWAYS_KEPT_METHODS: &[&str] = &[
    "hashCode:()I",
    "equals:(Ljava/lang/Object;)Z",
    "toString:()Ljava/lang/String;",
];

/// A decoded program class and where it came from
#[derive(Debug, Clone)]
pub struct ProgramClass {
    pub name: String,
    pub path: PathBuf,
    /// Path below the program input root
    pub relative_path: PathBuf,
    pub file: ClassFile,
}

/// A field access or call waiting for hierarchy resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingReference {
    pub source: NodeIndex,
    pub target: NodeIndex,
    pub invokespecial: bool,
    pub kind: DependencyType,
}

/// A synthetic member simulating an interface method inherited from a
/// program superclass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgePlan {
    pub class: NodeIndex,
    pub interface_method: NodeIndex,
    pub implementation: NodeIndex,
    pub name: String,
    pub descriptor: String,
    pub modifiers: u16,
}

pub type Edge = (NodeIndex, NodeIndex, DependencyType);

/// Graph plus the program classes it was built from
#[derive(Debug)]
pub struct BuildOutput {
    pub graph: ShrinkerGraph,
    pub classes: Vec<ProgramClass>,
}

/// Read and decode one class file
pub fn read_class_file(path: &Path) -> Result<ClassFile> {
    let bytes = fs::read(path).map_err(|e| ShrinkerError::io(path, e))?;
    ClassFile::parse(&bytes).map_err(|source| ShrinkerError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Decode every program class file, failing on the first error
pub fn read_program_classes(inputs: &[ClassDirectory]) -> Result<Vec<ProgramClass>> {
    let files: Vec<(&ClassDirectory, &PathBuf)> = inputs
        .iter()
        .flat_map(|dir| dir.class_files.iter().map(move |file| (dir, file)))
        .collect();

    files
        .par_iter()
        .map(|(dir, path)| read_program_class(dir, path))
        .collect()
}

pub fn read_program_class(dir: &ClassDirectory, path: &Path) -> Result<ProgramClass> {
    let file = read_class_file(path)?;
    let name = file.name()?.to_string();
    let relative_path = dir
        .relative_path(path)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("{}.class", name)));
    Ok(ProgramClass {
        name,
        path: path.to_path_buf(),
        relative_path,
        file,
    })
}

/// Runs the structural, dependency, resolution, override and
/// multiple-inheritance passes
pub struct GraphBuilder<'a> {
    logger: &'a ShrinkerLogger,
    sdk_filter: bool,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(logger: &'a ShrinkerLogger) -> Self {
        Self {
            logger,
            sdk_filter: true,
        }
    }

    pub fn with_sdk_filter(mut self, enabled: bool) -> Self {
        self.sdk_filter = enabled;
        self
    }

    pub fn build(&self, program: &[ClassDirectory], libraries: &[ClassDirectory]) -> Result<BuildOutput> {
        let classes = read_program_classes(program)?;
        let library_files: Vec<&PathBuf> = libraries.iter().flat_map(|d| d.class_files.iter()).collect();
        info!(
            "Decoding {} program and {} library classes...",
            classes.len(),
            library_files.len()
        );

        let library_declarations: Vec<ClassDeclaration> = library_files
            .par_iter()
            .map(|path| {
                let file = read_class_file(path)?;
                ClassDeclaration::read(&file).map_err(|source| ShrinkerError::Decode {
                    path: path.to_path_buf(),
                    source,
                })
            })
            .collect::<Result<_>>()?;
        let program_declarations: Vec<ClassDeclaration> = classes
            .par_iter()
            .map(|class| {
                ClassDeclaration::read(&class.file).map_err(|source| ShrinkerError::Decode {
                    path: class.path.clone(),
                    source,
                })
            })
            .collect::<Result<_>>()?;

        // Structural pass. Libraries first, so a program class always
        // replaces a library class of the same name.
        let mut graph = ShrinkerGraph::new().with_sdk_filter(self.sdk_filter);
        for declaration in &library_declarations {
            register_class(&mut graph, declaration, None)?;
        }
        for (declaration, class) in program_declarations.iter().zip(&classes) {
            register_class(&mut graph, declaration, Some(class.path.clone()))?;
        }
        graph.close_class_registration();
        info!(
            "Registered {} classes ({} nodes)",
            graph.classes().len(),
            graph.node_count()
        );

        // Dependency discovery
        let found: Vec<ClassDependencies> = classes
            .par_iter()
            .map(|class| {
                debug!("Finding dependencies of {}", class.name);
                ClassDependencies::find(&class.file, DependencyFilter::All, self.sdk_filter)
            })
            .collect::<Result<_>>()?;

        let mut pending = Vec::new();
        let mut virtual_methods = Vec::new();
        let mut candidates = Vec::new();
        for dependencies in &found {
            pending.extend(commit_dependencies(&mut graph, dependencies));
            virtual_methods.extend(
                dependencies
                    .virtual_methods
                    .iter()
                    .filter_map(|m| graph.find_member(&m.owner, &m.name, &m.descriptor)),
            );
            if dependencies.multiple_inheritance {
                candidates.extend(graph.find_class(&dependencies.class));
            }
        }
        info!(
            "Found {} dependencies, {} unresolved references",
            graph.edge_count(),
            pending.len()
        );

        let resolved = resolve_references(&graph, self.logger, &pending);
        commit_edges(&mut graph, &resolved);

        let overrides = override_edges(&graph, self.logger, &virtual_methods);
        commit_edges(&mut graph, &overrides);

        let candidates: Vec<NodeIndex> = candidates
            .into_iter()
            .filter(|class| {
                graph
                    .superclass(*class)
                    .ok()
                    .flatten()
                    .is_some_and(|parent| graph.is_program_class(parent))
            })
            .collect();
        let bridges = plan_bridges(&graph, self.logger, &candidates);
        let bridge_count = commit_bridges(&mut graph, &bridges)?;
        debug!(
            "Added {} resolved, {} override and {} bridge dependencies",
            resolved.len(),
            overrides.len(),
            bridge_count
        );

        graph.check_dependencies(self.logger);
        info!(
            "Graph complete: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(BuildOutput { graph, classes })
    }
}

/// Register a class, its members and all annotations
pub fn register_class(
    graph: &mut ShrinkerGraph,
    declaration: &ClassDeclaration,
    source: Option<PathBuf>,
) -> Result<NodeIndex> {
    let class = graph.add_class(
        &declaration.name,
        declaration.super_name.as_deref(),
        &declaration.interfaces,
        declaration.access,
        source,
    )?;
    for annotation in &declaration.annotations {
        graph.add_annotation(class, annotation);
    }
    for member in &declaration.members {
        let node = graph.add_member(class, &member.name, &member.descriptor, member.access)?;
        for annotation in &member.annotations {
            graph.add_annotation(node, annotation);
        }
    }
    Ok(class)
}

/// Intern and add the direct edges of one class; returns its unresolved
/// references as node pairs
pub fn commit_dependencies(graph: &mut ShrinkerGraph, dependencies: &ClassDependencies) -> Vec<PendingReference> {
    for edge in &dependencies.edges {
        let source = edge.source.intern(graph);
        let target = edge.target.intern(graph);
        graph.add_dependency(source, target, edge.kind);
    }
    intern_unresolved(graph, &dependencies.unresolved)
}

pub fn intern_unresolved(graph: &mut ShrinkerGraph, facts: &[UnresolvedFact]) -> Vec<PendingReference> {
    facts
        .iter()
        .map(|fact| PendingReference {
            source: graph.member_reference(&fact.source.owner, &fact.source.name, &fact.source.descriptor),
            target: graph.member_reference(&fact.target.owner, &fact.target.name, &fact.target.descriptor),
            invokespecial: fact.invokespecial,
            kind: fact.kind,
        })
        .collect()
}

pub fn commit_edges(graph: &mut ShrinkerGraph, edges: &[Edge]) {
    for (source, target, kind) in edges {
        graph.add_dependency(*source, *target, *kind);
    }
}

/// Resolve member references through the type hierarchy
pub fn resolve_references(graph: &ShrinkerGraph, logger: &ShrinkerLogger, pending: &[PendingReference]) -> Vec<Edge> {
    pending
        .par_iter()
        .flat_map_iter(|reference| resolve_reference(graph, logger, reference))
        .collect()
}

fn resolve_reference(graph: &ShrinkerGraph, logger: &ShrinkerLogger, reference: &PendingReference) -> Vec<Edge> {
    let source = reference.source;
    let target = reference.target;

    // invokespecial through a super call starts above the caller
    let start = if reference.invokespecial {
        let caller = graph.owner_class(source);
        match graph.superclass(caller) {
            Ok(Some(parent)) => parent,
            Ok(None) => {
                logger.invalid_member_reference(graph.key(source), graph.key(target));
                return Vec::new();
            }
            Err(e) => {
                if !graph.is_sdk_class(&e.class) {
                    logger.invalid_class_reference(graph.name(caller), &e.class);
                }
                return Vec::new();
            }
        }
    } else {
        graph.owner_class(target)
    };

    if !graph.is_class_known(start) {
        if !graph.is_sdk_class(graph.name(start)) {
            logger.invalid_class_reference(graph.key(source), graph.name(start));
        }
        return Vec::new();
    }

    for class in TypeHierarchy::new(graph).with_logger(logger).pre_order(start) {
        if let Some(member) = graph.find_matching_method(class, target) {
            if graph.is_library_class(class) {
                return Vec::new();
            }
            return vec![(source, class, reference.kind), (source, member, reference.kind)];
        }
    }

    logger.invalid_member_reference(graph.key(source), graph.key(target));
    Vec::new()
}

/// Edges keeping overriding methods alive
pub fn override_edges(graph: &ShrinkerGraph, logger: &ShrinkerLogger, methods: &[NodeIndex]) -> Vec<Edge> {
    methods
        .par_iter()
        .flat_map_iter(|method| method_override_edges(graph, logger, *method))
        .collect()
}

fn method_override_edges(graph: &ShrinkerGraph, logger: &ShrinkerLogger, method: NodeIndex) -> Vec<Edge> {
    let class = graph.owner_class(method);
    if ALWAYS_KEPT_METHODS.contains(&graph.member_id(method).as_str()) {
        return vec![(class, method, DependencyType::RequiredClassStructure)];
    }

    let mut edges = Vec::new();
    for ancestor in TypeHierarchy::new(graph).with_logger(logger).ancestors(class) {
        let name = graph.name(ancestor);
        if name == OBJECT {
            continue;
        }
        if !graph.is_class_known(ancestor) {
            // Platform class missing from the library inputs; its methods
            // cannot be inspected, so assume an override
            if graph.is_sdk_class(name) {
                edges.push((class, method, DependencyType::RequiredClassStructure));
                break;
            }
            continue;
        }
        if let Some(overridden) = graph.find_matching_method(ancestor, method) {
            if graph.is_library_class(ancestor) {
                edges.push((class, method, DependencyType::RequiredClassStructure));
                break;
            }
            edges.push((class, method, DependencyType::ClassIsKept));
            edges.push((overridden, method, DependencyType::IfClassKept));
        }
    }
    edges
}

/// Plan bridges for interface methods implemented by a program superclass.
/// Only directly implemented interfaces are considered.
pub fn plan_bridges(graph: &ShrinkerGraph, logger: &ShrinkerLogger, classes: &[NodeIndex]) -> Vec<BridgePlan> {
    classes
        .par_iter()
        .flat_map_iter(|class| plan_class_bridges(graph, logger, *class))
        .collect()
}

fn plan_class_bridges(graph: &ShrinkerGraph, logger: &ShrinkerLogger, class: NodeIndex) -> Vec<BridgePlan> {
    let interfaces = match graph.interfaces(class) {
        Ok(interfaces) => interfaces,
        Err(e) => {
            logger.unresolvable_supertype(graph.name(class), &e.class);
            return Vec::new();
        }
    };
    let declared: HashSet<String> = graph
        .methods(class)
        .into_iter()
        .map(|m| graph.member_id(m))
        .collect();

    let mut plans = Vec::new();
    for interface in interfaces {
        for method in graph.methods(interface) {
            if graph.modifiers(method) & access::STATIC != 0 || graph.name(method).starts_with('<') {
                continue;
            }
            if declared.contains(&graph.member_id(method)) {
                continue;
            }

            let mut current = graph.superclass(class);
            loop {
                match current {
                    Ok(Some(parent)) => {
                        if graph.is_library_class(parent) {
                            break;
                        }
                        if let Some(implementation) = graph.find_matching_method(parent, method) {
                            plans.push(BridgePlan {
                                class,
                                interface_method: method,
                                implementation,
                                name: format!("{}{}", graph.name(method), BRIDGE_SUFFIX),
                                descriptor: graph.descriptor(method).to_string(),
                                modifiers: graph.modifiers(method),
                            });
                            break;
                        }
                        current = graph.superclass(parent);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        logger.unresolvable_supertype(graph.name(class), &e.class);
                        break;
                    }
                }
            }
        }
    }
    plans
}

/// Add planned bridge members and their edges; returns the edge count
pub fn commit_bridges(graph: &mut ShrinkerGraph, plans: &[BridgePlan]) -> Result<usize> {
    let mut added = 0;
    for plan in plans {
        let bridge = graph.add_member(plan.class, &plan.name, &plan.descriptor, plan.modifiers)?;
        let mut edges = vec![(bridge, plan.implementation, DependencyType::RequiredClassStructure)];
        if graph.is_library_node(plan.interface_method) {
            edges.push((plan.class, bridge, DependencyType::RequiredClassStructure));
        } else {
            edges.push((plan.class, bridge, DependencyType::ClassIsKept));
            edges.push((plan.interface_method, bridge, DependencyType::IfClassKept));
        }
        for (source, target, kind) in edges {
            if graph.add_dependency(source, target, kind) {
                added += 1;
            }
        }
    }
    Ok(added)
}

pub fn is_bridge(graph: &ShrinkerGraph, member: NodeIndex) -> bool {
    graph.name(member).ends_with(BRIDGE_SUFFIX)
}
