//! Reachability graph store
//!
//! Classes and members are petgraph nodes keyed by their string identity
//! (`pkg/Class`, `pkg/Class.name:descriptor`); edges carry a
//! `DependencyType`. Node indices are the dense ids used by every pass.
//!
//! Mutation (`&mut self`) happens while the builder commits the results of
//! a parallel phase. Counter updates go through per-node locks and take
//! `&self`, so propagation can run on many threads over a frozen edge set.

mod counters;
mod dependency;
pub mod hierarchy;
mod node;
pub mod snapshot;

pub use counters::{Counter, CounterSet, NodeCounters};
pub use dependency::{Dependency, DependencyType};
pub use hierarchy::TypeHierarchy;
pub use node::{member_key, ClassInfo, Node, NodeKind};
pub use snapshot::{JsonSnapshotStore, SnapshotError, SnapshotStore};

use crate::discovery::InputFingerprints;
use crate::shrinker::ShrinkerLogger;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Suffix of synthetic members created by the multiple-inheritance pass
pub const BRIDGE_SUFFIX: &str = "$shrinker_fake";

/// Errors raised by graph mutation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("class registration is closed; cannot add class {0}")]
    RegistrationClosed(String),
    #[error("cannot add member {member}: owner class {owner} is not declared")]
    UnknownOwner { owner: String, member: String },
}

/// A hierarchy query named a class the graph does not declare
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown class {class}")]
pub struct ClassLookupError {
    pub class: String,
}

/// True for platform packages that are never shrunk and never recorded as
/// dependency targets
pub fn is_sdk_package(name: &str) -> bool {
    name.starts_with("java/") || (name.starts_with("android/") && !name.contains("/support/"))
}

/// The mutable reachability graph
#[derive(Debug)]
pub struct ShrinkerGraph {
    inner: DiGraph<Node, DependencyType>,
    index: HashMap<String, NodeIndex>,
    registration_closed: bool,
    roots: BTreeMap<CounterSet, HashMap<NodeIndex, DependencyType>>,
    ignore_sdk_packages: bool,
    inputs: InputFingerprints,
}

impl Default for ShrinkerGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ShrinkerGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            inner: DiGraph::new(),
            index: HashMap::new(),
            registration_closed: false,
            roots: BTreeMap::new(),
            ignore_sdk_packages: true,
            inputs: InputFingerprints::default(),
        }
    }

    /// Treat SDK package names like any other class when `false`
    pub fn with_sdk_filter(mut self, enabled: bool) -> Self {
        self.ignore_sdk_packages = enabled;
        self
    }

    pub fn sdk_filter_enabled(&self) -> bool {
        self.ignore_sdk_packages
    }

    /// SDK check honouring the graph's filter setting
    pub fn is_sdk_class(&self, name: &str) -> bool {
        self.ignore_sdk_packages && is_sdk_package(name)
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn node(&self, node: NodeIndex) -> &Node {
        &self.inner[node]
    }

    // ---------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------

    /// Node for a class name, created as an undeclared placeholder if new
    pub fn class_reference(&mut self, name: &str) -> NodeIndex {
        if let Some(&node) = self.index.get(name) {
            return node;
        }
        let node = self.inner.add_node(Node::class(name));
        self.index.insert(name.to_string(), node);
        node
    }

    /// Node for a member, created as an undeclared placeholder if new
    pub fn member_reference(&mut self, owner: &str, name: &str, descriptor: &str) -> NodeIndex {
        let key = member_key(owner, name, descriptor);
        if let Some(&node) = self.index.get(&key) {
            return node;
        }
        let owner = self.class_reference(owner);
        let node = self
            .inner
            .add_node(Node::member(key.clone(), owner, name, descriptor));
        self.index.insert(key, node);
        node
    }

    /// Register a class declaration; `source` is `None` for library classes
    pub fn add_class(
        &mut self,
        name: &str,
        super_name: Option<&str>,
        interfaces: &[String],
        modifiers: u16,
        source: Option<PathBuf>,
    ) -> Result<NodeIndex, GraphError> {
        if self.registration_closed {
            return Err(GraphError::RegistrationClosed(name.to_string()));
        }

        let node = self.class_reference(name);
        if let Some(existing) = &self.inner[node].class {
            match (&existing.source, &source) {
                (Some(_), None) => {
                    debug!("Library class {} is shadowed by a program class", name);
                    return Ok(node);
                }
                (Some(old), Some(new)) => warn!(
                    "Duplicate class {} in {} and {}, using the latter",
                    name,
                    old.display(),
                    new.display()
                ),
                _ => debug!("Duplicate definition of class {}", name),
            }
            for member in existing.members.clone() {
                self.inner[member].declared = false;
            }
        }

        let super_class = super_name.map(|s| self.class_reference(s));
        let interfaces: Vec<NodeIndex> = interfaces
            .iter()
            .map(|i| self.class_reference(i))
            .collect();

        let weight = &mut self.inner[node];
        weight.declared = true;
        weight.modifiers = modifiers;
        weight.annotations.clear();
        weight.class = Some(ClassInfo {
            super_class,
            interfaces,
            source,
            members: Vec::new(),
        });
        Ok(node)
    }

    /// Register a member of an already declared class
    pub fn add_member(
        &mut self,
        owner: NodeIndex,
        name: &str,
        descriptor: &str,
        modifiers: u16,
    ) -> Result<NodeIndex, GraphError> {
        let owner_node = &self.inner[owner];
        if owner_node.class.is_none() {
            return Err(GraphError::UnknownOwner {
                owner: owner_node.key.clone(),
                member: format!("{}:{}", name, descriptor),
            });
        }
        let owner_name = owner_node.name.clone();
        let member = self.member_reference(&owner_name, name, descriptor);

        let weight = &mut self.inner[member];
        weight.declared = true;
        weight.modifiers = modifiers;
        weight.annotations.clear();
        if let Some(info) = self.inner[owner].class.as_mut() {
            if !info.members.contains(&member) {
                info.members.push(member);
            }
        }
        Ok(member)
    }

    pub fn add_annotation(&mut self, node: NodeIndex, annotation: &str) {
        self.inner[node].annotations.insert(annotation.to_string());
    }

    /// One-way barrier after which no classes may be added
    pub fn close_class_registration(&mut self) {
        self.registration_closed = true;
    }

    pub fn is_registration_closed(&self) -> bool {
        self.registration_closed
    }

    // ---------------------------------------------------------------
    // Lookups
    // ---------------------------------------------------------------

    /// Find any node by key
    pub fn find(&self, key: &str) -> Option<NodeIndex> {
        self.index.get(key).copied()
    }

    pub fn find_class(&self, name: &str) -> Option<NodeIndex> {
        self.find(name).filter(|n| self.inner[*n].is_class())
    }

    pub fn find_member(&self, owner: &str, name: &str, descriptor: &str) -> Option<NodeIndex> {
        self.find(&member_key(owner, name, descriptor))
    }

    pub fn key(&self, node: NodeIndex) -> &str {
        &self.inner[node].key
    }

    /// Internal name of a class, simple name of a member
    pub fn name(&self, node: NodeIndex) -> &str {
        &self.inner[node].name
    }

    pub fn descriptor(&self, node: NodeIndex) -> &str {
        &self.inner[node].descriptor
    }

    /// `name:descriptor` of a member
    pub fn member_id(&self, member: NodeIndex) -> String {
        let node = &self.inner[member];
        format!("{}:{}", node.name, node.descriptor)
    }

    pub fn kind(&self, node: NodeIndex) -> NodeKind {
        self.inner[node].kind
    }

    pub fn modifiers(&self, node: NodeIndex) -> u16 {
        self.inner[node].modifiers
    }

    pub fn is_declared(&self, node: NodeIndex) -> bool {
        self.inner[node].declared
    }

    pub fn annotations(&self, node: NodeIndex) -> &BTreeSet<String> {
        &self.inner[node].annotations
    }

    /// The class itself for class nodes, the owner for members
    pub fn owner_class(&self, node: NodeIndex) -> NodeIndex {
        self.inner[node].owner.unwrap_or(node)
    }

    pub fn class_info(&self, class: NodeIndex) -> Option<&ClassInfo> {
        self.inner[class].class.as_ref()
    }

    pub fn is_class_known(&self, class: NodeIndex) -> bool {
        self.inner[class].class.is_some()
    }

    pub fn source_file(&self, class: NodeIndex) -> Option<&Path> {
        self.class_info(class).and_then(|info| info.source.as_deref())
    }

    /// SDK classes, undeclared classes and classes without a source file
    pub fn is_library_class(&self, class: NodeIndex) -> bool {
        let node = &self.inner[class];
        if self.is_sdk_class(&node.name) {
            return true;
        }
        match &node.class {
            Some(info) => info.source.is_none(),
            None => true,
        }
    }

    pub fn is_program_class(&self, class: NodeIndex) -> bool {
        !self.is_library_class(class)
    }

    /// Library classes and their members
    pub fn is_library_node(&self, node: NodeIndex) -> bool {
        self.is_library_class(self.owner_class(node))
    }

    /// Superclass of a declared class; fails if either is unknown
    pub fn superclass(&self, class: NodeIndex) -> Result<Option<NodeIndex>, ClassLookupError> {
        let info = self.class_info(class).ok_or_else(|| ClassLookupError {
            class: self.inner[class].name.clone(),
        })?;
        match info.super_class {
            None => Ok(None),
            Some(parent) if self.is_class_known(parent) => Ok(Some(parent)),
            Some(parent) => Err(ClassLookupError {
                class: self.inner[parent].name.clone(),
            }),
        }
    }

    /// Directly implemented interfaces of a declared class
    pub fn interfaces(&self, class: NodeIndex) -> Result<Vec<NodeIndex>, ClassLookupError> {
        self.class_info(class)
            .map(|info| info.interfaces.clone())
            .ok_or_else(|| ClassLookupError {
                class: self.inner[class].name.clone(),
            })
    }

    /// Member of `class` with the same `name:descriptor` as `member`;
    /// no hierarchy walk
    pub fn find_matching_method(&self, class: NodeIndex, member: NodeIndex) -> Option<NodeIndex> {
        let node = &self.inner[member];
        let key = member_key(&self.inner[class].name, &node.name, &node.descriptor);
        self.find(&key)
            .filter(|m| self.inner[*m].declared && self.inner[*m].owner == Some(class))
    }

    /// Declared members of a class
    pub fn members(&self, class: NodeIndex) -> Vec<NodeIndex> {
        self.class_info(class)
            .map(|info| {
                info.members
                    .iter()
                    .copied()
                    .filter(|m| self.inner[*m].declared)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn methods(&self, class: NodeIndex) -> Vec<NodeIndex> {
        self.members(class)
            .into_iter()
            .filter(|m| self.inner[*m].kind == NodeKind::Method)
            .collect()
    }

    pub fn fields(&self, class: NodeIndex) -> Vec<NodeIndex> {
        self.members(class)
            .into_iter()
            .filter(|m| self.inner[*m].kind == NodeKind::Field)
            .collect()
    }

    /// Every declared class, program and library
    pub fn classes(&self) -> Vec<NodeIndex> {
        self.inner
            .node_indices()
            .filter(|n| self.inner[*n].class.is_some())
            .collect()
    }

    pub fn program_classes(&self) -> Vec<NodeIndex> {
        self.classes()
            .into_iter()
            .filter(|c| self.is_program_class(*c))
            .collect()
    }

    // ---------------------------------------------------------------
    // Edges
    // ---------------------------------------------------------------

    /// Add an edge; returns false if the same edge already exists
    pub fn add_dependency(&mut self, source: NodeIndex, target: NodeIndex, kind: DependencyType) -> bool {
        let exists = self
            .inner
            .edges(source)
            .any(|e| e.target() == target && *e.weight() == kind);
        if exists {
            return false;
        }
        self.inner.add_edge(source, target, kind);
        true
    }

    /// Remove an edge; returns false if it was not present
    pub fn remove_dependency(&mut self, source: NodeIndex, dependency: Dependency) -> bool {
        let edge = self
            .inner
            .edges(source)
            .find(|e| e.target() == dependency.target && *e.weight() == dependency.kind)
            .map(|e| e.id());
        match edge {
            Some(edge) => {
                self.inner.remove_edge(edge);
                true
            }
            None => false,
        }
    }

    /// Outgoing edges of a node
    pub fn dependencies(&self, source: NodeIndex) -> Vec<Dependency> {
        self.inner
            .edges(source)
            .map(|e| Dependency::new(e.target(), *e.weight()))
            .collect()
    }

    /// Outgoing edges that incremental runs recompute
    pub fn code_dependencies(&self, source: NodeIndex) -> Vec<Dependency> {
        self.inner
            .edges(source)
            .filter(|e| e.weight().is_code_reference())
            .map(|e| Dependency::new(e.target(), *e.weight()))
            .collect()
    }

    /// Prune edges pointing at nodes that were referenced but never declared.
    /// Returns the number of pruned edges.
    pub fn check_dependencies(&mut self, logger: &ShrinkerLogger) -> usize {
        let mut invalid: Vec<EdgeIndex> = Vec::new();
        for edge in self.inner.edge_references() {
            let target = &self.inner[edge.target()];
            if target.declared {
                continue;
            }
            let owner_name = &self.inner[self.owner_class(edge.target())].name;
            if self.is_sdk_class(owner_name) {
                continue;
            }
            let source = &self.inner[edge.source()].key;
            match target.kind {
                NodeKind::Class => {
                    if *edge.weight() != DependencyType::RequiredCodeReferenceReflection {
                        logger.invalid_class_reference(source, &target.key);
                    }
                }
                _ => logger.invalid_member_reference(source, &target.key),
            }
            invalid.push(edge.id());
        }

        invalid.sort_unstable_by(|a, b| b.cmp(a));
        let pruned = invalid.len();
        for edge in invalid {
            self.inner.remove_edge(edge);
        }
        if pruned > 0 {
            debug!("Pruned {} dependencies on unknown nodes", pruned);
        }
        pruned
    }

    // ---------------------------------------------------------------
    // Counters
    // ---------------------------------------------------------------

    /// Counter update; true if the node's reachability flipped
    pub fn increment_and_check(&self, node: NodeIndex, kind: DependencyType, set: CounterSet) -> bool {
        self.inner[node].counters.increment_and_check(set, kind)
    }

    pub fn decrement_and_check(&self, node: NodeIndex, kind: DependencyType, set: CounterSet) -> bool {
        let (flipped, underflow) = self.inner[node].counters.decrement_and_check(set, kind);
        if underflow {
            warn!(
                "Counter underflow on {} ({}, {})",
                self.inner[node].key, kind, set
            );
        }
        flipped
    }

    /// Library nodes are always reachable
    pub fn is_reachable(&self, node: NodeIndex, set: CounterSet) -> bool {
        self.is_library_node(node) || self.inner[node].counters.get(set).is_reachable()
    }

    pub fn counter(&self, node: NodeIndex, set: CounterSet) -> Counter {
        self.inner[node].counters.get(set)
    }

    pub fn clear_counters(&self, set: CounterSet) {
        for node in self.inner.node_weights() {
            node.counters.reset(set);
        }
    }

    /// Reachable program classes
    pub fn reachable_classes(&self, set: CounterSet) -> Vec<NodeIndex> {
        self.program_classes()
            .into_iter()
            .filter(|c| self.is_reachable(*c, set))
            .collect()
    }

    /// `name:descriptor` of every reachable declared member of `class`
    pub fn reachable_members(&self, class: NodeIndex, set: CounterSet) -> BTreeSet<String> {
        self.members(class)
            .into_iter()
            .filter(|m| self.is_reachable(*m, set))
            .map(|m| self.member_id(m))
            .collect()
    }

    // ---------------------------------------------------------------
    // Roots
    // ---------------------------------------------------------------

    /// Record a root; a required kind wins over a conditional one
    pub fn add_root(&mut self, set: CounterSet, node: NodeIndex, kind: DependencyType) {
        let roots = self.roots.entry(set).or_default();
        match roots.get(&node) {
            Some(existing) if existing.is_required() => {}
            _ => {
                roots.insert(node, kind);
            }
        }
    }

    pub fn roots(&self, set: CounterSet) -> Vec<(NodeIndex, DependencyType)> {
        let mut roots: Vec<_> = self
            .roots
            .get(&set)
            .map(|r| r.iter().map(|(n, k)| (*n, *k)).collect())
            .unwrap_or_default();
        roots.sort();
        roots
    }

    /// Counter sets that have roots recorded
    pub fn root_sets(&self) -> Vec<CounterSet> {
        self.roots
            .iter()
            .filter(|(_, roots)| !roots.is_empty())
            .map(|(set, _)| *set)
            .collect()
    }

    pub fn clear_roots(&mut self, set: CounterSet) {
        self.roots.remove(&set);
    }

    // ---------------------------------------------------------------
    // Inputs
    // ---------------------------------------------------------------

    pub fn inputs(&self) -> &InputFingerprints {
        &self.inputs
    }

    pub fn set_inputs(&mut self, inputs: InputFingerprints) {
        self.inputs = inputs;
    }
}
