//! Graph persistence between runs
//!
//! The whole graph (nodes, edges, per-set counters, roots and the input
//! fingerprints) is written as one versioned JSON document. Node indices
//! are stored as plain integers and restored in order, so a loaded graph
//! has exactly the indices it was saved with.

use super::{ClassInfo, Counter, CounterSet, DependencyType, Node, NodeKind, ShrinkerGraph};
use crate::discovery::InputFingerprints;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Snapshot format version; bump whenever the layout changes
const SNAPSHOT_VERSION: u32 = 1;

/// File name used inside the state directory
pub const SNAPSHOT_FILE: &str = "shrinker-state.json";

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to access snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse snapshot: {0}")]
    Format(#[from] serde_json::Error),

    #[error("snapshot version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("no snapshot at {0}")]
    Missing(PathBuf),

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

/// Storage of graph snapshots between process invocations
pub trait SnapshotStore {
    fn save(&self, graph: &ShrinkerGraph) -> Result<(), SnapshotError>;
    fn load(&self) -> Result<ShrinkerGraph, SnapshotError>;
    fn clear(&self) -> Result<(), SnapshotError>;
}

/// Snapshot store backed by a JSON file in a state directory
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(SNAPSHOT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn save(&self, graph: &ShrinkerGraph) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, &GraphSnapshot::capture(graph))?;
        debug!(
            "Saved graph snapshot ({} nodes) to {}",
            graph.node_count(),
            self.path.display()
        );
        Ok(())
    }

    fn load(&self) -> Result<ShrinkerGraph, SnapshotError> {
        if !self.path.exists() {
            return Err(SnapshotError::Missing(self.path.clone()));
        }
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let snapshot: GraphSnapshot = serde_json::from_reader(reader)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        let graph = snapshot.restore()?;
        debug!(
            "Loaded graph snapshot ({} nodes) from {}",
            graph.node_count(),
            self.path.display()
        );
        Ok(graph)
    }

    fn clear(&self) -> Result<(), SnapshotError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphSnapshot {
    version: u32,
    ignore_sdk_packages: bool,
    registration_closed: bool,
    nodes: Vec<NodeRecord>,
    edges: Vec<(usize, usize, DependencyType)>,
    roots: Vec<(CounterSet, Vec<(usize, DependencyType)>)>,
    inputs: InputFingerprints,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeRecord {
    key: String,
    kind: NodeKind,
    declared: bool,
    modifiers: u16,
    owner: Option<usize>,
    name: String,
    descriptor: String,
    class: Option<ClassRecord>,
    annotations: BTreeSet<String>,
    counters: Vec<(CounterSet, Counter)>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClassRecord {
    super_class: Option<usize>,
    interfaces: Vec<usize>,
    source: Option<PathBuf>,
    members: Vec<usize>,
}

impl GraphSnapshot {
    fn capture(graph: &ShrinkerGraph) -> Self {
        let nodes = graph
            .inner
            .node_weights()
            .map(|node| NodeRecord {
                key: node.key.clone(),
                kind: node.kind,
                declared: node.declared,
                modifiers: node.modifiers,
                owner: node.owner.map(|o| o.index()),
                name: node.name.clone(),
                descriptor: node.descriptor.clone(),
                class: node.class.as_ref().map(|info| ClassRecord {
                    super_class: info.super_class.map(|s| s.index()),
                    interfaces: info.interfaces.iter().map(|i| i.index()).collect(),
                    source: info.source.clone(),
                    members: info.members.iter().map(|m| m.index()).collect(),
                }),
                annotations: node.annotations.clone(),
                counters: CounterSet::ALL
                    .iter()
                    .map(|set| (*set, node.counters.get(*set)))
                    .filter(|(_, counter)| *counter != Counter::default())
                    .collect(),
            })
            .collect();

        let edges = graph
            .inner
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), *e.weight()))
            .collect();

        let roots = graph
            .roots
            .iter()
            .map(|(set, roots)| {
                let mut list: Vec<(usize, DependencyType)> =
                    roots.iter().map(|(n, k)| (n.index(), *k)).collect();
                list.sort();
                (*set, list)
            })
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            ignore_sdk_packages: graph.ignore_sdk_packages,
            registration_closed: graph.registration_closed,
            nodes,
            edges,
            roots,
            inputs: graph.inputs.clone(),
        }
    }

    fn restore(self) -> Result<ShrinkerGraph, SnapshotError> {
        let count = self.nodes.len();
        let index_of = |i: usize| -> Result<NodeIndex, SnapshotError> {
            if i < count {
                Ok(NodeIndex::new(i))
            } else {
                Err(SnapshotError::Corrupt(format!("node index {} out of range", i)))
            }
        };

        let mut inner: DiGraph<Node, DependencyType> = DiGraph::with_capacity(count, self.edges.len());
        let mut index = HashMap::with_capacity(count);
        for record in self.nodes {
            let class = match record.class {
                Some(info) => Some(ClassInfo {
                    super_class: info.super_class.map(index_of).transpose()?,
                    interfaces: info
                        .interfaces
                        .into_iter()
                        .map(index_of)
                        .collect::<Result<_, _>>()?,
                    source: info.source,
                    members: info
                        .members
                        .into_iter()
                        .map(index_of)
                        .collect::<Result<_, _>>()?,
                }),
                None => None,
            };
            let mut node = match record.owner {
                Some(owner) => Node::member(record.key.clone(), index_of(owner)?, &record.name, &record.descriptor),
                None => Node::class(&record.name),
            };
            node.key = record.key;
            node.kind = record.kind;
            node.declared = record.declared;
            node.modifiers = record.modifiers;
            node.class = class;
            node.annotations = record.annotations;
            for (set, counter) in record.counters {
                node.counters.set(set, counter);
            }

            let key = node.key.clone();
            let id = inner.add_node(node);
            index.insert(key, id);
        }

        for (source, target, kind) in self.edges {
            inner.add_edge(index_of(source)?, index_of(target)?, kind);
        }

        let mut roots = BTreeMap::new();
        for (set, list) in self.roots {
            let mut map = HashMap::with_capacity(list.len());
            for (node, kind) in list {
                map.insert(index_of(node)?, kind);
            }
            roots.insert(set, map);
        }

        Ok(ShrinkerGraph {
            inner,
            index,
            registration_closed: self.registration_closed,
            roots,
            ignore_sdk_packages: self.ignore_sdk_packages,
            inputs: self.inputs,
        })
    }
}
