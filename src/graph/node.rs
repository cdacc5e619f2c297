use super::counters::NodeCounters;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Kind of graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Class,
    Method,
    Field,
}

/// Hierarchy and origin of a declared class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub super_class: Option<NodeIndex>,
    pub interfaces: Vec<NodeIndex>,
    /// Class file the class was read from; `None` for library classes
    pub source: Option<PathBuf>,
    /// Declared members in declaration order
    pub members: Vec<NodeIndex>,
}

/// A class or member vertex
///
/// Nodes are created on first mention, either by a declaration or by a
/// reference. Only declared nodes carry modifiers and hierarchy data.
#[derive(Debug)]
pub struct Node {
    /// `pkg/Class` or `pkg/Class.name:descriptor`
    pub(crate) key: String,
    pub(crate) kind: NodeKind,
    pub(crate) declared: bool,
    pub(crate) modifiers: u16,
    /// Owning class of a member; `None` for classes
    pub(crate) owner: Option<NodeIndex>,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) class: Option<ClassInfo>,
    pub(crate) annotations: BTreeSet<String>,
    pub(crate) counters: NodeCounters,
}

impl Node {
    pub(crate) fn class(name: &str) -> Self {
        Self {
            key: name.to_string(),
            kind: NodeKind::Class,
            declared: false,
            modifiers: 0,
            owner: None,
            name: name.to_string(),
            descriptor: String::new(),
            class: None,
            annotations: BTreeSet::new(),
            counters: NodeCounters::default(),
        }
    }

    pub(crate) fn member(key: String, owner: NodeIndex, name: &str, descriptor: &str) -> Self {
        let kind = if descriptor.starts_with('(') {
            NodeKind::Method
        } else {
            NodeKind::Field
        };
        Self {
            key,
            kind,
            declared: false,
            modifiers: 0,
            owner: Some(owner),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            class: None,
            annotations: BTreeSet::new(),
            counters: NodeCounters::default(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_declared(&self) -> bool {
        self.declared
    }

    pub fn is_class(&self) -> bool {
        self.kind == NodeKind::Class
    }
}

/// Key of a member node
pub fn member_key(owner: &str, name: &str, descriptor: &str) -> String {
    format!("{}.{}:{}", owner, name, descriptor)
}
