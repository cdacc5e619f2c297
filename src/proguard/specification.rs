// Class and member specifications of keep rules, matched against the graph

use crate::classfile::access;
use crate::graph::{NodeKind, ShrinkerGraph, TypeHierarchy};
use petgraph::graph::NodeIndex;
use regex::Regex;
use std::collections::BTreeSet;

/// A name pattern, optionally negated with `!`
#[derive(Debug, Clone)]
pub struct NameSpecification {
    pattern: Regex,
    negated: bool,
}

impl NameSpecification {
    pub fn new(pattern: Regex, negated: bool) -> Self {
        Self { pattern, negated }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name) != self.negated
    }
}

/// `public !final ...`: flags that must be set and flags that must be clear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierSpecification {
    pub required: u16,
    pub forbidden: u16,
}

impl ModifierSpecification {
    pub fn add(&mut self, flag: u16, negated: bool) {
        if negated {
            self.forbidden |= flag;
        } else {
            self.required |= flag;
        }
    }

    pub fn matches(&self, flags: u16) -> bool {
        flags & self.required == self.required && flags & self.forbidden == 0
    }
}

/// A modifier keyword as an access flag
pub fn modifier_flag(word: &str) -> Option<u16> {
    let flag = match word {
        "public" => access::PUBLIC,
        "private" => access::PRIVATE,
        "protected" => access::PROTECTED,
        "static" => access::STATIC,
        "final" => access::FINAL,
        "synchronized" => access::SYNCHRONIZED,
        "volatile" => access::VOLATILE,
        "bridge" => access::BRIDGE,
        "transient" => access::TRANSIENT,
        "varargs" => access::VARARGS,
        "native" => access::NATIVE,
        "abstract" => access::ABSTRACT,
        "strictfp" => access::STRICT,
        "synthetic" => access::SYNTHETIC,
        _ => return None,
    };
    Some(flag)
}

/// `@pkg.Annotation`; satisfied when any annotation of the node matches
#[derive(Debug, Clone)]
pub struct AnnotationSpecification {
    name: NameSpecification,
}

impl AnnotationSpecification {
    pub fn new(name: NameSpecification) -> Self {
        Self { name }
    }

    pub fn matches(&self, annotations: &BTreeSet<String>) -> bool {
        annotations.iter().any(|a| self.name.matches(a))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassType {
    /// Any class or interface
    Class,
    Interface,
    Enum,
    Annotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassTypeSpecification {
    pub class_type: ClassType,
    pub negated: bool,
}

impl ClassTypeSpecification {
    pub fn matches(&self, flags: u16) -> bool {
        let is = match self.class_type {
            ClassType::Class => true,
            ClassType::Interface => flags & access::INTERFACE != 0,
            ClassType::Enum => flags & access::ENUM != 0,
            ClassType::Annotation => flags & access::ANNOTATION != 0,
        };
        is != self.negated
    }
}

/// `extends`/`implements` clause, matched against every ancestor
#[derive(Debug, Clone)]
pub struct InheritanceSpecification {
    pub name: NameSpecification,
    pub annotation: Option<AnnotationSpecification>,
}

impl InheritanceSpecification {
    pub fn matches(&self, class: NodeIndex, graph: &ShrinkerGraph) -> bool {
        TypeHierarchy::new(graph).ancestors(class).into_iter().any(|ancestor| {
            self.name.matches(graph.name(ancestor))
                && self
                    .annotation
                    .as_ref()
                    .map_or(true, |a| a.matches(graph.annotations(ancestor)))
        })
    }
}

/// A field or method line inside a rule body
#[derive(Debug, Clone)]
pub struct MemberSpecification {
    pub kind: NodeKind,
    /// Matched against `name:descriptor`
    pub pattern: Regex,
    pub modifiers: ModifierSpecification,
    pub annotation: Option<AnnotationSpecification>,
}

impl MemberSpecification {
    pub fn matches(&self, member: NodeIndex, graph: &ShrinkerGraph) -> bool {
        graph.kind(member) == self.kind
            && self.modifiers.matches(graph.modifiers(member))
            && self.pattern.is_match(&graph.member_id(member))
            && self
                .annotation
                .as_ref()
                .map_or(true, |a| a.matches(graph.annotations(member)))
    }
}

/// The class part of a keep rule plus its member body
#[derive(Debug, Clone)]
pub struct ClassSpecification {
    pub name: NameSpecification,
    pub class_type: Option<ClassTypeSpecification>,
    pub annotation: Option<AnnotationSpecification>,
    pub modifiers: ModifierSpecification,
    pub inheritance: Option<InheritanceSpecification>,
    pub members: Vec<MemberSpecification>,
    /// `allowshrinking` option; such rules never keep anything
    pub allow_shrinking: bool,
}

impl ClassSpecification {
    pub fn new(name: NameSpecification) -> Self {
        Self {
            name,
            class_type: None,
            annotation: None,
            modifiers: ModifierSpecification::default(),
            inheritance: None,
            members: Vec::new(),
            allow_shrinking: false,
        }
    }

    pub fn matches_class(&self, class: NodeIndex, graph: &ShrinkerGraph) -> bool {
        let flags = graph.modifiers(class);
        self.name.matches(graph.name(class))
            && self.class_type.map_or(true, |t| t.matches(flags))
            && self.modifiers.matches(flags)
            && self
                .annotation
                .as_ref()
                .map_or(true, |a| a.matches(graph.annotations(class)))
            && self
                .inheritance
                .as_ref()
                .map_or(true, |i| i.matches(class, graph))
    }

    /// Declared members matched by at least one member specification
    pub fn matching_members(&self, class: NodeIndex, graph: &ShrinkerGraph) -> Vec<NodeIndex> {
        graph
            .members(class)
            .into_iter()
            .filter(|m| self.members.iter().any(|spec| spec.matches(*m, graph)))
            .collect()
    }

    /// True if every member specification matches some declared member
    pub fn all_members_match(&self, class: NodeIndex, graph: &ShrinkerGraph) -> bool {
        let members = graph.members(class);
        self.members
            .iter()
            .all(|spec| members.iter().any(|m| spec.matches(*m, graph)))
    }
}
