// ProGuard-style keep rules
//
// Rules are parsed from configuration files or inline text and queried once
// per program class to produce the roots of a shrinking run:
// - `-keep`: the class and the matched members are required
// - `-keepclassmembers`: matched members are kept only if their class is
// - `-keepclasseswithmembers`: like `-keep`, but only when every member
//   specification matches

mod parser;
pub mod pattern;
pub mod specification;

pub use specification::ClassSpecification;

use crate::graph::{DependencyType, ShrinkerGraph};
use petgraph::graph::NodeIndex;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeepRuleError {
    #[error("failed to read keep rules from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{origin}:{line}: {message}")]
    Parse {
        origin: String,
        line: usize,
        message: String,
    },

    #[error("{origin}:{line}: flag {flag} is not supported by the shrinker")]
    UnsupportedFlag {
        origin: String,
        line: usize,
        flag: String,
    },

    #[error("invalid name pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Roots and extra edges contributed by one class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeepDecision {
    pub roots: Vec<(NodeIndex, DependencyType)>,
    pub edges: Vec<(NodeIndex, NodeIndex, DependencyType)>,
}

impl KeepDecision {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.edges.is_empty()
    }
}

/// Source of the roots of a shrinking run
pub trait KeepRules: Sync {
    fn keep_decision(&self, class: NodeIndex, graph: &ShrinkerGraph) -> KeepDecision;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepKind {
    Keep,
    KeepClassMembers,
    KeepClassesWithMembers,
}

#[derive(Debug, Clone)]
pub struct KeepRule {
    pub kind: KeepKind,
    pub class: ClassSpecification,
}

/// Parsed ProGuard configuration
#[derive(Debug, Clone, Default)]
pub struct ProguardKeepRules {
    rules: Vec<KeepRule>,
    dont_warn: Vec<Regex>,
}

impl ProguardKeepRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse rules given inline; `-include` paths are relative to the
    /// working directory
    pub fn parse_str(text: &str) -> Result<Self, KeepRuleError> {
        let mut rules = Self::new();
        rules.add_str(text, "<inline>")?;
        Ok(rules)
    }

    pub fn parse_file(path: &Path) -> Result<Self, KeepRuleError> {
        let mut rules = Self::new();
        rules.add_file(path)?;
        Ok(rules)
    }

    pub fn add_str(&mut self, text: &str, origin: &str) -> Result<(), KeepRuleError> {
        parser::parse_into(self, text, origin, None, &mut HashSet::new())
    }

    pub fn add_file(&mut self, path: &Path) -> Result<(), KeepRuleError> {
        parser::parse_file_into(self, path, &mut HashSet::new())
    }

    pub fn rules(&self) -> &[KeepRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Patterns of `-dontwarn`, over internal class names
    pub fn dont_warn(&self) -> &[Regex] {
        &self.dont_warn
    }
}

impl KeepRules for ProguardKeepRules {
    fn keep_decision(&self, class: NodeIndex, graph: &ShrinkerGraph) -> KeepDecision {
        let mut decision = KeepDecision::default();
        for rule in self.rules.iter().filter(|r| !r.class.allow_shrinking) {
            let spec = &rule.class;
            if !spec.matches_class(class, graph) {
                continue;
            }
            match rule.kind {
                KeepKind::Keep => {
                    decision.roots.push((class, DependencyType::RequiredClassStructure));
                    for member in spec.matching_members(class, graph) {
                        decision.roots.push((member, DependencyType::RequiredClassStructure));
                    }
                }
                KeepKind::KeepClassMembers => {
                    for member in spec.matching_members(class, graph) {
                        decision.edges.push((class, member, DependencyType::ClassIsKept));
                        decision.roots.push((member, DependencyType::IfClassKept));
                    }
                }
                KeepKind::KeepClassesWithMembers => {
                    if spec.all_members_match(class, graph) {
                        decision.roots.push((class, DependencyType::RequiredClassStructure));
                        for member in spec.matching_members(class, graph) {
                            decision.roots.push((member, DependencyType::RequiredClassStructure));
                        }
                    }
                }
            }
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::access;

    fn graph() -> (ShrinkerGraph, NodeIndex, NodeIndex, NodeIndex) {
        let mut graph = ShrinkerGraph::new();
        let foo = graph
            .add_class("com/example/Foo", Some("java/lang/Object"), &[], access::PUBLIC, Some(PathBuf::from("Foo.class")))
            .unwrap();
        let init = graph.add_member(foo, "<init>", "()V", access::PUBLIC).unwrap();
        let name = graph.add_member(foo, "name", "Ljava/lang/String;", access::PRIVATE).unwrap();
        graph.add_member(foo, "run", "()V", access::PUBLIC).unwrap();
        (graph, foo, init, name)
    }

    #[test]
    fn test_keep_class_and_constructor() {
        let (graph, foo, init, _) = graph();
        let rules = ProguardKeepRules::parse_str("-keep class com.example.Foo { <init>(); }").unwrap();
        let decision = rules.keep_decision(foo, &graph);
        assert_eq!(
            decision.roots,
            vec![
                (foo, DependencyType::RequiredClassStructure),
                (init, DependencyType::RequiredClassStructure),
            ]
        );
        assert!(decision.edges.is_empty());
    }

    #[test]
    fn test_keep_class_members_is_conditional() {
        let (graph, foo, _, name) = graph();
        let rules = ProguardKeepRules::parse_str("-keepclassmembers class ** { private <fields>; }").unwrap();
        let decision = rules.keep_decision(foo, &graph);
        assert_eq!(decision.roots, vec![(name, DependencyType::IfClassKept)]);
        assert_eq!(decision.edges, vec![(foo, name, DependencyType::ClassIsKept)]);
    }

    #[test]
    fn test_keep_classes_with_members_requires_all() {
        let (graph, foo, _, _) = graph();
        let matching = ProguardKeepRules::parse_str("-keepclasseswithmembers class * { public void run(); }").unwrap();
        assert_eq!(matching.keep_decision(foo, &graph).roots.len(), 2);

        let missing = ProguardKeepRules::parse_str(
            "-keepclasseswithmembers class * { public void run(); public void stop(); }",
        )
        .unwrap();
        assert!(missing.keep_decision(foo, &graph).is_empty());
    }

    #[test]
    fn test_allowshrinking_and_non_matching_rules_keep_nothing() {
        let (graph, foo, _, _) = graph();
        let rules = ProguardKeepRules::parse_str(
            "-keep,allowshrinking class com.example.Foo\n-keep class com.other.*\n-keep !public class *",
        )
        .unwrap();
        assert!(rules.keep_decision(foo, &graph).is_empty());
    }
}
