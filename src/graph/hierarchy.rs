use super::ShrinkerGraph;
use crate::shrinker::ShrinkerLogger;
use petgraph::graph::NodeIndex;
use std::collections::HashSet;

/// Pre-order walker over superclasses and interfaces
///
/// A class is yielded before its superclass subtree, which comes before
/// each interface subtree. Supertypes that were referenced but never
/// declared are yielded as leaves; when a logger is attached they are
/// reported unless they belong to an SDK package.
pub struct TypeHierarchy<'g> {
    graph: &'g ShrinkerGraph,
    logger: Option<&'g ShrinkerLogger>,
}

impl<'g> TypeHierarchy<'g> {
    pub fn new(graph: &'g ShrinkerGraph) -> Self {
        Self {
            graph,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: &'g ShrinkerLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// `start` followed by all of its ancestors, each at most once
    pub fn pre_order(&self, start: NodeIndex) -> Vec<NodeIndex> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![start];

        while let Some(class) = stack.pop() {
            if !visited.insert(class) {
                continue;
            }
            order.push(class);
            for parent in self.parents(class).into_iter().rev() {
                if !visited.contains(&parent) {
                    stack.push(parent);
                }
            }
        }
        order
    }

    /// All ancestors of `start`, excluding `start`
    pub fn ancestors(&self, start: NodeIndex) -> Vec<NodeIndex> {
        let mut order = self.pre_order(start);
        order.remove(0);
        order
    }

    fn parents(&self, class: NodeIndex) -> Vec<NodeIndex> {
        let Some(info) = self.graph.class_info(class) else {
            return Vec::new();
        };
        let parents: Vec<NodeIndex> = info
            .super_class
            .iter()
            .chain(info.interfaces.iter())
            .copied()
            .collect();

        if let Some(logger) = self.logger {
            for parent in &parents {
                let name = self.graph.name(*parent);
                if !self.graph.is_class_known(*parent) && !self.graph.is_sdk_class(name) {
                    logger.unresolvable_supertype(self.graph.name(class), name);
                }
            }
        }
        parents
    }
}
