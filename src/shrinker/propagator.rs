//! Counter-based liveness propagation
//!
//! Expansion of a node's outgoing edges is gated on its reachability
//! flipping, which makes the walk terminate on dependency cycles and
//! expands every node at most once per counter set. The walk uses an
//! explicit stack instead of recursion.

use crate::graph::{CounterSet, DependencyType, ShrinkerGraph};
use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use tracing::debug;

/// Increment `node` and everything that becomes reachable through it
pub fn increment_counter(graph: &ShrinkerGraph, node: NodeIndex, kind: DependencyType, set: CounterSet) {
    let mut stack = vec![(node, kind)];
    while let Some((node, kind)) = stack.pop() {
        if graph.increment_and_check(node, kind, set) {
            stack.extend(graph.dependencies(node).into_iter().map(|d| (d.target, d.kind)));
        }
    }
}

/// Mirror of `increment_counter`, used to retract an edge
pub fn decrement_counter(graph: &ShrinkerGraph, node: NodeIndex, kind: DependencyType, set: CounterSet) {
    let mut stack = vec![(node, kind)];
    while let Some((node, kind)) = stack.pop() {
        if graph.decrement_and_check(node, kind, set) {
            stack.extend(graph.dependencies(node).into_iter().map(|d| (d.target, d.kind)));
        }
    }
}

/// Walk the graph from every root of `set`, in parallel
pub fn set_counters(graph: &ShrinkerGraph, set: CounterSet) {
    let roots = graph.roots(set);
    debug!("Propagating {} roots for counter set {}", roots.len(), set);
    roots
        .par_iter()
        .for_each(|(node, kind)| increment_counter(graph, *node, *kind, set));
}
