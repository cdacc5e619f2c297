// ProGuard-format usage.txt and main-dex list writers
//
// usage.txt lists removed code:
// ```
// com.example.UnusedClass
// com.example.PartiallyUsedClass
//     int unusedField
//     void unusedMethod(java.lang.String)
// ```
// A class line without members means the whole class was removed.

use crate::classfile::descriptor::{java_method_signature, java_type_name, method_types, to_java_name};
use crate::graph::{CounterSet, NodeKind, ShrinkerGraph};
use crate::shrinker::is_bridge;
use miette::{IntoDiagnostic, Result, WrapErr};
use petgraph::graph::NodeIndex;
use std::fmt::Write as _;
use std::path::Path;

/// Removed classes and members of the program, sorted by class name
pub fn usage_report(graph: &ShrinkerGraph, set: CounterSet) -> String {
    let mut classes = graph.program_classes();
    classes.sort_by(|a, b| graph.name(*a).cmp(graph.name(*b)));

    let mut out = String::new();
    for class in classes {
        let java_name = to_java_name(graph.name(class));
        if !graph.is_reachable(class, set) {
            let _ = writeln!(out, "{}", java_name);
            continue;
        }
        let removed: Vec<String> = graph
            .members(class)
            .into_iter()
            .filter(|m| !is_bridge(graph, *m) && !graph.is_reachable(*m, set))
            .map(|m| member_line(graph, class, m))
            .collect();
        if removed.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{}", java_name);
        for line in removed {
            let _ = writeln!(out, "    {}", line);
        }
    }
    out
}

fn member_line(graph: &ShrinkerGraph, class: NodeIndex, member: NodeIndex) -> String {
    let name = graph.name(member);
    let descriptor = graph.descriptor(member);
    if graph.kind(member) == NodeKind::Field {
        return format!("{} {}", java_type_name(descriptor), name);
    }
    if name == "<init>" {
        let simple = graph.name(class).rsplit('/').next().unwrap_or(name);
        if let Ok((params, _)) = method_types(descriptor) {
            let params: Vec<String> = params.into_iter().map(java_type_name).collect();
            return format!("{}({})", simple, params.join(","));
        }
    }
    java_method_signature(name, descriptor).unwrap_or_else(|_| format!("{}:{}", name, descriptor))
}

/// Class files reachable in the main-dex counter set, one per line
pub fn main_dex_list(graph: &ShrinkerGraph) -> String {
    let mut names: Vec<&str> = graph
        .reachable_classes(CounterSet::LegacyMultidex)
        .into_iter()
        .map(|class| graph.name(class))
        .collect();
    names.sort_unstable();
    names.iter().map(|name| format!("{}.class\n", name)).collect()
}

pub fn write_usage(graph: &ShrinkerGraph, path: &Path) -> Result<()> {
    std::fs::write(path, usage_report(graph, CounterSet::Shrink))
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to write usage file: {}", path.display()))
}

pub fn write_main_dex_list(graph: &ShrinkerGraph, path: &Path) -> Result<()> {
    std::fs::write(path, main_dex_list(graph))
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to write main dex list: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::access;
    use crate::graph::DependencyType;
    use std::path::PathBuf;

    fn graph() -> ShrinkerGraph {
        let mut graph = ShrinkerGraph::new();
        let used = graph
            .add_class("com/example/Used", Some("java/lang/Object"), &[], access::PUBLIC, Some(PathBuf::from("U.class")))
            .unwrap();
        graph
            .add_class("com/example/Dead", Some("java/lang/Object"), &[], access::PUBLIC, Some(PathBuf::from("D.class")))
            .unwrap();
        let init = graph.add_member(used, "<init>", "(I)V", access::PUBLIC).unwrap();
        graph.add_member(used, "<init>", "(Ljava/lang/String;)V", access::PUBLIC).unwrap();
        graph.add_member(used, "names", "[Ljava/lang/String;", 0).unwrap();
        graph.add_member(used, "find", "(IJ)Lcom/example/Dead;", 0).unwrap();
        for node in [used, init] {
            graph.increment_and_check(node, DependencyType::RequiredClassStructure, CounterSet::Shrink);
            graph.increment_and_check(node, DependencyType::RequiredClassStructure, CounterSet::LegacyMultidex);
        }
        graph
    }

    #[test]
    fn test_usage_report_lists_removed_code() {
        let report = usage_report(&graph(), CounterSet::Shrink);
        assert_eq!(
            report,
            "com.example.Dead\n\
             com.example.Used\n    \
             Used(java.lang.String)\n    \
             java.lang.String[] names\n    \
             com.example.Dead find(int,long)\n"
        );
    }

    #[test]
    fn test_main_dex_list() {
        assert_eq!(main_dex_list(&graph()), "com/example/Used.class\n");
    }
}
