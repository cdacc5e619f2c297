mod json;
mod terminal;
pub mod usage;

pub use json::JsonReporter;
pub use terminal::TerminalReporter;
pub use usage::{main_dex_list, usage_report, write_main_dex_list, write_usage};

use crate::graph::{CounterSet, NodeKind, ShrinkerGraph};
use crate::shrinker::{is_bridge, RunMode, SessionOutcome, ShrinkerLogger};
use miette::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Output format for reports
#[derive(Debug, Clone, Default)]
pub enum ReportFormat {
    #[default]
    Terminal,
    Json,
}

/// Totals and kept counts of one node kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeptCount {
    pub total: usize,
    pub kept: usize,
}

impl KeptCount {
    pub fn removed(&self) -> usize {
        self.total - self.kept
    }
}

/// What a run kept and wrote
#[derive(Debug, Clone, Serialize)]
pub struct ShrinkSummary {
    pub mode: RunMode,
    pub fallback_reason: Option<String>,
    pub classes: KeptCount,
    pub methods: KeptCount,
    pub fields: KeptCount,
    pub written: usize,
    pub deleted: usize,
    pub warnings: usize,
    pub suppressed: usize,
    pub main_dex_classes: Option<usize>,
    pub elapsed_ms: u64,
}

impl ShrinkSummary {
    pub fn new(outcome: &SessionOutcome, logger: &ShrinkerLogger, elapsed: Duration) -> Self {
        let graph = &outcome.graph;
        let (classes, methods, fields) = kept_counts(graph, CounterSet::Shrink);
        let main_dex_classes = graph
            .root_sets()
            .contains(&CounterSet::LegacyMultidex)
            .then(|| graph.reachable_classes(CounterSet::LegacyMultidex).len());
        Self {
            mode: outcome.mode,
            fallback_reason: outcome.fallback_reason.clone(),
            classes,
            methods,
            fields,
            written: outcome.written,
            deleted: outcome.deleted,
            warnings: logger.warning_count(),
            suppressed: logger.suppressed_count(),
            main_dex_classes,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Class, method and field counts over the program classes; synthetic
/// bridges are not counted
pub fn kept_counts(graph: &ShrinkerGraph, set: CounterSet) -> (KeptCount, KeptCount, KeptCount) {
    let mut classes = KeptCount::default();
    let mut methods = KeptCount::default();
    let mut fields = KeptCount::default();
    for class in graph.program_classes() {
        let class_kept = graph.is_reachable(class, set);
        classes.total += 1;
        classes.kept += usize::from(class_kept);
        for member in graph.members(class) {
            if is_bridge(graph, member) {
                continue;
            }
            let count = match graph.kind(member) {
                NodeKind::Method => &mut methods,
                _ => &mut fields,
            };
            count.total += 1;
            count.kept += usize::from(class_kept && graph.is_reachable(member, set));
        }
    }
    (classes, methods, fields)
}

/// Reporter for run summaries
pub struct Reporter {
    format: ReportFormat,
    output_path: Option<PathBuf>,
}

impl Reporter {
    pub fn new(format: ReportFormat, output_path: Option<PathBuf>) -> Self {
        Self { format, output_path }
    }

    pub fn report(&self, summary: &ShrinkSummary) -> Result<()> {
        match &self.format {
            ReportFormat::Terminal => TerminalReporter::new().report(summary),
            ReportFormat::Json => JsonReporter::new(self.output_path.clone()).report(summary),
        }
    }
}
