use super::{KeptCount, ShrinkSummary};
use crate::shrinker::RunMode;
use colored::Colorize;
use miette::Result;

/// Terminal reporter with colored output
pub struct TerminalReporter {
    show_timing: bool,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self { show_timing: true }
    }

    pub fn with_timing(mut self, show: bool) -> Self {
        self.show_timing = show;
        self
    }

    pub fn report(&self, summary: &ShrinkSummary) -> Result<()> {
        println!();
        let mode = match summary.mode {
            RunMode::Full => "Full run".cyan().bold(),
            RunMode::Incremental => "Incremental run".green().bold(),
        };
        println!("{}", mode);
        if let Some(reason) = &summary.fallback_reason {
            println!("  {} {}", "Fell back to a full run:".yellow(), reason.dimmed());
        }
        println!();

        self.print_count("Classes", &summary.classes);
        self.print_count("Methods", &summary.methods);
        self.print_count("Fields", &summary.fields);
        if let Some(count) = summary.main_dex_classes {
            println!("  {:<10} {}", "Main dex".bold(), count);
        }
        println!();

        println!(
            "  {} written, {} deleted",
            summary.written.to_string().green(),
            summary.deleted.to_string().red()
        );
        if summary.warnings > 0 {
            println!(
                "  {}",
                format!("{} warnings", summary.warnings).yellow()
            );
        }
        if summary.suppressed > 0 {
            println!(
                "  {}",
                format!("{} suppressed diagnostics", summary.suppressed).dimmed()
            );
        }
        if self.show_timing {
            println!(
                "  {}",
                format!("Finished in {:.2}s", summary.elapsed_ms as f64 / 1000.0).dimmed()
            );
        }
        Ok(())
    }

    fn print_count(&self, label: &str, count: &KeptCount) {
        let percent = if count.total == 0 {
            0.0
        } else {
            count.removed() as f64 * 100.0 / count.total as f64
        };
        println!(
            "  {:<10} {} kept, {} removed of {} ({:.1}% removed)",
            label.bold(),
            count.kept.to_string().green(),
            count.removed().to_string().red(),
            count.total,
            percent
        );
    }
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}
