use clap::Parser;
use colored::Colorize;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use classshrink::config::Config;
use classshrink::discovery::ClassFileFinder;
use classshrink::graph::CounterSet;
use classshrink::proguard::ProguardKeepRules;
use classshrink::report::{self, ReportFormat, Reporter, ShrinkSummary};
use classshrink::shrinker::{ShrinkInputs, ShrinkOptions, ShrinkSession, ShrinkerLogger};

/// classshrink - Remove unreachable code from JVM class files
#[derive(Parser, Debug)]
#[command(name = "classshrink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Program class directories (can be specified multiple times)
    #[arg(short, long, value_name = "DIR")]
    program: Vec<PathBuf>,

    /// Library class directories (can be specified multiple times)
    #[arg(short, long, value_name = "DIR")]
    library: Vec<PathBuf>,

    /// Output directory for shrunk classes
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// ProGuard configuration files (can be specified multiple times)
    #[arg(short, long, value_name = "FILE")]
    keep: Vec<PathBuf>,

    /// Inline ProGuard rule, e.g. "-keep class com.example.Main"
    #[arg(long, value_name = "RULE")]
    rule: Vec<String>,

    /// ProGuard configuration for the main-dex list
    #[arg(long, value_name = "FILE")]
    main_dex_rules: Option<PathBuf>,

    /// Directory for the graph snapshot used by incremental runs
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Reuse the previous graph when only method bodies changed
    #[arg(long)]
    incremental: bool,

    /// Write a ProGuard usage.txt listing removed code
    #[arg(long, value_name = "FILE")]
    usage: Option<PathBuf>,

    /// Write the main-dex class list
    #[arg(long, value_name = "FILE")]
    main_dex_list: Option<PathBuf>,

    /// Summary format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Worker threads (0 = one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - only output results
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug, Default)]
enum OutputFormat {
    #[default]
    Terminal,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.quiet);

    info!("classshrink v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config(&cli)?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.shrinker.threads)
        .build_global()
        .into_diagnostic()
        .wrap_err("Failed to start the worker pool")?;

    run_shrinker(&config, &cli)
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        // Try to load from default locations
        let cwd = std::env::current_dir().into_diagnostic()?;
        Config::from_default_locations(&cwd)?
    };

    // Override with CLI arguments
    if !cli.program.is_empty() {
        config.program = cli.program.clone();
    }
    if !cli.library.is_empty() {
        config.libraries = cli.library.clone();
    }
    if let Some(output) = &cli.output {
        config.output = output.clone();
    }
    config.keep_rules.extend(cli.keep.iter().cloned());
    config.rules.extend(cli.rule.iter().cloned());
    if let Some(rules) = &cli.main_dex_rules {
        config.main_dex_rules.push(rules.clone());
    }
    if let Some(state_dir) = &cli.state_dir {
        config.state_dir = Some(state_dir.clone());
    }
    if cli.incremental {
        config.shrinker.incremental = true;
    }
    if let Some(usage) = &cli.usage {
        config.report.usage = Some(usage.clone());
    }
    if let Some(list) = &cli.main_dex_list {
        config.report.main_dex_list = Some(list.clone());
    }
    if let Some(format) = &cli.format {
        config.report.format = match format {
            OutputFormat::Terminal => "terminal".to_string(),
            OutputFormat::Json => "json".to_string(),
        };
    }
    if let Some(threads) = cli.threads {
        config.shrinker.threads = threads;
    }

    if config.program.is_empty() {
        return Err(miette::miette!(
            "No program directories given; use --program or set `program` in the config file"
        ));
    }
    Ok(config)
}

/// Keep rules plus the texts they came from, for the configuration digest
fn load_keep_rules(files: &[PathBuf], inline: &[String], texts: &mut Vec<String>) -> Result<ProguardKeepRules> {
    let mut rules = ProguardKeepRules::new();
    for file in files {
        let text = std::fs::read_to_string(file)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read keep rules: {}", file.display()))?;
        texts.push(text);
        rules.add_file(file).into_diagnostic()?;
    }
    for (i, rule) in inline.iter().enumerate() {
        texts.push(rule.clone());
        rules
            .add_str(rule, &format!("<rule {}>", i + 1))
            .into_diagnostic()?;
    }
    Ok(rules)
}

fn run_shrinker(config: &Config, cli: &Cli) -> Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    let start_time = Instant::now();
    let format = match config.report.format.as_str() {
        "json" => ReportFormat::Json,
        "terminal" => ReportFormat::Terminal,
        other => return Err(miette::miette!("Unknown report format: {}", other)),
    };
    let show_progress = matches!(format, ReportFormat::Terminal) && !cli.quiet;

    // Step 1: Discover class files
    info!("Discovering class files...");
    let finder = ClassFileFinder::new()
        .with_excludes(&config.exclude)
        .into_diagnostic()
        .wrap_err("Invalid exclude pattern")?;
    let program = finder
        .find_all(&config.program)
        .into_diagnostic()
        .wrap_err("Failed to read program directories")?;
    let libraries = finder
        .find_all(&config.libraries)
        .into_diagnostic()
        .wrap_err("Failed to read library directories")?;
    let inputs = ShrinkInputs::new(program, libraries);
    let program_count = inputs.program_files().len();
    info!(
        "Found {} program and {} library class files",
        program_count,
        inputs.library_files().len()
    );
    if program_count == 0 {
        println!("{}", "No program class files found.".yellow());
        return Ok(());
    }

    // Step 2: Keep rules
    let mut texts = Vec::new();
    let keep_rules = load_keep_rules(&config.keep_rules, &config.rules, &mut texts)?;
    if keep_rules.is_empty() {
        warn!("No keep rules given; every class will be removed");
    }
    texts.push("-- main dex --".to_string());
    let main_dex_rules = if config.main_dex_rules.is_empty() {
        None
    } else {
        Some(load_keep_rules(&config.main_dex_rules, &[], &mut texts)?)
    };

    let mut dont_warn = keep_rules.dont_warn().to_vec();
    if let Some(rules) = &main_dex_rules {
        dont_warn.extend(rules.dont_warn().iter().cloned());
    }
    let logger = ShrinkerLogger::new().with_dont_warn(dont_warn);

    // Step 3: Shrink
    let options = ShrinkOptions {
        output: config.output.clone(),
        state_dir: Some(config.state_directory()),
        incremental: config.shrinker.incremental,
        ignore_sdk_packages: config.shrinker.ignore_sdk_packages,
    };
    let mut session = ShrinkSession::new(&logger, options)
        .with_keep_rules(CounterSet::Shrink, &keep_rules)
        .with_configuration(texts.as_slice());
    if let Some(rules) = &main_dex_rules {
        session = session.with_keep_rules(CounterSet::LegacyMultidex, rules);
    }

    let spinner = if show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .into_diagnostic()?,
        );
        pb.set_message(format!("Shrinking {} classes...", program_count));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let outcome = session.run(&inputs);
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }
    let outcome = outcome.into_diagnostic().wrap_err("Shrinking failed")?;
    if let Some(reason) = &outcome.fallback_reason {
        info!("Incremental run fell back to a full run: {}", reason);
    }

    // Step 4: Reports
    if let Some(path) = &config.report.usage {
        report::write_usage(&outcome.graph, path)?;
        info!("Usage written to {}", path.display());
    }
    if let Some(path) = &config.report.main_dex_list {
        report::write_main_dex_list(&outcome.graph, path)?;
        info!("Main dex list written to {}", path.display());
    }

    let summary = ShrinkSummary::new(&outcome, &logger, start_time.elapsed());
    Reporter::new(format, None).report(&summary)?;

    Ok(())
}
