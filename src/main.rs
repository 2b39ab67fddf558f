//! dag-migrate CLI - Airflow 1.10 to 2 migration and validation
//!
//! Validates a corpus of workflow files, or rewrites them and validates the
//! result, and renders a report.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use dag_migrate::catalog::RuleInfo;
use dag_migrate::config::{ColorMode, Config, Mode, OutputFormat, Overrides};
use dag_migrate::output::{self, TextFormatter};
use dag_migrate::{Driver, DriverOptions, PatternCatalog, Severity, SourceLoader};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "dag-migrate",
    version,
    about = "Airflow DAG migration and compatibility validator",
    long_about = "Rewrites Airflow 1.10 DAG files for Airflow 2 and reports what changed and what still needs manual work."
)]
struct Cli {
    /// Corpus root directory
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Minimum severity to report (INFO, WARNING, ERROR)
    #[arg(long)]
    level: Option<Severity>,

    /// What to do with the corpus
    #[arg(short, long, value_enum, default_value = "validate-only")]
    mode: ModeArg,

    /// In transform mode, write files into this directory instead of in place
    #[arg(long)]
    output_tree: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of parallel jobs (0 = one per CPU)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Per-file time budget in milliseconds (0 = unlimited)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Only process files matching these globs
    #[arg(long, value_delimiter = ',')]
    include: Vec<String>,

    /// Skip files matching these globs
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Disable specific rules (comma-separated)
    #[arg(long, value_delimiter = ',')]
    disable: Vec<String>,

    /// Only enable specific rules (comma-separated)
    #[arg(long, value_delimiter = ',')]
    select: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Skip the second transformation pass over rewritten files
    #[arg(long)]
    no_verify: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the rules of the active catalog
    Rules,
    /// Show detailed information about a rule
    Explain {
        /// Rule ID to explain
        rule_id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Html,
    Text,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => OutputFormat::Json,
            Format::Html => OutputFormat::Html,
            Format::Text => OutputFormat::Text,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    ValidateOnly,
    Transform,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::ValidateOnly => Mode::ValidateOnly,
            ModeArg::Transform => Mode::Transform,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            std::process::exit(2);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<i32> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("cannot load configuration {}", path.display()))?,
        None => Config::load_default(&cli.root).context("cannot load configuration")?,
    };
    config.merge_cli(Overrides {
        format: cli.format.map(OutputFormat::from),
        level: cli.level,
        color: cli.no_color.then_some(ColorMode::Never),
        jobs: cli.jobs,
        timeout_ms: cli.timeout_ms,
        verify: cli.no_verify.then_some(false),
        include: cli.include.clone(),
        exclude: cli.exclude.clone(),
        disabled: cli.disable.clone(),
        enabled: cli.select.clone(),
    });

    let colored = match config.output.color {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => std::io::stdout().is_terminal(),
    };
    colored::control::set_override(colored);

    let catalog = config
        .catalog_builder()
        .build()
        .context("invalid pattern catalog")?;

    match &cli.command {
        Some(Commands::Rules) => {
            print_rules(&catalog);
            return Ok(0);
        }
        Some(Commands::Explain { rule_id }) => {
            let Some(info) = catalog.rule(rule_id) else {
                bail!("rule `{}` not found; run `dag-migrate rules` to list rules", rule_id);
            };
            explain_rule(&info);
            return Ok(0);
        }
        None => {}
    }

    let mode = Mode::from(cli.mode);
    if cli.output_tree.is_some() && mode != Mode::Transform {
        bail!("--output-tree requires --mode transform");
    }

    let loader = SourceLoader::with_patterns(cli.root.clone(), &config.files.include, &config.files.exclude)
        .context("invalid file patterns")?;
    let options = DriverOptions::from_config(&config, mode).with_output_tree(cli.output_tree.clone());
    let ignores = config
        .per_file_ignores()
        .context("invalid per-file rule ignores")?;
    let driver = Driver::new(&catalog, options).with_ignores(ignores);

    let report = driver
        .run(&loader)
        .with_context(|| format!("cannot process {}", cli.root.display()))?;

    let rendered = output::formatter(config.output.format, colored && cli.output.is_none())
        .format(&report.at_level(config.output.level));
    match &cli.output {
        Some(path) => {
            write_report(path, &rendered)?;
            let summary = TextFormatter {
                colored: std::io::stderr().is_terminal() && colored,
                ..Default::default()
            }
            .format_summary(&report);
            eprint!("{}", summary);
            eprintln!("report written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(rendered.as_bytes())
                .context("cannot write report")?;
            if !rendered.ends_with('\n') {
                writeln!(stdout).context("cannot write report")?;
            }
        }
    }

    Ok(report.exit_code())
}

fn write_report(path: &Path, rendered: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    std::fs::write(path, rendered).with_context(|| format!("cannot write report {}", path.display()))
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Error => "error".red(),
        Severity::Warning => "warning".yellow(),
        Severity::Info => "info".blue(),
    }
}

fn print_rules(catalog: &PatternCatalog) {
    println!("{} ({} rules)", catalog.version().bold(), catalog.len());
    for info in catalog.rules() {
        let mut kinds = Vec::new();
        if info.reports {
            kinds.push("reports");
        }
        if info.rewrites {
            kinds.push("rewrites");
        }
        println!(
            "    {} [{}] {} ({})",
            info.meta.id.cyan(),
            severity_label(info.meta.severity),
            info.meta.name,
            kinds.join(", ")
        );
    }
}

fn explain_rule(info: &RuleInfo<'_>) {
    let meta = info.meta;
    println!("{}", "Rule Details".bold());
    println!();
    println!("  {}: {}", "ID".bold(), meta.id.cyan());
    println!("  {}: {}", "Name".bold(), meta.name);
    println!("  {}: {}", "Severity".bold(), severity_label(meta.severity));
    println!("  {}: {}", "Revision".bold(), meta.revision);
    if let Some(since) = &meta.since {
        println!("  {}: {}", "Deprecated since".bold(), since);
    }
    println!(
        "  {}: {}",
        "Auto-fix Available".bold(),
        if info.rewrites { "yes" } else { "no" }
    );
    println!();
    println!("  {}", "Description".bold());
    println!("  {}", meta.summary);
}
