//! Driver: runs the pipeline over a corpus
//!
//! Every file is processed independently: load, parse, then either validate
//! or transform and re-validate. Per-file failures, including failed
//! write-back, become findings; only internal invariant violations abort
//! the run.

use crate::catalog::PatternCatalog;
use crate::config::{Config, ConfigError, Mode, PerFileIgnores};
use crate::context::FileContext;
use crate::deadline::{Deadline, TimedOut};
use crate::diagnostic::{codes, Finding, FindingCategory, Location, Severity, Span};
use crate::loader::{LoadError, SourceLoader, SourcePath, SourceUnit, UnitError};
use crate::report::{FileReport, Report, RunInfo};
use crate::syntax::{ParseError, PythonParser, SyntaxNode};
use crate::transform::{EngineError, TransformEngine};
use crate::validate::ValidationEngine;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Worker thread stack size; tree walks recurse once per nesting level
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal error in {file}: {message}")]
    Invariant { file: String, message: String },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl DriverError {
    fn invariant(file: &str, message: impl Into<String>) -> Self {
        DriverError::Invariant {
            file: file.to_string(),
            message: message.into(),
        }
    }
}

impl From<EngineError> for DriverError {
    fn from(e: EngineError) -> Self {
        let file = match &e {
            EngineError::NonTerminating { file, .. } | EngineError::NoFixpoint { file, .. } => {
                file.clone()
            }
            EngineError::TimedOut(_) => String::new(),
        };
        DriverError::Invariant {
            file,
            message: e.to_string(),
        }
    }
}

/// How a run processes files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptions {
    pub mode: Mode,
    pub parallel: bool,
    /// Worker count (0 = one per CPU)
    pub jobs: usize,
    /// Per-file time budget
    pub timeout: Option<Duration>,
    /// Re-transform the output and require no further changes
    pub verify: bool,
    /// Write rewritten files here instead of in place
    pub output_tree: Option<PathBuf>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            mode: Mode::ValidateOnly,
            parallel: true,
            jobs: 0,
            timeout: Some(Duration::from_secs(10)),
            verify: true,
            output_tree: None,
        }
    }
}

impl DriverOptions {
    pub fn from_config(config: &Config, mode: Mode) -> Self {
        Self {
            mode,
            parallel: config.engine.parallel,
            jobs: config.engine.jobs,
            timeout: config.engine.timeout(),
            verify: config.engine.verify,
            output_tree: None,
        }
    }

    pub fn with_output_tree(mut self, dir: Option<PathBuf>) -> Self {
        self.output_tree = dir;
        self
    }

    fn workers(&self) -> usize {
        if self.jobs > 0 {
            self.jobs
        } else {
            num_cpus::get()
        }
    }
}

/// Runs the pipeline with one catalog and one set of options
pub struct Driver<'c> {
    catalog: &'c PatternCatalog,
    options: DriverOptions,
    ignores: PerFileIgnores,
    parser: PythonParser,
}

impl<'c> Driver<'c> {
    pub fn new(catalog: &'c PatternCatalog, options: DriverOptions) -> Self {
        Self {
            catalog,
            options,
            ignores: PerFileIgnores::default(),
            parser: PythonParser::new(),
        }
    }

    /// Per-file rule ignores from configuration
    pub fn with_ignores(mut self, ignores: PerFileIgnores) -> Self {
        self.ignores = ignores;
        self
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Process every file the loader discovers
    pub fn run(&self, loader: &SourceLoader) -> Result<Report, DriverError> {
        let sources = loader.discover()?;
        info!(
            "{} {} files under {} with {} workers",
            self.options.mode,
            sources.len(),
            loader.root().display(),
            if self.options.parallel {
                self.options.workers()
            } else {
                1
            }
        );

        let files: Vec<FileReport> = if self.options.parallel {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.workers())
                .stack_size(WORKER_STACK_SIZE)
                .build()?;
            pool.install(|| {
                sources
                    .par_iter()
                    .map(|source| self.process_source(loader.root(), source))
                    .collect::<Result<_, _>>()
            })?
        } else {
            sources
                .iter()
                .map(|source| self.process_source(loader.root(), source))
                .collect::<Result<_, _>>()?
        };

        let report = Report::from_files(self.run_info(), files);
        let summary = report.summary();
        info!(
            "{} files, {} changed, {} findings ({} errors)",
            summary.files, summary.files_changed, summary.findings.total, summary.findings.error
        );
        Ok(report)
    }

    fn run_info(&self) -> RunInfo {
        RunInfo {
            catalog: self.catalog.version().to_string(),
            mode: self.options.mode,
            level: Severity::Info,
        }
    }

    fn process_source(&self, root: &Path, source: &SourcePath) -> Result<FileReport, DriverError> {
        let unit = SourceUnit::load(source);
        let mut processed = self.process(unit)?;
        if let Some(text) = &processed.write {
            if let Err(e) = self.write_back(root, &processed.path, text) {
                warn!("{}: {}", processed.report.path, e);
                let report = &mut processed.report;
                report.findings.push(write_failure(&report.path, &e));
                report.findings.sort_by(Finding::report_order);
            }
        }
        Ok(processed.report)
    }

    /// Run the pipeline on one unit
    pub fn process(&self, unit: SourceUnit) -> Result<Processed, DriverError> {
        let deadline = self.options.timeout.map_or(Deadline::none(), Deadline::after);
        let ignored = self.ignores.for_file(&unit.relative);
        let unit = unit.parse(&self.parser, &deadline);
        let relative = unit.relative.clone();
        let ctx = FileContext::new(&relative)
            .with_deadline(deadline)
            .with_ignored(&ignored);

        let mut processed = Processed {
            path: unit.path.clone(),
            report: FileReport::new(&relative),
            write: None,
        };

        let tree = match (&unit.error, &unit.tree) {
            (Some(error), _) => {
                debug!("{}: {}", relative, error);
                processed.report = FileReport::failed(&relative, unit_failure(&relative, error));
                if self.options.output_tree.is_some() && matches!(error, UnitError::Parse(_)) {
                    processed.write = Some(unit.text);
                }
                return Ok(processed);
            }
            (None, Some(tree)) => Arc::clone(tree),
            (None, None) => return Err(DriverError::invariant(&relative, "unit has no tree")),
        };

        let outcome = match self.options.mode {
            Mode::ValidateOnly => self.validate_only(&tree, &ctx),
            Mode::Transform => self.transform(&tree, &ctx),
        };
        match outcome {
            Ok((report, text)) => {
                processed.report = report;
                processed.write = match text {
                    Some(text) => Some(text),
                    None if self.options.mode == Mode::Transform
                        && self.options.output_tree.is_some() =>
                    {
                        Some(unit.text)
                    }
                    None => None,
                };
            }
            Err(Failure::TimedOut) => {
                processed.report = FileReport::failed(&relative, timeout_finding(&relative));
            }
            Err(Failure::Fatal(e)) => return Err(e),
        }
        Ok(processed)
    }

    fn validate_only(
        &self,
        tree: &Arc<SyntaxNode>,
        ctx: &FileContext<'_>,
    ) -> Result<(FileReport, Option<String>), Failure> {
        let findings = ValidationEngine::new(self.catalog).validate(tree, Severity::Info, ctx)?;
        let mut report = FileReport::new(ctx.file);
        report.findings = findings;
        Ok((report, None))
    }

    fn transform(
        &self,
        tree: &Arc<SyntaxNode>,
        ctx: &FileContext<'_>,
    ) -> Result<(FileReport, Option<String>), Failure> {
        let engine = TransformEngine::new(self.catalog);
        let output = engine.transform(tree, ctx)?;

        let (validated_tree, text) = if output.is_unchanged() {
            (Arc::clone(&output.tree), None)
        } else {
            let text = output.tree.render();
            let reparsed = match self.parser.parse(&text, &ctx.deadline) {
                Ok(tree) => tree,
                Err(ParseError::TimedOut) => return Err(Failure::TimedOut),
                Err(e) => {
                    return Err(Failure::Fatal(DriverError::invariant(
                        ctx.file,
                        format!("rewritten source no longer parses: {}", e),
                    )))
                }
            };
            if self.options.verify {
                let again = engine.transform(&reparsed, ctx)?;
                if let Some(change) = again.changes.first() {
                    return Err(Failure::Fatal(DriverError::invariant(
                        ctx.file,
                        format!(
                            "rewriting is not idempotent: {} applies again at line {}",
                            change.rule_id,
                            change.location.line()
                        ),
                    )));
                }
            }
            (reparsed, Some(text))
        };

        let mut findings =
            ValidationEngine::new(self.catalog).validate(&validated_tree, Severity::Info, ctx)?;
        for manual in output.manual {
            let seen = findings.iter().any(|f| {
                f.rule_id == manual.rule_id
                    && f.location == manual.location
                    && f.message == manual.message
            });
            if !seen {
                findings.push(manual);
            }
        }
        findings.sort_by(Finding::report_order);

        debug!(
            "{}: {} changes, {} findings",
            ctx.file,
            output.changes.len(),
            findings.len()
        );
        let mut report = FileReport::new(ctx.file);
        report.findings = findings;
        report.changes = output.changes;
        Ok((report, text))
    }

    fn write_back(&self, root: &Path, path: &Path, text: &str) -> Result<(), DriverError> {
        let destination = match &self.options.output_tree {
            Some(dir) => dir.join(path.strip_prefix(root).unwrap_or(path)),
            None => path.to_path_buf(),
        };
        let write_error = |source| DriverError::Write {
            path: destination.clone(),
            source,
        };

        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(write_error)?;
        let mut file = tempfile::NamedTempFile::new_in(&parent).map_err(write_error)?;
        file.write_all(text.as_bytes()).map_err(write_error)?;
        file.persist(&destination)
            .map_err(|e| write_error(e.error))?;
        debug!("wrote {}", destination.display());
        Ok(())
    }
}

/// Result of processing one unit
#[derive(Debug)]
pub struct Processed {
    /// Absolute path of the source file
    pub path: PathBuf,
    pub report: FileReport,
    /// Text to write back, when the run writes files
    pub write: Option<String>,
}

enum Failure {
    TimedOut,
    Fatal(DriverError),
}

impl From<TimedOut> for Failure {
    fn from(_: TimedOut) -> Self {
        Failure::TimedOut
    }
}

impl From<EngineError> for Failure {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::TimedOut(_) => Failure::TimedOut,
            fatal => Failure::Fatal(fatal.into()),
        }
    }
}

fn timeout_finding(file: &str) -> Finding {
    Finding::new(
        codes::TIMEOUT,
        Severity::Error,
        FindingCategory::Timeout,
        "per-file time budget exhausted; file was not analyzed",
        Location::new(file, Span::point(1, 1)),
    )
}

fn write_failure(file: &str, error: &DriverError) -> Finding {
    Finding::new(
        codes::WRITE_ERROR,
        Severity::Error,
        FindingCategory::Write,
        &format!("rewritten file could not be written: {}", error),
        Location::new(file, Span::point(1, 1)),
    )
}

fn unit_failure(file: &str, error: &UnitError) -> Finding {
    match error {
        UnitError::Load(e) => Finding::new(
            codes::LOAD_ERROR,
            Severity::Error,
            FindingCategory::Load,
            &format!("file could not be read: {}", e),
            Location::new(file, Span::point(1, 1)),
        ),
        UnitError::Parse(ParseError::TimedOut) => timeout_finding(file),
        UnitError::Parse(e) => {
            let (line, column) = e.position().unwrap_or((1, 1));
            Finding::new(
                codes::PARSE_ERROR,
                Severity::Error,
                FindingCategory::Parse,
                &format!("file could not be parsed: {}", e),
                Location::new(file, Span::point(line, column)),
            )
        }
    }
}
