//! dag-migrate - DAG Migration & Compatibility Validation Engine
//!
//! Rewrites Airflow 1.10 workflow definition files for Airflow 2 and
//! reports what it changed and what still needs attention.
//!
//! # Architecture
//!
//! ```text
//! CLI -> Driver -> SourceLoader -> PythonParser -> TransformEngine -> ValidationEngine -> Report
//!                                                        \__________ PatternCatalog _________/
//! ```
//!
//! Files are independent units of work: the driver runs the pipeline on
//! each one in a fixed-size worker pool and aggregates the per-file results
//! into a single deterministic [`Report`]. The [`PatternCatalog`] is built
//! once, validated, and shared read-only by every worker.
//!
//! # Extending the catalog
//!
//! Extra mappings can be declared in `dag-migrate.yaml`:
//!
//! ```yaml
//! catalog:
//!   imports:
//!     - id: AF150
//!       from: airflow.contrib.operators.my_operator
//!       to: my_company.operators.my_operator
//!   parameters:
//!     - id: AF250
//!       callees: ["MyOperator"]
//!       param: legacy_flag
//!       action: drop
//! ```

pub mod catalog;
pub mod config;
pub mod context;
pub mod deadline;
pub mod diagnostic;
pub mod driver;
pub mod loader;
pub mod output;
pub mod report;
pub mod rule;
pub mod suppress;
pub mod syntax;
pub mod transform;
pub mod validate;

// Re-export main types
pub use catalog::{CatalogBuilder, CatalogError, PatternCatalog, CATALOG_VERSION};
pub use config::{Config, ConfigError, Mode, Overrides};
pub use context::FileContext;
pub use deadline::{Deadline, TimedOut};
pub use diagnostic::{ChangeRecord, Finding, FindingCategory, Location, Position, Severity, Span};
pub use driver::{Driver, DriverError, DriverOptions};
pub use loader::{LoadError, SourceLoader, SourceUnit};
pub use output::{HtmlFormatter, JsonFormatter, OutputFormatter, TextFormatter};
pub use report::{FileReport, Report, Summary};
pub use syntax::{ParseError, PythonParser, SyntaxNode};
pub use transform::{EngineError, TransformEngine, TransformOutput};
pub use validate::ValidationEngine;
