//! Diagnostic types: findings, change records and their locations

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level for findings
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Style or modernization suggestion
    Info,
    /// Works today but is deprecated and scheduled for removal
    #[default]
    Warning,
    /// Fails under the new framework version; blocks promotion
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" | "hint" | "note" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "err" => Ok(Severity::Error),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// What kind of problem a finding describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingCategory {
    /// A construct the new framework deprecates or removed
    Deprecation,
    /// A rewrite rule matched but could not be applied safely
    ManualMigration,
    /// The file could not be read
    Load,
    /// The file could not be parsed
    Parse,
    /// The per-file time budget ran out
    Timeout,
    /// The rewritten file could not be written
    Write,
}

impl FindingCategory {
    /// Whether this category means the file produced no analysis at all
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            FindingCategory::Load | FindingCategory::Parse | FindingCategory::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCategory::Deprecation => "deprecation",
            FindingCategory::ManualMigration => "manual-migration",
            FindingCategory::Load => "load",
            FindingCategory::Parse => "parse",
            FindingCategory::Timeout => "timeout",
            FindingCategory::Write => "write",
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1-based line/column position
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A line/column range; `end` is exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Zero-width span at a single position
    pub fn point(line: usize, column: usize) -> Self {
        let p = Position::new(line, column);
        Self { start: p, end: p }
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Source location: relative file path plus span
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    /// Path relative to the corpus root, `/`-separated
    pub file: String,
    pub span: Span,
}

impl Location {
    pub fn new(file: impl Into<String>, span: Span) -> Self {
        Self {
            file: file.into(),
            span,
        }
    }

    pub fn line(&self) -> usize {
        self.span.start.line
    }

    pub fn column(&self) -> usize {
        self.span.start.column
    }
}

/// One diagnostic instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Rule that produced this finding
    pub rule_id: String,
    pub severity: Severity,
    pub category: FindingCategory,
    pub location: Location,
    /// Human-readable message
    pub message: String,
    /// Suggested fix text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Finding {
    pub fn new(
        rule_id: &str,
        severity: Severity,
        category: FindingCategory,
        message: &str,
        location: Location,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity,
            category,
            location,
            message: message.to_string(),
            suggestion: None,
        }
    }

    /// Add a suggested fix
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Report ordering: location, then severity descending, then rule id
    pub fn report_order(a: &Finding, b: &Finding) -> std::cmp::Ordering {
        a.location
            .span
            .start
            .cmp(&b.location.span.start)
            .then_with(|| b.severity.cmp(&a.severity))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
            .then_with(|| a.location.span.end.cmp(&b.location.span.end))
            .then_with(|| a.message.cmp(&b.message))
    }
}

/// Rule ids for findings produced by the engine itself
pub mod codes {
    /// File could not be read
    pub const LOAD_ERROR: &str = "AF901";
    /// File could not be parsed
    pub const PARSE_ERROR: &str = "AF902";
    /// Per-file time budget exhausted
    pub const TIMEOUT: &str = "AF903";
    /// Rewritten file could not be written
    pub const WRITE_ERROR: &str = "AF904";

    /// Ids in the engine range cannot be used by catalog rules
    pub fn is_reserved(id: &str) -> bool {
        id.starts_with("AF9")
    }
}

/// One applied rewrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub rule_id: String,
    /// Where the rewritten source sat in the input file
    pub location: Location,
    pub description: String,
    pub before: String,
    pub after: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("error".parse::<Severity>(), Ok(Severity::Error));
        assert_eq!("WARNING".parse::<Severity>(), Ok(Severity::Warning));
        assert_eq!("Info".parse::<Severity>(), Ok(Severity::Info));
        assert_eq!("warn".parse::<Severity>(), Ok(Severity::Warning));
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(format!("{}", Severity::Error), "error");
        assert_eq!(format!("{}", Severity::Warning), "warning");
        assert_eq!(format!("{}", Severity::Info), "info");
    }

    #[test]
    fn test_failure_categories() {
        assert!(FindingCategory::Parse.is_failure());
        assert!(FindingCategory::Load.is_failure());
        assert!(FindingCategory::Timeout.is_failure());
        assert!(!FindingCategory::Deprecation.is_failure());
        assert!(!FindingCategory::ManualMigration.is_failure());
        assert!(!FindingCategory::Write.is_failure());
    }

    #[test]
    fn test_report_order_puts_errors_first_on_same_position() {
        let loc = Location::new("a.py", Span::point(3, 1));
        let info = Finding::new("AF100", Severity::Info, FindingCategory::Deprecation, "i", loc.clone());
        let error = Finding::new("AF400", Severity::Error, FindingCategory::Deprecation, "e", loc);
        let earlier = Finding::new(
            "AF900",
            Severity::Info,
            FindingCategory::Deprecation,
            "x",
            Location::new("a.py", Span::point(1, 1)),
        );

        let mut findings = vec![info, error, earlier];
        findings.sort_by(Finding::report_order);
        let ids: Vec<_> = findings.iter().map(|f| f.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["AF900", "AF400", "AF100"]);
    }

    #[test]
    fn test_span_contains() {
        let outer = Span::new(Position::new(1, 1), Position::new(5, 1));
        let inner = Span::new(Position::new(2, 4), Position::new(3, 9));
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
    }
}
