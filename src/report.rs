//! Run report: per-file findings and changes plus derived counters

use crate::config::Mode;
use crate::diagnostic::{ChangeRecord, Finding, FindingCategory, Severity};
use serde::Serialize;

/// Name reported in rendered documents
pub const TOOL_NAME: &str = "dag-migrate";

/// Tool version reported in rendered documents
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Settings a report was produced with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunInfo {
    /// Catalog version
    pub catalog: String,
    pub mode: Mode,
    /// Threshold the report is rendered at
    pub level: Severity,
}

/// Results for one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// Path relative to the corpus root
    pub path: String,
    /// Findings in report order
    pub findings: Vec<Finding>,
    /// Applied rewrites in source order
    pub changes: Vec<ChangeRecord>,
}

impl FileReport {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Report for a file that produced a single failure finding
    pub fn failed(path: impl Into<String>, finding: Finding) -> Self {
        Self {
            path: path.into(),
            findings: vec![finding],
            changes: Vec::new(),
        }
    }

    pub fn is_changed(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(Finding::is_error)
    }

    /// The file could not be parsed
    pub fn is_parse_failure(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.category == FindingCategory::Parse)
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}

/// Finding counts by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub info: usize,
    pub warning: usize,
    pub error: usize,
    pub total: usize,
}

impl SeverityCounts {
    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Info => self.info += 1,
            Severity::Warning => self.warning += 1,
            Severity::Error => self.error += 1,
        }
        self.total += 1;
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Info => self.info,
            Severity::Warning => self.warning,
            Severity::Error => self.error,
        }
    }
}

/// Counters derived from a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Files scanned
    pub files: usize,
    /// Files with at least one applied rewrite
    pub files_changed: usize,
    /// Files that could not be parsed
    pub parse_failures: usize,
    /// Applied rewrites
    pub changes: usize,
    pub findings: SeverityCounts,
}

/// Aggregate over a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub meta: RunInfo,
    files: Vec<FileReport>,
}

impl Report {
    /// Build a report; entries are ordered by path
    pub fn from_files(meta: RunInfo, mut files: Vec<FileReport>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self { meta, files }
    }

    pub fn files(&self) -> &[FileReport] {
        &self.files
    }

    pub fn file(&self, path: &str) -> Option<&FileReport> {
        self.files.iter().find(|f| f.path == path)
    }

    /// All findings in file order, then report order
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.files.iter().flat_map(|f| f.findings.iter())
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            files: self.files.len(),
            ..Default::default()
        };
        for file in &self.files {
            if file.is_changed() {
                summary.files_changed += 1;
            }
            if file.is_parse_failure() {
                summary.parse_failures += 1;
            }
            summary.changes += file.changes.len();
            for finding in &file.findings {
                summary.findings.add(finding.severity);
            }
        }
        summary
    }

    /// Copy with findings below `level` removed
    pub fn at_level(&self, level: Severity) -> Report {
        Report {
            meta: RunInfo {
                level,
                ..self.meta.clone()
            },
            files: self
                .files
                .iter()
                .map(|file| FileReport {
                    path: file.path.clone(),
                    findings: file
                        .findings
                        .iter()
                        .filter(|f| f.severity >= level)
                        .cloned()
                        .collect(),
                    changes: file.changes.clone(),
                })
                .collect(),
        }
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.files.iter().any(FileReport::has_errors)
    }

    /// 0 = no ERROR finding anywhere, 1 = at least one
    pub fn exit_code(&self) -> i32 {
        if self.has_errors() {
            1
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{codes, Location, Span};

    fn finding(id: &str, severity: Severity, category: FindingCategory) -> Finding {
        Finding::new(id, severity, category, "m", Location::new("f.py", Span::point(1, 1)))
    }

    fn meta() -> RunInfo {
        RunInfo {
            catalog: "test".to_string(),
            mode: Mode::ValidateOnly,
            level: Severity::Info,
        }
    }

    fn change(path: &str) -> ChangeRecord {
        ChangeRecord {
            rule_id: "AF201".to_string(),
            location: Location::new(path, Span::point(1, 1)),
            description: "d".to_string(),
            before: "a".to_string(),
            after: "b".to_string(),
        }
    }

    #[test]
    fn test_files_sorted_by_path() {
        let report = Report::from_files(
            meta(),
            vec![FileReport::new("z.py"), FileReport::new("a/b.py"), FileReport::new("a.py")],
        );
        let paths: Vec<&str> = report.files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "a/b.py", "z.py"]);
    }

    #[test]
    fn test_summary_is_derived() {
        let mut changed = FileReport::new("a.py");
        changed.changes = vec![change("a.py"), change("a.py")];
        changed.findings = vec![finding("AF404", Severity::Info, FindingCategory::Deprecation)];
        let broken = FileReport::failed(
            "b.py",
            finding(codes::PARSE_ERROR, Severity::Error, FindingCategory::Parse),
        );
        let report = Report::from_files(meta(), vec![changed, broken, FileReport::new("c.py")]);

        let summary = report.summary();
        assert_eq!(summary.files, 3);
        assert_eq!(summary.files_changed, 1);
        assert_eq!(summary.parse_failures, 1);
        assert_eq!(summary.changes, 2);
        assert_eq!(summary.findings.info, 1);
        assert_eq!(summary.findings.error, 1);
        assert_eq!(summary.findings.total, 2);
        assert!(report.has_errors());
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_at_level_filters_but_keeps_changes() {
        let mut file = FileReport::new("a.py");
        file.changes = vec![change("a.py")];
        file.findings = vec![
            finding("AF101", Severity::Warning, FindingCategory::Deprecation),
            finding("AF404", Severity::Info, FindingCategory::Deprecation),
        ];
        let report = Report::from_files(meta(), vec![file]);

        let filtered = report.at_level(Severity::Warning);
        assert_eq!(filtered.meta.level, Severity::Warning);
        assert_eq!(filtered.summary().findings.total, 1);
        assert_eq!(filtered.summary().changes, 1);
        assert_eq!(report.summary().findings.total, 2);
        assert_eq!(filtered.exit_code(), 0);
    }

    #[test]
    fn test_clean_run_exits_zero() {
        let report = Report::from_files(meta(), vec![FileReport::new("a.py")]);
        assert!(!report.has_errors());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.file("a.py").unwrap().max_severity(), None);
    }
}
