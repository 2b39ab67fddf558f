//! Human-readable text output formatter

use super::OutputFormatter;
use crate::diagnostic::{ChangeRecord, Finding, Severity};
use crate::report::{FileReport, Report};
use colored::*;

/// Text formatter with optional color support
pub struct TextFormatter {
    /// Enable colored output
    pub colored: bool,

    /// Show suggestions
    pub show_suggestions: bool,

    /// List applied changes
    pub show_changes: bool,

    /// Show statistics
    pub show_stats: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            colored: true,
            show_suggestions: true,
            show_changes: true,
            show_stats: true,
        }
    }
}

impl TextFormatter {
    /// Create a new text formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors
    pub fn without_color(mut self) -> Self {
        self.colored = false;
        self
    }

    fn paint(&self, text: &str, style: fn(&str) -> ColoredString) -> String {
        if self.colored {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn severity_str(&self, severity: Severity) -> ColoredString {
        let s = severity.as_str();
        if !self.colored {
            return s.normal();
        }
        match severity {
            Severity::Error => s.red().bold(),
            Severity::Warning => s.yellow().bold(),
            Severity::Info => s.blue(),
        }
    }

    fn format_change(&self, change: &ChangeRecord) -> String {
        format!(
            "{}:{}:{}: {}[{}]: {}\n",
            change.location.file,
            change.location.line(),
            change.location.column(),
            self.paint("changed", |s| s.green().bold()),
            self.paint(&change.rule_id, |s| s.cyan()),
            change.description
        )
    }

    fn format_file(&self, file: &FileReport, output: &mut String) {
        if file.findings.is_empty() && (file.changes.is_empty() || !self.show_changes) {
            return;
        }
        output.push_str(&self.paint(&file.path, |s| s.underline()));
        output.push('\n');

        // errors first, then warnings, then infos; report order within each
        for severity in [Severity::Error, Severity::Warning, Severity::Info] {
            for finding in file.findings.iter().filter(|f| f.severity == severity) {
                output.push_str(&self.format_finding(finding));
            }
        }
        if self.show_changes {
            for change in &file.changes {
                output.push_str(&self.format_change(change));
            }
        }
        output.push('\n');
    }

    /// Counts line plus change and parse-failure lines
    pub fn format_summary(&self, report: &Report) -> String {
        let summary = report.summary();
        let mut output = String::new();
        output.push_str(&format!(
            "{} {} scanned",
            summary.files,
            if summary.files == 1 { "file" } else { "files" }
        ));

        let mut counts = Vec::new();
        if summary.findings.error > 0 {
            counts.push(self.counted(summary.findings.error, "error", "errors", |s| s.red()));
        }
        if summary.findings.warning > 0 {
            counts.push(self.counted(summary.findings.warning, "warning", "warnings", |s| {
                s.yellow()
            }));
        }
        if summary.findings.info > 0 {
            counts.push(self.counted(summary.findings.info, "info", "infos", |s| s.blue()));
        }
        if !counts.is_empty() {
            output.push_str(&format!(": {}", counts.join(", ")));
        }
        output.push('\n');

        if summary.changes > 0 {
            output.push_str(&format!(
                "{} in {} {}\n",
                self.counted(summary.changes, "change", "changes", |s| s.green()),
                summary.files_changed,
                if summary.files_changed == 1 { "file" } else { "files" }
            ));
        }
        if summary.parse_failures > 0 {
            output.push_str(&format!(
                "{} could not be parsed\n",
                self.counted(summary.parse_failures, "file", "files", |s| s.red())
            ));
        }
        output
    }

    fn counted(&self, count: usize, singular: &str, plural: &str, style: fn(&str) -> ColoredString) -> String {
        let s = format!("{} {}", count, if count == 1 { singular } else { plural });
        self.paint(&s, style)
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, report: &Report) -> String {
        let mut output = String::new();

        for file in report.files() {
            self.format_file(file, &mut output);
        }

        if self.show_stats {
            output.push_str(&self.format_summary(report));
        }

        output
    }

    fn format_finding(&self, finding: &Finding) -> String {
        let mut output = format!(
            "{}:{}:{}: {}[{}]: {}\n",
            finding.location.file,
            finding.location.line(),
            finding.location.column(),
            self.severity_str(finding.severity),
            self.paint(&finding.rule_id, |s| s.cyan()),
            finding.message
        );

        if self.show_suggestions {
            if let Some(suggestion) = &finding.suggestion {
                output.push_str(&format!(
                    "   {} suggestion: {}\n",
                    self.paint("=", |s| s.green()),
                    self.paint(suggestion, |s| s.green())
                ));
            }
        }

        output
    }
}
