//! JSON output formatter

use super::OutputFormatter;
use crate::diagnostic::{ChangeRecord, Finding, Position};
use crate::report::{Report, Summary, TOOL_NAME, TOOL_VERSION};
use serde::Serialize;
use std::collections::BTreeMap;

/// JSON formatter for machine-readable output
#[derive(Default)]
pub struct JsonFormatter {
    /// Pretty print with indentation
    pub pretty: bool,
}

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretty printing
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        if self.pretty {
            serde_json::to_string_pretty(value).unwrap_or_default()
        } else {
            serde_json::to_string(value).unwrap_or_default()
        }
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    tool: JsonTool<'a>,
    summary: Summary,
    files: BTreeMap<&'a str, JsonFile<'a>>,
}

#[derive(Serialize)]
struct JsonTool<'a> {
    name: &'static str,
    version: &'static str,
    catalog: &'a str,
    mode: &'static str,
    level: &'static str,
}

#[derive(Serialize)]
struct JsonFile<'a> {
    findings: Vec<JsonFinding<'a>>,
    changes: Vec<JsonChange<'a>>,
}

#[derive(Serialize)]
struct JsonFinding<'a> {
    rule_id: &'a str,
    severity: &'static str,
    category: &'static str,
    file: &'a str,
    start: Position,
    end: Position,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
}

impl<'a> From<&'a Finding> for JsonFinding<'a> {
    fn from(f: &'a Finding) -> Self {
        Self {
            rule_id: &f.rule_id,
            severity: f.severity.as_str(),
            category: f.category.as_str(),
            file: &f.location.file,
            start: f.location.span.start,
            end: f.location.span.end,
            message: &f.message,
            suggestion: f.suggestion.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct JsonChange<'a> {
    rule_id: &'a str,
    file: &'a str,
    start: Position,
    end: Position,
    description: &'a str,
    before: &'a str,
    after: &'a str,
}

impl<'a> From<&'a ChangeRecord> for JsonChange<'a> {
    fn from(c: &'a ChangeRecord) -> Self {
        Self {
            rule_id: &c.rule_id,
            file: &c.location.file,
            start: c.location.span.start,
            end: c.location.span.end,
            description: &c.description,
            before: &c.before,
            after: &c.after,
        }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, report: &Report) -> String {
        let output = JsonOutput {
            tool: JsonTool {
                name: TOOL_NAME,
                version: TOOL_VERSION,
                catalog: &report.meta.catalog,
                mode: report.meta.mode.as_str(),
                level: report.meta.level.as_str(),
            },
            summary: report.summary(),
            files: report
                .files()
                .iter()
                .map(|file| {
                    (
                        file.path.as_str(),
                        JsonFile {
                            findings: file.findings.iter().map(JsonFinding::from).collect(),
                            changes: file.changes.iter().map(JsonChange::from).collect(),
                        },
                    )
                })
                .collect(),
        };
        self.render(&output)
    }

    fn format_finding(&self, finding: &Finding) -> String {
        self.render(&JsonFinding::from(finding))
    }
}
