//! HTML output formatter for standalone reports
//!
//! Generates a self-contained page: summary counts at the top, then one
//! section per file with findings grouped by severity and the applied
//! changes as before/after blocks.

use super::OutputFormatter;
use crate::diagnostic::{ChangeRecord, Finding, Severity};
use crate::report::{FileReport, Report, TOOL_NAME, TOOL_VERSION};

/// HTML formatter
pub struct HtmlFormatter {
    /// Report title
    title: String,
}

impl HtmlFormatter {
    pub fn new() -> Self {
        Self {
            title: "DAG Migration Report".to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

impl Default for HtmlFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for HtmlFormatter {
    fn format(&self, report: &Report) -> String {
        let summary = report.summary();
        let files: String = report
            .files()
            .iter()
            .filter(|f| !f.findings.is_empty() || !f.changes.is_empty())
            .map(format_file)
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{css}</style>
</head>
<body>
    <header>
        <h1>{title}</h1>
        <p class="meta">catalog {catalog} &middot; mode {mode} &middot; level {level}</p>
    </header>

    <section class="summary">
        <h2>Summary</h2>
        <div class="stats-grid">
            <div class="stat-card"><span class="stat-value">{files}</span><span class="stat-label">Files Scanned</span></div>
            <div class="stat-card"><span class="stat-value">{files_changed}</span><span class="stat-label">Files Changed</span></div>
            <div class="stat-card"><span class="stat-value">{changes}</span><span class="stat-label">Changes</span></div>
            <div class="stat-card"><span class="stat-value">{parse_failures}</span><span class="stat-label">Parse Failures</span></div>
        </div>
        <div class="severity-legend">
            <span class="legend-item"><span class="dot error"></span> Error: {errors}</span>
            <span class="legend-item"><span class="dot warning"></span> Warning: {warnings}</span>
            <span class="legend-item"><span class="dot info"></span> Info: {infos}</span>
            <span class="legend-item">Total: {total}</span>
        </div>
    </section>

{files_html}

    <footer>
        <p>Generated by {tool} v{version}</p>
    </footer>
</body>
</html>
"#,
            title = html_escape(&self.title),
            css = CSS,
            catalog = html_escape(&report.meta.catalog),
            mode = report.meta.mode.as_str(),
            level = report.meta.level.as_str(),
            files = summary.files,
            files_changed = summary.files_changed,
            changes = summary.changes,
            parse_failures = summary.parse_failures,
            errors = summary.findings.error,
            warnings = summary.findings.warning,
            infos = summary.findings.info,
            total = summary.findings.total,
            files_html = files,
            tool = TOOL_NAME,
            version = TOOL_VERSION,
        )
    }

    fn format_finding(&self, finding: &Finding) -> String {
        format_row(finding)
    }
}

fn format_file(file: &FileReport) -> String {
    let mut body = String::new();
    for severity in [Severity::Error, Severity::Warning, Severity::Info] {
        let rows: Vec<String> = file
            .findings
            .iter()
            .filter(|f| f.severity == severity)
            .map(format_row)
            .collect();
        if rows.is_empty() {
            continue;
        }
        body.push_str(&format!(
            r#"        <h3 class="{sev}">{sev} ({count})</h3>
        <table>
            <thead><tr><th>Rule</th><th>Line</th><th>Category</th><th>Message</th></tr></thead>
            <tbody>
{rows}
            </tbody>
        </table>
"#,
            sev = severity.as_str(),
            count = rows.len(),
            rows = rows.join("\n"),
        ));
    }

    if !file.changes.is_empty() {
        body.push_str(&format!(
            "        <h3>changes ({})</h3>\n",
            file.changes.len()
        ));
        for change in &file.changes {
            body.push_str(&format_change(change));
        }
    }

    format!(
        r#"    <section class="file">
        <h2 class="path">{path}</h2>
{body}    </section>"#,
        path = html_escape(&file.path),
        body = body,
    )
}

fn format_row(finding: &Finding) -> String {
    let suggestion = finding
        .suggestion
        .as_ref()
        .map(|s| format!(r#"<div class="suggestion">{}</div>"#, html_escape(s)))
        .unwrap_or_default();

    format!(
        r#"<tr class="severity-{sev}">
    <td><span class="badge {sev}">{rule}</span></td>
    <td class="line">{line}:{column}</td>
    <td>{category}</td>
    <td class="message">{message}{suggestion}</td>
</tr>"#,
        sev = finding.severity.as_str(),
        rule = html_escape(&finding.rule_id),
        line = finding.location.line(),
        column = finding.location.column(),
        category = finding.category.as_str(),
        message = html_escape(&finding.message),
        suggestion = suggestion,
    )
}

fn format_change(change: &ChangeRecord) -> String {
    format!(
        r#"        <div class="change">
            <p><span class="badge change">{rule}</span> line {line}: {description}</p>
            <div class="diff">
                <pre class="before">{before}</pre>
                <pre class="after">{after}</pre>
            </div>
        </div>
"#,
        rule = html_escape(&change.rule_id),
        line = change.location.line(),
        description = html_escape(&change.description),
        before = html_escape(&change.before),
        after = html_escape(&change.after),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

const CSS: &str = r#"
:root {
    --color-error: #d32f2f;
    --color-warning: #ff9800;
    --color-info: #2196f3;
    --color-change: #388e3c;
}

* {
    box-sizing: border-box;
    margin: 0;
    padding: 0;
}

body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, sans-serif;
    line-height: 1.6;
    color: #333;
    max-width: 1400px;
    margin: 0 auto;
    padding: 20px;
    background: #f5f5f5;
}

header {
    background: linear-gradient(135deg, #00796b 0%, #004d40 100%);
    color: white;
    padding: 30px;
    border-radius: 8px;
    margin-bottom: 20px;
}

.meta {
    opacity: 0.8;
    font-size: 0.9em;
}

section {
    background: white;
    padding: 25px;
    border-radius: 8px;
    margin-bottom: 20px;
    box-shadow: 0 2px 4px rgba(0,0,0,0.1);
}

h2 {
    color: #00796b;
    border-bottom: 2px solid #00796b;
    padding-bottom: 10px;
    margin-bottom: 20px;
}

h2.path {
    font-family: monospace;
}

h3 {
    color: #555;
    margin: 20px 0 10px;
    text-transform: capitalize;
}

h3.error { color: var(--color-error); }
h3.warning { color: var(--color-warning); }
h3.info { color: var(--color-info); }

.stats-grid {
    display: grid;
    grid-template-columns: repeat(auto-fit, minmax(150px, 1fr));
    gap: 15px;
    margin-bottom: 20px;
}

.stat-card {
    background: #f8f9fa;
    padding: 20px;
    border-radius: 8px;
    text-align: center;
}

.stat-value {
    display: block;
    font-size: 2.5em;
    font-weight: bold;
    color: #00796b;
}

.stat-label {
    color: #666;
}

.severity-legend {
    display: flex;
    gap: 20px;
}

.dot {
    display: inline-block;
    width: 10px;
    height: 10px;
    border-radius: 50%;
}

.dot.error { background: var(--color-error); }
.dot.warning { background: var(--color-warning); }
.dot.info { background: var(--color-info); }

table {
    width: 100%;
    border-collapse: collapse;
}

th, td {
    text-align: left;
    padding: 8px;
    border-bottom: 1px solid #eee;
    vertical-align: top;
}

.badge {
    color: white;
    padding: 2px 8px;
    border-radius: 4px;
    font-size: 0.85em;
    font-family: monospace;
}

.badge.error { background: var(--color-error); }
.badge.warning { background: var(--color-warning); }
.badge.info { background: var(--color-info); }
.badge.change { background: var(--color-change); }

.line {
    font-family: monospace;
    white-space: nowrap;
}

.suggestion {
    font-family: monospace;
    color: var(--color-change);
    margin-top: 4px;
}

.change {
    margin-bottom: 15px;
}

.diff {
    display: grid;
    grid-template-columns: 1fr 1fr;
    gap: 10px;
    margin-top: 5px;
}

pre {
    padding: 10px;
    border-radius: 4px;
    overflow-x: auto;
    font-size: 0.9em;
}

pre.before { background: #ffebee; }
pre.after { background: #e8f5e9; }

footer {
    text-align: center;
    color: #888;
    font-size: 0.9em;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::diagnostic::{FindingCategory, Location, Span};
    use crate::report::RunInfo;

    fn report() -> Report {
        let mut file = FileReport::new("dags/<etl>.py");
        file.findings.push(Finding::new(
            "AF401",
            Severity::Error,
            FindingCategory::Deprecation,
            "SubDagOperator & friends",
            Location::new("dags/<etl>.py", Span::point(3, 1)),
        ));
        file.changes.push(ChangeRecord {
            rule_id: "AF201".to_string(),
            location: Location::new("dags/<etl>.py", Span::point(7, 5)),
            description: "drop `provide_context`".to_string(),
            before: "f(provide_context=True)".to_string(),
            after: "f()".to_string(),
        });
        Report::from_files(
            RunInfo {
                catalog: "airflow-1.10-to-2".to_string(),
                mode: Mode::Transform,
                level: Severity::Info,
            },
            vec![file],
        )
    }

    #[test]
    fn test_page_contents() {
        let output = HtmlFormatter::new().format(&report());
        assert!(output.starts_with("<!DOCTYPE html>"));
        assert!(output.contains("Files Scanned"));
        assert!(output.contains("Error: 1"));
        assert!(output.contains("dags/&lt;etl&gt;.py"));
        assert!(output.contains("SubDagOperator &amp; friends"));
        assert!(output.contains(r#"<pre class="before">f(provide_context=True)</pre>"#));
        assert!(output.contains(r#"<pre class="after">f()</pre>"#));
    }

    #[test]
    fn test_summary_precedes_files() {
        let output = HtmlFormatter::new().with_title("Nightly").format(&report());
        assert!(output.contains("<title>Nightly</title>"));
        assert!(output.find("Summary").unwrap() < output.find("AF401").unwrap());
    }
}
