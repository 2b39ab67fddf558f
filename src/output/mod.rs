//! Report renderings

mod html;
mod json;
mod text;

pub use html::HtmlFormatter;
pub use json::JsonFormatter;
pub use text::TextFormatter;

use crate::config::OutputFormat;
use crate::diagnostic::Finding;
use crate::report::Report;

/// Output formatter trait
///
/// Formatting is a pure function of the report: it never reorders entries
/// or recomputes counts differently from [`Report::summary`].
pub trait OutputFormatter: Send + Sync {
    /// Format the entire report
    fn format(&self, report: &Report) -> String;

    /// Format a single finding
    fn format_finding(&self, finding: &Finding) -> String;
}

/// Formatter for `format`
pub fn formatter(format: OutputFormat, colored: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter::new().pretty()),
        OutputFormat::Html => Box::new(HtmlFormatter::new()),
        OutputFormat::Text => {
            let text = TextFormatter::new();
            Box::new(if colored { text } else { text.without_color() })
        }
    }
}
