//! Validation engine: runs finding rules over a tree

use crate::catalog::PatternCatalog;
use crate::context::FileContext;
use crate::deadline::TimedOut;
use crate::diagnostic::{Finding, Location, Severity};
use crate::suppress::Suppressions;
use crate::syntax::{LineIndex, SyntaxNode, SyntaxRef};
use std::sync::Arc;

/// Applies the catalog's finding rules to trees
#[derive(Debug, Clone, Copy)]
pub struct ValidationEngine<'c> {
    catalog: &'c PatternCatalog,
}

struct Visit<'a> {
    ctx: &'a FileContext<'a>,
    threshold: Severity,
    suppressions: Suppressions,
    lines: LineIndex<'a>,
    findings: Vec<Finding>,
}

impl<'c> ValidationEngine<'c> {
    pub fn new(catalog: &'c PatternCatalog) -> Self {
        Self { catalog }
    }

    /// Findings at or above `threshold`, in report order
    ///
    /// A finding is dropped when its rule is suppressed on the line the
    /// matched node starts on or on the line the finding itself starts on.
    pub fn validate(
        &self,
        tree: &Arc<SyntaxNode>,
        threshold: Severity,
        ctx: &FileContext<'_>,
    ) -> Result<Vec<Finding>, TimedOut> {
        let text = tree.render();
        let mut visit = Visit {
            ctx,
            threshold,
            suppressions: ctx.suppressions(tree),
            lines: LineIndex::new(&text),
            findings: Vec::new(),
        };
        self.visit(SyntaxRef::root(tree), &mut visit)?;

        let mut findings = visit.findings;
        findings.sort_by(Finding::report_order);
        findings.dedup();
        Ok(findings)
    }

    fn visit(&self, node: SyntaxRef<'_>, visit: &mut Visit<'_>) -> Result<(), TimedOut> {
        visit.ctx.deadline.check()?;

        let node_line = visit.lines.line(node.offset());
        for rule in self.catalog.finding_rules() {
            for hit in rule.check(node.node()) {
                if rule.meta.severity_for(hit.category) < visit.threshold {
                    continue;
                }
                let range = hit.range.map_or(node.range(), |r| r.shift(node.offset()));
                let span = visit.lines.span(range);
                if visit.suppressions.is_suppressed(&rule.meta.id, node_line)
                    || visit.suppressions.is_suppressed(&rule.meta.id, span.start.line)
                {
                    continue;
                }
                let location = Location::new(visit.ctx.file, span);
                visit.findings.push(rule.meta.finding(hit, location));
            }
        }

        for child in node.children() {
            self.visit(child, visit)?;
        }
        Ok(())
    }
}
