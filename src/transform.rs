//! Transformation engine
//!
//! A pass walks the tree bottom-up and offers every node to the rewrite rules
//! in ascending id order; the first rule that rewrites it wins and its
//! replacement is not revisited in the same pass. A partial match is
//! recorded for manual migration and the node moves on to the next rule.
//! Passes repeat
//! until one changes nothing. Change locations from later passes are mapped
//! back to the input file through the edit maps of the earlier passes.

use crate::catalog::PatternCatalog;
use crate::context::FileContext;
use crate::deadline::TimedOut;
use crate::diagnostic::{ChangeRecord, Finding, Location};
use crate::rule::{Rewrite, RewriteOutcome, RuleMeta};
use crate::suppress::Suppressions;
use crate::syntax::{LineIndex, SyntaxElement, SyntaxNode, TextRange};
use log::debug;
use std::sync::Arc;
use thiserror::Error;

/// Upper bound on rewrite passes per file, including the final no-op pass
pub const MAX_PASSES: usize = 8;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{file}:{line}: rule {rule_id} matches its own replacement")]
    NonTerminating {
        rule_id: String,
        file: String,
        line: usize,
    },

    #[error("{file}: rewrites did not settle after {passes} passes")]
    NoFixpoint { file: String, passes: usize },

    #[error(transparent)]
    TimedOut(#[from] TimedOut),
}

impl EngineError {
    /// Internal invariant violations abort the run; timeouts do not
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::TimedOut(_))
    }
}

/// Result of transforming one tree
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub tree: Arc<SyntaxNode>,
    /// Applied rewrites, located in the input file
    pub changes: Vec<ChangeRecord>,
    /// Partial matches left for a human, located in the output tree
    pub manual: Vec<Finding>,
    /// Passes run, including the final one that changed nothing
    pub passes: usize,
}

impl TransformOutput {
    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Edit {
    /// Replaced range in the pass input
    range: TextRange,
    /// Length of the replacement text
    out_len: usize,
}

/// Offset correspondence between a pass's output and its input
#[derive(Debug, Default)]
struct EditMap {
    /// Disjoint maximal edits in ascending order
    edits: Vec<Edit>,
}

impl EditMap {
    fn new(mut edits: Vec<Edit>) -> Self {
        edits.sort_by(|a, b| {
            a.range
                .start
                .cmp(&b.range.start)
                .then(b.range.end.cmp(&a.range.end))
        });
        let mut maximal: Vec<Edit> = Vec::with_capacity(edits.len());
        for edit in edits {
            if maximal
                .last()
                .is_some_and(|kept| kept.range.contains_range(edit.range))
            {
                continue;
            }
            maximal.push(edit);
        }
        Self { edits: maximal }
    }

    /// Input offset for an offset in the output
    fn to_input(&self, pos: usize) -> usize {
        let mut delta: isize = 0;
        for edit in &self.edits {
            let out_start = edit.range.start.saturating_add_signed(delta);
            if pos < out_start {
                break;
            }
            let out_end = out_start + edit.out_len;
            if pos < out_end {
                return edit.range.start + (pos - out_start).min(edit.range.len());
            }
            delta += edit.out_len as isize - edit.range.len() as isize;
        }
        pos.saturating_add_signed(-delta)
    }

    fn to_input_range(&self, range: TextRange) -> TextRange {
        let start = self.to_input(range.start);
        TextRange::new(start, self.to_input(range.end).max(start))
    }
}

struct PendingChange {
    rule_id: String,
    range: TextRange,
    description: String,
    before: String,
    after: String,
}

/// State of one pass over one tree
struct Pass<'a> {
    ctx: &'a FileContext<'a>,
    suppressions: Suppressions,
    lines: LineIndex<'a>,
    edits: Vec<Edit>,
    changes: Vec<PendingChange>,
    manual: Vec<Finding>,
}

impl Pass<'_> {
    fn record(&mut self, meta: &RuleMeta, node: &SyntaxNode, current: &SyntaxNode, offset: usize, rewrite: &Rewrite) {
        if rewrite.splices.is_empty() {
            let range = TextRange::at(offset, node.text_len());
            self.edits.push(Edit {
                range,
                out_len: rewrite.replacement.text_len(),
            });
            self.changes.push(PendingChange {
                rule_id: meta.id.clone(),
                range,
                description: rewrite.description.clone(),
                before: current.render(),
                after: rewrite.replacement.render(),
            });
            return;
        }

        for splice in &rewrite.splices {
            let range = TextRange::new(
                offset + node.child_offset(splice.old.start),
                offset + node.child_offset(splice.old.end),
            );
            let before = render(current.children().get(splice.old.clone()).unwrap_or(&[]));
            let after = render(
                rewrite
                    .replacement
                    .children()
                    .get(splice.new.clone())
                    .unwrap_or(&[]),
            );
            self.edits.push(Edit {
                range,
                out_len: after.len(),
            });
            self.changes.push(PendingChange {
                rule_id: meta.id.clone(),
                range,
                description: rewrite.description.clone(),
                before,
                after,
            });
        }
    }
}

fn render(elements: &[SyntaxElement]) -> String {
    let mut out = String::new();
    for element in elements {
        element.write_to(&mut out);
    }
    out
}

/// Applies the catalog's rewrite rules to trees
#[derive(Debug, Clone, Copy)]
pub struct TransformEngine<'c> {
    catalog: &'c PatternCatalog,
}

impl<'c> TransformEngine<'c> {
    pub fn new(catalog: &'c PatternCatalog) -> Self {
        Self { catalog }
    }

    /// Rewrite `tree` to a fixpoint
    pub fn transform(
        &self,
        tree: &Arc<SyntaxNode>,
        ctx: &FileContext<'_>,
    ) -> Result<TransformOutput, EngineError> {
        let original = tree.render();
        let original_lines = LineIndex::new(&original);
        let mut current = Arc::clone(tree);
        let mut maps: Vec<EditMap> = Vec::new();
        let mut changes = Vec::new();

        for pass_number in 1..=MAX_PASSES {
            let text = current.render();
            let mut pass = Pass {
                ctx,
                suppressions: ctx.suppressions(&current),
                lines: LineIndex::new(&text),
                edits: Vec::new(),
                changes: Vec::new(),
                manual: Vec::new(),
            };
            let next = self.rewrite(&current, 0, &mut pass)?;

            if pass.changes.is_empty() {
                debug!(
                    "{}: {} changes in {} passes",
                    ctx.file,
                    changes.len(),
                    pass_number
                );
                let mut manual = pass.manual;
                manual.sort_by(Finding::report_order);
                return Ok(TransformOutput {
                    tree: current,
                    changes,
                    manual,
                    passes: pass_number,
                });
            }

            let map = EditMap::new(std::mem::take(&mut pass.edits));
            let mut pass_changes: Vec<ChangeRecord> = pass
                .changes
                .into_iter()
                .map(|change| {
                    let range = maps
                        .iter()
                        .rev()
                        .fold(change.range, |range, map| map.to_input_range(range));
                    ChangeRecord {
                        rule_id: change.rule_id,
                        location: Location::new(ctx.file, original_lines.span(range)),
                        description: change.description,
                        before: change.before,
                        after: change.after,
                    }
                })
                .collect();
            pass_changes.sort_by(|a, b| a.location.span.start.cmp(&b.location.span.start));
            changes.extend(pass_changes);
            maps.push(map);
            current = next;
        }

        Err(EngineError::NoFixpoint {
            file: ctx.file.to_string(),
            passes: MAX_PASSES,
        })
    }

    fn rewrite(
        &self,
        node: &Arc<SyntaxNode>,
        offset: usize,
        pass: &mut Pass<'_>,
    ) -> Result<Arc<SyntaxNode>, EngineError> {
        pass.ctx.deadline.check()?;

        let mut rebuilt: Option<Vec<SyntaxElement>> = None;
        let mut child_offset = offset;
        for (i, element) in node.children().iter().enumerate() {
            if let SyntaxElement::Node(child) = element {
                let new_child = self.rewrite(child, child_offset, pass)?;
                if !Arc::ptr_eq(&new_child, child) {
                    rebuilt.get_or_insert_with(|| node.children().to_vec())[i] =
                        SyntaxElement::Node(new_child);
                }
            }
            child_offset += element.text_len();
        }
        let current = match rebuilt {
            Some(children) => Arc::new(node.with_children(children)),
            None => Arc::clone(node),
        };

        let line = pass.lines.line(offset);
        for rule in self.catalog.rewrite_rules() {
            if pass.suppressions.is_suppressed(&rule.meta.id, line) {
                continue;
            }
            match rule.apply(&current) {
                RewriteOutcome::NoMatch => continue,
                RewriteOutcome::Manual(hit) => {
                    let range = hit
                        .range
                        .map_or(TextRange::at(offset, current.text_len()), |r| r.shift(offset));
                    let span = pass.lines.span(range);
                    if !pass.suppressions.is_suppressed(&rule.meta.id, span.start.line) {
                        let location = Location::new(pass.ctx.file, span);
                        pass.manual.push(rule.meta.finding(hit, location));
                    }
                }
                RewriteOutcome::Rewrite(rewrite) => {
                    if let RewriteOutcome::Rewrite(_) = rule.apply(&rewrite.replacement) {
                        return Err(EngineError::NonTerminating {
                            rule_id: rule.meta.id.clone(),
                            file: pass.ctx.file.to_string(),
                            line,
                        });
                    }
                    pass.record(&rule.meta, node, &current, offset, &rewrite);
                    return Ok(rewrite.replacement);
                }
            }
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogBuilder, ImportMapping, ParamAction, ParamMapping};
    use crate::deadline::Deadline;
    use crate::diagnostic::{FindingCategory, Position, Severity};
    use crate::rule::{Hit, RewriteRule, Shape};
    use crate::syntax::{python, PythonParser, SyntaxKind};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn parse(text: &str) -> Arc<SyntaxNode> {
        PythonParser::new().parse(text, &Deadline::none()).unwrap()
    }

    fn run(catalog: &PatternCatalog, text: &str) -> TransformOutput {
        TransformEngine::new(catalog)
            .transform(&parse(text), &FileContext::new("dag.py"))
            .unwrap()
    }

    #[test]
    fn test_untouched_tree_is_shared() {
        let catalog = PatternCatalog::builtin().unwrap();
        let tree = parse("import os\n\nprint(os.getcwd())\n");
        let out = TransformEngine::new(&catalog)
            .transform(&tree, &FileContext::new("x.py"))
            .unwrap();
        assert!(Arc::ptr_eq(&tree, &out.tree));
        assert!(out.is_unchanged());
        assert_eq!(out.passes, 1);
    }

    #[test]
    fn test_import_and_param_rewrites() {
        let catalog = PatternCatalog::builtin().unwrap();
        let text = "\
from airflow.operators.python_operator import PythonOperator

t = PythonOperator(task_id='t', provide_context=True, python_callable=f)
";
        let out = run(&catalog, text);
        assert_eq!(
            out.tree.render(),
            "\
from airflow.operators.python import PythonOperator

t = PythonOperator(task_id='t', python_callable=f)
"
        );
        let ids: Vec<&str> = out.changes.iter().map(|c| c.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["AF102", "AF201"]);
        let param = &out.changes[1];
        assert_eq!(param.location.span.start, Position::new(3, 5));
        assert_eq!(param.before, "PythonOperator(task_id='t', provide_context=True, python_callable=f)");
    }

    #[test]
    fn test_second_pass_locations_map_to_input() {
        // both keywords sit on one call: one rename per pass
        let catalog = PatternCatalog::builtin().unwrap();
        let text = "x = 1\ndag = DAG('d', schedule_interval='@daily', concurrency=4)\n";
        let out = run(&catalog, text);
        assert_eq!(
            out.tree.render(),
            "x = 1\ndag = DAG('d', schedule='@daily', max_active_tasks=4)\n"
        );
        assert_eq!(out.changes.len(), 2);
        assert!(out.passes >= 3);
        for change in &out.changes {
            assert_eq!(change.location.span.start, Position::new(2, 7));
            assert_eq!(change.location.span.end.line, 2);
        }
        assert!(out.changes.iter().any(|c| c.rule_id == "AF203"));
        assert!(out.changes.iter().any(|c| c.rule_id == "AF204"));
    }

    #[test]
    fn test_edit_map_shifts_following_offsets() {
        let map = EditMap::new(vec![
            Edit {
                range: TextRange::new(10, 20),
                out_len: 4,
            },
            Edit {
                range: TextRange::new(12, 14),
                out_len: 1,
            },
        ]);
        assert_eq!(map.edits.len(), 1);
        assert_eq!(map.to_input(5), 5);
        assert_eq!(map.to_input(10), 10);
        assert_eq!(map.to_input(14), 20);
        assert_eq!(map.to_input(20), 26);
    }

    #[test]
    fn test_manual_matches_are_reported_not_rewritten() {
        let catalog = PatternCatalog::builtin().unwrap();
        let text = "import airflow.operators.bash_operator\n";
        let out = run(&catalog, text);
        assert_eq!(out.tree.render(), text);
        assert_eq!(out.manual.len(), 1);
        assert_eq!(out.manual[0].rule_id, "AF101");
        assert_eq!(out.manual[0].category, FindingCategory::ManualMigration);
        assert_eq!(out.manual[0].severity, Severity::Warning);
    }

    #[test]
    fn test_partial_match_leaves_node_to_later_rules() {
        let catalog = PatternCatalog::builtin().unwrap();
        let out = run(&catalog, "dag = DAG('d', 'desc', '@daily', concurrency=4)\n");
        assert_eq!(
            out.tree.render(),
            "dag = DAG('d', 'desc', '@daily', max_active_tasks=4)\n"
        );
        let ids: Vec<&str> = out.changes.iter().map(|c| c.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["AF204"]);
        assert_eq!(out.manual.len(), 1);
        assert_eq!(out.manual[0].rule_id, "AF203");
        assert_eq!(out.manual[0].category, FindingCategory::ManualMigration);
    }

    #[test]
    fn test_lowest_id_wins_on_shared_node() {
        let catalog = CatalogBuilder::new()
            .parameter(ParamMapping::new("AF250", &["f"], "a", ParamAction::Drop))
            .parameter(ParamMapping::new("AF251", &["f"], "b", ParamAction::Drop))
            .build()
            .unwrap();
        let out = run(&catalog, "f(a=1, b=2)\n");
        assert_eq!(out.tree.render(), "f()\n");
        let ids: Vec<&str> = out.changes.iter().map(|c| c.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["AF250", "AF251"]);
    }

    #[test]
    fn test_suppressed_rewrite_is_skipped() {
        let catalog = PatternCatalog::builtin().unwrap();
        let text = "from airflow.operators.bash_operator import BashOperator  # dag-migrate: disable=AF101\n";
        let out = run(&catalog, text);
        assert_eq!(out.tree.render(), text);
    }

    #[test]
    fn test_self_matching_rule_is_fatal() {
        let catalog = CatalogBuilder::new().build().unwrap().with_rewrite_rule(RewriteRule::new(
            RuleMeta::new("AF999", "grow", Severity::Info),
            Shape::of(&[SyntaxKind::Identifier]),
            |node| {
                RewriteOutcome::Rewrite(Rewrite::whole(
                    python::identifier(&format!("{}x", node.significant_text())),
                    "grow",
                ))
            },
        ));
        let err = TransformEngine::new(&catalog)
            .transform(&parse("a = 1\n"), &FileContext::new("loop.py"))
            .unwrap_err();
        assert!(matches!(err, EngineError::NonTerminating { ref rule_id, line: 1, .. } if rule_id == "AF999"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_expired_deadline() {
        let catalog = PatternCatalog::builtin().unwrap();
        let ctx = FileContext::new("slow.py").with_deadline(Deadline::after(Duration::ZERO));
        let err = TransformEngine::new(&catalog)
            .transform(&parse("x = 1\n"), &ctx)
            .unwrap_err();
        assert!(matches!(err, EngineError::TimedOut(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_manual_hit_from_custom_rule() {
        let catalog = CatalogBuilder::new().build().unwrap().with_rewrite_rule(RewriteRule::new(
            RuleMeta::new("AF998", "flag", Severity::Info),
            Shape::of(&[SyntaxKind::Call]),
            |_| RewriteOutcome::Manual(Hit::manual("look here")),
        ));
        let out = run(&catalog, "x = 1\ny = f()\n");
        assert_eq!(out.manual.len(), 1);
        assert_eq!(out.manual[0].location.span.start, Position::new(2, 5));
        assert_eq!(out.manual[0].severity, Severity::Warning);
        assert_eq!(out.tree.render(), "x = 1\ny = f()\n");
    }

    #[test]
    fn test_import_rename_change_record() {
        let catalog = CatalogBuilder::new()
            .import(
                ImportMapping::new("AF103", "airflow.operators.dummy_operator", "airflow.operators.empty")
                    .rename("DummyOperator", "EmptyOperator"),
            )
            .build()
            .unwrap();
        let out = run(&catalog, "from airflow.operators.dummy_operator import DummyOperator\n");
        assert_eq!(out.changes.len(), 1);
        assert_eq!(
            out.changes[0].after,
            "from airflow.operators.empty import EmptyOperator as DummyOperator"
        );
        assert_eq!(out.changes[0].location.span.start, Position::new(1, 1));
    }
}
