//! Explicit `dag=` wiring to `with DAG(...) as dag:` blocks
//!
//! A run is a `dag = DAG(...)` statement followed by one or more statements
//! that each pass `dag=dag` to some call. A container (module or block) may
//! hold several runs; all of them are converted by one rewrite.

use crate::diagnostic::Severity;
use crate::rule::{
    Attr, FindingRule, Hit, NameMatcher, Rewrite, RewriteOutcome, RewriteRule, RuleMeta, Shape,
    Splice,
};
use crate::syntax::python;
use crate::syntax::{SyntaxElement, SyntaxKind, SyntaxNode, SyntaxToken, TextRange, TokenKind};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagContextRule {
    pub id: String,
    /// Constructor names that create a DAG
    pub callees: Vec<String>,
    /// Keyword that attaches a task to a DAG
    pub keyword: String,
    pub severity: Severity,
}

impl Default for DagContextRule {
    fn default() -> Self {
        Self {
            id: "AF301".to_string(),
            callees: vec!["DAG".to_string()],
            keyword: "dag".to_string(),
            severity: Severity::Info,
        }
    }
}

#[derive(Debug)]
struct Run {
    /// Child index of the DAG assignment
    start: usize,
    /// One past the child index of the last follower
    end: usize,
    target: String,
    call: Arc<SyntaxNode>,
}

struct Matcher {
    rule: DagContextRule,
    callees: NameMatcher,
}

impl DagContextRule {
    pub fn meta(&self) -> RuleMeta {
        RuleMeta::new(&self.id, "dag-context-manager", self.severity)
            .with_summary(format!(
                "Tasks attached with `{}=` should be declared inside a `with DAG(...)` block",
                self.keyword
            ))
            .with_since(Some("2.0".to_string()))
    }

    pub fn rules(self, callees: NameMatcher) -> (FindingRule, RewriteRule) {
        let meta = self.meta();
        let shape = Shape::of(&[SyntaxKind::Module, SyntaxKind::Block]).with_child(
            Shape::of(&[SyntaxKind::ExpressionStatement]).with_child(
                Shape::of(&[SyntaxKind::Assignment]).with_child(
                    Shape::of(&[SyntaxKind::Call]).with_attr(Attr::Callee(callees.clone())),
                ),
            ),
        );
        let matcher = Arc::new(Matcher {
            rule: self,
            callees,
        });
        let for_find = Arc::clone(&matcher);
        let finding = FindingRule::new(meta.clone(), shape.clone(), move |node| {
            for_find.find(node)
        });
        let rewrite = RewriteRule::new(meta, shape, move |node| matcher.rewrite(node));
        (finding, rewrite)
    }
}

impl Matcher {
    fn find(&self, container: &SyntaxNode) -> Vec<Hit> {
        self.runs(container)
            .into_iter()
            .map(|run| {
                let range = TextRange::new(
                    container.child_offset(run.start),
                    container.child_offset(run.end),
                );
                if has_multiline_string(container, &run) {
                    self.multiline_hit(&run).at(range)
                } else {
                    Hit::deprecation(format!(
                        "tasks are attached to `{}` with `{}={}`; declare them inside `with {}(...) as {}:`",
                        run.target,
                        self.rule.keyword,
                        run.target,
                        callee_path(&run.call),
                        run.target
                    ))
                    .at(range)
                    .with_suggestion(format!(
                        "with {}(...) as {}:",
                        callee_path(&run.call),
                        run.target
                    ))
                }
            })
            .collect()
    }

    fn multiline_hit(&self, run: &Run) -> Hit {
        Hit::manual(format!(
            "`{}` could use a `with` block, but re-indenting its tasks would change a multi-line string; convert by hand",
            run.target
        ))
    }

    fn rewrite(&self, container: &SyntaxNode) -> RewriteOutcome {
        let runs = self.runs(container);
        if runs.is_empty() {
            return RewriteOutcome::NoMatch;
        }
        if let Some(run) = runs.iter().find(|r| has_multiline_string(container, r)) {
            return RewriteOutcome::Manual(self.multiline_hit(run));
        }

        let children = container.children();
        let mut new_children = Vec::with_capacity(children.len());
        let mut splices = Vec::with_capacity(runs.len());
        let mut next = 0;
        for run in &runs {
            new_children.extend_from_slice(&children[next..run.start]);
            splices.push(Splice {
                old: run.start..run.end,
                new: new_children.len()..new_children.len() + 1,
            });
            new_children.push(with_statement(children, run).into());
            next = run.end;
        }
        new_children.extend_from_slice(&children[next..]);

        let targets: Vec<&str> = runs.iter().map(|r| r.target.as_str()).collect();
        RewriteOutcome::Rewrite(Rewrite {
            replacement: Arc::new(container.with_children(new_children)),
            description: format!(
                "declare tasks of {} inside a `with` block",
                targets
                    .iter()
                    .map(|t| format!("`{}`", t))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            splices,
        })
    }

    fn runs(&self, container: &SyntaxNode) -> Vec<Run> {
        let children = container.children();
        let mut runs = Vec::new();
        let mut i = 0;
        while i < children.len() {
            let Some((target, call)) = children[i]
                .as_node()
                .and_then(|node| self.dag_assignment(node))
            else {
                i += 1;
                continue;
            };

            let mut end = i + 1;
            let mut newline = false;
            for (j, element) in children.iter().enumerate().skip(i + 1) {
                match element {
                    SyntaxElement::Token(token) => match token.kind() {
                        TokenKind::Whitespace => newline |= token.as_str().contains('\n'),
                        TokenKind::Comment => {}
                        TokenKind::Text => break,
                    },
                    SyntaxElement::Node(node) => {
                        if newline && self.attaches_to(node, &target) {
                            end = j + 1;
                            newline = false;
                        } else {
                            break;
                        }
                    }
                }
            }

            if end > i + 1 {
                runs.push(Run {
                    start: i,
                    end,
                    target,
                    call,
                });
                i = end;
            } else {
                i += 1;
            }
        }
        runs
    }

    /// `target = DAG(...)`
    fn dag_assignment(&self, stmt: &SyntaxNode) -> Option<(String, Arc<SyntaxNode>)> {
        let assignment = python::statement_expression(stmt)?;
        let (target, value) = python::simple_assignment(assignment)?;
        let callee = python::callee(value)?;
        self.callees
            .is_match(&callee.name)
            .then(|| (target.to_string(), Arc::clone(value)))
    }

    /// Statement passes `dag=<target>` to some call
    fn attaches_to(&self, stmt: &SyntaxNode, target: &str) -> bool {
        if !stmt.is(SyntaxKind::ExpressionStatement) {
            return false;
        }
        let keyword = self.rule.keyword.as_str();
        stmt.any_descendant(&|node: &SyntaxNode| {
            node.is(SyntaxKind::Call)
                && python::arguments(node)
                    .and_then(|(_, list)| python::keyword_arg(list, keyword))
                    .and_then(|kwarg| kwarg.node.child_nodes().nth(1).cloned())
                    .is_some_and(|value| python::identifier_text(&value) == Some(target))
        })
    }
}

fn callee_path(call: &SyntaxNode) -> String {
    python::callee(call).map_or_else(|| "DAG".to_string(), |c| c.path)
}

fn has_multiline_string(container: &SyntaxNode, run: &Run) -> bool {
    container.children()[run.start + 1..run.end]
        .iter()
        .filter_map(SyntaxElement::as_node)
        .any(|node| {
            node.any_descendant(&|n: &SyntaxNode| {
                n.is(SyntaxKind::StringLiteral) && n.render().contains('\n')
            })
        })
}

/// Indentation unit matching the followers' indentation
fn indent_unit(gap: &[SyntaxElement]) -> &'static str {
    let indent: String = gap
        .iter()
        .filter(|e| e.is_whitespace())
        .map(SyntaxElement::render)
        .collect();
    let last_line = indent.rsplit('\n').next().unwrap_or("");
    if last_line.contains('\t') {
        "\t"
    } else {
        "    "
    }
}

/// Insert `unit` after every newline that does not start an empty line
fn indent_whitespace(text: &str, unit: &str) -> String {
    let mut out = String::with_capacity(text.len() + unit.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '\n' && !matches!(chars.peek(), Some('\n') | Some('\r')) {
            out.push_str(unit);
        }
    }
    out
}

fn indent_element(element: &SyntaxElement, unit: &str) -> SyntaxElement {
    match element {
        SyntaxElement::Token(token)
            if token.kind() == TokenKind::Whitespace && token.as_str().contains('\n') =>
        {
            SyntaxToken::whitespace(&indent_whitespace(token.as_str(), unit)).into()
        }
        SyntaxElement::Token(_) => element.clone(),
        SyntaxElement::Node(node) => node
            .map_tokens(&mut |token| {
                (token.kind() == TokenKind::Whitespace && token.as_str().contains('\n'))
                    .then(|| SyntaxToken::whitespace(&indent_whitespace(token.as_str(), unit)))
            })
            .into(),
    }
}

fn with_statement(children: &[SyntaxElement], run: &Run) -> Arc<SyntaxNode> {
    let body = &children[run.start + 1..run.end];
    let first_stmt = body
        .iter()
        .position(|e| e.as_node().is_some())
        .unwrap_or(body.len());
    let unit = indent_unit(&body[..first_stmt]);

    let header_gap: Vec<SyntaxElement> = body[..first_stmt]
        .iter()
        .map(|e| indent_element(e, unit))
        .collect();
    let block: Vec<SyntaxElement> = body[first_stmt..]
        .iter()
        .map(|e| indent_element(e, unit))
        .collect();

    let target = Arc::new(SyntaxNode::new(
        SyntaxKind::AsPatternTarget,
        vec![python::identifier(&run.target).into()],
    ));
    let pattern = Arc::new(SyntaxNode::new(
        SyntaxKind::AsPattern,
        vec![
            Arc::clone(&run.call).into(),
            python::space(" "),
            python::text("as"),
            python::space(" "),
            target.into(),
        ],
    ));
    let item = Arc::new(SyntaxNode::new(SyntaxKind::WithItem, vec![pattern.into()]));
    let clause = Arc::new(SyntaxNode::new(SyntaxKind::WithClause, vec![item.into()]));

    let mut elements = vec![
        python::text("with"),
        python::space(" "),
        clause.into(),
        python::text(":"),
    ];
    elements.extend(header_gap);
    elements.push(Arc::new(SyntaxNode::new(SyntaxKind::Block, block)).into());
    Arc::new(SyntaxNode::new(SyntaxKind::WithStatement, elements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadline::Deadline;
    use crate::syntax::PythonParser;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> Arc<SyntaxNode> {
        PythonParser::new().parse(text, &Deadline::none()).unwrap()
    }

    fn rules() -> (FindingRule, RewriteRule) {
        DagContextRule::default().rules(NameMatcher::new(&["DAG"]).unwrap())
    }

    fn rewrite(text: &str) -> RewriteOutcome {
        rules().1.apply(&parse(text))
    }

    fn rewritten(text: &str) -> String {
        match rewrite(text) {
            RewriteOutcome::Rewrite(r) => r.replacement.render(),
            other => panic!("expected a rewrite, got {other:?}"),
        }
    }

    #[test]
    fn test_converts_module_level_run() {
        let text = "\
from airflow import DAG

dag = DAG('etl', schedule='@daily')

t1 = BashOperator(task_id='a', bash_command='echo a', dag=dag)
t2 = BashOperator(
    task_id='b',
    dag=dag,
)

t1 >> t2
";
        let expected = "\
from airflow import DAG

with DAG('etl', schedule='@daily') as dag:

    t1 = BashOperator(task_id='a', bash_command='echo a', dag=dag)
    t2 = BashOperator(
        task_id='b',
        dag=dag,
    )

t1 >> t2
";
        assert_eq!(rewritten(text), expected);
        parse(expected);
    }

    fn rewritten_block(text: &str) -> String {
        fn block(node: &Arc<SyntaxNode>) -> Option<Arc<SyntaxNode>> {
            if node.is(SyntaxKind::Block) {
                return Some(Arc::clone(node));
            }
            node.child_nodes().find_map(block)
        }
        let block = block(&parse(text)).unwrap();
        match rules().1.apply(&block) {
            RewriteOutcome::Rewrite(r) => r.replacement.render(),
            other => panic!("expected a rewrite, got {other:?}"),
        }
    }

    #[test]
    fn test_converts_inside_function_block() {
        let text = "\
def build():
    dag = DAG('x')
    t = DummyOperator(task_id='t', dag=dag)
    return dag
";
        let out = rewritten_block(text);
        assert!(
            out.starts_with(
                "with DAG('x') as dag:\n        t = DummyOperator(task_id='t', dag=dag)\n    return dag"
            ),
            "{out}"
        );
        // the module itself holds no DAG assignment
        assert!(matches!(rewrite(text), RewriteOutcome::NoMatch));
    }

    #[test]
    fn test_tab_indentation() {
        let text = "def build():\n\tdag = DAG('x')\n\tt = Op(dag=dag)\n";
        let out = rewritten_block(text);
        assert!(
            out.starts_with("with DAG('x') as dag:\n\t\tt = Op(dag=dag)"),
            "{out}"
        );
    }

    #[test]
    fn test_no_followers_no_match() {
        assert!(matches!(
            rewrite("dag = DAG('x')\nt = Op(task_id='t')\n"),
            RewriteOutcome::NoMatch
        ));
        assert!(matches!(
            rewrite("dag = DAG('x')\nt = Op(dag=other)\n"),
            RewriteOutcome::NoMatch
        ));
    }

    #[test]
    fn test_multiline_string_is_manual() {
        let text = "dag = DAG('x')\nt = BashOperator(bash_command='''\necho hi\n''', dag=dag)\n";
        let RewriteOutcome::Manual(hit) = rewrite(text) else {
            panic!("expected manual");
        };
        assert!(hit.message.contains("multi-line string"));
    }

    #[test]
    fn test_two_runs_in_one_rewrite() {
        let text = "a = DAG('a')\nx = Op(dag=a)\nb = DAG('b')\ny = Op(dag=b)\n";
        let RewriteOutcome::Rewrite(r) = rewrite(text) else {
            panic!("expected a rewrite");
        };
        assert_eq!(r.splices.len(), 2);
        assert_eq!(
            r.replacement.render(),
            "with DAG('a') as a:\n    x = Op(dag=a)\nwith DAG('b') as b:\n    y = Op(dag=b)\n"
        );
    }

    #[test]
    fn test_replacement_is_stable() {
        let (_, rule) = rules();
        let RewriteOutcome::Rewrite(r) = rewrite("dag = DAG('x')\nt = Op(dag=dag)\n") else {
            panic!("expected a rewrite");
        };
        assert!(matches!(rule.apply(&r.replacement), RewriteOutcome::NoMatch));
    }

    #[test]
    fn test_finding_covers_run() {
        let (finding, _) = rules();
        let text = "import x\ndag = DAG('x')\nt = Op(dag=dag)\nprint(1)\n";
        let hits = finding.check(&parse(text));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].range, Some(TextRange::new(9, 39)));
        assert_eq!(hits[0].suggestion.as_deref(), Some("with DAG(...) as dag:"));
    }

    #[test]
    fn test_indent_whitespace() {
        assert_eq!(indent_whitespace("\n\n", "    "), "\n\n    ");
        assert_eq!(indent_whitespace("\n  ", "    "), "\n      ");
    }
}
