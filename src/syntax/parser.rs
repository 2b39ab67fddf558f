//! tree-sitter adapter producing lossless trees

use super::{SyntaxElement, SyntaxKind, SyntaxNode, SyntaxToken};
use crate::deadline::Deadline;
use std::sync::Arc;
use thiserror::Error;
use tree_sitter::{Node, Parser};

/// Deepest node nesting accepted
pub const MAX_DEPTH: usize = 400;

/// Deadline is polled once per this many nodes
const DEADLINE_STRIDE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("nesting deeper than {limit} levels at line {line}, column {column}")]
    TooDeep {
        line: usize,
        column: usize,
        limit: usize,
    },

    #[error("python grammar could not be loaded: {0}")]
    Language(String),

    #[error("parse timed out")]
    TimedOut,

    #[error("parser returned no tree")]
    NoTree,

    #[error("node range {start}..{end} is not on a character boundary")]
    Boundary { start: usize, end: usize },
}

impl ParseError {
    /// 1-based line/column of the error, when known
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            ParseError::Syntax { line, column, .. } | ParseError::TooDeep { line, column, .. } => {
                Some((*line, *column))
            }
            _ => None,
        }
    }
}

/// Python parser; cheap to share between worker threads
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse `text` into a lossless tree rooted at a module node
    pub fn parse(&self, text: &str, deadline: &Deadline) -> Result<Arc<SyntaxNode>, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::language())
            .map_err(|e| ParseError::Language(e.to_string()))?;

        if let Some(remaining) = deadline.remaining() {
            if remaining.is_zero() {
                return Err(ParseError::TimedOut);
            }
            // zero would disable the limit
            let micros = u64::try_from(remaining.as_micros()).unwrap_or(u64::MAX).max(1);
            parser.set_timeout_micros(micros);
        }

        let tree = parser.parse(text, None).ok_or_else(|| {
            if deadline.is_expired() {
                ParseError::TimedOut
            } else {
                ParseError::NoTree
            }
        })?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(first_error(root, text));
        }

        let mut builder = TreeBuilder {
            text,
            deadline,
            visited: 0,
        };
        builder.build(root, 0, text.len(), 0, false)
    }
}

struct TreeBuilder<'t> {
    text: &'t str,
    deadline: &'t Deadline,
    visited: usize,
}

impl TreeBuilder<'_> {
    fn slice(&self, start: usize, end: usize) -> Result<&str, ParseError> {
        self.text
            .get(start..end)
            .ok_or(ParseError::Boundary { start, end })
    }

    fn tick(&mut self) -> Result<(), ParseError> {
        self.visited += 1;
        if self.visited % DEADLINE_STRIDE == 0 && self.deadline.is_expired() {
            return Err(ParseError::TimedOut);
        }
        Ok(())
    }

    /// Text between two grammar nodes; inside string literals it is content
    fn gap(&self, start: usize, end: usize, in_string: bool) -> Result<SyntaxElement, ParseError> {
        let text = self.slice(start, end)?;
        Ok(if in_string {
            SyntaxToken::text(text).into()
        } else {
            SyntaxToken::whitespace(text).into()
        })
    }

    /// Build the node covering `start..end`
    ///
    /// The covered range may exceed the grammar node's own range: the root
    /// always spans the whole text.
    fn build(
        &mut self,
        node: Node<'_>,
        start: usize,
        end: usize,
        depth: usize,
        in_string: bool,
    ) -> Result<Arc<SyntaxNode>, ParseError> {
        if depth > MAX_DEPTH {
            let p = node.start_position();
            return Err(ParseError::TooDeep {
                line: p.row + 1,
                column: p.column + 1,
                limit: MAX_DEPTH,
            });
        }
        self.tick()?;

        let kind = SyntaxKind::from_grammar(node.kind());
        let in_string = in_string || kind == SyntaxKind::StringLiteral;

        if node.child_count() == 0 {
            let text = self.slice(start, end)?;
            let children = if text.is_empty() {
                Vec::new()
            } else {
                vec![SyntaxToken::text(text).into()]
            };
            return Ok(Arc::new(SyntaxNode::new(kind, children)));
        }

        let mut cursor = node.walk();
        let grammar_children: Vec<Node<'_>> = node.children(&mut cursor).collect();

        let mut children = Vec::with_capacity(grammar_children.len() * 2);
        let mut pos = start;
        for child in grammar_children {
            let child_start = child.start_byte().max(pos);
            let child_end = child.end_byte().max(child_start);
            if child_start > pos {
                children.push(self.gap(pos, child_start, in_string)?);
            }
            if child_end > child_start || child.child_count() > 0 {
                let element = if child.kind() == "comment" && !in_string {
                    SyntaxToken::comment(self.slice(child_start, child_end)?).into()
                } else if !child.is_named() && child.child_count() == 0 {
                    SyntaxToken::text(self.slice(child_start, child_end)?).into()
                } else {
                    self.build(child, child_start, child_end, depth + 1, in_string)?
                        .into()
                };
                children.push(element);
            }
            pos = child_end;
        }
        if end > pos {
            children.push(self.gap(pos, end, in_string)?);
        }

        Ok(Arc::new(SyntaxNode::new(kind, children)))
    }
}

/// Locate the first error or missing node in document order
fn first_error(root: Node<'_>, text: &str) -> ParseError {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let p = node.start_position();
            let message = if node.is_missing() {
                format!("missing `{}`", node.kind())
            } else {
                let snippet: String = text
                    .get(node.start_byte()..node.end_byte())
                    .unwrap_or("")
                    .lines()
                    .next()
                    .unwrap_or("")
                    .chars()
                    .take(40)
                    .collect();
                format!("unexpected `{}`", snippet.trim())
            };
            return ParseError::Syntax {
                line: p.row + 1,
                column: p.column + 1,
                message,
            };
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node
            .children(&mut cursor)
            .filter(|c| c.has_error() || c.is_missing())
            .collect();
        stack.extend(children.into_iter().rev());
    }
    let p = root.start_position();
    ParseError::Syntax {
        line: p.row + 1,
        column: p.column + 1,
        message: "invalid syntax".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{SyntaxRef, TokenKind};
    use std::time::Duration;

    fn parse(text: &str) -> Arc<SyntaxNode> {
        PythonParser::new().parse(text, &Deadline::none()).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_bytes() {
        let sources = [
            "",
            "\n\n",
            "x = 1\n",
            "import os  # comment\n\n\ndef f(a, *args, **kw):\n    return a\n",
            "s = '''multi\n  line\n'''\nt = f\"{x!r:>10}\"\n",
            "if x:\n\tpass\nelse:\n\tpass\n",
            "total = 1 + \\\n    2\n",
            "x = 1   \n# trailing comment without newline",
            "class C:\n    @staticmethod\n    def m():\n        pass\n",
        ];
        for source in sources {
            let tree = parse(source);
            assert_eq!(tree.render(), source);
            assert_eq!(tree.kind(), SyntaxKind::Module);
        }
    }

    #[test]
    fn test_comments_become_comment_tokens() {
        let tree = parse("x = 1  # keep me\n");
        let mut comments = Vec::new();
        tree.for_each_token(&mut |t| {
            if t.kind() == TokenKind::Comment {
                comments.push(t.as_str().to_string());
            }
        });
        assert_eq!(comments, vec!["# keep me"]);
    }

    #[test]
    fn test_string_contents_are_not_whitespace() {
        let tree = parse("s = 'a   b'\n");
        let mut whitespace = Vec::new();
        tree.for_each_token(&mut |t| {
            if t.kind() == TokenKind::Whitespace {
                whitespace.push(t.as_str().to_string());
            }
        });
        assert!(whitespace.iter().all(|w| w.trim().is_empty()));
        assert!(!whitespace.contains(&"   ".to_string()));
    }

    #[test]
    fn test_call_structure() {
        let tree = parse("op = BashOperator(task_id='t', xcom_push=True)\n");
        let stmt = tree.first_child_of(SyntaxKind::ExpressionStatement).unwrap();
        let assign = stmt.first_child_of(SyntaxKind::Assignment).unwrap();
        let call = assign.first_child_of(SyntaxKind::Call).unwrap();
        let args = call.first_child_of(SyntaxKind::ArgumentList).unwrap();
        let kwargs: Vec<_> = args
            .child_nodes()
            .filter(|n| n.is(SyntaxKind::KeywordArgument))
            .collect();
        assert_eq!(kwargs.len(), 2);
        assert_eq!(kwargs[1].render(), "xcom_push=True");
    }

    #[test]
    fn test_root_spans_whole_text() {
        let text = "\n\n# lead\nx = 1\n\n";
        let tree = parse(text);
        assert_eq!(SyntaxRef::root(&tree).range().end, text.len());
    }

    #[test]
    fn test_syntax_error_reports_position() {
        let err = PythonParser::new()
            .parse("def broken(:\n    pass\n", &Deadline::none())
            .unwrap_err();
        match err {
            ParseError::Syntax { line, .. } => assert_eq!(line, 1),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_nesting_limit() {
        let depth = MAX_DEPTH + 10;
        let text = format!("x = {}1{}\n", "(".repeat(depth), ")".repeat(depth));
        let err = PythonParser::new().parse(&text, &Deadline::none()).unwrap_err();
        assert!(matches!(err, ParseError::TooDeep { .. }));
    }

    #[test]
    fn test_expired_deadline() {
        let deadline = Deadline::after(Duration::ZERO);
        let err = PythonParser::new().parse("x = 1\n", &deadline).unwrap_err();
        assert_eq!(err, ParseError::TimedOut);
    }
}
