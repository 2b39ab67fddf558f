//! Inline suppression comments
//!
//! Supported forms:
//!
//! ```text
//! x = days_ago(1)  # dag-migrate: disable=AF404
//! # dag-migrate: disable-next-line=AF201,AF202
//! # dag-migrate: disable-file
//! # dag-migrate: disable-file=AF301 -- generated file
//! ```

use crate::syntax::{SyntaxNode, TokenKind};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

fn directive() -> &'static Regex {
    static DIRECTIVE: OnceLock<Regex> = OnceLock::new();
    DIRECTIVE.get_or_init(|| {
        Regex::new(
            r"dag-migrate:\s*(disable-next-line|disable-file|disable)(?:\s*=\s*([A-Za-z0-9_]+(?:\s*,\s*[A-Za-z0-9_]+)*))?",
        )
        .expect("valid suppression pattern")
    })
}

/// Rule set a directive applies to
#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    All,
    Rules(HashSet<String>),
}

impl Scope {
    fn covers(&self, rule_id: &str) -> bool {
        match self {
            Scope::All => true,
            Scope::Rules(ids) => ids.contains(rule_id),
        }
    }

    fn merge(&mut self, other: Scope) {
        match other {
            Scope::All => *self = Scope::All,
            Scope::Rules(more) => {
                if let Scope::Rules(ids) = self {
                    ids.extend(more);
                }
            }
        }
    }
}

/// Suppressed rules per line and per file
#[derive(Debug, Clone, Default)]
pub struct Suppressions {
    file: Option<Scope>,
    lines: HashMap<usize, Scope>,
}

impl Suppressions {
    pub fn none() -> Self {
        Self::default()
    }

    /// Collect directives from the comments of a tree
    pub fn scan(tree: &SyntaxNode) -> Self {
        let mut suppressions = Self::default();
        let mut line = 1;
        tree.for_each_token(&mut |token| {
            if token.kind() == TokenKind::Comment {
                for cap in directive().captures_iter(token.as_str()) {
                    let scope = match cap.get(2) {
                        Some(ids) => Scope::Rules(
                            ids.as_str()
                                .split(',')
                                .map(|id| id.trim().to_string())
                                .collect(),
                        ),
                        None => Scope::All,
                    };
                    match &cap[1] {
                        "disable-file" => suppressions.add_file(scope),
                        "disable-next-line" => suppressions.add_line(line + 1, scope),
                        _ => suppressions.add_line(line, scope),
                    }
                }
            }
            line += token.as_str().matches('\n').count();
        });
        suppressions
    }

    /// Also suppress `ids` everywhere in the file
    pub fn ignore_rules<S: AsRef<str>>(mut self, ids: &[S]) -> Self {
        if !ids.is_empty() {
            self.add_file(Scope::Rules(
                ids.iter().map(|id| id.as_ref().to_string()).collect(),
            ));
        }
        self
    }

    fn add_file(&mut self, scope: Scope) {
        match &mut self.file {
            Some(existing) => existing.merge(scope),
            None => self.file = Some(scope),
        }
    }

    fn add_line(&mut self, line: usize, scope: Scope) {
        match self.lines.get_mut(&line) {
            Some(existing) => existing.merge(scope),
            None => {
                self.lines.insert(line, scope);
            }
        }
    }

    /// Whether `rule_id` is suppressed for a finding starting on `line`
    pub fn is_suppressed(&self, rule_id: &str, line: usize) -> bool {
        self.file.as_ref().is_some_and(|s| s.covers(rule_id))
            || self.lines.get(&line).is_some_and(|s| s.covers(rule_id))
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.lines.is_empty()
    }
}
