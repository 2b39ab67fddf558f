//! Per-file context handed to the engines

use crate::deadline::Deadline;
use crate::suppress::Suppressions;
use crate::syntax::SyntaxNode;

#[derive(Debug, Clone, Copy)]
pub struct FileContext<'a> {
    /// Path relative to the corpus root, used in locations
    pub file: &'a str,
    pub deadline: Deadline,
    /// Rules ignored for this file by configuration
    pub ignored: &'a [String],
}

impl<'a> FileContext<'a> {
    pub fn new(file: &'a str) -> Self {
        Self {
            file,
            deadline: Deadline::none(),
            ignored: &[],
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_ignored(mut self, ignored: &'a [String]) -> Self {
        self.ignored = ignored;
        self
    }

    /// Inline directives of `tree` plus the configured ignores
    pub fn suppressions(&self, tree: &SyntaxNode) -> Suppressions {
        Suppressions::scan(tree).ignore_rules(self.ignored)
    }
}
