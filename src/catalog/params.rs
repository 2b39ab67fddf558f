//! Keyword-argument migrations on calls

use crate::diagnostic::Severity;
use crate::rule::{
    Attr, FindingRule, Hit, NameMatcher, Rewrite, RewriteOutcome, RewriteRule, RuleMeta, Shape,
};
use crate::syntax::python::{self, KeywordArg};
use crate::syntax::{SyntaxElement, SyntaxKind, SyntaxNode, TextRange};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

/// What happens to a deprecated keyword argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParamAction {
    /// Remove the argument
    Drop,
    /// Rename the keyword
    Rename(String),
    /// Report only; no safe rewrite exists
    Manual,
}

/// A keyword argument deprecated on a family of callees
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamMapping {
    /// Rule identifier (e.g., "AF201")
    pub id: String,

    /// Short kebab-case name
    #[serde(default)]
    pub name: Option<String>,

    /// Callee name globs (e.g., "*Operator")
    pub callees: Vec<String>,

    /// Deprecated keyword
    pub param: String,

    pub action: ParamAction,

    /// 0-based index at which the argument may also be passed positionally
    #[serde(default)]
    pub position: Option<usize>,

    #[serde(default = "default_severity")]
    pub severity: Severity,

    #[serde(default)]
    pub since: Option<String>,

    /// Guidance shown for manual migrations
    #[serde(default)]
    pub note: Option<String>,
}

fn default_severity() -> Severity {
    Severity::Warning
}

#[derive(Debug)]
pub(crate) enum ParamAnalysis {
    NoMatch,
    Fixable {
        replacement: Arc<SyntaxNode>,
        range: TextRange,
    },
    Manual(Hit),
}

impl ParamMapping {
    pub fn new(id: &str, callees: &[&str], param: &str, action: ParamAction) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            callees: callees.iter().map(|c| c.to_string()).collect(),
            param: param.to_string(),
            action,
            position: None,
            severity: default_severity(),
            since: None,
            note: None,
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn position(mut self, index: usize) -> Self {
        self.position = Some(index);
        self
    }

    pub fn note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn meta(&self) -> RuleMeta {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("param-{}", self.param.replace('_', "-")));
        let callees = self.callees.join(", ");
        let summary = match &self.action {
            ParamAction::Drop => format!("`{}` on {} is no longer accepted", self.param, callees),
            ParamAction::Rename(to) => {
                format!("`{}` on {} was renamed to `{}`", self.param, callees, to)
            }
            ParamAction::Manual => format!(
                "`{}` on {} changed meaning and needs a manual migration",
                self.param, callees
            ),
        };
        RuleMeta::new(&self.id, &name, self.severity)
            .with_summary(summary)
            .with_since(self.since.clone())
    }

    /// Finding and rewrite rule for this mapping
    pub fn rules(self, callees: NameMatcher) -> (FindingRule, RewriteRule) {
        let meta = self.meta();
        let shape = Shape::of(&[SyntaxKind::Call]).with_attr(Attr::Callee(callees));
        let mapping = Arc::new(self);
        let for_find = Arc::clone(&mapping);
        let finding = FindingRule::new(meta.clone(), shape.clone(), move |node| {
            for_find.find(node)
        });
        let rewrite = RewriteRule::new(meta, shape, move |node| mapping.rewrite(node));
        (finding, rewrite)
    }

    pub(crate) fn find(&self, call: &SyntaxNode) -> Vec<Hit> {
        match self.analyze(call) {
            ParamAnalysis::NoMatch => Vec::new(),
            ParamAnalysis::Manual(hit) => vec![hit],
            ParamAnalysis::Fixable { replacement, range } => {
                let message = match &self.action {
                    ParamAction::Rename(to) => {
                        format!("`{}` is deprecated; use `{}`", self.param, to)
                    }
                    _ => format!("`{}` is no longer accepted and should be removed", self.param),
                };
                vec![Hit::deprecation(message)
                    .at(range)
                    .with_suggestion(replacement.render())]
            }
        }
    }

    pub(crate) fn rewrite(&self, call: &SyntaxNode) -> RewriteOutcome {
        match self.analyze(call) {
            ParamAnalysis::NoMatch => RewriteOutcome::NoMatch,
            ParamAnalysis::Manual(hit) => RewriteOutcome::Manual(hit),
            ParamAnalysis::Fixable { replacement, .. } => {
                let description = match &self.action {
                    ParamAction::Rename(to) => format!("rename `{}` to `{}`", self.param, to),
                    _ => format!("remove `{}`", self.param),
                };
                RewriteOutcome::Rewrite(Rewrite::whole(replacement, description))
            }
        }
    }

    pub(crate) fn analyze(&self, call: &SyntaxNode) -> ParamAnalysis {
        let Some((list_index, list)) = python::arguments(call) else {
            return ParamAnalysis::NoMatch;
        };
        let list_offset = call.child_offset(list_index);
        let kwargs = python::keyword_args(list);

        let Some(kwarg) = kwargs.iter().find(|k| k.name == self.param) else {
            return self.positional(list, list_offset);
        };
        let range = list.child_range(kwarg.index).shift(list_offset);

        let new_list = match &self.action {
            ParamAction::Manual => {
                let note = self.note.clone().unwrap_or_else(|| {
                    format!("`{}` needs a manual migration", self.param)
                });
                return ParamAnalysis::Manual(
                    Hit::manual(format!("`{}`: {}", self.param, note)).at(range),
                );
            }
            ParamAction::Rename(to) if kwargs.iter().any(|k| k.name == to.as_str()) => {
                return ParamAnalysis::Manual(
                    Hit::manual(format!(
                        "both `{}` and `{}` are passed; remove `{}` by hand",
                        self.param, to, self.param
                    ))
                    .at(range),
                );
            }
            ParamAction::Rename(to) => rename_keyword(list, kwarg, to),
            ParamAction::Drop => remove_argument(list, kwarg.index),
        };

        ParamAnalysis::Fixable {
            replacement: Arc::new(call.replace_child(list_index, Arc::new(new_list).into())),
            range,
        }
    }

    fn positional(&self, list: &SyntaxNode, list_offset: usize) -> ParamAnalysis {
        let Some(position) = self.position else {
            return ParamAnalysis::NoMatch;
        };
        let positional = python::positional_args(list);
        match positional.get(position) {
            Some((index, _)) if !python::has_list_splat(list) => {
                let range = list.child_range(*index).shift(list_offset);
                let hint = match &self.action {
                    ParamAction::Rename(to) => format!("pass it as `{}=`", to),
                    ParamAction::Drop => "remove it".to_string(),
                    ParamAction::Manual => "migrate it by hand".to_string(),
                };
                ParamAnalysis::Manual(
                    Hit::manual(format!(
                        "`{}` is passed positionally (argument {}); {}",
                        self.param,
                        position + 1,
                        hint
                    ))
                    .at(range),
                )
            }
            _ => ParamAnalysis::NoMatch,
        }
    }
}

fn rename_keyword(list: &SyntaxNode, kwarg: &KeywordArg<'_>, to: &str) -> SyntaxNode {
    let renamed = kwarg
        .node
        .replace_child(0, python::identifier(to).into());
    list.replace_child(kwarg.index, Arc::new(renamed).into())
}

/// Remove argument `index` from an argument list, keeping the surrounding
/// layout and every comment
pub(crate) fn remove_argument(list: &SyntaxNode, index: usize) -> SyntaxNode {
    let children = list.children();
    let significant = |i: &usize| !children[*i].is_whitespace();
    let next = (index + 1..children.len()).find(significant);
    let prev = (0..index).rev().find(significant);
    let others = list
        .indexed_child_nodes()
        .any(|(i, _)| i != index);

    let removed: Range<usize> = match next {
        Some(comma) if children[comma].is_text(",") => {
            let after = (comma + 1..children.len()).find(significant);
            match after {
                Some(a) if !children[a].is_text(")") => index..a,
                _ if !others => clear_between_parens(children, prev, index, comma + 1),
                // last argument with a trailing comma
                _ => {
                    let start = if index > 0 && children[index - 1].is_whitespace() {
                        index - 1
                    } else {
                        index
                    };
                    start..comma + 1
                }
            }
        }
        _ => match prev {
            Some(p) if children[p].is_text(",") => p..index + 1,
            _ => clear_between_parens(children, prev, index, index + 1),
        },
    };

    let kept = children[..removed.start]
        .iter()
        .chain(&children[removed.end..])
        .cloned()
        .collect::<Vec<SyntaxElement>>();
    list.with_children(kept)
}

/// Range to remove when the argument is the only one
///
/// Whitespace between the parentheses goes too, unless a comment sits there.
fn clear_between_parens(
    children: &[SyntaxElement],
    prev: Option<usize>,
    index: usize,
    end: usize,
) -> Range<usize> {
    let Some(open) = prev.filter(|p| children[*p].is_text("(")) else {
        return index..end;
    };
    let close = (end..children.len())
        .find(|i| !children[*i].is_whitespace())
        .filter(|c| children[*c].is_text(")"));
    match close {
        Some(close) if !children[open + 1..close].iter().any(SyntaxElement::is_comment) => {
            open + 1..close
        }
        _ => index..end,
    }
}
