//! Rule definitions: metadata, shape pre-filters and actions

use crate::diagnostic::{Finding, FindingCategory, Location, Severity};
use crate::syntax::python;
use crate::syntax::{SyntaxKind, SyntaxNode, TextRange};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Descriptive data shared by the finding and rewrite variant of a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMeta {
    /// Unique rule identifier (e.g., "AF101")
    pub id: String,

    /// Short kebab-case name
    pub name: String,

    /// One-paragraph description of what the rule detects
    pub summary: String,

    /// Default severity level
    pub severity: Severity,

    /// Bumped whenever the rule's behavior changes
    pub revision: u32,

    /// Framework version that deprecated the construct
    pub since: Option<String>,
}

impl RuleMeta {
    pub fn new(id: &str, name: &str, severity: Severity) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            summary: String::new(),
            severity,
            revision: 1,
            since: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_since(mut self, since: Option<String>) -> Self {
        self.since = since;
        self
    }

    /// Severity a hit of this category is reported at
    ///
    /// Manual-migration hits never drop below warning.
    pub fn severity_for(&self, category: FindingCategory) -> Severity {
        match category {
            FindingCategory::ManualMigration => self.severity.max(Severity::Warning),
            _ => self.severity,
        }
    }

    /// Turn a hit into a reportable finding
    pub fn finding(&self, hit: Hit, location: Location) -> Finding {
        let finding = Finding::new(
            &self.id,
            self.severity_for(hit.category),
            hit.category,
            &hit.message,
            location,
        );
        match hit.suggestion {
            Some(suggestion) => finding.with_suggestion(suggestion),
            None => finding,
        }
    }
}

/// Glob matcher over bare names such as `*Operator`
#[derive(Clone)]
pub struct NameMatcher {
    patterns: Vec<String>,
    set: GlobSet,
}

impl NameMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern.as_ref())?);
        }
        Ok(Self {
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
            set: builder.build()?,
        })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.set.is_match(name)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl fmt::Debug for NameMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NameMatcher").field(&self.patterns).finish()
    }
}

/// Attribute test applied to a candidate node
#[derive(Debug, Clone)]
pub enum Attr {
    /// Import statement refers to exactly this module path
    ImportsModule(String),
    /// Import statement refers to this package or a module below it
    ImportsUnder(String),
    /// Call whose callee's last segment matches
    Callee(NameMatcher),
    /// Decorator whose name matches
    Decorator(NameMatcher),
}

impl Attr {
    fn matches(&self, node: &SyntaxNode) -> bool {
        match self {
            Attr::ImportsModule(path) => python::import(node)
                .is_some_and(|i| i.mentioned_modules().iter().any(|m| m == path)),
            Attr::ImportsUnder(prefix) => python::import(node).is_some_and(|i| {
                i.mentioned_modules().iter().any(|m| {
                    m == prefix
                        || m.strip_prefix(prefix.as_str())
                            .is_some_and(|rest| rest.starts_with('.'))
                })
            }),
            Attr::Callee(names) => {
                python::callee(node).is_some_and(|c| names.is_match(&c.name))
            }
            Attr::Decorator(names) => {
                python::decorator_name(node).is_some_and(|c| names.is_match(&c.name))
            }
        }
    }
}

/// Structural pre-filter: node kind, attribute tests, and required children
#[derive(Debug, Clone, Default)]
pub struct Shape {
    /// Accepted node kinds (empty = any)
    pub kinds: Vec<SyntaxKind>,

    /// Every attribute test must pass
    pub attrs: Vec<Attr>,

    /// Each sub-shape must match some direct child node
    pub children: Vec<Shape>,
}

impl Shape {
    pub fn of(kinds: &[SyntaxKind]) -> Self {
        Self {
            kinds: kinds.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, attr: Attr) -> Self {
        self.attrs.push(attr);
        self
    }

    pub fn with_child(mut self, child: Shape) -> Self {
        self.children.push(child);
        self
    }

    pub fn matches(&self, node: &SyntaxNode) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&node.kind()))
            && self.attrs.iter().all(|a| a.matches(node))
            && self
                .children
                .iter()
                .all(|shape| node.child_nodes().any(|child| shape.matches(child)))
    }
}

/// A match reported by a rule, positioned relative to the matched node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    /// Sub-range to report; `None` reports the whole node
    pub range: Option<TextRange>,
    pub message: String,
    pub suggestion: Option<String>,
    pub category: FindingCategory,
}

impl Hit {
    pub fn deprecation(message: impl Into<String>) -> Self {
        Self {
            range: None,
            message: message.into(),
            suggestion: None,
            category: FindingCategory::Deprecation,
        }
    }

    /// A partial match that needs a human
    pub fn manual(message: impl Into<String>) -> Self {
        Self {
            category: FindingCategory::ManualMigration,
            ..Self::deprecation(message)
        }
    }

    pub fn at(mut self, range: TextRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Child-index correspondence between a matched node and its replacement
///
/// `old` children of the matched node were replaced by `new` children of the
/// replacement; children outside the spliced ranges are kept in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    pub old: Range<usize>,
    pub new: Range<usize>,
}

/// Replacement produced by a rewrite rule
#[derive(Debug, Clone)]
pub struct Rewrite {
    pub replacement: Arc<SyntaxNode>,
    pub description: String,
    /// Empty when the whole node was replaced
    pub splices: Vec<Splice>,
}

impl Rewrite {
    pub fn whole(replacement: Arc<SyntaxNode>, description: impl Into<String>) -> Self {
        Self {
            replacement,
            description: description.into(),
            splices: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RewriteOutcome {
    /// The rule does not apply
    NoMatch,
    /// The rule applies but cannot rewrite safely
    Manual(Hit),
    Rewrite(Rewrite),
}

pub type FindFn = dyn Fn(&SyntaxNode) -> Vec<Hit> + Send + Sync;
pub type RewriteFn = dyn Fn(&SyntaxNode) -> RewriteOutcome + Send + Sync;

/// Rule that reports findings
pub struct FindingRule {
    pub meta: RuleMeta,
    pub shape: Shape,
    find: Box<FindFn>,
}

impl FindingRule {
    pub fn new(
        meta: RuleMeta,
        shape: Shape,
        find: impl Fn(&SyntaxNode) -> Vec<Hit> + Send + Sync + 'static,
    ) -> Self {
        Self {
            meta,
            shape,
            find: Box::new(find),
        }
    }

    pub fn check(&self, node: &SyntaxNode) -> Vec<Hit> {
        if !self.shape.matches(node) {
            return Vec::new();
        }
        (self.find)(node)
    }
}

impl fmt::Debug for FindingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindingRule")
            .field("meta", &self.meta)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// Rule that rewrites the tree
pub struct RewriteRule {
    pub meta: RuleMeta,
    pub shape: Shape,
    apply: Box<RewriteFn>,
}

impl RewriteRule {
    pub fn new(
        meta: RuleMeta,
        shape: Shape,
        apply: impl Fn(&SyntaxNode) -> RewriteOutcome + Send + Sync + 'static,
    ) -> Self {
        Self {
            meta,
            shape,
            apply: Box::new(apply),
        }
    }

    pub fn apply(&self, node: &SyntaxNode) -> RewriteOutcome {
        if !self.shape.matches(node) {
            return RewriteOutcome::NoMatch;
        }
        (self.apply)(node)
    }
}

impl fmt::Debug for RewriteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewriteRule")
            .field("meta", &self.meta)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// Either variant of a rule
#[derive(Debug)]
pub enum Rule {
    Finding(FindingRule),
    Rewrite(RewriteRule),
}

impl Rule {
    pub fn meta(&self) -> &RuleMeta {
        match self {
            Rule::Finding(rule) => &rule.meta,
            Rule::Rewrite(rule) => &rule.meta,
        }
    }

    pub fn id(&self) -> &str {
        &self.meta().id
    }

    pub fn is_rewrite(&self) -> bool {
        matches!(self, Rule::Rewrite(_))
    }
}
