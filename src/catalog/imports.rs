//! Import path migrations

use crate::diagnostic::Severity;
use crate::rule::{Attr, FindingRule, Hit, Rewrite, RewriteOutcome, RewriteRule, RuleMeta, Shape};
use crate::syntax::python::{self, FromImport, Import, ImportedModule};
use crate::syntax::{SyntaxKind, SyntaxNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One module that moved, optionally with renamed symbols
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportMapping {
    /// Rule identifier (e.g., "AF101")
    pub id: String,

    /// Short kebab-case name
    #[serde(default)]
    pub name: Option<String>,

    /// Deprecated module path
    pub from: String,

    /// Replacement module path
    pub to: String,

    /// Symbols renamed by the move (old name -> new name)
    #[serde(default)]
    pub renames: BTreeMap<String, String>,

    #[serde(default = "default_severity")]
    pub severity: Severity,

    /// Framework version that deprecated the old path
    #[serde(default)]
    pub since: Option<String>,
}

fn default_severity() -> Severity {
    Severity::Warning
}

/// What a mapping makes of one import statement
#[derive(Debug)]
pub(crate) enum ImportAnalysis {
    NoMatch,
    Fixable(Arc<SyntaxNode>),
    Manual(Hit),
}

impl ImportMapping {
    pub fn new(id: &str, from: &str, to: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            from: from.to_string(),
            to: to.to_string(),
            renames: BTreeMap::new(),
            severity: default_severity(),
            since: None,
        }
    }

    pub fn rename(mut self, old: &str, new: &str) -> Self {
        self.renames.insert(old.to_string(), new.to_string());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
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
            .unwrap_or_else(|| format!("import-{}", self.from.replace(['.', '_'], "-")));
        let mut summary = format!("`{}` moved to `{}`", self.from, self.to);
        for (old, new) in &self.renames {
            summary.push_str(&format!("; `{}` is now `{}`", old, new));
        }
        RuleMeta::new(&self.id, &name, self.severity)
            .with_summary(summary)
            .with_since(self.since.clone())
    }

    fn shape(&self) -> Shape {
        Shape::of(&[SyntaxKind::ImportStatement, SyntaxKind::ImportFromStatement])
            .with_attr(Attr::ImportsModule(self.from.clone()))
    }

    /// Finding and rewrite rule for this mapping
    pub fn rules(self) -> (FindingRule, RewriteRule) {
        let meta = self.meta();
        let shape = self.shape();
        let mapping = Arc::new(self);
        let for_find = Arc::clone(&mapping);
        let finding = FindingRule::new(meta.clone(), shape.clone(), move |node| {
            for_find.find(node)
        });
        let rewrite = RewriteRule::new(meta, shape, move |node| mapping.rewrite(node));
        (finding, rewrite)
    }

    pub(crate) fn find(&self, stmt: &SyntaxNode) -> Vec<Hit> {
        match self.analyze(stmt) {
            ImportAnalysis::NoMatch => Vec::new(),
            ImportAnalysis::Manual(hit) => vec![hit],
            ImportAnalysis::Fixable(replacement) => vec![Hit::deprecation(format!(
                "`{}` is deprecated; import from `{}`",
                self.from, self.to
            ))
            .with_suggestion(replacement.render())],
        }
    }

    pub(crate) fn rewrite(&self, stmt: &SyntaxNode) -> RewriteOutcome {
        match self.analyze(stmt) {
            ImportAnalysis::NoMatch => RewriteOutcome::NoMatch,
            ImportAnalysis::Manual(hit) => RewriteOutcome::Manual(hit),
            ImportAnalysis::Fixable(replacement) => {
                RewriteOutcome::Rewrite(Rewrite::whole(replacement, self.description(stmt)))
            }
        }
    }

    fn description(&self, stmt: &SyntaxNode) -> String {
        let mut description = format!("import from `{}` instead of `{}`", self.to, self.from);
        if let Some(Import::From(from)) = python::import(stmt) {
            for name in &from.names {
                if let Some(new) = self.renames.get(&name.name) {
                    description.push_str(&format!("; `{}` is now `{}`", name.name, new));
                }
            }
        }
        description
    }

    pub(crate) fn analyze(&self, stmt: &SyntaxNode) -> ImportAnalysis {
        match python::import(stmt) {
            Some(Import::From(from)) => self.analyze_from(stmt, &from),
            Some(Import::Plain(modules)) => self.analyze_plain(stmt, &modules),
            None => ImportAnalysis::NoMatch,
        }
    }

    fn analyze_from(&self, stmt: &SyntaxNode, from: &FromImport<'_>) -> ImportAnalysis {
        if from.relative {
            return ImportAnalysis::NoMatch;
        }

        if from.module != self.from {
            let by_name = from
                .names
                .iter()
                .find(|n| format!("{}.{}", from.module, n.name) == self.from);
            return match by_name {
                Some(name) => ImportAnalysis::Manual(Hit::manual(format!(
                    "`{}` is imported as a module object from `{}`; import from `{}` and update references by hand",
                    name.name, from.module, self.to
                ))),
                None => ImportAnalysis::NoMatch,
            };
        }

        if from.wildcard && !self.renames.is_empty() {
            let renamed: Vec<String> = self
                .renames
                .iter()
                .map(|(old, new)| format!("`{}` -> `{}`", old, new))
                .collect();
            return ImportAnalysis::Manual(Hit::manual(format!(
                "wildcard import from `{}` cannot be rewritten because symbols were renamed ({}); import the names explicitly from `{}`",
                self.from,
                renamed.join(", "),
                self.to
            )));
        }

        let mut children = stmt.children().to_vec();
        children[from.module_index] = python::dotted_name(&self.to).into();
        for name in &from.names {
            let Some(new) = self.renames.get(&name.name) else {
                continue;
            };
            // keep the old local binding so later references stay valid
            let local = name.alias.as_deref().unwrap_or(&name.name);
            children[name.index] = if local == new {
                python::dotted_name(new).into()
            } else {
                python::aliased_import(new, local).into()
            };
        }
        ImportAnalysis::Fixable(Arc::new(stmt.with_children(children)))
    }

    fn analyze_plain(&self, stmt: &SyntaxNode, modules: &[ImportedModule<'_>]) -> ImportAnalysis {
        let matching: Vec<&ImportedModule<'_>> =
            modules.iter().filter(|m| m.path == self.from).collect();
        if matching.is_empty() {
            return ImportAnalysis::NoMatch;
        }

        if let Some(bare) = matching.iter().find(|m| m.alias.is_none()) {
            return ImportAnalysis::Manual(Hit::manual(format!(
                "`import {}` binds the dotted path; change it to `import {}` and update every `{}.` reference by hand",
                bare.path, self.to, bare.path
            )));
        }
        if !self.renames.is_empty() {
            return ImportAnalysis::Manual(Hit::manual(format!(
                "symbols of `{}` are accessed through a module alias but were renamed; update attribute references by hand",
                self.from
            )));
        }

        let mut children = stmt.children().to_vec();
        for module in matching {
            if let Some(alias) = &module.alias {
                children[module.index] = python::aliased_import(&self.to, alias).into();
            }
        }
        ImportAnalysis::Fixable(Arc::new(stmt.with_children(children)))
    }
}
