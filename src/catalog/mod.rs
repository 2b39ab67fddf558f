//! Pattern catalog: the versioned set of migration rules
//!
//! Rules come from declarative tables (built-in, optionally extended by
//! configuration). Each table entry yields a finding rule and, where a safe
//! rewrite exists, a rewrite rule with the same id. The catalog is validated
//! once at startup and is read-only afterwards.

pub mod builtin;
pub mod constructs;
pub mod dag_context;
pub mod imports;
pub mod params;

use crate::diagnostic::{codes, Severity};
use crate::rule::{FindingRule, NameMatcher, RewriteRule, RuleMeta};
use crate::syntax::python;
use log::debug;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;
use thiserror::Error;

pub use constructs::{ConstructMatch, ConstructRule};
pub use dag_context::DagContextRule;
pub use imports::ImportMapping;
pub use params::{ParamAction, ParamMapping};

/// Identifier of the built-in migration catalog
pub const CATALOG_VERSION: &str = "airflow-1.10-to-2";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid rule id `{0}`: expected uppercase letters followed by three digits")]
    InvalidId(String),

    #[error("rule id `{0}` is reserved for engine diagnostics")]
    ReservedId(String),

    #[error("duplicate {variant} rule id `{id}`")]
    DuplicateId { variant: &'static str, id: String },

    #[error("rule {id}: {message}")]
    InvalidEntry { id: String, message: String },

    #[error("rule {id}: `{path}` is mapped to itself")]
    SelfMapping { id: String, path: String },

    #[error("mapping cycle: {0}")]
    Cycle(String),

    #[error("rule {id}: invalid name pattern: {source}")]
    Pattern {
        id: String,
        #[source]
        source: globset::Error,
    },
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]{2,}[0-9]{3}$").expect("valid rule id pattern"))
}

/// Rule listing entry
#[derive(Debug, Clone, Copy)]
pub struct RuleInfo<'a> {
    pub meta: &'a RuleMeta,
    /// Has a finding variant
    pub reports: bool,
    /// Has a rewrite variant
    pub rewrites: bool,
}

/// Validated, immutable rule set
#[derive(Debug)]
pub struct PatternCatalog {
    version: String,
    finding: Vec<FindingRule>,
    rewrite: Vec<RewriteRule>,
}

impl PatternCatalog {
    /// Built-in rules with no configuration applied
    pub fn builtin() -> Result<Self, CatalogError> {
        CatalogBuilder::builtin().build()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Finding rules in ascending id order
    pub fn finding_rules(&self) -> &[FindingRule] {
        &self.finding
    }

    /// Rewrite rules in ascending id order
    pub fn rewrite_rules(&self) -> &[RewriteRule] {
        &self.rewrite
    }

    pub fn len(&self) -> usize {
        self.rules().len()
    }

    pub fn is_empty(&self) -> bool {
        self.finding.is_empty() && self.rewrite.is_empty()
    }

    /// One entry per rule id, in ascending id order
    pub fn rules(&self) -> Vec<RuleInfo<'_>> {
        let mut infos: BTreeMap<&str, RuleInfo<'_>> = BTreeMap::new();
        for rule in &self.finding {
            infos.insert(
                &rule.meta.id,
                RuleInfo {
                    meta: &rule.meta,
                    reports: true,
                    rewrites: false,
                },
            );
        }
        for rule in &self.rewrite {
            infos
                .entry(&rule.meta.id)
                .or_insert(RuleInfo {
                    meta: &rule.meta,
                    reports: false,
                    rewrites: false,
                })
                .rewrites = true;
        }
        infos.into_values().collect()
    }

    pub fn rule(&self, id: &str) -> Option<RuleInfo<'_>> {
        self.rules().into_iter().find(|r| r.meta.id.eq_ignore_ascii_case(id))
    }

    #[cfg(test)]
    pub(crate) fn with_rewrite_rule(mut self, rule: RewriteRule) -> Self {
        self.rewrite.push(rule);
        self.rewrite.sort_by(|a, b| a.meta.id.cmp(&b.meta.id));
        self
    }

    #[cfg(test)]
    pub(crate) fn with_finding_rule(mut self, rule: FindingRule) -> Self {
        self.finding.push(rule);
        self.finding.sort_by(|a, b| a.meta.id.cmp(&b.meta.id));
        self
    }
}

/// Assembles and validates a [`PatternCatalog`]
#[derive(Debug, Clone, Default)]
pub struct CatalogBuilder {
    version: String,
    imports: Vec<ImportMapping>,
    params: Vec<ParamMapping>,
    constructs: Vec<ConstructRule>,
    dag_context: Option<DagContextRule>,
    disabled: Vec<String>,
    selected: Vec<String>,
    severity: HashMap<String, Severity>,
}

impl CatalogBuilder {
    /// Empty catalog
    pub fn new() -> Self {
        Self {
            version: CATALOG_VERSION.to_string(),
            ..Default::default()
        }
    }

    /// Built-in tables
    pub fn builtin() -> Self {
        Self {
            imports: builtin::import_mappings(),
            params: builtin::param_mappings(),
            constructs: builtin::construct_rules(),
            dag_context: Some(builtin::dag_context()),
            ..Self::new()
        }
    }

    /// Add an import mapping, replacing a table entry with the same id
    pub fn import(mut self, mapping: ImportMapping) -> Self {
        self.imports.retain(|m| m.id != mapping.id);
        self.imports.push(mapping);
        self
    }

    /// Add a parameter mapping, replacing a table entry with the same id
    pub fn parameter(mut self, mapping: ParamMapping) -> Self {
        self.params.retain(|m| m.id != mapping.id);
        self.params.push(mapping);
        self
    }

    /// Add a construct rule, replacing a table entry with the same id
    pub fn construct(mut self, rule: ConstructRule) -> Self {
        self.constructs.retain(|r| r.id != rule.id);
        self.constructs.push(rule);
        self
    }

    pub fn dag_context(mut self, rule: Option<DagContextRule>) -> Self {
        self.dag_context = rule;
        self
    }

    /// Disable rules by id or id prefix (e.g. "AF2")
    pub fn disable<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Keep only rules matching these ids or id prefixes
    pub fn select<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn severity(mut self, id: &str, severity: Severity) -> Self {
        self.severity.insert(id.to_string(), severity);
        self
    }

    fn is_enabled(&self, id: &str) -> bool {
        let matches = |pattern: &String| id.starts_with(pattern.as_str());
        !self.disabled.iter().any(matches)
            && (self.selected.is_empty() || self.selected.iter().any(matches))
    }

    fn override_severity(&self, mut meta: RuleMeta) -> RuleMeta {
        if let Some(severity) = self.severity.get(&meta.id) {
            meta.severity = *severity;
        }
        meta
    }

    /// Validate every table and compile the rules
    pub fn build(self) -> Result<PatternCatalog, CatalogError> {
        self.validate()?;

        let covered: Vec<String> = self.imports.iter().map(|m| m.from.clone()).collect();
        let mut finding = Vec::new();
        let mut rewrite = Vec::new();

        for mapping in &self.imports {
            if !self.is_enabled(&mapping.id) {
                continue;
            }
            let mut mapping = mapping.clone();
            mapping.severity = self.override_severity(mapping.meta()).severity;
            let (f, r) = mapping.rules();
            finding.push(f);
            rewrite.push(r);
        }

        for mapping in &self.params {
            if !self.is_enabled(&mapping.id) {
                continue;
            }
            let callees = NameMatcher::new(&mapping.callees).map_err(|source| {
                CatalogError::Pattern {
                    id: mapping.id.clone(),
                    source,
                }
            })?;
            let mut mapping = mapping.clone();
            mapping.severity = self.override_severity(mapping.meta()).severity;
            let (f, r) = mapping.rules(callees);
            finding.push(f);
            rewrite.push(r);
        }

        for rule in &self.constructs {
            if !self.is_enabled(&rule.id) {
                continue;
            }
            let mut rule = rule.clone();
            rule.severity = self.override_severity(rule.meta()).severity;
            let id = rule.id.clone();
            let compiled = rule
                .rule(covered.clone())
                .map_err(|source| CatalogError::Pattern { id, source })?;
            finding.push(compiled);
        }

        if let Some(context) = &self.dag_context {
            if self.is_enabled(&context.id) {
                let callees = NameMatcher::new(&context.callees).map_err(|source| {
                    CatalogError::Pattern {
                        id: context.id.clone(),
                        source,
                    }
                })?;
                let mut context = context.clone();
                context.severity = self.override_severity(context.meta()).severity;
                let (f, r) = context.rules(callees);
                finding.push(f);
                rewrite.push(r);
            }
        }

        finding.sort_by(|a, b| a.meta.id.cmp(&b.meta.id));
        rewrite.sort_by(|a, b| a.meta.id.cmp(&b.meta.id));
        check_unique("finding", finding.iter().map(|r| &r.meta.id))?;
        check_unique("rewrite", rewrite.iter().map(|r| &r.meta.id))?;

        debug!(
            "catalog {}: {} finding rules, {} rewrite rules",
            self.version,
            finding.len(),
            rewrite.len()
        );

        Ok(PatternCatalog {
            version: self.version,
            finding,
            rewrite,
        })
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let ids = self
            .imports
            .iter()
            .map(|m| &m.id)
            .chain(self.params.iter().map(|m| &m.id))
            .chain(self.constructs.iter().map(|r| &r.id))
            .chain(self.dag_context.iter().map(|r| &r.id));
        for id in ids {
            if !id_pattern().is_match(id) {
                return Err(CatalogError::InvalidId(id.clone()));
            }
            if codes::is_reserved(id) {
                return Err(CatalogError::ReservedId(id.clone()));
            }
        }

        for mapping in &self.imports {
            let invalid = |message: String| CatalogError::InvalidEntry {
                id: mapping.id.clone(),
                message,
            };
            for path in [&mapping.from, &mapping.to] {
                if !python::is_dotted_path(path) {
                    return Err(invalid(format!("`{}` is not a dotted module path", path)));
                }
            }
            if mapping.from == mapping.to {
                return Err(CatalogError::SelfMapping {
                    id: mapping.id.clone(),
                    path: mapping.from.clone(),
                });
            }
            for (old, new) in &mapping.renames {
                if !python::is_identifier(old) || !python::is_identifier(new) {
                    return Err(invalid(format!("invalid rename `{}` -> `{}`", old, new)));
                }
                if old == new {
                    return Err(CatalogError::SelfMapping {
                        id: mapping.id.clone(),
                        path: old.clone(),
                    });
                }
            }
        }

        for mapping in &self.params {
            let invalid = |message: String| CatalogError::InvalidEntry {
                id: mapping.id.clone(),
                message,
            };
            if mapping.callees.is_empty() {
                return Err(invalid("no callees given".to_string()));
            }
            if !python::is_identifier(&mapping.param) {
                return Err(invalid(format!("`{}` is not a valid keyword", mapping.param)));
            }
            if let ParamAction::Rename(to) = &mapping.action {
                if !python::is_identifier(to) {
                    return Err(invalid(format!("`{}` is not a valid keyword", to)));
                }
                if to == &mapping.param {
                    return Err(CatalogError::SelfMapping {
                        id: mapping.id.clone(),
                        path: to.clone(),
                    });
                }
            }
        }

        for rule in &self.constructs {
            let empty = match &rule.matches {
                ConstructMatch::Call(names) | ConstructMatch::Decorator(names) => names.is_empty(),
                ConstructMatch::ImportPrefix(prefix) => !python::is_dotted_path(prefix),
            };
            if empty {
                return Err(CatalogError::InvalidEntry {
                    id: rule.id.clone(),
                    message: "match pattern is empty or invalid".to_string(),
                });
            }
        }

        find_cycle(self.imports.iter().map(|m| (m.from.as_str(), m.to.as_str())))?;
        find_cycle(self.params.iter().filter_map(|m| match &m.action {
            ParamAction::Rename(to) => Some((m.param.as_str(), to.as_str())),
            _ => None,
        }))?;

        Ok(())
    }
}

fn check_unique<'a>(
    variant: &'static str,
    ids: impl Iterator<Item = &'a String>,
) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(CatalogError::DuplicateId {
                variant,
                id: id.clone(),
            });
        }
    }
    Ok(())
}

/// Reject `a -> b -> ... -> a` chains
fn find_cycle<'a>(edges: impl Iterator<Item = (&'a str, &'a str)>) -> Result<(), CatalogError> {
    let graph: HashMap<&str, &str> = edges.collect();
    for &start in graph.keys() {
        let mut chain = vec![start];
        let mut current = start;
        while let Some(&next) = graph.get(current) {
            if next == start {
                chain.push(next);
                return Err(CatalogError::Cycle(chain.join(" -> ")));
            }
            if chain.contains(&next) {
                // a cycle not through `start`; reported when its own members are visited
                break;
            }
            chain.push(next);
            current = next;
        }
    }
    Ok(())
}
