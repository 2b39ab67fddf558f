//! Removed or risky constructs that only get reported

use crate::diagnostic::Severity;
use crate::rule::{Attr, FindingRule, Hit, NameMatcher, RuleMeta, Shape};
use crate::syntax::python;
use crate::syntax::{SyntaxKind, SyntaxNode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a construct rule looks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstructMatch {
    /// Calls whose callee name matches one of these globs
    Call(Vec<String>),
    /// Imports of a package or anything below it
    ImportPrefix(String),
    /// Decorators with one of these names
    Decorator(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstructRule {
    /// Rule identifier (e.g., "AF401")
    pub id: String,

    /// Short kebab-case name
    pub name: String,

    #[serde(rename = "match")]
    pub matches: ConstructMatch,

    pub message: String,

    #[serde(default)]
    pub suggestion: Option<String>,

    #[serde(default = "default_severity")]
    pub severity: Severity,

    #[serde(default)]
    pub since: Option<String>,
}

fn default_severity() -> Severity {
    Severity::Warning
}

struct Matcher {
    rule: ConstructRule,
    /// Module paths handled by an import mapping
    covered: Vec<String>,
}

impl ConstructRule {
    pub fn new(id: &str, name: &str, matches: ConstructMatch, message: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            matches,
            message: message.to_string(),
            suggestion: None,
            severity: default_severity(),
            since: None,
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn suggestion(mut self, suggestion: &str) -> Self {
        self.suggestion = Some(suggestion.to_string());
        self
    }

    pub fn meta(&self) -> RuleMeta {
        RuleMeta::new(&self.id, &self.name, self.severity)
            .with_summary(self.message.clone())
            .with_since(self.since.clone())
    }

    /// Finding rule; `covered` lists module paths an import mapping already
    /// handles
    pub fn rule(self, covered: Vec<String>) -> Result<FindingRule, globset::Error> {
        let meta = self.meta();
        let shape = match &self.matches {
            ConstructMatch::Call(names) => {
                Shape::of(&[SyntaxKind::Call]).with_attr(Attr::Callee(NameMatcher::new(names)?))
            }
            ConstructMatch::Decorator(names) => Shape::of(&[SyntaxKind::Decorator])
                .with_attr(Attr::Decorator(NameMatcher::new(names)?)),
            ConstructMatch::ImportPrefix(prefix) => Shape::of(&[
                SyntaxKind::ImportStatement,
                SyntaxKind::ImportFromStatement,
            ])
            .with_attr(Attr::ImportsUnder(prefix.clone())),
        };
        let matcher = Arc::new(Matcher {
            rule: self,
            covered,
        });
        Ok(FindingRule::new(meta, shape, move |node| matcher.find(node)))
    }
}

impl Matcher {
    fn find(&self, node: &SyntaxNode) -> Vec<Hit> {
        if let ConstructMatch::ImportPrefix(_) = &self.rule.matches {
            let handled = python::import(node).is_some_and(|import| {
                import
                    .mentioned_modules()
                    .iter()
                    .any(|m| self.covered.contains(m))
            });
            if handled {
                return Vec::new();
            }
        }

        let subject = match &self.rule.matches {
            ConstructMatch::Call(_) => python::callee(node).map(|c| c.path),
            ConstructMatch::Decorator(_) => python::decorator_name(node).map(|c| c.path),
            ConstructMatch::ImportPrefix(_) => python::import(node).and_then(|i| {
                i.mentioned_modules().into_iter().next()
            }),
        };
        let message = match subject {
            Some(subject) => format!("`{}`: {}", subject, self.rule.message),
            None => self.rule.message.clone(),
        };
        let hit = Hit::deprecation(message);
        vec![match &self.rule.suggestion {
            Some(suggestion) => hit.with_suggestion(suggestion.clone()),
            None => hit,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadline::Deadline;
    use crate::syntax::PythonParser;

    fn parse(text: &str) -> Arc<SyntaxNode> {
        PythonParser::new().parse(text, &Deadline::none()).unwrap()
    }

    fn collect(rule: &FindingRule, node: &Arc<SyntaxNode>, out: &mut Vec<Hit>) {
        out.extend(rule.check(node));
        for child in node.child_nodes() {
            collect(rule, child, out);
        }
    }

    fn hits(rule: &FindingRule, text: &str) -> Vec<Hit> {
        let mut out = Vec::new();
        collect(rule, &parse(text), &mut out);
        out
    }

    fn build(rule: ConstructRule, covered: &[&str]) -> FindingRule {
        rule.rule(covered.iter().map(|c| c.to_string()).collect())
            .unwrap()
    }

    #[test]
    fn test_call_construct() {
        let rule = build(
            ConstructRule::new(
                "AF401",
                "subdag-operator",
                ConstructMatch::Call(vec!["SubDagOperator".into()]),
                "SubDagOperator is removed; use TaskGroup",
            )
            .severity(Severity::Error),
            &[],
        );
        let found = hits(&rule, "section = SubDagOperator(task_id='s', subdag=sub())\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "`SubDagOperator`: SubDagOperator is removed; use TaskGroup");
    }

    #[test]
    fn test_decorator_construct() {
        let rule = build(
            ConstructRule::new(
                "AF403",
                "apply-defaults",
                ConstructMatch::Decorator(vec!["apply_defaults".into()]),
                "no longer needed",
            ),
            &[],
        );
        let text = "class Op(BaseOperator):\n    @apply_defaults\n    def __init__(self):\n        pass\n";
        assert_eq!(hits(&rule, text).len(), 1);
        assert!(hits(&rule, "@staticmethod\ndef f():\n    pass\n").is_empty());
    }

    #[test]
    fn test_import_prefix_skips_covered_modules() {
        let rule = build(
            ConstructRule::new(
                "AF402",
                "contrib-import",
                ConstructMatch::ImportPrefix("airflow.contrib".into()),
                "airflow.contrib was removed",
            ),
            &["airflow.contrib.operators.ssh_operator"],
        );
        assert!(hits(&rule, "from airflow.contrib.operators.ssh_operator import SSHOperator\n").is_empty());
        assert!(hits(&rule, "from airflow.contrib.operators import ssh_operator\n").is_empty());
        assert_eq!(
            hits(&rule, "from airflow.contrib.sensors.file_sensor import FileSensor\n").len(),
            1
        );
        assert_eq!(hits(&rule, "import airflow.contrib\n").len(), 1);
        assert!(hits(&rule, "from airflow.contribution import x\n").is_empty());
    }

    #[test]
    fn test_deserialize_construct() {
        let yaml = "id: AF490\nname: legacy-sensor\nmatch:\n  call: ['Legacy*']\nmessage: gone\n";
        let rule: ConstructRule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.matches, ConstructMatch::Call(vec!["Legacy*".into()]));
        assert_eq!(rule.severity, Severity::Warning);
    }
}
