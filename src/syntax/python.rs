//! Python-specific views and builders over [`SyntaxNode`]

use super::{SyntaxElement, SyntaxKind, SyntaxNode, SyntaxToken};
use std::sync::Arc;

/// Text of an identifier leaf
pub fn identifier_text(node: &SyntaxNode) -> Option<&str> {
    if !node.is(SyntaxKind::Identifier) {
        return None;
    }
    node.children().first()?.as_token().map(SyntaxToken::as_str)
}

/// Name a call is made through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callee {
    /// Full dotted path as written, e.g. `models.DAG`
    pub path: String,
    /// Last segment, e.g. `DAG`
    pub name: String,
}

/// Callee of a call node, when it is a plain or dotted name
pub fn callee(call: &SyntaxNode) -> Option<Callee> {
    if !call.is(SyntaxKind::Call) {
        return None;
    }
    let function = call.child_nodes().next()?;
    name_of(function)
}

/// Identifier or attribute chain spelled by `node`
pub fn name_of(node: &SyntaxNode) -> Option<Callee> {
    match node.kind() {
        SyntaxKind::Identifier | SyntaxKind::Attribute | SyntaxKind::DottedName => {
            let path = node.significant_text();
            let name = path.rsplit('.').next().unwrap_or(&path).to_string();
            Some(Callee { path, name })
        }
        _ => None,
    }
}

/// Argument list of a call and its child index
pub fn arguments(call: &SyntaxNode) -> Option<(usize, &Arc<SyntaxNode>)> {
    call.indexed_child_nodes()
        .find(|(_, n)| n.is(SyntaxKind::ArgumentList))
}

/// `name=value` argument
#[derive(Debug, Clone)]
pub struct KeywordArg<'a> {
    /// Index of the keyword argument in the argument list children
    pub index: usize,
    pub name: &'a str,
    pub node: &'a Arc<SyntaxNode>,
}

pub fn keyword_args(list: &SyntaxNode) -> Vec<KeywordArg<'_>> {
    list.indexed_child_nodes()
        .filter(|(_, n)| n.is(SyntaxKind::KeywordArgument))
        .filter_map(|(index, node)| {
            let name = node.child_nodes().next().and_then(|n| identifier_text(n))?;
            Some(KeywordArg { index, name, node })
        })
        .collect()
}

pub fn keyword_arg<'a>(list: &'a SyntaxNode, name: &str) -> Option<KeywordArg<'a>> {
    keyword_args(list).into_iter().find(|k| k.name == name)
}

/// Positional arguments with their child index
pub fn positional_args(list: &SyntaxNode) -> Vec<(usize, &Arc<SyntaxNode>)> {
    list.indexed_child_nodes()
        .filter(|(_, n)| {
            !matches!(
                n.kind(),
                SyntaxKind::KeywordArgument | SyntaxKind::ListSplat | SyntaxKind::DictionarySplat
            )
        })
        .collect()
}

/// Whether the list unpacks a mapping with `**`
pub fn has_dict_splat(list: &SyntaxNode) -> bool {
    list.child_nodes().any(|n| n.is(SyntaxKind::DictionarySplat))
}

/// Whether the list unpacks a sequence with `*`
pub fn has_list_splat(list: &SyntaxNode) -> bool {
    list.child_nodes().any(|n| n.is(SyntaxKind::ListSplat))
}

/// `name` imported by a from-import, possibly aliased
#[derive(Debug, Clone)]
pub struct ImportedName<'a> {
    pub index: usize,
    pub name: String,
    pub alias: Option<String>,
    pub node: &'a Arc<SyntaxNode>,
}

/// Module bound by a plain `import`
#[derive(Debug, Clone)]
pub struct ImportedModule<'a> {
    pub index: usize,
    pub path: String,
    pub alias: Option<String>,
    pub node: &'a Arc<SyntaxNode>,
}

#[derive(Debug, Clone)]
pub struct FromImport<'a> {
    pub module: String,
    /// Child index of the module name
    pub module_index: usize,
    pub relative: bool,
    pub wildcard: bool,
    pub names: Vec<ImportedName<'a>>,
}

#[derive(Debug, Clone)]
pub enum Import<'a> {
    From(FromImport<'a>),
    Plain(Vec<ImportedModule<'a>>),
}

impl Import<'_> {
    /// Every module path the statement refers to
    ///
    /// For `from a.b import c` this is `a.b` and `a.b.c`, since `c` may be a
    /// submodule.
    pub fn mentioned_modules(&self) -> Vec<String> {
        match self {
            Import::From(from) if from.relative => Vec::new(),
            Import::From(from) => {
                let mut modules = vec![from.module.clone()];
                modules.extend(
                    from.names
                        .iter()
                        .map(|n| format!("{}.{}", from.module, n.name)),
                );
                modules
            }
            Import::Plain(modules) => modules.iter().map(|m| m.path.clone()).collect(),
        }
    }
}

/// Decompose an import statement
pub fn import(stmt: &SyntaxNode) -> Option<Import<'_>> {
    match stmt.kind() {
        SyntaxKind::ImportFromStatement => {
            let mut nodes = stmt.indexed_child_nodes();
            let (module_index, module) = nodes.next()?;
            let relative = module.is(SyntaxKind::RelativeImport);
            let mut wildcard = false;
            let mut names = Vec::new();
            for (index, node) in nodes {
                match node.kind() {
                    SyntaxKind::WildcardImport => wildcard = true,
                    SyntaxKind::DottedName => names.push(ImportedName {
                        index,
                        name: node.significant_text(),
                        alias: None,
                        node,
                    }),
                    SyntaxKind::AliasedImport => {
                        let (name, alias) = split_alias(node)?;
                        names.push(ImportedName {
                            index,
                            name,
                            alias: Some(alias),
                            node,
                        });
                    }
                    _ => {}
                }
            }
            Some(Import::From(FromImport {
                module: module.significant_text(),
                module_index,
                relative,
                wildcard,
                names,
            }))
        }
        SyntaxKind::ImportStatement => {
            let modules = stmt
                .indexed_child_nodes()
                .filter_map(|(index, node)| match node.kind() {
                    SyntaxKind::DottedName => Some(ImportedModule {
                        index,
                        path: node.significant_text(),
                        alias: None,
                        node,
                    }),
                    SyntaxKind::AliasedImport => {
                        let (path, alias) = split_alias(node)?;
                        Some(ImportedModule {
                            index,
                            path,
                            alias: Some(alias),
                            node,
                        })
                    }
                    _ => None,
                })
                .collect();
            Some(Import::Plain(modules))
        }
        _ => None,
    }
}

fn split_alias(node: &SyntaxNode) -> Option<(String, String)> {
    let mut parts = node.child_nodes();
    let name = parts.next()?.significant_text();
    let alias = parts.next()?.significant_text();
    Some((name, alias))
}

/// Name a decorator applies, ignoring call arguments, e.g. `apply_defaults`
pub fn decorator_name(decorator: &SyntaxNode) -> Option<Callee> {
    if !decorator.is(SyntaxKind::Decorator) {
        return None;
    }
    let expr = decorator.child_nodes().next()?;
    if expr.is(SyntaxKind::Call) {
        callee(expr)
    } else {
        name_of(expr)
    }
}

/// Target and value of `target = value` when the target is a single name
pub fn simple_assignment(assignment: &SyntaxNode) -> Option<(&str, &Arc<SyntaxNode>)> {
    if !assignment.is(SyntaxKind::Assignment) {
        return None;
    }
    let mut parts = assignment.child_nodes();
    let target = identifier_text(parts.next()?)?;
    let value = parts.next()?;
    Some((target, value))
}

/// Single expression wrapped by an expression statement
pub fn statement_expression(stmt: &SyntaxNode) -> Option<&Arc<SyntaxNode>> {
    if !stmt.is(SyntaxKind::ExpressionStatement) {
        return None;
    }
    let mut nodes = stmt.child_nodes();
    let expr = nodes.next()?;
    nodes.next().is_none().then_some(expr)
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        && !is_keyword(name)
}

pub fn is_dotted_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(is_identifier)
}

fn is_keyword(name: &str) -> bool {
    matches!(
        name,
        "False" | "None" | "True" | "and" | "as" | "assert" | "async" | "await" | "break"
            | "class" | "continue" | "def" | "del" | "elif" | "else" | "except" | "finally"
            | "for" | "from" | "global" | "if" | "import" | "in" | "is" | "lambda"
            | "nonlocal" | "not" | "or" | "pass" | "raise" | "return" | "try" | "while"
            | "with" | "yield"
    )
}

pub fn text(text: &str) -> SyntaxElement {
    SyntaxToken::text(text).into()
}

pub fn space(text: &str) -> SyntaxElement {
    SyntaxToken::whitespace(text).into()
}

pub fn identifier(name: &str) -> Arc<SyntaxNode> {
    Arc::new(SyntaxNode::leaf(SyntaxKind::Identifier, name))
}

/// `a.b.c` as a dotted-name node
pub fn dotted_name(path: &str) -> Arc<SyntaxNode> {
    let mut children = Vec::new();
    for (i, segment) in path.split('.').enumerate() {
        if i > 0 {
            children.push(text("."));
        }
        children.push(identifier(segment).into());
    }
    Arc::new(SyntaxNode::new(SyntaxKind::DottedName, children))
}

/// `path as alias`
pub fn aliased_import(path: &str, alias: &str) -> Arc<SyntaxNode> {
    Arc::new(SyntaxNode::new(
        SyntaxKind::AliasedImport,
        vec![
            dotted_name(path).into(),
            space(" "),
            text("as"),
            space(" "),
            identifier(alias).into(),
        ],
    ))
}
