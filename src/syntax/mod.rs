//! Lossless syntax tree for workflow source files
//!
//! The tree is immutable. Every byte of the input lives in exactly one token,
//! so rendering a tree reproduces its source verbatim. Nodes are shared
//! through [`Arc`]: a transformed tree reuses every subtree it did not touch.
//!
//! Absolute positions and parent links are not stored in nodes; they are
//! provided by the borrowed cursor [`SyntaxRef`].

pub mod parser;
pub mod python;

use crate::diagnostic::{Position, Span};
use std::fmt;
use std::sync::Arc;

pub use parser::{ParseError, PythonParser, MAX_DEPTH};

/// Node kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxKind {
    Module,
    ImportStatement,
    ImportFromStatement,
    FutureImportStatement,
    DottedName,
    AliasedImport,
    WildcardImport,
    RelativeImport,
    ExpressionStatement,
    Assignment,
    Call,
    ArgumentList,
    KeywordArgument,
    ListSplat,
    DictionarySplat,
    Identifier,
    Attribute,
    StringLiteral,
    WithStatement,
    WithClause,
    WithItem,
    AsPattern,
    AsPatternTarget,
    Block,
    FunctionDefinition,
    ClassDefinition,
    DecoratedDefinition,
    Decorator,
    Error,
    /// Any other grammar node, keyed by its grammar name
    Other(&'static str),
}

impl SyntaxKind {
    /// Map a tree-sitter-python node kind
    pub fn from_grammar(kind: &'static str) -> Self {
        match kind {
            "module" => SyntaxKind::Module,
            "import_statement" => SyntaxKind::ImportStatement,
            "import_from_statement" => SyntaxKind::ImportFromStatement,
            "future_import_statement" => SyntaxKind::FutureImportStatement,
            "dotted_name" => SyntaxKind::DottedName,
            "aliased_import" => SyntaxKind::AliasedImport,
            "wildcard_import" => SyntaxKind::WildcardImport,
            "relative_import" => SyntaxKind::RelativeImport,
            "expression_statement" => SyntaxKind::ExpressionStatement,
            "assignment" => SyntaxKind::Assignment,
            "call" => SyntaxKind::Call,
            "argument_list" => SyntaxKind::ArgumentList,
            "keyword_argument" => SyntaxKind::KeywordArgument,
            "list_splat" => SyntaxKind::ListSplat,
            "dictionary_splat" => SyntaxKind::DictionarySplat,
            "identifier" => SyntaxKind::Identifier,
            "attribute" => SyntaxKind::Attribute,
            "string" => SyntaxKind::StringLiteral,
            "with_statement" => SyntaxKind::WithStatement,
            "with_clause" => SyntaxKind::WithClause,
            "with_item" => SyntaxKind::WithItem,
            "as_pattern" => SyntaxKind::AsPattern,
            "as_pattern_target" => SyntaxKind::AsPatternTarget,
            "block" => SyntaxKind::Block,
            "function_definition" => SyntaxKind::FunctionDefinition,
            "class_definition" => SyntaxKind::ClassDefinition,
            "decorated_definition" => SyntaxKind::DecoratedDefinition,
            "decorator" => SyntaxKind::Decorator,
            "ERROR" => SyntaxKind::Error,
            other => SyntaxKind::Other(other),
        }
    }

    /// Grammar name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            SyntaxKind::Module => "module",
            SyntaxKind::ImportStatement => "import_statement",
            SyntaxKind::ImportFromStatement => "import_from_statement",
            SyntaxKind::FutureImportStatement => "future_import_statement",
            SyntaxKind::DottedName => "dotted_name",
            SyntaxKind::AliasedImport => "aliased_import",
            SyntaxKind::WildcardImport => "wildcard_import",
            SyntaxKind::RelativeImport => "relative_import",
            SyntaxKind::ExpressionStatement => "expression_statement",
            SyntaxKind::Assignment => "assignment",
            SyntaxKind::Call => "call",
            SyntaxKind::ArgumentList => "argument_list",
            SyntaxKind::KeywordArgument => "keyword_argument",
            SyntaxKind::ListSplat => "list_splat",
            SyntaxKind::DictionarySplat => "dictionary_splat",
            SyntaxKind::Identifier => "identifier",
            SyntaxKind::Attribute => "attribute",
            SyntaxKind::StringLiteral => "string",
            SyntaxKind::WithStatement => "with_statement",
            SyntaxKind::WithClause => "with_clause",
            SyntaxKind::WithItem => "with_item",
            SyntaxKind::AsPattern => "as_pattern",
            SyntaxKind::AsPatternTarget => "as_pattern_target",
            SyntaxKind::Block => "block",
            SyntaxKind::FunctionDefinition => "function_definition",
            SyntaxKind::ClassDefinition => "class_definition",
            SyntaxKind::DecoratedDefinition => "decorated_definition",
            SyntaxKind::Decorator => "decorator",
            SyntaxKind::Error => "ERROR",
            SyntaxKind::Other(name) => *name,
        }
    }
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Spaces, tabs, newlines and line continuations between nodes
    Whitespace,
    /// `# ...` up to, not including, the newline
    Comment,
    /// Keywords, punctuation, and the text of leaf nodes
    Text,
}

/// A run of source text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyntaxToken {
    kind: TokenKind,
    text: Arc<str>,
}

impl SyntaxToken {
    pub fn new(kind: TokenKind, text: &str) -> Self {
        Self {
            kind,
            text: Arc::from(text),
        }
    }

    pub fn whitespace(text: &str) -> Self {
        Self::new(TokenKind::Whitespace, text)
    }

    pub fn text(text: &str) -> Self {
        Self::new(TokenKind::Text, text)
    }

    pub fn comment(text: &str) -> Self {
        Self::new(TokenKind::Comment, text)
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Child of a node: either a nested node or a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxElement {
    Node(Arc<SyntaxNode>),
    Token(SyntaxToken),
}

impl SyntaxElement {
    pub fn text_len(&self) -> usize {
        match self {
            SyntaxElement::Node(node) => node.text_len(),
            SyntaxElement::Token(token) => token.len(),
        }
    }

    pub fn as_node(&self) -> Option<&Arc<SyntaxNode>> {
        match self {
            SyntaxElement::Node(node) => Some(node),
            SyntaxElement::Token(_) => None,
        }
    }

    pub fn as_token(&self) -> Option<&SyntaxToken> {
        match self {
            SyntaxElement::Node(_) => None,
            SyntaxElement::Token(token) => Some(token),
        }
    }

    pub fn is_whitespace(&self) -> bool {
        self.as_token()
            .is_some_and(|t| t.kind() == TokenKind::Whitespace)
    }

    pub fn is_comment(&self) -> bool {
        self.as_token().is_some_and(|t| t.kind() == TokenKind::Comment)
    }

    /// Whether this is a text token spelling exactly `text`
    pub fn is_text(&self, text: &str) -> bool {
        self.as_token()
            .is_some_and(|t| t.kind() == TokenKind::Text && t.as_str() == text)
    }

    pub fn write_to(&self, out: &mut String) {
        match self {
            SyntaxElement::Node(node) => node.write_to(out),
            SyntaxElement::Token(token) => out.push_str(token.as_str()),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.text_len());
        self.write_to(&mut out);
        out
    }
}

impl From<Arc<SyntaxNode>> for SyntaxElement {
    fn from(node: Arc<SyntaxNode>) -> Self {
        SyntaxElement::Node(node)
    }
}

impl From<SyntaxToken> for SyntaxElement {
    fn from(token: SyntaxToken) -> Self {
        SyntaxElement::Token(token)
    }
}

/// Immutable syntax node
#[derive(Debug, PartialEq, Eq)]
pub struct SyntaxNode {
    kind: SyntaxKind,
    children: Vec<SyntaxElement>,
    len: usize,
}

impl SyntaxNode {
    pub fn new(kind: SyntaxKind, children: Vec<SyntaxElement>) -> Self {
        let len = children.iter().map(SyntaxElement::text_len).sum();
        Self {
            kind,
            children,
            len,
        }
    }

    /// Node holding a single text token, e.g. an identifier
    pub fn leaf(kind: SyntaxKind, text: &str) -> Self {
        Self::new(kind, vec![SyntaxElement::Token(SyntaxToken::text(text))])
    }

    pub fn kind(&self) -> SyntaxKind {
        self.kind
    }

    pub fn is(&self, kind: SyntaxKind) -> bool {
        self.kind == kind
    }

    pub fn children(&self) -> &[SyntaxElement] {
        &self.children
    }

    /// Byte length of the rendered text
    pub fn text_len(&self) -> usize {
        self.len
    }

    /// Child nodes, skipping tokens
    pub fn child_nodes(&self) -> impl Iterator<Item = &Arc<SyntaxNode>> + '_ {
        self.children.iter().filter_map(SyntaxElement::as_node)
    }

    /// Child nodes with their index in [`children`](Self::children)
    pub fn indexed_child_nodes(&self) -> impl Iterator<Item = (usize, &Arc<SyntaxNode>)> + '_ {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_node().map(|n| (i, n)))
    }

    pub fn first_child_of(&self, kind: SyntaxKind) -> Option<&Arc<SyntaxNode>> {
        self.child_nodes().find(|n| n.kind == kind)
    }

    /// Byte offset of child `index` relative to the start of this node
    pub fn child_offset(&self, index: usize) -> usize {
        self.children[..index.min(self.children.len())]
            .iter()
            .map(SyntaxElement::text_len)
            .sum()
    }

    /// Byte range of child `index` relative to the start of this node
    pub fn child_range(&self, index: usize) -> TextRange {
        let start = self.child_offset(index);
        let len = self.children.get(index).map_or(0, SyntaxElement::text_len);
        TextRange::new(start, start + len)
    }

    /// Same kind, different children
    pub fn with_children(&self, children: Vec<SyntaxElement>) -> Self {
        Self::new(self.kind, children)
    }

    /// Copy of this node with child `index` swapped out
    pub fn replace_child(&self, index: usize, element: SyntaxElement) -> Self {
        let mut children = self.children.clone();
        children[index] = element;
        Self::new(self.kind, children)
    }

    /// Append the source text of this node to `out`
    pub fn write_to(&self, out: &mut String) {
        for child in &self.children {
            child.write_to(out);
        }
    }

    /// Source text of this node
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.len);
        self.write_to(&mut out);
        out
    }

    /// Text with whitespace and comments removed, e.g. `airflow.operators.bash`
    pub fn significant_text(&self) -> String {
        let mut out = String::new();
        self.for_each_token(&mut |token| {
            if token.kind() == TokenKind::Text {
                out.push_str(token.as_str());
            }
        });
        out
    }

    /// Visit every token in source order
    pub fn for_each_token(&self, f: &mut impl FnMut(&SyntaxToken)) {
        for child in &self.children {
            match child {
                SyntaxElement::Node(node) => node.for_each_token(f),
                SyntaxElement::Token(token) => f(token),
            }
        }
    }

    /// Whether this node or any descendant satisfies `pred`
    pub fn any_descendant(&self, pred: &impl Fn(&SyntaxNode) -> bool) -> bool {
        pred(self) || self.child_nodes().any(|n| n.any_descendant(pred))
    }

    /// Rebuild the subtree with tokens rewritten by `f`
    ///
    /// `f` returns `None` to keep a token. Subtrees without a rewritten token
    /// are shared with the input.
    pub fn map_tokens(
        self: &Arc<Self>,
        f: &mut impl FnMut(&SyntaxToken) -> Option<SyntaxToken>,
    ) -> Arc<SyntaxNode> {
        let mut rebuilt: Option<Vec<SyntaxElement>> = None;
        for (i, child) in self.children.iter().enumerate() {
            let replacement = match child {
                SyntaxElement::Node(node) => {
                    let mapped = node.map_tokens(f);
                    (!Arc::ptr_eq(&mapped, node)).then(|| SyntaxElement::Node(mapped))
                }
                SyntaxElement::Token(token) => f(token).map(SyntaxElement::Token),
            };
            if let Some(element) = replacement {
                rebuilt.get_or_insert_with(|| self.children.clone())[i] = element;
            }
        }
        match rebuilt {
            Some(children) => Arc::new(self.with_children(children)),
            None => Arc::clone(self),
        }
    }
}

impl fmt::Display for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Half-open byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn at(start: usize, len: usize) -> Self {
        Self::new(start, start + len)
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move by `offset` bytes
    pub fn shift(self, offset: usize) -> Self {
        Self::new(self.start + offset, self.end + offset)
    }

    pub fn contains_range(&self, other: TextRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Converts byte offsets into 1-based line/column positions
#[derive(Debug)]
pub struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { text, line_starts }
    }

    /// 1-based line containing `offset`
    pub fn line(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// 1-based line and character column of `offset`
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line = self.line(offset);
        let line_start = self.line_starts[line - 1];
        let column = self
            .text
            .get(line_start..offset)
            .map_or(offset - line_start, |s| s.chars().count())
            + 1;
        Position::new(line, column)
    }

    pub fn span(&self, range: TextRange) -> Span {
        Span::new(self.position(range.start), self.position(range.end))
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

/// Borrowed cursor over a tree: a node plus its absolute offset and parent
#[derive(Debug, Clone, Copy)]
pub struct SyntaxRef<'a> {
    node: &'a Arc<SyntaxNode>,
    offset: usize,
    parent: Option<&'a SyntaxRef<'a>>,
}

impl<'a> SyntaxRef<'a> {
    pub fn root(node: &'a Arc<SyntaxNode>) -> Self {
        Self {
            node,
            offset: 0,
            parent: None,
        }
    }

    pub fn node(&self) -> &'a Arc<SyntaxNode> {
        self.node
    }

    pub fn kind(&self) -> SyntaxKind {
        self.node.kind()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Absolute byte range of this node
    pub fn range(&self) -> TextRange {
        TextRange::at(self.offset, self.node.text_len())
    }

    pub fn parent(&self) -> Option<&'a SyntaxRef<'a>> {
        self.parent
    }

    pub fn ancestors(&self) -> impl Iterator<Item = &'a SyntaxRef<'a>> {
        std::iter::successors(self.parent, |p| p.parent)
    }

    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Child node cursors, in source order
    pub fn children<'b>(&'b self) -> impl Iterator<Item = SyntaxRef<'b>> + 'b
    where
        'a: 'b,
    {
        let mut offset = self.offset;
        self.node.children().iter().filter_map(move |element| {
            let start = offset;
            offset += element.text_len();
            element.as_node().map(|node| SyntaxRef {
                node,
                offset: start,
                parent: Some(self),
            })
        })
    }
}
