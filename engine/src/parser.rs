//! Tree-sitter based structural outlines
//!
//! Parses Python, JavaScript and TypeScript sources into an [`Outline`]: the
//! top-level items of a file in source order (imports, standalone exports,
//! comments and declarations), where every declaration keeps its header text
//! verbatim so that renderers can reproduce it without re-tokenizing.
//!
//! # Example
//!
//! ```rust,ignore
//! use contextfit_engine::parser::{parse_outline, Language};
//!
//! let outline = parse_outline("def hello():\n    return 1\n", Language::Python)?;
//! for decl in outline.declarations() {
//!     println!("{} {}", decl.kind, decl.name);
//! }
//! ```

use crate::types::SymbolKind;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tree_sitter::{Node, Parser as TSParser};

/// Parser errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParserError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Failed to initialize parser: {0}")]
    Initialization(String),
}

/// Languages with a structural grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
}

impl Language {
    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "py" | "pyw" | "pyi" => Some(Self::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            _ => None,
        }
    }

    /// Detect language from a path
    pub fn from_path(path: &str) -> Option<Self> {
        Path::new(path).extension().and_then(|e| e.to_str()).and_then(Self::from_extension)
    }

    /// Get language name as string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
        }
    }

    pub fn is_python(&self) -> bool {
        matches!(self, Self::Python)
    }
}

/// How a declaration's body is represented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyShape {
    /// `header` is the complete declaration
    Inline,
    /// A statement block (`{ ... }` or an indented suite)
    Block,
    /// A container whose members are listed in `children`
    Members,
    /// An initializer value that can be elided
    Value(ValueShape),
}

/// Opening construct of an elided initializer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    Braces,
    Brackets,
    Parens,
    Expression,
}

impl ValueShape {
    fn of(text: &str) -> Self {
        match text.trim_start().chars().next() {
            Some('{') => Self::Braces,
            Some('[') => Self::Brackets,
            Some('(') => Self::Parens,
            _ => Self::Expression,
        }
    }
}

/// A declaration with its verbatim header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: SymbolKind,
    pub name: String,
    /// Source text from the declaration start (decorators and `export`
    /// included) up to the start of its body
    pub header: String,
    /// Offset into `header` where the declaration proper starts, past decorators
    pub signature_start: usize,
    /// Leading whitespace of the declaration's first line
    pub indent: String,
    /// Leading whitespace of the body's first line
    pub body_indent: String,
    /// Attached documentation, verbatim (docstring literal or JSDoc comment)
    pub doc: Option<String>,
    pub exported: bool,
    pub body: BodyShape,
    /// Text that followed the body in the original (`;` after an arrow function)
    pub terminator: String,
    pub children: Vec<Declaration>,
    /// Number of source lines the declaration spans
    pub line_count: usize,
}

impl Declaration {
    /// Header without decorators, collapsed onto one line when that is safe
    pub fn signature_line(&self) -> String {
        let signature = self.header.get(self.signature_start..).unwrap_or(&self.header);
        if signature.contains('#') || signature.contains("//") {
            return signature.to_owned();
        }
        signature.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// A top-level item in source order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutlineItem {
    Import(String),
    Export(String),
    Comment(String),
    Declaration(Declaration),
}

/// Structural outline of one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outline {
    pub language: Language,
    /// Module-level docstring or leading comment block
    pub module_doc: Option<String>,
    pub items: Vec<OutlineItem>,
}

impl Outline {
    pub fn imports(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|i| match i {
            OutlineItem::Import(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|i| match i {
            OutlineItem::Export(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.items.iter().filter_map(|i| match i {
            OutlineItem::Declaration(d) => Some(d),
            _ => None,
        })
    }

    /// Every (kind, name) pair, nested members included
    pub fn declaration_set(&self) -> Vec<(SymbolKind, String)> {
        fn walk(decl: &Declaration, out: &mut Vec<(SymbolKind, String)>) {
            out.push((decl.kind, decl.name.clone()));
            for child in &decl.children {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        for decl in self.declarations() {
            walk(decl, &mut out);
        }
        out
    }
}

/// Outline parser with lazily created grammars
pub struct Parser {
    parsers: HashMap<Language, TSParser>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Create a new parser; grammars are loaded on first use
    pub fn new() -> Self {
        Self { parsers: HashMap::new() }
    }

    fn ensure_initialized(&mut self, language: Language) -> Result<&mut TSParser, ParserError> {
        use std::collections::hash_map::Entry;
        match self.parsers.entry(language) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let grammar = match language {
                    Language::Python => tree_sitter_python::language(),
                    Language::JavaScript => tree_sitter_javascript::language(),
                    Language::TypeScript => tree_sitter_typescript::language_typescript(),
                    Language::Tsx => tree_sitter_typescript::language_tsx(),
                };
                let mut parser = TSParser::new();
                parser
                    .set_language(grammar)
                    .map_err(|e| ParserError::Initialization(e.to_string()))?;
                Ok(entry.insert(parser))
            }
        }
    }

    /// Parse source code into an outline. Sources with syntax errors fail.
    pub fn parse(&mut self, source: &str, language: Language) -> Result<Outline, ParserError> {
        let parser = self.ensure_initialized(language)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ParserError::ParseError("parser produced no tree".to_owned()))?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(ParserError::ParseError(format!(
                "{} source contains syntax errors",
                language.name()
            )));
        }

        let extractor = Extractor { source, language };
        Ok(if language.is_python() {
            extractor.python_outline(root)
        } else {
            extractor.script_outline(root)
        })
    }
}

thread_local! {
    static THREAD_PARSER: RefCell<Parser> = RefCell::new(Parser::new());
}

/// Parse using a thread-local parser
pub fn parse_outline(source: &str, language: Language) -> Result<Outline, ParserError> {
    THREAD_PARSER.with(|parser| parser.borrow_mut().parse(source, language))
}

struct Extractor<'a> {
    source: &'a str,
    language: Language,
}

impl<'a> Extractor<'a> {
    fn text(&self, node: Node<'_>) -> &'a str {
        &self.source[node.start_byte()..node.end_byte()]
    }

    fn span(&self, start: usize, end: usize) -> &'a str {
        &self.source[start..end]
    }

    /// Whitespace before `byte` on its line
    fn indent_at(&self, byte: usize) -> String {
        let line_start = self.source[..byte].rfind('\n').map(|i| i + 1).unwrap_or(0);
        self.source[line_start..byte].chars().take_while(|c| c.is_whitespace()).collect()
    }

    fn field_text(&self, node: Node<'_>, field: &str) -> Option<&'a str> {
        node.child_by_field_name(field).map(|n| self.text(n))
    }

    fn line_count(node: Node<'_>) -> usize {
        node.end_position().row - node.start_position().row + 1
    }

    fn body_indent(&self, header_row: usize, indent: &str, body: Node<'_>) -> String {
        let first = body.named_child(0).unwrap_or(body);
        if first.start_position().row > header_row {
            self.indent_at(first.start_byte())
        } else if self.language.is_python() {
            format!("{}    ", indent)
        } else {
            format!("{}  ", indent)
        }
    }

    // ---------------------------------------------------------------------
    // Python
    // ---------------------------------------------------------------------

    fn python_outline(&self, root: Node<'_>) -> Outline {
        let mut module_doc = None;
        let mut items = Vec::new();
        let mut cursor = root.walk();

        for (index, child) in root.named_children(&mut cursor).enumerate() {
            match child.kind() {
                "import_statement" | "import_from_statement" | "future_import_statement" => {
                    items.push(OutlineItem::Import(self.text(child).trim().to_owned()));
                }
                "comment" => items.push(OutlineItem::Comment(self.text(child).to_owned())),
                "function_definition" | "class_definition" | "decorated_definition" => {
                    if let Some(decl) = self.python_declaration(child, false) {
                        items.push(OutlineItem::Declaration(decl));
                    }
                }
                "expression_statement" => {
                    if index == 0 && python_string(child).is_some() {
                        module_doc = Some(self.text(child).to_owned());
                    } else if let Some(item) = self.python_assignment(child) {
                        items.push(item);
                    }
                }
                _ => {}
            }
        }

        Outline { language: self.language, module_doc, items }
    }

    fn python_declaration(&self, node: Node<'_>, in_class: bool) -> Option<Declaration> {
        let (def, header_start) = if node.kind() == "decorated_definition" {
            (node.child_by_field_name("definition")?, node.start_byte())
        } else {
            (node, node.start_byte())
        };
        let body = def.child_by_field_name("body")?;
        let name = self.field_text(def, "name")?.to_owned();

        // Header ends at the colon that opens the suite
        let mut colon_end = None;
        let mut cursor = def.walk();
        for child in def.children(&mut cursor) {
            if child.kind() == ":" && child.end_byte() <= body.start_byte() {
                colon_end = Some(child.end_byte());
            }
        }
        let header = self.span(header_start, colon_end?).to_owned();
        let indent = self.indent_at(header_start);
        let body_indent = self.body_indent(def.start_position().row, &indent, body);

        let doc = body
            .named_child(0)
            .filter(|stmt| python_string(*stmt).is_some())
            .map(|stmt| self.text(stmt).to_owned());

        let is_class = def.kind() == "class_definition";
        let kind = match (is_class, in_class) {
            (true, _) => SymbolKind::Class,
            (false, true) => SymbolKind::Method,
            (false, false) => SymbolKind::Function,
        };

        let mut children = Vec::new();
        if is_class {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                match member.kind() {
                    "function_definition" | "decorated_definition" | "class_definition" => {
                        if let Some(decl) = self.python_declaration(member, true) {
                            children.push(decl);
                        }
                    }
                    "expression_statement" if python_string(member).is_none() => {
                        if let Some(OutlineItem::Declaration(field)) = self.python_assignment(member) {
                            children.push(field);
                        }
                    }
                    _ => {}
                }
            }
        }

        Some(Declaration {
            kind,
            exported: !name.starts_with('_'),
            name,
            header,
            signature_start: def.start_byte() - header_start,
            indent,
            body_indent,
            doc,
            body: if is_class { BodyShape::Members } else { BodyShape::Block },
            terminator: String::new(),
            children,
            line_count: Self::line_count(node),
        })
    }

    /// Assignments become variable declarations; `__all__` is an export list
    fn python_assignment(&self, stmt: Node<'_>) -> Option<OutlineItem> {
        let assignment = stmt.named_child(0).filter(|n| n.kind() == "assignment")?;
        let left = assignment.child_by_field_name("left")?;
        if left.kind() != "identifier" {
            return None;
        }
        let name = self.text(left).to_owned();
        if name == "__all__" {
            return Some(OutlineItem::Export(self.text(stmt).to_owned()));
        }

        let is_constant = name.chars().any(|c| c.is_ascii_uppercase())
            && !name.chars().any(|c| c.is_ascii_lowercase());
        let (header, body) = match assignment.child_by_field_name("right") {
            Some(right) if right.start_position().row != right.end_position().row => (
                self.span(stmt.start_byte(), right.start_byte()).to_owned(),
                BodyShape::Value(ValueShape::of(self.text(right))),
            ),
            _ => (self.text(stmt).to_owned(), BodyShape::Inline),
        };

        Some(OutlineItem::Declaration(Declaration {
            kind: if is_constant { SymbolKind::Constant } else { SymbolKind::Variable },
            exported: !name.starts_with('_'),
            name,
            header,
            signature_start: 0,
            indent: self.indent_at(stmt.start_byte()),
            body_indent: String::new(),
            doc: None,
            body,
            terminator: String::new(),
            children: Vec::new(),
            line_count: Self::line_count(stmt),
        }))
    }

    // ---------------------------------------------------------------------
    // JavaScript / TypeScript
    // ---------------------------------------------------------------------

    fn script_outline(&self, root: Node<'_>) -> Outline {
        let mut items = Vec::new();
        let mut module_doc = None;
        let mut pending: Option<Node<'_>> = None;
        let children: Vec<Node<'_>> = {
            let mut cursor = root.walk();
            root.named_children(&mut cursor).collect()
        };

        for (index, child) in children.iter().copied().enumerate() {
            if child.kind() == "comment" {
                if let Some(prev) = pending.take() {
                    items.push(OutlineItem::Comment(self.text(prev).to_owned()));
                }
                let separated = children
                    .get(index + 1)
                    .map_or(true, |next| next.start_position().row > child.end_position().row + 1);
                if index == 0 && separated {
                    module_doc = Some(self.text(child).to_owned());
                } else {
                    pending = Some(child);
                }
                continue;
            }

            let doc = pending.take().and_then(|comment| {
                let attached = self.text(comment).starts_with("/**")
                    && comment.end_position().row + 1 >= child.start_position().row;
                if attached {
                    Some(self.text(comment).to_owned())
                } else {
                    items.push(OutlineItem::Comment(self.text(comment).to_owned()));
                    None
                }
            });

            match child.kind() {
                "import_statement" => {
                    items.push(OutlineItem::Import(self.text(child).trim().to_owned()))
                }
                "export_statement" => items.push(self.script_export(child, doc)),
                "expression_statement" => {
                    let text = self.text(child);
                    if text.starts_with("module.exports") || text.starts_with("exports.") {
                        items.push(OutlineItem::Export(text.to_owned()));
                    }
                }
                _ => {
                    if let Some(mut decl) = self.script_declaration(child, child.start_byte(), false) {
                        decl.doc = doc;
                        items.push(OutlineItem::Declaration(decl));
                    }
                }
            }
        }
        if let Some(prev) = pending {
            items.push(OutlineItem::Comment(self.text(prev).to_owned()));
        }

        Outline { language: self.language, module_doc, items }
    }

    fn script_export(&self, node: Node<'_>, doc: Option<String>) -> OutlineItem {
        let inner = node
            .child_by_field_name("declaration")
            .or_else(|| node.child_by_field_name("value"));
        let decl = inner.and_then(|inner| self.script_declaration(inner, node.start_byte(), true));
        match decl {
            Some(mut decl) => {
                decl.exported = true;
                decl.doc = doc;
                if decl.body == BodyShape::Inline {
                    decl.header = self.text(node).to_owned();
                }
                OutlineItem::Declaration(decl)
            }
            None => OutlineItem::Export(self.text(node).to_owned()),
        }
    }

    /// Declaration for a statement; `header_start` covers an `export` prefix
    fn script_declaration(
        &self,
        node: Node<'_>,
        header_start: usize,
        exported: bool,
    ) -> Option<Declaration> {
        let kind = node.kind();
        let indent = self.indent_at(header_start);
        let row = node.start_position().row;
        let mut decl = Declaration {
            kind: SymbolKind::Function,
            name: self.field_text(node, "name").unwrap_or("default").to_owned(),
            header: String::new(),
            signature_start: 0,
            indent: indent.clone(),
            body_indent: String::new(),
            doc: None,
            exported,
            body: BodyShape::Block,
            terminator: String::new(),
            children: Vec::new(),
            line_count: Self::line_count(node),
        };

        match kind {
            "function_declaration" | "generator_function_declaration" | "function"
            | "function_expression" | "arrow_function" | "generator_function" => {
                let body = node.child_by_field_name("body")?;
                if body.kind() != "statement_block" {
                    decl.body = BodyShape::Inline;
                    decl.header = self.span(header_start, node.end_byte()).to_owned();
                    return Some(decl);
                }
                decl.header = self.span(header_start, body.start_byte()).trim_end().to_owned();
                decl.body_indent = self.body_indent(row, &indent, body);
            }
            "class_declaration" | "class" | "abstract_class_declaration" => {
                let body = node.child_by_field_name("body")?;
                decl.kind = SymbolKind::Class;
                decl.header = self.span(header_start, body.start_byte()).trim_end().to_owned();
                decl.body_indent = self.body_indent(row, &indent, body);
                decl.body = BodyShape::Members;
                decl.children = self.script_members(body);
            }
            "interface_declaration" => {
                let body = node.child_by_field_name("body")?;
                decl.kind = SymbolKind::Interface;
                decl.header = self.span(header_start, body.start_byte()).trim_end().to_owned();
                decl.body_indent = self.body_indent(row, &indent, body);
                decl.body = BodyShape::Members;
                decl.children = self.script_members(body);
            }
            "enum_declaration" => {
                let body = node.child_by_field_name("body")?;
                decl.kind = SymbolKind::Enum;
                decl.header = self.span(header_start, body.start_byte()).trim_end().to_owned();
                decl.body = BodyShape::Value(ValueShape::Braces);
                if Self::line_count(node) <= 12 {
                    decl.body = BodyShape::Inline;
                    decl.header = self.span(header_start, node.end_byte()).to_owned();
                }
            }
            "type_alias_declaration" => {
                decl.kind = SymbolKind::TypeAlias;
                decl.body = BodyShape::Inline;
                decl.header = self.span(header_start, node.end_byte()).to_owned();
            }
            "lexical_declaration" | "variable_declaration" => {
                return self.script_variable(node, header_start, decl);
            }
            _ => return None,
        }
        Some(decl)
    }

    fn script_variable(
        &self,
        node: Node<'_>,
        header_start: usize,
        mut decl: Declaration,
    ) -> Option<Declaration> {
        let declarators: Vec<Node<'_>> = {
            let mut cursor = node.walk();
            node.named_children(&mut cursor)
                .filter(|n| n.kind() == "variable_declarator")
                .collect()
        };
        let first = *declarators.first()?;
        decl.name = self.field_text(first, "name")?.to_owned();
        let is_const = self.text(node).starts_with("const");
        decl.kind = if is_const && decl.name.chars().all(|c| !c.is_ascii_lowercase()) {
            SymbolKind::Constant
        } else {
            SymbolKind::Variable
        };
        decl.terminator = if self.text(node).trim_end().ends_with(';') {
            ";".to_owned()
        } else {
            String::new()
        };

        let value = first.child_by_field_name("value");
        let is_function = value.is_some_and(|v| {
            matches!(
                v.kind(),
                "arrow_function" | "function" | "function_expression" | "generator_function"
            )
        });
        if declarators.len() == 1 && is_function {
            decl.kind = SymbolKind::Function;
        }
        if declarators.len() != 1 || value.is_none() || Self::line_count(node) == 1 {
            decl.body = BodyShape::Inline;
            decl.header = self.span(header_start, node.end_byte()).to_owned();
            decl.terminator = String::new();
            return Some(decl);
        }
        let value = value?;

        match value.child_by_field_name("body") {
            Some(body) if is_function && body.kind() == "statement_block" => {
                decl.header = self.span(header_start, body.start_byte()).trim_end().to_owned();
                decl.body_indent = self.body_indent(node.start_position().row, &decl.indent, body);
                decl.body = BodyShape::Block;
            }
            _ => {
                decl.header = self.span(header_start, value.start_byte()).to_owned();
                decl.body = BodyShape::Value(ValueShape::of(self.text(value)));
            }
        }
        Some(decl)
    }

    /// Members of a class body or interface body
    fn script_members(&self, body: Node<'_>) -> Vec<Declaration> {
        let mut members = Vec::new();
        let mut pending_doc: Option<String> = None;
        let mut cursor = body.walk();

        for member in body.named_children(&mut cursor) {
            let kind = member.kind();
            if kind == "comment" {
                let text = self.text(member);
                pending_doc = text.starts_with("/**").then(|| text.to_owned());
                continue;
            }
            let doc = pending_doc.take();
            let indent = self.indent_at(member.start_byte());
            let name = self
                .field_text(member, "name")
                .or_else(|| self.field_text(member, "property"))
                .unwrap_or("")
                .to_owned();
            let mut decl = Declaration {
                kind: SymbolKind::Method,
                name,
                header: String::new(),
                signature_start: 0,
                indent: indent.clone(),
                body_indent: String::new(),
                doc,
                exported: false,
                body: BodyShape::Inline,
                terminator: String::new(),
                children: Vec::new(),
                line_count: Self::line_count(member),
            };

            match (kind, member.child_by_field_name("body")) {
                ("method_definition", Some(body)) => {
                    decl.header = self.span(member.start_byte(), body.start_byte()).trim_end().to_owned();
                    decl.body_indent = self.body_indent(member.start_position().row, &indent, body);
                    decl.body = BodyShape::Block;
                }
                ("field_definition" | "public_field_definition" | "property_signature", _) => {
                    if Self::line_count(member) > 1 {
                        continue;
                    }
                    decl.kind = SymbolKind::Variable;
                    decl.header = terminated(self.text(member));
                }
                ("method_signature" | "abstract_method_signature" | "index_signature"
                | "call_signature" | "construct_signature", _) => {
                    decl.header = terminated(self.text(member));
                }
                _ => continue,
            }
            members.push(decl);
        }
        members
    }
}

/// Member text ending with a separator
fn terminated(text: &str) -> String {
    let text = text.trim_end();
    if text.ends_with(';') || text.ends_with(',') {
        text.to_owned()
    } else {
        format!("{};", text)
    }
}

/// The string literal of a bare string expression statement
fn python_string(stmt: Node<'_>) -> Option<Node<'_>> {
    if stmt.kind() != "expression_statement" || stmt.named_child_count() != 1 {
        return None;
    }
    stmt.named_child(0).filter(|n| n.kind() == "string")
}
