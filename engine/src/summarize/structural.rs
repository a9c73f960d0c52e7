//! Signature extraction for Python and JavaScript/TypeScript sources

use super::{StrategyError, Summarizer, Summary, SummarizationConfig};
use crate::parser::{parse_outline, BodyShape, Declaration, Language, Outline, OutlineItem, ValueShape};
use crate::types::{CompressionLevel, FileEntry, LanguageTag, SymbolKind};
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

const OUTLINE_CACHE_CAPACITY: u64 = 1024;
const OUTLINE_CACHE_TTL: Duration = Duration::from_secs(600);

/// Longest single-line constant kept verbatim at the outline level
const OUTLINE_INLINE_MAX: usize = 80;

/// Width at which the minimal-level name list wraps
const NAME_LIST_WIDTH: usize = 96;

/// Summarizes code by keeping declaration headers and eliding bodies
pub struct StructuralStrategy {
    outlines: Cache<([u8; 32], Language), Arc<Outline>>,
}

impl Default for StructuralStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralStrategy {
    pub fn new() -> Self {
        Self {
            outlines: Cache::builder()
                .max_capacity(OUTLINE_CACHE_CAPACITY)
                .time_to_live(OUTLINE_CACHE_TTL)
                .build(),
        }
    }

    /// Parse once per distinct content; level walks reuse the outline
    fn outline(&self, content: &str, language: Language) -> Result<Arc<Outline>, StrategyError> {
        let key = (*blake3::hash(content.as_bytes()).as_bytes(), language);
        if let Some(outline) = self.outlines.get(&key) {
            return Ok(outline);
        }
        let outline = Arc::new(parse_outline(content, language)?);
        self.outlines.insert(key, Arc::clone(&outline));
        Ok(outline)
    }
}

impl Summarizer for StructuralStrategy {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn summarize(
        &self,
        file: &FileEntry,
        config: &SummarizationConfig,
    ) -> Result<Summary, StrategyError> {
        let language = Language::from_path(&file.path).unwrap_or(match file.language {
            LanguageTag::Python => Language::Python,
            _ => Language::TypeScript,
        });
        let outline = self.outline(&file.content, language)?;
        let text = Renderer::new(language, config).render(&outline);
        Ok(Summary { text, level: config.level, truncated: false })
    }
}

struct Renderer<'a> {
    python: bool,
    config: &'a SummarizationConfig,
    level: CompressionLevel,
    out: String,
}

impl<'a> Renderer<'a> {
    fn new(language: Language, config: &'a SummarizationConfig) -> Self {
        Self { python: language.is_python(), config, level: config.level, out: String::new() }
    }

    fn with_docs(&self) -> bool {
        self.level == CompressionLevel::Docstrings || self.config.preserve_docstrings
    }

    fn comment_prefix(&self) -> &'static str {
        if self.python {
            "#"
        } else {
            "//"
        }
    }

    fn render(mut self, outline: &Outline) -> String {
        match self.level {
            CompressionLevel::Full | CompressionLevel::Signatures | CompressionLevel::Docstrings => {
                self.detailed(outline)
            }
            CompressionLevel::Outline => self.outline(outline),
            CompressionLevel::Minimal => self.minimal(outline),
        }
        self.out
    }

    fn line(&mut self, indent: &str, text: &str) {
        self.out.push_str(indent);
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Blank line between top-level blocks
    fn separate(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn module_doc(&mut self, outline: &Outline, wanted: bool) {
        if let (true, Some(doc)) = (wanted, &outline.module_doc) {
            self.line("", doc);
            self.out.push('\n');
        }
    }

    // Signatures and docstrings

    fn detailed(&mut self, outline: &Outline) {
        self.module_doc(outline, self.with_docs());
        let mut previous_was_decl = false;
        for item in &outline.items {
            match item {
                OutlineItem::Import(text) | OutlineItem::Export(text) => {
                    if previous_was_decl {
                        self.separate();
                    }
                    self.line("", text);
                    previous_was_decl = false;
                }
                OutlineItem::Comment(text) => {
                    if self.config.preserve_comments {
                        self.line("", text);
                    }
                }
                OutlineItem::Declaration(decl) => {
                    let block = !matches!(decl.body, BodyShape::Inline | BodyShape::Value(_));
                    if block || previous_was_decl {
                        self.separate();
                    }
                    self.declaration(decl);
                    previous_was_decl = block;
                }
            }
        }
    }

    fn declaration(&mut self, decl: &Declaration) {
        let with_docs = self.with_docs();
        if !self.python && with_docs {
            if let Some(doc) = &decl.doc {
                self.line(&decl.indent, doc);
            }
        }
        match decl.body {
            BodyShape::Inline => self.line(&decl.indent, &decl.header),
            BodyShape::Value(shape) => {
                let text = format!("{}{}{}", decl.header, self.elided_value(shape), decl.terminator);
                self.line(&decl.indent, &text);
            }
            BodyShape::Block => {
                if self.python {
                    self.line(&decl.indent, &decl.header);
                    self.python_doc(decl, with_docs);
                    self.line(&decl.body_indent, "...");
                } else {
                    let text = format!("{} {{ /* ... */ }}{}", decl.header, decl.terminator);
                    self.line(&decl.indent, &text);
                }
            }
            BodyShape::Members => {
                if self.python {
                    self.line(&decl.indent, &decl.header);
                    let documented = self.python_doc(decl, with_docs);
                    for child in &decl.children {
                        self.declaration(child);
                    }
                    if decl.children.is_empty() && !documented {
                        self.line(&decl.body_indent, "...");
                    }
                } else {
                    let text = format!("{} {{", decl.header);
                    self.line(&decl.indent, &text);
                    for child in &decl.children {
                        self.declaration(child);
                    }
                    let text = format!("}}{}", decl.terminator);
                    self.line(&decl.indent, &text);
                }
            }
        }
    }

    fn python_doc(&mut self, decl: &Declaration, wanted: bool) -> bool {
        match (&decl.doc, wanted) {
            (Some(doc), true) => {
                self.line(&decl.body_indent, doc);
                true
            }
            _ => false,
        }
    }

    fn elided_value(&self, shape: ValueShape) -> &'static str {
        match (self.python, shape) {
            (true, ValueShape::Braces) => "{...}",
            (true, ValueShape::Brackets) => "[...]",
            (true, ValueShape::Parens) => "(...)",
            (true, ValueShape::Expression) => "...",
            (false, ValueShape::Braces) => "{ /* ... */ }",
            (false, ValueShape::Brackets) => "[ /* ... */ ]",
            (false, _) => "/* ... */ undefined",
        }
    }

    // Outline

    fn floor(&mut self, outline: &Outline) {
        let mut any = false;
        for item in &outline.items {
            let keep = match item {
                OutlineItem::Import(_) => self.config.preserve_imports,
                OutlineItem::Export(_) => self.config.preserve_exports,
                _ => false,
            };
            if let (true, OutlineItem::Import(text) | OutlineItem::Export(text)) = (keep, item) {
                self.line("", text);
                any = true;
            }
        }
        if any {
            self.out.push('\n');
        }
    }

    fn outline(&mut self, outline: &Outline) {
        self.module_doc(outline, self.config.preserve_docstrings);
        self.floor(outline);
        for decl in outline.declarations() {
            self.outline_declaration(decl);
        }
    }

    fn outline_declaration(&mut self, decl: &Declaration) {
        match (decl.kind, decl.body) {
            (SymbolKind::Class | SymbolKind::Interface, BodyShape::Members) => {
                let members: Vec<&Declaration> = decl
                    .children
                    .iter()
                    .filter(|c| c.body == BodyShape::Block && !is_private(&c.name))
                    .collect();
                if self.python {
                    self.line(&decl.indent, &decl.signature_line());
                    for member in &members {
                        self.line(&member.indent, &format!("{} ...", member.signature_line()));
                    }
                    if members.is_empty() {
                        self.line(&decl.body_indent, "...");
                    }
                } else if decl.kind == SymbolKind::Interface {
                    let text = format!("{} {{ /* ... */ }}", decl.signature_line());
                    self.line(&decl.indent, &text);
                } else {
                    self.line(&decl.indent, &format!("{} {{", decl.signature_line()));
                    for member in &members {
                        let text = format!("{} {{ /* ... */ }}", member.signature_line());
                        self.line(&member.indent, &text);
                    }
                    self.line(&decl.indent, &format!("}}{}", decl.terminator));
                }
            }
            (_, BodyShape::Block) => {
                let text = if self.python {
                    format!("{} ...", decl.signature_line())
                } else {
                    format!("{} {{ /* ... */ }}{}", decl.signature_line(), decl.terminator)
                };
                self.line(&decl.indent, &text);
            }
            (SymbolKind::Constant | SymbolKind::TypeAlias | SymbolKind::Enum, BodyShape::Inline)
                if decl.header.len() <= OUTLINE_INLINE_MAX && !decl.header.contains('\n') =>
            {
                self.line(&decl.indent, &decl.header);
            }
            (SymbolKind::Constant | SymbolKind::Enum, BodyShape::Value(shape)) => {
                let text = format!("{}{}{}", decl.header, self.elided_value(shape), decl.terminator);
                self.line(&decl.indent, &text);
            }
            (_, BodyShape::Value(shape)) if decl.exported && !self.python => {
                let text = format!("{}{}{}", decl.header, self.elided_value(shape), decl.terminator);
                self.line(&decl.indent, &text);
            }
            _ => {}
        }
    }

    // Minimal

    fn minimal(&mut self, outline: &Outline) {
        self.module_doc(outline, self.config.preserve_docstrings);
        self.floor(outline);

        let names: Vec<String> = outline
            .declarations()
            .filter(|d| d.kind != SymbolKind::Variable)
            .map(|d| match d.kind {
                SymbolKind::Class if !d.children.is_empty() => {
                    format!("{} {}({})", kind_label(d.kind, self.python), d.name, d.children.len())
                }
                SymbolKind::Constant => d.name.clone(),
                kind => format!("{} {}", kind_label(kind, self.python), d.name),
            })
            .collect();
        if names.is_empty() {
            return;
        }

        let prefix = format!("{} defines: ", self.comment_prefix());
        let continuation = format!("{}   ", self.comment_prefix());
        let mut current = prefix.clone();
        for (i, name) in names.iter().enumerate() {
            let piece = if i + 1 < names.len() { format!("{},", name) } else { name.clone() };
            let fresh = current == prefix || current == continuation;
            if !fresh && current.len() + piece.len() + 1 > NAME_LIST_WIDTH {
                self.line("", current.trim_end());
                current = continuation.clone();
            }
            if current != prefix && current != continuation {
                current.push(' ');
            }
            current.push_str(&piece);
        }
        self.line("", current.trim_end());
    }
}

fn kind_label(kind: SymbolKind, python: bool) -> &'static str {
    match (kind, python) {
        (SymbolKind::Function | SymbolKind::Method, true) => "def",
        (SymbolKind::Function | SymbolKind::Method, false) => "function",
        (SymbolKind::Class, _) => "class",
        (SymbolKind::Interface, _) => "interface",
        (SymbolKind::Enum, _) => "enum",
        (SymbolKind::TypeAlias, _) => "type",
        (SymbolKind::Constant, _) => "const",
        (SymbolKind::Variable, _) => "let",
    }
}

/// `_name` and `#name` members; dunder methods stay public
fn is_private(name: &str) -> bool {
    name.starts_with('#') || (name.starts_with('_') && !name.starts_with("__"))
}
