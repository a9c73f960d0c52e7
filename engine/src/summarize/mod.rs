//! Per-language summarization strategies
//!
//! The [`SummarizationEngine`] dispatches a file to the strategy registered for
//! its [`LanguageTag`]. Registration is explicit and closed once the engine is
//! built. Files without a strategy, and files a strategy cannot handle, go to
//! the generic [`Truncator`].
//!
//! Strategies never decide whether a result fits a budget: they render a file
//! at a requested [`CompressionLevel`] and report the level they achieved. The
//! optimizer walks the levels and applies the truncator as a backstop.

mod extraction;
mod hierarchy;
mod schema;
mod structural;
mod truncate;

pub use extraction::ExtractionStrategy;
pub use hierarchy::HierarchyStrategy;
pub use schema::SchemaStrategy;
pub use structural::StructuralStrategy;
pub use truncate::{bracket_balance, Truncation, Truncator};

use crate::error::ConfigurationError;
use crate::parser::{Language, ParserError};
use crate::tokenizer::{TokenModel, Tokenizer};
use crate::types::{CompressionLevel, FileEntry, LanguageTag};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Longest statement kept in the preserved floor
const MAX_FLOOR_STATEMENT_LINES: usize = 40;

/// Strategy failures; always absorbed by a fallback
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Parse(#[from] ParserError),

    #[error("Invalid {format} data: {message}")]
    InvalidData { format: &'static str, message: String },
}

/// Options controlling how files are summarized
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    /// Fraction of the original tokens a compressed file may keep, in (0, 1]
    pub target_ratio: f64,
    /// Finest level tried for compressed files
    pub level: CompressionLevel,
    pub preserve_imports: bool,
    pub preserve_exports: bool,
    pub preserve_docstrings: bool,
    pub preserve_comments: bool,
    /// Refine deterministic summaries with an LLM provider when available
    pub use_llm: bool,
    /// Sample leaves kept per collection by the schema strategy
    pub sample_leaves: usize,
    /// Characters of prose kept per section by the hierarchy strategy
    pub section_char_cap: usize,
    /// Setup lines kept per test unit by the extraction strategy
    pub max_setup_lines: usize,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            target_ratio: 0.3,
            level: CompressionLevel::Signatures,
            preserve_imports: true,
            preserve_exports: true,
            preserve_docstrings: false,
            preserve_comments: false,
            use_llm: false,
            sample_leaves: 3,
            section_char_cap: 400,
            max_setup_lines: 3,
        }
    }
}

impl SummarizationConfig {
    /// Reject ratios outside (0, 1]
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.target_ratio > 0.0 && self.target_ratio <= 1.0) {
            return Err(ConfigurationError::InvalidRatio(self.target_ratio));
        }
        Ok(())
    }

    /// Same options at a different level
    pub fn at_level(&self, level: CompressionLevel) -> Self {
        Self { level, ..*self }
    }

    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.target_ratio = ratio;
        self
    }

    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }
}

/// A rendered summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    /// Level the strategy actually produced
    pub level: CompressionLevel,
    /// Produced by the truncator rather than a strategy
    pub truncated: bool,
}

/// A per-file-type summarization strategy
pub trait Summarizer: Send + Sync {
    /// Strategy name for logs
    fn name(&self) -> &'static str;

    /// Render `file` at `config.level`
    fn summarize(
        &self,
        file: &FileEntry,
        config: &SummarizationConfig,
    ) -> Result<Summary, StrategyError>;
}

/// Syntax family used for lexical statement extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Syntax {
    Python,
    Script,
}

impl Syntax {
    pub(crate) fn of(file: &FileEntry) -> Option<Self> {
        match Language::from_path(&file.path) {
            Some(Language::Python) => Some(Self::Python),
            Some(_) => Some(Self::Script),
            None => match file.language {
                LanguageTag::Python => Some(Self::Python),
                LanguageTag::JsLike => Some(Self::Script),
                _ => None,
            },
        }
    }
}

/// Builder for [`SummarizationEngine`]
pub struct SummarizationEngineBuilder {
    strategies: HashMap<LanguageTag, Arc<dyn Summarizer>>,
    tokenizer: Tokenizer,
    model: TokenModel,
}

impl SummarizationEngineBuilder {
    /// Register the strategy for a language tag, replacing any previous one
    pub fn with_strategy(mut self, tag: LanguageTag, strategy: Arc<dyn Summarizer>) -> Self {
        self.strategies.insert(tag, strategy);
        self
    }

    /// Register the built-in strategies
    pub fn with_default_strategies(self) -> Self {
        let structural: Arc<dyn Summarizer> = Arc::new(StructuralStrategy::new());
        self.with_strategy(LanguageTag::Python, Arc::clone(&structural))
            .with_strategy(LanguageTag::JsLike, structural)
            .with_strategy(LanguageTag::Json, Arc::new(SchemaStrategy::json()))
            .with_strategy(LanguageTag::Yaml, Arc::new(SchemaStrategy::yaml()))
            .with_strategy(LanguageTag::Toml, Arc::new(SchemaStrategy::toml()))
            .with_strategy(LanguageTag::Test, Arc::new(ExtractionStrategy::new()))
            .with_strategy(LanguageTag::Markdown, Arc::new(HierarchyStrategy::new()))
    }

    pub fn build(self) -> SummarizationEngine {
        SummarizationEngine {
            strategies: self.strategies,
            truncator: Truncator::new(self.tokenizer, self.model),
        }
    }
}

/// Strategy dispatcher with a generic truncating fallback
pub struct SummarizationEngine {
    strategies: HashMap<LanguageTag, Arc<dyn Summarizer>>,
    truncator: Truncator,
}

impl SummarizationEngine {
    /// Start an empty registry counting tokens with `model`
    pub fn builder(tokenizer: Tokenizer, model: TokenModel) -> SummarizationEngineBuilder {
        SummarizationEngineBuilder { strategies: HashMap::new(), tokenizer, model }
    }

    /// Engine with the built-in strategies
    pub fn with_defaults(tokenizer: Tokenizer, model: TokenModel) -> Self {
        Self::builder(tokenizer, model).with_default_strategies().build()
    }

    pub fn truncator(&self) -> &Truncator {
        &self.truncator
    }

    /// Name of the strategy that handles `tag`
    pub fn strategy_name(&self, tag: LanguageTag) -> &'static str {
        self.strategies.get(&tag).map_or("truncate", |s| s.name())
    }

    /// Render with the registered strategy, without any fallback.
    /// Returns `None` when no strategy is registered for the file's tag.
    pub fn render(
        &self,
        file: &FileEntry,
        config: &SummarizationConfig,
    ) -> Option<Result<Summary, StrategyError>> {
        if config.level == CompressionLevel::Full {
            return Some(Ok(Summary {
                text: file.content.clone(),
                level: CompressionLevel::Full,
                truncated: false,
            }));
        }
        let strategy = self.strategies.get(&file.language)?;
        Some(strategy.summarize(file, config).map(|mut summary| {
            restore_floor(&mut summary.text, &preserved_floor(file, config));
            summary
        }))
    }

    /// Summarize at `config.level`, falling back to the truncator at
    /// `target_ratio` of the file's tokens when no strategy applies
    pub fn summarize(&self, file: &FileEntry, config: &SummarizationConfig) -> Summary {
        match self.render(file, config) {
            Some(Ok(summary)) => summary,
            Some(Err(e)) => {
                log::warn!("{}: {}; falling back to truncation", file.path, e);
                self.fallback(file, config)
            }
            None => self.fallback(file, config),
        }
    }

    fn fallback(&self, file: &FileEntry, config: &SummarizationConfig) -> Summary {
        let tokens = self.truncator.count(&file.content);
        let target = (tokens as f64 * config.target_ratio).floor() as u64;
        self.truncate(file, target, config)
    }

    /// Structure-agnostic truncation to `target` tokens, keeping the floor
    pub fn truncate(&self, file: &FileEntry, target: u64, config: &SummarizationConfig) -> Summary {
        let floor = preserved_floor(file, config);
        let truncation = self.truncator.truncate(file, target, &floor);
        Summary { text: truncation.text, level: CompressionLevel::Minimal, truncated: true }
    }
}

/// Prepend floor statements a rendering left out
fn restore_floor(text: &mut String, floor: &[String]) {
    let missing: Vec<&str> = floor
        .iter()
        .filter(|stmt| !text.contains(stmt.as_str()))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        return;
    }
    let mut restored = missing.join("\n");
    if !text.is_empty() {
        restored.push_str("\n\n");
        restored.push_str(text);
    } else {
        restored.push('\n');
    }
    *text = restored;
}

/// Statements that must survive every compression level of `file`
pub fn preserved_floor(file: &FileEntry, config: &SummarizationConfig) -> Vec<String> {
    let Some(syntax) = Syntax::of(file) else {
        return Vec::new();
    };
    let mut floor = Vec::new();
    for statement in lexical_statements(&file.content, syntax) {
        let wanted = match statement.kind {
            StatementKind::Import => config.preserve_imports,
            StatementKind::Export => config.preserve_exports,
        };
        if !wanted {
            continue;
        }
        if statement.text.lines().count() > MAX_FLOOR_STATEMENT_LINES {
            log::debug!("{}: statement too long for the preserved floor", file.path);
            continue;
        }
        if !floor.contains(&statement.text) {
            floor.push(statement.text);
        }
    }
    floor
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatementKind {
    Import,
    Export,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Statement {
    pub(crate) kind: StatementKind,
    pub(crate) text: String,
    /// First and one-past-last line index
    pub(crate) lines: (usize, usize),
}

/// Top-level import and standalone export statements, found lexically
pub(crate) fn lexical_statements(content: &str, syntax: Syntax) -> Vec<Statement> {
    let lines: Vec<&str> = content.lines().collect();
    let mut statements = Vec::new();
    let mut open_string: Option<&'static str> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if open_string.is_some() {
            open_string = triple_quote_state(line, open_string);
            i += 1;
            continue;
        }
        let kind = match syntax {
            Syntax::Python => python_statement_kind(line),
            Syntax::Script => script_statement_kind(line),
        };
        let Some(kind) = kind else {
            if syntax == Syntax::Python {
                open_string = triple_quote_state(line, None);
            }
            i += 1;
            continue;
        };

        let start = i;
        let mut depth = bracket_delta(line, syntax);
        let mut continued = syntax == Syntax::Python && line.trim_end().ends_with('\\');
        let mut text = line.trim_end().to_owned();
        i += 1;
        while i < lines.len()
            && (depth > 0
                || continued
                || (syntax == Syntax::Script
                    && kind == StatementKind::Import
                    && !script_import_complete(&text)))
        {
            depth += bracket_delta(lines[i], syntax);
            continued = syntax == Syntax::Python && lines[i].trim_end().ends_with('\\');
            text.push('\n');
            text.push_str(lines[i].trim_end());
            i += 1;
        }
        statements.push(Statement { kind, text, lines: (start, i) });
    }
    statements
}

/// Triple-quote delimiter still open at the end of `line`, given the one
/// open at its start
fn triple_quote_state(line: &str, mut open: Option<&'static str>) -> Option<&'static str> {
    let mut rest = line;
    loop {
        match open {
            Some(delim) => match rest.find(delim) {
                Some(end) => {
                    rest = &rest[end + delim.len()..];
                    open = None;
                }
                None => return open,
            },
            None => {
                let next = ["\"\"\"", "'''"]
                    .into_iter()
                    .filter_map(|delim| rest.find(delim).map(|at| (at, delim)))
                    .min_by_key(|(at, _)| *at);
                let (at, delim) = next?;
                if rest[..at].contains('#') {
                    return None;
                }
                rest = &rest[at + delim.len()..];
                open = Some(delim);
            }
        }
    }
}

fn python_statement_kind(line: &str) -> Option<StatementKind> {
    if line.starts_with("import ") || (line.starts_with("from ") && line.contains(" import")) {
        Some(StatementKind::Import)
    } else if line.starts_with("__all__") {
        let rest = line["__all__".len()..].trim_start();
        (rest.starts_with('=') || rest.starts_with("+=")).then_some(StatementKind::Export)
    } else {
        None
    }
}

fn script_statement_kind(line: &str) -> Option<StatementKind> {
    let is_import = line.starts_with("import ")
        || line.starts_with("import{")
        || line.starts_with("import'")
        || line.starts_with("import\"")
        || static_regex!(r"^(?:const|let|var)\s+[\w{}\s,:]+=\s*require\(").is_match(line);
    if is_import {
        return Some(StatementKind::Import);
    }
    let is_export = line.starts_with("export {")
        || line.starts_with("export{")
        || line.starts_with("export *")
        || line.starts_with("export type {")
        || line.starts_with("module.exports")
        || static_regex!(r"^exports\.\w+\s*=").is_match(line)
        || (line.starts_with("export default ")
            && !static_regex!(
                r"^export default (?:async\s+)?(?:function|class|abstract|interface|enum)\b"
            )
            .is_match(line));
    is_export.then_some(StatementKind::Export)
}

fn script_import_complete(text: &str) -> bool {
    let trimmed = text.trim_end();
    trimmed.ends_with(';')
        || static_regex!(r#"\bfrom\s*['"][^'"]*['"]\s*$"#).is_match(trimmed)
        || static_regex!(r#"^import\s*['"][^'"]*['"]\s*$"#).is_match(trimmed)
        || static_regex!(r"require\([^)]*\)\s*$").is_match(trimmed)
}

/// Net bracket depth change of a line, ignoring strings and comments
pub(crate) fn bracket_delta(line: &str, syntax: Syntax) -> i32 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev = '\0';
    for c in line.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            prev = c;
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '#' if syntax == Syntax::Python => break,
            '/' if prev == '/' => break,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        prev = c;
    }
    depth
}

/// Comment prefix for marker lines, by path
pub(crate) fn line_comment(path: &str) -> Option<&'static str> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "py" | "pyw" | "pyi" | "rb" | "sh" | "bash" | "zsh" | "yaml" | "yml" | "toml" | "r"
        | "pl" | "cfg" | "ini" | "conf" | "mk" => Some("#"),
        "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "mts" | "cts" | "rs" | "go" | "java"
        | "kt" | "swift" | "c" | "h" | "cc" | "cpp" | "hpp" | "cs" | "scala" | "dart"
        | "php" => Some("//"),
        "sql" | "lua" | "hs" => Some("--"),
        _ => match Path::new(path).file_name().and_then(|n| n.to_str()) {
            Some("Makefile" | "Dockerfile" | "Rakefile" | "Gemfile") => Some("#"),
            _ => None,
        },
    }
}

#[cfg(test)]
#[allow(clippy::str_to_string)]
mod tests {
    use super::*;

    fn engine() -> SummarizationEngine {
        SummarizationEngine::with_defaults(Tokenizer::new(), TokenModel::Generic)
    }

    #[test]
    fn test_config_validation() {
        assert!(SummarizationConfig::default().validate().is_ok());
        assert!(SummarizationConfig::default().with_ratio(1.0).validate().is_ok());
        for bad in [0.0, -0.5, 1.01, f64::NAN] {
            assert!(matches!(
                SummarizationConfig::default().with_ratio(bad).validate(),
                Err(ConfigurationError::InvalidRatio(_))
            ));
        }
    }

    #[test]
    fn test_python_floor() {
        let file = FileEntry::new(
            "pkg/mod.py",
            "import os\nfrom typing import (\n    List,\n    Dict,\n)\n\n__all__ = [\n    'run',\n]\n\ndef run():\n    import json\n",
        );
        let floor = preserved_floor(&file, &SummarizationConfig::default());
        assert_eq!(
            floor,
            vec![
                "import os".to_owned(),
                "from typing import (\n    List,\n    Dict,\n)".to_owned(),
                "__all__ = [\n    'run',\n]".to_owned(),
            ]
        );

        let no_exports = SummarizationConfig { preserve_exports: false, ..Default::default() };
        assert_eq!(preserved_floor(&file, &no_exports).len(), 2);
    }

    #[test]
    fn test_python_floor_skips_string_literals() {
        let file = FileEntry::new(
            "pkg/usage.py",
            "import os\n\nUSAGE = \"\"\"\nimport fake\nfrom nowhere import thing\n\"\"\"\n\nHELP = '''one line''' \nfrom real import thing\n\ndef f():\n    '''\nimport also_fake\n'''\n",
        );
        let floor = preserved_floor(&file, &SummarizationConfig::default());
        assert_eq!(floor, vec!["import os".to_owned(), "from real import thing".to_owned()]);

        assert_eq!(triple_quote_state("x = '''a''' + \"\"\"", None), Some("\"\"\""));
        assert_eq!(triple_quote_state("# '''", None), None);
        assert_eq!(triple_quote_state("end''' ", Some("'''")), None);
    }

    #[test]
    fn test_script_floor() {
        let file = FileEntry::new(
            "src/app.ts",
            "import {\n  a,\n  b,\n} from './ab';\nimport './side-effect';\nconst fs = require('fs');\n\nexport function f() {}\nexport { a as c };\nexport default app;\n",
        );
        let floor = preserved_floor(&file, &SummarizationConfig::default());
        assert_eq!(floor.len(), 5);
        assert_eq!(floor[0], "import {\n  a,\n  b,\n} from './ab';");
        assert_eq!(floor[2], "const fs = require('fs');");
        assert_eq!(floor[3], "export { a as c };");
        assert_eq!(floor[4], "export default app;");
    }

    #[test]
    fn test_bracket_delta_ignores_strings() {
        assert_eq!(bracket_delta("foo(\"(\", '[')", Syntax::Script), 0);
        assert_eq!(bracket_delta("x = {  # }", Syntax::Python), 1);
        assert_eq!(bracket_delta("call(a, // )", Syntax::Script), 1);
    }

    #[test]
    fn test_dispatch_falls_back_on_parse_error() {
        let engine = engine();
        let broken = FileEntry::new(
            "bad.py",
            "import os\n\ndef broken(:\n    return (\n".repeat(20),
        );
        let summary = engine.summarize(&broken, &SummarizationConfig::default());
        assert!(summary.truncated);
        assert!(!summary.text.is_empty());
        assert!(summary.text.contains("import os"));
    }

    #[test]
    fn test_full_level_is_identity() {
        let engine = engine();
        let file = FileEntry::new("a.py", "def f():\n    return 1\n");
        let config = SummarizationConfig::default().at_level(CompressionLevel::Full);
        let summary = engine.summarize(&file, &config);
        assert_eq!(summary.text, file.content);
        assert_eq!(summary.level, CompressionLevel::Full);
    }

    #[test]
    fn test_toml_dispatches_to_schema() {
        let engine = engine();
        assert_eq!(engine.strategy_name(LanguageTag::Toml), "schema");
        let file = FileEntry::new("Cargo.toml", "[package]\nname = \"demo\"\n\n[dependencies]\nserde = \"1\"\n");
        let config = SummarizationConfig::default().at_level(CompressionLevel::Minimal);
        let summary = engine.summarize(&file, &config);
        assert!(!summary.truncated);
        assert!(summary.text.contains("<object: 1 keys>"));
    }

    #[test]
    fn test_unregistered_tag_uses_truncator() {
        let engine = SummarizationEngine::builder(Tokenizer::new(), TokenModel::Generic).build();
        let file = FileEntry::new("notes.md", "# Title\n\nSome words here.\n".repeat(30));
        assert_eq!(engine.strategy_name(LanguageTag::Markdown), "truncate");
        let summary = engine.summarize(&file, &SummarizationConfig::default());
        assert!(summary.truncated);
    }
}
