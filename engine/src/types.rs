//! Core type definitions for contextfit

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::SystemTime;

/// Closed set of language families the engine distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LanguageTag {
    /// Python and other indentation-scoped scripting code
    Python,
    /// JavaScript, TypeScript and JSX/TSX
    JsLike,
    Json,
    Yaml,
    Toml,
    Markdown,
    /// Test suites in any language
    Test,
    Other,
}

impl LanguageTag {
    /// Detect the tag from a relative path. Test conventions win over extension.
    pub fn detect(path: &str) -> Self {
        if is_test_path(path) {
            return Self::Test;
        }
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "py" | "pyw" | "pyi" => Self::Python,
            "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "mts" | "cts" => Self::JsLike,
            "json" => Self::Json,
            "yaml" | "yml" => Self::Yaml,
            "toml" => Self::Toml,
            "md" | "markdown" | "rst" | "txt" => Self::Markdown,
            _ => Self::Other,
        }
    }

    /// Get tag name as string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JsLike => "js-like",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Markdown => "markdown",
            Self::Test => "test",
            Self::Other => "other",
        }
    }

    /// Whether the tag carries program code
    pub fn is_code(&self) -> bool {
        matches!(self, Self::Python | Self::JsLike | Self::Test | Self::Other)
    }

    /// Fence language hint for rendered output
    pub fn fence_hint(&self, path: &str) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JsLike => {
                if path.ends_with(".ts") || path.ends_with(".tsx") {
                    "typescript"
                } else {
                    "javascript"
                }
            }
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Markdown => "markdown",
            Self::Test | Self::Other => {
                match Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or("") {
                    "py" => "python",
                    "js" | "jsx" => "javascript",
                    "ts" | "tsx" => "typescript",
                    "rs" => "rust",
                    "go" => "go",
                    "java" => "java",
                    "rb" => "ruby",
                    "sh" => "bash",
                    _ => "",
                }
            }
        }
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Test file naming conventions (file name and directory based)
fn is_test_path(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    let lower = normalized.to_lowercase();
    let name = lower.rsplit('/').next().unwrap_or(&lower);

    let has_code_ext = [".py", ".js", ".ts", ".jsx", ".tsx", ".rs", ".go", ".rb", ".java"]
        .iter()
        .any(|ext| name.ends_with(ext));
    if !has_code_ext {
        return false;
    }

    name.starts_with("test_")
        || name.contains("_test.")
        || name.contains(".test.")
        || name.contains(".spec.")
        || name.contains("_spec.")
        || normalized.rsplit('/').next().is_some_and(|n| n.starts_with("Test") || n.contains("Test."))
        || lower.starts_with("tests/")
        || lower.starts_with("test/")
        || lower.contains("/tests/")
        || lower.contains("/test/")
        || lower.contains("__tests__/")
}

/// One discovered file, immutable for the lifetime of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the repository root, unique within a run
    pub path: String,
    /// Original content
    pub content: String,
    /// Detected language family
    pub language: LanguageTag,
    /// Content size in bytes
    pub size_bytes: u64,
    /// Last modification time, used as scoring input only
    #[serde(skip)]
    pub modified: Option<SystemTime>,
}

impl FileEntry {
    /// Create a new entry, detecting the language from the path
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let content = content.into();
        Self {
            language: LanguageTag::detect(&path),
            size_bytes: content.len() as u64,
            path,
            content,
            modified: None,
        }
    }

    /// Override the detected language
    pub fn with_language(mut self, language: LanguageTag) -> Self {
        self.language = language;
        self
    }

    /// Attach a modification time
    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Get filename without directories
    pub fn filename(&self) -> &str {
        self.path.rsplit(['/', '\\']).next().unwrap_or(&self.path)
    }

    /// Number of path components, used for tie breaking
    pub fn depth(&self) -> usize {
        self.path.split(['/', '\\']).filter(|c| !c.is_empty()).count()
    }
}

/// Compression levels, ordered from finest to coarsest
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    #[default]
    Full,
    Signatures,
    Docstrings,
    Outline,
    Minimal,
}

impl CompressionLevel {
    /// All levels from finest to coarsest
    pub const LADDER: [CompressionLevel; 5] =
        [Self::Full, Self::Signatures, Self::Docstrings, Self::Outline, Self::Minimal];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Signatures => "signatures",
            Self::Docstrings => "docstrings",
            Self::Outline => "outline",
            Self::Minimal => "minimal",
        }
    }

    /// Levels from `self` down to MINIMAL
    pub fn descending(self) -> impl Iterator<Item = CompressionLevel> {
        Self::LADDER.into_iter().filter(move |l| *l >= self)
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionLevel {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "signatures" => Ok(Self::Signatures),
            "docstrings" => Ok(Self::Docstrings),
            "outline" => Ok(Self::Outline),
            "minimal" => Ok(Self::Minimal),
            _ => Err(ConfigurationError::UnknownName {
                kind: "compression level",
                value: s.to_owned(),
            }),
        }
    }
}

/// Kind of a declaration found by the structural parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Enum,
    TypeAlias,
    Constant,
    Variable,
}

impl SymbolKind {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Enum => "enum",
            Self::TypeAlias => "type",
            Self::Constant => "constant",
            Self::Variable => "variable",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the optimizer did with a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Treatment {
    /// Included verbatim
    Kept,
    /// Reduced by a summarization strategy
    Summarized,
    /// Cut by the generic truncator
    Truncated,
    /// Nothing of the file fits
    Dropped,
}

impl Treatment {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Kept => "kept",
            Self::Summarized => "summarized",
            Self::Truncated => "truncated",
            Self::Dropped => "dropped",
        }
    }
}

/// A file as materialized by one optimizer run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedFile {
    pub path: String,
    pub language: LanguageTag,
    /// Original size in bytes
    pub original_size: u64,
    /// Final size in bytes
    pub final_size: u64,
    pub original_tokens: u64,
    pub final_tokens: u64,
    /// Final content
    pub content: String,
    /// Compression level actually applied
    pub level: CompressionLevel,
    pub treatment: Treatment,
    /// Whether an external LLM refinement was accepted
    pub llm_refined: bool,
    /// Importance score used for the decision
    pub importance: f64,
    /// Levels tried while fitting the file, in order
    pub attempted_levels: Vec<CompressionLevel>,
}

impl OptimizedFile {
    /// Fraction of the original tokens that survived
    pub fn retention(&self) -> f64 {
        if self.original_tokens == 0 {
            1.0
        } else {
            self.final_tokens as f64 / self.original_tokens as f64
        }
    }

    /// Whether the coarsest level was tried for this file
    pub fn minimal_attempted(&self) -> bool {
        self.attempted_levels.contains(&CompressionLevel::Minimal)
    }
}

/// Totals reported for a run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    pub file_count: usize,
    pub total_original_tokens: u64,
    pub total_final_tokens: u64,
    /// Capacity of the run's budget
    pub tokens_available: u64,
    pub fits_in_budget: bool,
    /// Total final tokens over total original tokens
    pub compression_ratio: f64,
    /// Model used for token counting
    pub model: String,
    /// Tokens emitted beyond the budget to honor preservation flags
    pub overflow_tokens: u64,
    /// The run stopped early; listed files are complete
    pub cancelled: bool,
    /// Category shares of capacity, including "consumed"
    pub allocation_ratio: Vec<(String, f64)>,
}

#[cfg(test)]
#[allow(clippy::str_to_string)]
mod tests {
    use super::*;

    #[test]
    fn test_language_detection() {
        assert_eq!(LanguageTag::detect("src/app.py"), LanguageTag::Python);
        assert_eq!(LanguageTag::detect("web/index.tsx"), LanguageTag::JsLike);
        assert_eq!(LanguageTag::detect("package.json"), LanguageTag::Json);
        assert_eq!(LanguageTag::detect(".github/ci.yml"), LanguageTag::Yaml);
        assert_eq!(LanguageTag::detect("Cargo.toml"), LanguageTag::Toml);
        assert_eq!(LanguageTag::detect("pyproject.toml").fence_hint("pyproject.toml"), "toml");
        assert_eq!(LanguageTag::detect("README.md"), LanguageTag::Markdown);
        assert_eq!(LanguageTag::detect("src/main.rs"), LanguageTag::Other);
        assert_eq!(LanguageTag::detect("Makefile"), LanguageTag::Other);
    }

    #[test]
    fn test_test_detection_wins() {
        assert_eq!(LanguageTag::detect("test_parser.py"), LanguageTag::Test);
        assert_eq!(LanguageTag::detect("src/util.spec.ts"), LanguageTag::Test);
        assert_eq!(LanguageTag::detect("tests/integration.rs"), LanguageTag::Test);
        assert_eq!(LanguageTag::detect("lib/__tests__/a.js"), LanguageTag::Test);
        // Fixtures under a test directory are not test code
        assert_eq!(LanguageTag::detect("tests/fixtures/data.json"), LanguageTag::Json);
        assert_eq!(LanguageTag::detect("src/contest.py"), LanguageTag::Python);
    }

    #[test]
    fn test_level_ordering() {
        assert!(CompressionLevel::Full < CompressionLevel::Signatures);
        assert!(CompressionLevel::Outline < CompressionLevel::Minimal);
        let from_docs: Vec<_> = CompressionLevel::Docstrings.descending().collect();
        assert_eq!(
            from_docs,
            vec![CompressionLevel::Docstrings, CompressionLevel::Outline, CompressionLevel::Minimal]
        );
        assert_eq!("Outline".parse::<CompressionLevel>(), Ok(CompressionLevel::Outline));
        assert!("tiny".parse::<CompressionLevel>().is_err());
    }

    #[test]
    fn test_file_entry_helpers() {
        let entry = FileEntry::new("src/pkg/mod.py", "x = 1\n");
        assert_eq!(entry.filename(), "mod.py");
        assert_eq!(entry.depth(), 3);
        assert_eq!(entry.size_bytes, 6);
        assert_eq!(entry.language, LanguageTag::Python);
    }
}
