//! Renderers for optimization results

mod html;
mod markdown;

use crate::error::ConfigurationError;
use crate::optimizer::OptimizationResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use html::HtmlFormatter;
pub use markdown::MarkdownFormatter;

/// Output format type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown with fenced code blocks
    #[default]
    Markdown,
    /// Pretty JSON of files plus metadata
    Json,
    /// Self-contained HTML page
    Html,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [Self::Markdown, Self::Json, Self::Html];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Html => "html",
        }
    }

    /// Conventional file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "html" => Ok(Self::Html),
            _ => Err(ConfigurationError::UnknownName { kind: "output format", value: s.to_owned() }),
        }
    }
}

/// Output formatter trait
pub trait Formatter {
    /// Render a finished run
    fn format(&self, result: &OptimizationResult) -> String;

    /// Get format name
    fn name(&self) -> &'static str;
}

/// Output formatter factory
pub struct OutputFormatter;

impl OutputFormatter {
    pub fn markdown() -> MarkdownFormatter {
        MarkdownFormatter::new()
    }

    pub fn json() -> JsonFormatter {
        JsonFormatter
    }

    pub fn html() -> HtmlFormatter {
        HtmlFormatter::new()
    }

    /// Create formatter by format type
    pub fn by_format(format: OutputFormat) -> Box<dyn Formatter> {
        Self::by_format_with_title(format, None)
    }

    /// Create formatter with a document title (usually the repository name)
    pub fn by_format_with_title(format: OutputFormat, title: Option<&str>) -> Box<dyn Formatter> {
        match format {
            OutputFormat::Markdown => {
                let formatter = MarkdownFormatter::new();
                Box::new(match title {
                    Some(title) => formatter.with_title(title),
                    None => formatter,
                })
            }
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::Html => {
                let formatter = HtmlFormatter::new();
                Box::new(match title {
                    Some(title) => formatter.with_title(title),
                    None => formatter,
                })
            }
        }
    }
}

/// JSON formatter
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, result: &OptimizationResult) -> String {
        serde_json::to_string_pretty(result).unwrap_or_default()
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Human-readable note on what happened to a file
pub(crate) fn treatment_note(file: &crate::types::OptimizedFile) -> String {
    use crate::types::Treatment;

    let mut note = match file.treatment {
        Treatment::Kept => "kept in full".to_owned(),
        Treatment::Summarized => format!("summarized at {} level", file.level),
        Treatment::Truncated => "truncated".to_owned(),
        Treatment::Dropped => "dropped".to_owned(),
    };
    if file.treatment != Treatment::Kept {
        note.push_str(&format!(
            ", {} of {} tokens ({:.0}%)",
            file.final_tokens,
            file.original_tokens,
            file.retention() * 100.0
        ));
    }
    if file.llm_refined {
        note.push_str(", LLM refined");
    }
    note
}
