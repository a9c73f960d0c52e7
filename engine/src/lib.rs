//! ContextFit Engine - fitting source files into LLM token budgets
//!
//! This crate decides, for a set of files and a token capacity, which files
//! are kept whole and which are compressed, and by how much:
//!
//! - Accurate token counting (tiktoken for OpenAI, estimation for others)
//! - Budget bookkeeping with named allocations
//! - Heuristic importance scoring with path directives
//! - Per-language summarization strategies over a five-level ladder
//! - Optional LLM refinement with caching and timeouts
//! - Markdown, JSON and HTML output
//!
//! # Example
//!
//! ```rust,ignore
//! use contextfit_engine::{Config, ContextOptimizer, FileEntry, OutputFormatter};
//!
//! let config = Config::load(Path::new("."), None)?;
//! let optimizer = ContextOptimizer::new(config.optimizer_options()?)?;
//! let result = optimizer.optimize(&files)?;
//! let output = OutputFormatter::by_format(config.output.format).format(&result);
//! ```

/// Lazily compiled regex for a literal pattern
macro_rules! static_regex {
    ($pattern:expr) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($pattern).expect("invalid static regex"))
    }};
}

// Core modules
pub mod budget;
pub mod error;
pub mod parser;
pub mod ranking;
pub mod tokenizer;
pub mod types;

// Compression
pub mod llm;
pub mod optimizer;
pub mod summarize;

// Surfaces
pub mod config;
pub mod output;

pub use budget::{BudgetSpec, ContextWindow, TokenBudget};
pub use config::{Config, ConfigFormat};
pub use error::{CapacityError, ConfigurationError, Error, Result};
pub use llm::{LlmSettings, Provider, ProviderError, RefineHint, Refiner};
pub use optimizer::{
    CancellationToken, ContextOptimizer, OptimizationResult, OptimizerOptions, RunState,
};
pub use output::{Formatter, OutputFormat, OutputFormatter};
pub use parser::{Language, ParserError};
pub use ranking::{
    rank_order, Factor, FactorWeights, ImportanceScore, ImportanceScorer, PathDirective,
};
pub use summarize::{
    StrategyError, SummarizationConfig, SummarizationEngine, Summarizer, Summary,
};
pub use tokenizer::{TokenModel, Tokenizer};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.chars().any(|c| c.is_ascii_digit()));
    }
}
