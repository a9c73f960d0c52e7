//! Token counting per model family
//!
//! OpenAI model families are counted exactly with tiktoken; every other family
//! falls back to a character-class estimate. BPE tables are built lazily, once
//! per process, and never invalidated.

use crate::error::ConfigurationError;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tiktoken_rs::{cl100k_base, o200k_base, CoreBPE};

/// Characters per token assumed by the model-independent fast path
pub const ESTIMATE_CHARS_PER_TOKEN: usize = 4;

/// Model family whose tokenizer defines a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TokenModel {
    /// Anthropic models, estimated at 3.5 chars/token
    #[default]
    Claude,
    /// Exact o200k_base counts
    Gpt4o,
    /// Exact cl100k_base counts (GPT-4 and GPT-3.5)
    Gpt4,
    /// Estimated at 3.8 chars/token
    Gemini,
    Llama,
    /// Finer-grained on code, 3.2 chars/token
    CodeLlama,
    /// Exactly one token per four bytes, rounded up
    Generic,
}

impl TokenModel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gpt4o => "gpt-4o",
            Self::Gpt4 => "gpt-4",
            Self::Gemini => "gemini",
            Self::Llama => "llama",
            Self::CodeLlama => "codellama",
            Self::Generic => "generic",
        }
    }

    /// Average bytes per token used by the estimator
    pub fn chars_per_token(&self) -> f32 {
        match self {
            Self::Claude => 3.5,
            Self::Gpt4o => 4.0,
            Self::Gpt4 => 3.7,
            Self::Gemini => 3.8,
            Self::Llama => 3.5,
            Self::CodeLlama => 3.2,
            Self::Generic => ESTIMATE_CHARS_PER_TOKEN as f32,
        }
    }

    /// Counted with a real BPE table rather than estimated
    pub fn has_exact_tokenizer(&self) -> bool {
        matches!(self, Self::Gpt4o | Self::Gpt4)
    }

    /// All model identifiers accepted by `from_str`
    pub fn known_names() -> &'static [&'static str] {
        &["claude", "gpt-4o", "gpt-4", "gpt-3.5", "gemini", "llama", "codellama", "generic"]
    }
}

impl fmt::Display for TokenModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TokenModel {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claude" | "claude-3" | "claude-2" | "anthropic" => Ok(Self::Claude),
            "gpt-4o" | "gpt4o" | "o200k" => Ok(Self::Gpt4o),
            "gpt-4" | "gpt4" | "gpt-4-turbo" | "gpt-3.5" | "gpt-3.5-turbo" | "cl100k" => {
                Ok(Self::Gpt4)
            }
            "gemini" => Ok(Self::Gemini),
            "llama" | "llama-2" | "llama-3" => Ok(Self::Llama),
            "codellama" => Ok(Self::CodeLlama),
            "generic" | "estimate" => Ok(Self::Generic),
            other => Err(ConfigurationError::UnknownModel(other.to_owned())),
        }
    }
}

/// BPE tables, built on first use; `None` when construction failed
static GPT4O_TOKENIZER: OnceLock<Option<CoreBPE>> = OnceLock::new();
static GPT4_TOKENIZER: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn o200k() -> Option<&'static CoreBPE> {
    GPT4O_TOKENIZER
        .get_or_init(|| match o200k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                log::warn!("o200k_base tokenizer unavailable, estimating instead: {}", e);
                None
            }
        })
        .as_ref()
}

fn cl100k() -> Option<&'static CoreBPE> {
    GPT4_TOKENIZER
        .get_or_init(|| match cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                log::warn!("cl100k_base tokenizer unavailable, estimating instead: {}", e);
                None
            }
        })
        .as_ref()
}

/// Token counter: BPE where a table exists, estimation otherwise
#[derive(Debug, Clone, Copy)]
pub struct Tokenizer {
    use_exact: bool,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    /// Counter using BPE tables when the model has one
    pub fn new() -> Self {
        Self { use_exact: true }
    }

    /// Counter that never loads a BPE table
    pub fn estimation_only() -> Self {
        Self { use_exact: false }
    }

    /// Count tokens for a specific model. Deterministic for a (text, model) pair.
    pub fn count(&self, text: &str, model: TokenModel) -> u64 {
        if text.is_empty() {
            return 0;
        }

        match model {
            TokenModel::Generic => estimate(text),
            _ if self.use_exact && model.has_exact_tokenizer() => self.count_exact(text, model),
            _ => self.estimate_for(text, model),
        }
    }

    fn count_exact(&self, text: &str, model: TokenModel) -> u64 {
        let bpe = match model {
            TokenModel::Gpt4o => o200k(),
            TokenModel::Gpt4 => cl100k(),
            _ => None,
        };
        match bpe {
            Some(bpe) => bpe.encode_ordinary(text).len() as u64,
            None => self.estimate_for(text, model),
        }
    }

    /// Character-class estimate: length over the model ratio, less for
    /// spaces and more for newlines and, on code-tuned models, punctuation
    fn estimate_for(&self, text: &str, model: TokenModel) -> u64 {
        let (mut spaces, mut newlines, mut punctuation) = (0u32, 0u32, 0u32);
        for c in text.chars() {
            match c {
                ' ' | '\t' => spaces += 1,
                '\n' => newlines += 1,
                c if is_punctuation(c) => punctuation += 1,
                _ => {},
            }
        }

        let punctuation_weight = match model {
            TokenModel::CodeLlama | TokenModel::Claude => 0.3,
            _ => 0.0,
        };
        let estimate = text.len() as f32 / model.chars_per_token() - spaces as f32 * 0.3
            + newlines as f32 * 0.5
            + punctuation as f32 * punctuation_weight;
        estimate.ceil().max(1.0) as u64
    }

    /// Longest prefix of `text` whose count is within `budget`, cut on a char boundary
    pub fn truncate_to_budget<'a>(&self, text: &'a str, model: TokenModel, budget: u64) -> &'a str {
        if self.count(text, model) <= budget {
            return text;
        }

        // Largest prefix within budget
        let mut low = 0usize;
        let mut high = text.len();

        while low < high {
            let mid = floor_char_boundary(text, (low + high).div_ceil(2));
            if mid <= low {
                break;
            }
            if self.count(&text[..mid], model) <= budget {
                low = mid;
            } else {
                high = mid - 1;
            }
        }

        // Estimators are not strictly monotone in prefix length
        let mut end = floor_char_boundary(text, low);
        while end > 0 && self.count(&text[..end], model) > budget {
            end = floor_char_boundary(text, end - 1);
        }
        &text[..end]
    }

    /// Whether `text` costs more than `budget` tokens
    pub fn exceeds_budget(&self, text: &str, model: TokenModel, budget: u64) -> bool {
        self.count(text, model) > budget
    }
}

fn is_punctuation(c: char) -> bool {
    matches!(
        c,
        '{' | '}' | '(' | ')' | '[' | ']' | ';' | ':' | ',' | '.' | '=' | '+' | '-' | '*' | '/'
            | '<' | '>' | '!' | '&' | '|' | '@' | '#' | '$' | '%' | '^' | '~' | '`' | '"' | '\''
    )
}

/// Model-independent fast estimate: a fixed characters-per-token ratio
pub fn estimate(text: &str) -> u64 {
    text.len().div_ceil(ESTIMATE_CHARS_PER_TOKEN) as u64
}

/// Largest char boundary at or below `index`
pub(crate) fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNIPPET: &str = "def greet(name):\n    return f'hi {name}'\n";

    #[test]
    fn test_bpe_models_count_small_snippets() {
        let tokenizer = Tokenizer::new();
        for model in [TokenModel::Gpt4o, TokenModel::Gpt4] {
            let n = tokenizer.count(SNIPPET, model);
            assert!((5..30).contains(&n), "{}: {}", model, n);
        }
        assert!(tokenizer.count("ok", TokenModel::Gpt4o) <= 2);
    }

    #[test]
    fn test_estimated_models_are_in_range() {
        let tokenizer = Tokenizer::new();
        for model in [TokenModel::Claude, TokenModel::Gemini, TokenModel::Llama, TokenModel::CodeLlama] {
            let n = tokenizer.count(SNIPPET, model);
            assert!((5..40).contains(&n), "{}: {}", model, n);
        }
    }

    #[test]
    fn test_punctuation_costs_more_on_code_models() {
        let tokenizer = Tokenizer::estimation_only();
        let text = "a(b[c]{d});".repeat(10);
        assert!(tokenizer.count(&text, TokenModel::CodeLlama) > tokenizer.count(&text, TokenModel::Llama));
    }

    #[test]
    fn test_generic_is_bytes_over_four() {
        let tokenizer = Tokenizer::new();
        assert_eq!(tokenizer.count("abcd", TokenModel::Generic), 1);
        assert_eq!(tokenizer.count("abcde", TokenModel::Generic), 2);
        assert_eq!(tokenizer.count(&"x".repeat(320), TokenModel::Generic), 80);
        assert_eq!(estimate("abcdefgh"), 2);
    }

    #[test]
    fn test_empty_text_is_free() {
        let tokenizer = Tokenizer::new();
        for model in [TokenModel::Claude, TokenModel::Gpt4o, TokenModel::Generic] {
            assert_eq!(tokenizer.count("", model), 0);
        }
        assert_eq!(estimate(""), 0);
    }

    #[test]
    fn test_repeat_counts_agree() {
        let tokenizer = Tokenizer::new();
        for model in [TokenModel::Claude, TokenModel::Gpt4, TokenModel::Llama] {
            assert_eq!(tokenizer.count(SNIPPET, model), tokenizer.count(SNIPPET, model));
        }
    }

    #[test]
    fn test_model_parsing() {
        assert_eq!("gpt-4o".parse::<TokenModel>(), Ok(TokenModel::Gpt4o));
        assert_eq!("GPT-3.5-turbo".parse::<TokenModel>(), Ok(TokenModel::Gpt4));
        assert_eq!("claude".parse::<TokenModel>(), Ok(TokenModel::Claude));
        for name in TokenModel::known_names() {
            assert!(name.parse::<TokenModel>().is_ok(), "{}", name);
        }
        assert!(matches!(
            "gpt-17".parse::<TokenModel>(),
            Err(ConfigurationError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_truncate_to_budget() {
        let tokenizer = Tokenizer::new();
        let text = SNIPPET.repeat(8);

        for model in [TokenModel::Gpt4, TokenModel::Claude, TokenModel::Generic] {
            let cut = tokenizer.truncate_to_budget(&text, model, 10);
            assert!(tokenizer.count(cut, model) <= 10);
            assert!(cut.len() < text.len());
            assert!(text.starts_with(cut));
            assert!(!tokenizer.exceeds_budget(cut, model, 10));
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let tokenizer = Tokenizer::new();
        let text = "héllo wörld ünïcödé ".repeat(10);
        let cut = tokenizer.truncate_to_budget(&text, TokenModel::Generic, 7);
        assert!(cut.len() <= 28);
        assert!(text.starts_with(cut));
    }
}
