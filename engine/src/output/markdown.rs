//! Markdown output formatter

use crate::optimizer::OptimizationResult;
use crate::output::{treatment_note, Formatter};
use crate::types::OptimizedFile;
use std::fmt::{self, Write};

/// Markdown formatter with a stats table and fenced file sections
pub struct MarkdownFormatter {
    title: String,
    /// Include the stats table
    include_stats: bool,
    /// Include line numbers in code
    include_line_numbers: bool,
}

impl MarkdownFormatter {
    /// Create a new Markdown formatter
    pub fn new() -> Self {
        Self { title: "Context".to_owned(), include_stats: true, include_line_numbers: false }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set stats table option
    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.include_stats = enabled;
        self
    }

    /// Set line numbers option
    pub fn with_line_numbers(mut self, enabled: bool) -> Self {
        self.include_line_numbers = enabled;
        self
    }

    fn write_header(&self, output: &mut String, result: &OptimizationResult) -> fmt::Result {
        let meta = &result.metadata;
        writeln!(output, "# {}", self.title)?;
        writeln!(output)?;
        writeln!(
            output,
            "> **Files**: {} | **Tokens**: {} / {} | **Model**: {}",
            meta.file_count, meta.total_final_tokens, meta.tokens_available, meta.model
        )?;
        writeln!(output)?;
        if !meta.fits_in_budget {
            writeln!(
                output,
                "> **Warning**: output exceeds the budget by {} tokens",
                meta.total_final_tokens.saturating_sub(meta.tokens_available)
            )?;
            writeln!(output)?;
        }
        if meta.cancelled {
            writeln!(output, "> **Note**: run was cancelled; the file list is incomplete")?;
            writeln!(output)?;
        }
        Ok(())
    }

    fn write_stats(&self, output: &mut String, result: &OptimizationResult) -> fmt::Result {
        if !self.include_stats {
            return Ok(());
        }
        let meta = &result.metadata;

        writeln!(output, "## Overview")?;
        writeln!(output)?;
        writeln!(output, "| Metric | Value |")?;
        writeln!(output, "|--------|-------|")?;
        writeln!(output, "| Files | {} |", meta.file_count)?;
        writeln!(output, "| Original tokens | {} |", meta.total_original_tokens)?;
        writeln!(output, "| Final tokens | {} |", meta.total_final_tokens)?;
        writeln!(output, "| Budget | {} |", meta.tokens_available)?;
        writeln!(output, "| Compression | {:.1}% |", meta.compression_ratio * 100.0)?;
        writeln!(output, "| Fits | {} |", if meta.fits_in_budget { "yes" } else { "no" })?;
        writeln!(output)?;

        writeln!(output, "| File | Tokens | Treatment | Importance |")?;
        writeln!(output, "|------|--------|-----------|------------|")?;
        for file in &result.files {
            writeln!(
                output,
                "| `{}` | {} / {} | {} | {:.2} |",
                file.path,
                file.final_tokens,
                file.original_tokens,
                file.treatment.name(),
                file.importance
            )?;
        }
        writeln!(output)
    }

    fn write_file(&self, output: &mut String, file: &OptimizedFile) -> fmt::Result {
        writeln!(output, "### {}", file.path)?;
        writeln!(output)?;
        writeln!(output, "> {}", treatment_note(file))?;
        writeln!(output)?;
        if file.content.is_empty() {
            return Ok(());
        }

        let fence = fence_for(&file.content);
        writeln!(output, "{}{}", fence, file.language.fence_hint(&file.path))?;
        if self.include_line_numbers {
            for (i, line) in file.content.lines().enumerate() {
                writeln!(output, "{:4} {}", i + 1, line)?;
            }
        } else {
            output.push_str(&file.content);
            if !file.content.ends_with('\n') {
                output.push('\n');
            }
        }
        writeln!(output, "{}", fence)?;
        writeln!(output)
    }

    fn render(&self, result: &OptimizationResult) -> Result<String, fmt::Error> {
        let mut output = String::new();
        self.write_header(&mut output, result)?;
        self.write_stats(&mut output, result)?;
        writeln!(output, "## Files")?;
        writeln!(output)?;
        for file in &result.files {
            self.write_file(&mut output, file)?;
        }
        Ok(output)
    }
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter for MarkdownFormatter {
    fn format(&self, result: &OptimizationResult) -> String {
        self.render(result).unwrap_or_default()
    }

    fn name(&self) -> &'static str {
        "markdown"
    }
}

/// A backtick fence longer than any run inside `content`
fn fence_for(content: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in content.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

#[cfg(test)]
#[allow(clippy::str_to_string)]
mod tests {
    use super::*;
    use crate::output::tests::sample_result;

    #[test]
    fn test_markdown_output() {
        let output = MarkdownFormatter::new().with_title("demo").format(&sample_result());
        assert!(output.starts_with("# demo\n"));
        assert!(output.contains("## Overview"));
        assert!(output.contains("| Compression | 62.5% |"));
        assert!(output.contains("### src/util.py\n\n> summarized at outline level"));
        assert!(output.contains("```python\ndef helper(): ...\n```"));
    }

    #[test]
    fn test_line_numbers_and_no_stats() {
        let output = MarkdownFormatter::new()
            .with_stats(false)
            .with_line_numbers(true)
            .format(&sample_result());
        assert!(!output.contains("## Overview"));
        assert!(output.contains("   1 def main():"));
    }

    #[test]
    fn test_fence_outgrows_content() {
        assert_eq!(fence_for("plain"), "```");
        assert_eq!(fence_for("a ```rust``` b"), "````");
    }

    #[test]
    fn test_over_budget_warning() {
        let mut result = sample_result();
        result.metadata.fits_in_budget = false;
        result.metadata.tokens_available = 100;
        let output = MarkdownFormatter::new().format(&result);
        assert!(output.contains("exceeds the budget by 25 tokens"));
    }
}
