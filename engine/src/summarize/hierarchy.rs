//! Heading hierarchy summaries for prose documents

use super::{StrategyError, Summarizer, Summary, SummarizationConfig};
use crate::tokenizer::floor_char_boundary;
use crate::types::{CompressionLevel, FileEntry};

/// Deepest heading kept at the minimal level
const MINIMAL_MAX_DEPTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    /// 0 for text before the first heading
    depth: usize,
    heading: String,
    paragraph: Option<String>,
}

/// Summarizes documents by headings and opening paragraphs
pub struct HierarchyStrategy;

impl Default for HierarchyStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchyStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Summarizer for HierarchyStrategy {
    fn name(&self) -> &'static str {
        "hierarchy"
    }

    fn summarize(
        &self,
        file: &FileEntry,
        config: &SummarizationConfig,
    ) -> Result<Summary, StrategyError> {
        let sections = sections(&file.content);
        if sections.iter().all(|s| s.depth == 0) {
            return Err(StrategyError::InvalidData {
                format: "markdown",
                message: "no headings found".to_owned(),
            });
        }

        let mut out = String::new();
        for section in &sections {
            let keep_heading = match config.level {
                CompressionLevel::Minimal => (1..=MINIMAL_MAX_DEPTH).contains(&section.depth),
                _ => section.depth > 0,
            };
            let keep_paragraph = !matches!(
                config.level,
                CompressionLevel::Outline | CompressionLevel::Minimal
            );
            if keep_heading {
                out.push_str(&section.heading);
                out.push('\n');
            }
            if let (true, Some(paragraph)) = (keep_paragraph, &section.paragraph) {
                if section.depth > 0 {
                    out.push('\n');
                }
                out.push_str(&cap(paragraph, config.section_char_cap));
                out.push_str("\n\n");
            }
        }
        if !out.ends_with('\n') {
            out.push('\n');
        }
        Ok(Summary { text: out, level: config.level, truncated: false })
    }
}

fn atx_depth(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    let rest = &trimmed[hashes..];
    ((1..=6).contains(&hashes) && (rest.is_empty() || rest.starts_with(' '))).then_some(hashes)
}

fn setext_depth(underline: &str) -> Option<usize> {
    let t = underline.trim();
    if t.len() < 2 {
        None
    } else if t.chars().all(|c| c == '=') {
        Some(1)
    } else if t.chars().all(|c| c == '-') {
        Some(2)
    } else {
        None
    }
}

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

fn sections(content: &str) -> Vec<Section> {
    let lines: Vec<&str> = content.lines().collect();
    let mut sections = vec![Section { depth: 0, heading: String::new(), paragraph: None }];
    let mut paragraph: Vec<&str> = Vec::new();
    let mut paragraph_done = false;
    let mut in_fence = false;
    let mut i = 0;

    let flush = |sections: &mut Vec<Section>, paragraph: &mut Vec<&str>| {
        if let (Some(last), false) = (sections.last_mut(), paragraph.is_empty()) {
            if last.paragraph.is_none() {
                last.paragraph = Some(paragraph.join("\n"));
            }
        }
        paragraph.clear();
    };

    while i < lines.len() {
        let line = lines[i];
        if is_fence(line) {
            in_fence = !in_fence;
            if !paragraph.is_empty() {
                flush(&mut sections, &mut paragraph);
                paragraph_done = true;
            }
            i += 1;
            continue;
        }
        if in_fence {
            i += 1;
            continue;
        }

        let next_underline = lines
            .get(i + 1)
            .filter(|_| !line.trim().is_empty() && paragraph.is_empty())
            .and_then(|next| setext_depth(next));
        let heading = match (atx_depth(line), next_underline) {
            (Some(depth), _) => Some((depth, line.trim_end().to_owned(), 1)),
            (None, Some(depth)) => {
                Some((depth, format!("{}\n{}", line.trim_end(), lines[i + 1].trim_end()), 2))
            }
            _ => None,
        };

        if let Some((depth, text, consumed)) = heading {
            flush(&mut sections, &mut paragraph);
            sections.push(Section { depth, heading: text, paragraph: None });
            paragraph_done = false;
            i += consumed;
            continue;
        }

        if line.trim().is_empty() {
            if !paragraph.is_empty() {
                flush(&mut sections, &mut paragraph);
                paragraph_done = true;
            }
        } else if !paragraph_done {
            paragraph.push(line.trim_end());
        }
        i += 1;
    }
    flush(&mut sections, &mut paragraph);

    if sections[0].paragraph.is_none() {
        sections.remove(0);
    }
    sections
}

/// Cut prose at a word boundary within `limit` bytes
fn cap(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_owned();
    }
    let end = floor_char_boundary(text, limit);
    let cut = text[..end].rfind(char::is_whitespace).filter(|&i| i > 0).unwrap_or(end);
    format!("{}...", text[..cut].trim_end())
}

#[cfg(test)]
#[allow(clippy::str_to_string)]
mod tests {
    use super::*;

    const README: &str = "Intro line before headings.\n\n# Project\n\nA tool that does things.\nIt spans two lines.\n\nSecond paragraph is dropped.\n\n## Install\n\n```sh\n# not a heading\ncargo install project\n```\n\nRun the installer.\n\n### Details\n\nDeep text.\n\nUsage\n-----\n\nCall it.\n";

    fn summarize(level: CompressionLevel, cap: usize) -> String {
        let config = SummarizationConfig { section_char_cap: cap, ..Default::default() }.at_level(level);
        HierarchyStrategy::new().summarize(&FileEntry::new("README.md", README), &config).unwrap().text
    }

    #[test]
    fn test_sections() {
        let sections = sections(README);
        let headings: Vec<_> = sections.iter().map(|s| (s.depth, s.heading.as_str())).collect();
        assert_eq!(
            headings,
            vec![
                (0, ""),
                (1, "# Project"),
                (2, "## Install"),
                (3, "### Details"),
                (2, "Usage\n-----"),
            ]
        );
        assert_eq!(sections[1].paragraph.as_deref(), Some("A tool that does things.\nIt spans two lines."));
        assert_eq!(sections[2].paragraph.as_deref(), Some("Run the installer."));
    }

    #[test]
    fn test_signatures_keep_first_paragraphs() {
        let text = summarize(CompressionLevel::Signatures, 400);
        assert!(text.starts_with("Intro line before headings.\n\n# Project\n\nA tool that does things."));
        assert!(!text.contains("Second paragraph"));
        assert!(!text.contains("cargo install"));
        assert!(text.contains("## Install\n\nRun the installer.\n"));
    }

    #[test]
    fn test_paragraph_cap() {
        let text = summarize(CompressionLevel::Signatures, 12);
        assert!(text.contains("# Project\n\nA tool that...\n"));
    }

    #[test]
    fn test_outline_and_minimal() {
        let text = summarize(CompressionLevel::Outline, 400);
        assert_eq!(text, "# Project\n## Install\n### Details\nUsage\n-----\n");
        let text = summarize(CompressionLevel::Minimal, 400);
        assert_eq!(text, "# Project\n## Install\nUsage\n-----\n");
    }

    #[test]
    fn test_plain_text_without_headings() {
        let file = FileEntry::new("notes.txt", "just some words\n");
        let result = HierarchyStrategy::new().summarize(&file, &SummarizationConfig::default());
        assert!(result.is_err());
    }
}
