//! Structure-agnostic truncation
//!
//! Finds the longest prefix within a token target by binary search, backs off
//! to a line (for code, a statement) boundary, closes any brackets left open
//! and appends a marker noting what was omitted. The result is re-counted and
//! shrunk until it is within the target.

use super::{lexical_statements, line_comment, Syntax};
use crate::tokenizer::{TokenModel, Tokenizer};
use crate::types::{FileEntry, LanguageTag};

/// Lines searched backwards for a statement boundary
const STATEMENT_BACKOFF_LINES: usize = 12;

/// Shrink attempts before giving up on a body
const MAX_SHRINK_ROUNDS: usize = 16;

/// Result of truncating one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub text: String,
    pub omitted_lines: usize,
    pub omitted_bytes: usize,
}

/// Generic truncating fallback
#[derive(Debug, Clone, Copy)]
pub struct Truncator {
    tokenizer: Tokenizer,
    model: TokenModel,
}

impl Truncator {
    pub fn new(tokenizer: Tokenizer, model: TokenModel) -> Self {
        Self { tokenizer, model }
    }

    pub fn model(&self) -> TokenModel {
        self.model
    }

    /// Tokens in `text` under this truncator's model
    pub fn count(&self, text: &str) -> u64 {
        self.tokenizer.count(text, self.model)
    }

    /// Truncate `file` to at most `target` tokens. `floor` statements are
    /// always emitted, even when they alone exceed the target.
    pub fn truncate(&self, file: &FileEntry, target: u64, floor: &[String]) -> Truncation {
        if self.count(&file.content) <= target {
            return Truncation { text: file.content.clone(), omitted_lines: 0, omitted_bytes: 0 };
        }

        let body = strip_floor(file, floor);
        let head = if floor.is_empty() { String::new() } else { format!("{}\n\n", floor.join("\n")) };
        let lexicon = Lexicon::for_file(file);
        let comment = marker_style(file);

        let fixed = self.count(&head)
            + self.count(&marker(comment, body.lines().count(), body.len()))
            + 1;
        let mut budget = target.saturating_sub(fixed);

        for _ in 0..MAX_SHRINK_ROUNDS {
            if budget == 0 {
                break;
            }
            let kept = self.cut(&body, budget, lexicon.as_ref());
            if kept.is_empty() {
                break;
            }
            let omitted_lines = body.lines().count().saturating_sub(kept.lines().count());
            let omitted_bytes = body.len().saturating_sub(kept.len());
            let mut text = head.clone();
            text.push_str(&kept);
            if !text.ends_with('\n') {
                text.push('\n');
            }
            if omitted_bytes > 0 {
                text.push_str(&marker(comment, omitted_lines, omitted_bytes));
                text.push('\n');
            }

            let count = self.count(&text);
            if count <= target {
                return Truncation { text, omitted_lines, omitted_bytes };
            }
            let overshoot = count - target;
            budget = budget.saturating_sub(overshoot.max(budget / 4).max(1));
        }

        // Nothing of the body fits
        let omitted_lines = body.lines().count();
        let omitted_bytes = body.len();
        let with_marker = format!("{}{}\n", head, marker(comment, omitted_lines, omitted_bytes));
        let text = if self.count(&with_marker) <= target {
            with_marker
        } else if !head.is_empty() {
            format!("{}\n", floor.join("\n"))
        } else {
            String::new()
        };
        Truncation { text, omitted_lines, omitted_bytes }
    }

    /// Longest boundary-aligned prefix of `body` within `budget`, closed
    fn cut(&self, body: &str, budget: u64, lexicon: Option<&Lexicon>) -> String {
        let prefix = self.tokenizer.truncate_to_budget(body, self.model, budget);
        if prefix.len() == body.len() {
            return prefix.to_owned();
        }

        let mut end = match prefix.rfind('\n') {
            Some(pos) => pos + 1,
            None => match prefix.rfind(char::is_whitespace) {
                Some(pos) if pos > 0 => pos,
                _ => prefix.len(),
            },
        };

        if let Some(lexicon) = lexicon {
            end = statement_boundary(prefix, end, lexicon);
            let state = scan(&prefix[..end], lexicon);
            if let Some(start) = state.open_literal {
                // Never cut inside a multi-line string or comment
                end = prefix[..start].rfind('\n').map(|p| p + 1).unwrap_or(0);
            }
        }

        let mut kept = prefix[..end].to_owned();
        if let Some(lexicon) = lexicon {
            close_open_constructs(&mut kept, lexicon);
        }
        kept
    }
}

/// File content without the lines of the given floor statements
fn strip_floor(file: &FileEntry, floor: &[String]) -> String {
    let Some(syntax) = Syntax::of(file).filter(|_| !floor.is_empty()) else {
        return file.content.clone();
    };
    let mut drop = vec![false; file.content.lines().count()];
    for statement in lexical_statements(&file.content, syntax) {
        if floor.contains(&statement.text) {
            for flag in &mut drop[statement.lines.0..statement.lines.1] {
                *flag = true;
            }
        }
    }
    let mut body = String::with_capacity(file.content.len());
    let mut leading = true;
    for (line, dropped) in file.content.lines().zip(drop) {
        if dropped || (leading && line.trim().is_empty()) {
            continue;
        }
        leading = false;
        body.push_str(line);
        body.push('\n');
    }
    body
}

/// Latest line boundary at or before `end` where no bracket is open
fn statement_boundary(prefix: &str, end: usize, lexicon: &Lexicon) -> usize {
    let mut candidate = end;
    for _ in 0..STATEMENT_BACKOFF_LINES {
        if candidate == 0 {
            break;
        }
        let state = scan(&prefix[..candidate], lexicon);
        if state.stack.is_empty() && state.open_literal.is_none() {
            return candidate;
        }
        candidate = prefix[..candidate - 1].rfind('\n').map(|p| p + 1).unwrap_or(0);
    }
    end
}

/// Close brackets left open and give a dangling Python suite a body
fn close_open_constructs(kept: &mut String, lexicon: &Lexicon) {
    if lexicon.hash {
        let last = kept.lines().rev().find(|l| !l.trim().is_empty()).map(str::to_owned);
        if let Some(last) = last {
            if last.trim_end().ends_with(':') && !last.trim_start().starts_with('#') {
                let indent: String = last.chars().take_while(|c| c.is_whitespace()).collect();
                if !kept.ends_with('\n') {
                    kept.push('\n');
                }
                kept.push_str(&format!("{}    ...\n", indent));
            }
        }
    }

    let state = scan(kept, lexicon);
    if state.stack.is_empty() {
        return;
    }
    if !kept.ends_with('\n') {
        kept.push('\n');
    }
    let closers: String = state
        .stack
        .iter()
        .rev()
        .map(|open| match open {
            b'(' => ')',
            b'[' => ']',
            _ => '}',
        })
        .collect();
    kept.push_str(&closers);
    kept.push('\n');
}

fn marker_style(file: &FileEntry) -> MarkerStyle {
    match line_comment(&file.path) {
        Some(prefix) => MarkerStyle::Line(prefix),
        None if file.language == LanguageTag::Markdown => MarkerStyle::Html,
        None => MarkerStyle::Bracketed,
    }
}

#[derive(Debug, Clone, Copy)]
enum MarkerStyle {
    Line(&'static str),
    Html,
    Bracketed,
}

fn marker(style: MarkerStyle, lines: usize, bytes: usize) -> String {
    let note = format!("... truncated: {} more lines ({} bytes) omitted", lines, bytes);
    match style {
        MarkerStyle::Line(prefix) => format!("{} {}", prefix, note),
        MarkerStyle::Html => format!("<!-- {} -->", note),
        MarkerStyle::Bracketed => format!("[{}]", note),
    }
}

/// Comment and string syntax of a code file
#[derive(Debug, Clone, Copy)]
struct Lexicon {
    hash: bool,
    slash: bool,
    triple_quotes: bool,
    backticks: bool,
}

impl Lexicon {
    fn for_file(file: &FileEntry) -> Option<Self> {
        if !file.language.is_code() {
            return None;
        }
        Self::for_path(&file.path)
    }

    fn for_path(path: &str) -> Option<Self> {
        let is_python = path.ends_with(".py") || path.ends_with(".pyw") || path.ends_with(".pyi");
        match line_comment(path)? {
            "#" => Some(Self { hash: true, slash: false, triple_quotes: is_python, backticks: false }),
            "//" => Some(Self { hash: false, slash: true, triple_quotes: false, backticks: true }),
            _ => None,
        }
    }
}

struct ScanState {
    stack: Vec<u8>,
    /// Byte offset where an unterminated multi-line literal starts
    open_literal: Option<usize>,
    unmatched: bool,
}

fn scan(text: &str, lexicon: &Lexicon) -> ScanState {
    let bytes = text.as_bytes();
    let mut state = ScanState { stack: Vec::new(), open_literal: None, unmatched: false };
    let mut i = 0;

    let skip_line = |from: usize| bytes[from..].iter().position(|b| *b == b'\n').map_or(bytes.len(), |p| from + p);

    while i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();
        match c {
            b'#' if lexicon.hash => i = skip_line(i),
            b'/' if lexicon.slash && next == Some(b'/') => i = skip_line(i),
            b'/' if lexicon.slash && next == Some(b'*') => match text[i + 2..].find("*/") {
                Some(end) => i += 2 + end + 1,
                None => {
                    state.open_literal = Some(i);
                    break;
                }
            },
            b'"' | b'\'' if lexicon.triple_quotes && bytes[i..].starts_with(&[c, c, c]) => {
                let delim = if c == b'"' { "\"\"\"" } else { "'''" };
                match text[i + 3..].find(delim) {
                    Some(end) => i += 3 + end + 2,
                    None => {
                        state.open_literal = Some(i);
                        break;
                    }
                }
            }
            b'"' | b'\'' => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j] != c && bytes[j] != b'\n' {
                    j += if bytes[j] == b'\\' { 2 } else { 1 };
                }
                i = j.min(bytes.len());
            }
            b'`' if lexicon.backticks => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j] != b'`' {
                    j += if bytes[j] == b'\\' { 2 } else { 1 };
                }
                if j >= bytes.len() {
                    state.open_literal = Some(i);
                    break;
                }
                i = j;
            }
            b'(' | b'[' | b'{' => state.stack.push(c),
            b')' | b']' | b'}' => {
                let expected = match c {
                    b')' => b'(',
                    b']' => b'[',
                    _ => b'{',
                };
                if state.stack.last() == Some(&expected) {
                    state.stack.pop();
                } else {
                    state.unmatched = true;
                }
            }
            _ => {}
        }
        i += 1;
    }
    state
}

/// Whether every bracket in `text` is closed, ignoring strings and comments.
/// Paths without a known code syntax only check raw brackets.
pub fn bracket_balance(text: &str, path: &str) -> bool {
    let lexicon = Lexicon::for_path(path).unwrap_or(Lexicon {
        hash: false,
        slash: false,
        triple_quotes: false,
        backticks: false,
    });
    let state = scan(text, &lexicon);
    state.stack.is_empty() && state.open_literal.is_none() && !state.unmatched
}

#[cfg(test)]
#[allow(clippy::str_to_string)]
mod tests {
    use super::*;

    fn truncator() -> Truncator {
        Truncator::new(Tokenizer::new(), TokenModel::Generic)
    }

    #[test]
    fn test_short_file_untouched() {
        let file = FileEntry::new("a.py", "x = 1\n");
        let result = truncator().truncate(&file, 10, &[]);
        assert_eq!(result.text, "x = 1\n");
        assert_eq!(result.omitted_bytes, 0);
    }

    #[test]
    fn test_truncation_fits_and_marks() {
        let content = (0..200).map(|i| format!("value_{} = {}\n", i, i)).collect::<String>();
        let file = FileEntry::new("data.py", content);
        let result = truncator().truncate(&file, 50, &[]);
        assert!(truncator().count(&result.text) <= 50);
        assert!(result.text.contains("# ... truncated:"));
        assert!(result.omitted_lines > 0);
        // Cut lands on a line boundary
        for line in result.text.lines().filter(|l| !l.starts_with('#')) {
            assert!(line.starts_with("value_"), "partial line: {}", line);
            assert!(line.contains(" = "));
        }
    }

    #[test]
    fn test_truncation_closes_brackets() {
        let mut content = String::from("function big() {\n  const items = [\n");
        for i in 0..300 {
            content.push_str(&format!("    {},\n", i));
        }
        content.push_str("  ];\n  return items;\n}\n");
        let file = FileEntry::new("big.js", content);
        let result = truncator().truncate(&file, 60, &[]);
        assert!(truncator().count(&result.text) <= 60);
        assert!(bracket_balance(&result.text, "big.js"), "{}", result.text);
        assert!(result.text.contains("// ... truncated:"));
    }

    #[test]
    fn test_floor_survives() {
        let mut content = String::from("import os\nimport sys\n\n");
        for i in 0..100 {
            content.push_str(&format!("def f{}():\n    return {}\n\n", i, i));
        }
        let file = FileEntry::new("mod.py", content);
        let floor = vec!["import os".to_owned(), "import sys".to_owned()];
        let result = truncator().truncate(&file, 40, &floor);
        assert!(result.text.starts_with("import os\nimport sys\n"));
        assert!(truncator().count(&result.text) <= 40);

        // A floor bigger than the target is still emitted
        let tiny = truncator().truncate(&file, 2, &floor);
        assert_eq!(tiny.text, "import os\nimport sys\n");
    }

    #[test]
    fn test_zero_target_drops_everything() {
        let file = FileEntry::new("notes.txt", "words ".repeat(100));
        let result = truncator().truncate(&file, 0, &[]);
        assert!(result.text.is_empty());
    }

    #[test]
    fn test_dangling_suite_gets_body() {
        let long_line = format!("        value = '{}'\n", "a".repeat(200));
        let content = format!("class A:\n    def f(self):\n{}", long_line.repeat(100));
        let file = FileEntry::new("a.py", content);
        let result = truncator().truncate(&file, 30, &[]);
        assert!(truncator().count(&result.text) <= 30);
        assert!(result.text.starts_with("class A:\n    def f(self):\n        ...\n"));
    }

    #[test]
    fn test_bracket_balance() {
        assert!(bracket_balance("f(a, [b, {c: 1}])", "x.js"));
        assert!(bracket_balance("s = '(' # )", "x.py"));
        assert!(!bracket_balance("f(a, [b)", "x.js"));
        assert!(!bracket_balance("x = \"\"\"open", "x.py"));
    }
}
