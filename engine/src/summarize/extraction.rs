//! Test-file summaries: test names, assertions and a little setup

use super::{bracket_delta, StrategyError, Summarizer, Summary, SummarizationConfig, Syntax};
use crate::types::{CompressionLevel, FileEntry};
use regex::Regex;
use std::path::Path;

/// Longest setup statement kept, in lines
const MAX_SETUP_STATEMENT_LINES: usize = 3;

/// Lines scanned for the end of a multi-line test header
const MAX_HEADER_LINES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Python,
    Script,
    Rust,
}

impl Dialect {
    fn of(path: &str) -> Self {
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some("py" | "pyw") => Self::Python,
            Some("rs") => Self::Rust,
            _ => Self::Script,
        }
    }

    fn syntax(&self) -> Syntax {
        match self {
            Self::Python => Syntax::Python,
            _ => Syntax::Script,
        }
    }

    fn comment(&self) -> &'static str {
        match self {
            Self::Python => "#",
            _ => "//",
        }
    }

    fn is_assertion(&self, statement: &str) -> bool {
        let s = statement.trim_start();
        match self {
            Self::Python => {
                s.starts_with("assert")
                    || s.starts_with("self.assert")
                    || s.starts_with("self.fail")
                    || s.starts_with("pytest.fail")
            }
            Self::Script => {
                let s = s.strip_prefix("await ").unwrap_or(s);
                s.starts_with("expect(")
                    || s.starts_with("expect.")
                    || s.starts_with("assert")
                    || s.starts_with("should")
            }
            Self::Rust => {
                s.starts_with("assert")
                    || s.starts_with("prop_assert")
                    || s.starts_with("debug_assert")
                    || s.starts_with("panic!")
            }
        }
    }
}

/// A test or a group of tests
#[derive(Debug, Clone, Default)]
struct Unit {
    name: String,
    container: bool,
    header: String,
    body_indent: String,
    doc: Option<String>,
    setup: Vec<String>,
    assertions: Vec<String>,
    footer: Option<String>,
    children: Vec<Unit>,
}

impl Unit {
    fn test_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        if !self.container {
            out.push(&self.name);
        }
        for child in &self.children {
            child.test_names(out);
        }
    }
}

/// Summarizes test files by what they check
pub struct ExtractionStrategy;

impl Default for ExtractionStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Summarizer for ExtractionStrategy {
    fn name(&self) -> &'static str {
        "extraction"
    }

    fn summarize(
        &self,
        file: &FileEntry,
        config: &SummarizationConfig,
    ) -> Result<Summary, StrategyError> {
        let dialect = Dialect::of(&file.path);
        let lines: Vec<&str> = file.content.lines().collect();
        let scanner = Scanner { lines: &lines, dialect, config };
        let units = match dialect {
            Dialect::Python => scanner.indented_units(0, lines.len()),
            _ => scanner.braced_units(0, lines.len()),
        };
        if units.is_empty() {
            return Err(StrategyError::InvalidData {
                format: "test",
                message: "no test units found".to_owned(),
            });
        }

        let mut out = String::new();
        if config.level == CompressionLevel::Minimal {
            let mut names = Vec::new();
            for unit in &units {
                unit.test_names(&mut names);
            }
            out.push_str(&format!("{} tests: {}\n", dialect.comment(), names.join(", ")));
        } else {
            for unit in &units {
                render(unit, dialect, config.level, &mut out);
            }
        }
        Ok(Summary { text: out, level: config.level, truncated: false })
    }
}

fn render(unit: &Unit, dialect: Dialect, level: CompressionLevel, out: &mut String) {
    out.push_str(&unit.header);
    out.push('\n');
    let before = out.len();

    if !unit.container {
        if level == CompressionLevel::Outline {
            out.push_str(&format!(
                "{}{} {} assertions\n",
                unit.body_indent,
                dialect.comment(),
                unit.assertions.len()
            ));
        } else {
            if let (CompressionLevel::Docstrings, Some(doc)) = (level, &unit.doc) {
                out.push_str(doc);
                out.push('\n');
            }
            for statement in unit.setup.iter().chain(&unit.assertions) {
                out.push_str(statement);
                out.push('\n');
            }
        }
    }
    for child in &unit.children {
        render(child, dialect, level, out);
    }

    let has_code = out[before..].lines().any(|l| {
        let t = l.trim();
        !t.is_empty() && !t.starts_with(dialect.comment())
    });
    if dialect == Dialect::Python && !has_code {
        out.push_str(&unit.body_indent);
        out.push_str("...\n");
    }
    if let Some(footer) = &unit.footer {
        out.push_str(footer);
        out.push('\n');
    }
}

struct Scanner<'a> {
    lines: &'a [&'a str],
    dialect: Dialect,
    config: &'a SummarizationConfig,
}

impl<'a> Scanner<'a> {
    /// Python: units are `def test*` functions and `class Test*` groups
    fn indented_units(&self, start: usize, end: usize) -> Vec<Unit> {
        let function = static_regex!(r"^(\s*)(?:async\s+)?def\s+(test\w*)\s*\(");
        let class = static_regex!(r"^(\s*)class\s+(Test\w*)\b");
        let mut units = Vec::new();
        let mut decorators: Option<usize> = None;
        let mut i = start;

        while i < end {
            let line = self.lines[i];
            let captures = function.captures(line).map(|c| (c, false));
            let captures = captures.or_else(|| class.captures(line).map(|c| (c, true)));
            let Some((captures, container)) = captures else {
                if line.trim_start().starts_with('@') {
                    decorators.get_or_insert(i);
                } else if !line.trim().is_empty() {
                    decorators = None;
                }
                i += 1;
                continue;
            };

            let indent = captures.get(1).map_or("", |m| m.as_str());
            let name = captures.get(2).map_or("", |m| m.as_str()).to_owned();
            let header_start = decorators.take().unwrap_or(i);
            let header_end = self.header_end(i, end);
            let mut body_end = header_end + 1;
            while body_end < end
                && (self.lines[body_end].trim().is_empty()
                    || indent_width(self.lines[body_end]) > indent.len())
            {
                body_end += 1;
            }
            let body_indent = self.lines[header_end + 1..body_end]
                .iter()
                .find(|l| !l.trim().is_empty())
                .map(|l| leading(l).to_owned())
                .unwrap_or_else(|| format!("{}    ", indent));

            let mut unit = Unit {
                name,
                container,
                header: self.lines[header_start..=header_end].join("\n"),
                body_indent,
                ..Default::default()
            };
            if container {
                unit.children = self.indented_units(header_end + 1, body_end);
            } else {
                self.collect_statements(&mut unit, header_end + 1, body_end);
            }
            units.push(unit);
            i = body_end;
        }
        units
    }

    /// Brace languages: `describe`/`it`/`test` calls, `#[test]` functions
    /// and `mod` groups
    fn braced_units(&self, start: usize, end: usize) -> Vec<Unit> {
        let script_unit = static_regex!(
            r#"^(\s*)(describe|context|suite|it|test|specify)(?:\.\w+)?\s*\(\s*(?:['"`]([^'"`]*)['"`])?"#
        );
        let script_hook =
            static_regex!(r"^\s*(?:beforeEach|afterEach|beforeAll|afterAll|before|after)\s*\(");
        let rust_attr = static_regex!(r"^\s*#\[(?:\w+::)*test\b");
        let rust_fn = static_regex!(r"^(\s*)(?:pub\s+)?(?:async\s+)?fn\s+(\w+)");
        let rust_mod = static_regex!(r"^(\s*)(?:pub\s+)?mod\s+(\w+)\s*\{");

        let mut units = Vec::new();
        let mut attribute: Option<usize> = None;
        let mut i = start;

        while i < end {
            let line = self.lines[i];
            let found: Option<(String, bool)> = match self.dialect {
                Dialect::Rust => {
                    if rust_attr.is_match(line) {
                        attribute.get_or_insert(i);
                        i += 1;
                        continue;
                    }
                    if let (Some(_), Some(c)) = (attribute, rust_fn.captures(line)) {
                        Some((c.get(2).map_or("", |m| m.as_str()).to_owned(), false))
                    } else {
                        rust_mod
                            .captures(line)
                            .map(|c| (c.get(2).map_or("", |m| m.as_str()).to_owned(), true))
                    }
                }
                _ => {
                    if script_hook.is_match(line) {
                        let (_, body_end) = self.block(i, end);
                        i = body_end.map_or(i + 1, |e| e + 1);
                        continue;
                    }
                    script_unit.captures(line).map(|c| {
                        let kind = c.get(2).map_or("", |m| m.as_str());
                        let name = c.get(3).map_or(kind, |m| m.as_str()).to_owned();
                        (name, matches!(kind, "describe" | "context" | "suite"))
                    })
                }
            };
            let Some((name, container)) = found else {
                if !line.trim_start().starts_with("#[") && !line.trim().is_empty() {
                    attribute = None;
                }
                i += 1;
                continue;
            };

            let header_start = attribute.take().unwrap_or(i);
            let (header_end, footer) = self.block(i, end);
            let mut unit = Unit {
                name,
                container,
                header: self.lines[header_start..=header_end].join("\n"),
                ..Default::default()
            };
            let Some(footer) = footer else {
                units.push(unit);
                i = header_end + 1;
                continue;
            };
            unit.footer = Some(self.lines[footer].to_owned());
            unit.body_indent = self.lines[header_end + 1..footer]
                .iter()
                .find(|l| !l.trim().is_empty())
                .map(|l| leading(l).to_owned())
                .unwrap_or_else(|| format!("{}  ", leading(line)));
            if container {
                unit.children = self.braced_units(header_end + 1, footer);
            } else {
                self.collect_statements(&mut unit, header_end + 1, footer);
            }
            units.push(unit);
            i = footer + 1;
        }
        units
    }

    /// Header end line and the closing line of a braced block starting at `i`
    fn block(&self, i: usize, end: usize) -> (usize, Option<usize>) {
        let syntax = self.dialect.syntax();
        let mut depth = bracket_delta(self.lines[i], syntax);
        if depth <= 0 {
            return (i, None);
        }
        let mut header_end = i;
        while !self.lines[header_end].trim_end().ends_with('{')
            && header_end + 1 < end
            && header_end - i + 1 < MAX_HEADER_LINES
        {
            header_end += 1;
            depth += bracket_delta(self.lines[header_end], syntax);
        }
        let mut j = header_end + 1;
        while j < end {
            depth += bracket_delta(self.lines[j], syntax);
            if depth <= 0 {
                return (header_end, Some(j));
            }
            j += 1;
        }
        (header_end, None)
    }

    /// Last line of a Python header, following bracket continuations
    fn header_end(&self, i: usize, end: usize) -> usize {
        let mut depth = bracket_delta(self.lines[i], Syntax::Python);
        let mut j = i;
        while depth > 0 && j + 1 < end {
            j += 1;
            depth += bracket_delta(self.lines[j], Syntax::Python);
        }
        j
    }

    /// Sort body statements into doc, setup and assertions
    fn collect_statements(&self, unit: &mut Unit, start: usize, end: usize) {
        let syntax = self.dialect.syntax();
        let body_width = unit.body_indent.len();
        let mut i = start;
        let mut first = true;

        while i < end {
            let line = self.lines[i];
            let trimmed = line.trim();
            if trimmed.is_empty() {
                i += 1;
                continue;
            }

            // Docstring or leading comment
            if first && is_doc_start(trimmed, self.dialect) {
                let doc_end = self.doc_end(i, end);
                unit.doc = Some(self.lines[i..=doc_end].join("\n"));
                i = doc_end + 1;
                first = false;
                continue;
            }
            first = false;

            if trimmed.starts_with(self.dialect.comment()) || is_closer(trimmed) {
                i += 1;
                continue;
            }
            // Block openers are skipped; their contents are considered one by one
            if trimmed.ends_with('{') || (self.dialect == Dialect::Python && trimmed.ends_with(':')) {
                i += 1;
                continue;
            }

            let mut depth = bracket_delta(line, syntax);
            let mut j = i;
            while (depth > 0 || self.lines[j].trim_end().ends_with('\\')) && j + 1 < end {
                j += 1;
                depth += bracket_delta(self.lines[j], syntax);
            }
            let statement = reindent(&self.lines[i..=j], &unit.body_indent);
            let nested = indent_width(line) > body_width;

            if self.dialect.is_assertion(trimmed) {
                unit.assertions.push(statement);
            } else if !nested
                && j - i + 1 <= MAX_SETUP_STATEMENT_LINES
                && unit.setup.len() < self.config.max_setup_lines
                && unit.assertions.is_empty()
            {
                unit.setup.push(statement);
            }
            i = j + 1;
        }
    }

    fn doc_end(&self, i: usize, end: usize) -> usize {
        let first = self.lines[i].trim();
        let delimiter = if first.starts_with("\"\"\"") {
            Some("\"\"\"")
        } else if first.starts_with("'''") {
            Some("'''")
        } else if first.starts_with("/*") {
            Some("*/")
        } else {
            None
        };
        match delimiter {
            Some(d) if !first[d.len().min(first.len())..].contains(d) => (i + 1..end)
                .find(|&j| self.lines[j].contains(d))
                .unwrap_or(i),
            Some(_) => i,
            None => {
                let comment = self.dialect.comment();
                let mut j = i;
                while j + 1 < end && self.lines[j + 1].trim_start().starts_with(comment) {
                    j += 1;
                }
                j
            }
        }
    }
}

fn is_doc_start(trimmed: &str, dialect: Dialect) -> bool {
    match dialect {
        Dialect::Python => {
            trimmed.starts_with("\"\"\"")
                || trimmed.starts_with("'''")
                || (trimmed.starts_with('"') && trimmed.ends_with('"'))
        }
        Dialect::Rust => trimmed.starts_with("//"),
        Dialect::Script => trimmed.starts_with("//") || trimmed.starts_with("/*"),
    }
}

/// Lines that only close brackets
fn is_closer(trimmed: &str) -> bool {
    trimmed.chars().all(|c| matches!(c, '}' | ')' | ']' | ';' | ',' | ' '))
}

fn leading(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

fn indent_width(line: &str) -> usize {
    leading(line).len()
}

/// Shift a statement so its first line sits at `indent`
fn reindent(lines: &[&str], indent: &str) -> String {
    let Some(first) = lines.first() else {
        return String::new();
    };
    let shift = indent_width(first);
    lines
        .iter()
        .map(|line| {
            let strip = indent_width(line).min(shift);
            format!("{}{}", indent, &line[strip..])
        })
        .collect::<Vec<_>>()
        .join("\n")
}
