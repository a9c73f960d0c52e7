//! Self-contained HTML output

use crate::optimizer::OptimizationResult;
use crate::output::{treatment_note, Formatter};
use std::fmt::{self, Write};

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;max-width:72rem}\
table{border-collapse:collapse;margin-bottom:1.5rem}\
td,th{border:1px solid #ccc;padding:.25rem .6rem;text-align:left}\
pre{background:#f6f8fa;padding:1rem;overflow-x:auto}\
.note{color:#555;font-style:italic}\
.over{color:#b00020;font-weight:bold}";

/// HTML formatter; all file content is escaped
pub struct HtmlFormatter {
    title: String,
}

impl HtmlFormatter {
    pub fn new() -> Self {
        Self { title: "Context".to_owned() }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    fn render(&self, result: &OptimizationResult) -> Result<String, fmt::Error> {
        let meta = &result.metadata;
        let title = escape(&self.title);
        let mut out = String::new();

        writeln!(out, "<!DOCTYPE html>")?;
        writeln!(out, "<html lang=\"en\">")?;
        writeln!(out, "<head>")?;
        writeln!(out, "<meta charset=\"utf-8\">")?;
        writeln!(out, "<title>{}</title>", title)?;
        writeln!(out, "<style>{}</style>", STYLE)?;
        writeln!(out, "</head>")?;
        writeln!(out, "<body>")?;
        writeln!(out, "<h1>{}</h1>", title)?;

        writeln!(out, "<table class=\"summary\">")?;
        writeln!(out, "<tr><th>Files</th><td>{}</td></tr>", meta.file_count)?;
        writeln!(out, "<tr><th>Original tokens</th><td>{}</td></tr>", meta.total_original_tokens)?;
        writeln!(out, "<tr><th>Final tokens</th><td>{}</td></tr>", meta.total_final_tokens)?;
        writeln!(out, "<tr><th>Budget</th><td>{}</td></tr>", meta.tokens_available)?;
        writeln!(out, "<tr><th>Model</th><td>{}</td></tr>", escape(&meta.model))?;
        writeln!(
            out,
            "<tr><th>Compression</th><td>{:.1}%</td></tr>",
            meta.compression_ratio * 100.0
        )?;
        if meta.fits_in_budget {
            writeln!(out, "<tr><th>Fits</th><td>yes</td></tr>")?;
        } else {
            writeln!(out, "<tr><th>Fits</th><td class=\"over\">no</td></tr>")?;
        }
        writeln!(out, "</table>")?;
        if meta.cancelled {
            writeln!(out, "<p class=\"over\">Run was cancelled; the file list is incomplete.</p>")?;
        }

        for file in &result.files {
            writeln!(out, "<section>")?;
            writeln!(out, "<h2><code>{}</code></h2>", escape(&file.path))?;
            writeln!(out, "<p class=\"note\">{}</p>", escape(&treatment_note(file)))?;
            if !file.content.is_empty() {
                writeln!(
                    out,
                    "<pre><code class=\"language-{}\">{}</code></pre>",
                    file.language.fence_hint(&file.path),
                    escape(&file.content)
                )?;
            }
            writeln!(out, "</section>")?;
        }

        writeln!(out, "</body>")?;
        writeln!(out, "</html>")?;
        Ok(out)
    }
}

impl Default for HtmlFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter for HtmlFormatter {
    fn format(&self, result: &OptimizationResult) -> String {
        self.render(result).unwrap_or_default()
    }

    fn name(&self) -> &'static str {
        "html"
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
