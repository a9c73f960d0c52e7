//! File importance scoring
//!
//! Each file gets a score in `[0, 1]` computed as the weighted sum of a fixed
//! set of named factors. Factors are computed with shallow lexical scans so the
//! scorer stays language-agnostic. Explicit path directives are applied after
//! the base score, then the result is clamped.

use crate::error::ConfigurationError;
use crate::types::FileEntry;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{Duration, SystemTime};

/// Files up to this size carry no size penalty
pub const SIZE_PENALTY_THRESHOLD: u64 = 10_000;

/// Scoring factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    /// Entry point naming conventions (`main`, `index`, `__main__`)
    Entrypoint,
    /// Density of exported declarations
    Exports,
    /// Density of import statements
    Imports,
    /// Comment and docstring share of the file
    Documentation,
    /// Branch count proxy for cyclomatic complexity
    Complexity,
    /// How recently the file was modified
    Recency,
    /// Decreasing function of byte size beyond a threshold
    Size,
    /// Path classification (source dirs, tests, config, vendored code)
    Path,
}

impl Factor {
    pub const ALL: [Factor; 8] = [
        Self::Entrypoint,
        Self::Exports,
        Self::Imports,
        Self::Documentation,
        Self::Complexity,
        Self::Recency,
        Self::Size,
        Self::Path,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Entrypoint => "entrypoint",
            Self::Exports => "exports",
            Self::Imports => "imports",
            Self::Documentation => "documentation",
            Self::Complexity => "complexity",
            Self::Recency => "recency",
            Self::Size => "size",
            Self::Path => "path",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw factor weights; normalized to sum to one by [`ImportanceScorer::new`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorWeights {
    pub entrypoint: f64,
    pub exports: f64,
    pub imports: f64,
    pub documentation: f64,
    pub complexity: f64,
    pub recency: f64,
    pub size: f64,
    pub path: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            entrypoint: 1.0,
            exports: 0.8,
            imports: 0.6,
            documentation: 0.7,
            complexity: 0.5,
            recency: 0.4,
            size: 0.3,
            path: 0.9,
        }
    }
}

impl FactorWeights {
    /// Weight for one factor
    pub fn get(&self, factor: Factor) -> f64 {
        match factor {
            Factor::Entrypoint => self.entrypoint,
            Factor::Exports => self.exports,
            Factor::Imports => self.imports,
            Factor::Documentation => self.documentation,
            Factor::Complexity => self.complexity,
            Factor::Recency => self.recency,
            Factor::Size => self.size,
            Factor::Path => self.path,
        }
    }

    /// Weights scaled to sum to one
    pub fn normalized(&self) -> Result<[f64; 8], ConfigurationError> {
        let mut raw = [0.0; 8];
        for (slot, factor) in raw.iter_mut().zip(Factor::ALL) {
            let weight = self.get(factor);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigurationError::InvalidWeights(format!(
                    "weight for '{}' must be a non-negative number, got {}",
                    factor, weight
                )));
            }
            *slot = weight;
        }
        let sum: f64 = raw.iter().sum();
        if sum <= 0.0 {
            return Err(ConfigurationError::InvalidWeights(
                "at least one factor weight must be positive".to_owned(),
            ));
        }
        Ok(raw.map(|w| w / sum))
    }
}

/// Direction of a path directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveKind {
    Prioritize,
    Deprioritize,
}

/// Path-prefix override applied after the base score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDirective {
    pub prefix: String,
    pub kind: DirectiveKind,
}

impl PathDirective {
    pub fn prioritize(prefix: impl Into<String>) -> Self {
        Self { prefix: normalize_prefix(prefix.into()), kind: DirectiveKind::Prioritize }
    }

    pub fn deprioritize(prefix: impl Into<String>) -> Self {
        Self { prefix: normalize_prefix(prefix.into()), kind: DirectiveKind::Deprioritize }
    }

    pub fn matches(&self, path: &str) -> bool {
        path.trim_start_matches("./").starts_with(&self.prefix)
    }

    /// Multiplicative then additive override
    fn apply(&self, score: f64) -> f64 {
        match self.kind {
            DirectiveKind::Prioritize => score * 1.5 + 0.2,
            DirectiveKind::Deprioritize => score * 0.5,
        }
    }
}

fn normalize_prefix(prefix: String) -> String {
    prefix.trim_start_matches("./").replace('\\', "/")
}

/// One factor's value and its normalized weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorContribution {
    pub factor: Factor,
    /// Factor value in `[0, 1]`
    pub value: f64,
    /// Normalized weight
    pub weight: f64,
}

impl FactorContribution {
    pub fn contribution(&self) -> f64 {
        self.value * self.weight
    }
}

/// Importance of one file with its factor breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceScore {
    pub path: String,
    /// Final score in `[0, 1]`
    pub score: f64,
    /// Weighted sum before directives
    pub base_score: f64,
    pub factors: Vec<FactorContribution>,
}

/// Computes importance scores from content, path and metadata
#[derive(Debug, Clone)]
pub struct ImportanceScorer {
    weights: [f64; 8],
    directives: Vec<PathDirective>,
    reference_time: SystemTime,
}

impl Default for ImportanceScorer {
    fn default() -> Self {
        Self {
            weights: FactorWeights::default().normalized().unwrap_or([0.125; 8]),
            directives: Vec::new(),
            reference_time: SystemTime::now(),
        }
    }
}

impl ImportanceScorer {
    /// Create a scorer; weights are validated and normalized once here
    pub fn new(weights: FactorWeights) -> Result<Self, ConfigurationError> {
        Ok(Self {
            weights: weights.normalized()?,
            directives: Vec::new(),
            reference_time: SystemTime::now(),
        })
    }

    /// Set path directives, applied in order
    pub fn with_directives(mut self, directives: Vec<PathDirective>) -> Self {
        self.directives = directives;
        self
    }

    /// Time recency is measured against
    pub fn with_reference_time(mut self, time: SystemTime) -> Self {
        self.reference_time = time;
        self
    }

    /// Normalized weight for a factor
    pub fn weight(&self, factor: Factor) -> f64 {
        Factor::ALL
            .iter()
            .position(|f| *f == factor)
            .map(|i| self.weights[i])
            .unwrap_or(0.0)
    }

    /// Score a single file
    pub fn score(&self, file: &FileEntry) -> ImportanceScore {
        let factors: Vec<FactorContribution> = Factor::ALL
            .iter()
            .zip(self.weights)
            .map(|(&factor, weight)| FactorContribution {
                factor,
                value: self.factor_value(factor, file).clamp(0.0, 1.0),
                weight,
            })
            .collect();

        let base_score = factors.iter().map(|f| f.contribution()).sum::<f64>().clamp(0.0, 1.0);
        let score = self
            .directives
            .iter()
            .filter(|d| d.matches(&file.path))
            .fold(base_score, |s, d| d.apply(s))
            .clamp(0.0, 1.0);

        ImportanceScore { path: file.path.clone(), score, base_score, factors }
    }

    /// Score many files in parallel; output order matches input order
    pub fn score_all(&self, files: &[FileEntry]) -> Vec<ImportanceScore> {
        files.par_iter().map(|f| self.score(f)).collect()
    }

    fn factor_value(&self, factor: Factor, file: &FileEntry) -> f64 {
        match factor {
            Factor::Entrypoint => entrypoint_signal(file.filename()),
            Factor::Exports => (count_exports(&file.content) as f64 / 20.0).min(1.0),
            Factor::Imports => (count_imports(&file.content) as f64 / 30.0).min(1.0),
            Factor::Documentation => documentation_density(&file.content),
            Factor::Complexity => ((1 + count_branches(&file.content)) as f64 / 50.0).min(1.0),
            Factor::Recency => self.recency(file.modified),
            Factor::Size => size_factor(file.size_bytes),
            Factor::Path => path_signal(&file.path),
        }
    }

    fn recency(&self, modified: Option<SystemTime>) -> f64 {
        const DAY: u64 = 24 * 60 * 60;
        let Some(modified) = modified else {
            return 0.1;
        };
        let age = self.reference_time.duration_since(modified).unwrap_or(Duration::ZERO);
        if age < Duration::from_secs(DAY) {
            1.0
        } else if age < Duration::from_secs(7 * DAY) {
            0.7
        } else if age < Duration::from_secs(30 * DAY) {
            0.4
        } else {
            0.1
        }
    }
}

/// Deterministic ranking: score descending, then shallower path, then lexical path
pub fn compare_ranked(a: (&FileEntry, f64), b: (&FileEntry, f64)) -> Ordering {
    b.1.total_cmp(&a.1)
        .then_with(|| a.0.depth().cmp(&b.0.depth()))
        .then_with(|| a.0.path.cmp(&b.0.path))
}

/// Indices of `files` in rank order
pub fn rank_order(files: &[FileEntry], scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..files.len()).collect();
    order.sort_by(|&a, &b| compare_ranked((&files[a], scores[a]), (&files[b], scores[b])));
    order
}

fn entrypoint_signal(filename: &str) -> f64 {
    const ENTRYPOINTS: &[&str] = &[
        "__main__.py",
        "main.py",
        "app.py",
        "server.py",
        "cli.py",
        "manage.py",
        "index.js",
        "index.ts",
        "index.tsx",
        "index.jsx",
        "main.js",
        "main.ts",
        "app.js",
        "app.ts",
        "server.js",
        "server.ts",
        "main.go",
        "main.rs",
        "lib.rs",
        "Main.java",
        "Program.cs",
    ];
    if ENTRYPOINTS.contains(&filename) {
        return 1.0;
    }
    let lower = filename.to_lowercase();
    if lower.contains("main") || lower.contains("index") {
        0.5
    } else {
        0.0
    }
}

fn count_exports(content: &str) -> usize {
    let patterns = [
        static_regex!(
            r"\bexport\s+(?:default\s+)?(?:async\s+)?(?:abstract\s+)?(?:class|function|const|let|var|interface|type|enum)\b"
        ),
        static_regex!(r"\bmodule\.exports\b|\bexports\.\w+\s*="),
        static_regex!(r"(?m)^(?:async\s+)?def\s+[A-Za-z]\w*|^class\s+[A-Za-z]\w*"),
        static_regex!(r"\bpublic\s+(?:static\s+)?(?:final\s+)?(?:class|interface|enum|record)\b"),
        static_regex!(r"\bfunc\s+(?:\([^)]*\)\s*)?[A-Z]"),
        static_regex!(r"\bpub\s+(?:fn|struct|enum|trait|mod|const|type)\b"),
    ];
    patterns.iter().map(|re| re.find_iter(content).count()).sum()
}

fn count_imports(content: &str) -> usize {
    let patterns = [
        static_regex!(r"(?m)^\s*(?:import\s|from\s+\S+\s+import\s|use\s|#include\s)"),
        static_regex!(r"\brequire\s*\("),
    ];
    patterns.iter().map(|re| re.find_iter(content).count()).sum()
}

fn count_branches(content: &str) -> usize {
    static_regex!(
        r"\b(?:if|elif|else|switch|case|for|while|do|try|catch|except|finally|and|or)\b|&&|\|\|"
    )
    .find_iter(content)
    .count()
}

/// Score documentation share: 10-30% comment lines is ideal
fn documentation_density(content: &str) -> f64 {
    let mut total = 0usize;
    let mut doc_lines = 0usize;
    let mut in_docstring = false;

    for line in content.lines() {
        total += 1;
        let stripped = line.trim();
        let fences = stripped.matches("\"\"\"").count() + stripped.matches("'''").count();
        if fences > 0 {
            if fences % 2 == 1 {
                in_docstring = !in_docstring;
            }
            doc_lines += 1;
        } else if in_docstring
            || stripped.starts_with('#')
            || stripped.starts_with("//")
            || stripped.starts_with('*')
            || stripped.contains("/*")
            || stripped.contains("*/")
        {
            doc_lines += 1;
        }
    }

    if total == 0 {
        return 0.0;
    }
    let ratio = doc_lines as f64 / total as f64;
    if ratio < 0.1 {
        ratio * 10.0
    } else if ratio > 0.3 {
        (1.0 - (ratio - 0.3) * 2.0).max(0.0)
    } else {
        1.0
    }
}

fn size_factor(size: u64) -> f64 {
    if size <= SIZE_PENALTY_THRESHOLD {
        1.0
    } else {
        SIZE_PENALTY_THRESHOLD as f64 / size as f64
    }
}

/// Priority: vendored < tests < config < docs < default < core source
fn path_signal(path: &str) -> f64 {
    let path = format!("/{}", path.replace('\\', "/").to_lowercase());
    let filename = path.rsplit('/').next().unwrap_or("");

    let vendor_patterns = [
        "/vendor/",
        "/node_modules/",
        "/dist/",
        "/build/",
        "/target/",
        "/__pycache__/",
        "/.next/",
        "/coverage/",
        "/generated/",
        "/gen/",
        ".min.js",
        ".min.css",
        ".bundle.",
        ".pb.go",
        "_pb2.py",
        ".g.ts",
        ".g.js",
    ];
    let test_patterns = [
        "/test_",
        "_test.",
        ".test.",
        ".spec.",
        "_spec.",
        "/tests/",
        "/test/",
        "/__tests__/",
        "/testing/",
        "/fixtures/",
        "/mocks/",
        "/e2e/",
        "/benchmarks/",
    ];
    let config_patterns = [
        "config.",
        "settings.",
        ".config",
        "package.json",
        "cargo.toml",
        "pyproject.toml",
        "setup.py",
        "setup.cfg",
        "tsconfig.",
        "webpack.",
        ".eslint",
        ".prettier",
        ".env",
        "makefile",
        "dockerfile",
        "docker-compose",
        "/.github/",
        ".ini",
        ".conf",
    ];
    let doc_patterns = ["readme.", "changelog.", "contributing.", "license.", "authors."];
    let core_dirs = ["/src/", "/lib/", "/core/", "/pkg/", "/internal/", "/app/", "/cmd/"];

    if vendor_patterns.iter().any(|p| path.contains(p)) {
        0.0
    } else if test_patterns.iter().any(|p| path.contains(p)) {
        0.2
    } else if config_patterns.iter().any(|p| filename.contains(p) || path.contains(p)) {
        0.4
    } else if doc_patterns.iter().any(|p| filename.starts_with(p)) {
        0.45
    } else if core_dirs.iter().any(|p| path.contains(p)) {
        0.8
    } else {
        0.5
    }
}

#[cfg(test)]
#[allow(clippy::str_to_string)]
mod tests {
    use super::*;

    fn scorer() -> ImportanceScorer {
        ImportanceScorer::new(FactorWeights::default()).unwrap()
    }

    #[test]
    fn test_weights_normalize_to_one() {
        let scorer = scorer();
        let sum: f64 = Factor::ALL.iter().map(|f| scorer.weight(*f)).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let zero = FactorWeights {
            entrypoint: 0.0,
            exports: 0.0,
            imports: 0.0,
            documentation: 0.0,
            complexity: 0.0,
            recency: 0.0,
            size: 0.0,
            path: 0.0,
        };
        assert!(matches!(
            ImportanceScorer::new(zero),
            Err(ConfigurationError::InvalidWeights(_))
        ));
        let negative = FactorWeights { size: -0.3, ..FactorWeights::default() };
        assert!(ImportanceScorer::new(negative).is_err());
    }

    #[test]
    fn test_entrypoint_outranks_helper() {
        let scorer = scorer();
        let main = FileEntry::new("main.py", "import os\nimport sys\n\ndef run():\n    if True:\n        pass\n");
        let helper = FileEntry::new("misc/helper_data.txt", "just some words here\n");
        assert!(scorer.score(&main).score > scorer.score(&helper).score);
    }

    #[test]
    fn test_score_is_clamped_with_directives() {
        let scorer = scorer().with_directives(vec![
            PathDirective::prioritize("src/"),
            PathDirective::prioritize("src/core"),
        ]);
        let file = FileEntry::new("src/core/main.py", "def main():\n    pass\n");
        let score = scorer.score(&file);
        assert!(score.score <= 1.0);
        assert!(score.score > score.base_score);
        assert_eq!(score.factors.len(), Factor::ALL.len());
    }

    #[test]
    fn test_deprioritize_halves_score() {
        let scorer = scorer().with_directives(vec![PathDirective::deprioritize("./legacy")]);
        let file = FileEntry::new("legacy/old.py", "def old():\n    return 1\n");
        let score = scorer.score(&file);
        assert!((score.score - score.base_score * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_recency_uses_reference_time() {
        let now = SystemTime::now();
        let scorer = scorer().with_reference_time(now);
        let fresh = FileEntry::new("a.py", "x = 1\n").with_modified(now);
        let stale = FileEntry::new("a.py", "x = 1\n")
            .with_modified(now - Duration::from_secs(90 * 24 * 3600));
        assert!(scorer.score(&fresh).score > scorer.score(&stale).score);
    }

    #[test]
    fn test_factor_helpers() {
        assert_eq!(entrypoint_signal("__main__.py"), 1.0);
        assert_eq!(entrypoint_signal("domain_main_helpers.py"), 0.5);
        assert_eq!(size_factor(5_000), 1.0);
        assert_eq!(size_factor(20_000), 0.5);
        assert_eq!(path_signal("node_modules/x/index.js"), 0.0);
        assert_eq!(path_signal("tests/test_api.py"), 0.2);
        assert_eq!(path_signal("src/api.py"), 0.8);
        assert_eq!(count_exports("export function a() {}\nexport const b = 1;\n"), 2);
        assert_eq!(count_imports("import os\nfrom x import y\nconst a = require('a');\n"), 3);
        assert_eq!(documentation_density("# comment\n# another\n"), 0.0);
    }

    #[test]
    fn test_rank_order_ties() {
        let files = vec![
            FileEntry::new("b/deep/z.py", ""),
            FileEntry::new("b.py", ""),
            FileEntry::new("a.py", ""),
            FileEntry::new("top.py", ""),
        ];
        let scores = vec![0.5, 0.5, 0.5, 0.9];
        assert_eq!(rank_order(&files, &scores), vec![3, 2, 1, 0]);
    }
}
