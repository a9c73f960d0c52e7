//! End-to-end optimizer scenarios

use contextfit_engine::{
    BudgetSpec, CompressionLevel, Config, ContextOptimizer, FileEntry, Formatter,
    OptimizerOptions, OutputFormat, OutputFormatter, PathDirective, ProviderError, RefineHint,
    Refiner, SummarizationConfig, TokenModel, Treatment,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn generic(capacity: i64) -> OptimizerOptions {
    OptimizerOptions::default()
        .with_budget(BudgetSpec::Explicit(capacity))
        .with_model(TokenModel::Generic)
}

/// Exactly `tokens` Generic tokens of prose
fn prose(path: &str, tokens: usize) -> FileEntry {
    let sentence = "the quick brown fox jumps over the lazy dog.\n";
    let mut content = sentence.repeat(tokens * 4 / sentence.len() + 1);
    content.truncate(tokens * 4 - 1);
    content.push('\n');
    FileEntry::new(path, content)
}

fn scores(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
    pairs.iter().map(|(path, score)| ((*path).to_owned(), *score)).collect()
}

#[test]
fn keeps_the_important_file_and_squeezes_the_other() {
    let optimizer = ContextOptimizer::new(generic(100)).unwrap();
    let files = vec![prose("docs/a.txt", 80), prose("docs/b.txt", 80)];
    let result = optimizer
        .optimize_with_scores(&files, &scores(&[("docs/a.txt", 0.9), ("docs/b.txt", 0.5)]))
        .unwrap();

    let first = &result.files[0];
    assert_eq!(first.path, "docs/a.txt");
    assert_eq!(first.treatment, Treatment::Kept);
    assert_eq!(first.final_tokens, 80);
    assert_eq!(first.content, files[0].content);

    let second = &result.files[1];
    assert_eq!(second.path, "docs/b.txt");
    assert!(second.final_tokens <= 20, "{}", second.final_tokens);
    assert!(result.metadata.fits_in_budget);
    assert_eq!(result.metadata.tokens_available, 100);
}

#[test]
fn importance_beats_size() {
    let optimizer = ContextOptimizer::new(generic(100)).unwrap();
    let files = vec![prose("small.txt", 30), prose("large.txt", 90)];
    let result = optimizer
        .optimize_with_scores(&files, &scores(&[("small.txt", 0.3), ("large.txt", 0.9)]))
        .unwrap();

    let large = result.files.iter().find(|f| f.path == "large.txt").unwrap();
    let small = result.files.iter().find(|f| f.path == "small.txt").unwrap();
    assert_eq!(large.treatment, Treatment::Kept);
    assert_ne!(small.treatment, Treatment::Kept);
    assert!(result.metadata.total_final_tokens <= 100);
}

struct OfflineRefiner {
    calls: AtomicUsize,
}

impl Refiner for OfflineRefiner {
    fn provider(&self) -> &str {
        "offline"
    }

    fn model(&self) -> &str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn refine(&self, _: &str, _: u64, _: &RefineHint) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Unavailable("offline".to_owned()))
    }
}

#[test]
fn unavailable_provider_falls_back_to_deterministic_summaries() {
    let refiner = Arc::new(OfflineRefiner { calls: AtomicUsize::new(0) });
    let options = generic(60)
        .with_summarization(SummarizationConfig { use_llm: true, ..Default::default() })
        .with_refiner(refiner.clone());
    let optimizer = ContextOptimizer::new(options).unwrap();

    let module = "import json\n\n".to_owned()
        + &(0..12)
            .map(|i| format!("def handler_{i}(event):\n    body = json.loads(event)\n    return body[{i}]\n\n"))
            .collect::<String>();
    let files = vec![FileEntry::new("app/handlers.py", module), prose("README.txt", 40)];
    let result = optimizer.optimize(&files).unwrap();

    assert_eq!(refiner.calls.load(Ordering::SeqCst), 0);
    assert!(result.files.iter().all(|f| !f.llm_refined));
    let meta = &result.metadata;
    let expected = meta.total_final_tokens as f64 / meta.total_original_tokens as f64;
    assert!((meta.compression_ratio - expected).abs() < 1e-12);
    assert!(meta.fits_in_budget);
}

#[test]
fn malformed_python_is_truncated_not_rejected() {
    let broken = "def broken(:\n    return [1, 2\n".repeat(20);
    let optimizer = ContextOptimizer::new(generic(40)).unwrap();
    let result = optimizer.optimize(&[FileEntry::new("src/broken.py", broken)]).unwrap();

    let file = &result.files[0];
    assert_eq!(file.treatment, Treatment::Truncated);
    assert!(!file.content.trim().is_empty());
    assert!(file.final_tokens <= 40);
    assert!(file.minimal_attempted());
    assert!(result.metadata.fits_in_budget);
}

#[test]
fn structured_data_collapses_to_schema() {
    let rows: Vec<String> = (0..40)
        .map(|i| format!(r#"{{"id": {i}, "name": "user{i}", "active": true}}"#))
        .collect();
    let json = format!("{{\"users\": [{}]}}", rows.join(", "));
    let options = generic(200).with_summarization(
        SummarizationConfig::default().with_level(CompressionLevel::Outline),
    );
    let optimizer = ContextOptimizer::new(options).unwrap();
    let result = optimizer.optimize(&[FileEntry::new("data/users.json", json)]).unwrap();

    let file = &result.files[0];
    assert_eq!(file.treatment, Treatment::Summarized);
    assert!(file.content.contains("\"users\""));
    assert!(!file.content.contains("user39"));
}

#[test]
fn directives_reorder_files() {
    let files = vec![prose("vendor/lib.txt", 60), prose("core/main.txt", 60)];
    let options = generic(70).with_directives(vec![
        PathDirective::prioritize("core"),
        PathDirective::deprioritize("vendor"),
    ]);
    let result = ContextOptimizer::new(options).unwrap().optimize(&files).unwrap();
    assert_eq!(result.files[0].path, "core/main.txt");
    assert_eq!(result.files[0].treatment, Treatment::Kept);
}

#[test]
fn config_drives_a_full_run() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(".contextfit.yaml"),
        "budget:\n  tokens: 50\nmodel: generic\noutput:\n  format: json\n",
    )
    .unwrap();
    let config = Config::load(dir.path(), None).unwrap();
    assert_eq!(config.output.format, OutputFormat::Json);

    let optimizer = ContextOptimizer::new(config.optimizer_options().unwrap()).unwrap();
    let result = optimizer.optimize(&[prose("a.txt", 40), prose("b.txt", 40)]).unwrap();
    let rendered = OutputFormatter::by_format(config.output.format).format(&result);
    let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(value["metadata"]["tokens_available"], 50);
    assert_eq!(value["files"].as_array().unwrap().len(), 2);
}
