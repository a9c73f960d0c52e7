//! Optimizer benchmarks
//!
//! Measures scoring, structural summarization and full runs over synthetic
//! Python/TypeScript/JSON file sets at several budget pressures.
//!
//! Run with: cargo bench

use contextfit_engine::{
    BudgetSpec, CompressionLevel, ContextOptimizer, FileEntry, FactorWeights, ImportanceScorer,
    OptimizerOptions, SummarizationConfig, SummarizationEngine, TokenModel, Tokenizer,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Synthetic file set with a mix of languages
fn create_files(num_files: usize, functions_per_file: usize) -> Vec<FileEntry> {
    let mut files = Vec::with_capacity(num_files);
    for i in 0..num_files {
        let file = match i % 3 {
            0 => {
                let mut content = format!("\"\"\"Module {} for Python code\"\"\"\n\nimport os\n\n", i);
                for j in 0..functions_per_file {
                    content.push_str(&format!(
                        r#"
def function_{i}_{j}(x: int, y: int) -> int:
    """Calculate result from x and y."""
    result = x + y
    if result > 100:
        return result * 2
    return result


class Class_{i}_{j}:
    """A sample class."""

    def __init__(self):
        self.value = os.getpid()

    def process(self):
        return self.value * 2

"#
                    ));
                }
                FileEntry::new(format!("src/module_{}.py", i), content)
            }
            1 => {
                let mut content = String::from("import { readFile } from 'fs';\n\n");
                for j in 0..functions_per_file {
                    content.push_str(&format!(
                        r#"
/** Function {j} documentation */
export function function_{i}_{j}(x: number, y: number): number {{
    const result = x + y;
    if (result > 100) {{
        return result * 2;
    }}
    return result;
}}
"#
                    ));
                }
                FileEntry::new(format!("web/module_{}.ts", i), content)
            }
            _ => {
                let rows: Vec<String> = (0..functions_per_file * 4)
                    .map(|j| format!(r#"{{"id": {j}, "name": "item{j}", "tags": ["a", "b"]}}"#))
                    .collect();
                FileEntry::new(format!("data/fixture_{}.json", i), format!("{{\"items\": [{}]}}", rows.join(",")))
            }
        };
        files.push(file);
    }
    files
}

fn bench_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoring");
    let scorer = ImportanceScorer::new(FactorWeights::default()).unwrap();

    for num_files in [30, 150, 600] {
        let files = create_files(num_files, 10);
        group.throughput(Throughput::Elements(num_files as u64));
        group.bench_with_input(BenchmarkId::new("score_all", num_files), &files, |b, files| {
            b.iter(|| black_box(scorer.score_all(files)))
        });
    }
    group.finish();
}

fn bench_summarize(c: &mut Criterion) {
    let mut group = c.benchmark_group("summarize");
    let engine = SummarizationEngine::with_defaults(Tokenizer::new(), TokenModel::Claude);
    let files = create_files(3, 40);

    for level in [CompressionLevel::Signatures, CompressionLevel::Outline, CompressionLevel::Minimal] {
        let config = SummarizationConfig::default().at_level(level);
        for file in &files {
            group.throughput(Throughput::Bytes(file.content.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(level.name(), &file.path),
                file,
                |b, file| b.iter(|| black_box(engine.summarize(file, &config))),
            );
        }
    }
    group.finish();
}

fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize");
    group.sample_size(20);
    let files = create_files(90, 15);

    for capacity in [200_000i64, 50_000, 10_000] {
        let options = OptimizerOptions::default()
            .with_budget(BudgetSpec::Explicit(capacity))
            .with_model(TokenModel::Gpt4o);
        let optimizer = ContextOptimizer::new(options).unwrap();
        group.bench_with_input(BenchmarkId::new("capacity", capacity), &files, |b, files| {
            b.iter(|| black_box(optimizer.optimize(files).unwrap()))
        });
    }
    group.finish();
}

fn bench_token_counting(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_counting");
    let tokenizer = Tokenizer::new();
    let text = create_files(1, 200).remove(0).content;
    group.throughput(Throughput::Bytes(text.len() as u64));

    for model in [TokenModel::Claude, TokenModel::Gpt4o, TokenModel::Gpt4, TokenModel::Generic] {
        group.bench_with_input(BenchmarkId::new("count", model.name()), &text, |b, text| {
            b.iter(|| black_box(tokenizer.count(text, model)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scoring, bench_summarize, bench_optimize, bench_token_counting);
criterion_main!(benches);
