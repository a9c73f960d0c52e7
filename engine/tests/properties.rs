//! Property tests for the optimizer and the summarization strategies

use contextfit_engine::parser::{parse_outline, Language};
use contextfit_engine::summarize::{bracket_balance, StructuralStrategy, Truncator};
use contextfit_engine::{
    BudgetSpec, CompressionLevel, ContextOptimizer, FileEntry, OptimizerOptions,
    SummarizationConfig, Summarizer, TokenModel, Tokenizer,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct PyItem {
    class: bool,
    doc: bool,
    body_lines: usize,
}

fn arb_item() -> impl Strategy<Value = PyItem> {
    (any::<bool>(), any::<bool>(), 3usize..8).prop_map(|(class, doc, body_lines)| PyItem {
        class,
        doc,
        body_lines,
    })
}

fn python_module(items: &[PyItem]) -> String {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if item.class {
            out.push_str(&format!("class Widget{}:\n", i));
            if item.doc {
                out.push_str(&format!("    \"\"\"Widget number {}.\"\"\"\n\n", i));
            }
            out.push_str("    def run(self, value):\n");
            for j in 0..item.body_lines {
                out.push_str(&format!("        value = value * {} + {}\n", j + 2, i));
            }
            out.push_str("        return value\n\n\n");
        } else {
            out.push_str(&format!("def compute_{}(a, b):\n", i));
            if item.doc {
                out.push_str(&format!("    \"\"\"Compute variant {}.\"\"\"\n", i));
            }
            for j in 0..item.body_lines {
                out.push_str(&format!("    a = a + b * {}\n", j + 1));
            }
            out.push_str("    return a\n\n\n");
        }
    }
    out
}

fn script_module(items: &[PyItem]) -> String {
    let mut out = String::from("import { log } from './log';\n\n");
    for (i, item) in items.iter().enumerate() {
        if item.doc {
            out.push_str(&format!("/** Item {} */\n", i));
        }
        if item.class {
            out.push_str(&format!("export class Store{} {{\n  run(value) {{\n", i));
            for j in 0..item.body_lines {
                out.push_str(&format!("    if (value > {}) {{ value -= {}; }}\n", j, i + 1));
            }
            out.push_str("    return value;\n  }\n}\n\n");
        } else {
            out.push_str(&format!("function step{}(a, b) {{\n", i));
            for j in 0..item.body_lines {
                out.push_str(&format!("  const v{} = [a, b, {}].map((x) => x * 2);\n", j, j));
            }
            out.push_str("  return { a, b };\n}\n\n");
        }
    }
    out
}

fn arb_text_file(index: usize) -> impl Strategy<Value = FileEntry> {
    ("[a-z ]{1,40}", 1usize..60).prop_map(move |(line, repeat)| {
        FileEntry::new(format!("notes/{}.txt", index), format!("{}\n", line).repeat(repeat))
    })
}

fn arb_files() -> impl Strategy<Value = Vec<FileEntry>> {
    (
        prop::collection::vec(arb_item(), 1..6),
        arb_text_file(0),
        arb_text_file(1),
        arb_text_file(2),
    )
        .prop_map(|(items, a, b, c)| {
            vec![FileEntry::new("src/app.py", python_module(&items)), a, b, c]
        })
}

fn options(capacity: i64, ratio: f64) -> OptimizerOptions {
    OptimizerOptions::default()
        .with_budget(BudgetSpec::Explicit(capacity))
        .with_model(TokenModel::Generic)
        .with_summarization(SummarizationConfig::default().with_ratio(ratio))
}

proptest! {
    #[test]
    fn budget_holds_without_preserved_floor(files in arb_files(), capacity in 1i64..400) {
        let optimizer = ContextOptimizer::new(options(capacity, 0.3)).unwrap();
        let result = optimizer.optimize(&files).unwrap();

        let total: u64 = result.files.iter().map(|f| f.final_tokens).sum();
        prop_assert_eq!(total, result.metadata.total_final_tokens);
        prop_assert!(result.metadata.fits_in_budget);
        prop_assert!(total <= capacity as u64, "{} > {}", total, capacity);
        prop_assert_eq!(result.files.len(), files.len());
    }

    #[test]
    fn overflow_only_after_minimal(
        items in prop::collection::vec(arb_item(), 1..5),
        capacity in 1i64..30,
    ) {
        let content = format!("import os\nimport sys\nfrom collections import OrderedDict\n\n{}", python_module(&items));
        let files = vec![FileEntry::new("src/app.py", content)];
        let optimizer = ContextOptimizer::new(options(capacity, 0.3)).unwrap();
        let result = optimizer.optimize(&files).unwrap();

        if result.metadata.fits_in_budget {
            prop_assert!(result.metadata.total_final_tokens <= capacity as u64);
        } else {
            prop_assert!(result.files.iter().any(|f| f.minimal_attempted()));
        }
        prop_assert!(result.files[0].content.contains("import sys"));
    }

    #[test]
    fn runs_are_idempotent(files in arb_files(), capacity in 1i64..400) {
        let optimizer = ContextOptimizer::new(options(capacity, 0.3)).unwrap();
        let first = optimizer.optimize(&files).unwrap();
        let second = optimizer.optimize(&files).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn lower_ratio_never_grows_a_file(
        items in prop::collection::vec(arb_item(), 2..6),
        ratio_hi in 0.35f64..=1.0,
        ratio_drop in 0.0f64..0.8,
        capacity_fraction in 0.05f64..0.95,
    ) {
        let file = FileEntry::new("src/app.py", python_module(&items));
        let tokens = Tokenizer::new().count(&file.content, TokenModel::Generic);
        let capacity = ((tokens as f64 * capacity_fraction) as i64).max(1);
        let ratio_lo = (ratio_hi - ratio_drop).max(0.35);

        let run = |ratio: f64| {
            ContextOptimizer::new(options(capacity, ratio))
                .unwrap()
                .optimize(std::slice::from_ref(&file))
                .unwrap()
                .files[0]
                .final_tokens
        };
        prop_assert!(run(ratio_lo) <= run(ratio_hi));
    }

    #[test]
    fn truncator_respects_target(text in "([a-z]{1,12}[ \n]){0,300}", target in 0u64..120) {
        let truncator = Truncator::new(Tokenizer::new(), TokenModel::Generic);
        let file = FileEntry::new("notes.txt", text);
        let truncation = truncator.truncate(&file, target, &[]);
        prop_assert!(truncator.count(&truncation.text) <= target);
    }

    #[test]
    fn script_outlines_stay_balanced(items in prop::collection::vec(arb_item(), 1..6)) {
        let file = FileEntry::new("lib/store.js", script_module(&items));
        let strategy = StructuralStrategy::new();
        for level in [CompressionLevel::Signatures, CompressionLevel::Docstrings, CompressionLevel::Outline] {
            let summary = strategy
                .summarize(&file, &SummarizationConfig::default().at_level(level))
                .unwrap();
            prop_assert!(bracket_balance(&summary.text, &file.path), "{}:\n{}", level, summary.text);
        }
    }

    #[test]
    fn signatures_reparse_to_subset(items in prop::collection::vec(arb_item(), 1..6)) {
        let content = python_module(&items);
        let original = parse_outline(&content, Language::Python).unwrap().declaration_set();
        let file = FileEntry::new("src/app.py", content);
        let summary = StructuralStrategy::new()
            .summarize(&file, &SummarizationConfig::default().at_level(CompressionLevel::Signatures))
            .unwrap();
        let reparsed = parse_outline(&summary.text, Language::Python).unwrap().declaration_set();
        prop_assert!(reparsed.iter().all(|d| original.contains(d)), "{:?}", reparsed);
    }
}
