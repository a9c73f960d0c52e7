//! Context optimization runs
//!
//! A run moves through `COLLECTING → SCORING → ALLOCATING → COMPRESSING →
//! FINALIZED`:
//!
//! 1. Input is validated; an empty set is an empty success.
//! 2. Files are scored (or given caller scores, or a uniform score).
//! 3. In rank order, whole files are reserved greedily until the first one
//!    that does not fit; everything after it is queued for compression. A file
//!    larger than the whole capacity is queued without stopping the walk.
//! 4. Queued files get water-filled shares of the remainder and walk the
//!    compression ladder until they fit, with the truncator as a backstop.
//!    Compression runs in parallel; results merge back in rank order.
//! 5. Results are consumed against the budget and totals recorded.
//!
//! # Example
//!
//! ```rust,ignore
//! use contextfit_engine::{BudgetSpec, ContextOptimizer, FileEntry, OptimizerOptions};
//!
//! let optimizer = ContextOptimizer::new(
//!     OptimizerOptions::default().with_budget(BudgetSpec::Explicit(8_000)),
//! )?;
//! let result = optimizer.optimize(&[FileEntry::new("main.py", "print('hi')\n")])?;
//! assert!(result.metadata.fits_in_budget);
//! ```

use crate::budget::{BudgetSpec, TokenBudget};
use crate::error::{ConfigurationError, Result};
use crate::llm::{RefineHint, Refiner};
use crate::ranking::{rank_order, FactorWeights, ImportanceScorer, PathDirective};
use crate::summarize::{preserved_floor, SummarizationConfig, SummarizationEngine, Summary};
use crate::tokenizer::{TokenModel, Tokenizer};
use crate::types::{CompressionLevel, FileEntry, OptimizedFile, RunMetadata, Treatment};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Score assigned to every file when importance scoring is off
pub const UNIFORM_SCORE: f64 = 0.5;

/// Share weight floor so low-importance files still get some room
const SHARE_WEIGHT_FLOOR: f64 = 0.25;

/// Per-run options
#[derive(Clone)]
pub struct OptimizerOptions {
    pub budget: BudgetSpec,
    pub model: TokenModel,
    pub summarization: SummarizationConfig,
    /// Score files; when off every file gets [`UNIFORM_SCORE`]
    pub importance: bool,
    pub weights: FactorWeights,
    pub directives: Vec<PathDirective>,
    /// Fraction of capacity kept out of whole-file allocation, in [0, 1)
    pub summary_reserve: f64,
    pub refiner: Option<Arc<dyn Refiner>>,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            budget: BudgetSpec::default(),
            model: TokenModel::default(),
            summarization: SummarizationConfig::default(),
            importance: true,
            weights: FactorWeights::default(),
            directives: Vec::new(),
            summary_reserve: 0.0,
            refiner: None,
        }
    }
}

impl fmt::Debug for OptimizerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizerOptions")
            .field("budget", &self.budget)
            .field("model", &self.model)
            .field("summarization", &self.summarization)
            .field("importance", &self.importance)
            .field("weights", &self.weights)
            .field("directives", &self.directives)
            .field("summary_reserve", &self.summary_reserve)
            .field("refiner", &self.refiner.as_ref().map(|r| r.provider().to_owned()))
            .finish()
    }
}

impl OptimizerOptions {
    pub fn with_budget(mut self, budget: BudgetSpec) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_model(mut self, model: TokenModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_summarization(mut self, config: SummarizationConfig) -> Self {
        self.summarization = config;
        self
    }

    pub fn with_importance(mut self, enabled: bool) -> Self {
        self.importance = enabled;
        self
    }

    pub fn with_weights(mut self, weights: FactorWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_directives(mut self, directives: Vec<PathDirective>) -> Self {
        self.directives = directives;
        self
    }

    pub fn with_summary_reserve(mut self, reserve: f64) -> Self {
        self.summary_reserve = reserve;
        self
    }

    pub fn with_refiner(mut self, refiner: Arc<dyn Refiner>) -> Self {
        self.refiner = Some(refiner);
        self
    }

    /// Check everything that would make a run invalid
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.budget.capacity()?;
        self.summarization.validate()?;
        self.weights.normalized()?;
        if !(0.0..1.0).contains(&self.summary_reserve) {
            return Err(ConfigurationError::InvalidSetting(format!(
                "summary reserve must be in [0, 1), got {}",
                self.summary_reserve
            )));
        }
        Ok(())
    }
}

/// Cooperative cancellation for a run, checked between files
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Collecting,
    Scoring,
    Allocating,
    Compressing,
    Finalized,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Collecting => "COLLECTING",
            Self::Scoring => "SCORING",
            Self::Allocating => "ALLOCATING",
            Self::Compressing => "COMPRESSING",
            Self::Finalized => "FINALIZED",
        })
    }
}

/// The output of one run; immutable once returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Files in rank order
    pub files: Vec<OptimizedFile>,
    pub metadata: RunMetadata,
}

/// Fits a file set into a token budget
pub struct ContextOptimizer {
    options: OptimizerOptions,
    capacity: u64,
    tokenizer: Tokenizer,
    engine: SummarizationEngine,
    scorer: ImportanceScorer,
}

impl ContextOptimizer {
    /// Validate options and build the optimizer with the built-in strategies
    pub fn new(options: OptimizerOptions) -> Result<Self> {
        let tokenizer = Tokenizer::new();
        let engine = SummarizationEngine::with_defaults(tokenizer, options.model);
        Self::with_engine(options, engine)
    }

    /// Build around a custom strategy registry
    pub fn with_engine(options: OptimizerOptions, engine: SummarizationEngine) -> Result<Self> {
        options.validate()?;
        let capacity = options.budget.capacity()?;
        let scorer =
            ImportanceScorer::new(options.weights)?.with_directives(options.directives.clone());
        Ok(Self { capacity, tokenizer: Tokenizer::new(), engine, scorer, options })
    }

    /// Replace the scorer, e.g. to pin the recency reference time
    pub fn with_scorer(mut self, scorer: ImportanceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn optimize(&self, files: &[FileEntry]) -> Result<OptimizationResult> {
        self.run(files, None, None)
    }

    /// Use caller-supplied scores by path; missing paths get [`UNIFORM_SCORE`]
    pub fn optimize_with_scores(
        &self,
        files: &[FileEntry],
        scores: &HashMap<String, f64>,
    ) -> Result<OptimizationResult> {
        self.run(files, Some(scores), None)
    }

    pub fn optimize_with_cancel(
        &self,
        files: &[FileEntry],
        cancel: &CancellationToken,
    ) -> Result<OptimizationResult> {
        self.run(files, None, Some(cancel))
    }

    fn count(&self, text: &str) -> u64 {
        self.tokenizer.count(text, self.options.model)
    }

    fn run(
        &self,
        files: &[FileEntry],
        caller_scores: Option<&HashMap<String, f64>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<OptimizationResult> {
        let mut state = RunState::Collecting;
        log::debug!("run: {} ({} files)", state, files.len());

        let mut seen = HashSet::with_capacity(files.len());
        for file in files {
            if !seen.insert(file.path.as_str()) {
                return Err(ConfigurationError::DuplicatePath(file.path.clone()).into());
            }
        }
        let mut budget = TokenBudget::from_spec(self.options.budget)?;
        if files.is_empty() {
            return Ok(OptimizationResult {
                files: Vec::new(),
                metadata: RunMetadata {
                    tokens_available: self.capacity,
                    fits_in_budget: true,
                    compression_ratio: 1.0,
                    model: self.options.model.name().to_owned(),
                    allocation_ratio: budget.allocation_ratio(),
                    ..Default::default()
                },
            });
        }

        advance(&mut state, RunState::Scoring);
        let scores: Vec<f64> = match caller_scores {
            Some(scores) => files
                .iter()
                .map(|f| scores.get(&f.path).copied().unwrap_or(UNIFORM_SCORE).clamp(0.0, 1.0))
                .collect(),
            None if self.options.importance => {
                self.scorer.score_all(files).into_iter().map(|s| s.score).collect()
            }
            None => vec![UNIFORM_SCORE; files.len()],
        };

        advance(&mut state, RunState::Allocating);
        let tokens: Vec<u64> = files.par_iter().map(|f| self.count(&f.content)).collect();
        let order = rank_order(files, &scores);
        let reserve = (self.capacity as f64 * self.options.summary_reserve).floor() as u64;
        let whole_limit = self.capacity - reserve;

        let mut kept = HashSet::new();
        let mut queued = Vec::new();
        let mut kept_total = 0u64;
        let mut exhausted = false;
        for &i in &order {
            if !exhausted && tokens[i] <= whole_limit - kept_total {
                kept_total += tokens[i];
                kept.insert(i);
            } else {
                if !exhausted && tokens[i] <= self.capacity {
                    exhausted = true;
                }
                queued.push(i);
            }
        }
        budget.allocate("kept", kept_total)?;
        let remainder = self.capacity - kept_total;
        if !queued.is_empty() {
            budget.allocate("compressed", remainder)?;
        }
        let shares = water_fill(
            remainder,
            &queued
                .iter()
                .map(|&i| ((SHARE_WEIGHT_FLOOR + scores[i]) * tokens[i] as f64, tokens[i]))
                .collect::<Vec<_>>(),
        );
        log::debug!(
            "allocated {} whole files ({} tokens); {} queued for {} tokens",
            kept.len(),
            kept_total,
            queued.len(),
            remainder
        );

        advance(&mut state, RunState::Compressing);
        let refiner = self.options.refiner.as_deref().filter(|r| {
            let available = r.is_available();
            if self.options.summarization.use_llm && !available {
                log::debug!("{} refiner unavailable; using deterministic summaries", r.provider());
            }
            available && self.options.summarization.use_llm
        });
        let share_of: HashMap<usize, u64> = queued.iter().copied().zip(shares).collect();
        let cancelled = AtomicBool::new(false);

        let results: Vec<Option<OptimizedFile>> = order
            .par_iter()
            .map(|&i| {
                let file = &files[i];
                if kept.contains(&i) {
                    return Some(self.keep(file, tokens[i], scores[i]));
                }
                if cancel.is_some_and(CancellationToken::is_cancelled) {
                    cancelled.store(true, Ordering::SeqCst);
                    return None;
                }
                let share = share_of.get(&i).copied().unwrap_or(0);
                Some(self.compress(file, tokens[i], scores[i], share, refiner))
            })
            .collect();

        advance(&mut state, RunState::Finalized);
        let cancelled = cancelled.load(Ordering::SeqCst);
        let files: Vec<OptimizedFile> = results.into_iter().flatten().collect();
        let mut overflow = 0u64;
        for file in &files {
            if let Err(e) = budget.consume(file.final_tokens) {
                log::warn!("{}: {}", file.path, e);
                let remaining = budget.remaining();
                overflow += file.final_tokens - remaining;
                budget.consume(remaining)?;
            }
        }

        let total_original: u64 = files.iter().map(|f| f.original_tokens).sum();
        let total_final: u64 = files.iter().map(|f| f.final_tokens).sum();
        let metadata = RunMetadata {
            file_count: files.len(),
            total_original_tokens: total_original,
            total_final_tokens: total_final,
            tokens_available: self.capacity,
            fits_in_budget: total_final <= self.capacity,
            compression_ratio: if total_original == 0 {
                1.0
            } else {
                total_final as f64 / total_original as f64
            },
            model: self.options.model.name().to_owned(),
            overflow_tokens: overflow,
            cancelled,
            allocation_ratio: budget.allocation_ratio(),
        };
        log::info!(
            "{} files: {} -> {} tokens of {} ({:.1}%){}",
            metadata.file_count,
            total_original,
            total_final,
            self.capacity,
            metadata.compression_ratio * 100.0,
            if cancelled { ", cancelled" } else { "" }
        );
        Ok(OptimizationResult { files, metadata })
    }

    fn keep(&self, file: &FileEntry, tokens: u64, importance: f64) -> OptimizedFile {
        OptimizedFile {
            path: file.path.clone(),
            language: file.language,
            original_size: file.size_bytes,
            final_size: file.content.len() as u64,
            original_tokens: tokens,
            final_tokens: tokens,
            content: file.content.clone(),
            level: CompressionLevel::Full,
            treatment: Treatment::Kept,
            llm_refined: false,
            importance,
            attempted_levels: vec![CompressionLevel::Full],
        }
    }

    /// Walk the ladder for one queued file until it fits `share`
    fn compress(
        &self,
        file: &FileEntry,
        tokens: u64,
        importance: f64,
        share: u64,
        refiner: Option<&dyn Refiner>,
    ) -> OptimizedFile {
        let config = self.options.summarization;
        let ratio_target = (tokens as f64 * config.target_ratio).floor() as u64;
        let target = share.min(ratio_target);
        let mut attempted = Vec::new();
        let mut chosen: Option<(Summary, u64)> = None;

        for level in config.level.descending() {
            if level == CompressionLevel::Full {
                attempted.push(level);
                if tokens <= target {
                    chosen = Some((
                        Summary { text: file.content.clone(), level, truncated: false },
                        tokens,
                    ));
                    break;
                }
                continue;
            }
            let rendered = match self.engine.render(file, &config.at_level(level)) {
                None => break,
                Some(Err(e)) => {
                    log::warn!("{}: {}; falling back to truncation", file.path, e);
                    break;
                }
                Some(Ok(summary)) => summary,
            };
            attempted.push(level);
            if rendered.text.trim().is_empty() && !file.content.trim().is_empty() {
                break;
            }
            let count = self.count(&rendered.text);
            if count <= target {
                chosen = Some((rendered, count));
                break;
            }
        }

        let (summary, count) = match chosen {
            Some(found) => found,
            None => {
                if !attempted.contains(&CompressionLevel::Minimal) {
                    attempted.push(CompressionLevel::Minimal);
                }
                let summary = self.engine.truncate(file, target, &config);
                let count = self.count(&summary.text);
                (summary, count)
            }
        };
        log::debug!(
            "{}: {} -> {} tokens (target {}, level {})",
            file.path,
            tokens,
            count,
            target,
            summary.level
        );

        let mut result = OptimizedFile {
            path: file.path.clone(),
            language: file.language,
            original_size: file.size_bytes,
            final_size: summary.text.len() as u64,
            original_tokens: tokens,
            final_tokens: count,
            content: String::new(),
            level: summary.level,
            treatment: match (summary.truncated, summary.level) {
                _ if summary.text.is_empty() && !file.content.is_empty() => Treatment::Dropped,
                (true, _) => Treatment::Truncated,
                (false, CompressionLevel::Full) => Treatment::Kept,
                (false, _) => Treatment::Summarized,
            },
            llm_refined: false,
            importance,
            attempted_levels: attempted,
        };
        result.content = summary.text;

        if let Some(refiner) = refiner {
            if result.level != CompressionLevel::Full {
                self.refine(file, &mut result, target, refiner);
            }
        }
        result
    }

    /// Replace the deterministic candidate when the provider does better
    fn refine(&self, file: &FileEntry, result: &mut OptimizedFile, target: u64, refiner: &dyn Refiner) {
        let hint = RefineHint {
            path: file.path.clone(),
            language: file.language,
            importance: result.importance,
            target_ratio: self.options.summarization.target_ratio,
        };
        let refined = match refiner.refine(&file.content, target, &hint) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("{}: LLM refinement failed: {}; keeping deterministic summary", file.path, e);
                return;
            }
        };
        let count = self.count(&refined);
        let floor = preserved_floor(file, &self.options.summarization);
        let missing = floor.iter().find(|stmt| !refined.contains(stmt.as_str()));
        if refined.trim().is_empty() || count > target || missing.is_some() {
            log::debug!(
                "{}: rejected refinement ({} tokens, target {}, floor intact: {})",
                file.path,
                count,
                target,
                missing.is_none()
            );
            return;
        }
        result.final_size = refined.len() as u64;
        result.final_tokens = count;
        result.content = refined;
        result.treatment = Treatment::Summarized;
        result.llm_refined = true;
    }
}

fn advance(state: &mut RunState, next: RunState) {
    log::debug!("run: {} -> {}", state, next);
    *state = next;
}

/// Split `total` proportionally to weights without giving any item more than
/// its cap. Items whose proportional share reaches their cap are fixed at the
/// cap and the rest is redistributed among the others.
pub(crate) fn water_fill(total: u64, items: &[(f64, u64)]) -> Vec<u64> {
    let mut shares = vec![0u64; items.len()];
    let mut active: Vec<usize> = (0..items.len()).filter(|&i| items[i].1 > 0).collect();
    let mut left = total;

    while !active.is_empty() && left > 0 {
        let weight_sum: f64 = active.iter().map(|&i| items[i].0.max(0.0)).sum();
        let weight = |i: usize| {
            if weight_sum > 0.0 {
                items[i].0.max(0.0) / weight_sum
            } else {
                1.0 / active.len() as f64
            }
        };

        let saturated: Vec<usize> = active
            .iter()
            .copied()
            .filter(|&i| left as f64 * weight(i) >= items[i].1 as f64)
            .collect();
        if saturated.is_empty() {
            for &i in &active {
                shares[i] = (left as f64 * weight(i)).floor() as u64;
            }
            break;
        }
        for &i in &saturated {
            shares[i] = items[i].1;
            left -= items[i].1.min(left);
        }
        active.retain(|i| !saturated.contains(i));
    }
    shares
}
