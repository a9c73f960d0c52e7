//! ContextFit CLI - fit a source tree into an LLM context window
//!
//! Scans a directory, scores and compresses its files against a token
//! budget, and renders the result as Markdown, JSON or HTML.

// CLI tools legitimately use print macros for user output
#![allow(clippy::print_stdout, clippy::print_stderr)]

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

mod scanner;

use contextfit_engine::{
    config::CONFIG_FILES, rank_order, CancellationToken, CompressionLevel, Config,
    ContextOptimizer, ContextWindow, ImportanceScorer, OptimizationResult, OutputFormat,
    OutputFormatter, TokenModel, Treatment,
};

/// ContextFit - fit a source tree into an LLM context window
#[derive(Parser)]
#[command(
    name = "contextfit",
    version,
    about = "Fit a source tree into an LLM context window",
    long_about = "ContextFit ranks files by importance and keeps, summarizes or truncates each one\nso the whole tree fits a fixed token budget."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory into a budgeted context document
    Pack {
        /// Path to the source tree (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output format (default: from config, else markdown)
        #[arg(short, long, value_enum)]
        format: Option<Format>,

        /// Model whose tokenizer counts the budget
        #[arg(short, long, value_enum)]
        model: Option<Model>,

        /// Named context window (gpt-3.5, gpt-4, gpt-4-32k, claude-2, claude-3, llama-2)
        #[arg(short, long)]
        window: Option<ContextWindow>,

        /// Explicit token capacity (overrides --window)
        #[arg(short = 't', long)]
        max_tokens: Option<i64>,

        /// Finest level tried when a file must be compressed
        #[arg(short, long, value_enum)]
        level: Option<Level>,

        /// Fraction of its tokens a compressed file may keep, in (0, 1]
        #[arg(short, long)]
        ratio: Option<f64>,

        /// Share of the capacity reserved for compressed files, in [0, 1)
        #[arg(long)]
        reserve: Option<f64>,

        /// Path prefixes to boost
        #[arg(long)]
        prioritize: Vec<String>,

        /// Path prefixes to demote
        #[arg(long)]
        deprioritize: Vec<String>,

        /// Disable importance scoring (uniform scores)
        #[arg(long)]
        no_importance: bool,

        /// Refine summaries with the configured LLM provider
        #[arg(long)]
        llm: bool,

        /// Stop compressing after this many seconds and report partial results
        #[arg(long)]
        deadline: Option<u64>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration file (default: .contextfit.* in the path)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Show files ranked by importance
    Score {
        /// Path to the source tree (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Path prefixes to boost
        #[arg(long)]
        prioritize: Vec<String>,

        /// Path prefixes to demote
        #[arg(long)]
        deprioritize: Vec<String>,

        /// Show only the top N files
        #[arg(short = 'n', long)]
        top: Option<usize>,

        /// Output as JSON with the factor breakdown
        #[arg(long)]
        json: bool,

        /// Configuration file (default: .contextfit.* in the path)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Show version and supported settings
    Info,

    /// Initialize a new configuration file
    Init {
        /// Configuration format
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Output path (default: .contextfit.yaml in current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

/// File selection shared by `pack` and `score`
#[derive(Args)]
struct ScanArgs {
    /// Glob patterns to include (e.g. "src/**/*.py")
    #[arg(short, long = "include")]
    include: Vec<String>,

    /// Glob patterns to exclude
    #[arg(short, long = "exclude")]
    exclude: Vec<String>,

    /// Include hidden files
    #[arg(long)]
    hidden: bool,

    /// Ignore .gitignore rules
    #[arg(long)]
    no_gitignore: bool,
}

impl ScanArgs {
    fn to_config(&self) -> Result<scanner::ScanConfig> {
        scanner::ScanConfig {
            include_hidden: self.hidden,
            respect_gitignore: !self.no_gitignore,
            ..Default::default()
        }
        .with_patterns(&self.include, &self.exclude)
    }
}

#[derive(ValueEnum, Clone, Copy)]
enum ConfigFormat {
    /// YAML format
    Yaml,
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl From<ConfigFormat> for contextfit_engine::ConfigFormat {
    fn from(f: ConfigFormat) -> Self {
        match f {
            ConfigFormat::Yaml => Self::Yaml,
            ConfigFormat::Toml => Self::Toml,
            ConfigFormat::Json => Self::Json,
        }
    }
}

#[derive(ValueEnum, Clone, Copy)]
enum Format {
    /// Markdown document with code fences
    Markdown,
    /// Structured result with per-file metadata
    Json,
    /// Self-contained HTML page
    Html,
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Markdown => OutputFormat::Markdown,
            Format::Json => OutputFormat::Json,
            Format::Html => OutputFormat::Html,
        }
    }
}

#[derive(ValueEnum, Clone, Copy)]
enum Model {
    Claude,
    Gpt4o,
    Gpt4,
    Gemini,
    Llama,
    Codellama,
    /// Four bytes per token
    Generic,
}

impl From<Model> for TokenModel {
    fn from(m: Model) -> Self {
        match m {
            Model::Claude => TokenModel::Claude,
            Model::Gpt4o => TokenModel::Gpt4o,
            Model::Gpt4 => TokenModel::Gpt4,
            Model::Gemini => TokenModel::Gemini,
            Model::Llama => TokenModel::Llama,
            Model::Codellama => TokenModel::CodeLlama,
            Model::Generic => TokenModel::Generic,
        }
    }
}

#[derive(ValueEnum, Clone, Copy)]
enum Level {
    /// Verbatim
    Full,
    /// Declarations with bodies elided
    Signatures,
    /// Signatures plus their documentation
    Docstrings,
    /// Top-level names only
    Outline,
    /// Imports and exports only
    Minimal,
}

impl From<Level> for CompressionLevel {
    fn from(l: Level) -> Self {
        match l {
            Level::Full => CompressionLevel::Full,
            Level::Signatures => CompressionLevel::Signatures,
            Level::Docstrings => CompressionLevel::Docstrings,
            Level::Outline => CompressionLevel::Outline,
            Level::Minimal => CompressionLevel::Minimal,
        }
    }
}

/// Command-line overrides applied on top of the loaded configuration
struct PackOverrides {
    format: Option<Format>,
    model: Option<Model>,
    window: Option<ContextWindow>,
    max_tokens: Option<i64>,
    level: Option<Level>,
    ratio: Option<f64>,
    reserve: Option<f64>,
    prioritize: Vec<String>,
    deprioritize: Vec<String>,
    no_importance: bool,
    llm: bool,
}

impl PackOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(format) = self.format {
            config.output.format = format.into();
        }
        if let Some(model) = self.model {
            config.model = TokenModel::from(model).name().to_owned();
        }
        if let Some(window) = self.window {
            config.budget.window = Some(window.name().to_owned());
            config.budget.tokens = None;
        }
        if let Some(tokens) = self.max_tokens {
            config.budget.tokens = Some(tokens);
        }
        if let Some(level) = self.level {
            config.summarization.level = level.into();
        }
        if let Some(ratio) = self.ratio {
            config.summarization.target_ratio = ratio;
        }
        if let Some(reserve) = self.reserve {
            config.budget.reserve = reserve;
        }
        config.importance.prioritize.extend(self.prioritize);
        config.importance.deprioritize.extend(self.deprioritize);
        if self.no_importance {
            config.importance.enabled = false;
        }
        if self.llm {
            config.summarization.use_llm = true;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Pack {
            path,
            format,
            model,
            window,
            max_tokens,
            level,
            ratio,
            reserve,
            prioritize,
            deprioritize,
            no_importance,
            llm,
            deadline,
            output,
            config,
            scan,
        } => {
            let overrides = PackOverrides {
                format,
                model,
                window,
                max_tokens,
                level,
                ratio,
                reserve,
                prioritize,
                deprioritize,
                no_importance,
                llm,
            };
            cmd_pack(&path, overrides, &scan, config.as_deref(), deadline, output, cli.verbose > 0)
        },
        Commands::Score { path, prioritize, deprioritize, top, json, config, scan } => {
            cmd_score(&path, prioritize, deprioritize, top, json, config.as_deref(), &scan)
        },
        Commands::Info => cmd_info(),
        Commands::Init { format, output, force } => cmd_init(format.into(), output, force),
    }
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message);
    pb
}

fn cmd_pack(
    path: &Path,
    overrides: PackOverrides,
    scan_args: &ScanArgs,
    config_path: Option<&Path>,
    deadline: Option<u64>,
    output: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let start = Instant::now();

    let mut config = Config::load(path, config_path).context("Failed to load configuration")?;
    overrides.apply(&mut config);
    let options = config.optimizer_options().context("Invalid configuration")?;
    let optimizer = ContextOptimizer::new(options)?;

    if verbose {
        eprintln!("{}", "ContextFit - Context Window Packer".cyan().bold());
        eprintln!();
    }
    let pb = verbose.then(|| spinner("Scanning files..."));

    let scan = scanner::scan_repository(path, &scan_args.to_config()?)
        .context("Failed to scan directory")?;

    if let Some(pb) = &pb {
        pb.set_message(format!("Fitting {} files into {} tokens...", scan.files.len(), optimizer.capacity()));
    }

    let cancel = CancellationToken::new();
    if let Some(secs) = deadline {
        let timer = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            timer.cancel();
        });
    }
    let result = optimizer.optimize_with_cancel(&scan.files, &cancel)?;

    let formatter = OutputFormatter::by_format_with_title(config.output.format, Some(&scan.name));
    let output_text = formatter.format(&result);

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if let Some(ref output_path) = output {
        std::fs::write(output_path, &output_text).context("Failed to write output file")?;
        eprintln!("{} Output written to: {}", "✓".green(), output_path.display());
    } else {
        print!("{}", output_text);
    }

    if verbose {
        print_pack_summary(&scan, &result, output_text.len() as u64, start.elapsed());
    }
    if result.metadata.cancelled {
        eprintln!(
            "{} Deadline reached; files not yet compressed were omitted",
            "⚠".yellow()
        );
    }
    if !result.metadata.fits_in_budget {
        eprintln!(
            "{} Preserved content exceeds the budget by {} tokens",
            "⚠".yellow(),
            result.metadata.overflow_tokens
        );
    }

    Ok(())
}

fn print_pack_summary(scan: &scanner::Scan, result: &OptimizationResult, bytes: u64, elapsed: Duration) {
    let meta = &result.metadata;
    let count = |treatment: Treatment| result.files.iter().filter(|f| f.treatment == treatment).count();

    eprintln!();
    eprintln!("{}", "━".repeat(50).dimmed());
    eprintln!("  {}", "Pack Results".cyan().bold());
    eprintln!("{}", "━".repeat(50).dimmed());
    eprintln!("  Files:        {} ({} skipped)", meta.file_count, scan.skipped);
    eprintln!(
        "  Treatment:    {} kept, {} summarized, {} truncated, {} dropped",
        count(Treatment::Kept),
        count(Treatment::Summarized),
        count(Treatment::Truncated),
        count(Treatment::Dropped)
    );
    eprintln!(
        "  Tokens:       {} -> {} of {} ({})",
        meta.total_original_tokens, meta.total_final_tokens, meta.tokens_available, meta.model
    );
    eprintln!("  Compression:  {:.1}%", meta.compression_ratio * 100.0);
    eprintln!("  Input Size:   {}", format_size(scan.total_bytes(), BINARY));
    eprintln!("  Output Size:  {}", format_size(bytes, BINARY));
    eprintln!("  Time:         {:?}", elapsed);
    let refined = result.files.iter().filter(|f| f.llm_refined).count();
    if refined > 0 {
        eprintln!("  Refined:      {} files", refined);
    }
    eprintln!();
}

fn cmd_score(
    path: &Path,
    prioritize: Vec<String>,
    deprioritize: Vec<String>,
    top: Option<usize>,
    json_output: bool,
    config_path: Option<&Path>,
    scan_args: &ScanArgs,
) -> Result<()> {
    let mut config = Config::load(path, config_path).context("Failed to load configuration")?;
    config.importance.prioritize.extend(prioritize);
    config.importance.deprioritize.extend(deprioritize);

    let scorer = ImportanceScorer::new(config.importance.weights)
        .context("Invalid importance weights")?
        .with_directives(config.importance.directives());

    let scan = scanner::scan_repository(path, &scan_args.to_config()?)
        .context("Failed to scan directory")?;
    let scores = scorer.score_all(&scan.files);
    let values: Vec<f64> = scores.iter().map(|s| s.score).collect();
    let order = rank_order(&scan.files, &values);
    let limit = top.unwrap_or(order.len());

    if json_output {
        let ranked: Vec<_> = order.iter().take(limit).map(|&i| &scores[i]).collect();
        println!("{}", serde_json::to_string_pretty(&ranked)?);
        return Ok(());
    }

    println!();
    println!("{}", "━".repeat(50).dimmed());
    println!("  {}", "Importance Ranking".cyan().bold());
    println!("{}", "━".repeat(50).dimmed());
    println!();
    println!("  Directory:    {}", scan.name.yellow());
    println!("  Path:         {}", scan.root.display());
    println!("  Files:        {}", scan.files.len());
    println!();

    for (rank, &i) in order.iter().take(limit).enumerate() {
        let score = &scores[i];
        let strongest = score
            .factors
            .iter()
            .max_by(|a, b| a.contribution().total_cmp(&b.contribution()))
            .map(|f| f.factor.name())
            .unwrap_or("-");
        println!(
            "  {:>4}. {:.3}  {} {}",
            rank + 1,
            score.score,
            score.path,
            format!("({})", strongest).as_str().dimmed()
        );
    }
    if order.len() > limit {
        println!("  ... and {} more files", order.len() - limit);
    }
    println!();

    Ok(())
}

fn cmd_info() -> Result<()> {
    println!();
    println!("{}", "ContextFit - Context Window Packer".cyan().bold());
    println!("{}", "━".repeat(50).dimmed());
    println!();
    println!("  Version:      {}", env!("CARGO_PKG_VERSION"));
    println!("  Engine:       {}", contextfit_engine::VERSION);
    println!();
    println!("  {}:", "Output Formats".yellow());
    for format in OutputFormat::ALL {
        println!("    {:<10}  .{}", format.name(), format.extension());
    }
    println!();
    println!("  {}:", "Token Models".yellow());
    println!("    {}", TokenModel::known_names().join(", "));
    println!();
    println!("  {}:", "Context Windows".yellow());
    for window in ContextWindow::ALL {
        println!("    {:<10}  {} tokens", window.name(), window.tokens());
    }
    println!();
    println!("  {}:", "Compression Levels".yellow());
    for level in CompressionLevel::LADDER {
        println!("    {}", level.name());
    }
    println!();
    println!("  {}:", "Config Files".yellow());
    println!("    {}", CONFIG_FILES.join(", "));
    println!();

    Ok(())
}

fn cmd_init(format: contextfit_engine::ConfigFormat, output: Option<PathBuf>, force: bool) -> Result<()> {
    let output_path =
        output.unwrap_or_else(|| PathBuf::from(format!(".contextfit.{}", format.extension())));

    // Check if file exists
    if output_path.exists() && !force {
        eprintln!(
            "{} Configuration file already exists: {}",
            "Error:".red().bold(),
            output_path.display()
        );
        eprintln!("Use --force to overwrite");
        std::process::exit(1);
    }

    let config_content = Config::generate_default(format)?;

    std::fs::write(&output_path, &config_content)
        .with_context(|| format!("Failed to write config file: {}", output_path.display()))?;

    println!("{} Created configuration file: {}", "✓".green(), output_path.display());
    println!();
    println!("Edit this file to change the budget, model and compression settings.");

    Ok(())
}
