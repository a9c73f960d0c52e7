//! Layered configuration
//!
//! Settings resolve from built-in defaults, then the first
//! `.contextfit.{yaml,yml,toml,json}` found in the repository root (or an
//! explicit file), then `CONTEXTFIT_*` environment variables with `__`
//! separating sections (`CONTEXTFIT_BUDGET__TOKENS=50000`).

use crate::budget::{BudgetSpec, ContextWindow};
use crate::error::ConfigurationError;
use crate::llm::LlmSettings;
use crate::optimizer::OptimizerOptions;
use crate::output::OutputFormat;
use crate::ranking::{FactorWeights, PathDirective};
use crate::summarize::SummarizationConfig;
use crate::tokenizer::TokenModel;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File names probed in the repository root, in order
pub const CONFIG_FILES: [&str; 4] =
    [".contextfit.yaml", ".contextfit.yml", ".contextfit.toml", ".contextfit.json"];

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CONTEXTFIT_";

/// Full configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub budget: BudgetSettings,
    /// Token counting model id
    pub model: String,
    pub summarization: SummarizationConfig,
    pub importance: ImportanceSettings,
    pub llm: LlmSettings,
    pub output: OutputSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            budget: BudgetSettings::default(),
            model: default_model(),
            summarization: SummarizationConfig::default(),
            importance: ImportanceSettings::default(),
            llm: LlmSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

fn default_model() -> String {
    TokenModel::default().name().to_owned()
}

/// Capacity settings; an explicit `tokens` wins over `window`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    /// Context window preset name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    /// Explicit capacity in tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<i64>,
    /// Fraction of capacity held back for compressed files
    pub reserve: f64,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            window: Some(ContextWindow::Claude3.name().to_owned()),
            tokens: None,
            reserve: 0.0,
        }
    }
}

impl BudgetSettings {
    pub fn spec(&self) -> Result<BudgetSpec, ConfigurationError> {
        match (self.tokens, &self.window) {
            (Some(tokens), _) => Ok(BudgetSpec::Explicit(tokens)),
            (None, Some(window)) => Ok(BudgetSpec::Preset(window.parse()?)),
            (None, None) => Ok(BudgetSpec::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportanceSettings {
    pub enabled: bool,
    pub weights: FactorWeights,
    /// Path prefixes boosted after scoring
    pub prioritize: Vec<String>,
    /// Path prefixes demoted after scoring
    pub deprioritize: Vec<String>,
}

impl Default for ImportanceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            weights: FactorWeights::default(),
            prioritize: Vec::new(),
            deprioritize: Vec::new(),
        }
    }
}

impl ImportanceSettings {
    /// Directives in declaration order, prioritize entries first
    pub fn directives(&self) -> Vec<PathDirective> {
        self.prioritize
            .iter()
            .map(PathDirective::prioritize)
            .chain(self.deprioritize.iter().map(PathDirective::deprioritize))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub format: OutputFormat,
}

/// Serialization used for config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    #[default]
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Json => "json",
        }
    }

    /// Format implied by a file extension
    pub fn from_path(path: &Path) -> Result<Self, ConfigurationError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        ext.parse()
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ConfigFormat {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            _ => Err(ConfigurationError::UnknownName { kind: "config format", value: s.to_owned() }),
        }
    }
}

impl Config {
    /// Load defaults, the repository config file and the environment
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self, ConfigurationError> {
        Self::load_with_env(root, explicit, Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn load_with_env(
        root: &Path,
        explicit: Option<&Path>,
        env: Env,
    ) -> Result<Self, ConfigurationError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let file = match explicit {
            Some(path) if !path.is_file() => {
                return Err(ConfigurationError::Load(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(root),
        };
        if let Some(path) = &file {
            log::debug!("loading config from {}", path.display());
            figment = match ConfigFormat::from_path(path)? {
                ConfigFormat::Yaml => figment.merge(Yaml::file(path)),
                ConfigFormat::Toml => figment.merge(Toml::file(path)),
                ConfigFormat::Json => figment.merge(Json::file(path)),
            };
        }

        figment.merge(env).extract().map_err(|e| ConfigurationError::Load(e.to_string()))
    }

    /// First config file present in `root`
    pub fn discover(root: &Path) -> Option<PathBuf> {
        CONFIG_FILES.iter().map(|name| root.join(name)).find(|path| path.is_file())
    }

    /// Defaults rendered for `contextfit init`
    pub fn generate_default(format: ConfigFormat) -> Result<String, ConfigurationError> {
        let config = Self::default();
        let rendered = match format {
            ConfigFormat::Yaml => serde_yaml::to_string(&config).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::to_string_pretty(&config).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::to_string_pretty(&config).map_err(|e| e.to_string()),
        };
        rendered.map_err(ConfigurationError::Load)
    }

    pub fn token_model(&self) -> Result<TokenModel, ConfigurationError> {
        self.model.parse()
    }

    /// Convert to validated optimizer options
    pub fn optimizer_options(&self) -> Result<OptimizerOptions, ConfigurationError> {
        let options = OptimizerOptions::default()
            .with_budget(self.budget.spec()?)
            .with_model(self.token_model()?)
            .with_summarization(self.summarization)
            .with_importance(self.importance.enabled)
            .with_weights(self.importance.weights)
            .with_directives(self.importance.directives())
            .with_summary_reserve(self.budget.reserve);
        options.validate()?;

        #[cfg(feature = "llm")]
        let options = if self.summarization.use_llm {
            match crate::llm::from_settings(&self.llm) {
                Ok(refiner) => options.with_refiner(refiner),
                Err(e) => {
                    log::warn!("LLM refinement unavailable: {}", e);
                    options
                }
            }
        } else {
            options
        };

        Ok(options)
    }
}
