//! Error taxonomy for the context engine
//!
//! Configuration mistakes are surfaced to the caller before any work begins.
//! Capacity, parse and provider failures only ever affect a single file and
//! are absorbed by the optimizer with a fallback.

use thiserror::Error;

/// Caller mistakes detected before a run starts
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Unknown model identifier: {0}")]
    UnknownModel(String),

    #[error("Compression ratio must be in (0, 1], got {0}")]
    InvalidRatio(f64),

    #[error("Token capacity must be positive, got {0}")]
    InvalidCapacity(i64),

    #[error("Invalid importance weights: {0}")]
    InvalidWeights(String),

    #[error("Duplicate file path in input: {0}")]
    DuplicatePath(String),

    #[error("Unknown {kind}: {value}")]
    UnknownName { kind: &'static str, value: String },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Budget bookkeeping failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapacityError {
    #[error("Allocation of {requested} tokens to '{category}' exceeds the {available} unallocated tokens")]
    OverAllocated { category: String, requested: u64, available: u64 },

    #[error("Consuming {requested} tokens exceeds the {remaining} remaining")]
    Exceeded { requested: u64, remaining: u64 },
}

/// Top-level engine error
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error(transparent)]
    Parser(#[from] crate::parser::ParserError),

    #[error(transparent)]
    Strategy(#[from] crate::summarize::StrategyError),

    #[error(transparent)]
    Provider(#[from] crate::llm::ProviderError),
}

/// Result alias used across the engine
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_error_message() {
        let err = CapacityError::Exceeded { requested: 50, remaining: 20 };
        assert_eq!(err.to_string(), "Consuming 50 tokens exceeds the 20 remaining");
    }

    #[test]
    fn test_configuration_converts() {
        let err: Error = ConfigurationError::InvalidRatio(1.5).into();
        assert!(matches!(err, Error::Configuration(ConfigurationError::InvalidRatio(_))));
        assert!(err.to_string().contains("1.5"));
    }
}
