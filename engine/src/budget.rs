//! Token budget bookkeeping
//!
//! A [`TokenBudget`] is a plain state object: a fixed capacity, named
//! sub-allocations that may never exceed it, and a consumed counter that is
//! only ever advanced by an atomic check-then-consume.

use crate::error::{CapacityError, ConfigurationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Well-known context window sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextWindow {
    #[serde(rename = "gpt-3.5")]
    Gpt35,
    #[serde(rename = "gpt-4")]
    Gpt4,
    #[serde(rename = "gpt-4-32k")]
    Gpt4_32k,
    #[serde(rename = "claude-2")]
    Claude2,
    #[serde(rename = "claude-3")]
    Claude3,
    #[serde(rename = "llama-2")]
    Llama2,
}

impl ContextWindow {
    pub const ALL: [ContextWindow; 6] =
        [Self::Gpt35, Self::Gpt4, Self::Gpt4_32k, Self::Claude2, Self::Claude3, Self::Llama2];

    /// Capacity in tokens
    pub fn tokens(&self) -> u64 {
        match self {
            Self::Gpt35 => 16_385,
            Self::Gpt4 => 128_000,
            Self::Gpt4_32k => 32_768,
            Self::Claude2 => 100_000,
            Self::Claude3 => 200_000,
            Self::Llama2 => 4_096,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gpt35 => "gpt-3.5",
            Self::Gpt4 => "gpt-4",
            Self::Gpt4_32k => "gpt-4-32k",
            Self::Claude2 => "claude-2",
            Self::Claude3 => "claude-3",
            Self::Llama2 => "llama-2",
        }
    }
}

impl fmt::Display for ContextWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContextWindow {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|w| w.name() == wanted)
            .ok_or_else(|| ConfigurationError::UnknownName {
                kind: "context window",
                value: s.to_owned(),
            })
    }
}

/// How a run's capacity is specified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetSpec {
    /// A named context window
    Preset(ContextWindow),
    /// An explicit token count; must be positive
    Explicit(i64),
}

impl Default for BudgetSpec {
    fn default() -> Self {
        Self::Preset(ContextWindow::Claude3)
    }
}

impl BudgetSpec {
    /// Resolve to a capacity, rejecting non-positive explicit values
    pub fn capacity(&self) -> Result<u64, ConfigurationError> {
        match *self {
            Self::Preset(window) => Ok(window.tokens()),
            Self::Explicit(tokens) if tokens > 0 => Ok(tokens as u64),
            Self::Explicit(tokens) => Err(ConfigurationError::InvalidCapacity(tokens)),
        }
    }
}

/// Token allowance with named allocations and a consumed counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBudget {
    total: u64,
    /// Insertion-ordered category allocations
    allocations: Vec<(String, u64)>,
    consumed: u64,
}

impl TokenBudget {
    /// Create a budget with a positive capacity
    pub fn new(total: i64) -> Result<Self, ConfigurationError> {
        if total <= 0 {
            return Err(ConfigurationError::InvalidCapacity(total));
        }
        Ok(Self { total: total as u64, allocations: Vec::new(), consumed: 0 })
    }

    /// Create a budget from a capacity specification
    pub fn from_spec(spec: BudgetSpec) -> Result<Self, ConfigurationError> {
        let total = spec.capacity()?;
        Ok(Self { total, allocations: Vec::new(), consumed: 0 })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Always `total - consumed`
    pub fn remaining(&self) -> u64 {
        self.total - self.consumed
    }

    /// Sum of all category allocations
    pub fn allocated(&self) -> u64 {
        self.allocations.iter().map(|(_, a)| a).sum()
    }

    /// Tokens allocated to one category
    pub fn allocation(&self, category: &str) -> u64 {
        self.allocations
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, a)| *a)
            .unwrap_or(0)
    }

    /// Add `amount` to a category. Fails without effect if the sum of all
    /// allocations would exceed capacity.
    pub fn allocate(&mut self, category: &str, amount: u64) -> Result<(), CapacityError> {
        let available = self.total - self.allocated();
        if amount > available {
            return Err(CapacityError::OverAllocated {
                category: category.to_owned(),
                requested: amount,
                available,
            });
        }
        match self.allocations.iter_mut().find(|(c, _)| c == category) {
            Some((_, existing)) => *existing += amount,
            None => self.allocations.push((category.to_owned(), amount)),
        }
        Ok(())
    }

    /// Consume tokens. Fails without effect if `amount > remaining`.
    pub fn consume(&mut self, amount: u64) -> Result<(), CapacityError> {
        let remaining = self.remaining();
        if amount > remaining {
            return Err(CapacityError::Exceeded { requested: amount, remaining });
        }
        self.consumed += amount;
        Ok(())
    }

    /// Whether `amount` could be consumed right now
    pub fn can_consume(&self, amount: u64) -> bool {
        amount <= self.remaining()
    }

    /// Each category's share of capacity, followed by the consumed share
    pub fn allocation_ratio(&self) -> Vec<(String, f64)> {
        let total = self.total as f64;
        self.allocations
            .iter()
            .map(|(c, a)| (c.clone(), *a as f64 / total))
            .chain(std::iter::once(("consumed".to_owned(), self.consumed as f64 / total)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_capacity() {
        assert_eq!(TokenBudget::new(0), Err(ConfigurationError::InvalidCapacity(0)));
        assert_eq!(TokenBudget::new(-5), Err(ConfigurationError::InvalidCapacity(-5)));
        assert!(BudgetSpec::Explicit(-1).capacity().is_err());
    }

    #[test]
    fn test_allocation_is_capped() {
        let mut budget = TokenBudget::new(100).unwrap();
        budget.allocate("files", 60).unwrap();
        budget.allocate("files", 20).unwrap();
        let err = budget.allocate("summary", 30).unwrap_err();
        assert_eq!(
            err,
            CapacityError::OverAllocated {
                category: "summary".to_owned(),
                requested: 30,
                available: 20
            }
        );
        assert_eq!(budget.allocation("files"), 80);
        assert_eq!(budget.allocation("summary"), 0);
    }

    #[test]
    fn test_consume_is_atomic() {
        let mut budget = TokenBudget::new(100).unwrap();
        budget.consume(70).unwrap();
        assert!(budget.consume(31).is_err());
        assert_eq!(budget.consumed(), 70);
        assert_eq!(budget.remaining(), 30);
        budget.consume(30).unwrap();
        assert_eq!(budget.remaining(), 0);
        assert!(budget.consume(1).is_err());
        budget.consume(0).unwrap();
    }

    #[test]
    fn test_allocation_ratio_includes_consumed() {
        let mut budget = TokenBudget::new(200).unwrap();
        budget.allocate("kept", 100).unwrap();
        budget.allocate("compressed", 50).unwrap();
        budget.consume(20).unwrap();
        let ratios = budget.allocation_ratio();
        assert_eq!(ratios.len(), 3);
        assert_eq!(ratios[0], ("kept".to_owned(), 0.5));
        assert_eq!(ratios[1], ("compressed".to_owned(), 0.25));
        assert_eq!(ratios[2], ("consumed".to_owned(), 0.1));
    }

    #[test]
    fn test_presets() {
        assert_eq!(ContextWindow::Llama2.tokens(), 4_096);
        assert_eq!("claude-3".parse::<ContextWindow>(), Ok(ContextWindow::Claude3));
        assert!("claude-9".parse::<ContextWindow>().is_err());
        let budget = TokenBudget::from_spec(BudgetSpec::Preset(ContextWindow::Gpt35)).unwrap();
        assert_eq!(budget.total(), 16_385);
    }
}
