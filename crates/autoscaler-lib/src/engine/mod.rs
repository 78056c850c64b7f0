//! Scoring rules and decision fusion

mod decision;
pub mod rules;

pub use decision::DecisionEngine;
pub use rules::{RuleEngine, Weights, TARGET_CPU_MCORES, TARGET_MEMORY_MB, TARGET_NETWORK_MBPS};
