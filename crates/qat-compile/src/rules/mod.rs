//! Pattern-based replacement rules.
//!
//! - [`pattern`]: structural patterns with named captures
//! - [`notation`]: shorthand constructors for patterns and replacers
//! - [`rule`]: a pattern paired with a replacer, and replacement scheduling
//! - [`rule_set`]: ordered, first-match-wins rule collections
//! - [`factory`]: the canonical rule catalogue

pub mod factory;
pub mod notation;
pub mod pattern;
pub mod rule;
pub mod rule_set;

pub use factory::{FactoryConfiguration, RuleFactory};
pub use pattern::{Captures, Pattern, PatternKind, PatternPtr};
pub use rule::{ReplaceFn, Replacement, ReplacementRule, Replacements, apply_replacements};
pub use rule_set::{ReplacementRulePtr, RuleSet};
