//! CLI command implementations.

pub mod common;
pub mod configuration;
pub mod generate;
pub mod parameters;

pub use configuration::QatConfiguration;
