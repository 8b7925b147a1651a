//! Error types for the compilation crate.

use qat_ir::{InstrId, IrError};
use thiserror::Error;

use crate::allocation::AllocationError;

/// Errors that can occur while building or running a profile.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// IR manipulation failed.
    #[error("IR error: {0}")]
    Ir(#[from] IrError),

    /// An allocation manager rejected a request.
    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),

    /// A pass failed.
    #[error("Pass '{name}' failed: {reason}")]
    PassFailed {
        /// Name of the failing pass.
        name: String,
        /// Reason for the failure.
        reason: String,
    },

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The execution path runs through an exception edge.
    #[error(
        "Exception paths cannot be handled at compile time in '{function}'. Either disable \
         transform-execution-path-only or enable assume-no-except"
    )]
    ExceptionPath {
        /// Function containing the `invoke`.
        function: String,
    },

    /// The module does not conform to the selected profile.
    #[error("QIR is not valid within the '{profile}' profile: {}", .violations.join("; "))]
    ValidationFailed {
        /// Profile validated against.
        profile: String,
        /// Human-readable violations.
        violations: Vec<String>,
    },

    /// The same instruction was scheduled for replacement twice.
    #[error("Instruction {0} was scheduled for replacement more than once")]
    ReplacementConflict(InstrId),

    /// Reading or writing a configuration or report failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding a configuration failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CompileError {
    fn from(err: serde_json::Error) -> Self {
        CompileError::Serialization(err.to_string())
    }
}

impl From<serde_yaml_ng::Error> for CompileError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        CompileError::Serialization(err.to_string())
    }
}

/// Result type for compilation operations.
pub type CompileResult<T> = Result<T, CompileError>;
