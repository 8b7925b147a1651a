//! Error types for the textual IR reader.

use thiserror::Error;

/// Errors that can occur during parsing.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Lexer error (invalid token).
    #[error("Lexer error at line {line}: {message}")]
    LexerError { line: usize, message: String },

    /// Unexpected token.
    #[error("Unexpected token at line {line}: expected {expected}, found {found}")]
    UnexpectedToken {
        line: usize,
        expected: String,
        found: String,
    },

    /// Unexpected end of input.
    #[error("Unexpected end of input: {0}")]
    UnexpectedEof(String),

    /// Reference to an undefined local or global symbol.
    #[error("Undefined symbol '{name}' in {scope}")]
    UndefinedSymbol { name: String, scope: String },

    /// A symbol was defined twice.
    #[error("Duplicate definition of '{0}'")]
    DuplicateDefinition(String),

    /// Unknown instruction mnemonic.
    #[error("Unknown instruction '{opcode}' at line {line}")]
    UnknownInstruction { opcode: String, line: usize },

    /// Integer literal does not fit the supported range.
    #[error("Integer literal out of range at line {line}: {literal}")]
    IntegerOutOfRange { line: usize, literal: String },

    /// IR error during module construction.
    #[error("Module error: {0}")]
    Module(#[from] qat_ir::IrError),

    /// Generic parse error.
    #[error("Parse error: {0}")]
    Generic(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;
