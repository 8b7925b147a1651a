//! Error types for the IR crate.

use crate::value::{BlockId, FuncId, InstrId};
use thiserror::Error;

/// Errors that can occur in IR operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IrError {
    /// The instruction has already been erased from the module.
    #[error("Instruction {0} was already erased")]
    ErasedInstruction(InstrId),

    /// The block has already been erased from the module.
    #[error("Block {0} was already erased")]
    ErasedBlock(BlockId),

    /// The function has already been erased from the module.
    #[error("Function {0} was already erased")]
    ErasedFunction(FuncId),

    /// The instruction is not part of any block.
    #[error("Instruction {0} is not attached to a block")]
    DetachedInstruction(InstrId),

    /// The instruction is already part of a block.
    #[error("Instruction {0} is already attached to a block")]
    AlreadyAttached(InstrId),

    /// A symbol was defined twice.
    #[error("Duplicate symbol '{0}'")]
    DuplicateSymbol(String),

    /// A function could not be found by name.
    #[error("Function '{0}' not found")]
    FunctionNotFound(String),

    /// An operand index was out of range.
    #[error("Operand {index} out of range for instruction {instruction}")]
    InvalidOperand {
        /// The instruction being accessed.
        instruction: InstrId,
        /// The requested operand index.
        index: usize,
    },

    /// A function argument index was out of range.
    #[error("Argument {index} out of range for function '{function}'")]
    InvalidArgument {
        /// Name of the function.
        function: String,
        /// The requested argument index.
        index: usize,
    },

    /// The module failed structural verification.
    #[error("Module verification failed: {}", .0.join("; "))]
    Verification(Vec<String>),
}

/// Result type for IR operations.
pub type IrResult<T> = Result<T, IrError>;
