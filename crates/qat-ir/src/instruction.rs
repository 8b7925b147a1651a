//! Instructions and their opcodes.
//!
//! Operand layouts follow LLVM so that structural patterns written against
//! textual IR line up with the operand lists stored here:
//!
//! | Instruction | Operands |
//! |-------------|----------|
//! | `call` | arguments..., callee |
//! | `invoke` | arguments..., normal dest, unwind dest, callee |
//! | `br` (conditional) | condition, false dest, true dest |
//! | `br` (unconditional) | dest |
//! | `switch` | condition, default dest, (case value, case dest)... |
//! | `store` | value, pointer |
//! | `select` | condition, true value, false value |
//! | `phi` | incoming values (blocks are kept on the instruction kind) |

use std::fmt;

use crate::types::Type;
use crate::value::{BlockId, FuncId, Value};

/// Integer binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl BinaryOp {
    /// Opcode mnemonic.
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::UDiv => "udiv",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::URem => "urem",
            BinaryOp::SRem => "srem",
            BinaryOp::Shl => "shl",
            BinaryOp::LShr => "lshr",
            BinaryOp::AShr => "ashr",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
        }
    }

    /// Look up an operator by mnemonic.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "add" => BinaryOp::Add,
            "sub" => BinaryOp::Sub,
            "mul" => BinaryOp::Mul,
            "udiv" => BinaryOp::UDiv,
            "sdiv" => BinaryOp::SDiv,
            "urem" => BinaryOp::URem,
            "srem" => BinaryOp::SRem,
            "shl" => BinaryOp::Shl,
            "lshr" => BinaryOp::LShr,
            "ashr" => BinaryOp::AShr,
            "and" => BinaryOp::And,
            "or" => BinaryOp::Or,
            "xor" => BinaryOp::Xor,
            "fadd" => BinaryOp::FAdd,
            "fsub" => BinaryOp::FSub,
            "fmul" => BinaryOp::FMul,
            "fdiv" => BinaryOp::FDiv,
            _ => return None,
        })
    }
}

/// Integer comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntPredicate {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

impl IntPredicate {
    /// Predicate mnemonic.
    pub fn name(self) -> &'static str {
        match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Ugt => "ugt",
            IntPredicate::Uge => "uge",
            IntPredicate::Ult => "ult",
            IntPredicate::Ule => "ule",
            IntPredicate::Sgt => "sgt",
            IntPredicate::Sge => "sge",
            IntPredicate::Slt => "slt",
            IntPredicate::Sle => "sle",
        }
    }

    /// Look up a predicate by mnemonic.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "eq" => IntPredicate::Eq,
            "ne" => IntPredicate::Ne,
            "ugt" => IntPredicate::Ugt,
            "uge" => IntPredicate::Uge,
            "ult" => IntPredicate::Ult,
            "ule" => IntPredicate::Ule,
            "sgt" => IntPredicate::Sgt,
            "sge" => IntPredicate::Sge,
            "slt" => IntPredicate::Slt,
            "sle" => IntPredicate::Sle,
            _ => return None,
        })
    }
}

/// Conversion operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    BitCast,
    IntToPtr,
    PtrToInt,
    SIToFP,
    UIToFP,
    FPToSI,
    FPToUI,
    FPExt,
    FPTrunc,
}

impl CastOp {
    /// Opcode mnemonic.
    pub fn name(self) -> &'static str {
        match self {
            CastOp::Trunc => "trunc",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::BitCast => "bitcast",
            CastOp::IntToPtr => "inttoptr",
            CastOp::PtrToInt => "ptrtoint",
            CastOp::SIToFP => "sitofp",
            CastOp::UIToFP => "uitofp",
            CastOp::FPToSI => "fptosi",
            CastOp::FPToUI => "fptoui",
            CastOp::FPExt => "fpext",
            CastOp::FPTrunc => "fptrunc",
        }
    }

    /// Look up a cast by mnemonic.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "trunc" => CastOp::Trunc,
            "zext" => CastOp::ZExt,
            "sext" => CastOp::SExt,
            "bitcast" => CastOp::BitCast,
            "inttoptr" => CastOp::IntToPtr,
            "ptrtoint" => CastOp::PtrToInt,
            "sitofp" => CastOp::SIToFP,
            "uitofp" => CastOp::UIToFP,
            "fptosi" => CastOp::FPToSI,
            "fptoui" => CastOp::FPToUI,
            "fpext" => CastOp::FPExt,
            "fptrunc" => CastOp::FPTrunc,
            _ => return None,
        })
    }
}

/// Tail call marker on a call instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TailMarker {
    #[default]
    None,
    Tail,
    MustTail,
    NoTail,
}

/// The operation an instruction performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    Ret,
    Br,
    Switch,
    Unreachable,
    Call { tail: TailMarker },
    Invoke,
    Binary(BinaryOp),
    ICmp(IntPredicate),
    Cast(CastOp),
    Load { align: Option<u32> },
    Store { align: Option<u32> },
    Alloca { allocated: Type, align: Option<u32> },
    GetElementPtr { source: Type, inbounds: bool },
    Select,
    Phi { blocks: Vec<BlockId> },
}

impl InstructionKind {
    /// Opcode name as it appears in textual IR.
    pub fn opcode_name(&self) -> &'static str {
        match self {
            InstructionKind::Ret => "ret",
            InstructionKind::Br => "br",
            InstructionKind::Switch => "switch",
            InstructionKind::Unreachable => "unreachable",
            InstructionKind::Call { .. } => "call",
            InstructionKind::Invoke => "invoke",
            InstructionKind::Binary(op) => op.name(),
            InstructionKind::ICmp(_) => "icmp",
            InstructionKind::Cast(op) => op.name(),
            InstructionKind::Load { .. } => "load",
            InstructionKind::Store { .. } => "store",
            InstructionKind::Alloca { .. } => "alloca",
            InstructionKind::GetElementPtr { .. } => "getelementptr",
            InstructionKind::Select => "select",
            InstructionKind::Phi { .. } => "phi",
        }
    }

    /// Check whether the instruction ends a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstructionKind::Ret
                | InstructionKind::Br
                | InstructionKind::Switch
                | InstructionKind::Unreachable
                | InstructionKind::Invoke
        )
    }

    /// Check whether removing an unused instance of this instruction could
    /// change program behaviour.
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            InstructionKind::Call { .. } | InstructionKind::Invoke | InstructionKind::Store { .. }
        ) || self.is_terminator()
    }
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode_name())
    }
}

/// An instruction stored in a module arena.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub(crate) kind: InstructionKind,
    pub(crate) ty: Type,
    pub(crate) operands: Vec<Value>,
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<BlockId>,
    pub(crate) erased: bool,
}

impl Instruction {
    pub(crate) fn new(kind: InstructionKind, ty: Type, operands: Vec<Value>) -> Self {
        Self {
            kind,
            ty,
            operands,
            name: None,
            parent: None,
            erased: false,
        }
    }

    /// The operation.
    pub fn kind(&self) -> &InstructionKind {
        &self.kind
    }

    /// Result type (`void` for instructions without a result).
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// All operands in LLVM order.
    pub fn operands(&self) -> &[Value] {
        &self.operands
    }

    /// A single operand.
    pub fn operand(&self, index: usize) -> Option<&Value> {
        self.operands.get(index)
    }

    /// Number of operands.
    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    /// The result name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The containing block, or `None` for a detached instruction.
    pub fn parent(&self) -> Option<BlockId> {
        self.parent
    }

    /// Check whether this instruction has been erased.
    pub fn is_erased(&self) -> bool {
        self.erased
    }

    /// Opcode name.
    pub fn opcode_name(&self) -> &'static str {
        self.kind.opcode_name()
    }

    /// Check whether this is a terminator.
    pub fn is_terminator(&self) -> bool {
        self.kind.is_terminator()
    }

    /// Check whether this is a call.
    pub fn is_call(&self) -> bool {
        matches!(self.kind, InstructionKind::Call { .. })
    }

    /// Check whether this is an invoke.
    pub fn is_invoke(&self) -> bool {
        matches!(self.kind, InstructionKind::Invoke)
    }

    /// The callee operand of a call or invoke.
    pub fn callee(&self) -> Option<&Value> {
        match self.kind {
            InstructionKind::Call { .. } | InstructionKind::Invoke => self.operands.last(),
            _ => None,
        }
    }

    /// The directly called function of a call or invoke.
    pub fn called_function(&self) -> Option<FuncId> {
        self.callee().and_then(Value::as_function)
    }

    /// Call arguments, excluding the callee and invoke destinations.
    pub fn call_arguments(&self) -> &[Value] {
        match self.kind {
            InstructionKind::Call { .. } => &self.operands[..self.operands.len().saturating_sub(1)],
            InstructionKind::Invoke => &self.operands[..self.operands.len().saturating_sub(3)],
            _ => &[],
        }
    }

    /// Normal and unwind destinations of an invoke.
    pub fn invoke_destinations(&self) -> Option<(BlockId, BlockId)> {
        if !self.is_invoke() || self.operands.len() < 3 {
            return None;
        }
        let n = self.operands.len();
        let normal = self.operands[n - 3].as_block()?;
        let unwind = self.operands[n - 2].as_block()?;
        Some((normal, unwind))
    }

    /// Blocks this terminator may transfer control to.
    pub fn successors(&self) -> Vec<BlockId> {
        match self.kind {
            InstructionKind::Br | InstructionKind::Switch => {
                self.operands.iter().filter_map(Value::as_block).collect()
            }
            InstructionKind::Invoke => self
                .invoke_destinations()
                .map(|(normal, unwind)| vec![normal, unwind])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Incoming blocks of a phi node.
    pub fn phi_blocks(&self) -> &[BlockId] {
        match &self.kind {
            InstructionKind::Phi { blocks } => blocks,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_names_round_trip() {
        for name in ["add", "sub", "xor", "lshr", "fmul"] {
            assert_eq!(BinaryOp::from_name(name).map(BinaryOp::name), Some(name));
        }
        for name in ["inttoptr", "bitcast", "zext"] {
            assert_eq!(CastOp::from_name(name).map(CastOp::name), Some(name));
        }
        assert_eq!(IntPredicate::from_name("sge"), Some(IntPredicate::Sge));
        assert_eq!(IntPredicate::from_name("oeq"), None);
    }

    #[test]
    fn test_call_operand_layout() {
        let args = vec![Value::i64(1), Value::i64(2)];
        let mut operands = args.clone();
        operands.push(Value::Function(FuncId(3)));
        let call = Instruction::new(
            InstructionKind::Call {
                tail: TailMarker::None,
            },
            Type::Void,
            operands,
        );

        assert_eq!(call.call_arguments(), args.as_slice());
        assert_eq!(call.called_function(), Some(FuncId(3)));
        assert!(!call.is_terminator());
    }

    #[test]
    fn test_branch_successors() {
        let br = Instruction::new(
            InstructionKind::Br,
            Type::Void,
            vec![Value::bool(true), Value::Block(BlockId(1)), Value::Block(BlockId(2))],
        );
        assert_eq!(br.successors(), vec![BlockId(1), BlockId(2)]);
        assert!(br.is_terminator());
    }
}
