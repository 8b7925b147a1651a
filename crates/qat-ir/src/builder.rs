//! Instruction builder with an insertion point.

use crate::error::IrResult;
use crate::instruction::{BinaryOp, CastOp, InstructionKind, TailMarker};
use crate::module::Module;
use crate::types::Type;
use crate::value::{BlockId, FuncId, InstrId, Value};

/// Where newly built instructions are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPoint {
    /// Before the given instruction.
    Before(InstrId),
    /// After the given instruction. Advances past each inserted instruction
    /// so that a sequence of builds keeps its order.
    After(InstrId),
    /// At the end of the given block.
    End(BlockId),
    /// Instructions are created but not attached.
    Detached,
}

/// Creates instructions in a module at a movable insertion point.
pub struct Builder<'m> {
    module: &'m mut Module,
    point: InsertPoint,
}

impl<'m> Builder<'m> {
    /// Create a builder that produces detached instructions.
    pub fn new(module: &'m mut Module) -> Self {
        Self {
            module,
            point: InsertPoint::Detached,
        }
    }

    /// Create a builder positioned before an instruction.
    pub fn before(module: &'m mut Module, anchor: InstrId) -> Self {
        Self {
            module,
            point: InsertPoint::Before(anchor),
        }
    }

    /// The module being built.
    pub fn module(&self) -> &Module {
        self.module
    }

    /// Mutable access to the module being built.
    pub fn module_mut(&mut self) -> &mut Module {
        self.module
    }

    /// Current insertion point.
    pub fn insert_point(&self) -> InsertPoint {
        self.point
    }

    /// Position before an instruction.
    pub fn position_before(&mut self, anchor: InstrId) {
        self.point = InsertPoint::Before(anchor);
    }

    /// Position after an instruction.
    pub fn position_after(&mut self, anchor: InstrId) {
        self.point = InsertPoint::After(anchor);
    }

    /// Position at the end of a block.
    pub fn position_at_end(&mut self, block: BlockId) {
        self.point = InsertPoint::End(block);
    }

    /// Create an instruction and place it at the insertion point.
    pub fn insert(
        &mut self,
        kind: InstructionKind,
        ty: Type,
        operands: Vec<Value>,
        name: Option<String>,
    ) -> IrResult<InstrId> {
        let id = self.module.create_instruction(kind, ty, operands);
        self.module.set_instruction_name(id, name);
        match self.point {
            InsertPoint::Before(anchor) => self.module.insert_before(anchor, id)?,
            InsertPoint::After(anchor) => {
                self.module.insert_after(anchor, id)?;
                self.point = InsertPoint::After(id);
            }
            InsertPoint::End(block) => self.module.append_instruction(block, id)?,
            InsertPoint::Detached => {}
        }
        Ok(id)
    }

    /// Create an instruction without attaching it, regardless of the insertion point.
    pub fn create_detached(&mut self, kind: InstructionKind, ty: Type, operands: Vec<Value>) -> InstrId {
        self.module.create_instruction(kind, ty, operands)
    }

    /// Build a direct call.
    pub fn call(&mut self, callee: FuncId, args: Vec<Value>, name: Option<String>) -> IrResult<InstrId> {
        let ty = self.module.function(callee).return_type().clone();
        let name = if ty.is_void() { None } else { name };
        let mut operands = args;
        operands.push(Value::Function(callee));
        self.insert(
            InstructionKind::Call {
                tail: TailMarker::None,
            },
            ty,
            operands,
            name,
        )
    }

    /// Build a cast.
    pub fn cast(&mut self, op: CastOp, value: Value, to: Type, name: Option<String>) -> IrResult<InstrId> {
        self.insert(InstructionKind::Cast(op), to, vec![value], name)
    }

    /// Build a binary operation; the result has the type of the left operand.
    pub fn binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value, name: Option<String>) -> IrResult<InstrId> {
        let ty = self.module.value_type(&lhs);
        self.insert(InstructionKind::Binary(op), ty, vec![lhs, rhs], name)
    }

    /// Build a logical not, `xor v, true`.
    pub fn not(&mut self, value: Value, name: Option<String>) -> IrResult<InstrId> {
        let ty = self.module.value_type(&value);
        let bits = ty.int_width().unwrap_or(1);
        self.insert(
            InstructionKind::Binary(BinaryOp::Xor),
            ty,
            vec![value, Value::const_int(bits, -1)],
            name,
        )
    }

    /// Build an unconditional branch.
    pub fn br(&mut self, dest: BlockId) -> IrResult<InstrId> {
        self.insert(InstructionKind::Br, Type::Void, vec![Value::Block(dest)], None)
    }

    /// Build a conditional branch.
    pub fn cond_br(&mut self, cond: Value, if_true: BlockId, if_false: BlockId) -> IrResult<InstrId> {
        self.insert(
            InstructionKind::Br,
            Type::Void,
            vec![cond, Value::Block(if_false), Value::Block(if_true)],
            None,
        )
    }

    /// Build a return.
    pub fn ret(&mut self, value: Option<Value>) -> IrResult<InstrId> {
        self.insert(InstructionKind::Ret, Type::Void, value.into_iter().collect(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FunctionType;

    #[test]
    fn test_insert_after_keeps_order() {
        let mut module = Module::new("test");
        let f = module
            .add_function("main", FunctionType::new(Type::Void, vec![]))
            .unwrap();
        let entry = module.append_block(f, Some("entry".into()));

        let mut builder = Builder::new(&mut module);
        builder.position_at_end(entry);
        let first = builder.ret(None).unwrap();

        builder.position_before(first);
        let a = builder
            .binary(BinaryOp::Add, Value::i64(1), Value::i64(2), Some("a".into()))
            .unwrap();
        builder.position_after(a);
        let b = builder
            .binary(BinaryOp::Add, Value::Instruction(a), Value::i64(1), None)
            .unwrap();
        let c = builder.not(Value::bool(true), None).unwrap();

        assert_eq!(module.block(entry).instructions(), &[a, b, c, first]);
    }

    #[test]
    fn test_call_on_void_drops_name() {
        let mut module = Module::new("test");
        let callee = module
            .add_function("f", FunctionType::new(Type::Void, vec![]))
            .unwrap();
        let mut builder = Builder::new(&mut module);
        let call = builder.call(callee, vec![], Some("ignored".into())).unwrap();
        assert_eq!(module.instruction(call).name(), None);
        assert_eq!(module.instruction(call).called_function(), Some(callee));
        assert!(module.instruction(call).parent().is_none());
    }
}
