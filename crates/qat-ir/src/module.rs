//! The module: arena owner of every function, block, instruction and global.

use rustc_hash::FxHashMap;

use crate::error::{IrError, IrResult};
use crate::function::{BasicBlock, Function, Global};
use crate::instruction::{Instruction, InstructionKind};
use crate::types::{FunctionType, Type};
use crate::value::{BlockId, Constant, FuncId, GlobalId, InstrId, Value};

/// Something that refers to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum User {
    /// An instruction operand (directly or through a constant expression).
    Instruction(InstrId),
    /// A global initializer.
    Global(GlobalId),
}

/// A program: functions, globals and named types.
///
/// All nodes live in arenas owned by the module and are addressed through
/// copyable handles. Erasing a node leaves a tombstone behind so that stale
/// handles can be detected instead of aliasing a new node.
#[derive(Debug, Clone, Default)]
pub struct Module {
    name: String,
    source_filename: Option<String>,
    data_layout: Option<String>,
    target_triple: Option<String>,
    named_types: Vec<(String, Option<Type>)>,
    functions: Vec<Function>,
    blocks: Vec<BasicBlock>,
    instructions: Vec<Instruction>,
    globals: Vec<Global>,
    function_index: FxHashMap<String, FuncId>,
    global_index: FxHashMap<String, GlobalId>,
}

#[allow(clippy::cast_possible_truncation)]
impl Module {
    /// Create an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Module identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `source_filename` of the module.
    pub fn source_filename(&self) -> Option<&str> {
        self.source_filename.as_deref()
    }

    /// Set the `source_filename`.
    pub fn set_source_filename(&mut self, filename: Option<String>) {
        self.source_filename = filename;
    }

    /// `target datalayout` string.
    pub fn data_layout(&self) -> Option<&str> {
        self.data_layout.as_deref()
    }

    /// Set the `target datalayout` string.
    pub fn set_data_layout(&mut self, layout: Option<String>) {
        self.data_layout = layout;
    }

    /// `target triple` string.
    pub fn target_triple(&self) -> Option<&str> {
        self.target_triple.as_deref()
    }

    /// Set the `target triple` string.
    pub fn set_target_triple(&mut self, triple: Option<String>) {
        self.target_triple = triple;
    }

    // ------------------------------------------------------------------
    // Named types
    // ------------------------------------------------------------------

    /// Declare a named type. `None` declares an opaque type.
    pub fn add_named_type(&mut self, name: impl Into<String>, body: Option<Type>) {
        let name = name.into();
        if let Some(entry) = self.named_types.iter_mut().find(|(n, _)| *n == name) {
            if body.is_some() {
                entry.1 = body;
            }
            return;
        }
        self.named_types.push((name, body));
    }

    /// Named types in declaration order.
    pub fn named_types(&self) -> &[(String, Option<Type>)] {
        &self.named_types
    }

    /// Body of a named type, `None` if opaque or unknown.
    pub fn named_type_body(&self, name: &str) -> Option<&Type> {
        self.named_types
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, body)| body.as_ref())
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    /// Add a function declaration with unnamed parameters.
    pub fn add_function(&mut self, name: impl Into<String>, signature: FunctionType) -> IrResult<FuncId> {
        self.add_function_with_params(name, signature, Vec::new())
    }

    /// Add a function declaration with the given parameter names.
    pub fn add_function_with_params(
        &mut self,
        name: impl Into<String>,
        signature: FunctionType,
        param_names: Vec<Option<String>>,
    ) -> IrResult<FuncId> {
        let name = name.into();
        if self.function_index.contains_key(&name) || self.global_index.contains_key(&name) {
            return Err(IrError::DuplicateSymbol(name));
        }
        let id = FuncId(self.functions.len() as u32);
        self.function_index.insert(name.clone(), id);
        self.functions.push(Function::new(name, signature, param_names));
        Ok(id)
    }

    /// Look up a function by name, declaring it if it does not exist.
    pub fn get_or_insert_function(&mut self, name: &str, signature: FunctionType) -> FuncId {
        if let Some(id) = self.get_function(name) {
            return id;
        }
        let id = FuncId(self.functions.len() as u32);
        self.function_index.insert(name.to_string(), id);
        self.functions
            .push(Function::new(name.to_string(), signature, Vec::new()));
        id
    }

    /// Look up a live function by name.
    pub fn get_function(&self, name: &str) -> Option<FuncId> {
        self.function_index.get(name).copied()
    }

    /// Access a function.
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    /// Mutable access to a function.
    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    /// Live functions in creation order.
    pub fn functions(&self) -> impl Iterator<Item = FuncId> + '_ {
        self.functions
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.erased)
            .map(|(i, _)| FuncId(i as u32))
    }

    /// Number of live functions.
    pub fn num_functions(&self) -> usize {
        self.functions.iter().filter(|f| !f.erased).count()
    }

    /// Live functions carrying the given attribute.
    pub fn functions_with_attribute(&self, key: &str) -> Vec<FuncId> {
        self.functions()
            .filter(|&f| self.function(f).has_attribute(key))
            .collect()
    }

    /// A function name derived from `base` that is not yet taken.
    pub fn unique_function_name(&self, base: &str) -> String {
        if !self.function_index.contains_key(base) && !self.global_index.contains_key(base) {
            return base.to_string();
        }
        let mut n = 1_usize;
        loop {
            let candidate = format!("{base}.{n}");
            if !self.function_index.contains_key(&candidate)
                && !self.global_index.contains_key(&candidate)
            {
                return candidate;
            }
            n += 1;
        }
    }

    /// All live instructions of a function in block order.
    pub fn function_instructions(&self, id: FuncId) -> Vec<InstrId> {
        self.function(id)
            .blocks
            .iter()
            .flat_map(|&b| self.block(b).instructions.iter().copied())
            .collect()
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Append a new empty block to a function.
    pub fn append_block(&mut self, function: FuncId, name: Option<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock {
            name,
            parent: Some(function),
            instructions: Vec::new(),
            erased: false,
        });
        self.functions[function.index()].blocks.push(id);
        id
    }

    /// Access a block.
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// Rename a block.
    pub fn set_block_name(&mut self, id: BlockId, name: Option<String>) {
        self.blocks[id.index()].name = name;
    }

    // ------------------------------------------------------------------
    // Instructions
    // ------------------------------------------------------------------

    /// Create a detached instruction.
    pub fn create_instruction(&mut self, kind: InstructionKind, ty: Type, operands: Vec<Value>) -> InstrId {
        let id = InstrId(self.instructions.len() as u32);
        self.instructions.push(Instruction::new(kind, ty, operands));
        id
    }

    /// Access an instruction.
    pub fn instruction(&self, id: InstrId) -> &Instruction {
        &self.instructions[id.index()]
    }

    /// Set or clear the result name of an instruction.
    pub fn set_instruction_name(&mut self, id: InstrId, name: Option<String>) {
        self.instructions[id.index()].name = name;
    }

    /// Overwrite a single operand.
    pub fn set_operand(&mut self, id: InstrId, index: usize, value: Value) -> IrResult<()> {
        let inst = self.live_instruction_mut(id)?;
        let slot = inst
            .operands
            .get_mut(index)
            .ok_or(IrError::InvalidOperand {
                instruction: id,
                index,
            })?;
        *slot = value;
        Ok(())
    }

    /// Replace the operation of an instruction, keeping its operands.
    pub fn set_instruction_kind(&mut self, id: InstrId, kind: InstructionKind) -> IrResult<()> {
        self.live_instruction_mut(id)?.kind = kind;
        Ok(())
    }

    /// Replace the whole operand list of an instruction.
    pub fn set_operands(&mut self, id: InstrId, operands: Vec<Value>) -> IrResult<()> {
        self.live_instruction_mut(id)?.operands = operands;
        Ok(())
    }

    /// Attach a detached instruction at the end of a block.
    pub fn append_instruction(&mut self, block: BlockId, id: InstrId) -> IrResult<()> {
        self.check_detached(id)?;
        if self.blocks[block.index()].erased {
            return Err(IrError::ErasedBlock(block));
        }
        self.blocks[block.index()].instructions.push(id);
        self.instructions[id.index()].parent = Some(block);
        Ok(())
    }

    /// Attach a detached instruction immediately before `anchor`.
    pub fn insert_before(&mut self, anchor: InstrId, id: InstrId) -> IrResult<()> {
        self.insert_relative(anchor, id, 0)
    }

    /// Attach a detached instruction immediately after `anchor`.
    pub fn insert_after(&mut self, anchor: InstrId, id: InstrId) -> IrResult<()> {
        self.insert_relative(anchor, id, 1)
    }

    fn insert_relative(&mut self, anchor: InstrId, id: InstrId, offset: usize) -> IrResult<()> {
        self.check_detached(id)?;
        let (block, position) = self.position_of(anchor)?;
        self.blocks[block.index()]
            .instructions
            .insert(position + offset, id);
        self.instructions[id.index()].parent = Some(block);
        Ok(())
    }

    /// Block and index of an attached instruction.
    pub fn position_of(&self, id: InstrId) -> IrResult<(BlockId, usize)> {
        let inst = self.live_instruction(id)?;
        let block = inst.parent.ok_or(IrError::DetachedInstruction(id))?;
        let position = self.blocks[block.index()]
            .instructions
            .iter()
            .position(|&i| i == id)
            .ok_or(IrError::DetachedInstruction(id))?;
        Ok((block, position))
    }

    /// The function containing an attached instruction.
    pub fn instruction_function(&self, id: InstrId) -> Option<FuncId> {
        let block = self.instructions[id.index()].parent?;
        self.blocks[block.index()].parent
    }

    /// Remove an instruction from its block (if attached) and erase it.
    ///
    /// Remaining uses are not touched; callers replace them first.
    pub fn erase_instruction(&mut self, id: InstrId) -> IrResult<()> {
        let inst = self.live_instruction(id)?;
        if let Some(block) = inst.parent {
            self.blocks[block.index()].instructions.retain(|&i| i != id);
        }
        let inst = &mut self.instructions[id.index()];
        inst.parent = None;
        inst.erased = true;
        inst.name = None;
        Ok(())
    }

    /// Move the name of `from` onto `to`, leaving `from` unnamed.
    pub fn take_name(&mut self, from: InstrId, to: InstrId) {
        let name = self.instructions[from.index()].name.take();
        self.instructions[to.index()].name = name;
    }

    /// Put the detached instruction `new` in the place of `old`: it takes
    /// over the position, the name and every use of `old`, which is erased.
    pub fn replace_instruction_with(&mut self, old: InstrId, new: InstrId) -> IrResult<()> {
        self.insert_before(old, new)?;
        self.take_name(old, new);
        self.replace_all_uses_with(&Value::Instruction(old), &Value::Instruction(new));
        self.erase_instruction(old)
    }

    fn live_instruction(&self, id: InstrId) -> IrResult<&Instruction> {
        let inst = &self.instructions[id.index()];
        if inst.erased {
            return Err(IrError::ErasedInstruction(id));
        }
        Ok(inst)
    }

    fn live_instruction_mut(&mut self, id: InstrId) -> IrResult<&mut Instruction> {
        let inst = &mut self.instructions[id.index()];
        if inst.erased {
            return Err(IrError::ErasedInstruction(id));
        }
        Ok(inst)
    }

    fn check_detached(&self, id: InstrId) -> IrResult<()> {
        let inst = self.live_instruction(id)?;
        if inst.parent.is_some() {
            return Err(IrError::AlreadyAttached(id));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    /// Add a global variable.
    pub fn add_global(&mut self, global: Global) -> IrResult<GlobalId> {
        if self.global_index.contains_key(&global.name) || self.function_index.contains_key(&global.name)
        {
            return Err(IrError::DuplicateSymbol(global.name));
        }
        let id = GlobalId(self.globals.len() as u32);
        self.global_index.insert(global.name.clone(), id);
        self.globals.push(global);
        Ok(id)
    }

    /// Access a global.
    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.index()]
    }

    /// Replace the initializer of a global.
    pub fn set_global_initializer(&mut self, id: GlobalId, initializer: Option<Value>) {
        self.globals[id.index()].initializer = initializer;
    }

    /// Look up a live global by name.
    pub fn get_global(&self, name: &str) -> Option<GlobalId> {
        self.global_index.get(name).copied()
    }

    /// Live globals in creation order.
    pub fn globals(&self) -> impl Iterator<Item = GlobalId> + '_ {
        self.globals
            .iter()
            .enumerate()
            .filter(|(_, g)| !g.erased)
            .map(|(i, _)| GlobalId(i as u32))
    }

    // ------------------------------------------------------------------
    // Uses
    // ------------------------------------------------------------------

    /// Replace every use of `old` by `new` in all live instructions (attached
    /// or not) and global initializers. Returns the number of users changed.
    pub fn replace_all_uses_with(&mut self, old: &Value, new: &Value) -> usize {
        let mut changed = 0;
        for inst in self.instructions.iter_mut().filter(|i| !i.erased) {
            let mut touched = false;
            for operand in &mut inst.operands {
                touched |= operand.replace_nested(old, new);
            }
            if touched {
                changed += 1;
            }
        }
        for global in self.globals.iter_mut().filter(|g| !g.erased) {
            if let Some(init) = &mut global.initializer {
                if init.replace_nested(old, new) {
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Attached instructions and globals that reference `value`.
    pub fn users_of(&self, value: &Value) -> Vec<User> {
        let mut users: Vec<User> = self
            .instructions
            .iter()
            .enumerate()
            .filter(|(_, inst)| !inst.erased && inst.parent.is_some())
            .filter(|(_, inst)| inst.operands.iter().any(|op| op.references(value)))
            .map(|(i, _)| User::Instruction(InstrId(i as u32)))
            .collect();
        users.extend(
            self.globals
                .iter()
                .enumerate()
                .filter(|(_, g)| !g.erased)
                .filter(|(_, g)| g.initializer.as_ref().is_some_and(|init| init.references(value)))
                .map(|(i, _)| User::Global(GlobalId(i as u32))),
        );
        users
    }

    /// Check whether any attached instruction or global references `value`.
    pub fn has_uses(&self, value: &Value) -> bool {
        !self.users_of(value).is_empty()
    }

    // ------------------------------------------------------------------
    // Erasure
    // ------------------------------------------------------------------

    /// Erase a block and every instruction it still contains.
    pub fn erase_block(&mut self, id: BlockId) -> IrResult<()> {
        if self.blocks[id.index()].erased {
            return Err(IrError::ErasedBlock(id));
        }
        let instructions = std::mem::take(&mut self.blocks[id.index()].instructions);
        for inst in instructions {
            let inst = &mut self.instructions[inst.index()];
            inst.parent = None;
            inst.erased = true;
        }
        if let Some(function) = self.blocks[id.index()].parent.take() {
            self.functions[function.index()].blocks.retain(|&b| b != id);
        }
        self.blocks[id.index()].erased = true;
        Ok(())
    }

    /// Erase a function together with its body.
    pub fn erase_function(&mut self, id: FuncId) -> IrResult<()> {
        if self.functions[id.index()].erased {
            return Err(IrError::ErasedFunction(id));
        }
        let blocks = self.functions[id.index()].blocks.clone();
        for block in blocks {
            self.erase_block(block)?;
        }
        let function = &mut self.functions[id.index()];
        function.erased = true;
        let name = function.name.clone();
        if self.function_index.get(&name) == Some(&id) {
            self.function_index.remove(&name);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Cloning
    // ------------------------------------------------------------------

    /// Clone `source` with some of its arguments replaced by constants.
    ///
    /// The clone drops the substituted parameters from its signature, gets a
    /// fresh name derived from the original, and keeps the attributes of the
    /// source. Calls inside the body keep pointing at their original callees.
    pub fn clone_function_with_constants(
        &mut self,
        source: FuncId,
        constants: &[(usize, Value)],
    ) -> IrResult<FuncId> {
        let original = self.functions[source.index()].clone();
        if original.erased {
            return Err(IrError::ErasedFunction(source));
        }
        let substituted: FxHashMap<usize, &Value> =
            constants.iter().map(|(i, v)| (*i, v)).collect();
        if let Some(&index) = substituted.keys().find(|&&i| i >= original.params.len()) {
            return Err(IrError::InvalidArgument {
                function: original.name,
                index,
            });
        }

        let kept: Vec<_> = original
            .params
            .iter()
            .enumerate()
            .filter(|(i, _)| !substituted.contains_key(i))
            .map(|(_, p)| p.clone())
            .collect();
        let signature = FunctionType {
            ret: original.ret.clone(),
            params: kept.iter().map(|p| p.ty.clone()).collect(),
            var_arg: original.var_arg,
        };
        let name = self.unique_function_name(&original.name);
        let clone = self.add_function_with_params(
            name,
            signature,
            kept.into_iter().map(|p| p.name).collect(),
        )?;
        {
            let f = &mut self.functions[clone.index()];
            f.linkage.clone_from(&original.linkage);
            f.unnamed_addr.clone_from(&original.unnamed_addr);
            f.attributes.clone_from(&original.attributes);
        }

        let mut value_map: FxHashMap<Value, Value> = FxHashMap::default();
        let mut next_param = 0_u32;
        for index in 0..original.params.len() {
            let old = Value::Argument {
                function: source,
                index: index as u32,
            };
            let new = if let Some(constant) = substituted.get(&index) {
                (*constant).clone()
            } else {
                let v = Value::Argument {
                    function: clone,
                    index: next_param,
                };
                next_param += 1;
                v
            };
            value_map.insert(old, new);
        }

        let mut block_map: FxHashMap<BlockId, BlockId> = FxHashMap::default();
        for &block in &original.blocks {
            let name = self.blocks[block.index()].name.clone();
            let new_block = self.append_block(clone, name);
            block_map.insert(block, new_block);
            value_map.insert(Value::Block(block), Value::Block(new_block));
        }

        let mut cloned = Vec::new();
        for &block in &original.blocks {
            let Some(&target) = block_map.get(&block) else {
                continue;
            };
            for inst in self.blocks[block.index()].instructions.clone() {
                let mut copy = self.instructions[inst.index()].clone();
                copy.parent = None;
                let new_inst = InstrId(self.instructions.len() as u32);
                self.instructions.push(copy);
                self.append_instruction(target, new_inst)?;
                value_map.insert(Value::Instruction(inst), Value::Instruction(new_inst));
                cloned.push(new_inst);
            }
        }

        for inst in cloned {
            let inst = &mut self.instructions[inst.index()];
            for operand in &mut inst.operands {
                if let Some(mapped) = value_map.get(operand) {
                    *operand = mapped.clone();
                }
            }
            if let InstructionKind::Phi { blocks } = &mut inst.kind {
                for block in blocks {
                    if let Some(&mapped) = block_map.get(block) {
                        *block = mapped;
                    }
                }
            }
        }

        Ok(clone)
    }

    // ------------------------------------------------------------------
    // Types and names
    // ------------------------------------------------------------------

    /// Type of a value.
    pub fn value_type(&self, value: &Value) -> Type {
        match value {
            Value::Instruction(id) => self.instruction(*id).ty.clone(),
            Value::Argument { function, index } => self
                .function(*function)
                .params
                .get(*index as usize)
                .map_or(Type::Void, |p| p.ty.clone()),
            Value::Block(_) => Type::Label,
            Value::Function(id) => Type::Function(Box::new(self.function(*id).signature())).ptr(),
            Value::Global(id) => self.global(*id).ty.clone().ptr(),
            Value::Constant(c) => c.ty(),
        }
    }

    /// Result type of a `getelementptr` over `source` with `indices`.
    pub fn gep_result_type(&self, source: &Type, indices: &[Value]) -> Type {
        let mut current = source.clone();
        for index in indices.iter().skip(1) {
            let field = |fields: &[Type]| {
                index
                    .as_const_int()
                    .and_then(|i| usize::try_from(i).ok())
                    .and_then(|i| fields.get(i).cloned())
            };
            let next = match &current {
                Type::Array(_, elem) => Some(elem.as_ref().clone()),
                Type::Struct(fields) => field(fields.as_slice()),
                Type::Named(name) => match self.named_type_body(name) {
                    Some(Type::Struct(fields)) => field(fields.as_slice()),
                    _ => None,
                },
                _ => None,
            };
            match next {
                Some(ty) => current = ty,
                None => break,
            }
        }
        current.ptr()
    }

    /// A short human-readable label for log messages.
    pub fn value_label(&self, value: &Value) -> String {
        match value {
            Value::Instruction(id) => match self.instruction(*id).name() {
                Some(name) => format!("%{name}"),
                None => format!("<{} {id}>", self.instruction(*id).opcode_name()),
            },
            Value::Argument { function, index } => {
                match self
                    .function(*function)
                    .params
                    .get(*index as usize)
                    .and_then(|p| p.name.as_deref())
                {
                    Some(name) => format!("%{name}"),
                    None => format!("<arg {index}>"),
                }
            }
            Value::Block(id) => match self.block(*id).name() {
                Some(name) => format!("%{name}"),
                None => format!("<{id}>"),
            },
            Value::Function(id) => format!("@{}", self.function(*id).name()),
            Value::Global(id) => format!("@{}", self.global(*id).name()),
            Value::Constant(Constant::Int { ty, value }) => format!("{ty} {value}"),
            Value::Constant(c) => format!("<constant {}>", c.ty()),
        }
    }
}
