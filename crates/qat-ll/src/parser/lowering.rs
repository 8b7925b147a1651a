//! Lowering from the syntax tree to a [`Module`].
//!
//! Lowering runs in two passes per function: the first creates every block
//! and instruction so that forward references resolve, the second fills in
//! operands.

use rustc_hash::FxHashMap;

use qat_ir::{
    Attribute, BlockId, ConstExpr, Constant, FuncId, FunctionType, Global, InstrId, InstructionKind,
    Module, Type, Value,
};

use crate::ast::{
    ConstAst, FunctionAst, InstructionAst, ModuleAst, OpAst, Symbol, TypedValue, ValueAst,
};
use crate::error::{ParseError, ParseResult};

/// Lower a parsed module.
pub(crate) fn lower_to_module(ast: &ModuleAst) -> ParseResult<Module> {
    let mut lowerer = Lowerer::new(ast);
    lowerer.lower()?;
    Ok(lowerer.module)
}

/// Names visible inside one function body.
struct Scope {
    function: String,
    values: FxHashMap<String, Value>,
    blocks: FxHashMap<String, BlockId>,
}

struct Lowerer<'a> {
    ast: &'a ModuleAst,
    module: Module,
    globals: FxHashMap<String, Value>,
}

#[allow(clippy::cast_possible_truncation)]
impl<'a> Lowerer<'a> {
    fn new(ast: &'a ModuleAst) -> Self {
        let name = ast.source_filename.clone().unwrap_or_else(|| "module".into());
        Self {
            ast,
            module: Module::new(name),
            globals: FxHashMap::default(),
        }
    }

    fn lower(&mut self) -> ParseResult<()> {
        let ast = self.ast;
        self.module.set_source_filename(ast.source_filename.clone());
        self.module.set_data_layout(ast.data_layout.clone());
        self.module.set_target_triple(ast.target_triple.clone());

        for (name, body) in &ast.named_types {
            self.module.add_named_type(name.clone(), body.clone());
        }

        let mut global_ids = Vec::with_capacity(ast.globals.len());
        for global in &ast.globals {
            let name = global.name.key();
            let mut g = Global::new(name.clone(), global.ty.clone()).with_constant(global.constant);
            if let Some(linkage) = &global.linkage {
                g = g.with_linkage(linkage.clone());
            }
            if let Some(marker) = &global.unnamed_addr {
                g = g.with_unnamed_addr(marker.clone());
            }
            if let Some(align) = global.align {
                g = g.with_align(align);
            }
            let id = self
                .module
                .add_global(g)
                .map_err(|_| ParseError::DuplicateDefinition(format!("@{name}")))?;
            self.globals.insert(name, Value::Global(id));
            global_ids.push(id);
        }

        let groups: FxHashMap<u32, &Vec<Attribute>> =
            ast.attribute_groups.iter().map(|(id, attrs)| (*id, attrs)).collect();
        let mut function_ids = Vec::with_capacity(ast.functions.len());
        for function in &ast.functions {
            let id = self.declare_function(function, &groups)?;
            function_ids.push(id);
        }

        for (global, id) in ast.globals.iter().zip(global_ids) {
            if let Some(init) = &global.initializer {
                let value = self.lower_value(init, &global.ty, None)?;
                self.module.set_global_initializer(id, Some(value));
            }
        }

        for (function, id) in ast.functions.iter().zip(function_ids) {
            if !function.blocks.is_empty() {
                self.lower_body(id, function)?;
            }
        }
        Ok(())
    }

    fn declare_function(
        &mut self,
        function: &FunctionAst,
        groups: &FxHashMap<u32, &Vec<Attribute>>,
    ) -> ParseResult<FuncId> {
        let signature = FunctionType {
            ret: function.ret.clone(),
            params: function.params.iter().map(|(ty, _)| ty.clone()).collect(),
            var_arg: function.var_arg,
        };
        let names = function
            .params
            .iter()
            .map(|(_, symbol)| symbol.as_ref().and_then(Symbol::ir_name))
            .collect();
        let id = self
            .module
            .add_function_with_params(function.name.clone(), signature, names)
            .map_err(|_| ParseError::DuplicateDefinition(format!("@{}", function.name)))?;

        let f = self.module.function_mut(id);
        f.set_linkage(function.linkage.clone());
        f.set_unnamed_addr(function.unnamed_addr.clone());
        for attribute in &function.attributes {
            f.add_attribute(attribute.clone());
        }
        for group in &function.attribute_groups {
            let attrs = groups.get(group).ok_or_else(|| ParseError::UndefinedSymbol {
                name: format!("#{group}"),
                scope: format!("@{}", function.name),
            })?;
            for attribute in attrs.iter() {
                f.add_attribute(attribute.clone());
            }
        }

        self.globals.insert(function.name.clone(), Value::Function(id));
        Ok(id)
    }

    fn lower_body(&mut self, id: FuncId, function: &FunctionAst) -> ParseResult<()> {
        let mut scope = Scope {
            function: format!("@{}", function.name),
            values: FxHashMap::default(),
            blocks: FxHashMap::default(),
        };

        let mut next_slot = 0_u32;
        for (index, (_, symbol)) in function.params.iter().enumerate() {
            let argument = Value::Argument {
                function: id,
                index: index as u32,
            };
            let key = match symbol {
                Some(Symbol::Numbered(n)) => {
                    next_slot = n + 1;
                    n.to_string()
                }
                Some(Symbol::Named(name)) => name.clone(),
                None => {
                    next_slot += 1;
                    (next_slot - 1).to_string()
                }
            };
            scope.values.insert(key, argument);
        }

        let mut block_ids = Vec::with_capacity(function.blocks.len());
        for block in &function.blocks {
            let label = block.label.clone().unwrap_or(Symbol::Numbered(next_slot));
            let bb = self.module.append_block(id, label.ir_name());
            if scope.blocks.insert(label.key(), bb).is_some() {
                return Err(ParseError::DuplicateDefinition(format!("%{}", label.key())));
            }
            block_ids.push(bb);
        }

        let mut created: Vec<(InstrId, &InstructionAst)> = Vec::new();
        for (block, &bb) in function.blocks.iter().zip(&block_ids) {
            for instruction in &block.instructions {
                let (kind, ty) = self.kind_and_type(&instruction.op);
                let inst = self.module.create_instruction(kind, ty, Vec::new());
                self.module
                    .set_instruction_name(inst, instruction.result.as_ref().and_then(Symbol::ir_name));
                self.module.append_instruction(bb, inst)?;
                if let Some(result) = &instruction.result {
                    if scope
                        .values
                        .insert(result.key(), Value::Instruction(inst))
                        .is_some()
                    {
                        return Err(ParseError::DuplicateDefinition(format!("%{}", result.key())));
                    }
                }
                created.push((inst, instruction));
            }
        }

        for (inst, instruction) in created {
            let (operands, phi_blocks) = self.lower_operands(&instruction.op, &scope)?;
            self.module.set_operands(inst, operands)?;
            if let Some(blocks) = phi_blocks {
                self.module
                    .set_instruction_kind(inst, InstructionKind::Phi { blocks })?;
            }
        }
        Ok(())
    }

    /// Opcode and result type, known before operands are resolved.
    fn kind_and_type(&self, op: &OpAst) -> (InstructionKind, Type) {
        match op {
            OpAst::Ret(_) => (InstructionKind::Ret, Type::Void),
            OpAst::Br(_) | OpAst::CondBr { .. } => (InstructionKind::Br, Type::Void),
            OpAst::Switch { .. } => (InstructionKind::Switch, Type::Void),
            OpAst::Unreachable => (InstructionKind::Unreachable, Type::Void),
            OpAst::Call { tail, ret, .. } => (InstructionKind::Call { tail: *tail }, ret.clone()),
            OpAst::Invoke { ret, .. } => (InstructionKind::Invoke, ret.clone()),
            OpAst::Binary { op, ty, .. } => (InstructionKind::Binary(*op), ty.clone()),
            OpAst::ICmp { pred, .. } => (InstructionKind::ICmp(*pred), Type::bool()),
            OpAst::Cast { op, to, .. } => (InstructionKind::Cast(*op), to.clone()),
            OpAst::Load { ty, align, .. } => (InstructionKind::Load { align: *align }, ty.clone()),
            OpAst::Store { align, .. } => (InstructionKind::Store { align: *align }, Type::Void),
            OpAst::Alloca { ty, align } => (
                InstructionKind::Alloca {
                    allocated: ty.clone(),
                    align: *align,
                },
                ty.clone().ptr(),
            ),
            OpAst::GetElementPtr {
                inbounds,
                source,
                indices,
                ..
            } => {
                let ty = self.module.gep_result_type(source, &static_indices(indices));
                (
                    InstructionKind::GetElementPtr {
                        source: source.clone(),
                        inbounds: *inbounds,
                    },
                    ty,
                )
            }
            OpAst::Select { if_true, .. } => (InstructionKind::Select, if_true.ty.clone()),
            OpAst::Phi { ty, .. } => (InstructionKind::Phi { blocks: Vec::new() }, ty.clone()),
        }
    }

    fn lower_operands(
        &self,
        op: &OpAst,
        scope: &Scope,
    ) -> ParseResult<(Vec<Value>, Option<Vec<BlockId>>)> {
        let typed = |tv: &TypedValue| self.lower_value(&tv.value, &tv.ty, Some(scope));
        let block = |symbol: &Symbol| self.lookup_block(symbol, scope).map(Value::Block);

        let operands = match op {
            OpAst::Ret(None) | OpAst::Unreachable | OpAst::Alloca { .. } => Vec::new(),
            OpAst::Ret(Some(value)) => vec![typed(value)?],
            OpAst::Br(dest) => vec![block(dest)?],
            OpAst::CondBr {
                cond,
                if_true,
                if_false,
            } => vec![typed(cond)?, block(if_false)?, block(if_true)?],
            OpAst::Switch {
                cond,
                default,
                cases,
            } => {
                let mut operands = vec![typed(cond)?, block(default)?];
                for (value, dest) in cases {
                    operands.push(typed(value)?);
                    operands.push(block(dest)?);
                }
                operands
            }
            OpAst::Call { callee, args, .. } => {
                let mut operands = args.iter().map(typed).collect::<ParseResult<Vec<_>>>()?;
                operands.push(self.lower_value(callee, &Type::Void, Some(scope))?);
                operands
            }
            OpAst::Invoke {
                callee,
                args,
                normal,
                unwind,
                ..
            } => {
                let mut operands = args.iter().map(typed).collect::<ParseResult<Vec<_>>>()?;
                operands.push(block(normal)?);
                operands.push(block(unwind)?);
                operands.push(self.lower_value(callee, &Type::Void, Some(scope))?);
                operands
            }
            OpAst::Binary { ty, lhs, rhs, .. } | OpAst::ICmp { ty, lhs, rhs, .. } => vec![
                self.lower_value(lhs, ty, Some(scope))?,
                self.lower_value(rhs, ty, Some(scope))?,
            ],
            OpAst::Cast { value, .. } => vec![typed(value)?],
            OpAst::Load { ptr, .. } => vec![typed(ptr)?],
            OpAst::Store { value, ptr, .. } => vec![typed(value)?, typed(ptr)?],
            OpAst::GetElementPtr { base, indices, .. } => {
                let mut operands = vec![typed(base)?];
                for index in indices {
                    operands.push(typed(index)?);
                }
                operands
            }
            OpAst::Select {
                cond,
                if_true,
                if_false,
            } => vec![typed(cond)?, typed(if_true)?, typed(if_false)?],
            OpAst::Phi { ty, incoming } => {
                let mut values = Vec::with_capacity(incoming.len());
                let mut blocks = Vec::with_capacity(incoming.len());
                for (value, pred) in incoming {
                    values.push(self.lower_value(value, ty, Some(scope))?);
                    blocks.push(self.lookup_block(pred, scope)?);
                }
                return Ok((values, Some(blocks)));
            }
        };
        Ok((operands, None))
    }

    fn lookup_block(&self, symbol: &Symbol, scope: &Scope) -> ParseResult<BlockId> {
        scope
            .blocks
            .get(&symbol.key())
            .copied()
            .ok_or_else(|| ParseError::UndefinedSymbol {
                name: format!("%{}", symbol.key()),
                scope: scope.function.clone(),
            })
    }

    /// Resolve a value of the given type.
    fn lower_value(&self, value: &ValueAst, ty: &Type, scope: Option<&Scope>) -> ParseResult<Value> {
        match value {
            ValueAst::Local(symbol) => {
                let found = scope.and_then(|s| s.values.get(&symbol.key()));
                found.cloned().ok_or_else(|| ParseError::UndefinedSymbol {
                    name: format!("%{}", symbol.key()),
                    scope: scope.map_or_else(|| "module scope".into(), |s| s.function.clone()),
                })
            }
            ValueAst::Global(symbol) => {
                self.globals
                    .get(&symbol.key())
                    .cloned()
                    .ok_or_else(|| ParseError::UndefinedSymbol {
                        name: format!("@{}", symbol.key()),
                        scope: "module scope".into(),
                    })
            }
            ValueAst::Const(constant) => self.lower_constant(constant, ty, scope),
        }
    }

    fn lower_constant(&self, constant: &ConstAst, ty: &Type, scope: Option<&Scope>) -> ParseResult<Value> {
        let typed = |tv: &TypedValue| self.lower_value(&tv.value, &tv.ty, scope);
        let constant = match constant {
            ConstAst::Int(v) => {
                let bits = ty.int_width().unwrap_or(64);
                return Ok(Value::const_int(bits, int_payload(*v)?));
            }
            ConstAst::Bool(b) => return Ok(Value::bool(*b)),
            ConstAst::Float(bits) => Constant::Float {
                ty: ty.clone(),
                bits: *bits,
            },
            ConstAst::Null => Constant::Null(ty.clone()),
            ConstAst::Undef => Constant::Undef(ty.clone()),
            ConstAst::ZeroInit => Constant::ZeroInit(ty.clone()),
            ConstAst::CString(bytes) => Constant::CString(bytes.clone()),
            ConstAst::Array(elements) => Constant::Array {
                ty: ty.clone(),
                elements: elements.iter().map(typed).collect::<ParseResult<_>>()?,
            },
            ConstAst::Struct(fields) => Constant::Struct {
                ty: ty.clone(),
                fields: fields.iter().map(typed).collect::<ParseResult<_>>()?,
            },
            ConstAst::Cast { op, value, to } => Constant::Expr(Box::new(ConstExpr::Cast {
                op: *op,
                value: typed(value)?,
                to: to.clone(),
            })),
            ConstAst::GetElementPtr {
                inbounds,
                source,
                base,
                indices,
            } => {
                let indices: Vec<Value> = indices.iter().map(typed).collect::<ParseResult<_>>()?;
                let ty = self.module.gep_result_type(source, &indices);
                Constant::Expr(Box::new(ConstExpr::GetElementPtr {
                    inbounds: *inbounds,
                    source: source.clone(),
                    base: typed(base)?,
                    indices,
                    ty,
                }))
            }
        };
        Ok(Value::Constant(constant))
    }
}

/// Integer literals wider than `i64` are accepted as long as they fit 64 bits unsigned.
fn int_payload(v: i128) -> ParseResult<i64> {
    if let Ok(signed) = i64::try_from(v) {
        return Ok(signed);
    }
    u64::try_from(v)
        .map(|u| u as i64)
        .map_err(|_| ParseError::IntegerOutOfRange {
            line: 0,
            literal: v.to_string(),
        })
}

/// Index values good enough to compute a `getelementptr` result type.
fn static_indices(indices: &[TypedValue]) -> Vec<Value> {
    indices
        .iter()
        .map(|index| match (&index.value, index.ty.int_width()) {
            (ValueAst::Const(ConstAst::Int(v)), Some(bits)) => {
                Value::const_int(bits, int_payload(*v).unwrap_or_default())
            }
            _ => Value::undef(index.ty.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::parse;
    use qat_ir::{InstructionKind, Type, Value, verify_module};

    #[test]
    fn test_forward_references_resolve() {
        let source = r"
define i64 @f(i1 %c) {
entry:
  br i1 %c, label %a, label %b
a:
  br label %b
b:
  %x = phi i64 [ 1, %entry ], [ %y, %a ]
  %y = add i64 %x, 1
  ret i64 %x
}
";
        let module = parse(source).unwrap();
        verify_module(&module).unwrap();
        let f = module.get_function("f").unwrap();
        let body = module.function_instructions(f);
        let phi = module.instruction(body[2]);
        assert!(matches!(phi.kind(), InstructionKind::Phi { blocks } if blocks.len() == 2));
        assert_eq!(phi.operands()[1], Value::Instruction(body[3]));
    }

    #[test]
    fn test_numbered_values_and_implicit_entry() {
        let source = "define i64 @f(i64) {\n  %2 = add i64 %0, 1\n  br label %3\n3:\n  ret i64 %2\n}\n";
        let module = parse(source).unwrap();
        let f = module.get_function("f").unwrap();
        assert_eq!(module.function(f).blocks().len(), 2);
        let body = module.function_instructions(f);
        assert_eq!(module.instruction(body[0]).name(), None);
        assert_eq!(
            module.instruction(body[2]).operands()[0],
            Value::Instruction(body[0])
        );
    }

    #[test]
    fn test_undefined_local_is_an_error() {
        let source = "define void @f() {\nentry:\n  %a = add i64 %missing, 1\n  ret void\n}\n";
        assert!(matches!(
            parse(source),
            Err(crate::ParseError::UndefinedSymbol { .. })
        ));
    }

    #[test]
    fn test_attribute_groups_are_attached() {
        let source = "define void @Main() #0 {\nentry:\n  ret void\n}\nattributes #0 = { \"EntryPoint\" }\n";
        let module = parse(source).unwrap();
        let main = module.get_function("Main").unwrap();
        assert!(module.function(main).has_attribute("EntryPoint"));
        assert_eq!(module.functions_with_attribute("EntryPoint"), vec![main]);
    }

    #[test]
    fn test_global_string_initializer() {
        let source = "@0 = internal constant [3 x i8] c\"hi\\00\"\n";
        let module = parse(source).unwrap();
        let g = module.get_global("0").unwrap();
        assert_eq!(
            module.value_type(&Value::Global(g)),
            Type::Array(3, Box::new(Type::i8())).ptr()
        );
        assert!(module.global(g).initializer().is_some());
    }
}
