//! Textual IR emitter.

use std::fmt::Write as _;

use rustc_hash::{FxHashMap, FxHashSet};

use qat_ir::{
    Attribute, BlockId, ConstExpr, Constant, FuncId, Global, InstrId, InstructionKind, Module,
    TailMarker, Type, Value, quote_name,
};

/// Emit a module as textual IR.
pub fn emit(module: &Module) -> String {
    let mut emitter = Emitter::new(module);
    emitter.emit_module();
    emitter.output
}

/// Emit a single function body, mostly useful in diagnostics and tests.
pub fn emit_function(module: &Module, function: FuncId) -> String {
    let mut emitter = Emitter::new(module);
    emitter.emit_function(function);
    emitter.output
}

/// Format one instruction as it would appear inside its function.
pub fn emit_instruction(module: &Module, id: InstrId) -> String {
    let mut emitter = Emitter::new(module);
    if let Some(function) = module.instruction_function(id) {
        emitter.assign_slots(function);
    }
    emitter.format_instruction(id)
}

/// Format a global symbol name. Numbered globals print without quotes.
fn global_name(name: &str) -> String {
    if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
        format!("@{name}")
    } else {
        format!("@{}", quote_name(name))
    }
}

/// Format a float the way LLVM does: exact decimal with six fractional
/// digits when that round-trips, the hexadecimal bit pattern otherwise.
fn format_float(bits: u64) -> String {
    let value = f64::from_bits(bits);
    if value.is_finite() {
        let formatted = format!("{value:.6e}");
        if let Some((mantissa, exponent)) = formatted.split_once('e') {
            if let Ok(exp) = exponent.parse::<i32>() {
                let sign = if exp < 0 { '-' } else { '+' };
                let text = format!("{mantissa}e{sign}{:02}", exp.abs());
                if text.parse::<f64>().is_ok_and(|v| v.to_bits() == bits) {
                    return text;
                }
            }
        }
    }
    format!("0x{bits:016X}")
}

fn escape_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b == b'"' || b == b'\\' || !(0x20..0x7f).contains(&b) {
                format!("\\{b:02X}")
            } else {
                (b as char).to_string()
            }
        })
        .collect()
}

/// Local slot names of one function.
#[derive(Default)]
struct Slots {
    values: FxHashMap<Value, String>,
    blocks: FxHashMap<BlockId, String>,
}

struct Emitter<'m> {
    module: &'m Module,
    output: String,
    groups: Vec<Vec<Attribute>>,
    slots: Slots,
}

impl<'m> Emitter<'m> {
    fn new(module: &'m Module) -> Self {
        Self {
            module,
            output: String::new(),
            groups: Vec::new(),
            slots: Slots::default(),
        }
    }

    fn writeln(&mut self, line: &str) {
        self.output.push_str(line);
        self.output.push('\n');
    }

    fn emit_module(&mut self) {
        let module = self.module;
        self.writeln(&format!("; ModuleID = '{}'", module.name()));
        if let Some(filename) = module.source_filename() {
            self.writeln(&format!("source_filename = \"{}\"", escape_bytes(filename.as_bytes())));
        }
        if let Some(layout) = module.data_layout() {
            self.writeln(&format!("target datalayout = \"{layout}\""));
        }
        if let Some(triple) = module.target_triple() {
            self.writeln(&format!("target triple = \"{triple}\""));
        }

        if !module.named_types().is_empty() {
            self.writeln("");
        }
        for (name, body) in module.named_types() {
            let named = Type::Named(name.clone());
            match body {
                Some(ty) => self.writeln(&format!("{named} = type {ty}")),
                None => self.writeln(&format!("{named} = type opaque")),
            }
        }

        let globals: Vec<_> = module.globals().collect();
        if !globals.is_empty() {
            self.writeln("");
        }
        for global in globals {
            let line = self.format_global(module.global(global));
            self.writeln(&line);
        }

        for function in module.functions() {
            self.writeln("");
            self.emit_function(function);
        }

        if !self.groups.is_empty() {
            self.writeln("");
        }
        for (index, attrs) in self.groups.clone().iter().enumerate() {
            let text: Vec<String> = attrs.iter().map(ToString::to_string).collect();
            self.writeln(&format!("attributes #{index} = {{ {} }}", text.join(" ")));
        }
    }

    fn format_global(&self, global: &Global) -> String {
        let mut line = format!("{} = ", global_name(global.name()));
        if let Some(linkage) = global.linkage() {
            let _ = write!(line, "{linkage} ");
        }
        if let Some(marker) = global.unnamed_addr() {
            let _ = write!(line, "{marker} ");
        }
        line.push_str(if global.is_constant() { "constant " } else { "global " });
        let _ = write!(line, "{}", global.value_type());
        if let Some(init) = global.initializer() {
            let _ = write!(line, " {}", self.format_value(init));
        }
        if let Some(align) = global.align() {
            let _ = write!(line, ", align {align}");
        }
        line
    }

    fn attribute_group(&mut self, attrs: &[Attribute]) -> usize {
        if let Some(index) = self.groups.iter().position(|g| g.as_slice() == attrs) {
            return index;
        }
        self.groups.push(attrs.to_vec());
        self.groups.len() - 1
    }

    fn emit_function(&mut self, id: FuncId) {
        let module = self.module;
        let function = module.function(id);
        self.assign_slots(id);

        let mut header = String::from(if function.is_declaration() { "declare " } else { "define " });
        if let Some(linkage) = function.linkage() {
            let _ = write!(header, "{linkage} ");
        }
        let _ = write!(header, "{} {}(", function.return_type(), global_name(function.name()));
        let mut params: Vec<String> = function
            .params()
            .iter()
            .enumerate()
            .map(|(index, param)| {
                if function.is_declaration() {
                    param.ty.to_string()
                } else {
                    let arg = Value::Argument {
                        function: id,
                        index: index as u32,
                    };
                    format!("{} {}", param.ty, self.format_value(&arg))
                }
            })
            .collect();
        if function.is_var_arg() {
            params.push("...".into());
        }
        header.push_str(&params.join(", "));
        header.push(')');
        if let Some(marker) = function.unnamed_addr() {
            let _ = write!(header, " {marker}");
        }
        if !function.attributes().is_empty() {
            let group = self.attribute_group(function.attributes());
            let _ = write!(header, " #{group}");
        }

        if function.is_declaration() {
            self.writeln(&header);
            return;
        }
        header.push_str(" {");
        self.writeln(&header);

        for (position, &block) in function.blocks().iter().enumerate() {
            if position > 0 {
                self.writeln("");
            }
            if position > 0 || module.block(block).name().is_some() {
                let label = self.slots.blocks.get(&block).cloned().unwrap_or_default();
                self.writeln(&format!("{label}:"));
            }
            for &inst in module.block(block).instructions() {
                let line = self.format_instruction(inst);
                self.writeln(&format!("  {line}"));
            }
        }
        self.writeln("}");
    }

    /// Number unnamed values and deduplicate names in LLVM slot order.
    #[allow(clippy::cast_possible_truncation)]
    fn assign_slots(&mut self, id: FuncId) {
        let module = self.module;
        let function = module.function(id);
        let mut slots = Slots::default();
        let mut used: FxHashSet<String> = FxHashSet::default();
        let mut next = 0_u32;

        let mut name_for = |name: Option<&str>, used: &mut FxHashSet<String>| -> String {
            match name {
                Some(name) => {
                    let mut candidate = name.to_string();
                    let mut n = 1;
                    while used.contains(&candidate) {
                        candidate = format!("{name}.{n}");
                        n += 1;
                    }
                    used.insert(candidate.clone());
                    quote_name(&candidate).into_owned()
                }
                None => {
                    next += 1;
                    (next - 1).to_string()
                }
            }
        };

        for (index, param) in function.params().iter().enumerate() {
            let arg = Value::Argument {
                function: id,
                index: index as u32,
            };
            let slot = name_for(param.name.as_deref(), &mut used);
            slots.values.insert(arg, slot);
        }
        for &block in function.blocks() {
            let slot = name_for(module.block(block).name(), &mut used);
            slots.blocks.insert(block, slot);
            for &inst in module.block(block).instructions() {
                let instruction = module.instruction(inst);
                if instruction.ty().is_void() {
                    continue;
                }
                let slot = name_for(instruction.name(), &mut used);
                slots.values.insert(Value::Instruction(inst), slot);
            }
        }
        self.slots = slots;
    }

    fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Instruction(_) | Value::Argument { .. } => match self.slots.values.get(value) {
                Some(slot) => format!("%{slot}"),
                None => format!("%<{}>", self.module.value_label(value)),
            },
            Value::Block(block) => match self.slots.blocks.get(block) {
                Some(slot) => format!("%{slot}"),
                None => format!("%<{block}>"),
            },
            Value::Function(f) => global_name(self.module.function(*f).name()),
            Value::Global(g) => global_name(self.module.global(*g).name()),
            Value::Constant(constant) => self.format_constant(constant),
        }
    }

    fn format_typed(&self, value: &Value) -> String {
        format!("{} {}", self.module.value_type(value), self.format_value(value))
    }

    fn format_constant(&self, constant: &Constant) -> String {
        match constant {
            Constant::Int { ty, value } => {
                if *ty == Type::bool() {
                    if *value == 0 { "false" } else { "true" }.to_string()
                } else {
                    value.to_string()
                }
            }
            Constant::Float { bits, .. } => format_float(*bits),
            Constant::Null(_) => "null".into(),
            Constant::Undef(_) => "undef".into(),
            Constant::ZeroInit(_) => "zeroinitializer".into(),
            Constant::CString(bytes) => format!("c\"{}\"", escape_bytes(bytes)),
            Constant::Array { elements, .. } => {
                let items: Vec<_> = elements.iter().map(|e| self.format_typed(e)).collect();
                format!("[{}]", items.join(", "))
            }
            Constant::Struct { fields, .. } => {
                let items: Vec<_> = fields.iter().map(|e| self.format_typed(e)).collect();
                format!("{{ {} }}", items.join(", "))
            }
            Constant::Expr(expr) => match expr.as_ref() {
                ConstExpr::Cast { op, value, to } => {
                    format!("{} ({} to {to})", op.name(), self.format_typed(value))
                }
                ConstExpr::GetElementPtr {
                    inbounds,
                    source,
                    base,
                    indices,
                    ..
                } => {
                    let mut parts = vec![source.to_string(), self.format_typed(base)];
                    parts.extend(indices.iter().map(|i| self.format_typed(i)));
                    let inbounds = if *inbounds { "inbounds " } else { "" };
                    format!("getelementptr {inbounds}({})", parts.join(", "))
                }
            },
        }
    }

    fn label(&self, value: &Value) -> String {
        format!("label {}", self.format_value(value))
    }

    fn format_instruction(&self, id: InstrId) -> String {
        let module = self.module;
        let inst = module.instruction(id);
        let ops = inst.operands();
        let mut line = String::new();
        if !inst.ty().is_void() {
            let _ = write!(line, "{} = ", self.format_value(&Value::Instruction(id)));
        }

        let body = match inst.kind() {
            InstructionKind::Ret => match ops.first() {
                Some(value) => format!("ret {}", self.format_typed(value)),
                None => "ret void".into(),
            },
            InstructionKind::Br => match ops {
                [dest] => format!("br {}", self.label(dest)),
                [cond, if_false, if_true] => format!(
                    "br {}, {}, {}",
                    self.format_typed(cond),
                    self.label(if_true),
                    self.label(if_false)
                ),
                _ => "br <malformed>".into(),
            },
            InstructionKind::Switch => {
                let mut text = String::from("switch");
                if let [cond, default, cases @ ..] = ops {
                    let _ = write!(text, " {}, {} [", self.format_typed(cond), self.label(default));
                    for case in cases.chunks(2) {
                        if let [value, dest] = case {
                            let _ = write!(text, "\n    {}, {}", self.format_typed(value), self.label(dest));
                        }
                    }
                    text.push_str("\n  ]");
                }
                text
            }
            InstructionKind::Unreachable => "unreachable".into(),
            InstructionKind::Call { tail } => {
                let prefix = match tail {
                    TailMarker::None => "",
                    TailMarker::Tail => "tail ",
                    TailMarker::MustTail => "musttail ",
                    TailMarker::NoTail => "notail ",
                };
                format!("{prefix}call {}", self.format_call_site(id))
            }
            InstructionKind::Invoke => match inst.invoke_destinations() {
                Some((normal, unwind)) => format!(
                    "invoke {}\n          to {} unwind {}",
                    self.format_call_site(id),
                    self.label(&Value::Block(normal)),
                    self.label(&Value::Block(unwind))
                ),
                None => "invoke <malformed>".into(),
            },
            InstructionKind::Binary(op) => format!(
                "{} {} {}, {}",
                op.name(),
                inst.ty(),
                self.operand(ops, 0),
                self.operand(ops, 1)
            ),
            InstructionKind::ICmp(pred) => {
                let ty = ops.first().map(|v| module.value_type(v)).unwrap_or(Type::Void);
                format!(
                    "icmp {} {ty} {}, {}",
                    pred.name(),
                    self.operand(ops, 0),
                    self.operand(ops, 1)
                )
            }
            InstructionKind::Cast(op) => format!(
                "{} {} to {}",
                op.name(),
                self.typed_operand(ops, 0),
                inst.ty()
            ),
            InstructionKind::Load { align } => {
                let mut text = format!("load {}, {}", inst.ty(), self.typed_operand(ops, 0));
                if let Some(align) = align {
                    let _ = write!(text, ", align {align}");
                }
                text
            }
            InstructionKind::Store { align } => {
                let mut text = format!(
                    "store {}, {}",
                    self.typed_operand(ops, 0),
                    self.typed_operand(ops, 1)
                );
                if let Some(align) = align {
                    let _ = write!(text, ", align {align}");
                }
                text
            }
            InstructionKind::Alloca { allocated, align } => {
                let mut text = format!("alloca {allocated}");
                if let Some(align) = align {
                    let _ = write!(text, ", align {align}");
                }
                text
            }
            InstructionKind::GetElementPtr { source, inbounds } => {
                let mut parts = vec![source.to_string()];
                parts.extend(ops.iter().map(|v| self.format_typed(v)));
                let inbounds = if *inbounds { "inbounds " } else { "" };
                format!("getelementptr {inbounds}{}", parts.join(", "))
            }
            InstructionKind::Select => format!(
                "select {}, {}, {}",
                self.typed_operand(ops, 0),
                self.typed_operand(ops, 1),
                self.typed_operand(ops, 2)
            ),
            InstructionKind::Phi { blocks } => {
                let incoming: Vec<_> = ops
                    .iter()
                    .zip(blocks)
                    .map(|(value, block)| {
                        format!(
                            "[ {}, {} ]",
                            self.format_value(value),
                            self.format_value(&Value::Block(*block))
                        )
                    })
                    .collect();
                format!("phi {} {}", inst.ty(), incoming.join(", "))
            }
        };
        line.push_str(&body);
        line
    }

    fn operand(&self, ops: &[Value], index: usize) -> String {
        ops.get(index)
            .map_or_else(|| "<missing>".into(), |v| self.format_value(v))
    }

    fn typed_operand(&self, ops: &[Value], index: usize) -> String {
        ops.get(index)
            .map_or_else(|| "<missing>".into(), |v| self.format_typed(v))
    }

    /// `RET callee(args)`, with the full signature for variadic callees.
    fn format_call_site(&self, id: InstrId) -> String {
        let module = self.module;
        let inst = module.instruction(id);
        let args: Vec<_> = inst
            .call_arguments()
            .iter()
            .map(|a| self.format_typed(a))
            .collect();
        let callee = inst.callee().map_or_else(|| "<missing>".into(), |c| self.format_value(c));
        let ret = match inst.called_function().map(|f| module.function(f)) {
            Some(f) if f.is_var_arg() => Type::Function(Box::new(f.signature())).to_string(),
            _ => inst.ty().to_string(),
        };
        format!("{ret} {callee}({})", args.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.0_f64.to_bits()), "1.000000e+00");
        assert_eq!(format_float((-2.5e-3_f64).to_bits()), "-2.500000e-03");
        assert_eq!(format_float(0.1_f64.to_bits()), "1.000000e-01");
        assert!(format_float(0.123_456_789_f64.to_bits()).starts_with("0x"));
    }

    #[test]
    fn test_escape_bytes() {
        assert_eq!(escape_bytes(b"hi\0"), "hi\\00");
        assert_eq!(escape_bytes(b"a\"b"), "a\\22b");
    }

    #[test]
    fn test_global_name() {
        assert_eq!(global_name("0"), "@0");
        assert_eq!(global_name("Main"), "@Main");
        assert_eq!(global_name("a b"), "@\"a b\"");
    }

    #[test]
    fn test_emit_instruction_uses_function_slots() {
        let module = crate::parse(
            "define i64 @f(i64 %a) {\nentry:\n  %0 = add i64 %a, 1\n  ret i64 %0\n}\n",
        )
        .unwrap();
        let f = module.get_function("f").unwrap();
        let add = module.function_instructions(f)[0];
        assert_eq!(emit_instruction(&module, add), "%0 = add i64 %a, 1");
    }
}
