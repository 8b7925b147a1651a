//! Instruction parsing.

use qat_ir::{BinaryOp, CastOp, IntPredicate, TailMarker, Type};

use super::Parser;
use super::value::is_type_keyword;
use crate::ast::{InstructionAst, OpAst, Symbol};
use crate::error::{ParseError, ParseResult};
use crate::lexer::Token;

/// Flags that may follow an arithmetic opcode.
fn is_operator_flag(word: &str) -> bool {
    matches!(
        word,
        "nuw" | "nsw" | "exact" | "disjoint" | "fast" | "nnan" | "ninf" | "nsz" | "arcp"
            | "contract" | "afn" | "reassoc"
    )
}

impl Parser {
    /// Parse one instruction, including any trailing `, align N` or metadata.
    pub(super) fn parse_instruction(&mut self) -> ParseResult<InstructionAst> {
        let result = match (self.peek(), self.peek_nth(1)) {
            (Some(Token::LocalName(_) | Token::LocalId(_)), Some(Token::Equals)) => {
                let symbol = self.parse_local_symbol()?;
                self.expect(Token::Equals)?;
                Some(symbol)
            }
            _ => None,
        };

        let opcode = match self.next_token("expected instruction")? {
            Token::Keyword(word) => word,
            other => return Err(self.unexpected("instruction", &other)),
        };
        let line = self.line;

        let mut op = match opcode.as_str() {
            "ret" => {
                if self.consume_keyword("void") {
                    OpAst::Ret(None)
                } else {
                    OpAst::Ret(Some(self.parse_typed_value()?))
                }
            }
            "br" => self.parse_br()?,
            "switch" => self.parse_switch()?,
            "unreachable" => OpAst::Unreachable,
            "call" => self.parse_call(TailMarker::None)?,
            "tail" | "musttail" | "notail" => {
                let tail = match opcode.as_str() {
                    "tail" => TailMarker::Tail,
                    "musttail" => TailMarker::MustTail,
                    _ => TailMarker::NoTail,
                };
                self.expect_keyword("call")?;
                self.parse_call(tail)?
            }
            "invoke" => self.parse_invoke()?,
            "icmp" => {
                let pred = match self.next_token("expected predicate")? {
                    Token::Keyword(word) => IntPredicate::from_name(&word)
                        .ok_or_else(|| self.unexpected("integer predicate", &Token::Keyword(word)))?,
                    other => return Err(self.unexpected("integer predicate", &other)),
                };
                let ty = self.parse_type()?;
                let lhs = self.parse_value()?;
                self.expect(Token::Comma)?;
                let rhs = self.parse_value()?;
                OpAst::ICmp { pred, ty, lhs, rhs }
            }
            "load" => {
                self.consume_keyword("volatile");
                let ty = self.parse_type()?;
                self.expect(Token::Comma)?;
                let ptr = self.parse_typed_value()?;
                OpAst::Load {
                    ty,
                    ptr,
                    align: None,
                }
            }
            "store" => {
                self.consume_keyword("volatile");
                let value = self.parse_typed_value()?;
                self.expect(Token::Comma)?;
                let ptr = self.parse_typed_value()?;
                OpAst::Store {
                    value,
                    ptr,
                    align: None,
                }
            }
            "alloca" => OpAst::Alloca {
                ty: self.parse_type()?,
                align: None,
            },
            "getelementptr" => {
                let inbounds = self.consume_keyword("inbounds");
                let source = self.parse_type()?;
                self.expect(Token::Comma)?;
                let base = self.parse_typed_value()?;
                let mut indices = Vec::new();
                while self.check(&Token::Comma) && !self.at_trailing_attachment() {
                    self.advance();
                    indices.push(self.parse_typed_value()?);
                }
                OpAst::GetElementPtr {
                    inbounds,
                    source,
                    base,
                    indices,
                }
            }
            "select" => {
                let cond = self.parse_typed_value()?;
                self.expect(Token::Comma)?;
                let if_true = self.parse_typed_value()?;
                self.expect(Token::Comma)?;
                let if_false = self.parse_typed_value()?;
                OpAst::Select {
                    cond,
                    if_true,
                    if_false,
                }
            }
            "phi" => self.parse_phi()?,
            word => {
                if let Some(op) = BinaryOp::from_name(word) {
                    self.skip_operator_flags();
                    let ty = self.parse_type()?;
                    let lhs = self.parse_value()?;
                    self.expect(Token::Comma)?;
                    let rhs = self.parse_value()?;
                    OpAst::Binary { op, ty, lhs, rhs }
                } else if let Some(op) = CastOp::from_name(word) {
                    let value = self.parse_typed_value()?;
                    self.expect_keyword("to")?;
                    let to = self.parse_type()?;
                    OpAst::Cast { op, value, to }
                } else {
                    return Err(ParseError::UnknownInstruction {
                        opcode: word.to_string(),
                        line,
                    });
                }
            }
        };

        self.parse_trailing(&mut op)?;
        Ok(InstructionAst { result, op, line })
    }

    fn at_trailing_attachment(&self) -> bool {
        matches!(self.peek_nth(1), Some(Token::MetadataName(_)))
            || self.peek_nth(1).is_some_and(|t| t.is_keyword("align"))
    }

    fn parse_trailing(&mut self, op: &mut OpAst) -> ParseResult<()> {
        while self.check(&Token::Comma) && self.at_trailing_attachment() {
            self.advance();
            if self.consume_keyword("align") {
                let value = self.parse_u32()?;
                match op {
                    OpAst::Load { align, .. } | OpAst::Store { align, .. } | OpAst::Alloca { align, .. } => {
                        *align = Some(value);
                    }
                    _ => {}
                }
            } else {
                self.advance();
                self.skip_metadata_value()?;
            }
        }
        Ok(())
    }

    fn skip_operator_flags(&mut self) {
        while let Some(Token::Keyword(word)) = self.peek() {
            if !is_operator_flag(word) {
                break;
            }
            self.advance();
        }
    }

    fn parse_br(&mut self) -> ParseResult<OpAst> {
        if self.check_keyword("label") {
            return Ok(OpAst::Br(self.parse_label()?));
        }
        let cond = self.parse_typed_value()?;
        self.expect(Token::Comma)?;
        let if_true = self.parse_label()?;
        self.expect(Token::Comma)?;
        let if_false = self.parse_label()?;
        Ok(OpAst::CondBr {
            cond,
            if_true,
            if_false,
        })
    }

    fn parse_switch(&mut self) -> ParseResult<OpAst> {
        let cond = self.parse_typed_value()?;
        self.expect(Token::Comma)?;
        let default = self.parse_label()?;
        self.expect(Token::LBracket)?;
        let mut cases = Vec::new();
        while !self.consume(&Token::RBracket) {
            let value = self.parse_typed_value()?;
            self.expect(Token::Comma)?;
            let dest = self.parse_label()?;
            cases.push((value, dest));
        }
        Ok(OpAst::Switch {
            cond,
            default,
            cases,
        })
    }

    /// Return type of a call, skipping calling conventions and return attributes.
    fn parse_call_return_type(&mut self) -> ParseResult<Type> {
        while let Some(Token::Keyword(word)) = self.peek() {
            if is_type_keyword(word) {
                break;
            }
            self.advance();
            if self.check(&Token::LParen) {
                self.skip_group()?;
            }
        }
        match self.parse_type()? {
            Type::Function(signature) => Ok(signature.ret),
            ty => Ok(ty),
        }
    }

    fn parse_call_arguments(&mut self) -> ParseResult<Vec<crate::ast::TypedValue>> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.consume(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_typed_value()?);
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        while matches!(self.peek(), Some(Token::AttrGroupId(_))) {
            self.advance();
        }
        Ok(args)
    }

    fn parse_call(&mut self, tail: TailMarker) -> ParseResult<OpAst> {
        let ret = self.parse_call_return_type()?;
        let callee = self.parse_value()?;
        let args = self.parse_call_arguments()?;
        Ok(OpAst::Call {
            tail,
            ret,
            callee,
            args,
        })
    }

    fn parse_invoke(&mut self) -> ParseResult<OpAst> {
        let ret = self.parse_call_return_type()?;
        let callee = self.parse_value()?;
        let args = self.parse_call_arguments()?;
        self.expect_keyword("to")?;
        let normal = self.parse_label()?;
        self.expect_keyword("unwind")?;
        let unwind = self.parse_label()?;
        Ok(OpAst::Invoke {
            ret,
            callee,
            args,
            normal,
            unwind,
        })
    }

    fn parse_phi(&mut self) -> ParseResult<OpAst> {
        let ty = self.parse_type()?;
        let mut incoming: Vec<(crate::ast::ValueAst, Symbol)> = Vec::new();
        loop {
            self.expect(Token::LBracket)?;
            let value = self.parse_value()?;
            self.expect(Token::Comma)?;
            let block = self.parse_local_symbol()?;
            self.expect(Token::RBracket)?;
            incoming.push((value, block));
            if !(self.check(&Token::Comma) && matches!(self.peek_nth(1), Some(Token::LBracket))) {
                break;
            }
            self.advance();
        }
        Ok(OpAst::Phi { ty, incoming })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ConstAst, ValueAst};

    fn instruction(source: &str) -> InstructionAst {
        Parser::new(source).unwrap().parse_instruction().unwrap()
    }

    #[test]
    fn test_conditional_branch() {
        let inst = instruction("br i1 %c, label %then0__1, label %continue__1");
        let OpAst::CondBr {
            if_true, if_false, ..
        } = inst.op
        else {
            panic!("expected conditional branch");
        };
        assert_eq!(if_true, Symbol::Named("then0__1".into()));
        assert_eq!(if_false, Symbol::Named("continue__1".into()));
    }

    #[test]
    fn test_call_with_result_and_attributes() {
        let inst = instruction("%r = tail call fastcc noundef %Result* @m(%Qubit* nonnull %q) #3, !dbg !9");
        assert_eq!(inst.result, Some(Symbol::Named("r".into())));
        let OpAst::Call { tail, ret, args, .. } = inst.op else {
            panic!("expected call");
        };
        assert_eq!(tail, TailMarker::Tail);
        assert_eq!(ret, Type::named_ptr("Result"));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_variadic_call_type() {
        let inst = instruction("call void (i8*, ...) @printf(i8* null, i64 1)");
        let OpAst::Call { ret, args, .. } = inst.op else {
            panic!("expected call");
        };
        assert_eq!(ret, Type::Void);
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_load_with_align() {
        let inst = instruction("%1 = load i64, i64* %p, align 8");
        assert_eq!(inst.result, Some(Symbol::Numbered(1)));
        assert!(matches!(inst.op, OpAst::Load { align: Some(8), .. }));
    }

    #[test]
    fn test_phi_incoming() {
        let inst = instruction("%x = phi i64 [ 1, %a ], [ %y, %b ]");
        let OpAst::Phi { incoming, .. } = inst.op else {
            panic!("expected phi");
        };
        assert_eq!(incoming.len(), 2);
        assert!(matches!(incoming[0].0, ValueAst::Const(ConstAst::Int(1))));
        assert_eq!(incoming[1].1, Symbol::Named("b".into()));
    }

    #[test]
    fn test_binary_with_flags() {
        let inst = instruction("%s = add nuw nsw i64 %a, 3");
        assert!(matches!(inst.op, OpAst::Binary { op: BinaryOp::Add, .. }));
    }
}
