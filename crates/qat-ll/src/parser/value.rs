//! Types, values and constants.

use qat_ir::{CastOp, FunctionType, Type};

use super::Parser;
use crate::ast::{ConstAst, Symbol, TypedValue, ValueAst};
use crate::error::{ParseError, ParseResult};
use crate::lexer::Token;

/// Keywords that start a type.
pub(super) fn is_type_keyword(word: &str) -> bool {
    matches!(
        word,
        "void" | "half" | "float" | "double" | "label" | "metadata" | "ptr"
    )
}

/// Keywords that start a value.
pub(super) fn is_value_keyword(word: &str) -> bool {
    matches!(
        word,
        "true" | "false" | "null" | "undef" | "poison" | "zeroinitializer" | "getelementptr"
    ) || CastOp::from_name(word).is_some()
}

impl Parser {
    /// Parse a type, including pointer and function suffixes.
    pub(super) fn parse_type(&mut self) -> ParseResult<Type> {
        let mut ty = match self.next_token("expected type")? {
            Token::IntType(bits) => Type::Int(bits),
            Token::Keyword(word) => match word.as_str() {
                "void" => Type::Void,
                "half" => Type::Half,
                "float" => Type::Float,
                "double" => Type::Double,
                "label" => Type::Label,
                "metadata" => Type::Metadata,
                "ptr" => Type::i8().ptr(),
                _ => return Err(self.unexpected("type", &Token::Keyword(word))),
            },
            Token::LocalName(name) => Type::Named(name),
            Token::LocalId(n) => Type::Named(n.to_string()),
            Token::LBracket => {
                let len = match self.next_token("expected array length")? {
                    Token::Integer(n) => u64::try_from(n).map_err(|_| ParseError::IntegerOutOfRange {
                        line: self.line,
                        literal: n.to_string(),
                    })?,
                    other => return Err(self.unexpected("array length", &other)),
                };
                self.expect_keyword("x")?;
                let elem = self.parse_type()?;
                self.expect(Token::RBracket)?;
                Type::Array(len, Box::new(elem))
            }
            Token::LBrace => Type::Struct(self.parse_struct_body()?),
            Token::Less => {
                self.expect(Token::LBrace)?;
                let fields = self.parse_struct_body()?;
                self.expect(Token::Greater)?;
                Type::Struct(fields)
            }
            other => return Err(self.unexpected("type", &other)),
        };

        loop {
            if self.consume(&Token::Star) {
                ty = ty.ptr();
            } else if self.check_keyword("addrspace") {
                self.advance();
                self.skip_group()?;
            } else if self.check(&Token::LParen) {
                self.advance();
                let (params, var_arg) = self.parse_param_types()?;
                ty = Type::Function(Box::new(FunctionType {
                    ret: ty,
                    params,
                    var_arg,
                }));
            } else {
                return Ok(ty);
            }
        }
    }

    /// Field types after `{`, consuming the closing `}`.
    fn parse_struct_body(&mut self) -> ParseResult<Vec<Type>> {
        let mut fields = Vec::new();
        if self.consume(&Token::RBrace) {
            return Ok(fields);
        }
        loop {
            fields.push(self.parse_type()?);
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBrace)?;
        Ok(fields)
    }

    /// Parameter types of a function type after `(`, consuming the `)`.
    fn parse_param_types(&mut self) -> ParseResult<(Vec<Type>, bool)> {
        let mut params = Vec::new();
        let mut var_arg = false;
        while !self.consume(&Token::RParen) {
            if self.consume(&Token::Ellipsis) {
                var_arg = true;
            } else {
                params.push(self.parse_type()?);
                self.skip_param_attributes()?;
            }
            if !self.consume(&Token::Comma) {
                self.expect(Token::RParen)?;
                break;
            }
        }
        Ok((params, var_arg))
    }

    /// Skip parameter attributes such as `nocapture`, `align 8` or `dereferenceable(8)`.
    pub(super) fn skip_param_attributes(&mut self) -> ParseResult<()> {
        while let Some(Token::Keyword(word)) = self.peek() {
            if is_value_keyword(word) || is_type_keyword(word) {
                break;
            }
            let is_align = word == "align";
            self.advance();
            if is_align && matches!(self.peek(), Some(Token::Integer(_))) {
                self.advance();
            } else if self.check(&Token::LParen) {
                self.skip_group()?;
            }
        }
        Ok(())
    }

    /// Parse `type value`, allowing parameter attributes in between.
    pub(super) fn parse_typed_value(&mut self) -> ParseResult<TypedValue> {
        let ty = self.parse_type()?;
        self.skip_param_attributes()?;
        let value = self.parse_value()?;
        Ok(TypedValue { ty, value })
    }

    /// Parse a local symbol such as `%entry` or `%3`.
    pub(super) fn parse_local_symbol(&mut self) -> ParseResult<Symbol> {
        match self.next_token("expected local name")? {
            Token::LocalName(name) => Ok(Symbol::Named(name)),
            Token::LocalId(n) => Ok(Symbol::Numbered(n)),
            other => Err(self.unexpected("local name", &other)),
        }
    }

    /// Parse `label %name`.
    pub(super) fn parse_label(&mut self) -> ParseResult<Symbol> {
        self.expect_keyword("label")?;
        self.parse_local_symbol()
    }

    /// Check whether the next token can start a value.
    pub(super) fn at_value_start(&self) -> bool {
        match self.peek() {
            Some(
                Token::Integer(_)
                | Token::Float(_)
                | Token::HexFloat(_)
                | Token::CStringLit(_)
                | Token::LBracket
                | Token::LBrace
                | Token::Less
                | Token::LocalName(_)
                | Token::LocalId(_),
            ) => true,
            Some(Token::GlobalName(_) | Token::GlobalId(_)) => {
                !matches!(self.peek_nth(1), Some(Token::Equals))
            }
            Some(Token::Keyword(word)) => is_value_keyword(word),
            _ => false,
        }
    }

    /// Parse an untyped value.
    pub(super) fn parse_value(&mut self) -> ParseResult<ValueAst> {
        let token = self.next_token("expected value")?;
        let constant = match token {
            Token::LocalName(name) => return Ok(ValueAst::Local(Symbol::Named(name))),
            Token::LocalId(n) => return Ok(ValueAst::Local(Symbol::Numbered(n))),
            Token::GlobalName(name) => return Ok(ValueAst::Global(Symbol::Named(name))),
            Token::GlobalId(n) => return Ok(ValueAst::Global(Symbol::Numbered(n))),
            Token::Integer(v) => ConstAst::Int(v),
            Token::Float(v) => ConstAst::Float(v.to_bits()),
            Token::HexFloat(bits) => ConstAst::Float(bits),
            Token::CStringLit(bytes) => ConstAst::CString(bytes),
            Token::LBracket => ConstAst::Array(self.parse_typed_list(&Token::RBracket)?),
            Token::LBrace => ConstAst::Struct(self.parse_typed_list(&Token::RBrace)?),
            Token::Less => {
                self.expect(Token::LBrace)?;
                let fields = self.parse_typed_list(&Token::RBrace)?;
                self.expect(Token::Greater)?;
                ConstAst::Struct(fields)
            }
            Token::Keyword(word) => self.parse_keyword_constant(word)?,
            other => return Err(self.unexpected("value", &other)),
        };
        Ok(ValueAst::Const(constant))
    }

    fn parse_keyword_constant(&mut self, word: String) -> ParseResult<ConstAst> {
        match word.as_str() {
            "true" => Ok(ConstAst::Bool(true)),
            "false" => Ok(ConstAst::Bool(false)),
            "null" => Ok(ConstAst::Null),
            "undef" | "poison" => Ok(ConstAst::Undef),
            "zeroinitializer" => Ok(ConstAst::ZeroInit),
            "getelementptr" => {
                let inbounds = self.consume_keyword("inbounds");
                self.expect(Token::LParen)?;
                let source = self.parse_type()?;
                self.expect(Token::Comma)?;
                let base = self.parse_typed_value()?;
                let mut indices = Vec::new();
                while self.consume(&Token::Comma) {
                    indices.push(self.parse_typed_value()?);
                }
                self.expect(Token::RParen)?;
                Ok(ConstAst::GetElementPtr {
                    inbounds,
                    source,
                    base: Box::new(base),
                    indices,
                })
            }
            _ => match CastOp::from_name(&word) {
                Some(op) => {
                    self.expect(Token::LParen)?;
                    let value = self.parse_typed_value()?;
                    self.expect_keyword("to")?;
                    let to = self.parse_type()?;
                    self.expect(Token::RParen)?;
                    Ok(ConstAst::Cast {
                        op,
                        value: Box::new(value),
                        to,
                    })
                }
                None => Err(self.unexpected("constant", &Token::Keyword(word))),
            },
        }
    }

    /// Comma separated typed values up to and including `close`.
    fn parse_typed_list(&mut self, close: &Token) -> ParseResult<Vec<TypedValue>> {
        let mut values = Vec::new();
        if self.consume(close) {
            return Ok(values);
        }
        loop {
            values.push(self.parse_typed_value()?);
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(close.clone())?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(source: &str) -> Parser {
        Parser::new(source).unwrap()
    }

    #[test]
    fn test_parse_pointer_and_array_types() {
        assert_eq!(parser("%Qubit**").parse_type().unwrap(), Type::named_ptr("Qubit").ptr());
        assert_eq!(
            parser("[3 x i8]*").parse_type().unwrap(),
            Type::Array(3, Box::new(Type::i8())).ptr()
        );
        assert_eq!(
            parser("{ i64, %Array* }").parse_type().unwrap(),
            Type::Struct(vec![Type::i64(), Type::named_ptr("Array")])
        );
    }

    #[test]
    fn test_parse_function_type() {
        let ty = parser("void (i8*, ...)").parse_type().unwrap();
        let Type::Function(ft) = ty else {
            panic!("expected function type");
        };
        assert_eq!(ft.ret, Type::Void);
        assert_eq!(ft.params, vec![Type::i8().ptr()]);
        assert!(ft.var_arg);
    }

    #[test]
    fn test_parse_constant_expression() {
        let typed = parser("%Qubit* inttoptr (i64 3 to %Qubit*)")
            .parse_typed_value()
            .unwrap();
        let ValueAst::Const(ConstAst::Cast { op, to, .. }) = typed.value else {
            panic!("expected cast");
        };
        assert_eq!(op, CastOp::IntToPtr);
        assert_eq!(to, Type::named_ptr("Qubit"));
    }

    #[test]
    fn test_param_attributes_are_skipped() {
        let typed = parser("i8* nocapture readonly align 1 %msg")
            .parse_typed_value()
            .unwrap();
        assert!(matches!(typed.value, ValueAst::Local(Symbol::Named(ref n)) if n == "msg"));
    }
}
