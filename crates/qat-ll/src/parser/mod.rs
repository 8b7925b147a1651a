//! Parser for textual LLVM IR.

mod instruction;
mod lowering;
mod toplevel;
mod value;

pub(crate) use lowering::lower_to_module;

use qat_ir::Module;

use crate::ast::ModuleAst;
use crate::error::{ParseError, ParseResult};
use crate::lexer::{SpannedToken, Token, tokenize};

/// Parse textual IR into a module.
pub fn parse(source: &str) -> ParseResult<Module> {
    let mut parser = Parser::new(source)?;
    let ast = parser.parse_module()?;
    lower_to_module(&ast)
}

/// Parse textual IR into its syntax tree without resolving names.
pub fn parse_ast(source: &str) -> ParseResult<ModuleAst> {
    let mut parser = Parser::new(source)?;
    parser.parse_module()
}

/// Parser state.
pub(super) struct Parser {
    pub(super) tokens: Vec<SpannedToken>,
    pub(super) pos: usize,
    pub(super) line: usize,
}

#[allow(clippy::unnecessary_wraps)]
impl Parser {
    /// Create a new parser from source.
    fn new(source: &str) -> ParseResult<Self> {
        let mut tokens = Vec::new();
        for result in tokenize(source) {
            match result {
                Ok(t) => tokens.push(t),
                Err((line, message)) => return Err(ParseError::LexerError { line, message }),
            }
        }
        Ok(Self {
            tokens,
            pos: 0,
            line: 1,
        })
    }

    /// Check if we've reached the end.
    pub(super) fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Peek at the current token.
    pub(super) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    /// Peek `n` tokens ahead of the current one.
    pub(super) fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|t| &t.token)
    }

    /// Advance and return the current token.
    pub(super) fn advance(&mut self) -> Option<Token> {
        let spanned = self.tokens.get(self.pos)?;
        self.line = spanned.line;
        let token = spanned.token.clone();
        self.pos += 1;
        Some(token)
    }

    /// Advance, failing at the end of input.
    pub(super) fn next_token(&mut self, context: &str) -> ParseResult<Token> {
        self.advance()
            .ok_or_else(|| ParseError::UnexpectedEof(context.to_string()))
    }

    /// Expect a specific token.
    #[allow(clippy::needless_pass_by_value)]
    pub(super) fn expect(&mut self, expected: Token) -> ParseResult<()> {
        let found = self.next_token(&format!("expected {expected}"))?;
        if std::mem::discriminant(&found) != std::mem::discriminant(&expected) {
            return Err(self.unexpected(&expected.to_string(), &found));
        }
        Ok(())
    }

    /// Expect a bare keyword.
    pub(super) fn expect_keyword(&mut self, word: &str) -> ParseResult<()> {
        let found = self.next_token(&format!("expected '{word}'"))?;
        if !found.is_keyword(word) {
            return Err(self.unexpected(&format!("'{word}'"), &found));
        }
        Ok(())
    }

    /// Check if current token matches.
    pub(super) fn check(&self, token: &Token) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(t) == std::mem::discriminant(token))
    }

    /// Check if the current token is the given keyword.
    pub(super) fn check_keyword(&self, word: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(word))
    }

    /// Consume token if it matches.
    pub(super) fn consume(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume the keyword if it is next.
    pub(super) fn consume_keyword(&mut self, word: &str) -> bool {
        if self.check_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Build an unexpected-token error at the current line.
    pub(super) fn unexpected(&self, expected: &str, found: &Token) -> ParseError {
        ParseError::UnexpectedToken {
            line: self.line,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Parse an unsigned integer literal.
    pub(super) fn parse_u32(&mut self) -> ParseResult<u32> {
        match self.next_token("expected integer")? {
            Token::Integer(v) => u32::try_from(v).map_err(|_| ParseError::IntegerOutOfRange {
                line: self.line,
                literal: v.to_string(),
            }),
            other => Err(self.unexpected("integer", &other)),
        }
    }

    /// Parse a string literal.
    pub(super) fn parse_string(&mut self) -> ParseResult<String> {
        match self.next_token("expected string")? {
            Token::StringLit(s) => Ok(s),
            other => Err(self.unexpected("string", &other)),
        }
    }

    /// Skip a balanced bracketed group whose opening token is next.
    pub(super) fn skip_group(&mut self) -> ParseResult<()> {
        let mut depth = 0_usize;
        loop {
            let token = self.next_token("unterminated group")?;
            match token {
                Token::LParen | Token::LBrace | Token::LBracket | Token::Less => depth += 1,
                Token::RParen | Token::RBrace | Token::RBracket | Token::Greater => {
                    depth = depth.saturating_sub(1);
                }
                _ => {}
            }
            if depth == 0 {
                return Ok(());
            }
        }
    }

    /// Skip a metadata value such as `!12`, `!{...}`, `!"text"` or `!DILocation(...)`.
    pub(super) fn skip_metadata_value(&mut self) -> ParseResult<()> {
        self.consume_keyword("distinct");
        match self.next_token("expected metadata")? {
            Token::MetadataId(_) => Ok(()),
            Token::MetadataName(_) => {
                if self.check(&Token::LParen) {
                    self.skip_group()?;
                }
                Ok(())
            }
            Token::Exclaim => match self.peek() {
                Some(Token::LBrace) => self.skip_group(),
                Some(Token::StringLit(_)) => {
                    self.advance();
                    Ok(())
                }
                _ => Ok(()),
            },
            other => Err(self.unexpected("metadata", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{OpAst, Symbol};

    #[test]
    fn test_parse_ast_counts() {
        let source = r#"
%Qubit = type opaque

define void @Main() #0 {
entry:
  %q = call %Qubit* @__quantum__rt__qubit_allocate()
  ret void
}

declare %Qubit* @__quantum__rt__qubit_allocate()

attributes #0 = { "EntryPoint" }
"#;
        let ast = parse_ast(source).unwrap();
        assert_eq!(ast.named_types.len(), 1);
        assert_eq!(ast.functions.len(), 2);
        assert_eq!(ast.attribute_groups.len(), 1);

        let main = &ast.functions[0];
        assert_eq!(main.attribute_groups, vec![0]);
        assert_eq!(main.blocks[0].label, Some(Symbol::Named("entry".into())));
        assert!(matches!(main.blocks[0].instructions[0].op, OpAst::Call { .. }));
        assert!(ast.functions[1].blocks.is_empty());
    }

    #[test]
    fn test_unknown_instruction_is_reported_with_line() {
        let source = "define void @f() {\nentry:\n  frobnicate i64 1\n  ret void\n}\n";
        match parse_ast(source) {
            Err(ParseError::UnknownInstruction { opcode, line }) => {
                assert_eq!(opcode, "frobnicate");
                assert_eq!(line, 3);
            }
            other => panic!("expected unknown instruction, got {other:?}"),
        }
    }

    #[test]
    fn test_metadata_is_skipped() {
        let source = r#"
define void @f() !dbg !4 {
entry:
  ret void, !dbg !7
}
!llvm.module.flags = !{!0}
!0 = !{i32 2, !"Debug Info Version", i32 3}
!4 = distinct !DISubprogram(name: "f", line: 1)
"#;
        let ast = parse_ast(source).unwrap();
        assert_eq!(ast.functions[0].blocks[0].instructions.len(), 1);
    }
}
