//! Module-level entities: types, globals, functions and attribute groups.

use qat_ir::Attribute;

use super::Parser;
use crate::ast::{BlockAst, FunctionAst, GlobalAst, ModuleAst, Symbol};
use crate::error::{ParseError, ParseResult};
use crate::lexer::Token;

const LINKAGES: &[&str] = &[
    "private",
    "internal",
    "available_externally",
    "linkonce",
    "weak",
    "common",
    "appending",
    "extern_weak",
    "linkonce_odr",
    "weak_odr",
    "external",
];

fn is_toplevel_keyword(word: &str) -> bool {
    matches!(
        word,
        "define" | "declare" | "attributes" | "target" | "source_filename" | "module"
    )
}

impl Parser {
    /// Parse a whole module.
    pub(super) fn parse_module(&mut self) -> ParseResult<ModuleAst> {
        let mut module = ModuleAst::default();

        while let Some(token) = self.peek().cloned() {
            match token {
                Token::Keyword(word) => match word.as_str() {
                    "source_filename" => {
                        self.advance();
                        self.expect(Token::Equals)?;
                        module.source_filename = Some(self.parse_string()?);
                    }
                    "target" => {
                        self.advance();
                        let which = self.next_token("expected target property")?;
                        self.expect(Token::Equals)?;
                        let value = self.parse_string()?;
                        if which.is_keyword("datalayout") {
                            module.data_layout = Some(value);
                        } else if which.is_keyword("triple") {
                            module.target_triple = Some(value);
                        } else {
                            return Err(self.unexpected("datalayout or triple", &which));
                        }
                    }
                    "module" => {
                        self.advance();
                        self.expect_keyword("asm")?;
                        self.parse_string()?;
                    }
                    "define" => module.functions.push(self.parse_function(true)?),
                    "declare" => module.functions.push(self.parse_function(false)?),
                    "attributes" => module.attribute_groups.push(self.parse_attribute_group()?),
                    _ => return Err(self.unexpected("top-level entity", &Token::Keyword(word))),
                },
                Token::LocalName(_) | Token::LocalId(_) => {
                    let name = self.parse_local_symbol()?.key();
                    self.expect(Token::Equals)?;
                    self.expect_keyword("type")?;
                    let body = if self.consume_keyword("opaque") {
                        None
                    } else {
                        Some(self.parse_type()?)
                    };
                    module.named_types.push((name, body));
                }
                Token::GlobalName(_) | Token::GlobalId(_) => {
                    module.globals.push(self.parse_global()?);
                }
                Token::MetadataName(_) | Token::MetadataId(_) => {
                    self.advance();
                    self.expect(Token::Equals)?;
                    self.skip_metadata_value()?;
                }
                other => {
                    self.advance();
                    return Err(self.unexpected("top-level entity", &other));
                }
            }
        }

        Ok(module)
    }

    fn parse_global_symbol(&mut self) -> ParseResult<Symbol> {
        match self.next_token("expected global name")? {
            Token::GlobalName(name) => Ok(Symbol::Named(name)),
            Token::GlobalId(n) => Ok(Symbol::Numbered(n)),
            other => Err(self.unexpected("global name", &other)),
        }
    }

    fn parse_global(&mut self) -> ParseResult<GlobalAst> {
        let name = self.parse_global_symbol()?;
        self.expect(Token::Equals)?;

        let mut linkage = None;
        let mut unnamed_addr = None;
        let constant = loop {
            let token = self.next_token("expected 'global' or 'constant'")?;
            let Token::Keyword(word) = token else {
                return Err(self.unexpected("'global' or 'constant'", &token));
            };
            match word.as_str() {
                "global" => break false,
                "constant" => break true,
                "unnamed_addr" | "local_unnamed_addr" => unnamed_addr = Some(word),
                w if LINKAGES.contains(&w) => linkage = Some(word),
                _ => {
                    if self.check(&Token::LParen) {
                        self.skip_group()?;
                    }
                }
            }
        };

        let ty = self.parse_type()?;
        let initializer = if self.at_value_start() {
            Some(self.parse_value()?)
        } else {
            None
        };

        let mut align = None;
        while self.consume(&Token::Comma) {
            match self.next_token("expected global property")? {
                Token::Keyword(word) if word == "align" => align = Some(self.parse_u32()?),
                Token::Keyword(word) if word == "section" || word == "partition" => {
                    self.parse_string()?;
                }
                Token::Keyword(word) if word == "comdat" => {
                    if self.check(&Token::LParen) {
                        self.skip_group()?;
                    }
                }
                Token::MetadataName(_) => self.skip_metadata_value()?,
                other => return Err(self.unexpected("global property", &other)),
            }
        }

        Ok(GlobalAst {
            name,
            ty,
            linkage,
            unnamed_addr,
            constant,
            initializer,
            align,
        })
    }

    fn parse_function(&mut self, define: bool) -> ParseResult<FunctionAst> {
        self.advance();

        let mut linkage = None;
        while let Some(Token::Keyword(word)) = self.peek() {
            if super::value::is_type_keyword(word) {
                break;
            }
            if LINKAGES.contains(&word.as_str()) {
                linkage = Some(word.clone());
            }
            self.advance();
            if self.check(&Token::LParen) {
                self.skip_group()?;
            }
        }

        let ret = self.parse_type()?;
        let name = match self.parse_global_symbol()? {
            Symbol::Named(name) => name,
            Symbol::Numbered(n) => n.to_string(),
        };

        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        let mut var_arg = false;
        while !self.consume(&Token::RParen) {
            if self.consume(&Token::Ellipsis) {
                var_arg = true;
            } else {
                let ty = self.parse_type()?;
                self.skip_param_attributes()?;
                let symbol = match self.peek() {
                    Some(Token::LocalName(_) | Token::LocalId(_)) => Some(self.parse_local_symbol()?),
                    _ => None,
                };
                params.push((ty, symbol));
            }
            if !self.consume(&Token::Comma) {
                self.expect(Token::RParen)?;
                break;
            }
        }

        let mut unnamed_addr = None;
        let mut attributes = Vec::new();
        let mut attribute_groups = Vec::new();
        loop {
            match self.peek().cloned() {
                Some(Token::Keyword(word)) => {
                    if is_toplevel_keyword(&word) {
                        break;
                    }
                    self.advance();
                    match word.as_str() {
                        "unnamed_addr" | "local_unnamed_addr" => unnamed_addr = Some(word),
                        "section" | "gc" | "partition" => {
                            self.parse_string()?;
                        }
                        "align" => {
                            self.parse_u32()?;
                        }
                        "personality" | "prefix" | "prologue" => {
                            self.parse_typed_value()?;
                        }
                        "comdat" => {
                            if self.check(&Token::LParen) {
                                self.skip_group()?;
                            }
                        }
                        _ => attributes.push(self.parse_keyword_attribute(word)?),
                    }
                }
                Some(Token::AttrGroupId(n)) => {
                    self.advance();
                    attribute_groups.push(n);
                }
                Some(Token::StringLit(_)) => attributes.push(self.parse_string_attribute()?),
                Some(Token::MetadataName(_)) if !matches!(self.peek_nth(1), Some(Token::Equals)) => {
                    self.advance();
                    self.skip_metadata_value()?;
                }
                _ => break,
            }
        }

        let blocks = if define {
            self.expect(Token::LBrace)?;
            self.parse_blocks()?
        } else {
            Vec::new()
        };

        Ok(FunctionAst {
            name,
            ret,
            params,
            var_arg,
            linkage,
            unnamed_addr,
            attributes,
            attribute_groups,
            blocks,
        })
    }

    /// Basic blocks up to and including the closing `}` of a function body.
    fn parse_blocks(&mut self) -> ParseResult<Vec<BlockAst>> {
        let mut blocks = Vec::new();
        let mut current: Option<BlockAst> = None;

        loop {
            let label = match self.peek() {
                None => return Err(ParseError::UnexpectedEof("expected '}'".into())),
                Some(Token::RBrace) => {
                    self.advance();
                    break;
                }
                Some(Token::LabelDef(name)) => Some(Symbol::Named(name.clone())),
                Some(Token::LabelId(n)) => Some(Symbol::Numbered(*n)),
                Some(_) => None,
            };

            if let Some(label) = label {
                self.advance();
                blocks.extend(current.take());
                current = Some(BlockAst {
                    label: Some(label),
                    instructions: Vec::new(),
                });
            } else {
                let instruction = self.parse_instruction()?;
                current
                    .get_or_insert_with(|| BlockAst {
                        label: None,
                        instructions: Vec::new(),
                    })
                    .instructions
                    .push(instruction);
            }
        }

        blocks.extend(current);
        Ok(blocks)
    }

    /// `attributes #N = { ... }`.
    fn parse_attribute_group(&mut self) -> ParseResult<(u32, Vec<Attribute>)> {
        self.advance();
        let id = match self.next_token("expected attribute group id")? {
            Token::AttrGroupId(n) => n,
            other => return Err(self.unexpected("attribute group id", &other)),
        };
        self.expect(Token::Equals)?;
        self.expect(Token::LBrace)?;

        let mut attributes = Vec::new();
        loop {
            match self.peek().cloned() {
                Some(Token::RBrace) => {
                    self.advance();
                    break;
                }
                Some(Token::StringLit(_)) => attributes.push(self.parse_string_attribute()?),
                Some(Token::Keyword(word)) => {
                    self.advance();
                    attributes.push(self.parse_keyword_attribute(word)?);
                }
                Some(other) => return Err(self.unexpected("attribute", &other)),
                None => return Err(ParseError::UnexpectedEof("expected '}'".into())),
            }
        }
        Ok((id, attributes))
    }

    /// `"key"` or `"key"="value"`.
    fn parse_string_attribute(&mut self) -> ParseResult<Attribute> {
        let key = self.parse_string()?;
        if self.consume(&Token::Equals) {
            Ok(Attribute::pair(key, self.parse_string()?))
        } else {
            Ok(Attribute::flag(key))
        }
    }

    /// A keyword attribute whose keyword was just consumed, with an optional
    /// `(args)` or `=value` suffix kept verbatim.
    fn parse_keyword_attribute(&mut self, word: String) -> ParseResult<Attribute> {
        let mut text = word;
        if self.check(&Token::LParen) {
            let start = self.pos;
            self.skip_group()?;
            for spanned in &self.tokens[start..self.pos] {
                if spanned.token == Token::Comma {
                    text.push_str(", ");
                } else {
                    text.push_str(&spanned.token.to_string());
                }
            }
        } else if self.consume(&Token::Equals) {
            let value = self.next_token("expected attribute value")?;
            text.push('=');
            text.push_str(&value.to_string());
        }
        Ok(Attribute::Keyword(text))
    }
}
