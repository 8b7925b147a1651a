//! Lexer for textual LLVM IR.

use logos::Logos;

/// Tokens of the textual IR.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r";[^\n]*")]
pub enum Token {
    // Symbols
    #[regex(r"%[-a-zA-Z$._][-a-zA-Z$._0-9]*", |lex| lex.slice()[1..].to_string())]
    #[regex(r#"%"[^"]*""#, |lex| unescape(strip_quotes(&lex.slice()[1..])))]
    LocalName(String),

    #[regex(r"%[0-9]+", |lex| lex.slice()[1..].parse::<u32>().ok())]
    LocalId(u32),

    #[regex(r"@[-a-zA-Z$._][-a-zA-Z$._0-9]*", |lex| lex.slice()[1..].to_string())]
    #[regex(r#"@"[^"]*""#, |lex| unescape(strip_quotes(&lex.slice()[1..])))]
    GlobalName(String),

    #[regex(r"@[0-9]+", |lex| lex.slice()[1..].parse::<u32>().ok())]
    GlobalId(u32),

    #[regex(r"#[0-9]+", |lex| lex.slice()[1..].parse::<u32>().ok())]
    AttrGroupId(u32),

    #[regex(r"![-a-zA-Z$._][-a-zA-Z$._0-9]*", |lex| lex.slice()[1..].to_string())]
    MetadataName(String),

    #[regex(r"![0-9]+", |lex| lex.slice()[1..].parse::<u32>().ok())]
    MetadataId(u32),

    #[token("!")]
    Exclaim,

    // Labels
    #[regex(r"[-a-zA-Z$._][-a-zA-Z$._0-9]*:", |lex| {
        let s = lex.slice();
        s[..s.len() - 1].to_string()
    })]
    #[regex(r#""[^"]*":"#, |lex| {
        let s = lex.slice();
        unescape(strip_quotes(&s[..s.len() - 1]))
    })]
    LabelDef(String),

    #[regex(r"[0-9]+:", |lex| {
        let s = lex.slice();
        s[..s.len() - 1].parse::<u32>().ok()
    })]
    LabelId(u32),

    // Literals
    #[regex(r"i[0-9]+", |lex| lex.slice()[1..].parse::<u32>().ok(), priority = 3)]
    IntType(u32),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i128>().ok())]
    Integer(i128),

    #[regex(r"[-+]?[0-9]+\.[0-9]*([eE][-+]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"0x[0-9A-Fa-f]+", |lex| u64::from_str_radix(&lex.slice()[2..], 16).ok())]
    HexFloat(u64),

    #[regex(r#""[^"]*""#, |lex| unescape(strip_quotes(lex.slice())))]
    StringLit(String),

    #[regex(r#"c"[^"]*""#, |lex| unescape_bytes(strip_quotes(&lex.slice()[1..])))]
    CStringLit(Vec<u8>),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_.]*", |lex| lex.slice().to_string())]
    Keyword(String),

    // Punctuation
    #[token("=")]
    Equals,

    #[token(",")]
    Comma,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("<")]
    Less,

    #[token(">")]
    Greater,

    #[token("*")]
    Star,

    #[token("...")]
    Ellipsis,
}

impl Token {
    /// Check whether the token is the given bare keyword.
    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(self, Token::Keyword(k) if k == word)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::LocalName(s) => write!(f, "%{s}"),
            Token::LocalId(n) => write!(f, "%{n}"),
            Token::GlobalName(s) => write!(f, "@{s}"),
            Token::GlobalId(n) => write!(f, "@{n}"),
            Token::AttrGroupId(n) => write!(f, "#{n}"),
            Token::MetadataName(s) => write!(f, "!{s}"),
            Token::MetadataId(n) => write!(f, "!{n}"),
            Token::Exclaim => write!(f, "!"),
            Token::LabelDef(s) => write!(f, "{s}:"),
            Token::LabelId(n) => write!(f, "{n}:"),
            Token::IntType(bits) => write!(f, "i{bits}"),
            Token::Integer(v) => write!(f, "{v}"),
            Token::Float(v) => write!(f, "{v}"),
            Token::HexFloat(v) => write!(f, "0x{v:016X}"),
            Token::StringLit(s) => write!(f, "\"{s}\""),
            Token::CStringLit(bytes) => write!(f, "c\"{}\"", String::from_utf8_lossy(bytes)),
            Token::Keyword(s) => write!(f, "{s}"),
            Token::Equals => write!(f, "="),
            Token::Comma => write!(f, ","),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Less => write!(f, "<"),
            Token::Greater => write!(f, ">"),
            Token::Star => write!(f, "*"),
            Token::Ellipsis => write!(f, "..."),
        }
    }
}

fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Decode `\XX` hex escapes and `\\`.
fn unescape_bytes(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if bytes.get(i + 1) == Some(&b'\\') {
                out.push(b'\\');
                i += 2;
                continue;
            }
            if let Some(hex) = s.get(i + 1..i + 3) {
                if let Ok(b) = u8::from_str_radix(hex, 16) {
                    out.push(b);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn unescape(s: &str) -> String {
    String::from_utf8_lossy(&unescape_bytes(s)).into_owned()
}

/// A token with its source span and line number.
#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: std::ops::Range<usize>,
    pub line: usize,
}

/// Tokenize source code. Errors carry the line number and a message.
pub fn tokenize(source: &str) -> Vec<Result<SpannedToken, (usize, String)>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut counted = 0;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        line += source[counted..span.start].matches('\n').count();
        counted = span.start;
        if let Ok(token) = result {
            tokens.push(Ok(SpannedToken { token, span, line }));
        } else {
            let slice = &source[span.clone()];
            tokens.push(Err((line, format!("Invalid token: '{slice}'"))));
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        tokenize(source)
            .into_iter()
            .filter_map(Result::ok)
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_call_line() {
        let toks = tokens("%0 = call %Qubit* @__quantum__rt__qubit_allocate() ; comment");
        assert_eq!(
            toks,
            vec![
                Token::LocalId(0),
                Token::Equals,
                Token::Keyword("call".into()),
                Token::LocalName("Qubit".into()),
                Token::Star,
                Token::GlobalName("__quantum__rt__qubit_allocate".into()),
                Token::LParen,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_int_type_beats_keyword() {
        assert_eq!(
            tokens("i64 inbounds i1"),
            vec![
                Token::IntType(64),
                Token::Keyword("inbounds".into()),
                Token::IntType(1)
            ]
        );
    }

    #[test]
    fn test_labels_and_literals() {
        let toks = tokens("then0__1:\n  7: br label %\"x y\"\n c\"ab\\00\" -3 1.5e+00 0x3FF0000000000000");
        assert_eq!(toks[0], Token::LabelDef("then0__1".into()));
        assert_eq!(toks[1], Token::LabelId(7));
        assert_eq!(toks[4], Token::LocalName("x y".into()));
        assert_eq!(toks[5], Token::CStringLit(vec![b'a', b'b', 0]));
        assert_eq!(toks[6], Token::Integer(-3));
        assert_eq!(toks[7], Token::Float(1.5));
        assert_eq!(toks[8], Token::HexFloat(0x3FF0_0000_0000_0000));
    }

    #[test]
    fn test_line_numbers() {
        let spanned: Vec<_> = tokenize("a\n\nb c\nd").into_iter().filter_map(Result::ok).collect();
        let lines: Vec<_> = spanned.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 3, 3, 4]);
    }

    #[test]
    fn test_invalid_token() {
        let results = tokenize("define ?");
        assert!(results.iter().any(Result::is_err));
    }
}
