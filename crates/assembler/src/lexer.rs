//! Tokenization for assembly language.
//!
//! Uses the logos crate for fast lexical analysis. The grammar is line
//! oriented, so newlines are tokens.

use logos::Logos;
use std::ops::Range;
use thiserror::Error;
use zzvm_core::Register;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid token at line {line}: '{found}'")]
pub struct LexError {
    pub found: String,
    pub line: usize,
}

/// Token types for assembly language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
pub enum Token {
    #[token("\n")]
    Newline,

    // ========== Registers ==========
    #[regex(r"ra|r[1-5]|sp|ip", parse_register, priority = 10, ignore(ascii_case))]
    Register(Register),

    // ========== Numbers ==========
    #[regex(r"-?[0-9]+", parse_decimal)]
    #[regex(r"#-?[0-9]+", parse_hash_decimal)]
    Number(i64),

    #[regex(r"-?0[xX][0-9a-fA-F]+", parse_hex)]
    HexNumber(i64),

    // ========== Identifiers (labels, instructions) ==========
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    /// `$name`, a reference to a label.
    #[regex(r"\$[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice()[1..].to_string())]
    Symbol(String),

    // ========== Directives ==========
    #[regex(r"\.[a-zA-Z]+", |lex| lex.slice()[1..].to_ascii_lowercase())]
    Directive(String),

    /// A quoted string with escapes already applied.
    #[regex(r#""([^"\\\n]|\\.)*""#, parse_string)]
    Str(Vec<u8>),

    // ========== Symbols ==========
    #[token(",")]
    Comma,

    #[token(":")]
    Colon,

    #[token("+")]
    Plus,

    // ========== Comments (skipped) ==========
    #[regex(r";[^\n]*", logos::skip)]
    Comment,
}

fn parse_register(lex: &mut logos::Lexer<Token>) -> Option<Register> {
    Register::from_name(lex.slice())
}

fn parse_decimal(lex: &mut logos::Lexer<Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

/// `#123` is an explicit decimal.
fn parse_hash_decimal(lex: &mut logos::Lexer<Token>) -> Option<i64> {
    lex.slice()[1..].parse().ok()
}

fn parse_hex(lex: &mut logos::Lexer<Token>) -> Option<i64> {
    let slice = lex.slice();
    let (negative, digits) = match slice.strip_prefix('-') {
        Some(rest) => (true, &rest[2..]),
        None => (false, &slice[2..]),
    };
    let value = i64::from_str_radix(digits, 16).ok()?;
    Some(if negative { -value } else { value })
}

fn parse_string(lex: &mut logos::Lexer<Token>) -> Option<Vec<u8>> {
    let slice = lex.slice();
    unescape(&slice[1..slice.len() - 1])
}

/// Apply C-style escapes: `\n \r \t \0 \\ \" \' \xHH`.
pub fn unescape(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes();

    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let escaped = match bytes.next()? {
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'0' => 0,
            b'\\' => b'\\',
            b'"' => b'"',
            b'\'' => b'\'',
            b'x' => {
                let hi = (bytes.next()? as char).to_digit(16)?;
                let lo = (bytes.next()? as char).to_digit(16)?;
                (hi * 16 + lo) as u8
            }
            _ => return None,
        };
        out.push(escaped);
    }

    Some(out)
}

/// A token with its line number and byte range in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub span: Range<usize>,
}

/// Lexer wrapper that tracks line numbers
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
    source: &'source str,
    last_pos: usize,
    line: usize,
}

impl<'source> Lexer<'source> {
    /// Create a new lexer for the given source
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
            source,
            last_pos: 0,
            line: 1,
        }
    }

    /// Advance the line counter to `pos`.
    fn line_at_pos(&mut self, pos: usize) -> usize {
        self.line += self.source[self.last_pos..pos]
            .bytes()
            .filter(|b| *b == b'\n')
            .count();
        self.last_pos = pos;
        self.line
    }
}

impl<'source> Iterator for Lexer<'source> {
    type Item = Result<Spanned, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.inner.next()?;
        let span = self.inner.span();
        let line = self.line_at_pos(span.start);

        Some(match token {
            Ok(token) => Ok(Spanned { token, line, span }),
            Err(()) => Err(LexError {
                found: self.inner.slice().to_string(),
                line,
            }),
        })
    }
}
