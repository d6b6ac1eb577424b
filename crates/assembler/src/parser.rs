//! Parse assembly into Abstract Syntax Tree (AST).

use crate::lexer::{LexError, Lexer, Spanned, Token};
use thiserror::Error;
use zzvm_core::{Opcode, Register};

/// Parse errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("unexpected token at line {line}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
    },

    #[error("unexpected end of input at line {line}: expected {expected}")]
    UnexpectedEof { expected: String, line: usize },

    #[error("unknown instruction at line {line}: {name}")]
    UnknownInstruction { name: String, line: usize },

    #[error("unknown directive at line {line}: .{name}")]
    UnknownDirective { name: String, line: usize },

    #[error("invalid data at line {line}: {text}")]
    InvalidData { text: String, line: usize },
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Top-level program structure. Each statement carries its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<(Statement, usize)>,
    pub entry_point: Option<Operand>,
}

/// Statement types
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Label(String),
    Instruction(Instruction),
    Directive(Directive),
}

/// Directive types
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// `.sect NAME [hexaddr]`
    Sect { name: String, address: Option<u16> },
    /// `.entry target`
    Entry(Operand),
    /// `.align n`
    Align(i64),
    /// `.db 41, 42, ...` (hex bytes)
    Db(Vec<u8>),
    /// `.zero n`
    Zero(i64),
    /// `.str "text"`
    Str(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Register(Register),
    Number(i64),
    /// `$name` or `$name+offset`
    Symbol { name: String, offset: i64 },
}

/// The opcode of a source instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Op(Opcode),
    /// `JMP target`, shorthand for `ADDI IP, IP, target`.
    Jmp,
}

/// A source instruction before operand checking.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
}

/// Parser state
pub struct Parser<'source> {
    tokens: Vec<Spanned>,
    position: usize,
    source: &'source str,
}

impl<'source> Parser<'source> {
    /// Create a new parser
    pub fn new(source: &'source str) -> Result<Self> {
        let tokens = Lexer::new(source).collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            tokens,
            position: 0,
            source,
        })
    }

    /// Parse the entire program
    pub fn parse(source: &'source str) -> Result<Program> {
        let mut parser = Self::new(source)?;
        parser.parse_program()
    }

    fn parse_program(&mut self) -> Result<Program> {
        let mut statements = Vec::new();
        let mut entry_point = None;

        while let Some(next) = self.peek() {
            let line = next.line;
            if next.token == Token::Newline {
                self.advance();
                continue;
            }

            let stmt = self.parse_statement()?;

            if let Statement::Directive(Directive::Entry(ref target)) = stmt {
                entry_point = Some(target.clone());
            }

            statements.push((stmt, line));
        }

        Ok(Program {
            statements,
            entry_point,
        })
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        let Spanned { token, line, span } = self.expect_any("statement")?;

        match token {
            Token::Directive(name) => self.parse_directive(&name, line, span.end),
            Token::Identifier(name) => {
                if self.peek().map(|t| &t.token) == Some(&Token::Colon) {
                    self.advance();
                    return Ok(Statement::Label(name));
                }
                let inst = self.parse_instruction(&name, line)?;
                Ok(Statement::Instruction(inst))
            }
            other => Err(ParseError::UnexpectedToken {
                expected: "instruction, label or directive".to_string(),
                found: describe(&other),
                line,
            }),
        }
    }

    fn parse_directive(&mut self, name: &str, line: usize, end: usize) -> Result<Statement> {
        let directive = match name {
            "sect" => {
                let text = self.rest_of_line(end);
                let mut words = text.split_whitespace();
                let name = words
                    .next()
                    .ok_or_else(|| ParseError::UnexpectedEof {
                        expected: "section name".to_string(),
                        line,
                    })?
                    .to_ascii_uppercase();
                let address = words
                    .next()
                    .map(|word| parse_hex_word(word, line))
                    .transpose()?;
                Directive::Sect { name, address }
            }
            "db" => {
                let text = self.rest_of_line(end);
                let bytes = text
                    .split(',')
                    .map(|item| {
                        let item = item.trim();
                        let digits = item.strip_prefix("0x").unwrap_or(item);
                        u8::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidData {
                            text: item.to_string(),
                            line,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Directive::Db(bytes)
            }
            "entry" => Directive::Entry(self.parse_operand()?),
            "align" => Directive::Align(self.expect_number()?),
            "zero" => Directive::Zero(self.expect_number()?),
            "str" => match self.expect_any("string")? {
                Spanned {
                    token: Token::Str(bytes),
                    ..
                } => Directive::Str(bytes),
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "string".to_string(),
                        found: describe(&other.token),
                        line: other.line,
                    })
                }
            },
            _ => {
                return Err(ParseError::UnknownDirective {
                    name: name.to_string(),
                    line,
                })
            }
        };

        self.expect_line_end()?;
        Ok(Statement::Directive(directive))
    }

    fn parse_instruction(&mut self, name: &str, line: usize) -> Result<Instruction> {
        let mnemonic = if name.eq_ignore_ascii_case("JMP") {
            Mnemonic::Jmp
        } else {
            let opcode = Opcode::from_name(name).ok_or_else(|| ParseError::UnknownInstruction {
                name: name.to_string(),
                line,
            })?;
            Mnemonic::Op(opcode)
        };

        let mut operands = Vec::new();
        if !self.at_line_end() {
            operands.push(self.parse_operand()?);
            while self.peek().map(|t| &t.token) == Some(&Token::Comma) {
                self.advance();
                operands.push(self.parse_operand()?);
            }
        }
        self.expect_line_end()?;

        Ok(Instruction { mnemonic, operands })
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        let next = self.expect_any("operand")?;
        match next.token {
            Token::Register(r) => Ok(Operand::Register(r)),
            Token::Number(n) | Token::HexNumber(n) => Ok(Operand::Number(n)),
            Token::Symbol(name) => {
                let mut offset = 0;
                if self.peek().map(|t| &t.token) == Some(&Token::Plus) {
                    self.advance();
                    offset = self.expect_number()?;
                }
                Ok(Operand::Symbol { name, offset })
            }
            Token::Identifier(name) => Err(ParseError::UnexpectedToken {
                expected: "register, number or $symbol".to_string(),
                found: format!("identifier '{}'", name),
                line: next.line,
            }),
            other => Err(ParseError::UnexpectedToken {
                expected: "register, number or $symbol".to_string(),
                found: describe(&other),
                line: next.line,
            }),
        }
    }

    /// Raw source text after a directive up to the end of its line,
    /// without the comment. The line's tokens are consumed.
    fn rest_of_line(&mut self, start: usize) -> &'source str {
        let source: &'source str = self.source;
        let tail = &source[start..];
        let end = tail.find('\n').unwrap_or(tail.len());
        let text = &tail[..end];
        let text = text.split(';').next().unwrap_or("");

        while !self.at_line_end() {
            self.advance();
        }
        text.trim()
    }

    /// Expect a number
    fn expect_number(&mut self) -> Result<i64> {
        let next = self.expect_any("number")?;
        match next.token {
            Token::Number(n) | Token::HexNumber(n) => Ok(n),
            other => Err(ParseError::UnexpectedToken {
                expected: "number".to_string(),
                found: describe(&other),
                line: next.line,
            }),
        }
    }

    fn expect_any(&mut self, expected: &str) -> Result<Spanned> {
        let line = self.current_line();
        self.advance().ok_or_else(|| ParseError::UnexpectedEof {
            expected: expected.to_string(),
            line,
        })
    }

    fn expect_line_end(&mut self) -> Result<()> {
        match self.advance() {
            None
            | Some(Spanned {
                token: Token::Newline,
                ..
            }) => Ok(()),
            Some(other) => Err(ParseError::UnexpectedToken {
                expected: "end of line".to_string(),
                found: describe(&other.token),
                line: other.line,
            }),
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(Spanned {
                token: Token::Newline,
                ..
            })
        )
    }

    /// Advance to next token
    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Peek at current token
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.position)
    }

    fn current_line(&self) -> usize {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }
}

/// Parse a bare hex word such as `4000` or `0x4000`.
fn parse_hex_word(word: &str, line: usize) -> Result<u16> {
    let digits = word.strip_prefix("0x").unwrap_or(word);
    u16::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidData {
        text: word.to_string(),
        line,
    })
}

fn describe(token: &Token) -> String {
    match token {
        Token::Newline => "end of line".to_string(),
        Token::Identifier(name) => format!("identifier '{}'", name),
        other => format!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instructions(program: &Program) -> Vec<&Instruction> {
        program
            .statements
            .iter()
            .filter_map(|(s, _)| match s {
                Statement::Instruction(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_parse_simple() {
        let program = Parser::parse(".sect TEXT\nMOVI R1, 0x1234\nHLT").unwrap();

        assert_eq!(program.statements.len(), 3);
        assert_eq!(
            program.statements[0],
            (
                Statement::Directive(Directive::Sect {
                    name: "TEXT".to_string(),
                    address: None
                }),
                1
            )
        );
        assert_eq!(
            program.statements[1].0,
            Statement::Instruction(Instruction {
                mnemonic: Mnemonic::Op(Opcode::MOVI),
                operands: vec![Operand::Register(Register::R1), Operand::Number(0x1234)],
            })
        );
        assert_eq!(program.statements[2].1, 3);
    }

    #[test]
    fn test_parse_with_label() {
        let program = Parser::parse("main:\n    HLT").unwrap();
        assert_eq!(program.statements[0], (Statement::Label("main".to_string()), 1));
        assert_eq!(program.statements[1].1, 2);
    }

    #[test]
    fn test_label_and_instruction_on_one_line() {
        let program = Parser::parse("loop: NOP").unwrap();
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn test_parse_jmp_and_symbols() {
        let program = Parser::parse("JMP $end\nCALL $table+0x10\njni r2, ra, -16").unwrap();
        let ins = instructions(&program);

        assert_eq!(ins[0].mnemonic, Mnemonic::Jmp);
        assert_eq!(
            ins[0].operands,
            vec![Operand::Symbol {
                name: "end".to_string(),
                offset: 0
            }]
        );
        assert_eq!(
            ins[1].operands,
            vec![Operand::Symbol {
                name: "table".to_string(),
                offset: 16
            }]
        );
        assert_eq!(ins[2].mnemonic, Mnemonic::Op(Opcode::JNI));
        assert_eq!(ins[2].operands[2], Operand::Number(-16));
    }

    #[test]
    fn test_parse_directives() {
        let source = r#"
            .sect DATA 6a00 ; data goes here
            .entry $start
            .align 4
            .db 41, 0x42, ff
            .zero #3
            .str "ok\n"
        "#;
        let program = Parser::parse(source).unwrap();
        let directives: Vec<_> = program
            .statements
            .iter()
            .map(|(s, _)| match s {
                Statement::Directive(d) => d.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();

        assert_eq!(
            directives,
            vec![
                Directive::Sect {
                    name: "DATA".to_string(),
                    address: Some(0x6a00)
                },
                Directive::Entry(Operand::Symbol {
                    name: "start".to_string(),
                    offset: 0
                }),
                Directive::Align(4),
                Directive::Db(vec![0x41, 0x42, 0xFF]),
                Directive::Zero(3),
                Directive::Str(b"ok\n".to_vec()),
            ]
        );
        assert!(program.entry_point.is_some());
    }

    #[test]
    fn test_unknown_instruction() {
        let err = Parser::parse("NOP\nFROB R1").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownInstruction {
                name: "FROB".to_string(),
                line: 2
            }
        );
    }

    #[test]
    fn test_bare_identifier_operand() {
        let err = Parser::parse("JMP end").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { line: 1, .. }));
    }

    #[test]
    fn test_trailing_garbage() {
        let err = Parser::parse("NOP R1 R2").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn test_bad_db_byte() {
        let err = Parser::parse(".sect TEXT\n.db 41, 1ff").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidData {
                text: "1ff".to_string(),
                line: 2
            }
        );
    }

    #[test]
    fn test_unknown_directive() {
        let err = Parser::parse(".include \"lib.s\"").unwrap_err();
        assert!(matches!(err, ParseError::UnknownDirective { ref name, .. } if name == "include"));
    }
}
