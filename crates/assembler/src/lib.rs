//! Assembler producing zzvm images.
//!
//! # Example
//!
//! ```
//! use zzvm_assembler::assemble;
//!
//! let source = r#"
//!     .sect TEXT
//!     start:
//!         MOVI R1, 0x1234
//!         HLT
//! "#;
//!
//! let image = assemble(source).expect("failed to assemble");
//! assert_eq!(image.entry, 0x4000);
//! assert_eq!(image.sections[0].data.len(), 8);
//! ```
//!
//! # Pipeline
//!
//! 1. **Lexer** - Tokenizes the source code into a stream of tokens
//! 2. **Parser** - Builds statements (labels, instructions, directives) line by line
//! 3. **Compiler** - Two passes over the statements:
//!    - Pass 1: Lay out sections and collect label addresses
//!    - Pass 2: Emit section bytes with resolved label references
//!
//! # Assembly Language Features
//!
//! - **Opcodes** by their table names (`ADDR`, `ADDI`, `MOVI`, `JNI`, `PUSI`, ...),
//!   case-insensitive, plus `JMP target` for `ADDI IP, IP, target`
//! - **Labels** - `name:`, referenced as `$name` or `$name+offset`
//! - **Relative operands** - branch and `CALL` symbols resolve against the next instruction
//! - **Numbers** - `0x1f`, `#31`, `31`, `-1`
//! - **Directives** - `.sect`, `.entry`, `.align`, `.db`, `.zero`, `.str`
//! - **Comments** - Semicolon-style comments

pub mod compiler;
pub mod lexer;
pub mod parser;

use thiserror::Error;
use zzvm_core::Image;

/// Assembler errors
#[derive(Error, Debug)]
pub enum AssemblerError {
    #[error("parse error: {0}")]
    Parse(#[from] parser::ParseError),

    #[error("compile error: {0}")]
    Compile(#[from] compiler::CompileError),
}

pub type Result<T> = std::result::Result<T, AssemblerError>;

/// Assemble source code into an image.
///
/// # Errors
///
/// Returns an error if:
/// - The source contains invalid syntax
/// - Labels are undefined or duplicated
/// - Operands do not match the instruction
/// - A section does not fit in memory
pub fn assemble(source: &str) -> Result<Image> {
    let program = parser::Parser::parse(source)?;
    let image = compiler::Compiler::compile(&program)?;
    Ok(image)
}

/// Assemble source code and return both the AST and the image.
pub fn assemble_with_ast(source: &str) -> Result<(parser::Program, Image)> {
    let program = parser::Parser::parse(source)?;
    let image = compiler::Compiler::compile(&program)?;
    Ok((program, image))
}

// Re-export commonly used types
pub use compiler::{CompileError, Compiler};
pub use lexer::{Lexer, Token};
pub use parser::{Directive, Instruction, Mnemonic, Operand, ParseError, Parser, Program, Statement};
