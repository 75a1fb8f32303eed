//! A small assembler and a disassembler for the word VM.
//!
//! Assembly syntax, one statement per line by convention (whitespace is not significant):
//!
//! ```text
//! start:              ; defines label `start`
//!     set   r0 $'A'
//!     out   r0
//!     jmp   %start     ; label reference
//! data:
//!     .word $1 $0x20 $32768 %start
//! ```
//!
//! Literals are prefixed with `$` and may be decimal, `0x` hex or a quoted character.

use nom_locate::LocatedSpan;
use thiserror::Error;

use crate::plat::{Opcode, Register, Word};

pub mod assembler;
pub mod disasm;
pub mod lexer;

pub use assembler::{assemble, Assembler};
pub use disasm::disassemble;

pub type Span<'a> = LocatedSpan<&'a str>;

/// An error for the assembler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AsmError {
    #[error("syntax error at ({}:{})", .loc.0, .loc.1)]
    Syntax { loc: (usize, usize), span: String },
    #[error("found garbage at ({}:{}): {}", .loc.0, .loc.1, .span)]
    FoundGarbage { loc: (usize, usize), span: String },
    #[error("literal {0} does not fit in a word")]
    LiteralOverflow(u64),
    #[error("{op} at line {line} expects {expected} operand(s)")]
    MissingOperand {
        op: Opcode,
        expected: usize,
        line: u32,
    },
    #[error("unexpected `{0}`")]
    UnexpectedToken(String),
    #[error("duplicate label `{0}`")]
    DuplicateLabel(String),
    #[error("undefined label `{0}`")]
    UndefinedLabel(String),
    #[error("program is {0} words, more than fits in memory")]
    ProgramTooLarge(usize),
}

/// An assembly language token. Output for the lexer, input for the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token<'a> {
    /// An instruction mnemonic.
    Mnemonic(Opcode),
    /// `name:` defines a label at the current address.
    LabelDef(&'a str),
    /// `%name` refers to a label's address.
    Label(&'a str),
    /// A `$`-prefixed literal.
    Literal(Word),
    /// `r0`-`r7`.
    Register(Register),
    /// The `.word` directive.
    Word,
    /// End of file.
    Eof,
}

/// A token along with the source position it was lexed from.
#[derive(Debug, Clone, Copy)]
pub struct WithSpan<'a, T> {
    pub span: Span<'a>,
    pub item: T,
}

impl<'a, T> WithSpan<'a, T> {
    pub fn line(&self) -> u32 {
        self.span.location_line()
    }
}
