//! Common platform code: the word model, registers, and the instruction table.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// An error for the core platform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(Word),
    #[error("operand {0} out of range")]
    OperandOutOfRange(Word),
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),
}

/// Type alias for Result<T, [PlatformError]>.
pub type PResult<T> = Result<T, PlatformError>;

/// The machine's only data type.
pub type Word = u16;

/// Number of addressable words in memory.
pub const MEMORY_SIZE: usize = 32768;
/// Number of registers in the register file.
pub const REGISTER_COUNT: usize = 8;
/// All arithmetic is performed modulo this value.
pub const MODULO: u32 = 32768;
/// The word denoting register 0. Registers 1-7 follow it.
pub const REGISTER0: Word = 32768;

/// Returns true if `w` is a literal value (0-32767).
pub fn is_value(w: Word) -> bool {
    w < REGISTER0
}

/// Returns true if `w` denotes one of the eight registers (32768-32775).
pub fn is_register(w: Word) -> bool {
    (REGISTER0..REGISTER0 + REGISTER_COUNT as Word).contains(&w)
}

/// Index into the register file for a register reference word.
pub fn register_index(w: Word) -> Option<usize> {
    is_register(w).then(|| (w - REGISTER0) as usize)
}

/// Classifies a raw word, failing if it is neither a value nor a register reference.
pub fn validate(w: Word) -> PResult<Operand> {
    if is_value(w) {
        Ok(Operand::Value(w))
    } else {
        Register::try_from(w).map(Operand::Register)
    }
}

/// A raw operand word after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// A literal in 0..32768.
    Value(Word),
    /// A reference to one of the registers.
    Register(Register),
}

/// The eight general purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}

impl Register {
    pub const ALL: [Register; REGISTER_COUNT] = [
        Self::R0,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::R4,
        Self::R5,
        Self::R6,
        Self::R7,
    ];

    /// Index into the register file (0-7).
    pub fn index(self) -> usize {
        self as usize
    }

    /// The operand word that refers to this register.
    pub fn word(self) -> Word {
        REGISTER0 + self as Word
    }
}

impl TryFrom<u8> for Register {
    type Error = PlatformError;

    fn try_from(value: u8) -> Result<Self, PlatformError> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(PlatformError::OperandOutOfRange(value as Word))
    }
}

/// Decodes a register reference word (32768-32775).
impl TryFrom<Word> for Register {
    type Error = PlatformError;

    fn try_from(value: Word) -> Result<Self, PlatformError> {
        register_index(value)
            .map(|i| Self::ALL[i])
            .ok_or(PlatformError::OperandOutOfRange(value))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.index())
    }
}

/// The 22 opcodes of the instruction set, in encoding order.
///
/// Operands are named `a`, `b`, `c` in fetch order. "dest(a)" is the register or
/// memory cell that `a` resolves to as a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Opcode {
    /// Stop execution.
    Halt = 0,
    /// `reg(a) <- b`
    Set,
    /// Push `a` onto the stack.
    Push,
    /// Pop the stack into `dest(a)`.
    Pop,
    /// `dest(a) <- b == c`
    Eq,
    /// `dest(a) <- b > c`
    Gt,
    /// `ip <- a`
    Jmp,
    /// `if a != 0 { ip <- b }`
    Jt,
    /// `if a == 0 { ip <- b }`
    Jf,
    /// `dest(a) <- (b + c) % 32768`
    Add,
    /// `dest(a) <- (b * c) % 32768`
    Mult,
    /// `dest(a) <- b % c`
    Mod,
    /// `dest(a) <- b & c`
    And,
    /// `dest(a) <- b | c`
    Or,
    /// `dest(a) <- !b` (15 bits)
    Not,
    /// `dest(a) <- mem[b]`
    Rmem,
    /// `mem[a] <- b`
    Wmem,
    /// Push the address of the next instruction, then `ip <- a`.
    Call,
    /// Pop the stack into `ip`.
    Ret,
    /// Write `a` as a character.
    Out,
    /// Read a character into `dest(a)`.
    In,
    /// Do nothing.
    Noop,
}

/// Where an instruction writes its result, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestKind {
    /// The destination is operand `a` resolved as a destination.
    Operand,
    /// The destination is the memory cell addressed by the value of operand `a`.
    Indirect,
}

/// An immutable entry of the instruction table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrInfo {
    pub op: Opcode,
    pub arity: usize,
    pub mnemonic: &'static str,
    pub dest: Option<DestKind>,
}

impl InstrInfo {
    const fn new(op: Opcode, arity: usize, mnemonic: &'static str, dest: Option<DestKind>) -> Self {
        Self {
            op,
            arity,
            mnemonic,
            dest,
        }
    }

    /// Whether the tracer captures a memory/register delta for this instruction.
    pub fn traceable(&self) -> bool {
        self.dest.is_some()
    }
}

use DestKind::{Indirect, Operand as Dest};

/// The instruction table, indexed by opcode.
pub static INSTRUCTIONS: [InstrInfo; 22] = [
    InstrInfo::new(Opcode::Halt, 0, "HALT", None),
    InstrInfo::new(Opcode::Set, 2, "SET", Some(Dest)),
    InstrInfo::new(Opcode::Push, 1, "PUSH", None),
    InstrInfo::new(Opcode::Pop, 1, "POP", Some(Dest)),
    InstrInfo::new(Opcode::Eq, 3, "EQ", Some(Dest)),
    InstrInfo::new(Opcode::Gt, 3, "GT", Some(Dest)),
    InstrInfo::new(Opcode::Jmp, 1, "JMP", None),
    InstrInfo::new(Opcode::Jt, 2, "JT", None),
    InstrInfo::new(Opcode::Jf, 2, "JF", None),
    InstrInfo::new(Opcode::Add, 3, "ADD", Some(Dest)),
    InstrInfo::new(Opcode::Mult, 3, "MULT", Some(Dest)),
    InstrInfo::new(Opcode::Mod, 3, "MOD", Some(Dest)),
    InstrInfo::new(Opcode::And, 3, "AND", Some(Dest)),
    InstrInfo::new(Opcode::Or, 3, "OR", Some(Dest)),
    InstrInfo::new(Opcode::Not, 2, "NOT", Some(Dest)),
    InstrInfo::new(Opcode::Rmem, 2, "RMEM", Some(Dest)),
    InstrInfo::new(Opcode::Wmem, 2, "WMEM", Some(Indirect)),
    InstrInfo::new(Opcode::Call, 1, "CALL", None),
    InstrInfo::new(Opcode::Ret, 0, "RET", None),
    InstrInfo::new(Opcode::Out, 1, "OUT", None),
    InstrInfo::new(Opcode::In, 1, "IN", Some(Dest)),
    InstrInfo::new(Opcode::Noop, 0, "NOOP", None),
];

impl Opcode {
    pub fn info(self) -> &'static InstrInfo {
        &INSTRUCTIONS[self as usize]
    }

    /// Number of operand words following the opcode.
    pub fn arity(self) -> usize {
        self.info().arity
    }

    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    pub fn traceable(self) -> bool {
        self.info().traceable()
    }

    pub fn dest(self) -> Option<DestKind> {
        self.info().dest
    }
}

impl TryFrom<Word> for Opcode {
    type Error = PlatformError;

    fn try_from(value: Word) -> Result<Self, PlatformError> {
        INSTRUCTIONS
            .get(value as usize)
            .map(|info| info.op)
            .ok_or(PlatformError::UnknownOpcode(value))
    }
}

impl FromStr for Opcode {
    type Err = PlatformError;

    /// Looks an opcode up by its mnemonic, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        INSTRUCTIONS
            .iter()
            .find(|info| info.mnemonic.eq_ignore_ascii_case(s))
            .map(|info| info.op)
            .ok_or_else(|| PlatformError::UnknownMnemonic(s.to_string()))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Returns true for characters worth printing as-is in listings and traces.
pub fn is_printable(w: Word) -> bool {
    (32..127).contains(&w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_classes() {
        for w in 0..=Word::MAX {
            match w {
                0..=32767 => {
                    assert!(is_value(w) && !is_register(w));
                    assert_eq!(validate(w), Ok(Operand::Value(w)));
                }
                32768..=32775 => {
                    assert!(is_register(w) && !is_value(w));
                    assert_eq!(register_index(w), Some((w - 32768) as usize));
                    assert_eq!(Register::try_from(w).unwrap().word(), w);
                }
                _ => {
                    assert_eq!(register_index(w), None);
                    assert_eq!(validate(w), Err(PlatformError::OperandOutOfRange(w)));
                }
            }
        }
    }

    #[test]
    fn test_table_order() {
        for (id, info) in INSTRUCTIONS.iter().enumerate() {
            assert_eq!(info.op as usize, id);
            assert_eq!(Opcode::try_from(id as Word).unwrap(), info.op);
            assert_eq!(info.mnemonic.parse::<Opcode>().unwrap(), info.op);
        }
        assert_eq!(Opcode::try_from(22), Err(PlatformError::UnknownOpcode(22)));
    }

    #[test]
    fn test_arity_and_flags() {
        assert_eq!(Opcode::Halt.arity(), 0);
        assert_eq!(Opcode::Set.arity(), 2);
        assert_eq!(Opcode::Add.arity(), 3);
        assert_eq!(Opcode::Out.arity(), 1);
        assert!(Opcode::Add.traceable());
        assert!(Opcode::Wmem.traceable());
        assert!(!Opcode::Jmp.traceable());
        assert!(!Opcode::Push.traceable());
        assert_eq!("wmem".parse::<Opcode>().unwrap(), Opcode::Wmem);
        assert!("frob".parse::<Opcode>().is_err());
    }
}
