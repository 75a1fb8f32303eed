//! The emulator/debugger module.

use thiserror::Error;

use crate::plat::Word;

pub mod debug;
pub mod debugger;
pub mod emulator;
pub mod exec;
pub mod io;
pub mod machine;
pub mod ram;
pub mod registers;
pub mod snapshot;
pub mod stack;
pub mod trace;

/// A fault raised by the virtual machine.
#[derive(Debug, Error)]
pub enum EmuError {
    #[error("unknown opcode {opcode} at {at}")]
    UnknownOpcode { opcode: Word, at: Word },
    #[error("operand {0} out of range")]
    OperandOutOfRange(Word),
    #[error("operand {0} is not a register")]
    NotARegister(Word),
    #[error("instruction pointer {0} out of range")]
    IpOutOfRange(usize),
    #[error("stack underflow")]
    StackUnderflow,
    #[error("instruction stack underflow")]
    InstructionStackUnderflow,
    #[error("division by zero")]
    DivideByZero,
    #[error("image of {0} words does not fit in memory")]
    ImageTooLarge(usize),
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(&'static str),
    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),
}

/// Type alias for Result<T, [EmuError]>.
pub type EmuResult<T> = Result<T, EmuError>;
