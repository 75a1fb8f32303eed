//! The two LIFO stacks: the per-instruction argument stack and the program's call/data stack.

use crate::plat::Word;

use super::{EmuError, EmuResult};

/// Holds the raw operand words of the instruction being dispatched, in fetch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgStack(Vec<Word>);

impl ArgStack {
    pub fn push_raw(&mut self, w: Word) {
        self.0.push(w);
    }

    pub fn pop_raw(&mut self) -> EmuResult<Word> {
        self.0.pop().ok_or(EmuError::InstructionStackUnderflow)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Contents, bottom first.
    pub fn as_slice(&self) -> &[Word] {
        &self.0
    }
}

impl From<Vec<Word>> for ArgStack {
    fn from(words: Vec<Word>) -> Self {
        Self(words)
    }
}

/// The program stack used by PUSH, POP, CALL and RET.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStack(Vec<Word>);

impl CallStack {
    pub fn push(&mut self, w: Word) {
        self.0.push(w);
    }

    pub fn pop(&mut self) -> EmuResult<Word> {
        self.0.pop().ok_or(EmuError::StackUnderflow)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Contents, bottom first.
    pub fn as_slice(&self) -> &[Word] {
        &self.0
    }
}

impl From<Vec<Word>> for CallStack {
    fn from(words: Vec<Word>) -> Self {
        Self(words)
    }
}
