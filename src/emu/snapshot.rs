//! Binary save/restore of the full machine state.
//!
//! A snapshot is a sequence of little-endian words. Up to 32768 words is a plain
//! memory image (the short form); anything longer is the long form:
//!
//! ```text
//! [0..32768)        memory
//! [32768..32776)    registers R0-R7
//! [32776]           instruction pointer
//! [32777]           N, call stack depth
//! [32778..32778+N)  call stack, bottom first
//! [32778+N]         M, argument stack depth
//! (M words)         argument stack, bottom first
//! ```

use std::{fs, path::Path};

use crate::plat::{Word, MEMORY_SIZE, REGISTER_COUNT};

use super::{
    machine::Machine,
    ram::{words_from_le_bytes, words_to_le_bytes},
    EmuError, EmuResult,
};

const REGISTERS_AT: usize = MEMORY_SIZE;
const IP_AT: usize = REGISTERS_AT + REGISTER_COUNT;
const STACK_AT: usize = IP_AT + 1;

/// Encodes `machine` in the long form.
///
/// # Errors
///
/// Returns [`EmuError::MalformedSnapshot`] if either stack is too deep for its length word.
pub fn save(machine: &Machine) -> EmuResult<Vec<u8>> {
    let stack = machine.stack.as_slice();
    let args = machine.args.as_slice();
    let depth = |len: usize| {
        Word::try_from(len).map_err(|_| EmuError::MalformedSnapshot("stack too deep"))
    };
    let (n, m) = (depth(stack.len())?, depth(args.len())?);
    let mut words = Vec::with_capacity(STACK_AT + 2 + stack.len() + args.len());
    words.extend_from_slice(&machine.ram.memory);
    words.extend_from_slice(machine.registers.values());
    words.push(machine.ip);
    words.push(n);
    words.extend_from_slice(stack);
    words.push(m);
    words.extend_from_slice(args);
    Ok(words_to_le_bytes(&words))
}

/// Decodes either form into a freshly reset machine.
pub fn load(bytes: &[u8]) -> EmuResult<Machine> {
    let words = words_from_le_bytes(bytes);
    let mut machine = Machine::new();
    if words.len() <= MEMORY_SIZE {
        machine.ram.load_words(&words)?;
        return Ok(machine);
    }

    let mut reader = WordReader::new(&words);
    machine.ram.load_words(reader.take(MEMORY_SIZE)?)?;
    let mut registers = [0; REGISTER_COUNT];
    registers.copy_from_slice(reader.take(REGISTER_COUNT)?);
    machine.registers.load(registers);
    machine.ip = reader.next()?;
    let n = reader.next()? as usize;
    machine.stack = reader.take(n)?.to_vec().into();
    let m = reader.next()? as usize;
    machine.args = reader.take(m)?.to_vec().into();
    if !reader.is_done() {
        return Err(EmuError::MalformedSnapshot("trailing words"));
    }
    Ok(machine)
}

pub fn save_to_file(machine: &Machine, path: impl AsRef<Path>) -> EmuResult<()> {
    fs::write(path.as_ref(), save(machine)?)?;
    log::info!("saved state to {}", path.as_ref().display());
    Ok(())
}

pub fn load_from_file(path: impl AsRef<Path>) -> EmuResult<Machine> {
    let machine = load(&fs::read(path.as_ref())?)?;
    log::info!("loaded state from {}", path.as_ref().display());
    Ok(machine)
}

struct WordReader<'a> {
    words: &'a [Word],
}

impl<'a> WordReader<'a> {
    fn new(words: &'a [Word]) -> Self {
        Self { words }
    }

    fn take(&mut self, n: usize) -> EmuResult<&'a [Word]> {
        if n > self.words.len() {
            return Err(EmuError::MalformedSnapshot("truncated"));
        }
        let (head, rest) = self.words.split_at(n);
        self.words = rest;
        Ok(head)
    }

    fn next(&mut self) -> EmuResult<Word> {
        Ok(self.take(1)?[0])
    }

    fn is_done(&self) -> bool {
        self.words.is_empty()
    }
}
