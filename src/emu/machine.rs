//! The complete architectural state of one virtual machine and operand resolution over it.

use std::fmt;

use crate::plat::{validate, Operand, Register, Word, MEMORY_SIZE};

use super::{
    ram::Ram,
    registers::EmuRegisters,
    stack::{ArgStack, CallStack},
    EmuError, EmuResult,
};

/// A resolved destination: a register or a memory cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Register(Register),
    Memory(Word),
}

impl Location {
    /// The flat address used by memory traps and traces: memory cells are 0-32767,
    /// registers continue at 32768-32775.
    pub fn address(self) -> Word {
        match self {
            Self::Register(reg) => reg.word(),
            Self::Memory(addr) => addr,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register(reg) => write!(f, "{}", reg),
            Self::Memory(addr) => write!(f, "{}", addr),
        }
    }
}

/// Everything a snapshot captures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Machine {
    pub ram: Ram,
    pub registers: EmuRegisters,
    pub ip: Word,
    pub args: ArgStack,
    pub stack: CallStack,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a machine whose memory is initialised from a little-endian image.
    pub fn from_image(bytes: &[u8]) -> EmuResult<Self> {
        Ok(Self {
            ram: Ram::from_image(bytes)?,
            ..Self::default()
        })
    }

    /// Reads the word at the instruction pointer and advances it.
    pub fn fetch(&mut self) -> EmuResult<Word> {
        let ip = self.ip as usize;
        if ip >= MEMORY_SIZE {
            return Err(EmuError::IpOutOfRange(ip));
        }
        self.ip += 1;
        Ok(self.ram.memory[ip])
    }

    /// The value an operand stands for: register contents or the literal itself.
    pub fn resolve_value(&self, w: Word) -> EmuResult<Word> {
        match classify(w)? {
            Operand::Register(reg) => Ok(self.registers.get(reg)),
            Operand::Value(v) => Ok(v),
        }
    }

    /// Where an operand writes to: the register it names, or the memory cell it addresses.
    pub fn resolve_destination(&self, w: Word) -> EmuResult<Location> {
        match classify(w)? {
            Operand::Register(reg) => Ok(Location::Register(reg)),
            Operand::Value(addr) => Ok(Location::Memory(addr)),
        }
    }

    /// Mutable access to the destination `w` resolves to.
    pub fn destination_mut(&mut self, w: Word) -> EmuResult<&mut Word> {
        let loc = self.resolve_destination(w)?;
        self.slot_mut(loc)
    }

    pub fn slot_mut(&mut self, loc: Location) -> EmuResult<&mut Word> {
        match loc {
            Location::Register(reg) => Ok(self.registers.get_mut(reg)),
            Location::Memory(addr) => self.ram.cell_mut(addr),
        }
    }

    /// Current contents of a location.
    pub fn load(&self, loc: Location) -> EmuResult<Word> {
        match loc {
            Location::Register(reg) => Ok(self.registers.get(reg)),
            Location::Memory(addr) => self.ram.read(addr),
        }
    }

    pub fn store(&mut self, loc: Location, value: Word) -> EmuResult<()> {
        *self.slot_mut(loc)? = value;
        Ok(())
    }

    /// Returns the register `w` names, failing for anything else.
    pub fn register(&self, w: Word) -> EmuResult<Register> {
        match classify(w)? {
            Operand::Register(reg) => Ok(reg),
            Operand::Value(_) => Err(EmuError::NotARegister(w)),
        }
    }

    /// Location for a flat trap address (see [`Location::address`]).
    pub fn location_of(addr: Word) -> Option<Location> {
        match classify(addr).ok()? {
            Operand::Register(reg) => Some(Location::Register(reg)),
            Operand::Value(addr) => Some(Location::Memory(addr)),
        }
    }
}

fn classify(w: Word) -> EmuResult<Operand> {
    let op = validate(w).map_err(|_| EmuError::OperandOutOfRange(w))?;
    log::trace!("operand {} -> {:?}", w, op);
    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_value() {
        let mut m = Machine::new();
        m.registers.set(Register::R2, 1234);
        assert_eq!(m.resolve_value(17).unwrap(), 17);
        assert_eq!(m.resolve_value(32770).unwrap(), 1234);
        assert!(matches!(
            m.resolve_value(32776),
            Err(EmuError::OperandOutOfRange(32776))
        ));
    }

    #[test]
    fn test_resolve_destination() {
        let mut m = Machine::new();
        assert_eq!(m.resolve_destination(100).unwrap(), Location::Memory(100));
        assert_eq!(
            m.resolve_destination(32775).unwrap(),
            Location::Register(Register::R7)
        );
        *m.destination_mut(100).unwrap() = 9;
        m.store(m.resolve_destination(32768).unwrap(), 8).unwrap();
        assert_eq!(m.ram.memory[100], 9);
        assert_eq!(m.registers.get(Register::R0), 8);
        assert!(m.destination_mut(65535).is_err());
    }

    #[test]
    fn test_location_of_trap_address() {
        assert_eq!(Machine::location_of(5), Some(Location::Memory(5)));
        assert_eq!(
            Machine::location_of(32775),
            Some(Location::Register(Register::R7))
        );
        assert_eq!(Machine::location_of(32776), None);
        assert_eq!(Location::Register(Register::R7).address(), 32775);
    }

    #[test]
    fn test_fetch_past_end() {
        let mut m = Machine::new();
        m.ip = 32767;
        assert_eq!(m.fetch().unwrap(), 0);
        assert!(matches!(m.fetch(), Err(EmuError::IpOutOfRange(32768))));
    }
}
