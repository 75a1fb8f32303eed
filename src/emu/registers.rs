use crate::plat::{Register, Word, REGISTER_COUNT};

/// The register file: eight words, zero on reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmuRegisters {
    values: [Word; REGISTER_COUNT],
}

impl EmuRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, reg: Register) -> Word {
        self.values[reg.index()]
    }

    pub fn set(&mut self, reg: Register, value: Word) {
        log::trace!("{} <- {}", reg, value);
        self.values[reg.index()] = value;
    }

    pub fn get_mut(&mut self, reg: Register) -> &mut Word {
        &mut self.values[reg.index()]
    }

    /// All eight values, R0 first.
    pub fn values(&self) -> &[Word; REGISTER_COUNT] {
        &self.values
    }

    pub fn load(&mut self, values: [Word; REGISTER_COUNT]) {
        self.values = values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write() {
        let mut regs = EmuRegisters::new();
        assert_eq!(regs.values(), &[0; 8]);
        regs.set(Register::R3, 42);
        *regs.get_mut(Register::R7) += 1;
        assert_eq!(regs.get(Register::R3), 42);
        assert_eq!(regs.values(), &[0, 0, 0, 42, 0, 0, 0, 1]);
    }
}
