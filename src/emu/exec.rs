//! Instruction semantics.
//!
//! Operands are pushed onto the argument stack in fetch order by the engine and popped
//! here, so the last word popped is operand `a`.

use std::io::Write;

use crate::plat::{is_value, Opcode, Word, MODULO};

use super::{
    debug::SuspendCause,
    emulator::{EmuState, Emulator, Resume, Suspend},
    EmuError, EmuResult,
};

impl Emulator {
    /// Executes `op`, whose operands are already on the argument stack.
    pub(super) fn execute<S: Suspend + ?Sized>(&mut self, op: Opcode, console: &mut S) -> EmuResult<()> {
        match op {
            Opcode::Halt => {
                log::info!("HALT at {}", self.machine.ip - 1);
                self.state = EmuState::Halt;
            }
            Opcode::Set => {
                let [a, b] = self.operands()?;
                let reg = self.machine.register(a)?;
                let v = self.machine.resolve_value(b)?;
                self.machine.registers.set(reg, v);
            }
            Opcode::Push => {
                let [a] = self.operands()?;
                let v = self.machine.resolve_value(a)?;
                self.machine.stack.push(v);
            }
            Opcode::Pop => {
                let [a] = self.operands()?;
                let top = self.machine.stack.pop()?;
                // the popped word is itself resolved as an operand
                let v = self.machine.resolve_value(top)?;
                *self.machine.destination_mut(a)? = v;
            }
            Opcode::Eq => self.binary(|b, c| Ok((b == c) as Word))?,
            Opcode::Gt => self.binary(|b, c| Ok((b > c) as Word))?,
            Opcode::Jmp => {
                let [a] = self.operands()?;
                self.machine.ip = self.machine.resolve_value(a)?;
            }
            Opcode::Jt | Opcode::Jf => {
                let [a, b] = self.operands()?;
                let cond = self.machine.resolve_value(a)?;
                let target = self.machine.resolve_value(b)?;
                if (cond != 0) == (op == Opcode::Jt) {
                    self.machine.ip = target;
                }
            }
            Opcode::Add => self.binary(|b, c| Ok(((b as u32 + c as u32) % MODULO) as Word))?,
            Opcode::Mult => self.binary(|b, c| Ok(((b as u32 * c as u32) % MODULO) as Word))?,
            Opcode::Mod => self.binary(|b, c| b.checked_rem(c).ok_or(EmuError::DivideByZero))?,
            Opcode::And => self.binary(|b, c| Ok(b & c))?,
            Opcode::Or => self.binary(|b, c| Ok(b | c))?,
            Opcode::Not => {
                let [a, b] = self.operands()?;
                let dest = self.machine.resolve_destination(a)?;
                let v = self.machine.resolve_value(b)?;
                self.machine.store(dest, !v & (MODULO - 1) as Word)?;
            }
            Opcode::Rmem => {
                let [a, b] = self.operands()?;
                let dest = self.machine.resolve_destination(a)?;
                let addr = self.machine.resolve_value(b)?;
                let v = self.machine.ram.read(addr)?;
                self.machine.store(dest, v)?;
            }
            Opcode::Wmem => {
                let [a, b] = self.operands()?;
                let addr = self.machine.resolve_value(a)?;
                let v = self.machine.resolve_value(b)?;
                if !is_value(v) {
                    return Err(EmuError::OperandOutOfRange(v));
                }
                self.machine.ram.write(addr, v)?;
            }
            Opcode::Call => {
                let [a] = self.operands()?;
                let target = self.machine.resolve_value(a)?;
                self.machine.stack.push(self.machine.ip);
                self.machine.ip = target;
            }
            Opcode::Ret => {
                self.machine.ip = self.machine.stack.pop()?;
            }
            Opcode::Out => {
                let [a] = self.operands()?;
                let v = self.machine.resolve_value(a)?;
                self.output.write_all(&[v as u8])?;
            }
            Opcode::In => {
                let [a] = self.operands()?;
                let dest = self.machine.resolve_destination(a)?;
                self.output.flush()?;
                let c = match self.input.next_char()? {
                    Some(c) => c,
                    None => match self.suspend(console, SuspendCause::END_OF_INPUT)? {
                        Resume::Continue => b'\n',
                        Resume::Quit => return Ok(()),
                    },
                };
                self.machine.store(dest, c as Word)?;
            }
            Opcode::Noop => {}
        }
        Ok(())
    }

    /// Pops `N` operands, returning them in fetch order.
    fn operands<const N: usize>(&mut self) -> EmuResult<[Word; N]> {
        let mut ops = [0; N];
        for slot in ops.iter_mut().rev() {
            *slot = self.machine.args.pop_raw()?;
        }
        Ok(ops)
    }

    /// `dest(a) <- f(value(b), value(c))`
    fn binary(&mut self, f: impl FnOnce(Word, Word) -> EmuResult<Word>) -> EmuResult<()> {
        let [a, b, c] = self.operands()?;
        let dest = self.machine.resolve_destination(a)?;
        let b = self.machine.resolve_value(b)?;
        let c = self.machine.resolve_value(c)?;
        let v = f(b, c)?;
        self.machine.store(dest, v)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        emu::emulator::{tests::emulator, Detached},
        plat::Register,
    };

    use super::*;

    const R0: Word = 32768;
    const R1: Word = 32769;

    fn run(program: &[Word]) -> Emulator {
        let (mut emu, _) = emulator(program, &[]);
        emu.run_until_halt(&mut Detached).unwrap();
        emu
    }

    fn fault(program: &[Word]) -> EmuError {
        let (mut emu, _) = emulator(program, &[]);
        emu.run_until_halt(&mut Detached).unwrap_err()
    }

    #[test]
    fn test_arithmetic_wraps() {
        let emu = run(&[9, R0, 32758, 15, 10, R1, 32767, 32767, 0]);
        assert_eq!(emu.machine.registers.get(Register::R0), 5);
        // 32767 * 32767 = 1073676289 = 32767 * 32768 + 1
        assert_eq!(emu.machine.registers.get(Register::R1), 1);
    }

    #[test]
    fn test_compare_and_bitwise() {
        let program = [
            4, R0, 7, 7, // EQ
            5, R1, 3, 7, // GT
            12, 100, 12, 10, // AND -> mem[100]
            13, 101, 12, 10, // OR -> mem[101]
            11, 102, 17, 5, // MOD -> mem[102]
            0,
        ];
        let emu = run(&program);
        assert_eq!(emu.machine.registers.get(Register::R0), 1);
        assert_eq!(emu.machine.registers.get(Register::R1), 0);
        assert_eq!(&emu.machine.ram.memory[100..103], &[8, 14, 2]);
    }

    #[test]
    fn test_results_stay_in_range() {
        let (r2, r3, r4, r5) = (R1 + 1, R1 + 2, R1 + 3, R1 + 4);
        // NOT R1 R0; NOT R2 R1; ADD R3 R0 R1; MULT R4 R0 R0; MOD R5 R1 7; HALT
        let program = [
            14, R1, R0, 14, r2, R1, 9, r3, R0, R1, 10, r4, R0, R0, 11, r5, R1, 7, 0,
        ];
        let (mut emu, _) = emulator(&program, &[]);
        for x in (0..32768).step_by(89).chain([32767]) {
            emu.machine.ip = 0;
            emu.state = EmuState::Continue;
            emu.machine.registers.set(Register::R0, x);
            emu.run_until_halt(&mut Detached).unwrap();
            let r = emu.machine.registers.values();
            assert_eq!(r[2], x);
            assert_eq!(r[3], 32767);
            assert!(r.iter().all(|&v| v < 32768));
        }
    }

    #[test]
    fn test_not_is_fifteen_bits() {
        let emu = run(&[14, R0, 0, 14, R1, R0, 0]);
        assert_eq!(emu.machine.registers.get(Register::R0), 32767);
        assert_eq!(emu.machine.registers.get(Register::R1), 0);
    }

    #[test]
    fn test_mod_by_zero() {
        assert!(matches!(fault(&[11, R0, 5, 0]), EmuError::DivideByZero));
    }

    #[test]
    fn test_set_requires_register() {
        assert!(matches!(fault(&[1, 5, 5]), EmuError::NotARegister(5)));
    }

    #[test]
    fn test_jumps() {
        // JT 1 -> 5; (skipped OUT); JF 0 -> 9; HALT at 9
        let program = [7, 1, 5, 19, 33, 8, 0, 9, 0, 0];
        let (mut emu, out) = emulator(&program, &[]);
        emu.run_until_halt(&mut Detached).unwrap();
        assert_eq!(out.text(), "");
        assert_eq!(emu.machine.ip, 10);
        assert_eq!(emu.ticks, 3);
    }

    #[test]
    fn test_call_and_ret() {
        // CALL 5; HALT; ...; OUT 'k' at 5; RET
        let program = [17, 5, 0, 0, 0, 19, 107, 18];
        let (mut emu, out) = emulator(&program, &[]);
        emu.run_until_halt(&mut Detached).unwrap();
        assert_eq!(out.text(), "k");
        assert_eq!(emu.machine.ip, 3);
        assert!(emu.machine.stack.is_empty());
    }

    #[test]
    fn test_ret_on_empty_stack() {
        assert!(matches!(fault(&[18]), EmuError::StackUnderflow));
    }

    #[test]
    fn test_push_pop_resolves_twice() {
        // SET R1 42; PUSH R1; POP 200
        let emu = run(&[1, R1, 42, 2, R1, 3, 200, 0]);
        assert_eq!(emu.machine.ram.memory[200], 42);

        // a register reference on the stack is resolved again when popped
        let (mut emu, _) = emulator(&[1, R1, 42, 3, R0, 0], &[]);
        emu.machine.stack = vec![R1].into();
        emu.run_until_halt(&mut Detached).unwrap();
        assert_eq!(emu.machine.registers.get(Register::R0), 42);
    }

    #[test]
    fn test_memory_access() {
        // WMEM 300 R0(=9); RMEM R1 300
        let emu = run(&[1, R0, 9, 16, 300, R0, 15, R1, 300, 0]);
        assert_eq!(emu.machine.ram.memory[300], 9);
        assert_eq!(emu.machine.registers.get(Register::R1), 9);
    }

    #[test]
    fn test_wmem_to_register_indirect_out_of_range() {
        // WMEM R0 5, with R0 holding an address past memory
        let (mut emu, _) = emulator(&[16, R0, 5, 0], &[]);
        emu.machine.registers.set(Register::R0, 32770);
        let before = emu.machine.ram.clone();
        let err = emu.run_until_halt(&mut Detached).unwrap_err();
        assert!(matches!(err, EmuError::OperandOutOfRange(32770)));
        assert_eq!(emu.machine.ram, before);
    }

    #[test]
    fn test_out_writes_low_byte() {
        let (mut emu, out) = emulator(&[1, R0, 104, 19, R0, 19, 105, 19, 10, 0], &[]);
        emu.run_until_halt(&mut Detached).unwrap();
        assert_eq!(out.text(), "hi\n");
    }
}
