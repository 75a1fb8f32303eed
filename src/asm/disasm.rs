//! Memory listings for the debug console.

use crate::plat::{is_printable, Opcode, Register, Word, REGISTER_COUNT};

/// Renders the words in `memory[from..=to]` as a listing, one instruction per line.
///
/// Register operands show the register's current value from `registers`. Consecutive
/// OUT instructions are merged onto a single line. A line starting inside the range is
/// always completed, even if its operands extend past `to`.
pub fn disassemble(
    memory: &[Word],
    registers: &[Word; REGISTER_COUNT],
    from: usize,
    to: usize,
) -> String {
    let end = to.saturating_add(1).min(memory.len());
    let mut out = String::new();
    let mut addr = from;
    while addr < end {
        addr = render_line(&mut out, memory, registers, addr);
    }
    out
}

/// Appends the line starting at `addr` and returns the address after it.
fn render_line(
    out: &mut String,
    memory: &[Word],
    registers: &[Word; REGISTER_COUNT],
    addr: usize,
) -> usize {
    *out += &format!("{}: ", addr);
    let mut next = addr + 1;
    match Opcode::try_from(memory[addr]) {
        Ok(Opcode::Out) => {
            out.push_str(Opcode::Out.mnemonic());
            while let Some(&w) = memory.get(next) {
                out.push(' ');
                *out += &operand(w, registers);
                next += 1;
                if memory.get(next) != Some(&(Opcode::Out as Word)) {
                    break;
                }
                next += 1;
            }
        }
        Ok(op) => {
            out.push_str(op.mnemonic());
            for w in memory.iter().skip(next).take(op.arity()) {
                out.push_str("  ");
                *out += &operand(*w, registers);
                next += 1;
            }
        }
        Err(_) => *out += &operand(memory[addr], registers),
    }
    out.push('\n');
    next
}

fn operand(w: Word, registers: &[Word; REGISTER_COUNT]) -> String {
    match Register::try_from(w) {
        Ok(reg) => format!("{}({})", reg, registers[reg.index()]),
        Err(_) if w < Register::R0.word() => {
            if is_printable(w) {
                format!("{}'{}'", w, char::from(w as u8))
            } else {
                w.to_string()
            }
        }
        Err(_) => format!("INVALID({})", w),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(memory: &[Word]) -> String {
        disassemble(memory, &[7, 0, 0, 0, 0, 0, 0, 0], 0, usize::MAX)
    }

    #[test]
    fn test_instructions() {
        assert_eq!(
            listing(&[9, 32768, 60, 5, 21, 0]),
            "0: ADD  R0(7)  60'<'  5\n4: NOOP\n5: HALT\n"
        );
    }

    #[test]
    fn test_out_runs_merge() {
        assert_eq!(
            listing(&[19, 72, 19, 105, 19, 10, 0]),
            "0: OUT 72'H' 105'i' 10\n6: HALT\n"
        );
    }

    #[test]
    fn test_data_words() {
        assert_eq!(
            listing(&[22, 32775, 40000, 1000]),
            "0: 22\n1: R7(0)\n2: INVALID(40000)\n3: 1000\n"
        );
    }

    #[test]
    fn test_range_and_truncation() {
        let memory = [21, 21, 9, 32768, 1];
        assert_eq!(
            disassemble(&memory, &[0; 8], 1, 2),
            "1: NOOP\n2: ADD  R0(0)  1\n"
        );
        assert_eq!(disassemble(&memory, &[0; 8], 3, 1), "");
    }
}
