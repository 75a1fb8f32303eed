//! Execution trace recorder.

use serde::Serialize;

use crate::plat::{is_printable, Opcode, Register, Word};

use super::machine::Location;

/// A destination that changed while executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryChange {
    pub location: Location,
    pub old_value: Word,
    pub new_value: Word,
}

/// One executed instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    /// Address of the opcode word.
    pub ip: Word,
    pub op: Opcode,
    /// Raw, unresolved operand words in fetch order.
    pub operands: [Option<Word>; 3],
    pub change: Option<MemoryChange>,
}

impl TraceRecord {
    pub fn new(ip: Word, op: Opcode, raw: &[Word]) -> Self {
        let mut operands = [None; 3];
        for (slot, &w) in operands.iter_mut().zip(raw) {
            *slot = Some(w);
        }
        Self {
            ip,
            op,
            operands,
            change: None,
        }
    }
}

/// Append-only log of executed instructions.
#[derive(Debug, Default)]
pub struct Tracer {
    enabled: bool,
    records: Vec<TraceRecord>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears any previous records and begins recording.
    pub fn start(&mut self) {
        self.records.clear();
        self.enabled = true;
    }

    /// Stops recording, keeping what was recorded.
    pub fn stop(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub(crate) fn push(&mut self, record: TraceRecord) {
        if self.enabled {
            self.records.push(record);
        }
    }

    /// Serializes the log as a JSON array.
    pub fn export(&self) -> serde_json::Result<String> {
        let entries: Vec<_> = self.records.iter().map(TraceEntry::from).collect();
        serde_json::to_string_pretty(&entries)
    }
}

/// A rendered operand: a plain number, or text for registers and characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
enum Param {
    Number(Word),
    Text(String),
}

impl Param {
    fn operand(op: Opcode, w: Word) -> Self {
        if let Ok(reg) = Register::try_from(w) {
            return Self::Text(reg.to_string());
        }
        match op {
            Opcode::Out if is_printable(w) => Self::Text(char::from(w as u8).to_string()),
            Opcode::Out if w < 256 => Self::Text(format!("\\x{:02x}", w)),
            _ => Self::Number(w),
        }
    }

    fn location(loc: Location) -> Self {
        match loc {
            Location::Register(reg) => Self::Text(reg.to_string()),
            Location::Memory(addr) => Self::Number(addr),
        }
    }
}

#[derive(Debug, Serialize)]
struct OpCodeEntry {
    name: &'static str,
    param_a: Option<Param>,
    param_b: Option<Param>,
    param_c: Option<Param>,
}

#[derive(Debug, Serialize)]
struct ChangeEntry {
    address: Param,
    old_value: Word,
    new_value: Word,
}

#[derive(Debug, Serialize)]
struct TraceEntry {
    instruction_ptr: Word,
    op_code: OpCodeEntry,
    memory_change: Option<ChangeEntry>,
}

impl From<&TraceRecord> for TraceEntry {
    fn from(r: &TraceRecord) -> Self {
        let [a, b, c] = r.operands.map(|w| w.map(|w| Param::operand(r.op, w)));
        Self {
            instruction_ptr: r.ip,
            op_code: OpCodeEntry {
                name: r.op.mnemonic(),
                param_a: a,
                param_b: b,
                param_c: c,
            },
            memory_change: r.change.map(|c| ChangeEntry {
                address: Param::location(c.location),
                old_value: c.old_value,
                new_value: c.new_value,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn test_start_clears_and_stop_retains() {
        let mut t = Tracer::new();
        t.push(TraceRecord::new(0, Opcode::Noop, &[]));
        assert!(t.records().is_empty());

        t.start();
        t.push(TraceRecord::new(0, Opcode::Noop, &[]));
        t.stop();
        t.push(TraceRecord::new(1, Opcode::Noop, &[]));
        assert_eq!(t.records().len(), 1);

        t.start();
        assert!(t.records().is_empty());
    }

    #[test]
    fn test_export_schema() {
        let mut t = Tracer::new();
        t.start();
        let mut add = TraceRecord::new(0, Opcode::Add, &[32768, 60, 5]);
        add.change = Some(MemoryChange {
            location: Location::Register(Register::R0),
            old_value: 0,
            new_value: 65,
        });
        t.push(add);
        t.push(TraceRecord::new(4, Opcode::Out, &[10]));
        t.push(TraceRecord::new(6, Opcode::Out, &[b'A' as Word]));
        t.push(TraceRecord::new(8, Opcode::Halt, &[]));

        let v: Value = serde_json::from_str(&t.export().unwrap()).unwrap();
        assert_eq!(
            v,
            json!([
                {
                    "instruction_ptr": 0,
                    "op_code": { "name": "ADD", "param_a": "R0", "param_b": 60, "param_c": 5 },
                    "memory_change": { "address": "R0", "old_value": 0, "new_value": 65 }
                },
                {
                    "instruction_ptr": 4,
                    "op_code": { "name": "OUT", "param_a": "\\x0a", "param_b": null, "param_c": null },
                    "memory_change": null
                },
                {
                    "instruction_ptr": 6,
                    "op_code": { "name": "OUT", "param_a": "A", "param_b": null, "param_c": null },
                    "memory_change": null
                },
                {
                    "instruction_ptr": 8,
                    "op_code": { "name": "HALT", "param_a": null, "param_b": null, "param_c": null },
                    "memory_change": null
                }
            ])
        );
    }
}
