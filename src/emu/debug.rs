//! Breakpoints, traps, and the pause flag the engine consults every tick.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rustc_hash::FxHashSet;

use crate::plat::{Opcode, Word};

bitflags::bitflags! {
    /// Why execution was suspended. More than one cause may apply to the same tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SuspendCause: u8 {
        /// The pause flag was raised (console request or Ctrl-C).
        const PAUSE = 1 << 0;
        /// The instruction pointer reached a breakpoint.
        const BREAKPOINT = 1 << 1;
        /// The next opcode is being watched.
        const INSTRUCTION_TRAP = 1 << 2;
        /// The previous instruction modified a watched address.
        const MEMORY_TRAP = 1 << 3;
        /// IN ran out of input.
        const END_OF_INPUT = 1 << 4;
        /// Execution stopped on a fault.
        const FAULT = 1 << 5;
    }
}

/// A shared "should suspend" flag. Clones refer to the same flag, so it can be
/// raised from another thread while the engine polls it.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Whether the engine is running or parked in the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugState {
    #[default]
    Running,
    Suspended,
}

/// Operator-managed watch sets. Membership is the only state they hold.
#[derive(Debug, Default)]
pub struct DebugControl {
    pub state: DebugState,
    pub pause: Interrupt,
    breakpoints: FxHashSet<Word>,
    memory_traps: FxHashSet<Word>,
    instruction_traps: FxHashSet<Opcode>,
    pending: Option<SuspendCause>,
}

impl DebugControl {
    pub fn new(pause: Interrupt) -> Self {
        Self {
            pause,
            ..Self::default()
        }
    }

    pub fn set_breakpoint(&mut self, addr: Word) -> bool {
        self.breakpoints.insert(addr)
    }

    pub fn clear_breakpoint(&mut self, addr: Word) -> bool {
        self.breakpoints.remove(&addr)
    }

    /// Removes all breakpoints, returning how many there were.
    pub fn clear_breakpoints(&mut self) -> usize {
        let n = self.breakpoints.len();
        self.breakpoints.clear();
        n
    }

    pub fn is_breakpoint(&self, addr: Word) -> bool {
        self.breakpoints.contains(&addr)
    }

    /// Breakpoints in ascending order.
    pub fn breakpoints(&self) -> Vec<Word> {
        sorted(&self.breakpoints)
    }

    /// Watches a flat address: 0-32767 for memory, 32768-32775 for registers.
    pub fn set_memory_trap(&mut self, addr: Word) -> bool {
        self.memory_traps.insert(addr)
    }

    pub fn clear_memory_trap(&mut self, addr: Word) -> bool {
        self.memory_traps.remove(&addr)
    }

    pub fn clear_memory_traps(&mut self) -> usize {
        let n = self.memory_traps.len();
        self.memory_traps.clear();
        n
    }

    pub fn is_memory_trap(&self, addr: Word) -> bool {
        self.memory_traps.contains(&addr)
    }

    pub fn memory_traps(&self) -> Vec<Word> {
        sorted(&self.memory_traps)
    }

    pub fn set_instruction_trap(&mut self, op: Opcode) -> bool {
        self.instruction_traps.insert(op)
    }

    pub fn clear_instruction_trap(&mut self, op: Opcode) -> bool {
        self.instruction_traps.remove(&op)
    }

    pub fn clear_instruction_traps(&mut self) -> usize {
        let n = self.instruction_traps.len();
        self.instruction_traps.clear();
        n
    }

    pub fn is_instruction_trap(&self, op: Opcode) -> bool {
        self.instruction_traps.contains(&op)
    }

    pub fn instruction_traps(&self) -> Vec<Opcode> {
        let mut ops: Vec<_> = self.instruction_traps.iter().copied().collect();
        ops.sort();
        ops
    }

    /// Arms a suspension for the next non-single-step tick.
    pub fn defer(&mut self, cause: SuspendCause) {
        *self.pending.get_or_insert(SuspendCause::empty()) |= cause;
    }

    /// Collects every reason to suspend before executing the instruction at `ip`.
    ///
    /// `next_op` is the opcode stored at `ip`, if it decodes.
    pub fn check(&mut self, ip: Word, next_op: Option<Opcode>) -> SuspendCause {
        let mut cause = self.pending.take().unwrap_or(SuspendCause::empty());
        if self.pause.is_requested() {
            cause |= SuspendCause::PAUSE;
        }
        if self.is_breakpoint(ip) {
            cause |= SuspendCause::BREAKPOINT;
        }
        if next_op.is_some_and(|op| self.is_instruction_trap(op)) {
            cause |= SuspendCause::INSTRUCTION_TRAP;
        }
        cause
    }

    /// Returns to the running state, dropping the pause request.
    pub fn resume(&mut self) {
        self.pause.clear();
        self.pending = None;
        self.state = DebugState::Running;
    }
}

fn sorted(set: &FxHashSet<Word>) -> Vec<Word> {
    let mut v: Vec<_> = set.iter().copied().collect();
    v.sort_unstable();
    v
}
