use std::io::Write;

use crate::plat::{is_value, DestKind, Opcode, Word};

use super::{
    debug::{DebugControl, DebugState, Interrupt, SuspendCause},
    io::{LineSource, TermBuffer},
    machine::{Location, Machine},
    trace::{MemoryChange, TraceRecord, Tracer},
    EmuError, EmuResult,
};

/// The emulator's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmuState {
    /// The emulator is allowed to run.
    Continue,
    /// Execution is parked in the debug console.
    Pause,
    /// Halt execution. Nothing runs after this.
    Halt,
}

/// What the console wants to happen once it hands control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    Continue,
    Quit,
}

/// Receives control whenever the engine suspends.
///
/// The implementor gets full mutable access to the emulator for the duration of the
/// call and may single-step it with [`Emulator::tick`].
pub trait Suspend {
    fn suspend(&mut self, emu: &mut Emulator, cause: SuspendCause) -> EmuResult<Resume>;
}

/// Used when no console is attached: resumes on everything except running out of input.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl Suspend for Detached {
    fn suspend(&mut self, _emu: &mut Emulator, cause: SuspendCause) -> EmuResult<Resume> {
        if cause.contains(SuspendCause::END_OF_INPUT) {
            Ok(Resume::Quit)
        } else {
            Ok(Resume::Continue)
        }
    }
}

/// The main emulation context: machine state plus the debugging and I/O around it.
pub struct Emulator {
    pub machine: Machine,
    pub debug: DebugControl,
    pub tracer: Tracer,
    pub state: EmuState,
    /// Number of instructions dispatched so far.
    pub ticks: u64,
    pub(super) input: TermBuffer,
    pub(super) output: Box<dyn Write>,
}

impl Emulator {
    pub fn new(machine: Machine, input: Box<dyn LineSource>, output: Box<dyn Write>) -> Self {
        Self {
            machine,
            debug: DebugControl::default(),
            tracer: Tracer::new(),
            state: EmuState::Continue,
            ticks: 0,
            input: TermBuffer::new(input),
            output,
        }
    }

    /// Loads a little-endian program image into a new [Emulator] instance.
    ///
    /// # Errors
    ///
    /// This function will return an error if the image does not fit in memory.
    pub fn from_image(
        image: &[u8],
        input: Box<dyn LineSource>,
        output: Box<dyn Write>,
    ) -> EmuResult<Self> {
        Ok(Self::new(Machine::from_image(image)?, input, output))
    }

    /// Uses `pause` as the suspend-request flag, so it can be raised from elsewhere.
    pub fn with_interrupt(mut self, pause: Interrupt) -> Self {
        self.debug.pause = pause;
        self
    }

    /// Replaces the whole machine state, e.g. after loading a snapshot.
    /// Breakpoints, traps and the trace are kept.
    pub fn replace_machine(&mut self, machine: Machine) {
        self.machine = machine;
    }

    /// Runs the emulator, ticking until it reaches a halt state.
    pub fn run_until_halt<S: Suspend + ?Sized>(&mut self, console: &mut S) -> EmuResult<()> {
        while self.state != EmuState::Halt {
            self.tick(false, console)?;
        }
        self.output.flush()?;
        Ok(())
    }

    /// Executes one instruction.
    ///
    /// Unless `single_step` is set, the pause flag, breakpoints and traps are checked
    /// first and `console` is entered if any of them fire.
    pub fn tick<S: Suspend + ?Sized>(&mut self, single_step: bool, console: &mut S) -> EmuResult<()> {
        if self.state == EmuState::Halt {
            return Ok(());
        }
        if !single_step {
            let ip = self.machine.ip;
            let next_op = self
                .machine
                .ram
                .memory
                .get(ip as usize)
                .and_then(|&w| Opcode::try_from(w).ok());
            let cause = self.debug.check(ip, next_op);
            if !cause.is_empty() {
                self.suspend(console, cause)?;
                if self.state == EmuState::Halt {
                    return Ok(());
                }
            }
        }
        let result = self.step(console);
        if let Err(e) = &result {
            log::warn!("fault near {}: {}", self.machine.ip, e);
            self.machine.args.clear();
        }
        result
    }

    /// Hands control to `console` until it asks to resume or quit.
    pub fn suspend<S: Suspend + ?Sized>(
        &mut self,
        console: &mut S,
        cause: SuspendCause,
    ) -> EmuResult<Resume> {
        log::info!("suspended at {} ({:?})", self.machine.ip, cause);
        self.output.flush()?;
        let prev_state = self.state;
        let prev_debug = self.debug.state;
        self.state = EmuState::Pause;
        self.debug.state = DebugState::Suspended;

        let resume = console.suspend(self, cause)?;
        match resume {
            Resume::Continue => {
                self.debug.resume();
                self.debug.state = prev_debug;
                if self.state == EmuState::Pause {
                    self.state = prev_state;
                }
                log::info!("resuming at {}", self.machine.ip);
            }
            Resume::Quit => {
                self.state = EmuState::Halt;
                log::info!("quit requested at {}", self.machine.ip);
            }
        }
        Ok(resume)
    }

    fn step<S: Suspend + ?Sized>(&mut self, console: &mut S) -> EmuResult<()> {
        let ip = self.machine.ip;
        let word = self.machine.fetch()?;
        let op = Opcode::try_from(word).map_err(|_| EmuError::UnknownOpcode {
            opcode: word,
            at: ip,
        })?;

        for _ in 0..op.arity() {
            let w = self.machine.fetch()?;
            self.machine.args.push_raw(w);
        }
        log::debug!(">>> {}: {} {:?}", ip, op, self.machine.args.as_slice());

        let record = self
            .tracer
            .is_enabled()
            .then(|| TraceRecord::new(ip, op, self.machine.args.as_slice()));
        let watched = self.watched(op);

        self.ticks += 1;
        self.execute(op, console)?;

        let mut change = None;
        if let Some((location, old_value)) = watched {
            let new_value = self.machine.load(location)?;
            if new_value != old_value {
                change = Some(MemoryChange {
                    location,
                    old_value,
                    new_value,
                });
                if self.debug.is_memory_trap(location.address()) {
                    log::info!("memory trap: {} {} -> {}", location, old_value, new_value);
                    self.debug.defer(SuspendCause::MEMORY_TRAP);
                }
            }
        }
        if let Some(mut record) = record {
            record.change = change;
            self.tracer.push(record);
        }
        Ok(())
    }

    /// The location `op` is about to write and its current contents, if it can be known
    /// before dispatch.
    fn watched(&self, op: Opcode) -> Option<(Location, Word)> {
        let a = *self.machine.args.as_slice().first()?;
        let location = match op.dest()? {
            DestKind::Operand => self.machine.resolve_destination(a).ok()?,
            DestKind::Indirect => {
                let addr = self.machine.resolve_value(a).ok().filter(|&v| is_value(v))?;
                Location::Memory(addr)
            }
        };
        let old = self.machine.load(location).ok()?;
        Some((location, old))
    }
}
