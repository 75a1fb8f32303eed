//! The interactive debug console.
//!
//! Commands are looked up by name in [COMMANDS]. Every handled command is followed by a
//! `READY` line so the console can be driven by another program.

use std::{
    fs,
    io::Write,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Result;
use thiserror::Error;

use crate::{
    asm::disassemble,
    plat::{Opcode, Register, Word, MEMORY_SIZE, REGISTER_COUNT},
};

use super::{
    debug::SuspendCause,
    emulator::{EmuState, Emulator, Resume, Suspend},
    io::LineSource,
    machine::Machine,
    snapshot, EmuResult,
};

const PROMPT: &str = "dbg> ";

/// An error in a console command line. Reported inline; the console keeps running.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("`{0}` is not a number")]
    BadNumber(String),
    #[error("{what} {value} out of range (must be < {limit})")]
    OutOfRange {
        what: &'static str,
        value: u64,
        limit: usize,
    },
    #[error("unknown opcode `{0}`")]
    UnknownOpcode(String),
    #[error("no previous command to repeat")]
    NothingToRepeat,
    #[error("the program is waiting for input, `go` resumes it with an empty line")]
    InputPending,
}

/// How a command's arguments are taken from the rest of the line.
#[derive(Debug, Clone, Copy)]
pub enum ArgMode {
    /// Whitespace separated tokens, between `min` and `max` of them.
    Tokens { min: usize, max: usize },
    /// The rest of the line verbatim, e.g. a file name that may contain spaces.
    RawLine { required: bool },
}

/// Parsed arguments handed to a command.
#[derive(Debug)]
pub struct Args<'a> {
    pub tokens: Vec<&'a str>,
    pub raw: Option<&'a str>,
}

/// What the console does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Stay,
    Leave(Resume),
}

type Handler = fn(&mut Debugger, &mut Emulator, &Args) -> Result<Flow>;

/// One entry of the command registry.
pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub args: ArgMode,
    run: Handler,
}

const fn tokens(min: usize, max: usize) -> ArgMode {
    ArgMode::Tokens { min, max }
}

const fn raw(required: bool) -> ArgMode {
    ArgMode::RawLine { required }
}

macro_rules! command {
    ($name:literal, $usage:literal, $help:literal, $args:expr, $run:expr) => {
        Command {
            name: $name,
            usage: $usage,
            help: $help,
            args: $args,
            run: $run,
        }
    };
}

pub static COMMANDS: &[Command] = &[
    command!("help", "help", "show this list", tokens(0, 0), cmd_help),
    command!(
        "showasm",
        "showasm [from] [to]",
        "print a listing of memory",
        tokens(0, 2),
        cmd_showasm
    ),
    command!(
        "saveasm",
        "saveasm [file]",
        "save a listing of all memory to [file] or sc_<millis>_asm.txt",
        raw(false),
        cmd_saveasm
    ),
    command!("go", "go", "resume the program", tokens(0, 0), cmd_go),
    command!("quit", "quit", "exit the program", tokens(0, 0), cmd_quit),
    command!("getip", "getip", "print the instruction pointer", tokens(0, 0), cmd_getip),
    command!("setip", "setip <addr>", "set the instruction pointer", tokens(1, 1), cmd_setip),
    command!("getmem", "getmem <addr>", "print the memory at <addr>", tokens(1, 1), cmd_getmem),
    command!(
        "setmem",
        "setmem <addr> <val>",
        "set the memory at <addr> to <val>",
        tokens(2, 2),
        cmd_setmem
    ),
    command!("getreg", "getreg <0-7>", "print a register", tokens(1, 1), cmd_getreg),
    command!(
        "setreg",
        "setreg <0-7> <val>",
        "set a register to <val>",
        tokens(2, 2),
        cmd_setreg
    ),
    command!(
        "getregs",
        "getregs",
        "print all registers and the instruction pointer",
        tokens(0, 0),
        cmd_getregs
    ),
    command!(
        "showargstack",
        "showargstack",
        "print the argument stack",
        tokens(0, 0),
        cmd_showargstack
    ),
    command!(
        "showprogstack",
        "showprogstack",
        "print the program stack",
        tokens(0, 0),
        cmd_showprogstack
    ),
    command!(
        "tick",
        "tick [n]",
        "execute the next [n] instructions, ignoring breakpoints",
        tokens(0, 1),
        cmd_tick
    ),
    command!("getbps", "getbps", "print all breakpoints", tokens(0, 0), cmd_getbps),
    command!("clearbps", "clearbps", "clear all breakpoints", tokens(0, 0), cmd_clearbps),
    command!("setbp", "setbp <addr>", "set a breakpoint at <addr>", tokens(1, 1), cmd_setbp),
    command!(
        "clearbp",
        "clearbp <addr>",
        "clear the breakpoint at <addr>",
        tokens(1, 1),
        cmd_clearbp
    ),
    command!("getmtraps", "getmtraps", "print all memory traps", tokens(0, 0), cmd_getmtraps),
    command!(
        "clearmtraps",
        "clearmtraps",
        "clear all memory traps",
        tokens(0, 0),
        cmd_clearmtraps
    ),
    command!(
        "setmtrap",
        "setmtrap <addr>",
        "suspend after <addr> changes (32768-32775 are registers)",
        tokens(1, 1),
        cmd_setmtrap
    ),
    command!(
        "clearmtrap",
        "clearmtrap <addr>",
        "clear the memory trap at <addr>",
        tokens(1, 1),
        cmd_clearmtrap
    ),
    command!(
        "getitraps",
        "getitraps",
        "print all instruction traps",
        tokens(0, 0),
        cmd_getitraps
    ),
    command!(
        "clearitraps",
        "clearitraps",
        "clear all instruction traps",
        tokens(0, 0),
        cmd_clearitraps
    ),
    command!(
        "setitrap",
        "setitrap <opcode>",
        "suspend before any <opcode> instruction",
        tokens(1, 1),
        cmd_setitrap
    ),
    command!(
        "clearitrap",
        "clearitrap <opcode>",
        "clear the instruction trap on <opcode>",
        tokens(1, 1),
        cmd_clearitrap
    ),
    command!(
        "savestate",
        "savestate [file]",
        "save the machine state to [file] or sc_<millis>_state.bin",
        raw(false),
        cmd_savestate
    ),
    command!(
        "loadstate",
        "loadstate <file>",
        "load the machine state from <file>",
        raw(true),
        cmd_loadstate
    ),
    command!("starttrace", "starttrace", "start a new trace", tokens(0, 0), cmd_starttrace),
    command!("stoptrace", "stoptrace", "stop tracing", tokens(0, 0), cmd_stoptrace),
    command!(
        "savetrace",
        "savetrace [file]",
        "save the trace as JSON to [file] or sc_<millis>_trace.json",
        raw(false),
        cmd_savetrace
    ),
];

/// Looks a command up by name.
pub fn lookup(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|cmd| cmd.name == name)
}

impl Command {
    fn parse<'a>(&self, rest: &'a str) -> Result<Args<'a>, ConsoleError> {
        match self.args {
            ArgMode::Tokens { min, max } => {
                let tokens: Vec<_> = rest.split_whitespace().collect();
                if !(min..=max).contains(&tokens.len()) {
                    return Err(ConsoleError::Usage(self.usage));
                }
                Ok(Args { tokens, raw: None })
            }
            ArgMode::RawLine { required } => {
                let raw = Some(rest.trim()).filter(|s| !s.is_empty());
                if required && raw.is_none() {
                    return Err(ConsoleError::Usage(self.usage));
                }
                Ok(Args {
                    tokens: vec![],
                    raw,
                })
            }
        }
    }
}

/// The console. Entered whenever the engine suspends.
pub struct Debugger {
    source: Box<dyn LineSource>,
    out: Box<dyn Write>,
    last_line: Option<String>,
    /// Why the innermost open console was entered.
    cause: SuspendCause,
}

impl Debugger {
    pub fn new(source: Box<dyn LineSource>, out: Box<dyn Write>) -> Self {
        Self {
            source,
            out,
            last_line: None,
            cause: SuspendCause::empty(),
        }
    }

    /// Handles one console line. Returns `Some` when the console should be left.
    pub fn execute_line(&mut self, emu: &mut Emulator, line: &str) -> EmuResult<Option<Resume>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let line = if line == "r" {
            match self.last_line.clone() {
                Some(prev) => prev,
                None => {
                    writeln!(self.out, "ERROR: {}", ConsoleError::NothingToRepeat)?;
                    writeln!(self.out, "READY")?;
                    return Ok(None);
                }
            }
        } else {
            self.last_line = Some(line.to_owned());
            line.to_owned()
        };

        let (name, rest) = line.split_once([' ', '\t']).unwrap_or((line.as_str(), ""));
        let Some(cmd) = lookup(name) else {
            writeln!(self.out, "ERROR\n")?;
            self.print_help()?;
            writeln!(self.out, "READY")?;
            return Ok(None);
        };

        let result = cmd
            .parse(rest)
            .map_err(anyhow::Error::from)
            .and_then(|args| (cmd.run)(self, emu, &args));
        match result {
            Ok(Flow::Leave(resume)) => return Ok(Some(resume)),
            Ok(Flow::Stay) => {}
            Err(e) => writeln!(self.out, "ERROR: {:#}", e)?,
        }
        writeln!(self.out, "READY")?;
        Ok(None)
    }

    fn print_help(&mut self) -> std::io::Result<()> {
        writeln!(self.out, "Valid commands are:")?;
        for cmd in COMMANDS {
            writeln!(self.out, "{} -> {}", cmd.usage, cmd.help)?;
        }
        writeln!(self.out, "r -> repeat the previous command")?;
        writeln!(self.out)
    }
}

impl Debugger {
    fn console_loop(&mut self, emu: &mut Emulator) -> EmuResult<Resume> {
        loop {
            self.out.flush()?;
            let Some(line) = self.source.read_line(PROMPT)? else {
                writeln!(self.out, "End of console input, exiting")?;
                return Ok(Resume::Quit);
            };
            if let Some(resume) = self.execute_line(emu, &line)? {
                return Ok(resume);
            }
        }
    }
}

impl Suspend for Debugger {
    fn suspend(&mut self, emu: &mut Emulator, cause: SuspendCause) -> EmuResult<Resume> {
        let why: Vec<_> = cause
            .iter_names()
            .map(|(name, _)| name.to_ascii_lowercase().replace('_', " "))
            .collect();
        writeln!(
            self.out,
            "Debugging console ({}) at {}, `help` lists commands",
            why.join(", "),
            emu.machine.ip
        )?;
        writeln!(self.out, "READY")?;
        let outer = std::mem::replace(&mut self.cause, cause);
        let resume = self.console_loop(emu);
        self.cause = outer;
        resume
    }
}

/// Parses a decimal or `0x` hex number.
fn parse_number(s: &str) -> Result<u64, ConsoleError> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| ConsoleError::BadNumber(s.to_owned()))
}

/// Parses a number that must be below `limit`.
fn parse_below(s: &str, what: &'static str, limit: usize) -> Result<Word, ConsoleError> {
    let value = parse_number(s)?;
    if value >= limit as u64 {
        return Err(ConsoleError::OutOfRange { what, value, limit });
    }
    Ok(value as Word)
}

fn parse_addr(s: &str) -> Result<Word, ConsoleError> {
    parse_below(s, "address", MEMORY_SIZE)
}

fn parse_register(s: &str) -> Result<Register, ConsoleError> {
    let n = parse_below(s, "register", REGISTER_COUNT)?;
    Register::try_from(n as u8).map_err(|_| ConsoleError::BadNumber(s.to_owned()))
}

fn parse_opcode(s: &str) -> Result<Opcode, ConsoleError> {
    s.parse().map_err(|_| ConsoleError::UnknownOpcode(s.to_owned()))
}

/// `sc_<millis since epoch><suffix>.<extension>`
fn unique_file_name(suffix: &str, extension: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("sc_{}{}.{}", millis, suffix, extension)
}

fn cmd_help(dbg: &mut Debugger, _: &mut Emulator, _: &Args) -> Result<Flow> {
    dbg.print_help()?;
    Ok(Flow::Stay)
}

fn cmd_showasm(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let from = args.tokens.first().map(|s| parse_number(s)).transpose()?;
    let to = args.tokens.get(1).map(|s| parse_number(s)).transpose()?;
    let listing = disassemble(
        &emu.machine.ram.memory,
        emu.machine.registers.values(),
        from.unwrap_or(0) as usize,
        to.map_or(MEMORY_SIZE - 1, |to| to as usize),
    );
    write!(dbg.out, "{}\n\n", listing)?;
    Ok(Flow::Stay)
}

fn cmd_saveasm(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let name = args
        .raw
        .map_or_else(|| unique_file_name("_asm", "txt"), str::to_owned);
    let listing = disassemble(
        &emu.machine.ram.memory,
        emu.machine.registers.values(),
        0,
        MEMORY_SIZE - 1,
    );
    fs::write(&name, listing)?;
    log::info!("saved listing to {}", name);
    writeln!(dbg.out, "Saved file to {}", name)?;
    Ok(Flow::Stay)
}

fn cmd_go(dbg: &mut Debugger, _: &mut Emulator, _: &Args) -> Result<Flow> {
    writeln!(dbg.out, "Resuming program\n")?;
    Ok(Flow::Leave(Resume::Continue))
}

fn cmd_quit(dbg: &mut Debugger, _: &mut Emulator, _: &Args) -> Result<Flow> {
    writeln!(dbg.out, "Exiting program\n")?;
    Ok(Flow::Leave(Resume::Quit))
}

fn cmd_getip(dbg: &mut Debugger, emu: &mut Emulator, _: &Args) -> Result<Flow> {
    writeln!(dbg.out, "Current instruction ptr is {}", emu.machine.ip)?;
    Ok(Flow::Stay)
}

fn cmd_setip(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let addr = parse_addr(args.tokens[0])?;
    emu.machine.ip = addr;
    writeln!(dbg.out, "Setting instruction ptr to {}", addr)?;
    Ok(Flow::Stay)
}

fn cmd_getmem(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let addr = parse_addr(args.tokens[0])?;
    let value = emu.machine.ram.memory[addr as usize];
    writeln!(dbg.out, "Memory at address {} has a value of {}", addr, value)?;
    Ok(Flow::Stay)
}

fn cmd_setmem(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let addr = parse_addr(args.tokens[0])?;
    let value = parse_below(args.tokens[1], "value", Word::MAX as usize + 1)?;
    emu.machine.ram.memory[addr as usize] = value;
    writeln!(dbg.out, "Setting memory at address {} to {}", addr, value)?;
    Ok(Flow::Stay)
}

fn cmd_getreg(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let reg = parse_register(args.tokens[0])?;
    let value = emu.machine.registers.get(reg);
    writeln!(dbg.out, "Register {} has a value of {}", reg.index(), value)?;
    Ok(Flow::Stay)
}

fn cmd_setreg(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let reg = parse_register(args.tokens[0])?;
    let value = parse_below(args.tokens[1], "value", MEMORY_SIZE)?;
    emu.machine.registers.set(reg, value);
    writeln!(dbg.out, "Setting register {} to {}", reg.index(), value)?;
    Ok(Flow::Stay)
}

fn cmd_getregs(dbg: &mut Debugger, emu: &mut Emulator, _: &Args) -> Result<Flow> {
    writeln!(dbg.out, "Current register values")?;
    for (n, value) in emu.machine.registers.values().iter().enumerate() {
        writeln!(dbg.out, "REG{}: {}", n, value)?;
    }
    writeln!(dbg.out, "Instruction ptr: {}\n", emu.machine.ip)?;
    Ok(Flow::Stay)
}

fn print_stack(dbg: &mut Debugger, title: &str, words: &[Word]) -> Result<Flow> {
    writeln!(dbg.out, "Current {} stack({})", title, words.len())?;
    for (n, w) in words.iter().enumerate() {
        writeln!(dbg.out, "{}: {}", n, w)?;
    }
    Ok(Flow::Stay)
}

fn cmd_showargstack(dbg: &mut Debugger, emu: &mut Emulator, _: &Args) -> Result<Flow> {
    print_stack(dbg, "argument", emu.machine.args.as_slice())
}

fn cmd_showprogstack(dbg: &mut Debugger, emu: &mut Emulator, _: &Args) -> Result<Flow> {
    print_stack(dbg, "program", emu.machine.stack.as_slice())
}

fn cmd_tick(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    // IN is still mid-dispatch.
    if dbg.cause.contains(SuspendCause::END_OF_INPUT) {
        return Err(ConsoleError::InputPending.into());
    }
    let n = args.tokens.first().map(|s| parse_number(s)).transpose()?.unwrap_or(1);
    for _ in 0..n {
        if emu.state == EmuState::Halt {
            break;
        }
        emu.tick(true, dbg)?;
    }
    if emu.state == EmuState::Halt {
        writeln!(dbg.out, "Program halted")?;
    }
    writeln!(dbg.out, "Current instruction ptr is {}", emu.machine.ip)?;
    Ok(Flow::Stay)
}

fn print_list<T: std::fmt::Display>(dbg: &mut Debugger, title: &str, items: &[T]) -> Result<Flow> {
    writeln!(dbg.out, "Current {}({})", title, items.len())?;
    for item in items {
        writeln!(dbg.out, "{}", item)?;
    }
    Ok(Flow::Stay)
}

fn cmd_getbps(dbg: &mut Debugger, emu: &mut Emulator, _: &Args) -> Result<Flow> {
    print_list(dbg, "breakpoints", &emu.debug.breakpoints())
}

fn cmd_clearbps(dbg: &mut Debugger, emu: &mut Emulator, _: &Args) -> Result<Flow> {
    let n = emu.debug.clear_breakpoints();
    writeln!(dbg.out, "Clearing {} breakpoints", n)?;
    Ok(Flow::Stay)
}

fn cmd_setbp(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let addr = parse_addr(args.tokens[0])?;
    emu.debug.set_breakpoint(addr);
    writeln!(dbg.out, "Setting breakpoint at {}", addr)?;
    Ok(Flow::Stay)
}

fn cmd_clearbp(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let addr = parse_addr(args.tokens[0])?;
    emu.debug.clear_breakpoint(addr);
    writeln!(dbg.out, "Clearing breakpoint at {}", addr)?;
    Ok(Flow::Stay)
}

fn parse_trap_addr(s: &str) -> Result<Word, ConsoleError> {
    parse_below(s, "address", MEMORY_SIZE + REGISTER_COUNT)
}

fn cmd_getmtraps(dbg: &mut Debugger, emu: &mut Emulator, _: &Args) -> Result<Flow> {
    let traps: Vec<_> = emu
        .debug
        .memory_traps()
        .into_iter()
        .filter_map(Machine::location_of)
        .collect();
    print_list(dbg, "memory traps", &traps)
}

fn cmd_clearmtraps(dbg: &mut Debugger, emu: &mut Emulator, _: &Args) -> Result<Flow> {
    let n = emu.debug.clear_memory_traps();
    writeln!(dbg.out, "Clearing {} memory traps", n)?;
    Ok(Flow::Stay)
}

fn cmd_setmtrap(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let addr = parse_trap_addr(args.tokens[0])?;
    emu.debug.set_memory_trap(addr);
    writeln!(dbg.out, "Setting memory trap at {}", addr)?;
    Ok(Flow::Stay)
}

fn cmd_clearmtrap(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let addr = parse_trap_addr(args.tokens[0])?;
    emu.debug.clear_memory_trap(addr);
    writeln!(dbg.out, "Clearing memory trap at {}", addr)?;
    Ok(Flow::Stay)
}

fn cmd_getitraps(dbg: &mut Debugger, emu: &mut Emulator, _: &Args) -> Result<Flow> {
    print_list(dbg, "instruction traps", &emu.debug.instruction_traps())
}

fn cmd_clearitraps(dbg: &mut Debugger, emu: &mut Emulator, _: &Args) -> Result<Flow> {
    let n = emu.debug.clear_instruction_traps();
    writeln!(dbg.out, "Clearing {} instruction traps", n)?;
    Ok(Flow::Stay)
}

fn cmd_setitrap(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let op = parse_opcode(args.tokens[0])?;
    emu.debug.set_instruction_trap(op);
    writeln!(dbg.out, "Setting instruction trap on {}", op)?;
    Ok(Flow::Stay)
}

fn cmd_clearitrap(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let op = parse_opcode(args.tokens[0])?;
    emu.debug.clear_instruction_trap(op);
    writeln!(dbg.out, "Clearing instruction trap on {}", op)?;
    Ok(Flow::Stay)
}

fn cmd_savestate(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let name = args
        .raw
        .map_or_else(|| unique_file_name("_state", "bin"), str::to_owned);
    snapshot::save_to_file(&emu.machine, &name)?;
    writeln!(dbg.out, "State saved to file '{}'", name)?;
    Ok(Flow::Stay)
}

fn cmd_loadstate(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let name = args.raw.unwrap_or_default();
    emu.replace_machine(snapshot::load_from_file(name)?);
    writeln!(dbg.out, "Loaded state from file '{}'", name)?;
    Ok(Flow::Stay)
}

fn cmd_starttrace(dbg: &mut Debugger, emu: &mut Emulator, _: &Args) -> Result<Flow> {
    emu.tracer.start();
    writeln!(dbg.out, "Trace started")?;
    Ok(Flow::Stay)
}

fn cmd_stoptrace(dbg: &mut Debugger, emu: &mut Emulator, _: &Args) -> Result<Flow> {
    emu.tracer.stop();
    writeln!(
        dbg.out,
        "Trace stopped with {} records",
        emu.tracer.records().len()
    )?;
    Ok(Flow::Stay)
}

fn cmd_savetrace(dbg: &mut Debugger, emu: &mut Emulator, args: &Args) -> Result<Flow> {
    let name = args
        .raw
        .map_or_else(|| unique_file_name("_trace", "json"), str::to_owned);
    fs::write(&name, emu.tracer.export()?)?;
    log::info!("saved trace to {}", name);
    writeln!(dbg.out, "Trace saved to file '{}'", name)?;
    Ok(Flow::Stay)
}

#[cfg(test)]
mod tests {
    use crate::emu::{
        emulator::tests::{emulator, SharedBuf},
        io::Script,
    };

    use super::*;

    /// Scenario A with a breakpoint on the OUT instruction.
    const PROGRAM: [Word; 7] = [9, 32768, 60, 5, 19, 32768, 0];

    fn console(lines: &[&str]) -> (Debugger, SharedBuf) {
        let out = SharedBuf::default();
        let dbg = Debugger::new(
            Box::new(Script::new(lines.iter().copied())),
            Box::new(out.clone()),
        );
        (dbg, out)
    }

    fn session(lines: &[&str]) -> (Emulator, String, String) {
        let (mut emu, program_out) = emulator(&PROGRAM, &[]);
        emu.debug.set_breakpoint(4);
        let (mut dbg, out) = console(lines);
        emu.run_until_halt(&mut dbg).unwrap();
        (emu, program_out.text(), out.text())
    }

    fn temp_path(name: &str) -> String {
        let mut path = std::env::temp_dir();
        path.push(format!("syn16_{}_{}", std::process::id(), name));
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_breakpoint_session() {
        let (emu, program, out) = session(&["getip", "getreg 0", "go"]);
        assert_eq!(program, "A");
        assert_eq!(emu.state, EmuState::Halt);
        assert!(out.starts_with("Debugging console (breakpoint) at 4"));
        assert!(out.contains("Current instruction ptr is 4\nREADY\n"));
        assert!(out.contains("Register 0 has a value of 65\nREADY\n"));
        assert!(out.ends_with("Resuming program\n\n"));
    }

    #[test]
    fn test_tick_does_not_retrigger_breakpoint() {
        let (emu, program, out) = session(&["tick", "getip", "go"]);
        assert_eq!(program, "A");
        assert_eq!(out.matches("Debugging console").count(), 1);
        assert!(out.contains("Current instruction ptr is 6"));
        assert_eq!(emu.ticks, 3);
    }

    #[test]
    fn test_tick_refused_while_input_pending() {
        // IN R0; OUT R0; HALT
        let (mut emu, program_out) = emulator(&[20, 32768, 19, 32768, 0], &[]);
        let (mut dbg, out) = console(&["tick", "getip", "go"]);
        emu.run_until_halt(&mut dbg).unwrap();
        assert_eq!(program_out.text(), "\n");
        assert_eq!(emu.ticks, 3);
        let out = out.text();
        assert!(out.starts_with("Debugging console (end of input) at 2"));
        assert!(out.contains("ERROR: the program is waiting for input"));
        assert!(out.contains("Current instruction ptr is 2\nREADY\n"));
        assert_eq!(dbg.cause, SuspendCause::empty());
    }

    #[test]
    fn test_tick_until_halt() {
        let (emu, _, out) = session(&["tick 5", "go"]);
        assert!(out.contains("Program halted\nCurrent instruction ptr is 7\nREADY\n"));
        assert_eq!(emu.ticks, 3);
    }

    #[test]
    fn test_repeat_previous_line() {
        let (mut emu, _) = emulator(&[21, 21, 21, 0], &[]);
        let (mut dbg, out) = console(&[]);
        assert_eq!(dbg.execute_line(&mut emu, "r").unwrap(), None);
        assert!(out.text().contains("ERROR: no previous command to repeat"));
        dbg.execute_line(&mut emu, "tick").unwrap();
        dbg.execute_line(&mut emu, "r").unwrap();
        dbg.execute_line(&mut emu, "r").unwrap();
        assert_eq!(emu.machine.ip, 3);
    }

    #[test]
    fn test_unknown_command_prints_help() {
        let (_, _, out) = session(&["frobnicate", "go"]);
        assert!(out.contains("ERROR\n\nValid commands are:\n"));
        assert!(out.contains("setbp <addr> -> set a breakpoint at <addr>\n"));
    }

    #[test]
    fn test_bad_arguments_are_reported_inline() {
        let (emu, _, out) = session(&[
            "setreg 0 40000",
            "setreg 9 1",
            "getmem",
            "setip banana",
            "setitrap frob",
            "go",
        ]);
        assert!(out.contains("ERROR: value 40000 out of range (must be < 32768)\nREADY\n"));
        assert!(out.contains("ERROR: register 9 out of range (must be < 8)\nREADY\n"));
        assert!(out.contains("ERROR: usage: getmem <addr>\nREADY\n"));
        assert!(out.contains("ERROR: `banana` is not a number\nREADY\n"));
        assert!(out.contains("ERROR: unknown opcode `frob`\nREADY\n"));
        assert_eq!(emu.machine.registers.get(Register::R0), 65);
    }

    #[test]
    fn test_quit_stops_the_program() {
        let (emu, program, out) = session(&["quit"]);
        assert_eq!(program, "");
        assert_eq!(emu.state, EmuState::Halt);
        assert!(out.ends_with("Exiting program\n\n"));
    }

    #[test]
    fn test_console_eof_quits() {
        let (emu, program, out) = session(&["getip"]);
        assert_eq!(program, "");
        assert_eq!(emu.state, EmuState::Halt);
        assert!(out.ends_with("End of console input, exiting\n"));
    }

    #[test]
    fn test_edit_machine_state() {
        let (emu, program, out) = session(&["setreg 0 66", "setmem 100 0x20", "go"]);
        assert_eq!(program, "B");
        assert_eq!(emu.machine.ram.memory[100], 32);
        assert!(out.contains("Setting register 0 to 66\n"));
    }

    #[test]
    fn test_watch_lists() {
        let (mut emu, _) = emulator(&[0], &[]);
        let (mut dbg, out) = console(&[]);
        for line in [
            "setbp 30",
            "setbp 0x4",
            "getbps",
            "clearbp 30",
            "setmtrap 32775",
            "setmtrap 32776",
            "getmtraps",
            "setitrap out",
            "setitrap WMEM",
            "getitraps",
            "clearitrap out",
            "clearitraps",
        ] {
            assert_eq!(dbg.execute_line(&mut emu, line).unwrap(), None);
        }
        let text = out.text();
        assert!(text.contains("Current breakpoints(2)\n4\n30\nREADY\n"));
        assert!(text.contains("ERROR: address 32776 out of range (must be < 32776)"));
        assert!(text.contains("Current memory traps(1)\nR7\nREADY\n"));
        assert!(text.contains("Current instruction traps(2)\nWMEM\nOUT\nREADY\n"));
        assert!(text.contains("Clearing 1 instruction traps\n"));
        assert_eq!(emu.debug.breakpoints(), vec![4]);
        assert!(emu.debug.instruction_traps().is_empty());
    }

    #[test]
    fn test_state_round_trip_through_files() {
        let path = temp_path("state.bin");
        let (mut emu, _) = emulator(&PROGRAM, &[]);
        let (mut dbg, out) = console(&[]);
        dbg.execute_line(&mut emu, &format!("savestate {}", path)).unwrap();
        dbg.execute_line(&mut emu, "tick 2").unwrap();
        assert_eq!(emu.machine.ip, 6);
        dbg.execute_line(&mut emu, &format!("loadstate {}", path)).unwrap();
        assert_eq!(emu.machine.ip, 0);
        assert_eq!(emu.machine.registers.get(Register::R0), 0);
        assert!(out.text().contains(&format!("Loaded state from file '{}'", path)));

        dbg.execute_line(&mut emu, "loadstate").unwrap();
        assert!(out.text().contains("ERROR: usage: loadstate <file>"));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_trace_commands() {
        let path = temp_path("trace.json");
        let (mut emu, _) = emulator(&PROGRAM, &[]);
        let (mut dbg, out) = console(&[]);
        for line in ["starttrace", "tick 2", "stoptrace", "tick"] {
            dbg.execute_line(&mut emu, line).unwrap();
        }
        dbg.execute_line(&mut emu, &format!("savetrace {}", path)).unwrap();
        assert!(out.text().contains("Trace stopped with 2 records"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["op_code"]["name"], "ADD");
        assert_eq!(entries[1]["op_code"]["param_a"], "R0");
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_showasm() {
        let (mut emu, _) = emulator(&PROGRAM, &[]);
        let (mut dbg, out) = console(&[]);
        dbg.execute_line(&mut emu, "showasm 0 6").unwrap();
        assert_eq!(
            out.text(),
            "0: ADD  R0(0)  60'<'  5\n4: OUT R0(0)\n6: HALT\n\n\nREADY\n"
        );
    }

    #[test]
    fn test_end_of_input_enters_console() {
        // IN R0; OUT R0; HALT
        let (mut emu, program_out) = emulator(&[20, 32768, 19, 32768, 0], &[]);
        let (mut dbg, out) = console(&["setreg 1 7", "go"]);
        emu.run_until_halt(&mut dbg).unwrap();
        assert!(out.text().starts_with("Debugging console (end of input) at 2"));
        assert_eq!(program_out.text(), "\n");
        assert_eq!(emu.machine.registers.get(Register::R1), 7);
    }

    #[test]
    fn test_registry_names_are_unique() {
        for (i, cmd) in COMMANDS.iter().enumerate() {
            assert!(COMMANDS[i + 1..].iter().all(|other| other.name != cmd.name));
            assert!(cmd.usage.starts_with(cmd.name));
        }
        assert!(lookup("r").is_none());
    }
}
