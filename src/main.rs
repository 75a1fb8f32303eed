use std::{
    fs,
    io::{self, IsTerminal},
    path::PathBuf,
    process::ExitCode,
    thread,
};

use anyhow::{Context, Result};
use clap::Parser;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use syn16::{
    asm,
    emu::{
        debug::{Interrupt, SuspendCause},
        debugger::Debugger,
        emulator::Emulator,
        io::{LineSource, Readline, StdinLines},
        ram::words_to_le_bytes,
    },
};

/// Runs a 16-bit word VM image under a debug console.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Program image of little-endian words (assembly source with --asm).
    image: PathBuf,

    /// More log output on stderr; repeat for more detail.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Set a breakpoint before starting. May be repeated.
    #[arg(short = 'b', long = "break-at", value_name = "ADDR")]
    break_at: Vec<u16>,

    /// Enter the debug console before the first instruction.
    #[arg(long)]
    pause: bool,

    /// Record a trace from the first instruction.
    #[arg(long)]
    trace: bool,

    /// Enter the debug console when the program faults.
    #[arg(long)]
    debug_on_fault: bool,

    /// Treat the input file as assembly source.
    #[arg(long)]
    asm: bool,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(e) = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("could not set up logging: {}", e);
    }
}

/// Interactive editing on a terminal, plain lines otherwise.
fn line_source() -> Result<Box<dyn LineSource>> {
    if io::stdin().is_terminal() {
        Ok(Box::new(Readline::new()?))
    } else {
        Ok(Box::new(StdinLines))
    }
}

/// Raises `pause` on every Ctrl-C.
fn spawn_interrupt_listener(pause: Interrupt) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("interrupt".into())
        .spawn(move || {
            rt.block_on(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("interrupt requested");
                    pause.request();
                }
            })
        })?;
    Ok(())
}

fn load_image(args: &Args) -> Result<Vec<u8>> {
    if args.asm {
        let source = fs::read_to_string(&args.image)
            .with_context(|| format!("reading {}", args.image.display()))?;
        let words = asm::assemble(&source)
            .with_context(|| format!("assembling {}", args.image.display()))?;
        Ok(words_to_le_bytes(&words))
    } else {
        fs::read(&args.image).with_context(|| format!("reading {}", args.image.display()))
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let image = load_image(&args)?;
    let pause = Interrupt::new();
    spawn_interrupt_listener(pause.clone())?;

    let mut emu = Emulator::from_image(&image, line_source()?, Box::new(io::stdout()))?
        .with_interrupt(pause.clone());
    for addr in args.break_at {
        emu.debug.set_breakpoint(addr);
    }
    if args.trace {
        emu.tracer.start();
    }
    if args.pause {
        pause.request();
    }
    log::info!("loaded {} bytes from {}", image.len(), args.image.display());

    let mut console = Debugger::new(line_source()?, Box::new(io::stdout()));
    match emu.run_until_halt(&mut console) {
        Ok(()) => {
            log::info!("halted after {} instructions", emu.ticks);
            Ok(ExitCode::SUCCESS)
        }
        Err(fault) => {
            log::error!("fault near {}: {}", emu.machine.ip, fault);
            if args.debug_on_fault {
                emu.suspend(&mut console, SuspendCause::FAULT)?;
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
