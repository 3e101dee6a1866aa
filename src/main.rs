//! accsim - CLI Entry Point
//!
//! Commands:
//! - `accsim run <program>` - Run an assembly source or listing
//! - `accsim asm <source>` - Translate assembly to a listing
//! - `accsim list <listing>` - Numbered dump of a listing
//! - `accsim debug <program>` - Interactive debugger

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use accsim::cpu::ControlUnit;
use accsim::machine::{drive, load_input, load_program};
use accsim::{assemble, disassemble, load_listing, save_listing, Instruction};

#[derive(Parser)]
#[command(name = "accsim")]
#[command(version)]
#[command(about = "A cycle-accurate accumulator machine simulator")]
struct Cli {
    /// Log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Assembly source (.asm) or instruction listing
        program: PathBuf,
        /// File fed to the input port
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Stop after this many clock cycles
        #[arg(long)]
        max_ticks: Option<u64>,
        /// Print the machine state before every tick
        #[arg(short, long)]
        trace: bool,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Translate assembly to an instruction listing
    Asm {
        /// Path to the source file
        source: PathBuf,
        /// Output listing file (default: <source>.lst)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the symbol table
        #[arg(long)]
        symbols: bool,
    },
    /// Numbered dump of an instruction listing
    List {
        /// Path to the listing file
        listing: PathBuf,
    },
    /// Interactive debugger
    Debug {
        /// Assembly source (.asm) or instruction listing
        program: PathBuf,
        /// File fed to the input port
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run { program, input, max_ticks, trace, json } => {
            run_program(&program, input.as_deref(), max_ticks, trace, json);
        }
        Commands::Asm { source, output, symbols } => {
            assemble_file(&source, output, symbols);
        }
        Commands::List { listing } => {
            list_file(&listing);
        }
        Commands::Debug { program, input } => {
            debug_program(&program, input.as_deref());
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Unwrap a result or report the error and exit.
fn or_exit<T, E: std::fmt::Display>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            eprintln!("❌ {}: {}", context, e);
            std::process::exit(1);
        }
    }
}

fn load(path: &Path, input: Option<&Path>) -> (Vec<Instruction>, String) {
    let program = or_exit(load_program(path), "Failed to load program");
    let input = or_exit(load_input(input), "Failed to read input");
    (program, input)
}

fn run_program(
    path: &Path,
    input: Option<&Path>,
    max_ticks: Option<u64>,
    trace: bool,
    json: bool,
) {
    let (program, input) = load(path, input);
    let mut cu = or_exit(ControlUnit::new(program, input.chars()), "Failed to start machine");

    let result = drive(&mut cu, max_ticks, |snapshot| {
        if trace {
            println!("{}", snapshot);
        }
    });
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if !json {
                print!("{}", cu.output());
            }
            eprintln!("❌ Simulation error at PC={}: {}", cu.pc(), e);
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", or_exit(serde_json::to_string_pretty(&report), "Failed to encode report"));
        return;
    }

    print!("{}", report.output);
    if !report.output.is_empty() && !report.output.ends_with('\n') {
        println!();
    }
    eprintln!(
        "ticks: {}  instructions: {}  acc: {}  N|Z: {}|{}",
        report.ticks,
        report.instructions,
        report.accumulator,
        u8::from(report.flags.negative),
        u8::from(report.flags.zero),
    );
    if !report.halted {
        eprintln!(
            "⚠️  Reached tick limit ({}). Use --max-ticks to increase.",
            report.ticks
        );
    }
}

fn assemble_file(source_path: &Path, output: Option<PathBuf>, symbols: bool) {
    let out_path = output.unwrap_or_else(|| source_path.with_extension("lst"));

    let source = or_exit(std::fs::read_to_string(source_path), "Failed to read file");
    let assembly = or_exit(accsim::asm::assemble_with_symbols(&source), "Assembly error");

    if symbols {
        for (name, addr) in &assembly.symbols {
            println!("{:<16} {:#010x}", name, addr);
        }
    }

    or_exit(save_listing(&out_path, &assembly.listing), "Failed to save listing");
    eprintln!(
        "✓ {} → {} ({} instructions)",
        source_path.display(),
        out_path.display(),
        assembly.listing.len()
    );
}

fn list_file(path: &Path) {
    let instructions = if path.extension().is_some_and(|ext| ext == "asm") {
        let source = or_exit(std::fs::read_to_string(path), "Failed to read file");
        or_exit(assemble(&source), "Assembly error")
    } else {
        or_exit(load_listing(path), "Failed to load listing")
    };
    print!("{}", disassemble(&instructions));
}

#[cfg(feature = "tui")]
fn debug_program(path: &Path, input: Option<&Path>) {
    let (program, input) = load(path, input);
    or_exit(accsim::run_debugger(program, input), "Debugger error");
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &Path, _input: Option<&Path>) {
    eprintln!("❌ The debugger requires the `tui` feature");
    std::process::exit(1);
}
