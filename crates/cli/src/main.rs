//! `logica` — the language's command-line front-end. Four subcommands:
//! `run`, `check`, `tokens`, `ast`. Exit code 0 iff the program lexed,
//! parsed, axiom-checked, and (for `run`) finished without an unhandled
//! kernel break; non-zero otherwise.

use clap::{Parser, Subcommand};
use kernel::{Kernel, KernelConfig, SystemClock};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use world::{WorldConfig, WorldRegistry};

#[derive(Parser)]
#[command(name = "logica", version, about = "Trust-kernel language front-end")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile and run a program against a fresh kernel and world registry.
    Run { file: PathBuf },
    /// Lex, parse and axiom-check a program without running it.
    Check { file: PathBuf },
    /// Print the token stream for a program.
    Tokens { file: PathBuf },
    /// Print the checked AST for a program.
    Ast { file: PathBuf },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn read_source(file: &PathBuf) -> Result<String, String> {
    std::fs::read_to_string(file).map_err(|e| format!("failed to read {}: {e}", file.display()))
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Run { file } => {
            let source = read_source(&file)?;
            let kernel = Kernel::new(KernelConfig::default(), Rc::new(SystemClock::new()));
            let worlds = WorldRegistry::new(WorldConfig::default());
            let outcome = runtime::compile_and_run(&source, kernel, worlds).map_err(|e| e.to_string())?;
            for line in &outcome.output {
                println!("{line}");
            }
            if outcome.broken {
                return Err("program ended in a broken state".to_string());
            }
            Ok(())
        }
        Command::Check { file } => {
            let source = read_source(&file)?;
            lang::compile_source(&source).map_err(|e| e.to_string())?;
            println!("ok");
            Ok(())
        }
        Command::Tokens { file } => {
            let source = read_source(&file)?;
            let tokens = lang::tokenize(&source).map_err(|e| e.to_string())?;
            for token in tokens {
                println!("{:>4}:{:<4} {:?}", token.span.line, token.span.col, token.kind);
            }
            Ok(())
        }
        Command::Ast { file } => {
            let source = read_source(&file)?;
            let tokens = lang::tokenize(&source).map_err(|e| e.to_string())?;
            let program = lang::parse(tokens).map_err(|e| e.to_string())?;
            let checked = lang::compile(program).map_err(|e| e.to_string())?;
            println!("{checked:#?}");
            Ok(())
        }
    }
}
