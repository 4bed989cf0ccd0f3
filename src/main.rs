use clap::{Parser, ValueEnum};
use scope_debugger::debugger::{Debugger, Shell, StdinHost};
use scope_debugger::executor::{CellOutcome, StdConsole};
use scope_debugger::notify::{FramedNotifier, JsonLinesNotifier, Notifier, NullNotifier};
use scope_debugger::DebugError;
use std::fs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NotifyMode {
    /// `Content-Length` framed JSON
    Framed,
    /// One JSON object per line
    Json,
    None,
}

#[derive(Parser)]
#[command(name = "xdbg")]
#[command(about = "Interactive debugger that pauses routines and splices into their live scope", long_about = None)]
struct Cli {
    /// Script to run in __main__ before the prompt starts
    script: Option<PathBuf>,

    /// Where scope-change notifications go (stdout)
    #[arg(long, value_enum, default_value = "none")]
    notify: NotifyMode,

    /// Log filter, overridden by XDBG_LOG
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("XDBG_LOG").unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let notifier: Box<dyn Notifier> = match cli.notify {
        NotifyMode::Framed => Box::new(FramedNotifier),
        NotifyMode::Json => Box::new(JsonLinesNotifier),
        NotifyMode::None => Box::new(NullNotifier),
    };

    let shell = Shell::new(Rc::new(StdConsole));
    let host = StdinHost::new(io::stdin().is_terminal());
    let debugger = match Debugger::attach(shell, Box::new(host), notifier) {
        Ok(debugger) => debugger,
        Err(err) => {
            eprintln!("❌ {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = &cli.script {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                eprintln!("❌ Could not read {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        };
        if let CellOutcome::Failed(_) = debugger.run_cell(&source) {
            return ExitCode::FAILURE;
        }
    }

    loop {
        match debugger.pump() {
            Ok(()) => {}
            Err(DebugError::HostClosed) => break,
            Err(err) => {
                eprintln!("❌ {err}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
