//! `%` commands for managing breakpoints and scopes from the prompt.

use super::breakpoints::BreakpointId;
use super::context::Debugger;
use crate::error::{DebugError, RuntimeError};
use crate::executor::CellOutcome;
use thiserror::Error;

#[derive(Debug, Error)]
enum MagicError {
    #[error("usage: %{0}")]
    Usage(&'static str),
    #[error("unknown command '%{0}'")]
    Unknown(String),
    #[error("unbalanced quotes")]
    Quotes,
    #[error("'{0}' is not a valid breakpoint number")]
    BadId(String),
    #[error("'{0}' is not a valid line number")]
    BadLine(String),
    #[error("ignore count must be a non-negative integer, got '{0}'")]
    BadCount(String),
    #[error("'{0}' looks like a file path; give a module name")]
    FilePath(String),
    #[error("no module named '{0}'")]
    NoModule(String),
    #[error(transparent)]
    Debug(#[from] DebugError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Run one command line, without its leading `%`.
pub fn run(debugger: &Debugger, line: &str) -> CellOutcome {
    match dispatch(debugger, line) {
        Ok(()) => CellOutcome::Done,
        Err(err) => {
            let message = err.to_string();
            debugger.console().error(&message);
            CellOutcome::Failed(message)
        }
    }
}

fn dispatch(debugger: &Debugger, line: &str) -> Result<(), MagicError> {
    let words = shlex::split(line).ok_or(MagicError::Quotes)?;
    let Some((command, args)) = words.split_first() else {
        return Err(MagicError::Unknown(String::new()));
    };
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match command.as_str() {
        "break" => set_break(debugger, &args, false),
        "tbreak" => set_break(debugger, &args, true),
        "enable" => toggle(debugger, &args, true),
        "disable" => toggle(debugger, &args, false),
        "ignore" => ignore(debugger, &args),
        "delete" => match args.as_slice() {
            [id] => {
                let id = parse_id(id)?;
                debugger.breakpoints().remove(id)?;
                debugger.console().print(&format!("Deleted breakpoint {id}"));
                Ok(())
            }
            _ => Err(MagicError::Usage("delete id")),
        },
        "materialize" => match args.as_slice() {
            [name] => {
                let value = debugger.lookup(name)?;
                let func = value
                    .as_function()
                    .ok_or_else(|| DebugError::NotCallable(value.to_string()))?;
                let ids = debugger.breakpoints().materialize(func);
                if ids.is_empty() {
                    debugger.console().print(&format!("No inline breakpoints in {name}"));
                }
                for id in ids {
                    print_created(debugger, id);
                }
                Ok(())
            }
            _ => Err(MagicError::Usage("materialize name")),
        },
        "proxy" => match args.as_slice() {
            [name] => {
                let value = debugger.lookup(name)?;
                let proxy = debugger.wrap_as_breakpoint(&value)?;
                match name.rsplit_once('.') {
                    Some((module, attr)) => debugger
                        .shell()
                        .module(module)
                        .ok_or_else(|| MagicError::NoModule(module.to_string()))?
                        .set(attr, proxy),
                    None => debugger.shell().target().env().assign(name, proxy),
                }
                debugger.console().print(&format!("{name} now stops on every call"));
                Ok(())
            }
            _ => Err(MagicError::Usage("proxy name")),
        },
        "scope" => scope(debugger, &args),
        "makescope" => match args.as_slice() {
            [name] => {
                debugger.shell().make_module(name);
                Ok(())
            }
            _ => Err(MagicError::Usage("makescope module")),
        },
        "where" => {
            where_(debugger);
            Ok(())
        }
        other => Err(MagicError::Unknown(other.to_string())),
    }
}

fn parse_id(text: &str) -> Result<BreakpointId, MagicError> {
    text.parse()
        .map(BreakpointId)
        .map_err(|_| MagicError::BadId(text.to_string()))
}

fn parse_ids(args: &[&str]) -> Result<Vec<BreakpointId>, MagicError> {
    args.iter().map(|a| parse_id(a)).collect()
}

fn print_created(debugger: &Debugger, id: BreakpointId) {
    if let Some(info) = debugger.breakpoints().get(id) {
        debugger
            .console()
            .print(&format!("Breakpoint {} at {}", info.id, info.label));
    }
}

fn set_break(debugger: &Debugger, args: &[&str], temporary: bool) -> Result<(), MagicError> {
    let (name, line) = match args {
        [] => {
            for info in debugger.breakpoints().list() {
                debugger.console().print(&info.to_string());
            }
            return Ok(());
        }
        [name] => (*name, None),
        [name, line] => (*name, Some(*line)),
        _ => {
            return Err(MagicError::Usage(if temporary {
                "tbreak [name [line|?]]"
            } else {
                "break [name [line|?]]"
            }))
        }
    };

    let value = debugger.lookup(name)?;
    let line = match line {
        Some("?") => {
            let func = value
                .as_function()
                .ok_or_else(|| DebugError::NotCallable(value.to_string()))?;
            let lines: Vec<String> = func
                .code()
                .line_table()
                .iter()
                .map(|entry| entry.line.to_string())
                .collect();
            debugger
                .console()
                .print(&format!("{}: lines {}", func.qualname(), lines.join(", ")));
            return Ok(());
        }
        Some(text) => Some(
            text.parse::<usize>()
                .map_err(|_| MagicError::BadLine(text.to_string()))?,
        ),
        None => None,
    };

    let id = debugger.create_breakpoint(&value, line)?;
    if temporary {
        debugger.breakpoints().set_temporary(&[id], true)?;
    }
    print_created(debugger, id);
    Ok(())
}

fn toggle(debugger: &Debugger, args: &[&str], enable: bool) -> Result<(), MagicError> {
    if args.is_empty() || args == ["?"] {
        let candidates: Vec<String> = debugger
            .breakpoints()
            .list()
            .into_iter()
            .filter(|info| info.enabled != enable)
            .map(|info| info.to_string())
            .collect();
        let state = if enable { "disabled" } else { "enabled" };
        if candidates.is_empty() {
            debugger.console().print(&format!("No {state} breakpoints"));
        }
        for line in candidates {
            debugger.console().print(&line);
        }
        return Ok(());
    }

    let ids = parse_ids(args)?;
    if enable {
        debugger.breakpoints().enable(&ids)?;
    } else {
        debugger.breakpoints().disable(&ids)?;
    }
    Ok(())
}

fn ignore(debugger: &Debugger, args: &[&str]) -> Result<(), MagicError> {
    let (id, count) = match args {
        [id] => (parse_id(id)?, 0),
        [id, count] => {
            let count = count
                .parse::<i64>()
                .ok()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| MagicError::BadCount(count.to_string()))?;
            (parse_id(id)?, count)
        }
        _ => return Err(MagicError::Usage("ignore id [count]")),
    };
    debugger.breakpoints().set_ignore_count(&[id], count)?;
    let message = match count {
        0 => format!("Breakpoint {id} will stop next time it is reached"),
        1 => format!("Will ignore the next crossing of breakpoint {id}"),
        n => format!("Will ignore the next {n} crossings of breakpoint {id}"),
    };
    debugger.console().print(&message);
    Ok(())
}

fn scope(debugger: &Debugger, args: &[&str]) -> Result<(), MagicError> {
    match args {
        [] => {
            let main = debugger.shell().main().clone();
            debugger.enter_module(&main)?;
            Ok(())
        }
        [name] => {
            if name.contains('/') || name.contains('\\') {
                return Err(MagicError::FilePath(name.to_string()));
            }
            let namespace = debugger
                .shell()
                .module(name)
                .ok_or_else(|| MagicError::NoModule(name.to_string()))?;
            debugger.enter_module(&namespace)?;
            Ok(())
        }
        _ => Err(MagicError::Usage("scope [module]")),
    }
}

fn where_(debugger: &Debugger) {
    let frames = debugger.frames();
    let top = frames.len();
    debugger.console().print(&format!(
        "  #0 <module {}>",
        debugger.root_namespace().name()
    ));
    for (depth, frame) in frames.iter().enumerate() {
        let marker = if depth + 1 == top { ">" } else { " " };
        let mut line = format!("{marker} #{} {}", depth + 1, frame.name());
        if frame.copied_by_value() {
            line.push_str("  (outer variables copied)");
        }
        debugger.console().print(&line);
    }
}
