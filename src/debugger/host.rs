use super::context::Debugger;
use crate::error::DebugError;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

/// One unit of outside-submitted work per call. A suspended frame calls
/// this in a loop until it exits.
pub trait HostLoop {
    fn do_one_iteration(&self, debugger: &Debugger) -> Result<(), DebugError>;
}

type Inspect = Box<dyn FnOnce(&Debugger) -> Result<(), DebugError>>;

pub enum Step {
    Cell(String),
    /// Arbitrary work against the debugger, e.g. a nested `enter_frame`.
    Inspect(Inspect),
}

/// Replays queued steps. Clones share the queue, so steps can be added
/// after the host has been handed to a debugger.
#[derive(Clone, Default)]
pub struct ScriptedHost {
    steps: Rc<RefCell<VecDeque<Step>>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(&self, source: &str) -> &Self {
        self.steps
            .borrow_mut()
            .push_back(Step::Cell(source.to_string()));
        self
    }

    pub fn inspect(
        &self,
        step: impl FnOnce(&Debugger) -> Result<(), DebugError> + 'static,
    ) -> &Self {
        self.steps
            .borrow_mut()
            .push_back(Step::Inspect(Box::new(step)));
        self
    }

    pub fn pending(&self) -> usize {
        self.steps.borrow().len()
    }
}

impl HostLoop for ScriptedHost {
    fn do_one_iteration(&self, debugger: &Debugger) -> Result<(), DebugError> {
        let step = self.steps.borrow_mut().pop_front();
        match step {
            None => Err(DebugError::HostClosed),
            Some(Step::Cell(source)) => {
                debugger.run_cell(&source);
                Ok(())
            }
            Some(Step::Inspect(step)) => step(debugger),
        }
    }
}

/// Net change in bracket depth over a line, ignoring quoted text and
/// comments.
fn bracket_delta(line: &str) -> i32 {
    let mut delta = 0i32;
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in line.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        if in_quotes && ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }
        if !in_quotes {
            match ch {
                '#' => break,
                '{' | '(' | '[' => delta += 1,
                '}' | ')' | ']' => delta -= 1,
                _ => {}
            }
        }
    }
    delta
}

/// Reads one cell per iteration from stdin. A cell continues over
/// following lines while brackets are open.
pub struct StdinHost {
    prompt: bool,
}

impl StdinHost {
    pub fn new(prompt: bool) -> Self {
        Self { prompt }
    }

    fn read_cell(&self, label: &str) -> Result<String, DebugError> {
        let stdin = io::stdin();
        let mut handle = stdin.lock();
        let mut cell = String::new();
        let mut depth = 0i32;

        loop {
            if self.prompt {
                let marker = if cell.is_empty() { ">" } else { "." };
                eprint!("({label}) {marker} ");
                let _ = io::stderr().flush();
            }

            let mut line = String::new();
            let read = handle
                .read_line(&mut line)
                .map_err(|e| DebugError::Host(e.to_string()))?;
            if read == 0 {
                if cell.trim().is_empty() {
                    return Err(DebugError::HostClosed);
                }
                return Ok(cell);
            }

            depth += bracket_delta(&line);
            cell.push_str(&line);
            if depth <= 0 {
                return Ok(cell);
            }
        }
    }
}

impl HostLoop for StdinHost {
    fn do_one_iteration(&self, debugger: &Debugger) -> Result<(), DebugError> {
        let label = debugger.shell().target().label;
        let cell = self.read_cell(&label)?;
        if !cell.trim().is_empty() {
            debugger.run_cell(&cell);
        }
        Ok(())
    }
}
