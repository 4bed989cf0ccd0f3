use super::value::Value;
use std::cell::RefCell;
use std::io::{self, Write};

/// Output channels of an interactive session.
pub trait Console {
    /// Value of a trailing bare expression.
    fn display(&self, value: &Value);
    fn print(&self, text: &str);
    fn error(&self, message: &str);
}

/// Writes displays and prints to stdout, errors to stderr.
pub struct StdConsole;

impl Console for StdConsole {
    fn display(&self, value: &Value) {
        println!("{value}");
    }

    fn print(&self, text: &str) {
        println!("{text}");
    }

    fn error(&self, message: &str) {
        eprintln!("❌ {message}");
        let _ = io::stderr().flush();
    }
}

/// A single line recorded by [`BufferConsole`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleLine {
    Display(Value),
    Print(String),
    Error(String),
}

/// Records everything in memory.
#[derive(Default)]
pub struct BufferConsole {
    lines: RefCell<Vec<ConsoleLine>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<ConsoleLine> {
        self.lines.borrow().clone()
    }

    pub fn take(&self) -> Vec<ConsoleLine> {
        std::mem::take(&mut *self.lines.borrow_mut())
    }

    pub fn printed(&self) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter_map(|line| match line {
                ConsoleLine::Print(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter_map(|line| match line {
                ConsoleLine::Error(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Console for BufferConsole {
    fn display(&self, value: &Value) {
        self.lines
            .borrow_mut()
            .push(ConsoleLine::Display(value.clone()));
    }

    fn print(&self, text: &str) {
        self.lines
            .borrow_mut()
            .push(ConsoleLine::Print(text.to_string()));
    }

    fn error(&self, message: &str) {
        self.lines
            .borrow_mut()
            .push(ConsoleLine::Error(message.to_string()));
    }
}
