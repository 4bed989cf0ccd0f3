use super::protocol::{encode_framed, ScopeMessage};
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

/// One-way sink for scope changes.
pub trait Notifier {
    fn send(&self, message: &ScopeMessage) -> io::Result<()>;
}

/// Framed messages on stdout.
pub struct FramedNotifier;

impl Notifier for FramedNotifier {
    fn send(&self, message: &ScopeMessage) -> io::Result<()> {
        let output = encode_framed(message)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(output.as_bytes())?;
        stdout.flush()
    }
}

/// One JSON object per line on stdout.
pub struct JsonLinesNotifier;

impl Notifier for JsonLinesNotifier {
    fn send(&self, message: &ScopeMessage) -> io::Result<()> {
        let json = serde_json::to_string(message)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{json}")?;
        stdout.flush()
    }
}

pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn send(&self, _message: &ScopeMessage) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps every message. Clones share the same log.
#[derive(Clone, Default)]
pub struct MemoryNotifier {
    sent: Rc<RefCell<Vec<ScopeMessage>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<ScopeMessage> {
        self.sent.borrow().clone()
    }

    pub fn scopes(&self) -> Vec<String> {
        self.sent.borrow().iter().map(|m| m.scope.clone()).collect()
    }

    pub fn clear(&self) {
        self.sent.borrow_mut().clear();
    }
}

impl Notifier for MemoryNotifier {
    fn send(&self, message: &ScopeMessage) -> io::Result<()> {
        self.sent.borrow_mut().push(message.clone());
        Ok(())
    }
}
