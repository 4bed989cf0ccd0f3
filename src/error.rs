use crate::debugger::BreakpointId;
use thiserror::Error;

/// A syntax error in submitted source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Faults raised while evaluating user code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("name '{0}' is not defined")]
    Name(String),
    #[error("local variable '{0}' referenced before assignment")]
    Unbound(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("maximum call depth exceeded calling {0}()")]
    RecursionLimit(String),
    #[error("index {index} out of range for length {len}")]
    Index { index: i64, len: usize },
    #[error("{callee}() {message}")]
    Arguments { callee: String, message: String },
    #[error(transparent)]
    Debug(#[from] DebugError),
}

impl RuntimeError {
    pub fn arguments(callee: &str, message: impl Into<String>) -> Self {
        Self::Arguments {
            callee: callee.to_string(),
            message: message.into(),
        }
    }
}

/// Structural rejections from the debugger core. None of these leave
/// partial state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebugError {
    #[error("namespace '{0}' is not registered with the shell")]
    NamespaceMismatch(String),
    #[error("invalid breakpoint number: {0}")]
    UnknownBreakpoint(BreakpointId),
    #[error("could not find line number {line} in {function}")]
    LineNotFound { function: String, line: usize },
    #[error("a debugger is already attached to this shell")]
    AlreadyAttached,
    #[error("can only break on functions, got {0}")]
    NotCallable(String),
    #[error("cannot switch scope while frame '{0}' is suspended")]
    FrameActive(String),
    #[error("no suspended frame to exit")]
    NotInFrame,
    #[error("host loop closed")]
    HostClosed,
    #[error("host loop failed: {0}")]
    Host(String),
}

/// Umbrella error for the embedding API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Debug(#[from] DebugError),
}
