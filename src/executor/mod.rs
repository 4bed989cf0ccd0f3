mod builtins;
mod console;
mod runner;
mod scope;
mod splicer;
mod value;

pub use builtins::Builtin;
pub use console::{BufferConsole, Console, ConsoleLine, StdConsole};
pub use runner::{BreakpointHit, Env, Flow, Interpreter, Runtime};
pub use scope::{BindingCell, BindingSet, Namespace, Scope};
pub use splicer::{run_module_cell, CellOutcome, ScopeSplicer};
pub use value::{BreakProxy, Function, Param, Value};
