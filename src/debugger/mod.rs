mod breakpoints;
mod context;
mod frames;
mod host;
mod inject;
mod magics;
mod shell;

pub use breakpoints::{BreakpointId, BreakpointInfo, BreakpointTable, HookResult};
pub use context::Debugger;
pub use frames::{Capture, Frame, FrameExit, FrameStack, FrameState, StackEntry};
pub use host::{HostLoop, ScriptedHost, Step, StdinHost};
pub use shell::{Shell, Target, MAIN_MODULE};
