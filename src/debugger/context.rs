use super::breakpoints::{BreakpointId, BreakpointTable, HookResult};
use super::frames::{Capture, Frame, FrameExit, FrameStack, FrameState};
use super::host::HostLoop;
use super::magics;
use super::shell::{Shell, Target};
use crate::error::{DebugError, Error, RuntimeError};
use crate::executor::{
    run_module_cell, BindingSet, BreakProxy, BreakpointHit, CellOutcome, Console, Env,
    Interpreter, Namespace, Runtime, Value,
};
use crate::notify::{Notifier, ScopeMessage};
use crate::parser;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Frame coordinator. Owns the frame stack and the breakpoint table and
/// drives the host loop while a frame is suspended.
pub struct Debugger {
    shell: Rc<Shell>,
    stack: RefCell<FrameStack>,
    breakpoints: BreakpointTable,
    notifier: Box<dyn Notifier>,
    host: Box<dyn HostLoop>,
    call_depth: Cell<usize>,
}

impl Debugger {
    /// Attach to `shell`. Only one debugger may be attached at a time.
    pub fn attach(
        shell: Rc<Shell>,
        host: Box<dyn HostLoop>,
        notifier: Box<dyn Notifier>,
    ) -> Result<Self, DebugError> {
        shell.attach()?;
        let root = shell.target().namespace;
        Ok(Self {
            stack: RefCell::new(FrameStack::new(root)),
            breakpoints: BreakpointTable::new(),
            shell,
            notifier,
            host,
            call_depth: Cell::new(0),
        })
    }

    pub fn shell(&self) -> &Rc<Shell> {
        &self.shell
    }

    pub fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    pub fn console(&self) -> &dyn Console {
        self.shell.console()
    }

    /// Number of suspended frames.
    pub fn depth(&self) -> usize {
        self.stack.borrow().depth()
    }

    pub fn frames(&self) -> Vec<Rc<Frame>> {
        self.stack.borrow().frames()
    }

    pub fn current_frame(&self) -> Option<Rc<Frame>> {
        self.stack.borrow().top_frame()
    }

    pub fn root_namespace(&self) -> Rc<Namespace> {
        self.stack.borrow().root_namespace().clone()
    }

    /// Namespace that submitted cells currently execute in.
    pub fn active_namespace(&self) -> Rc<Namespace> {
        self.shell.target().namespace
    }

    /// Run one unit of host work.
    pub fn pump(&self) -> Result<(), DebugError> {
        self.host.do_one_iteration(self)
    }

    fn notify(&self, scope: &str) {
        if let Err(err) = self.notifier.send(&ScopeMessage::new(scope)) {
            warn!(%scope, %err, "scope notification failed");
        }
    }

    /// Execute one interactive cell against the current target. Lines
    /// starting with `%` are debugger commands.
    pub fn run_cell(&self, source: &str) -> CellOutcome {
        let trimmed = source.trim();
        if let Some(command) = trimmed.strip_prefix('%') {
            return magics::run(self, command);
        }

        let stmts = match parser::parse(source) {
            Ok(stmts) => stmts,
            Err(err) => {
                let message = format!("syntax error: {err}");
                self.console().error(&message);
                return CellOutcome::Failed(message);
            }
        };

        let count = self.shell.advance_count();
        let target = self.shell.target();
        debug!(cell = count, target = %target.label, "running cell");

        let interp = Interpreter::new(self);
        match &target.splicer {
            Some(splicer) => splicer.run(&interp, stmts, true, self.console()),
            None => run_module_cell(&interp, &target.namespace, stmts, self.console()),
        }
    }

    /// Run `source` into the module `name`, creating it if needed.
    pub fn load_module(&self, name: &str, source: &str) -> Result<Rc<Namespace>, Error> {
        let stmts = parser::parse(source)?;
        let namespace = self.shell.make_module(name);
        Interpreter::new(self).exec_cell(&stmts, &Env::module(namespace.clone()))?;
        info!(module = name, "module loaded");
        Ok(namespace)
    }

    /// Resolve a name the way a cell would, with `module.name` reaching
    /// into registered modules.
    pub fn lookup(&self, name: &str) -> Result<Value, RuntimeError> {
        if let Some((module, attr)) = name.rsplit_once('.') {
            if let Some(namespace) = self.shell.module(module) {
                return namespace
                    .get(attr)
                    .ok_or_else(|| RuntimeError::Name(name.to_string()));
            }
        }
        self.shell.target().env().lookup(name)
    }

    /// Suspend in a new frame until it exits, pumping the host loop.
    pub fn enter_frame(
        &self,
        namespace: &Rc<Namespace>,
        bindings: BindingSet,
        name: Option<&str>,
        capture: Capture,
    ) -> Result<FrameExit, DebugError> {
        if !self.shell.is_registered(namespace) {
            return Err(DebugError::NamespaceMismatch(namespace.name().to_string()));
        }

        let name = name.unwrap_or("<unknown>");
        let frame = Rc::new(Frame::new(
            name,
            namespace.clone(),
            bindings,
            capture,
            self.shell.target(),
        ));

        let activation = Activation::begin(self, frame.clone());
        frame.set_state(FrameState::Suspended);
        while !frame.is_exited() {
            self.pump()?;
        }
        drop(activation);

        Ok(frame.take_exit().unwrap_or(FrameExit::Resume))
    }

    /// Leave the top frame.
    pub fn exit_frame(&self, exit: FrameExit) -> Result<(), DebugError> {
        let frame = self
            .stack
            .borrow_mut()
            .pop_frame()
            .ok_or(DebugError::NotInFrame)?;
        info!(frame = frame.name(), ?exit, "leaving frame");
        frame.finish(exit);
        Ok(())
    }

    /// Point the session at another module. Only allowed with no frame
    /// suspended; switching to the current module does nothing.
    pub fn enter_module(&self, namespace: &Rc<Namespace>) -> Result<(), DebugError> {
        if let Some(frame) = self.current_frame() {
            return Err(DebugError::FrameActive(frame.name().to_string()));
        }
        if Rc::ptr_eq(&self.shell.target().namespace, namespace) {
            return Ok(());
        }
        if !self.shell.is_registered(namespace) {
            return Err(DebugError::NamespaceMismatch(namespace.name().to_string()));
        }

        self.stack.borrow_mut().set_root(namespace.clone());
        self.shell.set_target(Target::module(namespace.clone()));
        self.notify(namespace.name());
        info!(module = namespace.name(), "switched module");
        Ok(())
    }

    /// Replacement for `target` that suspends in a frame on every call.
    pub fn wrap_as_breakpoint(&self, target: &Value) -> Result<Value, DebugError> {
        match target {
            Value::Function(func) => Ok(Value::Proxy(Rc::new(BreakProxy::new(func.clone())))),
            Value::Proxy(_) => Ok(target.clone()),
            other => Err(DebugError::NotCallable(other.to_string())),
        }
    }

    pub fn create_breakpoint(
        &self,
        target: &Value,
        line: Option<usize>,
    ) -> Result<BreakpointId, DebugError> {
        let func = target
            .as_function()
            .ok_or_else(|| DebugError::NotCallable(target.to_string()))?;
        self.breakpoints.create(func, line)
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        self.shell.detach();
    }
}

/// Swaps a frame in as the interactive target and swaps the previous
/// target back on drop, whether the suspension ended normally or not.
struct Activation<'a> {
    debugger: &'a Debugger,
    frame: Rc<Frame>,
}

impl<'a> Activation<'a> {
    fn begin(debugger: &'a Debugger, frame: Rc<Frame>) -> Self {
        let depth = {
            let mut stack = debugger.stack.borrow_mut();
            stack.push(frame.clone());
            stack.depth()
        };
        frame.set_state(FrameState::Active);
        debugger.shell.set_target(Target {
            label: frame.name().to_string(),
            namespace: frame.namespace().clone(),
            splicer: Some(frame.splicer().clone()),
        });
        debugger.shell.advance_count();
        debugger.notify(frame.name());
        info!(frame = frame.name(), depth, "entered frame");
        Self { debugger, frame }
    }
}

impl Drop for Activation<'_> {
    fn drop(&mut self) {
        if !self.frame.is_exited() {
            warn!(frame = self.frame.name(), "frame abandoned without exiting");
            self.debugger.stack.borrow_mut().discard(&self.frame);
            self.frame.finish(FrameExit::Resume);
        }
        let previous = self.frame.previous().clone();
        self.debugger.notify(&previous.label);
        self.debugger.shell.set_target(previous);
    }
}

impl Runtime for Debugger {
    fn print(&self, text: &str) {
        self.console().print(text);
    }

    fn breakpoint_hit(&self, hit: BreakpointHit) -> Result<HookResult, RuntimeError> {
        let BreakpointHit {
            id,
            namespace,
            function,
            locals,
            free_vars,
        } = hit;

        let result = self.breakpoints.hit(id, || {
            let name = function.as_ref().map(|f| f.qualname().to_string());
            self.enter_frame(
                &namespace,
                locals.share(),
                name.as_deref(),
                Capture::Value { free_vars },
            )
        })?;
        Ok(result)
    }

    fn exit_frame(&self, exit: FrameExit) -> Result<(), RuntimeError> {
        Debugger::exit_frame(self, exit).map_err(RuntimeError::from)
    }

    fn call_proxy(
        &self,
        proxy: &Rc<BreakProxy>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        let func = proxy.target().clone();
        let bindings = BindingSet::from_values(func.bind(args, kwargs)?);
        let exit = self.enter_frame(
            func.namespace(),
            bindings.clone(),
            Some(func.qualname()),
            Capture::Reference(func.closure_cells()),
        )?;

        match exit {
            FrameExit::Return(value) => Ok(value),
            FrameExit::Resume => Interpreter::new(self).run_with_bindings(&func, bindings),
        }
    }

    fn wrap_as_breakpoint(&self, target: &Value) -> Result<Value, RuntimeError> {
        Debugger::wrap_as_breakpoint(self, target).map_err(RuntimeError::from)
    }

    fn call_depth(&self) -> Option<&Cell<usize>> {
        Some(&self.call_depth)
    }
}
