//! Statement execution against a live, shared binding set.
//!
//! Each submitted cell first goes through a classification pass: every
//! name it assigns that the binding set does not hold yet gets a fresh
//! cell, so later cells see it. Cells always share storage with whoever
//! else holds the set, such as a paused routine.

use super::console::Console;
use super::runner::{Env, Interpreter};
use super::scope::{BindingSet, Namespace, Scope};
use super::value::Value;
use crate::error::RuntimeError;
use crate::parser::{intercept_returns, names, Stmt};
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum CellOutcome {
    Done,
    Displayed(Value),
    Failed(String),
}

pub struct ScopeSplicer {
    bindings: BindingSet,
    namespace: Rc<Namespace>,
    scope: Rc<Scope>,
}

impl ScopeSplicer {
    pub fn new(bindings: BindingSet, namespace: Rc<Namespace>) -> Self {
        let scope = Scope::new(bindings.clone(), None);
        Self {
            bindings,
            namespace,
            scope,
        }
    }

    pub fn bindings(&self) -> &BindingSet {
        &self.bindings
    }

    pub fn namespace(&self) -> &Rc<Namespace> {
        &self.namespace
    }

    pub fn env(&self) -> Env {
        Env::with_scope(self.scope.clone(), self.namespace.clone())
    }

    /// Names assigned by `stmts` that have no cell in the set yet.
    pub fn new_names(&self, stmts: &[Stmt]) -> Vec<String> {
        names::assigned_names(stmts)
            .into_iter()
            .filter(|name| !self.bindings.contains(name))
            .collect()
    }

    /// Execute a cell. With `intercept` set, top-level `return`s are routed
    /// to the frame coordinator instead of ending the cell. Faults are
    /// reported to the console and never escape.
    pub fn run(
        &self,
        interp: &Interpreter<'_>,
        stmts: Vec<Stmt>,
        intercept: bool,
        console: &dyn Console,
    ) -> CellOutcome {
        let stmts = if intercept {
            intercept_returns(stmts)
        } else {
            stmts
        };

        let created = self.new_names(&stmts);
        for name in &created {
            self.bindings.get_or_create(name);
        }
        debug!(new = ?created, total = self.bindings.len(), "splicing cell");

        let result = interp.exec_cell(&stmts, &self.env());
        if result.is_err() {
            self.bindings.discard_unbound(&created);
        }
        report(result, console)
    }
}

/// Execute a cell directly in a namespace, with no frame involved.
pub fn run_module_cell(
    interp: &Interpreter<'_>,
    namespace: &Rc<Namespace>,
    stmts: Vec<Stmt>,
    console: &dyn Console,
) -> CellOutcome {
    let env = Env::module(namespace.clone());
    report(interp.exec_cell(&stmts, &env), console)
}

fn report(result: Result<Option<Value>, RuntimeError>, console: &dyn Console) -> CellOutcome {
    match result {
        Ok(Some(Value::None)) | Ok(None) => CellOutcome::Done,
        Ok(Some(value)) => {
            console.display(&value);
            CellOutcome::Displayed(value)
        }
        Err(err) => {
            let message = err.to_string();
            console.error(&message);
            CellOutcome::Failed(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::{FrameExit, HookResult};
    use crate::error::DebugError;
    use crate::executor::console::BufferConsole;
    use crate::executor::runner::{BreakpointHit, Runtime};
    use crate::executor::value::BreakProxy;
    use crate::parser::parse;

    struct Inert;

    impl Runtime for Inert {
        fn print(&self, _text: &str) {}

        fn breakpoint_hit(&self, _hit: BreakpointHit) -> Result<HookResult, RuntimeError> {
            Ok(HookResult::proceed())
        }

        fn exit_frame(&self, _exit: FrameExit) -> Result<(), RuntimeError> {
            Err(DebugError::NotInFrame.into())
        }

        fn call_proxy(
            &self,
            _proxy: &Rc<BreakProxy>,
            _args: Vec<Value>,
            _kwargs: Vec<(String, Value)>,
        ) -> Result<Value, RuntimeError> {
            Err(DebugError::NotInFrame.into())
        }

        fn wrap_as_breakpoint(&self, _target: &Value) -> Result<Value, RuntimeError> {
            Err(DebugError::NotInFrame.into())
        }
    }

    fn splicer() -> ScopeSplicer {
        let bindings = BindingSet::from_values([("a".to_string(), Value::Int(5))]);
        ScopeSplicer::new(bindings, Namespace::new("__main__"))
    }

    fn run(splicer: &ScopeSplicer, console: &BufferConsole, src: &str) -> CellOutcome {
        splicer.run(&Interpreter::new(&Inert), parse(src).unwrap(), true, console)
    }

    #[test]
    fn test_assignments_persist_across_cells() {
        let splicer = splicer();
        let console = BufferConsole::new();
        assert_eq!(run(&splicer, &console, "b = a * 2"), CellOutcome::Done);
        assert_eq!(run(&splicer, &console, "a = b + 1"), CellOutcome::Done);
        assert_eq!(
            run(&splicer, &console, "[a, b]"),
            CellOutcome::Displayed(Value::list(vec![Value::Int(11), Value::Int(10)]))
        );
    }

    #[test]
    fn test_existing_cells_are_shared() {
        let splicer = splicer();
        let held = splicer.bindings().cell("a").unwrap();
        run(&splicer, &BufferConsole::new(), "a = 10");
        assert_eq!(held.get(), Some(Value::Int(10)));
    }

    #[test]
    fn test_new_names_excludes_existing_bindings() {
        let splicer = splicer();
        let stmts = parse("a = 1\nif a { c = 2 }\nfn g() { inner = 1 }").unwrap();
        assert_eq!(splicer.new_names(&stmts), vec!["c".to_string(), "g".to_string()]);
    }

    #[test]
    fn test_fault_is_contained() {
        let splicer = splicer();
        let console = BufferConsole::new();
        let outcome = run(&splicer, &console, "z = missing");
        assert!(matches!(outcome, CellOutcome::Failed(_)));
        assert_eq!(console.errors().len(), 1);
        assert!(!splicer.bindings().contains("z"));
        assert_eq!(
            run(&splicer, &console, "a"),
            CellOutcome::Displayed(Value::Int(5))
        );
    }

    #[test]
    fn test_namespace_fallback_and_none_is_not_displayed() {
        let splicer = splicer();
        splicer.namespace().set("g", Value::Int(3));
        let console = BufferConsole::new();
        assert_eq!(run(&splicer, &console, "a + g"), CellOutcome::Displayed(Value::Int(8)));
        assert_eq!(run(&splicer, &console, "none"), CellOutcome::Done);
        assert_eq!(console.lines().len(), 1);
    }

    #[test]
    fn test_module_cells_write_globals() {
        let namespace = Namespace::new("mod");
        let console = BufferConsole::new();
        let outcome = run_module_cell(
            &Interpreter::new(&Inert),
            &namespace,
            parse("x = 4\nreturn\nx = 5").unwrap(),
            &console,
        );
        assert_eq!(outcome, CellOutcome::Done);
        assert_eq!(namespace.get("x"), Some(Value::Int(4)));
    }
}
