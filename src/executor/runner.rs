use super::builtins::Builtin;
use super::scope::{BindingSet, Namespace, Scope};
use super::value::{BreakProxy, Function, Param, Value};
use crate::debugger::{BreakpointId, FrameExit, HookResult};
use crate::error::RuntimeError;
use crate::parser::{Arg, BinaryOp, Expr, Stmt, StmtKind, UnaryOp};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::debug;

/// Nested routine calls allowed before a call fails instead of running
/// the native stack out.
pub const MAX_CALL_DEPTH: usize = 64;

/// Services the evaluator needs from its embedder: output, breakpoint
/// hooks and the frame coordinator.
pub trait Runtime {
    fn print(&self, text: &str);

    /// Called when execution reaches an injected guard.
    fn breakpoint_hit(&self, hit: BreakpointHit) -> Result<HookResult, RuntimeError>;

    /// Target of an intercepted `return` or a `resume`.
    fn exit_frame(&self, exit: FrameExit) -> Result<(), RuntimeError>;

    fn call_proxy(
        &self,
        proxy: &Rc<BreakProxy>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError>;

    fn wrap_as_breakpoint(&self, target: &Value) -> Result<Value, RuntimeError>;

    /// Counter shared by every interpreter this runtime creates, so calls
    /// that re-enter through frames count against one limit. Without it
    /// each interpreter counts on its own.
    fn call_depth(&self) -> Option<&Cell<usize>> {
        None
    }
}

/// State handed to the breakpoint hook at a guard.
pub struct BreakpointHit {
    pub id: BreakpointId,
    pub namespace: Rc<Namespace>,
    pub function: Option<Rc<Function>>,
    /// The running invocation's own bindings, shared by reference.
    pub locals: BindingSet,
    /// Current values of the outer variables the routine reads.
    pub free_vars: BTreeMap<String, Value>,
}

/// Where names resolve while executing a block.
#[derive(Clone)]
pub struct Env {
    /// `None` at namespace level, where assignments land in the globals.
    pub scope: Option<Rc<Scope>>,
    pub namespace: Rc<Namespace>,
    pub function: Option<Rc<Function>>,
}

impl Env {
    pub fn module(namespace: Rc<Namespace>) -> Self {
        Self {
            scope: None,
            namespace,
            function: None,
        }
    }

    pub fn with_scope(scope: Rc<Scope>, namespace: Rc<Namespace>) -> Self {
        Self {
            scope: Some(scope),
            namespace,
            function: None,
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Value, RuntimeError> {
        if let Some(cell) = self.scope.as_ref().and_then(|s| s.resolve(name)) {
            return cell
                .get()
                .ok_or_else(|| RuntimeError::Unbound(name.to_string()));
        }
        if let Some(value) = self.namespace.get(name) {
            return Ok(value);
        }
        Builtin::lookup(name)
            .map(Value::Builtin)
            .ok_or_else(|| RuntimeError::Name(name.to_string()))
    }

    pub fn assign(&self, name: &str, value: Value) {
        match &self.scope {
            Some(scope) => scope.bindings().set(name, value),
            None => self.namespace.set(name, value),
        }
    }
}

pub enum Flow {
    Normal,
    Return(Value),
}

pub struct Interpreter<'rt> {
    runtime: &'rt dyn Runtime,
    depth: Cell<usize>,
}

/// One level of call depth, given back on drop.
struct CallGuard<'a>(&'a Cell<usize>);

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl<'rt> Interpreter<'rt> {
    pub fn new(runtime: &'rt dyn Runtime) -> Self {
        Self {
            runtime,
            depth: Cell::new(0),
        }
    }

    fn enter_call(&self, func: &Function) -> Result<CallGuard<'_>, RuntimeError> {
        let depth = self.runtime.call_depth().unwrap_or(&self.depth);
        if depth.get() >= MAX_CALL_DEPTH {
            return Err(RuntimeError::RecursionLimit(func.qualname().to_string()));
        }
        depth.set(depth.get() + 1);
        Ok(CallGuard(depth))
    }

    /// Run a cell and produce the value of a trailing bare expression.
    /// A top-level `return` ends the cell early.
    pub fn exec_cell(&self, stmts: &[Stmt], env: &Env) -> Result<Option<Value>, RuntimeError> {
        let Some((last, init)) = stmts.split_last() else {
            return Ok(None);
        };

        for stmt in init {
            if let Flow::Return(_) = self.exec_stmt(stmt, env)? {
                return Ok(None);
            }
        }

        match &last.kind {
            StmtKind::Expr(expr) => self.eval(expr, env).map(Some),
            _ => {
                self.exec_stmt(last, env)?;
                Ok(None)
            }
        }
    }

    pub fn exec_block(&self, stmts: &[Stmt], env: &Env) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec_stmt(stmt, env)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&self, stmt: &Stmt, env: &Env) -> Result<Flow, RuntimeError> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, env)?;
            }
            StmtKind::Assign { name, value } => {
                let value = self.eval(value, env)?;
                env.assign(name, value);
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, env)?.is_truthy() {
                    return self.exec_block(then, env);
                } else if let Some(otherwise) = otherwise {
                    return self.exec_block(otherwise, env);
                }
            }
            StmtKind::While { cond, body } => {
                while self.eval(cond, env)?.is_truthy() {
                    if let Flow::Return(value) = self.exec_block(body, env)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            StmtKind::Function(decl) => {
                let params = decl
                    .params
                    .iter()
                    .map(|p| {
                        let default = p.default.as_ref().map(|d| self.eval(d, env)).transpose()?;
                        Ok(Param {
                            name: p.name.clone(),
                            default,
                        })
                    })
                    .collect::<Result<Vec<_>, RuntimeError>>()?;
                let qualname = match &env.function {
                    Some(outer) => format!("{}.{}", outer.qualname(), decl.name),
                    None => decl.name.clone(),
                };
                let func = Function::new(
                    qualname,
                    params,
                    decl.code.clone(),
                    env.scope.clone(),
                    env.namespace.clone(),
                );
                env.assign(&decl.name, Value::Function(Rc::new(func)));
            }
            StmtKind::Return(values) => {
                return Ok(Flow::Return(self.eval_values(values, env)?));
            }
            StmtKind::Exit(values) => {
                let value = self.eval_values(values, env)?;
                self.runtime.exit_frame(FrameExit::Return(value))?;
            }
            StmtKind::Resume => {
                self.runtime.exit_frame(FrameExit::Resume)?;
            }
            StmtKind::Marker => {
                debug!(line = stmt.line, "skipping breakpoint marker that was never materialized");
            }
            StmtKind::Guard(id) => {
                let hit = self.breakpoint_hit(*id, env);
                let result = self.runtime.breakpoint_hit(hit)?;
                if result.should_return {
                    return Ok(Flow::Return(result.value));
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn breakpoint_hit(&self, id: BreakpointId, env: &Env) -> BreakpointHit {
        let locals = env
            .scope
            .as_ref()
            .map(|s| s.bindings().clone())
            .unwrap_or_else(|| env.namespace.globals().clone());
        let free_vars = env
            .function
            .as_ref()
            .map(|f| {
                f.closure_cells()
                    .into_iter()
                    .filter_map(|(name, cell)| cell.get().map(|v| (name, v)))
                    .collect()
            })
            .unwrap_or_default();

        BreakpointHit {
            id,
            namespace: env.namespace.clone(),
            function: env.function.clone(),
            locals,
            free_vars,
        }
    }

    /// `return` with no values yields none, one value itself, several a list.
    fn eval_values(&self, values: &[Expr], env: &Env) -> Result<Value, RuntimeError> {
        match values {
            [] => Ok(Value::None),
            [single] => self.eval(single, env),
            many => {
                let items = many
                    .iter()
                    .map(|e| self.eval(e, env))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(items))
            }
        }
    }

    pub fn eval(&self, expr: &Expr, env: &Env) -> Result<Value, RuntimeError> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Str(s) => Ok(Value::str(s.as_str())),
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|e| self.eval(e, env))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(items))
            }
            Expr::Ident(name) => env.lookup(name),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, env)?;
                match (op, value) {
                    (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
                    (UnaryOp::Neg, Value::Int(i)) => {
                        i.checked_neg().map(Value::Int).ok_or(RuntimeError::Overflow)
                    }
                    (UnaryOp::Neg, v) => Err(RuntimeError::Type(format!(
                        "bad operand type for unary -: '{}'",
                        v.type_name()
                    ))),
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                match op {
                    BinaryOp::And if !left.is_truthy() => Ok(left),
                    BinaryOp::Or if left.is_truthy() => Ok(left),
                    BinaryOp::And | BinaryOp::Or => self.eval(right, env),
                    _ => binary(*op, left, self.eval(right, env)?),
                }
            }
            Expr::Call { callee, args } => {
                let callee = self.eval(callee, env)?;
                let (positional, keywords) = self.eval_args(args, env)?;
                self.call(&callee, positional, keywords)
            }
            Expr::Index { target, index } => {
                let target = self.eval(target, env)?;
                let index = self.eval(index, env)?;
                subscript(&target, &index)
            }
        }
    }

    fn eval_args(
        &self,
        args: &[Arg],
        env: &Env,
    ) -> Result<(Vec<Value>, Vec<(String, Value)>), RuntimeError> {
        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        for arg in args {
            let value = self.eval(&arg.value, env)?;
            match &arg.name {
                Some(name) => keywords.push((name.clone(), value)),
                None => positional.push(value),
            }
        }
        Ok((positional, keywords))
    }

    pub fn call(
        &self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(func) => self.call_function(func, args, kwargs),
            Value::Proxy(proxy) => self.runtime.call_proxy(proxy, args, kwargs),
            Value::Builtin(builtin) => builtin.call(self.runtime, args, kwargs),
            other => Err(RuntimeError::Type(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    pub fn call_function(
        &self,
        func: &Rc<Function>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        let bindings = BindingSet::from_values(func.bind(args, kwargs)?);
        self.run_with_bindings(func, bindings)
    }

    /// Run a routine's current code against an existing binding set. Every
    /// local gets a cell up front so a read before assignment is an
    /// unbound-local fault rather than a lookup in the outer scope.
    pub fn run_with_bindings(
        &self,
        func: &Rc<Function>,
        bindings: BindingSet,
    ) -> Result<Value, RuntimeError> {
        let _call = self.enter_call(func)?;
        let code = func.code();
        for local in &code.locals {
            bindings.get_or_create(local);
        }

        let scope = Scope::new(bindings, func.parent().cloned());
        let env = Env {
            scope: Some(scope.clone()),
            namespace: func.namespace().clone(),
            function: Some(func.clone()),
        };
        let flow = self.exec_block(&code.body, &env);
        drop(env);
        release_local_routines(&scope);

        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::None),
        }
    }
}

/// Routines defined in a call's scope hold that scope, and the scope's
/// cells hold them. When the call ends and none of them (nor the scope)
/// is referenced from anywhere else, clear those cells so both can be
/// freed. Anything that escaped keeps the whole scope alive.
fn release_local_routines(scope: &Rc<Scope>) {
    let bindings = scope.bindings();
    let mut local_routines = Vec::new();
    for name in bindings.names() {
        let Some(cell) = bindings.cell(&name) else {
            continue;
        };
        if let Some(Value::Function(func)) = cell.get() {
            if func.parent().is_some_and(|parent| Rc::ptr_eq(parent, scope)) {
                // one reference from the cell, one from `func` here
                if Rc::strong_count(&func) > 2 {
                    return;
                }
                local_routines.push(cell);
            }
        }
    }

    // the caller's handle plus one per local routine
    if local_routines.is_empty() || Rc::strong_count(scope) != 1 + local_routines.len() {
        return;
    }
    for cell in local_routines {
        cell.clear();
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    use Value::{Int, List, Str};

    let result = match (op, &left, &right) {
        (BinaryOp::Eq, _, _) => Value::Bool(left == right),
        (BinaryOp::NotEq, _, _) => Value::Bool(left != right),
        (BinaryOp::Add, Int(a), Int(b)) => Int(a.checked_add(*b).ok_or(RuntimeError::Overflow)?),
        (BinaryOp::Add, Str(a), Str(b)) => Value::str(format!("{a}{b}")),
        (BinaryOp::Add, List(a), List(b)) => {
            Value::list(a.iter().chain(b.iter()).cloned().collect())
        }
        (BinaryOp::Sub, Int(a), Int(b)) => Int(a.checked_sub(*b).ok_or(RuntimeError::Overflow)?),
        (BinaryOp::Mul, Int(a), Int(b)) => Int(a.checked_mul(*b).ok_or(RuntimeError::Overflow)?),
        (BinaryOp::Div | BinaryOp::Rem, Int(_), Int(0)) => return Err(RuntimeError::DivisionByZero),
        (BinaryOp::Div, Int(a), Int(b)) => Int(a.checked_div(*b).ok_or(RuntimeError::Overflow)?),
        (BinaryOp::Rem, Int(a), Int(b)) => Int(a.checked_rem(*b).ok_or(RuntimeError::Overflow)?),
        (BinaryOp::Lt, Int(a), Int(b)) => Value::Bool(a < b),
        (BinaryOp::Le, Int(a), Int(b)) => Value::Bool(a <= b),
        (BinaryOp::Gt, Int(a), Int(b)) => Value::Bool(a > b),
        (BinaryOp::Ge, Int(a), Int(b)) => Value::Bool(a >= b),
        (BinaryOp::Lt, Str(a), Str(b)) => Value::Bool(a < b),
        (BinaryOp::Le, Str(a), Str(b)) => Value::Bool(a <= b),
        (BinaryOp::Gt, Str(a), Str(b)) => Value::Bool(a > b),
        (BinaryOp::Ge, Str(a), Str(b)) => Value::Bool(a >= b),
        _ => {
            return Err(RuntimeError::Type(format!(
                "unsupported operand types for {op:?}: '{}' and '{}'",
                left.type_name(),
                right.type_name()
            )))
        }
    };
    Ok(result)
}

fn subscript(target: &Value, index: &Value) -> Result<Value, RuntimeError> {
    let Value::Int(raw) = index else {
        return Err(RuntimeError::Type(format!(
            "indices must be int, not '{}'",
            index.type_name()
        )));
    };

    let resolve = |len: usize| -> Result<usize, RuntimeError> {
        let out_of_range = RuntimeError::Index { index: *raw, len };
        let signed_len = i64::try_from(len).map_err(|_| RuntimeError::Overflow)?;
        let pos = if *raw < 0 { signed_len + raw } else { *raw };
        if (0..signed_len).contains(&pos) {
            usize::try_from(pos).map_err(|_| out_of_range)
        } else {
            Err(out_of_range)
        }
    };

    match target {
        Value::List(items) => Ok(items[resolve(items.len())?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(chars[resolve(chars.len())?].to_string()))
        }
        other => Err(RuntimeError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}
