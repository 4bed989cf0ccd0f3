use crate::debugger::BreakpointId;
use std::rc::Rc;

use super::names;

/// One statement together with the source line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(line: usize, kind: StmtKind) -> Self {
        Self { line, kind }
    }

    pub fn is_guard(&self) -> bool {
        matches!(self.kind, StmtKind::Guard(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign {
        name: String,
        value: Expr,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Function(Rc<FunctionDecl>),
    Return(Vec<Expr>),
    /// A `return` rerouted to the frame coordinator's exit operation.
    Exit(Vec<Expr>),
    /// Leave the suspended frame and let the paused routine continue.
    Resume,
    /// Inline `breakpoint` sentinel, turned into a guard by materialization.
    Marker,
    /// Injected hook call for a registered breakpoint.
    Guard(BreakpointId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Expr>),
    Ident(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// A call argument, positional when `name` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub default: Option<Expr>,
}

/// A `fn` definition as written in source.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub code: Rc<Code>,
}

/// Executable body of a routine. Breakpoint injection produces a new
/// `Code` rather than editing one in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub name: String,
    pub first_line: usize,
    pub body: Vec<Stmt>,
    /// Names assigned in the body, parameters excluded.
    pub locals: Vec<String>,
    /// Names read in the body that resolve outside of it.
    pub free_vars: Vec<String>,
}

/// One row of a routine's debug-line table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub offset: usize,
    pub line: usize,
}

impl Code {
    pub fn new(name: &str, first_line: usize, params: &[String], body: Vec<Stmt>) -> Self {
        let assigned = names::assigned_names(&body);
        let locals = assigned
            .iter()
            .filter(|n| !params.contains(n))
            .cloned()
            .collect();
        let free_vars = names::referenced_names(&body)
            .into_iter()
            .filter(|n| !params.contains(n) && !assigned.contains(n))
            .collect();

        Self {
            name: name.to_string(),
            first_line,
            body,
            locals,
            free_vars,
        }
    }

    /// Same routine with a rewritten body. Guards never change the name
    /// classification, so it is carried over.
    pub fn with_body(&self, body: Vec<Stmt>) -> Self {
        Self {
            name: self.name.clone(),
            first_line: self.first_line,
            body,
            locals: self.locals.clone(),
            free_vars: self.free_vars.clone(),
        }
    }

    /// Pre-order statement offsets and their lines, guards excluded.
    pub fn line_table(&self) -> Vec<LineEntry> {
        fn walk(block: &[Stmt], out: &mut Vec<LineEntry>) {
            for stmt in block {
                if stmt.is_guard() {
                    continue;
                }
                out.push(LineEntry {
                    offset: out.len(),
                    line: stmt.line,
                });
                match &stmt.kind {
                    StmtKind::If {
                        then, otherwise, ..
                    } => {
                        walk(then, out);
                        if let Some(otherwise) = otherwise {
                            walk(otherwise, out);
                        }
                    }
                    StmtKind::While { body, .. } => walk(body, out),
                    _ => {}
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.body, &mut out);
        out
    }

    pub fn guards(&self) -> Vec<BreakpointId> {
        fn walk(block: &[Stmt], out: &mut Vec<BreakpointId>) {
            for stmt in block {
                match &stmt.kind {
                    StmtKind::Guard(id) => out.push(*id),
                    StmtKind::If {
                        then, otherwise, ..
                    } => {
                        walk(then, out);
                        if let Some(otherwise) = otherwise {
                            walk(otherwise, out);
                        }
                    }
                    StmtKind::While { body, .. } => walk(body, out),
                    _ => {}
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.body, &mut out);
        out
    }
}
