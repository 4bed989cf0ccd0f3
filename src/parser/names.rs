//! Static name classification over statement lists.
//!
//! Nested `fn` bodies are opaque: their assignments stay local to them,
//! and only their free names count as references of the enclosing block.

use super::types::{Expr, Stmt, StmtKind};
use std::collections::BTreeSet;

/// Names bound by the statements: assignment targets and function names.
pub fn assigned_names(stmts: &[Stmt]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_assigned(stmts, &mut out);
    out
}

fn collect_assigned(stmts: &[Stmt], out: &mut BTreeSet<String>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Assign { name, .. } => {
                out.insert(name.clone());
            }
            StmtKind::Function(decl) => {
                out.insert(decl.name.clone());
            }
            StmtKind::If {
                then, otherwise, ..
            } => {
                collect_assigned(then, out);
                if let Some(otherwise) = otherwise {
                    collect_assigned(otherwise, out);
                }
            }
            StmtKind::While { body, .. } => collect_assigned(body, out),
            _ => {}
        }
    }
}

/// Names read by the statements, including names nested functions need
/// from outside themselves.
pub fn referenced_names(stmts: &[Stmt]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_referenced(stmts, &mut out);
    out
}

fn collect_referenced(stmts: &[Stmt], out: &mut BTreeSet<String>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Expr(expr) => collect_expr(expr, out),
            StmtKind::Assign { value, .. } => collect_expr(value, out),
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                collect_expr(cond, out);
                collect_referenced(then, out);
                if let Some(otherwise) = otherwise {
                    collect_referenced(otherwise, out);
                }
            }
            StmtKind::While { cond, body } => {
                collect_expr(cond, out);
                collect_referenced(body, out);
            }
            StmtKind::Function(decl) => {
                for param in &decl.params {
                    if let Some(default) = &param.default {
                        collect_expr(default, out);
                    }
                }
                out.extend(decl.code.free_vars.iter().cloned());
            }
            StmtKind::Return(values) | StmtKind::Exit(values) => {
                for value in values {
                    collect_expr(value, out);
                }
            }
            StmtKind::Resume | StmtKind::Marker | StmtKind::Guard(_) => {}
        }
    }
}

fn collect_expr(expr: &Expr, out: &mut BTreeSet<String>) {
    match expr {
        Expr::Ident(name) => {
            out.insert(name.clone());
        }
        Expr::List(items) => {
            for item in items {
                collect_expr(item, out);
            }
        }
        Expr::Unary { operand, .. } => collect_expr(operand, out),
        Expr::Binary { left, right, .. } => {
            collect_expr(left, out);
            collect_expr(right, out);
        }
        Expr::Call { callee, args } => {
            collect_expr(callee, out);
            for arg in args {
                collect_expr(&arg.value, out);
            }
        }
        Expr::Index { target, index } => {
            collect_expr(target, out);
            collect_expr(index, out);
        }
        Expr::None | Expr::Bool(_) | Expr::Int(_) | Expr::Str(_) => {}
    }
}
