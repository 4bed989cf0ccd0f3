use super::types::{Stmt, StmtKind};

/// Reroute every `return` that is not inside a nested `fn` into an exit
/// statement. Function bodies are left untouched.
pub fn intercept_returns(stmts: Vec<Stmt>) -> Vec<Stmt> {
    stmts.into_iter().map(rewrite_stmt).collect()
}

fn rewrite_stmt(stmt: Stmt) -> Stmt {
    let kind = match stmt.kind {
        StmtKind::Return(values) => StmtKind::Exit(values),
        StmtKind::If {
            cond,
            then,
            otherwise,
        } => StmtKind::If {
            cond,
            then: intercept_returns(then),
            otherwise: otherwise.map(intercept_returns),
        },
        StmtKind::While { cond, body } => StmtKind::While {
            cond,
            body: intercept_returns(body),
        },
        other => other,
    };
    Stmt::new(stmt.line, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_top_level_and_nested_block_returns_are_rewritten() {
        let stmts = intercept_returns(parse("return 1\nif x { return 2 }").unwrap());
        assert!(matches!(stmts[0].kind, StmtKind::Exit(_)));
        let StmtKind::If { then, .. } = &stmts[1].kind else {
            panic!("expected if");
        };
        assert!(matches!(then[0].kind, StmtKind::Exit(_)));
    }

    #[test]
    fn test_function_bodies_keep_their_returns() {
        let stmts = intercept_returns(parse("fn f() { return 1 }").unwrap());
        let StmtKind::Function(decl) = &stmts[0].kind else {
            panic!("expected function");
        };
        assert!(matches!(decl.code.body[0].kind, StmtKind::Return(_)));
    }
}
