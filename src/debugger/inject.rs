//! Guard-node rewriting of routine bodies.
//!
//! Guards are inserted *before* the statement they target and are skipped
//! by the line table, so the table stays valid after any number of
//! insertions and a second breakpoint on the same line still resolves.

use super::breakpoints::BreakpointId;
use crate::error::DebugError;
use crate::parser::{Code, Stmt, StmtKind};

/// Line a new guard would report, or an error for an explicit line that
/// is not in the routine's line table.
pub fn locate(code: &Code, qualname: &str, line: Option<usize>) -> Result<usize, DebugError> {
    let table = code.line_table();
    match line {
        Some(line) if table.iter().any(|entry| entry.line == line) => Ok(line),
        Some(line) => Err(DebugError::LineNotFound {
            function: qualname.to_string(),
            line,
        }),
        // An empty body has no table; fall back to the definition line.
        None => Ok(table.first().map_or(code.first_line, |entry| entry.line)),
    }
}

/// Copy of `code` with a guard for `id`. Without a line the guard goes in
/// front of the whole body; otherwise in front of the first statement, in
/// source order, that starts on `line`.
pub fn insert(code: &Code, id: BreakpointId, line: Option<usize>) -> Code {
    let mut body = code.body.clone();
    match line {
        None => body.insert(0, Stmt::new(code.first_line, StmtKind::Guard(id))),
        Some(line) => {
            let guard = Stmt::new(line, StmtKind::Guard(id));
            insert_before_line(&mut body, line, &guard);
        }
    }
    code.with_body(body)
}

fn insert_before_line(block: &mut Vec<Stmt>, line: usize, guard: &Stmt) -> bool {
    for i in 0..block.len() {
        if !block[i].is_guard() && block[i].line == line {
            block.insert(i, guard.clone());
            return true;
        }
        let found = match &mut block[i].kind {
            StmtKind::If {
                then, otherwise, ..
            } => {
                insert_before_line(then, line, guard)
                    || otherwise
                        .as_mut()
                        .is_some_and(|o| insert_before_line(o, line, guard))
            }
            StmtKind::While { body, .. } => insert_before_line(body, line, guard),
            _ => false,
        };
        if found {
            return true;
        }
    }
    false
}

/// Copy of `code` without the guard for `id`, or `None` if it has none.
pub fn strip(code: &Code, id: BreakpointId) -> Option<Code> {
    if !code.guards().contains(&id) {
        return None;
    }
    Some(code.with_body(strip_block(&code.body, id)))
}

fn strip_block(block: &[Stmt], id: BreakpointId) -> Vec<Stmt> {
    block
        .iter()
        .filter(|stmt| stmt.kind != StmtKind::Guard(id))
        .map(|stmt| {
            let kind = match &stmt.kind {
                StmtKind::If {
                    cond,
                    then,
                    otherwise,
                } => StmtKind::If {
                    cond: cond.clone(),
                    then: strip_block(then, id),
                    otherwise: otherwise.as_ref().map(|o| strip_block(o, id)),
                },
                StmtKind::While { cond, body } => StmtKind::While {
                    cond: cond.clone(),
                    body: strip_block(body, id),
                },
                other => other.clone(),
            };
            Stmt::new(stmt.line, kind)
        })
        .collect()
}

/// Replace every inline marker with a guard, asking `allocate` for an id
/// per marker line. Returns the rewritten code and the `(id, line)` pairs
/// in source order, or `None` if there were no markers.
pub fn materialize(
    code: &Code,
    allocate: &mut dyn FnMut(usize) -> BreakpointId,
) -> Option<(Code, Vec<(BreakpointId, usize)>)> {
    let mut created = Vec::new();
    let body = materialize_block(&code.body, allocate, &mut created);
    if created.is_empty() {
        return None;
    }
    Some((code.with_body(body), created))
}

fn materialize_block(
    block: &[Stmt],
    allocate: &mut dyn FnMut(usize) -> BreakpointId,
    created: &mut Vec<(BreakpointId, usize)>,
) -> Vec<Stmt> {
    block
        .iter()
        .map(|stmt| {
            let kind = match &stmt.kind {
                StmtKind::Marker => {
                    let id = allocate(stmt.line);
                    created.push((id, stmt.line));
                    StmtKind::Guard(id)
                }
                StmtKind::If {
                    cond,
                    then,
                    otherwise,
                } => StmtKind::If {
                    cond: cond.clone(),
                    then: materialize_block(then, allocate, created),
                    otherwise: otherwise
                        .as_ref()
                        .map(|o| materialize_block(o, allocate, created)),
                },
                StmtKind::While { cond, body } => StmtKind::While {
                    cond: cond.clone(),
                    body: materialize_block(body, allocate, created),
                },
                other => other.clone(),
            };
            Stmt::new(stmt.line, kind)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn code(src: &str) -> Code {
        let stmts = parse(src).unwrap();
        let StmtKind::Function(decl) = &stmts[0].kind else {
            panic!("expected function");
        };
        (*decl.code).clone()
    }

    const SRC: &str = "fn f(a) {\n  b = a\n  while b < 3 {\n    b = b + 1\n  }\n  return b\n}";

    #[test]
    fn test_locate() {
        let code = code(SRC);
        assert_eq!(locate(&code, "f", None), Ok(2));
        assert_eq!(locate(&code, "f", Some(4)), Ok(4));
        assert_eq!(
            locate(&code, "f", Some(9)),
            Err(DebugError::LineNotFound {
                function: "f".into(),
                line: 9
            })
        );
        assert_eq!(locate(&self::code("fn e() {\n}"), "e", None), Ok(1));
    }

    #[test]
    fn test_insert_nested_line_keeps_table() {
        let original = code(SRC);
        let patched = insert(&original, BreakpointId(1), Some(4));
        assert_eq!(patched.line_table(), original.line_table());
        let StmtKind::While { body, .. } = &patched.body[1].kind else {
            panic!("expected while");
        };
        assert_eq!(body[0].kind, StmtKind::Guard(BreakpointId(1)));

        let twice = insert(&patched, BreakpointId(2), Some(4));
        assert_eq!(twice.guards(), vec![BreakpointId(1), BreakpointId(2)]);
    }

    #[test]
    fn test_strip_removes_only_one_guard() {
        let patched = insert(&insert(&code(SRC), BreakpointId(1), None), BreakpointId(2), Some(6));
        let stripped = strip(&patched, BreakpointId(1)).unwrap();
        assert_eq!(stripped.guards(), vec![BreakpointId(2)]);
        assert!(strip(&stripped, BreakpointId(1)).is_none());
    }

    #[test]
    fn test_materialize_markers() {
        let code = code("fn g() {\n  x = 1\n  breakpoint\n  if x { breakpoint }\n}");
        let mut next = 10;
        let (patched, created) = materialize(&code, &mut |_| {
            next += 1;
            BreakpointId(next)
        })
        .unwrap();
        assert_eq!(created, vec![(BreakpointId(11), 3), (BreakpointId(12), 4)]);
        assert_eq!(patched.guards(), vec![BreakpointId(11), BreakpointId(12)]);
        assert!(materialize(&patched, &mut |_| BreakpointId(0)).is_none());
    }
}
