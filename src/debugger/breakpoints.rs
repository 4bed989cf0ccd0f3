use super::frames::FrameExit;
use super::inject;
use crate::error::DebugError;
use crate::executor::{Function, Value};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BreakpointId(pub usize);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an injected guard does next.
#[derive(Debug, Clone, PartialEq)]
pub struct HookResult {
    pub should_return: bool,
    pub value: Value,
}

impl HookResult {
    pub fn proceed() -> Self {
        Self {
            should_return: false,
            value: Value::None,
        }
    }

    pub fn force(value: Value) -> Self {
        Self {
            should_return: true,
            value,
        }
    }
}

struct Breakpoint {
    function: Weak<Function>,
    label: String,
    enabled: bool,
    temporary: bool,
    ignore_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointInfo {
    pub id: BreakpointId,
    pub label: String,
    pub enabled: bool,
    pub temporary: bool,
    pub ignore_count: usize,
}

impl fmt::Display for BreakpointInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>3}  {}", self.id.0, self.label)?;
        if !self.enabled {
            write!(f, "  [dis]")?;
        }
        if self.ignore_count > 0 {
            write!(f, "  (ign {})", self.ignore_count)?;
        }
        if self.temporary {
            write!(f, "  (temp)")?;
        }
        Ok(())
    }
}

/// Registered breakpoints. Ids start at 1 and are never handed out twice.
pub struct BreakpointTable {
    next_id: Cell<usize>,
    entries: RefCell<BTreeMap<BreakpointId, Breakpoint>>,
}

impl Default for BreakpointTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            entries: RefCell::new(BTreeMap::new()),
        }
    }

    fn allocate(&self) -> BreakpointId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        BreakpointId(id)
    }

    fn register(&self, id: BreakpointId, func: &Rc<Function>, line: usize) {
        let label = format!("{}:{}", func.qualname(), line);
        debug!(%id, %label, "breakpoint created");
        self.entries.borrow_mut().insert(
            id,
            Breakpoint {
                function: Rc::downgrade(func),
                label,
                enabled: true,
                temporary: false,
                ignore_count: 0,
            },
        );
    }

    /// Inject a guard into `func` and register it. No id is consumed when
    /// the line cannot be resolved.
    pub fn create(
        &self,
        func: &Rc<Function>,
        line: Option<usize>,
    ) -> Result<BreakpointId, DebugError> {
        let code = func.code();
        let resolved = inject::locate(&code, func.qualname(), line)?;
        let id = self.allocate();
        func.replace_code(inject::insert(&code, id, line));
        self.register(id, func, resolved);
        Ok(id)
    }

    /// Turn the inline markers in `func` into registered breakpoints.
    pub fn materialize(&self, func: &Rc<Function>) -> Vec<BreakpointId> {
        let code = func.code();
        let Some((patched, created)) = inject::materialize(&code, &mut |_| self.allocate()) else {
            return Vec::new();
        };
        func.replace_code(patched);
        created
            .into_iter()
            .map(|(id, line)| {
                self.register(id, func, line);
                id
            })
            .collect()
    }

    pub fn remove(&self, id: BreakpointId) -> Result<(), DebugError> {
        let entry = self
            .entries
            .borrow_mut()
            .remove(&id)
            .ok_or(DebugError::UnknownBreakpoint(id))?;
        if let Some(func) = entry.function.upgrade() {
            if let Some(code) = inject::strip(&func.code(), id) {
                func.replace_code(code);
            }
        }
        debug!(%id, "breakpoint removed");
        Ok(())
    }

    /// Apply `update` to every id, or to none of them if any is unknown.
    fn update_all(
        &self,
        ids: &[BreakpointId],
        mut update: impl FnMut(&mut Breakpoint),
    ) -> Result<(), DebugError> {
        let mut entries = self.entries.borrow_mut();
        if let Some(missing) = ids.iter().find(|id| !entries.contains_key(*id)) {
            return Err(DebugError::UnknownBreakpoint(*missing));
        }
        for id in ids {
            if let Some(entry) = entries.get_mut(id) {
                update(entry);
            }
        }
        Ok(())
    }

    pub fn enable(&self, ids: &[BreakpointId]) -> Result<(), DebugError> {
        self.update_all(ids, |bp| bp.enabled = true)
    }

    pub fn disable(&self, ids: &[BreakpointId]) -> Result<(), DebugError> {
        self.update_all(ids, |bp| bp.enabled = false)
    }

    pub fn set_temporary(&self, ids: &[BreakpointId], temporary: bool) -> Result<(), DebugError> {
        self.update_all(ids, |bp| bp.temporary = temporary)
    }

    pub fn set_ignore_count(&self, ids: &[BreakpointId], count: usize) -> Result<(), DebugError> {
        self.update_all(ids, |bp| bp.ignore_count = count)
    }

    pub fn exists(&self, id: BreakpointId) -> bool {
        self.entries.borrow().contains_key(&id)
    }

    pub fn get(&self, id: BreakpointId) -> Option<BreakpointInfo> {
        self.entries.borrow().get(&id).map(|bp| info(id, bp))
    }

    pub fn list(&self) -> Vec<BreakpointInfo> {
        self.entries
            .borrow()
            .iter()
            .map(|(id, bp)| info(*id, bp))
            .collect()
    }

    /// Decide what a guard for `id` does. A real stop calls `suspend`; the
    /// table is not borrowed while it runs, so the suspended session may
    /// edit breakpoints freely.
    pub fn hit<E>(
        &self,
        id: BreakpointId,
        suspend: impl FnOnce() -> Result<FrameExit, E>,
    ) -> Result<HookResult, E> {
        let temporary = {
            let mut entries = self.entries.borrow_mut();
            let Some(bp) = entries.get_mut(&id) else {
                return Ok(HookResult::proceed());
            };
            if !bp.enabled {
                return Ok(HookResult::proceed());
            }
            if bp.ignore_count > 0 {
                bp.ignore_count -= 1;
                debug!(%id, remaining = bp.ignore_count, "breakpoint ignored");
                return Ok(HookResult::proceed());
            }
            bp.temporary
        };

        debug!(%id, "breakpoint hit");
        let exit = suspend();
        if temporary && self.exists(id) {
            let _ = self.remove(id);
        }

        Ok(match exit? {
            FrameExit::Return(value) => HookResult::force(value),
            FrameExit::Resume => HookResult::proceed(),
        })
    }
}

fn info(id: BreakpointId, bp: &Breakpoint) -> BreakpointInfo {
    BreakpointInfo {
        id,
        label: bp.label.clone(),
        enabled: bp.enabled,
        temporary: bp.temporary,
        ignore_count: bp.ignore_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Namespace;
    use crate::parser::{parse, StmtKind};

    fn function(src: &str) -> Rc<Function> {
        let stmts = parse(src).unwrap();
        let StmtKind::Function(decl) = &stmts[0].kind else {
            panic!("expected function");
        };
        Rc::new(Function::new(
            decl.name.clone(),
            Vec::new(),
            decl.code.clone(),
            None,
            Namespace::new("__main__"),
        ))
    }

    const SRC: &str = "fn f() {\n  x = 1\n  y = 2\n}";

    fn stop(value: i64) -> impl FnOnce() -> Result<FrameExit, DebugError> {
        move || Ok(FrameExit::Return(Value::Int(value)))
    }

    #[test]
    fn test_ids_are_never_reused() {
        let table = BreakpointTable::new();
        let f = function(SRC);
        let first = table.create(&f, None).unwrap();
        table.remove(first).unwrap();
        assert!(table.create(&f, Some(99)).is_err());
        let second = table.create(&f, Some(3)).unwrap();
        assert_eq!((first, second), (BreakpointId(1), BreakpointId(2)));
        assert_eq!(f.code().guards(), vec![second]);
        assert_eq!(table.get(second).unwrap().label, "f:3");
    }

    #[test]
    fn test_bulk_updates_are_all_or_nothing() {
        let table = BreakpointTable::new();
        let f = function(SRC);
        let id = table.create(&f, None).unwrap();
        assert_eq!(
            table.disable(&[id, BreakpointId(7)]),
            Err(DebugError::UnknownBreakpoint(BreakpointId(7)))
        );
        assert!(table.get(id).unwrap().enabled);
        assert_eq!(table.remove(BreakpointId(7)), Err(DebugError::UnknownBreakpoint(BreakpointId(7))));
    }

    #[test]
    fn test_disabled_hit_does_not_suspend() {
        let table = BreakpointTable::new();
        let id = table.create(&function(SRC), None).unwrap();
        table.disable(&[id]).unwrap();
        let result = table.hit(id, || -> Result<FrameExit, DebugError> {
            panic!("must not suspend")
        });
        assert_eq!(result, Ok(HookResult::proceed()));
    }

    #[test]
    fn test_ignore_count_then_stop() {
        let table = BreakpointTable::new();
        let id = table.create(&function(SRC), None).unwrap();
        table.set_ignore_count(&[id], 2).unwrap();
        let stops = Cell::new(0);
        for _ in 0..3 {
            table
                .hit(id, || {
                    stops.set(stops.get() + 1);
                    stop(4)()
                })
                .unwrap();
        }
        assert_eq!(stops.get(), 1);
        assert_eq!(table.get(id).unwrap().ignore_count, 0);
    }

    #[test]
    fn test_temporary_removes_itself_and_its_guard() {
        let table = BreakpointTable::new();
        let f = function(SRC);
        let id = table.create(&f, Some(2)).unwrap();
        table.set_temporary(&[id], true).unwrap();
        assert_eq!(table.hit(id, stop(8)), Ok(HookResult::force(Value::Int(8))));
        assert!(table.list().is_empty());
        assert!(f.code().guards().is_empty());
        assert_eq!(table.hit(id, stop(9)), Ok(HookResult::proceed()));
    }

    #[test]
    fn test_resume_continues() {
        let table = BreakpointTable::new();
        let id = table.create(&function(SRC), None).unwrap();
        let result = table.hit(id, || Ok::<_, DebugError>(FrameExit::Resume));
        assert_eq!(result, Ok(HookResult::proceed()));
    }

    #[test]
    fn test_listing_format() {
        let table = BreakpointTable::new();
        let id = table.create(&function(SRC), None).unwrap();
        table.disable(&[id]).unwrap();
        table.set_ignore_count(&[id], 3).unwrap();
        table.set_temporary(&[id], true).unwrap();
        assert_eq!(table.list()[0].to_string(), "  1  f:2  [dis]  (ign 3)  (temp)");
    }
}
