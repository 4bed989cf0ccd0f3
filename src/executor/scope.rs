use super::value::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

/// Shared storage for one variable. Clones refer to the same slot; an
/// empty cell is declared but not yet bound.
#[derive(Clone, Default)]
pub struct BindingCell(Rc<RefCell<Option<Value>>>);

impl BindingCell {
    pub fn new(value: Value) -> Self {
        Self(Rc::new(RefCell::new(Some(value))))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Value> {
        self.0.borrow().clone()
    }

    pub fn set(&self, value: Value) {
        *self.0.borrow_mut() = Some(value);
    }

    /// Back to declared-but-unbound.
    pub fn clear(&self) {
        self.0.borrow_mut().take();
    }

    pub fn is_bound(&self) -> bool {
        self.0.borrow().is_some()
    }

    pub fn same_cell(&self, other: &BindingCell) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for BindingCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => write!(f, "BindingCell({value})"),
            None => write!(f, "BindingCell(<empty>)"),
        }
    }
}

/// A shared, growable `name -> BindingCell` map. Clones are handles to
/// the same set.
#[derive(Clone, Default)]
pub struct BindingSet(Rc<RefCell<BTreeMap<String, BindingCell>>>);

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: impl IntoIterator<Item = (String, Value)>) -> Self {
        let set = Self::new();
        for (name, value) in values {
            set.insert_cell(&name, BindingCell::new(value));
        }
        set
    }

    pub fn cell(&self, name: &str) -> Option<BindingCell> {
        self.0.borrow().get(name).cloned()
    }

    /// Existing cell for `name`, or a fresh empty one added to the set.
    pub fn get_or_create(&self, name: &str) -> BindingCell {
        self.0
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn insert_cell(&self, name: &str, cell: BindingCell) {
        self.0.borrow_mut().insert(name.to_string(), cell);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.borrow().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.cell(name).and_then(|cell| cell.get())
    }

    pub fn set(&self, name: &str, value: Value) {
        self.get_or_create(name).set(value);
    }

    /// A new set holding the same cells as this one.
    pub fn share(&self) -> BindingSet {
        Self(Rc::new(RefCell::new(self.0.borrow().clone())))
    }

    /// Drop the named cells that never received a value.
    pub fn discard_unbound(&self, names: &[String]) {
        let mut map = self.0.borrow_mut();
        for name in names {
            if map.get(name).is_some_and(|cell| !cell.is_bound()) {
                map.remove(name);
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Current values of all bound cells.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.0
            .borrow()
            .iter()
            .filter_map(|(name, cell)| cell.get().map(|v| (name.clone(), v)))
            .collect()
    }

    pub fn same_set(&self, other: &BindingSet) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl From<HashMap<String, Value>> for BindingSet {
    fn from(values: HashMap<String, Value>) -> Self {
        Self::from_values(values)
    }
}

impl From<BTreeMap<String, Value>> for BindingSet {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self::from_values(values)
    }
}

impl fmt::Debug for BindingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.borrow().iter()).finish()
    }
}

/// One level of local variables, chained to the scope a routine was
/// defined in.
pub struct Scope {
    bindings: BindingSet,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn new(bindings: BindingSet, parent: Option<Rc<Scope>>) -> Rc<Self> {
        Rc::new(Self { bindings, parent })
    }

    pub fn bindings(&self) -> &BindingSet {
        &self.bindings
    }

    /// Nearest cell for `name` along the scope chain.
    pub fn resolve(&self, name: &str) -> Option<BindingCell> {
        self.bindings
            .cell(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.resolve(name)))
    }
}

/// A named top-level namespace (module).
pub struct Namespace {
    name: String,
    globals: BindingSet,
}

impl Namespace {
    pub fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            globals: BindingSet::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn globals(&self) -> &BindingSet {
        &self.globals
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.globals.get(name)
    }

    pub fn set(&self, name: &str, value: Value) {
        self.globals.set(name, value);
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_are_shared_between_sets() {
        let a = BindingSet::from_values([("x".to_string(), Value::Int(1))]);
        let b = BindingSet::new();
        b.insert_cell("x", a.cell("x").unwrap());
        b.set("x", Value::Int(2));
        assert_eq!(a.get("x"), Some(Value::Int(2)));
    }

    #[test]
    fn test_get_or_create_reuses_cells() {
        let set = BindingSet::new();
        let first = set.get_or_create("y");
        assert!(!first.is_bound());
        first.set(Value::Int(3));
        assert!(set.get_or_create("y").same_cell(&first));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_scope_resolution_walks_parents() {
        let outer = Scope::new(BindingSet::from_values([("a".to_string(), Value::Int(1))]), None);
        let inner = Scope::new(BindingSet::from_values([("b".to_string(), Value::Int(2))]), Some(outer));
        assert_eq!(inner.resolve("a").and_then(|c| c.get()), Some(Value::Int(1)));
        assert_eq!(inner.resolve("b").and_then(|c| c.get()), Some(Value::Int(2)));
        assert!(inner.resolve("c").is_none());
    }

    #[test]
    fn test_snapshot_skips_empty_cells() {
        let set = BindingSet::from_values([("a".to_string(), Value::Int(1))]);
        set.get_or_create("pending");
        assert_eq!(set.snapshot().len(), 1);
    }
}
