use super::shell::Target;
use crate::executor::{BindingCell, BindingSet, Namespace, ScopeSplicer, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Created,
    Active,
    Suspended,
    Exited,
}

/// How a suspended frame was left.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameExit {
    /// Force the paused call to return this value.
    Return(Value),
    /// Let the paused routine carry on.
    Resume,
}

/// How outer variables reach a new frame.
pub enum Capture {
    /// Live cells shared with the defining scope.
    Reference(HashMap<String, BindingCell>),
    /// Copies taken at the stop. Changes do not reach the outer scope.
    Value { free_vars: BTreeMap<String, Value> },
}

impl Capture {
    pub fn none() -> Self {
        Capture::Reference(HashMap::new())
    }
}

pub struct Frame {
    name: String,
    namespace: Rc<Namespace>,
    splicer: Rc<ScopeSplicer>,
    state: Cell<FrameState>,
    exit: RefCell<Option<FrameExit>>,
    copied_by_value: bool,
    previous: Target,
}

impl Frame {
    pub fn new(
        name: &str,
        namespace: Rc<Namespace>,
        bindings: BindingSet,
        capture: Capture,
        previous: Target,
    ) -> Self {
        let copied_by_value = match capture {
            Capture::Reference(cells) => {
                for (var, cell) in cells {
                    bindings.insert_cell(&var, cell);
                }
                false
            }
            Capture::Value { free_vars } => {
                if !free_vars.is_empty() {
                    warn!(
                        frame = name,
                        names = ?free_vars.keys().collect::<Vec<_>>(),
                        "outer variables captured by value; assignments to them stay in this frame"
                    );
                }
                let copied = !free_vars.is_empty();
                for (var, value) in free_vars {
                    if !bindings.contains(&var) {
                        bindings.set(&var, value);
                    }
                }
                copied
            }
        };

        Self {
            name: name.to_string(),
            splicer: Rc::new(ScopeSplicer::new(bindings, namespace.clone())),
            namespace,
            state: Cell::new(FrameState::Created),
            exit: RefCell::new(None),
            copied_by_value,
            previous,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &Rc<Namespace> {
        &self.namespace
    }

    pub fn splicer(&self) -> &Rc<ScopeSplicer> {
        &self.splicer
    }

    pub fn bindings(&self) -> &BindingSet {
        self.splicer.bindings()
    }

    pub fn state(&self) -> FrameState {
        self.state.get()
    }

    pub fn set_state(&self, state: FrameState) {
        self.state.set(state);
    }

    pub fn is_exited(&self) -> bool {
        self.state.get() == FrameState::Exited
    }

    pub fn copied_by_value(&self) -> bool {
        self.copied_by_value
    }

    /// Target that was active before this frame.
    pub fn previous(&self) -> &Target {
        &self.previous
    }

    pub fn finish(&self, exit: FrameExit) {
        *self.exit.borrow_mut() = Some(exit);
        self.state.set(FrameState::Exited);
    }

    pub fn take_exit(&self) -> Option<FrameExit> {
        self.exit.borrow_mut().take()
    }
}

pub enum StackEntry {
    /// Placeholder for "no frame suspended"; never popped.
    Root { namespace: Rc<Namespace> },
    Frame(Rc<Frame>),
}

impl StackEntry {
    pub fn namespace(&self) -> &Rc<Namespace> {
        match self {
            StackEntry::Root { namespace } => namespace,
            StackEntry::Frame(frame) => frame.namespace(),
        }
    }
}

/// LIFO stack of suspended frames above a root entry.
pub struct FrameStack {
    entries: Vec<StackEntry>,
}

impl FrameStack {
    pub fn new(root: Rc<Namespace>) -> Self {
        Self {
            entries: vec![StackEntry::Root { namespace: root }],
        }
    }

    pub fn push(&mut self, frame: Rc<Frame>) {
        self.entries.push(StackEntry::Frame(frame));
    }

    /// Pop the top frame. `None` when only the root is left.
    ///
    /// # Panics
    ///
    /// If the root entry itself has gone missing.
    pub fn pop_frame(&mut self) -> Option<Rc<Frame>> {
        match self.entries.last() {
            None => panic!("frame stack lost its root entry"),
            Some(StackEntry::Root { .. }) => None,
            Some(StackEntry::Frame(_)) => match self.entries.pop() {
                Some(StackEntry::Frame(frame)) => Some(frame),
                _ => None,
            },
        }
    }

    /// Drop `frame` wherever it sits. Used when unwinding past a frame
    /// that never exited.
    pub fn discard(&mut self, frame: &Rc<Frame>) -> bool {
        let position = self.entries.iter().rposition(|entry| match entry {
            StackEntry::Frame(f) => Rc::ptr_eq(f, frame),
            StackEntry::Root { .. } => false,
        });
        match position {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn top(&self) -> &StackEntry {
        match self.entries.last() {
            Some(entry) => entry,
            None => panic!("frame stack lost its root entry"),
        }
    }

    pub fn top_frame(&self) -> Option<Rc<Frame>> {
        match self.top() {
            StackEntry::Frame(frame) => Some(frame.clone()),
            StackEntry::Root { .. } => None,
        }
    }

    pub fn root_namespace(&self) -> &Rc<Namespace> {
        match self.entries.first() {
            Some(entry) => entry.namespace(),
            None => panic!("frame stack lost its root entry"),
        }
    }

    pub fn set_root(&mut self, namespace: Rc<Namespace>) {
        if let Some(root) = self.entries.first_mut() {
            *root = StackEntry::Root { namespace };
        }
    }

    /// Number of suspended frames, root excluded.
    pub fn depth(&self) -> usize {
        self.entries.len().saturating_sub(1)
    }

    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    pub fn frames(&self) -> Vec<Rc<Frame>> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                StackEntry::Frame(frame) => Some(frame.clone()),
                StackEntry::Root { .. } => None,
            })
            .collect()
    }
}
