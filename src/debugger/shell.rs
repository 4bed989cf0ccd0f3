use crate::error::DebugError;
use crate::executor::{Console, Env, Namespace, ScopeSplicer};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Where submitted cells execute.
#[derive(Clone)]
pub struct Target {
    pub label: String,
    pub namespace: Rc<Namespace>,
    /// Set while a frame is active.
    pub splicer: Option<Rc<ScopeSplicer>>,
}

impl Target {
    pub fn module(namespace: Rc<Namespace>) -> Self {
        Self {
            label: namespace.name().to_string(),
            namespace,
            splicer: None,
        }
    }

    pub fn env(&self) -> Env {
        match &self.splicer {
            Some(splicer) => splicer.env(),
            None => Env::module(self.namespace.clone()),
        }
    }
}

/// The interactive session: module registry, current target and output.
pub struct Shell {
    main: Rc<Namespace>,
    modules: RefCell<BTreeMap<String, Rc<Namespace>>>,
    target: RefCell<Target>,
    execution_count: Cell<usize>,
    console: Rc<dyn Console>,
    attached: Cell<bool>,
}

pub const MAIN_MODULE: &str = "__main__";

impl Shell {
    pub fn new(console: Rc<dyn Console>) -> Rc<Self> {
        let main = Namespace::new(MAIN_MODULE);
        let modules = BTreeMap::from([(MAIN_MODULE.to_string(), main.clone())]);
        Rc::new(Self {
            modules: RefCell::new(modules),
            target: RefCell::new(Target::module(main.clone())),
            main,
            execution_count: Cell::new(0),
            console,
            attached: Cell::new(false),
        })
    }

    pub fn main(&self) -> &Rc<Namespace> {
        &self.main
    }

    pub fn module(&self, name: &str) -> Option<Rc<Namespace>> {
        self.modules.borrow().get(name).cloned()
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.borrow().keys().cloned().collect()
    }

    /// The registered module called `name`, created empty if missing.
    pub fn make_module(&self, name: &str) -> Rc<Namespace> {
        self.modules
            .borrow_mut()
            .entry(name.to_string())
            .or_insert_with(|| Namespace::new(name))
            .clone()
    }

    pub fn is_registered(&self, namespace: &Rc<Namespace>) -> bool {
        self.modules
            .borrow()
            .get(namespace.name())
            .is_some_and(|ns| Rc::ptr_eq(ns, namespace))
    }

    pub fn target(&self) -> Target {
        self.target.borrow().clone()
    }

    pub fn set_target(&self, target: Target) {
        *self.target.borrow_mut() = target;
    }

    pub fn execution_count(&self) -> usize {
        self.execution_count.get()
    }

    pub fn advance_count(&self) -> usize {
        let next = self.execution_count.get() + 1;
        self.execution_count.set(next);
        next
    }

    pub fn console(&self) -> &dyn Console {
        self.console.as_ref()
    }

    pub(crate) fn attach(&self) -> Result<(), DebugError> {
        if self.attached.replace(true) {
            return Err(DebugError::AlreadyAttached);
        }
        Ok(())
    }

    pub(crate) fn detach(&self) {
        self.attached.set(false);
    }

    pub fn is_attached(&self) -> bool {
        self.attached.get()
    }
}
