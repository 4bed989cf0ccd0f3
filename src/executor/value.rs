use super::builtins::Builtin;
use super::scope::{BindingCell, Namespace, Scope};
use crate::error::RuntimeError;
use crate::parser::Code;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

/// Runtime value.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Rc<Vec<Value>>),
    Function(Rc<Function>),
    Proxy(Rc<BreakProxy>),
    Builtin(Builtin),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Proxy(_) => "proxy",
            Value::Builtin(_) => "builtin",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Function(_) | Value::Proxy(_) | Value::Builtin(_) => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Proxy(_) | Value::Builtin(_)
        )
    }

    /// The user-defined routine behind a function or break-proxy value.
    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Value::Function(func) => Some(func),
            Value::Proxy(proxy) => Some(proxy.target()),
            _ => None,
        }
    }

    /// Text used by `print` and `str`: strings unquoted, everything else
    /// as displayed.
    pub fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Function(func) => write!(f, "<fn {}>", func.qualname()),
            Value::Proxy(proxy) => write!(f, "<fn {}>", proxy.qualname()),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Proxy(a), Value::Proxy(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

/// A user-defined routine.
pub struct Function {
    name: String,
    qualname: String,
    params: Vec<Param>,
    // Swapped wholesale by breakpoint injection; calls in flight keep the
    // Rc they started with.
    code: RefCell<Rc<Code>>,
    parent: Option<Rc<Scope>>,
    namespace: Rc<Namespace>,
    meta: RefCell<BTreeMap<String, Value>>,
}

impl Function {
    pub fn new(
        qualname: String,
        params: Vec<Param>,
        code: Rc<Code>,
        parent: Option<Rc<Scope>>,
        namespace: Rc<Namespace>,
    ) -> Self {
        Self {
            name: code.name.clone(),
            qualname,
            params,
            code: RefCell::new(code),
            parent,
            namespace,
            meta: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn parent(&self) -> Option<&Rc<Scope>> {
        self.parent.as_ref()
    }

    pub fn namespace(&self) -> &Rc<Namespace> {
        &self.namespace
    }

    pub fn code(&self) -> Rc<Code> {
        self.code.borrow().clone()
    }

    pub fn replace_code(&self, code: Code) {
        *self.code.borrow_mut() = Rc::new(code);
    }

    pub fn meta(&self, key: &str) -> Option<Value> {
        self.meta.borrow().get(key).cloned()
    }

    pub fn set_meta(&self, key: &str, value: Value) {
        self.meta.borrow_mut().insert(key.to_string(), value);
    }

    /// Cells of the outer variables this routine reads, shared with the
    /// scope it was defined in. Names that resolve to the namespace are
    /// not included.
    pub fn closure_cells(&self) -> HashMap<String, BindingCell> {
        let Some(parent) = &self.parent else {
            return HashMap::new();
        };
        self.code()
            .free_vars
            .iter()
            .filter_map(|name| parent.resolve(name).map(|cell| (name.clone(), cell)))
            .collect()
    }

    /// Bind call arguments to parameters, applying defaults.
    pub fn bind(
        &self,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Vec<(String, Value)>, RuntimeError> {
        if args.len() > self.params.len() {
            return Err(RuntimeError::arguments(
                &self.name,
                format!(
                    "takes {} positional arguments but {} were given",
                    self.params.len(),
                    args.len()
                ),
            ));
        }

        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];
        for (slot, value) in slots.iter_mut().zip(args) {
            *slot = Some(value);
        }

        for (key, value) in kwargs {
            let Some(idx) = self.params.iter().position(|p| p.name == key) else {
                return Err(RuntimeError::arguments(
                    &self.name,
                    format!("got an unexpected keyword argument '{key}'"),
                ));
            };
            if slots[idx].is_some() {
                return Err(RuntimeError::arguments(
                    &self.name,
                    format!("got multiple values for argument '{key}'"),
                ));
            }
            slots[idx] = Some(value);
        }

        self.params
            .iter()
            .zip(slots)
            .map(|(param, slot)| match slot.or_else(|| param.default.clone()) {
                Some(value) => Ok((param.name.clone(), value)),
                None => Err(RuntimeError::arguments(
                    &self.name,
                    format!("missing required argument '{}'", param.name),
                )),
            })
            .collect()
    }
}

/// Stand-in that suspends into a frame before running its target.
/// Name, qualified name and metadata are the target's own.
pub struct BreakProxy {
    target: Rc<Function>,
}

impl BreakProxy {
    pub fn new(target: Rc<Function>) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &Rc<Function> {
        &self.target
    }

    pub fn name(&self) -> &str {
        self.target.name()
    }

    pub fn qualname(&self) -> &str {
        self.target.qualname()
    }

    pub fn meta(&self, key: &str) -> Option<Value> {
        self.target.meta(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, StmtKind};

    fn function(src: &str) -> Function {
        let stmts = parse(src).unwrap();
        let StmtKind::Function(decl) = &stmts[0].kind else {
            panic!("expected function");
        };
        let params = decl
            .params
            .iter()
            .map(|p| Param {
                name: p.name.clone(),
                default: p.default.as_ref().map(|_| Value::Int(2)),
            })
            .collect();
        Function::new(
            decl.name.clone(),
            params,
            decl.code.clone(),
            None,
            Namespace::new("__main__"),
        )
    }

    #[test]
    fn test_bind_applies_defaults_and_keywords() {
        let f = function("fn f(a, b = 2) { }");
        assert_eq!(
            f.bind(vec![Value::Int(1)], vec![]).unwrap(),
            vec![("a".to_string(), Value::Int(1)), ("b".to_string(), Value::Int(2))]
        );
        assert_eq!(
            f.bind(vec![], vec![("b".into(), Value::Int(5)), ("a".into(), Value::Int(4))])
                .unwrap(),
            vec![("a".to_string(), Value::Int(4)), ("b".to_string(), Value::Int(5))]
        );
    }

    #[test]
    fn test_bind_rejections() {
        let f = function("fn f(a, b = 2) { }");
        assert!(f.bind(vec![], vec![]).is_err());
        assert!(f.bind(vec![Value::Int(1), Value::Int(2), Value::Int(3)], vec![]).is_err());
        assert!(f.bind(vec![Value::Int(1)], vec![("a".into(), Value::Int(1))]).is_err());
        assert!(f.bind(vec![Value::Int(1)], vec![("c".into(), Value::Int(1))]).is_err());
    }

    #[test]
    fn test_proxy_keeps_identity() {
        let f = Rc::new(function("fn target(a) { }"));
        f.set_meta("doc", Value::str("hello"));
        let proxy = BreakProxy::new(f.clone());
        assert_eq!(proxy.name(), "target");
        assert_eq!(proxy.qualname(), "target");
        assert_eq!(proxy.meta("doc"), Some(Value::str("hello")));
    }

    #[test]
    fn test_display() {
        let v = Value::list(vec![Value::Int(1), Value::str("a"), Value::None]);
        assert_eq!(v.to_string(), "[1, \"a\", none]");
        assert_eq!(Value::str("a").to_text(), "a");
    }
}
