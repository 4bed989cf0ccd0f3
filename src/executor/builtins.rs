use super::runner::Runtime;
use super::value::Value;
use crate::error::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Str,
    Name,
    Meta,
    SetMeta,
    Proxy,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        let builtin = match name {
            "print" => Builtin::Print,
            "len" => Builtin::Len,
            "str" => Builtin::Str,
            "name" => Builtin::Name,
            "meta" => Builtin::Meta,
            "setmeta" => Builtin::SetMeta,
            "proxy" => Builtin::Proxy,
            _ => return None,
        };
        Some(builtin)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Name => "name",
            Builtin::Meta => "meta",
            Builtin::SetMeta => "setmeta",
            Builtin::Proxy => "proxy",
        }
    }

    fn expect_args(&self, args: &[Value], count: usize) -> Result<(), RuntimeError> {
        if args.len() == count {
            Ok(())
        } else {
            Err(RuntimeError::arguments(
                self.name(),
                format!("takes {count} arguments but {} were given", args.len()),
            ))
        }
    }

    pub fn call(
        &self,
        runtime: &dyn Runtime,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        if let Some((key, _)) = kwargs.first() {
            return Err(RuntimeError::arguments(
                self.name(),
                format!("got an unexpected keyword argument '{key}'"),
            ));
        }

        match self {
            Builtin::Print => {
                let text: Vec<String> = args.iter().map(Value::to_text).collect();
                runtime.print(&text.join(" "));
                Ok(Value::None)
            }
            Builtin::Len => {
                self.expect_args(&args, 1)?;
                let len = match &args[0] {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) => items.len(),
                    other => {
                        return Err(RuntimeError::Type(format!(
                            "object of type '{}' has no len()",
                            other.type_name()
                        )))
                    }
                };
                i64::try_from(len)
                    .map(Value::Int)
                    .map_err(|_| RuntimeError::Overflow)
            }
            Builtin::Str => {
                self.expect_args(&args, 1)?;
                Ok(Value::Str(args[0].to_text()))
            }
            Builtin::Name => {
                self.expect_args(&args, 1)?;
                match &args[0] {
                    Value::Function(func) => Ok(Value::str(func.name())),
                    Value::Proxy(proxy) => Ok(Value::str(proxy.name())),
                    Value::Builtin(b) => Ok(Value::str(b.name())),
                    other => Err(RuntimeError::Type(format!(
                        "'{}' object has no name",
                        other.type_name()
                    ))),
                }
            }
            Builtin::Meta => {
                self.expect_args(&args, 2)?;
                let func = routine(&args[0])?;
                let key = key(&args[1])?;
                Ok(func.meta(key).unwrap_or(Value::None))
            }
            Builtin::SetMeta => {
                self.expect_args(&args, 3)?;
                let func = routine(&args[0])?;
                let key = key(&args[1])?;
                func.set_meta(key, args[2].clone());
                Ok(Value::None)
            }
            Builtin::Proxy => {
                self.expect_args(&args, 1)?;
                runtime.wrap_as_breakpoint(&args[0])
            }
        }
    }
}

fn routine(value: &Value) -> Result<&std::rc::Rc<super::value::Function>, RuntimeError> {
    value.as_function().ok_or_else(|| {
        RuntimeError::Type(format!(
            "expected a function, got '{}'",
            value.type_name()
        ))
    })
}

fn key(value: &Value) -> Result<&str, RuntimeError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(RuntimeError::Type(format!(
            "metadata keys must be str, got '{}'",
            other.type_name()
        ))),
    }
}
