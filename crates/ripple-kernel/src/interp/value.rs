//! Runtime values.
//!
//! Containers are `Rc<RefCell<..>>` so aliasing mutation behaves like the
//! source language (appending through one name is visible through another).
//! The interpreter is single-threaded inside the kernel's serial loop.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use ripple_core::lang::ast::{Expr, Param, Stmt};

use super::eval::{EvalResult, Interp, RuntimeError};

/// A mutable scope: name → value.
pub type ScopeRef = Rc<RefCell<FxHashMap<String, Value>>>;

pub fn new_scope() -> ScopeRef {
    Rc::new(RefCell::new(FxHashMap::default()))
}

/// Ordered dictionary entries. Lookup is linear over insertion order, which
/// keeps key display deterministic and is plenty for cell-sized data.
pub type DictEntries = Vec<(Value, Value)>;

/// Body of a user-defined function.
#[derive(Debug, Clone)]
pub enum FunctionBody {
    Stmts(Rc<Vec<Stmt>>),
    Expr(Rc<Expr>),
}

/// A user-defined function or lambda.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    /// Defaults evaluated at definition time, aligned with `params`.
    pub defaults: Vec<Option<Value>>,
    pub body: FunctionBody,
    /// Enclosing local scopes captured at definition, innermost last.
    pub captured: Vec<ScopeRef>,
}

/// Implementation signature shared by all builtins.
pub type BuiltinImpl =
    Box<dyn Fn(&mut Interp, Vec<Value>, Vec<(String, Value)>) -> EvalResult<Value>>;

/// A builtin function.
pub struct BuiltinFn {
    pub name: &'static str,
    pub f: BuiltinImpl,
}

impl std::fmt::Debug for BuiltinFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<builtin {}>", self.name)
    }
}

/// A user-defined class.
#[derive(Debug)]
pub struct ClassObj {
    pub name: String,
    pub dict: RefCell<FxHashMap<String, Value>>,
}

/// An instance of a user-defined class.
#[derive(Debug)]
pub struct Instance {
    pub class: Rc<ClassObj>,
    pub attrs: FxHashMap<String, Value>,
}

/// A builtin module (`math`, `json`).
#[derive(Debug)]
pub struct ModuleObj {
    pub name: &'static str,
    pub dict: FxHashMap<String, Value>,
}

/// An exception value produced by an exception constructor.
#[derive(Debug, Clone)]
pub struct ExceptionVal {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<String>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<DictEntries>>),
    Set(Rc<RefCell<Vec<Value>>>),
    Function(Rc<Function>),
    Builtin(Rc<BuiltinFn>),
    Class(Rc<ClassObj>),
    Instance(Rc<RefCell<Instance>>),
    Module(Rc<ModuleObj>),
    Exception(Rc<ExceptionVal>),
    /// Method plucked off a receiver (`xs.append`); resolved at call time.
    BoundMethod { recv: Box<Value>, name: String },
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(Rc::new(s.into()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn dict(entries: DictEntries) -> Self {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn set(items: Vec<Value>) -> Self {
        Value::Set(Rc::new(RefCell::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Function(_) | Value::Builtin(_) | Value::BoundMethod { .. } => "function",
            Value::Class(_) => "type",
            Value::Instance(_) => "object",
            Value::Module(_) => "module",
            Value::Exception(_) => "exception",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(entries) => !entries.borrow().is_empty(),
            Value::Set(items) => !items.borrow().is_empty(),
            _ => true,
        }
    }

    /// Numeric view for arithmetic; bools count as ints.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Int(n) => Some(Number::Int(*n)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// Display form (what `print` and `str()` produce).
    pub fn display(&self) -> String {
        match self {
            Value::Str(s) => s.as_ref().clone(),
            Value::Exception(e) => e.message.clone(),
            other => other.repr(),
        }
    }

    /// Literal form (what the REPL and `repr()` produce).
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Value::List(items) => {
                let parts: Vec<String> = items.borrow().iter().map(Value::repr).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            Value::Dict(entries) => {
                let parts: Vec<String> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Set(items) => {
                let borrowed = items.borrow();
                if borrowed.is_empty() {
                    "set()".to_string()
                } else {
                    let parts: Vec<String> = borrowed.iter().map(Value::repr).collect();
                    format!("{{{}}}", parts.join(", "))
                }
            }
            Value::Function(f) => format!("<function {}>", f.name),
            Value::Builtin(b) => format!("<builtin {}>", b.name),
            Value::Class(c) => format!("<class '{}'>", c.name),
            Value::Instance(i) => format!("<{} object>", i.borrow().class.name),
            Value::Module(m) => format!("<module '{}'>", m.name),
            Value::Exception(e) => format!("{}('{}')", e.kind, e.message),
            Value::BoundMethod { name, .. } => format!("<bound method {name}>"),
        }
    }

    /// Structural equality with numeric cross-type comparison.
    pub fn value_eq(&self, other: &Value) -> bool {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => return a.as_f64() == b.as_f64(),
            (Some(_), _) | (_, Some(_)) => return false,
            _ => {}
        }
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.value_eq(y))
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.value_eq(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter()
                            .find(|(bk, _)| bk.value_eq(k))
                            .is_some_and(|(_, bv)| bv.value_eq(v))
                    })
            }
            (Value::Set(a), Value::Set(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| y.value_eq(x)))
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Ordering for `<`/`>` style comparisons; `None` when incomparable.
    pub fn value_cmp(&self, other: &Value) -> Option<std::cmp::Ordering> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a.as_f64().partial_cmp(&b.as_f64());
        }
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => seq_cmp(&a.borrow(), &b.borrow()),
            (Value::Tuple(a), Value::Tuple(b)) => seq_cmp(a, b),
            _ => None,
        }
    }
}

fn seq_cmp(a: &[Value], b: &[Value]) -> Option<std::cmp::Ordering> {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.value_cmp(y)? {
            std::cmp::Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(a.len().cmp(&b.len()))
}

/// Numeric operand view.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }
}

/// Python-style float display: whole floats keep a trailing `.0`.
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f == f.trunc() && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// Convert a value to JSON, if representable.
pub fn value_to_json(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::None => Some(serde_json::Value::Null),
        Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
        Value::Int(n) => Some(serde_json::json!(n)),
        Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number),
        Value::Str(s) => Some(serde_json::Value::String(s.as_ref().clone())),
        Value::List(items) => items.borrow().iter().map(value_to_json).collect(),
        Value::Tuple(items) => items.iter().map(value_to_json).collect(),
        Value::Set(items) => items.borrow().iter().map(value_to_json).collect(),
        Value::Dict(entries) => {
            let mut map = serde_json::Map::new();
            for (k, v) in entries.borrow().iter() {
                let key = match k {
                    Value::Str(s) => s.as_ref().clone(),
                    other => other.display(),
                };
                map.insert(key, value_to_json(v)?);
            }
            Some(serde_json::Value::Object(map))
        }
        _ => None,
    }
}

/// Convert JSON into a value.
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::str(s.clone()),
        serde_json::Value::Array(items) => Value::list(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => Value::dict(
            map.iter()
                .map(|(k, v)| (Value::str(k.clone()), json_to_value(v)))
                .collect(),
        ),
    }
}

/// Shorthand for raising from builtins and methods.
pub fn raise<T>(kind: &str, message: impl Into<String>) -> EvalResult<T> {
    Err(RuntimeError {
        kind: kind.to_string(),
        message: message.into(),
    })
}
