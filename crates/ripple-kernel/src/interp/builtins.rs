//! Builtin functions and importable modules.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::eval::{EvalResult, Interp};
use super::value::{
    json_to_value, raise, value_to_json, BuiltinFn, ModuleObj, Number, Value,
};

fn builtin(
    name: &'static str,
    f: impl Fn(&mut Interp, Vec<Value>, Vec<(String, Value)>) -> EvalResult<Value> + 'static,
) -> Value {
    Value::Builtin(Rc::new(BuiltinFn {
        name,
        f: Box::new(f),
    }))
}

fn kwarg(kwargs: &[(String, Value)], name: &str) -> Option<Value> {
    kwargs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> EvalResult<()> {
    if args.len() < min || args.len() > max {
        return raise(
            "TypeError",
            format!(
                "{name}() takes {min}..{max} positional arguments but {} were given",
                args.len()
            ),
        );
    }
    Ok(())
}

/// Exception kinds with constructor builtins.
const EXCEPTION_KINDS: &[&str] = &[
    "Exception",
    "ValueError",
    "TypeError",
    "KeyError",
    "IndexError",
    "NameError",
    "AttributeError",
    "ZeroDivisionError",
    "RuntimeError",
    "ImportError",
];

/// Build the builtins table the globals mapping is seeded over.
pub fn install() -> FxHashMap<String, Value> {
    let mut table = FxHashMap::default();

    table.insert(
        "print".to_string(),
        builtin("print", |interp, args, kwargs| {
            let sep = match kwarg(&kwargs, "sep") {
                Some(v) => v.display(),
                None => " ".to_string(),
            };
            let end = match kwarg(&kwargs, "end") {
                Some(v) => v.display(),
                None => "\n".to_string(),
            };
            let parts: Vec<String> = args.iter().map(Value::display).collect();
            interp.stdout.push_str(&parts.join(&sep));
            interp.stdout.push_str(&end);
            Ok(Value::None)
        }),
    );

    table.insert(
        "len".to_string(),
        builtin("len", |_, args, _| {
            arity("len", &args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.borrow().len(),
                Value::Tuple(items) => items.len(),
                Value::Dict(entries) => entries.borrow().len(),
                Value::Set(items) => items.borrow().len(),
                other => {
                    return raise(
                        "TypeError",
                        format!("object of type '{}' has no len()", other.type_name()),
                    )
                }
            };
            Ok(Value::Int(len as i64))
        }),
    );

    table.insert(
        "range".to_string(),
        builtin("range", |_, args, _| {
            arity("range", &args, 1, 3)?;
            let as_int = |v: &Value| -> EvalResult<i64> {
                match v.as_number() {
                    Some(Number::Int(n)) => Ok(n),
                    _ => raise(
                        "TypeError",
                        format!(
                            "'{}' object cannot be interpreted as an integer",
                            v.type_name()
                        ),
                    ),
                }
            };
            let (start, stop, step) = match args.len() {
                1 => (0, as_int(&args[0])?, 1),
                2 => (as_int(&args[0])?, as_int(&args[1])?, 1),
                _ => (as_int(&args[0])?, as_int(&args[1])?, as_int(&args[2])?),
            };
            if step == 0 {
                return raise("ValueError", "range() arg 3 must not be zero");
            }
            let mut items = Vec::new();
            let mut current = start;
            while (step > 0 && current < stop) || (step < 0 && current > stop) {
                items.push(Value::Int(current));
                current += step;
            }
            Ok(Value::list(items))
        }),
    );

    table.insert(
        "sum".to_string(),
        builtin("sum", |interp, args, _| {
            arity("sum", &args, 1, 2)?;
            let items = interp.iter_values(&args[0])?;
            let mut acc = args.get(1).cloned().unwrap_or(Value::Int(0));
            for item in items {
                acc = interp.binary_op(ripple_core::lang::ast::Op::Add, acc, item)?;
            }
            Ok(acc)
        }),
    );

    table.insert("min".to_string(), builtin("min", min_max_impl("min")));
    table.insert("max".to_string(), builtin("max", min_max_impl("max")));

    table.insert(
        "abs".to_string(),
        builtin("abs", |_, args, _| {
            arity("abs", &args, 1, 1)?;
            match args[0].as_number() {
                Some(Number::Int(n)) => Ok(Value::Int(n.abs())),
                Some(Number::Float(f)) => Ok(Value::Float(f.abs())),
                None => raise(
                    "TypeError",
                    format!("bad operand type for abs(): '{}'", args[0].type_name()),
                ),
            }
        }),
    );

    table.insert(
        "round".to_string(),
        builtin("round", |_, args, _| {
            arity("round", &args, 1, 2)?;
            let digits = match args.get(1) {
                Some(v) => match v.as_number() {
                    Some(Number::Int(n)) => Some(n),
                    _ => return raise("TypeError", "round() second argument must be an int"),
                },
                None => None,
            };
            match (args[0].as_number(), digits) {
                (Some(Number::Int(n)), None | Some(0)) => Ok(Value::Int(n)),
                (Some(number), None) => Ok(Value::Int(number.as_f64().round() as i64)),
                (Some(number), Some(d)) => {
                    let factor = 10f64.powi(d as i32);
                    Ok(Value::Float((number.as_f64() * factor).round() / factor))
                }
                (None, _) => raise(
                    "TypeError",
                    format!("type {} doesn't define __round__", args[0].type_name()),
                ),
            }
        }),
    );

    table.insert(
        "sorted".to_string(),
        builtin("sorted", |interp, args, kwargs| {
            arity("sorted", &args, 1, 1)?;
            let reverse = kwarg(&kwargs, "reverse").map(|v| v.is_truthy()).unwrap_or(false);
            let mut items = interp.iter_values(&args[0])?;
            let mut failed = false;
            items.sort_by(|a, b| match a.value_cmp(b) {
                Some(ordering) => ordering,
                None => {
                    failed = true;
                    std::cmp::Ordering::Equal
                }
            });
            if failed {
                return raise("TypeError", "'<' not supported between these elements");
            }
            if reverse {
                items.reverse();
            }
            Ok(Value::list(items))
        }),
    );

    table.insert(
        "reversed".to_string(),
        builtin("reversed", |interp, args, _| {
            arity("reversed", &args, 1, 1)?;
            let mut items = interp.iter_values(&args[0])?;
            items.reverse();
            Ok(Value::list(items))
        }),
    );

    table.insert(
        "enumerate".to_string(),
        builtin("enumerate", |interp, args, kwargs| {
            arity("enumerate", &args, 1, 2)?;
            let start = match args.get(1).cloned().or_else(|| kwarg(&kwargs, "start")) {
                Some(v) => match v.as_number() {
                    Some(Number::Int(n)) => n,
                    _ => return raise("TypeError", "enumerate() start must be an int"),
                },
                None => 0,
            };
            let items = interp.iter_values(&args[0])?;
            Ok(Value::list(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| {
                        Value::Tuple(Rc::new(vec![Value::Int(start + i as i64), item]))
                    })
                    .collect(),
            ))
        }),
    );

    table.insert(
        "zip".to_string(),
        builtin("zip", |interp, args, _| {
            let mut columns = Vec::with_capacity(args.len());
            for arg in &args {
                columns.push(interp.iter_values(arg)?);
            }
            let shortest = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut rows = Vec::with_capacity(shortest);
            for i in 0..shortest {
                rows.push(Value::Tuple(Rc::new(
                    columns.iter().map(|col| col[i].clone()).collect(),
                )));
            }
            Ok(Value::list(rows))
        }),
    );

    table.insert(
        "str".to_string(),
        builtin("str", |_, args, _| {
            arity("str", &args, 0, 1)?;
            Ok(Value::str(args.first().map(Value::display).unwrap_or_default()))
        }),
    );

    table.insert(
        "repr".to_string(),
        builtin("repr", |_, args, _| {
            arity("repr", &args, 1, 1)?;
            Ok(Value::str(args[0].repr()))
        }),
    );

    table.insert(
        "int".to_string(),
        builtin("int", |_, args, _| {
            arity("int", &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Int(n)) => Ok(Value::Int(*n)),
                Some(Value::Float(f)) => Ok(Value::Int(f.trunc() as i64)),
                Some(Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
                Some(Value::Str(s)) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                    super::eval::RuntimeError::new(
                        "ValueError",
                        format!("invalid literal for int() with base 10: '{s}'"),
                    )
                }),
                Some(other) => raise(
                    "TypeError",
                    format!("int() argument must be a number or string, not '{}'", other.type_name()),
                ),
            }
        }),
    );

    table.insert(
        "float".to_string(),
        builtin("float", |_, args, _| {
            arity("float", &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(value) => match value.as_number() {
                    Some(number) => Ok(Value::Float(number.as_f64())),
                    None => match value {
                        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                            super::eval::RuntimeError::new(
                                "ValueError",
                                format!("could not convert string to float: '{s}'"),
                            )
                        }),
                        other => raise(
                            "TypeError",
                            format!(
                                "float() argument must be a number or string, not '{}'",
                                other.type_name()
                            ),
                        ),
                    },
                },
            }
        }),
    );

    table.insert(
        "bool".to_string(),
        builtin("bool", |_, args, _| {
            arity("bool", &args, 0, 1)?;
            Ok(Value::Bool(args.first().map(Value::is_truthy).unwrap_or(false)))
        }),
    );

    table.insert(
        "list".to_string(),
        builtin("list", |interp, args, _| {
            arity("list", &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::list(Vec::new())),
                Some(value) => Ok(Value::list(interp.iter_values(value)?)),
            }
        }),
    );

    table.insert(
        "tuple".to_string(),
        builtin("tuple", |interp, args, _| {
            arity("tuple", &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Tuple(Rc::new(Vec::new()))),
                Some(value) => Ok(Value::Tuple(Rc::new(interp.iter_values(value)?))),
            }
        }),
    );

    table.insert(
        "set".to_string(),
        builtin("set", |interp, args, _| {
            arity("set", &args, 0, 1)?;
            let mut out: Vec<Value> = Vec::new();
            if let Some(value) = args.first() {
                for item in interp.iter_values(value)? {
                    if !out.iter().any(|v| v.value_eq(&item)) {
                        out.push(item);
                    }
                }
            }
            Ok(Value::set(out))
        }),
    );

    table.insert(
        "dict".to_string(),
        builtin("dict", |interp, args, kwargs| {
            arity("dict", &args, 0, 1)?;
            let mut entries: Vec<(Value, Value)> = Vec::new();
            match args.first() {
                None => {}
                Some(Value::Dict(source)) => entries = source.borrow().clone(),
                Some(value) => {
                    for item in interp.iter_values(value)? {
                        let pair = interp.iter_values(&item)?;
                        if pair.len() != 2 {
                            return raise("ValueError", "dict update sequence elements must be pairs");
                        }
                        entries.push((pair[0].clone(), pair[1].clone()));
                    }
                }
            }
            for (name, value) in kwargs {
                entries.push((Value::str(name), value));
            }
            Ok(Value::dict(entries))
        }),
    );

    table.insert(
        "type".to_string(),
        builtin("type", |_, args, _| {
            arity("type", &args, 1, 1)?;
            let name = match &args[0] {
                Value::Instance(instance) => instance.borrow().class.name.clone(),
                other => other.type_name().to_string(),
            };
            Ok(Value::str(format!("<class '{name}'>")))
        }),
    );

    for &kind in EXCEPTION_KINDS {
        table.insert(
            kind.to_string(),
            builtin(kind, move |_, args, _| {
                let message = args.first().map(Value::display).unwrap_or_default();
                Ok(Value::Exception(Rc::new(super::value::ExceptionVal {
                    kind: kind.to_string(),
                    message,
                })))
            }),
        );
    }

    table
}

fn min_max_impl(
    name: &'static str,
) -> impl Fn(&mut Interp, Vec<Value>, Vec<(String, Value)>) -> EvalResult<Value> {
    move |interp, args, _| {
        let items = match args.len() {
            0 => return raise("TypeError", format!("{name} expected at least 1 argument")),
            1 => interp.iter_values(&args[0])?,
            _ => args,
        };
        if items.is_empty() {
            return raise("ValueError", format!("{name}() arg is an empty sequence"));
        }
        let mut best = items[0].clone();
        for item in &items[1..] {
            let Some(ordering) = item.value_cmp(&best) else {
                return raise("TypeError", "'<' not supported between these elements");
            };
            let take = if name == "min" {
                ordering == std::cmp::Ordering::Less
            } else {
                ordering == std::cmp::Ordering::Greater
            };
            if take {
                best = item.clone();
            }
        }
        Ok(best)
    }
}

/// Resolve an importable builtin module.
pub fn import_module(name: &str) -> Option<Value> {
    match name {
        "math" => Some(math_module()),
        "json" => Some(json_module()),
        _ => None,
    }
}

fn math_fn1(name: &'static str, f: fn(f64) -> f64) -> Value {
    builtin(name, move |_, args, _| {
        arity(name, &args, 1, 1)?;
        let Some(number) = args[0].as_number() else {
            return raise(
                "TypeError",
                format!("must be real number, not {}", args[0].type_name()),
            );
        };
        let result = f(number.as_f64());
        if result.is_nan() && !number.as_f64().is_nan() {
            return raise("ValueError", "math domain error");
        }
        Ok(Value::Float(result))
    })
}

fn math_module() -> Value {
    let mut dict = FxHashMap::default();
    dict.insert("pi".to_string(), Value::Float(std::f64::consts::PI));
    dict.insert("e".to_string(), Value::Float(std::f64::consts::E));
    dict.insert("sqrt".to_string(), math_fn1("sqrt", f64::sqrt));
    dict.insert("exp".to_string(), math_fn1("exp", f64::exp));
    dict.insert("sin".to_string(), math_fn1("sin", f64::sin));
    dict.insert("cos".to_string(), math_fn1("cos", f64::cos));
    dict.insert("tan".to_string(), math_fn1("tan", f64::tan));
    dict.insert("log".to_string(), math_fn1("log", f64::ln));
    dict.insert("log10".to_string(), math_fn1("log10", f64::log10));
    dict.insert("fabs".to_string(), math_fn1("fabs", f64::abs));
    dict.insert(
        "floor".to_string(),
        builtin("floor", |_, args, _| {
            arity("floor", &args, 1, 1)?;
            match args[0].as_number() {
                Some(n) => Ok(Value::Int(n.as_f64().floor() as i64)),
                None => raise("TypeError", "must be real number"),
            }
        }),
    );
    dict.insert(
        "ceil".to_string(),
        builtin("ceil", |_, args, _| {
            arity("ceil", &args, 1, 1)?;
            match args[0].as_number() {
                Some(n) => Ok(Value::Int(n.as_f64().ceil() as i64)),
                None => raise("TypeError", "must be real number"),
            }
        }),
    );
    dict.insert(
        "pow".to_string(),
        builtin("pow", |_, args, _| {
            arity("pow", &args, 2, 2)?;
            match (args[0].as_number(), args[1].as_number()) {
                (Some(a), Some(b)) => Ok(Value::Float(a.as_f64().powf(b.as_f64()))),
                _ => raise("TypeError", "must be real numbers"),
            }
        }),
    );
    Value::Module(Rc::new(ModuleObj { name: "math", dict }))
}

fn json_module() -> Value {
    let mut dict = FxHashMap::default();
    dict.insert(
        "dumps".to_string(),
        builtin("dumps", |_, args, _| {
            arity("dumps", &args, 1, 1)?;
            match value_to_json(&args[0]) {
                Some(json) => Ok(Value::str(json.to_string())),
                None => raise(
                    "TypeError",
                    format!(
                        "object of type {} is not JSON serializable",
                        args[0].type_name()
                    ),
                ),
            }
        }),
    );
    dict.insert(
        "loads".to_string(),
        builtin("loads", |_, args, _| {
            arity("loads", &args, 1, 1)?;
            let Value::Str(s) = &args[0] else {
                return raise("TypeError", "the JSON object must be a string");
            };
            match serde_json::from_str::<serde_json::Value>(s) {
                Ok(json) => Ok(json_to_value(&json)),
                Err(e) => raise("ValueError", format!("invalid JSON: {e}")),
            }
        }),
    );
    Value::Module(Rc::new(ModuleObj { name: "json", dict }))
}
