//! Methods on builtin types, plus instance-method dispatch.

use std::rc::Rc;

use super::eval::{EvalResult, Interp, RuntimeError};
use super::value::{raise, Number, Value};

/// Invoke `recv.name(args, kwargs)`.
pub fn call_method(
    interp: &mut Interp,
    recv: Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> EvalResult<Value> {
    match &recv {
        Value::Str(_) => str_method(interp, &recv, name, args),
        Value::List(_) => list_method(interp, &recv, name, args),
        Value::Dict(_) => dict_method(interp, &recv, name, args),
        Value::Set(_) => set_method(interp, &recv, name, args),
        Value::Tuple(items) => match name {
            "index" => {
                expect_args(name, &args, 1)?;
                items
                    .iter()
                    .position(|v| v.value_eq(&args[0]))
                    .map(|i| Value::Int(i as i64))
                    .ok_or_else(|| RuntimeError::new("ValueError", "tuple.index(x): x not in tuple"))
            }
            "count" => {
                expect_args(name, &args, 1)?;
                Ok(Value::Int(
                    items.iter().filter(|v| v.value_eq(&args[0])).count() as i64,
                ))
            }
            _ => no_method("tuple", name),
        },
        Value::Instance(instance) => {
            let method = instance.borrow().class.dict.borrow().get(name).cloned();
            match method {
                Some(Value::Function(function)) => {
                    let mut all_args = vec![recv.clone()];
                    all_args.extend(args);
                    interp.call_value(Value::Function(function), all_args, kwargs)
                }
                Some(other) => interp.call_value(other, args, kwargs),
                None => raise(
                    "AttributeError",
                    format!(
                        "'{}' object has no attribute '{name}'",
                        instance.borrow().class.name
                    ),
                ),
            }
        }
        other => no_method(other.type_name(), name),
    }
}

fn no_method<T>(type_name: &str, method: &str) -> EvalResult<T> {
    raise(
        "AttributeError",
        format!("'{type_name}' object has no attribute '{method}'"),
    )
}

fn expect_args(name: &str, args: &[Value], n: usize) -> EvalResult<()> {
    if args.len() != n {
        return raise(
            "TypeError",
            format!("{name}() takes {n} argument(s) but {} were given", args.len()),
        );
    }
    Ok(())
}

fn str_method(interp: &mut Interp, recv: &Value, name: &str, args: Vec<Value>) -> EvalResult<Value> {
    let Value::Str(s) = recv else { unreachable!() };
    match name {
        "upper" => Ok(Value::str(s.to_uppercase())),
        "lower" => Ok(Value::str(s.to_lowercase())),
        "strip" => Ok(Value::str(s.trim().to_string())),
        "lstrip" => Ok(Value::str(s.trim_start().to_string())),
        "rstrip" => Ok(Value::str(s.trim_end().to_string())),
        "capitalize" => {
            let mut chars = s.chars();
            Ok(Value::str(match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }))
        }
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None => s.split_whitespace().map(Value::str).collect(),
                Some(Value::Str(sep)) => s.split(sep.as_str()).map(Value::str).collect(),
                Some(other) => {
                    return raise(
                        "TypeError",
                        format!("must be str, not {}", other.type_name()),
                    )
                }
            };
            Ok(Value::list(parts))
        }
        "join" => {
            expect_args("join", &args, 1)?;
            let items = interp.iter_values(&args[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Str(part) => parts.push(part.as_ref().clone()),
                    other => {
                        return raise(
                            "TypeError",
                            format!(
                                "sequence item: expected str instance, {} found",
                                other.type_name()
                            ),
                        )
                    }
                }
            }
            Ok(Value::str(parts.join(s.as_str())))
        }
        "replace" => {
            expect_args("replace", &args, 2)?;
            match (&args[0], &args[1]) {
                (Value::Str(from), Value::Str(to)) => {
                    Ok(Value::str(s.replace(from.as_str(), to.as_str())))
                }
                _ => raise("TypeError", "replace() arguments must be str"),
            }
        }
        "startswith" => {
            expect_args("startswith", &args, 1)?;
            match &args[0] {
                Value::Str(prefix) => Ok(Value::Bool(s.starts_with(prefix.as_str()))),
                _ => raise("TypeError", "startswith() argument must be str"),
            }
        }
        "endswith" => {
            expect_args("endswith", &args, 1)?;
            match &args[0] {
                Value::Str(suffix) => Ok(Value::Bool(s.ends_with(suffix.as_str()))),
                _ => raise("TypeError", "endswith() argument must be str"),
            }
        }
        "find" => {
            expect_args("find", &args, 1)?;
            match &args[0] {
                Value::Str(needle) => Ok(Value::Int(
                    s.find(needle.as_str())
                        .map(|byte_idx| s[..byte_idx].chars().count() as i64)
                        .unwrap_or(-1),
                )),
                _ => raise("TypeError", "find() argument must be str"),
            }
        }
        "count" => {
            expect_args("count", &args, 1)?;
            match &args[0] {
                Value::Str(needle) if !needle.is_empty() => {
                    Ok(Value::Int(s.matches(needle.as_str()).count() as i64))
                }
                Value::Str(_) => Ok(Value::Int(s.chars().count() as i64 + 1)),
                _ => raise("TypeError", "count() argument must be str"),
            }
        }
        "isdigit" => Ok(Value::Bool(
            !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
        )),
        _ => no_method("str", name),
    }
}

fn list_method(
    interp: &mut Interp,
    recv: &Value,
    name: &str,
    args: Vec<Value>,
) -> EvalResult<Value> {
    let Value::List(items) = recv else { unreachable!() };
    match name {
        "append" => {
            expect_args("append", &args, 1)?;
            items.borrow_mut().push(args[0].clone());
            Ok(Value::None)
        }
        "extend" => {
            expect_args("extend", &args, 1)?;
            let extra = interp.iter_values(&args[0])?;
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            expect_args("insert", &args, 2)?;
            let Some(Number::Int(idx)) = args[0].as_number() else {
                return raise("TypeError", "insert() index must be an int");
            };
            let mut borrowed = items.borrow_mut();
            let len = borrowed.len() as i64;
            let pos = if idx < 0 { (idx + len).max(0) } else { idx.min(len) };
            borrowed.insert(pos as usize, args[1].clone());
            Ok(Value::None)
        }
        "pop" => {
            let mut borrowed = items.borrow_mut();
            if borrowed.is_empty() {
                return raise("IndexError", "pop from empty list");
            }
            let idx = match args.first() {
                None => borrowed.len() - 1,
                Some(value) => {
                    super::eval::normalize_index(value, borrowed.len())?
                }
            };
            Ok(borrowed.remove(idx))
        }
        "remove" => {
            expect_args("remove", &args, 1)?;
            let mut borrowed = items.borrow_mut();
            match borrowed.iter().position(|v| v.value_eq(&args[0])) {
                Some(pos) => {
                    borrowed.remove(pos);
                    Ok(Value::None)
                }
                None => raise("ValueError", "list.remove(x): x not in list"),
            }
        }
        "index" => {
            expect_args("index", &args, 1)?;
            items
                .borrow()
                .iter()
                .position(|v| v.value_eq(&args[0]))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| RuntimeError::new("ValueError", "list.index(x): x not in list"))
        }
        "count" => {
            expect_args("count", &args, 1)?;
            Ok(Value::Int(
                items.borrow().iter().filter(|v| v.value_eq(&args[0])).count() as i64,
            ))
        }
        "sort" => {
            let mut borrowed = items.borrow_mut();
            let mut failed = false;
            borrowed.sort_by(|a, b| match a.value_cmp(b) {
                Some(ordering) => ordering,
                None => {
                    failed = true;
                    std::cmp::Ordering::Equal
                }
            });
            if failed {
                return raise("TypeError", "'<' not supported between these elements");
            }
            Ok(Value::None)
        }
        "reverse" => {
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "clear" => {
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => Ok(Value::list(items.borrow().clone())),
        _ => no_method("list", name),
    }
}

fn dict_method(
    _interp: &mut Interp,
    recv: &Value,
    name: &str,
    args: Vec<Value>,
) -> EvalResult<Value> {
    let Value::Dict(entries) = recv else { unreachable!() };
    match name {
        "get" => {
            if args.is_empty() || args.len() > 2 {
                return raise("TypeError", "get() takes 1 or 2 arguments");
            }
            Ok(entries
                .borrow()
                .iter()
                .find(|(k, _)| k.value_eq(&args[0]))
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => Ok(Value::list(
            entries.borrow().iter().map(|(k, _)| k.clone()).collect(),
        )),
        "values" => Ok(Value::list(
            entries.borrow().iter().map(|(_, v)| v.clone()).collect(),
        )),
        "items" => Ok(Value::list(
            entries
                .borrow()
                .iter()
                .map(|(k, v)| Value::Tuple(Rc::new(vec![k.clone(), v.clone()])))
                .collect(),
        )),
        "pop" => {
            if args.is_empty() || args.len() > 2 {
                return raise("TypeError", "pop() takes 1 or 2 arguments");
            }
            let mut borrowed = entries.borrow_mut();
            match borrowed.iter().position(|(k, _)| k.value_eq(&args[0])) {
                Some(pos) => Ok(borrowed.remove(pos).1),
                None => match args.get(1) {
                    Some(default) => Ok(default.clone()),
                    None => raise("KeyError", args[0].repr()),
                },
            }
        }
        "setdefault" => {
            if args.is_empty() || args.len() > 2 {
                return raise("TypeError", "setdefault() takes 1 or 2 arguments");
            }
            let mut borrowed = entries.borrow_mut();
            if let Some((_, v)) = borrowed.iter().find(|(k, _)| k.value_eq(&args[0])) {
                return Ok(v.clone());
            }
            let default = args.get(1).cloned().unwrap_or(Value::None);
            borrowed.push((args[0].clone(), default.clone()));
            Ok(default)
        }
        "update" => {
            expect_args("update", &args, 1)?;
            let Value::Dict(other) = &args[0] else {
                return raise("TypeError", "update() argument must be a dict");
            };
            let additions = other.borrow().clone();
            let mut borrowed = entries.borrow_mut();
            for (key, value) in additions {
                if let Some(slot) = borrowed.iter_mut().find(|(k, _)| k.value_eq(&key)) {
                    slot.1 = value;
                } else {
                    borrowed.push((key, value));
                }
            }
            Ok(Value::None)
        }
        "clear" => {
            entries.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => Ok(Value::dict(entries.borrow().clone())),
        _ => no_method("dict", name),
    }
}

fn set_method(interp: &mut Interp, recv: &Value, name: &str, args: Vec<Value>) -> EvalResult<Value> {
    let Value::Set(items) = recv else { unreachable!() };
    match name {
        "add" => {
            expect_args("add", &args, 1)?;
            let mut borrowed = items.borrow_mut();
            if !borrowed.iter().any(|v| v.value_eq(&args[0])) {
                borrowed.push(args[0].clone());
            }
            Ok(Value::None)
        }
        "remove" => {
            expect_args("remove", &args, 1)?;
            let mut borrowed = items.borrow_mut();
            match borrowed.iter().position(|v| v.value_eq(&args[0])) {
                Some(pos) => {
                    borrowed.remove(pos);
                    Ok(Value::None)
                }
                None => raise("KeyError", args[0].repr()),
            }
        }
        "discard" => {
            expect_args("discard", &args, 1)?;
            let mut borrowed = items.borrow_mut();
            if let Some(pos) = borrowed.iter().position(|v| v.value_eq(&args[0])) {
                borrowed.remove(pos);
            }
            Ok(Value::None)
        }
        "union" => {
            expect_args("union", &args, 1)?;
            let mut out = items.borrow().clone();
            for item in interp.iter_values(&args[0])? {
                if !out.iter().any(|v| v.value_eq(&item)) {
                    out.push(item);
                }
            }
            Ok(Value::set(out))
        }
        "intersection" => {
            expect_args("intersection", &args, 1)?;
            let other = interp.iter_values(&args[0])?;
            let out: Vec<Value> = items
                .borrow()
                .iter()
                .filter(|v| other.iter().any(|o| o.value_eq(v)))
                .cloned()
                .collect();
            Ok(Value::set(out))
        }
        "difference" => {
            expect_args("difference", &args, 1)?;
            let other = interp.iter_values(&args[0])?;
            let out: Vec<Value> = items
                .borrow()
                .iter()
                .filter(|v| !other.iter().any(|o| o.value_eq(v)))
                .cloned()
                .collect();
            Ok(Value::set(out))
        }
        "copy" => Ok(Value::set(items.borrow().clone())),
        _ => no_method("set", name),
    }
}
