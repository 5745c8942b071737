//! Output adaptation: last-expression values become MIME bundles.

use ripple_core::notebook::Output;

use crate::interp::value::{value_to_json, Value};

/// Convert the final expression value of a cell into outputs.
///
/// `None` (both the value and a cell with no trailing expression) produces
/// nothing. Table-shaped data becomes a dataframe bundle, other
/// JSON-representable containers become `application/json`, and everything
/// else falls back to its repr as plain text.
pub fn value_to_outputs(value: Option<Value>) -> Vec<Output> {
    let Some(value) = value else {
        return Vec::new();
    };
    if matches!(value, Value::None) {
        return Vec::new();
    }

    if let Some(output) = as_dataframe(&value) {
        return vec![output];
    }

    match &value {
        Value::List(_) | Value::Tuple(_) | Value::Dict(_) | Value::Set(_) => {
            match value_to_json(&value) {
                Some(json) => vec![Output::json(json)],
                None => vec![Output::text(value.repr())],
            }
        }
        _ => vec![Output::text(value.repr())],
    }
}

/// Table shape: a non-empty list of dicts sharing one string key set.
fn as_dataframe(value: &Value) -> Option<Output> {
    let Value::List(items) = value else {
        return None;
    };
    let items = items.borrow();
    if items.is_empty() {
        return None;
    }

    let mut columns: Vec<String> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let Value::Dict(entries) = item else {
            return None;
        };
        let keys: Vec<String> = entries
            .borrow()
            .iter()
            .map(|(k, _)| match k {
                Value::Str(s) => Some(s.as_ref().clone()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        if i == 0 {
            columns = keys;
        } else if keys != columns {
            return None;
        }
    }

    let mut rows = Vec::with_capacity(items.len());
    for item in items.iter() {
        let Value::Dict(entries) = item else {
            return None;
        };
        let entries = entries.borrow();
        let mut row = Vec::with_capacity(columns.len());
        for column in &columns {
            let cell = entries
                .iter()
                .find(|(k, _)| matches!(k, Value::Str(s) if s.as_str() == column))
                .map(|(_, v)| v);
            row.push(cell.and_then(value_to_json).unwrap_or(serde_json::Value::Null));
        }
        rows.push(row);
    }

    Some(Output::dataframe(columns, rows))
}
