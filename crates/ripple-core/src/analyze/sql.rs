//! Reads extraction and placeholder substitution for sql-type cells.
//!
//! A sql cell reads every `{name}` placeholder appearing outside SQL string
//! literals; it never writes. Substitution is textual — escaping is the
//! author's responsibility.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use super::VarSets;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"))
}

/// Blank out single-quoted SQL string literals (with `''` escaping) so
/// placeholders inside them are not matched.
fn mask_string_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if in_string {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    out.push_str("  ");
                } else {
                    in_string = false;
                    out.push('\'');
                }
            } else {
                out.push(' ');
            }
        } else if c == '\'' {
            in_string = true;
            out.push('\'');
        } else {
            out.push(c);
        }
    }
    out
}

/// Extract `(reads, writes)` from sql-type cell source. Writes are empty.
pub fn analyze_sql(sql: &str) -> VarSets {
    let masked = mask_string_literals(sql);
    let reads: BTreeSet<String> = placeholder_re()
        .captures_iter(&masked)
        .map(|c| c[1].to_string())
        .collect();
    VarSets {
        reads,
        writes: BTreeSet::new(),
    }
}

/// Substitute `{name}` placeholders outside string literals using `lookup`.
///
/// Returns the first unresolvable placeholder name as the error.
pub fn substitute_placeholders(
    sql: &str,
    mut lookup: impl FnMut(&str) -> Option<String>,
) -> Result<String, String> {
    let masked = mask_string_literals(sql);
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for m in placeholder_re().captures_iter(&masked) {
        let whole = m.get(0).expect("capture 0");
        let name = &m[1];
        out.push_str(&sql[last..whole.start()]);
        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => return Err(name.to_string()),
        }
        last = whole.end();
    }
    out.push_str(&sql[last..]);
    Ok(out)
}
