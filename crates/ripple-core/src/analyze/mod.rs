//! Dependency analysis: extract the variables a cell reads and writes.
//!
//! Pure and infallible by contract: source that does not parse yields empty
//! sets, so registration never fails on bad syntax — execution reports it.

mod python;
mod sql;

use std::collections::BTreeSet;

use crate::notebook::CellType;

pub use python::analyze_python;
pub use sql::{analyze_sql, substitute_placeholders};

/// Reads and writes extracted from one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarSets {
    pub reads: BTreeSet<String>,
    pub writes: BTreeSet<String>,
}

/// Analyze a cell's source according to its type.
pub fn analyze_cell(code: &str, cell_type: CellType) -> VarSets {
    match cell_type {
        CellType::Python => analyze_python(code),
        CellType::Sql => analyze_sql(code),
    }
}
