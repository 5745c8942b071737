//! Name resolution: call frames over the shared globals mapping.

use rustc_hash::FxHashSet;

use ripple_core::lang::ast::Stmt;

use super::value::{ScopeRef, Value};

/// One function (or class body / comprehension) activation.
pub struct Frame {
    pub locals: ScopeRef,
    /// Enclosing function scopes captured at definition, innermost last.
    pub captured: Vec<ScopeRef>,
    /// Names declared `global` in this body: loads and stores bypass locals.
    pub globals_decl: FxHashSet<String>,
}

impl Frame {
    pub fn new(locals: ScopeRef, captured: Vec<ScopeRef>, globals_decl: FxHashSet<String>) -> Self {
        Self {
            locals,
            captured,
            globals_decl,
        }
    }

    /// Look a name up in this frame: locals, then captured scopes.
    pub fn get(&self, name: &str) -> Option<Value> {
        if self.globals_decl.contains(name) {
            return None;
        }
        if let Some(value) = self.locals.borrow().get(name) {
            return Some(value.clone());
        }
        for scope in self.captured.iter().rev() {
            if let Some(value) = scope.borrow().get(name) {
                return Some(value.clone());
            }
        }
        None
    }
}

/// Collect `global` declarations in a body, without descending into nested
/// function or class scopes.
pub fn collect_global_decls(stmts: &[Stmt], out: &mut FxHashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Global(names) => out.extend(names.iter().cloned()),
            Stmt::If { branches, orelse } => {
                for (_, suite) in branches {
                    collect_global_decls(suite, out);
                }
                collect_global_decls(orelse, out);
            }
            Stmt::While { body, .. } | Stmt::For { body, .. } | Stmt::With { body, .. } => {
                collect_global_decls(body, out);
            }
            Stmt::Try {
                body,
                handlers,
                finally,
            } => {
                collect_global_decls(body, out);
                for handler in handlers {
                    collect_global_decls(&handler.body, out);
                }
                collect_global_decls(finally, out);
            }
            _ => {}
        }
    }
}
