//! Reads/writes extraction for python-type cells.
//!
//! Walks the AST with a stack of lexical scopes. A load is a read when no
//! enclosing local scope (function, lambda, class body, comprehension) binds
//! the name; a binding is a write only at module scope, or when the name is
//! declared `global` and assigned inside a function body.

use rustc_hash::FxHashSet;

use crate::lang::ast::{Comprehension, Expr, Param, Stmt, Target};
use crate::lang::parse_module;

use super::VarSets;

/// Extract `(reads, writes)` from python-type cell source.
///
/// Unparseable source yields empty sets.
pub fn analyze_python(code: &str) -> VarSets {
    let module = match parse_module(code) {
        Ok(m) => m,
        Err(_) => return VarSets::default(),
    };

    let mut analyzer = Analyzer::default();
    for stmt in &module.body {
        analyzer.walk_stmt(stmt);
    }
    analyzer.vars
}

#[derive(Default)]
struct Analyzer {
    vars: VarSets,
    /// Local (non-module) scopes, innermost last.
    scopes: Vec<FxHashSet<String>>,
}

impl Analyzer {
    fn at_module(&self) -> bool {
        self.scopes.is_empty()
    }

    fn bound_locally(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn load(&mut self, name: &str) {
        if !self.bound_locally(name) {
            self.vars.reads.insert(name.to_string());
        }
    }

    fn bind(&mut self, name: &str) {
        if self.at_module() {
            self.vars.writes.insert(name.to_string());
        } else if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn bind_target(&mut self, target: &Target) {
        match target {
            Target::Name(name) => self.bind(name),
            // Attribute/subscript targets read their base, never write it.
            Target::Attribute(base, _) => self.walk_expr(base),
            Target::Subscript(base, index) => {
                self.walk_expr(base);
                self.walk_expr(index);
            }
            Target::Tuple(items) => {
                for item in items {
                    self.bind_target(item);
                }
            }
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) => self.walk_expr(e),
            Stmt::Assign { targets, value } => {
                self.walk_expr(value);
                for target in targets {
                    self.bind_target(target);
                }
            }
            Stmt::AugAssign { target, value, .. } => {
                self.walk_expr(value);
                // `x += 1` both loads and stores x.
                if let Target::Name(name) = target {
                    self.load(name);
                }
                self.bind_target(target);
            }
            Stmt::Def { name, params, body } => {
                for param in params {
                    if let Some(default) = &param.default {
                        self.walk_expr(default);
                    }
                }
                self.bind(name);
                self.walk_function(params, body);
            }
            Stmt::Class { name, bases, body } => {
                for base in bases {
                    self.walk_expr(base);
                }
                self.bind(name);
                self.walk_function(&[], body);
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.walk_expr(value);
                }
            }
            Stmt::If { branches, orelse } => {
                for (cond, suite) in branches {
                    self.walk_expr(cond);
                    for stmt in suite {
                        self.walk_stmt(stmt);
                    }
                }
                for stmt in orelse {
                    self.walk_stmt(stmt);
                }
            }
            Stmt::While { cond, body } => {
                self.walk_expr(cond);
                for stmt in body {
                    self.walk_stmt(stmt);
                }
            }
            Stmt::For { target, iter, body } => {
                self.walk_expr(iter);
                self.bind_target(target);
                for stmt in body {
                    self.walk_stmt(stmt);
                }
            }
            Stmt::With {
                context,
                target,
                body,
            } => {
                self.walk_expr(context);
                if let Some(target) = target {
                    self.bind_target(target);
                }
                for stmt in body {
                    self.walk_stmt(stmt);
                }
            }
            Stmt::Try {
                body,
                handlers,
                finally,
            } => {
                for stmt in body {
                    self.walk_stmt(stmt);
                }
                for handler in handlers {
                    if let Some(kind) = &handler.kind {
                        self.load(kind);
                    }
                    if let Some(name) = &handler.name {
                        self.bind(name);
                    }
                    for stmt in &handler.body {
                        self.walk_stmt(stmt);
                    }
                }
                for stmt in finally {
                    self.walk_stmt(stmt);
                }
            }
            Stmt::Raise(value) => {
                if let Some(value) = value {
                    self.walk_expr(value);
                }
            }
            Stmt::Import { modules } => {
                for (module, alias) in modules {
                    let bound = alias
                        .clone()
                        .unwrap_or_else(|| module.split('.').next().unwrap_or(module).to_string());
                    self.bind(&bound);
                }
            }
            Stmt::FromImport { names, .. } => {
                for (name, alias) in names {
                    self.bind(alias.as_ref().unwrap_or(name));
                }
            }
            // `global` at module scope is a no-op; inside functions it is
            // handled by the function pre-pass.
            Stmt::Global(_) | Stmt::Nonlocal(_) => {}
            Stmt::Pass | Stmt::Break | Stmt::Continue => {}
        }
    }

    /// Walk a function, lambda or class body in a fresh local scope.
    ///
    /// Names assigned anywhere in the body are local throughout it, so local
    /// bindings are collected up front. Names declared `global` and assigned
    /// in the body become module writes instead.
    fn walk_function(&mut self, params: &[Param], body: &[Stmt]) {
        let mut bound = FxHashSet::default();
        let mut globals = FxHashSet::default();
        collect_bound(body, &mut bound, &mut globals);

        for name in globals.iter() {
            if bound.contains(name) {
                self.vars.writes.insert(name.clone());
            }
        }

        let mut scope: FxHashSet<String> =
            params.iter().map(|p| p.name.clone()).collect();
        scope.extend(bound.difference(&globals).cloned());

        self.scopes.push(scope);
        for stmt in body {
            self.walk_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn walk_comprehension(&mut self, generators: &[Comprehension], exprs: &[&Expr]) {
        let mut scope = FxHashSet::default();
        for generator in generators {
            collect_target_names(&generator.target, &mut scope);
        }
        self.scopes.push(scope);
        for generator in generators {
            self.walk_expr(&generator.iter);
            for cond in &generator.ifs {
                self.walk_expr(cond);
            }
        }
        for expr in exprs {
            self.walk_expr(expr);
        }
        self.scopes.pop();
    }

    fn walk_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::None | Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) => {}
            Expr::Name(name) => self.load(name),
            Expr::Unary { operand, .. } => self.walk_expr(operand),
            Expr::Binary { left, right, .. } => {
                self.walk_expr(left);
                self.walk_expr(right);
            }
            Expr::Compare { left, rest } => {
                self.walk_expr(left);
                for (_, right) in rest {
                    self.walk_expr(right);
                }
            }
            Expr::BoolAnd(values) | Expr::BoolOr(values) => {
                for value in values {
                    self.walk_expr(value);
                }
            }
            Expr::Ternary { cond, body, orelse } => {
                self.walk_expr(cond);
                self.walk_expr(body);
                self.walk_expr(orelse);
            }
            Expr::Call { func, args, kwargs } => {
                self.walk_expr(func);
                for arg in args {
                    self.walk_expr(arg);
                }
                for (_, value) in kwargs {
                    self.walk_expr(value);
                }
            }
            Expr::Attribute { value, .. } => self.walk_expr(value),
            Expr::Subscript { value, index } => {
                self.walk_expr(value);
                self.walk_expr(index);
            }
            Expr::Slice {
                value,
                lower,
                upper,
            } => {
                self.walk_expr(value);
                if let Some(lower) = lower {
                    self.walk_expr(lower);
                }
                if let Some(upper) = upper {
                    self.walk_expr(upper);
                }
            }
            Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => {
                for item in items {
                    self.walk_expr(item);
                }
            }
            Expr::Dict(pairs) => {
                for (key, value) in pairs {
                    self.walk_expr(key);
                    self.walk_expr(value);
                }
            }
            Expr::ListComp { elt, generators } | Expr::SetComp { elt, generators } => {
                self.walk_comprehension(generators, &[elt.as_ref()]);
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                self.walk_comprehension(generators, &[key.as_ref(), value.as_ref()]);
            }
            Expr::Lambda { params, body } => {
                for param in params {
                    if let Some(default) = &param.default {
                        self.walk_expr(default);
                    }
                }
                self.walk_function_expr(params, body);
            }
        }
    }

    fn walk_function_expr(&mut self, params: &[Param], body: &Expr) {
        let scope: FxHashSet<String> = params.iter().map(|p| p.name.clone()).collect();
        self.scopes.push(scope);
        self.walk_expr(body);
        self.scopes.pop();
    }
}

/// Collect names bound by a statement list, without descending into nested
/// function/class/lambda scopes. `global` declarations are collected apart.
fn collect_bound(stmts: &[Stmt], bound: &mut FxHashSet<String>, globals: &mut FxHashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { targets, .. } => {
                for target in targets {
                    collect_target_names(target, bound);
                }
            }
            Stmt::AugAssign { target, .. } => collect_target_names(target, bound),
            Stmt::Def { name, .. } | Stmt::Class { name, .. } => {
                bound.insert(name.clone());
            }
            Stmt::If { branches, orelse } => {
                for (_, suite) in branches {
                    collect_bound(suite, bound, globals);
                }
                collect_bound(orelse, bound, globals);
            }
            Stmt::While { body, .. } => collect_bound(body, bound, globals),
            Stmt::For { target, body, .. } => {
                collect_target_names(target, bound);
                collect_bound(body, bound, globals);
            }
            Stmt::With { target, body, .. } => {
                if let Some(target) = target {
                    collect_target_names(target, bound);
                }
                collect_bound(body, bound, globals);
            }
            Stmt::Try {
                body,
                handlers,
                finally,
            } => {
                collect_bound(body, bound, globals);
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        bound.insert(name.clone());
                    }
                    collect_bound(&handler.body, bound, globals);
                }
                collect_bound(finally, bound, globals);
            }
            Stmt::Import { modules } => {
                for (module, alias) in modules {
                    bound.insert(
                        alias
                            .clone()
                            .unwrap_or_else(|| {
                                module.split('.').next().unwrap_or(module).to_string()
                            }),
                    );
                }
            }
            Stmt::FromImport { names, .. } => {
                for (name, alias) in names {
                    bound.insert(alias.clone().unwrap_or_else(|| name.clone()));
                }
            }
            Stmt::Global(names) => globals.extend(names.iter().cloned()),
            Stmt::Nonlocal(names) => bound.extend(names.iter().cloned()),
            Stmt::Expr(_)
            | Stmt::Return(_)
            | Stmt::Raise(_)
            | Stmt::Pass
            | Stmt::Break
            | Stmt::Continue => {}
        }
    }
}

fn collect_target_names(target: &Target, names: &mut FxHashSet<String>) {
    match target {
        Target::Name(name) => {
            names.insert(name.clone());
        }
        Target::Tuple(items) => {
            for item in items {
                collect_target_names(item, names);
            }
        }
        Target::Attribute(..) | Target::Subscript(..) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reads(code: &str) -> Vec<String> {
        analyze_python(code).reads.into_iter().collect()
    }

    fn writes(code: &str) -> Vec<String> {
        analyze_python(code).writes.into_iter().collect()
    }

    #[test]
    fn test_simple_write() {
        assert_eq!(writes("x = 10"), vec!["x"]);
        assert!(reads("x = 10").is_empty());
    }

    #[test]
    fn test_read_and_write() {
        let vars = analyze_python("y = x + 5");
        assert_eq!(vars.reads.iter().collect::<Vec<_>>(), vec!["x"]);
        assert_eq!(vars.writes.iter().collect::<Vec<_>>(), vec!["y"]);
    }

    #[test]
    fn test_self_reference() {
        let vars = analyze_python("x = x + 1");
        assert!(vars.reads.contains("x"));
        assert!(vars.writes.contains("x"));
    }

    #[test]
    fn test_unparseable_yields_empty() {
        let vars = analyze_python("def broken(:");
        assert!(vars.reads.is_empty());
        assert!(vars.writes.is_empty());
    }

    #[test]
    fn test_function_locals_do_not_escape() {
        let vars = analyze_python("def f(a):\n    b = a + 1\n    return b");
        assert_eq!(vars.writes.iter().collect::<Vec<_>>(), vec!["f"]);
        assert!(vars.reads.is_empty());
    }

    #[test]
    fn test_function_reads_free_variables() {
        let vars = analyze_python("def f():\n    return base + 1");
        assert!(vars.reads.contains("base"));
        assert_eq!(vars.writes.iter().collect::<Vec<_>>(), vec!["f"]);
    }

    #[test]
    fn test_params_shadow_outer_names() {
        let vars = analyze_python("def f(base):\n    return base + 1");
        assert!(!vars.reads.contains("base"));
    }

    #[test]
    fn test_local_assignment_shadows_before_use() {
        // `total` is local throughout the function body.
        let vars = analyze_python("def f():\n    total = 0\n    return total");
        assert!(!vars.reads.contains("total"));
    }

    #[test]
    fn test_global_write() {
        let vars = analyze_python("def bump():\n    global counter\n    counter = 1");
        assert!(vars.writes.contains("counter"));
        assert!(vars.writes.contains("bump"));
    }

    #[test]
    fn test_global_without_assignment_is_not_write() {
        let vars = analyze_python("def peek():\n    global counter\n    return counter");
        assert!(!vars.writes.contains("counter"));
        assert!(vars.reads.contains("counter"));
    }

    #[test]
    fn test_comprehension_target_scoped() {
        let vars = analyze_python("squares = [i * i for i in values]");
        assert!(!vars.reads.contains("i"));
        assert!(vars.reads.contains("values"));
        assert_eq!(vars.writes.iter().collect::<Vec<_>>(), vec!["squares"]);
    }

    #[test]
    fn test_dict_comprehension_scoping() {
        let vars = analyze_python("m = {k: v * scale for k, v in pairs}");
        assert!(!vars.reads.contains("k"));
        assert!(!vars.reads.contains("v"));
        assert!(vars.reads.contains("pairs"));
        assert!(vars.reads.contains("scale"));
    }

    #[test]
    fn test_for_target_is_module_write() {
        let vars = analyze_python("for row in rows:\n    print(row)");
        assert!(vars.writes.contains("row"));
        assert!(vars.reads.contains("rows"));
    }

    #[test]
    fn test_with_target_is_write() {
        let vars = analyze_python("with conn as tx:\n    pass");
        assert!(vars.writes.contains("tx"));
        assert!(vars.reads.contains("conn"));
    }

    #[test]
    fn test_except_binding_is_write() {
        let vars = analyze_python("try:\n    pass\nexcept ValueError as e:\n    print(e)");
        assert!(vars.writes.contains("e"));
    }

    #[test]
    fn test_import_aliases() {
        let vars = analyze_python("import math\nimport json as j\nfrom math import sqrt as root");
        assert!(vars.writes.contains("math"));
        assert!(vars.writes.contains("j"));
        assert!(vars.writes.contains("root"));
        assert!(!vars.writes.contains("json"));
        assert!(!vars.writes.contains("sqrt"));
    }

    #[test]
    fn test_attribute_target_reads_base() {
        let vars = analyze_python("obj.field = 1");
        assert!(vars.reads.contains("obj"));
        assert!(!vars.writes.contains("obj"));
    }

    #[test]
    fn test_subscript_target_reads_base() {
        let vars = analyze_python("table[key] = value");
        assert!(vars.reads.contains("table"));
        assert!(vars.reads.contains("key"));
        assert!(vars.reads.contains("value"));
        assert!(!vars.writes.contains("table"));
    }

    #[test]
    fn test_aug_assign_reads_and_writes() {
        let vars = analyze_python("total += delta");
        assert!(vars.reads.contains("total"));
        assert!(vars.reads.contains("delta"));
        assert!(vars.writes.contains("total"));
    }

    #[test]
    fn test_tuple_unpacking_writes() {
        let vars = analyze_python("a, b = pair");
        assert!(vars.writes.contains("a"));
        assert!(vars.writes.contains("b"));
        assert!(vars.reads.contains("pair"));
    }

    #[test]
    fn test_lambda_params_scoped() {
        let vars = analyze_python("double = lambda n: n * factor");
        assert!(!vars.reads.contains("n"));
        assert!(vars.reads.contains("factor"));
        assert!(vars.writes.contains("double"));
    }

    #[test]
    fn test_class_definition() {
        let vars = analyze_python("class Point:\n    scale = default_scale");
        assert!(vars.writes.contains("Point"));
        assert!(!vars.writes.contains("scale"));
        assert!(vars.reads.contains("default_scale"));
    }

    #[test]
    fn test_nested_function_scoping() {
        let vars =
            analyze_python("def outer():\n    x = 1\n    def inner():\n        return x + y\n    return inner");
        // x is bound in outer's scope, visible to inner; y is free.
        assert!(!vars.reads.contains("x"));
        assert!(vars.reads.contains("y"));
    }

    #[test]
    fn test_builtin_loads_count_as_reads() {
        // Edges only form against actual writers, so builtin loads are kept.
        let vars = analyze_python("print(x)");
        assert!(vars.reads.contains("print"));
        assert!(vars.reads.contains("x"));
    }
}
