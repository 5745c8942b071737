//! Statement and expression evaluation.

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use ripple_core::lang::ast::{
    CmpOp, Comprehension, Expr, Module, Op, Param, Stmt, Target, UnaryOp,
};
use ripple_core::lang::parse_module;

use super::builtins;
use super::env::{collect_global_decls, Frame};
use super::methods;
use super::value::{
    new_scope, raise, ClassObj, ExceptionVal, Function, FunctionBody, Instance, Number, ScopeRef,
    Value,
};

/// Maximum user-code call depth.
const MAX_CALL_DEPTH: usize = 256;

/// A raised exception: Python-style kind plus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: String,
    pub message: String,
}

impl RuntimeError {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

pub type EvalResult<T> = Result<T, RuntimeError>;

/// Control flow out of a statement.
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// The interpreter: owns the notebook's shared globals.
pub struct Interp {
    pub globals: ScopeRef,
    pub builtins: FxHashMap<String, Value>,
    frames: Vec<Frame>,
    /// Captured stdout for the currently executing cell.
    pub stdout: String,
    depth: usize,
    current_exception: Option<RuntimeError>,
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl Interp {
    pub fn new() -> Self {
        Self {
            globals: new_scope(),
            builtins: builtins::install(),
            frames: Vec::new(),
            stdout: String::new(),
            depth: 0,
            current_exception: None,
        }
    }

    /// Execute one cell against the shared globals.
    ///
    /// Returns the captured stdout and, on success, the value of the last
    /// top-level expression statement (if the cell ends in one).
    pub fn run_cell(&mut self, code: &str) -> (String, Result<Option<Value>, RuntimeError>) {
        self.stdout.clear();
        self.frames.clear();
        self.current_exception = None;
        let module: Module = match parse_module(code) {
            Ok(module) => module,
            Err(e) => {
                return (
                    std::mem::take(&mut self.stdout),
                    Err(RuntimeError::new("SyntaxError", e.to_string())),
                );
            }
        };
        let result = self.exec_module(&module.body);
        (std::mem::take(&mut self.stdout), result)
    }

    fn exec_module(&mut self, body: &[Stmt]) -> Result<Option<Value>, RuntimeError> {
        let Some((last, rest)) = body.split_last() else {
            return Ok(None);
        };
        for stmt in rest {
            self.expect_normal(stmt)?;
        }
        if let Stmt::Expr(expr) = last {
            return Ok(Some(self.eval_expr(expr)?));
        }
        self.expect_normal(last)?;
        Ok(None)
    }

    fn expect_normal(&mut self, stmt: &Stmt) -> EvalResult<()> {
        match self.exec_stmt(stmt)? {
            Flow::Normal => Ok(()),
            Flow::Break => raise("SyntaxError", "'break' outside loop"),
            Flow::Continue => raise("SyntaxError", "'continue' outside loop"),
            Flow::Return(_) => raise("SyntaxError", "'return' outside function"),
        }
    }

    // ----- names --------------------------------------------------------

    pub(crate) fn lookup_name(&self, name: &str) -> EvalResult<Value> {
        if let Some(frame) = self.frames.last() {
            if let Some(value) = frame.get(name) {
                return Ok(value);
            }
        }
        if let Some(value) = self.globals.borrow().get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.builtins.get(name) {
            return Ok(value.clone());
        }
        raise("NameError", format!("name '{name}' is not defined"))
    }

    fn store_name(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last() {
            if !frame.globals_decl.contains(name) {
                frame.locals.borrow_mut().insert(name.to_string(), value);
                return;
            }
        }
        self.globals.borrow_mut().insert(name.to_string(), value);
    }

    // ----- statements ---------------------------------------------------

    pub(crate) fn exec_block(&mut self, stmts: &[Stmt]) -> EvalResult<Flow> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> EvalResult<Flow> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval_expr(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Assign { targets, value } => {
                let value = self.eval_expr(value)?;
                for target in targets {
                    self.assign_target(target, value.clone())?;
                }
                Ok(Flow::Normal)
            }
            Stmt::AugAssign { target, op, value } => {
                let rhs = self.eval_expr(value)?;
                let current = self.load_target(target)?;
                let combined = self.binary_op(*op, current, rhs)?;
                self.assign_target(target, combined)?;
                Ok(Flow::Normal)
            }
            Stmt::Def { name, params, body } => {
                let function = self.make_function(name, params, FunctionBody::Stmts(Rc::new(body.clone())))?;
                self.store_name(name, function);
                Ok(Flow::Normal)
            }
            Stmt::Class { name, bases, body } => {
                let class = self.make_class(name, bases, body)?;
                self.store_name(name, class);
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                if self.frames.is_empty() {
                    return raise("SyntaxError", "'return' outside function");
                }
                let value = match value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If { branches, orelse } => {
                for (cond, suite) in branches {
                    if self.eval_expr(cond)?.is_truthy() {
                        return self.exec_block(suite);
                    }
                }
                self.exec_block(orelse)
            }
            Stmt::While { cond, body } => {
                while self.eval_expr(cond)?.is_truthy() {
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For { target, iter, body } => {
                let items = {
                    let iterable = self.eval_expr(iter)?;
                    self.iter_values(&iterable)?
                };
                for item in items {
                    self.assign_target(target, item)?;
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::With {
                context,
                target,
                body,
            } => {
                let value = self.eval_expr(context)?;
                if let Some(target) = target {
                    self.assign_target(target, value)?;
                }
                self.exec_block(body)
            }
            Stmt::Try {
                body,
                handlers,
                finally,
            } => {
                let mut outcome = self.exec_block(body);
                let raised = match &outcome {
                    Err(err) => Some(err.clone()),
                    Ok(_) => None,
                };
                if let Some(err) = raised {
                    let mut handled = None;
                    for handler in handlers {
                        let matches = match &handler.kind {
                            None => true,
                            Some(kind) => kind == "Exception" || *kind == err.kind,
                        };
                        if !matches {
                            continue;
                        }
                        if let Some(name) = &handler.name {
                            let exc = Value::Exception(Rc::new(ExceptionVal {
                                kind: err.kind.clone(),
                                message: err.message.clone(),
                            }));
                            self.store_name(name, exc);
                        }
                        let prev = self.current_exception.replace(err.clone());
                        handled = Some(self.exec_block(&handler.body));
                        self.current_exception = prev;
                        break;
                    }
                    outcome = handled.unwrap_or(Err(err));
                }
                match self.exec_block(finally)? {
                    Flow::Normal => outcome,
                    override_flow => Ok(override_flow),
                }
            }
            Stmt::Raise(value) => match value {
                None => match self.current_exception.clone() {
                    Some(err) => Err(err),
                    None => raise("RuntimeError", "no active exception to re-raise"),
                },
                Some(expr) => {
                    let value = self.eval_expr(expr)?;
                    match value {
                        Value::Exception(e) => Err(RuntimeError::new(&e.kind, e.message.clone())),
                        Value::Str(s) => Err(RuntimeError::new("Exception", s.as_ref().clone())),
                        other => raise(
                            "TypeError",
                            format!("exceptions must be exceptions, not '{}'", other.type_name()),
                        ),
                    }
                }
            },
            Stmt::Import { modules } => {
                for (module, alias) in modules {
                    let value = builtins::import_module(module).ok_or_else(|| {
                        RuntimeError::new("ImportError", format!("no module named '{module}'"))
                    })?;
                    let bound = alias
                        .clone()
                        .unwrap_or_else(|| module.split('.').next().unwrap_or(module).to_string());
                    self.store_name(&bound, value);
                }
                Ok(Flow::Normal)
            }
            Stmt::FromImport { module, names } => {
                let value = builtins::import_module(module).ok_or_else(|| {
                    RuntimeError::new("ImportError", format!("no module named '{module}'"))
                })?;
                let Value::Module(module_obj) = &value else {
                    return raise("ImportError", format!("no module named '{module}'"));
                };
                for (name, alias) in names {
                    let item = module_obj.dict.get(name).cloned().ok_or_else(|| {
                        RuntimeError::new(
                            "ImportError",
                            format!("cannot import name '{name}' from '{module}'"),
                        )
                    })?;
                    self.store_name(alias.as_ref().unwrap_or(name), item);
                }
                Ok(Flow::Normal)
            }
            // Handled when the enclosing frame is created.
            Stmt::Global(_) => Ok(Flow::Normal),
            Stmt::Nonlocal(_) => raise("SyntaxError", "nonlocal is not supported"),
            Stmt::Pass => Ok(Flow::Normal),
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    // ----- assignment ---------------------------------------------------

    fn assign_target(&mut self, target: &Target, value: Value) -> EvalResult<()> {
        match target {
            Target::Name(name) => {
                self.store_name(name, value);
                Ok(())
            }
            Target::Attribute(base, attr) => {
                let base = self.eval_expr(base)?;
                match base {
                    Value::Instance(instance) => {
                        instance.borrow_mut().attrs.insert(attr.clone(), value);
                        Ok(())
                    }
                    Value::Class(class) => {
                        class.dict.borrow_mut().insert(attr.clone(), value);
                        Ok(())
                    }
                    other => raise(
                        "AttributeError",
                        format!("'{}' object attribute '{attr}' is read-only", other.type_name()),
                    ),
                }
            }
            Target::Subscript(base, index) => {
                let base = self.eval_expr(base)?;
                let index = self.eval_expr(index)?;
                match base {
                    Value::List(items) => {
                        let mut items = items.borrow_mut();
                        let idx = normalize_index(&index, items.len())?;
                        items[idx] = value;
                        Ok(())
                    }
                    Value::Dict(entries) => {
                        let mut entries = entries.borrow_mut();
                        if let Some(slot) =
                            entries.iter_mut().find(|(k, _)| k.value_eq(&index))
                        {
                            slot.1 = value;
                        } else {
                            entries.push((index, value));
                        }
                        Ok(())
                    }
                    other => raise(
                        "TypeError",
                        format!(
                            "'{}' object does not support item assignment",
                            other.type_name()
                        ),
                    ),
                }
            }
            Target::Tuple(targets) => {
                let items = self.iter_values(&value)?;
                if items.len() != targets.len() {
                    return raise(
                        "ValueError",
                        format!(
                            "cannot unpack {} values into {} targets",
                            items.len(),
                            targets.len()
                        ),
                    );
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign_target(target, item)?;
                }
                Ok(())
            }
        }
    }

    /// Current value of an augmented-assignment target.
    fn load_target(&mut self, target: &Target) -> EvalResult<Value> {
        match target {
            Target::Name(name) => self.lookup_name(name),
            Target::Attribute(base, attr) => {
                let base = self.eval_expr(base)?;
                self.get_attribute(base, attr)
            }
            Target::Subscript(base, index) => {
                let base = self.eval_expr(base)?;
                let index = self.eval_expr(index)?;
                self.get_item(&base, &index)
            }
            Target::Tuple(_) => raise("TypeError", "cannot use tuple as augmented target"),
        }
    }

    // ----- functions and classes ----------------------------------------

    fn make_function(
        &mut self,
        name: &str,
        params: &[Param],
        body: FunctionBody,
    ) -> EvalResult<Value> {
        let mut defaults = Vec::with_capacity(params.len());
        for param in params {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval_expr(expr)?),
                None => None,
            });
        }
        let captured = match self.frames.last() {
            Some(frame) => {
                let mut chain = frame.captured.clone();
                chain.push(frame.locals.clone());
                chain
            }
            None => Vec::new(),
        };
        Ok(Value::Function(Rc::new(Function {
            name: name.to_string(),
            params: params.to_vec(),
            defaults,
            body,
            captured,
        })))
    }

    fn make_class(&mut self, name: &str, bases: &[Expr], body: &[Stmt]) -> EvalResult<Value> {
        let mut dict = FxHashMap::default();
        for base in bases {
            let base = self.eval_expr(base)?;
            match base {
                Value::Class(class) => {
                    for (k, v) in class.dict.borrow().iter() {
                        dict.insert(k.clone(), v.clone());
                    }
                }
                other => {
                    return raise(
                        "TypeError",
                        format!("base must be a class, not '{}'", other.type_name()),
                    )
                }
            }
        }

        let locals = new_scope();
        locals.borrow_mut().extend(dict);
        let captured = match self.frames.last() {
            Some(frame) => {
                let mut chain = frame.captured.clone();
                chain.push(frame.locals.clone());
                chain
            }
            None => Vec::new(),
        };
        self.frames
            .push(Frame::new(locals.clone(), captured, FxHashSet::default()));
        let outcome = self.exec_block(body);
        self.frames.pop();
        outcome?;

        let dict = Rc::try_unwrap(locals)
            .map(|cell| cell.into_inner())
            .unwrap_or_else(|rc| rc.borrow().clone());
        Ok(Value::Class(Rc::new(ClassObj {
            name: name.to_string(),
            dict: std::cell::RefCell::new(dict),
        })))
    }

    /// Invoke any callable value.
    pub(crate) fn call_value(
        &mut self,
        func: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        match func {
            Value::Function(function) => self.call_function(&function, args, kwargs),
            Value::Builtin(builtin) => (builtin.f)(self, args, kwargs),
            Value::Class(class) => {
                let instance = Value::Instance(Rc::new(std::cell::RefCell::new(Instance {
                    class: class.clone(),
                    attrs: FxHashMap::default(),
                })));
                let init = class.dict.borrow().get("__init__").cloned();
                if let Some(Value::Function(init)) = init {
                    let mut init_args = vec![instance.clone()];
                    init_args.extend(args);
                    self.call_function(&init, init_args, kwargs)?;
                } else if !args.is_empty() || !kwargs.is_empty() {
                    return raise(
                        "TypeError",
                        format!("{}() takes no arguments", class.name),
                    );
                }
                Ok(instance)
            }
            Value::BoundMethod { recv, name } => methods::call_method(self, *recv, &name, args, kwargs),
            other => raise(
                "TypeError",
                format!("'{}' object is not callable", other.type_name()),
            ),
        }
    }

    fn call_function(
        &mut self,
        function: &Function,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return raise("RecursionError", "maximum recursion depth exceeded");
        }
        if args.len() > function.params.len() {
            return raise(
                "TypeError",
                format!(
                    "{}() takes {} positional arguments but {} were given",
                    function.name,
                    function.params.len(),
                    args.len()
                ),
            );
        }

        let locals = new_scope();
        {
            let mut locals = locals.borrow_mut();
            let mut args = args.into_iter();
            for (i, param) in function.params.iter().enumerate() {
                if let Some(value) = args.next() {
                    locals.insert(param.name.clone(), value);
                    continue;
                }
                if let Some(pos) = kwargs.iter().position(|(name, _)| *name == param.name) {
                    locals.insert(param.name.clone(), kwargs[pos].1.clone());
                    continue;
                }
                if let Some(default) = &function.defaults[i] {
                    locals.insert(param.name.clone(), default.clone());
                    continue;
                }
                return raise(
                    "TypeError",
                    format!(
                        "{}() missing required argument: '{}'",
                        function.name, param.name
                    ),
                );
            }
            for (name, _) in &kwargs {
                if !function.params.iter().any(|p| p.name == *name) {
                    return raise(
                        "TypeError",
                        format!(
                            "{}() got an unexpected keyword argument '{name}'",
                            function.name
                        ),
                    );
                }
            }
        }

        let globals_decl = match &function.body {
            FunctionBody::Stmts(stmts) => {
                let mut decls = FxHashSet::default();
                collect_global_decls(stmts, &mut decls);
                decls
            }
            FunctionBody::Expr(_) => FxHashSet::default(),
        };

        self.frames
            .push(Frame::new(locals, function.captured.clone(), globals_decl));
        self.depth += 1;
        let outcome = match &function.body {
            FunctionBody::Stmts(stmts) => self.exec_block(stmts).map(|flow| match flow {
                Flow::Return(value) => value,
                _ => Value::None,
            }),
            FunctionBody::Expr(expr) => self.eval_expr(expr),
        };
        self.depth -= 1;
        self.frames.pop();
        outcome
    }

    // ----- expressions --------------------------------------------------

    pub(crate) fn eval_expr(&mut self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::str(s.clone())),
            Expr::Name(name) => self.lookup_name(name),
            Expr::Unary { op, operand } => {
                let value = self.eval_expr(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => match value.as_number() {
                        Some(Number::Int(n)) => Ok(Value::Int(-n)),
                        Some(Number::Float(f)) => Ok(Value::Float(-f)),
                        None => raise(
                            "TypeError",
                            format!("bad operand type for unary -: '{}'", value.type_name()),
                        ),
                    },
                    UnaryOp::Pos => match value.as_number() {
                        Some(Number::Int(n)) => Ok(Value::Int(n)),
                        Some(Number::Float(f)) => Ok(Value::Float(f)),
                        None => raise(
                            "TypeError",
                            format!("bad operand type for unary +: '{}'", value.type_name()),
                        ),
                    },
                }
            }
            Expr::Binary { left, op, right } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                self.binary_op(*op, left, right)
            }
            Expr::Compare { left, rest } => {
                let mut current = self.eval_expr(left)?;
                for (op, next) in rest {
                    let next = self.eval_expr(next)?;
                    if !self.compare(*op, &current, &next)? {
                        return Ok(Value::Bool(false));
                    }
                    current = next;
                }
                Ok(Value::Bool(true))
            }
            Expr::BoolAnd(values) => {
                let mut last = Value::Bool(true);
                for value in values {
                    last = self.eval_expr(value)?;
                    if !last.is_truthy() {
                        return Ok(last);
                    }
                }
                Ok(last)
            }
            Expr::BoolOr(values) => {
                let mut last = Value::Bool(false);
                for value in values {
                    last = self.eval_expr(value)?;
                    if last.is_truthy() {
                        return Ok(last);
                    }
                }
                Ok(last)
            }
            Expr::Ternary { cond, body, orelse } => {
                if self.eval_expr(cond)?.is_truthy() {
                    self.eval_expr(body)
                } else {
                    self.eval_expr(orelse)
                }
            }
            Expr::Call { func, args, kwargs } => {
                let func = self.eval_expr(func)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval_expr(arg)?);
                }
                let mut kwarg_values = Vec::with_capacity(kwargs.len());
                for (name, value) in kwargs {
                    kwarg_values.push((name.clone(), self.eval_expr(value)?));
                }
                self.call_value(func, arg_values, kwarg_values)
            }
            Expr::Attribute { value, attr } => {
                let value = self.eval_expr(value)?;
                self.get_attribute(value, attr)
            }
            Expr::Subscript { value, index } => {
                let value = self.eval_expr(value)?;
                let index = self.eval_expr(index)?;
                self.get_item(&value, &index)
            }
            Expr::Slice {
                value,
                lower,
                upper,
            } => {
                let value = self.eval_expr(value)?;
                let lower = match lower {
                    Some(expr) => {
                        let bound = self.eval_expr(expr)?;
                        Some(self.to_index(&bound)?)
                    }
                    None => None,
                };
                let upper = match upper {
                    Some(expr) => {
                        let bound = self.eval_expr(expr)?;
                        Some(self.to_index(&bound)?)
                    }
                    None => None,
                };
                self.get_slice(&value, lower, upper)
            }
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(item)?);
                }
                Ok(Value::list(values))
            }
            Expr::Tuple(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(item)?);
                }
                Ok(Value::Tuple(Rc::new(values)))
            }
            Expr::Set(items) => {
                let mut values: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    let value = self.eval_expr(item)?;
                    if !values.iter().any(|v| v.value_eq(&value)) {
                        values.push(value);
                    }
                }
                Ok(Value::set(values))
            }
            Expr::Dict(pairs) => {
                let mut entries: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = self.eval_expr(key)?;
                    let value = self.eval_expr(value)?;
                    if let Some(slot) = entries.iter_mut().find(|(k, _)| k.value_eq(&key)) {
                        slot.1 = value;
                    } else {
                        entries.push((key, value));
                    }
                }
                Ok(Value::dict(entries))
            }
            Expr::ListComp { elt, generators } => {
                let mut out = Vec::new();
                self.run_comprehension(generators, &mut |interp| {
                    out.push(interp.eval_expr(elt)?);
                    Ok(())
                })?;
                Ok(Value::list(out))
            }
            Expr::SetComp { elt, generators } => {
                let mut out: Vec<Value> = Vec::new();
                self.run_comprehension(generators, &mut |interp| {
                    let value = interp.eval_expr(elt)?;
                    if !out.iter().any(|v| v.value_eq(&value)) {
                        out.push(value);
                    }
                    Ok(())
                })?;
                Ok(Value::set(out))
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                let mut entries: Vec<(Value, Value)> = Vec::new();
                self.run_comprehension(generators, &mut |interp| {
                    let k = interp.eval_expr(key)?;
                    let v = interp.eval_expr(value)?;
                    if let Some(slot) = entries.iter_mut().find(|(ek, _)| ek.value_eq(&k)) {
                        slot.1 = v;
                    } else {
                        entries.push((k, v));
                    }
                    Ok(())
                })?;
                Ok(Value::dict(entries))
            }
            Expr::Lambda { params, body } => {
                self.make_function("<lambda>", params, FunctionBody::Expr(Rc::new((**body).clone())))
            }
        }
    }

    /// Drive nested comprehension clauses inside a fresh scope.
    fn run_comprehension(
        &mut self,
        generators: &[Comprehension],
        emit: &mut dyn FnMut(&mut Interp) -> EvalResult<()>,
    ) -> EvalResult<()> {
        let captured = match self.frames.last() {
            Some(frame) => {
                let mut chain = frame.captured.clone();
                chain.push(frame.locals.clone());
                chain
            }
            None => Vec::new(),
        };
        self.frames
            .push(Frame::new(new_scope(), captured, FxHashSet::default()));
        let outcome = self.comp_clause(generators, emit);
        self.frames.pop();
        outcome
    }

    fn comp_clause(
        &mut self,
        generators: &[Comprehension],
        emit: &mut dyn FnMut(&mut Interp) -> EvalResult<()>,
    ) -> EvalResult<()> {
        let Some((clause, rest)) = generators.split_first() else {
            return emit(self);
        };
        let items = {
            let iterable = self.eval_expr(&clause.iter)?;
            self.iter_values(&iterable)?
        };
        'items: for item in items {
            self.assign_target(&clause.target, item)?;
            for cond in &clause.ifs {
                if !self.eval_expr(cond)?.is_truthy() {
                    continue 'items;
                }
            }
            self.comp_clause(rest, emit)?;
        }
        Ok(())
    }

    // ----- operators ----------------------------------------------------

    pub(crate) fn binary_op(&mut self, op: Op, left: Value, right: Value) -> EvalResult<Value> {
        if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
            return numeric_op(op, a, b);
        }
        match (op, &left, &right) {
            (Op::Add, Value::Str(a), Value::Str(b)) => {
                Ok(Value::str(format!("{}{}", a, b)))
            }
            (Op::Add, Value::List(a), Value::List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                Ok(Value::list(items))
            }
            (Op::Add, Value::Tuple(a), Value::Tuple(b)) => {
                let mut items = a.as_ref().clone();
                items.extend(b.iter().cloned());
                Ok(Value::Tuple(Rc::new(items)))
            }
            (Op::Mul, Value::Str(s), Value::Int(n)) | (Op::Mul, Value::Int(n), Value::Str(s)) => {
                Ok(Value::str(s.repeat((*n).max(0) as usize)))
            }
            (Op::Mul, Value::List(items), Value::Int(n))
            | (Op::Mul, Value::Int(n), Value::List(items)) => {
                let source = items.borrow();
                let mut out = Vec::with_capacity(source.len() * (*n).max(0) as usize);
                for _ in 0..(*n).max(0) {
                    out.extend(source.iter().cloned());
                }
                Ok(Value::list(out))
            }
            (Op::Mod, Value::Str(_), _) => raise(
                "TypeError",
                "string formatting with % is not supported",
            ),
            _ => raise(
                "TypeError",
                format!(
                    "unsupported operand type(s) for {}: '{}' and '{}'",
                    op_symbol(op),
                    left.type_name(),
                    right.type_name()
                ),
            ),
        }
    }

    fn compare(&mut self, op: CmpOp, left: &Value, right: &Value) -> EvalResult<bool> {
        use std::cmp::Ordering;
        match op {
            CmpOp::Eq => Ok(left.value_eq(right)),
            CmpOp::NotEq => Ok(!left.value_eq(right)),
            CmpOp::In => self.contains(right, left),
            CmpOp::NotIn => self.contains(right, left).map(|b| !b),
            ordered => {
                let Some(ordering) = left.value_cmp(right) else {
                    return raise(
                        "TypeError",
                        format!(
                            "'{}' not supported between instances of '{}' and '{}'",
                            cmp_symbol(ordered),
                            left.type_name(),
                            right.type_name()
                        ),
                    );
                };
                Ok(match ordered {
                    CmpOp::Lt => ordering == Ordering::Less,
                    CmpOp::LtEq => ordering != Ordering::Greater,
                    CmpOp::Gt => ordering == Ordering::Greater,
                    CmpOp::GtEq => ordering != Ordering::Less,
                    _ => unreachable!(),
                })
            }
        }
    }

    fn contains(&mut self, container: &Value, needle: &Value) -> EvalResult<bool> {
        match container {
            Value::List(items) => Ok(items.borrow().iter().any(|v| v.value_eq(needle))),
            Value::Tuple(items) => Ok(items.iter().any(|v| v.value_eq(needle))),
            Value::Set(items) => Ok(items.borrow().iter().any(|v| v.value_eq(needle))),
            Value::Dict(entries) => Ok(entries.borrow().iter().any(|(k, _)| k.value_eq(needle))),
            Value::Str(haystack) => match needle {
                Value::Str(sub) => Ok(haystack.contains(sub.as_str())),
                other => raise(
                    "TypeError",
                    format!(
                        "'in <string>' requires string as left operand, not '{}'",
                        other.type_name()
                    ),
                ),
            },
            other => raise(
                "TypeError",
                format!("argument of type '{}' is not iterable", other.type_name()),
            ),
        }
    }

    // ----- attribute and item access ------------------------------------

    pub(crate) fn get_attribute(&mut self, value: Value, attr: &str) -> EvalResult<Value> {
        match &value {
            Value::Module(module) => module.dict.get(attr).cloned().ok_or_else(|| {
                RuntimeError::new(
                    "AttributeError",
                    format!("module '{}' has no attribute '{attr}'", module.name),
                )
            }),
            Value::Instance(instance) => {
                if let Some(found) = instance.borrow().attrs.get(attr) {
                    return Ok(found.clone());
                }
                let class_entry = instance.borrow().class.dict.borrow().get(attr).cloned();
                match class_entry {
                    Some(Value::Function(_)) => Ok(Value::BoundMethod {
                        recv: Box::new(value.clone()),
                        name: attr.to_string(),
                    }),
                    Some(other) => Ok(other),
                    None => raise(
                        "AttributeError",
                        format!(
                            "'{}' object has no attribute '{attr}'",
                            instance.borrow().class.name
                        ),
                    ),
                }
            }
            Value::Class(class) => class.dict.borrow().get(attr).cloned().ok_or_else(|| {
                RuntimeError::new(
                    "AttributeError",
                    format!("type object '{}' has no attribute '{attr}'", class.name),
                )
            }),
            Value::Str(_) | Value::List(_) | Value::Dict(_) | Value::Set(_) | Value::Tuple(_) => {
                Ok(Value::BoundMethod {
                    recv: Box::new(value),
                    name: attr.to_string(),
                })
            }
            other => raise(
                "AttributeError",
                format!("'{}' object has no attribute '{attr}'", other.type_name()),
            ),
        }
    }

    pub(crate) fn get_item(&mut self, value: &Value, index: &Value) -> EvalResult<Value> {
        match value {
            Value::List(items) => {
                let items = items.borrow();
                let idx = normalize_index(index, items.len())
                    .map_err(|e| retag_index_error(e, "list"))?;
                Ok(items[idx].clone())
            }
            Value::Tuple(items) => {
                let idx = normalize_index(index, items.len())
                    .map_err(|e| retag_index_error(e, "tuple"))?;
                Ok(items[idx].clone())
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let idx = normalize_index(index, chars.len())
                    .map_err(|e| retag_index_error(e, "string"))?;
                Ok(Value::str(chars[idx].to_string()))
            }
            Value::Dict(entries) => entries
                .borrow()
                .iter()
                .find(|(k, _)| k.value_eq(index))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| RuntimeError::new("KeyError", index.repr())),
            other => raise(
                "TypeError",
                format!("'{}' object is not subscriptable", other.type_name()),
            ),
        }
    }

    fn get_slice(
        &mut self,
        value: &Value,
        lower: Option<i64>,
        upper: Option<i64>,
    ) -> EvalResult<Value> {
        match value {
            Value::List(items) => {
                let items = items.borrow();
                let (start, end) = slice_bounds(items.len(), lower, upper);
                Ok(Value::list(items[start..end].to_vec()))
            }
            Value::Tuple(items) => {
                let (start, end) = slice_bounds(items.len(), lower, upper);
                Ok(Value::Tuple(Rc::new(items[start..end].to_vec())))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let (start, end) = slice_bounds(chars.len(), lower, upper);
                Ok(Value::str(chars[start..end].iter().collect::<String>()))
            }
            other => raise(
                "TypeError",
                format!("'{}' object is not sliceable", other.type_name()),
            ),
        }
    }

    fn to_index(&self, value: &Value) -> EvalResult<i64> {
        match value.as_number() {
            Some(Number::Int(n)) => Ok(n),
            _ => raise(
                "TypeError",
                format!("indices must be integers, not '{}'", value.type_name()),
            ),
        }
    }

    /// Materialize an iterable into owned items.
    pub(crate) fn iter_values(&mut self, value: &Value) -> EvalResult<Vec<Value>> {
        match value {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) => Ok(items.as_ref().clone()),
            Value::Set(items) => Ok(items.borrow().clone()),
            Value::Dict(entries) => Ok(entries.borrow().iter().map(|(k, _)| k.clone()).collect()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            other => raise(
                "TypeError",
                format!("'{}' object is not iterable", other.type_name()),
            ),
        }
    }
}

fn numeric_op(op: Op, a: Number, b: Number) -> EvalResult<Value> {
    use Number::*;
    match (a, b) {
        (Int(x), Int(y)) => match op {
            Op::Add => Ok(int_or_float(x.checked_add(y), x as f64 + y as f64)),
            Op::Sub => Ok(int_or_float(x.checked_sub(y), x as f64 - y as f64)),
            Op::Mul => Ok(int_or_float(x.checked_mul(y), x as f64 * y as f64)),
            Op::Div => {
                if y == 0 {
                    return raise("ZeroDivisionError", "division by zero");
                }
                Ok(Value::Float(x as f64 / y as f64))
            }
            Op::FloorDiv => {
                if y == 0 {
                    return raise("ZeroDivisionError", "integer division or modulo by zero");
                }
                let quotient = x / y;
                let remainder = x % y;
                if remainder != 0 && (remainder < 0) != (y < 0) {
                    Ok(Value::Int(quotient - 1))
                } else {
                    Ok(Value::Int(quotient))
                }
            }
            Op::Mod => {
                if y == 0 {
                    return raise("ZeroDivisionError", "integer division or modulo by zero");
                }
                let remainder = x % y;
                if remainder != 0 && (remainder < 0) != (y < 0) {
                    Ok(Value::Int(remainder + y))
                } else {
                    Ok(Value::Int(remainder))
                }
            }
            Op::Pow => {
                if y >= 0 {
                    match u32::try_from(y).ok().and_then(|exp| x.checked_pow(exp)) {
                        Some(result) => Ok(Value::Int(result)),
                        None => Ok(Value::Float((x as f64).powf(y as f64))),
                    }
                } else {
                    Ok(Value::Float((x as f64).powf(y as f64)))
                }
            }
        },
        (a, b) => {
            let (x, y) = (a.as_f64(), b.as_f64());
            match op {
                Op::Add => Ok(Value::Float(x + y)),
                Op::Sub => Ok(Value::Float(x - y)),
                Op::Mul => Ok(Value::Float(x * y)),
                Op::Div => {
                    if y == 0.0 {
                        return raise("ZeroDivisionError", "float division by zero");
                    }
                    Ok(Value::Float(x / y))
                }
                Op::FloorDiv => {
                    if y == 0.0 {
                        return raise("ZeroDivisionError", "float floor division by zero");
                    }
                    Ok(Value::Float((x / y).floor()))
                }
                Op::Mod => {
                    if y == 0.0 {
                        return raise("ZeroDivisionError", "float modulo");
                    }
                    let r = x % y;
                    if r != 0.0 && (r < 0.0) != (y < 0.0) {
                        Ok(Value::Float(r + y))
                    } else {
                        Ok(Value::Float(r))
                    }
                }
                Op::Pow => Ok(Value::Float(x.powf(y))),
            }
        }
    }
}

fn int_or_float(checked: Option<i64>, fallback: f64) -> Value {
    match checked {
        Some(n) => Value::Int(n),
        None => Value::Float(fallback),
    }
}

fn op_symbol(op: Op) -> &'static str {
    match op {
        Op::Add => "+",
        Op::Sub => "-",
        Op::Mul => "*",
        Op::Div => "/",
        Op::FloorDiv => "//",
        Op::Mod => "%",
        Op::Pow => "**",
    }
}

fn cmp_symbol(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Lt => "<",
        CmpOp::LtEq => "<=",
        CmpOp::Gt => ">",
        CmpOp::GtEq => ">=",
        _ => "==",
    }
}

/// Resolve a (possibly negative) index against `len`.
pub(crate) fn normalize_index(index: &Value, len: usize) -> Result<usize, RuntimeError> {
    let idx = match index.as_number() {
        Some(Number::Int(n)) => n,
        _ => {
            return Err(RuntimeError::new(
                "TypeError",
                format!("indices must be integers, not '{}'", index.type_name()),
            ))
        }
    };
    let resolved = if idx < 0 { idx + len as i64 } else { idx };
    if resolved < 0 || resolved as usize >= len {
        return Err(RuntimeError::new("IndexError", "index out of range"));
    }
    Ok(resolved as usize)
}

fn retag_index_error(e: RuntimeError, kind: &str) -> RuntimeError {
    if e.kind == "IndexError" {
        RuntimeError::new("IndexError", format!("{kind} index out of range"))
    } else {
        e
    }
}

fn slice_bounds(len: usize, lower: Option<i64>, upper: Option<i64>) -> (usize, usize) {
    let clamp = |idx: i64| -> usize {
        let resolved = if idx < 0 { idx + len as i64 } else { idx };
        resolved.clamp(0, len as i64) as usize
    };
    let start = lower.map(clamp).unwrap_or(0);
    let end = upper.map(clamp).unwrap_or(len);
    (start, end.max(start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(code: &str) -> (String, Result<Option<Value>, RuntimeError>) {
        let mut interp = Interp::new();
        interp.run_cell(code)
    }

    fn eval_last(code: &str) -> Value {
        let (_, result) = run(code);
        result.unwrap().expect("expected a value")
    }

    fn run_err(code: &str) -> RuntimeError {
        let (_, result) = run(code);
        result.unwrap_err()
    }

    #[test]
    fn test_arithmetic() {
        assert!(eval_last("1 + 2 * 3").value_eq(&Value::Int(7)));
        assert!(eval_last("7 / 2").value_eq(&Value::Float(3.5)));
        assert!(eval_last("7 // 2").value_eq(&Value::Int(3)));
        assert!(eval_last("-7 // 2").value_eq(&Value::Int(-4)));
        assert!(eval_last("-7 % 3").value_eq(&Value::Int(2)));
        assert!(eval_last("2 ** 10").value_eq(&Value::Int(1024)));
        assert!(eval_last("2 ** -1").value_eq(&Value::Float(0.5)));
    }

    #[test]
    fn test_zero_division() {
        let err = run_err("x = 1 / 0");
        assert_eq!(err.kind, "ZeroDivisionError");
        assert!(err.to_string().contains("ZeroDivision"));
    }

    #[test]
    fn test_string_ops() {
        assert!(eval_last("'ab' + 'cd'").value_eq(&Value::str("abcd")));
        assert!(eval_last("'ab' * 3").value_eq(&Value::str("ababab")));
        assert!(eval_last("'hello'.upper()").value_eq(&Value::str("HELLO")));
        assert!(eval_last("','.join(['a', 'b'])").value_eq(&Value::str("a,b")));
        assert!(eval_last("'a,b,c'.split(',')[1]").value_eq(&Value::str("b")));
    }

    #[test]
    fn test_list_aliasing() {
        let value = eval_last("a = [1]\nb = a\nb.append(2)\na");
        assert_eq!(value.repr(), "[1, 2]");
    }

    #[test]
    fn test_dict_operations() {
        assert!(eval_last("d = {'a': 1}\nd['b'] = 2\nd['b']").value_eq(&Value::Int(2)));
        assert!(eval_last("d = {'a': 1}\nd.get('missing', 0)").value_eq(&Value::Int(0)));
        let err = run_err("d = {}\nd['nope']");
        assert_eq!(err.kind, "KeyError");
    }

    #[test]
    fn test_comprehensions() {
        assert_eq!(
            eval_last("[x * x for x in range(5) if x % 2 == 0]").repr(),
            "[0, 4, 16]"
        );
        assert_eq!(
            eval_last("{k: v for k, v in [('a', 1), ('b', 2)]}").repr(),
            "{'a': 1, 'b': 2}"
        );
    }

    #[test]
    fn test_functions_and_closures() {
        assert!(eval_last("def add(a, b=10):\n    return a + b\nadd(5)").value_eq(&Value::Int(15)));
        assert!(
            eval_last("def outer():\n    x = 1\n    def inner():\n        return x + 1\n    return inner()\nouter()")
                .value_eq(&Value::Int(2))
        );
        assert!(eval_last("f = lambda n: n * 2\nf(21)").value_eq(&Value::Int(42)));
    }

    #[test]
    fn test_recursion() {
        assert!(
            eval_last("def fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\nfib(10)")
                .value_eq(&Value::Int(55))
        );
    }

    #[test]
    fn test_recursion_limit() {
        let err = run_err("def loop():\n    return loop()\nloop()");
        assert_eq!(err.kind, "RecursionError");
    }

    #[test]
    fn test_global_statement() {
        let value = eval_last("counter = 0\ndef bump():\n    global counter\n    counter = counter + 1\nbump()\nbump()\ncounter");
        assert!(value.value_eq(&Value::Int(2)));
    }

    #[test]
    fn test_locals_do_not_leak() {
        let err = run_err("def f():\n    hidden = 1\nf()\nhidden");
        assert_eq!(err.kind, "NameError");
    }

    #[test]
    fn test_exceptions_try_except() {
        assert!(eval_last("try:\n    x = 1 / 0\nexcept ZeroDivisionError:\n    x = -1\nx")
            .value_eq(&Value::Int(-1)));
        assert!(
            eval_last("try:\n    raise ValueError('bad')\nexcept ValueError as e:\n    msg = str(e)\nmsg")
                .value_eq(&Value::str("bad"))
        );
    }

    #[test]
    fn test_finally_runs_on_error() {
        let (_, result) = run("done = False\ntry:\n    x = 1 / 0\nfinally:\n    done = True");
        assert!(result.is_err());
        // A fresh interpreter would lose state; verify via one interp.
        let mut interp = Interp::new();
        let (_, result) =
            interp.run_cell("done = False\ntry:\n    x = 1 / 0\nfinally:\n    done = True");
        assert!(result.is_err());
        let (_, result) = interp.run_cell("done");
        assert!(result.unwrap().unwrap().value_eq(&Value::Bool(true)));
    }

    #[test]
    fn test_uncaught_exception_kind_preserved() {
        let err = run_err("raise ValueError('nope')");
        assert_eq!(err.kind, "ValueError");
        assert_eq!(err.message, "nope");
    }

    #[test]
    fn test_name_error() {
        let err = run_err("undefined_variable + 1");
        assert_eq!(err.kind, "NameError");
        assert!(err.message.contains("undefined_variable"));
    }

    #[test]
    fn test_loops() {
        assert!(eval_last("total = 0\nfor i in range(5):\n    total += i\ntotal")
            .value_eq(&Value::Int(10)));
        assert!(eval_last("n = 0\nwhile n < 10:\n    n += 3\nn").value_eq(&Value::Int(12)));
        assert!(
            eval_last("total = 0\nfor i in range(10):\n    if i == 3:\n        break\n    total += i\ntotal")
                .value_eq(&Value::Int(3))
        );
        assert!(
            eval_last("total = 0\nfor i in range(5):\n    if i % 2 == 0:\n        continue\n    total += i\ntotal")
                .value_eq(&Value::Int(4))
        );
    }

    #[test]
    fn test_tuple_unpacking() {
        assert!(eval_last("a, b = 1, 2\na + b").value_eq(&Value::Int(3)));
        assert!(eval_last("pairs = [(1, 2), (3, 4)]\ntotal = 0\nfor a, b in pairs:\n    total += a * b\ntotal")
            .value_eq(&Value::Int(14)));
    }

    #[test]
    fn test_chained_comparison() {
        assert!(eval_last("1 < 2 < 3").value_eq(&Value::Bool(true)));
        assert!(eval_last("1 < 2 > 5").value_eq(&Value::Bool(false)));
    }

    #[test]
    fn test_membership() {
        assert!(eval_last("2 in [1, 2, 3]").value_eq(&Value::Bool(true)));
        assert!(eval_last("'b' in {'a': 1, 'b': 2}").value_eq(&Value::Bool(true)));
        assert!(eval_last("'ell' in 'hello'").value_eq(&Value::Bool(true)));
        assert!(eval_last("5 not in [1, 2]").value_eq(&Value::Bool(true)));
    }

    #[test]
    fn test_short_circuit() {
        assert!(eval_last("False and undefined_name").value_eq(&Value::Bool(false)));
        assert!(eval_last("True or undefined_name").value_eq(&Value::Bool(true)));
        assert!(eval_last("0 or 'fallback'").value_eq(&Value::str("fallback")));
    }

    #[test]
    fn test_classes() {
        let code = "class Point:\n    def __init__(self, x, y):\n        self.x = x\n        self.y = y\n    def dot(self, other):\n        return self.x * other.x + self.y * other.y\np = Point(1, 2)\nq = Point(3, 4)\np.dot(q)";
        assert!(eval_last(code).value_eq(&Value::Int(11)));
    }

    #[test]
    fn test_class_inheritance_copies_methods() {
        let code = "class Base:\n    def hello(self):\n        return 'hi'\nclass Child(Base):\n    pass\nChild().hello()";
        assert!(eval_last(code).value_eq(&Value::str("hi")));
    }

    #[test]
    fn test_print_captures_stdout() {
        let (stdout, result) = run("print('hello', 42)\nprint('x', 'y', sep='-')");
        assert!(result.is_ok());
        assert_eq!(stdout, "hello 42\nx-y\n");
    }

    #[test]
    fn test_last_expression_value() {
        let (_, result) = run("x = 10\nx + 5");
        assert!(result.unwrap().unwrap().value_eq(&Value::Int(15)));
        let (_, result) = run("x = 10");
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_globals_persist_across_cells() {
        let mut interp = Interp::new();
        let (_, result) = interp.run_cell("x = 10");
        assert!(result.is_ok());
        let (_, result) = interp.run_cell("y = x + 5\ny");
        assert!(result.unwrap().unwrap().value_eq(&Value::Int(15)));
    }

    #[test]
    fn test_syntax_error() {
        let err = run_err("def broken(:");
        assert_eq!(err.kind, "SyntaxError");
    }

    #[test]
    fn test_math_module() {
        assert!(eval_last("import math\nmath.sqrt(16.0)").value_eq(&Value::Float(4.0)));
        assert!(eval_last("from math import floor\nfloor(3.7)").value_eq(&Value::Int(3)));
        let err = run_err("import math\nmath.sqrt(-1)");
        assert_eq!(err.kind, "ValueError");
    }

    #[test]
    fn test_json_module() {
        assert!(eval_last("import json\njson.loads('{\"a\": 1}')['a']").value_eq(&Value::Int(1)));
        let value = eval_last("import json\njson.dumps([1, 2])");
        assert!(value.value_eq(&Value::str("[1,2]")));
    }

    #[test]
    fn test_unknown_import() {
        let err = run_err("import numpy");
        assert_eq!(err.kind, "ImportError");
    }

    #[test]
    fn test_slicing() {
        assert_eq!(eval_last("[1, 2, 3, 4][1:3]").repr(), "[2, 3]");
        assert_eq!(eval_last("'hello'[:2]").repr(), "'he'");
        assert_eq!(eval_last("[1, 2, 3][-2:]").repr(), "[2, 3]");
    }

    #[test]
    fn test_negative_indexing() {
        assert!(eval_last("[1, 2, 3][-1]").value_eq(&Value::Int(3)));
        let err = run_err("[1, 2][5]");
        assert_eq!(err.kind, "IndexError");
    }

    #[test]
    fn test_builtin_shadowing() {
        assert!(eval_last("sum = 10\nsum + 1").value_eq(&Value::Int(11)));
    }

    #[test]
    fn test_with_binds_target() {
        assert!(eval_last("with [1, 2] as xs:\n    n = len(xs)\nn").value_eq(&Value::Int(2)));
    }

    #[test]
    fn test_nonlocal_rejected() {
        let err = run_err("def f():\n    nonlocal x\nf()");
        assert_eq!(err.kind, "SyntaxError");
    }

    #[test]
    fn test_sorted_and_builtins() {
        assert_eq!(eval_last("sorted([3, 1, 2])").repr(), "[1, 2, 3]");
        assert_eq!(eval_last("sorted([1, 2, 3], reverse=True)").repr(), "[3, 2, 1]");
        assert!(eval_last("min(4, 2, 9)").value_eq(&Value::Int(2)));
        assert!(eval_last("max([4, 2, 9])").value_eq(&Value::Int(9)));
        assert!(eval_last("sum(range(4))").value_eq(&Value::Int(6)));
        assert_eq!(eval_last("list(zip([1, 2], ['a', 'b']))").repr(), "[(1, 'a'), (2, 'b')]");
        assert_eq!(eval_last("enumerate(['a', 'b'])").repr(), "[(0, 'a'), (1, 'b')]");
    }

    #[test]
    fn test_int_float_conversion() {
        assert!(eval_last("int('42')").value_eq(&Value::Int(42)));
        assert!(eval_last("float('2.5')").value_eq(&Value::Float(2.5)));
        let err = run_err("int('abc')");
        assert_eq!(err.kind, "ValueError");
    }
}
