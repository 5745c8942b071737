//! Recursive-descent parser for the ripple cell language.
//!
//! Consumes the layout-processed token stream from [`super::token::lex`] and
//! produces a [`Module`]. Expression parsing is precedence-climbing; suites
//! are either indented blocks or inline simple-statement lists.

use crate::error::{Error, Result};

use super::ast::{
    CmpOp, Comprehension, ExceptHandler, Expr, Module, Op, Param, Stmt, Target, UnaryOp,
};
use super::token::{lex, SpannedTok, Tok};

/// Parse a complete cell body.
pub fn parse_module(source: &str) -> Result<Module> {
    let toks = lex(source)?;
    let mut parser = Parser { toks, pos: 0 };
    let body = parser.parse_statements_until(None)?;
    Ok(Module { body })
}

struct Parser {
    toks: Vec<SpannedTok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(t, _)| t)
    }

    fn peek2(&self) -> Option<&Tok> {
        self.toks.get(self.pos + 1).map(|(t, _)| t)
    }

    fn line(&self) -> usize {
        self.toks
            .get(self.pos.min(self.toks.len().saturating_sub(1)))
            .map(|(_, l)| *l)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> Error {
        Error::Parse(format!(
            "line {}: expected {what}, found {:?}",
            self.line(),
            self.peek()
        ))
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match self.peek() {
            Some(Tok::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    // ----- statements ---------------------------------------------------

    /// Parse statements until `stop` (or end of input when `None`).
    fn parse_statements_until(&mut self, stop: Option<&Tok>) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&Tok::Newline) {}
            match self.peek() {
                None => break,
                Some(tok) if Some(tok) == stop => {
                    self.pos += 1;
                    return Ok(stmts);
                }
                Some(_) => stmts.push(self.parse_statement()?),
            }
        }
        if stop.is_some() {
            return Err(self.unexpected("end of block"));
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        match self.peek() {
            Some(Tok::Def) => self.parse_def(),
            Some(Tok::Class) => self.parse_class(),
            Some(Tok::If) => self.parse_if(),
            Some(Tok::While) => self.parse_while(),
            Some(Tok::For) => self.parse_for(),
            Some(Tok::With) => self.parse_with(),
            Some(Tok::Try) => self.parse_try(),
            _ => {
                let stmt = self.parse_simple_statement()?;
                // Further `;`-separated statements on the same line become
                // their own entries via parse_suite; at top level we keep
                // the first and continue the line.
                if self.eat(&Tok::Semicolon) && self.peek() != Some(&Tok::Newline) {
                    // Re-queue: caller loop will pick the rest up.
                    return Ok(stmt);
                }
                self.expect(&Tok::Newline, "newline after statement")?;
                Ok(stmt)
            }
        }
    }

    fn parse_simple_statement(&mut self) -> Result<Stmt> {
        match self.peek() {
            Some(Tok::Pass) => {
                self.pos += 1;
                Ok(Stmt::Pass)
            }
            Some(Tok::Break) => {
                self.pos += 1;
                Ok(Stmt::Break)
            }
            Some(Tok::Continue) => {
                self.pos += 1;
                Ok(Stmt::Continue)
            }
            Some(Tok::Return) => {
                self.pos += 1;
                if matches!(self.peek(), Some(Tok::Newline) | Some(Tok::Semicolon) | None) {
                    Ok(Stmt::Return(None))
                } else {
                    Ok(Stmt::Return(Some(self.parse_exprlist()?)))
                }
            }
            Some(Tok::Raise) => {
                self.pos += 1;
                if matches!(self.peek(), Some(Tok::Newline) | Some(Tok::Semicolon) | None) {
                    Ok(Stmt::Raise(None))
                } else {
                    Ok(Stmt::Raise(Some(self.parse_expr()?)))
                }
            }
            Some(Tok::Global) => {
                self.pos += 1;
                Ok(Stmt::Global(self.parse_name_list()?))
            }
            Some(Tok::Nonlocal) => {
                self.pos += 1;
                Ok(Stmt::Nonlocal(self.parse_name_list()?))
            }
            Some(Tok::Import) => {
                self.pos += 1;
                let mut modules = Vec::new();
                loop {
                    let module = self.parse_dotted_name()?;
                    let alias = if self.eat(&Tok::As) {
                        Some(self.expect_ident("import alias")?)
                    } else {
                        None
                    };
                    modules.push((module, alias));
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                Ok(Stmt::Import { modules })
            }
            Some(Tok::From) => {
                self.pos += 1;
                let module = self.parse_dotted_name()?;
                self.expect(&Tok::Import, "`import` in from-import")?;
                let mut names = Vec::new();
                loop {
                    let name = self.expect_ident("imported name")?;
                    let alias = if self.eat(&Tok::As) {
                        Some(self.expect_ident("import alias")?)
                    } else {
                        None
                    };
                    names.push((name, alias));
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                Ok(Stmt::FromImport { module, names })
            }
            _ => self.parse_expr_statement(),
        }
    }

    fn parse_name_list(&mut self) -> Result<Vec<String>> {
        let mut names = vec![self.expect_ident("name")?];
        while self.eat(&Tok::Comma) {
            names.push(self.expect_ident("name")?);
        }
        Ok(names)
    }

    fn parse_dotted_name(&mut self) -> Result<String> {
        let mut name = self.expect_ident("module name")?;
        while self.eat(&Tok::Dot) {
            name.push('.');
            name.push_str(&self.expect_ident("module name segment")?);
        }
        Ok(name)
    }

    fn parse_expr_statement(&mut self) -> Result<Stmt> {
        let first = self.parse_exprlist()?;

        if let Some(aug_op) = self.peek_aug_op() {
            self.pos += 1;
            let target = first
                .into_target()
                .ok_or_else(|| self.unexpected("assignable target"))?;
            let value = self.parse_exprlist()?;
            return Ok(Stmt::AugAssign {
                target,
                op: aug_op,
                value,
            });
        }

        if self.peek() != Some(&Tok::Assign) {
            return Ok(Stmt::Expr(first));
        }

        // Chained assignment: t1 = t2 = ... = value.
        let mut parts = vec![first];
        while self.eat(&Tok::Assign) {
            parts.push(self.parse_exprlist()?);
        }
        let value = parts.pop().unwrap();
        let targets: Option<Vec<Target>> = parts.into_iter().map(Expr::into_target).collect();
        let targets = targets.ok_or_else(|| self.unexpected("assignable target"))?;
        Ok(Stmt::Assign { targets, value })
    }

    fn peek_aug_op(&self) -> Option<Op> {
        match self.peek() {
            Some(Tok::PlusAssign) => Some(Op::Add),
            Some(Tok::MinusAssign) => Some(Op::Sub),
            Some(Tok::StarAssign) => Some(Op::Mul),
            Some(Tok::SlashAssign) => Some(Op::Div),
            Some(Tok::FloorDivAssign) => Some(Op::FloorDiv),
            Some(Tok::PercentAssign) => Some(Op::Mod),
            Some(Tok::PowAssign) => Some(Op::Pow),
            _ => None,
        }
    }

    // ----- compound statements ------------------------------------------

    fn parse_suite(&mut self) -> Result<Vec<Stmt>> {
        self.expect(&Tok::Colon, "`:`")?;
        if self.eat(&Tok::Newline) {
            self.expect(&Tok::Indent, "indented block")?;
            self.parse_statements_until(Some(&Tok::Dedent))
        } else {
            // Inline suite: simple statements separated by `;`.
            let mut stmts = vec![self.parse_simple_statement()?];
            while self.eat(&Tok::Semicolon) {
                if matches!(self.peek(), Some(Tok::Newline) | None) {
                    break;
                }
                stmts.push(self.parse_simple_statement()?);
            }
            if self.peek().is_some() {
                self.expect(&Tok::Newline, "newline after inline suite")?;
            }
            Ok(stmts)
        }
    }

    fn parse_def(&mut self) -> Result<Stmt> {
        self.expect(&Tok::Def, "`def`")?;
        let name = self.expect_ident("function name")?;
        self.expect(&Tok::LParen, "`(`")?;
        let params = self.parse_params(&Tok::RParen)?;
        self.expect(&Tok::RParen, "`)`")?;
        let body = self.parse_suite()?;
        Ok(Stmt::Def { name, params, body })
    }

    fn parse_params(&mut self, terminator: &Tok) -> Result<Vec<Param>> {
        let mut params = Vec::new();
        while self.peek() != Some(terminator) {
            let name = self.expect_ident("parameter name")?;
            let default = if self.eat(&Tok::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            params.push(Param { name, default });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_class(&mut self) -> Result<Stmt> {
        self.expect(&Tok::Class, "`class`")?;
        let name = self.expect_ident("class name")?;
        let mut bases = Vec::new();
        if self.eat(&Tok::LParen) {
            while self.peek() != Some(&Tok::RParen) {
                bases.push(self.parse_expr()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            self.expect(&Tok::RParen, "`)`")?;
        }
        let body = self.parse_suite()?;
        Ok(Stmt::Class { name, bases, body })
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        self.expect(&Tok::If, "`if`")?;
        let mut branches = Vec::new();
        let cond = self.parse_expr()?;
        branches.push((cond, self.parse_suite()?));
        let mut orelse = Vec::new();
        loop {
            while self.peek() == Some(&Tok::Newline)
                && matches!(self.peek2(), Some(Tok::Elif) | Some(Tok::Else))
            {
                self.pos += 1;
            }
            if self.eat(&Tok::Elif) {
                let cond = self.parse_expr()?;
                branches.push((cond, self.parse_suite()?));
            } else if self.eat(&Tok::Else) {
                orelse = self.parse_suite()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::If { branches, orelse })
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        self.expect(&Tok::While, "`while`")?;
        let cond = self.parse_expr()?;
        let body = self.parse_suite()?;
        Ok(Stmt::While { cond, body })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        self.expect(&Tok::For, "`for`")?;
        let target = self.parse_target_list()?;
        self.expect(&Tok::In, "`in`")?;
        let iter = self.parse_exprlist()?;
        let body = self.parse_suite()?;
        Ok(Stmt::For { target, iter, body })
    }

    fn parse_with(&mut self) -> Result<Stmt> {
        self.expect(&Tok::With, "`with`")?;
        let context = self.parse_expr()?;
        let target = if self.eat(&Tok::As) {
            Some(self.parse_target_list()?)
        } else {
            None
        };
        let body = self.parse_suite()?;
        Ok(Stmt::With {
            context,
            target,
            body,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt> {
        self.expect(&Tok::Try, "`try`")?;
        let body = self.parse_suite()?;
        let mut handlers = Vec::new();
        let mut finally = Vec::new();
        loop {
            while self.peek() == Some(&Tok::Newline)
                && matches!(self.peek2(), Some(Tok::Except) | Some(Tok::Finally))
            {
                self.pos += 1;
            }
            if self.eat(&Tok::Except) {
                let kind = match self.peek() {
                    Some(Tok::Colon) => None,
                    _ => Some(self.expect_ident("exception kind")?),
                };
                let name = if self.eat(&Tok::As) {
                    Some(self.expect_ident("exception binding")?)
                } else {
                    None
                };
                let body = self.parse_suite()?;
                handlers.push(ExceptHandler { kind, name, body });
            } else if self.eat(&Tok::Finally) {
                finally = self.parse_suite()?;
                break;
            } else {
                break;
            }
        }
        if handlers.is_empty() && finally.is_empty() {
            return Err(self.unexpected("`except` or `finally` after `try` block"));
        }
        Ok(Stmt::Try {
            body,
            handlers,
            finally,
        })
    }

    fn parse_target_list(&mut self) -> Result<Target> {
        let expr = self.parse_exprlist_no_ternary()?;
        expr.into_target()
            .ok_or_else(|| self.unexpected("assignable target"))
    }

    // ----- expressions --------------------------------------------------

    /// Expression list: `a, b, c` becomes a tuple.
    fn parse_exprlist(&mut self) -> Result<Expr> {
        let first = self.parse_expr()?;
        if self.peek() != Some(&Tok::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Tok::Comma) {
            if self.exprlist_terminator() {
                break;
            }
            items.push(self.parse_expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    /// Like `parse_exprlist` but stops before `in` (for-loop targets).
    fn parse_exprlist_no_ternary(&mut self) -> Result<Expr> {
        let first = self.parse_postfix()?;
        if self.peek() != Some(&Tok::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Tok::Comma) {
            if self.exprlist_terminator() || self.peek() == Some(&Tok::In) {
                break;
            }
            items.push(self.parse_postfix()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn exprlist_terminator(&self) -> bool {
        matches!(
            self.peek(),
            Some(Tok::Newline)
                | Some(Tok::Assign)
                | Some(Tok::Semicolon)
                | Some(Tok::Colon)
                | Some(Tok::RParen)
                | Some(Tok::RBracket)
                | Some(Tok::RBrace)
                | None
        )
    }

    pub(crate) fn parse_expr(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Tok::Lambda) {
            return self.parse_lambda();
        }
        let value = self.parse_or()?;
        if self.eat(&Tok::If) {
            let cond = self.parse_or()?;
            self.expect(&Tok::Else, "`else` in conditional expression")?;
            let orelse = self.parse_expr()?;
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                body: Box::new(value),
                orelse: Box::new(orelse),
            });
        }
        Ok(value)
    }

    fn parse_lambda(&mut self) -> Result<Expr> {
        self.expect(&Tok::Lambda, "`lambda`")?;
        let params = self.parse_params(&Tok::Colon)?;
        self.expect(&Tok::Colon, "`:` in lambda")?;
        let body = self.parse_expr()?;
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
        })
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let first = self.parse_and()?;
        if self.peek() != Some(&Tok::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&Tok::Or) {
            values.push(self.parse_and()?);
        }
        Ok(Expr::BoolOr(values))
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let first = self.parse_not()?;
        if self.peek() != Some(&Tok::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&Tok::And) {
            values.push(self.parse_not()?);
        }
        Ok(Expr::BoolAnd(values))
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat(&Tok::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_arith()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Tok::EqEq) => CmpOp::Eq,
                Some(Tok::NotEq) => CmpOp::NotEq,
                Some(Tok::Lt) => CmpOp::Lt,
                Some(Tok::LtEq) => CmpOp::LtEq,
                Some(Tok::Gt) => CmpOp::Gt,
                Some(Tok::GtEq) => CmpOp::GtEq,
                Some(Tok::In) => CmpOp::In,
                Some(Tok::Not) if self.peek2() == Some(&Tok::In) => CmpOp::NotIn,
                _ => break,
            };
            self.pos += if op == CmpOp::NotIn { 2 } else { 1 };
            rest.push((op, self.parse_arith()?));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                rest,
            })
        }
    }

    fn parse_arith(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => Op::Add,
                Some(Tok::Minus) => Op::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_term()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => Op::Mul,
                Some(Tok::Slash) => Op::Div,
                Some(Tok::FloorDiv) => Op::FloorDiv,
                Some(Tok::Percent) => Op::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_factor()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Tok::Minus) => {
                self.pos += 1;
                let operand = self.parse_factor()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            Some(Tok::Plus) => {
                self.pos += 1;
                let operand = self.parse_factor()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Pos,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_postfix()?;
        if self.eat(&Tok::Pow) {
            // Right-associative; exponent binds tighter than unary minus.
            let exponent = self.parse_factor()?;
            return Ok(Expr::Binary {
                left: Box::new(base),
                op: Op::Pow,
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut value = self.parse_atom()?;
        loop {
            match self.peek() {
                Some(Tok::LParen) => {
                    self.pos += 1;
                    let (args, kwargs) = self.parse_call_args()?;
                    value = Expr::Call {
                        func: Box::new(value),
                        args,
                        kwargs,
                    };
                }
                Some(Tok::Dot) => {
                    self.pos += 1;
                    let attr = self.expect_ident("attribute name")?;
                    value = Expr::Attribute {
                        value: Box::new(value),
                        attr,
                    };
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    value = self.parse_subscript_or_slice(value)?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_subscript_or_slice(&mut self, value: Expr) -> Result<Expr> {
        let lower = if matches!(self.peek(), Some(Tok::Colon)) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        if self.eat(&Tok::Colon) {
            let upper = if matches!(self.peek(), Some(Tok::RBracket)) {
                None
            } else {
                Some(Box::new(self.parse_expr()?))
            };
            self.expect(&Tok::RBracket, "`]`")?;
            return Ok(Expr::Slice {
                value: Box::new(value),
                lower,
                upper,
            });
        }
        self.expect(&Tok::RBracket, "`]`")?;
        let index = lower.ok_or_else(|| self.unexpected("subscript index"))?;
        Ok(Expr::Subscript {
            value: Box::new(value),
            index,
        })
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while self.peek() != Some(&Tok::RParen) {
            if let (Some(Tok::Ident(name)), Some(Tok::Assign)) = (self.peek(), self.peek2()) {
                let name = name.clone();
                self.pos += 2;
                kwargs.push((name, self.parse_expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.unexpected("keyword argument (positional after keyword)"));
                }
                args.push(self.parse_expr()?);
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RParen, "`)`")?;
        Ok((args, kwargs))
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Tok::None) => Ok(Expr::None),
            Some(Tok::True) => Ok(Expr::Bool(true)),
            Some(Tok::False) => Ok(Expr::Bool(false)),
            Some(Tok::Int(n)) => Ok(Expr::Int(n)),
            Some(Tok::Float(f)) => Ok(Expr::Float(f)),
            Some(Tok::Str(s)) => Ok(Expr::Str(s)),
            Some(Tok::Ident(name)) => Ok(Expr::Name(name)),
            Some(Tok::Lambda) => {
                self.pos -= 1;
                self.parse_lambda()
            }
            Some(Tok::LParen) => {
                if self.eat(&Tok::RParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.eat(&Tok::Comma) {
                    let mut items = vec![first];
                    while self.peek() != Some(&Tok::RParen) {
                        items.push(self.parse_expr()?);
                        if !self.eat(&Tok::Comma) {
                            break;
                        }
                    }
                    self.expect(&Tok::RParen, "`)`")?;
                    return Ok(Expr::Tuple(items));
                }
                self.expect(&Tok::RParen, "`)`")?;
                Ok(first)
            }
            Some(Tok::LBracket) => self.parse_list_display(),
            Some(Tok::LBrace) => self.parse_brace_display(),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected("expression"))
            }
        }
    }

    fn parse_list_display(&mut self) -> Result<Expr> {
        if self.eat(&Tok::RBracket) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.parse_expr()?;
        if self.peek() == Some(&Tok::For) {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(&Tok::RBracket, "`]`")?;
            return Ok(Expr::ListComp {
                elt: Box::new(first),
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat(&Tok::Comma) {
            if self.peek() == Some(&Tok::RBracket) {
                break;
            }
            items.push(self.parse_expr()?);
        }
        self.expect(&Tok::RBracket, "`]`")?;
        Ok(Expr::List(items))
    }

    fn parse_brace_display(&mut self) -> Result<Expr> {
        if self.eat(&Tok::RBrace) {
            return Ok(Expr::Dict(Vec::new()));
        }
        let first = self.parse_expr()?;
        if self.eat(&Tok::Colon) {
            let value = self.parse_expr()?;
            if self.peek() == Some(&Tok::For) {
                let generators = self.parse_comprehension_clauses()?;
                self.expect(&Tok::RBrace, "`}`")?;
                return Ok(Expr::DictComp {
                    key: Box::new(first),
                    value: Box::new(value),
                    generators,
                });
            }
            let mut pairs = vec![(first, value)];
            while self.eat(&Tok::Comma) {
                if self.peek() == Some(&Tok::RBrace) {
                    break;
                }
                let key = self.parse_expr()?;
                self.expect(&Tok::Colon, "`:` in dict display")?;
                pairs.push((key, self.parse_expr()?));
            }
            self.expect(&Tok::RBrace, "`}`")?;
            return Ok(Expr::Dict(pairs));
        }
        if self.peek() == Some(&Tok::For) {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(&Tok::RBrace, "`}`")?;
            return Ok(Expr::SetComp {
                elt: Box::new(first),
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat(&Tok::Comma) {
            if self.peek() == Some(&Tok::RBrace) {
                break;
            }
            items.push(self.parse_expr()?);
        }
        self.expect(&Tok::RBrace, "`}`")?;
        Ok(Expr::Set(items))
    }

    fn parse_comprehension_clauses(&mut self) -> Result<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while self.eat(&Tok::For) {
            let target = self.parse_target_list()?;
            self.expect(&Tok::In, "`in` in comprehension")?;
            let iter = self.parse_or()?;
            let mut ifs = Vec::new();
            while self.eat(&Tok::If) {
                ifs.push(self.parse_or()?);
            }
            generators.push(Comprehension { target, iter, ifs });
        }
        Ok(generators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Module {
        parse_module(source).unwrap()
    }

    #[test]
    fn test_assignment() {
        let m = parse("x = 10");
        assert_eq!(m.body.len(), 1);
        assert!(matches!(
            &m.body[0],
            Stmt::Assign { targets, value: Expr::Int(10) }
                if targets == &vec![Target::Name("x".into())]
        ));
    }

    #[test]
    fn test_tuple_unpacking() {
        let m = parse("a, b = 1, 2");
        match &m.body[0] {
            Stmt::Assign { targets, value } => {
                assert_eq!(
                    targets[0],
                    Target::Tuple(vec![Target::Name("a".into()), Target::Name("b".into())])
                );
                assert!(matches!(value, Expr::Tuple(items) if items.len() == 2));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_chained_assignment() {
        let m = parse("a = b = 5");
        match &m.body[0] {
            Stmt::Assign { targets, .. } => assert_eq!(targets.len(), 2),
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_aug_assignment() {
        let m = parse("x += 1");
        assert!(matches!(
            &m.body[0],
            Stmt::AugAssign { op: Op::Add, .. }
        ));
    }

    #[test]
    fn test_operator_precedence() {
        let m = parse("r = 1 + 2 * 3");
        match &m.body[0] {
            Stmt::Assign { value, .. } => match value {
                Expr::Binary { op: Op::Add, right, .. } => {
                    assert!(matches!(**right, Expr::Binary { op: Op::Mul, .. }));
                }
                other => panic!("expected addition at the root, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_power_right_associative() {
        let m = parse("r = 2 ** 3 ** 2");
        match &m.body[0] {
            Stmt::Assign { value, .. } => match value {
                Expr::Binary { op: Op::Pow, right, .. } => {
                    assert!(matches!(**right, Expr::Binary { op: Op::Pow, .. }));
                }
                other => panic!("expected power at the root, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_def_with_defaults() {
        let m = parse("def f(a, b=2):\n    return a + b");
        match &m.body[0] {
            Stmt::Def { name, params, body } => {
                assert_eq!(name, "f");
                assert_eq!(params.len(), 2);
                assert!(params[0].default.is_none());
                assert!(params[1].default.is_some());
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected def, got {other:?}"),
        }
    }

    #[test]
    fn test_if_elif_else() {
        let m = parse("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3");
        match &m.body[0] {
            Stmt::If { branches, orelse } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(orelse.len(), 1);
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_inline_suite() {
        let m = parse("if x: y = 1");
        match &m.body[0] {
            Stmt::If { branches, .. } => assert_eq!(branches[0].1.len(), 1),
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_for_loop() {
        let m = parse("for i in range(3):\n    total += i");
        assert!(matches!(&m.body[0], Stmt::For { .. }));
    }

    #[test]
    fn test_while_loop() {
        let m = parse("while x < 10:\n    x += 1");
        assert!(matches!(&m.body[0], Stmt::While { .. }));
    }

    #[test]
    fn test_with_as() {
        let m = parse("with open('f') as fh:\n    pass");
        match &m.body[0] {
            Stmt::With { target, .. } => {
                assert_eq!(target, &Some(Target::Name("fh".into())));
            }
            other => panic!("expected with, got {other:?}"),
        }
    }

    #[test]
    fn test_try_except_finally() {
        let m = parse("try:\n    x = 1\nexcept ValueError as e:\n    x = 2\nfinally:\n    y = 3");
        match &m.body[0] {
            Stmt::Try {
                handlers, finally, ..
            } => {
                assert_eq!(handlers.len(), 1);
                assert_eq!(handlers[0].kind.as_deref(), Some("ValueError"));
                assert_eq!(handlers[0].name.as_deref(), Some("e"));
                assert_eq!(finally.len(), 1);
            }
            other => panic!("expected try, got {other:?}"),
        }
    }

    #[test]
    fn test_import_forms() {
        let m = parse("import math\nimport json as j\nfrom math import sqrt as root");
        assert!(matches!(&m.body[0], Stmt::Import { .. }));
        match &m.body[1] {
            Stmt::Import { modules } => {
                assert_eq!(modules[0], ("json".into(), Some("j".into())));
            }
            other => panic!("expected import, got {other:?}"),
        }
        match &m.body[2] {
            Stmt::FromImport { module, names } => {
                assert_eq!(module, "math");
                assert_eq!(names[0], ("sqrt".into(), Some("root".into())));
            }
            other => panic!("expected from-import, got {other:?}"),
        }
    }

    #[test]
    fn test_comprehension() {
        let m = parse("squares = [x * x for x in range(10) if x % 2 == 0]");
        match &m.body[0] {
            Stmt::Assign { value, .. } => match value {
                Expr::ListComp { generators, .. } => {
                    assert_eq!(generators.len(), 1);
                    assert_eq!(generators[0].ifs.len(), 1);
                }
                other => panic!("expected list comprehension, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_dict_comprehension() {
        let m = parse("d = {k: v for k, v in pairs}");
        match &m.body[0] {
            Stmt::Assign { value, .. } => assert!(matches!(value, Expr::DictComp { .. })),
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_call_with_kwargs() {
        let m = parse("r = f(1, 2, key=3)");
        match &m.body[0] {
            Stmt::Assign { value, .. } => match value {
                Expr::Call { args, kwargs, .. } => {
                    assert_eq!(args.len(), 2);
                    assert_eq!(kwargs.len(), 1);
                    assert_eq!(kwargs[0].0, "key");
                }
                other => panic!("expected call, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_slice() {
        let m = parse("s = xs[1:3]");
        match &m.body[0] {
            Stmt::Assign { value, .. } => assert!(matches!(value, Expr::Slice { .. })),
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_comparison_chain() {
        let m = parse("ok = 1 < x <= 10");
        match &m.body[0] {
            Stmt::Assign { value, .. } => match value {
                Expr::Compare { rest, .. } => assert_eq!(rest.len(), 2),
                other => panic!("expected comparison, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_not_in() {
        let m = parse("ok = x not in xs");
        match &m.body[0] {
            Stmt::Assign { value, .. } => match value {
                Expr::Compare { rest, .. } => assert_eq!(rest[0].0, CmpOp::NotIn),
                other => panic!("expected comparison, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_lambda() {
        let m = parse("f = lambda a, b=1: a + b");
        match &m.body[0] {
            Stmt::Assign { value, .. } => match value {
                Expr::Lambda { params, .. } => assert_eq!(params.len(), 2),
                other => panic!("expected lambda, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_class() {
        let m = parse("class Point:\n    def mag(self):\n        return self.x");
        match &m.body[0] {
            Stmt::Class { name, bases, body } => {
                assert_eq!(name, "Point");
                assert!(bases.is_empty());
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected class, got {other:?}"),
        }
    }

    #[test]
    fn test_global() {
        let m = parse("def bump():\n    global counter\n    counter = counter + 1");
        match &m.body[0] {
            Stmt::Def { body, .. } => {
                assert!(matches!(&body[0], Stmt::Global(names) if names == &vec!["counter".to_string()]));
            }
            other => panic!("expected def, got {other:?}"),
        }
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = parse_module("x = 1\ny = = 2").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_ternary() {
        let m = parse("v = 1 if flag else 2");
        match &m.body[0] {
            Stmt::Assign { value, .. } => assert!(matches!(value, Expr::Ternary { .. })),
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_blocks() {
        let m = parse("def outer():\n    def inner():\n        return 1\n    return inner()");
        match &m.body[0] {
            Stmt::Def { body, .. } => {
                assert!(matches!(&body[0], Stmt::Def { .. }));
                assert!(matches!(&body[1], Stmt::Return(_)));
            }
            other => panic!("expected def, got {other:?}"),
        }
    }
}
