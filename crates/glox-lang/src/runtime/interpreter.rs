//! Tree-walking interpreter. Executes statements against the scope chain and
//! writes `print` output to any `io::Write` sink.
//!
//! Non-local control flow (`break`, `continue`, `return`) is carried by a
//! [`Signal`] rather than by unwinding: once a statement raises a signal,
//! every following statement is skipped until the loop or call that owns the
//! signal clears it.

use std::io::Write;
use std::rc::Rc;

use crate::error::{Error, ErrorCode};
use crate::runtime::environment::{Environment, FrameId, ScopeError, ScopePolicy};
use crate::runtime::value::Value;
use crate::stack;
use crate::syntax::ast::{BinOp, Expr, LogicalOp, Span, Stmt, UnOp, WhileStmt};

/// Deepest chain of nested script-level calls before `R007` is raised.
pub const MAX_CALL_DEPTH: usize = 10_000;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Signal {
    #[default]
    Normal,
    Break,
    Continue,
    Return(Value),
}

// ─── Interpreter ──────────────────────────────────────────────────────────────

pub struct Interpreter<W: Write> {
    env: Environment,
    out: W,
    signal: Signal,
    call_depth: usize,
    max_call_depth: usize,
}

impl<W: Write> Interpreter<W> {
    pub fn new(out: W) -> Self {
        Self {
            env: Environment::default(),
            out,
            signal: Signal::Normal,
            call_depth: 0,
            max_call_depth: MAX_CALL_DEPTH,
        }
    }

    /// Choose how same-frame redefinition is handled. Resets all bindings,
    /// so call this before interpreting anything.
    pub fn with_scope_policy(mut self, policy: ScopePolicy) -> Self {
        self.env = Environment::new(policy);
        self
    }

    /// Limit how deeply script functions may nest calls.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn scope_policy(&self) -> ScopePolicy {
        self.env.policy()
    }

    /// Run a program. Globals persist across calls, so a host can feed the
    /// interpreter one chunk at a time.
    pub fn interpret(&mut self, stmts: &[Stmt]) -> Result<(), Error> {
        tracing::debug!(statements = stmts.len(), "interpreting");
        self.signal = Signal::Normal;
        let result = self.exec_all(stmts);
        // a top-level `return` only ends the current chunk
        self.signal = Signal::Normal;
        result
    }

    /// Read a binding visible from the top level.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.env.get(name).ok()
    }

    pub fn into_output(self) -> W {
        self.out
    }

    // ─── Statement executor ───────────────────────────────────────────────────

    fn exec_all(&mut self, stmts: &[Stmt]) -> Result<(), Error> {
        for stmt in stmts {
            if self.signal != Signal::Normal { break; }
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    pub fn exec_stmt(&mut self, stmt: &Stmt) -> Result<(), Error> {
        stack::ensure_sufficient_stack(|| self.exec_stmt_inner(stmt))
    }

    fn exec_stmt_inner(&mut self, stmt: &Stmt) -> Result<(), Error> {
        if self.signal != Signal::Normal {
            return Ok(());
        }

        match stmt {
            Stmt::Expr(e) => { self.eval_expr(e)?; }

            Stmt::Print(e, span) => {
                let value = self.eval_expr(e)?;
                writeln!(self.out, "{value}").map_err(|err| {
                    Error::new(ErrorCode::R006, span.line, span.column,
                        format!("Failed to write output: {err}."))
                })?;
            }

            Stmt::Var(v) => {
                let value = match &v.initializer {
                    Some(init) => self.eval_expr(init)?,
                    None => Value::Nil,
                };
                self.define(&v.name, value, v.span)?;
            }

            Stmt::Block(stmts) => {
                let parent = self.env.current();
                self.in_frame(parent, |this| this.exec_all(stmts))?;
            }

            Stmt::If(i) => {
                if self.eval_expr(&i.condition)?.is_truthy() {
                    self.exec_stmt(&i.then_branch)?;
                } else if let Some(else_branch) = &i.else_branch {
                    self.exec_stmt(else_branch)?;
                }
            }

            Stmt::While(w) => self.exec_while(w)?,

            Stmt::Break(_)    => self.signal = Signal::Break,
            Stmt::Continue(_) => self.signal = Signal::Continue,

            Stmt::Function(decl) => {
                let function = self.env.closure(Rc::clone(decl));
                self.define(&decl.name, Value::Function(function), decl.span)?;
            }

            Stmt::Return(expr, _) => {
                let value = match expr {
                    Some(e) => self.eval_expr(e)?,
                    None => Value::Nil,
                };
                self.signal = Signal::Return(value);
            }
        }
        Ok(())
    }

    fn exec_while(&mut self, w: &WhileStmt) -> Result<(), Error> {
        while self.eval_expr(&w.condition)?.is_truthy() {
            self.exec_stmt(&w.body)?;
            match self.signal {
                Signal::Break => {
                    self.signal = Signal::Normal;
                    break;
                }
                Signal::Continue => self.signal = Signal::Normal,
                Signal::Return(_) => break,
                Signal::Normal => {}
            }
            if let Some(increment) = &w.increment {
                self.eval_expr(increment)?;
            }
        }
        Ok(())
    }

    /// Run `body` inside a fresh frame chained to `parent`. The previous
    /// innermost frame is restored on every exit path.
    fn in_frame<T>(
        &mut self,
        parent: FrameId,
        body: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let frame = self.env.push(parent);
        let caller = self.env.enter(frame);
        let result = body(self);
        self.env.enter(caller);
        self.env.release(frame);
        result
    }

    fn define(&mut self, name: &str, value: Value, span: Span) -> Result<(), Error> {
        self.env.define(name, value).map_err(|e| scope_error(e, span))
    }

    // ─── Expression evaluator ─────────────────────────────────────────────────

    pub fn eval_expr(&mut self, expr: &Expr) -> Result<Value, Error> {
        stack::ensure_sufficient_stack(|| self.eval_expr_inner(expr))
    }

    fn eval_expr_inner(&mut self, expr: &Expr) -> Result<Value, Error> {
        match expr {
            Expr::Literal(lit, _) => Ok(Value::from(lit)),

            Expr::Grouping(inner, _) => self.eval_expr(inner),

            Expr::Variable(name, span) => {
                self.env.get(name).map_err(|e| scope_error(e, *span))
            }

            Expr::Assign { name, value, span } => {
                let value = self.eval_expr(value)?;
                self.env.assign(name, value.clone()).map_err(|e| scope_error(e, *span))?;
                Ok(value)
            }

            Expr::Unary { op, operand, span } => {
                let v = self.eval_expr(operand)?;
                eval_unop(*op, v, *span)
            }

            Expr::Binary { left, op, right, span } => {
                let l = self.eval_expr(left)?;
                let r = self.eval_expr(right)?;
                eval_binop(*op, l, r, *span)
            }

            // yields whichever operand decided the result
            Expr::Logical { left, op, right, .. } => {
                let l = self.eval_expr(left)?;
                match op {
                    LogicalOp::Or  if l.is_truthy()  => Ok(l),
                    LogicalOp::And if !l.is_truthy() => Ok(l),
                    _ => self.eval_expr(right),
                }
            }

            Expr::Call { callee, args, span } => {
                let callee = self.eval_expr(callee)?;
                let arg_vals: Vec<Value> = args.iter()
                    .map(|a| self.eval_expr(a))
                    .collect::<Result<_, _>>()?;
                self.call(&callee, arg_vals, *span)
            }
        }
    }

    // ─── Calls ────────────────────────────────────────────────────────────────

    fn call(&mut self, callee: &Value, args: Vec<Value>, span: Span) -> Result<Value, Error> {
        let Value::Function(function) = callee else {
            return Err(Error::new(ErrorCode::R004, span.line, span.column,
                format!("Can only call functions, not {}.", callee.type_name())));
        };
        if args.len() != function.arity() {
            return Err(Error::new(ErrorCode::R005, span.line, span.column, format!(
                "'{}' expects {} arguments but got {}.", function.name(), function.arity(), args.len()
            )));
        }
        if self.call_depth >= self.max_call_depth {
            return Err(Error::new(ErrorCode::R007, span.line, span.column, format!(
                "Stack overflow: more than {} nested calls.", self.max_call_depth
            )));
        }
        tracing::trace!(function = function.name(), depth = self.call_depth, line = span.line, "call");

        // the caller's loop or return state is invisible inside the callee
        let saved = std::mem::take(&mut self.signal);
        let function = Rc::clone(function);
        self.call_depth += 1;
        let result = self.in_frame(function.closure, |this| {
            for (param, arg) in function.decl.params.iter().zip(args) {
                this.define(&param.name, arg, param.span)?;
            }
            this.exec_all(&function.decl.body)
        });
        self.call_depth -= 1;
        let signal = std::mem::replace(&mut self.signal, saved);
        result?;

        Ok(match signal {
            Signal::Return(value) => value,
            _ => Value::Nil,
        })
    }
}

// ─── Operators ────────────────────────────────────────────────────────────────

fn eval_binop(op: BinOp, l: Value, r: Value, span: Span) -> Result<Value, Error> {
    use Value::{Bool, Number, Str};

    match (op, l, r) {
        (BinOp::Eq, l, r)    => Ok(Bool(l == r)),
        (BinOp::NotEq, l, r) => Ok(Bool(l != r)),

        (BinOp::Add, Number(a), Number(b)) => Ok(Number(a + b)),
        (BinOp::Add, Str(a), Str(b))       => Ok(Str(a + &b)),
        (BinOp::Add, l, r) => Err(type_error(span, format!(
            "Operands of '+' must be two numbers or two strings, got {} and {}.",
            l.type_name(), r.type_name()
        ))),

        (BinOp::Sub, Number(a), Number(b))  => Ok(Number(a - b)),
        (BinOp::Mul, Number(a), Number(b))  => Ok(Number(a * b)),
        (BinOp::Div, Number(a), Number(b))  => Ok(Number(a / b)),
        (BinOp::Lt, Number(a), Number(b))   => Ok(Bool(a < b)),
        (BinOp::LtEq, Number(a), Number(b)) => Ok(Bool(a <= b)),
        (BinOp::Gt, Number(a), Number(b))   => Ok(Bool(a > b)),
        (BinOp::GtEq, Number(a), Number(b)) => Ok(Bool(a >= b)),

        (op, l, r) => Err(type_error(span, format!(
            "Operands of '{}' must be numbers, got {} and {}.",
            op.symbol(), l.type_name(), r.type_name()
        ))),
    }
}

fn eval_unop(op: UnOp, v: Value, span: Span) -> Result<Value, Error> {
    match op {
        UnOp::Not => Ok(Value::Bool(!v.is_truthy())),
        UnOp::Neg => match v {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(type_error(span, format!(
                "Operand of '-' must be a number, got {}.", other.type_name()
            ))),
        },
    }
}

fn type_error(span: Span, message: String) -> Error {
    Error::new(ErrorCode::R003, span.line, span.column, message)
}

fn scope_error(err: ScopeError, span: Span) -> Error {
    let code = match err {
        ScopeError::Undefined(_) => ErrorCode::R001,
        ScopeError::Duplicate(_) => ErrorCode::R002,
    };
    Error::new(code, span.line, span.column, err.to_string())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
