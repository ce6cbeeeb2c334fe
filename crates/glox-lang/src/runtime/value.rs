use std::fmt;
use std::rc::Rc;

use crate::runtime::environment::FrameId;
use crate::syntax::ast::{FunDecl, Literal};

#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
    Nil,
    Function(Rc<Function>),
}

/// A declared function together with the frame it was declared in.
#[derive(Debug)]
pub struct Function {
    pub decl: Rc<FunDecl>,
    pub closure: FrameId,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn arity(&self) -> usize {
        self.decl.params.len()
    }
}

impl Value {
    /// `nil` and `false` are falsy; everything else, `0` and `""` included,
    /// is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_)   => "number",
            Value::Str(_)      => "string",
            Value::Bool(_)     => "boolean",
            Value::Nil         => "nil",
            Value::Function(_) => "function",
        }
    }
}

impl PartialEq for Value {
    /// Same tag and same payload. Functions compare by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b))     => a == b,
            (Value::Str(a), Value::Str(b))           => a == b,
            (Value::Bool(a), Value::Bool(b))         => a == b,
            (Value::Nil, Value::Nil)                 => true,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n)   => write!(f, "{n}"),
            Value::Str(s)      => f.write_str(s),
            Value::Bool(b)     => write!(f, "{b}"),
            Value::Nil         => f.write_str("nil"),
            Value::Function(func) => write!(f, "<fun ${}>", func.name()),
        }
    }
}

impl From<&Literal> for Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Number(n) => Value::Number(*n),
            Literal::Str(s)    => Value::Str(s.clone()),
            Literal::Bool(b)   => Value::Bool(*b),
            Literal::Nil       => Value::Nil,
        }
    }
}
