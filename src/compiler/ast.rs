//! The expression tree the interpreter walks
use std::rc::Rc;

use lasso::Spur;

use crate::{
    runtime::primitives::PrimOp,
    value::{Integer, Value},
};

/// An interned identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Name(Spur);

impl Name {
    pub fn spur(self) -> Spur {
        self.0
    }
}

impl From<Spur> for Name {
    fn from(value: Spur) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
    Number(Integer),
    Bool(bool),
    String(Rc<str>),
    Char(char),
    /// `(quote <datum>)`, already converted into a value
    Quote(Value),
    PrimOp(PrimOp),
    Var(Name),
    If(Box<If>),
    Lambda(Rc<Lambda>),
    App(Box<App>),
    Let(Box<Let>),
    Set(Box<Set>),
    /// Only valid as an element of a body or of a program.
    Define(Box<Define>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub test: Exp,
    pub then: Exp,
    pub alt: Option<Exp>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Box<[Name]>,
    pub body: Box<[Exp]>,
    /// Set when the lambda was created by `(define (name ...) ...)`
    pub name: Option<Name>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct App {
    pub operator: Exp,
    pub operands: Box<[Exp]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: Name,
    pub init: Exp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Let {
    pub bindings: Box<[Binding]>,
    pub body: Box<[Exp]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Set {
    pub name: Name,
    pub value: Exp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Define {
    pub name: Name,
    pub value: Exp,
}
