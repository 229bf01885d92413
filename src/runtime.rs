//! runtimes are responsible for executing programs against a world's store and environments
use core::fmt;
use std::rc::Rc;

use lasso::Rodeo;

use crate::{
    compiler::ast::Lambda,
    runtime::{environment::EnvId, primitives::PrimitiveError, store::AddressError},
};

pub mod environment;
pub mod interpreter;
pub mod primitives;
pub mod stack;
pub mod store;

use primitives::PrimOp;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unbound variable: {0}")]
    UnboundVariable(Box<str>),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("empty program")]
    EmptyProgram,
    #[error("bad procedure: {0}")]
    BadProcedure(Box<str>),
    #[error(transparent)]
    Primitive(#[from] PrimitiveError),
    #[error("procedure expected {expected} argument(s), got {got}")]
    ArityMismatch { expected: Arity, got: usize },
    #[error("out of fuel")]
    OutOfFuel,
    #[error("recursion limit of {0} exceeded")]
    RecursionLimit(usize),
}

#[derive(Debug, Clone)]
pub enum Procedure {
    Primitive(PrimOp),
    Closure(Rc<Closure>),
}

impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Primitive(a), Self::Primitive(b)) => a == b,
            // closures are only equal to themselves
            (Self::Closure(a), Self::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Procedure {
    // report the arity of a procedure
    pub fn arity(&self) -> Arity {
        match self {
            Self::Primitive(op) => op.arity(),
            Self::Closure(closure) => Arity::Exact(closure.lambda.params.len()),
        }
    }

    pub fn name<'r>(&self, rodeo: &'r Rodeo) -> Option<&'r str> {
        match self {
            Self::Primitive(op) => Some(op.name()),
            Self::Closure(closure) => closure.lambda.name.map(|name| rodeo.resolve(&name.spur())),
        }
    }
}

/// A lambda together with the environment it was evaluated in
#[derive(Debug)]
pub struct Closure {
    pub lambda: Rc<Lambda>,
    pub env: EnvId,
}

/// Procedure arity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Min(usize),
}

impl Arity {
    pub fn is_satisfied(&self, len: usize) -> bool {
        match self {
            Self::Exact(e) => *e == len,
            Self::Min(m) => *m <= len,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(e) => write!(f, "exactly {e}"),
            Self::Min(m) => write!(f, "at least {m}"),
        }
    }
}
