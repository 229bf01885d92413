//! The fixed table of primitive operators.
//!
//! Primitives only ever see already evaluated arguments and never call back into the
//! interpreter.
use std::rc::Rc;

use arbitrary::Arbitrary;

use crate::{
    runtime::{Arity, Procedure},
    value::{Integer, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Arbitrary)]
pub enum PrimOp {
    Add,
    Sub,
    Mul,
    Div,
    NumEq,
    Lt,
    Gt,
    Le,
    Ge,
    Not,
    And,
    Or,
    Eq,
    StringEq,
    Cons,
    Car,
    Cdr,
    List,
    IsPair,
    IsNull,
    IsList,
    IsNumber,
    IsBoolean,
    IsSymbol,
    IsString,
    IsProcedure,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PrimitiveError {
    #[error("{name}: expected {expected} argument(s), got {got}")]
    Arity {
        name: &'static str,
        expected: Arity,
        got: usize,
    },
    #[error("{name}: expected a {expected}, got a {got}")]
    Type {
        name: &'static str,
        expected: &'static str,
        got: &'static str,
    },
    #[error("{0}: division by zero")]
    DivideByZero(&'static str),
    #[error("{0}: integer overflow")]
    Overflow(&'static str),
}

impl PrimOp {
    pub const ALL: [PrimOp; 26] = [
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::NumEq,
        Self::Lt,
        Self::Gt,
        Self::Le,
        Self::Ge,
        Self::Not,
        Self::And,
        Self::Or,
        Self::Eq,
        Self::StringEq,
        Self::Cons,
        Self::Car,
        Self::Cdr,
        Self::List,
        Self::IsPair,
        Self::IsNull,
        Self::IsList,
        Self::IsNumber,
        Self::IsBoolean,
        Self::IsSymbol,
        Self::IsString,
        Self::IsProcedure,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::NumEq => "=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Not => "not",
            Self::And => "and",
            Self::Or => "or",
            Self::Eq => "eq?",
            Self::StringEq => "string=?",
            Self::Cons => "cons",
            Self::Car => "car",
            Self::Cdr => "cdr",
            Self::List => "list",
            Self::IsPair => "pair?",
            Self::IsNull => "null?",
            Self::IsList => "list?",
            Self::IsNumber => "number?",
            Self::IsBoolean => "boolean?",
            Self::IsSymbol => "symbol?",
            Self::IsString => "string?",
            Self::IsProcedure => "procedure?",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn arity(self) -> Arity {
        match self {
            Self::Add | Self::Mul | Self::And | Self::Or | Self::List => Arity::Min(0),
            Self::Sub
            | Self::Div
            | Self::NumEq
            | Self::Lt
            | Self::Gt
            | Self::Le
            | Self::Ge => Arity::Min(1),
            Self::Eq | Self::StringEq | Self::Cons => Arity::Exact(2),
            Self::Not
            | Self::Car
            | Self::Cdr
            | Self::IsPair
            | Self::IsNull
            | Self::IsList
            | Self::IsNumber
            | Self::IsBoolean
            | Self::IsSymbol
            | Self::IsString
            | Self::IsProcedure => Arity::Exact(1),
        }
    }

    pub fn apply(self, args: &[Value]) -> Result<Value, PrimitiveError> {
        let name = self.name();
        let expected = self.arity();
        if !expected.is_satisfied(args.len()) {
            return Err(PrimitiveError::Arity {
                name,
                expected,
                got: args.len(),
            });
        }

        match self {
            Self::Add => fold_numbers(name, args, 0, Integer::checked_add),
            Self::Mul => fold_numbers(name, args, 1, Integer::checked_mul),
            Self::Sub => match numbers(name, args)?.as_slice() {
                [x] => x.checked_neg().map(Value::Number).ok_or(PrimitiveError::Overflow(name)),
                [first, rest @ ..] => rest
                    .iter()
                    .try_fold(*first, |acc, x| acc.checked_sub(*x))
                    .map(Value::Number)
                    .ok_or(PrimitiveError::Overflow(name)),
                [] => unreachable!("arity was checked"),
            },
            Self::Div => match numbers(name, args)?.as_slice() {
                [x] => divide(name, 1, *x).map(Value::Number),
                [first, rest @ ..] => rest
                    .iter()
                    .try_fold(*first, |acc, x| divide(name, acc, *x))
                    .map(Value::Number),
                [] => unreachable!("arity was checked"),
            },
            Self::NumEq => compare(name, args, |a, b| a == b),
            Self::Lt => compare(name, args, |a, b| a < b),
            Self::Gt => compare(name, args, |a, b| a > b),
            Self::Le => compare(name, args, |a, b| a <= b),
            Self::Ge => compare(name, args, |a, b| a >= b),
            Self::Not => Ok(Value::Bool(!args[0].is_true())),
            Self::And => Ok(match args.iter().find(|v| !v.is_true()) {
                Some(falsy) => falsy.clone(),
                None => args.last().cloned().unwrap_or(Value::Bool(true)),
            }),
            Self::Or => Ok(args
                .iter()
                .find(|v| v.is_true())
                .cloned()
                .unwrap_or(Value::Bool(false))),
            Self::Eq => Ok(Value::Bool(args[0].is_eq(&args[1]))),
            Self::StringEq => {
                let a = string(name, &args[0])?;
                let b = string(name, &args[1])?;
                Ok(Value::Bool(a == b))
            }
            Self::Cons => Ok(Value::cons(args[0].clone(), args[1].clone())),
            Self::Car => Ok(pair(name, &args[0])?.car.clone()),
            Self::Cdr => Ok(pair(name, &args[0])?.cdr.clone()),
            Self::List => Ok(Value::list(args.iter().cloned())),
            Self::IsPair => Ok(Value::Bool(matches!(args[0], Value::Pair(_)))),
            Self::IsNull => Ok(Value::Bool(matches!(args[0], Value::Null))),
            Self::IsList => Ok(Value::Bool(args[0].is_list())),
            Self::IsNumber => Ok(Value::Bool(matches!(args[0], Value::Number(_)))),
            Self::IsBoolean => Ok(Value::Bool(matches!(args[0], Value::Bool(_)))),
            Self::IsSymbol => Ok(Value::Bool(matches!(args[0], Value::Symbol(_)))),
            Self::IsString => Ok(Value::Bool(matches!(args[0], Value::String(_)))),
            Self::IsProcedure => Ok(Value::Bool(matches!(args[0], Value::Procedure(_)))),
        }
    }
}

impl From<PrimOp> for Procedure {
    fn from(value: PrimOp) -> Self {
        Procedure::Primitive(value)
    }
}

fn number(name: &'static str, value: &Value) -> Result<Integer, PrimitiveError> {
    value.as_number().ok_or(PrimitiveError::Type {
        name,
        expected: "number",
        got: value.type_name(),
    })
}

fn numbers(name: &'static str, args: &[Value]) -> Result<Vec<Integer>, PrimitiveError> {
    args.iter().map(|arg| number(name, arg)).collect()
}

fn string<'v>(name: &'static str, value: &'v Value) -> Result<&'v Rc<str>, PrimitiveError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(PrimitiveError::Type {
            name,
            expected: "string",
            got: other.type_name(),
        }),
    }
}

fn pair<'v>(name: &'static str, value: &'v Value) -> Result<&'v crate::value::Pair, PrimitiveError> {
    value.as_pair().ok_or(PrimitiveError::Type {
        name,
        expected: "pair",
        got: value.type_name(),
    })
}

fn fold_numbers(
    name: &'static str,
    args: &[Value],
    init: Integer,
    op: fn(Integer, Integer) -> Option<Integer>,
) -> Result<Value, PrimitiveError> {
    numbers(name, args)?
        .into_iter()
        .try_fold(init, op)
        .map(Value::Number)
        .ok_or(PrimitiveError::Overflow(name))
}

// truncates toward zero
fn divide(name: &'static str, a: Integer, b: Integer) -> Result<Integer, PrimitiveError> {
    if b == 0 {
        return Err(PrimitiveError::DivideByZero(name));
    }
    a.checked_div(b).ok_or(PrimitiveError::Overflow(name))
}

fn compare(
    name: &'static str,
    args: &[Value],
    op: fn(&Integer, &Integer) -> bool,
) -> Result<Value, PrimitiveError> {
    let numbers = numbers(name, args)?;
    Ok(Value::Bool(numbers.windows(2).all(|w| op(&w[0], &w[1]))))
}
