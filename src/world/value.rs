//! Representation of Scheme values
use core::fmt;
use std::rc::Rc;

use lasso::Rodeo;

use crate::{
    compiler::ast::Name,
    gast::{
        Abbreviation, AbbreviationKind, Boolean, Character, Datum, DatumVisitor, GAstNode,
        GAstToken, List, Number, StringToken, Symbol,
    },
    lexer::Span,
    runtime::Procedure,
};

// For now, we only support exact integers
pub type Integer = i64;

// Type that stores all possible values!
#[derive(Clone, Default, Debug, PartialEq)]
pub enum Value {
    // This is the value written as ()
    #[default]
    Null,
    // the return value of set! and definitions
    Void,
    Number(Integer),
    // The Rc is so that we don't have to pay to clone the string
    String(Rc<str>),
    // the value of '<ident> (quote <ident>)
    Symbol(Name),
    Bool(bool),
    Char(char),
    Pair(Rc<Pair>),
    // Represents something runnable
    Procedure(Procedure),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

impl Drop for Pair {
    // unlink the spine one cell at a time, so long lists do not drop recursively
    fn drop(&mut self) {
        let mut next = std::mem::take(&mut self.cdr);
        while let Value::Pair(pair) = next {
            match Rc::try_unwrap(pair) {
                Ok(mut pair) => next = std::mem::take(&mut pair.cdr),
                Err(_) => break,
            }
        }
    }
}

impl Value {
    /// Everything except `#f` counts as true
    pub fn is_true(&self) -> bool {
        !matches!(self, Self::Bool(false))
    }

    pub fn as_number(&self) -> Option<Integer> {
        match self {
            Self::Number(int) => Some(*int),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<&Pair> {
        match self {
            Self::Pair(pair) => Some(pair),
            _ => None,
        }
    }

    pub fn cons(car: Value, cdr: Value) -> Self {
        Self::Pair(Rc::new(Pair { car, cdr }))
    }

    /// Builds a proper list out of `items`.
    pub fn list(items: impl IntoIterator<Item = Value, IntoIter: DoubleEndedIterator>) -> Self {
        Self::improper_list(items, Value::Null)
    }

    pub fn improper_list(
        items: impl IntoIterator<Item = Value, IntoIter: DoubleEndedIterator>,
        tail: Value,
    ) -> Self {
        items
            .into_iter()
            .rev()
            .fold(tail, |cdr, car| Value::cons(car, cdr))
    }

    /// Whether this is a chain of pairs ending in `()`
    pub fn is_list(&self) -> bool {
        let mut current = self;
        loop {
            match current {
                Self::Null => return true,
                Self::Pair(pair) => current = &pair.cdr,
                _ => return false,
            }
        }
    }

    /// Identity comparison, as done by `eq?`
    ///
    /// Strings and pairs are only `eq?` to themselves, everything else compares by value.
    pub fn is_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => Rc::ptr_eq(a, b),
            (Self::Pair(a), Self::Pair(b)) => Rc::ptr_eq(a, b),
            (a, b) => a == b,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Void => "void",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Bool(_) => "boolean",
            Self::Char(_) => "character",
            Self::Pair(_) => "pair",
            Self::Procedure(_) => "procedure",
        }
    }

    /// Symbols need the interner to be shown, so displaying goes through it
    pub fn display<'a>(&'a self, rodeo: &'a Rodeo) -> ValueDisplay<'a> {
        ValueDisplay { value: self, rodeo }
    }
}

pub struct ValueDisplay<'a> {
    value: &'a Value,
    rodeo: &'a Rodeo,
}

/// Writes an identifier, piping it if it could not be read back as one.
fn write_identifier(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    // Rough and fast rules for escaping
    if !name.is_empty()
        && name.chars().enumerate().all(|(idx, c)| {
            if idx == 0 {
                c.is_ascii_alphabetic() || "!$%&*/:<=>?^_~".contains(c)
            } else {
                c.is_ascii_alphanumeric() || "!$%&*/:<=>?^_~+-.@".contains(c)
            }
        })
        || matches!(name, "+" | "-" | "...")
    {
        write!(f, "{name}")
    } else {
        write!(f, "|{}|", name.replace('\\', r"\\").replace('|', r"\|"))
    }
}

fn write_char(f: &mut fmt::Formatter<'_>, c: char) -> fmt::Result {
    match c {
        ' ' => write!(f, r"#\space"),
        '\n' => write!(f, r"#\newline"),
        '\t' => write!(f, r"#\tab"),
        '\r' => write!(f, r"#\return"),
        '\0' => write!(f, r"#\null"),
        '\x07' => write!(f, r"#\alarm"),
        '\x08' => write!(f, r"#\backspace"),
        '\x7f' => write!(f, r"#\delete"),
        '\x1b' => write!(f, r"#\escape"),
        c if c.is_control() => write!(f, r"#\x{:x}", c as u32),
        c => write!(f, r"#\{c}"),
    }
}

fn write_string(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, r"\\")?,
            '\n' => write!(f, r"\n")?,
            '\t' => write!(f, r"\t")?,
            '\r' => write!(f, r"\r")?,
            c if c.is_control() => write!(f, r"\x{:x};", c as u32)?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

impl<'a> ValueDisplay<'a> {
    fn with(&self, value: &'a Value) -> Self {
        Self {
            value,
            rodeo: self.rodeo,
        }
    }
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Null => write!(f, "()"),
            Value::Void => write!(f, "#<undef>"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write_string(f, s),
            Value::Symbol(name) => write_identifier(f, self.rodeo.resolve(&name.spur())),
            Value::Bool(true) => write!(f, "#t"),
            Value::Bool(false) => write!(f, "#f"),
            Value::Char(c) => write_char(f, *c),
            Value::Pair(pair) => {
                write!(f, "({}", self.with(&pair.car))?;
                let mut rest = &pair.cdr;
                loop {
                    match rest {
                        Value::Null => break,
                        Value::Pair(next) => {
                            write!(f, " {}", self.with(&next.car))?;
                            rest = &next.cdr;
                        }
                        tail => {
                            write!(f, " . {}", self.with(tail))?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Value::Procedure(procedure) => match procedure.name(self.rodeo) {
                Some(name) => write!(f, "#<procedure {name}>"),
                None => write!(f, "#<procedure>"),
            },
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("malformed datum at {}..{}", span.start, span.end)]
pub struct ValueConvertError {
    pub span: Span,
}

/// Turns quoted source data into values
pub struct ValueConvert<'r> {
    interner: &'r mut Rodeo,
    fold_case: bool,
    value_stack: Vec<Result<Value, ValueConvertError>>,
}

impl<'r> ValueConvert<'r> {
    pub fn new(interner: &'r mut Rodeo, fold_case: bool) -> Self {
        Self {
            interner,
            fold_case,
            value_stack: vec![],
        }
    }

    pub fn convert(&mut self, datum: &Datum) -> Result<Value, ValueConvertError> {
        let depth = self.value_stack.len();
        self.visit_datum(datum);
        if self.value_stack.len() > depth {
            self.value_stack
                .pop()
                .unwrap_or(Err(ValueConvertError { span: datum.span() }))
        } else {
            // the visitor pushes nothing for datum it cannot classify
            Err(ValueConvertError { span: datum.span() })
        }
    }

    fn list_value(&mut self, list: &List) -> Result<Value, ValueConvertError> {
        let (proper, tail) = list.split_dot();
        let items = proper
            .iter()
            .map(|datum| self.convert(datum))
            .collect::<Result<Vec<_>, _>>()?;
        let tail = match tail {
            Some(tail) => self.convert(&tail)?,
            None => Value::Null,
        };
        Ok(Value::improper_list(items, tail))
    }

    fn abbreviation_value(&mut self, abbrev: &Abbreviation) -> Result<Value, ValueConvertError> {
        let malformed = || ValueConvertError { span: abbrev.span() };
        let kind = abbrev.kind().ok_or_else(malformed)?;
        let inner = abbrev.inner().ok_or_else(malformed)?;
        let inner = self.convert(&inner)?;
        let head = match kind {
            AbbreviationKind::Quote => self.interner.get_or_intern_static("quote"),
        };
        Ok(Value::list([Value::Symbol(Name::from(head)), inner]))
    }

    fn push(&mut self, value: Option<Value>, span: Span) {
        self.value_stack.push(value.ok_or(ValueConvertError { span }));
    }
}

impl DatumVisitor for ValueConvert<'_> {
    fn visit_list(&mut self, list: &List) {
        let value = self.list_value(list);
        self.value_stack.push(value);
    }

    fn visit_abbreviation(&mut self, abbreviation: &Abbreviation) {
        let value = self.abbreviation_value(abbreviation);
        self.value_stack.push(value);
    }

    fn visit_symbol(&mut self, symbol: &Symbol) {
        let value = symbol
            .identifier(self.fold_case)
            .map(|id| Value::Symbol(Name::from(self.interner.get_or_intern(id))));
        self.push(value, symbol.span());
    }

    fn visit_number(&mut self, number: &Number) {
        self.push(number.number().map(Value::Number), number.span());
    }

    fn visit_string(&mut self, string: &StringToken) {
        self.push(string.string().map(|s| Value::String(Rc::from(s))), string.span());
    }

    fn visit_char(&mut self, char: &Character) {
        self.push(char.char().map(Value::Char), char.span());
    }

    fn visit_bool(&mut self, bool: &Boolean) {
        self.push(bool.bool().map(Value::Bool), bool.span());
    }
}
