//! Lowering turns the datum of a parsed module into [`Exp`]s, checking the shape of every
//! special form on the way.
use std::rc::Rc;

use lasso::Rodeo;

use crate::{
    compiler::ast::{App, Binding, Define, Exp, If, Lambda, Let, Name, Set},
    gast::{ContainsDatum, Datum, DatumKind, GAstNode, List, Module},
    lexer::Span,
    runtime::primitives::PrimOp,
    value::{ValueConvert, ValueConvertError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialForm {
    Quote,
    If,
    Lambda,
    Let,
    SetBang,
    Define,
}

impl SpecialForm {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "quote" => Self::Quote,
            "if" => Self::If,
            "lambda" => Self::Lambda,
            "let" => Self::Let,
            "set!" => Self::SetBang,
            "define" => Self::Define,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::If => "if",
            Self::Lambda => "lambda",
            Self::Let => "let",
            Self::SetBang => "set!",
            Self::Define => "define",
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LowerErrorKind {
    #[error("malformed datum")]
    Malformed,
    #[error("empty application `()`")]
    EmptyApplication,
    #[error("dotted list in expression position")]
    DottedExpression,
    #[error("bad `{form}` syntax, expected {expected}")]
    BadSyntax {
        form: &'static str,
        expected: &'static str,
    },
    #[error("expected an identifier")]
    ExpectedIdentifier,
    #[error("`{0}` is bound more than once")]
    DuplicateName(Box<str>),
    #[error("`{0}` is reserved and cannot be rebound")]
    ReservedName(Box<str>),
    #[error("keyword `{0}` used as an expression")]
    KeywordAsExpression(Box<str>),
    #[error("definitions are only allowed at the top level or in a body")]
    DefinitionInExpression,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{kind} at {}..{}", span.start, span.end)]
pub struct LowerError {
    pub span: Span,
    pub kind: LowerErrorKind,
}

impl From<ValueConvertError> for LowerError {
    fn from(value: ValueConvertError) -> Self {
        Self {
            span: value.span,
            kind: LowerErrorKind::Malformed,
        }
    }
}

/// Lowers every top-level datum of `module`, in order.
pub fn lower_module(
    module: &Module,
    rodeo: &mut Rodeo,
    fold_case: bool,
) -> Result<Vec<Exp>, LowerError> {
    let mut lowerer = Lowerer { rodeo, fold_case };
    module
        .datum()
        .map(|datum| lowerer.form(&datum))
        .collect()
}

struct Lowerer<'r> {
    rodeo: &'r mut Rodeo,
    fold_case: bool,
}

fn error<T>(span: Span, kind: LowerErrorKind) -> Result<T, LowerError> {
    Err(LowerError { span, kind })
}

fn bad_syntax<T>(span: Span, form: SpecialForm, expected: &'static str) -> Result<T, LowerError> {
    error(
        span,
        LowerErrorKind::BadSyntax {
            form: form.name(),
            expected,
        },
    )
}

impl Lowerer<'_> {
    /// A body or top-level form, where definitions are allowed
    fn form(&mut self, datum: &Datum) -> Result<Exp, LowerError> {
        if let Some(list) = datum.as_list() {
            if self.special_form(&list) == Some(SpecialForm::Define) {
                return self.define(&list);
            }
        }
        self.expression(datum)
    }

    fn body(
        &mut self,
        forms: &[Datum],
        span: Span,
        form: SpecialForm,
    ) -> Result<Box<[Exp]>, LowerError> {
        if forms.is_empty() {
            return bad_syntax(span, form, "a non-empty body");
        }
        forms.iter().map(|datum| self.form(datum)).collect()
    }

    fn expression(&mut self, datum: &Datum) -> Result<Exp, LowerError> {
        let malformed = || LowerError {
            span: datum.span(),
            kind: LowerErrorKind::Malformed,
        };
        let kind = datum.kind().ok_or_else(malformed)?;
        Ok(match kind {
            DatumKind::Number => Exp::Number(
                datum
                    .as_number()
                    .and_then(|n| n.number())
                    .ok_or_else(malformed)?,
            ),
            DatumKind::Boolean => {
                Exp::Bool(datum.as_bool().and_then(|b| b.bool()).ok_or_else(malformed)?)
            }
            DatumKind::Character => {
                Exp::Char(datum.as_char().and_then(|c| c.char()).ok_or_else(malformed)?)
            }
            DatumKind::StringToken => Exp::String(Rc::from(
                datum
                    .as_string()
                    .and_then(|s| s.string())
                    .ok_or_else(malformed)?,
            )),
            // `'<datum>` is the only abbreviation, and stands for `(quote <datum>)`
            DatumKind::Abbreviation => {
                let quoted = datum
                    .as_abbreviation()
                    .and_then(|abbrev| abbrev.inner())
                    .ok_or_else(malformed)?;
                Exp::Quote(ValueConvert::new(self.rodeo, self.fold_case).convert(&quoted)?)
            }
            DatumKind::Symbol => self.variable(datum)?,
            DatumKind::List => {
                let list = datum.as_list().ok_or_else(malformed)?;
                self.list(&list)?
            }
        })
    }

    fn identifier(&self, datum: &Datum) -> Result<Box<str>, LowerError> {
        datum
            .as_symbol()
            .and_then(|symbol| symbol.identifier(self.fold_case))
            .ok_or(LowerError {
                span: datum.span(),
                kind: LowerErrorKind::ExpectedIdentifier,
            })
    }

    fn variable(&mut self, datum: &Datum) -> Result<Exp, LowerError> {
        let id = self.identifier(datum)?;
        if let Some(op) = PrimOp::from_name(&id) {
            Ok(Exp::PrimOp(op))
        } else if SpecialForm::from_name(&id).is_some() {
            error(datum.span(), LowerErrorKind::KeywordAsExpression(id))
        } else {
            Ok(Exp::Var(Name::from(self.rodeo.get_or_intern(id))))
        }
    }

    /// A name introduced by a binding form
    fn binder(&mut self, datum: &Datum) -> Result<Name, LowerError> {
        let id = self.identifier(datum)?;
        if PrimOp::from_name(&id).is_some() || SpecialForm::from_name(&id).is_some() {
            return error(datum.span(), LowerErrorKind::ReservedName(id));
        }
        Ok(Name::from(self.rodeo.get_or_intern(id)))
    }

    /// Binders of a single frame, which must all be distinct
    fn distinct_binders<'d>(
        &mut self,
        datums: impl IntoIterator<Item = &'d Datum>,
    ) -> Result<Vec<Name>, LowerError> {
        let mut names: Vec<Name> = vec![];
        for datum in datums {
            let name = self.binder(datum)?;
            if names.contains(&name) {
                let id = self.rodeo.resolve(&name.spur());
                return error(datum.span(), LowerErrorKind::DuplicateName(Box::from(id)));
            }
            names.push(name);
        }
        Ok(names)
    }

    fn special_form(&self, list: &List) -> Option<SpecialForm> {
        let head = list.head()?.as_symbol()?;
        SpecialForm::from_name(&head.identifier(self.fold_case)?)
    }

    /// The elements of a list that has to be proper
    fn proper(
        list: &List,
        form: SpecialForm,
        expected: &'static str,
    ) -> Result<Vec<Datum>, LowerError> {
        match list.split_dot() {
            (items, None) => Ok(items),
            (_, Some(_)) => bad_syntax(list.span(), form, expected),
        }
    }

    fn list(&mut self, list: &List) -> Result<Exp, LowerError> {
        let span = list.span();
        if list.has_dot() {
            return error(span, LowerErrorKind::DottedExpression);
        }

        match self.special_form(list) {
            Some(SpecialForm::Quote) => self.quote(list),
            Some(SpecialForm::If) => self.if_exp(list),
            Some(SpecialForm::Lambda) => self.lambda(list, None),
            Some(SpecialForm::Let) => self.let_exp(list),
            Some(SpecialForm::SetBang) => self.set(list),
            Some(SpecialForm::Define) => error(span, LowerErrorKind::DefinitionInExpression),
            None => {
                let mut items = list.datum();
                let Some(operator) = items.next() else {
                    return error(span, LowerErrorKind::EmptyApplication);
                };
                let operator = self.expression(&operator)?;
                let operands = items
                    .map(|datum| self.expression(&datum))
                    .collect::<Result<_, _>>()?;
                Ok(Exp::App(Box::new(App { operator, operands })))
            }
        }
    }

    fn quote(&mut self, list: &List) -> Result<Exp, LowerError> {
        let items: Vec<_> = list.datum().collect();
        let [_, datum] = &items[..] else {
            return bad_syntax(list.span(), SpecialForm::Quote, "(quote <datum>)");
        };
        Ok(Exp::Quote(
            ValueConvert::new(self.rodeo, self.fold_case).convert(datum)?,
        ))
    }

    fn if_exp(&mut self, list: &List) -> Result<Exp, LowerError> {
        let items: Vec<_> = list.datum().collect();
        let (test, then, alt) = match &items[..] {
            [_, test, then] => (test, then, None),
            [_, test, then, alt] => (test, then, Some(alt)),
            _ => {
                return bad_syntax(
                    list.span(),
                    SpecialForm::If,
                    "(if <test> <consequent> [<alternate>])",
                )
            }
        };
        Ok(Exp::If(Box::new(If {
            test: self.expression(test)?,
            then: self.expression(then)?,
            alt: alt.map(|alt| self.expression(alt)).transpose()?,
        })))
    }

    /// `(lambda (<param> ...) <body> ...)`, also used for the body of `(define (<name> ...) ...)`
    fn lambda(&mut self, list: &List, name: Option<Name>) -> Result<Exp, LowerError> {
        const EXPECTED: &str = "(lambda (<param> ...) <body> ...)";
        let items: Vec<_> = list.datum().collect();
        let Some(params) = items.get(1).and_then(Datum::as_list) else {
            return bad_syntax(list.span(), SpecialForm::Lambda, EXPECTED);
        };
        let params = Self::proper(&params, SpecialForm::Lambda, EXPECTED)?;
        let params = self.distinct_binders(&params)?;
        let body = self.body(&items[2..], list.span(), SpecialForm::Lambda)?;
        Ok(Exp::Lambda(Rc::new(Lambda {
            params: params.into(),
            body,
            name,
        })))
    }

    fn let_exp(&mut self, list: &List) -> Result<Exp, LowerError> {
        const EXPECTED: &str = "(let ((<name> <init>) ...) <body> ...)";
        let items: Vec<_> = list.datum().collect();
        let Some(bindings) = items.get(1).and_then(Datum::as_list) else {
            return bad_syntax(list.span(), SpecialForm::Let, EXPECTED);
        };

        let mut names = vec![];
        let mut inits = vec![];
        for binding in Self::proper(&bindings, SpecialForm::Let, EXPECTED)? {
            let pair = binding
                .as_list()
                .filter(|pair| !pair.has_dot())
                .map(|pair| pair.datum().collect::<Vec<_>>());
            let Some([name, init]) = pair.as_deref() else {
                return bad_syntax(binding.span(), SpecialForm::Let, EXPECTED);
            };
            names.push(name.clone());
            inits.push(self.expression(init)?);
        }
        let names = self.distinct_binders(&names)?;
        let body = self.body(&items[2..], list.span(), SpecialForm::Let)?;

        Ok(Exp::Let(Box::new(Let {
            bindings: names
                .into_iter()
                .zip(inits)
                .map(|(name, init)| Binding { name, init })
                .collect(),
            body,
        })))
    }

    fn set(&mut self, list: &List) -> Result<Exp, LowerError> {
        let items: Vec<_> = list.datum().collect();
        let [_, name, value] = &items[..] else {
            return bad_syntax(list.span(), SpecialForm::SetBang, "(set! <name> <expression>)");
        };
        Ok(Exp::Set(Box::new(Set {
            name: self.binder(name)?,
            value: self.expression(value)?,
        })))
    }

    fn define(&mut self, list: &List) -> Result<Exp, LowerError> {
        const EXPECTED: &str =
            "(define <name> <expression>) or (define (<name> <param> ...) <body> ...)";
        if list.has_dot() {
            return error(list.span(), LowerErrorKind::DottedExpression);
        }
        let items: Vec<_> = list.datum().collect();
        match &items[..] {
            [_, target, value] if target.kind() == Some(DatumKind::Symbol) => {
                Ok(Exp::Define(Box::new(Define {
                    name: self.binder(target)?,
                    value: self.expression(value)?,
                })))
            }
            [_, target, ..] if target.kind() == Some(DatumKind::List) => {
                let Some(signature) = target.as_list() else {
                    return bad_syntax(list.span(), SpecialForm::Define, EXPECTED);
                };
                let signature = Self::proper(&signature, SpecialForm::Define, EXPECTED)?;
                let Some((name, params)) = signature.split_first() else {
                    return bad_syntax(target.span(), SpecialForm::Define, EXPECTED);
                };
                let name = self.binder(name)?;
                let params = self.distinct_binders(params)?;
                let body = self.body(&items[2..], list.span(), SpecialForm::Define)?;
                Ok(Exp::Define(Box::new(Define {
                    name,
                    value: Exp::Lambda(Rc::new(Lambda {
                        params: params.into(),
                        body,
                        name: Some(name),
                    })),
                })))
            }
            _ => bad_syntax(list.span(), SpecialForm::Define, EXPECTED),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use lasso::Rodeo;

    use super::{lower_module, LowerError, LowerErrorKind};
    use crate::{
        compiler::ast::{Exp, Name},
        general_parse,
        runtime::primitives::PrimOp,
        value::Value,
    };

    fn lower(source: &str) -> (Result<Vec<Exp>, LowerError>, Rodeo) {
        let gast = general_parse(source);
        check!(gast.errors().is_empty(), "{:?}", gast.errors());
        let mut rodeo = Rodeo::default();
        let result = lower_module(&gast.module(), &mut rodeo, false);
        (result, rodeo)
    }

    fn lower_err(source: &str) -> LowerError {
        let (result, _) = lower(source);
        let_assert!(Err(err) = result);
        err
    }

    #[test]
    fn literals_and_references() {
        let (result, mut rodeo) = lower(r#"1 #t "s" #\c x +"#);
        let_assert!(Ok(program) = result);
        let x = Name::from(rodeo.get_or_intern("x"));
        check!(program.len() == 6);
        check!(program[0] == Exp::Number(1));
        check!(program[1] == Exp::Bool(true));
        check!(program[3] == Exp::Char('c'));
        check!(program[4] == Exp::Var(x));
        check!(program[5] == Exp::PrimOp(PrimOp::Add));
    }

    #[test]
    fn quote_forms() {
        let (result, mut rodeo) = lower("'a (quote (1 . 2))");
        let_assert!(Ok(program) = result);
        let a = Name::from(rodeo.get_or_intern("a"));
        check!(program[0] == Exp::Quote(Value::Symbol(a)));
        check!(program[1] == Exp::Quote(Value::cons(Value::Number(1), Value::Number(2))));
    }

    #[test]
    fn define_sugar() {
        let (result, _) = lower("(define (add a b) (+ a b)) (add 1 2)");
        let_assert!(Ok(program) = result);
        let_assert!(Exp::Define(define) = &program[0]);
        let_assert!(Exp::Lambda(lambda) = &define.value);
        check!(lambda.params.len() == 2);
        check!(lambda.name == Some(define.name));
        let_assert!(Exp::App(_) = &program[1]);
    }

    #[test]
    fn definitions_in_bodies() {
        let (result, _) = lower("(lambda (x) (define y x) y) (let () (define z 1) z)");
        check!(result.is_ok());
    }

    #[test]
    fn definition_in_expression_position() {
        let err = lower_err("(if #t (define x 1) 2)");
        check!(err.kind == LowerErrorKind::DefinitionInExpression);
        check!(err.span == (7..19));
    }

    #[test]
    fn special_form_shapes() {
        let cases = [
            "(if 1)",
            "(if 1 2 3 4)",
            "(lambda x x)",
            "(lambda (x))",
            "(let ((x)) x)",
            "(let x 1)",
            "(set! x)",
            "(quote)",
            "(define)",
            "(define x 1 2)",
            "(lambda (a . b) a)",
        ];
        for source in cases {
            let err = lower_err(source);
            let_assert!(LowerErrorKind::BadSyntax { .. } = err.kind, "lowering {source}");
        }
    }

    #[test]
    fn binder_errors() {
        check!(lower_err("(lambda (a a) a)").kind == LowerErrorKind::DuplicateName(Box::from("a")));
        check!(lower_err("(let ((b 1) (b 2)) b)").kind == LowerErrorKind::DuplicateName(Box::from("b")));
        check!(lower_err("(define car 1)").kind == LowerErrorKind::ReservedName(Box::from("car")));
        check!(lower_err("(lambda (if) 1)").kind == LowerErrorKind::ReservedName(Box::from("if")));
        check!(lower_err("(set! + 1)").kind == LowerErrorKind::ReservedName(Box::from("+")));
        check!(lower_err("(lambda (1) 1)").kind == LowerErrorKind::ExpectedIdentifier);
    }

    #[test]
    fn expression_errors() {
        check!(lower_err("()").kind == LowerErrorKind::EmptyApplication);
        check!(lower_err("(f . x)").kind == LowerErrorKind::DottedExpression);
        check!(lower_err("(list lambda)").kind == LowerErrorKind::KeywordAsExpression(Box::from("lambda")));
    }

    #[test]
    fn fold_case_lowering() {
        let gast = general_parse("(DEFINE X 1) x");
        let mut rodeo = Rodeo::default();
        let_assert!(Ok(program) = lower_module(&gast.module(), &mut rodeo, true));
        let x = Name::from(rodeo.get_or_intern("x"));
        let_assert!(Exp::Define(define) = &program[0]);
        check!(define.name == x);
        check!(program[1] == Exp::Var(x));
    }
}
