//! General parsing starts where the lexer dropped off, and handles nested syntax, while
//! also forming a GAST which is a relatively simple layer on top of a [`rowan`] CST.
//!
//! The parser never gives up: every byte of the source ends up in the tree (errors included),
//! and problems are collected as [`ParseError`]s next to it.
use rowan::{GreenNode, GreenNodeBuilder};

use crate::lexer::{LexerError, Span, Token};

pub mod gast;

use gast::{CellarSyntaxNode, GAstNode, Module, SyntaxKind, SyntaxKind::*};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error("unclosed list")]
    UnclosedList,
    #[error("unexpected `)`")]
    UnexpectedCloseParen,
    #[error("unexpected `.`")]
    UnexpectedDot,
    #[error("malformed dotted list")]
    MalformedDottedList,
    #[error("expected a datum after `{0}`")]
    MissingDatum(&'static str),
    #[error("unclosed nested comment")]
    UnclosedComment,
    #[error("`|#` outside of a nested comment")]
    StrayCommentEnd,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{kind} at {}..{}", span.start, span.end)]
pub struct ParseError {
    pub span: Span,
    pub kind: ParseErrorKind,
}

impl ParseError {
    /// Whether more input could fix this error (used by the REPL to keep reading)
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self.kind,
            ParseErrorKind::UnclosedList | ParseErrorKind::UnclosedComment
        )
    }
}

/// GAst top level
#[derive(Debug, Clone)]
pub struct GAst {
    green: GreenNode,
    errors: Vec<ParseError>,
}

impl GAst {
    pub fn syntax(&self) -> CellarSyntaxNode {
        CellarSyntaxNode::new_root(self.green.clone())
    }

    pub fn module(&self) -> Module {
        match Module::cast(self.syntax()) {
            Some(module) => module,
            None => unreachable!("general parser always produces a ROOT node"),
        }
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }
}

pub fn general_parse(source: &str) -> GAst {
    let parser = GeneralParser {
        source,
        tokens: Token::lexer(source).spanned().collect(),
        pos: 0,
        builder: GreenNodeBuilder::new(),
        errors: vec![],
    };
    parser.parse()
}

struct GeneralParser<'src> {
    source: &'src str,
    tokens: Vec<(Result<Token, LexerError>, Span)>,
    pos: usize,
    builder: GreenNodeBuilder<'static>,
    errors: Vec<ParseError>,
}

fn starts_datum(token: &Token) -> bool {
    matches!(
        token,
        Token::LParen
            | Token::Quote
            | Token::Identifier(_)
            | Token::Boolean(_)
            | Token::Character(_)
            | Token::String(_)
            | Token::Number(_)
    )
}

impl<'src> GeneralParser<'src> {
    fn parse(mut self) -> GAst {
        self.builder.start_node(ROOT.into());
        loop {
            self.trivia();
            match self.peek() {
                None => break,
                Some(Ok(Token::RParen)) => {
                    self.error(ParseErrorKind::UnexpectedCloseParen);
                    self.bump(ERROR);
                }
                Some(Ok(Token::Dot)) => {
                    self.error(ParseErrorKind::UnexpectedDot);
                    self.bump(ERROR);
                }
                Some(_) => self.datum(),
            }
        }
        self.builder.finish_node();

        GAst {
            green: self.builder.finish(),
            errors: self.errors,
        }
    }

    fn peek(&self) -> Option<&Result<Token, LexerError>> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.clone())
            .unwrap_or(self.source.len()..self.source.len())
    }

    fn bump(&mut self, kind: SyntaxKind) {
        let span = self.current_span();
        self.builder.token(kind.into(), &self.source[span]);
        self.pos += 1;
    }

    fn error(&mut self, kind: ParseErrorKind) {
        self.error_at(self.current_span(), kind);
    }

    fn error_at(&mut self, span: Span, kind: ParseErrorKind) {
        self.errors.push(ParseError { span, kind });
    }

    /// Consumes whitespace, comments, directives and lexer errors until something structural
    /// (a datum, a `)`, a `.`) or the end of input is next.
    fn trivia(&mut self) {
        loop {
            match self.peek() {
                Some(Ok(Token::IntralineWhitespace)) => self.bump(WHITESPACE),
                Some(Ok(Token::LineEnding)) => self.bump(LINEEND),
                Some(Ok(Token::Comment)) => self.bump(OLCOMMENT),
                Some(Ok(Token::Directive(_))) => self.bump(DIRECTIVE),
                Some(Ok(Token::StartNestedComment)) => self.nested_comment(),
                Some(Ok(Token::DatumComment)) => self.datum_comment(),
                Some(Ok(Token::EndNestedComment)) => {
                    self.error(ParseErrorKind::StrayCommentEnd);
                    self.bump(ERROR);
                }
                Some(Err(err)) => {
                    let kind = ParseErrorKind::Lexer(err.clone());
                    self.error(kind);
                    self.bump(ERROR);
                }
                _ => break,
            }
        }
    }

    fn nested_comment(&mut self) {
        let start = self.current_span();
        self.builder.start_node(NCOMMENT.into());
        self.bump(START_NCOMMENT);
        let mut depth = 1usize;
        loop {
            match self.peek() {
                None => {
                    self.error_at(start, ParseErrorKind::UnclosedComment);
                    break;
                }
                Some(Ok(Token::StartNestedComment)) => {
                    depth += 1;
                    self.bump(COMMENT);
                }
                Some(Ok(Token::EndNestedComment)) if depth == 1 => {
                    self.bump(END_NCOMMENT);
                    break;
                }
                Some(Ok(Token::EndNestedComment)) => {
                    depth -= 1;
                    self.bump(COMMENT);
                }
                Some(_) => self.bump(COMMENT),
            }
        }
        self.builder.finish_node();
    }

    fn datum_comment(&mut self) {
        self.builder.start_node(DCOMMENT.into());
        self.bump(DCOMMENT_SYM);
        self.trivia();
        match self.peek() {
            Some(Ok(token)) if starts_datum(token) => self.datum(),
            _ => self.error(ParseErrorKind::MissingDatum("#;")),
        }
        self.builder.finish_node();
    }

    fn datum(&mut self) {
        self.builder.start_node(DATUM.into());
        match self.peek() {
            Some(Ok(Token::LParen)) => self.list(),
            Some(Ok(Token::Quote)) => self.abbreviation(),
            Some(Ok(Token::Identifier(_))) => self.bump(SYMBOL),
            Some(Ok(Token::Number(_))) => self.bump(NUMBER),
            Some(Ok(Token::String(_))) => self.bump(STRING),
            Some(Ok(Token::Character(_))) => self.bump(CHARACTER),
            Some(Ok(Token::Boolean(_))) => self.bump(BOOLEAN),
            Some(_) => self.bump(ERROR),
            None => {}
        }
        self.builder.finish_node();
    }

    fn abbreviation(&mut self) {
        self.builder.start_node(ABBREV.into());
        self.bump(ABBREV_SYM);
        self.trivia();
        match self.peek() {
            Some(Ok(token)) if starts_datum(token) => self.datum(),
            _ => self.error(ParseErrorKind::MissingDatum("'")),
        }
        self.builder.finish_node();
    }

    fn list(&mut self) {
        let open = self.current_span();
        self.builder.start_node(LIST.into());
        self.bump(LPAREN);

        let mut before_dot = 0usize;
        // number of datum seen after the dot, once we have seen one
        let mut after_dot = None::<usize>;
        loop {
            self.trivia();
            match self.peek() {
                None => {
                    self.error_at(open, ParseErrorKind::UnclosedList);
                    break;
                }
                Some(Ok(Token::RParen)) => {
                    if after_dot == Some(0) {
                        self.error(ParseErrorKind::MalformedDottedList);
                    }
                    self.bump(RPAREN);
                    break;
                }
                Some(Ok(Token::Dot)) => {
                    if before_dot == 0 || after_dot.is_some() {
                        self.error(ParseErrorKind::UnexpectedDot);
                        self.bump(ERROR);
                    } else {
                        after_dot = Some(0);
                        self.bump(DOT);
                    }
                }
                Some(_) => {
                    let span = self.current_span();
                    self.datum();
                    match after_dot.as_mut() {
                        None => before_dot += 1,
                        Some(count) => {
                            *count += 1;
                            if *count > 1 {
                                self.error_at(span, ParseErrorKind::MalformedDottedList);
                            }
                        }
                    }
                }
            }
        }

        self.builder.finish_node();
    }
}
