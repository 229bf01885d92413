//! The types of this module make the results of the general parser more
//! accessible by providing a strongly-typed layer on top of the CST produced
//! by the parser.
use core::fmt;

use icu_casemap::CaseMapper;

use crate::{
    lexer::{Directive, Span, Token},
    value::Integer,
};

/// GAst Syntax Types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[repr(u16)]
pub enum SyntaxKind {
    // Literals
    // (which correspond to Tokens)
    /// (
    LPAREN = 0,
    /// )
    RPAREN,
    /// .
    DOT,
    /// '
    ABBREV_SYM,
    /// #|
    START_NCOMMENT,
    /// |#
    END_NCOMMENT,
    /// #;
    DCOMMENT_SYM,
    /// ; comment
    OLCOMMENT,
    /// any kind of comment text
    COMMENT,
    /// #!(no-)?fold-case
    DIRECTIVE,
    /// any kind of inline whitespace
    WHITESPACE,
    /// \r | \n | \r\n
    LINEEND,
    /// a symbol literal (=identifier)
    SYMBOL,
    /// an exact integer literal
    NUMBER,
    /// a string literal
    STRING,
    /// a boolean literal
    BOOLEAN,
    /// a character literal
    CHARACTER,
    /// syntax errors
    ERROR,

    // composite nodes
    /// #| #| nested |# comment |#
    NCOMMENT,
    /// #;'(datum comment)
    DCOMMENT,
    /// `(+ 2 3)`, `()` or `(() . x)`
    LIST,
    /// ' DATUM
    ABBREV,
    /// wraps any valid datum
    DATUM,
    /// top-level node: a list of s-expressions
    ROOT,
}
use SyntaxKind::*;

/// Some boilerplate is needed, as rowan settled on using its own
/// `struct SyntaxKind(u16)` internally, instead of accepting the
/// user's `enum SyntaxKind` as a type parameter.
///
/// First, to easily pass the enum variants into rowan via `.into()`:
impl From<SyntaxKind> for rowan::SyntaxKind {
    fn from(kind: SyntaxKind) -> Self {
        Self(kind as u16)
    }
}

/// Second, implementing the `Language` trait teaches rowan to convert between
/// these two SyntaxKind types, allowing for a nicer SyntaxNode API where
/// "kinds" are values from our `enum SyntaxKind`, instead of plain u16 values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CellarLang {}
impl rowan::Language for CellarLang {
    type Kind = SyntaxKind;
    fn kind_from_raw(raw: rowan::SyntaxKind) -> Self::Kind {
        assert!(raw.0 <= ROOT as u16);
        unsafe { std::mem::transmute::<u16, SyntaxKind>(raw.0) }
    }
    fn kind_to_raw(kind: Self::Kind) -> rowan::SyntaxKind {
        kind.into()
    }
}

pub type CellarSyntaxNode = rowan::SyntaxNode<CellarLang>;
pub type CellarSyntaxToken = rowan::SyntaxToken<CellarLang>;
pub type CellarSyntaxElement = rowan::NodeOrToken<CellarSyntaxNode, CellarSyntaxToken>;

fn range_to_span(range: rowan::TextRange) -> Span {
    usize::from(range.start())..usize::from(range.end())
}

/// Anything that is a non-terminal
pub trait GAstNode {
    fn cast(syntax: CellarSyntaxNode) -> Option<Self>
    where
        Self: Sized;

    fn syntax(&self) -> &CellarSyntaxNode;

    /// Byte range this node covers in the source
    fn span(&self) -> Span {
        range_to_span(self.syntax().text_range())
    }
}

/// Anything that is a terminal
pub trait GAstToken {
    fn cast(syntax: CellarSyntaxToken) -> Option<Self>
    where
        Self: Sized;

    fn syntax(&self) -> &CellarSyntaxToken;

    fn span(&self) -> Span {
        range_to_span(self.syntax().text_range())
    }
}

macro_rules! simple_gast {
    (node $name:ident from $kind:ident) => {
        impl GAstNode for $name {
            fn cast(syntax: CellarSyntaxNode) -> Option<Self>
            where
                Self: Sized,
            {
                (syntax.kind() == $kind).then_some(Self(syntax))
            }

            fn syntax(&self) -> &CellarSyntaxNode {
                &self.0
            }
        }
    };

    (node $name:ident from $kind:ident $with:expr) => {
        impl GAstNode for $name {
            fn cast(syntax: CellarSyntaxNode) -> Option<Self>
            where
                Self: Sized,
            {
                (syntax.kind() == $kind && $with(&syntax)).then_some(Self(syntax))
            }

            fn syntax(&self) -> &CellarSyntaxNode {
                &self.0
            }
        }
    };
    (token $name:ident from $kind:ident) => {
        impl GAstToken for $name {
            fn cast(syntax: CellarSyntaxToken) -> Option<Self>
            where
                Self: Sized,
            {
                (syntax.kind() == $kind).then_some(Self(syntax))
            }

            fn syntax(&self) -> &CellarSyntaxToken {
                &self.0
            }
        }
    };
}

/// Any node that can contain datum
pub trait ContainsDatum {
    fn datum(&self) -> impl Iterator<Item = Datum>;
}

macro_rules! contains_datum {
    ($tyn:ident) => {
        impl ContainsDatum for $tyn {
            fn datum(&self) -> impl Iterator<Item = Datum> {
                self.0.children().filter_map(Datum::cast)
            }
        }
    };
}

/// An interface for recursively operating on datum
pub trait DatumVisitor {
    fn visit_datum(&mut self, datum: &Datum) {
        // always using the right kind guarantees that we can convert the node
        if let Some(kind) = datum.kind() {
            match kind {
                DatumKind::List => datum.as_list().map(|list| self.visit_list(&list)),
                DatumKind::Abbreviation => datum
                    .as_abbreviation()
                    .map(|abbrev| self.visit_abbreviation(&abbrev)),
                DatumKind::Symbol => datum.as_symbol().map(|sym| self.visit_symbol(&sym)),
                DatumKind::Number => datum.as_number().map(|num| self.visit_number(&num)),
                DatumKind::StringToken => datum.as_string().map(|s| self.visit_string(&s)),
                DatumKind::Character => datum.as_char().map(|c| self.visit_char(&c)),
                DatumKind::Boolean => datum.as_bool().map(|b| self.visit_bool(&b)),
            };
        }
    }

    // meta-programming FTW!
    fn visit_composite<C: ContainsDatum>(&mut self, composite: &C) {
        for datum in composite.datum() {
            self.visit_datum(&datum);
        }
    }

    fn visit_list(&mut self, list: &List) {
        _ = list;
    }

    fn visit_abbreviation(&mut self, abbreviation: &Abbreviation) {
        _ = abbreviation;
    }

    fn visit_symbol(&mut self, symbol: &Symbol) {
        _ = symbol;
    }

    fn visit_number(&mut self, number: &Number) {
        _ = number;
    }

    fn visit_string(&mut self, string: &StringToken) {
        _ = string;
    }

    fn visit_char(&mut self, char: &Character) {
        _ = char;
    }

    fn visit_bool(&mut self, bool: &Boolean) {
        _ = bool;
    }
}

/// Root GAst type for a file
#[derive(Debug, Clone)]
pub struct Module(CellarSyntaxNode);
simple_gast!(node Module from ROOT);
contains_datum!(Module);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbbreviationKind {
    Quote,
}
impl fmt::Display for AbbreviationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbbreviationKind::Quote => write!(f, "quote"),
        }
    }
}
#[derive(Debug, Clone)]
pub struct Abbreviation(CellarSyntaxNode);
impl Abbreviation {
    pub fn kind(&self) -> Option<AbbreviationKind> {
        let abbrev_sym = self
            .0
            .children_with_tokens()
            .filter_map(CellarSyntaxElement::into_token)
            .find(|tok| tok.kind() == ABBREV_SYM)?;

        match abbrev_sym.text() {
            "'" => Some(AbbreviationKind::Quote),
            _ => None,
        }
    }

    /// The abbreviated datum, missing only when the source was cut off
    pub fn inner(&self) -> Option<Datum> {
        self.datum().next()
    }
}
simple_gast!(node Abbreviation from ABBREV);
contains_datum!(Abbreviation);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatumKind {
    List,
    Abbreviation,
    Symbol,
    Number,
    StringToken,
    Character,
    Boolean,
}

#[derive(Debug, Clone)]
pub struct Datum(CellarSyntaxNode);
impl Datum {
    // If this says `Some`, calling the correct as_* must return `Some`
    pub fn kind(&self) -> Option<DatumKind> {
        match self.0.children_with_tokens().next() {
            None => None,
            Some(CellarSyntaxElement::Node(node)) => match node.kind() {
                LIST => Some(DatumKind::List),
                ABBREV => Some(DatumKind::Abbreviation),
                _ => None,
            },
            Some(CellarSyntaxElement::Token(tok)) => match tok.kind() {
                SYMBOL => Some(DatumKind::Symbol),
                NUMBER => Some(DatumKind::Number),
                STRING => Some(DatumKind::StringToken),
                CHARACTER => Some(DatumKind::Character),
                BOOLEAN => Some(DatumKind::Boolean),
                _ => None,
            },
        }
    }
}
// *all* validly parsed datum only contain 1 child
simple_gast!(node Datum from DATUM |syntax: &CellarSyntaxNode| {
    syntax.children_with_tokens().count() == 1
});

macro_rules! datum_as_type {
    (node $name:ident for $type:ident from $stype:ident) => {
        impl Datum {
            pub fn $name(&self) -> Option<$type> {
                match self.0.children().next() {
                    Some(node) if node.kind() == $stype => $type::cast(node),
                    _ => None,
                }
            }
        }
    };

    (token $name:ident for $type:ident from $stype:ident) => {
        impl Datum {
            pub fn $name(&self) -> Option<$type> {
                match self.0.children_with_tokens().next() {
                    Some(CellarSyntaxElement::Token(token)) if token.kind() == $stype => {
                        $type::cast(token)
                    }
                    _ => None,
                }
            }
        }
    };
}
datum_as_type!(node as_list for List from LIST);
datum_as_type!(node as_abbreviation for Abbreviation from ABBREV);
datum_as_type!(token as_symbol for Symbol from SYMBOL);
datum_as_type!(token as_number for Number from NUMBER);
datum_as_type!(token as_string for StringToken from STRING);
datum_as_type!(token as_char for Character from CHARACTER);
datum_as_type!(token as_bool for Boolean from BOOLEAN);

#[derive(Debug, Clone)]
pub struct List(CellarSyntaxNode);
impl List {
    /// Get the head element
    pub fn head(&self) -> Option<Datum> {
        self.datum().next()
    }

    /// Looks for a dot token within (without checking for valid structure)
    pub fn has_dot(&self) -> bool {
        self.dot_token().is_some()
    }

    fn dot_token(&self) -> Option<CellarSyntaxToken> {
        self.0
            .children_with_tokens()
            .filter_map(CellarSyntaxElement::into_token)
            .find(|tok| tok.kind() == DOT)
    }

    /// Splits the elements of the list at its dot (if any), returning the proper elements and
    /// the datum following the dot.
    pub fn split_dot(&self) -> (Vec<Datum>, Option<Datum>) {
        let Some(dot) = self.dot_token() else {
            return (self.datum().collect(), None);
        };
        let dot_start = dot.text_range().start();
        let (before, mut after): (Vec<_>, Vec<_>) = self
            .datum()
            .partition(|dat| dat.syntax().text_range().start() < dot_start);
        (before, after.pop())
    }
}
simple_gast!(node List from LIST);
contains_datum!(List);

#[derive(Debug, Clone)]
pub struct Symbol(CellarSyntaxToken);
impl Symbol {
    /// returns the case-folded identifier
    pub fn identifier(&self, case_insensitive: bool) -> Option<Box<str>> {
        fn read_ident(s: &str, ci: bool) -> Option<Box<str>> {
            match Token::lexer(s).next() {
                Some(Ok(Token::Identifier(id))) => Some(if ci {
                    Box::from(CaseMapper::new().fold_string(&id).as_str())
                } else {
                    id
                }),
                _ => None,
            }
        }
        // Look for the last directive the precedes us (if any)
        // If there is one, that directive determines our case-sensitivity
        // If there is not one, use the passed in case-insensitivity
        let preceding_directive = self.0.parent_ancestors().find_map(|anc| {
            anc.children_with_tokens()
                .filter_map(|se| se.into_token())
                .filter(|t| {
                    t.text_range().end() <= self.0.text_range().start() && t.kind() == DIRECTIVE
                })
                .last()
        });
        let ci = match preceding_directive.and_then(|d| Token::lexer(d.text()).next()) {
            Some(Ok(Token::Directive(Directive::FoldCase))) => true,
            Some(Ok(Token::Directive(Directive::NoFoldCase))) => false,
            _ => case_insensitive,
        };
        read_ident(self.0.text(), ci)
    }
}
simple_gast!(token Symbol from SYMBOL);

macro_rules! simple_extract {
    ($ty:ident::$name:ident from $stt:ident as $type:ty ) => {
        impl $ty {
            pub fn $name(&self) -> Option<$type> {
                if let Some(Ok(Token::$stt(val))) = Token::lexer(self.0.text()).next() {
                    Some(val)
                } else {
                    None
                }
            }
        }
    };
}

#[derive(Debug, Clone)]
pub struct Number(CellarSyntaxToken);
simple_gast!(token Number from NUMBER);
simple_extract!(Number::number from Number as Integer);

#[derive(Debug, Clone)]
pub struct StringToken(CellarSyntaxToken);
simple_gast!(token StringToken from STRING);
simple_extract!(StringToken::string from String as Box<str>);

#[derive(Debug, Clone)]
pub struct Character(CellarSyntaxToken);
simple_gast!(token Character from CHARACTER);
simple_extract!(Character::char from Character as char);

#[derive(Debug, Clone)]
pub struct Boolean(CellarSyntaxToken);
simple_gast!(token Boolean from BOOLEAN);
simple_extract!(Boolean::bool from Boolean as bool);
