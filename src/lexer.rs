use std::{collections::HashMap, sync::LazyLock};

pub use logos::Span;
use logos::{Lexer, Logos};

use crate::value::Integer;

fn process_piped_ident(lexer: &mut Lexer<Token>) -> Result<Box<str>, LexerError> {
    let mut built_ident = String::new();

    // Skip the | at the beginning
    let mut chars = lexer.slice().chars().skip(1).peekable();
    while let Some(chr) = chars.next() {
        match chr {
            '\\' => match chars.peek() {
                Some('x' | 'X') => {
                    built_ident.push(read_hex_escape(&mut chars, || {
                        LexerError::MalformedIdentifier
                    })?);
                }
                Some(&escape @ ('a' | 'b' | 't' | 'n' | 'r')) => {
                    built_ident.push(mnemonic_escape(escape));
                    _ = chars.next(); // consume
                }
                Some(_) | None => Err(LexerError::MalformedIdentifier)?,
            },
            // Stop consuming at the ending pipe
            '|' => break,
            c => built_ident.push(c),
        }
    }

    Ok(Box::from(built_ident.as_str()))
}

fn mnemonic_escape(escape: char) -> char {
    match escape {
        'a' => '\x07',
        'b' => '\x08',
        't' => '\t',
        'n' => '\n',
        'r' => '\r',
        other => other,
    }
}

fn process_named_character(lexer: &mut Lexer<Token>) -> Result<char, LexerError> {
    static NAMED_MAP: LazyLock<HashMap<&str, char>> = LazyLock::new(|| {
        let mut named_map = HashMap::new();
        named_map.insert("alarm", '\x07');
        named_map.insert("backspace", '\x08');
        named_map.insert("delete", '\x7f');
        named_map.insert("escape", '\x1b');
        named_map.insert("newline", '\n');
        named_map.insert("null", '\x00');
        named_map.insert("return", '\r');
        named_map.insert("space", ' ');
        named_map.insert("tab", '\t');
        // Non-standard codes
        named_map.insert("lambda", '\u{03bb}');
        named_map.insert("Lambda", '\u{039b}');
        named_map
    });

    // skip the #\ at the front
    let name = &lexer.slice()[2..];
    NAMED_MAP
        .get(name)
        .copied()
        .ok_or_else(|| LexerError::InvalidCharacterName(Box::from(name)))
}

fn process_hex_character(lexer: &mut Lexer<Token>) -> Result<char, LexerError> {
    let mut value = 0u32;

    // Skip the #\x
    for chr in lexer.slice().chars().skip(3) {
        let digit = chr.to_digit(16).ok_or(LexerError::Invalid)?;
        value = value
            .checked_mul(16)
            .and_then(|v| v.checked_add(digit))
            .ok_or(LexerError::CharacterTooBig)?;
    }

    char::from_u32(value).ok_or(LexerError::InvalidCodepoint(value))
}

// reads hex escapes in the form `x[0-9a-fA-F]+;` and outputs the corresponding character
fn read_hex_escape<F>(
    iter: &mut std::iter::Peekable<impl Iterator<Item = char>>,
    on_malformed: F,
) -> Result<char, LexerError>
where
    F: Fn() -> LexerError,
{
    // consume the x
    let _ = iter.next();

    let mut char_code = 0u32;
    while let Some(c) = iter.peek() {
        if *c == ';' {
            break;
        }
        let digit = c.to_digit(16).ok_or_else(&on_malformed)?;
        char_code = char_code
            .checked_mul(16)
            .and_then(|v| v.checked_add(digit))
            .ok_or(LexerError::CharacterTooBig)?;
        _ = iter.next();
    }
    if iter.next() != Some(';') {
        return Err(on_malformed());
    }
    char::from_u32(char_code).ok_or(LexerError::InvalidCodepoint(char_code))
}

fn process_string(lexer: &mut Lexer<Token>) -> Result<Box<str>, LexerError> {
    // Our string syntax is described by /"([^\\"]|\\[abtnr"\\]|\\[ \t]*(\r|\n|\r\n)[ \t]*|\\x[0-9a-fA-f]+;)*"/
    // We use a more permissive version of this on the Logos side, so that errors are neater.

    let mut string = String::new();

    let mut chars = lexer.slice().chars().skip(1).peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => match chars.peek() {
                Some(&escape @ ('a' | 'b' | 't' | 'n' | 'r' | '\\' | '"')) => {
                    string.push(mnemonic_escape(escape));
                    _ = chars.next(); // consume
                }
                Some(' ' | '\t' | '\r' | '\n') => {
                    let _ = chars.next();
                    while let Some(' ' | '\t' | '\r' | '\n') = chars.peek() {
                        _ = chars.next();
                    }
                }
                Some('x' | 'X') => {
                    string.push(read_hex_escape(&mut chars, || LexerError::MalformedString)?)
                }
                _ => Err(LexerError::MalformedString)?,
            },
            c => string.push(c),
        }
    }

    Ok(Box::from(string.as_str()))
}

fn read_integer(lexer: &mut Lexer<Token>) -> Result<Integer, LexerError> {
    lexer
        .slice()
        .parse::<Integer>()
        .map_err(|_| LexerError::NumberTooBig)
}

fn reject_number(lexer: &mut Lexer<Token>) -> Result<Integer, LexerError> {
    Err(LexerError::UnsupportedNumber(Box::from(lexer.slice())))
}

#[derive(thiserror::Error, Debug, PartialEq, Clone, Default)]
pub enum LexerError {
    #[default]
    #[error("invalid token encountered")]
    Invalid,
    #[error("malformed identifier")]
    MalformedIdentifier,
    #[error("character literal too big")]
    CharacterTooBig,
    #[error("invalid Unicode codepoint: {0}")]
    InvalidCodepoint(u32),
    #[error("invalid directive: {0}")]
    InvalidDirective(Box<str>),
    #[error("invalid character name: {0}")]
    InvalidCharacterName(Box<str>),
    #[error("malformed string")]
    MalformedString,
    #[error("number literal too big")]
    NumberTooBig,
    #[error("only exact integers are supported: {0}")]
    UnsupportedNumber(Box<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    FoldCase,
    NoFoldCase,
}

/// Tokens are lexed from some source, and own whatever text they carry.
#[derive(Debug, Clone, PartialEq, Logos)]
#[logos(error = LexerError)]
pub enum Token {
    #[regex("[ \t]+")]
    IntralineWhitespace,
    #[token("\n")]
    #[token("\r\n")]
    #[token("\r")]
    LineEnding,
    #[regex(r";[^\n\r]*")]
    Comment,
    // Nested comments are balanced by the general parser, which treats everything
    // between the markers as comment text.
    #[token("#|")]
    StartNestedComment,
    #[token("|#")]
    EndNestedComment,
    #[token("#;")]
    DatumComment,
    #[regex("(?i)#!fold-case", |_| Directive::FoldCase)]
    #[regex("(?i)#!no-fold-case", |_| Directive::NoFoldCase)]
    #[regex(r"(?i)#![a-z0-9\-]+", |l| Err(LexerError::InvalidDirective(Box::from(&l.slice()[2..]))))]
    Directive(Directive),

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(".")]
    Dot,
    #[token("'")]
    Quote,
    #[regex(r#"[a-zA-Z!$%&*/:<=>?^_~][0-9a-zA-Z!$%&*/:<=>?^_~+\-.@]*"#, |l| Box::from(l.slice()))]
    #[regex(r#"\|[^|]*\|"#, process_piped_ident)]
    #[token("+", |l| Box::from(l.slice()))]
    #[token("-", |l| Box::from(l.slice()))]
    #[regex(r"[-+][a-zA-Z!$%&*/:<=>?^_~+\-@][0-9a-zA-Z!$%&*/:<=>?^_~+\-.@]*", |l| Box::from(l.slice()))]
    #[regex(r"[-+]\.[a-zA-Z!$%&*/:<=>?^_~+\-.@][0-9a-zA-Z!$%&*/:<=>?^_~+\-.@]*", |l| Box::from(l.slice()))]
    #[regex(r"\.[a-zA-Z!$%&*/:<=>?^_~+\-.@][0-9a-zA-Z!$%&*/:<=>?^_~+\-.@]*", |l| Box::from(l.slice()))]
    Identifier(Box<str>),
    #[regex("(?i)#t(rue)?", |_| true)]
    #[regex("(?i)#f(alse)?", |_| false)]
    Boolean(bool),
    #[regex(r"#\\.", callback = |l| l.slice().chars().nth(2).ok_or(LexerError::Invalid))]
    #[regex(r"#\\[a-zA-Z]{2,}", priority = 3, callback = process_named_character)]
    #[regex(r"(?i)#\\x[0-9a-f]+", priority = 4, callback = process_hex_character)]
    Character(char),
    #[regex(r#""([^\\"]|\\.|\\\n)*""#, process_string)]
    String(Box<str>),
    // Only exact decimal integers make it into the evaluator. Other numeric syntax is lexed so the
    // error can name it instead of splitting it into odd tokens.
    #[regex(r"[+-]?[0-9]+", read_integer)]
    #[regex(r"[+-]?[0-9]+\.[0-9]*", reject_number)]
    #[regex(r"[+-]?\.[0-9]+", reject_number)]
    #[regex(r"[+-]?[0-9]+/[0-9]+", reject_number)]
    Number(Integer),
}

impl Token {
    pub fn lexer(source: &str) -> Lexer<Self> {
        <Self as Logos>::lexer(source)
    }
}

#[cfg(test)]
mod tests {
    use super::{LexerError, Token};
    use arbtest::arbtest;
    use assert2::{assert, check, let_assert};

    #[test]
    fn test_identifier_and_piped_identifier() {
        let id1 = r"Hello";
        let id2 = r"|H\x65;llo|";

        assert!(Token::lexer(id1).next() == Token::lexer(id2).next())
    }

    #[test]
    fn identifier_checklist() {
        macro_rules! test_valid {
            ($source:literal) => {{
                let mut lexer = Token::lexer($source);
                let token = lexer.next();
                let_assert!(Some(Ok(Token::Identifier(_))) = token);
                assert!(lexer.slice() == $source);
            }};

            ($source:literal as $target:literal) => {{
                let mut lexer = Token::lexer($source);
                let token = lexer.next();
                let_assert!(Some(Ok(Token::Identifier(s))) = token);
                assert!(s.as_ref() == $target);
            }};
        }

        test_valid!("...");
        test_valid!("<=?");
        test_valid!("+");
        test_valid!("-");
        test_valid!("+soup+");
        test_valid!("->string");
        test_valid!("set!");
        test_valid!("lambda");
        test_valid!("V17a");
        test_valid!("|two words|" as "two words");
        test_valid!(r"|two\x20;words|" as "two words");
        test_valid!(r"|λ\x3bb;|" as "λλ");
    }

    #[test]
    fn syntax_insensitivity() {
        check!(Token::lexer("#!fold-case").next() == Token::lexer("#!FOLD-CASE").next());
        check!(Token::lexer("#!no-fold-case").next() == Token::lexer("#!NO-FOLD-CASE").next());
        check!(Token::lexer("#t").next() == Token::lexer("#T").next());
        check!(Token::lexer("#true").next() == Token::lexer("#TrUe").next());
        check!(Token::lexer("#f").next() == Token::lexer("#F").next());
        check!(Token::lexer("#false").next() == Token::lexer("#FaLsE").next());
    }

    #[test]
    fn test_boolean() {
        check!(Token::lexer("#t").next() == Some(Ok(Token::Boolean(true))));
        check!(Token::lexer("#true").next() == Some(Ok(Token::Boolean(true))));
        check!(Token::lexer("#f").next() == Some(Ok(Token::Boolean(false))));
        check!(Token::lexer("#false").next() == Some(Ok(Token::Boolean(false))));
    }

    #[test]
    fn test_character() {
        check!(Token::lexer(r"#\a").next() == Some(Ok(Token::Character('a'))));
        check!(Token::lexer(r"#\alarm").next() == Some(Ok(Token::Character('\u{7}'))));
        check!(Token::lexer(r"#\newline").next() == Some(Ok(Token::Character('\n'))));
        check!(Token::lexer(r"#\0").next() == Some(Ok(Token::Character('0'))));
        check!(Token::lexer(r"#\x03bb").next() == Some(Ok(Token::Character('\u{03bb}'))));
        check!(
            Token::lexer(r"#\nope").next()
                == Some(Err(LexerError::InvalidCharacterName(Box::from("nope"))))
        );
    }

    #[test]
    fn test_string() {
        macro_rules! verify_string {
            ($source:literal as $target:literal) => {
                let mut source = String::new();
                source.push('"');
                source.push_str($source);
                source.push('"');
                let token = Token::lexer(&source).next();
                let_assert!(Some(Ok(Token::String(bs))) = token);
                check!(bs.as_ref() == $target);
            };
        }

        verify_string!(r#"apple"# as "apple");
        verify_string!(r#"\xea;\n\"\a"# as "\u{ea}\n\"\u{7}");
        verify_string!(r#"back\\slash"# as r"back\slash");
    }

    #[test]
    fn test_number() {
        check!(Token::lexer("42").next() == Some(Ok(Token::Number(42))));
        check!(Token::lexer("-17").next() == Some(Ok(Token::Number(-17))));
        check!(Token::lexer("+3").next() == Some(Ok(Token::Number(3))));
        check!(
            Token::lexer("99999999999999999999").next() == Some(Err(LexerError::NumberTooBig))
        );
        check!(
            Token::lexer("1.5").next()
                == Some(Err(LexerError::UnsupportedNumber(Box::from("1.5"))))
        );
        check!(
            Token::lexer("1/2").next()
                == Some(Err(LexerError::UnsupportedNumber(Box::from("1/2"))))
        );
    }

    #[test]
    fn test_number_arbtest() {
        arbtest(|u| {
            let number: i64 = u.arbitrary()?;
            let source = number.to_string();
            check!(Token::lexer(&source).next() == Some(Ok(Token::Number(number))));
            Ok(())
        });
    }

    #[test]
    fn dot_and_quote() {
        let tokens: Vec<_> = Token::lexer("'(a . b)")
            .filter(|t| !matches!(t, Ok(Token::IntralineWhitespace)))
            .collect();
        check!(
            tokens
                == vec![
                    Ok(Token::Quote),
                    Ok(Token::LParen),
                    Ok(Token::Identifier(Box::from("a"))),
                    Ok(Token::Dot),
                    Ok(Token::Identifier(Box::from("b"))),
                    Ok(Token::RParen),
                ]
        );
    }
}
