pub mod compiler;
pub mod general_parser;
pub mod lexer;
pub mod runtime;
pub mod world;

pub use compiler::{ast::Exp, lower};
pub use general_parser::{gast, general_parse, GAst, ParseError, ParseErrorKind};
pub use runtime::{EvalError, Procedure};
pub use world::{fuel::Fuel, value, Config, World, WorldError};
