//! Compile parsed Scheme code into the expression tree the interpreter runs.
//!
//! Identifiers are interned on the way, and special forms are checked for their shape, so the
//! interpreter never has to deal with malformed syntax.

pub mod ast;
pub mod lower;
