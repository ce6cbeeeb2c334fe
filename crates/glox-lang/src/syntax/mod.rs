//! Source text to statements: scanning and recursive-descent parsing.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;
