//! Tree-walking evaluation over a lexical scope chain.

pub mod environment;
pub mod interpreter;
pub mod value;
