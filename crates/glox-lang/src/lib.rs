pub mod syntax;
pub mod runtime;
pub mod error;
mod stack;

pub use error::{Error, ErrorCode, ErrorKind};
pub use syntax::ast::Stmt;
pub use syntax::token::{Token, TokenKind};
pub use runtime::environment::ScopePolicy;
pub use runtime::interpreter::Interpreter;
pub use runtime::value::Value;

use std::io::Write;

// ─── Public API ───────────────────────────────────────────────────────────────

/// Scan source text into tokens, ending with `Eof`.
pub fn scan(source: &str) -> Result<Vec<Token>, Error> {
    let tokens = syntax::lexer::Lexer::new(source).tokenize()?;
    tracing::debug!(tokens = tokens.len(), "scanned source");
    Ok(tokens)
}

/// Parse a token stream into statements.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Stmt>, Error> {
    let stmts = syntax::parser::Parser::new(tokens).parse()?;
    tracing::debug!(statements = stmts.len(), "parsed program");
    Ok(stmts)
}

/// Scan and parse source text.
pub fn compile(source: &str) -> Result<Vec<Stmt>, Error> {
    parse(scan(source)?)
}

/// Compile and execute `source` with the given scope policy, writing
/// `print` output to `out`.
pub fn run_with<W: Write>(source: &str, out: W, policy: ScopePolicy) -> Result<(), Error> {
    let program = compile(source)?;
    Interpreter::new(out).with_scope_policy(policy).interpret(&program)
}

/// Compile and execute `source` under the default (strict) scope policy.
pub fn run<W: Write>(source: &str, out: W) -> Result<(), Error> {
    run_with(source, out, ScopePolicy::default())
}

/// Execute `source` and return everything it printed.
pub fn run_to_string(source: &str) -> Result<String, Error> {
    let mut buf = Vec::new();
    run(source, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
