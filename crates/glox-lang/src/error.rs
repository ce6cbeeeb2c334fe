/// Error codes prefixed by phase: L = lexer, P = parser, R = runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Lexer
    L001, // unexpected character
    L002, // unterminated string literal

    // Parser
    P001, // unexpected token
    P002, // missing expected token
    P003, // invalid assignment target
    P004, // `break` / `continue` outside a loop
    P005, // too many parameters or arguments
    P006, // duplicate parameter name

    // Runtime
    R001, // undefined variable
    R002, // duplicate definition in the same frame
    R003, // operand type mismatch
    R004, // not callable
    R005, // wrong argument count
    R006, // output sink failed
    R007, // call depth limit exceeded
}

/// Coarse classification of an [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Parse,
    UndefinedVariable,
    DuplicateDefinition,
    Type,
    Arity,
    StackOverflow,
    Io,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L001 => "L001",
            Self::L002 => "L002",
            Self::P001 => "P001",
            Self::P002 => "P002",
            Self::P003 => "P003",
            Self::P004 => "P004",
            Self::P005 => "P005",
            Self::P006 => "P006",
            Self::R001 => "R001",
            Self::R002 => "R002",
            Self::R003 => "R003",
            Self::R004 => "R004",
            Self::R005 => "R005",
            Self::R006 => "R006",
            Self::R007 => "R007",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::L001 | Self::L002 => ErrorKind::Lex,
            Self::P001 | Self::P002 | Self::P003 | Self::P004 | Self::P005 | Self::P006 => ErrorKind::Parse,
            Self::R001 => ErrorKind::UndefinedVariable,
            Self::R002 => ErrorKind::DuplicateDefinition,
            Self::R003 | Self::R004 => ErrorKind::Type,
            Self::R005 => ErrorKind::Arity,
            Self::R006 => ErrorKind::Io,
            Self::R007 => ErrorKind::StackOverflow,
        }
    }
}

/// A fatal diagnostic from any stage of the pipeline.
///
/// Rendered as `[line N] message`, the form the command line prints before
/// exiting.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[line {line}] {message}")]
pub struct Error {
    pub code: ErrorCode,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Error {
    pub fn new(code: ErrorCode, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self { code, line, column, message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }
}
