#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    StringLit(String),
    Ident(String),

    // Keywords
    And,
    Or,
    If,
    Else,
    While,
    For,
    Var,
    Nil,
    True,
    False,
    Fun,
    Return,
    Print,
    Break,
    Continue,

    // Operators
    Plus,       // +
    Minus,      // -
    Star,       // *
    Slash,      // /
    Bang,       // !
    BangEq,     // !=
    Eq,         // =
    EqEq,       // ==
    Lt,         // <
    LtEq,       // <=
    Gt,         // >
    GtEq,       // >=

    // Punctuation
    Comma,      // ,
    Semicolon,  // ;
    Dot,        // .
    LParen,     // (
    RParen,     // )
    LBrace,     // {
    RBrace,     // }

    Eof,
}

/// Maps an identifier string to its keyword token, or returns `Ident`.
pub fn keyword_or_ident(s: &str) -> TokenKind {
    match s {
        "and"      => TokenKind::And,
        "or"       => TokenKind::Or,
        "if"       => TokenKind::If,
        "else"     => TokenKind::Else,
        "while"    => TokenKind::While,
        "for"      => TokenKind::For,
        "var"      => TokenKind::Var,
        "nil"      => TokenKind::Nil,
        "true"     => TokenKind::True,
        "false"    => TokenKind::False,
        "fun"      => TokenKind::Fun,
        "return"   => TokenKind::Return,
        "print"    => TokenKind::Print,
        "break"    => TokenKind::Break,
        "continue" => TokenKind::Continue,
        _          => TokenKind::Ident(s.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────

/// A scanned token. `lexeme` is the exact source slice it was read from;
/// the synthetic end-of-input token has an empty lexeme.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize, column: usize) -> Self {
        Self { kind, lexeme: lexeme.into(), line, column }
    }
}
