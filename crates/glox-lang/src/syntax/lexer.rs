use crate::error::{Error, ErrorCode};
use crate::syntax::token::{Token, TokenKind, keyword_or_ident};

pub struct Lexer<'a> {
    text: &'a str,
    source: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, source: text.as_bytes(), pos: 0, line: 1, column: 1 }
    }

    /// Scan the whole input. Stops at the first illegal character or
    /// unterminated string; there is no resynchronisation.
    pub fn tokenize(mut self) -> Result<Vec<Token>, Error> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            if self.is_at_end() {
                tokens.push(Token::new(TokenKind::Eof, "", self.line, self.column));
                break;
            }

            if let Some(tok) = self.next_token()? {
                tokens.push(tok);
            }
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<Token>, Error> {
        let start = self.pos;
        let line = self.line;
        let col = self.column;
        let ch = self.advance();

        let kind = match ch {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b',' => TokenKind::Comma,
            b'.' => TokenKind::Dot,
            b';' => TokenKind::Semicolon,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,

            b'/' => {
                if self.peek() == b'/' { self.skip_line(); return Ok(None); }
                else { TokenKind::Slash }
            }
            b'#' => { self.skip_line(); return Ok(None); }
            b'!' => {
                if self.peek() == b'=' { self.advance(); TokenKind::BangEq }
                else { TokenKind::Bang }
            }
            b'=' => {
                if self.peek() == b'=' { self.advance(); TokenKind::EqEq }
                else { TokenKind::Eq }
            }
            b'<' => {
                if self.peek() == b'=' { self.advance(); TokenKind::LtEq }
                else { TokenKind::Lt }
            }
            b'>' => {
                if self.peek() == b'=' { self.advance(); TokenKind::GtEq }
                else { TokenKind::Gt }
            }

            b'"' => TokenKind::StringLit(self.read_string(start)?),
            b'0'..=b'9' => TokenKind::Number(self.read_number(start)),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                self.read_ident();
                keyword_or_ident(&self.text[start..self.pos])
            }

            other => {
                let shown = self.text[start..].chars().next().unwrap_or(other as char);
                return Err(Error::new(ErrorCode::L001, line, col,
                    format!("Unexpected character '{shown}'.")));
            }
        };

        Ok(Some(Token::new(kind, &self.text[start..self.pos], line, col)))
    }

    // ─── Primitives ──────────────────────────────────────────────────────────

    fn advance(&mut self) -> u8 {
        let ch = self.source[self.pos];
        self.pos += 1;
        if ch == b'\n' { self.line += 1; self.column = 1; }
        else { self.column += 1; }
        ch
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() { 0 } else { self.source[self.pos] }
    }

    fn peek_next(&self) -> u8 {
        if self.pos + 1 >= self.source.len() { 0 } else { self.source[self.pos + 1] }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => { self.advance(); }
                _ => break,
            }
        }
    }

    fn skip_line(&mut self) {
        while !self.is_at_end() && self.peek() != b'\n' { self.advance(); }
    }

    // ─── Readers ─────────────────────────────────────────────────────────────

    /// Strings run to the next `"` verbatim: no escapes, and newlines are
    /// part of the literal.
    fn read_string(&mut self, start: usize) -> Result<String, Error> {
        while !self.is_at_end() && self.peek() != b'"' {
            self.advance();
        }
        if self.is_at_end() {
            return Err(Error::new(ErrorCode::L002, self.line, self.column,
                "Unterminated string."));
        }
        self.advance(); // closing "
        Ok(self.text[start + 1..self.pos - 1].to_string())
    }

    fn read_number(&mut self, start: usize) -> f64 {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        // a trailing `.` without digits is left for the parser
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        // digits with at most one interior `.` always parse
        self.text[start..self.pos].parse().unwrap_or(0.0)
    }

    fn read_ident(&mut self) {
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.advance();
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn lex(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn lex_err(src: &str) -> Error {
        Lexer::new(src).tokenize().unwrap_err()
    }

    #[test]
    fn empty() {
        assert_eq!(lex(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn integer_literal() {
        assert_eq!(lex("42"), vec![TokenKind::Number(42.0), TokenKind::Eof]);
    }

    #[test]
    fn fractional_literal() {
        assert_eq!(lex("3.14"), vec![TokenKind::Number(3.14), TokenKind::Eof]);
    }

    #[test]
    fn trailing_dot_is_separate_token() {
        assert_eq!(lex("1."), vec![TokenKind::Number(1.0), TokenKind::Dot, TokenKind::Eof]);
    }

    #[test]
    fn keywords() {
        assert_eq!(lex("var"),      vec![TokenKind::Var,      TokenKind::Eof]);
        assert_eq!(lex("fun"),      vec![TokenKind::Fun,      TokenKind::Eof]);
        assert_eq!(lex("print"),    vec![TokenKind::Print,    TokenKind::Eof]);
        assert_eq!(lex("break"),    vec![TokenKind::Break,    TokenKind::Eof]);
        assert_eq!(lex("continue"), vec![TokenKind::Continue, TokenKind::Eof]);
        assert_eq!(lex("nil"),      vec![TokenKind::Nil,      TokenKind::Eof]);
    }

    #[test]
    fn keyword_prefix_is_identifier() {
        assert_eq!(lex("variable"), vec![TokenKind::Ident("variable".into()), TokenKind::Eof]);
        assert_eq!(lex("_or2"),     vec![TokenKind::Ident("_or2".into()),     TokenKind::Eof]);
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(lex("=="), vec![TokenKind::EqEq,   TokenKind::Eof]);
        assert_eq!(lex("!="), vec![TokenKind::BangEq, TokenKind::Eof]);
        assert_eq!(lex("<="), vec![TokenKind::LtEq,   TokenKind::Eof]);
        assert_eq!(lex(">="), vec![TokenKind::GtEq,   TokenKind::Eof]);
    }

    #[test]
    fn maximal_munch() {
        assert_eq!(
            lex("!!==="),
            vec![TokenKind::Bang, TokenKind::BangEq, TokenKind::EqEq, TokenKind::Eof]
        );
    }

    #[test]
    fn line_comment_skipped() {
        assert_eq!(lex("// comment\n42"), vec![TokenKind::Number(42.0), TokenKind::Eof]);
        assert_eq!(lex("# comment\n42"), vec![TokenKind::Number(42.0), TokenKind::Eof]);
    }

    #[test]
    fn slash_alone_is_operator() {
        assert_eq!(
            lex("6 / 2"),
            vec![TokenKind::Number(6.0), TokenKind::Slash, TokenKind::Number(2.0), TokenKind::Eof]
        );
    }

    #[test]
    fn string_literal_is_verbatim() {
        assert_eq!(lex(r#""a\nb""#), vec![TokenKind::StringLit(r"a\nb".into()), TokenKind::Eof]);
    }

    #[test]
    fn multiline_string_counts_lines() {
        let tokens = Lexer::new("\"a\nb\" x").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::StringLit("a\nb".into()));
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn non_ascii_inside_string() {
        assert_eq!(lex("\"héllo\""), vec![TokenKind::StringLit("héllo".into()), TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_error() {
        let err = lex_err("\"oops\nstill going");
        assert_eq!(err.code, ErrorCode::L002);
        assert_eq!(err.kind(), ErrorKind::Lex);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn unexpected_character_error() {
        let err = lex_err("var x = 1;\nx @ 2;");
        assert_eq!(err.code, ErrorCode::L001);
        assert_eq!(err.line, 2);
        assert_eq!(err.message, "Unexpected character '@'.");
    }

    #[test]
    fn eof_carries_final_line() {
        let tokens = Lexer::new("a\nb\n\n").tokenize().unwrap();
        assert_eq!(tokens.last().map(|t| (&t.kind, t.line)), Some((&TokenKind::Eof, 4)));
    }

    #[test]
    fn lexemes_rejoin_to_source() {
        let src = "fun add(a, b) { return a + b; } // trailing\nprint add(1.5, \"x\") >= 2;";
        let tokens = Lexer::new(src).tokenize().unwrap();
        let joined: String = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        let stripped: String = src
            .lines()
            .map(|l| l.split("//").next().unwrap_or(""))
            .collect::<String>()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        assert_eq!(joined, stripped);
    }

    #[test]
    fn line_and_column_tracking() {
        let tokens = Lexer::new("a\n  b").tokenize().unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn function_declaration() {
        assert_eq!(
            lex("fun add(a, b) {}"),
            vec![
                TokenKind::Fun,
                TokenKind::Ident("add".into()),
                TokenKind::LParen,
                TokenKind::Ident("a".into()),
                TokenKind::Comma,
                TokenKind::Ident("b".into()),
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }
}
