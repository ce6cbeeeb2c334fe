use std::rc::Rc;

use crate::syntax::ast::*;
use crate::error::{Error, ErrorCode};
use crate::stack;
use crate::syntax::token::{Token, TokenKind};

const MAX_ARITY: usize = 255;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Number of loop bodies enclosing the current position within the
    /// current function. `break` / `continue` are legal only when non-zero.
    loop_depth: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)) {
            let line = tokens.last().map_or(1, |t| t.line);
            tokens.push(Token::new(TokenKind::Eof, "", line, 0));
        }
        Self { tokens, pos: 0, loop_depth: 0 }
    }

    /// Parse the whole token stream. The first malformed construct aborts
    /// the parse.
    pub fn parse(mut self) -> Result<Vec<Stmt>, Error> {
        let mut stmts = Vec::new();
        while !self.is_at_end() {
            stmts.push(self.parse_declaration()?);
        }
        Ok(stmts)
    }

    // ─── Declarations ────────────────────────────────────────────────────────

    fn parse_declaration(&mut self) -> Result<Stmt, Error> {
        match self.peek_kind() {
            TokenKind::Var => self.parse_var_decl(),
            TokenKind::Fun => self.parse_fun_decl(),
            _ => self.parse_stmt(),
        }
    }

    fn parse_var_decl(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        self.expect(TokenKind::Var, "Expect 'var'.")?;
        let name = self.expect_ident("Expect variable name.")?;
        let initializer = if self.matches(TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "Expect ';' after variable declaration.")?;
        Ok(Stmt::Var(VarDecl { name, initializer, span }))
    }

    fn parse_fun_decl(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        self.expect(TokenKind::Fun, "Expect 'fun'.")?;
        let name = self.expect_ident("Expect function name.")?;
        self.expect(TokenKind::LParen, "Expect '(' after function name.")?;
        let params = self.parse_param_list()?;
        self.expect(TokenKind::RParen, "Expect ')' after parameters.")?;

        // a loop around the declaration does not reach into the body
        let enclosing = std::mem::replace(&mut self.loop_depth, 0);
        let body = self.parse_block();
        self.loop_depth = enclosing;

        Ok(Stmt::Function(Rc::new(FunDecl { name, params, body: body?, span })))
    }

    fn parse_param_list(&mut self) -> Result<Vec<Param>, Error> {
        let mut params = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            if params.len() >= MAX_ARITY {
                return Err(self.error_here(ErrorCode::P005,
                    format!("Can't have more than {MAX_ARITY} parameters.")));
            }
            let span = self.span();
            let name = self.expect_ident("Expect parameter name.")?;
            if params.iter().any(|p: &Param| p.name == name) {
                return Err(Error::new(ErrorCode::P006, span.line, span.column,
                    format!("Duplicate parameter '{name}'.")));
            }
            params.push(Param { name, span });
            if !self.matches(TokenKind::Comma) { break; }
        }
        Ok(params)
    }

    // ─── Statements ──────────────────────────────────────────────────────────

    fn parse_stmt(&mut self) -> Result<Stmt, Error> {
        stack::ensure_sufficient_stack(|| self.parse_stmt_inner())
    }

    fn parse_stmt_inner(&mut self) -> Result<Stmt, Error> {
        match self.peek_kind() {
            TokenKind::Print    => self.parse_print(),
            TokenKind::LBrace   => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::If       => self.parse_if(),
            TokenKind::While    => self.parse_while(),
            TokenKind::For      => self.parse_for(),
            TokenKind::Break    => self.parse_loop_jump(),
            TokenKind::Continue => self.parse_loop_jump(),
            TokenKind::Return   => self.parse_return(),
            _ => self.parse_expr_stmt(),
        }
    }

    /// `{ declaration* }`, returning the inner statements.
    fn parse_block(&mut self) -> Result<Vec<Stmt>, Error> {
        self.expect(TokenKind::LBrace, "Expect '{' before block.")?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            stmts.push(self.parse_declaration()?);
        }
        self.expect(TokenKind::RBrace, "Expect '}' after block.")?;
        Ok(stmts)
    }

    fn parse_print(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        self.expect(TokenKind::Print, "Expect 'print'.")?;
        let value = self.parse_expr()?;
        self.expect(TokenKind::Semicolon, "Expect ';' after value.")?;
        Ok(Stmt::Print(value, span))
    }

    fn parse_expr_stmt(&mut self) -> Result<Stmt, Error> {
        let expr = self.parse_expr()?;
        self.expect(TokenKind::Semicolon, "Expect ';' after expression.")?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_if(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        self.expect(TokenKind::If, "Expect 'if'.")?;
        self.expect(TokenKind::LParen, "Expect '(' after 'if'.")?;
        let condition = self.parse_expr()?;
        self.expect(TokenKind::RParen, "Expect ')' after if condition.")?;
        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.matches(TokenKind::Else) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If(IfStmt { condition, then_branch, else_branch, span }))
    }

    fn parse_while(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        self.expect(TokenKind::While, "Expect 'while'.")?;
        self.expect(TokenKind::LParen, "Expect '(' after 'while'.")?;
        let condition = self.parse_expr()?;
        self.expect(TokenKind::RParen, "Expect ')' after condition.")?;
        let body = Box::new(self.parse_loop_body()?);
        Ok(Stmt::While(WhileStmt { condition, body, increment: None, span }))
    }

    /// `for (init; cond; incr) body` is lowered to
    /// `{ init; while (cond) body }` with `incr` attached to the loop.
    fn parse_for(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        self.expect(TokenKind::For, "Expect 'for'.")?;
        self.expect(TokenKind::LParen, "Expect '(' after 'for'.")?;

        let initializer = match self.peek_kind() {
            TokenKind::Semicolon => { self.advance(); None }
            TokenKind::Var => Some(self.parse_var_decl()?),
            _ => Some(self.parse_expr_stmt()?),
        };

        let condition = if self.check(&TokenKind::Semicolon) {
            Expr::Literal(Literal::Bool(true), span)
        } else {
            self.parse_expr()?
        };
        self.expect(TokenKind::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::RParen, "Expect ')' after for clauses.")?;

        let body = Box::new(self.parse_loop_body()?);
        let lowered = Stmt::While(WhileStmt { condition, body, increment, span });

        Ok(Stmt::Block(initializer.into_iter().chain(std::iter::once(lowered)).collect()))
    }

    fn parse_loop_body(&mut self) -> Result<Stmt, Error> {
        self.loop_depth += 1;
        let body = self.parse_stmt();
        self.loop_depth -= 1;
        body
    }

    fn parse_loop_jump(&mut self) -> Result<Stmt, Error> {
        let tok = self.advance();
        let span = Span::new(tok.line, tok.column);
        if self.loop_depth == 0 {
            return Err(self.error_at(&tok, ErrorCode::P004,
                format!("'{}' is outside loop.", tok.lexeme)));
        }
        self.expect(TokenKind::Semicolon,
            &format!("Expect ';' after '{}'.", tok.lexeme))?;
        Ok(if tok.kind == TokenKind::Break { Stmt::Break(span) } else { Stmt::Continue(span) })
    }

    fn parse_return(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        self.expect(TokenKind::Return, "Expect 'return'.")?;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon, "Expect ';' after return value.")?;
        Ok(Stmt::Return(value, span))
    }

    // ─── Expressions (precedence climbing) ───────────────────────────────────

    pub fn parse_expr(&mut self) -> Result<Expr, Error> {
        stack::ensure_sufficient_stack(|| self.parse_assignment())
    }

    fn parse_assignment(&mut self) -> Result<Expr, Error> {
        let target = self.parse_or()?;
        if self.check(&TokenKind::Eq) {
            let eq = self.advance();
            let value = self.parse_expr()?;
            return match target {
                Expr::Variable(name, span) => {
                    Ok(Expr::Assign { name, value: Box::new(value), span })
                }
                _ => Err(self.error_at(&eq, ErrorCode::P003, "Invalid assignment target.")),
            };
        }
        Ok(target)
    }

    fn parse_or(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            let span = self.span();
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Logical { left: Box::new(left), op: LogicalOp::Or, right: Box::new(right), span };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_equality()?;
        while self.check(&TokenKind::And) {
            let span = self.span();
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Logical { left: Box::new(left), op: LogicalOp::And, right: Box::new(right), span };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq   => BinOp::Eq,
                TokenKind::BangEq => BinOp::NotEq,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right), span };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_addition()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt   => BinOp::Lt,
                TokenKind::LtEq => BinOp::LtEq,
                TokenKind::Gt   => BinOp::Gt,
                TokenKind::GtEq => BinOp::GtEq,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_addition()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right), span };
        }
        Ok(left)
    }

    fn parse_addition(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_multiplication()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus  => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_multiplication()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right), span };
        }
        Ok(left)
    }

    fn parse_multiplication(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star  => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right), span };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        stack::ensure_sufficient_stack(|| self.parse_unary_inner())
    }

    fn parse_unary_inner(&mut self) -> Result<Expr, Error> {
        let span = self.span();
        if self.matches(TokenKind::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary { op: UnOp::Neg, operand: Box::new(operand), span });
        }
        if self.matches(TokenKind::Bang) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary { op: UnOp::Not, operand: Box::new(operand), span });
        }
        self.parse_call()
    }

    /// `primary ( "(" args? ")" )*`. Each trailing argument list wraps the
    /// callee built so far, so `f()()` calls the result of `f()`.
    fn parse_call(&mut self) -> Result<Expr, Error> {
        let mut expr = self.parse_primary()?;
        while self.matches(TokenKind::LParen) {
            let args = self.parse_arg_list()?;
            let paren = self.expect(TokenKind::RParen, "Expect ')' after arguments.")?;
            let span = Span::new(paren.line, paren.column);
            expr = Expr::Call { callee: Box::new(expr), args, span };
        }
        Ok(expr)
    }

    fn parse_arg_list(&mut self) -> Result<Vec<Expr>, Error> {
        let mut args = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            if args.len() >= MAX_ARITY {
                return Err(self.error_here(ErrorCode::P005,
                    format!("Can't have more than {MAX_ARITY} arguments.")));
            }
            args.push(self.parse_expr()?);
            if !self.matches(TokenKind::Comma) { break; }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, Error> {
        let tok = self.peek().clone();
        let span = Span::new(tok.line, tok.column);

        let expr = match tok.kind {
            TokenKind::Number(v)    => Expr::Literal(Literal::Number(v), span),
            TokenKind::StringLit(s) => Expr::Literal(Literal::Str(s), span),
            TokenKind::True         => Expr::Literal(Literal::Bool(true), span),
            TokenKind::False        => Expr::Literal(Literal::Bool(false), span),
            TokenKind::Nil          => Expr::Literal(Literal::Nil, span),
            TokenKind::Ident(name)  => Expr::Variable(name, span),

            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "Expect ')' after expression.")?;
                return Ok(Expr::Grouping(Box::new(inner), span));
            }

            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(expr)
    }

    // ─── Token primitives ────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() { self.pos += 1; }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(&kind) { self.advance(); true } else { false }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token, Error> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(ErrorCode::P002, message))
        }
    }

    fn expect_ident(&mut self, message: &str) -> Result<String, Error> {
        match self.peek_kind() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here(ErrorCode::P002, message)),
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn span(&self) -> Span {
        let tok = self.peek();
        Span::new(tok.line, tok.column)
    }

    fn unexpected(&self) -> Error {
        let tok = self.peek();
        let found = if tok.kind == TokenKind::Eof { "end of input" } else { tok.lexeme.as_str() };
        Error::new(ErrorCode::P001, tok.line, tok.column, format!("Unexpected '{found}' at here."))
    }

    fn error_here(&self, code: ErrorCode, message: impl Into<String>) -> Error {
        let tok = self.peek();
        Error::new(code, tok.line, tok.column, message)
    }

    fn error_at(&self, tok: &Token, code: ErrorCode, message: impl Into<String>) -> Error {
        Error::new(code, tok.line, tok.column, message)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
