use super::lexer::{Token, TokenKind};
use super::types::{Arg, BinaryOp, Code, Expr, FunctionDecl, ParamDecl, Stmt, StmtKind, UnaryOp};
use crate::error::ParseError;
use std::rc::Rc;

/// Binding power of an infix operator token.
fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
    let op = match kind {
        TokenKind::OrOr => (BinaryOp::Or, 1),
        TokenKind::AndAnd => (BinaryOp::And, 2),
        TokenKind::EqEq => (BinaryOp::Eq, 3),
        TokenKind::NotEq => (BinaryOp::NotEq, 3),
        TokenKind::Less => (BinaryOp::Lt, 4),
        TokenKind::LessEq => (BinaryOp::Le, 4),
        TokenKind::Greater => (BinaryOp::Gt, 4),
        TokenKind::GreaterEq => (BinaryOp::Ge, 4),
        TokenKind::Plus => (BinaryOp::Add, 5),
        TokenKind::Minus => (BinaryOp::Sub, 5),
        TokenKind::Star => (BinaryOp::Mul, 6),
        TokenKind::Slash => (BinaryOp::Div, 6),
        TokenKind::Percent => (BinaryOp::Rem, 6),
        _ => return None,
    };
    Some(op)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        let idx = (self.pos + ahead).min(self.tokens.len().saturating_sub(1));
        self.tokens
            .get(idx)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line(), message)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), ParseError> {
        if *self.peek() == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected {what}, found {other:?}"))),
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn skip_newlines(&mut self) {
        while *self.peek() == TokenKind::Newline {
            self.advance();
        }
    }

    pub fn parse_program(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let stmts = self.parse_statements()?;
        match self.peek() {
            TokenKind::Eof => Ok(stmts),
            other => Err(self.error(format!("unexpected {other:?}"))),
        }
    }

    /// Statements up to a closing brace or end of input.
    fn parse_statements(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if matches!(self.peek(), TokenKind::RBrace | TokenKind::Eof) {
                return Ok(stmts);
            }
            stmts.push(self.parse_statement()?);
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let body = self.parse_statements()?;
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(body)
    }

    fn end_simple_statement(&self) -> Result<(), ParseError> {
        match self.peek() {
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof => {
                Ok(())
            }
            other => Err(self.error(format!("expected end of statement, found {other:?}"))),
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        let kind = match self.peek().clone() {
            TokenKind::Fn => return self.parse_function(),
            TokenKind::If => return self.parse_if(),
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr(0)?;
                let body = self.parse_block()?;
                return Ok(Stmt::new(line, StmtKind::While { cond, body }));
            }
            TokenKind::Return => {
                self.advance();
                let mut values = Vec::new();
                if !matches!(
                    self.peek(),
                    TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
                ) {
                    values.push(self.parse_expr(0)?);
                    while *self.peek() == TokenKind::Comma {
                        self.advance();
                        values.push(self.parse_expr(0)?);
                    }
                }
                StmtKind::Return(values)
            }
            TokenKind::Resume => {
                self.advance();
                StmtKind::Resume
            }
            TokenKind::Breakpoint => {
                self.advance();
                StmtKind::Marker
            }
            TokenKind::Ident(name) if *self.peek_at(1) == TokenKind::Assign => {
                self.advance();
                self.advance();
                let value = self.parse_expr(0)?;
                StmtKind::Assign { name, value }
            }
            _ => StmtKind::Expr(self.parse_expr(0)?),
        };
        self.end_simple_statement()?;
        Ok(Stmt::new(line, kind))
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.expect(TokenKind::If, "'if'")?;
        let cond = self.parse_expr(0)?;
        let then = self.parse_block()?;

        // `else` may sit on the line after the closing brace.
        let save = self.pos;
        self.skip_newlines();
        let otherwise = if *self.peek() == TokenKind::Else {
            self.advance();
            if *self.peek() == TokenKind::If {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            self.pos = save;
            None
        };

        Ok(Stmt::new(
            line,
            StmtKind::If {
                cond,
                then,
                otherwise,
            },
        ))
    }

    fn parse_function(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.expect(TokenKind::Fn, "'fn'")?;
        let name = self.expect_ident("function name")?;
        self.expect(TokenKind::LParen, "'('")?;

        let mut params: Vec<ParamDecl> = Vec::new();
        while *self.peek() != TokenKind::RParen {
            let param = self.expect_ident("parameter name")?;
            if params.iter().any(|p| p.name == param) {
                return Err(self.error(format!("duplicate parameter '{param}'")));
            }
            let default = if *self.peek() == TokenKind::Assign {
                self.advance();
                Some(self.parse_expr(0)?)
            } else {
                if params.iter().any(|p| p.default.is_some()) {
                    return Err(self.error("parameter without a default follows parameter with a default"));
                }
                None
            };
            params.push(ParamDecl {
                name: param,
                default,
            });
            if *self.peek() == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_block()?;

        let param_names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        let code = Code::new(&name, line, &param_names, body);
        Ok(Stmt::new(
            line,
            StmtKind::Function(Rc::new(FunctionDecl {
                name,
                params,
                code: Rc::new(code),
            })),
        ))
    }

    pub fn parse_expr(&mut self, min_power: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some((op, power)) = binary_op(self.peek()) {
            if power < min_power {
                break;
            }
            self.advance();
            let right = self.parse_expr(power + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek().clone() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek().clone() {
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr(0)?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Arg>, ParseError> {
        let mut args: Vec<Arg> = Vec::new();
        while *self.peek() != TokenKind::RParen {
            let arg = match self.peek().clone() {
                TokenKind::Ident(name) if *self.peek_at(1) == TokenKind::Assign => {
                    self.advance();
                    self.advance();
                    Arg {
                        name: Some(name),
                        value: self.parse_expr(0)?,
                    }
                }
                _ => {
                    if args.iter().any(|a| a.name.is_some()) {
                        return Err(self.error("positional argument follows keyword argument"));
                    }
                    Arg {
                        name: None,
                        value: self.parse_expr(0)?,
                    }
                }
            };
            args.push(arg);
            if *self.peek() == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let expr = match self.advance() {
            TokenKind::Int(value) => Expr::Int(value),
            TokenKind::Str(value) => Expr::Str(value),
            TokenKind::True => Expr::Bool(true),
            TokenKind::False => Expr::Bool(false),
            TokenKind::None => Expr::None,
            TokenKind::Ident(name) => Expr::Ident(name),
            TokenKind::LParen => {
                let inner = self.parse_expr(0)?;
                self.expect(TokenKind::RParen, "')'")?;
                inner
            }
            TokenKind::LBracket => {
                let mut items = Vec::new();
                while *self.peek() != TokenKind::RBracket {
                    items.push(self.parse_expr(0)?);
                    if *self.peek() == TokenKind::Comma {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "']'")?;
                Expr::List(items)
            }
            other => return Err(self.error(format!("unexpected {other:?}"))),
        };
        Ok(expr)
    }
}
