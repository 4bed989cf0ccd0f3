use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Str(String),

    // Keywords
    Fn,
    If,
    Else,
    While,
    Return,
    Resume,
    Breakpoint,
    True,
    False,
    None,

    // Operators
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    AndAnd,
    OrOr,

    // Delimiters
    Comma,
    Semicolon,
    Newline,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

fn keyword(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "fn" => TokenKind::Fn,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "return" => TokenKind::Return,
        "resume" => TokenKind::Resume,
        "breakpoint" => TokenKind::Breakpoint,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "none" => TokenKind::None,
        _ => return None,
    };
    Some(kind)
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    // Newlines inside () and [] do not end a statement.
    nesting: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            nesting: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position += 1;
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        while let Some(ch) = self.peek() {
            match ch {
                ' ' | '\t' | '\r' => {
                    self.position += 1;
                }
                '\n' if self.nesting > 0 => {
                    self.line += 1;
                    self.position += 1;
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.position += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn read_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.position;
        while self.peek().is_some_and(&pred) {
            self.position += 1;
        }
        self.input[start..self.position].iter().collect()
    }

    fn read_string(&mut self) -> Result<String, ParseError> {
        let start_line = self.line;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::new(start_line, "unterminated string literal")),
                Some('"') => return Ok(out),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some(other) => {
                            return Err(ParseError::new(
                                self.line,
                                format!("unknown escape '\\{other}'"),
                            ))
                        }
                        None => {
                            return Err(ParseError::new(start_line, "unterminated string literal"))
                        }
                    };
                    out.push(escaped);
                }
                Some(ch) => {
                    if ch == '\n' {
                        self.line += 1;
                    }
                    out.push(ch);
                }
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_trivia();
        let line = self.line;

        let Some(ch) = self.bump() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                line,
            });
        };

        let two = |lexer: &mut Self, next: char, yes: TokenKind, no: TokenKind| {
            if lexer.peek() == Some(next) {
                lexer.position += 1;
                yes
            } else {
                no
            }
        };

        let kind = match ch {
            '\n' => {
                self.line += 1;
                TokenKind::Newline
            }
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '(' => {
                self.nesting += 1;
                TokenKind::LParen
            }
            ')' => {
                self.nesting = self.nesting.saturating_sub(1);
                TokenKind::RParen
            }
            '[' => {
                self.nesting += 1;
                TokenKind::LBracket
            }
            ']' => {
                self.nesting = self.nesting.saturating_sub(1);
                TokenKind::RBracket
            }
            '=' => two(self, '=', TokenKind::EqEq, TokenKind::Assign),
            '!' => two(self, '=', TokenKind::NotEq, TokenKind::Bang),
            '<' => two(self, '=', TokenKind::LessEq, TokenKind::Less),
            '>' => two(self, '=', TokenKind::GreaterEq, TokenKind::Greater),
            '&' if self.peek() == Some('&') => {
                self.position += 1;
                TokenKind::AndAnd
            }
            '|' if self.peek() == Some('|') => {
                self.position += 1;
                TokenKind::OrOr
            }
            '"' => TokenKind::Str(self.read_string()?),
            c if c.is_ascii_digit() => {
                self.position -= 1;
                let digits = self.read_while(|c| c.is_ascii_digit());
                let value = digits.parse::<i64>().map_err(|_| {
                    ParseError::new(line, format!("integer literal {digits} is too large"))
                })?;
                TokenKind::Int(value)
            }
            c if c.is_alphabetic() || c == '_' => {
                self.position -= 1;
                let ident = self.read_while(|c| c.is_alphanumeric() || c == '_');
                keyword(&ident).unwrap_or(TokenKind::Ident(ident))
            }
            other => {
                return Err(ParseError::new(
                    line,
                    format!("unexpected character '{other}'"),
                ))
            }
        };

        Ok(Token { kind, line })
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }
}
