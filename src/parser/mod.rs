mod lexer;
pub mod names;
mod rewrite;
mod statements;
mod types;

pub use lexer::{Lexer, Token, TokenKind};
pub use rewrite::intercept_returns;
pub use statements::Parser;
pub use types::{
    Arg, BinaryOp, Code, Expr, FunctionDecl, LineEntry, ParamDecl, Stmt, StmtKind, UnaryOp,
};

use crate::error::ParseError;

/// Parse a complete source text into statements.
pub fn parse(source: &str) -> Result<Vec<Stmt>, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_program()
}
