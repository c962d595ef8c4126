//! Front end for the indicator language: lexer, AST and parser.
pub mod ast;
pub mod error_fmt;
pub mod lexer;
pub mod parser;

use thiserror::Error;

pub use ast::Program;
pub use lexer::{LexError, Token, TokenKind, tokenize};
pub use parser::{ParseError, parse};

/// Either stage of the front end failing
#[derive(Debug, Clone, Error)]
pub enum SyntaxError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl SyntaxError {
    /// 1-indexed (line, column) of the failure
    pub fn location(&self) -> (usize, usize) {
        match self {
            SyntaxError::Lex(e) => (e.line, e.column),
            SyntaxError::Parse(e) => (e.line, e.column),
        }
    }
}

/// Tokenize and parse source code into a Program
pub fn parse_source(source: &str) -> Result<Program, SyntaxError> {
    let tokens = tokenize(source)?;
    Ok(parse(tokens)?)
}
