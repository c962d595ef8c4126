//! Front end for the script dialect: tokenizer, ESTree-shaped AST, parser
//! and printer. The context transformer parses Stage-1 output (or a
//! hand-written script) with this crate and prints the rewritten tree back.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod printer;

pub use ast::Program;
pub use lexer::{ScriptLexError, tokenize};
pub use parser::{ScriptParseError, parse};
pub use printer::{print_expr, print_program};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error(transparent)]
    Lex(#[from] ScriptLexError),
    #[error(transparent)]
    Parse(#[from] ScriptParseError),
}

impl ScriptError {
    /// `(line, column)` of the offending input
    pub fn location(&self) -> (usize, usize) {
        match self {
            ScriptError::Lex(e) => (e.line, e.column),
            ScriptError::Parse(e) => (e.line, e.column),
        }
    }
}

/// Tokenize and parse a script.
pub fn parse_script(source: &str) -> Result<Program, ScriptError> {
    let tokens = tokenize(source)?;
    Ok(parse(tokens)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script_round_trips_through_printer() {
        let source = "($) => {\n    const { close } = $.data;\n    let x = close[1];\n}";
        let program = parse_script(source).unwrap();
        assert_eq!(print_program(&program), format!("{};\n", source));
    }

    #[test]
    fn test_errors_carry_location() {
        let err = parse_script("let x = 'open").unwrap_err();
        assert!(matches!(err, ScriptError::Lex(_)));
        assert_eq!(err.location(), (1, 9));

        let err = parse_script("let x = ;").unwrap_err();
        assert!(matches!(err, ScriptError::Parse(_)));
        assert_eq!(err.location(), (1, 9));
    }
}
