//! Compile error taxonomy
//!
//! Every failure is fatal: no partial output is produced. Errors split into
//! rejected input, which the author can fix, and internal errors, which
//! indicate a compiler bug.

use crate::version::VersionError;
use pine_estree::{ScriptError, ScriptLexError, ScriptParseError};
use pine_parser::{LexError, ParseError, SyntaxError};
use thiserror::Error;

/// An invariant violation inside a rewriting pass
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("internal error in {pass} pass at {node}: {message}")]
pub struct TransformError {
    pub pass: &'static str,
    /// Node kind, with its position in the tree when known
    pub node: String,
    pub message: String,
}

impl TransformError {
    pub fn new(pass: &'static str, node: impl Into<String>, message: impl Into<String>) -> Self {
        TransformError {
            pass,
            node: node.into(),
            message: message.into(),
        }
    }
}

/// Whether retrying with different source is sensible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Version, lex or parse failure in the input
    Rejected,
    /// Compiler invariant violated
    Internal,
}

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    ScriptLex(#[from] ScriptLexError),
    #[error(transparent)]
    ScriptParse(#[from] ScriptParseError),
    #[error("invalid entry point: {0}")]
    Entry(String),
    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Transform(_) => ErrorKind::Internal,
            CompileError::Version(_)
            | CompileError::Lex(_)
            | CompileError::Parse(_)
            | CompileError::ScriptLex(_)
            | CompileError::ScriptParse(_)
            | CompileError::Entry(_) => ErrorKind::Rejected,
        }
    }

    /// `(line, column)` in the compiled source, when the error has one
    pub fn location(&self) -> Option<(usize, usize)> {
        match self {
            CompileError::Lex(e) => Some((e.line, e.column)),
            CompileError::Parse(e) => Some((e.line, e.column)),
            CompileError::ScriptLex(e) => Some((e.line, e.column)),
            CompileError::ScriptParse(e) => Some((e.line, e.column)),
            CompileError::Version(e) => e.line().map(|line| (line, 1)),
            CompileError::Entry(_) | CompileError::Transform(_) => None,
        }
    }
}

impl From<SyntaxError> for CompileError {
    fn from(err: SyntaxError) -> Self {
        match err {
            SyntaxError::Lex(e) => CompileError::Lex(e),
            SyntaxError::Parse(e) => CompileError::Parse(e),
        }
    }
}

impl From<ScriptError> for CompileError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::Lex(e) => CompileError::ScriptLex(e),
            ScriptError::Parse(e) => CompileError::ScriptParse(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_distinguishes_rejected_from_internal() {
        let err = CompileError::Entry("expected a function".into());
        assert_eq!(err.kind(), ErrorKind::Rejected);

        let err = CompileError::from(TransformError::new("expression", "Update", "bad target"));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(
            err.to_string(),
            "internal error in expression pass at Update: bad target"
        );
    }

    #[test]
    fn test_syntax_errors_keep_location() {
        let err: CompileError = pine_parser::parse_source("x = (1 + 2]\n").unwrap_err().into();
        assert!(matches!(err, CompileError::Parse(_)));
        assert_eq!(err.location().map(|(line, _)| line), Some(1));
    }
}
