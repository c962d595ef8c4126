//! Script Lexer - Tokenizes the JavaScript subset emitted by Stage 1
//!
//! Whitespace and comments are insignificant; the parser treats statement
//! terminators as optional.
use regex::Regex;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Token Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifiers and keywords alike; keywords are contextual to the parser
    Ident(String),
    Num(f64),
    Str(String),
    Punct(&'static str),
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("`{}`", name),
            TokenKind::Num(n) => format!("number `{}`", n),
            TokenKind::Str(s) => format!("string {:?}", s),
            TokenKind::Punct(p) => format!("`{}`", p),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,  // Byte offset
    pub line: usize,   // 1-indexed
    pub column: usize, // 1-indexed
}

// ─────────────────────────────────────────────────────────────────────────────
// Lexer Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
#[error("Script lex error at {line}:{column}: {message}")]
pub struct ScriptLexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Lexer Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Punctuators, longest first so that prefix matching is greedy
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "...", "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "++", "--", "+=", "-=",
    "*=", "/=", "%=", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/", "%",
    "!", "=", "?", ":", ".",
];

struct LexerPatterns {
    ident: Regex,
    number: Regex,
}

impl LexerPatterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(LexerPatterns {
            ident: Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*")?,
            number: Regex::new(r"^(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?")?,
        })
    }
}

pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    patterns: LexerPatterns,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Result<Self, ScriptLexError> {
        let patterns = LexerPatterns::new().map_err(|e| ScriptLexError {
            message: e.to_string(),
            line: 1,
            column: 1,
        })?;
        Ok(Lexer {
            source,
            pos: 0,
            line: 1,
            column: 1,
            patterns,
        })
    }

    fn remaining(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn advance_bytes(&mut self, len: usize) {
        let end = self.pos + len;
        while self.pos < end {
            if self.advance().is_none() {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>, line: usize, column: usize) -> ScriptLexError {
        ScriptLexError {
            message: message.into(),
            line,
            column,
        }
    }

    /// Skip whitespace, line comments and block comments
    fn skip_trivia(&mut self) -> Result<(), ScriptLexError> {
        loop {
            let rest = self.remaining();
            if rest.starts_with("//") {
                while let Some(ch) = self.peek() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if rest.starts_with("/*") {
                let (line, column) = (self.line, self.column);
                match rest[2..].find("*/") {
                    Some(end) => self.advance_bytes(end + 4),
                    None => return Err(self.error("Unterminated block comment", line, column)),
                }
            } else if self.peek().is_some_and(char::is_whitespace) {
                self.advance();
            } else {
                return Ok(());
            }
        }
    }

    fn lex_string(&mut self, quote: char) -> Result<String, ScriptLexError> {
        let (line, column) = (self.line, self.column);
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => {
                    return Err(self.error("Unterminated string literal", line, column));
                }
                Some(c) if c == quote => return Ok(value),
                Some('\\') => {
                    let escaped = match self.advance() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('u') => self.lex_unicode_escape(line, column)?,
                        Some(c) => c,
                        None => {
                            return Err(self.error("Unterminated string literal", line, column));
                        }
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn lex_unicode_escape(&mut self, line: usize, column: usize) -> Result<char, ScriptLexError> {
        let digits: String = self.remaining().chars().take(4).collect();
        let code = u32::from_str_radix(&digits, 16)
            .ok()
            .filter(|_| digits.len() == 4)
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("Invalid unicode escape", line, column))?;
        self.advance_bytes(4);
        Ok(code)
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token, ScriptLexError> {
        self.skip_trivia()?;

        let start = self.pos;
        let (line, column) = (self.line, self.column);
        let token = |kind| Token {
            kind,
            start,
            line,
            column,
        };

        let Some(ch) = self.peek() else {
            return Ok(token(TokenKind::Eof));
        };

        if ch == '"' || ch == '\'' {
            let value = self.lex_string(ch)?;
            return Ok(token(TokenKind::Str(value)));
        }
        if ch == '`' {
            return Err(self.error("Template literals are not supported", line, column));
        }

        let rest = self.remaining();
        if let Some(m) = self.patterns.ident.find(rest) {
            let name = m.as_str().to_string();
            self.advance_bytes(m.end());
            return Ok(token(TokenKind::Ident(name)));
        }
        if let Some(m) = self.patterns.number.find(rest) {
            let text = m.as_str();
            let value: f64 = text
                .parse()
                .map_err(|_| self.error(format!("Invalid number `{}`", text), line, column))?;
            self.advance_bytes(m.end());
            return Ok(token(TokenKind::Num(value)));
        }
        if let Some(punct) = PUNCTUATORS.iter().find(|p| rest.starts_with(**p)) {
            self.advance_bytes(punct.len());
            return Ok(token(TokenKind::Punct(*punct)));
        }

        Err(self.error(format!("Unexpected character '{}'", ch), line, column))
    }
}

/// Tokenize a script, ending with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptLexError> {
    let mut lexer = Lexer::new(source)?;
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}
