//! Pine Lexer - Tokenizes indicator source code
//!
//! Produces a stream of tokens with position information for the parser.
//! Handles significant whitespace (INDENT/DEDENT tokens), Pine line wrapping
//! and newline suppression inside brackets.
use regex::Regex;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Token Types
// ─────────────────────────────────────────────────────────────────────────────

/// Reserved words of the indicator language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    // Logical operators (as keywords)
    And,
    Or,
    Not,
    // Control flow
    If,
    Else,
    For,
    In,
    While,
    Switch,
    Break,
    Continue,
    // Declarations
    Var,
    Varip,
    Type,
    Method,
    Export,
    Import,
    // Qualifiers
    Const,
    Series,
    Simple,
    // Literals
    True,
    False,
}

impl Keyword {
    pub fn from_word(s: &str) -> Option<Keyword> {
        match s {
            "and" => Some(Keyword::And),
            "or" => Some(Keyword::Or),
            "not" => Some(Keyword::Not),
            "if" => Some(Keyword::If),
            "else" => Some(Keyword::Else),
            "for" => Some(Keyword::For),
            "in" => Some(Keyword::In),
            "while" => Some(Keyword::While),
            "switch" => Some(Keyword::Switch),
            "break" => Some(Keyword::Break),
            "continue" => Some(Keyword::Continue),
            "var" => Some(Keyword::Var),
            "varip" => Some(Keyword::Varip),
            "type" => Some(Keyword::Type),
            "method" => Some(Keyword::Method),
            "export" => Some(Keyword::Export),
            "import" => Some(Keyword::Import),
            "const" => Some(Keyword::Const),
            "series" => Some(Keyword::Series),
            "simple" => Some(Keyword::Simple),
            "true" => Some(Keyword::True),
            "false" => Some(Keyword::False),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Not => "not",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::While => "while",
            Keyword::Switch => "switch",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::Var => "var",
            Keyword::Varip => "varip",
            Keyword::Type => "type",
            Keyword::Method => "method",
            Keyword::Export => "export",
            Keyword::Import => "import",
            Keyword::Const => "const",
            Keyword::Series => "series",
            Keyword::Simple => "simple",
            Keyword::True => "true",
            Keyword::False => "false",
        }
    }
}

/// All possible token types
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Structural tokens
    Newline,
    Indent,
    Dedent,
    Eof,

    // Identifiers and keywords
    Ident(String),
    Keyword(Keyword),

    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    Color(String),

    // Operators - Arithmetic
    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %

    // Operators - Comparison
    EqEq,  // ==
    NotEq, // !=
    Lt,    // <
    LtEq,  // <=
    Gt,    // >
    GtEq,  // >=

    // Operators - Assignment
    Eq,        // =
    ColonEq,   // :=
    PlusEq,    // +=
    MinusEq,   // -=
    StarEq,    // *=
    SlashEq,   // /=
    PercentEq, // %=

    // Delimiters
    FatArrow, // =>
    Question, // ?
    Colon,    // :
    Comma,    // ,
    Dot,      // .
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }
}

impl TokenKind {
    /// Short human-readable description used in parse errors
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Newline => "newline".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Ident(name) => format!("identifier `{}`", name),
            TokenKind::Keyword(kw) => format!("keyword `{}`", kw.as_str()),
            TokenKind::Int(n) => format!("number `{}`", n),
            TokenKind::Float(f) => format!("number `{}`", f),
            TokenKind::Str(s) => format!("string {:?}", s),
            TokenKind::Color(c) => format!("color `{}`", c),
            other => format!("`{}`", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::Eq => "=",
            TokenKind::ColonEq => ":=",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::PercentEq => "%=",
            TokenKind::FatArrow => "=>",
            TokenKind::Question => "?",
            TokenKind::Colon => ":",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            _ => "?",
        }
    }
}

/// A token with position information
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,  // Byte offset
    pub end: usize,    // Byte offset
    pub line: usize,   // 1-indexed
    pub column: usize, // 1-indexed
    /// Indentation level of the logical line this token belongs to
    pub indent: usize,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        start: usize,
        end: usize,
        line: usize,
        column: usize,
        indent: usize,
    ) -> Self {
        Token {
            kind,
            start,
            end,
            line,
            column,
            indent,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lexer Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
#[error("Lex error at {line}:{column}: {message}")]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub pos: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Lexer Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Columns occupied by one indentation level. A tab counts as one full level.
const INDENT_WIDTH: usize = 4;

/// Compiled regex patterns for tokenization
struct LexerPatterns {
    ident: Regex,
    number: Regex,
    color: Regex,
}

impl LexerPatterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(LexerPatterns {
            ident: Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*")?,
            number: Regex::new(r"^(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?")?,
            color: Regex::new(r"^#(?:[0-9A-Fa-f]{8}|[0-9A-Fa-f]{6})\b")?,
        })
    }
}

/// The lexer state
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    /// Stack of open indentation levels, always starting with 0
    indent_stack: Vec<usize>,
    pending_dedents: usize,
    at_line_start: bool,
    /// Indentation level of the logical line being lexed
    line_indent: usize,
    patterns: LexerPatterns,
    /// Track depth of nested brackets - newlines inside () [] {} are ignored
    bracket_depth: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source code
    pub fn new(source: &'a str) -> Result<Self, LexError> {
        let patterns = LexerPatterns::new().map_err(|e| LexError {
            message: e.to_string(),
            line: 1,
            column: 1,
            pos: 0,
        })?;
        Ok(Lexer {
            source,
            pos: 0,
            line: 1,
            column: 1,
            indent_stack: vec![0],
            pending_dedents: 0,
            at_line_start: true,
            line_indent: 0,
            patterns,
            bracket_depth: 0,
        })
    }

    /// Get the remaining source from current position
    fn remaining(&self) -> &'a str {
        &self.source[self.pos..]
    }

    /// Peek at the current character
    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    /// Peek at the next character
    fn peek_next(&self) -> Option<char> {
        self.remaining().chars().nth(1)
    }

    /// Advance by one character
    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
            self.at_line_start = true;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    /// Advance by N characters
    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            if self.advance().is_none() {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind, start: usize, line: usize, column: usize) -> Token {
        Token::new(kind, start, self.pos, line, column, self.line_indent)
    }

    /// Zero-width structural token at the current position
    fn synthetic(&self, kind: TokenKind) -> Token {
        Token::new(
            kind,
            self.pos,
            self.pos,
            self.line,
            self.column,
            self.line_indent,
        )
    }

    fn error(&self, message: impl Into<String>, line: usize, column: usize, pos: usize) -> LexError {
        LexError {
            message: message.into(),
            line,
            column,
            pos,
        }
    }

    /// Skip whitespace (but not newlines)
    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == ' ' || ch == '\t' || ch == '\r' {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Skip a comment (from // to end of line)
    fn skip_comment(&mut self) -> bool {
        if !self.remaining().starts_with("//") {
            return false;
        }
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
        true
    }

    /// Calculate indentation columns at current line start
    fn measure_indent(&mut self) -> usize {
        let mut columns = 0;
        while let Some(ch) = self.peek() {
            match ch {
                ' ' => columns += 1,
                '\t' => columns += INDENT_WIDTH,
                '\r' => {}
                _ => break,
            }
            self.advance();
        }
        columns
    }

    /// Decide whether the next non-blank physical line wraps the current one.
    ///
    /// Pine treats a line indented by a non-multiple of four spaces as a
    /// continuation of the previous line.
    fn next_line_continues(&self) -> bool {
        let mut rest = self.remaining();
        loop {
            let mut columns = 0;
            let mut offset = 0;
            for ch in rest.chars() {
                match ch {
                    ' ' => columns += 1,
                    '\t' => columns += INDENT_WIDTH,
                    '\r' => {}
                    _ => break,
                }
                offset += ch.len_utf8();
            }
            let content = &rest[offset..];
            if content.is_empty() {
                return false;
            }
            if content.starts_with('\n') || content.starts_with("//") {
                match content.find('\n') {
                    Some(nl) => {
                        rest = &content[nl + 1..];
                        continue;
                    }
                    None => return false,
                }
            }
            return columns % INDENT_WIDTH != 0;
        }
    }

    /// Handle indentation at line start, producing INDENT/DEDENT tokens
    fn handle_indent(&mut self) -> Result<Option<Token>, LexError> {
        // Return pending dedents first
        if self.pending_dedents > 0 {
            self.pending_dedents -= 1;
            return Ok(Some(self.synthetic(TokenKind::Dedent)));
        }

        if self.bracket_depth > 0 {
            self.at_line_start = false;
            return Ok(None);
        }

        if !self.at_line_start {
            return Ok(None);
        }

        // Skip blank lines and comments
        loop {
            let columns = self.measure_indent();

            if self.skip_comment() && self.peek().is_none() {
                self.at_line_start = false;
                return Ok(None);
            }

            if self.peek() == Some('\n') {
                self.advance();
                continue;
            }

            // End of file: the dedent tail is produced by next_token
            if self.peek().is_none() {
                self.at_line_start = false;
                return Ok(None);
            }

            self.at_line_start = false;
            let level = columns / INDENT_WIDTH;
            let current = self.indent_stack.last().copied().unwrap_or(0);
            self.line_indent = level;

            if level > current {
                self.indent_stack.push(level);
                return Ok(Some(self.synthetic(TokenKind::Indent)));
            } else if level < current {
                while let Some(&top) = self.indent_stack.last() {
                    if top <= level {
                        break;
                    }
                    self.indent_stack.pop();
                    self.pending_dedents += 1;
                }

                let landed = self.indent_stack.last().copied().unwrap_or(0);
                if level != landed {
                    return Err(self.error(
                        format!(
                            "Inconsistent indentation: dedent to level {} does not match any enclosing block (nearest is {})",
                            level, landed
                        ),
                        self.line,
                        self.column,
                        self.pos,
                    ));
                }

                if self.pending_dedents > 0 {
                    self.pending_dedents -= 1;
                    return Ok(Some(self.synthetic(TokenKind::Dedent)));
                }
            }

            return Ok(None);
        }
    }

    /// Try to match a regex pattern at the current position
    fn try_match(&self, re: &Regex) -> Option<&'a str> {
        re.find(self.remaining()).map(|m| m.as_str())
    }

    /// Lex the next token
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        loop {
            if let Some(tok) = self.handle_indent()? {
                return Ok(tok);
            }

            self.skip_whitespace();
            self.skip_comment();

            let Some(ch) = self.peek() else {
                // Emit remaining dedents
                if self.indent_stack.len() > 1 {
                    self.indent_stack.pop();
                    return Ok(self.synthetic(TokenKind::Dedent));
                }
                return Ok(self.synthetic(TokenKind::Eof));
            };

            let start = self.pos;
            let line = self.line;
            let column = self.column;

            if ch == '\n' {
                self.advance();
                if self.bracket_depth > 0 || self.next_line_continues() {
                    self.at_line_start = false;
                    continue;
                }
                return Ok(self.token(TokenKind::Newline, start, line, column));
            }

            // Multi-character operators (check longer patterns first)
            if let Some(kind) = self.try_multi_char_op() {
                return Ok(self.token(kind, start, line, column));
            }

            if ch == '"' || ch == '\'' {
                return self.lex_string(ch, start, line, column);
            }

            if ch == '#' {
                return self.lex_color(start, line, column);
            }

            if ch.is_ascii_digit() || (ch == '.' && self.peek_next().is_some_and(|c| c.is_ascii_digit())) {
                return self.lex_number(start, line, column);
            }

            // Single-character operators and delimiters
            if let Some(kind) = self.try_single_char_op() {
                self.advance();
                match &kind {
                    TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                        self.bracket_depth += 1;
                    }
                    TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                        self.bracket_depth = self.bracket_depth.saturating_sub(1);
                    }
                    _ => {}
                }
                return Ok(self.token(kind, start, line, column));
            }

            if ch.is_ascii_alphabetic() || ch == '_' {
                return self.lex_identifier(start, line, column);
            }

            return Err(self.error(
                format!("Unexpected character: {:?}", ch),
                line,
                column,
                start,
            ));
        }
    }

    /// Try to match multi-character operators
    fn try_multi_char_op(&mut self) -> Option<TokenKind> {
        const OPS: [(&str, TokenKind); 11] = [
            (":=", TokenKind::ColonEq),
            ("==", TokenKind::EqEq),
            ("!=", TokenKind::NotEq),
            ("<=", TokenKind::LtEq),
            (">=", TokenKind::GtEq),
            ("=>", TokenKind::FatArrow),
            ("+=", TokenKind::PlusEq),
            ("-=", TokenKind::MinusEq),
            ("*=", TokenKind::StarEq),
            ("/=", TokenKind::SlashEq),
            ("%=", TokenKind::PercentEq),
        ];
        let remaining = self.remaining();
        let (text, kind) = OPS.iter().find(|(text, _)| remaining.starts_with(text))?;
        self.advance_by(text.len());
        Some(kind.clone())
    }

    /// Try to match single-character operators
    fn try_single_char_op(&self) -> Option<TokenKind> {
        match self.peek()? {
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '/' => Some(TokenKind::Slash),
            '%' => Some(TokenKind::Percent),
            '=' => Some(TokenKind::Eq),
            '<' => Some(TokenKind::Lt),
            '>' => Some(TokenKind::Gt),
            '?' => Some(TokenKind::Question),
            ':' => Some(TokenKind::Colon),
            ',' => Some(TokenKind::Comma),
            '.' => Some(TokenKind::Dot),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            _ => None,
        }
    }

    /// Lex a string literal delimited by `quote`
    fn lex_string(
        &mut self,
        quote: char,
        start: usize,
        line: usize,
        column: usize,
    ) -> Result<Token, LexError> {
        self.advance();
        let mut content = String::new();

        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(self.error("Unterminated string literal", line, column, start));
                }
                Some('\\') => {
                    self.advance();
                    let Some(escaped) = self.advance() else {
                        return Err(self.error("Unterminated string literal", line, column, start));
                    };
                    content.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                Some(ch) if ch == quote => {
                    self.advance();
                    break;
                }
                Some(ch) => {
                    self.advance();
                    content.push(ch);
                }
            }
        }

        Ok(self.token(TokenKind::Str(content), start, line, column))
    }

    /// Lex a `#RRGGBB` / `#RRGGBBAA` color literal
    fn lex_color(&mut self, start: usize, line: usize, column: usize) -> Result<Token, LexError> {
        let Some(matched) = self.try_match(&self.patterns.color) else {
            return Err(self.error(
                "Unterminated color literal: expected 6 or 8 hex digits after '#'",
                line,
                column,
                start,
            ));
        };
        self.advance_by(matched.len());
        Ok(self.token(TokenKind::Color(matched.to_string()), start, line, column))
    }

    /// Lex a number literal
    fn lex_number(&mut self, start: usize, line: usize, column: usize) -> Result<Token, LexError> {
        let Some(matched) = self.try_match(&self.patterns.number) else {
            return Err(self.error("Invalid number literal", line, column, start));
        };
        self.advance_by(matched.len());

        let is_float = matched.contains(&['.', 'e', 'E'][..]);
        let kind = if is_float {
            TokenKind::Float(self.parse_float(matched, line, column, start)?)
        } else {
            match matched.parse::<i64>() {
                Ok(value) => TokenKind::Int(value),
                // Integers beyond i64 degrade to floats like the host runtime does
                Err(_) => TokenKind::Float(self.parse_float(matched, line, column, start)?),
            }
        };
        Ok(self.token(kind, start, line, column))
    }

    fn parse_float(&self, text: &str, line: usize, column: usize, pos: usize) -> Result<f64, LexError> {
        text.parse::<f64>()
            .map_err(|_| self.error(format!("Invalid number literal `{}`", text), line, column, pos))
    }

    /// Lex an identifier or keyword
    fn lex_identifier(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
    ) -> Result<Token, LexError> {
        if let Some(matched) = self.try_match(&self.patterns.ident) {
            self.advance_by(matched.len());
            let kind = match Keyword::from_word(matched) {
                Some(kw) => TokenKind::Keyword(kw),
                None => TokenKind::Ident(matched.to_string()),
            };
            return Ok(self.token(kind, start, line, column));
        }

        Err(self.error("Invalid identifier", line, column, start))
    }

    /// Tokenize entire source, returning all tokens
    pub fn tokenize_all(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = matches!(token.kind, TokenKind::Eof);
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }
}

/// Convenience function to tokenize source code
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source)?.tokenize_all()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tok_kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_expression() {
        // No trailing newline in input = no Newline token
        let tokens = tok_kinds("x + 1");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Plus,
                TokenKind::Int(1),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_contextual_words() {
        let tokens = tok_kinds("if not x and y to by");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Keyword(Keyword::If),
                TokenKind::Keyword(Keyword::Not),
                TokenKind::Ident("x".into()),
                TokenKind::Keyword(Keyword::And),
                TokenKind::Ident("y".into()),
                TokenKind::Ident("to".into()),
                TokenKind::Ident("by".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(
            tok_kinds(r#""hello\nworld" 'it\'s'"#),
            vec![
                TokenKind::Str("hello\nworld".into()),
                TokenKind::Str("it's".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let err = tokenize("x = \"abc\ny = 1").unwrap_err();
        assert!(err.message.contains("Unterminated string"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_color_literals() {
        assert_eq!(
            tok_kinds("#FF0000 #00ff0080"),
            vec![
                TokenKind::Color("#FF0000".into()),
                TokenKind::Color("#00ff0080".into()),
                TokenKind::Eof,
            ]
        );
        let err = tokenize("c = #12345").unwrap_err();
        assert!(err.message.contains("color literal"));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tok_kinds("42 3.14 .5 5. 1e3 2.5E-2"),
            vec![
                TokenKind::Int(42),
                TokenKind::Float(3.14),
                TokenKind::Float(0.5),
                TokenKind::Float(5.0),
                TokenKind::Float(1000.0),
                TokenKind::Float(0.025),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tok_kinds(":= => == != <= >= += = ? :"),
            vec![
                TokenKind::ColonEq,
                TokenKind::FatArrow,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::PlusEq,
                TokenKind::Eq,
                TokenKind::Question,
                TokenKind::Colon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = tok_kinds("//@version=5\nx = 1 // trailing\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Eq,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indentation() {
        let tokens = tok_kinds("if x\n    y = 1\n    z = 2\nw = 3\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Keyword(Keyword::If),
                TokenKind::Ident("x".into()),
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Ident("y".into()),
                TokenKind::Eq,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Ident("z".into()),
                TokenKind::Eq,
                TokenKind::Int(2),
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Ident("w".into()),
                TokenKind::Eq,
                TokenKind::Int(3),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_tab_is_one_level() {
        let tokens = tokenize("if x\n\ty = 1\n").unwrap();
        let y = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Ident("y".into()))
            .unwrap();
        assert_eq!(y.indent, 1);
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Indent));
    }

    #[test]
    fn test_dedents_at_end_of_input() {
        let tokens = tok_kinds("if a\n    if b\n        c");
        let indents = tokens.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = tokens.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
        assert_eq!(tokens.last(), Some(&TokenKind::Eof));
    }

    #[test]
    fn test_unmatched_dedent_is_error() {
        let err = tokenize("if a\n        b = 1\n    c = 2\n").unwrap_err();
        assert!(err.message.contains("Inconsistent indentation"));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_newlines_suppressed_in_brackets() {
        let tokens = tok_kinds("plot(close,\n    color = #FF0000)\n");
        assert!(!tokens[..tokens.len() - 2].contains(&TokenKind::Newline));
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_line_continuation() {
        let tokens = tok_kinds("x = a +\n  b\ny = 1\n");
        let newlines = tokens.iter().filter(|k| **k == TokenKind::Newline).count();
        assert_eq!(newlines, 2);
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_blank_and_comment_lines_inside_block() {
        let tokens = tok_kinds("if a\n    b = 1\n\n    // note\n    c = 2\n");
        let indents = tokens.iter().filter(|k| **k == TokenKind::Indent).count();
        assert_eq!(indents, 1);
    }

    proptest! {
        #[test]
        fn indentation_is_balanced(depths in prop::collection::vec(0usize..5, 1..40)) {
            let mut source = String::new();
            let mut prev = 0usize;
            for depth in depths {
                let level = depth.min(prev + 1);
                source.push_str(&"    ".repeat(level));
                source.push_str("x = 1\n");
                prev = level;
            }

            let tokens = tokenize(&source).unwrap();
            let mut open: i64 = 0;
            for tok in &tokens {
                match tok.kind {
                    TokenKind::Indent => open += 1,
                    TokenKind::Dedent => {
                        open -= 1;
                        prop_assert!(open >= 0);
                    }
                    _ => {}
                }
            }
            prop_assert_eq!(open, 0);
        }

        #[test]
        fn doesnt_crash(s in "\\PC*") {
            let _ = tokenize(&s);
        }
    }
}
