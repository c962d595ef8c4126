//! Script Parser - recursive descent over the script token stream
//!
//! Statement terminators are optional. Keywords are recognized by spelling
//! in statement and expression position only, so they stay usable as
//! property names (`$.let`, `$.var`, `$.const`).

use crate::ast::*;
use crate::lexer::{Token, TokenKind};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Script parse error at {line}:{column}: expected {expected}, found {found}")]
pub struct ScriptParseError {
    pub line: usize,
    pub column: usize,
    pub expected: String,
    pub found: String,
}

/// Words that cannot start an expression or name a binding
const RESERVED: &[&str] = &[
    "var", "let", "const", "function", "return", "if", "else", "for", "while", "break",
    "continue", "new", "typeof", "void", "delete", "true", "false", "null", "in", "of",
];

/// Assignment-level binding strength, for arguments and initializers
const PREC_ASSIGN: u8 = 2;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    eof: Token,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let eof = tokens.last().cloned().unwrap_or(Token {
            kind: TokenKind::Eof,
            start: 0,
            line: 1,
            column: 1,
        });
        Parser {
            tokens,
            pos: 0,
            eof,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Token helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.kind)
            .unwrap_or(&self.eof.kind)
    }

    fn check_punct(&self, punct: &str) -> bool {
        matches!(&self.current().kind, TokenKind::Punct(p) if *p == punct)
    }

    fn check_word(&self, word: &str) -> bool {
        matches!(&self.current().kind, TokenKind::Ident(name) if name == word)
    }

    fn at_eof(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.check_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.check_word(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), ScriptParseError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.error(&format!("`{}`", punct)))
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<(), ScriptParseError> {
        if self.eat_word(word) {
            Ok(())
        } else {
            Err(self.error(&format!("`{}`", word)))
        }
    }

    /// Binding or reference name
    fn expect_name(&mut self) -> Result<String, ScriptParseError> {
        match &self.current().kind {
            TokenKind::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("identifier")),
        }
    }

    /// Property name after `.` or as an object key; keywords allowed
    fn expect_property_name(&mut self) -> Result<String, ScriptParseError> {
        match &self.current().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("property name")),
        }
    }

    fn error(&self, expected: &str) -> ScriptParseError {
        let token = self.current();
        ScriptParseError {
            line: token.line,
            column: token.column,
            expected: expected.to_string(),
            found: token.kind.describe(),
        }
    }

    /// Optional `;`
    fn end_statement(&mut self) {
        self.eat_punct(";");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    pub fn parse_program(&mut self) -> Result<Program, ScriptParseError> {
        let mut body = Vec::new();
        while !self.at_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ScriptParseError> {
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        if self.check_punct("{") {
            return Ok(Stmt::Block(self.parse_block()?));
        }

        let word = match &self.current().kind {
            TokenKind::Ident(word) => word.clone(),
            _ => return self.parse_expression_statement(),
        };
        match word.as_str() {
            "var" | "let" | "const" => {
                let stmt = self.parse_var_decl()?;
                self.end_statement();
                Ok(stmt)
            }
            "function" => {
                self.pos += 1;
                let func = self.parse_function_rest(true)?;
                Ok(Stmt::Function(func))
            }
            "return" => {
                self.pos += 1;
                let value = if self.check_punct(";") || self.check_punct("}") || self.at_eof() {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.end_statement();
                Ok(Stmt::Return(value))
            }
            "if" => self.parse_if(),
            "for" => self.parse_for(),
            "while" => {
                self.pos += 1;
                self.expect_punct("(")?;
                let test = self.parse_expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::While { test, body })
            }
            "break" => {
                self.pos += 1;
                self.end_statement();
                Ok(Stmt::Break)
            }
            "continue" => {
                self.pos += 1;
                self.end_statement();
                Ok(Stmt::Continue)
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, ScriptParseError> {
        let expr = self.parse_expression()?;
        self.end_statement();
        Ok(Stmt::Expr(expr))
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ScriptParseError> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.check_punct("}") {
            if self.at_eof() {
                return Err(self.error("`}`"));
            }
            body.push(self.parse_statement()?);
        }
        self.expect_punct("}")?;
        Ok(body)
    }

    fn parse_var_kind(&mut self) -> Result<VarKind, ScriptParseError> {
        let kind = match &self.current().kind {
            TokenKind::Ident(word) if word == "var" => VarKind::Var,
            TokenKind::Ident(word) if word == "let" => VarKind::Let,
            TokenKind::Ident(word) if word == "const" => VarKind::Const,
            _ => return Err(self.error("`var`, `let` or `const`")),
        };
        self.pos += 1;
        Ok(kind)
    }

    /// `let a = 1, [b, c] = d` without the terminator
    fn parse_var_decl(&mut self) -> Result<Stmt, ScriptParseError> {
        let kind = self.parse_var_kind()?;
        let mut decls = Vec::new();
        loop {
            let id = self.parse_binding_target()?;
            let init = if self.eat_punct("=") {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            decls.push(Declarator { id, init });
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Var { kind, decls })
    }

    fn parse_if(&mut self) -> Result<Stmt, ScriptParseError> {
        self.expect_word("if")?;
        self.expect_punct("(")?;
        let test = self.parse_expression()?;
        self.expect_punct(")")?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat_word("else") {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ScriptParseError> {
        self.expect_word("for")?;
        self.expect_punct("(")?;

        let mut init = None;
        if self.check_word("var") || self.check_word("let") || self.check_word("const") {
            let saved = self.pos;
            let kind = self.parse_var_kind()?;
            let pattern = self.parse_binding_target()?;
            if let Some(each) = self.eat_for_each_keyword() {
                let left = ForEachLeft {
                    kind: Some(kind),
                    pattern,
                };
                return self.parse_for_each_rest(each, left);
            }
            self.pos = saved;
            init = Some(Box::new(self.parse_var_decl()?));
        } else if !self.check_punct(";") {
            let expr = self.parse_expression()?;
            if let Some(each) = self.eat_for_each_keyword() {
                let pattern = expr_to_pattern(expr).ok_or_else(|| self.error("loop binding"))?;
                let left = ForEachLeft {
                    kind: None,
                    pattern,
                };
                return self.parse_for_each_rest(each, left);
            }
            init = Some(Box::new(Stmt::Expr(expr)));
        }

        self.expect_punct(";")?;
        let test = if self.check_punct(";") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.check_punct(")") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn eat_for_each_keyword(&mut self) -> Option<ForEachKind> {
        if self.eat_word("of") {
            Some(ForEachKind::Of)
        } else if self.eat_word("in") {
            Some(ForEachKind::In)
        } else {
            None
        }
    }

    fn parse_for_each_rest(
        &mut self,
        each: ForEachKind,
        left: ForEachLeft,
    ) -> Result<Stmt, ScriptParseError> {
        let right = self.parse_assignment()?;
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::ForEach {
            each,
            left,
            right,
            body,
        })
    }

    /// After `function`: optional name, params and block body
    fn parse_function_rest(&mut self, declaration: bool) -> Result<Function, ScriptParseError> {
        let name = if declaration {
            Some(self.expect_name()?)
        } else if matches!(&self.current().kind, TokenKind::Ident(_)) {
            Some(self.expect_name()?)
        } else {
            None
        };
        let params = self.parse_params()?;
        let body = FunctionBody::Block(self.parse_block()?);
        Ok(Function {
            name,
            params,
            body,
            arrow: false,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Pattern>, ScriptParseError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.check_punct(")") {
            if self.eat_punct("...") {
                params.push(Pattern::Rest(Box::new(self.parse_binding_target()?)));
            } else {
                params.push(self.parse_binding_element()?);
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Patterns
    // ─────────────────────────────────────────────────────────────────────────

    /// Target with an optional `= default`
    fn parse_binding_element(&mut self) -> Result<Pattern, ScriptParseError> {
        let target = self.parse_binding_target()?;
        if self.eat_punct("=") {
            let value = self.parse_assignment()?;
            Ok(Pattern::Default {
                target: Box::new(target),
                value,
            })
        } else {
            Ok(target)
        }
    }

    fn parse_binding_target(&mut self) -> Result<Pattern, ScriptParseError> {
        if self.eat_punct("[") {
            let mut items = Vec::new();
            while !self.check_punct("]") {
                if self.check_punct(",") {
                    self.pos += 1;
                    items.push(None);
                    continue;
                }
                if self.eat_punct("...") {
                    items.push(Some(Pattern::Rest(Box::new(self.parse_binding_target()?))));
                } else {
                    items.push(Some(self.parse_binding_element()?));
                }
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct("]")?;
            return Ok(Pattern::Array(items));
        }

        if self.eat_punct("{") {
            let mut props = Vec::new();
            while !self.check_punct("}") {
                if self.eat_punct("...") {
                    let rest = self.parse_binding_target()?;
                    props.push(PropertyPattern {
                        key: String::new(),
                        value: Pattern::Rest(Box::new(rest)),
                    });
                } else {
                    let key = self.expect_property_name()?;
                    let value = if self.eat_punct(":") {
                        self.parse_binding_element()?
                    } else if self.eat_punct("=") {
                        Pattern::Default {
                            target: Box::new(Pattern::Ident(key.clone())),
                            value: self.parse_assignment()?,
                        }
                    } else {
                        Pattern::Ident(key.clone())
                    };
                    props.push(PropertyPattern { key, value });
                }
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct("}")?;
            return Ok(Pattern::Object(props));
        }

        Ok(Pattern::Ident(self.expect_name()?))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    /// Comma-separated sequence
    pub fn parse_expression(&mut self) -> Result<Expr, ScriptParseError> {
        let first = self.parse_assignment()?;
        if !self.check_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            items.push(self.parse_assignment()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn parse_assignment(&mut self) -> Result<Expr, ScriptParseError> {
        if self.is_arrow_head() {
            return self.parse_arrow();
        }

        let target = self.parse_conditional()?;
        let op = match &self.current().kind {
            TokenKind::Punct(p) => AssignOp::from_punct(p),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(target);
        };
        let assignable = match &target {
            Expr::Ident(_) | Expr::Member { .. } => true,
            Expr::Array(_) | Expr::Object(_) => op == AssignOp::Assign,
            _ => false,
        };
        if !assignable {
            return Err(self.error("assignable target before assignment operator"));
        }
        self.pos += 1;
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    /// `x =>` or `( ... ) =>`
    fn is_arrow_head(&self) -> bool {
        match &self.current().kind {
            TokenKind::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                matches!(self.peek_kind(1), TokenKind::Punct("=>"))
            }
            TokenKind::Punct("(") => {
                let mut depth = 0usize;
                let mut offset = 0;
                loop {
                    match self.peek_kind(offset) {
                        TokenKind::Punct("(" | "[" | "{") => depth += 1,
                        TokenKind::Punct(")" | "]" | "}") => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                return matches!(self.peek_kind(offset + 1), TokenKind::Punct("=>"));
                            }
                        }
                        TokenKind::Eof => return false,
                        _ => {}
                    }
                    offset += 1;
                }
            }
            _ => false,
        }
    }

    fn parse_arrow(&mut self) -> Result<Expr, ScriptParseError> {
        let params = if self.check_punct("(") {
            self.parse_params()?
        } else {
            vec![Pattern::Ident(self.expect_name()?)]
        };
        self.expect_punct("=>")?;
        let body = if self.check_punct("{") {
            FunctionBody::Block(self.parse_block()?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_assignment()?))
        };
        Ok(Expr::Function(Box::new(Function {
            name: None,
            params,
            body,
            arrow: true,
        })))
    }

    fn parse_conditional(&mut self) -> Result<Expr, ScriptParseError> {
        let test = self.parse_binary(0)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect_punct(":")?;
        let alternate = self.parse_assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    /// Precedence climbing over left-associative binary operators
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ScriptParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Punct(p) => BinaryOp::from_punct(p),
                _ => None,
            };
            let Some(op) = op else { break };
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let right = self.parse_binary(prec + 1)?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ScriptParseError> {
        let op = match &self.current().kind {
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Ident(w) if w == "typeof" => Some(UnaryOp::Typeof),
            TokenKind::Ident(w) if w == "void" => Some(UnaryOp::Void),
            TokenKind::Ident(w) if w == "delete" => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let arg = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                arg: Box::new(arg),
            });
        }

        let update = match &self.current().kind {
            TokenKind::Punct("++") => Some(UpdateOp::Increment),
            TokenKind::Punct("--") => Some(UpdateOp::Decrement),
            _ => None,
        };
        if let Some(op) = update {
            self.pos += 1;
            let arg = self.parse_unary()?;
            return Ok(Expr::Update {
                op,
                prefix: true,
                arg: Box::new(arg),
            });
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ScriptParseError> {
        let expr = self.parse_call_member()?;
        let update = match &self.current().kind {
            TokenKind::Punct("++") => Some(UpdateOp::Increment),
            TokenKind::Punct("--") => Some(UpdateOp::Decrement),
            _ => None,
        };
        match update {
            Some(op) => {
                self.pos += 1;
                Ok(Expr::Update {
                    op,
                    prefix: false,
                    arg: Box::new(expr),
                })
            }
            None => Ok(expr),
        }
    }

    fn parse_call_member(&mut self) -> Result<Expr, ScriptParseError> {
        let mut expr = if self.eat_word("new") {
            let callee = self.parse_member_only()?;
            let args = if self.check_punct("(") {
                self.parse_arguments()?
            } else {
                Vec::new()
            };
            Expr::New {
                callee: Box::new(callee),
                args,
            }
        } else {
            self.parse_primary()?
        };

        loop {
            if self.eat_punct(".") {
                let name = self.expect_property_name()?;
                expr = Expr::member(expr, name);
            } else if self.eat_punct("[") {
                let index = self.parse_expression()?;
                self.expect_punct("]")?;
                expr = Expr::index(expr, index);
            } else if self.check_punct("(") {
                let args = self.parse_arguments()?;
                expr = Expr::call(expr, args);
            } else {
                return Ok(expr);
            }
        }
    }

    /// Callee of `new`: member accesses without calls
    fn parse_member_only(&mut self) -> Result<Expr, ScriptParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_punct(".") {
                let name = self.expect_property_name()?;
                expr = Expr::member(expr, name);
            } else if self.eat_punct("[") {
                let index = self.parse_expression()?;
                self.expect_punct("]")?;
                expr = Expr::index(expr, index);
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ScriptParseError> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.check_punct(")") {
            if self.eat_punct("...") {
                args.push(Expr::Spread(Box::new(self.parse_assignment()?)));
            } else {
                args.push(self.parse_assignment()?);
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ScriptParseError> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Num(value) => {
                self.pos += 1;
                Ok(Expr::num(value))
            }
            TokenKind::Str(value) => {
                self.pos += 1;
                Ok(Expr::str(value))
            }
            TokenKind::Punct("(") => {
                self.pos += 1;
                let expr = self.parse_expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            TokenKind::Punct("[") => {
                self.pos += 1;
                let mut items = Vec::new();
                while !self.check_punct("]") {
                    if self.eat_punct("...") {
                        items.push(Expr::Spread(Box::new(self.parse_assignment()?)));
                    } else {
                        items.push(self.parse_assignment()?);
                    }
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("]")?;
                Ok(Expr::Array(items))
            }
            TokenKind::Punct("{") => self.parse_object(),
            TokenKind::Ident(word) => match word.as_str() {
                "true" => {
                    self.pos += 1;
                    Ok(Expr::Lit(Literal::Bool(true)))
                }
                "false" => {
                    self.pos += 1;
                    Ok(Expr::Lit(Literal::Bool(false)))
                }
                "null" => {
                    self.pos += 1;
                    Ok(Expr::Lit(Literal::Null))
                }
                "function" => {
                    self.pos += 1;
                    let func = self.parse_function_rest(false)?;
                    Ok(Expr::Function(Box::new(func)))
                }
                _ => Ok(Expr::Ident(self.expect_name()?)),
            },
            _ => Err(self.error("expression")),
        }
    }

    fn parse_object(&mut self) -> Result<Expr, ScriptParseError> {
        self.expect_punct("{")?;
        let mut props = Vec::new();
        while !self.check_punct("}") {
            let key = match self.advance().kind {
                TokenKind::Ident(name) => PropKey::Name(name),
                TokenKind::Str(value) => PropKey::Str(value),
                TokenKind::Num(value) => PropKey::Str(crate::printer::format_number(value)),
                TokenKind::Punct("[") => {
                    let key = self.parse_assignment()?;
                    self.expect_punct("]")?;
                    PropKey::Computed(Box::new(key))
                }
                _ => {
                    self.pos -= 1;
                    return Err(self.error("property key"));
                }
            };

            if self.eat_punct(":") {
                let value = self.parse_assignment()?;
                props.push(Property {
                    key,
                    value,
                    shorthand: false,
                });
            } else if let PropKey::Name(name) = &key {
                let value = Expr::Ident(name.clone());
                props.push(Property {
                    key,
                    value,
                    shorthand: true,
                });
            } else {
                return Err(self.error("`:`"));
            }

            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct("}")?;
        Ok(Expr::Object(props))
    }
}

/// Reinterpret a parsed expression as a binding pattern.
pub fn expr_to_pattern(expr: Expr) -> Option<Pattern> {
    match expr {
        Expr::Ident(name) => Some(Pattern::Ident(name)),
        Expr::Array(items) => {
            let items = items
                .into_iter()
                .map(|item| expr_to_pattern(item).map(Some))
                .collect::<Option<Vec<_>>>()?;
            Some(Pattern::Array(items))
        }
        Expr::Object(props) => {
            let props = props
                .into_iter()
                .map(|prop| match prop.key {
                    PropKey::Name(key) | PropKey::Str(key) => Some(PropertyPattern {
                        key,
                        value: expr_to_pattern(prop.value)?,
                    }),
                    PropKey::Computed(_) => None,
                })
                .collect::<Option<Vec<_>>>()?;
            Some(Pattern::Object(props))
        }
        Expr::Assign {
            op: AssignOp::Assign,
            target,
            value,
        } => Some(Pattern::Default {
            target: Box::new(expr_to_pattern(*target)?),
            value: *value,
        }),
        Expr::Spread(inner) => Some(Pattern::Rest(Box::new(expr_to_pattern(*inner)?))),
        _ => None,
    }
}

/// Parse a token stream into a program.
pub fn parse(tokens: Vec<Token>) -> Result<Program, ScriptParseError> {
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(source: &str) -> Program {
        parse(tokenize(source).unwrap()).unwrap()
    }

    fn parse_expr(source: &str) -> Expr {
        match parse_src(source).body.into_iter().next() {
            Some(Stmt::Expr(expr)) => expr,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_arrow_entry_point() {
        let program = parse_src("(context) => { const x = 1; }");
        assert_eq!(program.body.len(), 1);
        let Stmt::Expr(Expr::Function(func)) = &program.body[0] else {
            panic!("expected arrow");
        };
        assert!(func.arrow);
        assert_eq!(func.params, vec![Pattern::Ident("context".into())]);
        assert!(matches!(&func.body, FunctionBody::Block(b) if b.len() == 1));
    }

    #[test]
    fn test_semicolons_are_optional() {
        let program = parse_src("let a = 1\nlet b = 2\na = b");
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn test_keywords_as_property_names() {
        let expr = parse_expr("$.let.x = $.var.y;");
        let Expr::Assign { target, value, .. } = expr else {
            panic!("expected assignment");
        };
        assert_eq!(*target, Expr::path("$.let.x"));
        assert_eq!(*value, Expr::path("$.var.y"));
    }

    #[test]
    fn test_binary_precedence() {
        let expr = parse_expr("a + b * c == d && e");
        let Expr::Binary { op, left, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::And);
        let Expr::Binary { op, left, .. } = *left else {
            panic!("expected equality");
        };
        assert_eq!(op, BinaryOp::Eq);
        assert!(matches!(*left, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn test_destructuring_declarations() {
        let program = parse_src("const { close, open: o } = context.data; let [a, , b = 2] = f();");
        let Stmt::Var { decls, .. } = &program.body[0] else {
            panic!("expected declaration");
        };
        assert_eq!(decls[0].id.bound_names(), vec!["close", "o"]);
        let Stmt::Var { decls, .. } = &program.body[1] else {
            panic!("expected declaration");
        };
        assert_eq!(decls[0].id.bound_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_for_loops() {
        let program = parse_src("for (let i = 0; i <= 9; i++) { x += i }");
        assert!(matches!(&program.body[0], Stmt::For { init: Some(_), test: Some(_), update: Some(_), .. }));

        let program = parse_src("for (const [i, x] of xs.entries()) y = x");
        let Stmt::ForEach { each, left, body, .. } = &program.body[0] else {
            panic!("expected for-of");
        };
        assert_eq!(*each, ForEachKind::Of);
        assert_eq!(left.kind, Some(VarKind::Const));
        assert!(matches!(**body, Stmt::Expr(_)));

        let program = parse_src("for (k in obj) {}");
        assert!(matches!(&program.body[0], Stmt::ForEach { each: ForEachKind::In, .. }));
    }

    #[test]
    fn test_if_else_chain() {
        let program = parse_src("if (a) b(); else if (c) { d() } else e()");
        let Stmt::If { alternate: Some(alt), .. } = &program.body[0] else {
            panic!("expected if/else");
        };
        assert!(matches!(**alt, Stmt::If { alternate: Some(_), .. }));
    }

    #[test]
    fn test_iife_and_object_literal() {
        let expr = parse_expr("(() => { return { a: 1, b }; })()");
        let Expr::Call { callee, args } = expr else {
            panic!("expected call");
        };
        assert!(args.is_empty());
        assert!(callee.is_function());
    }

    #[test]
    fn test_new_and_update() {
        assert!(matches!(parse_expr("new Foo(1).bar"), Expr::Member { .. }));
        assert!(matches!(parse_expr("i++"), Expr::Update { prefix: false, .. }));
        assert!(matches!(parse_expr("--i"), Expr::Update { prefix: true, .. }));
    }

    #[test]
    fn test_errors_report_position() {
        let err = parse(tokenize("let = 1").unwrap()).unwrap_err();
        assert_eq!((err.line, err.column), (1, 5));
        assert_eq!(err.expected, "identifier");

        let err = parse(tokenize("f(1 + 2").unwrap()).unwrap_err();
        assert_eq!(err.found, "end of input");

        let err = parse(tokenize("1 = 2").unwrap()).unwrap_err();
        assert!(err.expected.contains("assignable"));
    }
}
