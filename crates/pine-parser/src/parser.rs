//! Pine Parser - Hand-written recursive descent parser
//!
//! Parses the token vector produced by the lexer into the Pine AST.
//! Binary operators are handled by a precedence-climbing chain; statements
//! are recognized with bounded lookahead over the token vector.
use crate::ast::*;
use crate::lexer::{Keyword, Token, TokenKind};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Parser Error
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse error at {line}:{column}: expected {expected}, found {found}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub expected: String,
    pub found: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Parser
// ─────────────────────────────────────────────────────────────────────────────

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    eof: Token,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let eof = match tokens.last() {
            Some(last) => Token::new(TokenKind::Eof, last.end, last.end, last.line, last.column, 0),
            None => Token::new(TokenKind::Eof, 0, 0, 1, 1, 0),
        };
        Parser {
            tokens,
            pos: 0,
            eof,
        }
    }

    /// Get current token
    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    /// Get current token kind
    fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    /// Token kind `n` positions ahead of the current one
    fn peek_kind(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&self.eof.kind)
    }

    /// Check if current token matches a kind
    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current_kind()) == std::mem::discriminant(kind)
    }

    /// Check if current token is a specific keyword
    fn check_keyword(&self, kw: Keyword) -> bool {
        matches!(self.current_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    /// Check for a contextual word such as `to` or `by`
    fn check_word(&self, word: &str) -> bool {
        matches!(self.current_kind(), TokenKind::Ident(name) if name == word)
    }

    /// Advance to next token, returning the current one
    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Consume token if it matches, return error otherwise
    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(expected))
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<Token, ParseError> {
        if self.check_keyword(kw) {
            Ok(self.advance())
        } else {
            Err(self.error(&format!("`{}`", kw.as_str())))
        }
    }

    /// Consume token if it matches, return true if consumed
    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Create error at current position
    fn error(&self, expected: &str) -> ParseError {
        let token = self.current();
        ParseError {
            line: token.line,
            column: token.column,
            expected: expected.to_string(),
            found: token.kind.describe(),
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    /// Expect and consume an identifier
    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.current_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("identifier")),
        }
    }

    /// Finish a simple statement: a newline, or a block boundary left for the caller
    fn end_statement(&mut self) -> Result<(), ParseError> {
        let after_block = self
            .pos
            .checked_sub(1)
            .and_then(|prev| self.tokens.get(prev))
            .is_some_and(|t| t.kind == TokenKind::Dedent);
        if after_block || self.eat(&TokenKind::Newline) {
            return Ok(());
        }
        if matches!(self.current_kind(), TokenKind::Eof | TokenKind::Dedent) {
            return Ok(());
        }
        Err(self.error("end of line"))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Top-level parsing
    // ─────────────────────────────────────────────────────────────────────────

    /// Parse entire program
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        self.skip_newlines();

        while !self.check(&TokenKind::Eof) {
            body.push(self.parse_statement()?);
            self.skip_newlines();
        }

        Ok(Program { body })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement parsing
    // ─────────────────────────────────────────────────────────────────────────

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.current().line;
        let kind = match self.current_kind() {
            TokenKind::Keyword(Keyword::If) => self.parse_if_stmt()?,
            TokenKind::Keyword(Keyword::For) => self.parse_for_stmt()?,
            TokenKind::Keyword(Keyword::While) => self.parse_while_stmt()?,
            TokenKind::Keyword(Keyword::Switch) => {
                let switch = self.parse_switch()?;
                StmtKind::Expr(switch)
            }
            TokenKind::Keyword(Keyword::Var) => {
                self.advance();
                self.parse_declaration(DeclMode::Var)?
            }
            TokenKind::Keyword(Keyword::Varip) => {
                self.advance();
                self.parse_declaration(DeclMode::Varip)?
            }
            TokenKind::Keyword(Keyword::Type) => StmtKind::TypeDecl(self.parse_type_decl(false)?),
            TokenKind::Keyword(Keyword::Method) => {
                StmtKind::FunctionDecl(self.parse_method_decl(false)?)
            }
            TokenKind::Keyword(Keyword::Export) => self.parse_export()?,
            TokenKind::Keyword(Keyword::Import) => {
                return Err(self.error("a statement (imports are not supported)"));
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                self.end_statement()?;
                StmtKind::Break
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                self.end_statement()?;
                StmtKind::Continue
            }
            TokenKind::LBracket if self.is_tuple_decl_head() => self.parse_tuple_decl()?,
            TokenKind::Ident(_) if self.is_function_decl_head() => {
                StmtKind::FunctionDecl(self.parse_function_decl(FunctionKind::Function, false)?)
            }
            _ => self.parse_declaration_or_expression()?,
        };
        Ok(Stmt::new(kind, line))
    }

    /// `name(...) =>` with the parentheses balanced
    fn is_function_decl_head(&self) -> bool {
        if !matches!(self.peek_kind(1), TokenKind::LParen) {
            return false;
        }
        let mut depth = 0usize;
        let mut offset = 1;
        loop {
            match self.peek_kind(offset) {
                TokenKind::LParen | TokenKind::LBracket => depth += 1,
                TokenKind::RParen | TokenKind::RBracket => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return matches!(self.peek_kind(offset + 1), TokenKind::FatArrow);
                    }
                }
                TokenKind::Eof | TokenKind::Newline => return false,
                _ => {}
            }
            offset += 1;
        }
    }

    /// `[a, b, ...] =`
    fn is_tuple_decl_head(&self) -> bool {
        let mut offset = 1;
        loop {
            if !matches!(self.peek_kind(offset), TokenKind::Ident(_)) {
                return false;
            }
            match self.peek_kind(offset + 1) {
                TokenKind::Comma => offset += 2,
                TokenKind::RBracket => return matches!(self.peek_kind(offset + 2), TokenKind::Eq),
                _ => return false,
            }
        }
    }

    fn parse_tuple_decl(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(&TokenKind::LBracket, "`[`")?;
        let mut names = vec![self.expect_ident()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_ident()?);
        }
        self.expect(&TokenKind::RBracket, "`]`")?;
        self.expect(&TokenKind::Eq, "`=`")?;
        let init = self.parse_value()?;
        self.end_statement()?;
        Ok(StmtKind::VarDecl(VarDecl {
            mode: DeclMode::Plain,
            ty: None,
            target: DeclTarget::Tuple(names),
            init,
        }))
    }

    /// Declaration after `var`/`varip`: `[type] name = value`
    fn parse_declaration(&mut self, mode: DeclMode) -> Result<StmtKind, ParseError> {
        let (ty, name) = match self.try_typed_decl_head() {
            Some((_, ty, name)) => (ty, name),
            None => {
                let name = self.expect_ident()?;
                (None, name)
            }
        };
        self.expect(&TokenKind::Eq, "`=`")?;
        let init = self.parse_value()?;
        self.end_statement()?;
        Ok(StmtKind::VarDecl(VarDecl {
            mode,
            ty,
            target: DeclTarget::Name(name),
            init,
        }))
    }

    /// Speculatively match `[qualifier] [type] name` followed by `=`.
    ///
    /// On success the parser is left on the `=`; on failure nothing is consumed.
    fn try_typed_decl_head(&mut self) -> Option<(Option<Qualifier>, Option<TypeRef>, String)> {
        let saved = self.pos;
        let qualifier = self.parse_qualifier();

        if let TokenKind::Ident(name) = self.current_kind().clone() {
            if matches!(self.peek_kind(1), TokenKind::Eq) && qualifier.is_some() {
                self.advance();
                return Some((qualifier, None, name));
            }
        }

        if let Ok(mut ty) = self.parse_type_ref() {
            if let TokenKind::Ident(name) = self.current_kind().clone() {
                if matches!(self.peek_kind(1), TokenKind::Eq) {
                    self.advance();
                    ty.qualifier = qualifier;
                    return Some((qualifier, Some(ty), name));
                }
            }
        }

        self.pos = saved;
        None
    }

    fn parse_qualifier(&mut self) -> Option<Qualifier> {
        let qualifier = match self.current_kind() {
            TokenKind::Keyword(Keyword::Const) => Qualifier::Const,
            TokenKind::Keyword(Keyword::Simple) => Qualifier::Simple,
            TokenKind::Keyword(Keyword::Series) => Qualifier::Series,
            _ => return None,
        };
        self.advance();
        Some(qualifier)
    }

    /// `name[.name]*[<T, ...>][[]]`
    fn parse_type_ref(&mut self) -> Result<TypeRef, ParseError> {
        let mut name = self.expect_ident()?;
        while matches!(self.current_kind(), TokenKind::Dot)
            && matches!(self.peek_kind(1), TokenKind::Ident(_))
        {
            self.advance();
            name.push('.');
            name.push_str(&self.expect_ident()?);
        }

        let mut ty = TypeRef::named(name);
        if self.check(&TokenKind::Lt) {
            ty.args = self.parse_type_args()?;
        }
        if self.check(&TokenKind::LBracket) && matches!(self.peek_kind(1), TokenKind::RBracket) {
            self.advance();
            self.advance();
            ty.array = true;
        }
        Ok(ty)
    }

    /// `<T, U>`
    fn parse_type_args(&mut self) -> Result<Vec<TypeRef>, ParseError> {
        self.expect(&TokenKind::Lt, "`<`")?;
        let mut args = vec![self.parse_type_ref()?];
        while self.eat(&TokenKind::Comma) {
            args.push(self.parse_type_ref()?);
        }
        self.expect(&TokenKind::Gt, "`>`")?;
        Ok(args)
    }

    /// Typed or plain declaration, reassignment, or expression statement
    fn parse_declaration_or_expression(&mut self) -> Result<StmtKind, ParseError> {
        if let Some((qualifier, ty, name)) = self.try_typed_decl_head() {
            let mode = match qualifier {
                Some(Qualifier::Const) => DeclMode::Const,
                _ => DeclMode::Plain,
            };
            self.expect(&TokenKind::Eq, "`=`")?;
            let init = self.parse_value()?;
            self.end_statement()?;
            return Ok(StmtKind::VarDecl(VarDecl {
                mode,
                ty,
                target: DeclTarget::Name(name),
                init,
            }));
        }

        if let TokenKind::Ident(name) = self.current_kind().clone() {
            if matches!(self.peek_kind(1), TokenKind::Eq) {
                self.advance();
                self.advance();
                let init = self.parse_value()?;
                self.end_statement()?;
                return Ok(StmtKind::VarDecl(VarDecl {
                    mode: DeclMode::Plain,
                    ty: None,
                    target: DeclTarget::Name(name),
                    init,
                }));
            }
        }

        let kind = self.parse_simple_statement()?;
        self.end_statement()?;
        Ok(kind)
    }

    /// Expression statement, optionally followed by `:=` or a compound assignment
    fn parse_simple_statement(&mut self) -> Result<StmtKind, ParseError> {
        let expr = self.parse_expression()?;
        let Some(op) = self.check_assign_op() else {
            return Ok(StmtKind::Expr(expr));
        };
        if !matches!(expr, Expr::Ident(_) | Expr::Member { .. }) {
            return Err(self.error("an assignable target before the assignment operator"));
        }
        self.advance();
        let value = self.parse_value()?;
        Ok(StmtKind::Reassign(Reassign {
            target: expr,
            op,
            value,
        }))
    }

    fn check_assign_op(&self) -> Option<AssignOp> {
        match self.current_kind() {
            TokenKind::ColonEq => Some(AssignOp::Assign),
            TokenKind::PlusEq => Some(AssignOp::Add),
            TokenKind::MinusEq => Some(AssignOp::Sub),
            TokenKind::StarEq => Some(AssignOp::Mul),
            TokenKind::SlashEq => Some(AssignOp::Div),
            TokenKind::PercentEq => Some(AssignOp::Mod),
            _ => None,
        }
    }

    /// Parse indented block
    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&TokenKind::Newline, "newline before an indented block")?;
        self.skip_newlines();
        self.expect(&TokenKind::Indent, "an indented block")?;

        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if matches!(self.current_kind(), TokenKind::Dedent | TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_statement()?);
        }

        self.eat(&TokenKind::Dedent);
        Ok(stmts)
    }

    /// `if` ... `else if` ... `else` as a list of branches plus the final else
    fn parse_if_branches(&mut self) -> Result<(Vec<ConditionalBranch>, Option<Vec<Stmt>>), ParseError> {
        self.expect_keyword(Keyword::If)?;
        let test = self.parse_expression()?;
        let body = self.parse_block()?;
        let mut branches = vec![ConditionalBranch { test, body }];
        let mut orelse = None;

        while self.check_keyword(Keyword::Else) {
            self.advance();
            if self.check_keyword(Keyword::If) {
                self.advance();
                let test = self.parse_expression()?;
                let body = self.parse_block()?;
                branches.push(ConditionalBranch { test, body });
            } else {
                orelse = Some(self.parse_block()?);
                break;
            }
        }

        Ok((branches, orelse))
    }

    fn parse_if_stmt(&mut self) -> Result<StmtKind, ParseError> {
        let line = self.current().line;
        let (branches, orelse) = self.parse_if_branches()?;

        // Build else-if chain from inside out
        let mut orelse = orelse.unwrap_or_default();
        let mut result: Option<IfStmt> = None;
        for branch in branches.into_iter().rev() {
            if let Some(inner) = result.take() {
                orelse = vec![Stmt::new(StmtKind::If(inner), line)];
            }
            result = Some(IfStmt {
                test: branch.test,
                body: branch.body,
                orelse: std::mem::take(&mut orelse),
            });
        }

        match result {
            Some(if_stmt) => Ok(StmtKind::If(if_stmt)),
            None => Err(self.error("`if`")),
        }
    }

    /// `if` in value position
    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let (branches, orelse) = self.parse_if_branches()?;
        Ok(build_conditional(branches, orelse))
    }

    fn parse_switch(&mut self) -> Result<Expr, ParseError> {
        self.expect_keyword(Keyword::Switch)?;
        let discriminant = if self.check(&TokenKind::Newline) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Newline, "newline after `switch`")?;
        self.skip_newlines();
        self.expect(&TokenKind::Indent, "indented switch cases")?;

        let mut cases = Vec::new();
        loop {
            self.skip_newlines();
            if matches!(self.current_kind(), TokenKind::Dedent | TokenKind::Eof) {
                break;
            }
            let line = self.current().line;
            let test = if self.eat(&TokenKind::FatArrow) {
                None
            } else {
                let test = self.parse_expression()?;
                self.expect(&TokenKind::FatArrow, "`=>` after a switch case")?;
                Some(test)
            };
            let body = if self.check(&TokenKind::Newline) {
                self.parse_block()?
            } else {
                let kind = if self.check_keyword(Keyword::If) || self.check_keyword(Keyword::Switch) {
                    StmtKind::Expr(self.parse_value()?)
                } else {
                    self.parse_simple_statement()?
                };
                self.end_statement()?;
                vec![Stmt::new(kind, line)]
            };
            cases.push(SwitchCase { test, body });
        }
        self.eat(&TokenKind::Dedent);

        let needs_lifting = cases.iter().any(|case| body_needs_lifting(&case.body));
        Ok(Expr::Switch(Box::new(SwitchExpr {
            discriminant,
            cases,
            needs_lifting,
        })))
    }

    fn parse_for_stmt(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_keyword(Keyword::For)?;

        if self.eat(&TokenKind::LBracket) {
            let index = self.expect_ident()?;
            self.expect(&TokenKind::Comma, "`,`")?;
            let value = self.expect_ident()?;
            self.expect(&TokenKind::RBracket, "`]`")?;
            self.expect_keyword(Keyword::In)?;
            let iterable = self.parse_expression()?;
            let body = self.parse_block()?;
            return Ok(StmtKind::ForIn(ForIn {
                target: ForTarget::Pair(index, value),
                iterable,
                body,
            }));
        }

        let var = self.expect_ident()?;
        if self.check_keyword(Keyword::In) {
            self.advance();
            let iterable = self.parse_expression()?;
            let body = self.parse_block()?;
            return Ok(StmtKind::ForIn(ForIn {
                target: ForTarget::Name(var),
                iterable,
                body,
            }));
        }

        self.expect(&TokenKind::Eq, "`=` or `in` in a for loop")?;
        let start = self.parse_expression()?;
        if !self.check_word("to") {
            return Err(self.error("`to`"));
        }
        self.advance();
        let end = self.parse_expression()?;
        let step = if self.check_word("by") {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(StmtKind::ForRange(ForRange {
            var,
            start,
            end,
            step,
            body,
        }))
    }

    fn parse_while_stmt(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_keyword(Keyword::While)?;
        let test = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(StmtKind::While(WhileStmt { test, body }))
    }

    fn parse_export(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_keyword(Keyword::Export)?;
        match self.current_kind() {
            TokenKind::Keyword(Keyword::Type) => Ok(StmtKind::TypeDecl(self.parse_type_decl(true)?)),
            TokenKind::Keyword(Keyword::Method) => {
                Ok(StmtKind::FunctionDecl(self.parse_method_decl(true)?))
            }
            TokenKind::Ident(_) if self.is_function_decl_head() => Ok(StmtKind::FunctionDecl(
                self.parse_function_decl(FunctionKind::Function, true)?,
            )),
            _ => Err(self.error("a function, method or type after `export`")),
        }
    }

    fn parse_method_decl(&mut self, exported: bool) -> Result<FunctionDecl, ParseError> {
        self.expect_keyword(Keyword::Method)?;
        self.parse_function_decl(FunctionKind::Method, exported)
    }

    /// `name(params) => body`
    fn parse_function_decl(
        &mut self,
        kind: FunctionKind,
        exported: bool,
    ) -> Result<FunctionDecl, ParseError> {
        let line = self.current().line;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            params.push(self.parse_param()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        self.expect(&TokenKind::FatArrow, "`=>`")?;

        let body = if self.check(&TokenKind::Newline) {
            self.parse_block()?
        } else {
            let value = self.parse_value()?;
            self.end_statement()?;
            vec![Stmt::new(StmtKind::Expr(value), line)]
        };

        Ok(FunctionDecl {
            name,
            kind,
            params,
            body: implicit_return(body),
            exported,
        })
    }

    /// `[qualifier] [type] name [= default]`
    fn parse_param(&mut self) -> Result<Param, ParseError> {
        let qualifier = self.parse_qualifier();
        let typed = matches!(self.current_kind(), TokenKind::Ident(_))
            && matches!(
                self.peek_kind(1),
                TokenKind::Ident(_) | TokenKind::Dot | TokenKind::Lt | TokenKind::LBracket
            );
        let ty = if typed {
            let mut ty = self.parse_type_ref()?;
            ty.qualifier = qualifier;
            Some(ty)
        } else {
            None
        };
        let name = self.expect_ident()?;
        let default = if self.eat(&TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Param { name, ty, default })
    }

    /// `type Name` followed by an indented list of fields
    fn parse_type_decl(&mut self, exported: bool) -> Result<TypeDecl, ParseError> {
        self.expect_keyword(Keyword::Type)?;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::Newline, "newline after the type name")?;
        self.skip_newlines();
        self.expect(&TokenKind::Indent, "indented type fields")?;

        let mut fields = Vec::new();
        loop {
            self.skip_newlines();
            if matches!(self.current_kind(), TokenKind::Dedent | TokenKind::Eof) {
                break;
            }
            let qualifier = self.parse_qualifier();
            let mut ty = self.parse_type_ref()?;
            ty.qualifier = qualifier;
            let field_name = self.expect_ident()?;
            let default = if self.eat(&TokenKind::Eq) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.end_statement()?;
            fields.push(Field {
                name: field_name,
                ty,
                default,
            });
        }
        self.eat(&TokenKind::Dedent);

        Ok(TypeDecl {
            name,
            fields,
            exported,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression parsing
    // ─────────────────────────────────────────────────────────────────────────

    /// Right-hand side of `=`, `:=` and `=>`: an expression, or `if`/`switch` as a value
    fn parse_value(&mut self) -> Result<Expr, ParseError> {
        match self.current_kind() {
            TokenKind::Keyword(Keyword::If) => self.parse_conditional(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch(),
            _ => self.parse_expression(),
        }
    }

    /// Parse expression
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_ternary()
    }

    /// Parse ternary: cond ? a : b
    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let test = self.parse_or()?;

        if self.eat(&TokenKind::Question) {
            let consequent = self.parse_ternary()?;
            self.expect(&TokenKind::Colon, "`:` in a ternary expression")?;
            let alternate = self.parse_ternary()?;
            return Ok(Expr::Ternary {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            });
        }

        Ok(test)
    }

    /// Parse or: a or b
    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.check_keyword(Keyword::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    /// Parse and: a and b
    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.check_keyword(Keyword::And) {
            self.advance();
            let right = self.parse_equality()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.current_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Keyword(Keyword::Not) => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// Parse postfix: calls, history subscripts, members, generic calls
    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_atom()?;

        loop {
            match self.current_kind() {
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_call_args()?;
                    self.expect(&TokenKind::RParen, "`)` after call arguments")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        type_args: Vec::new(),
                        args,
                    };
                }
                TokenKind::Lt => {
                    let Some(type_args) = self.try_generic_call_args() else {
                        break;
                    };
                    self.expect(&TokenKind::LParen, "`(`")?;
                    let args = self.parse_call_args()?;
                    self.expect(&TokenKind::RParen, "`)` after call arguments")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        type_args,
                        args,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let offset = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket, "`]` after history offset")?;
                    expr = Expr::History {
                        target: Box::new(expr),
                        offset: Box::new(offset),
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let property = match self.current_kind().clone() {
                        TokenKind::Ident(name) => name,
                        TokenKind::Keyword(kw) => kw.as_str().to_string(),
                        _ => return Err(self.error("member name after `.`")),
                    };
                    self.advance();
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// `<T, ...>(` after a callee; consumes the type list only when a call follows
    fn try_generic_call_args(&mut self) -> Option<Vec<TypeRef>> {
        let saved = self.pos;
        match self.parse_type_args() {
            Ok(args) if self.check(&TokenKind::LParen) => Some(args),
            _ => {
                self.pos = saved;
                None
            }
        }
    }

    /// Parse call arguments (positional and named)
    fn parse_call_args(&mut self) -> Result<Vec<Argument>, ParseError> {
        let mut args = Vec::new();

        while !self.check(&TokenKind::RParen) {
            let named = matches!(self.current_kind(), TokenKind::Ident(_))
                && matches!(self.peek_kind(1), TokenKind::Eq);

            if named {
                let name = self.expect_ident()?;
                self.expect(&TokenKind::Eq, "`=`")?;
                let value = self.parse_value()?;
                args.push(Argument {
                    name: Some(name),
                    value,
                });
            } else {
                args.push(Argument {
                    name: None,
                    value: self.parse_value()?,
                });
            }

            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        Ok(args)
    }

    /// Parse atom (literals, names, parens, tuples)
    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        match self.current_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                if name == "na" && !self.check(&TokenKind::LParen) {
                    return Ok(Expr::Na);
                }
                Ok(Expr::Ident(name))
            }
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::Int(n))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::Float(f))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::Color(c) => {
                self.advance();
                Ok(Expr::Color(c))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_value()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    items.push(self.parse_expression()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket, "`]`")?;
                Ok(Expr::Tuple(items))
            }
            _ => Err(self.error("expression")),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Build a value-position conditional, collapsing it into nested ternaries
/// when every branch is a single liftable-free expression.
fn build_conditional(branches: Vec<ConditionalBranch>, orelse: Option<Vec<Stmt>>) -> Expr {
    let needs_lifting = branches.iter().any(|b| body_needs_lifting(&b.body))
        || orelse.as_deref().is_some_and(body_needs_lifting);

    if needs_lifting {
        return Expr::Conditional(Box::new(ConditionalExpr {
            branches,
            orelse,
            needs_lifting,
        }));
    }

    let mut alternate = orelse.and_then(single_expression).unwrap_or(Expr::Na);
    for branch in branches.into_iter().rev() {
        let consequent = single_expression(branch.body).unwrap_or(Expr::Na);
        alternate = Expr::Ternary {
            test: Box::new(branch.test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        };
    }
    alternate
}

fn single_expression(mut body: Vec<Stmt>) -> Option<Expr> {
    match body.pop() {
        Some(Stmt {
            kind: StmtKind::Expr(expr),
            ..
        }) if body.is_empty() => Some(expr),
        _ => None,
    }
}

/// Turn the final statement of a function body into its result.
fn implicit_return(mut body: Vec<Stmt>) -> Vec<Stmt> {
    let Some(last) = body.pop() else {
        return body;
    };
    let line = last.line;
    match last.kind {
        StmtKind::Expr(expr) => {
            body.push(Stmt::new(StmtKind::Return(Some(expr)), line));
        }
        StmtKind::If(if_stmt) => {
            let (branches, orelse) = if_stmt.into_branches();
            let value = build_conditional(branches, orelse);
            body.push(Stmt::new(StmtKind::Return(Some(value)), line));
        }
        StmtKind::VarDecl(decl) => {
            let result = match &decl.target {
                DeclTarget::Name(name) => Expr::Ident(name.clone()),
                DeclTarget::Tuple(names) => {
                    Expr::Tuple(names.iter().cloned().map(Expr::Ident).collect())
                }
            };
            body.push(Stmt::new(StmtKind::VarDecl(decl), line));
            body.push(Stmt::new(StmtKind::Return(Some(result)), line));
        }
        StmtKind::Reassign(assign) => {
            let result = assign.target.clone();
            body.push(Stmt::new(StmtKind::Reassign(assign), line));
            body.push(Stmt::new(StmtKind::Return(Some(result)), line));
        }
        other => body.push(Stmt::new(other, line)),
    }
    body
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a token vector into a Program
pub fn parse(tokens: Vec<Token>) -> Result<Program, ParseError> {
    Parser::new(tokens).parse_program()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(source: &str) -> Program {
        parse(tokenize(source).unwrap()).unwrap()
    }

    fn parse_err(source: &str) -> ParseError {
        parse(tokenize(source).unwrap()).unwrap_err()
    }

    #[test]
    fn test_parse_plain_declaration() {
        let program = parse_src("x = 10\n");
        assert_eq!(program.body.len(), 1);
        match &program.body[0].kind {
            StmtKind::VarDecl(decl) => {
                assert_eq!(decl.mode, DeclMode::Plain);
                assert_eq!(decl.target, DeclTarget::Name("x".into()));
                assert_eq!(decl.init, Expr::Int(10));
            }
            other => panic!("Expected VarDecl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_typed_var_declaration() {
        let program = parse_src("var float total = 0.0\n");
        match &program.body[0].kind {
            StmtKind::VarDecl(decl) => {
                assert_eq!(decl.mode, DeclMode::Var);
                assert_eq!(decl.ty.as_ref().map(|t| t.name.as_str()), Some("float"));
                assert_eq!(decl.target, DeclTarget::Name("total".into()));
            }
            other => panic!("Expected VarDecl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_generic_typed_declaration() {
        let program = parse_src("array<float> xs = array.new<float>(3)\n");
        match &program.body[0].kind {
            StmtKind::VarDecl(decl) => {
                assert_eq!(decl.ty.as_ref().map(TypeRef::display), Some("array<float>".into()));
                match &decl.init {
                    Expr::Call { type_args, .. } => assert_eq!(type_args[0].name, "float"),
                    other => panic!("Expected generic call, got {:?}", other),
                }
            }
            other => panic!("Expected VarDecl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_reassignment_and_compound() {
        let program = parse_src("x := x + 1\ny += 2\n");
        match &program.body[0].kind {
            StmtKind::Reassign(assign) => assert_eq!(assign.op, AssignOp::Assign),
            other => panic!("Expected Reassign, got {:?}", other),
        }
        match &program.body[1].kind {
            StmtKind::Reassign(assign) => assert_eq!(assign.op, AssignOp::Add),
            other => panic!("Expected Reassign, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let program = parse_src("r = a or b and c == d + e * -f\n");
        let StmtKind::VarDecl(decl) = &program.body[0].kind else {
            panic!("Expected VarDecl");
        };
        match &decl.init {
            Expr::Binary { op: BinaryOp::Or, right, .. } => match right.as_ref() {
                Expr::Binary { op: BinaryOp::And, right, .. } => match right.as_ref() {
                    Expr::Binary { op: BinaryOp::Eq, right, .. } => match right.as_ref() {
                        Expr::Binary { op: BinaryOp::Add, right, .. } => {
                            assert!(matches!(right.as_ref(), Expr::Binary { op: BinaryOp::Mul, .. }))
                        }
                        other => panic!("Expected Add, got {:?}", other),
                    },
                    other => panic!("Expected Eq, got {:?}", other),
                },
                other => panic!("Expected And, got {:?}", other),
            },
            other => panic!("Expected Or, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_history_and_member_call() {
        let program = parse_src("d = close[1] - ta.sma(close, 14)\n");
        let StmtKind::VarDecl(decl) = &program.body[0].kind else {
            panic!("Expected VarDecl");
        };
        let Expr::Binary { left, right, .. } = &decl.init else {
            panic!("Expected Binary");
        };
        assert!(matches!(left.as_ref(), Expr::History { .. }));
        match right.as_ref() {
            Expr::Call { callee, args, .. } => {
                assert_eq!(callee.dotted_path().as_deref(), Some("ta.sma"));
                assert_eq!(args.len(), 2);
            }
            other => panic!("Expected Call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_named_arguments() {
        let program = parse_src("plot(close, title = \"Close\", color = #FF0000)\n");
        match &program.body[0].kind {
            StmtKind::Expr(Expr::Call { args, .. }) => {
                assert_eq!(args.len(), 3);
                assert_eq!(args[0].name, None);
                assert_eq!(args[1].name.as_deref(), Some("title"));
                assert_eq!(args[2].value, Expr::Color("#FF0000".into()));
            }
            other => panic!("Expected Call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_na_value_and_call() {
        let program = parse_src("a = na\nb = na(a)\n");
        let StmtKind::VarDecl(first) = &program.body[0].kind else {
            panic!("Expected VarDecl");
        };
        assert_eq!(first.init, Expr::Na);
        let StmtKind::VarDecl(second) = &program.body[1].kind else {
            panic!("Expected VarDecl");
        };
        assert!(matches!(second.init, Expr::Call { .. }));
    }

    #[test]
    fn test_parse_tuple_declaration() {
        let program = parse_src("[m, s, h] = ta.macd(close, 12, 26, 9)\n");
        match &program.body[0].kind {
            StmtKind::VarDecl(decl) => assert_eq!(
                decl.target,
                DeclTarget::Tuple(vec!["m".into(), "s".into(), "h".into()])
            ),
            other => panic!("Expected tuple VarDecl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_function_with_implicit_return() {
        let source = "f(float src, int len = 14) =>\n    a = src * 2\n    a + len\n";
        let program = parse_src(source);
        match &program.body[0].kind {
            StmtKind::FunctionDecl(f) => {
                assert_eq!(f.name, "f");
                assert_eq!(f.params.len(), 2);
                assert_eq!(f.params[1].default, Some(Expr::Int(14)));
                assert!(matches!(f.body.last().map(|s| &s.kind), Some(StmtKind::Return(Some(_)))));
            }
            other => panic!("Expected FunctionDecl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_inline_function() {
        let program = parse_src("double(x) => x * 2\ny = double(3)\n");
        assert_eq!(program.body.len(), 2);
        match &program.body[0].kind {
            StmtKind::FunctionDecl(f) => assert_eq!(f.body.len(), 1),
            other => panic!("Expected FunctionDecl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_if_else_chain() {
        let source = "if a\n    x := 1\nelse if b\n    x := 2\nelse\n    x := 3\n";
        let program = parse_src(source);
        match &program.body[0].kind {
            StmtKind::If(if_stmt) => {
                assert_eq!(if_stmt.body.len(), 1);
                assert!(matches!(if_stmt.orelse[0].kind, StmtKind::If(_)));
            }
            other => panic!("Expected If, got {:?}", other),
        }
    }

    #[test]
    fn test_simple_conditional_value_collapses_to_ternary() {
        let program = parse_src("x = if c\n    1\nelse\n    2\n");
        let StmtKind::VarDecl(decl) = &program.body[0].kind else {
            panic!("Expected VarDecl");
        };
        assert!(matches!(decl.init, Expr::Ternary { .. }));
    }

    #[test]
    fn test_block_conditional_value_needs_lifting() {
        let program = parse_src("x = if c\n    t = 1\n    t * 2\nelse\n    0\ny = x\n");
        assert_eq!(program.body.len(), 2);
        let StmtKind::VarDecl(decl) = &program.body[0].kind else {
            panic!("Expected VarDecl");
        };
        match &decl.init {
            Expr::Conditional(cond) => {
                assert!(cond.needs_lifting);
                assert_eq!(cond.branches[0].body.len(), 2);
                assert!(cond.orelse.is_some());
            }
            other => panic!("Expected Conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_switch_with_default() {
        let source = "s = switch mode\n    \"a\" => 1\n    \"b\" => 2\n    => 0\n";
        let program = parse_src(source);
        let StmtKind::VarDecl(decl) = &program.body[0].kind else {
            panic!("Expected VarDecl");
        };
        match &decl.init {
            Expr::Switch(switch) => {
                assert!(switch.discriminant.is_some());
                assert_eq!(switch.cases.len(), 3);
                assert!(switch.cases[2].test.is_none());
                assert!(!switch.needs_lifting);
            }
            other => panic!("Expected Switch, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_for_loops() {
        let program = parse_src(
            "for i = 0 to 10 by 2\n    s += i\nfor v in xs\n    s += v\nfor [i, v] in xs\n    s += v\n",
        );
        assert!(matches!(&program.body[0].kind, StmtKind::ForRange(r) if r.step.is_some()));
        assert!(matches!(&program.body[1].kind, StmtKind::ForIn(f) if f.target == ForTarget::Name("v".into())));
        assert!(matches!(&program.body[2].kind, StmtKind::ForIn(f) if matches!(f.target, ForTarget::Pair(..))));
    }

    #[test]
    fn test_parse_type_and_method() {
        let source = "type Point\n    float x = 0.0\n    float y\nmethod norm(Point self) =>\n    self.x + self.y\n";
        let program = parse_src(source);
        match &program.body[0].kind {
            StmtKind::TypeDecl(t) => {
                assert_eq!(t.name, "Point");
                assert_eq!(t.fields.len(), 2);
                assert!(t.fields[0].default.is_some());
            }
            other => panic!("Expected TypeDecl, got {:?}", other),
        }
        match &program.body[1].kind {
            StmtKind::FunctionDecl(f) => {
                assert_eq!(f.kind, FunctionKind::Method);
                assert_eq!(f.params[0].name, "self");
            }
            other => panic!("Expected method, got {:?}", other),
        }
    }

    #[test]
    fn test_import_is_rejected() {
        let err = parse_err("import user/lib/1 as lib\n");
        assert!(err.expected.contains("imports are not supported"));
    }

    #[test]
    fn test_error_reports_expected_and_found() {
        let err = parse_err("x = (1 + 2]\n");
        assert_eq!(err.line, 1);
        assert!(err.expected.contains(")"));
    }
}
