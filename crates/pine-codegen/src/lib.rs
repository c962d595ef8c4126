//! Stage-1 code generator
//!
//! Lowers the Pine AST into the script dialect consumed by the context
//! transformer: a single arrow function over `context` whose body pulls the
//! market series out of `context.data` and every other free name out of
//! `context.pine`.

use pine_parser::ast::{DeclTarget, Expr, ForTarget, FunctionKind, Program, Stmt, StmtKind};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

pub mod expr;
pub mod lift;
pub mod stmt;

/// Name of the entry function's parameter
pub const CONTEXT_PARAM: &str = "context";

/// Market series destructured from `context.data`, in emission order
pub const DATA_SERIES: &[&str] = &[
    "open",
    "high",
    "low",
    "close",
    "volume",
    "hl2",
    "hlc3",
    "ohlc4",
    "hlcc4",
    "time",
    "time_close",
    "bar_index",
    "last_bar_index",
    "last_bar_time",
];

/// Host globals that are never destructured
const HOST_GLOBALS: &[&str] = &["NaN", "undefined", "Infinity", "Math"];

/// Words a Pine identifier may spell but a script binding may not
const RESERVED_WORDS: &[&str] = &[
    "await",
    "case",
    "catch",
    "class",
    "debugger",
    "default",
    "delete",
    "do",
    "enum",
    "eval",
    "extends",
    "finally",
    "function",
    "implements",
    "instanceof",
    "interface",
    "let",
    "new",
    "null",
    "package",
    "private",
    "protected",
    "public",
    "return",
    "static",
    "super",
    "this",
    "throw",
    "try",
    "typeof",
    "void",
    "with",
    "yield",
    "arguments",
];

/// Binding name for a Pine identifier, suffixed with `_` when it would
/// collide with a reserved word.
pub fn js_ident(name: &str) -> String {
    if RESERVED_WORDS.contains(&name) {
        format!("{}_", name)
    } else {
        name.to_string()
    }
}

pub struct Codegen {
    pub(crate) output: String,
    pub(crate) indent_level: usize,
    /// Every name the script binds, at any depth
    pub(crate) declared: HashSet<String>,
    /// Names of user `method` declarations
    pub(crate) methods: HashSet<String>,
    /// Every identifier read or written while generating
    pub(crate) referenced: BTreeSet<String>,
    /// Next suffix for generated bindings
    fresh_counter: usize,
}

impl Codegen {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            indent_level: 0,
            declared: HashSet::new(),
            methods: HashSet::new(),
            referenced: BTreeSet::new(),
            fresh_counter: 0,
        }
    }

    pub fn generate_program(&mut self, program: &Program) -> String {
        self.collect_declarations(&program.body);

        // Body first: the header depends on what the body references.
        self.indent_level = 1;
        for stmt in &program.body {
            self.generate_stmt(stmt);
        }
        let body = std::mem::take(&mut self.output);

        let (data, pine) = self.free_symbols();
        debug!(
            statements = program.body.len(),
            data = data.len(),
            pine = pine.len(),
            "generated stage-1 body"
        );

        let mut out = format!("({}) => {{\n", CONTEXT_PARAM);
        if !data.is_empty() {
            out.push_str(&format!(
                "    const {{ {} }} = {}.data;\n",
                data.join(", "),
                CONTEXT_PARAM
            ));
        }
        if !pine.is_empty() {
            out.push_str(&format!(
                "    const {{ {} }} = {}.pine;\n",
                pine.join(", "),
                CONTEXT_PARAM
            ));
        }
        out.push_str(&body);
        out.push_str("}\n");
        out
    }

    pub(crate) fn indent_str(&self) -> String {
        "    ".repeat(self.indent_level)
    }

    pub(crate) fn push_indent(&mut self) {
        for _ in 0..self.indent_level {
            self.output.push_str("    ");
        }
    }

    /// Emit one indented line.
    pub(crate) fn line(&mut self, text: &str) {
        self.push_indent();
        self.output.push_str(text);
        self.output.push('\n');
    }

    /// Record a reference and return its binding name.
    pub(crate) fn ident(&mut self, name: &str) -> String {
        self.referenced.insert(name.to_string());
        js_ident(name)
    }

    /// Unused binding name `{base}{n}`, declared so it never reaches the header.
    pub(crate) fn fresh_binding(&mut self, base: &str) -> String {
        loop {
            let name = format!("{}{}", base, self.fresh_counter);
            self.fresh_counter += 1;
            if self.declared.insert(name.clone()) {
                return name;
            }
        }
    }

    /// Referenced names the script does not bind, split into data series and
    /// library symbols.
    fn free_symbols(&self) -> (Vec<String>, Vec<String>) {
        let free: Vec<&String> = self
            .referenced
            .iter()
            .filter(|name| !self.declared.contains(*name))
            .filter(|name| !HOST_GLOBALS.contains(&name.as_str()))
            .collect();

        let data = DATA_SERIES
            .iter()
            .filter(|series| free.iter().any(|name| name == *series))
            .map(|series| series.to_string())
            .collect();
        let pine = free
            .into_iter()
            .filter(|name| !DATA_SERIES.contains(&name.as_str()))
            .map(|name| js_ident(name))
            .collect();
        (data, pine)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Declaration pre-pass
    // ─────────────────────────────────────────────────────────────────────────

    fn collect_declarations(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::VarDecl(decl) => {
                    match &decl.target {
                        DeclTarget::Name(name) => {
                            self.declared.insert(name.clone());
                        }
                        DeclTarget::Tuple(names) => {
                            self.declared.extend(names.iter().cloned());
                        }
                    }
                    self.collect_expr(&decl.init);
                }
                StmtKind::Reassign(assign) => self.collect_expr(&assign.value),
                StmtKind::FunctionDecl(func) => {
                    self.declared.insert(func.name.clone());
                    if func.kind == FunctionKind::Method {
                        self.methods.insert(func.name.clone());
                    }
                    for param in &func.params {
                        self.declared.insert(param.name.clone());
                    }
                    self.collect_declarations(&func.body);
                }
                StmtKind::TypeDecl(ty) => {
                    self.declared.insert(ty.name.clone());
                }
                StmtKind::If(if_stmt) => {
                    self.collect_expr(&if_stmt.test);
                    self.collect_declarations(&if_stmt.body);
                    self.collect_declarations(&if_stmt.orelse);
                }
                StmtKind::ForRange(range) => {
                    self.declared.insert(range.var.clone());
                    self.collect_declarations(&range.body);
                }
                StmtKind::ForIn(for_in) => {
                    match &for_in.target {
                        ForTarget::Name(name) => {
                            self.declared.insert(name.clone());
                        }
                        ForTarget::Pair(index, value) => {
                            self.declared.insert(index.clone());
                            self.declared.insert(value.clone());
                        }
                    }
                    self.collect_declarations(&for_in.body);
                }
                StmtKind::While(while_stmt) => self.collect_declarations(&while_stmt.body),
                StmtKind::Return(Some(expr)) | StmtKind::Expr(expr) => self.collect_expr(expr),
                StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue => {}
            }
        }
    }

    /// Only statement-bearing expressions can declare anything.
    fn collect_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Conditional(cond) => {
                for branch in &cond.branches {
                    self.collect_declarations(&branch.body);
                }
                if let Some(orelse) = &cond.orelse {
                    self.collect_declarations(orelse);
                }
            }
            Expr::Switch(switch) => {
                for case in &switch.cases {
                    self.collect_declarations(&case.body);
                }
            }
            Expr::Binary { left, right, .. } => {
                self.collect_expr(left);
                self.collect_expr(right);
            }
            Expr::Unary { operand, .. } => self.collect_expr(operand),
            Expr::Ternary {
                test,
                consequent,
                alternate,
            } => {
                self.collect_expr(test);
                self.collect_expr(consequent);
                self.collect_expr(alternate);
            }
            Expr::Call { callee, args, .. } => {
                self.collect_expr(callee);
                for arg in args {
                    self.collect_expr(&arg.value);
                }
            }
            Expr::Member { object, .. } => self.collect_expr(object),
            Expr::History { target, offset } => {
                self.collect_expr(target);
                self.collect_expr(offset);
            }
            Expr::Tuple(items) => {
                for item in items {
                    self.collect_expr(item);
                }
            }
            Expr::Ident(_)
            | Expr::Int(_)
            | Expr::Float(_)
            | Expr::Str(_)
            | Expr::Bool(_)
            | Expr::Color(_)
            | Expr::Na => {}
        }
    }
}

impl Default for Codegen {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate Stage-1 source for a parsed program.
pub fn generate(program: &Program) -> String {
    Codegen::new().generate_program(program)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use pine_parser::parse_source;

    fn compile(source: &str) -> String {
        generate(&parse_source(source).unwrap())
    }

    #[test]
    fn test_header_splits_data_and_library() {
        let out = compile("fast = ta.ema(close, 9)\nplot(fast)\n");
        assert!(out.starts_with("(context) => {\n"));
        assert!(out.contains("    const { close } = context.data;\n"));
        assert!(out.contains("    const { plot, ta } = context.pine;\n"));
        assert!(out.ends_with("}\n"));
    }

    #[test]
    fn test_data_series_keep_fixed_order() {
        let out = compile("x = volume + close + open\n");
        assert!(out.contains("const { open, close, volume } = context.data;"));
    }

    #[test]
    fn test_declared_names_are_not_destructured() {
        let out = compile("len = 14\nplot(len)\n");
        assert!(out.contains("const { plot } = context.pine;"));
        assert!(!out.contains("len } = context"));
    }

    #[test]
    fn test_no_header_for_closed_program() {
        let out = compile("x = 1\n");
        assert_eq!(out, "(context) => {\n    let x = 1;\n}\n");
    }

    #[test]
    fn test_reserved_words_are_suffixed() {
        assert_eq!(js_ident("new"), "new_");
        assert_eq!(js_ident("delete"), "delete_");
        assert_eq!(js_ident("close"), "close");
        let out = compile("default = 3\nplot(default)\n");
        assert!(out.contains("let default_ = 3;"));
        assert!(out.contains("plot(default_);"));
    }

    #[test]
    fn test_host_globals_are_skipped() {
        let out = compile("x = na\n");
        assert!(!out.contains("context.pine"));
        assert!(out.contains("let x = NaN;"));
    }
}
