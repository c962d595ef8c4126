//! Lifting of statement-bearing expressions
//!
//! `if` and `switch` used as values cannot be written as a single script
//! expression once a branch holds more than one statement. Such values are
//! emitted as if/else chains whose branches deliver their last statement to a
//! [`Sink`]: an assignment to a pre-declared variable, a `return` inside an
//! immediately-invoked arrow, or nothing at all in statement position.

use crate::Codegen;
use crate::expr::{PREC_RELATIONAL, PREC_TERNARY};
use pine_parser::ast::{self, DeclTarget, Expr, Stmt, StmtKind, SwitchExpr};

/// Where the value of a branch goes
pub(crate) enum Sink {
    /// `name = value;`
    Assign(String),
    /// `return value;`
    Return,
    /// Value is dropped
    Discard,
}

/// Value of a conditional with no matching branch
const CONDITIONAL_FALLBACK: &str = "NaN";
/// Value of a switch with no matching case
const SWITCH_FALLBACK: &str = "undefined";
/// Prefix of the binding holding an evaluated switch discriminant
const SWITCH_BINDING: &str = "_switch";

impl Codegen {
    /// `(() => { ... })()` evaluating a lifted conditional or switch.
    pub(crate) fn lifted_iife(&mut self, expr: &Expr) -> String {
        let saved = std::mem::take(&mut self.output);
        self.indent_level += 1;
        self.emit_lifted_into(expr, &Sink::Return);
        self.indent_level -= 1;
        let body = std::mem::replace(&mut self.output, saved);
        format!("(() => {{\n{}{}}})()", body, self.indent_str())
    }

    /// Emit a conditional or switch as a chain feeding `sink`.
    pub(crate) fn emit_lifted_into(&mut self, expr: &Expr, sink: &Sink) {
        match expr {
            Expr::Conditional(cond) => {
                let arms = cond
                    .branches
                    .iter()
                    .map(|branch| (self.expr_to_string(&branch.test), branch.body.as_slice()))
                    .collect();
                self.emit_chain(arms, cond.orelse.as_deref(), sink, CONDITIONAL_FALLBACK);
            }
            Expr::Switch(switch) => {
                let (arms, default) = self.switch_arms(switch);
                self.emit_chain(arms, default, sink, SWITCH_FALLBACK);
            }
            other => {
                let value = self.expr_to_string(other);
                self.emit_sink(sink, &value);
            }
        }
    }

    /// Case tests as conditions, plus the default body.
    fn switch_arms<'a>(
        &mut self,
        switch: &'a SwitchExpr,
    ) -> (Vec<(String, &'a [Stmt])>, Option<&'a [Stmt]>) {
        let discriminant = switch
            .discriminant
            .as_ref()
            .map(|d| self.bind_discriminant(d));

        let mut arms = Vec::new();
        let mut default = None;
        for case in &switch.cases {
            match &case.test {
                Some(test) => {
                    let test = match &discriminant {
                        Some(d) => format!("{} == {}", d, self.expr_prec(test, PREC_RELATIONAL)),
                        None => self.expr_to_string(test),
                    };
                    arms.push((test, case.body.as_slice()));
                }
                None => default = Some(case.body.as_slice()),
            }
        }
        (arms, default)
    }

    /// Text compared against each case. Anything beyond a name or literal is
    /// evaluated once into a fresh binding emitted ahead of the current
    /// statement, so a call in the discriminant keeps a single call site.
    fn bind_discriminant(&mut self, discriminant: &Expr) -> String {
        if is_plain_operand(discriminant) {
            return self.expr_prec(discriminant, PREC_RELATIONAL);
        }
        let value = self.expr_to_string(discriminant);
        let name = self.fresh_binding(SWITCH_BINDING);
        self.line(&format!("let {} = {};", name, value));
        name
    }

    /// `if (...) { } else if (...) { } else { }`, each branch feeding `sink`.
    ///
    /// Unless the sink discards, a missing final `else` feeds `fallback`.
    pub(crate) fn emit_chain(
        &mut self,
        arms: Vec<(String, &[Stmt])>,
        orelse: Option<&[Stmt]>,
        sink: &Sink,
        fallback: &str,
    ) {
        if arms.is_empty() {
            match orelse {
                Some(body) => self.emit_branch(body, sink, fallback),
                None => self.emit_sink(sink, fallback),
            }
            return;
        }

        for (i, (test, body)) in arms.iter().enumerate() {
            if i == 0 {
                self.push_indent();
                self.output.push_str(&format!("if ({}) {{\n", test));
            } else {
                self.output.push_str(&format!(" else if ({}) {{\n", test));
            }
            self.indent_level += 1;
            self.emit_branch(body, sink, fallback);
            self.indent_level -= 1;
            self.push_indent();
            self.output.push('}');
        }

        let needs_else = orelse.is_some() || !matches!(sink, Sink::Discard);
        if needs_else {
            self.output.push_str(" else {\n");
            self.indent_level += 1;
            match orelse {
                Some(body) => self.emit_branch(body, sink, fallback),
                None => self.emit_sink(sink, fallback),
            }
            self.indent_level -= 1;
            self.push_indent();
            self.output.push('}');
        }
        self.output.push('\n');
    }

    /// Emit a branch body, delivering its last statement's value to `sink`.
    fn emit_branch(&mut self, body: &[Stmt], sink: &Sink, fallback: &str) {
        if let Sink::Discard = sink {
            self.generate_block_inline(body);
            return;
        }

        let Some((last, init)) = body.split_last() else {
            self.emit_sink(sink, fallback);
            return;
        };
        self.generate_block_inline(init);

        match &last.kind {
            StmtKind::Expr(expr) if ast::expr_needs_lifting(expr) => {
                self.emit_lifted_into(expr, sink);
            }
            StmtKind::Expr(expr) => {
                let value = self.expr_to_string(expr);
                self.emit_sink(sink, &value);
            }
            StmtKind::If(if_stmt) => {
                let (arms, orelse) = if_stmt.branches();
                let arms = arms
                    .into_iter()
                    .map(|(test, body)| (self.expr_to_string(test), body))
                    .collect();
                self.emit_chain(arms, orelse, sink, fallback);
            }
            StmtKind::VarDecl(decl) => {
                self.generate_stmt(last);
                let value = match &decl.target {
                    DeclTarget::Name(name) => self.ident(name),
                    DeclTarget::Tuple(names) => {
                        let names: Vec<String> =
                            names.iter().map(|name| self.ident(name)).collect();
                        format!("[{}]", names.join(", "))
                    }
                };
                self.emit_sink(sink, &value);
            }
            StmtKind::Reassign(assign) => {
                self.generate_stmt(last);
                let value = self.expr_to_string(&assign.target);
                self.emit_sink(sink, &value);
            }
            _ => {
                self.generate_stmt(last);
                self.emit_sink(sink, fallback);
            }
        }
    }

    fn generate_block_inline(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.generate_stmt(stmt);
        }
    }

    fn emit_sink(&mut self, sink: &Sink, value: &str) {
        match sink {
            Sink::Assign(name) => self.line(&format!("{} = {};", name, value)),
            Sink::Return => self.line(&format!("return {};", value)),
            Sink::Discard => {}
        }
    }

    /// Value-position switch whose cases are all single expressions:
    /// `d == a ? x : d == b ? y : z`.
    pub(crate) fn switch_ternary(&mut self, switch: &SwitchExpr) -> String {
        let (arms, default) = self.switch_arms(switch);

        let mut result = match default.and_then(single_value) {
            Some(value) => self.expr_prec(value, PREC_TERNARY),
            None => SWITCH_FALLBACK.to_string(),
        };
        for (test, body) in arms.into_iter().rev() {
            let value = match single_value(body) {
                Some(value) => self.expr_prec(value, PREC_TERNARY),
                None => SWITCH_FALLBACK.to_string(),
            };
            result = format!("{} ? {} : {}", test, value, result);
        }
        result
    }
}

/// Re-evaluating it per case has no effect
fn is_plain_operand(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(_)
        | Expr::Int(_)
        | Expr::Float(_)
        | Expr::Str(_)
        | Expr::Bool(_)
        | Expr::Color(_)
        | Expr::Na => true,
        Expr::Member { object, .. } => is_plain_operand(object),
        Expr::Unary { operand, .. } => is_plain_operand(operand),
        _ => false,
    }
}

fn single_value(body: &[Stmt]) -> Option<&Expr> {
    match body {
        [
            Stmt {
                kind: StmtKind::Expr(expr),
                ..
            },
        ] => Some(expr),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use crate::generate;
    use pine_parser::parse_source;

    fn compile(source: &str) -> String {
        generate(&parse_source(source).unwrap())
    }

    #[test]
    fn test_simple_if_value_collapses_to_ternary() {
        let out = compile("x = if close > open\n    1\nelse\n    0\n");
        assert!(out.contains("    let x = close > open ? 1 : 0;\n"), "{}", out);
    }

    #[test]
    fn test_lifted_if_predeclares_and_assigns() {
        let out = compile("x = if c\n    t = 1\n    t * 2\nelse\n    0\n");
        assert!(
            out.contains(
                "    let x;\n    if (c) {\n        let t = 1;\n        x = t * 2;\n    } else {\n        x = 0;\n    }\n"
            ),
            "{}",
            out
        );
    }

    #[test]
    fn test_missing_else_gets_na_fallback() {
        let out = compile("x = if c\n    t = 1\n    t * 2\n");
        assert!(out.contains("    } else {\n        x = NaN;\n    }\n"), "{}", out);
    }

    #[test]
    fn test_else_if_chain_in_lifted_value() {
        let out = compile("x = if a\n    t = 1\n    t\nelse if b\n    2\nelse\n    3\n");
        assert!(out.contains("    } else if (b) {\n        x = 2;\n"), "{}", out);
        assert!(out.contains("    } else {\n        x = 3;\n    }\n"), "{}", out);
    }

    #[test]
    fn test_var_declaration_uses_iife() {
        let out = compile("var x = if c\n    t = 1\n    t\nelse\n    0\n");
        assert!(out.contains("    var x = (() => {\n        if (c) {\n"), "{}", out);
        assert!(out.contains("            return t;\n"), "{}", out);
        assert!(out.contains("            return 0;\n"), "{}", out);
        assert!(out.contains("    })();\n"), "{}", out);
    }

    #[test]
    fn test_function_result_uses_iife() {
        let out = compile("f(a) =>\n    if a > 0\n        b = a\n        b\n    else\n        0\n");
        assert!(out.contains("        return (() => {\n"), "{}", out);
        assert!(out.contains("                let b = a;\n"), "{}", out);
        assert!(out.contains("                return b;\n"), "{}", out);
    }

    #[test]
    fn test_switch_value_becomes_ternary_chain() {
        let out = compile("x = switch m\n    \"a\" => 1\n    \"b\" => 2\n    => 3\n");
        assert!(
            out.contains("    let x = m == \"a\" ? 1 : m == \"b\" ? 2 : 3;\n"),
            "{}",
            out
        );
    }

    #[test]
    fn test_switch_without_default_ends_in_undefined() {
        let out = compile("x = switch\n    a => 1\n    b => 2\n");
        assert!(out.contains("    let x = a ? 1 : b ? 2 : undefined;\n"), "{}", out);
    }

    #[test]
    fn test_switch_statement_becomes_if_chain() {
        let out = compile("switch m\n    \"a\" => plot(1)\n    => plot(2)\n");
        assert!(
            out.contains("    if (m == \"a\") {\n        plot(1);\n    } else {\n        plot(2);\n    }\n"),
            "{}",
            out
        );
    }

    #[test]
    fn test_call_discriminant_is_evaluated_once() {
        let out = compile("m = switch input.string(\"EMA\", \"Type\")\n    \"EMA\" => 1\n    \"SMA\" => 2\n    => 3\n");
        assert!(
            out.contains(
                "    let _switch0 = input.string(\"EMA\", \"Type\");\n    let m = _switch0 == \"EMA\" ? 1 : _switch0 == \"SMA\" ? 2 : 3;\n"
            ),
            "{}",
            out
        );
        assert_eq!(out.matches("input.string(").count(), 1);
        // The binding is local, never pulled from the context
        assert!(!out.contains("_switch0 }"), "{}", out);
    }

    #[test]
    fn test_call_discriminant_in_statement_and_lifted_forms() {
        let out = compile("switch ta.change(close)\n    1 => plot(1)\n    => plot(2)\n");
        assert!(
            out.contains("    let _switch0 = ta.change(close);\n    if (_switch0 == 1) {\n"),
            "{}",
            out
        );

        let out = compile("x = switch ta.change(close)\n    1 =>\n        t = 1\n        t\n    => 0\n");
        assert!(
            out.contains("    let x;\n    let _switch0 = ta.change(close);\n    if (_switch0 == 1) {\n"),
            "{}",
            out
        );
    }

    #[test]
    fn test_generated_binding_skips_declared_names() {
        let out = compile("_switch0 = 5\nm = switch f(1)\n    1 => 1\n    => 0\n");
        assert!(out.contains("    let _switch1 = f(1);\n"), "{}", out);
    }

    #[test]
    fn test_lifted_switch_value() {
        let out = compile("x = switch\n    a =>\n        t = 1\n        t\n    => 0\n");
        assert!(out.contains("    let x;\n    if (a) {\n"), "{}", out);
        assert!(out.contains("        x = t;\n"), "{}", out);
        assert!(out.contains("        x = 0;\n"), "{}", out);
    }
}
