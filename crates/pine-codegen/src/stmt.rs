use crate::expr::{PREC_CALL, format_float, numeric_literal, quote_str};
use crate::lift::Sink;
use crate::{Codegen, js_ident};
use pine_parser::ast::{
    self, AssignOp, DeclMode, DeclTarget, Expr, ForIn, ForRange, ForTarget, FunctionDecl, Stmt,
    StmtKind, TypeDecl, VarDecl,
};

impl Codegen {
    pub fn generate_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl(decl) => self.generate_var_decl(decl),
            StmtKind::Reassign(assign) => {
                let target = self.expr_to_string(&assign.target);
                let op = match assign.op {
                    AssignOp::Assign => "=",
                    AssignOp::Add => "+=",
                    AssignOp::Sub => "-=",
                    AssignOp::Mul => "*=",
                    AssignOp::Div => "/=",
                    AssignOp::Mod => "%=",
                };
                let value = self.expr_to_string(&assign.value);
                self.line(&format!("{} {} {};", target, op, value));
            }
            StmtKind::FunctionDecl(func) => self.generate_function(func),
            StmtKind::TypeDecl(ty) => self.generate_type(ty),
            StmtKind::If(if_stmt) => {
                let (arms, orelse) = if_stmt.branches();
                let arms = arms
                    .into_iter()
                    .map(|(test, body)| (self.expr_to_string(test), body))
                    .collect();
                self.emit_chain(arms, orelse, &Sink::Discard, "NaN");
            }
            StmtKind::ForRange(range) => self.generate_for_range(range),
            StmtKind::ForIn(for_in) => self.generate_for_in(for_in),
            StmtKind::While(while_stmt) => {
                let test = self.expr_to_string(&while_stmt.test);
                self.line(&format!("while ({}) {{", test));
                self.generate_block(&while_stmt.body);
                self.line("}");
            }
            StmtKind::Return(Some(value)) => {
                let value = self.expr_to_string(value);
                self.line(&format!("return {};", value));
            }
            StmtKind::Return(None) => self.line("return;"),
            StmtKind::Break => self.line("break;"),
            StmtKind::Continue => self.line("continue;"),
            StmtKind::Expr(expr @ (Expr::Conditional(_) | Expr::Switch(_))) => {
                // Statement position: branches run for effect only
                self.emit_lifted_into(expr, &Sink::Discard);
            }
            StmtKind::Expr(expr) => {
                let text = self.expr_to_string(expr);
                self.line(&format!("{};", text));
            }
        }
    }

    /// Emit statements one level deeper.
    pub(crate) fn generate_block(&mut self, body: &[Stmt]) {
        self.indent_level += 1;
        for stmt in body {
            self.generate_stmt(stmt);
        }
        self.indent_level -= 1;
    }

    fn generate_var_decl(&mut self, decl: &VarDecl) {
        let keyword = match decl.mode {
            DeclMode::Plain => "let",
            DeclMode::Var | DeclMode::Varip => "var",
            DeclMode::Const => "const",
        };

        match &decl.target {
            DeclTarget::Name(name) => {
                let name = self.ident(name);
                if decl.mode == DeclMode::Plain && ast::expr_needs_lifting(&decl.init) {
                    // let x; if (...) { x = ...; } else { x = ...; }
                    self.line(&format!("let {};", name));
                    self.emit_lifted_into(&decl.init, &Sink::Assign(name));
                    return;
                }
                let value = self.expr_to_string(&decl.init);
                self.line(&format!("{} {} = {};", keyword, name, value));
            }
            DeclTarget::Tuple(names) => {
                let keyword = if decl.mode == DeclMode::Plain {
                    "const"
                } else {
                    keyword
                };
                let names: Vec<String> = names.iter().map(|name| self.ident(name)).collect();
                let value = self.expr_to_string(&decl.init);
                self.line(&format!("{} [{}] = {};", keyword, names.join(", "), value));
            }
        }
    }

    fn generate_function(&mut self, func: &FunctionDecl) {
        let name = self.ident(&func.name);
        let mut params = Vec::new();
        for param in &func.params {
            let param_name = self.ident(&param.name);
            match &param.default {
                Some(default) => {
                    let default = self.expr_to_string(default);
                    params.push(format!("{} = {}", param_name, default));
                }
                None => params.push(param_name),
            }
        }

        self.line(&format!("function {}({}) {{", name, params.join(", ")));
        self.generate_block(&func.body);
        self.line("}");
    }

    /// `type Point` becomes `const Point = Type({ x: "float" })`; field
    /// defaults ride along as a second object.
    fn generate_type(&mut self, ty: &TypeDecl) {
        self.referenced.insert("Type".to_string());
        let name = js_ident(&ty.name);

        let fields: Vec<String> = ty
            .fields
            .iter()
            .map(|field| format!("{}: {}", field.name, quote_str(&field.ty.display())))
            .collect();

        let mut defaults = Vec::new();
        for field in &ty.fields {
            if let Some(default) = &field.default {
                let value = self.expr_to_string(default);
                defaults.push(format!("{}: {}", field.name, value));
            }
        }

        if defaults.is_empty() {
            self.line(&format!(
                "const {} = Type({{ {} }});",
                name,
                fields.join(", ")
            ));
        } else {
            self.line(&format!(
                "const {} = Type({{ {} }}, {{ {} }});",
                name,
                fields.join(", "),
                defaults.join(", ")
            ));
        }
    }

    fn generate_for_range(&mut self, range: &ForRange) {
        let var = self.ident(&range.var);
        let start = self.expr_to_string(&range.start);
        let end = self.expr_to_string(&range.end);

        // Literal bounds fix the direction; the sign of `by` is then ignored
        let bounds_descending = match (numeric_literal(&range.start), numeric_literal(&range.end)) {
            (Some(s), Some(e)) => Some(s > e),
            _ => None,
        };

        let header = match &range.step {
            Some(step) => {
                let (descending, update) = match (bounds_descending, numeric_literal(step)) {
                    (Some(descending), Some(value)) => {
                        let op = if descending { "-=" } else { "+=" };
                        (descending, format!("{} {}", op, format_float(value.abs())))
                    }
                    (Some(descending), None) => {
                        let op = if descending { "-=" } else { "+=" };
                        let step = self.expr_to_string(step);
                        (descending, format!("{} Math.abs({})", op, step))
                    }
                    (None, literal) => {
                        let descending = literal.is_some_and(|v| v < 0.0);
                        (descending, format!("+= {}", self.expr_to_string(step)))
                    }
                };
                format!(
                    "for (let {v} = {}; {v} {} {}; {v} {})",
                    start,
                    if descending { ">=" } else { "<=" },
                    end,
                    update,
                    v = var
                )
            }
            None => {
                if bounds_descending == Some(true) {
                    format!("for (let {v} = {}; {v} >= {}; {v}--)", start, end, v = var)
                } else {
                    format!("for (let {v} = {}; {v} <= {}; {v}++)", start, end, v = var)
                }
            }
        };

        self.line(&format!("{} {{", header));
        self.generate_block(&range.body);
        self.line("}");
    }

    fn generate_for_in(&mut self, for_in: &ForIn) {
        let header = match &for_in.target {
            ForTarget::Name(name) => {
                let name = self.ident(name);
                let iterable = self.expr_to_string(&for_in.iterable);
                format!("for (const {} of {})", name, iterable)
            }
            ForTarget::Pair(index, value) => {
                let index = self.ident(index);
                let value = self.ident(value);
                let iterable = self.expr_prec(&for_in.iterable, PREC_CALL);
                format!("for (const [{}, {}] of {}.entries())", index, value, iterable)
            }
        };

        self.line(&format!("{} {{", header));
        self.generate_block(&for_in.body);
        self.line("}");
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
    fn test_declaration_keywords() {
        let out = compile("a = 1\nvar b = 2\nvarip c = 3\nconst int d = 4\n");
        assert!(out.contains("    let a = 1;\n"));
        assert!(out.contains("    var b = 2;\n"));
        assert!(out.contains("    var c = 3;\n"));
        assert!(out.contains("    const d = 4;\n"));
    }

    #[test]
    fn test_reassignment_operators() {
        let out = compile("var x = 0\nx := x + 1\nx += 2\n");
        assert!(out.contains("    x = x + 1;\n"));
        assert!(out.contains("    x += 2;\n"));
    }

    #[test]
    fn test_tuple_declaration() {
        let out = compile("[m, s, h] = ta.macd(close, 12, 26, 9)\n");
        assert!(out.contains("    const [m, s, h] = ta.macd(close, 12, 26, 9);\n"));
    }

    #[test]
    fn test_function_with_default_and_implicit_return() {
        let out = compile("f(x, y = 2) =>\n    z = x * y\n    z + 1\n");
        assert!(out.contains("    function f(x, y = 2) {\n"));
        assert!(out.contains("        let z = x * y;\n"));
        assert!(out.contains("        return z + 1;\n"));
    }

    #[test]
    fn test_type_declaration() {
        let out = compile("type Point\n    float x\n    float y = 0.5\n");
        assert!(out.contains("const { Type } = context.pine;"));
        assert!(
            out.contains("    const Point = Type({ x: \"float\", y: \"float\" }, { y: 0.5 });\n"),
            "{}",
            out
        );
    }

    #[test]
    fn test_if_else_chain_statement() {
        let out = compile("if a\n    x = 1\nelse if b\n    x = 2\nelse\n    x = 3\n");
        assert!(out.contains(
            "    if (a) {\n        let x = 1;\n    } else if (b) {\n        let x = 2;\n    } else {\n        let x = 3;\n    }\n"
        ), "{}", out);
    }

    #[test]
    fn test_for_range_loops() {
        let out = compile("for i = 0 to 9\n    x = i\n");
        assert!(out.contains("    for (let i = 0; i <= 9; i++) {\n"));

        let out = compile("for i = 10 to 1\n    x = i\n");
        assert!(out.contains("    for (let i = 10; i >= 1; i--) {\n"));

        let out = compile("for i = 0 to n by 2\n    x = i\n");
        assert!(out.contains("    for (let i = 0; i <= n; i += 2) {\n"));

        let out = compile("for i = n to 0 by -1\n    x = i\n");
        assert!(out.contains("    for (let i = n; i >= 0; i += -1) {\n"));
    }

    #[test]
    fn test_literal_bounds_decide_stepped_direction() {
        let out = compile("for i = 10 to 0 by 2\n    x = i\n");
        assert!(out.contains("    for (let i = 10; i >= 0; i -= 2) {\n"), "{}", out);

        let out = compile("for i = 10 to 0 by -2\n    x = i\n");
        assert!(out.contains("    for (let i = 10; i >= 0; i -= 2) {\n"), "{}", out);

        let out = compile("for i = 0 to 10 by -2.5\n    x = i\n");
        assert!(out.contains("    for (let i = 0; i <= 10; i += 2.5) {\n"), "{}", out);

        let out = compile("for i = 5 to 1 by step\n    x = i\n");
        assert!(out.contains("    for (let i = 5; i >= 1; i -= Math.abs(step)) {\n"), "{}", out);
        assert!(!out.contains("Math }"), "{}", out);
    }

    #[test]
    fn test_for_in_loops() {
        let out = compile("for x in xs\n    y = x\n");
        assert!(out.contains("    for (const x of xs) {\n"));

        let out = compile("for [i, x] in xs\n    y = x\n");
        assert!(out.contains("    for (const [i, x] of xs.entries()) {\n"));
    }

    #[test]
    fn test_while_break_continue() {
        let out = compile("i = 0\nwhile i < 10\n    if i == 5\n        break\n    continue\n");
        assert!(out.contains("    while (i < 10) {\n"));
        assert!(out.contains("            break;\n"));
        assert!(out.contains("        continue;\n"));
    }
}
