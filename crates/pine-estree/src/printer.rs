//! Script printer
//!
//! Deterministic source output: four-space indentation, one statement per
//! line, parentheses only where precedence requires them. Every non-block
//! body is printed as a braced block.

use crate::ast::*;

const PREC_LOWEST: u8 = 0;
const PREC_SEQUENCE: u8 = 1;
const PREC_ASSIGN: u8 = 2;
const PREC_CONDITIONAL: u8 = 3;
const PREC_UNARY: u8 = 15;
const PREC_POSTFIX: u8 = 16;
const PREC_LHS: u8 = 17;
const PREC_CALL: u8 = 18;
const PREC_PRIMARY: u8 = 20;

/// Number literal text; integral values print without a fraction.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else {
        format!("{}", value)
    }
}

/// Double-quoted string literal with escapes
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub struct Printer {
    output: String,
    indent: usize,
}

impl Printer {
    pub fn new() -> Self {
        Printer {
            output: String::new(),
            indent: 0,
        }
    }

    pub fn finish(self) -> String {
        self.output
    }

    fn indent_str(&self) -> String {
        "    ".repeat(self.indent)
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(text);
        self.output.push('\n');
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    pub fn print_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Var { kind, decls } => {
                let text = self.var_decl(*kind, decls);
                self.line(&format!("{};", text));
            }
            Stmt::Function(func) => {
                let text = self.function(func);
                self.line(&text);
            }
            Stmt::Return(Some(value)) => {
                let value = self.expr(value, PREC_SEQUENCE);
                self.line(&format!("return {};", value));
            }
            Stmt::Return(None) => self.line("return;"),
            Stmt::If { .. } => {
                let text = self.if_chain(stmt);
                self.line(&text);
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let init = match init.as_deref() {
                    Some(Stmt::Var { kind, decls }) => self.var_decl(*kind, decls),
                    Some(Stmt::Expr(expr)) => self.expr(expr, PREC_SEQUENCE),
                    _ => String::new(),
                };
                let test = match test {
                    Some(test) => format!(" {}", self.expr(test, PREC_SEQUENCE)),
                    None => String::new(),
                };
                let update = match update {
                    Some(update) => format!(" {}", self.expr(update, PREC_SEQUENCE)),
                    None => String::new(),
                };
                let body = self.braced(stmt_body(body));
                self.line(&format!("for ({};{};{}) {}", init, test, update, body));
            }
            Stmt::ForEach {
                each,
                left,
                right,
                body,
            } => {
                let binding = match left.kind {
                    Some(kind) => format!("{} {}", kind.as_str(), self.pattern(&left.pattern)),
                    None => self.pattern(&left.pattern),
                };
                let keyword = match each {
                    ForEachKind::Of => "of",
                    ForEachKind::In => "in",
                };
                let right = self.expr(right, PREC_ASSIGN);
                let body = self.braced(stmt_body(body));
                self.line(&format!("for ({} {} {}) {}", binding, keyword, right, body));
            }
            Stmt::While { test, body } => {
                let test = self.expr(test, PREC_SEQUENCE);
                let body = self.braced(stmt_body(body));
                self.line(&format!("while ({}) {}", test, body));
            }
            Stmt::Break => self.line("break;"),
            Stmt::Continue => self.line("continue;"),
            Stmt::Block(body) => {
                let text = self.braced(body);
                self.line(&text);
            }
            Stmt::Expr(expr) => {
                let text = self.expr(expr, PREC_SEQUENCE);
                // A leading `{` or `function` would start a block or declaration
                if text.starts_with('{') || text.starts_with("function ") {
                    self.line(&format!("({});", text));
                } else {
                    self.line(&format!("{};", text));
                }
            }
            Stmt::Empty => self.line(";"),
        }
    }

    /// `{` body `}` with the closing brace at the current indent
    fn braced(&mut self, body: &[Stmt]) -> String {
        if body.is_empty() {
            return "{}".to_string();
        }
        let saved = std::mem::take(&mut self.output);
        self.indent += 1;
        for stmt in body {
            self.print_stmt(stmt);
        }
        self.indent -= 1;
        let inner = std::mem::replace(&mut self.output, saved);
        format!("{{\n{}{}}}", inner, self.indent_str())
    }

    fn if_chain(&mut self, stmt: &Stmt) -> String {
        let mut text = String::new();
        let mut current = stmt;
        while let Stmt::If {
            test,
            consequent,
            alternate,
        } = current
        {
            let test = self.expr(test, PREC_SEQUENCE);
            let body = self.braced(stmt_body(consequent));
            text.push_str(&format!("if ({}) {}", test, body));
            match alternate.as_deref() {
                Some(next @ Stmt::If { .. }) => {
                    text.push_str(" else ");
                    current = next;
                }
                Some(other) => {
                    let body = self.braced(stmt_body(other));
                    text.push_str(&format!(" else {}", body));
                    break;
                }
                None => break,
            }
        }
        text
    }

    fn var_decl(&mut self, kind: VarKind, decls: &[Declarator]) -> String {
        let decls: Vec<String> = decls
            .iter()
            .map(|decl| {
                let id = self.pattern(&decl.id);
                match &decl.init {
                    Some(init) => format!("{} = {}", id, self.expr(init, PREC_ASSIGN)),
                    None => id,
                }
            })
            .collect();
        format!("{} {}", kind.as_str(), decls.join(", "))
    }

    fn function(&mut self, func: &Function) -> String {
        let params: Vec<String> = func.params.iter().map(|p| self.pattern(p)).collect();
        let params = params.join(", ");

        let body = match &func.body {
            FunctionBody::Block(body) => self.braced(body),
            FunctionBody::Expr(expr) => {
                let text = self.expr(expr, PREC_ASSIGN);
                if matches!(**expr, Expr::Object(_)) {
                    format!("({})", text)
                } else {
                    text
                }
            }
        };

        if func.arrow {
            format!("({}) => {}", params, body)
        } else {
            match &func.name {
                Some(name) => format!("function {}({}) {}", name, params, body),
                None => format!("function ({}) {}", params, body),
            }
        }
    }

    fn pattern(&mut self, pattern: &Pattern) -> String {
        match pattern {
            Pattern::Ident(name) => name.clone(),
            Pattern::Array(items) => {
                let items: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Some(item) => self.pattern(item),
                        None => String::new(),
                    })
                    .collect();
                format!("[{}]", items.join(", "))
            }
            Pattern::Object(props) => {
                if props.is_empty() {
                    return "{}".to_string();
                }
                let props: Vec<String> = props
                    .iter()
                    .map(|prop| match &prop.value {
                        Pattern::Ident(name) if *name == prop.key => name.clone(),
                        Pattern::Default { target, value }
                            if matches!(&**target, Pattern::Ident(name) if *name == prop.key) =>
                        {
                            format!("{} = {}", prop.key, self.expr(value, PREC_ASSIGN))
                        }
                        Pattern::Rest(_) => self.pattern(&prop.value),
                        other => format!("{}: {}", prop.key, self.pattern(other)),
                    })
                    .collect();
                format!("{{ {} }}", props.join(", "))
            }
            Pattern::Default { target, value } => {
                format!("{} = {}", self.pattern(target), self.expr(value, PREC_ASSIGN))
            }
            Pattern::Rest(inner) => format!("...{}", self.pattern(inner)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    /// Render `expr`, parenthesized when it binds looser than `min`.
    pub fn expr(&mut self, expr: &Expr, min: u8) -> String {
        let (text, prec) = self.render(expr);
        if prec < min {
            format!("({})", text)
        } else {
            text
        }
    }

    fn render(&mut self, expr: &Expr) -> (String, u8) {
        match expr {
            Expr::Ident(name) => (name.clone(), PREC_PRIMARY),
            Expr::Lit(lit) => match lit {
                Literal::Num(n) if *n < 0.0 => (format_number(*n), PREC_UNARY),
                Literal::Num(n) => (format_number(*n), PREC_PRIMARY),
                Literal::Str(s) => (quote(s), PREC_PRIMARY),
                Literal::Bool(b) => (b.to_string(), PREC_PRIMARY),
                Literal::Null => ("null".to_string(), PREC_PRIMARY),
            },
            Expr::Array(items) => {
                let items = self.list(items);
                (format!("[{}]", items), PREC_PRIMARY)
            }
            Expr::Object(props) => (self.object(props), PREC_PRIMARY),
            Expr::Function(func) => {
                let text = self.function(func);
                let prec = if func.arrow { PREC_ASSIGN } else { PREC_PRIMARY };
                (text, prec)
            }
            Expr::Unary { op, arg } => {
                let mut inner = self.expr(arg, PREC_UNARY);
                let text = match op {
                    UnaryOp::Typeof | UnaryOp::Void | UnaryOp::Delete => {
                        format!("{} {}", op.as_str(), inner)
                    }
                    _ => {
                        let symbol = op.as_str();
                        if (symbol == "-" && inner.starts_with('-'))
                            || (symbol == "+" && inner.starts_with('+'))
                        {
                            inner = format!("({})", inner);
                        }
                        format!("{}{}", symbol, inner)
                    }
                };
                (text, PREC_UNARY)
            }
            Expr::Update { op, prefix, arg } => {
                let inner = self.expr(arg, PREC_LHS);
                if *prefix {
                    (format!("{}{}", op.as_str(), inner), PREC_UNARY)
                } else {
                    (format!("{}{}", inner, op.as_str()), PREC_POSTFIX)
                }
            }
            Expr::Binary { op, left, right } => {
                let prec = op.precedence();
                let left = self.expr(left, prec);
                let right = self.expr(right, prec + 1);
                (format!("{} {} {}", left, op.as_str(), right), prec)
            }
            Expr::Assign { op, target, value } => {
                let target = self.expr(target, PREC_LHS);
                let value = self.expr(value, PREC_ASSIGN);
                (format!("{} {} {}", target, op.as_str(), value), PREC_ASSIGN)
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test = self.expr(test, PREC_CONDITIONAL + 1);
                let consequent = self.expr(consequent, PREC_ASSIGN);
                let alternate = self.expr(alternate, PREC_ASSIGN);
                (
                    format!("{} ? {} : {}", test, consequent, alternate),
                    PREC_CONDITIONAL,
                )
            }
            Expr::Call { callee, args } => {
                let callee = self.expr(callee, PREC_CALL);
                let args = self.list(args);
                (format!("{}({})", callee, args), PREC_CALL)
            }
            Expr::New { callee, args } => {
                let callee = if matches!(**callee, Expr::Call { .. }) {
                    format!("({})", self.expr(callee, PREC_LOWEST))
                } else {
                    self.expr(callee, PREC_CALL)
                };
                let args = self.list(args);
                (format!("new {}({})", callee, args), PREC_CALL)
            }
            Expr::Member { object, property } => {
                let object_text = match **object {
                    Expr::Lit(Literal::Num(_)) => format!("({})", self.expr(object, PREC_LOWEST)),
                    _ => self.expr(object, PREC_CALL),
                };
                let text = match property {
                    MemberProp::Name(name) => format!("{}.{}", object_text, name),
                    MemberProp::Computed(index) => {
                        format!("{}[{}]", object_text, self.expr(index, PREC_SEQUENCE))
                    }
                };
                (text, PREC_CALL)
            }
            Expr::Sequence(items) => {
                let items: Vec<String> = items
                    .iter()
                    .map(|item| self.expr(item, PREC_ASSIGN))
                    .collect();
                (items.join(", "), PREC_SEQUENCE)
            }
            Expr::Spread(inner) => (format!("...{}", self.expr(inner, PREC_ASSIGN)), PREC_ASSIGN),
        }
    }

    fn list(&mut self, items: &[Expr]) -> String {
        let items: Vec<String> = items
            .iter()
            .map(|item| self.expr(item, PREC_ASSIGN))
            .collect();
        items.join(", ")
    }

    fn object(&mut self, props: &[Property]) -> String {
        if props.is_empty() {
            return "{}".to_string();
        }
        let props: Vec<String> = props
            .iter()
            .map(|prop| {
                if prop.shorthand {
                    if let (PropKey::Name(key), Expr::Ident(value)) = (&prop.key, &prop.value) {
                        if key == value {
                            return key.clone();
                        }
                    }
                }
                let key = match &prop.key {
                    PropKey::Name(name) => name.clone(),
                    PropKey::Str(value) => quote(value),
                    PropKey::Computed(key) => format!("[{}]", self.expr(key, PREC_ASSIGN)),
                };
                format!("{}: {}", key, self.expr(&prop.value, PREC_ASSIGN))
            })
            .collect();
        format!("{{ {} }}", props.join(", "))
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::new()
    }
}

/// Statements of a body, treating a lone statement as a one-line block
fn stmt_body(stmt: &Stmt) -> &[Stmt] {
    match stmt {
        Stmt::Block(body) => body,
        Stmt::Empty => &[],
        other => std::slice::from_ref(other),
    }
}

pub fn print_program(program: &Program) -> String {
    let mut printer = Printer::new();
    for stmt in &program.body {
        printer.print_stmt(stmt);
    }
    printer.finish()
}

pub fn print_expr(expr: &Expr) -> String {
    Printer::new().expr(expr, PREC_LOWEST)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    /// Parse and print, which normalizes formatting
    fn reprint(source: &str) -> String {
        print_program(&parse(tokenize(source).unwrap()).unwrap())
    }

    #[test]
    fn test_numbers() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn test_arrow_with_block_body() {
        assert_eq!(
            reprint("($)=>{const a=1;a+=2}"),
            "($) => {\n    const a = 1;\n    a += 2;\n};\n"
        );
    }

    #[test]
    fn test_print_expr_of_arrow_has_no_semicolon() {
        let program = parse(tokenize("($) => { f(1) }").unwrap()).unwrap();
        let Stmt::Expr(expr) = &program.body[0] else {
            panic!("expected expression");
        };
        assert_eq!(print_expr(expr), "($) => {\n    f(1);\n}");
    }

    #[test]
    fn test_parentheses_follow_precedence() {
        assert_eq!(reprint("(a + b) * c"), "(a + b) * c;\n");
        assert_eq!(reprint("a + (b * c)"), "a + b * c;\n");
        assert_eq!(reprint("a - (b - c)"), "a - (b - c);\n");
        assert_eq!(reprint("!(a == b)"), "!(a == b);\n");
        assert_eq!(reprint("(a ? b : c) ? d : e"), "(a ? b : c) ? d : e;\n");
        assert_eq!(reprint("-(-a)"), "-(-a);\n");
    }

    #[test]
    fn test_iife_keeps_callee_parentheses() {
        assert_eq!(
            reprint("(() => { return 1 })()"),
            "(() => {\n    return 1;\n})();\n"
        );
    }

    #[test]
    fn test_control_flow_is_braced() {
        assert_eq!(
            reprint("if (a) b(); else if (c) d(); else { e() }"),
            "if (a) {\n    b();\n} else if (c) {\n    d();\n} else {\n    e();\n}\n"
        );
        assert_eq!(
            reprint("for (let i = 0; i <= 9; i++) x += i"),
            "for (let i = 0; i <= 9; i++) {\n    x += i;\n}\n"
        );
        assert_eq!(
            reprint("for (const [i, x] of xs.entries()) {}"),
            "for (const [i, x] of xs.entries()) {}\n"
        );
        assert_eq!(reprint("while (a) { break }"), "while (a) {\n    break;\n}\n");
    }

    #[test]
    fn test_destructuring_and_objects() {
        assert_eq!(
            reprint("const { close, open: o, v = 1 } = $.data"),
            "const { close, open: o, v = 1 } = $.data;\n"
        );
        assert_eq!(reprint("f({ a: 1, b, 'c d': 2 })"), "f({ a: 1, b, \"c d\": 2 });\n");
        assert_eq!(reprint("x = () => ({ a: 1 })"), "x = () => ({ a: 1 });\n");
    }

    #[test]
    fn test_nested_function_indentation() {
        assert_eq!(
            reprint("function f(a, b = 2) { if (a) { return b } }"),
            "function f(a, b = 2) {\n    if (a) {\n        return b;\n    }\n}\n"
        );
    }

    #[test]
    fn test_strings_are_double_quoted() {
        assert_eq!(reprint("x = 'it\\'s'"), "x = \"it's\";\n");
    }
}
