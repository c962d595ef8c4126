//! Expression lowering
//!
//! Expressions render to strings with a binding strength so the caller can
//! decide whether parentheses are needed.

use crate::Codegen;
use pine_parser::ast::{Argument, BinaryOp, Expr, TypeRef, UnaryOp};

pub(crate) const PREC_LOWEST: u8 = 0;
pub(crate) const PREC_ARG: u8 = 1;
pub(crate) const PREC_TERNARY: u8 = 2;
pub(crate) const PREC_OR: u8 = 4;
pub(crate) const PREC_AND: u8 = 5;
pub(crate) const PREC_EQUALITY: u8 = 9;
pub(crate) const PREC_RELATIONAL: u8 = 10;
pub(crate) const PREC_ADDITIVE: u8 = 12;
pub(crate) const PREC_MULTIPLICATIVE: u8 = 13;
pub(crate) const PREC_UNARY: u8 = 15;
pub(crate) const PREC_CALL: u8 = 18;
pub(crate) const PREC_PRIMARY: u8 = 20;

/// Element types with a dedicated `ns.new_<type>` constructor
const PRIMITIVE_TYPES: &[&str] = &[
    "float", "int", "bool", "string", "color", "line", "label", "box", "table", "linefill",
];

/// Namespaces whose generic constructor is specialized per element type
const SPECIALIZED_CONSTRUCTORS: &[&str] = &["array", "matrix"];

pub(crate) fn binary_op_str(op: BinaryOp) -> (&'static str, u8) {
    match op {
        BinaryOp::Add => ("+", PREC_ADDITIVE),
        BinaryOp::Sub => ("-", PREC_ADDITIVE),
        BinaryOp::Mul => ("*", PREC_MULTIPLICATIVE),
        BinaryOp::Div => ("/", PREC_MULTIPLICATIVE),
        BinaryOp::Mod => ("%", PREC_MULTIPLICATIVE),
        BinaryOp::Eq => ("==", PREC_EQUALITY),
        BinaryOp::NotEq => ("!=", PREC_EQUALITY),
        BinaryOp::Lt => ("<", PREC_RELATIONAL),
        BinaryOp::LtEq => ("<=", PREC_RELATIONAL),
        BinaryOp::Gt => (">", PREC_RELATIONAL),
        BinaryOp::GtEq => (">=", PREC_RELATIONAL),
        BinaryOp::And => ("&&", PREC_AND),
        BinaryOp::Or => ("||", PREC_OR),
    }
}

/// Double-quoted string literal with escapes
pub fn quote_str(value: &str) -> String {
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

pub(crate) fn format_float(value: f64) -> String {
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

/// Numeric value of a literal, looking through unary minus.
pub(crate) fn numeric_literal(expr: &Expr) -> Option<f64> {
    match expr {
        Expr::Int(n) => Some(*n as f64),
        Expr::Float(f) => Some(*f),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => numeric_literal(operand).map(|v| -v),
        _ => None,
    }
}

impl Codegen {
    pub fn expr_to_string(&mut self, expr: &Expr) -> String {
        self.expr_prec(expr, PREC_LOWEST)
    }

    /// Render `expr`, parenthesized when it binds looser than `min`.
    pub(crate) fn expr_prec(&mut self, expr: &Expr, min: u8) -> String {
        let (text, prec) = self.render_expr(expr);
        if prec < min {
            format!("({})", text)
        } else {
            text
        }
    }

    fn render_expr(&mut self, expr: &Expr) -> (String, u8) {
        match expr {
            Expr::Ident(name) => (self.ident(name), PREC_PRIMARY),
            Expr::Int(n) => (n.to_string(), PREC_PRIMARY),
            Expr::Float(f) => (format_float(*f), PREC_PRIMARY),
            Expr::Str(s) | Expr::Color(s) => (quote_str(s), PREC_PRIMARY),
            Expr::Bool(b) => (b.to_string(), PREC_PRIMARY),
            Expr::Na => ("NaN".to_string(), PREC_PRIMARY),

            Expr::Binary { op, left, right } => {
                let (symbol, prec) = binary_op_str(*op);
                let left = self.expr_prec(left, prec);
                let right = self.expr_prec(right, prec + 1);
                (format!("{} {} {}", left, symbol, right), prec)
            }

            Expr::Unary { op, operand } => {
                let symbol = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Plus => "+",
                    UnaryOp::Not => "!",
                };
                let mut inner = self.expr_prec(operand, PREC_UNARY);
                // `- -x` must not print as `--x`
                if (symbol == "-" && inner.starts_with('-'))
                    || (symbol == "+" && inner.starts_with('+'))
                {
                    inner = format!("({})", inner);
                }
                (format!("{}{}", symbol, inner), PREC_UNARY)
            }

            Expr::Ternary {
                test,
                consequent,
                alternate,
            } => {
                let test = self.expr_prec(test, PREC_TERNARY + 1);
                let consequent = self.expr_prec(consequent, PREC_TERNARY);
                let alternate = self.expr_prec(alternate, PREC_TERNARY);
                (
                    format!("{} ? {} : {}", test, consequent, alternate),
                    PREC_TERNARY,
                )
            }

            Expr::Call {
                callee,
                type_args,
                args,
            } => (self.render_call(callee, type_args, args), PREC_CALL),

            Expr::Member { object, property } => {
                let object = self.expr_prec(object, PREC_CALL);
                (format!("{}.{}", object, property), PREC_CALL)
            }

            Expr::History { target, offset } => {
                let target = self.expr_prec(target, PREC_CALL);
                let offset = self.expr_to_string(offset);
                (format!("{}[{}]", target, offset), PREC_CALL)
            }

            Expr::Tuple(items) => {
                let items: Vec<String> = items
                    .iter()
                    .map(|item| self.expr_prec(item, PREC_ARG))
                    .collect();
                (format!("[{}]", items.join(", ")), PREC_PRIMARY)
            }

            Expr::Conditional(_) => (self.lifted_iife(expr), PREC_CALL),
            Expr::Switch(switch) if switch.needs_lifting => (self.lifted_iife(expr), PREC_CALL),
            Expr::Switch(switch) => (self.switch_ternary(switch), PREC_TERNARY),
        }
    }

    fn render_call(&mut self, callee: &Expr, type_args: &[TypeRef], args: &[Argument]) -> String {
        let mut rendered = Vec::new();

        let callee_text = match callee {
            // obj.m(a) with a user method m becomes m(obj, a)
            Expr::Member { object, property }
                if self.methods.contains(property) && !self.is_namespace(object) =>
            {
                rendered.push(self.expr_prec(object, PREC_ARG));
                self.ident(property)
            }
            Expr::Member { object, property } if property == "new" && !type_args.is_empty() => {
                let namespace = self.expr_prec(object, PREC_CALL);
                let specialized = SPECIALIZED_CONSTRUCTORS.contains(&namespace.as_str())
                    && type_args.len() == 1
                    && !type_args[0].array
                    && PRIMITIVE_TYPES.contains(&type_args[0].name.as_str());
                if specialized {
                    format!("{}.new_{}", namespace, type_args[0].name)
                } else {
                    format!("{}.new", namespace)
                }
            }
            other => self.expr_prec(other, PREC_CALL),
        };

        let mut named = Vec::new();
        for arg in args {
            let value = self.expr_prec(&arg.value, PREC_ARG);
            match &arg.name {
                Some(name) => named.push(format!("{}: {}", name, value)),
                None => rendered.push(value),
            }
        }
        if !named.is_empty() {
            rendered.push(format!("{{ {} }}", named.join(", ")));
        }

        format!("{}({})", callee_text, rendered.join(", "))
    }

    /// A bare identifier the script never binds names a library namespace.
    fn is_namespace(&self, object: &Expr) -> bool {
        matches!(object, Expr::Ident(name) if !self.declared.contains(name))
    }
}
