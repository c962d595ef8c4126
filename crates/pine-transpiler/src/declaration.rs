//! Script declaration metadata
//!
//! Reads the `indicator(...)`, `strategy(...)` or `library(...)` call at the
//! top of a unit. Positional arguments are matched against candidate
//! signatures: a candidate drops out as soon as a literal argument has the
//! wrong type for its slot, and the first survivor names the arguments. A
//! trailing object literal holds the keyword arguments.

use pine_estree::ast::{Expr, Literal, PropKey, Stmt, UnaryOp};
use pine_estree::print_expr;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Indicator,
    Strategy,
    Library,
}

impl DeclarationKind {
    fn from_callee(name: &str) -> Option<DeclarationKind> {
        match name {
            "indicator" => Some(DeclarationKind::Indicator),
            "strategy" => Some(DeclarationKind::Strategy),
            "library" => Some(DeclarationKind::Library),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationKind::Indicator => "indicator",
            DeclarationKind::Strategy => "strategy",
            DeclarationKind::Library => "library",
        }
    }

    fn signatures(&self) -> &'static [&'static [(&'static str, ArgType)]] {
        match self {
            DeclarationKind::Indicator => INDICATOR,
            DeclarationKind::Strategy => STRATEGY,
            DeclarationKind::Library => LIBRARY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgType {
    Str,
    Num,
    Bool,
    /// Accepts anything; also the type of non-literal arguments
    Any,
}

impl ArgType {
    fn accepts(&self, arg: ArgType) -> bool {
        *self == ArgType::Any || arg == ArgType::Any || *self == arg
    }
}

const INDICATOR: &[&[(&str, ArgType)]] = &[
    &[
        ("title", ArgType::Str),
        ("shorttitle", ArgType::Str),
        ("overlay", ArgType::Bool),
        ("format", ArgType::Str),
        ("precision", ArgType::Num),
        ("scale", ArgType::Any),
        ("max_bars_back", ArgType::Num),
        ("timeframe", ArgType::Str),
        ("timeframe_gaps", ArgType::Bool),
        ("explicit_plot_zorder", ArgType::Bool),
        ("max_lines_count", ArgType::Num),
        ("max_labels_count", ArgType::Num),
        ("max_boxes_count", ArgType::Num),
    ],
    &[("title", ArgType::Str), ("overlay", ArgType::Bool)],
];

const STRATEGY: &[&[(&str, ArgType)]] = &[
    &[
        ("title", ArgType::Str),
        ("shorttitle", ArgType::Str),
        ("overlay", ArgType::Bool),
        ("format", ArgType::Str),
        ("precision", ArgType::Num),
        ("scale", ArgType::Any),
        ("pyramiding", ArgType::Num),
        ("calc_on_order_fills", ArgType::Bool),
        ("calc_on_every_tick", ArgType::Bool),
        ("max_bars_back", ArgType::Num),
        ("backtest_fill_limits_assumption", ArgType::Num),
        ("default_qty_type", ArgType::Any),
        ("default_qty_value", ArgType::Num),
        ("initial_capital", ArgType::Num),
        ("currency", ArgType::Any),
    ],
    &[("title", ArgType::Str), ("overlay", ArgType::Bool)],
];

const LIBRARY: &[&[(&str, ArgType)]] = &[&[
    ("title", ArgType::Str),
    ("overlay", ArgType::Bool),
    ("dynamic_requests", ArgType::Bool),
]];

#[derive(Debug, Clone, PartialEq)]
pub enum DeclValue {
    Str(String),
    Num(f64),
    Bool(bool),
    /// Anything that is not a literal, as printed
    Expr(String),
}

impl DeclValue {
    fn from_expr(expr: &Expr) -> (DeclValue, ArgType) {
        match expr {
            Expr::Lit(Literal::Str(s)) => (DeclValue::Str(s.clone()), ArgType::Str),
            Expr::Lit(Literal::Num(n)) => (DeclValue::Num(*n), ArgType::Num),
            Expr::Lit(Literal::Bool(b)) => (DeclValue::Bool(*b), ArgType::Bool),
            Expr::Unary {
                op: UnaryOp::Neg,
                arg,
            } => match arg.as_ref() {
                Expr::Lit(Literal::Num(n)) => (DeclValue::Num(-n), ArgType::Num),
                _ => (DeclValue::Expr(print_expr(expr)), ArgType::Any),
            },
            other => (DeclValue::Expr(print_expr(other)), ArgType::Any),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptDeclaration {
    pub kind: DeclarationKind,
    pub args: BTreeMap<String, DeclValue>,
}

impl ScriptDeclaration {
    pub fn get(&self, name: &str) -> Option<&DeclValue> {
        self.args.get(name)
    }

    pub fn title(&self) -> Option<&str> {
        match self.args.get("title") {
            Some(DeclValue::Str(title)) => Some(title),
            _ => None,
        }
    }

    pub fn overlay(&self) -> Option<bool> {
        match self.args.get("overlay") {
            Some(DeclValue::Bool(overlay)) => Some(*overlay),
            _ => None,
        }
    }
}

/// Find the declaration call among the top-level statements of a unit.
pub fn extract(body: &[Stmt]) -> Option<ScriptDeclaration> {
    body.iter().find_map(|stmt| match stmt {
        Stmt::Expr(Expr::Call { callee, args }) => {
            let kind = DeclarationKind::from_callee(callee.as_ident()?)?;
            Some(match_call(kind, args))
        }
        _ => None,
    })
}

fn match_call(kind: DeclarationKind, args: &[Expr]) -> ScriptDeclaration {
    let (positional, keywords) = match args.split_last() {
        Some((Expr::Object(props), rest)) => (rest, Some(props)),
        _ => (args, None),
    };

    let values: Vec<(DeclValue, ArgType)> = positional.iter().map(DeclValue::from_expr).collect();
    let signature = kind.signatures().iter().find(|signature| {
        values.len() <= signature.len()
            && values
                .iter()
                .zip(signature.iter())
                .all(|((_, ty), (_, slot))| slot.accepts(*ty))
    });

    let mut named = BTreeMap::new();
    match signature {
        Some(signature) => {
            for ((value, _), (name, _)) in values.into_iter().zip(signature.iter()) {
                named.insert(name.to_string(), value);
            }
        }
        None if !values.is_empty() => {
            warn!(
                declaration = kind.as_str(),
                arguments = values.len(),
                "no signature matches the positional arguments"
            );
        }
        None => {}
    }

    for prop in keywords.into_iter().flatten() {
        let key = match &prop.key {
            PropKey::Name(key) | PropKey::Str(key) => key.clone(),
            PropKey::Computed(_) => continue,
        };
        named.insert(key, DeclValue::from_expr(&prop.value).0);
    }

    ScriptDeclaration { kind, args: named }
}
