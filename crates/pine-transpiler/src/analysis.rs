//! Read-only survey of a script before it is rewritten
//!
//! Finds the entry function, and collects every declared identifier (so
//! generated names can avoid them), the user-declared functions, the
//! function parameters, and the names destructured from the context.

use crate::error::CompileError;
use crate::scope::{CONTEXT, ScopeManager};
use crate::transform::normalization;
use pine_estree::ast::{Expr, Function, FunctionBody, MemberProp, Pattern, Program, PropKey, Stmt};
use std::collections::BTreeSet;
use tracing::debug;

/// Everything the transformation passes need to start
#[derive(Debug)]
pub struct Analysis {
    /// Original spelling of the entry parameter
    pub root_name: String,
    /// Normalized body of the entry function
    pub body: Vec<Stmt>,
    pub scopes: ScopeManager,
    pub user_functions: BTreeSet<String>,
    pub parameters: BTreeSet<String>,
    pub context_bound: BTreeSet<String>,
}

/// Survey and normalize a parsed script.
pub fn analyze(program: Program) -> Result<Analysis, CompileError> {
    let (root_name, body) = extract_entry(program)?;

    let mut collector = Collector::default();
    collector.stmts(&body);
    let context_bound = context_destructured(&body, &root_name);

    let mut scopes = ScopeManager::new(root_name.clone());
    for name in &collector.reserved {
        scopes.reserve(name);
    }
    for name in &collector.user_functions {
        scopes.add_user_function(name);
    }
    for name in &context_bound {
        scopes.mark_context_bound(name);
    }

    let body = normalization::normalize_body(body, &root_name, &mut scopes)?;

    debug!(
        root = %root_name,
        reserved = collector.reserved.len(),
        functions = collector.user_functions.len(),
        context_bound = context_bound.len(),
        "analysis complete"
    );

    Ok(Analysis {
        root_name,
        body,
        scopes,
        user_functions: collector.user_functions,
        parameters: collector.parameters,
        context_bound,
    })
}

/// The unit must be one function expression taking at most one parameter.
fn extract_entry(program: Program) -> Result<(String, Vec<Stmt>), CompileError> {
    let mut statements = program
        .body
        .into_iter()
        .filter(|stmt| !matches!(stmt, Stmt::Empty));

    let entry = match (statements.next(), statements.next()) {
        (Some(Stmt::Expr(Expr::Function(func))), None) => *func,
        (Some(_), None) => {
            return Err(CompileError::Entry(
                "expected a function expression or arrow function".into(),
            ));
        }
        (None, _) => return Err(CompileError::Entry("empty unit".into())),
        (Some(_), Some(_)) => {
            return Err(CompileError::Entry(
                "expected exactly one top-level function".into(),
            ));
        }
    };

    let Function { params, body, .. } = entry;
    let root_name = match params.as_slice() {
        [] => CONTEXT.to_string(),
        [Pattern::Ident(name)] => name.clone(),
        [_] => {
            return Err(CompileError::Entry(
                "the context parameter must be a plain identifier".into(),
            ));
        }
        _ => {
            return Err(CompileError::Entry(format!(
                "the entry function takes one context parameter, found {}",
                params.len()
            )));
        }
    };

    let body = match body {
        FunctionBody::Block(body) => body,
        FunctionBody::Expr(expr) => vec![Stmt::Return(Some(*expr))],
    };
    Ok((root_name, body))
}

/// Expression hangs off the context: `context.data`, `$.pine.ta`
pub(crate) fn is_context_rooted(expr: &Expr, root_name: &str) -> bool {
    matches!(expr.root_ident(), Some(name) if name == root_name || name == CONTEXT)
}

/// Names declared at the top of the unit from an expression on the context
fn context_destructured(body: &[Stmt], root_name: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for stmt in body {
        if let Stmt::Var { decls, .. } = stmt {
            for decl in decls {
                if decl
                    .init
                    .as_ref()
                    .is_some_and(|init| is_context_rooted(init, root_name))
                {
                    names.extend(decl.id.bound_names());
                }
            }
        }
    }
    names
}

// ─────────────────────────────────────────────────────────────────────────────
// Collection walk
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Collector {
    reserved: BTreeSet<String>,
    user_functions: BTreeSet<String>,
    parameters: BTreeSet<String>,
}

impl Collector {
    fn stmts(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Var { decls, .. } => {
                for decl in decls {
                    self.pattern(&decl.id);
                    match (&decl.id, &decl.init) {
                        (Pattern::Ident(name), Some(Expr::Function(func))) => {
                            self.user_functions.insert(name.clone());
                            self.function(func);
                        }
                        (_, Some(init)) => self.expr(init),
                        (_, None) => {}
                    }
                }
            }
            Stmt::Function(func) => {
                if let Some(name) = &func.name {
                    self.reserved.insert(name.clone());
                    self.user_functions.insert(name.clone());
                }
                self.function(func);
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test);
                self.stmt(consequent);
                if let Some(alternate) = alternate {
                    self.stmt(alternate);
                }
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.stmt(init);
                }
                for expr in [test, update].into_iter().flatten() {
                    self.expr(expr);
                }
                self.stmt(body);
            }
            Stmt::ForEach {
                left, right, body, ..
            } => {
                self.pattern(&left.pattern);
                self.expr(right);
                self.stmt(body);
            }
            Stmt::While { test, body } => {
                self.expr(test);
                self.stmt(body);
            }
            Stmt::Block(body) => self.stmts(body),
            Stmt::Expr(expr) => self.expr(expr),
            Stmt::Break | Stmt::Continue | Stmt::Empty => {}
        }
    }

    fn function(&mut self, func: &Function) {
        for param in &func.params {
            for name in param.bound_names() {
                self.reserved.insert(name.clone());
                self.parameters.insert(name);
            }
            self.pattern_defaults(param);
        }
        match &func.body {
            FunctionBody::Block(body) => self.stmts(body),
            FunctionBody::Expr(expr) => self.expr(expr),
        }
    }

    fn pattern(&mut self, pattern: &Pattern) {
        self.reserved.extend(pattern.bound_names());
        self.pattern_defaults(pattern);
    }

    fn pattern_defaults(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Ident(_) => {}
            Pattern::Array(items) => {
                for item in items.iter().flatten() {
                    self.pattern_defaults(item);
                }
            }
            Pattern::Object(props) => {
                for prop in props {
                    self.pattern_defaults(&prop.value);
                }
            }
            Pattern::Default { target, value } => {
                self.pattern_defaults(target);
                self.expr(value);
            }
            Pattern::Rest(inner) => self.pattern_defaults(inner),
        }
    }

    /// Only nested functions declare anything inside an expression.
    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Function(func) => self.function(func),
            Expr::Ident(_) | Expr::Lit(_) => {}
            Expr::Array(items) | Expr::Sequence(items) => {
                for item in items {
                    self.expr(item);
                }
            }
            Expr::Object(props) => {
                for prop in props {
                    if let PropKey::Computed(key) = &prop.key {
                        self.expr(key);
                    }
                    self.expr(&prop.value);
                }
            }
            Expr::Unary { arg, .. } | Expr::Update { arg, .. } | Expr::Spread(arg) => {
                self.expr(arg)
            }
            Expr::Binary { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::Assign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test);
                self.expr(consequent);
                self.expr(alternate);
            }
            Expr::Call { callee, args } | Expr::New { callee, args } => {
                self.expr(callee);
                for arg in args {
                    self.expr(arg);
                }
            }
            Expr::Member { object, property } => {
                self.expr(object);
                if let MemberProp::Computed(index) = property {
                    self.expr(index);
                }
            }
        }
    }
}
