//! Context transformer: rewrites a normalized script so every piece of
//! persistent state flows through the context parameter `$`.
//!
//! The walk consumes the tree and returns replacement nodes. Each visit
//! receives an immutable chain of its ancestors, used for error paths,
//! together with the [`Position`] the node occupies in its parent.
//!
//! - `statement`: declarations, control flow, scopes, returns
//! - `expression`: reads, writes, equality
//! - `injection`: parameter captures and call-site ids
//! - `normalization`: structural rewrites done before the walk

mod expression;
mod injection;
pub mod normalization;
mod statement;

use crate::error::TransformError;
use crate::scope::{CONTEXT, ScopeKind, ScopeManager};
use pine_estree::ast::{
    AssignOp, Declarator, Expr, Function, FunctionBody, Pattern, Stmt, VarKind,
};

/// How an expression is used by its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Current value is read
    Value,
    /// Function being called
    Callee,
    /// Object of a member access
    MemberObject,
    /// Passed by reference so the callee can see its history
    Handle,
    /// Written by an assignment or update
    Target,
}

/// Ancestor chain of the node being visited
#[derive(Debug, Clone, Copy)]
pub struct Parents<'a> {
    node: &'static str,
    parent: Option<&'a Parents<'a>>,
}

impl<'a> Parents<'a> {
    pub fn root() -> Parents<'static> {
        Parents {
            node: "Program",
            parent: None,
        }
    }

    pub fn push(&self, node: &'static str) -> Parents<'_> {
        Parents {
            node,
            parent: Some(self),
        }
    }

    pub fn node(&self) -> &'static str {
        self.node
    }

    /// `Program > If > Call`, for error reports
    pub fn path(&self) -> String {
        let mut nodes = vec![self.node];
        let mut current = self.parent;
        while let Some(parents) = current {
            nodes.push(parents.node);
            current = parents.parent;
        }
        nodes.reverse();
        nodes.join(" > ")
    }
}

pub struct Transformer {
    pub(crate) scopes: ScopeManager,
    /// One buffer per statement sequence being walked; drained in front of
    /// the statement that filled it
    hoisted: Vec<Vec<Stmt>>,
}

/// Rewrite the normalized entry body and rebuild the unit as `($) => { ... }`.
pub fn transform(body: Vec<Stmt>, scopes: ScopeManager) -> Result<Expr, TransformError> {
    let mut transformer = Transformer {
        scopes,
        hoisted: Vec::new(),
    };
    let parents = Parents::root();
    let body = transformer.sequence(body, &parents)?;

    Ok(Expr::Function(Box::new(Function {
        name: None,
        params: vec![Pattern::Ident(CONTEXT.to_string())],
        body: FunctionBody::Block(body),
        arrow: true,
    })))
}

impl Transformer {
    /// Walk a statement list, placing hoisted declarations right before the
    /// statement that produced them.
    pub(crate) fn sequence(
        &mut self,
        body: Vec<Stmt>,
        parents: &Parents,
    ) -> Result<Vec<Stmt>, TransformError> {
        self.hoisted.push(Vec::new());
        let mut out = Vec::with_capacity(body.len());
        for stmt in body {
            let replaced = self.stmt(stmt, parents)?;
            if let Some(frame) = self.hoisted.last_mut() {
                out.append(frame);
            }
            out.extend(replaced);
        }
        self.hoisted.pop();
        Ok(out)
    }

    /// Walk a body inside a fresh scope.
    pub(crate) fn scoped_block(
        &mut self,
        kind: ScopeKind,
        stmt: Stmt,
        parents: &Parents,
    ) -> Result<Vec<Stmt>, TransformError> {
        self.scopes.push_scope(kind);
        let body = self.sequence(stmt.into_block(), parents);
        self.scopes.pop_scope();
        body
    }

    /// Emit `const name = init;` before the statement being walked.
    pub(crate) fn hoist(
        &mut self,
        name: &str,
        init: Expr,
        parents: &Parents,
    ) -> Result<(), TransformError> {
        self.hoist_stmt(
            Stmt::Var {
                kind: VarKind::Const,
                decls: vec![Declarator {
                    id: Pattern::Ident(name.to_string()),
                    init: Some(init),
                }],
            },
            parents,
        )
    }

    pub(crate) fn hoist_stmt(
        &mut self,
        stmt: Stmt,
        parents: &Parents,
    ) -> Result<(), TransformError> {
        let frame = self.hoisted.last_mut().ok_or_else(|| {
            TransformError::new("injection", parents.path(), "no statement to hoist before")
        })?;
        frame.push(stmt);
        Ok(())
    }

    /// Persist `value` in a fresh series slot hoisted before the current
    /// statement, so its history can be read like a declared variable.
    pub(crate) fn series_temp(
        &mut self,
        value: Expr,
        parents: &Parents,
    ) -> Result<Expr, TransformError> {
        let temp = self.scopes.generate_temp();
        let renamed = self.scopes.add_series_temp(&temp);
        let slot = slot_ref(VarKind::Let, &renamed);
        let init = context_call("init", vec![slot.clone(), value]);
        self.hoist_stmt(
            Stmt::Expr(Expr::Assign {
                op: AssignOp::Assign,
                target: Box::new(slot.clone()),
                value: Box::new(init),
            }),
            parents,
        )?;
        Ok(slot)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime call builders
// ─────────────────────────────────────────────────────────────────────────────

/// `$.{kind}.{renamed}`
pub(crate) fn slot_ref(kind: VarKind, renamed: &str) -> Expr {
    Expr::member(Expr::member(Expr::ident(CONTEXT), kind.as_str()), renamed)
}

/// `$.{method}(args...)`
pub(crate) fn context_call(method: &str, args: Vec<Expr>) -> Expr {
    Expr::call(Expr::member(Expr::ident(CONTEXT), method), args)
}

/// `$.get(target, offset)`
pub(crate) fn read(target: Expr, offset: Expr) -> Expr {
    context_call("get", vec![target, offset])
}
