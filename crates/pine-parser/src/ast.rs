//! Pine AST
//!
//! The node set produced by the parser and consumed by the Stage-1 code
//! generator. Statements carry the source line they start on; expressions
//! are positionless.

/// A parsed script
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Stmt>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    /// 1-indexed source line
    pub line: usize,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: usize) -> Self {
        Stmt { kind, line }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    VarDecl(VarDecl),
    Reassign(Reassign),
    FunctionDecl(FunctionDecl),
    TypeDecl(TypeDecl),
    If(IfStmt),
    ForRange(ForRange),
    ForIn(ForIn),
    While(WhileStmt),
    /// Only synthesized for the implicit result of a function body
    Return(Option<Expr>),
    Break,
    Continue,
    Expr(Expr),
}

/// Persistence mode of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclMode {
    /// Re-evaluated every bar
    Plain,
    /// Initialized once, persists across bars
    Var,
    /// Like `var`, but also persists across intrabar updates
    Varip,
    /// Compile-time constant
    Const,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclTarget {
    Name(String),
    /// `[a, b] = f()`
    Tuple(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub mode: DeclMode,
    pub ty: Option<TypeRef>,
    pub target: DeclTarget,
    pub init: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `:=`
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reassign {
    pub target: Expr,
    pub op: AssignOp,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Function,
    /// First parameter is the receiver
    Method,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Option<TypeRef>,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub kind: FunctionKind,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub exported: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: String,
    pub fields: Vec<Field>,
    pub exported: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub test: Expr,
    pub body: Vec<Stmt>,
    /// `else if` chains nest as a single `If` statement here
    pub orelse: Vec<Stmt>,
}

impl IfStmt {
    /// `if / else if / else` as `(test, body)` arms plus the final `else`
    pub fn branches(&self) -> (Vec<(&Expr, &[Stmt])>, Option<&[Stmt]>) {
        let mut arms = Vec::new();
        let mut current = self;
        loop {
            arms.push((&current.test, current.body.as_slice()));
            match current.orelse.as_slice() {
                [
                    Stmt {
                        kind: StmtKind::If(next),
                        ..
                    },
                ] => current = next,
                [] => return (arms, None),
                rest => return (arms, Some(rest)),
            }
        }
    }

    /// Owned counterpart of [`IfStmt::branches`]
    pub fn into_branches(self) -> (Vec<ConditionalBranch>, Option<Vec<Stmt>>) {
        let mut branches = Vec::new();
        let mut current = self;
        loop {
            branches.push(ConditionalBranch {
                test: current.test,
                body: current.body,
            });
            let mut orelse = current.orelse;
            if let [
                Stmt {
                    kind: StmtKind::If(_),
                    ..
                },
            ] = orelse.as_slice()
            {
                if let Some(Stmt {
                    kind: StmtKind::If(next),
                    ..
                }) = orelse.pop()
                {
                    current = next;
                    continue;
                }
            }
            let orelse = if orelse.is_empty() { None } else { Some(orelse) };
            return (branches, orelse);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForRange {
    pub var: String,
    pub start: Expr,
    pub end: Expr,
    pub step: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForTarget {
    Name(String),
    /// `for [index, value] in xs`
    Pair(String, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForIn {
    pub target: ForTarget,
    pub iterable: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub test: Expr,
    pub body: Vec<Stmt>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    Const,
    Simple,
    Series,
}

/// A type annotation. Types are carried for lowering only; no checking is done.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub qualifier: Option<Qualifier>,
    /// Possibly dotted, e.g. `chart.point`
    pub name: String,
    pub args: Vec<TypeRef>,
    /// `float[]` shorthand for `array<float>`
    pub array: bool,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef {
            qualifier: None,
            name: name.into(),
            args: Vec::new(),
            array: false,
        }
    }

    /// Source-like rendering, e.g. `array<float>` or `float[]`
    pub fn display(&self) -> String {
        let mut out = self.name.clone();
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(TypeRef::display).collect();
            out.push('<');
            out.push_str(&args.join(", "));
            out.push('>');
        }
        if self.array {
            out.push_str("[]");
        }
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    /// Set for `name = value` arguments
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Color(String),
    Na,
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Ternary {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        type_args: Vec<TypeRef>,
        args: Vec<Argument>,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    /// `series[offset]`
    History {
        target: Box<Expr>,
        offset: Box<Expr>,
    },
    Tuple(Vec<Expr>),
    /// `if` used as a value
    Conditional(Box<ConditionalExpr>),
    Switch(Box<SwitchExpr>),
}

impl Expr {
    /// Root identifier of a dotted path, e.g. `ta` for `ta.sma`
    pub fn root_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            Expr::Member { object, .. } => object.root_ident(),
            _ => None,
        }
    }

    /// `a.b.c` as a string, when the expression is a plain dotted path
    pub fn dotted_path(&self) -> Option<String> {
        match self {
            Expr::Ident(name) => Some(name.clone()),
            Expr::Member { object, property } => {
                object.dotted_path().map(|base| format!("{}.{}", base, property))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalBranch {
    pub test: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalExpr {
    /// `if` followed by every `else if`
    pub branches: Vec<ConditionalBranch>,
    pub orelse: Option<Vec<Stmt>>,
    /// Set by the parser when a branch cannot collapse into a ternary
    pub needs_lifting: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for the `=>` default case
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchExpr {
    pub discriminant: Option<Expr>,
    pub cases: Vec<SwitchCase>,
    pub needs_lifting: bool,
}

/// Whether a statement list must be lifted out of expression position.
///
/// Only a single expression statement that itself needs no lifting can
/// collapse into a ternary arm.
pub fn body_needs_lifting(body: &[Stmt]) -> bool {
    match body {
        [Stmt {
            kind: StmtKind::Expr(expr),
            ..
        }] => expr_needs_lifting(expr),
        _ => true,
    }
}

pub fn expr_needs_lifting(expr: &Expr) -> bool {
    match expr {
        Expr::Conditional(cond) => cond.needs_lifting,
        Expr::Switch(switch) => switch.needs_lifting,
        _ => false,
    }
}
