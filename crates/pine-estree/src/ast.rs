//! ESTree-shaped syntax tree for the script subset
//!
//! Nodes own their children so that passes can consume a tree and rebuild
//! it. Positions are not tracked past parsing.

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Stmt>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

impl VarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VarKind::Var => "var",
            VarKind::Let => "let",
            VarKind::Const => "const",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub id: Pattern,
    pub init: Option<Expr>,
}

/// `for (const x of xs)` or `for (k in obj)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForEachKind {
    Of,
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForEachLeft {
    /// `None` when the loop assigns to an existing binding
    pub kind: Option<VarKind>,
    pub pattern: Pattern,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Var {
        kind: VarKind,
        decls: Vec<Declarator>,
    },
    /// Function declaration; `name` is always set
    Function(Function),
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    For {
        /// A `Var` or `Expr` statement
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForEach {
        each: ForEachKind,
        left: ForEachLeft,
        right: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Block(Vec<Stmt>),
    Expr(Expr),
    Empty,
}

impl Stmt {
    /// Wrap a non-block statement in a block.
    pub fn into_block(self) -> Vec<Stmt> {
        match self {
            Stmt::Block(body) => body,
            Stmt::Empty => Vec::new(),
            other => vec![other],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Functions and patterns
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    /// Concise arrow body
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<Pattern>,
    pub body: FunctionBody,
    pub arrow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyPattern {
    pub key: String,
    pub value: Pattern,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(String),
    /// `[a, , b]`; holes are `None`
    Array(Vec<Option<Pattern>>),
    Object(Vec<PropertyPattern>),
    Default {
        target: Box<Pattern>,
        value: Expr,
    },
    Rest(Box<Pattern>),
}

impl Pattern {
    /// Every identifier the pattern binds, in source order
    pub fn bound_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names(&self, names: &mut Vec<String>) {
        match self {
            Pattern::Ident(name) => names.push(name.clone()),
            Pattern::Array(items) => {
                for item in items.iter().flatten() {
                    item.collect_names(names);
                }
            }
            Pattern::Object(props) => {
                for prop in props {
                    prop.value.collect_names(names);
                }
            }
            Pattern::Default { target, .. } => target.collect_names(names),
            Pattern::Rest(inner) => inner.collect_names(names),
        }
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
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Nullish,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Nullish => "??",
        }
    }

    pub fn from_punct(punct: &str) -> Option<BinaryOp> {
        Some(match punct {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::NotEq,
            "===" => BinaryOp::StrictEq,
            "!==" => BinaryOp::StrictNotEq,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::LtEq,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::GtEq,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            "??" => BinaryOp::Nullish,
            _ => return None,
        })
    }

    /// Binding strength, higher binds tighter
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Nullish | BinaryOp::Or => 4,
            BinaryOp::And => 5,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::StrictEq | BinaryOp::StrictNotEq => 9,
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => 10,
            BinaryOp::Add | BinaryOp::Sub => 12,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 13,
        }
    }

    /// The arithmetic operator behind a compound assignment
    pub fn from_compound(op: AssignOp) -> Option<BinaryOp> {
        match op {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    Typeof,
    Void,
    Delete,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::Typeof => "typeof",
            UnaryOp::Void => "void",
            UnaryOp::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

impl UpdateOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateOp::Increment => "++",
            UpdateOp::Decrement => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl AssignOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Mod => "%=",
        }
    }

    pub fn from_punct(punct: &str) -> Option<AssignOp> {
        Some(match punct {
            "=" => AssignOp::Assign,
            "+=" => AssignOp::Add,
            "-=" => AssignOp::Sub,
            "*=" => AssignOp::Mul,
            "/=" => AssignOp::Div,
            "%=" => AssignOp::Mod,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberProp {
    /// `obj.name`
    Name(String),
    /// `obj[expr]`
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    Name(String),
    Str(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: PropKey,
    pub value: Expr,
    /// `{ a }` rather than `{ a: a }`
    pub shorthand: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    Lit(Literal),
    Array(Vec<Expr>),
    Object(Vec<Property>),
    Function(Box<Function>),
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        arg: Box<Expr>,
    },
    /// Arithmetic, comparison and logical operators
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: MemberProp,
    },
    Sequence(Vec<Expr>),
    Spread(Box<Expr>),
}

// Constructors used heavily by the rewriting passes
impl Expr {
    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident(name.into())
    }

    pub fn num(value: f64) -> Expr {
        Expr::Lit(Literal::Num(value))
    }

    pub fn str(value: impl Into<String>) -> Expr {
        Expr::Lit(Literal::Str(value.into()))
    }

    pub fn undefined() -> Expr {
        Expr::Ident("undefined".to_string())
    }

    /// `object.name`
    pub fn member(object: Expr, name: impl Into<String>) -> Expr {
        Expr::Member {
            object: Box::new(object),
            property: MemberProp::Name(name.into()),
        }
    }

    /// `object[index]`
    pub fn index(object: Expr, index: Expr) -> Expr {
        Expr::Member {
            object: Box::new(object),
            property: MemberProp::Computed(Box::new(index)),
        }
    }

    /// Member chain from a dotted path, e.g. `$.math.__eq`
    pub fn path(dotted: &str) -> Expr {
        let mut parts = dotted.split('.');
        let head = Expr::ident(parts.next().unwrap_or_default());
        parts.fold(head, Expr::member)
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(arg: Expr) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            arg: Box::new(arg),
        }
    }

    /// Identifier at the root of a member chain: `a` in `a.b[c].d`
    pub fn root_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            Expr::Member { object, .. } => object.root_ident(),
            _ => None,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Expr::Function(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_path_builds_member_chain() {
        assert_eq!(
            Expr::path("$.math.__eq"),
            Expr::member(Expr::member(Expr::ident("$"), "math"), "__eq")
        );
        assert_eq!(Expr::path("x"), Expr::ident("x"));
    }

    #[test]
    fn test_root_ident() {
        let e = Expr::index(Expr::member(Expr::ident("a"), "b"), Expr::num(0.0));
        assert_eq!(e.root_ident(), Some("a"));
        assert_eq!(Expr::num(1.0).root_ident(), None);
    }

    #[test]
    fn test_bound_names() {
        let pattern = Pattern::Array(vec![
            Some(Pattern::Ident("a".into())),
            None,
            Some(Pattern::Object(vec![PropertyPattern {
                key: "k".into(),
                value: Pattern::Default {
                    target: Box::new(Pattern::Ident("b".into())),
                    value: Expr::num(1.0),
                },
            }])),
            Some(Pattern::Rest(Box::new(Pattern::Ident("c".into())))),
        ]);
        assert_eq!(pattern.bound_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_into_block() {
        assert_eq!(Stmt::Break.into_block(), vec![Stmt::Break]);
        assert_eq!(Stmt::Block(vec![Stmt::Continue]).into_block(), vec![Stmt::Continue]);
        assert!(Stmt::Empty.into_block().is_empty());
    }
}
