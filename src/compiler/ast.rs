//! Syntax tree produced by the parser.

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(String),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Literal),
    Name(String),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// `f(a, b, k=v)`
    Call { name: String, args: Vec<Expr>, kwargs: Vec<(String, Expr)> },
    /// `obj.method(...)`: state accessor or cross-contract call
    Method { object: String, method: String, args: Vec<Expr>, kwargs: Vec<(String, Expr)> },
    /// `obj.field`; only `ctx.<field>` is meaningful
    Attr { object: String, field: String },
    /// `target[i]` or `h[k1, k2]`
    Index { target: Box<Expr>, keys: Vec<Expr> },
}

impl Expr {
    pub fn literal(&self) -> Option<&Literal> {
        match self {
            Expr::Lit(l) => Some(l),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Let { name: String, value: Expr },
    Assign { name: String, value: Expr },
    /// `target[keys] = value`
    IndexAssign { target: String, keys: Vec<Expr>, value: Expr },
    If { cond: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt> },
    While { cond: Expr, body: Vec<Stmt> },
    Return(Option<Expr>),
    Assert { cond: Expr, msg: Option<Expr> },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnKind {
    Export,
    Construct,
    Private,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    pub kind: FnKind,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKind {
    Var,
    Hash,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Import { name: String, line: usize },
    Var { name: String, line: usize },
    Hash { name: String, default: Option<Expr>, line: usize },
    Foreign { kind: ForeignKind, name: String, contract: String, variable: String, line: usize },
    Function(FnDecl),
}

impl Item {
    pub fn name(&self) -> &str {
        match self {
            Item::Import { name, .. }
            | Item::Var { name, .. }
            | Item::Hash { name, .. }
            | Item::Foreign { name, .. } => name,
            Item::Function(f) => &f.name,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Item::Import { line, .. }
            | Item::Var { line, .. }
            | Item::Hash { line, .. }
            | Item::Foreign { line, .. } => *line,
            Item::Function(f) => f.line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub items: Vec<Item>,
}
