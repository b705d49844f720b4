//! AST for the recognized module-script subset.
//!
//! A tagged sum over the statement and expression forms the compiler
//! understands (ES 2020 level). Position-only data is carried as a
//! [`Span`] per node and excluded from structural comparisons.

/// Source position, 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Declaration keyword of a variable statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

/// A function or arrow literal: parameter names in source order and a
/// body of statements. Parameter defaults are accepted and dropped;
/// rest parameters are not supported.
#[derive(Debug, Clone)]
pub struct FuncLit {
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

/// Member access property: `obj.name` or `obj[expr]`.
#[derive(Debug, Clone)]
pub enum MemberProp {
    Dot(String),
    Index(Box<Expr>),
}

/// Expressions.
#[derive(Debug, Clone)]
pub enum Expr {
    Num { value: f64, span: Span },
    Str { value: String, span: Span },
    Bool { value: bool, span: Span },
    Null { span: Span },
    Ident { name: String, span: Span },
    /// Template literal: n+1 quasi fragments around n interpolations.
    Template { quasis: Vec<String>, exprs: Vec<Expr>, span: Span },
    Array { elems: Vec<Expr>, span: Span },
    Object { props: Vec<(String, Expr)>, span: Span },
    Unary { op: UnaryOp, expr: Box<Expr>, span: Span },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr>, span: Span },
    Cond { cond: Box<Expr>, then: Box<Expr>, other: Box<Expr>, span: Span },
    Assign { target: Box<Expr>, value: Box<Expr>, span: Span },
    Member { object: Box<Expr>, prop: MemberProp, span: Span },
    Call { callee: Box<Expr>, args: Vec<Expr>, span: Span },
    /// Anonymous function or arrow expression.
    Func { func: FuncLit, span: Span },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Num { span, .. }
            | Expr::Str { span, .. }
            | Expr::Bool { span, .. }
            | Expr::Null { span }
            | Expr::Ident { span, .. }
            | Expr::Template { span, .. }
            | Expr::Array { span, .. }
            | Expr::Object { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Cond { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Member { span, .. }
            | Expr::Call { span, .. }
            | Expr::Func { span, .. } => *span,
        }
    }

    /// The identifier name if this is a bare identifier reference.
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// One `name = init` declarator of a variable statement.
#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Expr>,
}

/// Statements.
#[derive(Debug, Clone)]
pub enum Stmt {
    Expr { expr: Expr, span: Span },
    VarDecl { kind: DeclKind, decls: Vec<Declarator>, span: Span },
    FuncDecl { name: String, func: FuncLit, exported: bool, span: Span },
    Return { value: Option<Expr>, span: Span },
    If { cond: Expr, then: Vec<Stmt>, other: Option<Vec<Stmt>>, span: Span },
    While { cond: Expr, body: Vec<Stmt>, span: Span },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        update: Option<Expr>,
        body: Vec<Stmt>,
        span: Span,
    },
    Block { body: Vec<Stmt>, span: Span },
    /// `export { a, b }`
    ExportNamed { names: Vec<String>, span: Span },
    Break { span: Span },
    Continue { span: Span },
    Empty { span: Span },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr { span, .. }
            | Stmt::VarDecl { span, .. }
            | Stmt::FuncDecl { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Block { span, .. }
            | Stmt::ExportNamed { span, .. }
            | Stmt::Break { span }
            | Stmt::Continue { span }
            | Stmt::Empty { span } => *span,
        }
    }
}

/// A parsed source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub body: Vec<Stmt>,
}
