use lex::Pos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int,
    Float,
    Char,
    String,
    Void,
}

impl Type {
    pub fn name(self) -> &'static str {
        match self {
            Type::Int => "int",
            Type::Float => "float",
            Type::Char => "char",
            Type::String => "string",
            Type::Void => "void",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    // Comparisons (result is int 0/1)
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    // Logical (result is int 0/1)
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLit(i64),
    FloatLit(f64),
    CharLit(char),
    StringLit(String),
    Var(String),
    Index { name: String, index: Box<Expr> },
    Call { name: String, args: Vec<Expr> },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

/// Assignment target: a scalar variable or one array element.
#[derive(Debug, Clone, PartialEq)]
pub enum LValue {
    Var { name: String },
    Index { name: String, index: Expr },
}

impl LValue {
    pub fn name(&self) -> &str {
        match self {
            LValue::Var { name } | LValue::Index { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

impl Stmt {
    pub fn new(kind: StmtKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    // `int a = 1, b, c[4];` arrives as a flat run of VarDecl/ArrayDecl.
    VarDecl {
        ty: Type,
        name: String,
        init: Option<Expr>,
    },
    ArrayDecl {
        ty: Type,
        name: String,
        size: usize,
    },
    Assign {
        target: LValue,
        value: Expr,
    },
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Vec<Stmt>,
        body: Block,
    },
    Return(Option<Expr>),
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: Type,
    pub name: String,
    pub is_array: bool,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub ret_type: Type,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Top-level functions in declaration order, includes first. `main` is
    /// extracted and never appears here.
    pub functions: Vec<Function>,
    pub main: Function,
}
