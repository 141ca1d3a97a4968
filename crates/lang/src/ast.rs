//! Abstract syntax tree for the language front-end.

#[derive(Debug, Clone, PartialEq)]
pub enum UnaryOp {
    Neg,
    Not,
}

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

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    NoneLit,
    Identifier(String),
    Read(Box<Expr>),
    MemberAccess(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// The assignable target of a `let`/`seal` statement: a dotted name with an
/// optional index, e.g. `roster.scores[0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LValue {
    pub base: String,
    pub index: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    SpeakerDecl {
        name: String,
        line: usize,
    },
    WorldDecl {
        name: String,
        line: usize,
    },
    AsBlock {
        speaker: Expr,
        body: Vec<Stmt>,
        line: usize,
    },
    Let {
        target: LValue,
        value: Expr,
        line: usize,
    },
    Speak {
        value: Expr,
        line: usize,
    },
    When {
        condition: Expr,
        when_body: Vec<Stmt>,
        otherwise_body: Vec<Stmt>,
        broken_body: Vec<Stmt>,
        line: usize,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        else_body: Vec<Stmt>,
        line: usize,
    },
    While {
        condition: Expr,
        max: u64,
        body: Vec<Stmt>,
        line: usize,
    },
    FnDef {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
        line: usize,
    },
    Return {
        value: Option<Expr>,
        line: usize,
    },
    Request {
        target: Expr,
        action: String,
        data: Option<Expr>,
        line: usize,
    },
    Respond {
        request_id: Expr,
        accept: bool,
        data: Option<Expr>,
        line: usize,
    },
    Inspect {
        target: Expr,
        line: usize,
    },
    History {
        target: Expr,
        line: usize,
    },
    LedgerRead {
        last: Option<u64>,
        line: usize,
    },
    VerifyLedger {
        line: usize,
    },
    Seal {
        target: LValue,
        line: usize,
    },
    Pass {
        line: usize,
    },
    Fail {
        line: usize,
    },
    ExprStmt {
        value: Expr,
        line: usize,
    },
}

impl Stmt {
    pub fn line(&self) -> usize {
        match self {
            Stmt::SpeakerDecl { line, .. }
            | Stmt::WorldDecl { line, .. }
            | Stmt::AsBlock { line, .. }
            | Stmt::Let { line, .. }
            | Stmt::Speak { line, .. }
            | Stmt::When { line, .. }
            | Stmt::If { line, .. }
            | Stmt::While { line, .. }
            | Stmt::FnDef { line, .. }
            | Stmt::Return { line, .. }
            | Stmt::Request { line, .. }
            | Stmt::Respond { line, .. }
            | Stmt::Inspect { line, .. }
            | Stmt::History { line, .. }
            | Stmt::LedgerRead { line, .. }
            | Stmt::VerifyLedger { line }
            | Stmt::Seal { line, .. }
            | Stmt::Pass { line }
            | Stmt::Fail { line }
            | Stmt::ExprStmt { line, .. } => *line,
        }
    }
}

pub type Program = Vec<Stmt>;
