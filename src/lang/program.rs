use super::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source position carried by every node, used in generator diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    pub fn new(line: u32, col: u32) -> Self {
        Pos { line, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A type-annotated program as handed over by the front end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypedProgram {
    pub globals: Vec<VarDecl>,
    pub externs: Vec<FuncDecl>,
    pub functions: Vec<Function>,
}

impl TypedProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(mut self, decl: VarDecl) -> Self {
        self.globals.push(decl);
        self
    }

    pub fn extern_fn(mut self, decl: FuncDecl) -> Self {
        self.externs.push(decl);
        self
    }

    pub fn function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    /// Encode the program into the compact interchange format.
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub pos: Pos,
}

/// Function signature. Externs are bare declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    pub pos: Pos,
}

impl FuncDecl {
    pub fn new(name: impl Into<String>, ret: Type) -> Self {
        FuncDecl {
            name: name.into(),
            params: Vec::new(),
            ret,
            pos: Pos::default(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
            pos: Pos::default(),
        });
        self
    }

    pub fn at(mut self, line: u32, col: u32) -> Self {
        self.pos = Pos::new(line, col);
        self
    }

    pub fn body(self, body: Vec<Stmt>) -> Function {
        Function { decl: self, body }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub decl: FuncDecl,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    pub init: Expr,
    pub pos: Pos,
}

impl VarDecl {
    pub fn new(name: impl Into<String>, ty: Type, init: Expr) -> Self {
        VarDecl {
            name: name.into(),
            ty,
            init,
            pos: Pos::default(),
        }
    }
}

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Block(Vec<Stmt>),
    VarDecl(VarDecl),
    Loop {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        increment: Option<Box<Stmt>>,
        body: Box<Stmt>,
    },
    Conditional {
        condition: Expr,
        body: Box<Stmt>,
        else_body: Option<Box<Stmt>>,
    },
    Expr(Expr),
    Return(Option<Expr>),
}

impl Stmt {
    fn of(kind: StmtKind) -> Self {
        Stmt {
            kind,
            pos: Pos::default(),
        }
    }

    pub fn block(stmts: Vec<Stmt>) -> Self {
        Self::of(StmtKind::Block(stmts))
    }

    pub fn var(name: impl Into<String>, ty: Type, init: Expr) -> Self {
        Self::of(StmtKind::VarDecl(VarDecl::new(name, ty, init)))
    }

    pub fn expr(expr: Expr) -> Self {
        Self::of(StmtKind::Expr(expr))
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Self::of(StmtKind::Return(value))
    }

    pub fn if_else(condition: Expr, body: Stmt, else_body: Option<Stmt>) -> Self {
        Self::of(StmtKind::Conditional {
            condition,
            body: Box::new(body),
            else_body: else_body.map(Box::new),
        })
    }

    pub fn for_loop(
        init: Option<Stmt>,
        condition: Option<Expr>,
        increment: Option<Stmt>,
        body: Stmt,
    ) -> Self {
        Self::of(StmtKind::Loop {
            init: init.map(Box::new),
            condition,
            increment: increment.map(Box::new),
            body: Box::new(body),
        })
    }

    pub fn while_loop(condition: Expr, body: Stmt) -> Self {
        Self::for_loop(None, Some(condition), None, body)
    }

    pub fn at(mut self, line: u32, col: u32) -> Self {
        self.pos = Pos::new(line, col);
        self
    }
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    Eq,
    NotEq,
    And,
    Or,
    BitAnd,
    BitOr,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Less => "<",
            BinaryOperator::Greater => ">",
            BinaryOperator::LessEq => "<=",
            BinaryOperator::GreaterEq => ">=",
            BinaryOperator::Eq => "==",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Negate,
    Not,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
}

/// Operators allowed in compound assignment (`+=`, `-=`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompoundOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Int(i32),
    Char(u8),
    Bool(bool),
    Reference(String),
    Binary {
        op: BinaryOperator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Assign {
        target: Box<Expr>,
        op: Option<CompoundOperator>,
        value: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    fn of(kind: ExprKind) -> Self {
        Expr {
            kind,
            pos: Pos::default(),
        }
    }

    pub fn int(value: i32) -> Self {
        Self::of(ExprKind::Int(value))
    }

    pub fn char(value: u8) -> Self {
        Self::of(ExprKind::Char(value))
    }

    pub fn bool(value: bool) -> Self {
        Self::of(ExprKind::Bool(value))
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::of(ExprKind::Reference(name.into()))
    }

    pub fn binary(op: BinaryOperator, lhs: Expr, rhs: Expr) -> Self {
        Self::of(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn unary(op: UnaryOperator, operand: Expr) -> Self {
        Self::of(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::of(ExprKind::Call {
            name: name.into(),
            args,
        })
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Self::of(ExprKind::Assign {
            target: Box::new(target),
            op: None,
            value: Box::new(value),
        })
    }

    pub fn compound(op: CompoundOperator, target: Expr, value: Expr) -> Self {
        Self::of(ExprKind::Assign {
            target: Box::new(target),
            op: Some(op),
            value: Box::new(value),
        })
    }

    pub fn ternary(condition: Expr, then: Expr, otherwise: Expr) -> Self {
        Self::of(ExprKind::Ternary {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    pub fn at(mut self, line: u32, col: u32) -> Self {
        self.pos = Pos::new(line, col);
        self
    }
}
