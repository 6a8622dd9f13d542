//! # Typed program input
//!
//! The tree the back end consumes. The front end (lexing, parsing, name and
//! type resolution) produces values of these types; the IR generator re-checks
//! every type it relies on, so a hand-built tree is as good as a parsed one.
//!
//! Programs travel between tools in postcard encoding, see
//! [`TypedProgram::encode`](program::TypedProgram::encode).

pub mod program;
pub mod types;

pub use program::{
    BinaryOperator, CompoundOperator, Expr, ExprKind, FuncDecl, Function, Param, Pos, Stmt,
    StmtKind, TypedProgram, UnaryOperator, VarDecl,
};
pub use types::Type;
