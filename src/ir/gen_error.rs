use crate::lang::{Pos, Type};

/// Semantic error found while lowering a typed program to IR.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{pos}: {kind}")]
pub struct GenError {
    pub pos: Pos,
    pub kind: GenErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenErrorKind {
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("function '{0}' is not defined")]
    UndefinedFunction(String),

    #[error("'{0}' is already declared in this scope")]
    Redeclared(String),

    #[error("function '{0}' is declared more than once")]
    DuplicateFunction(String),

    #[error("parameter '{0}' is declared more than once")]
    DuplicateParam(String),

    #[error("'{0}' cannot have type Void")]
    VoidVariable(String),

    #[error("'{name}' takes {expected} argument(s), {found} given")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: Type, found: Type },

    #[error("condition must be Bool, found {0}")]
    NonBooleanCondition(Type),

    #[error("operator {op} cannot be applied to {lhs} and {rhs}")]
    InvalidOperands { op: String, lhs: Type, rhs: Type },

    #[error("cannot return a value from a function returning Void")]
    UnexpectedReturnValue,

    #[error("missing return value in function returning {0}")]
    MissingReturnValue(Type),

    #[error("function '{0}' must end with a return statement")]
    MissingReturn(String),

    #[error("main must return Void, found {0}")]
    NonVoidMain(Type),

    #[error("program has no main function")]
    MissingMain,

    #[error("left-hand side is not a variable")]
    NotAssignable,
}

impl GenError {
    pub fn new(pos: Pos, kind: GenErrorKind) -> Self {
        GenError { pos, kind }
    }

    pub fn mismatch(pos: Pos, expected: Type, found: Type) -> Self {
        GenError::new(pos, GenErrorKind::TypeMismatch { expected, found })
    }
}
