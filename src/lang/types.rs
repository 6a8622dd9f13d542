use serde::{Deserialize, Serialize};
use std::fmt;

/// Value types of the source language.
///
/// Every non-void value occupies exactly one memory cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Int,
    Char,
    Bool,
    #[default]
    Void,
}

impl Type {
    /// Number of memory cells a value of this type occupies.
    pub fn cells(self) -> i32 {
        match self {
            Type::Int | Type::Char | Type::Bool => 1,
            Type::Void => 0,
        }
    }

    pub fn is_void(self) -> bool {
        self == Type::Void
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Int => "Int",
            Type::Char => "Char",
            Type::Bool => "Bool",
            Type::Void => "Void",
        };
        f.write_str(name)
    }
}
