use crate::bytecode::{CONST_ONE_CELL, CONST_ZERO_CELL, NEXT_STACK, REG_1, SP};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbolic memory location used by the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrAddr {
    /// Offset from the current stack pointer.
    RelSp(i32),
    /// Fixed stack cell.
    AbsStack(i32),
    /// Data cell, stored as its negative VM position (`-index - 1`).
    AbsData(i32),
}

impl IrAddr {
    pub const SP: IrAddr = IrAddr::AbsStack(SP);
    pub const REG_1: IrAddr = IrAddr::AbsStack(REG_1);
    pub const CONST_ZERO: IrAddr = IrAddr::data_cell(CONST_ZERO_CELL);
    pub const CONST_ONE: IrAddr = IrAddr::data_cell(CONST_ONE_CELL);

    pub const fn rel_sp(offset: i32) -> Self {
        IrAddr::RelSp(offset)
    }

    pub const fn abs_stack(index: i32) -> Self {
        IrAddr::AbsStack(index)
    }

    /// Global variable slot `offset`, placed after the reserved stack cells.
    pub const fn global(offset: i32) -> Self {
        IrAddr::AbsStack(NEXT_STACK + offset)
    }

    pub const fn data_cell(index: i32) -> Self {
        IrAddr::AbsData(-index - 1)
    }

    pub fn is_stack(self) -> bool {
        !matches!(self, IrAddr::AbsData(_))
    }
}

impl fmt::Display for IrAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrAddr::RelSp(o) if *o < 0 => write!(f, "[SP{}]", o),
            IrAddr::RelSp(o) => write!(f, "[SP+{}]", o),
            IrAddr::AbsStack(i) => write!(f, "[{}]", i),
            IrAddr::AbsData(a) => write!(f, "DT[{}]", -(i64::from(*a) + 1)),
        }
    }
}
