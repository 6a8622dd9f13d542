use super::addr::IrAddr;
use crate::bytecode::BinaryOp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Jump target local to one function. Placed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrLabel(pub u32);

impl fmt::Display for IrLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IrStatement {
    Label(IrLabel),
    Halt,
    /// Call a host function with the stack pointer advanced by `sp_offset`.
    Extern {
        name: String,
        sp_offset: i32,
    },
    /// Call a program function with the stack pointer advanced by `sp_offset`;
    /// the callee returns to `resume`.
    Call {
        name: String,
        sp_offset: i32,
        resume: IrLabel,
    },
    JmpZero {
        label: IrLabel,
        flag: IrAddr,
    },
    JmpNonZero {
        label: IrLabel,
        flag: IrAddr,
    },
    Jmp {
        label: IrLabel,
    },
    /// Jump to the text index held in `addr`.
    JmpAdr {
        addr: IrAddr,
    },
    Store {
        addr: IrAddr,
        value: i32,
    },
    /// Write the text index of `label` into `addr`.
    StoreLabel {
        addr: IrAddr,
        label: IrLabel,
    },
    Copy {
        from: IrAddr,
        to: IrAddr,
    },
    Binary {
        op: BinaryOp,
        a: IrAddr,
        b: IrAddr,
        result: IrAddr,
    },
}

impl IrStatement {
    pub fn binary(op: BinaryOp, a: IrAddr, b: IrAddr, result: IrAddr) -> Self {
        IrStatement::Binary { op, a, b, result }
    }

    /// Cells this statement reads. Calls and externs read memory not named here.
    pub fn reads(&self) -> Vec<IrAddr> {
        match self {
            IrStatement::JmpZero { flag, .. } | IrStatement::JmpNonZero { flag, .. } => {
                vec![*flag]
            }
            IrStatement::JmpAdr { addr } => vec![*addr],
            IrStatement::Copy { from, .. } => vec![*from],
            IrStatement::Binary { a, b, .. } => vec![*a, *b],
            _ => Vec::new(),
        }
    }

    /// Cell this statement overwrites, if any.
    pub fn writes(&self) -> Option<IrAddr> {
        match self {
            IrStatement::Store { addr, .. } | IrStatement::StoreLabel { addr, .. } => Some(*addr),
            IrStatement::Copy { to, .. } => Some(*to),
            IrStatement::Binary { result, .. } => Some(*result),
            _ => None,
        }
    }

    /// Whether control may leave the straight-line sequence at this statement.
    pub fn transfers_control(&self) -> bool {
        matches!(
            self,
            IrStatement::Label(_)
                | IrStatement::Halt
                | IrStatement::Extern { .. }
                | IrStatement::Call { .. }
                | IrStatement::JmpZero { .. }
                | IrStatement::JmpNonZero { .. }
                | IrStatement::Jmp { .. }
                | IrStatement::JmpAdr { .. }
        )
    }
}

impl fmt::Display for IrStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrStatement::Label(label) => write!(f, "{label}:"),
            IrStatement::Halt => write!(f, "  halt"),
            IrStatement::Extern { name, sp_offset } => {
                write!(f, "  extern {name} (sp+{sp_offset})")
            }
            IrStatement::Call {
                name,
                sp_offset,
                resume,
            } => write!(f, "  call {name} (sp+{sp_offset}) -> {resume}"),
            IrStatement::JmpZero { label, flag } => write!(f, "  jz {flag} {label}"),
            IrStatement::JmpNonZero { label, flag } => write!(f, "  jnz {flag} {label}"),
            IrStatement::Jmp { label } => write!(f, "  jmp {label}"),
            IrStatement::JmpAdr { addr } => write!(f, "  jmp {addr}"),
            IrStatement::Store { addr, value } => write!(f, "  {addr} = {value}"),
            IrStatement::StoreLabel { addr, label } => write!(f, "  {addr} = &{label}"),
            IrStatement::Copy { from, to } => write!(f, "  {to} = {from}"),
            IrStatement::Binary { op, a, b, result } => {
                write!(f, "  {result} = {a} {} {b}", op_symbol(*op))
            }
        }
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::LessThan => "<",
        BinaryOp::LessEquals => "<=",
        BinaryOp::Equals => "==",
        BinaryOp::NotEquals => "!=",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
    }
}
