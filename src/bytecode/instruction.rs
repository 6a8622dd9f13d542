use super::op::{BinaryOp, OpCode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base-plus-offset operand. At run time the VM reads the cell at `base`
/// and adds `offset` to get the effective position. A base of `-1` reads
/// data cell 0, which always holds zero, so `{-1, n}` names position `n`
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub base: i32,
    pub offset: i32,
}

impl Address {
    pub const fn new(base: i32, offset: i32) -> Self {
        Address { base, offset }
    }

    /// Fixed position: memory cell `n` for `n >= 0`, data cell `-n - 1` otherwise.
    pub const fn absolute(n: i32) -> Self {
        Address::new(-1, n)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.base {
            -1 if self.offset < 0 => write!(f, "DT[{}]", -(i64::from(self.offset) + 1)),
            -1 => write!(f, "[{}]", self.offset),
            0 if self.offset >= 0 => write!(f, "[SP+{}]", self.offset),
            0 => write!(f, "[SP{}]", self.offset),
            base if self.offset >= 0 => write!(f, "[@{}+{}]", base, self.offset),
            base => write!(f, "[@{}{}]", base, self.offset),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // segment markers
    BinDef { name: String },
    Text,
    Data { values: Vec<i32> },

    // memory
    Move { source: Address, target: Address },
    Const { value: i32, target: Address },
    Binary {
        op: BinaryOp,
        op1: Address,
        op2: Address,
        target: Address,
    },

    // control flow
    /// Jump to `target` if the flag cell is zero.
    Jump { flag: Address, target: i32 },
    /// Jump to `target` if the flag cell is nonzero.
    JumpN { flag: Address, target: i32 },
    /// Jump to the text index stored in the addressed cell.
    JumpAddress { addr: Address },
    Extern { name: String },
    Halt,
}

impl Instruction {
    pub fn opcode(&self) -> OpCode {
        match self {
            Instruction::BinDef { .. } => OpCode::BinDef,
            Instruction::Text => OpCode::Text,
            Instruction::Data { .. } => OpCode::Data,
            Instruction::Move { .. } => OpCode::Move,
            Instruction::Const { .. } => OpCode::Const,
            Instruction::Binary { op, .. } => op.opcode(),
            Instruction::Jump { .. } => OpCode::Jump,
            Instruction::JumpN { .. } => OpCode::JumpN,
            Instruction::JumpAddress { .. } => OpCode::JumpAddress,
            Instruction::Extern { .. } => OpCode::Extern,
            Instruction::Halt => OpCode::Halt,
        }
    }

    /// Segment markers are the only instructions that may not appear in text.
    pub fn is_executable(&self) -> bool {
        !matches!(
            self,
            Instruction::BinDef { .. } | Instruction::Text | Instruction::Data { .. }
        )
    }

    /// Statically known jump destination, if any.
    pub fn jump_target(&self) -> Option<i32> {
        match self {
            Instruction::Jump { target, .. } | Instruction::JumpN { target, .. } => Some(*target),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.opcode().mnemonic();
        match self {
            Instruction::BinDef { name } => write!(f, "{mnemonic} {name}"),
            Instruction::Text | Instruction::Halt => f.write_str(mnemonic),
            Instruction::Data { values } => write!(f, "{mnemonic} {values:?}"),
            Instruction::Move { source, target } => write!(f, "{mnemonic} {source} -> {target}"),
            Instruction::Const { value, target } => write!(f, "{mnemonic} {value} -> {target}"),
            Instruction::Binary {
                op1, op2, target, ..
            } => write!(f, "{mnemonic} {op1} {op2} -> {target}"),
            Instruction::Jump { flag, target } | Instruction::JumpN { flag, target } => {
                write!(f, "{mnemonic} {flag} {target:04}")
            }
            Instruction::JumpAddress { addr } => write!(f, "{mnemonic} {addr}"),
            Instruction::Extern { name } => write!(f, "{mnemonic} {name}"),
        }
    }
}
