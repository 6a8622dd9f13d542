use serde::{Deserialize, Serialize};

// =============================================================================
// OPCODE - one byte per instruction on the wire
// =============================================================================

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    BinDef = 0x00,
    Text = 0x01,
    Data = 0x02,
    Move = 0x03,
    Const = 0x04,
    Add = 0x05,
    Mul = 0x06,
    Sub = 0x07,
    Div = 0x08,
    LessThan = 0x09,
    Jump = 0x0A,
    Extern = 0x0B,
    Halt = 0x0C,
    Equals = 0x0D,
    Mod = 0x0E,
    LessEquals = 0x0F,
    JumpAddress = 0x10,
    NotEquals = 0x11,
    BitAnd = 0x12,
    BitOr = 0x13,
    JumpN = 0x14,
}

impl OpCode {
    const ALL: [OpCode; 21] = [
        OpCode::BinDef,
        OpCode::Text,
        OpCode::Data,
        OpCode::Move,
        OpCode::Const,
        OpCode::Add,
        OpCode::Mul,
        OpCode::Sub,
        OpCode::Div,
        OpCode::LessThan,
        OpCode::Jump,
        OpCode::Extern,
        OpCode::Halt,
        OpCode::Equals,
        OpCode::Mod,
        OpCode::LessEquals,
        OpCode::JumpAddress,
        OpCode::NotEquals,
        OpCode::BitAnd,
        OpCode::BitOr,
        OpCode::JumpN,
    ];

    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(v: u8) -> Option<Self> {
        Self::ALL.get(usize::from(v)).copied()
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::BinDef => "BINDEF",
            OpCode::Text => "TEXT",
            OpCode::Data => "DATA",
            OpCode::Move => "MOVE",
            OpCode::Const => "CONST",
            OpCode::Add => "ADD",
            OpCode::Mul => "MUL",
            OpCode::Sub => "SUB",
            OpCode::Div => "DIV",
            OpCode::LessThan => "LT",
            OpCode::Jump => "JUMP",
            OpCode::Extern => "EXTERN",
            OpCode::Halt => "HALT",
            OpCode::Equals => "EQ",
            OpCode::Mod => "MOD",
            OpCode::LessEquals => "LE",
            OpCode::JumpAddress => "JUMPADR",
            OpCode::NotEquals => "NE",
            OpCode::BitAnd => "AND",
            OpCode::BitOr => "OR",
            OpCode::JumpN => "JUMPN",
        }
    }
}

// =============================================================================
// BINARY OPS - three-address arithmetic and comparison
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    LessThan,
    LessEquals,
    Equals,
    NotEquals,
    BitAnd,
    BitOr,
}

impl BinaryOp {
    pub fn opcode(self) -> OpCode {
        match self {
            BinaryOp::Add => OpCode::Add,
            BinaryOp::Sub => OpCode::Sub,
            BinaryOp::Mul => OpCode::Mul,
            BinaryOp::Div => OpCode::Div,
            BinaryOp::Mod => OpCode::Mod,
            BinaryOp::LessThan => OpCode::LessThan,
            BinaryOp::LessEquals => OpCode::LessEquals,
            BinaryOp::Equals => OpCode::Equals,
            BinaryOp::NotEquals => OpCode::NotEquals,
            BinaryOp::BitAnd => OpCode::BitAnd,
            BinaryOp::BitOr => OpCode::BitOr,
        }
    }

    pub fn from_opcode(op: OpCode) -> Option<Self> {
        let op = match op {
            OpCode::Add => BinaryOp::Add,
            OpCode::Sub => BinaryOp::Sub,
            OpCode::Mul => BinaryOp::Mul,
            OpCode::Div => BinaryOp::Div,
            OpCode::Mod => BinaryOp::Mod,
            OpCode::LessThan => BinaryOp::LessThan,
            OpCode::LessEquals => BinaryOp::LessEquals,
            OpCode::Equals => BinaryOp::Equals,
            OpCode::NotEquals => BinaryOp::NotEquals,
            OpCode::BitAnd => BinaryOp::BitAnd,
            OpCode::BitOr => BinaryOp::BitOr,
            _ => return None,
        };
        Some(op)
    }

    /// Apply the operation with 32-bit wrapping semantics.
    ///
    /// Returns `None` for division or remainder by zero.
    pub fn apply(self, a: i32, b: i32) -> Option<i32> {
        let value = match self {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Div => {
                if b == 0 {
                    return None;
                }
                a.wrapping_div(b)
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return None;
                }
                a.wrapping_rem(b)
            }
            BinaryOp::LessThan => i32::from(a < b),
            BinaryOp::LessEquals => i32::from(a <= b),
            BinaryOp::Equals => i32::from(a == b),
            BinaryOp::NotEquals => i32::from(a != b),
            BinaryOp::BitAnd => a & b,
            BinaryOp::BitOr => a | b,
        };
        Some(value)
    }
}
