//! # Bytecode
//!
//! The executable format: instructions over `(base, offset)` operands, the
//! binary encoding, and code generation from IR.

pub mod codegen;
pub mod disasm;
pub mod executable;
pub mod format;
pub mod format_error;
pub mod instruction;
pub mod op;

pub use codegen::{CodegenOptions, codegen};
pub use executable::Executable;
pub use format_error::{FormatError, Segment};
pub use instruction::{Address, Instruction};
pub use op::{BinaryOp, OpCode};

/// Stack cell holding the stack pointer.
pub const SP: i32 = 0;
/// Scratch stack cell used for SP arithmetic around calls.
pub const REG_1: i32 = 1;
/// First free stack cell; globals start here.
pub const NEXT_STACK: i32 = 2;
/// Data cell guaranteed to hold 0.
pub const CONST_ZERO_CELL: i32 = 0;
/// Data cell guaranteed to hold 1.
pub const CONST_ONE_CELL: i32 = 1;
