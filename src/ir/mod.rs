//! # Intermediate representation
//!
//! A flat, per-function statement list over symbolic addresses. The
//! [`generator`] lowers a [`TypedProgram`](crate::lang::TypedProgram) into
//! it, the optional [`peephole`] pass tightens it, and the code generator in
//! [`bytecode::codegen`](crate::bytecode::codegen) turns it into an executable.

pub mod addr;
pub mod function;
pub mod gen_error;
pub mod generator;
pub mod peephole;
pub mod scope;
pub mod stmt;

pub use addr::IrAddr;
pub use function::{ConstantPool, INIT_FUNCTION, IrFunction, IrProgram, MAIN_FUNCTION};
pub use gen_error::{GenError, GenErrorKind};
pub use generator::generate;
pub use stmt::{IrLabel, IrStatement};
