//! Back end for the Spooky language: a typed program is lowered to IR,
//! optionally peephole-optimized, emitted as a register-machine executable,
//! and run on the [`runtime::Vm`].

pub mod bytecode;
pub mod ir;
pub mod lang;
pub mod runtime;

use crate::bytecode::{CodegenOptions, Executable, FormatError};
use crate::ir::GenError;
use crate::lang::TypedProgram;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Gen(#[from] GenError),

    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Compile a typed program into an executable called `name`.
pub fn compile(
    name: &str,
    program: &TypedProgram,
    options: &CodegenOptions,
) -> Result<Executable, CompileError> {
    let mut lowered = ir::generate(program)?;
    if options.optimize {
        let rewrites = ir::peephole::optimize(&mut lowered);
        log::debug!("peephole: {} rewrites", rewrites);
    }
    Ok(bytecode::codegen(name, &lowered)?)
}
