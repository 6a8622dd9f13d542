//! Calling-convention helpers for extern callbacks.
//!
//! When an extern runs, the stack pointer (cell 0) has been advanced past the
//! caller's outgoing arguments. The last argument sits at `SP - 1`, earlier
//! ones below it, and the return slot directly below the first argument.

use super::runtime_error::VmError;
use super::vm::Vm;
use crate::bytecode::SP;

/// Argument `offset` counted back from the last one (`0` is the last argument).
pub fn get_arg(vm: &Vm, offset: i32) -> Result<i32, VmError> {
    let sp = vm.get(SP)?;
    vm.get(sp.wrapping_sub(1).wrapping_sub(offset))
}

/// Write the return value of an extern taking `arg_size` argument cells.
pub fn set_return(vm: &mut Vm, arg_size: i32, value: i32) -> Result<(), VmError> {
    let sp = vm.get(SP)?;
    vm.set(sp.wrapping_sub(1).wrapping_sub(arg_size), value)
}

/// Extern of no arguments returning an `Int`.
pub fn ret_int<F>(f: F) -> impl Fn(&mut Vm) -> Result<(), VmError> + Send + Sync + 'static
where
    F: Fn() -> i32 + Send + Sync + 'static,
{
    move |vm: &mut Vm| set_return(vm, 0, f())
}

/// Extern of one `Int` argument returning nothing.
pub fn get_int<F>(f: F) -> impl Fn(&mut Vm) -> Result<(), VmError> + Send + Sync + 'static
where
    F: Fn(i32) -> Result<(), VmError> + Send + Sync + 'static,
{
    move |vm: &mut Vm| f(get_arg(vm, 0)?)
}

/// Extern of one `Int` argument returning an `Int`.
pub fn int_to_int<F>(f: F) -> impl Fn(&mut Vm) -> Result<(), VmError> + Send + Sync + 'static
where
    F: Fn(i32) -> i32 + Send + Sync + 'static,
{
    move |vm: &mut Vm| {
        let arg = get_arg(vm, 0)?;
        set_return(vm, 1, f(arg))
    }
}
