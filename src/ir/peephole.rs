//! Peephole pass folding operand loads into the binary op that consumes them.
//!
//! `Store(v -> t); op(t, x -> r)` becomes `op(DT[v], x -> r)` with `v` pooled
//! in the data segment, and `Copy(s -> t); op(t, x -> r)` becomes
//! `op(s, x -> r)`. A pair is only folded when `t` is dead after the op:
//! either the op overwrites it, or straight-line code overwrites it before
//! any read or control transfer.

use super::addr::IrAddr;
use super::function::{ConstantPool, IrProgram};
use super::stmt::IrStatement;
use std::mem;

/// Fold to a fixed point. Returns the number of rewrites.
pub fn optimize(program: &mut IrProgram) -> usize {
    let IrProgram { functions, data } = program;
    let mut total = 0;
    for (name, function) in functions.iter_mut() {
        let before = function.body.len();
        let rewrites = optimize_body(&mut function.body, data);
        if rewrites > 0 {
            log::debug!(
                "peephole '{}': {} -> {} statements",
                name,
                before,
                function.body.len()
            );
        }
        total += rewrites;
    }
    total
}

fn optimize_body(body: &mut Vec<IrStatement>, pool: &mut ConstantPool) -> usize {
    let mut rewrites = 0;
    loop {
        let mut changed = false;
        let mut i = 0;
        while i + 1 < body.len() {
            match fold(&body[i], &body[i + 1], &body[i + 2..], pool) {
                Some(folded) => {
                    log::trace!(
                        "peephole: `{}` + `{}` => `{}`",
                        body[i].to_string().trim(),
                        body[i + 1].to_string().trim(),
                        folded.to_string().trim()
                    );
                    body[i + 1] = folded;
                    body.remove(i);
                    changed = true;
                    rewrites += 1;
                }
                None => i += 1,
            }
        }
        if !changed {
            return rewrites;
        }
    }
}

fn fold(
    load: &IrStatement,
    consumer: &IrStatement,
    rest: &[IrStatement],
    pool: &mut ConstantPool,
) -> Option<IrStatement> {
    let written = match load {
        IrStatement::Store { addr, .. } => *addr,
        IrStatement::Copy { to, .. } => *to,
        _ => return None,
    };
    let IrStatement::Binary { op, a, b, result } = consumer else {
        return None;
    };
    if *a != written && *b != written {
        return None;
    }
    if *result != written && !dead_after(written, rest) {
        return None;
    }

    let source = match load {
        IrStatement::Store { value, .. } => pool.intern(*value),
        IrStatement::Copy { from, .. } => *from,
        _ => return None,
    };
    let replace = |x: IrAddr| if x == written { source } else { x };
    Some(IrStatement::binary(*op, replace(*a), replace(*b), *result))
}

/// Whether `cell` is overwritten before it can be observed.
fn dead_after(cell: IrAddr, rest: &[IrStatement]) -> bool {
    for statement in rest {
        if statement.reads().into_iter().any(|r| may_alias(r, cell)) {
            return false;
        }
        if statement.transfers_control() {
            return matches!(statement, IrStatement::Halt);
        }
        if statement.writes() == Some(cell) {
            return true;
        }
    }
    false
}

/// SP-relative and absolute stack addresses may name the same cell.
fn may_alias(x: IrAddr, y: IrAddr) -> bool {
    x == y || (x.is_stack() && y.is_stack() && mem::discriminant(&x) != mem::discriminant(&y))
}
