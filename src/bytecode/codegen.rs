use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bytecode::{
    Address, BinaryOp, Executable, FormatError, Instruction, NEXT_STACK, SP,
};
use crate::ir::{INIT_FUNCTION, IrAddr, IrFunction, IrLabel, IrProgram, IrStatement, MAIN_FUNCTION};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodegenOptions {
    /// Run the peephole pass before emitting code.
    pub optimize: bool,
}

/// Emit an executable named `name` from an IR program.
///
/// Text layout: the SP preamble, `__init__` (falling through into `main`),
/// `main`, then every other non-extern function in name order.
pub fn codegen(name: &str, program: &IrProgram) -> Result<Executable, FormatError> {
    CodeGen::new(program).generate(name)
}

/// Map a symbolic address onto a VM operand.
pub fn translate(addr: IrAddr) -> Address {
    match addr {
        IrAddr::RelSp(offset) => Address::new(SP, offset),
        IrAddr::AbsStack(index) => Address::absolute(index),
        IrAddr::AbsData(pos) => Address::absolute(pos),
    }
}

/// Instruction awaiting the text index of a label.
#[derive(Debug)]
enum LabelPatch {
    JumpZero(Address),
    JumpNonZero(Address),
    StoreTarget(Address),
}

impl LabelPatch {
    fn resolve(self, target: i32) -> Instruction {
        match self {
            LabelPatch::JumpZero(flag) => Instruction::Jump { flag, target },
            LabelPatch::JumpNonZero(flag) => Instruction::JumpN { flag, target },
            LabelPatch::StoreTarget(target_cell) => Instruction::Const {
                value: target,
                target: target_cell,
            },
        }
    }
}

#[derive(Debug)]
struct LabelFixup {
    at: usize,
    label: IrLabel,
    patch: LabelPatch,
}

struct CodeGen<'p> {
    program: &'p IrProgram,

    /// `None` marks a slot still waiting for a fixup
    text: Vec<Option<Instruction>>,

    function_starts: HashMap<&'p str, i32>,

    /// Call sites, resolved once every function has been placed
    call_fixups: Vec<(usize, &'p str)>,
}

impl<'p> CodeGen<'p> {
    fn new(program: &'p IrProgram) -> Self {
        Self {
            program,
            text: Vec::new(),
            function_starts: HashMap::new(),
            call_fixups: Vec::new(),
        }
    }

    fn generate(mut self, name: &str) -> Result<Executable, FormatError> {
        self.emit(Instruction::Const {
            value: NEXT_STACK,
            target: translate(IrAddr::SP),
        });

        let program = self.program;
        if let Some(init) = program.function(INIT_FUNCTION) {
            self.function(INIT_FUNCTION, init);
        }
        let main = program
            .function(MAIN_FUNCTION)
            .unwrap_or_else(|| panic!("IR program has no {MAIN_FUNCTION} function"));
        self.function(MAIN_FUNCTION, main);

        for (fname, function) in &program.functions {
            if function.is_extern || fname == INIT_FUNCTION || fname == MAIN_FUNCTION {
                continue;
            }
            self.function(fname, function);
        }

        for (at, callee) in std::mem::take(&mut self.call_fixups) {
            let start = *self
                .function_starts
                .get(callee)
                .unwrap_or_else(|| panic!("call to unplaced function '{callee}'"));
            self.text[at] = Some(Instruction::Jump {
                flag: translate(IrAddr::CONST_ZERO),
                target: start,
            });
        }

        let text: Vec<Instruction> = self
            .text
            .into_iter()
            .enumerate()
            .map(|(i, slot)| slot.unwrap_or_else(|| panic!("unresolved instruction at {i:04}")))
            .collect();

        log::debug!(
            "codegen '{}': {} instructions, {} data cells",
            name,
            text.len(),
            self.program.data.cells().len()
        );
        Executable::new(name, text, self.program.data.cells().to_vec())
    }

    fn here(&self) -> i32 {
        // text indices are i32 on the wire
        self.text.len() as i32
    }

    fn emit(&mut self, instruction: Instruction) {
        self.text.push(Some(instruction));
    }

    fn placeholder(&mut self) -> usize {
        self.text.push(None);
        self.text.len() - 1
    }

    /// `Const(delta -> REG_1); op(SP, REG_1 -> SP)`, skipped for a zero delta.
    fn adjust_sp(&mut self, op: BinaryOp, delta: i32) {
        if delta == 0 {
            return;
        }
        self.emit(Instruction::Const {
            value: delta,
            target: translate(IrAddr::REG_1),
        });
        self.emit(Instruction::Binary {
            op,
            op1: translate(IrAddr::SP),
            op2: translate(IrAddr::REG_1),
            target: translate(IrAddr::SP),
        });
    }

    fn function(&mut self, name: &'p str, function: &'p IrFunction) {
        self.function_starts.insert(name, self.here());
        let mut labels: HashMap<IrLabel, i32> = HashMap::new();
        let mut fixups: Vec<LabelFixup> = Vec::new();

        let place = |labels: &mut HashMap<IrLabel, i32>, label: IrLabel, at: i32| {
            if labels.insert(label, at).is_some() {
                panic!("label {label} placed twice in '{name}'");
            }
        };

        for statement in &function.body {
            match statement {
                IrStatement::Label(label) => place(&mut labels, *label, self.here()),
                IrStatement::Halt => self.emit(Instruction::Halt),
                IrStatement::Extern {
                    name: callee,
                    sp_offset,
                } => {
                    self.adjust_sp(BinaryOp::Add, *sp_offset);
                    self.emit(Instruction::Extern {
                        name: callee.clone(),
                    });
                    self.adjust_sp(BinaryOp::Sub, *sp_offset);
                }
                IrStatement::Call {
                    name: callee,
                    sp_offset,
                    resume,
                } => {
                    self.adjust_sp(BinaryOp::Add, *sp_offset);
                    let at = self.placeholder();
                    self.call_fixups.push((at, callee.as_str()));
                    // the callee returns here, before SP is restored
                    place(&mut labels, *resume, self.here());
                    self.adjust_sp(BinaryOp::Sub, *sp_offset);
                }
                IrStatement::JmpZero { label, flag } => {
                    let at = self.placeholder();
                    fixups.push(LabelFixup {
                        at,
                        label: *label,
                        patch: LabelPatch::JumpZero(translate(*flag)),
                    });
                }
                IrStatement::JmpNonZero { label, flag } => {
                    let at = self.placeholder();
                    fixups.push(LabelFixup {
                        at,
                        label: *label,
                        patch: LabelPatch::JumpNonZero(translate(*flag)),
                    });
                }
                IrStatement::Jmp { label } => {
                    let at = self.placeholder();
                    fixups.push(LabelFixup {
                        at,
                        label: *label,
                        patch: LabelPatch::JumpZero(translate(IrAddr::CONST_ZERO)),
                    });
                }
                IrStatement::JmpAdr { addr } => self.emit(Instruction::JumpAddress {
                    addr: translate(*addr),
                }),
                IrStatement::Store { addr, value } => self.emit(Instruction::Const {
                    value: *value,
                    target: translate(*addr),
                }),
                IrStatement::StoreLabel { addr, label } => {
                    let at = self.placeholder();
                    fixups.push(LabelFixup {
                        at,
                        label: *label,
                        patch: LabelPatch::StoreTarget(translate(*addr)),
                    });
                }
                IrStatement::Copy { from, to } => self.emit(Instruction::Move {
                    source: translate(*from),
                    target: translate(*to),
                }),
                IrStatement::Binary { op, a, b, result } => self.emit(Instruction::Binary {
                    op: *op,
                    op1: translate(*a),
                    op2: translate(*b),
                    target: translate(*result),
                }),
            }
        }

        for fixup in fixups {
            let target = *labels
                .get(&fixup.label)
                .unwrap_or_else(|| panic!("label {} never placed in '{}'", fixup.label, name));
            self.text[fixup.at] = Some(fixup.patch.resolve(target));
        }
    }
}
