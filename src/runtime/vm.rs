use crate::bytecode::{Address, Executable, Instruction};
use crate::runtime::runtime_error::VmError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Host callback bound to an extern name.
///
/// Receives the VM and communicates through memory, using the helpers in
/// [`calls`](crate::runtime::calls) to read arguments and write results.
pub type ExternCall = Arc<dyn Fn(&mut Vm) -> Result<(), VmError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    pub memory_cells: usize,
    pub max_steps: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            memory_cells: 1000,
            max_steps: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmState {
    Running,
    Halted,
    Faulted(VmError),
}

pub struct VmBuilder {
    executable: Arc<Executable>,
    externs: HashMap<String, ExternCall>,
    config: VmConfig,
}

impl VmBuilder {
    pub fn config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn memory_size(mut self, cells: usize) -> Self {
        self.config.memory_cells = cells;
        self
    }

    pub fn max_steps(mut self, steps: u64) -> Self {
        self.config.max_steps = Some(steps);
        self
    }

    /// Bind `name` to a host callback. A later binding of the same name wins.
    pub fn extern_call<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Vm) -> Result<(), VmError> + Send + Sync + 'static,
    {
        self.externs.insert(name.into(), Arc::new(f));
        self
    }

    pub fn build(self) -> Vm {
        log::debug!(
            "vm for '{}': {} memory cells, {} externs",
            self.executable.name(),
            self.config.memory_cells,
            self.externs.len()
        );
        Vm {
            memory: vec![0; self.config.memory_cells],
            executable: self.executable,
            externs: self.externs,
            config: self.config,
            ip: 0,
            state: VmState::Running,
            instructions: 0,
            max_memory: 0,
        }
    }
}

/// Register machine over a flat array of 32-bit cells.
///
/// Non-negative positions address memory; a negative position `p` reads data
/// cell `-p - 1`. Data cells are read-only.
pub struct Vm {
    executable: Arc<Executable>,
    externs: HashMap<String, ExternCall>,
    memory: Vec<i32>,
    config: VmConfig,
    ip: i32,
    state: VmState,
    instructions: u64,
    max_memory: usize,
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut externs: Vec<_> = self.externs.keys().collect();
        externs.sort();
        f.debug_struct("Vm")
            .field("executable", &self.executable.name())
            .field("ip", &self.ip)
            .field("state", &self.state)
            .field("externs", &externs)
            .field("instructions", &self.instructions)
            .finish()
    }
}

impl Vm {
    pub fn builder(executable: impl Into<Arc<Executable>>) -> VmBuilder {
        VmBuilder {
            executable: executable.into(),
            externs: HashMap::new(),
            config: VmConfig::default(),
        }
    }

    pub fn new(executable: impl Into<Arc<Executable>>) -> Self {
        Self::builder(executable).build()
    }

    pub fn executable(&self) -> &Executable {
        &self.executable
    }

    pub fn ip(&self) -> i32 {
        self.ip
    }

    pub fn state(&self) -> &VmState {
        &self.state
    }

    pub fn memory(&self) -> &[i32] {
        &self.memory
    }

    /// Instructions fetched so far.
    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    /// Highest memory position written so far.
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    pub fn get(&self, pos: i32) -> Result<i32, VmError> {
        if pos < 0 {
            let index = -(i64::from(pos) + 1);
            return usize::try_from(index)
                .ok()
                .and_then(|i| self.executable.data().get(i))
                .copied()
                .ok_or(VmError::DataOutOfBounds { index });
        }
        usize::try_from(pos)
            .ok()
            .and_then(|i| self.memory.get(i))
            .copied()
            .ok_or(VmError::MemoryOutOfBounds { pos })
    }

    pub fn set(&mut self, pos: i32, value: i32) -> Result<(), VmError> {
        if pos < 0 {
            return Err(VmError::DataWrite { pos });
        }
        let index = pos as usize;
        let cell = self
            .memory
            .get_mut(index)
            .ok_or(VmError::MemoryOutOfBounds { pos })?;
        *cell = value;
        self.max_memory = self.max_memory.max(index);
        Ok(())
    }

    /// Effective position of an operand: `get(base) + offset`.
    pub fn resolve(&self, addr: Address) -> Result<i32, VmError> {
        Ok(self.get(addr.base)?.wrapping_add(addr.offset))
    }

    fn load(&self, addr: Address) -> Result<i32, VmError> {
        self.get(self.resolve(addr)?)
    }

    fn store(&mut self, addr: Address, value: i32) -> Result<(), VmError> {
        let pos = self.resolve(addr)?;
        self.set(pos, value)
    }

    // Execution

    /// Execute one instruction. Returns `Ok(false)` once the program halted.
    pub fn execute_instruction(&mut self) -> Result<bool, VmError> {
        match &self.state {
            VmState::Running => {}
            VmState::Halted => return Ok(false),
            VmState::Faulted(e) => return Err(e.clone()),
        }

        match self.step() {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.state = VmState::Halted;
                Ok(false)
            }
            Err(e) => {
                self.state = VmState::Faulted(e.clone());
                Err(e)
            }
        }
    }

    /// Run until halt or fault, honoring the configured step limit.
    pub fn run(&mut self) -> Result<(), VmError> {
        loop {
            if let (VmState::Running, Some(limit)) = (&self.state, self.config.max_steps) {
                if self.instructions >= limit {
                    log::warn!("'{}' stopped at step limit {}", self.executable.name(), limit);
                    return Err(VmError::StepLimitExceeded { limit });
                }
            }

            match self.execute_instruction() {
                Ok(true) => {}
                Ok(false) => {
                    log::debug!(
                        "'{}' halted after {} instructions, max memory {}",
                        self.executable.name(),
                        self.instructions,
                        self.max_memory
                    );
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("'{}' faulted at {:04}: {}", self.executable.name(), self.ip, e);
                    return Err(e);
                }
            }
        }
    }

    fn step(&mut self) -> Result<bool, VmError> {
        let executable = Arc::clone(&self.executable);
        let instruction = usize::try_from(self.ip)
            .ok()
            .and_then(|i| executable.text().get(i))
            .ok_or(VmError::IpOutOfBounds { ip: self.ip })?;

        self.instructions += 1;
        log::trace!("{:04} {}", self.ip, instruction);

        let mut next = self.ip.wrapping_add(1);
        match instruction {
            Instruction::Move { source, target } => {
                let value = self.load(*source)?;
                self.store(*target, value)?;
            }
            Instruction::Const { value, target } => self.store(*target, *value)?,
            Instruction::Binary {
                op,
                op1,
                op2,
                target,
            } => {
                let a = self.load(*op1)?;
                let b = self.load(*op2)?;
                let value = op.apply(a, b).ok_or(VmError::DivisionByZero)?;
                self.store(*target, value)?;
            }
            Instruction::Jump { flag, target } => {
                if self.load(*flag)? == 0 {
                    next = *target;
                }
            }
            Instruction::JumpN { flag, target } => {
                if self.load(*flag)? != 0 {
                    next = *target;
                }
            }
            Instruction::JumpAddress { addr } => next = self.load(*addr)?,
            Instruction::Extern { name } => {
                let call = self
                    .externs
                    .get(name)
                    .cloned()
                    .ok_or_else(|| VmError::UnknownExtern { name: name.clone() })?;
                call(self)?;
            }
            Instruction::Halt => {
                self.ip = next;
                return Ok(false);
            }
            Instruction::BinDef { .. } | Instruction::Text | Instruction::Data { .. } => {
                unreachable!("segment marker in validated text at {}", self.ip)
            }
        }

        self.ip = next;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::BinaryOp;

    // ============================================================
    // Test Helpers
    // ============================================================

    fn at(n: i32) -> Address {
        Address::absolute(n)
    }

    fn exe(text: Vec<Instruction>, data: Vec<i32>) -> Executable {
        Executable::new("test", text, data).unwrap()
    }

    fn konst(value: i32, n: i32) -> Instruction {
        Instruction::Const {
            value,
            target: at(n),
        }
    }

    fn binary(op: BinaryOp, a: i32, b: i32, target: i32) -> Instruction {
        Instruction::Binary {
            op,
            op1: at(a),
            op2: at(b),
            target: at(target),
        }
    }

    /// Run text to completion with data `[0, 1]` and return the VM
    fn run_text(text: Vec<Instruction>) -> Vm {
        let mut vm = Vm::new(exe(text, vec![0, 1]));
        vm.run().expect("execution should succeed");
        vm
    }

    fn assert_memory(text: Vec<Instruction>, pos: i32, expected: i32) {
        let vm = run_text(text);
        assert_eq!(vm.get(pos).unwrap(), expected, "memory[{}] mismatch", pos);
    }

    /// Assert the program faults and reports the given error
    fn assert_fault(text: Vec<Instruction>, expected: VmError) {
        let mut vm = Vm::new(exe(text, vec![0, 1]));
        match vm.run() {
            Ok(()) => panic!("expected fault {:?}, program halted", expected),
            Err(e) => assert_eq!(e, expected),
        }
    }

    // ============================================================
    // Memory
    // ============================================================

    #[test]
    fn test_const() {
        assert_memory(vec![konst(42, 5), Instruction::Halt], 5, 42);
    }

    #[test]
    fn test_move() {
        let text = vec![
            konst(7, 3),
            Instruction::Move {
                source: at(3),
                target: at(4),
            },
            Instruction::Halt,
        ];
        assert_memory(text, 4, 7);
    }

    #[test]
    fn test_move_from_data() {
        let text = vec![
            Instruction::Move {
                source: at(-2),
                target: at(3),
            },
            Instruction::Halt,
        ];
        assert_memory(text, 3, 1);
    }

    #[test]
    fn test_base_register_indirection() {
        // [0] = 10, then [SP+2] names cell 12
        let text = vec![
            konst(10, 0),
            Instruction::Const {
                value: 99,
                target: Address::new(0, 2),
            },
            Instruction::Halt,
        ];
        assert_memory(text, 12, 99);
    }

    #[test]
    fn test_negative_positions_read_data() {
        let vm = Vm::new(exe(vec![Instruction::Halt], vec![0, 1, 77]));
        assert_eq!(vm.get(-1).unwrap(), 0);
        assert_eq!(vm.get(-3).unwrap(), 77);
        assert_eq!(vm.get(-4), Err(VmError::DataOutOfBounds { index: 3 }));
    }

    #[test]
    fn test_write_to_data_faults() {
        assert_fault(vec![konst(1, -1)], VmError::DataWrite { pos: -1 });
    }

    #[test]
    fn test_memory_out_of_bounds() {
        assert_fault(vec![konst(1, 1000)], VmError::MemoryOutOfBounds { pos: 1000 });
    }

    #[test]
    fn test_memory_size_from_builder() {
        let mut vm = Vm::builder(exe(vec![konst(1, 20), Instruction::Halt], vec![0]))
            .memory_size(16)
            .build();
        assert_eq!(vm.memory().len(), 16);
        assert_eq!(vm.run(), Err(VmError::MemoryOutOfBounds { pos: 20 }));
    }

    // ============================================================
    // Arithmetic
    // ============================================================

    #[test]
    fn test_add() {
        let text = vec![
            konst(3, 10),
            konst(4, 11),
            binary(BinaryOp::Add, 10, 11, 12),
            Instruction::Halt,
        ];
        assert_memory(text, 12, 7);
    }

    #[test]
    fn test_sub_operand_order() {
        let text = vec![
            konst(3, 10),
            konst(10, 11),
            binary(BinaryOp::Sub, 10, 11, 12),
            Instruction::Halt,
        ];
        assert_memory(text, 12, -7);
    }

    #[test]
    fn test_mod() {
        let text = vec![
            konst(17, 10),
            konst(5, 11),
            binary(BinaryOp::Mod, 10, 11, 10),
            Instruction::Halt,
        ];
        assert_memory(text, 10, 2);
    }

    #[test]
    fn test_less_than() {
        let text = vec![
            konst(2, 10),
            konst(5, 11),
            binary(BinaryOp::LessThan, 10, 11, 12),
            binary(BinaryOp::LessThan, 11, 10, 13),
            Instruction::Halt,
        ];
        let vm = run_text(text);
        assert_eq!(vm.get(12).unwrap(), 1);
        assert_eq!(vm.get(13).unwrap(), 0);
    }

    #[test]
    fn test_div_by_zero_keeps_ip() {
        let text = vec![konst(5, 10), binary(BinaryOp::Div, 10, 11, 12)];
        let mut vm = Vm::new(exe(text, vec![0, 1]));
        assert_eq!(vm.execute_instruction(), Ok(true));
        assert_eq!(vm.execute_instruction(), Err(VmError::DivisionByZero));
        assert_eq!(vm.ip(), 1);
        assert_eq!(vm.state(), &VmState::Faulted(VmError::DivisionByZero));
    }

    // ============================================================
    // Control flow
    // ============================================================

    #[test]
    fn test_jump_if_zero_taken() {
        let text = vec![
            Instruction::Jump {
                flag: at(-1),
                target: 2,
            },
            konst(1, 10),
            Instruction::Halt,
        ];
        assert_memory(text, 10, 0);
    }

    #[test]
    fn test_jump_if_zero_not_taken() {
        let text = vec![
            Instruction::Jump {
                flag: at(-2),
                target: 2,
            },
            konst(1, 10),
            Instruction::Halt,
        ];
        assert_memory(text, 10, 1);
    }

    #[test]
    fn test_jump_if_nonzero() {
        let text = vec![
            Instruction::JumpN {
                flag: at(-2),
                target: 2,
            },
            konst(1, 10),
            Instruction::Halt,
        ];
        assert_memory(text, 10, 0);
    }

    #[test]
    fn test_jump_address() {
        let text = vec![
            konst(3, 10),
            Instruction::JumpAddress { addr: at(10) },
            konst(1, 11),
            Instruction::Halt,
        ];
        assert_memory(text, 11, 0);
    }

    #[test]
    fn test_falling_off_text() {
        assert_fault(vec![konst(1, 3)], VmError::IpOutOfBounds { ip: 1 });
    }

    #[test]
    fn test_jump_out_of_text() {
        let text = vec![Instruction::Jump {
            flag: at(-1),
            target: -4,
        }];
        assert_fault(text, VmError::IpOutOfBounds { ip: -4 });
    }

    #[test]
    fn test_halt_is_sticky() {
        let mut vm = Vm::new(exe(vec![Instruction::Halt], vec![]));
        assert_eq!(vm.execute_instruction(), Ok(false));
        assert_eq!(vm.execute_instruction(), Ok(false));
        assert_eq!(vm.state(), &VmState::Halted);
        assert_eq!(vm.instructions(), 1);
    }

    #[test]
    fn test_fault_is_sticky() {
        let mut vm = Vm::new(exe(vec![konst(1, 5000)], vec![]));
        let first = vm.execute_instruction().unwrap_err();
        let second = vm.execute_instruction().unwrap_err();
        assert_eq!(first, second);
        assert_eq!(vm.instructions(), 1);
    }

    #[test]
    fn test_step_limit() {
        let looping = vec![Instruction::Jump {
            flag: at(-1),
            target: 0,
        }];
        let mut vm = Vm::builder(exe(looping, vec![0])).max_steps(50).build();
        assert_eq!(vm.run(), Err(VmError::StepLimitExceeded { limit: 50 }));
        assert_eq!(vm.instructions(), 50);
        assert_eq!(vm.state(), &VmState::Running);
    }

    // ============================================================
    // Externs
    // ============================================================

    #[test]
    fn test_unknown_extern() {
        let text = vec![Instruction::Extern {
            name: "missing".into(),
        }];
        assert_fault(
            text,
            VmError::UnknownExtern {
                name: "missing".into(),
            },
        );
    }

    #[test]
    fn test_extern_sees_memory() {
        let text = vec![
            konst(21, 10),
            Instruction::Extern {
                name: "double".into(),
            },
            Instruction::Halt,
        ];
        let mut vm = Vm::builder(exe(text, vec![0]))
            .extern_call("double", |vm: &mut Vm| {
                let v = vm.get(10)?;
                vm.set(11, v * 2)
            })
            .build();
        vm.run().unwrap();
        assert_eq!(vm.get(11).unwrap(), 42);
    }

    #[test]
    fn test_extern_error_faults() {
        let text = vec![Instruction::Extern {
            name: "fail".into(),
        }];
        let mut vm = Vm::builder(exe(text, vec![0]))
            .extern_call("fail", |_: &mut Vm| {
                Err(VmError::extern_failure("fail", "nope"))
            })
            .build();
        assert!(matches!(vm.run(), Err(VmError::Extern { .. })));
        assert_eq!(vm.ip(), 0);
    }

    // ============================================================
    // Statistics
    // ============================================================

    #[test]
    fn test_statistics() {
        let vm = run_text(vec![konst(1, 3), konst(1, 9), konst(1, 4), Instruction::Halt]);
        assert_eq!(vm.instructions(), 4);
        assert_eq!(vm.max_memory(), 9);
    }

    #[test]
    fn test_max_memory_ignores_reads() {
        let vm = run_text(vec![
            Instruction::Move {
                source: Address::absolute(20),
                target: Address::absolute(2),
            },
            Instruction::Halt,
        ]);
        assert_eq!(vm.max_memory(), 2);
    }
}
