use super::addr::IrAddr;
use super::stmt::{IrLabel, IrStatement};
use crate::lang::Type;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Name of the synthetic function holding global initialisers.
pub const INIT_FUNCTION: &str = "__init__";
pub const MAIN_FUNCTION: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IrFunction {
    pub params: Vec<Type>,
    pub ret: Type,
    pub is_extern: bool,
    pub body: Vec<IrStatement>,
    /// Frame slot holding the return address, relative to the callee's SP.
    pub ret_address: i32,
    /// Frame slot receiving the return value, relative to the callee's SP.
    pub ret_value: i32,
    next_label: u32,
}

impl IrFunction {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        IrFunction {
            params,
            ret,
            ..Self::default()
        }
    }

    pub fn declared_extern(params: Vec<Type>, ret: Type) -> Self {
        IrFunction {
            is_extern: true,
            ..Self::new(params, ret)
        }
    }

    pub fn new_label(&mut self) -> IrLabel {
        let label = IrLabel(self.next_label);
        self.next_label += 1;
        label
    }

    pub fn emit(&mut self, statement: IrStatement) {
        self.body.push(statement);
    }
}

/// Deduplicating pool of data-segment constants.
///
/// Cells 0 and 1 always hold 0 and 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<i32>", into = "Vec<i32>")]
pub struct ConstantPool {
    cells: Vec<i32>,
    index: HashMap<i32, i32>,
}

impl From<Vec<i32>> for ConstantPool {
    fn from(cells: Vec<i32>) -> Self {
        let mut index = HashMap::new();
        for (cell, value) in cells.iter().enumerate() {
            index.entry(*value).or_insert(cell as i32);
        }
        ConstantPool { cells, index }
    }
}

impl From<ConstantPool> for Vec<i32> {
    fn from(pool: ConstantPool) -> Self {
        pool.cells
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        let mut pool = ConstantPool {
            cells: Vec::new(),
            index: HashMap::new(),
        };
        pool.intern(0);
        pool.intern(1);
        pool
    }
}

impl ConstantPool {
    /// Data address of a cell holding `value`, allocating one if needed.
    pub fn intern(&mut self, value: i32) -> IrAddr {
        if let Some(&cell) = self.index.get(&value) {
            return IrAddr::data_cell(cell);
        }
        // a pool never grows near i32::MAX entries
        let cell = self.cells.len() as i32;
        self.cells.push(value);
        self.index.insert(value, cell);
        IrAddr::data_cell(cell)
    }

    pub fn cells(&self) -> &[i32] {
        &self.cells
    }
}

/// Whole program in IR form, keyed by function name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IrProgram {
    pub functions: BTreeMap<String, IrFunction>,
    pub data: ConstantPool,
}

impl IrProgram {
    pub fn function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.get(name)
    }
}

impl fmt::Display for IrProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, function) in &self.functions {
            if function.is_extern {
                writeln!(f, "extern {}", name)?;
                continue;
            }
            writeln!(
                f,
                "func {} (ret {}, ret_address [SP{}], ret_value [SP{}]):",
                name, function.ret, function.ret_address, function.ret_value
            )?;
            for statement in &function.body {
                writeln!(f, "{}", statement)?;
            }
        }
        write!(f, "data {:?}", self.data.cells())
    }
}
