use super::addr::IrAddr;
use crate::lang::Type;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    pub addr: IrAddr,
    pub ty: Type,
}

#[derive(Debug)]
struct Scope {
    vars: HashMap<String, Variable>,
    parent: Option<usize>,
    sp_offset: i32,
}

/// Lexical scopes as an arena of records linked to their parent by index.
///
/// Scopes nest strictly, so leaving a scope drops its record. A new scope
/// starts at its parent's stack offset.
#[derive(Debug, Default)]
pub struct Scopes {
    arena: Vec<Scope>,
}

impl Scopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        let parent = self.arena.len().checked_sub(1);
        let sp_offset = parent.map_or(0, |p| self.arena[p].sp_offset);
        self.arena.push(Scope {
            vars: HashMap::new(),
            parent,
            sp_offset,
        });
    }

    pub fn pop(&mut self) {
        self.arena.pop();
    }

    fn current(&self) -> &Scope {
        self.arena.last().unwrap_or_else(|| panic!("no active scope"))
    }

    fn current_mut(&mut self) -> &mut Scope {
        self.arena
            .last_mut()
            .unwrap_or_else(|| panic!("no active scope"))
    }

    /// Next free frame offset of the innermost scope.
    pub fn sp_offset(&self) -> i32 {
        self.current().sp_offset
    }

    pub fn set_sp_offset(&mut self, offset: i32) {
        self.current_mut().sp_offset = offset;
    }

    pub fn advance(&mut self, cells: i32) {
        self.current_mut().sp_offset += cells;
    }

    /// Whether `name` is bound in the innermost scope itself.
    pub fn declared_here(&self, name: &str) -> bool {
        self.current().vars.contains_key(name)
    }

    pub fn declare(&mut self, name: impl Into<String>, var: Variable) {
        self.current_mut().vars.insert(name.into(), var);
    }

    /// Look `name` up from the innermost scope outwards.
    pub fn resolve(&self, name: &str) -> Option<Variable> {
        let mut at = self.arena.len().checked_sub(1);
        while let Some(index) = at {
            let scope = &self.arena[index];
            if let Some(var) = scope.vars.get(name) {
                return Some(*var);
            }
            at = scope.parent;
        }
        None
    }
}
