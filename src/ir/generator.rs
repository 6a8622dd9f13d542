use std::collections::HashMap;
use std::mem;

use crate::{
    bytecode::BinaryOp,
    ir::{
        addr::IrAddr,
        function::{INIT_FUNCTION, IrFunction, IrProgram, MAIN_FUNCTION},
        gen_error::{GenError, GenErrorKind},
        scope::{Scopes, Variable},
        stmt::{IrLabel, IrStatement},
    },
    lang::{
        BinaryOperator, CompoundOperator, Expr, ExprKind, FuncDecl, Function, Pos, Stmt,
        StmtKind, Type, TypedProgram, UnaryOperator, VarDecl,
    },
};

/// Lower a typed program to IR.
pub fn generate(program: &TypedProgram) -> Result<IrProgram, GenError> {
    IrGenerator::new().generate(program)
}

#[derive(Debug, Clone)]
struct Signature {
    params: Vec<Type>,
    ret: Type,
    is_extern: bool,
}

pub struct IrGenerator {
    /// Every callable name, declared before any body is lowered
    signatures: HashMap<String, Signature>,

    scopes: Scopes,

    /// Function under construction
    func: IrFunction,

    /// `main` halts where other functions return
    in_main: bool,
}

impl IrGenerator {
    pub fn new() -> Self {
        Self {
            signatures: HashMap::new(),
            scopes: Scopes::new(),
            func: IrFunction::default(),
            in_main: false,
        }
    }

    pub fn generate(mut self, program: &TypedProgram) -> Result<IrProgram, GenError> {
        for decl in &program.externs {
            self.declare(decl, true)?;
        }
        for function in &program.functions {
            self.declare(&function.decl, false)?;
        }
        let main = match self.signatures.get(MAIN_FUNCTION) {
            Some(sig) if !sig.is_extern => sig,
            _ => return Err(GenError::new(Pos::default(), GenErrorKind::MissingMain)),
        };
        if !main.ret.is_void() {
            let pos = program
                .functions
                .iter()
                .find(|f| f.decl.name == MAIN_FUNCTION)
                .map_or(Pos::default(), |f| f.decl.pos);
            return Err(GenError::new(pos, GenErrorKind::NonVoidMain(main.ret)));
        }

        let mut out = IrProgram::default();

        // Globals live in the root scope; their initialisers form __init__.
        self.scopes.push();
        self.func = IrFunction::new(Vec::new(), Type::Void);
        for global in &program.globals {
            self.var_decl(global, true)?;
        }
        out.functions
            .insert(INIT_FUNCTION.to_string(), mem::take(&mut self.func));

        for decl in &program.externs {
            let params = decl.params.iter().map(|p| p.ty).collect();
            out.functions.insert(
                decl.name.clone(),
                IrFunction::declared_extern(params, decl.ret),
            );
        }

        for function in &program.functions {
            let ir = self.function(function)?;
            out.functions.insert(function.decl.name.clone(), ir);
        }

        self.scopes.pop();
        log::debug!(
            "generated IR for {} functions, {} global cells",
            out.functions.len(),
            program.globals.iter().map(|g| g.ty.cells()).sum::<i32>()
        );
        Ok(out)
    }

    fn declare(&mut self, decl: &FuncDecl, is_extern: bool) -> Result<(), GenError> {
        if decl.name == INIT_FUNCTION || self.signatures.contains_key(&decl.name) {
            return Err(GenError::new(
                decl.pos,
                GenErrorKind::DuplicateFunction(decl.name.clone()),
            ));
        }
        let signature = Signature {
            params: decl.params.iter().map(|p| p.ty).collect(),
            ret: decl.ret,
            is_extern,
        };
        self.signatures.insert(decl.name.clone(), signature);
        Ok(())
    }

    // ===== Functions =====

    fn function(&mut self, function: &Function) -> Result<IrFunction, GenError> {
        let decl = &function.decl;
        self.func = IrFunction::new(decl.params.iter().map(|p| p.ty).collect(), decl.ret);
        self.in_main = decl.name == MAIN_FUNCTION;

        // Frame, growing down from the callee's SP:
        //   [ret value][ret address][param 0]...[param n-1] | SP
        self.scopes.push();
        let mut offset = 0;
        for param in decl.params.iter().rev() {
            if param.ty.is_void() {
                return Err(GenError::new(
                    param.pos,
                    GenErrorKind::VoidVariable(param.name.clone()),
                ));
            }
            if self.scopes.declared_here(&param.name) {
                return Err(GenError::new(
                    param.pos,
                    GenErrorKind::DuplicateParam(param.name.clone()),
                ));
            }
            offset -= param.ty.cells();
            self.scopes.declare(
                param.name.clone(),
                Variable {
                    addr: IrAddr::rel_sp(offset),
                    ty: param.ty,
                },
            );
        }
        self.func.ret_address = offset - 1;
        self.func.ret_value = self.func.ret_address - decl.ret.cells();

        self.block(&function.body)?;

        let ends_in_return = matches!(
            function.body.last(),
            Some(Stmt {
                kind: StmtKind::Return(_),
                ..
            })
        );
        if !ends_in_return {
            if !decl.ret.is_void() {
                return Err(GenError::new(
                    decl.pos,
                    GenErrorKind::MissingReturn(decl.name.clone()),
                ));
            }
            self.ret(None, decl.pos)?;
        }
        self.scopes.pop();

        log::debug!(
            "lowered '{}': {} IR statements",
            decl.name,
            self.func.body.len()
        );
        Ok(mem::take(&mut self.func))
    }

    // ===== Statements =====

    fn statement(&mut self, stmt: &Stmt) -> Result<(), GenError> {
        match &stmt.kind {
            StmtKind::Block(stmts) => self.block(stmts),
            StmtKind::VarDecl(decl) => self.var_decl(decl, false),
            StmtKind::Loop {
                init,
                condition,
                increment,
                body,
            } => self.loop_stmt(init.as_deref(), condition.as_ref(), increment.as_deref(), body),
            StmtKind::Conditional {
                condition,
                body,
                else_body,
            } => self.conditional(condition, body, else_body.as_deref()),
            StmtKind::Expr(expr) => {
                let start = self.scopes.sp_offset();
                self.expr(expr)?;
                self.scopes.set_sp_offset(start);
                Ok(())
            }
            StmtKind::Return(value) => self.ret(value.as_ref(), stmt.pos),
        }
    }

    fn block(&mut self, stmts: &[Stmt]) -> Result<(), GenError> {
        self.scopes.push();
        for stmt in stmts {
            self.statement(stmt)?;
        }
        self.scopes.pop();
        Ok(())
    }

    fn var_decl(&mut self, decl: &VarDecl, global: bool) -> Result<(), GenError> {
        if decl.ty.is_void() {
            return Err(GenError::new(
                decl.pos,
                GenErrorKind::VoidVariable(decl.name.clone()),
            ));
        }
        if self.scopes.declared_here(&decl.name) {
            return Err(GenError::new(
                decl.pos,
                GenErrorKind::Redeclared(decl.name.clone()),
            ));
        }

        // the initialiser lands in the variable's own cell
        let start = self.scopes.sp_offset();
        self.typed_expr(&decl.init, decl.ty)?;
        let addr = if global {
            IrAddr::global(start)
        } else {
            IrAddr::rel_sp(start)
        };
        self.scopes.declare(decl.name.clone(), Variable { addr, ty: decl.ty });
        Ok(())
    }

    fn loop_stmt(
        &mut self,
        init: Option<&Stmt>,
        condition: Option<&Expr>,
        increment: Option<&Stmt>,
        body: &Stmt,
    ) -> Result<(), GenError> {
        self.scopes.push();
        let check = self.func.new_label();
        let end = self.func.new_label();

        if let Some(init) = init {
            self.statement(init)?;
        }
        self.func.emit(IrStatement::Label(check));
        if let Some(condition) = condition {
            let at = self.condition(condition)?;
            self.func.emit(IrStatement::JmpZero {
                label: end,
                flag: IrAddr::rel_sp(at),
            });
            self.scopes.set_sp_offset(at);
        }
        self.statement(body)?;
        if let Some(increment) = increment {
            self.statement(increment)?;
        }
        self.func.emit(IrStatement::Jmp { label: check });
        self.func.emit(IrStatement::Label(end));
        self.scopes.pop();
        Ok(())
    }

    fn conditional(
        &mut self,
        condition: &Expr,
        body: &Stmt,
        else_body: Option<&Stmt>,
    ) -> Result<(), GenError> {
        let at = self.condition(condition)?;
        self.scopes.set_sp_offset(at);
        let else_start = self.func.new_label();
        let else_end = self.func.new_label();

        self.func.emit(IrStatement::JmpZero {
            label: else_start,
            flag: IrAddr::rel_sp(at),
        });
        self.statement(body)?;
        if else_body.is_some() {
            self.func.emit(IrStatement::Jmp { label: else_end });
        }
        self.func.emit(IrStatement::Label(else_start));
        if let Some(else_body) = else_body {
            self.statement(else_body)?;
        }
        self.func.emit(IrStatement::Label(else_end));
        Ok(())
    }

    fn ret(&mut self, value: Option<&Expr>, pos: Pos) -> Result<(), GenError> {
        let ret = self.func.ret;
        match (value, ret.is_void()) {
            (Some(_), true) => {
                return Err(GenError::new(pos, GenErrorKind::UnexpectedReturnValue));
            }
            (None, false) => {
                return Err(GenError::new(pos, GenErrorKind::MissingReturnValue(ret)));
            }
            _ => {}
        }

        let start = self.scopes.sp_offset();
        if let Some(value) = value {
            self.typed_expr(value, ret)?;
        }
        if self.in_main {
            self.func.emit(IrStatement::Halt);
        } else {
            if value.is_some() {
                self.func.emit(IrStatement::Copy {
                    from: IrAddr::rel_sp(start),
                    to: IrAddr::rel_sp(self.func.ret_value),
                });
            }
            self.func.emit(IrStatement::JmpAdr {
                addr: IrAddr::rel_sp(self.func.ret_address),
            });
        }
        self.scopes.set_sp_offset(start);
        Ok(())
    }

    // ===== Expressions =====
    //
    // Every expression writes its value at the current stack offset and
    // advances the offset by the size of its type.

    fn typed_expr(&mut self, expr: &Expr, expected: Type) -> Result<i32, GenError> {
        let start = self.scopes.sp_offset();
        let found = self.expr(expr)?;
        if found != expected {
            return Err(GenError::mismatch(expr.pos, expected, found));
        }
        Ok(start)
    }

    fn condition(&mut self, expr: &Expr) -> Result<i32, GenError> {
        let start = self.scopes.sp_offset();
        let found = self.expr(expr)?;
        if found != Type::Bool {
            return Err(GenError::new(
                expr.pos,
                GenErrorKind::NonBooleanCondition(found),
            ));
        }
        Ok(start)
    }

    fn expr(&mut self, expr: &Expr) -> Result<Type, GenError> {
        match &expr.kind {
            ExprKind::Int(v) => Ok(self.literal(*v, Type::Int)),
            ExprKind::Char(c) => Ok(self.literal(i32::from(*c), Type::Char)),
            ExprKind::Bool(b) => Ok(self.literal(i32::from(*b), Type::Bool)),
            ExprKind::Reference(name) => {
                let var = self.lookup(name, expr.pos)?;
                self.push_copy(var);
                Ok(var.ty)
            }
            ExprKind::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, expr.pos),
            ExprKind::Unary { op, operand } => self.unary(*op, operand),
            ExprKind::Call { name, args } => self.call(name, args, expr.pos),
            ExprKind::Assign { target, op, value } => self.assign(target, *op, value),
            ExprKind::Ternary {
                condition,
                then,
                otherwise,
            } => self.ternary(condition, then, otherwise),
        }
    }

    fn literal(&mut self, value: i32, ty: Type) -> Type {
        let at = self.scopes.sp_offset();
        self.func.emit(IrStatement::Store {
            addr: IrAddr::rel_sp(at),
            value,
        });
        self.scopes.advance(1);
        ty
    }

    fn push_copy(&mut self, var: Variable) {
        let at = self.scopes.sp_offset();
        self.func.emit(IrStatement::Copy {
            from: var.addr,
            to: IrAddr::rel_sp(at),
        });
        self.scopes.advance(var.ty.cells());
    }

    fn lookup(&self, name: &str, pos: Pos) -> Result<Variable, GenError> {
        self.scopes
            .resolve(name)
            .ok_or_else(|| GenError::new(pos, GenErrorKind::UndefinedVariable(name.to_string())))
    }

    fn place(&self, target: &Expr) -> Result<Variable, GenError> {
        match &target.kind {
            ExprKind::Reference(name) => self.lookup(name, target.pos),
            _ => Err(GenError::new(target.pos, GenErrorKind::NotAssignable)),
        }
    }

    fn binary(
        &mut self,
        op: BinaryOperator,
        lhs: &Expr,
        rhs: &Expr,
        pos: Pos,
    ) -> Result<Type, GenError> {
        if matches!(op, BinaryOperator::And | BinaryOperator::Or) {
            return self.logical(op, lhs, rhs);
        }

        let start = self.scopes.sp_offset();
        let lt = self.expr(lhs)?;
        let rt = self.expr(rhs)?;

        let (ir_op, swap) = match op {
            BinaryOperator::Add => (BinaryOp::Add, false),
            BinaryOperator::Sub => (BinaryOp::Sub, false),
            BinaryOperator::Mul => (BinaryOp::Mul, false),
            BinaryOperator::Div => (BinaryOp::Div, false),
            BinaryOperator::Mod => (BinaryOp::Mod, false),
            BinaryOperator::BitAnd => (BinaryOp::BitAnd, false),
            BinaryOperator::BitOr => (BinaryOp::BitOr, false),
            BinaryOperator::Less => (BinaryOp::LessThan, false),
            BinaryOperator::Greater => (BinaryOp::LessThan, true),
            BinaryOperator::LessEq => (BinaryOp::LessEquals, false),
            BinaryOperator::GreaterEq => (BinaryOp::LessEquals, true),
            BinaryOperator::Eq => (BinaryOp::Equals, false),
            BinaryOperator::NotEq => (BinaryOp::NotEquals, false),
            BinaryOperator::And | BinaryOperator::Or => unreachable!("lowered by logical"),
        };

        let result = match op {
            BinaryOperator::Eq | BinaryOperator::NotEq if lt == rt && !lt.is_void() => Type::Bool,
            BinaryOperator::Less
            | BinaryOperator::Greater
            | BinaryOperator::LessEq
            | BinaryOperator::GreaterEq
                if lt == rt && matches!(lt, Type::Int | Type::Char) =>
            {
                Type::Bool
            }
            BinaryOperator::Add
            | BinaryOperator::Sub
            | BinaryOperator::Mul
            | BinaryOperator::Div
            | BinaryOperator::Mod
            | BinaryOperator::BitAnd
            | BinaryOperator::BitOr
                if lt == Type::Int && rt == Type::Int =>
            {
                Type::Int
            }
            _ => {
                return Err(GenError::new(
                    pos,
                    GenErrorKind::InvalidOperands {
                        op: op.to_string(),
                        lhs: lt,
                        rhs: rt,
                    },
                ));
            }
        };

        let (mut a, mut b) = (IrAddr::rel_sp(start), IrAddr::rel_sp(start + 1));
        if swap {
            mem::swap(&mut a, &mut b);
        }
        self.func
            .emit(IrStatement::binary(ir_op, a, b, IrAddr::rel_sp(start)));
        self.scopes.set_sp_offset(start + 1);
        Ok(result)
    }

    /// `&&` and `||` skip the right operand once the left one decides.
    fn logical(&mut self, op: BinaryOperator, lhs: &Expr, rhs: &Expr) -> Result<Type, GenError> {
        let start = self.scopes.sp_offset();
        let short = self.func.new_label();

        let at = self.typed_expr(lhs, Type::Bool)?;
        let flag = IrAddr::rel_sp(at);
        self.func.emit(match op {
            BinaryOperator::Or => IrStatement::JmpNonZero { label: short, flag },
            _ => IrStatement::JmpZero { label: short, flag },
        });
        self.scopes.set_sp_offset(start);
        self.typed_expr(rhs, Type::Bool)?;
        self.func.emit(IrStatement::Label(short));
        Ok(Type::Bool)
    }

    fn unary(&mut self, op: UnaryOperator, operand: &Expr) -> Result<Type, GenError> {
        match op {
            UnaryOperator::Negate => {
                let at = IrAddr::rel_sp(self.typed_expr(operand, Type::Int)?);
                self.func
                    .emit(IrStatement::binary(BinaryOp::Sub, IrAddr::CONST_ZERO, at, at));
                Ok(Type::Int)
            }
            UnaryOperator::Not => {
                let at = IrAddr::rel_sp(self.typed_expr(operand, Type::Bool)?);
                self.func
                    .emit(IrStatement::binary(BinaryOp::Sub, IrAddr::CONST_ONE, at, at));
                Ok(Type::Bool)
            }
            UnaryOperator::PreIncrement
            | UnaryOperator::PreDecrement
            | UnaryOperator::PostIncrement
            | UnaryOperator::PostDecrement => {
                let var = self.place(operand)?;
                if var.ty != Type::Int {
                    return Err(GenError::mismatch(operand.pos, Type::Int, var.ty));
                }
                let step = match op {
                    UnaryOperator::PreIncrement | UnaryOperator::PostIncrement => BinaryOp::Add,
                    _ => BinaryOp::Sub,
                };
                let bump = IrStatement::binary(step, var.addr, IrAddr::CONST_ONE, var.addr);
                match op {
                    UnaryOperator::PostIncrement | UnaryOperator::PostDecrement => {
                        self.push_copy(var);
                        self.func.emit(bump);
                    }
                    _ => {
                        self.func.emit(bump);
                        self.push_copy(var);
                    }
                }
                Ok(Type::Int)
            }
        }
    }

    fn call(&mut self, name: &str, args: &[Expr], pos: Pos) -> Result<Type, GenError> {
        let sig = self
            .signatures
            .get(name)
            .cloned()
            .ok_or_else(|| GenError::new(pos, GenErrorKind::UndefinedFunction(name.to_string())))?;
        if args.len() != sig.params.len() {
            return Err(GenError::new(
                pos,
                GenErrorKind::ArityMismatch {
                    name: name.to_string(),
                    expected: sig.params.len(),
                    found: args.len(),
                },
            ));
        }

        // Outgoing frame: [ret value][ret address][args...]; externs have
        // no return address.
        self.scopes.advance(sig.ret.cells());
        let ret_val_sp = self.scopes.sp_offset();
        let resume: Option<IrLabel> = if sig.is_extern {
            None
        } else {
            let label = self.func.new_label();
            self.func.emit(IrStatement::StoreLabel {
                addr: IrAddr::rel_sp(ret_val_sp),
                label,
            });
            self.scopes.advance(1);
            Some(label)
        };

        for (arg, ty) in args.iter().zip(&sig.params) {
            self.typed_expr(arg, *ty)?;
        }

        let sp_offset = self.scopes.sp_offset();
        let name = name.to_string();
        self.func.emit(match resume {
            Some(resume) => IrStatement::Call {
                name,
                sp_offset,
                resume,
            },
            None => IrStatement::Extern { name, sp_offset },
        });
        self.scopes.set_sp_offset(ret_val_sp);
        Ok(sig.ret)
    }

    fn assign(
        &mut self,
        target: &Expr,
        op: Option<CompoundOperator>,
        value: &Expr,
    ) -> Result<Type, GenError> {
        let var = self.place(target)?;
        let at = self.scopes.sp_offset();

        match op {
            None => {
                self.typed_expr(value, var.ty)?;
                self.func.emit(IrStatement::Copy {
                    from: IrAddr::rel_sp(at),
                    to: var.addr,
                });
            }
            Some(op) => {
                if var.ty != Type::Int {
                    return Err(GenError::mismatch(target.pos, Type::Int, var.ty));
                }
                self.typed_expr(value, Type::Int)?;
                let op = match op {
                    CompoundOperator::Add => BinaryOp::Add,
                    CompoundOperator::Sub => BinaryOp::Sub,
                    CompoundOperator::Mul => BinaryOp::Mul,
                    CompoundOperator::Div => BinaryOp::Div,
                    CompoundOperator::Mod => BinaryOp::Mod,
                };
                self.func.emit(IrStatement::binary(
                    op,
                    var.addr,
                    IrAddr::rel_sp(at),
                    var.addr,
                ));
                self.func.emit(IrStatement::Copy {
                    from: var.addr,
                    to: IrAddr::rel_sp(at),
                });
            }
        }

        self.scopes.set_sp_offset(at + var.ty.cells());
        Ok(var.ty)
    }

    /// Both arms write their value into the same slot.
    fn ternary(&mut self, condition: &Expr, then: &Expr, otherwise: &Expr) -> Result<Type, GenError> {
        let start = self.scopes.sp_offset();
        let at = self.condition(condition)?;
        let else_start = self.func.new_label();
        let end = self.func.new_label();

        self.func.emit(IrStatement::JmpZero {
            label: else_start,
            flag: IrAddr::rel_sp(at),
        });
        self.scopes.set_sp_offset(start);
        let then_ty = self.expr(then)?;
        self.func.emit(IrStatement::Jmp { label: end });

        self.func.emit(IrStatement::Label(else_start));
        self.scopes.set_sp_offset(start);
        let else_ty = self.expr(otherwise)?;
        self.func.emit(IrStatement::Label(end));

        if then_ty != else_ty {
            return Err(GenError::mismatch(otherwise.pos, then_ty, else_ty));
        }
        self.scopes.set_sp_offset(start + then_ty.cells());
        Ok(then_ty)
    }
}

impl Default for IrGenerator {
    fn default() -> Self {
        Self::new()
    }
}
