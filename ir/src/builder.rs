//! Incremental construction of function bodies.
//!
//! ```ignore
//! let mut b = FunctionBuilder::kernel("scale");
//! let out = b.param("out", "float*", ParamKind::Pointer { space: AddrSpace::Global });
//! let lid = b.context(ContextVar::LocalId(Axis::X));
//! let addr = b.index(out, lid);
//! b.store(addr, Operand::Const(0));
//! b.ret();
//! let kernel = b.finish();
//! ```

use crate::module::{BlockId, Function, FunctionKind, Instr, InstrKind, Operand, Param, ParamKind, Terminator};
use crate::types::{AddrSpace, BinaryOp, ContextVar, InlineHint};

pub struct FunctionBuilder {
    func: Function,
    current: BlockId,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, kind: FunctionKind) -> Self {
        Self { func: Function::new(name, kind), current: BlockId::ENTRY }
    }

    /// Continue building an existing function, inserting into `at`.
    pub fn resume(func: Function, at: BlockId) -> Self {
        Self { func, current: at }
    }

    pub fn kernel(name: impl Into<String>) -> Self {
        Self::new(name, FunctionKind::Kernel)
    }

    pub fn helper(name: impl Into<String>) -> Self {
        Self::new(name, FunctionKind::Helper)
    }

    pub fn inline(&mut self, hint: InlineHint) -> &mut Self {
        self.func.inline = hint;
        self
    }

    pub fn param(&mut self, name: impl Into<String>, type_name: impl Into<String>, kind: ParamKind) -> Operand {
        let index = self.func.push_param(Param { name: name.into(), type_name: type_name.into(), kind });
        Operand::Param(index)
    }

    /// Create a new (unterminated) block without moving the insertion point.
    pub fn block(&mut self, label: impl Into<String>) -> BlockId {
        self.func.add_block(label)
    }

    pub fn position_at(&mut self, block: BlockId) -> &mut Self {
        self.current = block;
        self
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    fn push_void(&mut self, kind: InstrKind) {
        self.func.block_mut(self.current).instrs.push(Instr::new(None, kind));
    }

    fn push_value(&mut self, kind: InstrKind) -> Operand {
        let result = self.func.fresh_value();
        self.func.block_mut(self.current).instrs.push(Instr::new(Some(result), kind));
        Operand::Value(result)
    }

    /// Append a copy of an existing instruction. Its result, if any, is
    /// renamed to a fresh value.
    pub fn append(&mut self, mut instr: Instr) -> Option<Operand> {
        let result = instr.result.map(|_| self.func.fresh_value());
        instr.result = result;
        self.func.block_mut(self.current).instrs.push(instr);
        result.map(Operand::Value)
    }

    pub fn alloca(&mut self, name: impl Into<String>, space: AddrSpace, size: usize) -> Operand {
        let align = size.clamp(1, 16).next_power_of_two();
        self.push_value(InstrKind::Alloca { name: name.into(), space, size, align })
    }

    pub fn load(&mut self, ptr: Operand) -> Operand {
        self.push_value(InstrKind::Load { ptr })
    }

    pub fn store(&mut self, ptr: Operand, value: Operand) {
        self.push_void(InstrKind::Store { ptr, value });
    }

    pub fn index(&mut self, base: Operand, offset: Operand) -> Operand {
        self.push_value(InstrKind::Index { base, offset })
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: Operand, rhs: Operand) -> Operand {
        self.push_value(InstrKind::Binary { op, lhs, rhs })
    }

    pub fn add(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn call(&mut self, callee: impl Into<String>, args: Vec<Operand>) -> Operand {
        self.push_value(InstrKind::Call { callee: callee.into(), args })
    }

    pub fn call_void(&mut self, callee: impl Into<String>, args: Vec<Operand>) {
        self.push_void(InstrKind::Call { callee: callee.into(), args });
    }

    pub fn barrier(&mut self) {
        self.func.block_mut(self.current).instrs.push(Instr::barrier());
    }

    /// Read a context-identity variable.
    pub fn context(&mut self, var: ContextVar) -> Operand {
        self.load(Operand::context(var))
    }

    pub fn br(&mut self, target: BlockId) {
        self.func.block_mut(self.current).term = Terminator::Br(target);
    }

    pub fn cond_br(&mut self, cond: Operand, then_block: BlockId, else_block: BlockId) {
        self.func.block_mut(self.current).term = Terminator::CondBr { cond, then_block, else_block };
    }

    pub fn ret(&mut self) {
        self.func.block_mut(self.current).term = Terminator::Ret;
    }

    pub fn terminate(&mut self, term: Terminator) {
        self.func.block_mut(self.current).term = term;
    }

    pub fn function(&self) -> &Function {
        &self.func
    }

    pub fn finish(self) -> Function {
        self.func
    }
}
