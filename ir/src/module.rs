//! Module, function, block and instruction definitions.
//!
//! The IR is a conventional basic-block CFG. Values are produced by
//! instructions and named by [`ValueId`]; there are no phi nodes, so state that
//! flows around loops goes through memory (allocas), the way an unoptimized
//! frontend emits it.

use std::collections::HashMap;

use smallvec::{SmallVec, smallvec};
use snafu::ensure;

use crate::error::{DuplicateSymbolSnafu, FunctionNotFoundSnafu, Result};
use crate::types::{AddrSpace, Axis, BARRIER_FUNCTION, BinaryOp, ContextVar, InlineHint, LANE_ID_INTRINSIC};

/// Index of a basic block inside its function. The entry block is `BlockId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// SSA value produced by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Instruction operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Value(ValueId),
    /// Function parameter by position.
    Param(usize),
    /// Address of a module global.
    Global(String),
    Const(i64),
}

impl Operand {
    pub fn global(name: impl Into<String>) -> Self {
        Operand::Global(name.into())
    }

    pub fn context(var: ContextVar) -> Self {
        Operand::Global(var.symbol())
    }

    pub fn as_value(&self) -> Option<ValueId> {
        match self {
            Operand::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_global(&self) -> Option<&str> {
        match self {
            Operand::Global(name) => Some(name),
            _ => None,
        }
    }
}

/// Base object an access pattern is relative to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccessBase {
    Param(usize),
    Global(String),
    /// Worker-private memory (allocas).
    Private(ValueId),
}

/// Worker-uniform leaf of an affine address expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UniformTerm {
    Param(usize),
    Context(ContextVar),
}

/// Affine description of a memory access address:
/// `base + sum(lane_coeffs[a] * local_id[a]) + sum(coef * uniform) + constant`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessPattern {
    pub base: AccessBase,
    pub lane_coeffs: [i64; 3],
    pub uniform: Vec<(UniformTerm, i64)>,
    pub constant: i64,
    /// Distinct workers of one group provably touch distinct addresses.
    pub lane_disjoint: bool,
}

/// Per-instruction metadata consumed by later passes and the external optimizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrMeta {
    pub access: Option<AccessPattern>,
    /// Parallel region the instruction was placed in by work-group generation.
    pub region: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrKind {
    Alloca { name: String, space: AddrSpace, size: usize, align: usize },
    Load { ptr: Operand },
    Store { ptr: Operand, value: Operand },
    /// Pointer arithmetic: `base + offset`.
    Index { base: Operand, offset: Operand },
    Binary { op: BinaryOp, lhs: Operand, rhs: Operand },
    Call { callee: String, args: Vec<Operand> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instr {
    pub result: Option<ValueId>,
    pub kind: InstrKind,
    pub meta: InstrMeta,
}

impl Instr {
    pub fn new(result: Option<ValueId>, kind: InstrKind) -> Self {
        Self { result, kind, meta: InstrMeta::default() }
    }

    pub fn operands(&self) -> SmallVec<[&Operand; 2]> {
        match &self.kind {
            InstrKind::Alloca { .. } => smallvec![],
            InstrKind::Load { ptr } => smallvec![ptr],
            InstrKind::Store { ptr, value } => smallvec![ptr, value],
            InstrKind::Index { base, offset } => smallvec![base, offset],
            InstrKind::Binary { lhs, rhs, .. } => smallvec![lhs, rhs],
            InstrKind::Call { args, .. } => args.iter().collect(),
        }
    }

    pub fn operands_mut(&mut self) -> SmallVec<[&mut Operand; 2]> {
        match &mut self.kind {
            InstrKind::Alloca { .. } => smallvec![],
            InstrKind::Load { ptr } => smallvec![ptr],
            InstrKind::Store { ptr, value } => smallvec![ptr, value],
            InstrKind::Index { base, offset } => smallvec![base, offset],
            InstrKind::Binary { lhs, rhs, .. } => smallvec![lhs, rhs],
            InstrKind::Call { args, .. } => args.iter_mut().collect(),
        }
    }

    pub fn callee(&self) -> Option<&str> {
        match &self.kind {
            InstrKind::Call { callee, .. } => Some(callee),
            _ => None,
        }
    }

    pub fn is_call_to(&self, name: &str) -> bool {
        self.callee() == Some(name)
    }

    pub fn is_barrier(&self) -> bool {
        self.is_call_to(BARRIER_FUNCTION)
    }

    pub fn is_memory_access(&self) -> bool {
        matches!(self.kind, InstrKind::Load { .. } | InstrKind::Store { .. })
    }

    /// Pointer operand of a load or store.
    pub fn address(&self) -> Option<&Operand> {
        match &self.kind {
            InstrKind::Load { ptr } | InstrKind::Store { ptr, .. } => Some(ptr),
            _ => None,
        }
    }

    /// A call to the barrier builtin with the default (zero) flags argument.
    pub fn barrier() -> Self {
        Instr::new(None, InstrKind::Call { callee: BARRIER_FUNCTION.to_string(), args: vec![Operand::Const(0)] })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Br(BlockId),
    CondBr { cond: Operand, then_block: BlockId, else_block: BlockId },
    Ret,
}

impl Terminator {
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Terminator::Br(target) => smallvec![*target],
            Terminator::CondBr { then_block, else_block, .. } => smallvec![*then_block, *else_block],
            Terminator::Ret => smallvec![],
        }
    }

    pub fn successors_mut(&mut self) -> SmallVec<[&mut BlockId; 2]> {
        match self {
            Terminator::Br(target) => smallvec![target],
            Terminator::CondBr { then_block, else_block, .. } => smallvec![then_block, else_block],
            Terminator::Ret => smallvec![],
        }
    }

    pub fn operand_mut(&mut self) -> Option<&mut Operand> {
        match self {
            Terminator::CondBr { cond, .. } => Some(cond),
            _ => None,
        }
    }

    pub fn operand(&self) -> Option<&Operand> {
        match self {
            Terminator::CondBr { cond, .. } => Some(cond),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub label: String,
    pub instrs: Vec<Instr>,
    pub term: Terminator,
}

impl Block {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), instrs: Vec::new(), term: Terminator::Ret }
    }

    /// True when the last instruction before the terminator is a barrier call.
    pub fn ends_with_barrier(&self) -> bool {
        self.instrs.last().is_some_and(Instr::is_barrier)
    }

    pub fn has_barrier(&self) -> bool {
        self.instrs.iter().any(Instr::is_barrier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Plain by-value argument of `size` bytes.
    Scalar { size: usize },
    /// Pointer into the given address space.
    Pointer { space: AddrSpace },
    /// Group-local buffer of a fixed size, introduced for automatic locals.
    LocalBuffer { size: usize },
    Image,
    Sampler,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub type_name: String,
    pub kind: ParamKind,
}

impl Param {
    /// Byte width of the element a pointer parameter points at, when its
    /// type name is a known scalar or vector type (`int*`, `float4*`).
    pub fn element_size(&self) -> Option<u64> {
        let pointee = self.type_name.trim().strip_suffix('*')?.split_whitespace().last()?;
        let scalar = pointee.trim_end_matches(|c: char| c.is_ascii_digit());
        let lanes = match &pointee[scalar.len()..] {
            "" => 1,
            "2" => 2,
            // Three-component vectors are padded to four.
            "3" | "4" => 4,
            "8" => 8,
            "16" => 16,
            _ => return None,
        };
        let size = match scalar {
            "char" | "uchar" | "bool" => 1,
            "short" | "ushort" | "half" => 2,
            "int" | "uint" | "float" => 4,
            "long" | "ulong" | "double" | "size_t" => 8,
            _ => return None,
        };
        Some(size * lanes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Kernel,
    Helper,
    /// Generated entry point that runs every worker of one group.
    WorkGroup,
    /// External function without a body (builtins such as `barrier`).
    Declaration,
}

/// A group-local variable promoted to a kernel parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomaticLocal {
    pub name: String,
    pub size: usize,
    pub align: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub kind: FunctionKind,
    pub params: Vec<Param>,
    pub blocks: Vec<Block>,
    pub inline: InlineHint,
    /// Trailing parameters added by automatic-local promotion, in order.
    pub automatic_locals: Vec<AutomaticLocal>,
    next_value: u32,
}

impl Function {
    pub fn new(name: impl Into<String>, kind: FunctionKind) -> Self {
        let blocks = match kind {
            FunctionKind::Declaration => Vec::new(),
            _ => vec![Block::new("entry")],
        };
        Self {
            name: name.into(),
            kind,
            params: Vec::new(),
            blocks,
            inline: InlineHint::Default,
            automatic_locals: Vec::new(),
            next_value: 0,
        }
    }

    pub fn declaration(name: impl Into<String>, params: Vec<Param>) -> Self {
        Self { params, ..Self::new(name, FunctionKind::Declaration) }
    }

    pub fn is_kernel(&self) -> bool {
        self.kind == FunctionKind::Kernel
    }

    /// Kernels and generated work-group functions are called from the host.
    pub fn is_entry_point(&self) -> bool {
        matches!(self.kind, FunctionKind::Kernel | FunctionKind::WorkGroup)
    }

    pub fn is_declaration(&self) -> bool {
        self.kind == FunctionKind::Declaration
    }

    pub fn entry(&self) -> BlockId {
        BlockId::ENTRY
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + use<> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn add_block(&mut self, label: impl Into<String>) -> BlockId {
        self.blocks.push(Block::new(label));
        BlockId(self.blocks.len() as u32 - 1)
    }

    pub fn fresh_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    /// Number of value ids handed out so far.
    pub fn value_count(&self) -> u32 {
        self.next_value
    }

    pub fn successors(&self, id: BlockId) -> SmallVec<[BlockId; 2]> {
        self.block(id).term.successors()
    }

    pub fn predecessors(&self, id: BlockId) -> Vec<BlockId> {
        self.block_ids().filter(|&b| self.successors(b).contains(&id)).collect()
    }

    /// All instructions with their position.
    pub fn instrs(&self) -> impl Iterator<Item = (BlockId, usize, &Instr)> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(b, block)| block.instrs.iter().enumerate().map(move |(i, instr)| (BlockId(b as u32), i, instr)))
    }

    /// Defining position of every value.
    pub fn definitions(&self) -> HashMap<ValueId, (BlockId, usize)> {
        self.instrs().filter_map(|(b, i, instr)| instr.result.map(|v| (v, (b, i)))).collect()
    }

    pub fn definition(&self, value: ValueId) -> Option<&Instr> {
        self.instrs().find(|(_, _, instr)| instr.result == Some(value)).map(|(_, _, instr)| instr)
    }

    /// Names of functions called from this body.
    pub fn callees(&self) -> impl Iterator<Item = &str> {
        self.instrs().filter_map(|(_, _, instr)| instr.callee())
    }

    pub fn references_global(&self, name: &str) -> bool {
        self.blocks.iter().any(|block| {
            block.instrs.iter().flat_map(Instr::operands).chain(block.term.operand()).any(|op| op.as_global() == Some(name))
        })
    }

    pub fn has_barrier(&self) -> bool {
        self.blocks.iter().any(Block::has_barrier)
    }

    /// Replace every use of `from` with `to`, including terminator conditions.
    pub fn replace_uses(&mut self, from: &Operand, to: &Operand) {
        for block in &mut self.blocks {
            for instr in &mut block.instrs {
                for op in instr.operands_mut() {
                    if op == from {
                        *op = to.clone();
                    }
                }
            }
            if let Some(op) = block.term.operand_mut()
                && op == from
            {
                *op = to.clone();
            }
        }
    }

    /// Split `block` before instruction `at`. The tail (instructions and
    /// terminator) moves to a new block that the head falls through to.
    pub fn split_block(&mut self, block: BlockId, at: usize, label: impl Into<String>) -> BlockId {
        let tail_instrs = self.block_mut(block).instrs.split_off(at);
        let tail_term = std::mem::replace(&mut self.block_mut(block).term, Terminator::Ret);
        let tail = self.add_block(label);
        let tail_block = self.block_mut(tail);
        tail_block.instrs = tail_instrs;
        tail_block.term = tail_term;
        self.block_mut(block).term = Terminator::Br(tail);
        tail
    }

    /// Insert a new empty block in front of the current entry. Existing blocks
    /// shift up by one; the new entry falls through to the old one.
    pub fn insert_entry_block(&mut self, label: impl Into<String>) -> BlockId {
        for block in &mut self.blocks {
            for succ in block.term.successors_mut() {
                succ.0 += 1;
            }
        }
        let mut entry = Block::new(label);
        entry.term = Terminator::Br(BlockId(1));
        self.blocks.insert(0, entry);
        BlockId::ENTRY
    }

    pub fn push_param(&mut self, param: Param) -> usize {
        self.params.push(param);
        self.params.len() - 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVar {
    pub name: String,
    pub space: AddrSpace,
    pub size: usize,
    pub align: usize,
    /// Kernel a function-scoped local belongs to.
    pub owner: Option<String>,
}

impl GlobalVar {
    pub fn new(name: impl Into<String>, space: AddrSpace, size: usize) -> Self {
        Self { name: name.into(), space, size, align: size.clamp(1, 16).next_power_of_two(), owner: None }
    }

    pub fn owned_by(mut self, kernel: impl Into<String>) -> Self {
        self.owner = Some(kernel.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    globals: Vec<GlobalVar>,
    functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), globals: Vec::new(), functions: Vec::new() }
    }

    pub fn add_global(&mut self, global: GlobalVar) -> Result<()> {
        ensure!(!self.has_symbol(&global.name), DuplicateSymbolSnafu { name: global.name.clone() });
        self.globals.push(global);
        Ok(())
    }

    pub fn global(&self, name: &str) -> Option<&GlobalVar> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn globals(&self) -> &[GlobalVar] {
        &self.globals
    }

    pub fn remove_global(&mut self, name: &str) -> Option<GlobalVar> {
        let pos = self.globals.iter().position(|g| g.name == name)?;
        Some(self.globals.remove(pos))
    }

    pub fn add_function(&mut self, function: Function) -> Result<()> {
        ensure!(!self.has_symbol(&function.name), DuplicateSymbolSnafu { name: function.name.clone() });
        self.functions.push(function);
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn try_function(&self, name: &str) -> Result<&Function> {
        self.function(name).ok_or_else(|| FunctionNotFoundSnafu { name }.build())
    }

    pub fn try_function_mut(&mut self, name: &str) -> Result<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name).ok_or_else(|| FunctionNotFoundSnafu { name }.build())
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut [Function] {
        &mut self.functions
    }

    pub fn kernels(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter(|f| f.is_kernel())
    }

    pub fn has_symbol(&self, name: &str) -> bool {
        self.global(name).is_some() || self.function(name).is_some()
    }

    /// Declare every missing context-identity global (`_local_id_x`, ...).
    pub fn declare_context_symbols(&mut self) {
        for var in ContextVar::all() {
            let name = var.symbol();
            if !self.has_symbol(&name) {
                self.globals.push(GlobalVar::new(name, AddrSpace::Private, 8));
            }
        }
    }

    /// Declare the barrier builtin if the module does not have it yet.
    pub fn declare_barrier(&mut self) {
        if self.function(BARRIER_FUNCTION).is_none() {
            let flags = Param { name: "flags".into(), type_name: "uint".into(), kind: ParamKind::Scalar { size: 4 } };
            self.functions.push(Function::declaration(BARRIER_FUNCTION, vec![flags]));
        }
    }

    /// Declare the lane-id intrinsic used by SPMD work-group functions.
    pub fn declare_lane_id(&mut self) {
        if self.function(LANE_ID_INTRINSIC).is_none() {
            let axis = Param { name: "axis".into(), type_name: "uint".into(), kind: ParamKind::Scalar { size: 4 } };
            self.functions.push(Function::declaration(LANE_ID_INTRINSIC, vec![axis]));
        }
    }

    /// Context symbols that are required but not declared.
    pub fn missing_context_symbols(&self, vars: impl IntoIterator<Item = ContextVar>) -> Vec<String> {
        vars.into_iter().map(ContextVar::symbol).filter(|name| self.global(name).is_none()).collect()
    }
}

/// Context variables the work-group generator writes: local ids and sizes on every axis.
pub fn workgroup_context_vars() -> impl Iterator<Item = ContextVar> {
    [Axis::X, Axis::Y, Axis::Z].into_iter().flat_map(|axis| [ContextVar::LocalId(axis), ContextVar::LocalSize(axis)])
}
