//! Generate the function that executes a whole work-group.
//!
//! With [`WorkitemHandler::Loops`] the kernel is cut at its barriers into
//! parallel regions. Each region runs inside a z/y/x loop nest over the local
//! id space, so every worker finishes the region before any worker starts the
//! next one. After the nest, the barrier the workers stopped at selects the
//! next region.
//!
//! Per-worker state that outlives a block is kept in context arrays indexed by
//! the linear local id: values used outside their defining block are spilled
//! and reloaded, and private allocas are widened to one slot per worker.
//!
//! With [`WorkitemHandler::Spmd`] the kernel body is kept intact and a prologue
//! reads each local id from the lane-id intrinsic.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use snafu::{ResultExt, ensure};
use tessel_ir::{
    AddrSpace, Axis, BinaryOp, BlockId, ContextVar, Function, FunctionBuilder, FunctionKind, InlineHint, InstrKind,
    LANE_ID_INTRINSIC, Module, Operand, Terminator, ValueId, workgroup_context_vars,
};

use super::kernel;
use crate::context::{PassContext, WorkitemHandler};
use crate::error::{InvalidLocalSizeSnafu, IrSnafu, MissingContextSymbolSnafu, Result};

/// Exit code recorded when a worker returns from the kernel.
const EXIT_RETURN: i64 = 0;

/// Slot width of a spilled value.
const VALUE_SLOT: i64 = 8;

const AXES_OUTER_FIRST: [Axis; 3] = [Axis::Z, Axis::Y, Axis::X];

pub fn workitem(module: &mut Module, ctx: &PassContext) -> Result<bool> {
    let name = ctx.workgroup_function();
    if module.function(&name).is_some() {
        return Ok(false);
    }
    if let Some(symbol) = module.missing_context_symbols(workgroup_context_vars()).into_iter().next() {
        return MissingContextSymbolSnafu { symbol }.fail();
    }
    ensure!(ctx.local_size.iter().all(|&n| n > 0), InvalidLocalSizeSnafu { local_size: ctx.local_size });

    let source = kernel(module, ctx)?.clone();
    let generated = match ctx.handler {
        WorkitemHandler::Loops => LoopsBuilder::new(&source, ctx).build(),
        WorkitemHandler::Spmd => {
            module.declare_lane_id();
            spmd(&source, ctx)
        }
    };
    tracing::debug!(
        kernel = %ctx.kernel,
        handler = %ctx.handler,
        blocks = generated.blocks.len(),
        "generated work-group function"
    );
    module.add_function(generated).context(IrSnafu)?;
    Ok(true)
}

fn entry_point(source: &Function, ctx: &PassContext) -> Function {
    let mut func = Function::new(ctx.workgroup_function(), FunctionKind::WorkGroup);
    func.params = source.params.clone();
    func.automatic_locals = source.automatic_locals.clone();
    func.inline = InlineHint::Never;
    func
}

fn spmd(source: &Function, ctx: &PassContext) -> Function {
    let mut func = source.clone();
    func.name = ctx.workgroup_function();
    func.kind = FunctionKind::WorkGroup;
    func.inline = InlineHint::Never;
    let prologue = func.insert_entry_block("spmd.prologue");

    let mut b = FunctionBuilder::resume(func, prologue);
    for axis in [Axis::X, Axis::Y, Axis::Z] {
        b.store(Operand::context(ContextVar::LocalSize(axis)), Operand::Const(ctx.local_size[axis.index()] as i64));
    }
    for axis in [Axis::X, Axis::Y, Axis::Z] {
        let lane = b.call(LANE_ID_INTRINSIC, vec![Operand::Const(axis.index() as i64)]);
        b.store(Operand::context(ContextVar::LocalId(axis)), lane);
    }
    b.finish()
}

/// Split blocks so that every barrier sits alone in a block ending in `br`.
fn isolate_barriers(func: &mut Function) {
    let mut id = 0;
    while id < func.blocks.len() {
        let block = BlockId(id as u32);
        let current = func.block(block);
        if let Some(pos) = current.instrs.iter().position(|i| i.is_barrier()) {
            let label = current.label.clone();
            if pos > 0 {
                func.split_block(block, pos, format!("{label}.barrier"));
            } else if current.instrs.len() > 1 || !matches!(current.term, Terminator::Br(_)) {
                func.split_block(block, 1, format!("{label}.post"));
            }
        }
        id += 1;
    }
}

fn is_barrier_block(func: &Function, block: BlockId) -> bool {
    let b = func.block(block);
    b.instrs.len() == 1 && b.instrs[0].is_barrier() && matches!(b.term, Terminator::Br(_))
}

/// Blocks of the loop nest wrapped around one parallel region.
struct RegionShell {
    init: BlockId,
    x_head: BlockId,
    x_latch: BlockId,
    dispatch: BlockId,
}

struct LoopsBuilder<'k> {
    source: Function,
    ctx: &'k PassContext,
    b: FunctionBuilder,
    /// Barrier-only block of the source -> exit code.
    barriers: BTreeMap<BlockId, i64>,
    spills: HashMap<ValueId, Operand>,
    /// Private alloca -> (context array, per-worker size).
    privates: HashMap<ValueId, (Operand, usize)>,
    shared: HashMap<ValueId, Operand>,
    exit_slot: Operand,
    ret_block: BlockId,
    region_starts: Vec<BlockId>,
    shells: Vec<RegionShell>,
}

impl<'k> LoopsBuilder<'k> {
    fn new(kernel: &Function, ctx: &'k PassContext) -> Self {
        let mut source = kernel.clone();
        isolate_barriers(&mut source);
        let barriers = source
            .block_ids()
            .filter(|&b| is_barrier_block(&source, b))
            .enumerate()
            .map(|(i, b)| (b, i as i64 + 1))
            .collect();

        let mut b = FunctionBuilder::resume(entry_point(kernel, ctx), BlockId::ENTRY);
        for axis in [Axis::X, Axis::Y, Axis::Z] {
            let size = Operand::Const(ctx.local_size[axis.index()] as i64);
            b.store(Operand::context(ContextVar::LocalSize(axis)), size);
        }
        let exit_slot = b.alloca("exit", AddrSpace::Private, VALUE_SLOT as usize);
        let ret_block = b.block("exit");
        Self {
            source,
            ctx,
            b,
            barriers,
            spills: HashMap::new(),
            privates: HashMap::new(),
            shared: HashMap::new(),
            exit_slot,
            ret_block,
            region_starts: Vec::new(),
            shells: Vec::new(),
        }
    }

    fn volume(&self) -> usize {
        self.ctx.volume()
    }

    fn build(mut self) -> Function {
        self.prepare_entry();
        let first = self.region(BlockId::ENTRY);
        self.b.position_at(BlockId::ENTRY);
        self.b.br(self.shells[first].init);

        let mut next = 0;
        while next < self.region_starts.len() {
            self.emit_region(next);
            next += 1;
        }

        self.b.position_at(self.ret_block);
        self.b.ret();
        self.b.finish()
    }

    /// Allocate every context array in the entry block.
    fn prepare_entry(&mut self) {
        let defs = self.source.definitions();
        let mut crossing = BTreeSet::new();
        for block in self.source.block_ids() {
            let body = self.source.block(block);
            let used = body.instrs.iter().flat_map(|i| i.operands()).chain(body.term.operand());
            for v in used.filter_map(Operand::as_value) {
                if defs.get(&v).is_some_and(|(def_block, _)| *def_block != block) {
                    crossing.insert(v);
                }
            }
        }

        let volume = self.volume();
        for (_, _, instr) in self.source.instrs() {
            let (Some(v), InstrKind::Alloca { name, space, size, .. }) = (instr.result, &instr.kind) else {
                continue;
            };
            if *space == AddrSpace::Private {
                let array = self.b.alloca(format!("{name}.ctx"), AddrSpace::Private, size * volume);
                self.privates.insert(v, (array, *size));
            } else {
                let hoisted = self.b.alloca(name.clone(), *space, *size);
                self.shared.insert(v, hoisted);
            }
        }
        for v in crossing {
            if self.privates.contains_key(&v) || self.shared.contains_key(&v) {
                continue;
            }
            let array = self.b.alloca(format!("v{}.ctx", v.0), AddrSpace::Private, VALUE_SLOT as usize * volume);
            self.spills.insert(v, array);
        }
        tracing::debug!(
            kernel = %self.ctx.kernel,
            spills = self.spills.len(),
            privates = self.privates.len(),
            "allocated context arrays"
        );
    }

    /// Region starting at `start`, creating its loop shell on first use.
    fn region(&mut self, start: BlockId) -> usize {
        if let Some(index) = self.region_starts.iter().position(|&s| s == start) {
            return index;
        }
        let r = self.region_starts.len();
        let label = |part: &str| format!("region{r}.{part}");
        let init = self.b.block(label("init"));
        let z_head = self.b.block(label("z.head"));
        let y_head = self.b.block(label("y.head"));
        let x_head = self.b.block(label("x.head"));
        let x_latch = self.b.block(label("x.latch"));
        let y_latch = self.b.block(label("y.latch"));
        let z_latch = self.b.block(label("z.latch"));
        let dispatch = self.b.block(label("dispatch"));

        let heads = [(init, z_head), (z_head, y_head), (y_head, x_head)];
        for ((block, next), axis) in heads.into_iter().zip(AXES_OUTER_FIRST) {
            self.b.position_at(block);
            self.b.store(Operand::context(ContextVar::LocalId(axis)), Operand::Const(0));
            self.b.br(next);
        }
        let latches = [(x_latch, x_head, y_latch), (y_latch, y_head, z_latch), (z_latch, z_head, dispatch)];
        for ((block, head, done), axis) in latches.into_iter().zip([Axis::X, Axis::Y, Axis::Z]) {
            self.b.position_at(block);
            let id = Operand::context(ContextVar::LocalId(axis));
            let current = self.b.load(id.clone());
            let next = self.b.add(current, Operand::Const(1));
            self.b.store(id, next.clone());
            let bound = Operand::Const(self.ctx.local_size[axis.index()] as i64);
            let more = self.b.binary(BinaryOp::Lt, next, bound);
            self.b.cond_br(more, head, done);
        }

        self.region_starts.push(start);
        self.shells.push(RegionShell { init, x_head, x_latch, dispatch });
        r
    }

    /// Source blocks reachable from `start` without crossing a barrier.
    fn region_blocks(&self, start: BlockId) -> BTreeSet<BlockId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(block) = stack.pop() {
            if self.barriers.contains_key(&block) || !seen.insert(block) {
                continue;
            }
            stack.extend(self.source.successors(block));
        }
        seen
    }

    fn emit_region(&mut self, r: usize) {
        let start = self.region_starts[r];
        let blocks = self.region_blocks(start);
        let clones: HashMap<BlockId, BlockId> = blocks
            .iter()
            .map(|&kb| (kb, self.b.block(format!("{}.r{r}", self.source.block(kb).label))))
            .collect();
        let mut stubs: BTreeMap<i64, BlockId> = BTreeMap::new();

        let entry = self.target(r, start, &clones, &mut stubs);
        self.b.position_at(self.shells[r].x_head);
        self.b.br(entry);

        for &kb in &blocks {
            self.b.position_at(clones[&kb]);
            self.emit_block(r, kb, &clones, &mut stubs);
        }

        let x_latch = self.shells[r].x_latch;
        for (&code, &stub) in &stubs {
            self.b.position_at(stub);
            self.b.store(self.exit_slot.clone(), Operand::Const(code));
            self.b.br(x_latch);
        }

        let destinations: Vec<(i64, BlockId)> = stubs
            .keys()
            .map(|&code| {
                let dest = match self.barrier_successor(code) {
                    Some(next) => {
                        let region = self.region(next);
                        self.shells[region].init
                    }
                    None => self.ret_block,
                };
                (code, dest)
            })
            .collect();
        self.emit_dispatch(r, &destinations);
    }

    fn barrier_successor(&self, code: i64) -> Option<BlockId> {
        let (&block, _) = self.barriers.iter().find(|&(_, &c)| c == code)?;
        self.source.successors(block).first().copied()
    }

    /// Branch chain selecting the next region from the recorded exit code.
    fn emit_dispatch(&mut self, r: usize, destinations: &[(i64, BlockId)]) {
        self.b.position_at(self.shells[r].dispatch);
        let Some(((_, last), tests)) = destinations.split_last() else {
            self.b.br(self.ret_block);
            return;
        };
        if tests.is_empty() {
            self.b.br(*last);
            return;
        }
        let code = self.b.load(self.exit_slot.clone());
        for (i, &(expected, dest)) in tests.iter().enumerate() {
            let taken = self.b.binary(BinaryOp::Eq, code.clone(), Operand::Const(expected));
            let otherwise =
                if i + 1 == tests.len() { *last } else { self.b.block(format!("region{r}.dispatch{}", i + 1)) };
            self.b.cond_br(taken, dest, otherwise);
            self.b.position_at(otherwise);
        }
    }

    fn target(
        &mut self,
        r: usize,
        block: BlockId,
        clones: &HashMap<BlockId, BlockId>,
        stubs: &mut BTreeMap<i64, BlockId>,
    ) -> BlockId {
        if let Some(&code) = self.barriers.get(&block) {
            return self.stub(r, code, stubs);
        }
        clones[&block]
    }

    fn stub(&mut self, r: usize, code: i64, stubs: &mut BTreeMap<i64, BlockId>) -> BlockId {
        if let Some(&stub) = stubs.get(&code) {
            return stub;
        }
        let stub = self.b.block(format!("region{r}.exit{code}"));
        stubs.insert(code, stub);
        stub
    }

    fn emit_block(
        &mut self,
        r: usize,
        kb: BlockId,
        clones: &HashMap<BlockId, BlockId>,
        stubs: &mut BTreeMap<i64, BlockId>,
    ) {
        let body = self.source.block(kb).clone();
        let mut local: HashMap<ValueId, Operand> = HashMap::new();
        let mut linear = None;

        for instr in body.instrs {
            if matches!(instr.kind, InstrKind::Alloca { .. }) {
                continue;
            }
            let original = instr.result;
            let mut instr = instr;
            for op in instr.operands_mut() {
                *op = self.rewrite(op, &local, &mut linear);
            }
            instr.meta.region = Some(r as u32);
            let Some(result) = self.b.append(instr) else { continue };
            let Some(v) = original else { continue };
            if let Some(array) = self.spills.get(&v).cloned() {
                let slot = self.slot(array, VALUE_SLOT, &mut linear);
                self.b.store(slot, result.clone());
            }
            local.insert(v, result);
        }

        let mut term = body.term;
        if let Some(cond) = term.operand_mut() {
            *cond = self.rewrite(cond, &local, &mut linear);
        }
        let term = match term {
            Terminator::Ret => Terminator::Br(self.stub(r, EXIT_RETURN, stubs)),
            Terminator::Br(next) => Terminator::Br(self.target(r, next, clones, stubs)),
            Terminator::CondBr { cond, then_block, else_block } => Terminator::CondBr {
                cond,
                then_block: self.target(r, then_block, clones, stubs),
                else_block: self.target(r, else_block, clones, stubs),
            },
        };
        self.b.terminate(term);
    }

    fn rewrite(&mut self, op: &Operand, local: &HashMap<ValueId, Operand>, linear: &mut Option<Operand>) -> Operand {
        let Operand::Value(v) = op else { return op.clone() };
        if let Some((array, size)) = self.privates.get(v).cloned() {
            return self.slot(array, size as i64, linear);
        }
        if let Some(value) = self.shared.get(v).or_else(|| local.get(v)) {
            return value.clone();
        }
        if let Some(array) = self.spills.get(v).cloned() {
            let slot = self.slot(array, VALUE_SLOT, linear);
            return self.b.load(slot);
        }
        op.clone()
    }

    /// Address of the current worker's slot in a context array.
    fn slot(&mut self, array: Operand, stride: i64, linear: &mut Option<Operand>) -> Operand {
        let id = match linear {
            Some(id) => id.clone(),
            None => {
                let id = self.linear_id();
                *linear = Some(id.clone());
                id
            }
        };
        let offset = self.b.mul(id, Operand::Const(stride));
        self.b.index(array, offset)
    }

    /// `(z * Ly + y) * Lx + x`
    fn linear_id(&mut self) -> Operand {
        let [lx, ly, _] = self.ctx.local_size.map(|n| Operand::Const(n as i64));
        let x = self.b.context(ContextVar::LocalId(Axis::X));
        let y = self.b.context(ContextVar::LocalId(Axis::Y));
        let z = self.b.context(ContextVar::LocalId(Axis::Z));
        let zy = self.b.mul(z, ly);
        let zy = self.b.add(zy, y);
        let zyx = self.b.mul(zy, lx);
        self.b.add(zyx, x)
    }
}

/// Blocks of `func` belonging to parallel region `r`.
pub fn region_blocks(func: &Function, r: u32) -> HashSet<BlockId> {
    func.instrs().filter(|(_, _, instr)| instr.meta.region == Some(r)).map(|(b, _, _)| b).collect()
}
