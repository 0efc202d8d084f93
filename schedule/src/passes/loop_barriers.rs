//! Make barriers inside loops safe to replicate.
//!
//! When a loop body contains a barrier, every worker must enter the loop
//! together and finish each iteration together. A barrier is placed at the end
//! of the preheader and at the end of each latch that returns to the header.

use tessel_ir::{BlockId, ControlFlow, Function, Instr, LoopForest};

use super::kernel_mut;
use crate::context::PassContext;
use crate::error::{MalformedLoopSnafu, Result};

/// Append a barrier to `block` unless one is already its last instruction.
fn seal(func: &mut Function, block: BlockId, suffix: &str) -> bool {
    let block = func.block_mut(block);
    if block.ends_with_barrier() {
        return false;
    }
    block.instrs.push(Instr::barrier());
    block.label.push_str(suffix);
    true
}

pub fn loop_barriers(module: &mut tessel_ir::Module, ctx: &PassContext) -> Result<bool> {
    let func = kernel_mut(module, ctx)?;
    let cfg = ControlFlow::new(func);
    let dom = cfg.dominators();
    let loops = LoopForest::new(&cfg, &dom);

    let mut changed = false;
    for l in loops.innermost_first() {
        // Barriers sealed into inner preheaders count for the enclosing loop.
        let barrier_blocks: Vec<BlockId> = l.blocks.iter().copied().filter(|&b| func.block(b).has_barrier()).collect();
        if barrier_blocks.is_empty() {
            continue;
        }

        let Some(preheader) = l.preheader(&cfg) else {
            return MalformedLoopSnafu { function: func.name.clone(), header: func.block(l.header).label.clone() }
                .fail();
        };
        changed |= seal(func, preheader, ".loopbarrier");

        match l.latch(&cfg) {
            Some(latch) => changed |= seal(func, latch, ".latchbarrier"),
            None => {
                for latch in l.latches(&cfg) {
                    if barrier_blocks.iter().any(|&b| dom.dominates(b, latch)) {
                        changed |= seal(func, latch, ".latchbarrier");
                    }
                }
            }
        }
        tracing::debug!(kernel = %ctx.kernel, header = %func.block(l.header).label, "legalized loop barrier");
    }
    Ok(changed)
}
