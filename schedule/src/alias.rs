//! Cross-worker alias queries over annotated accesses.
//!
//! The annotations come from the `workitem_alias` pass. The answer is only
//! [`AliasResult::NoAlias`] when two accesses are the same instruction pattern
//! executed by different workers of one parallel region, and that pattern is
//! known to hand each worker its own address.

use tessel_ir::Instr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasResult {
    NoAlias,
    MayAlias,
}

/// A memory access as executed by one worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerAccess<'a> {
    pub instr: &'a Instr,
    /// Local id of the executing worker.
    pub worker: [usize; 3],
}

impl<'a> WorkerAccess<'a> {
    pub fn new(instr: &'a Instr, worker: [usize; 3]) -> Self {
        Self { instr, worker }
    }
}

pub fn work_item_alias(a: WorkerAccess<'_>, b: WorkerAccess<'_>) -> AliasResult {
    let (ma, mb) = (&a.instr.meta, &b.instr.meta);
    let same_region = ma.region.is_some() && ma.region == mb.region;
    let disjoint = match (&ma.access, &mb.access) {
        (Some(pa), Some(pb)) => pa.lane_disjoint && pa == pb,
        _ => false,
    };
    if same_region && a.worker != b.worker && disjoint { AliasResult::NoAlias } else { AliasResult::MayAlias }
}
