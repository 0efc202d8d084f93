//! Annotate loads and stores with their address pattern over the local id.
//!
//! Each address is folded into
//! `base + sum(c[a] * local_id[a]) + sum(k * uniform) + constant`
//! where every uniform term is the same for all workers of a group. Anything
//! the folder does not understand leaves the access unannotated, which later
//! consumers treat as "may alias".
//!
//! An access is marked lane-disjoint when distinct workers of the group are
//! guaranteed non-overlapping bytes. Private memory always is. Otherwise the
//! element width must be known from the pointer type and the coefficients must
//! separate every active axis by at least that width (mixed-radix argument).

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use tessel_ir::{
    AccessBase, AccessPattern, BinaryOp, ContextVar, Function, InstrKind, Operand, ParamKind, UniformTerm, ValueId,
};

use super::kernel_mut;
use crate::context::{LocalSize, PassContext};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Affine {
    base: Option<AccessBase>,
    lane: [i64; 3],
    uniform: BTreeMap<UniformTerm, i64>,
    constant: i64,
}

impl Affine {
    fn constant(c: i64) -> Self {
        Self { constant: c, ..Self::default() }
    }

    fn based(base: AccessBase) -> Self {
        Self { base: Some(base), ..Self::default() }
    }

    fn uniform(term: UniformTerm) -> Self {
        Self { uniform: BTreeMap::from([(term, 1)]), ..Self::default() }
    }

    fn as_constant(&self) -> Option<i64> {
        (self.base.is_none() && self.lane == [0; 3] && self.uniform.is_empty()).then_some(self.constant)
    }

    fn add(self, other: Self, sign: i64) -> Option<Self> {
        let base = match (self.base, other.base) {
            (Some(_), Some(_)) => return None,
            (base, None) => base,
            // base - x is meaningless as an address.
            (None, Some(_)) if sign < 0 => return None,
            (None, base) => base,
        };
        let mut uniform = self.uniform;
        for (term, k) in other.uniform {
            let entry = uniform.entry(term).or_default();
            *entry = entry.checked_add(k.checked_mul(sign)?)?;
        }
        uniform.retain(|_, k| *k != 0);
        let mut lane = self.lane;
        for (l, r) in lane.iter_mut().zip(other.lane) {
            *l = l.checked_add(r.checked_mul(sign)?)?;
        }
        Some(Self { base, lane, uniform, constant: self.constant.checked_add(other.constant.checked_mul(sign)?)? })
    }

    fn scale(self, factor: i64) -> Option<Self> {
        if self.base.is_some() {
            return None;
        }
        let mut lane = self.lane;
        for l in &mut lane {
            *l = l.checked_mul(factor)?;
        }
        let uniform =
            self.uniform.into_iter().map(|(t, k)| Some((t, k.checked_mul(factor)?))).collect::<Option<_>>()?;
        Some(Self { base: None, lane, uniform, constant: self.constant.checked_mul(factor)? })
    }
}

struct Folder<'f> {
    func: &'f Function,
    defs: HashMap<ValueId, &'f InstrKind>,
    memo: HashMap<ValueId, Option<Affine>>,
}

impl<'f> Folder<'f> {
    fn new(func: &'f Function) -> Self {
        let defs = func.instrs().filter_map(|(_, _, instr)| Some((instr.result?, &instr.kind))).collect();
        Self { func, defs, memo: HashMap::new() }
    }

    fn fold(&mut self, op: &Operand) -> Option<Affine> {
        match op {
            Operand::Const(c) => Some(Affine::constant(*c)),
            Operand::Param(i) => match self.func.params.get(*i)?.kind {
                ParamKind::Pointer { .. } | ParamKind::LocalBuffer { .. } => Some(Affine::based(AccessBase::Param(*i))),
                ParamKind::Scalar { .. } => Some(Affine::uniform(UniformTerm::Param(*i))),
                ParamKind::Image | ParamKind::Sampler => None,
            },
            Operand::Global(name) => Some(Affine::based(AccessBase::Global(name.clone()))),
            Operand::Value(v) => {
                if let Some(known) = self.memo.get(v) {
                    return known.clone();
                }
                let folded = self.fold_value(*v);
                self.memo.insert(*v, folded.clone());
                folded
            }
        }
    }

    fn fold_value(&mut self, value: ValueId) -> Option<Affine> {
        match self.defs.get(&value).copied()? {
            InstrKind::Alloca { .. } => Some(Affine::based(AccessBase::Private(value))),
            InstrKind::Load { ptr: Operand::Global(name) } => match ContextVar::from_symbol(name)? {
                ContextVar::LocalId(axis) => {
                    let mut lane = [0; 3];
                    lane[axis.index()] = 1;
                    Some(Affine { lane, ..Affine::default() })
                }
                var => Some(Affine::uniform(UniformTerm::Context(var))),
            },
            InstrKind::Index { base, offset } => {
                let (base, offset) = (self.fold(base)?, self.fold(offset)?);
                base.add(offset, 1)
            }
            InstrKind::Binary { op, lhs, rhs } => {
                let (lhs, rhs) = (self.fold(lhs)?, self.fold(rhs)?);
                match op {
                    BinaryOp::Add => lhs.add(rhs, 1),
                    BinaryOp::Sub => lhs.add(rhs, -1),
                    BinaryOp::Mul => match (lhs.as_constant(), rhs.as_constant()) {
                        (_, Some(k)) => lhs.scale(k),
                        (Some(k), None) => rhs.scale(k),
                        (None, None) => None,
                    },
                    BinaryOp::Shl => {
                        let shift = u32::try_from(rhs.as_constant()?).ok().filter(|s| *s < 62)?;
                        lhs.scale(1 << shift)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Distinct points of the local id grid map to byte ranges of `width` that do
/// not overlap under `lane`.
pub(crate) fn injective_over(lane: [i64; 3], local_size: LocalSize, width: u64) -> bool {
    let active = lane.into_iter().zip(local_size).filter(|&(_, size)| size > 1);
    if active.clone().any(|(coeff, _)| coeff == 0) {
        return false;
    }
    // Each coefficient must clear the furthest byte the smaller axes can reach.
    active
        .map(|(coeff, size)| (coeff.unsigned_abs() as u128, size as u128))
        .sorted()
        .try_fold(u128::from(width.max(1)) - 1, |reach, (coeff, size)| {
            (coeff > reach).then(|| reach + coeff * (size - 1))
        })
        .is_some()
}

/// Bytes touched by one access through `base`, when known.
fn access_width(kernel: &Function, base: &AccessBase) -> Option<u64> {
    match base {
        AccessBase::Param(i) => kernel.params.get(*i)?.element_size(),
        AccessBase::Global(_) | AccessBase::Private(_) => None,
    }
}

pub fn workitem_alias(module: &mut tessel_ir::Module, ctx: &PassContext) -> Result<bool> {
    let kernel = kernel_mut(module, ctx)?;

    let mut patterns = Vec::new();
    {
        let mut folder = Folder::new(kernel);
        for (block, index, instr) in kernel.instrs() {
            let Some(address) = instr.address() else { continue };
            let pattern = folder.fold(address).and_then(|affine| {
                let base = affine.base?;
                let lane_disjoint = matches!(base, AccessBase::Private(_))
                    || access_width(kernel, &base)
                        .is_some_and(|width| injective_over(affine.lane, ctx.local_size, width));
                Some(AccessPattern {
                    base,
                    lane_coeffs: affine.lane,
                    uniform: affine.uniform.into_iter().collect(),
                    constant: affine.constant,
                    lane_disjoint,
                })
            });
            patterns.push((block, index, pattern));
        }
    }

    let mut changed = false;
    let mut disjoint = 0usize;
    for (block, index, pattern) in patterns {
        disjoint += pattern.as_ref().is_some_and(|p| p.lane_disjoint) as usize;
        let meta = &mut kernel.block_mut(block).instrs[index].meta;
        if meta.access != pattern {
            meta.access = pattern;
            changed = true;
        }
    }
    tracing::debug!(kernel = %ctx.kernel, disjoint, changed, "annotated work-item accesses");
    Ok(changed)
}
