//! Type definitions for IR operations.
//!
//! This module contains the small enums shared by every part of the IR:
//! index-space axes, address spaces, binary operators and the context-identity
//! variables a kernel reads to learn which worker it is.

use std::fmt;

use strum::{Display, EnumString, VariantArray};

/// Name of the work-group barrier builtin.
pub const BARRIER_FUNCTION: &str = "barrier";

/// Intrinsic returning the hardware lane index along an axis (SPMD targets).
pub const LANE_ID_INTRINSIC: &str = "__tessel_lane_id";

/// One axis of the (up to) three-dimensional index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, VariantArray)]
#[strum(serialize_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Position of the axis in `[x, y, z]` arrays.
    pub const fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::VARIANTS.get(index).copied()
    }
}

/// Address space of a memory object or pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum AddrSpace {
    /// Per-worker memory.
    #[default]
    Private,
    /// Device memory visible to every group.
    Global,
    /// Memory shared by the workers of one group.
    Local,
    /// Read-only device memory.
    Constant,
}

/// Two-operand integer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    And,
    Or,
    Xor,
    Lt,
    Le,
    Eq,
    Ne,
}

/// Group/worker identity variables a kernel may read.
///
/// Each variable is materialized as a module global named by [`ContextVar::symbol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContextVar {
    LocalId(Axis),
    LocalSize(Axis),
    NumGroups(Axis),
    GroupId(Axis),
    GlobalOffset(Axis),
    WorkDim,
}

impl ContextVar {
    /// Every context variable, in symbol-table order.
    pub fn all() -> impl Iterator<Item = ContextVar> {
        let per_axis: [fn(Axis) -> ContextVar; 5] = [
            ContextVar::LocalId,
            ContextVar::LocalSize,
            ContextVar::NumGroups,
            ContextVar::GroupId,
            ContextVar::GlobalOffset,
        ];
        per_axis
            .into_iter()
            .flat_map(|ctor| Axis::VARIANTS.iter().map(move |&axis| ctor(axis)))
            .chain(std::iter::once(ContextVar::WorkDim))
    }

    /// Module-level symbol backing this variable.
    pub fn symbol(self) -> String {
        match self {
            ContextVar::LocalId(axis) => format!("_local_id_{axis}"),
            ContextVar::LocalSize(axis) => format!("_local_size_{axis}"),
            ContextVar::NumGroups(axis) => format!("_num_groups_{axis}"),
            ContextVar::GroupId(axis) => format!("_group_id_{axis}"),
            ContextVar::GlobalOffset(axis) => format!("_global_offset_{axis}"),
            ContextVar::WorkDim => "_work_dim".to_string(),
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::all().find(|var| var.symbol() == symbol)
    }

    /// True when two workers of the same group may observe different values.
    pub fn is_worker_dependent(self) -> bool {
        matches!(self, ContextVar::LocalId(_))
    }
}

impl fmt::Display for ContextVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol())
    }
}

/// Scheduling hint attached to a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum InlineHint {
    #[default]
    Default,
    Never,
    Always,
}
