//! Index-space geometry of a launch.

use itertools::Itertools;
use snafu::ensure;
use tessel_device::Device;
use tessel_schedule::LocalSize;

use crate::error::{InvalidWorkGroupSizeSnafu, InvalidWorkItemSizeSnafu, Result};

/// How the global index space of a launch is tiled into groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupShape {
    pub work_dim: usize,
    pub global_offset: [usize; 3],
    pub global: [usize; 3],
    pub local: LocalSize,
    pub groups: [usize; 3],
}

impl GroupShape {
    /// `local` must divide `global` on every axis.
    pub fn new(work_dim: usize, global_offset: [usize; 3], global: [usize; 3], local: LocalSize) -> Self {
        let groups = std::array::from_fn(|axis| global[axis] / local[axis]);
        Self { work_dim, global_offset, global, local, groups }
    }

    /// Workers per group, saturating at `usize::MAX`.
    pub fn volume(&self) -> usize {
        volume(self.local).unwrap_or(usize::MAX)
    }

    /// Groups in the launch, `None` when the count overflows.
    pub fn group_count(&self) -> Option<usize> {
        volume(self.groups)
    }
}

/// Product of the three axes, `None` when it does not fit a `usize`.
pub fn volume(axes: [usize; 3]) -> Option<usize> {
    axes.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n))
}

/// The first `work_dim` entries of `values`, padded with `fill` to three axes.
pub fn expand(work_dim: usize, values: &[usize], fill: usize) -> [usize; 3] {
    std::array::from_fn(|axis| if axis < work_dim { values.get(axis).copied().unwrap_or(fill) } else { fill })
}

/// Pick a group shape for a launch that did not specify one.
///
/// Starting from the whole index space, one axis is shrunk per step: first by
/// halving an axis whose half stays a multiple of `preferred`, then by
/// collapsing an axis that is not such a multiple, then by collapsing z, y and
/// x in turn. At least one step is always taken, even when the index space
/// already fits.
///
/// The second stage tests z, y and then z again, so a misaligned x axis is
/// only collapsed by the last stage.
pub fn derive_local(global: [usize; 3], max_volume: usize, preferred: usize) -> LocalSize {
    let preferred = preferred.max(1);
    let mut local = global;
    let [x, y, z] = [0, 1, 2];
    let halvable = |n: usize| n > 1 && n % 2 == 0 && (n / 2) % preferred == 0;
    let misaligned = |n: usize| n > 1 && n % preferred != 0;

    loop {
        if let Some(axis) = [x, y, z].into_iter().find(|&a| halvable(local[a])) {
            local[axis] /= 2;
        } else if let Some(axis) = [z, y, z].into_iter().find(|&a| misaligned(local[a])) {
            local[axis] = 1;
        } else if let Some(axis) = [z, y, x].into_iter().find(|&a| local[a] > 1) {
            local[axis] = 1;
        }
        if volume(local).is_some_and(|v| v <= max_volume.max(1)) {
            break;
        }
    }
    tracing::debug!(?global, ?local, max_volume, preferred, "derived local size");
    local
}

/// Device limits and divisibility of a chosen local size.
pub fn validate(device: &Device, work_dim: usize, global: [usize; 3], local: LocalSize) -> Result<()> {
    ensure!(
        local.iter().all(|&n| n > 0),
        InvalidWorkGroupSizeSnafu { local: local.to_vec(), reason: "zero-sized axis" }
    );
    let fits = volume(local).filter(|&v| v <= device.max_group_volume());
    ensure!(
        fits.is_some(),
        InvalidWorkGroupSizeSnafu {
            local: local.to_vec(),
            reason: format!(
                "volume {} exceeds device limit {}",
                local.iter().join("x"),
                device.max_group_volume()
            ),
        }
    );
    let max_items = device.max_item_sizes();
    for axis in 0..work_dim {
        ensure!(
            local[axis] <= max_items[axis],
            InvalidWorkItemSizeSnafu { axis, size: local[axis], max: max_items[axis] }
        );
    }
    for axis in 0..3 {
        ensure!(
            global[axis] % local[axis] == 0,
            InvalidWorkGroupSizeSnafu {
                local: local.to_vec(),
                reason: format!("global size {} on axis {axis} is not a multiple", global[axis]),
            }
        );
    }
    Ok(())
}
