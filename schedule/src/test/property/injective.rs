//! The mixed-radix disjointness check against brute-force enumeration.

use std::collections::HashSet;

use proptest::prelude::*;

use crate::passes::workitem_alias::injective_over;

/// Every byte of every worker's `width`-wide element is touched by one worker only.
fn disjoint_ranges(lane: [i64; 3], local_size: [usize; 3], width: u64) -> bool {
    let mut seen = HashSet::new();
    for z in 0..local_size[2] as i64 {
        for y in 0..local_size[1] as i64 {
            for x in 0..local_size[0] as i64 {
                let start = lane[0] * x + lane[1] * y + lane[2] * z;
                if !(0..width as i64).all(|byte| seen.insert(start + byte)) {
                    return false;
                }
            }
        }
    }
    true
}

proptest! {
    /// A positive answer is always sound.
    #[test]
    fn injective_implies_distinct(
        lane in prop::array::uniform3(-40i64..40),
        local_size in prop::array::uniform3(1usize..6),
        width in prop::sample::select(vec![1u64, 2, 4, 8]),
    ) {
        if injective_over(lane, local_size, width) {
            prop_assert!(disjoint_ranges(lane, local_size, width));
        }
    }

    /// Row-major layouts of whole elements are always recognized.
    #[test]
    fn row_major_is_injective(
        local_size in prop::array::uniform3(1usize..8),
        elem in prop::sample::select(vec![1i64, 2, 4, 8]),
    ) {
        let [lx, ly, _] = local_size.map(|n| n as i64);
        let lane = [elem, elem * lx, elem * lx * ly];
        prop_assert!(injective_over(lane, local_size, elem as u64));
    }

    #[test]
    fn zero_coefficient_on_active_axis_rejected(
        mut lane in prop::array::uniform3(1i64..16),
        local_size in prop::array::uniform3(2usize..6),
        axis in 0usize..3,
    ) {
        lane[axis] = 0;
        prop_assert!(!injective_over(lane, local_size, 1));
    }
}
