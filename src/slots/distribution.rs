//! Pure slot distribution calculations.
//!
//! All functions in this module are pure, side-effect free, and fully testable.
//! They compute how the hash slot space is partitioned across N nodes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::controller::error::{Error, Result};

/// Total number of hash slots in a Valkey cluster.
pub const TOTAL_SLOTS: u16 = 16384;

/// A contiguous range of hash slots [start, end] inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct SlotRange {
    /// Start of the slot range (inclusive).
    pub start: u16,
    /// End of the slot range (inclusive).
    pub end: u16,
}

impl SlotRange {
    /// Create a new slot range.
    ///
    /// # Panics
    /// Debug-only assertions check that start <= end and end < TOTAL_SLOTS.
    pub fn new(start: u16, end: u16) -> Self {
        debug_assert!(start <= end, "start ({}) must be <= end ({})", start, end);
        debug_assert!(
            end < TOTAL_SLOTS,
            "end ({}) must be < TOTAL_SLOTS ({})",
            end,
            TOTAL_SLOTS
        );
        Self { start, end }
    }

    /// Create a single-slot range.
    pub fn single(slot: u16) -> Self {
        Self {
            start: slot,
            end: slot,
        }
    }

    /// Get the number of slots in this range.
    pub fn count(&self) -> u16 {
        self.end - self.start + 1
    }

    /// Check if this range contains a specific slot.
    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    /// Iterate over all slots in this range.
    pub fn iter(&self) -> impl Iterator<Item = u16> + use<> {
        self.start..=self.end
    }
}

impl std::fmt::Display for SlotRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// First slot of range `index` when the space is cut into `node_count` parts.
///
/// Boundaries sit at `round(index * TOTAL_SLOTS / node_count)` (half rounds up),
/// computed in integers.
fn boundary(index: u64, node_count: u64) -> u16 {
    let total = u64::from(TOTAL_SLOTS);
    // Bounded by TOTAL_SLOTS for index <= node_count.
    ((2 * index * total + node_count) / (2 * node_count)) as u16
}

/// Compute the target slot plan for `node_count` nodes.
///
/// Returns exactly `node_count` contiguous ranges covering `[0, TOTAL_SLOTS)`
/// with no gaps or overlaps. Range sizes differ by at most one slot and the
/// result only depends on `node_count`.
///
/// # Examples
///
/// ```
/// use valkey_slot_reconciler::slots::distribution::{plan_slot_ranges, SlotRange};
///
/// let plan = plan_slot_ranges(3).unwrap();
/// assert_eq!(plan[0], SlotRange::new(0, 5460));
/// assert_eq!(plan[1], SlotRange::new(5461, 10922));
/// assert_eq!(plan[2], SlotRange::new(10923, 16383));
/// ```
pub fn plan_slot_ranges(node_count: usize) -> Result<Vec<SlotRange>> {
    if node_count == 0 {
        return Err(Error::Configuration(
            "slot plan requires at least one node".to_string(),
        ));
    }
    if node_count > usize::from(TOTAL_SLOTS) {
        return Err(Error::Configuration(format!(
            "cannot split {} slots across {} nodes",
            TOTAL_SLOTS, node_count
        )));
    }

    let n = node_count as u64;
    let ranges = (0..n)
        .map(|i| SlotRange::new(boundary(i, n), boundary(i + 1, n) - 1))
        .collect();
    Ok(ranges)
}

/// Index of the range in `ranges` that contains `slot`.
pub fn range_index_of(ranges: &[SlotRange], slot: u16) -> Option<usize> {
    ranges.iter().position(|r| r.contains(slot))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_range_single() {
        let range = SlotRange::single(100);
        assert_eq!(range.start, 100);
        assert_eq!(range.end, 100);
        assert_eq!(range.count(), 1);
    }

    #[test]
    fn test_slot_range_count() {
        assert_eq!(SlotRange::new(0, 5460).count(), 5461);
        assert_eq!(SlotRange::new(0, 16383).count(), 16384);
    }

    #[test]
    fn test_slot_range_contains() {
        let range = SlotRange::new(100, 200);
        assert!(range.contains(100));
        assert!(range.contains(200));
        assert!(!range.contains(99));
        assert!(!range.contains(201));
    }

    #[test]
    fn test_slot_range_display() {
        assert_eq!(format!("{}", SlotRange::new(0, 5460)), "0-5460");
        assert_eq!(format!("{}", SlotRange::single(100)), "100");
    }

    #[test]
    fn test_plan_zero_nodes_is_configuration_error() {
        let err = plan_slot_ranges(0).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_plan_more_nodes_than_slots_is_configuration_error() {
        assert!(plan_slot_ranges(usize::from(TOTAL_SLOTS) + 1).is_err());
        assert_eq!(plan_slot_ranges(usize::from(TOTAL_SLOTS)).unwrap().len(), 16384);
    }

    #[test]
    fn test_plan_one_node() {
        let plan = plan_slot_ranges(1).unwrap();
        assert_eq!(plan, vec![SlotRange::new(0, 16383)]);
    }

    #[test]
    fn test_plan_three_nodes() {
        let plan = plan_slot_ranges(3).unwrap();
        assert_eq!(
            plan,
            vec![
                SlotRange::new(0, 5460),
                SlotRange::new(5461, 10922),
                SlotRange::new(10923, 16383),
            ]
        );
    }

    #[test]
    fn test_plan_four_nodes() {
        let plan = plan_slot_ranges(4).unwrap();
        assert_eq!(
            plan,
            vec![
                SlotRange::new(0, 4095),
                SlotRange::new(4096, 8191),
                SlotRange::new(8192, 12287),
                SlotRange::new(12288, 16383),
            ]
        );
    }

    #[test]
    fn test_plan_covers_all_slots_contiguously() {
        for node_count in 1..=64 {
            let plan = plan_slot_ranges(node_count).unwrap();
            assert_eq!(plan.len(), node_count);
            assert_eq!(plan.first().unwrap().start, 0);
            assert_eq!(plan.last().unwrap().end, TOTAL_SLOTS - 1);
            for pair in plan.windows(2) {
                assert_eq!(pair[1].start, pair[0].end + 1);
            }
            let total: u32 = plan.iter().map(|r| u32::from(r.count())).sum();
            assert_eq!(total, u32::from(TOTAL_SLOTS));
        }
    }

    #[test]
    fn test_plan_sizes_differ_by_at_most_one() {
        for node_count in [3, 5, 7, 11, 100, 1000] {
            let plan = plan_slot_ranges(node_count).unwrap();
            let min = plan.iter().map(|r| r.count()).min().unwrap();
            let max = plan.iter().map(|r| r.count()).max().unwrap();
            assert!(max - min <= 1, "node_count={node_count}");
        }
    }

    #[test]
    fn test_range_index_of() {
        let plan = plan_slot_ranges(3).unwrap();
        assert_eq!(range_index_of(&plan, 0), Some(0));
        assert_eq!(range_index_of(&plan, 5460), Some(0));
        assert_eq!(range_index_of(&plan, 5461), Some(1));
        assert_eq!(range_index_of(&plan, 16383), Some(2));
        assert_eq!(range_index_of(&[], 5), None);
    }
}
