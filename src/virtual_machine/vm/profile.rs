use crate::virtual_machine::isa::{GROUP_COUNT, InstructionGroup};

/// Executed-instruction profile.
///
/// Tracks how a run's instructions are distributed across
/// [`InstructionGroup`]s. Backed by a flat array indexed by the group
/// discriminant so recording stays branch-free on the dispatch path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstructionProfile {
    counts: [u64; GROUP_COUNT],
}

impl InstructionProfile {
    /// Creates a new empty profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one executed instruction of `group`.
    #[inline(always)]
    pub fn record(&mut self, group: InstructionGroup) {
        let slot = &mut self.counts[group as usize];
        *slot = slot.saturating_add(1);
    }

    /// Returns the count for a single group.
    pub fn get(&self, group: InstructionGroup) -> u64 {
        self.counts[group as usize]
    }

    /// Returns the total across all groups.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |acc, &v| acc.saturating_add(v))
    }

    /// Returns an iterator over all groups and their counts, in group order.
    pub fn iter(&self) -> impl Iterator<Item = (InstructionGroup, u64)> {
        InstructionGroup::ALL.into_iter().zip(self.counts)
    }
}
