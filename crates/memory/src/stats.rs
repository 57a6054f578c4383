/// Memory usage and paging counters, snapshotted under the manager lock.
///
/// `free` is always recomputed as `total - used` when the snapshot is taken
/// so the two usage figures cannot drift apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub total: usize,
    pub used: usize,
    pub free: usize,
    pub paged_in: usize,
    pub paged_out: usize,
    pub idle_ticks: u64,
    pub active_ticks: u64,
}
