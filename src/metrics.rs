//! A point-in-time snapshot of pool accounting, for introspection and tests.

/// Aggregate connection counts across all partitions at the moment
/// [`crate::Pool::counters`] was called. Each field is summed independently, so
/// under concurrent activity the four numbers may not satisfy the accounting
/// identity exactly (a connection can move between queues between two reads) —
/// treat this as a snapshot for monitoring, not a transactional view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolCounters {
    /// Connections currently open across every partition.
    pub total_created: u32,
    /// Connections sitting idle in a free-queue.
    pub total_free: u32,
    /// Connections handed off to a release helper but not yet processed.
    pub total_pending_release: u32,
    /// Connections currently checked out by a caller. Derived as
    /// `total_created - total_free - total_pending_release`.
    pub total_leased: u32,
}
