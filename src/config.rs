//! Pool configuration: the options that govern pool mechanics, independent of any
//! one driver's connection parameters (those live on the [`crate::ConnectionFactory`]
//! implementation instead).

use std::time::Duration;

/// Percentage of a partition's `max_connections` below which the free-queue is
/// considered "almost full" (really: almost empty) and growth is signaled.
pub(crate) const HIT_THRESHOLD_PERCENT: u32 = 20;

/// Immutable pool configuration, produced by [`PoolConfigBuilder::build`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub(crate) partition_count: usize,
    pub(crate) min_connections_per_partition: u32,
    pub(crate) max_connections_per_partition: u32,
    pub(crate) acquire_increment: u32,
    pub(crate) idle_connection_test_period: Option<Duration>,
    pub(crate) idle_max_age: Option<Duration>,
    pub(crate) connection_test_statement: Option<String>,
    pub(crate) release_helper_thread_count: usize,
}

impl PoolConfig {
    /// Start building a configuration with the same defaults as [`PoolConfigBuilder::new`].
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    pub fn max_connections_per_partition(&self) -> u32 {
        self.max_connections_per_partition
    }
}

/// Builder for [`PoolConfig`], sanitizing its inputs at [`build`](Self::build) time
/// the way a connection pool's options object typically does: clamp negative or
/// nonsensical values rather than rejecting them outright, and enforce `min <= max`.
#[derive(Debug, Clone)]
pub struct PoolConfigBuilder {
    partition_count: usize,
    min_connections_per_partition: u32,
    max_connections_per_partition: u32,
    acquire_increment: u32,
    idle_connection_test_period: Option<Duration>,
    idle_max_age: Option<Duration>,
    connection_test_statement: Option<String>,
    release_helper_thread_count: usize,
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self {
            partition_count: 2,
            min_connections_per_partition: 5,
            max_connections_per_partition: 20,
            acquire_increment: 3,
            idle_connection_test_period: Some(Duration::from_secs(240)),
            idle_max_age: Some(Duration::from_secs(60 * 60)),
            connection_test_statement: None,
            release_helper_thread_count: 0,
        }
    }
}

impl PoolConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of independent partitions. More partitions reduce contention under
    /// many concurrent callers at the cost of looser global fairness.
    pub fn partition_count(mut self, count: usize) -> Self {
        self.partition_count = count.max(1);
        self
    }

    /// Connections eagerly created per partition at construction time.
    pub fn min_connections_per_partition(mut self, min: u32) -> Self {
        self.min_connections_per_partition = min;
        self
    }

    /// Upper bound on connections per partition; also the capacity of both the
    /// free-queue and the pending-release queue.
    pub fn max_connections_per_partition(mut self, max: u32) -> Self {
        self.max_connections_per_partition = max.max(1);
        self
    }

    /// Batch size used by the background growth loop when it manufactures new
    /// connections.
    pub fn acquire_increment(mut self, increment: u32) -> Self {
        self.acquire_increment = increment.max(1);
        self
    }

    /// How often the idle connection tester wakes per partition. `None` disables it.
    pub fn idle_connection_test_period(mut self, period: impl Into<Option<Duration>>) -> Self {
        self.idle_connection_test_period = period.into();
        self
    }

    /// Maximum age an idle connection may reach before the tester evicts it
    /// regardless of liveness. `None` disables age-based eviction.
    pub fn idle_max_age(mut self, age: impl Into<Option<Duration>>) -> Self {
        self.idle_max_age = age.into();
        self
    }

    /// SQL statement used for the liveness probe. When unset, the probe falls back
    /// to whatever sentinel metadata lookup the [`crate::RawConnection`] implements.
    pub fn connection_test_statement(mut self, statement: impl Into<Option<String>>) -> Self {
        self.connection_test_statement = statement.into();
        self
    }

    /// Number of per-partition helper tasks that perform release work off the
    /// releasing caller's task. `0` means release work is done inline (or, for the
    /// drop path, in a one-shot spawned task — see [`crate::Pool::release`]).
    pub fn release_helper_thread_count(mut self, count: usize) -> Self {
        self.release_helper_thread_count = count;
        self
    }

    /// Validate and freeze this builder into a [`PoolConfig`].
    pub fn build(self) -> PoolConfig {
        let max = self.max_connections_per_partition.max(1);
        let min = self.min_connections_per_partition.min(max);
        let acquire_increment = self.acquire_increment.max(1);

        PoolConfig {
            partition_count: self.partition_count.max(1),
            min_connections_per_partition: min,
            max_connections_per_partition: max,
            acquire_increment,
            idle_connection_test_period: self.idle_connection_test_period,
            idle_max_age: self.idle_max_age,
            connection_test_statement: self.connection_test_statement,
            release_helper_thread_count: self.release_helper_thread_count,
        }
    }
}
