//! A single shard of the pool: its own free-queue, pending-release queue, and
//! creation accounting.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crossbeam_queue::ArrayQueue;
use event_listener::Event;

use crate::config::{PoolConfig, HIT_THRESHOLD_PERCENT};
use crate::connection::Idle;
use crate::factory::ConnectionFactory;

/// An independent shard of the pool's connections.
///
/// Bounding both queues at `max_connections` is what makes the accounting identity
/// (`free + pending_release + leased == created`) enforceable without ever blocking
/// indefinitely on a full queue: a connection can only be in flight to one place at
/// a time, so neither queue can receive more entries than `created_count` allows.
pub(crate) struct Partition<F: ConnectionFactory> {
    pub(crate) free: ArrayQueue<Idle<F>>,
    pub(crate) pending_release: ArrayQueue<Idle<F>>,
    pub(crate) created_count: AtomicU32,
    pub(crate) max_connections: u32,
    pub(crate) acquire_increment: u32,
    pub(crate) unable_to_create_more: AtomicBool,
    /// Signaled by `acquire` when the free-queue looks low; awaited by the pool-watch
    /// loop. A lazy wake-up, not a semaphore: the loop re-checks the predicate itself
    /// after waking, so spurious or coalesced notifications are harmless.
    pub(crate) almost_full: Event,
    /// Notified every time a connection lands in `free`, whether from a release or
    /// from the pool-watch loop manufacturing new ones. What a blocked `acquire`
    /// waits on.
    pub(crate) released: Event,
    /// Notified every time a connection lands in `pending_release`. What the
    /// release-helper loop waits on.
    pub(crate) pending_release_ready: Event,
}

impl<F: ConnectionFactory> Partition<F> {
    pub(crate) fn new(config: &PoolConfig) -> Self {
        let max = config.max_connections_per_partition;
        Self {
            free: ArrayQueue::new(max as usize),
            pending_release: ArrayQueue::new(max as usize),
            created_count: AtomicU32::new(0),
            max_connections: max,
            acquire_increment: config.acquire_increment,
            unable_to_create_more: AtomicBool::new(false),
            almost_full: Event::new(),
            released: Event::new(),
            pending_release_ready: Event::new(),
        }
    }

    /// Blocking (asynchronous) dequeue from the free-queue: waits for a `released`
    /// notification whenever the queue is momentarily empty.
    pub(crate) async fn pop_free_blocking(&self) -> Idle<F> {
        loop {
            if let Some(idle) = self.free.pop() {
                return idle;
            }
            let listener = self.released.listen();
            if let Some(idle) = self.free.pop() {
                return idle;
            }
            listener.await;
        }
    }

    /// Blocking (asynchronous) dequeue from the pending-release queue: waits for a
    /// `pending_release_ready` notification whenever the queue is momentarily empty.
    pub(crate) async fn pop_pending_release_blocking(&self) -> Idle<F> {
        loop {
            if let Some(idle) = self.pending_release.pop() {
                return idle;
            }
            let listener = self.pending_release_ready.listen();
            if let Some(idle) = self.pending_release.pop() {
                return idle;
            }
            listener.await;
        }
    }

    /// `free.len() * 100 / max < HIT_THRESHOLD_PERCENT`, i.e. the partition looks
    /// close to exhausted and should be topped up.
    pub(crate) fn looks_almost_full(&self) -> bool {
        let max = self.max_connections.max(1) as u64;
        let free = self.free.len() as u64;
        free * 100 / max < HIT_THRESHOLD_PERCENT as u64
    }

    /// Wake the pool-watch loop if growth looks warranted. Never blocks; `acquire`
    /// calls this on every attempt regardless of whether it ultimately succeeds.
    pub(crate) fn signal_growth_if_needed(&self) {
        if !self.unable_to_create_more.load(Ordering::Acquire) && self.looks_almost_full() {
            self.almost_full.notify(usize::MAX);
        }
    }

    pub(crate) fn created_count(&self) -> u32 {
        self.created_count.load(Ordering::Acquire)
    }
}
