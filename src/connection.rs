//! The connection wrapper types: the bare metadata record kept in a partition's
//! queues, and the RAII guard handed out to callers.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;

use crate::factory::ConnectionFactory;
use crate::pool::PoolInner;

/// A raw connection plus the bookkeeping the pool needs, as it sits in a partition's
/// free-queue or pending-release queue.
///
/// This is the value that physically moves through a [`crossbeam_queue::ArrayQueue`];
/// the handoff through the queue is what establishes happens-before between the task
/// that last touched `last_used`/`possibly_broken` and the tester or next acquirer.
pub(crate) struct Idle<F: ConnectionFactory> {
    pub(crate) raw: F::Connection,
    pub(crate) created_at: Instant,
    pub(crate) last_used: Instant,
    pub(crate) possibly_broken: bool,
}

impl<F: ConnectionFactory> Idle<F> {
    pub(crate) fn fresh(raw: F::Connection) -> Self {
        let now = Instant::now();
        Self {
            raw,
            created_at: now,
            last_used: now,
            possibly_broken: false,
        }
    }
}

/// A connection checked out of the pool.
///
/// Dropping this value returns the connection to the pool it came from (see the
/// release algorithm documented on [`crate::Pool::release`]). It derefs straight
/// through to the underlying driver connection, so callers use it exactly as they
/// would a bare connection.
pub struct PooledConnection<F: ConnectionFactory> {
    pub(crate) idle: Option<Idle<F>>,
    pub(crate) origin: usize,
    pub(crate) pool: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    pub(crate) fn new(idle: Idle<F>, origin: usize, pool: Arc<PoolInner<F>>) -> Self {
        Self {
            idle: Some(idle),
            origin,
            pool,
        }
    }

    /// Reset per-checkout state. Called once by `acquire` right before the connection
    /// is handed to the caller: clears any `possibly_broken` flag left over from a
    /// prior checkout and stamps `last_used`.
    pub(crate) fn renew(&mut self) {
        if let Some(idle) = &mut self.idle {
            idle.possibly_broken = false;
            idle.last_used = Instant::now();
        }
    }

    /// Mark this connection as possibly broken, so the next release performs a
    /// liveness probe instead of trusting it back into the free-queue unchecked.
    ///
    /// Drivers built on top of this pool should call this after observing an I/O
    /// error on the underlying connection.
    pub fn mark_possibly_broken(&mut self) {
        if let Some(idle) = &mut self.idle {
            idle.possibly_broken = true;
        }
    }

    /// The index of the partition this connection was allocated from.
    pub(crate) fn origin(&self) -> usize {
        self.origin
    }

    /// Time elapsed since this connection was first opened by the factory, as
    /// opposed to since it was last checked out. The idle tester's max-age
    /// eviction keys off last-used time instead (see `crate::tester`); this is
    /// exposed for hooks and callers that want true connection age.
    pub fn age(&self) -> std::time::Duration {
        self.idle.as_ref().expect(GONE).created_at.elapsed()
    }

    /// Invoke the check-in hook and hand back the queued record, for whichever
    /// release path runs first: `Drop`, or the explicit `Pool::release`. Only
    /// fires the hook once per connection, since the second caller finds
    /// `idle` already `None`.
    pub(crate) fn check_in(&mut self) -> Option<Idle<F>> {
        if self.idle.is_some() {
            let hook = Arc::clone(&self.pool.hook);
            hook.on_check_in(self);
        }
        self.idle.take()
    }
}

const GONE: &str = "(bug) PooledConnection used after its inner connection was taken";

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &F::Connection {
        &self.idle.as_ref().expect(GONE).raw
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut F::Connection {
        &mut self.idle.as_mut().expect(GONE).raw
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let Some(idle) = self.check_in() {
            self.pool.release_on_drop(idle, self.origin);
        }
    }
}
